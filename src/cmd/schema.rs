//! The `schema` subcommand.

use clap::{Args, ValueEnum};
use schemars::schema_for;

use crate::{
    analyze::{AnalysisConfig, AnalysisReport, ContentIndex},
    async_utils::io::write_json_pretty,
    pdf_info::PdfInfo,
    prelude::*,
};

/// The different schema types we support.
///
/// We parse these as PascalCase, because they represent type names.
#[derive(Debug, Clone, Copy, ValueEnum)]
#[clap(rename_all = "PascalCase")]
pub enum SchemaType {
    /// Configuration file for `analyze --config`.
    AnalysisConfig,
    /// Report written by `analyze`.
    AnalysisReport,
    /// Content index written by `analyze --index`.
    ContentIndex,
    /// Output of `info`.
    PdfInfo,
}

/// Schema command line arguments.
#[derive(Debug, Args)]
pub struct SchemaOpts {
    /// The schema type to generate.
    #[clap(value_enum, value_name = "TYPE")]
    pub schema_type: SchemaType,

    /// The output path to write the schema to.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `schema` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_schema(schema_opts: &SchemaOpts) -> Result<()> {
    let schema = match schema_opts.schema_type {
        SchemaType::AnalysisConfig => schema_for!(AnalysisConfig),
        SchemaType::AnalysisReport => schema_for!(AnalysisReport),
        SchemaType::ContentIndex => schema_for!(ContentIndex),
        SchemaType::PdfInfo => schema_for!(PdfInfo),
    };
    write_json_pretty(schema_opts.output_path.as_deref(), &schema).await
}
