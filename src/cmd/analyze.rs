//! The `analyze` subcommand.

use clap::Args;

use crate::{
    analyze::{AnalysisConfig, Analyzer, load_pages},
    async_utils::io::write_json_pretty,
    prelude::*,
    ui::Ui,
};

/// `analyze` command line arguments.
#[derive(Debug, Args)]
pub struct AnalyzeOpts {
    /// A directory of batch files, or a combined text file.
    pub input: PathBuf,

    /// When reading a directory, only use batch files with this prefix.
    #[clap(long)]
    pub prefix: Option<String>,

    /// Analysis configuration (TOML or JSON). Defaults to the built-in one,
    /// which `schema AnalysisConfig` describes.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Where to write the JSON report. Use `-` for standard output.
    #[clap(short = 'o', long = "out", default_value = "content_analysis.json")]
    pub output_path: PathBuf,

    /// Also write pages grouped by type to this JSON file.
    #[clap(long)]
    pub index: Option<PathBuf>,
}

impl AnalyzeOpts {
    /// The report path, or `None` for standard output.
    pub fn report_path(&self) -> Option<&Path> {
        if self.output_path == Path::new("-") {
            None
        } else {
            Some(self.output_path.as_path())
        }
    }
}

/// The `analyze` subcommand.
#[instrument(level = "debug", skip_all, fields(input = %opts.input.display()))]
pub async fn cmd_analyze(ui: Ui, opts: &AnalyzeOpts) -> Result<()> {
    let config = AnalysisConfig::load(opts.config.as_deref()).await?;
    let analyzer = Analyzer::new(config)?;

    let pages = load_pages(&opts.input, opts.prefix.as_deref()).await?;
    if pages.is_empty() {
        warn!(input = %opts.input.display(), "No page records found");
    }

    let report = analyzer.analyze(&pages);
    write_json_pretty(opts.report_path(), &report).await?;
    ui.display_message(
        "📊",
        &format!(
            "{} pages, {} with substantial content",
            report.total_pages, report.substantial_pages
        ),
    );
    if let Some(path) = opts.report_path() {
        ui.display_message("✅", &format!("Report saved to {}", path.display()));
    }

    if let Some(index_path) = &opts.index {
        let index = analyzer.content_index(&pages);
        write_json_pretty(Some(index_path.as_path()), &index).await?;
        for (category, pages) in &index.0 {
            debug!(category = %category, pages = pages.len(), "Indexed pages");
        }
        ui.display_message(
            "📚",
            &format!("Content index saved to {}", index_path.display()),
        );
    }
    Ok(())
}
