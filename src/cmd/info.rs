//! The `info` subcommand.

use clap::Args;

use crate::{async_utils::io::write_json_pretty, pdf_info::PdfInfo, prelude::*};

/// `info` command line arguments.
#[derive(Debug, Args)]
pub struct InfoOpts {
    /// The PDF to inspect.
    pub input_path: PathBuf,

    /// Look for embedded images in at most this many pages.
    #[clap(long, default_value = "10")]
    pub image_pages: usize,

    /// Write the JSON to this file instead of standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `info` subcommand.
#[instrument(level = "debug", skip_all, fields(input = %opts.input_path.display()))]
pub async fn cmd_info(opts: &InfoOpts) -> Result<()> {
    let info = PdfInfo::for_path(&opts.input_path, opts.image_pages).await?;
    if info.embedded_images.pages_with_images > 0 {
        info!(
            "{} of the first {} pages contain images; the PDF is probably scanned",
            info.embedded_images.pages_with_images, info.embedded_images.pages_inspected
        );
    }
    write_json_pretty(opts.output_path.as_deref(), &info).await
}
