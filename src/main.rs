use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod analyze;
mod async_utils;
mod batch;
mod cmd;
mod combine;
mod engines;
mod page_iter;
mod pdf_info;
mod prelude;
mod ui;

/// OCR scanned PDFs in batches, then combine and analyze the text.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
External tools:
  - Poppler (`pdfinfo`, `pdftocairo`, `pdfseparate`, `pdfimages`, `pdftotext`)
  - Tesseract (`tesseract`), for the default OCR engine

Environment Variables:
  - TESSERACT_CMD (optional): Path to the `tesseract` binary.
  - RUST_LOG (optional): Log filter, like `debug` or `scan_batch_ocr=trace`.

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Show page count, metadata and embedded images of a PDF, as JSON.
    Info(cmd::info::InfoOpts),
    /// Render PDF pages to PNG files.
    Rasterize(cmd::rasterize::RasterizeOpts),
    /// OCR a PDF in batches, writing one text file per batch.
    Ocr(cmd::ocr::OcrOpts),
    /// Combine batch files into a single text file.
    Combine(cmd::combine::CombineOpts),
    /// Analyze extracted text for names, page types and keywords.
    Analyze(cmd::analyze::AnalyzeOpts),
    /// Print schemas for the JSON files we read and write.
    Schema(cmd::schema::SchemaOpts),
}

impl Cmd {
    /// Are we using stdout for output?
    fn using_stdout_for_output(&self) -> bool {
        match self {
            Cmd::Info(opts) => opts.output_path.is_none(),
            Cmd::Rasterize(_) | Cmd::Ocr(_) | Cmd::Combine(_) => false,
            Cmd::Analyze(opts) => opts.report_path().is_none(),
            Cmd::Schema(opts) => opts.output_path.is_none(),
        }
    }
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);

    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Hide the progress bar if we're using stdout for output.
    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    // Run the appropriate subcommand.
    match &opts.subcmd {
        Cmd::Info(info_opts) => cmd::info::cmd_info(info_opts).await?,
        Cmd::Rasterize(rasterize_opts) => {
            cmd::rasterize::cmd_rasterize(ui, rasterize_opts).await?
        }
        Cmd::Ocr(ocr_opts) => cmd::ocr::cmd_ocr(ui, ocr_opts).await?,
        Cmd::Combine(combine_opts) => cmd::combine::cmd_combine(ui, combine_opts).await?,
        Cmd::Analyze(analyze_opts) => cmd::analyze::cmd_analyze(ui, analyze_opts).await?,
        Cmd::Schema(schema_opts) => cmd::schema::cmd_schema(schema_opts).await?,
    }
    Ok(())
}
