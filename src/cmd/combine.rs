//! The `combine` subcommand.

use clap::Args;

use crate::{
    combine::{CorpusHeader, combine_batch_files, find_batch_files, format_thousands},
    prelude::*,
    ui::Ui,
};

/// `combine` command line arguments.
#[derive(Debug, Args)]
pub struct CombineOpts {
    /// Directory containing batch files.
    #[clap(default_value = "batch_results")]
    pub batch_dir: PathBuf,

    /// Only combine batch files with this prefix, like `small_batch`.
    #[clap(long)]
    pub prefix: Option<String>,

    /// Where to write the combined text.
    #[clap(short = 'o', long = "out", default_value = "extracted_text_complete.txt")]
    pub output_path: PathBuf,

    /// Source label for the header. Defaults to the batch directory.
    #[clap(long)]
    pub source: Option<String>,

    /// Method label for the header.
    #[clap(long, default_value = "Tesseract OCR")]
    pub method: String,
}

/// The `combine` subcommand.
#[instrument(level = "debug", skip_all, fields(dir = %opts.batch_dir.display()))]
pub async fn cmd_combine(ui: Ui, opts: &CombineOpts) -> Result<()> {
    let files = find_batch_files(&opts.batch_dir, opts.prefix.as_deref()).await?;
    ui.display_message(
        "🔗",
        &format!("Combining {} batch files...", files.len()),
    );

    let header = CorpusHeader {
        source: opts
            .source
            .clone()
            .unwrap_or_else(|| opts.batch_dir.display().to_string()),
        method: opts.method.clone(),
        processing: None,
    };
    let (corpus, stats) = combine_batch_files(&files, &header).await?;
    tokio::fs::write(&opts.output_path, corpus)
        .await
        .with_context(|| format!("failed to write {:?}", opts.output_path.display()))?;

    if stats.batches_unreadable > 0 {
        ui.display_message(
            "⚠️",
            &format!("{} batch files could not be read", stats.batches_unreadable),
        );
    }
    ui.display_message(
        "✅",
        &format!(
            "Wrote {}: {} pages, {} characters, {} per page",
            opts.output_path.display(),
            stats.pages,
            format_thousands(stats.characters),
            format_thousands(stats.average_per_page())
        ),
    );
    Ok(())
}
