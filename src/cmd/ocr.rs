//! The `ocr` subcommand.

use std::time::Duration;

use clap::Args;

use crate::{
    batch::{
        BatchSettings, PageSource as _, PdfPageSource, RunSummary, plan_batches,
        record::{DEFAULT_SEPARATOR_WIDTH, SMALL_SEPARATOR_WIDTH},
        run_batches,
    },
    combine::{CorpusHeader, combine_batch_files, format_thousands},
    engines::{EngineOpts, engine_for_opts},
    page_iter::PageIterOptions,
    prelude::*,
    ui::{ProgressConfig, Ui},
};

/// Batch size used when none is chosen.
const DEFAULT_BATCH_SIZE: usize = 20;

/// Smallest and largest batch size accepted at the interactive prompt.
const MIN_PROMPT_BATCH_SIZE: usize = 5;
const MAX_PROMPT_BATCH_SIZE: usize = 50;

/// `ocr` command line arguments.
#[derive(Debug, Args)]
pub struct OcrOpts {
    /// The PDF (or single image) to OCR.
    pub input_path: PathBuf,

    /// Pages per batch file. Defaults to 20, or 10 with `--small-batches`.
    #[clap(long, conflicts_with = "interactive")]
    pub batch_size: Option<usize>,

    /// Ask for the batch size, and for confirmation before starting.
    #[clap(short = 'i', long)]
    pub interactive: bool,

    /// Use small batches: 10 pages, `small_batch` prefix, written to
    /// `small_batch_results`, shorter separators and a 1 second pause.
    #[clap(long)]
    pub small_batches: bool,

    /// Directory for batch files.
    #[clap(long)]
    pub out_dir: Option<PathBuf>,

    /// Batch file name prefix.
    #[clap(long)]
    pub prefix: Option<String>,

    /// Seconds to pause between batches.
    #[clap(long)]
    pub pause_secs: Option<f64>,

    /// Width of the `-----` line written after each page.
    #[clap(long)]
    pub separator_width: Option<usize>,

    /// First page to OCR (1-based).
    #[clap(long, default_value = "1")]
    pub first_page: usize,

    /// OCR at most this many pages.
    #[clap(long)]
    pub max_pages: Option<usize>,

    #[clap(flatten)]
    pub page_iter_opts: PageIterOptions,

    #[clap(flatten)]
    pub engine_opts: EngineOpts,

    /// Skip batches whose output file already exists.
    #[clap(long)]
    pub resume: bool,

    /// Combine all batch files into one text file when done.
    #[clap(long)]
    pub combine: bool,

    /// Where `--combine` writes the combined text.
    #[clap(long, default_value = "extracted_text_complete.txt")]
    pub combined_path: PathBuf,
}

/// Defaults for one of our two batch profiles.
struct BatchProfile {
    batch_size: usize,
    prefix: &'static str,
    out_dir: &'static str,
    separator_width: usize,
    pause: Duration,
}

impl BatchProfile {
    fn standard() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            prefix: "batch",
            out_dir: "batch_results",
            separator_width: DEFAULT_SEPARATOR_WIDTH,
            pause: Duration::from_secs(2),
        }
    }

    fn small() -> Self {
        Self {
            batch_size: 10,
            prefix: "small_batch",
            out_dir: "small_batch_results",
            separator_width: SMALL_SEPARATOR_WIDTH,
            pause: Duration::from_secs(1),
        }
    }
}

impl OcrOpts {
    fn profile(&self) -> BatchProfile {
        if self.small_batches {
            BatchProfile::small()
        } else {
            BatchProfile::standard()
        }
    }

    /// Batch settings, with explicit options overriding the profile.
    fn batch_settings(&self) -> Result<BatchSettings> {
        let profile = self.profile();
        let pause = match self.pause_secs {
            Some(secs) => Duration::try_from_secs_f64(secs)
                .map_err(|err| anyhow!("invalid --pause-secs {}: {}", secs, err))?,
            None => profile.pause,
        };
        Ok(BatchSettings {
            out_dir: self
                .out_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(profile.out_dir)),
            prefix: self
                .prefix
                .clone()
                .unwrap_or_else(|| profile.prefix.to_owned()),
            separator_width: self.separator_width.unwrap_or(profile.separator_width),
            pause,
            resume: self.resume,
        })
    }
}

/// The `ocr` subcommand.
#[instrument(level = "debug", skip_all, fields(input = %opts.input_path.display()))]
pub async fn cmd_ocr(ui: Ui, opts: &OcrOpts) -> Result<()> {
    let settings = opts.batch_settings()?;

    // Fail before doing any work if the engine is missing.
    let engine = engine_for_opts(&opts.engine_opts).await?;
    let source = PdfPageSource::new(
        &opts.input_path,
        opts.page_iter_opts.clone(),
        engine.wants_rasterized_pages(),
    );

    let spinner = ui.new_spinner(&ProgressConfig {
        emoji: "🔍",
        msg: "Counting pages",
        done_msg: "Counted pages",
    });
    let total_pages = source.page_count().await?;
    spinner.finish_using_style();

    let batch_size = if opts.interactive {
        prompt_for_batch_size(&ui).await?
    } else {
        opts.batch_size.unwrap_or(opts.profile().batch_size)
    };
    let plans = plan_batches(total_pages, batch_size, opts.first_page, opts.max_pages)?;
    let pages_to_process = plans.iter().map(|plan| plan.page_count()).sum::<usize>();
    ui.display_message(
        "📦",
        &format!(
            "{} pages in {} batches of {} pages, using {}",
            pages_to_process,
            plans.len(),
            batch_size,
            engine.description()
        ),
    );

    if opts.interactive {
        ui.display_message(
            "⏱️",
            &format!(
                "Estimated time: {}-{} minutes",
                plans.len() * 2,
                plans.len() * 3
            ),
        );
        let answer = ui.prompt_line("🚀 Start batch processing? (y/N): ").await?;
        if !is_confirmation(&answer) {
            ui.display_message("❌", "Processing cancelled.");
            return Ok(());
        }
    }

    let summary = run_batches(&ui, &source, &engine, &plans, &settings).await?;
    report_summary(&ui, &summary, &settings);

    if summary.batches_written == 0 && summary.batches_failed > 0 {
        return Err(anyhow!("all {} batches failed", summary.batches_failed));
    }

    if opts.combine {
        let file_name = opts
            .input_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| opts.input_path.display().to_string());
        let header = CorpusHeader {
            source: format!("{file_name} ({total_pages} pages)"),
            method: engine.description(),
            processing: Some(format!("Batch processing ({batch_size} pages per batch)")),
        };
        let files = settings.existing_batch_files(&plans).await?;
        if files.is_empty() {
            return Err(anyhow!(
                "no batch files to combine in {:?}",
                settings.out_dir.display()
            ));
        }
        let (corpus, stats) = combine_batch_files(&files, &header).await?;
        tokio::fs::write(&opts.combined_path, corpus)
            .await
            .with_context(|| {
                format!("failed to write {:?}", opts.combined_path.display())
            })?;
        ui.display_message(
            "🔗",
            &format!(
                "Combined {} batch files ({} pages) into {}",
                stats.batches,
                stats.pages,
                opts.combined_path.display()
            ),
        );
    }
    Ok(())
}

/// Print what a run did.
fn report_summary(ui: &Ui, summary: &RunSummary, settings: &BatchSettings) {
    ui.display_message(
        "✅",
        &format!(
            "{} batches written, {} skipped, {} failed ({} pages, {} characters) in {}",
            summary.batches_written,
            summary.batches_skipped,
            summary.batches_failed,
            summary.pages_processed,
            format_thousands(summary.characters),
            settings.out_dir.display()
        ),
    );
    if !summary.empty_pages.is_empty() {
        ui.display_message(
            "⚠️",
            &format!("No text detected on pages {:?}", summary.empty_pages),
        );
    }
    if !summary.failed_pages.is_empty() {
        ui.display_message(
            "❌",
            &format!("Could not OCR pages {:?}", summary.failed_pages),
        );
    }
}

/// Ask the user to pick a batch size.
async fn prompt_for_batch_size(ui: &Ui) -> Result<usize> {
    ui.display_message(
        "📦",
        "Choose batch size:\n\
         1. Small batches (10 pages) - More control, slower\n\
         2. Medium batches (20 pages) - Balanced (recommended)\n\
         3. Large batches (30 pages) - Faster, less control\n\
         4. Custom batch size",
    );
    let choice = ui.prompt_line("Enter choice (1-4, default 2): ").await?;
    let custom = if choice == "4" {
        Some(ui.prompt_line("Enter custom batch size (5-50): ").await?)
    } else {
        None
    };
    let batch_size = batch_size_for_choice(&choice, custom.as_deref());
    let requested = custom.as_deref().and_then(|c| c.trim().parse::<usize>().ok());
    if custom.is_some() && requested != Some(batch_size) {
        ui.display_message(
            "⚠️",
            &format!(
                "Batch size adjusted to {DEFAULT_BATCH_SIZE} (recommended range: {MIN_PROMPT_BATCH_SIZE}-{MAX_PROMPT_BATCH_SIZE})"
            ),
        );
    }
    Ok(batch_size)
}

/// Turn a menu choice (and, for choice 4, the custom answer) into a batch
/// size. Anything unexpected gives the default.
fn batch_size_for_choice(choice: &str, custom: Option<&str>) -> usize {
    let size = match choice.trim() {
        "1" => 10,
        "" | "2" => 20,
        "3" => 30,
        "4" => custom
            .and_then(|custom| custom.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_BATCH_SIZE),
        _ => DEFAULT_BATCH_SIZE,
    };
    if (MIN_PROMPT_BATCH_SIZE..=MAX_PROMPT_BATCH_SIZE).contains(&size) {
        size
    } else {
        DEFAULT_BATCH_SIZE
    }
}

/// Did the user say yes?
fn is_confirmation(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
