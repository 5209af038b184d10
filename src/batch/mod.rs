//! The batch OCR pipeline.
//!
//! A document is split into contiguous page ranges ("batches"). Each batch is
//! rendered, OCRed one page at a time, and written to its own text file in a
//! single write, so an interrupted run leaves only complete batch files behind
//! (except for the one being written). Batches run one after another, with a
//! pause in between.

use std::{ops::RangeInclusive, sync::Arc, time::Duration};

use futures::StreamExt as _;
use indicatif::ProgressBar;
use tokio::fs;

use crate::{
    async_utils::{BoxedStream, blocking_iter_streams::BlockingIterStream},
    engines::{OcrEngine, OcrPageInput},
    page_iter::{Page, PageIter, PageIterOptions, get_document_page_count},
    prelude::*,
    ui::{ProgressConfig, Ui},
};

pub mod record;

use self::record::{FAILED_PAGE_MARKER, batch_file_name, format_page_record, recorded_text};

/// One planned batch: a contiguous, 1-based, inclusive page range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchPlan {
    /// 1-based batch number within this run.
    pub index: usize,
    /// Number of batches in this run.
    pub total: usize,
    /// First page of the batch.
    pub first_page: usize,
    /// Last page of the batch.
    pub last_page: usize,
}

impl BatchPlan {
    /// The pages in this batch.
    pub fn pages(&self) -> RangeInclusive<usize> {
        self.first_page..=self.last_page
    }

    /// How many pages are in this batch?
    pub fn page_count(&self) -> usize {
        self.last_page + 1 - self.first_page
    }

    /// The file name this batch is written to.
    pub fn file_name(&self, prefix: &str) -> String {
        batch_file_name(prefix, self.index, self.first_page, self.last_page)
    }
}

/// Split pages `first_page..` of a `total_pages` document into batches of
/// `batch_size` pages, processing at most `max_pages` pages.
pub fn plan_batches(
    total_pages: usize,
    batch_size: usize,
    first_page: usize,
    max_pages: Option<usize>,
) -> Result<Vec<BatchPlan>> {
    if batch_size == 0 {
        return Err(anyhow!("batch size must be at least 1"));
    }
    if first_page == 0 || first_page > total_pages {
        return Err(anyhow!(
            "first page {} is outside the document (pages 1-{})",
            first_page,
            total_pages
        ));
    }
    let mut last_page = total_pages;
    if let Some(max_pages) = max_pages {
        if max_pages == 0 {
            return Err(anyhow!("--max-pages must be at least 1"));
        }
        last_page = last_page.min(first_page + max_pages - 1);
    }

    let page_count = last_page + 1 - first_page;
    let total = page_count.div_ceil(batch_size);
    Ok((0..total)
        .map(|i| {
            let start = first_page + i * batch_size;
            BatchPlan {
                index: i + 1,
                total,
                first_page: start,
                last_page: (start + batch_size - 1).min(last_page),
            }
        })
        .collect())
}

/// Something that can count and render the pages of a document.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// How many pages does the document have?
    async fn page_count(&self) -> Result<usize>;

    /// Render the 1-based, inclusive range `pages`, in page order.
    async fn pages(&self, pages: RangeInclusive<usize>) -> Result<BoxedStream<Result<Page>>>;
}

/// A [`PageSource`] backed by a PDF (or image) on disk.
pub struct PdfPageSource {
    path: PathBuf,
    options: PageIterOptions,
    rasterize: bool,
}

impl PdfPageSource {
    /// Create a new source. When `rasterize` is false, pages are passed on as
    /// single-page PDFs.
    pub fn new(path: &Path, options: PageIterOptions, rasterize: bool) -> Self {
        Self {
            path: path.to_owned(),
            options,
            rasterize,
        }
    }
}

#[async_trait]
impl PageSource for PdfPageSource {
    async fn page_count(&self) -> Result<usize> {
        get_document_page_count(&self.path).await
    }

    async fn pages(&self, pages: RangeInclusive<usize>) -> Result<BoxedStream<Result<Page>>> {
        let page_iter =
            PageIter::from_path(&self.path, &self.options, self.rasterize, pages)
                .await
                .with_context(|| format!("failed to render pages of {:?}", self.path))?;
        for warning in page_iter.warnings() {
            warn!(path = %self.path.display(), "{}", warning);
        }
        Ok(BlockingIterStream::new(page_iter).boxed())
    }
}

/// Where and how batch files are written.
#[derive(Clone, Debug)]
pub struct BatchSettings {
    /// Directory for batch files. Created if missing.
    pub out_dir: PathBuf,
    /// File name prefix, like `batch` or `small_batch`.
    pub prefix: String,
    /// Width of the `-----` line after each page.
    pub separator_width: usize,
    /// How long to wait between batches.
    pub pause: Duration,
    /// Skip batches whose file already exists.
    pub resume: bool,
}

impl BatchSettings {
    /// The path a batch is written to.
    pub fn batch_path(&self, plan: &BatchPlan) -> PathBuf {
        self.out_dir.join(plan.file_name(&self.prefix))
    }

    /// The files of `plans` which exist, in plan order. This includes batches
    /// written by an earlier run and skipped with `resume`.
    pub async fn existing_batch_files(&self, plans: &[BatchPlan]) -> Result<Vec<PathBuf>> {
        let mut files = vec![];
        for plan in plans {
            let path = self.batch_path(plan);
            if fs::try_exists(&path)
                .await
                .with_context(|| format!("failed to check for {:?}", path.display()))?
            {
                files.push(path);
            }
        }
        Ok(files)
    }
}

/// The result of a successfully written batch.
#[derive(Clone, Debug)]
pub struct BatchOutcome {
    /// The batch file.
    pub path: PathBuf,
    /// Pages recorded in the file.
    pub pages: usize,
    /// Characters of OCR text, not counting markers or placeholders.
    pub characters: usize,
    /// Pages recorded as [`FAILED_PAGE_MARKER`].
    pub failed_pages: Vec<usize>,
    /// Pages recorded as having no text.
    pub empty_pages: Vec<usize>,
}

/// OCR one batch and write its file.
///
/// Page failures are recorded in the file and do not fail the batch. Failing
/// to render the batch, or to write the file, does.
#[instrument(level = "debug", skip_all, fields(batch = plan.index, first = plan.first_page, last = plan.last_page))]
pub async fn process_batch(
    source: &dyn PageSource,
    engine: &Arc<dyn OcrEngine>,
    plan: &BatchPlan,
    settings: &BatchSettings,
    pb: &ProgressBar,
) -> Result<BatchOutcome> {
    let mut pages = source.pages(plan.pages()).await?;
    let mut pending = None;

    let mut contents = String::new();
    let mut characters = 0;
    let mut failed_pages = vec![];
    let mut empty_pages = vec![];
    for page_number in plan.pages() {
        let text = match take_page(&mut pages, &mut pending, page_number).await {
            Ok(page) => engine
                .ocr_page(OcrPageInput { page_number, page })
                .await
                .map(|output| output.text),
            Err(err) => Err(err),
        };
        let text = match text {
            Ok(text) => {
                let trimmed_len = text.trim().chars().count();
                if trimmed_len == 0 {
                    warn!(page = page_number, "No text detected");
                    empty_pages.push(page_number);
                } else {
                    debug!(page = page_number, chars = trimmed_len, "OCRed page");
                    characters += text.chars().count();
                }
                recorded_text(&text).to_owned()
            }
            Err(err) => {
                warn!(page = page_number, "Could not OCR page: {:?}", err);
                failed_pages.push(page_number);
                FAILED_PAGE_MARKER.to_owned()
            }
        };
        contents.push_str(&format_page_record(
            page_number,
            &text,
            settings.separator_width,
        ));
        pb.inc(1);
    }

    let path = settings.batch_path(plan);
    fs::write(&path, contents)
        .await
        .with_context(|| format!("failed to write batch file {:?}", path.display()))?;
    Ok(BatchOutcome {
        path,
        pages: plan.page_count(),
        characters,
        failed_pages,
        empty_pages,
    })
}

/// Take page `page_number` from `pages`.
///
/// Pages carrying a later page number are held in `pending` until their turn,
/// so a page the renderer skipped doesn't shift the numbering of the rest.
async fn take_page(
    pages: &mut BoxedStream<Result<Page>>,
    pending: &mut Option<Page>,
    page_number: usize,
) -> Result<Page> {
    loop {
        let page = match pending.take() {
            Some(page) => page,
            None => match pages.next().await {
                Some(page) => page?,
                None => return Err(anyhow!("page was not rendered")),
            },
        };
        match page.page_number {
            Some(rendered) if rendered > page_number => {
                *pending = Some(page);
                return Err(anyhow!("page was not rendered"));
            }
            Some(rendered) if rendered < page_number => {
                warn!(page = rendered, expected = page_number, "Ignoring out-of-order page");
            }
            _ => return Ok(page),
        }
    }
}

/// Totals for a whole run.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    /// Batch files written by this run.
    pub batches_written: usize,
    /// Batches skipped because their file already existed.
    pub batches_skipped: usize,
    /// Batches that could not be rendered or written.
    pub batches_failed: usize,
    /// Pages recorded in the batch files written by this run.
    pub pages_processed: usize,
    /// Characters of OCR text in the batch files written by this run.
    pub characters: usize,
    /// Pages recorded as failed.
    pub failed_pages: Vec<usize>,
    /// Pages where OCR found no text.
    pub empty_pages: Vec<usize>,
    /// The batch files written by this run.
    pub files: Vec<PathBuf>,
}

/// Run every planned batch in order.
///
/// Only setup problems (like an unwritable output directory) are returned as
/// errors. A failed batch is logged and counted, and the run moves on.
#[instrument(level = "debug", skip_all, fields(batches = plans.len()))]
pub async fn run_batches(
    ui: &Ui,
    source: &dyn PageSource,
    engine: &Arc<dyn OcrEngine>,
    plans: &[BatchPlan],
    settings: &BatchSettings,
) -> Result<RunSummary> {
    fs::create_dir_all(&settings.out_dir)
        .await
        .with_context(|| {
            format!(
                "failed to create output directory {:?}",
                settings.out_dir.display()
            )
        })?;

    let total_pages = plans.iter().map(|plan| plan.page_count()).sum::<usize>();
    let pb = ui.new_progress_bar(
        &ProgressConfig {
            emoji: "📄",
            msg: "OCRing pages",
            done_msg: "OCRed pages",
        },
        total_pages as u64,
    );

    let mut summary = RunSummary::default();
    for (i, plan) in plans.iter().enumerate() {
        let path = settings.batch_path(plan);
        if settings.resume && fs::try_exists(&path).await.unwrap_or(false) {
            info!(
                batch = plan.index,
                path = %path.display(),
                "Batch file already exists, skipping"
            );
            summary.batches_skipped += 1;
            pb.inc(plan.page_count() as u64);
            continue;
        }

        info!(
            "Batch {}/{}: pages {}-{}",
            plan.index, plan.total, plan.first_page, plan.last_page
        );
        let position_before = pb.position();
        match process_batch(source, engine, plan, settings, &pb).await {
            Ok(outcome) => {
                info!(
                    batch = plan.index,
                    chars = outcome.characters,
                    path = %outcome.path.display(),
                    "Batch complete"
                );
                summary.batches_written += 1;
                summary.pages_processed += outcome.pages;
                summary.characters += outcome.characters;
                summary.failed_pages.extend(outcome.failed_pages);
                summary.empty_pages.extend(outcome.empty_pages);
                summary.files.push(outcome.path);
            }
            Err(err) => {
                error!(batch = plan.index, "Batch failed: {:?}", err);
                summary.batches_failed += 1;
                pb.set_position(position_before + plan.page_count() as u64);
            }
        }

        if i + 1 < plans.len() && !settings.pause.is_zero() {
            debug!("Pausing {:?} before next batch", settings.pause);
            tokio::time::sleep(settings.pause).await;
        }
    }
    pb.finish_using_style();
    Ok(summary)
}
