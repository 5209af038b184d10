//! OCR engine interface.
//!
//! An engine turns one page into text. Engines that read images get rendered
//! PNG pages; engines that read PDFs get single-page PDFs.

use std::sync::Arc;

use clap::{Args, ValueEnum};

use crate::{page_iter::Page, prelude::*};

pub mod pdftotext;
pub mod tesseract;

/// Input record describing a page to OCR.
pub struct OcrPageInput {
    /// The 1-based page number within the document.
    pub page_number: usize,

    /// The page to OCR.
    pub page: Page,
}

/// Output record describing the result of OCRing a page.
pub struct OcrPageOutput {
    /// The raw text, exactly as the engine produced it. May be blank.
    pub text: String,
}

/// Interface to an OCR engine.
#[async_trait]
pub trait OcrEngine: Send + Sync + 'static {
    /// Should PDF pages be rendered to images before we see them?
    fn wants_rasterized_pages(&self) -> bool;

    /// A human-readable name for this engine, like `Tesseract OCR v5.3.0`.
    fn description(&self) -> String;

    /// OCR a single page.
    async fn ocr_page(&self, input: OcrPageInput) -> Result<OcrPageOutput>;
}

/// The engines we support.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum EngineKind {
    /// Render each page and run the `tesseract` CLI on it.
    #[default]
    Tesseract,
    /// Extract the existing text layer with `pdftotext`. Fast, but finds
    /// nothing in scanned pages.
    Pdftotext,
}

/// Command-line options for choosing and configuring an engine.
#[derive(Args, Clone, Debug)]
pub struct EngineOpts {
    /// OCR engine to use.
    #[clap(long, value_enum, default_value_t = EngineKind::Tesseract)]
    pub engine: EngineKind,

    /// Tesseract language(s), like `eng` or `eng+deu`.
    #[clap(long, default_value = "eng")]
    pub lang: String,

    /// Path to the `tesseract` binary.
    #[clap(long, env = "TESSERACT_CMD", default_value = "tesseract")]
    pub tesseract_cmd: PathBuf,
}

/// Create the engine selected by `opts`.
///
/// This fails early if the engine's external tool cannot be run, so that we
/// don't find out halfway through a long document.
pub async fn engine_for_opts(opts: &EngineOpts) -> Result<Arc<dyn OcrEngine>> {
    match opts.engine {
        EngineKind::Tesseract => Ok(Arc::new(
            tesseract::TesseractOcrEngine::new(&opts.tesseract_cmd, &opts.lang).await?,
        )),
        EngineKind::Pdftotext => Ok(Arc::new(pdftotext::PdfToTextOcrEngine::new())),
    }
}
