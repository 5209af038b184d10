//! An "OCR" engine that calls `pdftotext`.

use tokio::{fs, process::Command};

use crate::{
    async_utils::run_command,
    page_iter::PDF_MIME_TYPE,
    prelude::*,
};

use super::{OcrEngine, OcrPageInput, OcrPageOutput};

/// "OCR" engine wrapping the `pdftotext` CLI tool from `poppler-utils`.
///
/// This will miss any "non-searchable" text in a PDF, but sometimes you just
/// want cheap and fast.
#[non_exhaustive]
pub struct PdfToTextOcrEngine {}

impl PdfToTextOcrEngine {
    /// Create a new `pdftotext` engine.
    pub fn new() -> Self {
        Self {}
    }
}

#[async_trait]
impl OcrEngine for PdfToTextOcrEngine {
    fn wants_rasterized_pages(&self) -> bool {
        false
    }

    fn description(&self) -> String {
        "pdftotext (embedded text layer)".to_owned()
    }

    #[instrument(level = "debug", skip_all, fields(page = input.page_number))]
    async fn ocr_page(&self, input: OcrPageInput) -> Result<OcrPageOutput> {
        if input.page.mime_type != PDF_MIME_TYPE {
            return Err(anyhow!(
                "pdftotext only works with PDFs, not {}",
                input.page.mime_type
            ));
        }

        // Write our input to a temporary file.
        let tmpdir = tempfile::TempDir::with_prefix("pdftotext")?;
        let input_path = tmpdir.path().join("input.pdf");
        let output_path = tmpdir.path().join("output.txt");
        fs::write(&input_path, &input.page.data)
            .await
            .context("cannot write pdftotext input file")?;

        let mut cmd = Command::new("pdftotext");
        cmd.arg("-layout").arg(&input_path).arg(&output_path);
        run_command("pdftotext", &mut cmd, None).await?;

        let text = fs::read_to_string(&output_path)
            .await
            .context("cannot read pdftotext output file")?;
        Ok(OcrPageOutput { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_iter::Page;

    #[tokio::test]
    async fn rejects_images() {
        let engine = PdfToTextOcrEngine::new();
        let result = engine
            .ocr_page(OcrPageInput {
                page_number: 1,
                page: Page {
                    mime_type: "image/png".to_owned(),
                    data: vec![],
                    page_number: Some(1),
                },
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn extracts_text_layer() -> Result<()> {
        use crate::page_iter::{PageIter, PageIterOptions};

        let engine = PdfToTextOcrEngine::new();
        let pages = PageIter::from_path(
            Path::new("tests/fixtures/two_pages.pdf"),
            &PageIterOptions::default(),
            false,
            1..=2,
        )
        .await?
        .collect::<Result<Vec<_>>>()?;
        let mut texts = vec![];
        for (idx, page) in pages.into_iter().enumerate() {
            let output = engine
                .ocr_page(OcrPageInput {
                    page_number: idx + 1,
                    page,
                })
                .await?;
            texts.push(output.text);
        }
        assert!(texts[0].contains("Hello from page one"));
        assert!(texts[1].contains("Hello from page two"));
        Ok(())
    }
}
