//! Iterate over the pages of a PDF (or of a single image file).
//!
//! PDFs are split up by Poppler's command-line tools into one file per page in
//! a temporary directory, which we then read back in page order.

use std::{collections::BTreeMap, fs, ops::RangeInclusive, sync::LazyLock, vec};

use clap::Args;
use regex::Regex;
use tokio::process::Command;

use crate::{async_utils::run_command, prelude::*};

/// Image types we can hand to an OCR engine as-is.
const SUPPORTED_IMAGE_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/gif",
    "image/tiff",
];

/// MIME type of PDF files.
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Poppler prints errors to stderr without failing.
static ERROR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error").expect("failed to compile regex"));

static DOWNGRADE_TO_WARNING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)error: xref num").expect("failed to compile regex")
});

/// Does this line of Poppler output contain an error?
fn is_error_line(line: &str) -> bool {
    ERROR_REGEX.is_match(line) && !DOWNGRADE_TO_WARNING_REGEX.is_match(line)
}

/// Trailing page number in a file stem like `page-007` or `doc-12`.
static PAGE_SUFFIX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)$").expect("failed to compile regex"));

/// A single page, ready to be OCRed.
#[derive(Debug)]
pub struct Page {
    /// The MIME type of our data. Either one of [`SUPPORTED_IMAGE_TYPES`] or
    /// [`PDF_MIME_TYPE`] (when the engine wants unrasterized pages).
    pub mime_type: String,
    /// The data for our page.
    pub data: Vec<u8>,
    /// The 1-based page number, when known from the rendered file name.
    pub page_number: Option<usize>,
}

/// Options for constructing a [`PageIter`].
#[derive(Args, Clone, Debug)]
pub struct PageIterOptions {
    /// Resolution used to render PDF pages. The default is a 2x zoom of the
    /// 72 DPI PDF coordinate space.
    #[clap(long = "dpi", default_value = "144")]
    pub rasterize_dpi: u32,
}

impl Default for PageIterOptions {
    fn default() -> Self {
        Self { rasterize_dpi: 144 }
    }
}

/// An iterator over the pages of a document, backed by one file per page.
pub struct PageIter {
    /// An optional temporary directory, which holds extracted versions of
    /// pages. Released by [`Drop`].
    tmpdir: Option<tempfile::TempDir>,
    /// The MIME type of our outputs.
    mime_type: String,
    /// Page files, in page order.
    dir_iter: vec::IntoIter<PathBuf>,
    /// Number of page files we found.
    page_count: usize,
    /// Any warnings printed while splitting up the document.
    warnings: Vec<String>,
}

impl PageIter {
    /// Create a new [`PageIter`] over the 1-based, inclusive `pages` of the
    /// document at `path`.
    ///
    /// When `rasterize` is false, PDF pages are returned as single-page PDFs.
    /// Image files are always returned as-is, as a one-page document.
    #[instrument(level = "debug", skip_all, fields(path = %path.display(), first = pages.start(), last = pages.end()))]
    pub async fn from_path(
        path: &Path,
        options: &PageIterOptions,
        rasterize: bool,
        pages: RangeInclusive<usize>,
    ) -> Result<Self> {
        if *pages.start() == 0 || pages.is_empty() {
            return Err(anyhow!("invalid page range {:?}", pages));
        }

        let mime_type = get_mime_type(path)?;
        if SUPPORTED_IMAGE_TYPES.contains(&mime_type.as_str()) {
            if *pages.start() != 1 {
                return Err(anyhow!(
                    "{:?} is a single image, but pages {:?} were requested",
                    path.display(),
                    pages
                ));
            }
            Ok(Self {
                tmpdir: None,
                mime_type,
                dir_iter: vec![path.to_owned()].into_iter(),
                page_count: 1,
                warnings: vec![],
            })
        } else if mime_type == PDF_MIME_TYPE {
            if rasterize {
                Self::from_rasterized_pdf(path, options, pages).await
            } else {
                Self::from_split_pdf(path, pages).await
            }
        } else {
            Err(anyhow!(
                "unsupported MIME type {} for {:?} (supported: PDF, PNG, JPEG, WebP, GIF, TIFF)",
                mime_type,
                path.display()
            ))
        }
    }

    /// Split out each requested page as an individual PDF file.
    async fn from_split_pdf(path: &Path, pages: RangeInclusive<usize>) -> Result<Self> {
        let tmpdir = tempfile::TempDir::with_prefix("pages")?;
        let out_path = tmpdir.path().join("page-%d.pdf");
        let mut cmd = Command::new("pdfseparate");
        add_page_range_args(&pages, &mut cmd);
        cmd.arg(path).arg(out_path);
        let output = run_command("pdfseparate", &mut cmd, Some(&is_error_line))
            .await
            .with_context(|| format!("failed to split {:?}", path.display()))?;
        Self::from_tempdir(tmpdir, PDF_MIME_TYPE.to_owned(), &output)
    }

    /// Render each requested page to a PNG file.
    async fn from_rasterized_pdf(
        path: &Path,
        options: &PageIterOptions,
        pages: RangeInclusive<usize>,
    ) -> Result<Self> {
        let tmpdir = tempfile::TempDir::with_prefix("pages")?;
        // pdftocairo appends `-<page>.png` to this.
        let out_root = tmpdir.path().join("page");
        let mut cmd = Command::new("pdftocairo");
        cmd.arg("-png")
            .arg("-r")
            .arg(options.rasterize_dpi.to_string());
        add_page_range_args(&pages, &mut cmd);
        cmd.arg(path).arg(out_root);
        let output = run_command("pdftocairo", &mut cmd, Some(&is_error_line))
            .await
            .with_context(|| format!("failed to rasterize {:?}", path.display()))?;
        Self::from_tempdir(tmpdir, "image/png".to_owned(), &output)
    }

    /// Create a [`PageIter`] from a temporary directory full of page files.
    fn from_tempdir(
        tmpdir: tempfile::TempDir,
        mime_type: String,
        output: &std::process::Output,
    ) -> Result<Self> {
        let tmpdir_path = tmpdir.path();
        let mut dir_paths = tmpdir_path
            .read_dir()
            .with_context(|| {
                format!(
                    "failed to read temporary directory {:?}",
                    tmpdir_path.display()
                )
            })?
            .map(|entry| {
                let entry = entry.with_context(|| {
                    format!(
                        "failed to read entry in temporary directory {:?}",
                        tmpdir_path.display()
                    )
                })?;
                Ok(entry.path())
            })
            .collect::<Result<Vec<_>>>()?;
        // `pdfseparate` does not zero-pad, so sort numerically.
        dir_paths.sort_by_key(|path| page_file_sort_key(path));
        let page_count = dir_paths.len();

        let warnings = String::from_utf8_lossy(&output.stderr)
            .lines()
            .map(|line| line.trim().to_owned())
            .filter(|line| !line.is_empty())
            .collect();

        Ok(Self {
            tmpdir: Some(tmpdir),
            mime_type,
            dir_iter: dir_paths.into_iter(),
            page_count,
            warnings,
        })
    }

    /// How many pages will this iterator return in total?
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Get any warnings printed while splitting up the document.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

impl Drop for PageIter {
    fn drop(&mut self) {
        if let Some(tmpdir) = self.tmpdir.take() {
            let tmpdir_path = tmpdir.path().to_owned();
            if let Err(err) = tmpdir.close() {
                error!(
                    directory = ?tmpdir_path.display(),
                    "failed to delete temporary directory: {}",
                    err
                );
            }
        }
    }
}

impl Iterator for PageIter {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.dir_iter.next()?;
        let result =
            fs::read(&path).with_context(|| format!("failed to read file {:?}", path.display()));
        let data = match result {
            Ok(data) => data,
            Err(err) => return Some(Err(err)),
        };

        // Delete rendered pages as we go, so big documents don't fill the disk.
        if self.tmpdir.is_some()
            && let Err(err) = fs::remove_file(&path)
        {
            warn!(path = %path.display(), "failed to delete page file: {}", err);
        }

        let page_number = if self.tmpdir.is_some() {
            page_file_number(&path)
        } else {
            Some(1)
        };
        Some(Ok(Page {
            mime_type: self.mime_type.clone(),
            data,
            page_number,
        }))
    }
}

/// The page number at the end of a page file's stem, like `7` for `page-07.png`.
fn page_file_number(path: &Path) -> Option<usize> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| PAGE_SUFFIX_REGEX.captures(stem))
        .and_then(|caps| caps[1].parse::<usize>().ok())
}

/// Sort key for a page file: its page number, then its name.
fn page_file_sort_key(path: &Path) -> (usize, PathBuf) {
    let number = page_file_number(path).unwrap_or(usize::MAX);
    (number, path.to_owned())
}

/// Add `-f first -l last` to a Poppler command. Poppler page numbers are
/// 1-based and the range is inclusive.
fn add_page_range_args(pages: &RangeInclusive<usize>, cmd: &mut Command) {
    cmd.arg("-f")
        .arg(pages.start().to_string())
        .arg("-l")
        .arg(pages.end().to_string());
}

/// Run `pdfinfo` and parse its `Key: value` output.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn pdfinfo_properties(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut cmd = Command::new("pdfinfo");
    cmd.arg(path);
    let output = run_command("pdfinfo", &mut cmd, None)
        .await
        .with_context(|| format!("failed to run pdfinfo on {:?}", path.display()))?;
    let output =
        String::from_utf8(output.stdout).context("pdfinfo output was not valid UTF-8")?;
    Ok(parse_pdfinfo_output(&output))
}

/// Parse the `Key: value` lines printed by `pdfinfo`.
fn parse_pdfinfo_output(output: &str) -> BTreeMap<String, String> {
    output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_owned(), value.trim().to_owned()))
        .collect()
}

/// Get the number of pages in a PDF file.
pub async fn get_pdf_page_count(path: &Path) -> Result<usize> {
    let properties = pdfinfo_properties(path).await?;
    page_count_from_properties(path, &properties)
}

/// Get the page count from parsed `pdfinfo` output.
pub fn page_count_from_properties(
    path: &Path,
    properties: &BTreeMap<String, String>,
) -> Result<usize> {
    let page_count_str = properties
        .get("Pages")
        .ok_or_else(|| anyhow!("failed to find page count in pdfinfo output"))?;
    page_count_str.parse::<usize>().with_context(|| {
        format!(
            "failed to parse page count for {:?} from pdfinfo output",
            path.display()
        )
    })
}

/// Get the number of pages in a document: 1 for an image, the real count for
/// a PDF.
pub async fn get_document_page_count(path: &Path) -> Result<usize> {
    let mime_type = get_mime_type(path)?;
    if mime_type == PDF_MIME_TYPE {
        get_pdf_page_count(path).await
    } else if SUPPORTED_IMAGE_TYPES.contains(&mime_type.as_str()) {
        Ok(1)
    } else {
        Err(anyhow!(
            "unsupported MIME type {} for {:?}",
            mime_type,
            path.display()
        ))
    }
}

/// Get the MIME type of a file from its contents.
pub fn get_mime_type(path: &Path) -> Result<String> {
    Ok(infer::get_from_path(path)
        .with_context(|| format!("failed to get MIME type for {:?}", path.display()))?
        .ok_or_else(|| anyhow!("unknown MIME type for {:?}", path.display()))?
        .mime_type()
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    static TEST_PDF_PATH: &str = "tests/fixtures/two_pages.pdf";

    /// The first bytes of a PNG file, which is all `infer` needs.
    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn is_error_line_works() {
        assert!(is_error_line("error: something went wrong"));
        assert!(is_error_line("Syntax Error: Couldn't read xref table"));
        assert!(!is_error_line("Syntax Warning: something is odd"));
        assert!(!is_error_line(
            "Internal Error: xref num 1234 not found but needed, document has changes, reconstruct aborted"
        ));
    }

    #[test]
    fn page_files_sort_numerically() {
        let mut paths = vec![
            PathBuf::from("/tmp/page-10.pdf"),
            PathBuf::from("/tmp/page-2.pdf"),
            PathBuf::from("/tmp/page-1.pdf"),
        ];
        paths.sort_by_key(|path| page_file_sort_key(path));
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/tmp/page-1.pdf"),
                PathBuf::from("/tmp/page-2.pdf"),
                PathBuf::from("/tmp/page-10.pdf"),
            ]
        );
    }

    #[test]
    fn page_numbers_come_from_file_names() {
        assert_eq!(page_file_number(Path::new("/tmp/page-07.png")), Some(7));
        assert_eq!(page_file_number(Path::new("/tmp/page-12.pdf")), Some(12));
        assert_eq!(page_file_number(Path::new("/tmp/cover.png")), None);
    }

    #[test]
    fn parses_pdfinfo_output() {
        let output = "Title:          Request No. 1\nPages:          238\nPage size:      612 x 792 pts (letter)\n";
        let properties = parse_pdfinfo_output(output);
        assert_eq!(properties["Title"], "Request No. 1");
        assert_eq!(properties["Pages"], "238");
        assert_eq!(properties["Page size"], "612 x 792 pts (letter)");
    }

    #[tokio::test]
    async fn image_is_a_single_page() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("scan.png");
        fs::write(&path, PNG_MAGIC)?;

        assert_eq!(get_document_page_count(&path).await?, 1);
        let pages = PageIter::from_path(&path, &PageIterOptions::default(), true, 1..=1)
            .await?
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].mime_type, "image/png");
        assert_eq!(pages[0].data, PNG_MAGIC);
        assert_eq!(pages[0].page_number, Some(1));

        // The original image must not be deleted.
        assert!(path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn rejects_unsupported_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("notes.txt");
        fs::write(&path, "just some text")?;
        assert!(
            PageIter::from_path(&path, &PageIterOptions::default(), true, 1..=1)
                .await
                .is_err()
        );
        Ok(())
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn page_count_returns_correct_number_of_pages() -> Result<()> {
        let page_count = get_pdf_page_count(Path::new(TEST_PDF_PATH)).await?;
        assert_eq!(page_count, 2);
        Ok(())
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn rasterized_range_returns_requested_pages() -> Result<()> {
        let page_iter = PageIter::from_path(
            Path::new(TEST_PDF_PATH),
            &PageIterOptions::default(),
            true,
            2..=2,
        )
        .await?;
        assert_eq!(page_iter.page_count(), 1);
        let pages = page_iter.collect::<Result<Vec<_>>>()?;
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].mime_type, "image/png");
        assert_eq!(pages[0].page_number, Some(2));
        Ok(())
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn split_pdf_returns_pdf_pages() -> Result<()> {
        let pages = PageIter::from_path(
            Path::new(TEST_PDF_PATH),
            &PageIterOptions::default(),
            false,
            1..=2,
        )
        .await?
        .collect::<Result<Vec<_>>>()?;
        assert_eq!(pages.len(), 2);
        assert!(pages.iter().all(|page| page.mime_type == PDF_MIME_TYPE));
        Ok(())
    }
}
