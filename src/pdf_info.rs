//! Basic facts about a PDF: metadata, page size and embedded images.
//!
//! Scanned PDFs usually consist of one big embedded image per page, so the
//! image listing is a quick way to tell whether a document needs OCR at all.

use std::{collections::BTreeMap, sync::LazyLock};

use regex::Regex;
use schemars::JsonSchema;
use tokio::process::Command;

use crate::{
    async_utils::run_command,
    page_iter::{page_count_from_properties, pdfinfo_properties},
    prelude::*,
};

/// Matches the `Page size` line of `pdfinfo`, e.g. `612 x 792 pts (letter)`.
static PAGE_SIZE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([\d.]+) x ([\d.]+) pts").expect("failed to compile regex")
});

/// Points per inch in PDF user space.
const POINTS_PER_INCH: f64 = 72.0;

/// Summary of a PDF file.
#[derive(Clone, Debug, JsonSchema, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct PdfInfo {
    /// The PDF path.
    pub path: PathBuf,

    /// Number of pages.
    pub pages: usize,

    /// PDF format version, like `1.4`.
    pub pdf_version: Option<String>,

    /// Document title.
    pub title: Option<String>,

    /// Document author.
    pub author: Option<String>,

    /// Document subject.
    pub subject: Option<String>,

    /// The application that created the original document.
    pub creator: Option<String>,

    /// The application that produced the PDF.
    pub producer: Option<String>,

    /// When the document was created.
    pub creation_date: Option<String>,

    /// When the document was last modified.
    pub modification_date: Option<String>,

    /// Size of the first page.
    pub page_size: Option<PageSize>,

    /// Embedded images found in the inspected pages.
    pub embedded_images: EmbeddedImages,
}

/// Page dimensions.
#[derive(Clone, Debug, JsonSchema, PartialEq, Serialize)]
pub struct PageSize {
    pub width_pts: f64,
    pub height_pts: f64,
    pub width_in: f64,
    pub height_in: f64,
}

/// Embedded image counts for a range of pages.
#[derive(Clone, Debug, Default, JsonSchema, PartialEq, Serialize)]
pub struct EmbeddedImages {
    /// How many pages we looked at.
    pub pages_inspected: usize,

    /// How many of those pages contain at least one image.
    pub pages_with_images: usize,

    /// Total number of images on the inspected pages.
    pub total_images: usize,

    /// Image count for each page with images.
    pub images_per_page: BTreeMap<usize, usize>,
}

impl PdfInfo {
    /// Gather information about the PDF at `path`, inspecting at most
    /// `image_pages` pages for embedded images.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn for_path(path: &Path, image_pages: usize) -> Result<Self> {
        let properties = pdfinfo_properties(path).await?;
        let pages = page_count_from_properties(path, &properties)?;
        let inspected = image_pages.min(pages);
        let embedded_images = if inspected > 0 {
            list_embedded_images(path, 1, inspected).await?
        } else {
            EmbeddedImages::default()
        };
        Ok(Self::from_properties(
            path,
            pages,
            &properties,
            embedded_images,
        ))
    }

    /// Build a [`PdfInfo`] from parsed `pdfinfo` output.
    fn from_properties(
        path: &Path,
        pages: usize,
        properties: &BTreeMap<String, String>,
        embedded_images: EmbeddedImages,
    ) -> Self {
        let get = |key: &str| {
            properties
                .get(key)
                .filter(|value| !value.is_empty())
                .cloned()
        };
        Self {
            path: path.to_owned(),
            pages,
            pdf_version: get("PDF version"),
            title: get("Title"),
            author: get("Author"),
            subject: get("Subject"),
            creator: get("Creator"),
            producer: get("Producer"),
            creation_date: get("CreationDate"),
            modification_date: get("ModDate"),
            page_size: properties
                .get("Page size")
                .and_then(|size| parse_page_size(size)),
            embedded_images,
        }
    }
}

/// Parse a `pdfinfo` page size.
fn parse_page_size(size: &str) -> Option<PageSize> {
    let caps = PAGE_SIZE_REGEX.captures(size)?;
    let width_pts = caps[1].parse::<f64>().ok()?;
    let height_pts = caps[2].parse::<f64>().ok()?;
    Some(PageSize {
        width_pts,
        height_pts,
        width_in: width_pts / POINTS_PER_INCH,
        height_in: height_pts / POINTS_PER_INCH,
    })
}

/// Count embedded images on pages `first..=last` using `pdfimages -list`.
pub async fn list_embedded_images(
    path: &Path,
    first: usize,
    last: usize,
) -> Result<EmbeddedImages> {
    let mut cmd = Command::new("pdfimages");
    cmd.arg("-list")
        .arg("-f")
        .arg(first.to_string())
        .arg("-l")
        .arg(last.to_string())
        .arg(path);
    let output = run_command("pdfimages", &mut cmd, None)
        .await
        .with_context(|| format!("failed to list images in {:?}", path.display()))?;
    let listing = String::from_utf8_lossy(&output.stdout);
    Ok(parse_image_listing(&listing, last + 1 - first))
}

/// Parse the table printed by `pdfimages -list`. The first two lines are a
/// header and a rule; every other line starts with a page number.
fn parse_image_listing(listing: &str, pages_inspected: usize) -> EmbeddedImages {
    let mut images_per_page = BTreeMap::new();
    for line in listing.lines().skip(2) {
        let Some(page) = line
            .split_whitespace()
            .next()
            .and_then(|page| page.parse::<usize>().ok())
        else {
            continue;
        };
        *images_per_page.entry(page).or_insert(0) += 1;
    }
    EmbeddedImages {
        pages_inspected,
        pages_with_images: images_per_page.len(),
        total_images: images_per_page.values().sum(),
        images_per_page,
    }
}
