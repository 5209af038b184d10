//! The text layout of batch files.

use std::sync::LazyLock;

use regex::Regex;

/// Start of the marker line that opens every page record.
pub const PAGE_MARKER_PREFIX: &str = "--- Page ";

/// Recorded in place of text when OCR found nothing on a page.
pub const NO_TEXT_PLACEHOLDER: &str = "[NO TEXT DETECTED]";

/// Recorded in place of text when OCR failed for a page.
pub const FAILED_PAGE_MARKER: &str = "**COULD_NOT_OCR_PAGE**";

/// Separator width used by default.
pub const DEFAULT_SEPARATOR_WIDTH: usize = 50;

/// Separator width used by the small batch profile.
pub const SMALL_SEPARATOR_WIDTH: usize = 30;

/// Matches batch file names, e.g. `batch_003_pages_041-060.txt`.
static BATCH_FILE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?)_(\d+)_pages_(\d+)-(\d+)\.txt$").expect("failed to compile regex")
});

/// Format one page record.
///
/// ```text
///
/// --- Page 7 ---
/// <text>
/// --------------------------------------------------
/// ```
pub fn format_page_record(page_number: usize, text: &str, separator_width: usize) -> String {
    format!(
        "\n{PAGE_MARKER_PREFIX}{page_number} ---\n{text}\n{}\n",
        "-".repeat(separator_width)
    )
}

/// The text to record for a page, given raw OCR output. Blank output becomes
/// [`NO_TEXT_PLACEHOLDER`]; anything else is kept as-is.
pub fn recorded_text(raw: &str) -> &str {
    if raw.trim().is_empty() {
        NO_TEXT_PLACEHOLDER
    } else {
        raw
    }
}

/// The file name for a batch.
pub fn batch_file_name(
    prefix: &str,
    batch_index: usize,
    first_page: usize,
    last_page: usize,
) -> String {
    format!("{prefix}_{batch_index:03}_pages_{first_page:03}-{last_page:03}.txt")
}

/// The parts of a batch file name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchFileName {
    pub prefix: String,
    pub batch_index: usize,
    pub first_page: usize,
    pub last_page: usize,
}

/// Parse a batch file name written by [`batch_file_name`].
pub fn parse_batch_file_name(name: &str) -> Option<BatchFileName> {
    let caps = BATCH_FILE_REGEX.captures(name)?;
    Some(BatchFileName {
        prefix: caps[1].to_owned(),
        batch_index: caps[2].parse().ok()?,
        first_page: caps[3].parse().ok()?,
        last_page: caps[4].parse().ok()?,
    })
}
