//! Concatenate batch files into a single text corpus.

use chrono::{Local, NaiveDateTime};
use tokio::fs;

use crate::{
    batch::record::{PAGE_MARKER_PREFIX, parse_batch_file_name},
    prelude::*,
};

/// Width of the `====` rules around the header and footer.
const RULE_WIDTH: usize = 80;

/// Find the batch files in `dir`, in batch order.
///
/// When `prefix` is given, only batch files with that prefix are returned.
/// Files are ordered by their first page, then by batch number and name, so
/// batch files from separate runs over parts of one document interleave
/// correctly.
#[instrument(level = "debug", skip_all, fields(dir = %dir.display()))]
pub async fn find_batch_files(dir: &Path, prefix: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("batch directory {:?} not found", dir.display()))?;
    let mut found = vec![];
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed to read directory {:?}", dir.display()))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(parsed) = parse_batch_file_name(&name) else {
            trace!(name = %name, "Not a batch file");
            continue;
        };
        if prefix.is_some_and(|prefix| prefix != parsed.prefix) {
            continue;
        }
        found.push((parsed.first_page, parsed.batch_index, name, entry.path()));
    }
    if found.is_empty() {
        return Err(anyhow!("no batch files found in {:?}", dir.display()));
    }
    found.sort();
    Ok(found.into_iter().map(|(_, _, _, path)| path).collect())
}

/// Labels written to the corpus header.
#[derive(Clone, Debug)]
pub struct CorpusHeader {
    /// Where the text came from, like `scan.pdf (238 pages)`.
    pub source: String,
    /// How it was extracted, like `Tesseract OCR v5.5.0`.
    pub method: String,
    /// An optional description of the batching.
    pub processing: Option<String>,
}

/// Totals for a combined corpus.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CombineStats {
    /// Batch files found.
    pub batches: usize,
    /// Batch files that could not be read.
    pub batches_unreadable: usize,
    /// Page records in the corpus.
    pub pages: usize,
    /// Characters of batch file content.
    pub characters: usize,
}

impl CombineStats {
    /// Average characters per page, rounded down.
    pub fn average_per_page(&self) -> usize {
        self.characters.checked_div(self.pages).unwrap_or(0)
    }
}

/// Read `files` and build the combined corpus.
///
/// A file that can't be read is logged and left out.
#[instrument(level = "debug", skip_all, fields(files = files.len()))]
pub async fn combine_batch_files(
    files: &[PathBuf],
    header: &CorpusHeader,
) -> Result<(String, CombineStats)> {
    let mut contents = Vec::with_capacity(files.len());
    let mut unreadable = 0;
    for file in files {
        match fs::read_to_string(file).await {
            Ok(content) => {
                debug!(
                    file = %file.display(),
                    pages = count_page_markers(&content),
                    "Adding batch file"
                );
                contents.push(content);
            }
            Err(err) => {
                error!(file = %file.display(), "Cannot read batch file: {}", err);
                unreadable += 1;
            }
        }
    }
    let (corpus, mut stats) =
        render_corpus(header, Local::now().naive_local(), files.len(), &contents);
    stats.batches_unreadable = unreadable;
    Ok((corpus, stats))
}

/// Assemble header, batch contents and footer. `batches` counts every batch
/// file found, including any we could not read.
fn render_corpus(
    header: &CorpusHeader,
    generated: NaiveDateTime,
    batches: usize,
    contents: &[String],
) -> (String, CombineStats) {
    let rule = "=".repeat(RULE_WIDTH);
    let mut stats = CombineStats {
        batches,
        ..CombineStats::default()
    };

    let mut out = String::new();
    out.push_str("PDF TEXT EXTRACTION RESULTS\n");
    out.push_str(&format!("{rule}\n"));
    out.push_str(&format!(
        "Generated: {}\n",
        generated.format("%Y-%m-%d %H:%M:%S")
    ));
    out.push_str(&format!("Source: {}\n", header.source));
    out.push_str(&format!("Method: {}\n", header.method));
    if let Some(processing) = &header.processing {
        out.push_str(&format!("Processing: {processing}\n"));
    }
    out.push_str(&format!("Total batches: {batches}\n"));
    out.push_str(&format!("{rule}\n\n"));

    for content in contents {
        stats.pages += count_page_markers(content);
        stats.characters += content.chars().count();
        out.push_str(content);
    }

    out.push_str(&format!("\n{rule}\n"));
    out.push_str("END OF DOCUMENT\n");
    out.push_str(&format!("Total pages processed: {}\n", stats.pages));
    out.push_str(&format!(
        "Total characters extracted: {}\n",
        format_thousands(stats.characters)
    ));
    out.push_str(&format!(
        "Average characters per page: {}\n",
        format_thousands(stats.average_per_page())
    ));
    out.push_str(&format!("{rule}\n"));
    (out, stats)
}

/// Count the page records in some text.
pub fn count_page_markers(text: &str) -> usize {
    text.matches(PAGE_MARKER_PREFIX).count()
}

/// Format a number with `,` between groups of three digits.
pub fn format_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::batch::record::format_page_record;

    fn header() -> CorpusHeader {
        CorpusHeader {
            source: "scan.pdf (3 pages)".to_owned(),
            method: "Tesseract OCR v5.5.0".to_owned(),
            processing: None,
        }
    }

    fn generated() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap()
    }

    #[test]
    fn formats_thousands() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1000), "1,000");
        assert_eq!(format_thousands(1234567), "1,234,567");
    }

    #[test]
    fn counts_page_markers() {
        let text = format_page_record(1, "a", 50) + &format_page_record(2, "b", 50);
        assert_eq!(count_page_markers(&text), 2);
        assert_eq!(count_page_markers("no pages here"), 0);
    }

    #[test]
    fn renders_header_and_footer() {
        let contents = vec![
            format_page_record(1, "one", 50) + &format_page_record(2, "two", 50),
            format_page_record(3, "three", 50),
        ];
        let (corpus, stats) = render_corpus(&header(), generated(), contents.len(), &contents);

        let rule = "=".repeat(80);
        assert!(corpus.starts_with(&format!(
            "PDF TEXT EXTRACTION RESULTS\n{rule}\nGenerated: 2024-03-09 14:05:00\nSource: scan.pdf (3 pages)\nMethod: Tesseract OCR v5.5.0\nTotal batches: 2\n{rule}\n\n"
        )));
        assert!(corpus.contains(&contents[0]));
        assert!(corpus.ends_with(&format!(
            "\n{rule}\nEND OF DOCUMENT\nTotal pages processed: 3\nTotal characters extracted: {}\nAverage characters per page: {}\n{rule}\n",
            stats.characters,
            stats.characters / 3
        )));
        assert_eq!(stats.pages, 3);
        assert_eq!(
            stats.characters,
            contents.iter().map(|c| c.chars().count()).sum::<usize>()
        );
    }

    #[test]
    fn empty_corpus_has_zero_average() {
        let mut header = header();
        header.processing = Some("Small batch processing (10 pages per batch)".to_owned());
        let (corpus, stats) = render_corpus(&header, generated(), 0, &[]);
        assert_eq!(stats.average_per_page(), 0);
        assert!(corpus.contains("Processing: Small batch processing (10 pages per batch)\n"));
        assert!(corpus.contains("Average characters per page: 0\n"));
    }

    #[tokio::test]
    async fn finds_batch_files_in_batch_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for name in [
            "batch_010_pages_181-200.txt",
            "batch_002_pages_021-040.txt",
            "batch_001_pages_001-020.txt",
            "small_batch_001_pages_001-010.txt",
            "notes.txt",
        ] {
            std::fs::write(dir.path().join(name), "x")?;
        }

        let names = |paths: Vec<PathBuf>| {
            paths
                .iter()
                .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
        };
        assert_eq!(
            names(find_batch_files(dir.path(), Some("batch")).await?),
            vec![
                "batch_001_pages_001-020.txt",
                "batch_002_pages_021-040.txt",
                "batch_010_pages_181-200.txt",
            ]
        );
        assert_eq!(find_batch_files(dir.path(), None).await?.len(), 4);
        assert!(find_batch_files(dir.path(), Some("other")).await.is_err());
        assert!(
            find_batch_files(&dir.path().join("missing"), None)
                .await
                .is_err()
        );
        Ok(())
    }

    #[tokio::test]
    async fn batch_files_from_partial_runs_stay_in_page_order() -> Result<()> {
        use crate::batch::plan_batches;

        let dir = tempfile::tempdir()?;
        let mut plans = plan_batches(60, 20, 1, Some(40))?;
        plans.extend(plan_batches(60, 20, 41, None)?);
        for plan in &plans {
            std::fs::write(dir.path().join(plan.file_name("batch")), "x")?;
        }

        let names = find_batch_files(dir.path(), Some("batch"))
            .await?
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "batch_001_pages_001-020.txt",
                "batch_002_pages_021-040.txt",
                "batch_001_pages_041-060.txt",
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_files_are_skipped() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let good = dir.path().join("batch_001_pages_001-001.txt");
        std::fs::write(&good, format_page_record(1, "hello", 50))?;
        let missing = dir.path().join("batch_002_pages_002-002.txt");

        let (corpus, stats) = combine_batch_files(&[good, missing], &header()).await?;
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.batches_unreadable, 1);
        assert_eq!(stats.pages, 1);
        assert!(corpus.contains("Total batches: 2\n"));
        assert!(corpus.contains("--- Page 1 ---\nhello\n"));
        Ok(())
    }
}
