//! Keyword and pattern analysis of extracted text.
//!
//! This is deliberately simple: regex name matching, substring keyword counts
//! and first-match page classification. It gives a quick overview of what a
//! long scanned document contains.

use std::collections::{BTreeMap, HashMap};

use regex::Regex;
use schemars::JsonSchema;
use tokio::fs;

use crate::{
    batch::record::PAGE_MARKER_PREFIX, combine::find_batch_files, prelude::*,
};

pub mod config;

pub use self::config::AnalysisConfig;

/// Split text into `(page_number, text)` records.
///
/// Each record runs from a `--- Page N ---` line to the next one. The
/// separator line after the page text, and anything following it (such as a
/// corpus footer), is dropped, and the text is trimmed.
pub fn parse_page_records(text: &str) -> Vec<(usize, String)> {
    text.split(PAGE_MARKER_PREFIX)
        .skip(1)
        .filter_map(|chunk| {
            let (first_line, body) = chunk.split_once('\n').unwrap_or((chunk, ""));
            let page_number = first_line.split(" ---").next()?.trim().parse::<usize>().ok()?;
            Some((page_number, strip_separator(body).trim().to_owned()))
        })
        .collect()
}

/// Cut `body` at its last separator line (three or more `-`).
fn strip_separator(body: &str) -> &str {
    let mut offset = 0;
    let mut cut = body.len();
    for line in body.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.len() >= 3 && trimmed.chars().all(|c| c == '-') {
            cut = offset;
        }
        offset += line.len();
    }
    &body[..cut]
}

/// Read page records from a combined corpus file, or from every batch file in
/// a directory.
#[instrument(level = "debug", skip_all, fields(input = %input.display()))]
pub async fn load_pages(input: &Path, prefix: Option<&str>) -> Result<Vec<(usize, String)>> {
    let metadata = fs::metadata(input)
        .await
        .with_context(|| format!("cannot find {:?}", input.display()))?;
    let mut pages = vec![];
    if metadata.is_dir() {
        for file in find_batch_files(input, prefix).await? {
            match fs::read_to_string(&file).await {
                Ok(text) => pages.extend(parse_page_records(&text)),
                Err(err) => error!(file = %file.display(), "Cannot read batch file: {}", err),
            }
        }
    } else {
        let text = fs::read_to_string(input)
            .await
            .with_context(|| format!("cannot read {:?}", input.display()))?;
        pages = parse_page_records(&text);
    }
    debug!(pages = pages.len(), "Loaded pages");
    Ok(pages)
}

/// A name and how often it was seen.
#[derive(Clone, Debug, JsonSchema, PartialEq, Serialize)]
pub struct NameCount {
    pub name: String,
    pub count: usize,
}

/// How many pages have a given type.
#[derive(Clone, Debug, JsonSchema, PartialEq, Serialize)]
pub struct PageTypeCount {
    pub page_type: String,
    pub pages: usize,
    /// Share of all pages, from 0 to 100.
    pub percent: f64,
}

/// Keyword counts for one category.
#[derive(Clone, Debug, JsonSchema, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    /// Sum of the keyword counts.
    pub total: usize,
    /// Occurrences of each keyword, in configuration order.
    pub keywords: Vec<KeywordCount>,
}

/// Occurrences of one keyword.
#[derive(Clone, Debug, JsonSchema, PartialEq, Serialize)]
pub struct KeywordCount {
    pub keyword: String,
    pub count: usize,
}

/// The analysis report.
#[derive(Clone, Debug, JsonSchema, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct AnalysisReport {
    /// Number of page records found.
    pub total_pages: usize,

    /// Number of pages with more than `substantial_threshold` characters.
    pub substantial_pages: usize,

    /// The first few substantial pages, as `[page_number, preview]`.
    pub sample_pages: Vec<(usize, String)>,

    /// The most frequently mentioned names.
    pub names: Vec<NameCount>,

    /// Page type distribution, in rule order.
    pub page_types: Vec<PageTypeCount>,

    /// Keyword counts by category.
    pub keyword_categories: Vec<CategoryCount>,
}

/// Pages grouped by type, keyed `<page_type>_pages`. Every page type is
/// present, even when it has no pages.
#[derive(Clone, Debug, Default, JsonSchema, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ContentIndex(pub BTreeMap<String, Vec<(usize, String)>>);

/// Runs an [`AnalysisConfig`] against page records.
pub struct Analyzer {
    config: AnalysisConfig,
    name_patterns: Vec<Regex>,
}

impl Analyzer {
    /// Compile the patterns in `config`.
    ///
    /// Page type keywords are matched against lowercased text, so they are
    /// lowercased here too.
    pub fn new(mut config: AnalysisConfig) -> Result<Self> {
        for rule in &mut config.page_types {
            for keyword in &mut rule.keywords {
                *keyword = keyword.to_lowercase();
            }
        }
        let name_patterns = config
            .names
            .patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .with_context(|| format!("invalid name pattern {:?}", pattern))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            config,
            name_patterns,
        })
    }

    /// Build the full report.
    #[instrument(level = "debug", skip_all, fields(pages = pages.len()))]
    pub fn analyze(&self, pages: &[(usize, String)]) -> AnalysisReport {
        let substantial = pages
            .iter()
            .filter(|(_, text)| text.trim().chars().count() > self.config.substantial_threshold)
            .collect::<Vec<_>>();
        let sample_pages = substantial
            .iter()
            .take(self.config.sample_pages)
            .map(|(page, text)| {
                (*page, text.chars().take(self.config.preview_chars).collect())
            })
            .collect();

        AnalysisReport {
            total_pages: pages.len(),
            substantial_pages: substantial.len(),
            sample_pages,
            names: self.count_names(pages),
            page_types: self.page_type_distribution(pages),
            keyword_categories: self.count_keywords(pages),
        }
    }

    /// Count name matches, most frequent first. Ties keep the order in which
    /// names were first seen.
    pub fn count_names(&self, pages: &[(usize, String)]) -> Vec<NameCount> {
        let names = &self.config.names;
        let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
        for (_, text) in pages {
            for pattern in &self.name_patterns {
                for m in pattern.find_iter(text) {
                    let name = m.as_str();
                    if names.false_positives.contains(name) {
                        continue;
                    }
                    let next_rank = counts.len();
                    counts.entry(name).or_insert((0, next_rank)).0 += 1;
                }
            }
        }
        let mut counts = counts.into_iter().collect::<Vec<_>>();
        counts.sort_by_key(|(_, (count, rank))| (std::cmp::Reverse(*count), *rank));
        counts
            .into_iter()
            .take(names.top)
            .filter(|(_, (count, _))| *count >= names.min_count)
            .map(|(name, (count, _))| NameCount {
                name: name.to_owned(),
                count,
            })
            .collect()
    }

    /// Classify one page.
    pub fn classify(&self, text: &str) -> &str {
        let lower = text.to_lowercase();
        let trimmed_len = text.trim().chars().count();
        self.config
            .page_types
            .iter()
            .find(|rule| {
                rule.keywords.iter().any(|kw| lower.contains(kw.as_str()))
                    || rule.shorter_than.is_some_and(|limit| trimmed_len < limit)
            })
            .map(|rule| rule.name.as_str())
            .unwrap_or(self.config.fallback_page_type.as_str())
    }

    /// Count pages of each type.
    pub fn page_type_distribution(&self, pages: &[(usize, String)]) -> Vec<PageTypeCount> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for (_, text) in pages {
            *counts.entry(self.classify(text)).or_default() += 1;
        }
        self.config
            .page_type_names()
            .map(|page_type| {
                let count = counts.get(page_type).copied().unwrap_or(0);
                PageTypeCount {
                    page_type: page_type.to_owned(),
                    pages: count,
                    percent: if pages.is_empty() {
                        0.0
                    } else {
                        count as f64 * 100.0 / pages.len() as f64
                    },
                }
            })
            .collect()
    }

    /// Count keyword occurrences across all pages.
    pub fn count_keywords(&self, pages: &[(usize, String)]) -> Vec<CategoryCount> {
        let full_text = pages
            .iter()
            .map(|(_, text)| text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        self.config
            .keyword_categories
            .iter()
            .map(|category| {
                let keywords = category
                    .keywords
                    .iter()
                    .map(|keyword| KeywordCount {
                        keyword: keyword.clone(),
                        count: full_text.matches(&keyword.to_lowercase()).count(),
                    })
                    .collect::<Vec<_>>();
                CategoryCount {
                    category: category.name.clone(),
                    total: keywords.iter().map(|k| k.count).sum(),
                    keywords,
                }
            })
            .collect()
    }

    /// Group pages by type.
    pub fn content_index(&self, pages: &[(usize, String)]) -> ContentIndex {
        let mut index = self
            .config
            .page_type_names()
            .map(|page_type| (format!("{page_type}_pages"), vec![]))
            .collect::<BTreeMap<_, _>>();
        for (page, text) in pages {
            let key = format!("{}_pages", self.classify(text));
            index.entry(key).or_default().push((*page, text.clone()));
        }
        ContentIndex(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::record::format_page_record;

    fn analyzer() -> Analyzer {
        Analyzer::new(AnalysisConfig::builtin().unwrap()).unwrap()
    }

    fn pages(texts: &[&str]) -> Vec<(usize, String)> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| (i + 1, text.to_string()))
            .collect()
    }

    #[test]
    fn parses_batch_file_records() {
        let text = format_page_record(7, "Dear Sir,\n\nThanks.\n", 50)
            + &format_page_record(8, "[NO TEXT DETECTED]", 30);
        assert_eq!(
            parse_page_records(&text),
            vec![
                (7, "Dear Sir,\n\nThanks.".to_owned()),
                (8, "[NO TEXT DETECTED]".to_owned()),
            ]
        );
    }

    #[test]
    fn parsing_drops_corpus_header_and_footer() {
        let rule = "=".repeat(80);
        let text = format!(
            "PDF TEXT EXTRACTION RESULTS\n{rule}\nTotal batches: 1\n{rule}\n\n{}\n{rule}\nEND OF DOCUMENT\n{rule}\n",
            format_page_record(1, "Only page", 50)
        );
        assert_eq!(parse_page_records(&text), vec![(1, "Only page".to_owned())]);
    }

    #[test]
    fn skips_records_without_page_numbers() {
        assert_eq!(parse_page_records("--- Page X ---\nhi\n"), vec![]);
        assert_eq!(parse_page_records("no markers"), vec![]);
    }

    #[test]
    fn classifies_pages_in_rule_order() {
        let analyzer = analyzer();
        assert_eq!(analyzer.classify("TABLE OF CONTENTS ... school"), "contents");
        assert_eq!(analyzer.classify("Call me on my phone at school"), "personal");
        assert_eq!(analyzer.classify("Graduation day"), "yearbook");
        // Keyword rules come before the length check.
        assert_eq!(analyzer.classify("short"), "empty");
        assert_eq!(analyzer.classify("[NO TEXT DETECTED]"), "empty");
        let letter = format!("HOUSE_OVERSIGHT_012345 {}", "lorem ipsum ".repeat(10));
        assert_eq!(analyzer.classify(&letter), "correspondence");
        assert_eq!(analyzer.classify(&"lorem ipsum ".repeat(10)), "other");
    }

    #[test]
    fn page_type_keywords_ignore_case() {
        let mut config = AnalysisConfig::builtin().unwrap();
        config.page_types[0].keywords = vec!["Table of Contents".to_owned()];
        let analyzer = Analyzer::new(config).unwrap();
        assert_eq!(analyzer.classify("TABLE OF CONTENTS\nChapter 1"), "contents");
        assert_eq!(analyzer.classify("table of contents\nChapter 1"), "contents");
    }

    #[test]
    fn counts_names_without_false_positives() {
        let analyzer = analyzer();
        let pages = pages(&[
            "John Smith met Mary Jones in Sea Gate.",
            "John Smith wrote to J. Edgar and Mary Jones.",
            "John Smith again. Contents Page.",
            "Only once: Peter Parker",
        ]);
        let names = analyzer.count_names(&pages);
        assert_eq!(
            names,
            vec![
                NameCount {
                    name: "John Smith".to_owned(),
                    count: 3
                },
                NameCount {
                    name: "Mary Jones".to_owned(),
                    count: 2
                },
            ]
        );
    }

    #[test]
    fn counts_keywords_case_insensitively() {
        let analyzer = analyzer();
        let pages = pages(&["Brooklyn, NEW YORK", "new york school", "The School Committee"]);
        let categories = analyzer.count_keywords(&pages);
        let places = categories.iter().find(|c| c.category == "Places").unwrap();
        assert_eq!(places.total, 3);
        assert_eq!(places.keywords[2].keyword, "new york");
        assert_eq!(places.keywords[2].count, 2);
        let institutions = categories
            .iter()
            .find(|c| c.category == "Institutions")
            .unwrap();
        assert_eq!(institutions.total, 2);
    }

    #[test]
    fn reports_substantial_pages_and_distribution() {
        let analyzer = analyzer();
        let long = "x".repeat(600);
        let pages = pages(&["contents", &long, "", &long]);
        let report = analyzer.analyze(&pages);
        assert_eq!(report.total_pages, 4);
        assert_eq!(report.substantial_pages, 2);
        assert_eq!(report.sample_pages.len(), 2);
        assert_eq!(report.sample_pages[0].0, 2);
        assert_eq!(report.sample_pages[0].1.len(), 500);

        let other = report
            .page_types
            .iter()
            .find(|t| t.page_type == "other")
            .unwrap();
        assert_eq!(other.pages, 2);
        assert_eq!(other.percent, 50.0);
        let total: usize = report.page_types.iter().map(|t| t.pages).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn empty_input_gives_empty_report() {
        let report = analyzer().analyze(&[]);
        assert_eq!(report.total_pages, 0);
        assert!(report.page_types.iter().all(|t| t.percent == 0.0));
    }

    #[test]
    fn content_index_has_every_page_type() {
        let analyzer = analyzer();
        let index = analyzer.content_index(&pages(&["Prologue", "tiny"]));
        assert_eq!(index.0.len(), 6);
        assert_eq!(index.0["contents_pages"], vec![(1, "Prologue".to_owned())]);
        assert_eq!(index.0["empty_pages"], vec![(2, "tiny".to_owned())]);
        assert!(index.0["other_pages"].is_empty());
    }

    #[tokio::test]
    async fn loads_pages_from_directory_and_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(
            dir.path().join("small_batch_002_pages_011-011.txt"),
            format_page_record(11, "eleven", 30),
        )?;
        std::fs::write(
            dir.path().join("small_batch_001_pages_001-001.txt"),
            format_page_record(1, "one", 30),
        )?;
        let from_dir = load_pages(dir.path(), None).await?;
        assert_eq!(
            from_dir,
            vec![(1, "one".to_owned()), (11, "eleven".to_owned())]
        );

        let file = dir.path().join("combined.txt");
        std::fs::write(&file, format_page_record(5, "five", 50))?;
        assert_eq!(load_pages(&file, None).await?, vec![(5, "five".to_owned())]);
        Ok(())
    }
}
