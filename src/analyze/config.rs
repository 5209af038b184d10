//! Configuration for content analysis.

use std::collections::BTreeSet;

use schemars::JsonSchema;

use crate::{async_utils::io::read_json_or_toml, prelude::*};

/// The built-in configuration, in TOML.
pub const DEFAULT_CONFIG_TOML: &str = include_str!("default_config.toml");

/// Keyword lists, patterns and thresholds used by `analyze`.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Pages with more trimmed characters than this are "substantial".
    pub substantial_threshold: usize,

    /// How many substantial pages to sample in the report.
    pub sample_pages: usize,

    /// How many characters of each sampled page to include.
    pub preview_chars: usize,

    /// Page type for pages that match no rule.
    pub fallback_page_type: String,

    /// Name extraction settings.
    pub names: NameConfig,

    /// Page classification rules, tried in order. The first match wins.
    pub page_types: Vec<PageTypeRule>,

    /// Keyword categories, counted case-insensitively.
    pub keyword_categories: Vec<KeywordCategory>,
}

/// How to find names in the text.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct NameConfig {
    /// Regular expressions matching a name.
    pub patterns: Vec<String>,

    /// Matches which are not names.
    #[serde(default)]
    pub false_positives: BTreeSet<String>,

    /// How many names to report.
    pub top: usize,

    /// Only report names seen at least this often.
    pub min_count: usize,
}

/// A page classification rule.
///
/// A rule matches a page if any keyword occurs in its lowercased text, or if
/// its trimmed text is shorter than `shorter_than` characters.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct PageTypeRule {
    /// The page type assigned by this rule.
    pub name: String,

    /// Lowercase substrings to look for.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Match pages with fewer trimmed characters than this.
    #[serde(default)]
    pub shorter_than: Option<usize>,
}

/// A named group of keywords.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct KeywordCategory {
    /// Category name, like `Places`.
    pub name: String,

    /// Keywords to count.
    pub keywords: Vec<String>,
}

impl AnalysisConfig {
    /// The built-in configuration.
    pub fn builtin() -> Result<Self> {
        let config: Self = toml::from_str(DEFAULT_CONFIG_TOML)
            .context("failed to parse built-in analysis configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML or JSON file, or use the built-in one.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let config: Self = read_json_or_toml(path).await?;
                config
                    .validate()
                    .with_context(|| format!("invalid configuration in {:?}", path))?;
                Ok(config)
            }
            None => Self::builtin(),
        }
    }

    /// Check for mistakes that would make the report meaningless.
    fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for rule in &self.page_types {
            if rule.keywords.is_empty() && rule.shorter_than.is_none() {
                return Err(anyhow!(
                    "page type {:?} needs `keywords` or `shorter_than`",
                    rule.name
                ));
            }
            if !seen.insert(rule.name.as_str()) {
                return Err(anyhow!("page type {:?} is defined twice", rule.name));
            }
        }
        if seen.contains(self.fallback_page_type.as_str()) {
            return Err(anyhow!(
                "fallback page type {:?} is also a rule",
                self.fallback_page_type
            ));
        }
        Ok(())
    }

    /// Every page type, in rule order, followed by the fallback.
    pub fn page_type_names(&self) -> impl Iterator<Item = &str> {
        self.page_types
            .iter()
            .map(|rule| rule.name.as_str())
            .chain(std::iter::once(self.fallback_page_type.as_str()))
    }
}
