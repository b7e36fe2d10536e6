//! Extraction template structures.
//!
//! A template describes one feed: how to find its page, which containers are
//! items, which fields to pull out of each container, and how the harvest
//! loop should behave (expansion, scrolling, caps). Templates are TOML files
//! validated up front so a typo fails before a run starts, not twenty rounds
//! into one.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::item::FieldValue;

/// Stand-in for "no cap": round caps of zero are mapped to this bound so the
/// loop is always finite.
pub const UNBOUNDED_ROUND_CAP: u32 = 1_000_000;

/// Declarative description of one feed to harvest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Template name, used in log lines and export file names.
    pub name: String,

    /// Regex matched against open page URLs to locate the feed tab.
    pub url_pattern: String,

    /// CSS selector for one rendered item container.
    pub item_selector: String,

    /// Field name to CSS selector, evaluated relative to the container.
    /// Declaration order drives export column order.
    pub fields: IndexMap<String, String>,

    /// Field whose value carries the item's identity.
    #[serde(default = "defaults::identity_field")]
    pub identity_field: String,

    /// Selectors for truncation controls to click before extraction.
    #[serde(default)]
    pub expand_selectors: Vec<String>,

    /// Labels a control must carry to be clicked (case-insensitive).
    #[serde(default = "defaults::expand_labels")]
    pub expand_labels: Vec<String>,

    /// Containers whose nested controls must never be clicked
    /// (quoted/embedded items).
    #[serde(default)]
    pub quoted_container_selector: Option<String>,

    /// Path substring that marks a detail view. Expansion on a detail view
    /// would mutate the wrong list, so it aborts instead.
    #[serde(default = "defaults::detail_path_marker")]
    pub detail_path_marker: Option<String>,

    /// Settle time after an expansion pass, in milliseconds.
    #[serde(default = "defaults::expand_delay_ms")]
    pub expand_delay_ms: u64,

    /// Settle time after a scroll, in milliseconds.
    #[serde(default = "defaults::scroll_delay_ms")]
    pub scroll_delay_ms: u64,

    /// When false the harvest is a single extraction pass over whatever is
    /// currently rendered.
    #[serde(default = "defaults::scroll_enabled")]
    pub scroll_enabled: bool,

    /// Scroll this element instead of the window (feeds inside their own
    /// scroll container).
    #[serde(default)]
    pub scroll_selector: Option<String>,

    /// Maximum rounds before the run stops regardless of signals. Zero means
    /// unbounded.
    #[serde(default = "defaults::round_cap")]
    pub round_cap: u32,

    /// No termination verdict is accepted before this many rounds.
    #[serde(default = "defaults::min_round_floor")]
    pub min_round_floor: u32,

    /// Per-field transform chains, applied in declaration order at merge.
    #[serde(default)]
    pub transforms: IndexMap<String, Vec<FieldTransform>>,

    /// Optional keep/drop filter applied after transforms.
    #[serde(default)]
    pub predicate: Option<ItemPredicate>,

    /// Field to sort by at export time.
    #[serde(default)]
    pub sort_field: Option<String>,

    /// Sort direction for exports. Feeds are usually newest-first.
    #[serde(default = "defaults::sort_descending")]
    pub sort_descending: bool,

    /// Selectors whose presence signals the feed's real end (e.g. a
    /// "you're all caught up" banner).
    #[serde(default)]
    pub end_markers: Vec<String>,

    /// Selectors for in-flight loading indicators. A visible one vetoes
    /// low-confidence stops.
    #[serde(default)]
    pub loading_selectors: Vec<String>,
}

impl Template {
    /// Load a template from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Round cap with the unbounded sentinel resolved to a finite value.
    pub fn effective_round_cap(&self) -> u32 {
        if self.round_cap == 0 {
            UNBOUNDED_ROUND_CAP
        } else {
            self.round_cap
        }
    }

    /// Validate selectors, referenced fields, and numeric ranges.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::template("name is empty"));
        }
        if self.url_pattern.trim().is_empty() {
            return Err(AppError::template("url_pattern is empty"));
        }
        regex::Regex::new(&self.url_pattern)
            .map_err(|e| AppError::template(format!("url_pattern: {e}")))?;

        check_selector(&self.item_selector)?;
        if self.fields.is_empty() {
            return Err(AppError::template("no fields defined"));
        }
        for (name, selector) in &self.fields {
            check_selector(selector)
                .map_err(|e| AppError::template(format!("field '{name}': {e}")))?;
        }
        if !self.fields.contains_key(&self.identity_field) {
            return Err(AppError::template(format!(
                "identity_field '{}' is not a defined field",
                self.identity_field
            )));
        }

        for selector in &self.expand_selectors {
            check_selector(selector)?;
        }
        if let Some(selector) = &self.quoted_container_selector {
            check_selector(selector)?;
        }
        if let Some(selector) = &self.scroll_selector {
            check_selector(selector)?;
        }
        for selector in self.end_markers.iter().chain(&self.loading_selectors) {
            check_selector(selector)?;
        }

        if self.min_round_floor == 0 {
            return Err(AppError::template("min_round_floor must be > 0"));
        }
        if self.round_cap != 0 && self.round_cap < self.min_round_floor {
            return Err(AppError::template(format!(
                "round_cap {} is below min_round_floor {}",
                self.round_cap, self.min_round_floor
            )));
        }

        for field in self.transforms.keys() {
            if !self.fields.contains_key(field) {
                return Err(AppError::template(format!(
                    "transforms reference unknown field '{field}'"
                )));
            }
        }
        if let Some(predicate) = &self.predicate {
            predicate.validate(self)?;
        }
        if let Some(sort_field) = &self.sort_field {
            if !self.fields.contains_key(sort_field) {
                return Err(AppError::template(format!(
                    "sort_field '{sort_field}' is not a defined field"
                )));
            }
        }

        Ok(())
    }
}

/// Syntax-check a CSS selector without executing it. Selectors run inside
/// the remote page; this catches typos at load time.
fn check_selector(selector: &str) -> Result<()> {
    scraper::Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| AppError::selector(selector, e))
}

/// A pure, total transformation of one field value.
///
/// Transforms never fail: a value a transform does not apply to passes
/// through unchanged, and unparseable counts become zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldTransform {
    /// Strip leading/trailing whitespace.
    Trim,
    /// Collapse runs of whitespace (including newlines) to single spaces.
    CollapseWhitespace,
    /// Keep the first contiguous run of ASCII digits, or empty.
    ExtractDigits,
    /// Parse a human-formatted count ("5,231 likes") into a number.
    ParseCount,
    /// ASCII-insensitive lowercasing for stable matching.
    Lowercase,
    /// Cut the value at the first occurrence of a marker.
    DropAfter { marker: String },
    /// Remove a literal prefix when present.
    StripPrefix { prefix: String },
}

impl FieldTransform {
    /// Apply this transform. Non-text inputs pass through unchanged.
    pub fn apply(&self, value: FieldValue) -> FieldValue {
        let FieldValue::Text(text) = value else {
            return value;
        };
        match self {
            FieldTransform::Trim => FieldValue::Text(text.trim().to_string()),
            FieldTransform::CollapseWhitespace => {
                FieldValue::Text(text.split_whitespace().collect::<Vec<_>>().join(" "))
            }
            FieldTransform::ExtractDigits => FieldValue::Text(first_digit_run(&text)),
            FieldTransform::ParseCount => FieldValue::Count(parse_count(&text)),
            FieldTransform::Lowercase => FieldValue::Text(text.to_lowercase()),
            FieldTransform::DropAfter { marker } => match text.find(marker.as_str()) {
                Some(pos) => FieldValue::Text(text[..pos].to_string()),
                None => FieldValue::Text(text),
            },
            FieldTransform::StripPrefix { prefix } => match text.strip_prefix(prefix.as_str()) {
                Some(rest) => FieldValue::Text(rest.to_string()),
                None => FieldValue::Text(text),
            },
        }
    }
}

/// Parse a count out of display text: drop thousands separators, take the
/// first digit run. "5,231 likes" becomes 5231; no digits becomes 0.
fn parse_count(text: &str) -> u64 {
    first_digit_run(&text.replace(',', "")).parse().unwrap_or(0)
}

fn first_digit_run(text: &str) -> String {
    let start = match text.find(|c: char| c.is_ascii_digit()) {
        Some(pos) => pos,
        None => return String::new(),
    };
    text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect()
}

/// Keep/drop filter evaluated against a fully transformed item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemPredicate {
    /// Keep items whose count field is at least `min`.
    MinCount { field: String, min: u64 },
    /// Keep items whose field's text matches a regex.
    FieldMatches { field: String, pattern: String },
    /// Keep items whose field is present and non-empty.
    FieldNonEmpty { field: String },
}

impl ItemPredicate {
    fn validate(&self, template: &Template) -> Result<()> {
        let field = match self {
            ItemPredicate::MinCount { field, .. }
            | ItemPredicate::FieldMatches { field, .. }
            | ItemPredicate::FieldNonEmpty { field } => field,
        };
        if !template.fields.contains_key(field) {
            return Err(AppError::template(format!(
                "predicate references unknown field '{field}'"
            )));
        }
        if let ItemPredicate::FieldMatches { pattern, .. } = self {
            regex::Regex::new(pattern)
                .map_err(|e| AppError::template(format!("predicate pattern: {e}")))?;
        }
        Ok(())
    }

    /// Whether the item passes. Pattern validity is checked by
    /// `Template::validate`; a compile failure here drops the item.
    pub fn keeps(&self, fields: &IndexMap<String, FieldValue>) -> bool {
        match self {
            ItemPredicate::MinCount { field, min } => fields
                .get(field)
                .and_then(FieldValue::as_count)
                .is_some_and(|n| n >= *min),
            ItemPredicate::FieldMatches { field, pattern } => {
                let Some(value) = fields.get(field).and_then(FieldValue::as_text) else {
                    return false;
                };
                regex::Regex::new(pattern).is_ok_and(|re| re.is_match(value))
            }
            ItemPredicate::FieldNonEmpty { field } => match fields.get(field) {
                Some(FieldValue::Text(s)) => !s.trim().is_empty(),
                Some(_) => true,
                None => false,
            },
        }
    }
}

mod defaults {
    pub fn identity_field() -> String {
        "id".into()
    }
    pub fn expand_labels() -> Vec<String> {
        vec!["show more".into()]
    }
    pub fn detail_path_marker() -> Option<String> {
        Some("/status/".into())
    }
    pub fn expand_delay_ms() -> u64 {
        1_000
    }
    pub fn scroll_delay_ms() -> u64 {
        2_000
    }
    pub fn scroll_enabled() -> bool {
        true
    }
    pub fn round_cap() -> u32 {
        50
    }
    pub fn min_round_floor() -> u32 {
        3
    }
    pub fn sort_descending() -> bool {
        true
    }
}
