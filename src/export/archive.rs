//! The export envelope.

use std::cmp::Ordering;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::harvest::{Confidence, HarvestOutcome};
use crate::models::{FieldValue, Item, Template};

/// Everything one harvest run produced, ready for serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedArchive {
    pub source: String,
    pub collected_at: DateTime<Local>,
    pub count: usize,
    pub stats: RunStats,
    pub items: Vec<Item>,
}

/// Run counters carried alongside the items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    pub rounds: u32,
    pub confidence: Confidence,
    pub stop_reason: String,
    pub duplicates_seen: u64,
    pub dropped_no_identity: u64,
    pub eval_failures: u32,
    pub expansion_aborted: bool,
}

impl FeedArchive {
    /// Wrap a finished run. Items are sorted by the template's sort field
    /// here; the engine hands them over in admission order.
    pub fn new(template: &Template, outcome: HarvestOutcome) -> Self {
        let HarvestOutcome {
            mut items,
            rounds,
            confidence,
            stop_reason,
            duplicates_seen,
            dropped_no_identity,
            eval_failures,
            expansion_aborted,
        } = outcome;

        if let Some(field) = &template.sort_field {
            sort_items(&mut items, field, template.sort_descending);
        }

        Self {
            source: template.name.clone(),
            collected_at: Local::now(),
            count: items.len(),
            stats: RunStats {
                rounds,
                confidence,
                stop_reason,
                duplicates_seen,
                dropped_no_identity,
                eval_failures,
                expansion_aborted,
            },
            items,
        }
    }
}

/// Stable sort on one field. Counts compare numerically, everything else by
/// rendered text (ISO timestamps order correctly that way). Items missing
/// the field compare lowest, so a descending sort pushes them to the end.
fn sort_items(items: &mut [Item], field: &str, descending: bool) {
    items.sort_by(|a, b| {
        let ordering = match (a.field(field), b.field(field)) {
            (Some(FieldValue::Count(x)), Some(FieldValue::Count(y))) => x.cmp(y),
            (Some(x), Some(y)) => x.render().cmp(&y.render()),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::presets;
    use indexmap::IndexMap;

    fn timed_item(id: &str, time: Option<&str>) -> Item {
        let mut fields = IndexMap::new();
        fields.insert("id".to_string(), FieldValue::Text(id.to_string()));
        if let Some(time) = time {
            fields.insert("time".to_string(), FieldValue::Text(time.to_string()));
        }
        Item { index: 0, fields }
    }

    fn outcome(items: Vec<Item>) -> HarvestOutcome {
        HarvestOutcome {
            items,
            rounds: 4,
            confidence: Confidence::High,
            stop_reason: "at page bottom with every visible item accumulated".to_string(),
            duplicates_seen: 9,
            dropped_no_identity: 1,
            eval_failures: 0,
            expansion_aborted: false,
        }
    }

    #[test]
    fn sorts_by_time_descending_with_missing_last() {
        let template = presets::twitter(None);
        let archive = FeedArchive::new(
            &template,
            outcome(vec![
                timed_item("1", Some("2026-01-15T10:30:00.000Z")),
                timed_item("2", None),
                timed_item("3", Some("2026-03-02T08:00:00.000Z")),
                timed_item("4", Some("2025-12-31T23:59:00.000Z")),
            ]),
        );

        let ids: Vec<&str> = archive.items.iter().map(|i| i.text("id")).collect();
        assert_eq!(ids, ["3", "1", "4", "2"]);
        assert_eq!(archive.count, 4);
    }

    #[test]
    fn ascending_sort_respects_direction() {
        let mut template = presets::twitter(None);
        template.sort_descending = false;
        let archive = FeedArchive::new(
            &template,
            outcome(vec![
                timed_item("1", Some("2026-03-02T08:00:00.000Z")),
                timed_item("2", Some("2025-12-31T23:59:00.000Z")),
            ]),
        );

        let ids: Vec<&str> = archive.items.iter().map(|i| i.text("id")).collect();
        assert_eq!(ids, ["2", "1"]);
    }

    #[test]
    fn no_sort_field_keeps_admission_order() {
        let template = presets::github_issues();
        let archive = FeedArchive::new(
            &template,
            outcome(vec![timed_item("b", None), timed_item("a", None)]),
        );
        let ids: Vec<&str> = archive.items.iter().map(|i| i.text("id")).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn count_fields_sort_numerically() {
        let mut items = Vec::new();
        for (id, likes) in [("1", 9u64), ("2", 1_204), ("3", 87)] {
            let mut fields = IndexMap::new();
            fields.insert("id".to_string(), FieldValue::Text(id.to_string()));
            fields.insert("likes".to_string(), FieldValue::Count(likes));
            items.push(Item { index: 0, fields });
        }
        let mut template = presets::twitter(None);
        template.sort_field = Some("likes".to_string());

        let archive = FeedArchive::new(&template, outcome(items));
        let ids: Vec<&str> = archive.items.iter().map(|i| i.text("id")).collect();
        assert_eq!(ids, ["2", "3", "1"]);
    }

    #[test]
    fn envelope_shape_survives_serialization() {
        let template = presets::twitter(None);
        let archive = FeedArchive::new(
            &template,
            outcome(vec![timed_item("1", Some("2026-01-15T10:30:00.000Z"))]),
        );

        let json = serde_json::to_string_pretty(&archive).unwrap();
        let back: FeedArchive = serde_json::from_str(&json).unwrap();
        assert_eq!(back.source, "twitter");
        assert_eq!(back.count, 1);
        assert_eq!(back.stats.duplicates_seen, 9);
        assert_eq!(back.stats.confidence, Confidence::High);
        assert_eq!(back.items[0].text("id"), "1");
    }
}
