// src/export/writers.rs
//! JSON, CSV, and Markdown output.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::DateTime;
use tokio::io::AsyncWriteExt;

use crate::error::Result;
use crate::models::{FieldTransform, FieldValue, Item, OutputConfig, Template};

use super::archive::FeedArchive;

/// Digest item listing stops here; the JSON envelope has everything.
const DIGEST_ITEM_LIMIT: usize = 100;
const DIGEST_LEAD_CHARS: usize = 50;
const DIGEST_TOP_ITEMS: usize = 10;

/// Write the enabled formats under the output directory as
/// `{source}_{YYYYmmdd_HHMMSS}.{ext}`. Returns the paths written.
pub async fn write_archive(
    archive: &FeedArchive,
    template: &Template,
    output: &OutputConfig,
) -> Result<Vec<PathBuf>> {
    let dir = output.directory.clone();
    tokio::fs::create_dir_all(&dir).await?;
    let stem = format!(
        "{}_{}",
        archive.source,
        archive.collected_at.format("%Y%m%d_%H%M%S")
    );

    let mut written = Vec::new();
    if output.json {
        let path = dir.join(format!("{stem}.json"));
        write_atomic(&path, &serde_json::to_vec_pretty(archive)?).await?;
        log::info!("wrote {} item(s) to {}", archive.count, path.display());
        written.push(path);
    }
    if output.csv {
        let path = dir.join(format!("{stem}.csv"));
        write_atomic(&path, render_csv(archive, template).as_bytes()).await?;
        log::info!("wrote CSV table to {}", path.display());
        written.push(path);
    }
    if output.markdown {
        let path = dir.join(format!("{stem}.md"));
        write_atomic(&path, render_markdown(archive, template).as_bytes()).await?;
        log::info!("wrote digest to {}", path.display());
        written.push(path);
    }
    if written.is_empty() {
        log::warn!("no output formats enabled; nothing written");
    }
    Ok(written)
}

/// Write to a temp file and rename over the target.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// CSV with `_index` plus the template's fields in declaration order.
pub fn render_csv(archive: &FeedArchive, template: &Template) -> String {
    let mut out = String::new();
    let columns: Vec<&str> = template.fields.keys().map(String::as_str).collect();

    push_row(
        &mut out,
        std::iter::once("_index".to_string()).chain(columns.iter().map(|c| c.to_string())),
    );
    for item in &archive.items {
        push_row(
            &mut out,
            std::iter::once(item.index.to_string())
                .chain(columns.iter().map(|c| item.render_field(c))),
        );
    }
    out
}

fn push_row(out: &mut String, cells: impl Iterator<Item = String>) {
    let mut first = true;
    for cell in cells {
        if !first {
            out.push(',');
        }
        first = false;
        if needs_quotes(&cell) {
            out.push('"');
            out.push_str(&cell.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(&cell);
        }
    }
    out.push('\n');
}

fn needs_quotes(cell: &str) -> bool {
    cell.contains(',') || cell.contains('"') || cell.contains('\n') || cell.contains('\r')
}

/// Human-readable digest: summary header, per-month distribution over the
/// sort field, top items by the first counted field, then the leading items.
pub fn render_markdown(archive: &FeedArchive, template: &Template) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", archive.source));
    out.push_str(&format!(
        "Collected: {}\n\n",
        archive.collected_at.to_rfc3339()
    ));
    out.push_str(&format!(
        "Items: {} ({} confidence: {})\n\n",
        archive.count, archive.stats.confidence, archive.stats.stop_reason
    ));

    if let Some(field) = template.sort_field.as_deref() {
        let months = monthly_distribution(&archive.items, field);
        if !months.is_empty() {
            out.push_str("## By month\n\n");
            for (month, count) in &months {
                out.push_str(&format!("- {month}: {count}\n"));
            }
            out.push('\n');
        }
    }

    if let Some(field) = count_field(template) {
        let mut ranked: Vec<&Item> = archive
            .items
            .iter()
            .filter(|item| item.field(field).and_then(FieldValue::as_count).is_some())
            .collect();
        if !ranked.is_empty() {
            ranked.sort_by(|a, b| b.count(field).cmp(&a.count(field)));
            out.push_str(&format!("## Top items by {field}\n\n"));
            for (rank, item) in ranked.iter().take(DIGEST_TOP_ITEMS).enumerate() {
                out.push_str(&format!(
                    "{}. {} ({})\n",
                    rank + 1,
                    lead(item),
                    item.count(field)
                ));
            }
            out.push('\n');
        }
    }

    for (position, item) in archive.items.iter().take(DIGEST_ITEM_LIMIT).enumerate() {
        out.push_str(&format!("### {}. {}\n\n", position + 1, lead(item)));
        for (name, value) in &item.fields {
            out.push_str(&format!("- **{name}**: {}\n", value.render()));
        }
        out.push('\n');
    }

    out
}

/// First field with a `parse_count` transform, the digest's ranking key.
fn count_field(template: &Template) -> Option<&str> {
    template
        .fields
        .keys()
        .find(|name| {
            template
                .transforms
                .get(*name)
                .is_some_and(|chain| chain.contains(&FieldTransform::ParseCount))
        })
        .map(String::as_str)
}

/// Title, else text, else empty; truncated for use as a heading.
fn lead(item: &Item) -> String {
    let source = match item.text("title") {
        "" => item.text("text"),
        title => title,
    };
    source.chars().take(DIGEST_LEAD_CHARS).collect()
}

fn monthly_distribution(items: &[Item], field: &str) -> BTreeMap<String, usize> {
    let mut months = BTreeMap::new();
    for item in items {
        let Some(value) = item.field(field).and_then(FieldValue::as_text) else {
            continue;
        };
        let Ok(when) = DateTime::parse_from_rfc3339(value) else {
            continue;
        };
        *months.entry(when.format("%Y-%m").to_string()).or_insert(0) += 1;
    }
    months
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::{Confidence, HarvestOutcome};
    use crate::models::presets;
    use indexmap::IndexMap;
    use tempfile::TempDir;

    fn item(id: &str, text: &str, time: &str, likes: u64) -> Item {
        let mut fields = IndexMap::new();
        fields.insert("id".to_string(), FieldValue::Text(id.to_string()));
        fields.insert("text".to_string(), FieldValue::Text(text.to_string()));
        fields.insert("time".to_string(), FieldValue::Text(time.to_string()));
        fields.insert("likes".to_string(), FieldValue::Count(likes));
        Item { index: 0, fields }
    }

    fn archive(items: Vec<Item>) -> FeedArchive {
        FeedArchive::new(
            &presets::twitter(None),
            HarvestOutcome {
                items,
                rounds: 5,
                confidence: Confidence::High,
                stop_reason: "at page bottom with every visible item accumulated".to_string(),
                duplicates_seen: 4,
                dropped_no_identity: 0,
                eval_failures: 0,
                expansion_aborted: false,
            },
        )
    }

    #[test]
    fn csv_header_follows_template_order() {
        let template = presets::twitter(None);
        let csv = render_csv(&archive(Vec::new()), &template);
        assert_eq!(
            csv.lines().next().unwrap(),
            "_index,id,text,time,author,likes,replies,retweets"
        );
    }

    #[test]
    fn csv_quotes_separators_quotes_and_newlines() {
        let template = presets::twitter(None);
        let items = vec![item(
            "1",
            "a, \"quoted\"\nsecond line",
            "2026-01-15T10:30:00.000Z",
            3,
        )];
        let csv = render_csv(&archive(items), &template);
        assert!(csv.contains("\"a, \"\"quoted\"\"\nsecond line\""));
        // The count renders bare.
        assert!(csv.contains(",3,"));
    }

    #[test]
    fn digest_has_months_top_items_and_truncated_leads() {
        let long_text = "x".repeat(80);
        let items = vec![
            item("1", &long_text, "2026-01-15T10:30:00.000Z", 9),
            item("2", "short", "2026-01-20T10:30:00.000Z", 1_204),
            item("3", "other", "2026-02-01T08:00:00.000Z", 87),
        ];
        let template = presets::twitter(None);
        let md = render_markdown(&archive(items), &template);

        assert!(md.starts_with("# twitter\n"));
        assert!(md.contains("- 2026-01: 2\n"));
        assert!(md.contains("- 2026-02: 1\n"));
        assert!(md.contains("## Top items by likes"));
        assert!(md.contains("1. short (1204)"));
        // Sorted newest-first, so the 80-char item heads entry 3, with its
        // lead clipped to 50. The field listing below it stays untruncated.
        assert!(md.contains(&format!("### 3. {}\n", "x".repeat(50))));
        assert!(md.contains(&format!("- **text**: {}\n", "x".repeat(80))));
    }

    #[test]
    fn digest_without_dates_or_counts_skips_those_sections() {
        let template = presets::github_issues();
        let mut fields = IndexMap::new();
        fields.insert("title".to_string(), FieldValue::Text("a bug".to_string()));
        fields.insert("number".to_string(), FieldValue::Text("12".to_string()));
        let archive = FeedArchive::new(
            &template,
            HarvestOutcome {
                items: vec![Item { index: 0, fields }],
                rounds: 1,
                confidence: Confidence::High,
                stop_reason: "single extraction pass (scrolling disabled)".to_string(),
                duplicates_seen: 0,
                dropped_no_identity: 0,
                eval_failures: 0,
                expansion_aborted: false,
            },
        );
        let md = render_markdown(&archive, &template);
        assert!(!md.contains("## By month"));
        assert!(!md.contains("## Top items"));
        assert!(md.contains("### 1. a bug"));
    }

    #[tokio::test]
    async fn writes_enabled_formats_and_cleans_temp_files() {
        let tmp = TempDir::new().unwrap();
        let template = presets::twitter(None);
        let output = OutputConfig {
            directory: tmp.path().to_path_buf(),
            json: true,
            csv: true,
            markdown: true,
        };
        let archive = archive(vec![item("1", "hello", "2026-01-15T10:30:00.000Z", 2)]);

        let written = write_archive(&archive, &template, &output).await.unwrap();
        assert_eq!(written.len(), 3);

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(tmp.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        assert_eq!(names.len(), 3);
        assert!(names.iter().all(|n| !n.ends_with(".tmp")));
        assert!(names.iter().any(|n| n.ends_with(".json")));
        assert!(names.iter().any(|n| n.ends_with(".csv")));
        assert!(names.iter().any(|n| n.ends_with(".md")));

        // The JSON file round-trips back into the envelope.
        let body = tokio::fs::read(&written[0]).await.unwrap();
        let back: FeedArchive = serde_json::from_slice(&body).unwrap();
        assert_eq!(back.count, 1);
        assert_eq!(back.items[0].text("text"), "hello");
    }

    #[tokio::test]
    async fn json_only_by_default() {
        let tmp = TempDir::new().unwrap();
        let template = presets::twitter(None);
        let output = OutputConfig {
            directory: tmp.path().to_path_buf(),
            ..OutputConfig::default()
        };
        let archive = archive(vec![item("1", "hi", "2026-01-15T10:30:00.000Z", 0)]);

        let written = write_archive(&archive, &template, &output).await.unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].extension().is_some_and(|e| e == "json"));
    }
}
