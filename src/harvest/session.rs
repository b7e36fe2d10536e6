//! The seam between the collection engine and the browser.
//!
//! The engine only ever talks to a [`FeedSession`]: four operations, each a
//! single round-trip into the page. The production implementation composes
//! scripts and evaluates them over DevTools; tests implement the trait with
//! scripted rounds and no browser at all.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::cdp::CdpSession;
use crate::error::{AppError, Result};
use crate::models::{RawItem, Template, TerminationPolicy};

use super::expand::ExpandOutcome;
use super::scripts;
use super::viewport::RawProbe;

/// Measurements bracketing one scroll action.
///
/// `pre_*` values are read just before the scroll is requested, `post_*`
/// after the settle delay, so the pair captures what the scroll actually
/// achieved rather than what was asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollSample {
    pub viewport_height: f64,
    pub pre_offset: f64,
    pub pre_height: f64,
    pub post_offset: f64,
    pub post_height: f64,
}

impl ScrollSample {
    /// Distance the scroll was asked to cover.
    pub fn requested_delta(&self) -> f64 {
        (self.pre_height - self.viewport_height - self.pre_offset).max(0.0)
    }

    /// Distance the viewport actually moved.
    pub fn actual_delta(&self) -> f64 {
        self.post_offset - self.pre_offset
    }

    /// Largest reachable offset after the scroll.
    pub fn max_offset(&self) -> f64 {
        (self.post_height - self.viewport_height).max(0.0)
    }

    /// How far down the page the viewport sits, in 0..=1.
    pub fn scroll_fraction(&self) -> f64 {
        let max = self.max_offset();
        if max <= 0.0 {
            // The whole page fits in the viewport.
            1.0
        } else {
            (self.post_offset / max).clamp(0.0, 1.0)
        }
    }

    /// A large requested move that barely moved: the feed gave no more room.
    pub fn small_actual_scroll(&self, policy: &TerminationPolicy) -> bool {
        self.requested_delta() > policy.small_scroll_px
            && self.actual_delta().abs() < policy.small_scroll_px
    }

    /// Whether this scroll ended at the feed's effective bottom.
    pub fn hit_bottom(&self, policy: &TerminationPolicy) -> bool {
        let at_max = self.post_offset >= self.max_offset() - policy.height_stable_epsilon_px;
        at_max || self.small_actual_scroll(policy)
    }
}

/// One page-driving session over a feed.
#[async_trait]
pub trait FeedSession {
    /// Run one expansion attempt for one selector.
    async fn expand_attempt(&mut self, selector: &str) -> Result<ExpandOutcome>;

    /// Extract every currently rendered item.
    async fn extract(&mut self) -> Result<Vec<RawItem>>;

    /// Read raw visibility geometry and page flags.
    async fn probe(&mut self) -> Result<RawProbe>;

    /// Scroll toward the bottom and report what the scroll achieved.
    async fn scroll_to_bottom(&mut self) -> Result<ScrollSample>;
}

/// Production session: scripts evaluated over a DevTools channel.
///
/// Owns the settle delays, so the engine itself never sleeps.
pub struct CdpFeedSession {
    session: CdpSession,
    extract_script: String,
    probe_script: String,
    scroll_begin_script: String,
    scroll_measure_script: String,
    expand_labels: Vec<String>,
    quoted_container: Option<String>,
    detail_marker: Option<String>,
    expand_delay: Duration,
    scroll_delay: Duration,
}

impl CdpFeedSession {
    pub fn new(session: CdpSession, template: &Template) -> Self {
        Self {
            session,
            extract_script: scripts::extract_script(template),
            probe_script: scripts::probe_script(template),
            scroll_begin_script: scripts::scroll_begin_script(template.scroll_selector.as_deref()),
            scroll_measure_script: scripts::scroll_measure_script(
                template.scroll_selector.as_deref(),
            ),
            expand_labels: template.expand_labels.clone(),
            quoted_container: template.quoted_container_selector.clone(),
            detail_marker: template.detail_path_marker.clone(),
            expand_delay: Duration::from_millis(template.expand_delay_ms),
            scroll_delay: Duration::from_millis(template.scroll_delay_ms),
        }
    }
}

#[async_trait]
impl FeedSession for CdpFeedSession {
    async fn expand_attempt(&mut self, selector: &str) -> Result<ExpandOutcome> {
        let script = scripts::expand_script(
            selector,
            &self.expand_labels,
            self.quoted_container.as_deref(),
            self.detail_marker.as_deref(),
        );
        let value = self.session.evaluate("expand", &script).await?;
        let outcome = parse_expand(&value);
        if let ExpandOutcome::Clicked(clicked) = outcome {
            if clicked > 0 {
                // Give reveal animations time to settle before re-querying.
                tokio::time::sleep(self.expand_delay).await;
            }
        }
        Ok(outcome)
    }

    async fn extract(&mut self) -> Result<Vec<RawItem>> {
        let value = self.session.evaluate("extract", &self.extract_script).await?;
        Ok(parse_extract(value))
    }

    async fn probe(&mut self) -> Result<RawProbe> {
        let value = self.session.evaluate("probe", &self.probe_script).await?;
        if value.is_null() {
            return Err(AppError::evaluate("probe", "scroll container not found"));
        }
        Ok(serde_json::from_value(value)?)
    }

    async fn scroll_to_bottom(&mut self) -> Result<ScrollSample> {
        let value = self
            .session
            .evaluate("scroll", &self.scroll_begin_script)
            .await?;
        if value.is_null() {
            return Err(AppError::evaluate("scroll", "scroll container not found"));
        }
        let begin: ScrollBegin = serde_json::from_value(value)?;

        tokio::time::sleep(self.scroll_delay).await;

        let value = self
            .session
            .evaluate("scroll-measure", &self.scroll_measure_script)
            .await?;
        if value.is_null() {
            return Err(AppError::evaluate("scroll", "scroll container not found"));
        }
        let measure: ScrollMeasure = serde_json::from_value(value)?;

        Ok(ScrollSample {
            viewport_height: begin.viewport_height,
            pre_offset: begin.pre_offset,
            pre_height: begin.pre_height,
            post_offset: measure.post_offset,
            post_height: measure.post_height,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ScrollBegin {
    #[serde(default)]
    pre_offset: f64,
    #[serde(default)]
    pre_height: f64,
    #[serde(default)]
    viewport_height: f64,
}

#[derive(Debug, Deserialize)]
struct ScrollMeasure {
    #[serde(default)]
    post_offset: f64,
    #[serde(default)]
    post_height: f64,
}

/// Interpret an expansion script's return value. The script yields -1 on a
/// detail view, otherwise a click count; anything else counts as zero.
fn parse_expand(value: &serde_json::Value) -> ExpandOutcome {
    let clicked = value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .unwrap_or(0);
    if clicked < 0 {
        ExpandOutcome::WrongContext
    } else {
        ExpandOutcome::Clicked(clicked as u64)
    }
}

/// Interpret an extraction script's return value. A non-array (the page
/// navigated away, or the script was cut off) degrades to an empty round;
/// malformed entries are skipped rather than poisoning the round.
fn parse_extract(value: serde_json::Value) -> Vec<RawItem> {
    let serde_json::Value::Array(entries) = value else {
        log::warn!("Extraction returned no item list; treating as empty round");
        return Vec::new();
    };
    let total = entries.len();
    let items: Vec<RawItem> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect();
    if items.len() < total {
        log::warn!("Skipped {} malformed extraction entries", total - items.len());
    }
    items
}
