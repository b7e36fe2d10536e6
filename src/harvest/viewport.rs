//! Visibility tracking over raw probe geometry.
//!
//! Virtualized feeds unmount items the moment they leave the render window,
//! so "what is rendered" is a sliding keyhole over the logical list. The
//! probe reports raw geometry; this module turns it into the visible
//! identity set and the top anchor, and answers the one question the
//! termination decision cares about: is anything on screen that we have not
//! accumulated?

use indexmap::IndexMap;
use serde::Deserialize;

use crate::models::{Item, TerminationPolicy};

use super::identity;

/// Raw geometry as returned by the probe script, before normalization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProbe {
    #[serde(default)]
    pub viewport_top: f64,

    #[serde(default)]
    pub viewport_height: f64,

    #[serde(default)]
    pub page_height: f64,

    #[serde(default)]
    pub items: Vec<RawProbeItem>,

    #[serde(default)]
    pub end_marker_seen: bool,

    #[serde(default)]
    pub loading_indicator_visible: bool,
}

/// One rendered item's identity value and vertical span.
#[derive(Debug, Clone, Deserialize)]
pub struct RawProbeItem {
    #[serde(default)]
    pub key: String,

    #[serde(default)]
    pub top: f64,

    #[serde(default)]
    pub bottom: f64,
}

/// What the viewport showed at one instant.
#[derive(Debug, Clone, Default)]
pub struct VisibilitySnapshot {
    /// Canonical identities overlapping the margin band, in DOM order.
    pub visible: Vec<String>,

    /// First item whose top edge sits in the anchor band, if any.
    pub top_anchor: Option<String>,

    pub viewport_top: f64,
    pub viewport_height: f64,
    pub page_height: f64,

    pub end_marker_seen: bool,
    pub loading_indicator_visible: bool,
}

/// Coverage of the visible set by the accumulated collection.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleCoverage {
    /// Every visible item is already accumulated. Vacuously true when
    /// nothing (with an identity) is visible.
    pub all_accumulated: bool,

    pub visible_count: usize,
    pub unharvested: usize,
}

/// Build a snapshot from raw probe geometry.
///
/// An item is visible when its span overlaps the viewport extended by the
/// configured margin; items whose identity normalizes to empty cannot be
/// matched against the collection and are skipped.
pub fn snapshot(raw: &RawProbe, policy: &TerminationPolicy) -> VisibilitySnapshot {
    let margin = policy.visibility_margin_px;
    let band_top = raw.viewport_top - margin;
    let band_bottom = raw.viewport_top + raw.viewport_height + margin;
    let anchor_limit = raw.viewport_top + raw.viewport_height * policy.top_anchor_band;

    let mut visible = Vec::new();
    let mut top_anchor = None;

    for item in &raw.items {
        let key = identity::normalize(&item.key);
        if key.is_empty() {
            continue;
        }
        let overlaps = item.bottom >= band_top && item.top <= band_bottom;
        if overlaps && !visible.contains(&key) {
            visible.push(key.clone());
        }
        if top_anchor.is_none() && item.top >= band_top && item.top <= anchor_limit {
            top_anchor = Some(key);
        }
    }

    VisibilitySnapshot {
        visible,
        top_anchor,
        viewport_top: raw.viewport_top,
        viewport_height: raw.viewport_height,
        page_height: raw.page_height,
        end_marker_seen: raw.end_marker_seen,
        loading_indicator_visible: raw.loading_indicator_visible,
    }
}

/// Compare the visible set against accumulated keys.
pub fn coverage(
    snapshot: &VisibilitySnapshot,
    accumulated: &IndexMap<String, Item>,
) -> VisibleCoverage {
    let unharvested = snapshot
        .visible
        .iter()
        .filter(|key| !accumulated.contains_key(key.as_str()))
        .count();
    VisibleCoverage {
        all_accumulated: unharvested == 0,
        visible_count: snapshot.visible.len(),
        unharvested,
    }
}
