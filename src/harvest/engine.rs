// src/harvest/engine.rs
//! The round loop: expand, extract, merge, probe, decide, scroll.
//!
//! Identity is the backbone of incremental collection. Virtualization means
//! every extraction pass re-reads whatever happens to be rendered, so the
//! same item is seen many times and items admitted earlier may already be
//! unmounted. The engine dedupes on normalized identity, admits new items
//! through the template's transform and predicate pipeline, and asks the
//! oracle each round whether the feed is exhausted. Medium and low
//! confidence verdicts are not trusted immediately: they open a
//! confirmation window of extra quiet rounds that any fresh admission
//! cancels.

use indexmap::IndexMap;

use crate::error::Result;
use crate::models::{FieldValue, Item, RawItem, Template, TerminationPolicy};

use super::expand::ExpansionResolver;
use super::identity;
use super::oracle::{self, Confidence, SignalBundle};
use super::session::{FeedSession, ScrollSample};
use super::viewport::{self, VisibilitySnapshot};

/// Quiet rounds still get a progress line every this many rounds.
const PROGRESS_LOG_INTERVAL: u32 = 5;

/// Everything accumulated over a run, keyed by canonical identity.
///
/// Admission order is preserved; export sinks sort later if asked to.
#[derive(Debug, Default)]
pub(crate) struct CollectionState {
    pub items: IndexMap<String, Item>,
    pub round: u32,
    pub no_new_rounds: u32,
    pub stuck_rounds: u32,
    pub height_stable_rounds: u32,
    pub duplicates_seen: u64,
    pub dropped_no_identity: u64,
    pub eval_failures: u32,
    confirmation: Option<Confirmation>,
    prev_anchor: Option<String>,
    prev_page_height: Option<f64>,
}

/// A pending medium/low stop awaiting quiet rounds.
#[derive(Debug)]
struct Confirmation {
    remaining: u32,
    confidence: Confidence,
    reason: String,
}

impl CollectionState {
    /// Update per-round counters from this round's admissions and geometry.
    fn note_round(
        &mut self,
        admitted: usize,
        snapshot: &VisibilitySnapshot,
        policy: &TerminationPolicy,
    ) {
        if admitted > 0 {
            self.no_new_rounds = 0;
            // Fresh content cancels any pending stop.
            self.confirmation = None;
        } else {
            self.no_new_rounds += 1;
        }

        let height = snapshot.page_height;
        let stable = self
            .prev_page_height
            .is_some_and(|prev| (height - prev).abs() <= policy.height_stable_epsilon_px);
        self.height_stable_rounds = if stable {
            self.height_stable_rounds + 1
        } else {
            0
        };

        let growing = self
            .prev_page_height
            .is_none_or(|prev| height > prev + policy.height_stable_epsilon_px);
        let anchor_held = match (&self.prev_anchor, &snapshot.top_anchor) {
            (Some(prev), Some(current)) => prev == current,
            _ => false,
        };
        self.stuck_rounds = if anchor_held && !growing {
            self.stuck_rounds + 1
        } else {
            0
        };

        self.prev_anchor = snapshot.top_anchor.clone();
        self.prev_page_height = Some(height);
    }
}

/// Per-round admission accounting.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct RoundMerge {
    pub extracted: usize,
    pub admitted: usize,
    pub duplicates: usize,
    pub dropped: usize,
}

impl RoundMerge {
    /// Every extracted item was already accumulated.
    fn all_duplicates(&self) -> bool {
        self.extracted > 0 && self.duplicates == self.extracted
    }
}

/// Admit one extraction pass into the collection.
///
/// An item with a missing or empty identity cannot be deduped and is
/// dropped. A known identity is counted as a duplicate and skipped. New
/// identities get the template's transform chains in field declaration
/// order, then the predicate; the canonical identity is written back into
/// the identity field unless a transform chain claims that field.
pub(crate) fn merge(
    state: &mut CollectionState,
    template: &Template,
    raw_items: Vec<RawItem>,
) -> RoundMerge {
    let mut round = RoundMerge {
        extracted: raw_items.len(),
        ..RoundMerge::default()
    };

    for raw in raw_items {
        let key = raw
            .field(&template.identity_field)
            .map(identity::normalize)
            .unwrap_or_default();
        if key.is_empty() {
            round.dropped += 1;
            continue;
        }
        if state.items.contains_key(&key) {
            round.duplicates += 1;
            continue;
        }

        let mut fields = IndexMap::with_capacity(template.fields.len());
        for name in template.fields.keys() {
            let Some(raw_value) = raw.field(name) else {
                continue;
            };
            let mut value = FieldValue::Text(raw_value.to_string());
            if let Some(chain) = template.transforms.get(name) {
                for transform in chain {
                    value = transform.apply(value);
                }
            }
            fields.insert(name.clone(), value);
        }

        if !template.transforms.contains_key(&template.identity_field) {
            fields.insert(
                template.identity_field.clone(),
                FieldValue::Text(key.clone()),
            );
        }

        if let Some(predicate) = &template.predicate {
            if !predicate.keeps(&fields) {
                continue;
            }
        }

        state.items.insert(
            key,
            Item {
                index: raw.index,
                fields,
            },
        );
        round.admitted += 1;
    }

    state.duplicates_seen += round.duplicates as u64;
    state.dropped_no_identity += round.dropped as u64;
    round
}

/// Result of a completed run.
#[derive(Debug)]
pub struct HarvestOutcome {
    /// Accumulated items in admission order.
    pub items: Vec<Item>,
    pub rounds: u32,
    pub confidence: Confidence,
    pub stop_reason: String,
    pub duplicates_seen: u64,
    pub dropped_no_identity: u64,
    pub eval_failures: u32,
    pub expansion_aborted: bool,
}

/// Drives a `FeedSession` until the oracle (or an engine-level stop) says
/// the feed is exhausted.
pub struct Harvester<S: FeedSession> {
    session: S,
    template: Template,
    policy: TerminationPolicy,
}

impl<S: FeedSession> Harvester<S> {
    pub fn new(session: S, template: Template, policy: TerminationPolicy) -> Self {
        Self {
            session,
            template,
            policy,
        }
    }

    pub async fn run(mut self) -> Result<HarvestOutcome> {
        let mut state = CollectionState::default();
        let mut resolver = ExpansionResolver::new(&self.template, &self.policy);
        let mut last_scroll: Option<ScrollSample> = None;
        let round_cap = self.template.effective_round_cap();

        log::info!(
            "harvesting '{}' (round cap {round_cap}, floor {})",
            self.template.name,
            self.template.min_round_floor
        );

        let (confidence, stop_reason) = loop {
            state.round += 1;
            // The sample from the scroll that ended the previous round; the
            // first round has none, so bottom evidence cannot fire early.
            let scroll = last_scroll.take();

            if resolver.active() {
                let report = resolver.run_round(&mut self.session).await?;
                state.eval_failures += report.failures;
            }

            let raw_items = match self.session.extract().await {
                Ok(items) => items,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    log::warn!("round {}: extraction failed: {err}", state.round);
                    state.eval_failures += 1;
                    Vec::new()
                }
            };
            let merged = merge(&mut state, &self.template, raw_items);

            let (snapshot, probe_ok) = match self.session.probe().await {
                Ok(raw) => (viewport::snapshot(&raw, &self.policy), true),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    log::warn!("round {}: viewport probe failed: {err}", state.round);
                    state.eval_failures += 1;
                    (VisibilitySnapshot::default(), false)
                }
            };

            state.note_round(merged.admitted, &snapshot, &self.policy);

            if merged.admitted > 0 || state.round % PROGRESS_LOG_INTERVAL == 0 {
                log::info!(
                    "round {}: +{} item(s), {} total, {} rendered",
                    state.round,
                    merged.admitted,
                    state.items.len(),
                    snapshot.visible.len()
                );
            }

            if !self.template.scroll_enabled {
                break (
                    Confidence::High,
                    "single extraction pass (scrolling disabled)".to_string(),
                );
            }

            let coverage = viewport::coverage(&snapshot, &state.items);
            let bundle = SignalBundle {
                round: state.round,
                min_round_floor: self.template.min_round_floor,
                no_new_rounds: state.no_new_rounds,
                all_duplicates: merged.all_duplicates(),
                height_stable: state.height_stable_rounds >= 1,
                // A failed probe must not pass for an empty (covered) viewport.
                all_visible_accumulated: probe_ok && coverage.all_accumulated,
                visible_count: coverage.visible_count,
                hit_bottom: scroll.as_ref().is_some_and(|s| s.hit_bottom(&self.policy)),
                high_scroll_fraction: scroll
                    .as_ref()
                    .is_some_and(|s| s.scroll_fraction() >= self.policy.high_scroll_fraction),
                small_actual_scroll: scroll
                    .as_ref()
                    .is_some_and(|s| s.small_actual_scroll(&self.policy)),
                top_anchor_stuck: state.stuck_rounds >= self.policy.stuck_rounds,
                end_marker_seen: snapshot.end_marker_seen,
                loading_indicator_visible: snapshot.loading_indicator_visible,
            };
            let verdict = oracle::decide(&bundle, &self.policy);
            log::debug!(
                "round {}: verdict {} ({})",
                state.round,
                verdict.confidence,
                verdict.reason
            );

            if verdict.done && verdict.confidence == Confidence::High {
                break (verdict.confidence, verdict.reason);
            }

            if let Some(mut confirmation) = state.confirmation.take() {
                // Reached only on quiet rounds; admissions cleared the
                // window in note_round.
                confirmation.remaining = confirmation.remaining.saturating_sub(1);
                if confirmation.remaining == 0 {
                    let reason = format!(
                        "{} (confirmed over {} quiet rounds)",
                        confirmation.reason, self.policy.confirm_rounds
                    );
                    break (confirmation.confidence, reason);
                }
                state.confirmation = Some(confirmation);
            } else if verdict.done {
                log::info!(
                    "round {}: {} confidence stop pending confirmation ({})",
                    state.round,
                    verdict.confidence,
                    verdict.reason
                );
                state.confirmation = Some(Confirmation {
                    remaining: self.policy.confirm_rounds,
                    confidence: verdict.confidence,
                    reason: verdict.reason,
                });
            }

            if state.round >= round_cap {
                break (Confidence::None, format!("round cap {round_cap} reached"));
            }

            match self.session.scroll_to_bottom().await {
                Ok(sample) => last_scroll = Some(sample),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    log::warn!("round {}: scroll failed: {err}", state.round);
                    state.eval_failures += 1;
                }
            }
        };

        log::info!(
            "harvest of '{}' finished: {} item(s) in {} round(s), {confidence} confidence ({stop_reason})",
            self.template.name,
            state.items.len(),
            state.round
        );

        Ok(HarvestOutcome {
            items: state.items.into_values().collect(),
            rounds: state.round,
            confidence,
            stop_reason,
            duplicates_seen: state.duplicates_seen,
            dropped_no_identity: state.dropped_no_identity,
            eval_failures: state.eval_failures,
            expansion_aborted: resolver.aborted(),
        })
    }
}
