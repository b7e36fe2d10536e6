// src/harvest/oracle.rs
//! Multi-signal termination oracle.
//!
//! No single signal is trustworthy on a virtualized feed: the page height
//! lies while content is recycled, "no new items" happens whenever loading
//! is slow, and the scroll offset saturates early on short pages. The oracle
//! therefore grades agreement between independent signals into a confidence
//! level and leaves the final call (stop now vs. confirm first) to the
//! engine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::TerminationPolicy;

/// How sure the oracle is that the feed is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    None,
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Confidence::None => "none",
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        };
        f.write_str(label)
    }
}

/// The oracle's answer for one round.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub done: bool,
    pub confidence: Confidence,
    pub reason: String,
}

impl Verdict {
    fn stop(confidence: Confidence, reason: impl Into<String>) -> Self {
        Self {
            done: true,
            confidence,
            reason: reason.into(),
        }
    }

    fn keep_going(reason: impl Into<String>) -> Self {
        Self {
            done: false,
            confidence: Confidence::None,
            reason: reason.into(),
        }
    }
}

/// Everything the oracle looks at, gathered by the engine each round.
#[derive(Debug, Clone)]
pub struct SignalBundle {
    pub round: u32,
    pub min_round_floor: u32,
    pub no_new_rounds: u32,
    pub all_duplicates: bool,
    pub height_stable: bool,
    pub all_visible_accumulated: bool,
    pub visible_count: usize,
    pub hit_bottom: bool,
    pub high_scroll_fraction: bool,
    pub small_actual_scroll: bool,
    pub top_anchor_stuck: bool,
    pub end_marker_seen: bool,
    pub loading_indicator_visible: bool,
}

/// Grade the round's signals. First matching rule wins.
pub fn decide(bundle: &SignalBundle, policy: &TerminationPolicy) -> Verdict {
    if bundle.round < bundle.min_round_floor {
        return Verdict::keep_going(format!(
            "round {} below floor {}",
            bundle.round, bundle.min_round_floor
        ));
    }

    // A small render set early in the run usually means virtualization has
    // not filled the window yet, not that the feed is short.
    let suspicious = bundle.visible_count < policy.min_trusted_visible
        && bundle.round < policy.early_round_horizon;

    if bundle.hit_bottom
        && bundle.all_visible_accumulated
        && (bundle.high_scroll_fraction || bundle.small_actual_scroll)
    {
        return Verdict::stop(
            Confidence::High,
            "at page bottom with every visible item accumulated",
        );
    }

    if bundle.end_marker_seen && bundle.no_new_rounds >= policy.no_new_low_rounds {
        return Verdict::stop(
            Confidence::High,
            format!(
                "end-of-feed marker visible after {} quiet rounds",
                bundle.no_new_rounds
            ),
        );
    }

    if bundle.no_new_rounds >= policy.no_new_medium_rounds
        && bundle.all_visible_accumulated
        && bundle.height_stable
        && !suspicious
    {
        return Verdict::stop(
            Confidence::Medium,
            format!(
                "{} rounds without new items, stable height, all visible accumulated",
                bundle.no_new_rounds
            ),
        );
    }

    let weak = weak_signals(bundle, policy);
    if weak >= policy.low_signal_quorum && !bundle.loading_indicator_visible && !suspicious {
        return Verdict::stop(Confidence::Low, format!("{weak} weak signals agree"));
    }

    Verdict::keep_going(format!("{weak} of 6 weak signals"))
}

fn weak_signals(bundle: &SignalBundle, policy: &TerminationPolicy) -> usize {
    [
        bundle.no_new_rounds >= policy.no_new_low_rounds,
        bundle.all_duplicates,
        bundle.height_stable,
        bundle.high_scroll_fraction,
        bundle.top_anchor_stuck,
        bundle.all_visible_accumulated,
    ]
    .into_iter()
    .filter(|signal| *signal)
    .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A mid-run round with nothing suggesting the feed has ended.
    fn quiet() -> SignalBundle {
        SignalBundle {
            round: 10,
            min_round_floor: 3,
            no_new_rounds: 0,
            all_duplicates: false,
            height_stable: false,
            all_visible_accumulated: false,
            visible_count: 8,
            hit_bottom: false,
            high_scroll_fraction: false,
            small_actual_scroll: false,
            top_anchor_stuck: false,
            end_marker_seen: false,
            loading_indicator_visible: false,
        }
    }

    fn saturated() -> SignalBundle {
        SignalBundle {
            no_new_rounds: 4,
            all_duplicates: true,
            height_stable: true,
            all_visible_accumulated: true,
            hit_bottom: true,
            high_scroll_fraction: true,
            top_anchor_stuck: true,
            ..quiet()
        }
    }

    #[test]
    fn floor_blocks_even_perfect_signals() {
        let policy = TerminationPolicy::default();
        let bundle = SignalBundle {
            round: 2,
            ..saturated()
        };
        let verdict = decide(&bundle, &policy);
        assert!(!verdict.done);
        assert_eq!(verdict.confidence, Confidence::None);
        assert!(verdict.reason.contains("below floor"));
    }

    #[test]
    fn bottom_with_full_coverage_is_high() {
        let policy = TerminationPolicy::default();
        let bundle = SignalBundle {
            hit_bottom: true,
            all_visible_accumulated: true,
            high_scroll_fraction: true,
            ..quiet()
        };
        let verdict = decide(&bundle, &policy);
        assert!(verdict.done);
        assert_eq!(verdict.confidence, Confidence::High);
    }

    #[test]
    fn pinned_scroll_counts_as_bottom_evidence() {
        let policy = TerminationPolicy::default();
        // Offset saturated short of a high fraction, but the page refuses
        // to move: still high confidence.
        let bundle = SignalBundle {
            hit_bottom: true,
            all_visible_accumulated: true,
            small_actual_scroll: true,
            ..quiet()
        };
        assert_eq!(decide(&bundle, &policy).confidence, Confidence::High);
    }

    #[test]
    fn bottom_without_coverage_is_not_high() {
        let policy = TerminationPolicy::default();
        let bundle = SignalBundle {
            hit_bottom: true,
            high_scroll_fraction: true,
            ..quiet()
        };
        let verdict = decide(&bundle, &policy);
        assert!(!verdict.done);
    }

    #[test]
    fn end_marker_needs_quiet_rounds() {
        let policy = TerminationPolicy::default();
        let early = SignalBundle {
            end_marker_seen: true,
            no_new_rounds: 1,
            ..quiet()
        };
        assert!(!decide(&early, &policy).done);

        let settled = SignalBundle {
            end_marker_seen: true,
            no_new_rounds: 2,
            ..quiet()
        };
        let verdict = decide(&settled, &policy);
        assert_eq!(verdict.confidence, Confidence::High);
        assert!(verdict.reason.contains("marker"));
    }

    #[test]
    fn quiet_rounds_with_stable_height_are_medium() {
        let policy = TerminationPolicy::default();
        let bundle = SignalBundle {
            no_new_rounds: 3,
            all_visible_accumulated: true,
            height_stable: true,
            ..quiet()
        };
        let verdict = decide(&bundle, &policy);
        assert!(verdict.done);
        assert_eq!(verdict.confidence, Confidence::Medium);
    }

    #[test]
    fn small_early_visible_set_blocks_medium() {
        let policy = TerminationPolicy::default();
        let bundle = SignalBundle {
            round: 4,
            visible_count: 1,
            no_new_rounds: 3,
            all_visible_accumulated: true,
            height_stable: true,
            ..quiet()
        };
        assert!(!decide(&bundle, &policy).done);

        // Past the horizon the same picture is trusted.
        let later = SignalBundle {
            round: 6,
            ..bundle
        };
        assert_eq!(decide(&later, &policy).confidence, Confidence::Medium);
    }

    #[test]
    fn weak_signal_quorum_is_low() {
        let policy = TerminationPolicy::default();
        // Five of six: everything except all_visible_accumulated, so the
        // medium rule cannot fire first.
        let bundle = SignalBundle {
            no_new_rounds: 2,
            all_duplicates: true,
            height_stable: true,
            high_scroll_fraction: true,
            top_anchor_stuck: true,
            ..quiet()
        };
        let verdict = decide(&bundle, &policy);
        assert!(verdict.done);
        assert_eq!(verdict.confidence, Confidence::Low);
        assert!(verdict.reason.contains("5 weak signals"));
    }

    #[test]
    fn loading_indicator_vetoes_low() {
        let policy = TerminationPolicy::default();
        let bundle = SignalBundle {
            no_new_rounds: 2,
            all_duplicates: true,
            height_stable: true,
            high_scroll_fraction: true,
            top_anchor_stuck: true,
            loading_indicator_visible: true,
            ..quiet()
        };
        let verdict = decide(&bundle, &policy);
        assert!(!verdict.done);
        assert!(verdict.reason.contains("of 6 weak signals"));
    }

    #[test]
    fn bottom_rule_outranks_medium() {
        let policy = TerminationPolicy::default();
        let verdict = decide(&saturated(), &policy);
        assert_eq!(verdict.confidence, Confidence::High);
        assert!(verdict.reason.contains("page bottom"));
    }

    #[test]
    fn confidence_ordering_and_display() {
        assert!(Confidence::High > Confidence::Medium);
        assert!(Confidence::Medium > Confidence::Low);
        assert!(Confidence::Low > Confidence::None);
        assert_eq!(Confidence::Medium.to_string(), "medium");
    }
}
