// src/harvest/expand.rs
//! Truncation expansion with wrong-context containment.
//!
//! Expansion selectors double as a navigation hazard: on some feeds the
//! "show more" control shares markup with a permalink, and clicking it on a
//! detail page (or after an accidental navigation) would walk the harvest
//! away from the feed. The injected script refuses to click when the page
//! context looks wrong; this resolver treats that refusal as permanent and
//! disables expansion for the rest of the run.

use crate::error::Result;
use crate::models::{Template, TerminationPolicy};

use super::session::FeedSession;

/// Outcome of one expansion pass over a single selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandOutcome {
    /// Number of controls actually clicked, possibly zero.
    Clicked(u64),

    /// The page context refused expansion (detail page, navigated away).
    WrongContext,
}

/// Totals for one round of expansion across all selectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpandReport {
    pub clicked: u64,
    pub failures: u32,
}

/// Drives the expansion selectors each round until nothing is left to click.
#[derive(Debug)]
pub struct ExpansionResolver {
    selectors: Vec<String>,
    max_attempts: u32,
    aborted: bool,
    enabled: bool,
}

impl ExpansionResolver {
    pub fn new(template: &Template, policy: &TerminationPolicy) -> Self {
        Self {
            selectors: template.expand_selectors.clone(),
            max_attempts: policy.expand_max_attempts.max(1),
            aborted: false,
            enabled: !template.expand_selectors.is_empty(),
        }
    }

    /// Whether the next round should attempt expansion at all.
    pub fn active(&self) -> bool {
        self.enabled && !self.aborted
    }

    /// Expansion was permanently disabled by a wrong-context refusal.
    pub fn aborted(&self) -> bool {
        self.aborted
    }

    /// Run every selector until it reports nothing left to click, up to the
    /// attempt cap. Fatal errors propagate; transient ones skip the selector.
    pub async fn run_round<S: FeedSession>(&mut self, session: &mut S) -> Result<ExpandReport> {
        let mut report = ExpandReport::default();
        let mut aborted = false;

        'selectors: for selector in &self.selectors {
            for attempt in 1..=self.max_attempts {
                match session.expand_attempt(selector).await {
                    Ok(ExpandOutcome::Clicked(0)) => break,
                    Ok(ExpandOutcome::Clicked(count)) => {
                        log::debug!(
                            "expanded {count} control(s) via {selector} (attempt {attempt})"
                        );
                        report.clicked += count;
                    }
                    Ok(ExpandOutcome::WrongContext) => {
                        log::warn!(
                            "page context rejected expansion via {selector}; disabling expansion"
                        );
                        aborted = true;
                        break 'selectors;
                    }
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        log::warn!("expansion via {selector} failed: {err}");
                        report.failures += 1;
                        break;
                    }
                }
            }
        }

        if aborted {
            self.aborted = true;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::RawItem;
    use async_trait::async_trait;

    use crate::harvest::session::ScrollSample;
    use crate::harvest::viewport::RawProbe;

    struct ScriptedExpand {
        replies: Vec<Result<ExpandOutcome>>,
        seen: Vec<String>,
    }

    impl ScriptedExpand {
        fn new(replies: Vec<Result<ExpandOutcome>>) -> Self {
            Self {
                replies,
                seen: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl FeedSession for ScriptedExpand {
        async fn expand_attempt(&mut self, selector: &str) -> Result<ExpandOutcome> {
            self.seen.push(selector.to_string());
            if self.replies.is_empty() {
                Ok(ExpandOutcome::Clicked(0))
            } else {
                self.replies.remove(0)
            }
        }

        async fn extract(&mut self) -> Result<Vec<RawItem>> {
            Ok(Vec::new())
        }

        async fn probe(&mut self) -> Result<RawProbe> {
            Ok(RawProbe::default())
        }

        async fn scroll_to_bottom(&mut self) -> Result<ScrollSample> {
            Ok(ScrollSample {
                viewport_height: 0.0,
                pre_offset: 0.0,
                pre_height: 0.0,
                post_offset: 0.0,
                post_height: 0.0,
            })
        }
    }

    fn template_with_selectors(selectors: &[&str]) -> Template {
        Template {
            expand_selectors: selectors.iter().map(|s| s.to_string()).collect(),
            ..crate::models::presets::twitter(None)
        }
    }

    #[tokio::test]
    async fn repeats_until_nothing_left_to_click() {
        let template = template_with_selectors(&["button.more"]);
        let policy = TerminationPolicy::default();
        let mut resolver = ExpansionResolver::new(&template, &policy);
        let mut session = ScriptedExpand::new(vec![
            Ok(ExpandOutcome::Clicked(2)),
            Ok(ExpandOutcome::Clicked(1)),
            Ok(ExpandOutcome::Clicked(0)),
        ]);

        let report = resolver.run_round(&mut session).await.unwrap();
        assert_eq!(report.clicked, 3);
        assert_eq!(report.failures, 0);
        assert_eq!(session.seen.len(), 3);
        assert!(resolver.active());
    }

    #[tokio::test]
    async fn wrong_context_disables_expansion_permanently() {
        let template = template_with_selectors(&["button.more", "button.rest"]);
        let policy = TerminationPolicy::default();
        let mut resolver = ExpansionResolver::new(&template, &policy);
        let mut session = ScriptedExpand::new(vec![Ok(ExpandOutcome::WrongContext)]);

        let report = resolver.run_round(&mut session).await.unwrap();
        assert_eq!(report.clicked, 0);
        // The second selector is never tried.
        assert_eq!(session.seen, ["button.more"]);
        assert!(resolver.aborted());
        assert!(!resolver.active());
    }

    #[tokio::test]
    async fn transient_errors_skip_to_the_next_selector() {
        let template = template_with_selectors(&["button.more", "button.rest"]);
        let policy = TerminationPolicy::default();
        let mut resolver = ExpansionResolver::new(&template, &policy);
        let mut session = ScriptedExpand::new(vec![
            Err(AppError::evaluate("expand", "lost reply")),
            Ok(ExpandOutcome::Clicked(1)),
            Ok(ExpandOutcome::Clicked(0)),
        ]);

        let report = resolver.run_round(&mut session).await.unwrap();
        assert_eq!(report.clicked, 1);
        assert_eq!(report.failures, 1);
        assert_eq!(session.seen, ["button.more", "button.rest", "button.rest"]);
        assert!(resolver.active());
    }

    #[tokio::test]
    async fn fatal_errors_propagate() {
        let template = template_with_selectors(&["button.more"]);
        let policy = TerminationPolicy::default();
        let mut resolver = ExpansionResolver::new(&template, &policy);
        let mut session = ScriptedExpand::new(vec![Err(AppError::connectivity(
            "ws://127.0.0.1:9222",
            "connection reset",
        ))]);

        let err = resolver.run_round(&mut session).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn attempt_cap_bounds_a_selector_that_never_settles() {
        let template = template_with_selectors(&["button.more"]);
        let policy = TerminationPolicy {
            expand_max_attempts: 2,
            ..TerminationPolicy::default()
        };
        let mut resolver = ExpansionResolver::new(&template, &policy);
        let mut session = ScriptedExpand::new(vec![
            Ok(ExpandOutcome::Clicked(1)),
            Ok(ExpandOutcome::Clicked(1)),
            Ok(ExpandOutcome::Clicked(1)),
        ]);

        let report = resolver.run_round(&mut session).await.unwrap();
        assert_eq!(report.clicked, 2);
        assert_eq!(session.seen.len(), 2);
    }

    #[test]
    fn empty_selector_list_is_inactive() {
        let mut template = crate::models::presets::douban_reviews();
        template.expand_selectors.clear();
        let resolver = ExpansionResolver::new(&template, &TerminationPolicy::default());
        assert!(!resolver.active());
        assert!(!resolver.aborted());
    }
}
