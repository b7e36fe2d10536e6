// src/harvest/mod.rs
//! Incremental feed collection over an attached browser page.

pub mod engine;
pub mod expand;
pub mod identity;
pub mod oracle;
pub mod scripts;
pub mod session;
pub mod viewport;

pub use engine::{Harvester, HarvestOutcome};
pub use expand::{ExpandOutcome, ExpandReport, ExpansionResolver};
pub use oracle::{decide, Confidence, SignalBundle, Verdict};
pub use session::{CdpFeedSession, FeedSession, ScrollSample};
pub use viewport::{RawProbe, RawProbeItem, VisibilitySnapshot, VisibleCoverage};

use crate::cdp::CdpClient;
use crate::error::{AppError, Result};
use crate::models::{Config, Template};

/// Attach to the running browser, find the tab matching the template's URL
/// pattern, and harvest the feed rendered there.
///
/// The page must already be open; nothing is launched or navigated.
pub async fn harvest_feed(config: &Config, template: Template) -> Result<HarvestOutcome> {
    let client = CdpClient::connect(&config.chrome).await?;
    let tab = client
        .locate(&template.url_pattern)
        .await?
        .ok_or_else(|| AppError::PageNotFound {
            pattern: template.url_pattern.clone(),
        })?;
    log::info!(
        "attached to \"{}\" ({})",
        tab.title,
        tab.url
    );

    let session = client.open_session(&tab).await?;
    let feed = CdpFeedSession::new(session, &template);
    Harvester::new(feed, template, config.policy.clone()).run().await
}
