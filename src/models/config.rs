//! Runtime configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root runtime configuration. Everything has a working default; a config
/// file only needs the values it overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Browser endpoint settings
    #[serde(default)]
    pub chrome: ChromeConfig,

    /// Termination heuristics
    #[serde(default)]
    pub policy: TerminationPolicy,

    /// Export output settings
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.chrome.host.trim().is_empty() {
            return Err(AppError::config("chrome.host is empty"));
        }
        if self.chrome.port == 0 {
            return Err(AppError::config("chrome.port must be > 0"));
        }
        if self.chrome.http_timeout_secs == 0 {
            return Err(AppError::config("chrome.http_timeout_secs must be > 0"));
        }
        if self.chrome.evaluate_timeout_secs == 0 {
            return Err(AppError::config("chrome.evaluate_timeout_secs must be > 0"));
        }
        self.policy.validate()
    }
}

/// Where to find the browser's debugging endpoint.
///
/// The browser is never launched here: the operator starts their own Chrome
/// with `--remote-debugging-port` and logs in; harvesting attaches to that
/// session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChromeConfig {
    /// Host of the DevTools endpoint
    #[serde(default = "defaults::host")]
    pub host: String,

    /// DevTools port (Chrome's --remote-debugging-port)
    #[serde(default = "defaults::port")]
    pub port: u16,

    /// Timeout for discovery HTTP requests, in seconds
    #[serde(default = "defaults::http_timeout")]
    pub http_timeout_secs: u64,

    /// Timeout for a single script evaluation, in seconds
    #[serde(default = "defaults::evaluate_timeout")]
    pub evaluate_timeout_secs: u64,
}

impl ChromeConfig {
    /// Base URL of the DevTools HTTP endpoint.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            host: defaults::host(),
            port: defaults::port(),
            http_timeout_secs: defaults::http_timeout(),
            evaluate_timeout_secs: defaults::evaluate_timeout(),
        }
    }
}

/// Thresholds for the termination decision.
///
/// These are tuned heuristics, not contract: every number here is a named,
/// overridable knob precisely because no single value is right for every
/// feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminationPolicy {
    /// Extra zero-yield rounds required to confirm a medium/low verdict
    #[serde(default = "defaults::confirm_rounds")]
    pub confirm_rounds: u32,

    /// Consecutive no-new rounds for a medium-confidence stop
    #[serde(default = "defaults::no_new_medium_rounds")]
    pub no_new_medium_rounds: u32,

    /// Consecutive no-new rounds that count as a low-confidence signal
    #[serde(default = "defaults::no_new_low_rounds")]
    pub no_new_low_rounds: u32,

    /// Page height change below this many pixels counts as stable
    #[serde(default = "defaults::height_stable_epsilon_px")]
    pub height_stable_epsilon_px: f64,

    /// Band above/below the viewport still treated as visible
    #[serde(default = "defaults::visibility_margin_px")]
    pub visibility_margin_px: f64,

    /// Fraction of viewport height the top anchor may sit below the top
    #[serde(default = "defaults::top_anchor_band")]
    pub top_anchor_band: f64,

    /// Scroll offset fraction of maximum that counts as "near the bottom"
    #[serde(default = "defaults::high_scroll_fraction")]
    pub high_scroll_fraction: f64,

    /// Actual scroll movement below this many pixels counts as small
    #[serde(default = "defaults::small_scroll_px")]
    pub small_scroll_px: f64,

    /// Visible counts below this are suspicious early in a run
    #[serde(default = "defaults::min_trusted_visible")]
    pub min_trusted_visible: usize,

    /// Rounds during which a small visible count stays suspicious
    #[serde(default = "defaults::early_round_horizon")]
    pub early_round_horizon: u32,

    /// Consecutive anchor-stuck rounds before the stuck signal fires
    #[serde(default = "defaults::stuck_rounds")]
    pub stuck_rounds: u32,

    /// Weak signals that must agree for a low-confidence stop
    #[serde(default = "defaults::low_signal_quorum")]
    pub low_signal_quorum: usize,

    /// Expansion attempts per selector per round
    #[serde(default = "defaults::expand_max_attempts")]
    pub expand_max_attempts: u32,
}

impl TerminationPolicy {
    /// Validate threshold ranges.
    pub fn validate(&self) -> Result<()> {
        if self.confirm_rounds == 0 {
            return Err(AppError::config("policy.confirm_rounds must be > 0"));
        }
        if self.no_new_medium_rounds == 0 || self.no_new_low_rounds == 0 {
            return Err(AppError::config("policy no-new thresholds must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.top_anchor_band) {
            return Err(AppError::config("policy.top_anchor_band must be in 0..=1"));
        }
        if !(0.0..=1.0).contains(&self.high_scroll_fraction) {
            return Err(AppError::config(
                "policy.high_scroll_fraction must be in 0..=1",
            ));
        }
        if self.height_stable_epsilon_px < 0.0 || self.visibility_margin_px < 0.0 {
            return Err(AppError::config("policy pixel thresholds must be >= 0"));
        }
        if self.low_signal_quorum == 0 || self.low_signal_quorum > 6 {
            return Err(AppError::config(
                "policy.low_signal_quorum must be in 1..=6",
            ));
        }
        if self.expand_max_attempts == 0 {
            return Err(AppError::config("policy.expand_max_attempts must be > 0"));
        }
        Ok(())
    }
}

impl Default for TerminationPolicy {
    fn default() -> Self {
        Self {
            confirm_rounds: defaults::confirm_rounds(),
            no_new_medium_rounds: defaults::no_new_medium_rounds(),
            no_new_low_rounds: defaults::no_new_low_rounds(),
            height_stable_epsilon_px: defaults::height_stable_epsilon_px(),
            visibility_margin_px: defaults::visibility_margin_px(),
            top_anchor_band: defaults::top_anchor_band(),
            high_scroll_fraction: defaults::high_scroll_fraction(),
            small_scroll_px: defaults::small_scroll_px(),
            min_trusted_visible: defaults::min_trusted_visible(),
            early_round_horizon: defaults::early_round_horizon(),
            stuck_rounds: defaults::stuck_rounds(),
            low_signal_quorum: defaults::low_signal_quorum(),
            expand_max_attempts: defaults::expand_max_attempts(),
        }
    }
}

/// Export output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory export files are written into
    #[serde(default = "defaults::output_dir")]
    pub directory: PathBuf,

    /// Write the JSON archive
    #[serde(default = "defaults::enabled")]
    pub json: bool,

    /// Write the CSV table
    #[serde(default)]
    pub csv: bool,

    /// Write the Markdown digest
    #[serde(default)]
    pub markdown: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: defaults::output_dir(),
            json: defaults::enabled(),
            csv: false,
            markdown: false,
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Chrome defaults
    pub fn host() -> String {
        "127.0.0.1".into()
    }
    pub fn port() -> u16 {
        9222
    }
    pub fn http_timeout() -> u64 {
        10
    }
    pub fn evaluate_timeout() -> u64 {
        30
    }

    // Policy defaults
    pub fn confirm_rounds() -> u32 {
        2
    }
    pub fn no_new_medium_rounds() -> u32 {
        3
    }
    pub fn no_new_low_rounds() -> u32 {
        2
    }
    pub fn height_stable_epsilon_px() -> f64 {
        2.0
    }
    pub fn visibility_margin_px() -> f64 {
        100.0
    }
    pub fn top_anchor_band() -> f64 {
        0.5
    }
    pub fn high_scroll_fraction() -> f64 {
        0.95
    }
    pub fn small_scroll_px() -> f64 {
        50.0
    }
    pub fn min_trusted_visible() -> usize {
        3
    }
    pub fn early_round_horizon() -> u32 {
        6
    }
    pub fn stuck_rounds() -> u32 {
        2
    }
    pub fn low_signal_quorum() -> usize {
        5
    }
    pub fn expand_max_attempts() -> u32 {
        3
    }

    // Output defaults
    pub fn output_dir() -> PathBuf {
        PathBuf::from("output")
    }
    pub fn enabled() -> bool {
        true
    }
}
