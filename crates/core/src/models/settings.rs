use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::CoreError;

const DEFAULT_API_URL: &str = "https://api.octav.fi/v1";
const DEFAULT_CACHE_DIR: &str = ".cache/wallet-dashboard";

/// Runtime configuration for the dashboard core.
///
/// Built from the environment by [`Settings::from_env`] or assembled directly
/// (tests, embedding). A missing API key is the one failure that stops
/// everything: nothing can be fetched without it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Base URL of the upstream portfolio/transaction API
    pub api_base_url: String,

    /// Bearer token for the upstream API
    #[serde(default, skip_serializing)]
    pub api_key: String,

    /// Directory holding cache entries
    pub cache_dir: PathBuf,

    /// Timeout of one upstream call (a snapshot or a single transaction page)
    pub request_timeout_secs: u64,

    /// Overall bound on one wallet's paginated transaction walk
    pub fanout_timeout_secs: u64,

    pub portfolio_ttl_secs: u64,
    /// Past snapshots do not change, so these live much longer
    pub historical_ttl_secs: u64,
    pub transactions_ttl_secs: u64,

    /// Page size used when walking the transaction endpoint
    pub transactions_page_size: usize,

    pub bucketing: BucketingParams,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            api_key: String::new(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            request_timeout_secs: 30,
            fanout_timeout_secs: 600,
            portfolio_ttl_secs: 300,
            historical_ttl_secs: 86_400,
            transactions_ttl_secs: 600,
            transactions_page_size: 250,
            bucketing: BucketingParams::default(),
        }
    }
}

impl Settings {
    /// Read settings from `DASHBOARD_*` environment variables.
    pub fn from_env() -> Result<Self, CoreError> {
        let defaults = Self::default();
        let settings = Self {
            api_base_url: env::var("DASHBOARD_API_URL").unwrap_or(defaults.api_base_url),
            api_key: env::var("DASHBOARD_API_KEY").unwrap_or_default(),
            cache_dir: env::var("DASHBOARD_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            request_timeout_secs: env_number(
                "DASHBOARD_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,
            fanout_timeout_secs: env_number(
                "DASHBOARD_FANOUT_TIMEOUT_SECS",
                defaults.fanout_timeout_secs,
            )?,
            portfolio_ttl_secs: env_number(
                "DASHBOARD_PORTFOLIO_TTL_SECS",
                defaults.portfolio_ttl_secs,
            )?,
            historical_ttl_secs: env_number(
                "DASHBOARD_HISTORICAL_TTL_SECS",
                defaults.historical_ttl_secs,
            )?,
            transactions_ttl_secs: env_number(
                "DASHBOARD_TRANSACTIONS_TTL_SECS",
                defaults.transactions_ttl_secs,
            )?,
            transactions_page_size: env_number(
                "DASHBOARD_TX_PAGE_SIZE",
                defaults.transactions_page_size,
            )?,
            bucketing: defaults.bucketing,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check that the settings can drive a live upstream source.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.api_key.trim().is_empty() {
            return Err(CoreError::Config("DASHBOARD_API_KEY must be set".into()));
        }
        let url = &self.api_base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CoreError::Config(format!(
                "API base URL must be http(s): {}",
                self.api_base_url
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(CoreError::Config("request timeout must be at least 1 second".into()));
        }
        if self.fanout_timeout_secs < self.request_timeout_secs {
            return Err(CoreError::Config(
                "fan-out timeout must not be shorter than the request timeout".into(),
            ));
        }
        if self.transactions_page_size == 0 {
            return Err(CoreError::Config("transaction page size must be at least 1".into()));
        }
        self.bucketing.validate()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn fanout_timeout(&self) -> Duration {
        Duration::from_secs(self.fanout_timeout_secs)
    }

    pub fn portfolio_ttl(&self) -> Duration {
        Duration::from_secs(self.portfolio_ttl_secs)
    }

    pub fn historical_ttl(&self) -> Duration {
        Duration::from_secs(self.historical_ttl_secs)
    }

    pub fn transactions_ttl(&self) -> Duration {
        Duration::from_secs(self.transactions_ttl_secs)
    }
}

fn env_number<T: std::str::FromStr>(name: &str, default: T) -> Result<T, CoreError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::Config(format!("{name} is not a valid number: {raw}"))),
        Err(_) => Ok(default),
    }
}

/// Parameters of the bucketing engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketingParams {
    /// Fraction of the total below which an item folds into "other"
    pub inclusion_threshold: f64,
    /// Share of the total at which "other" is shown on its own account. A
    /// non-empty "other" always came from truncation or a small item and is
    /// shown anyway, so this bound never hides a positive leftover.
    pub display_threshold: f64,
    /// Maximum number of visible (non-"other") entries
    pub max_visible: usize,
    pub other_label: String,
}

impl Default for BucketingParams {
    fn default() -> Self {
        Self {
            inclusion_threshold: 0.02,
            display_threshold: 0.01,
            max_visible: 8,
            other_label: "Other".to_string(),
        }
    }
}

impl BucketingParams {
    pub fn new(inclusion_threshold: f64, display_threshold: f64, max_visible: usize) -> Self {
        Self {
            inclusion_threshold,
            display_threshold,
            max_visible,
            ..Self::default()
        }
    }

    pub fn with_other_label(mut self, label: impl Into<String>) -> Self {
        self.other_label = label.into();
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        for (name, value) in [
            ("inclusion threshold", self.inclusion_threshold),
            ("display threshold", self.display_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CoreError::Config(format!("{name} must be within [0, 1], got {value}")));
            }
        }
        if self.max_visible == 0 {
            return Err(CoreError::Config("bucketing cap must be at least 1".into()));
        }
        if self.other_label.trim().is_empty() {
            return Err(CoreError::Config("'other' label must not be empty".into()));
        }
        Ok(())
    }
}
