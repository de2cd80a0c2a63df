use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use serde::Deserialize;
use tracing::info;

use crate::error::FollowScoutError;

const DEFAULT_BASE_URL: &str = "https://www.instagram.com";
const DEFAULT_FOLLOWERS_QUERY_HASH: &str = "c76146de99bb02f6415203be841dd25a";
const DEFAULT_LIKERS_QUERY_HASH: &str = "d5d763b1e2acf209d62d22d184488e57";
const DEFAULT_CONFIG_PATH: &str = "followscout.toml";

/// Process configuration loaded from environment variables.
/// Secrets stay here; throttling lives in the TOML file.
#[derive(Clone)]
pub struct Config {
    pub session_id: String,
    pub csrf_token: String,
    pub base_url: String,
    pub followers_query_hash: String,
    pub likers_query_hash: String,
    pub config_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            session_id: required_env("FOLLOWSCOUT_SESSION_ID")?,
            csrf_token: required_env("FOLLOWSCOUT_CSRF_TOKEN")?,
            base_url: env::var("FOLLOWSCOUT_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            followers_query_hash: env::var("FOLLOWSCOUT_FOLLOWERS_QUERY_HASH")
                .unwrap_or_else(|_| DEFAULT_FOLLOWERS_QUERY_HASH.to_string()),
            likers_query_hash: env::var("FOLLOWSCOUT_LIKERS_QUERY_HASH")
                .unwrap_or_else(|_| DEFAULT_LIKERS_QUERY_HASH.to_string()),
            config_path: env::var("FOLLOWSCOUT_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
        })
    }

    /// Log the non-secret parts of the configuration.
    pub fn log_redacted(&self) {
        info!(
            base_url = self.base_url.as_str(),
            followers_query_hash = self.followers_query_hash.as_str(),
            likers_query_hash = self.likers_query_hash.as_str(),
            config_path = %self.config_path.display(),
            session_id_len = self.session_id.len(),
            "Configuration loaded"
        );
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("session_id", &"<redacted>")
            .field("csrf_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("followers_query_hash", &self.followers_query_hash)
            .field("likers_query_hash", &self.likers_query_hash)
            .field("config_path", &self.config_path)
            .finish()
    }
}

fn required_env(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} environment variable is required"))
}

// ---------------------------------------------------------------------------
// TOML file config
// ---------------------------------------------------------------------------

/// TOML-backed throttling and harvesting settings. Every field is required.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub throttle: ThrottleConfig,
    pub harvest: HarvestConfig,
}

/// Inclusive range of wait durations, written in the file as milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "MillisRange")]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MillisRange {
    min: u64,
    max: u64,
}

impl From<MillisRange> for DelayRange {
    fn from(r: MillisRange) -> Self {
        Self {
            min: Duration::from_millis(r.min),
            max: Duration::from_millis(r.max),
        }
    }
}

impl DelayRange {
    pub const fn from_millis(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        }
    }

    pub const ZERO: DelayRange = DelayRange::from_millis(0, 0);

    /// Draw a uniform duration in `[min, max]` at millisecond resolution.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if max <= min {
            return self.min;
        }
        Duration::from_millis(rng.random_range(min..=max))
    }

    fn check(&self, field: &str) -> Result<(), FollowScoutError> {
        if self.min > self.max {
            return Err(FollowScoutError::Config(format!(
                "{field}: min ({}ms) exceeds max ({}ms)",
                self.min.as_millis(),
                self.max.as_millis()
            )));
        }
        Ok(())
    }
}

/// What happens when the per-interval cap is hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HourlyLimitPolicy {
    /// Record the current item as failed and move on to the next.
    FailItem,
    /// Stop the run, leaving the rest pending, like the daily cap.
    HaltRun,
}

/// Action-loop throttling.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThrottleConfig {
    pub batch_size_base: u32,
    pub batch_size_variation: u32,
    pub batch_size_hard_cap: u32,
    #[serde(rename = "per_action_delay_ms")]
    pub per_action_delay: DelayRange,
    #[serde(rename = "inter_batch_delay_ms")]
    pub inter_batch_delay: DelayRange,
    pub daily_cap: u32,
    pub hourly_cap: u32,
    pub randomize_order: bool,
    pub shuffle_every_batch: bool,
    pub skip_percentage: u8,
    pub hourly_limit_policy: HourlyLimitPolicy,
}

impl ThrottleConfig {
    pub fn validate(&self) -> Result<(), FollowScoutError> {
        self.per_action_delay.check("throttle.per_action_delay_ms")?;
        self.inter_batch_delay.check("throttle.inter_batch_delay_ms")?;
        if self.skip_percentage > 100 {
            return Err(FollowScoutError::Config(format!(
                "throttle.skip_percentage must be 0..=100, got {}",
                self.skip_percentage
            )));
        }
        if self.batch_size_hard_cap == 0 {
            return Err(FollowScoutError::Config(
                "throttle.batch_size_hard_cap must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Listing and probing pace.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarvestConfig {
    pub page_size: u32,
    pub max_pages: u32,
    #[serde(rename = "rate_limit_cooldown_ms", deserialize_with = "millis")]
    pub rate_limit_cooldown: Duration,
    pub max_rate_limit_retries: u32,
    #[serde(rename = "page_delay_ms")]
    pub page_delay: DelayRange,
    pub probe_concurrency: usize,
    #[serde(rename = "probe_group_delay_ms")]
    pub probe_group_delay: DelayRange,
}

impl HarvestConfig {
    pub fn validate(&self) -> Result<(), FollowScoutError> {
        self.page_delay.check("harvest.page_delay_ms")?;
        self.probe_group_delay.check("harvest.probe_group_delay_ms")?;
        if self.page_size == 0 {
            return Err(FollowScoutError::Config("harvest.page_size must be at least 1".into()));
        }
        if self.max_pages == 0 {
            return Err(FollowScoutError::Config("harvest.max_pages must be at least 1".into()));
        }
        if self.probe_concurrency == 0 {
            return Err(FollowScoutError::Config(
                "harvest.probe_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn millis<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Duration::from_millis(u64::deserialize(deserializer)?))
}

impl FileConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: FileConfig = toml::from_str(content).context("Failed to parse config")?;
        config.throttle.validate()?;
        config.harvest.validate()?;
        Ok(config)
    }
}

/// Load, parse, and validate a TOML config file.
pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    FileConfig::from_toml_str(&content)
        .with_context(|| format!("Invalid config file: {}", path.display()))
}
