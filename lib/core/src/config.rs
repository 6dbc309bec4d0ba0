use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Column names (upper-cased) whose values are subtracted from run time.
pub const DEFAULT_HOLD_TIME_COLUMNS: &[&str] = &["HOLD_TIME", "HOLD_DURATION", "HOLDING_TIME"];

/// Recommendation settings shared by training and prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendConfig {
    /// Retrieval breadth
    pub top_k: usize,
    /// Candidates scoring below this similarity are dropped
    pub similarity_threshold: f32,
    /// Cap on emitted candidates
    pub max_variants: usize,
    /// Trimmed-mean tail fraction
    pub trim_ratio: f64,
    /// Below this many work-order samples, confidence base is zero
    pub minimum_samples: usize,
    /// Outsourcing pattern -> in-house replacement
    pub outsourcing_replacements: BTreeMap<String, String>,
    pub connection_pool_size: usize,
    pub pool_acquire_timeout_ms: u64,
    /// Retries after a failed database call; the first try is not counted
    pub retry_attempts: u32,
    /// Linear backoff unit: retry `n` waits `n` times this
    pub retry_backoff_ms: u64,
    /// Per-request deadline; none means unbounded
    pub request_timeout_ms: Option<u64>,
    pub hold_time_columns: Vec<String>,
    /// SQL profile schemas the produced bundle is declared compatible with
    pub compatible_profiles: Vec<String>,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.0,
            max_variants: 4,
            trim_ratio: 0.1,
            minimum_samples: 3,
            outsourcing_replacements: BTreeMap::new(),
            connection_pool_size: 5,
            pool_acquire_timeout_ms: 5_000,
            retry_attempts: 3,
            retry_backoff_ms: 2_000,
            request_timeout_ms: None,
            hold_time_columns: DEFAULT_HOLD_TIME_COLUMNS.iter().map(|s| s.to_string()).collect(),
            compatible_profiles: vec!["erp-v1".to_string()],
        }
    }
}

impl RecommendConfig {
    /// Load a JSON config file; absent keys take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: RecommendConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..0.5).contains(&self.trim_ratio) {
            return Err(Error::InvalidConfig(format!(
                "trim_ratio must be in [0, 0.5), got {}",
                self.trim_ratio
            )));
        }
        if self.connection_pool_size == 0 {
            return Err(Error::InvalidConfig("connection_pool_size must be positive".into()));
        }
        if !self.similarity_threshold.is_finite() {
            return Err(Error::InvalidConfig("similarity_threshold must be finite".into()));
        }
        for (pattern, replacement) in &self.outsourcing_replacements {
            if pattern.is_empty() {
                return Err(Error::InvalidConfig("empty outsourcing pattern".into()));
            }
            if let Some(p) = self
                .outsourcing_replacements
                .keys()
                .find(|p| replacement.contains(p.as_str()))
            {
                return Err(Error::InvalidConfig(format!(
                    "replacement '{}' for '{}' still contains outsourcing pattern '{}'",
                    replacement, pattern, p
                )));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    #[inline]
    pub fn pool_acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_acquire_timeout_ms)
    }

    #[inline]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Outsourcing patterns, in the order replacements are applied.
    pub fn outsourcing_patterns(&self) -> Vec<&str> {
        self.outsourcing_replacements.keys().map(String::as_str).collect()
    }
}
