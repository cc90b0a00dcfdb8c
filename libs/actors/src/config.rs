//! Actor Configuration
//!
//! Options applied when an actor is spawned. They can be built in code or
//! loaded from a TOML file with `PIPE_`-prefixed environment overrides
//! (`PIPE_MAX_CREDIT`, `PIPE_RATE__QUOTA`, `PIPE_RATE__PERIOD_US`):
//!
//! ```toml
//! max_credit = 500
//!
//! [rate]
//! quota = 100
//! period_us = 1000000
//! ```

use crate::credit::DEFAULT_MAX_CREDIT;
use crate::error::{ActorError, Result as ActorResult};
use crate::rate::Rate;
use anyhow::{Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Spawn options for one actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Execution quota; absent disables rate limiting
    #[serde(default)]
    pub rate: Option<RateConfig>,

    /// Ceiling of every peer's credit
    #[serde(default = "default_max_credit")]
    pub max_credit: u64,
}

/// `quota` transitions per `period_us` microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateConfig {
    pub quota: u32,
    pub period_us: u64,
}

fn default_max_credit() -> u64 {
    DEFAULT_MAX_CREDIT
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            rate: None,
            max_credit: DEFAULT_MAX_CREDIT,
        }
    }
}

impl RateConfig {
    pub fn to_rate(self) -> ActorResult<Rate> {
        Rate::new(self.quota, Duration::from_micros(self.period_us))
    }
}

impl ActorConfig {
    /// Limit execution to `quota` transitions per `period`
    pub fn with_rate(mut self, quota: u32, period: Duration) -> Self {
        self.rate = Some(RateConfig {
            quota,
            period_us: period.as_micros().min(u64::MAX as u128) as u64,
        });
        self
    }

    pub fn with_max_credit(mut self, max_credit: u64) -> Self {
        self.max_credit = max_credit;
        self
    }

    /// Check the options and resolve the rate
    pub fn validate(&self) -> ActorResult<Option<Rate>> {
        self.rate
            .map(RateConfig::to_rate)
            .transpose()
            .map_err(|e| match e {
                ActorError::Configuration { message, field } => ActorError::Configuration {
                    message,
                    field: field.map(|f| format!("rate.{}", f)),
                },
                other => other,
            })
    }

    /// Load from a TOML file, then apply `PIPE_*` environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading actor configuration");

        let config = Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(
                Environment::with_prefix("PIPE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build actor configuration")?;

        let actor_config: Self = config
            .try_deserialize()
            .context("Failed to deserialize actor configuration")?;

        actor_config
            .validate()
            .with_context(|| format!("Invalid actor configuration in {}", path.display()))?;
        Ok(actor_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = ActorConfig::default();
        assert_eq!(config.rate, None);
        assert_eq!(config.max_credit, DEFAULT_MAX_CREDIT);
        assert_eq!(config.validate().unwrap(), None);
    }

    #[test]
    fn test_builder_resolves_rate() {
        let config = ActorConfig::default()
            .with_rate(10, Duration::from_millis(250))
            .with_max_credit(64);
        let rate = config.validate().unwrap().unwrap();
        assert_eq!(rate.quota(), 10);
        assert_eq!(rate.period(), Duration::from_millis(250));
        assert_eq!(config.max_credit, 64);
    }

    #[test]
    fn test_sub_millisecond_period_is_kept() {
        let config = ActorConfig::default().with_rate(1, Duration::from_micros(1_500));
        let rate = config.validate().unwrap().unwrap();
        assert_eq!(rate.period(), Duration::from_micros(1_500));

        let config = ActorConfig::default().with_rate(4, Duration::from_micros(500));
        assert_eq!(config.rate.map(|r| r.period_us), Some(500));
        assert_eq!(
            config.validate().unwrap().map(|r| r.period()),
            Some(Duration::from_micros(500))
        );
    }

    #[test]
    fn test_zero_quota_names_field() {
        let config = ActorConfig::default().with_rate(0, Duration::from_secs(1));
        match config.validate() {
            Err(ActorError::Configuration { field, .. }) => {
                assert_eq!(field.as_deref(), Some("rate.quota"))
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("actor.toml");
        fs::write(
            &path,
            r#"
max_credit = 500

[rate]
quota = 100
period_us = 1000000
"#,
        )
        .unwrap();

        let config = ActorConfig::load(&path).unwrap();
        assert_eq!(config.max_credit, 500);
        assert_eq!(
            config.rate,
            Some(RateConfig {
                quota: 100,
                period_us: 1_000_000
            })
        );
    }

    #[test]
    fn test_load_rejects_invalid_rate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("actor.toml");
        fs::write(&path, "[rate]\nquota = 5\nperiod_us = 0\n").unwrap();

        let err = ActorConfig::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("period"));
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempdir().unwrap();
        assert!(ActorConfig::load(&dir.path().join("absent.toml")).is_err());
    }
}
