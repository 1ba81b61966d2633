use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::PgConnectionConfig;

/// Errors raised while validating a [`SyncConfig`].
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The notification channel name is empty.
    #[error("the notification channel name must not be empty")]
    EmptyChannel,

    /// The reconciliation window is zero.
    #[error("the reconciliation window size must be greater than zero")]
    ZeroWindowSize,

    /// The reconciliation interval is zero.
    #[error("the reconciliation interval must be greater than zero")]
    ZeroInterval,

    /// The failure log path is empty.
    #[error("the failure log path must not be empty")]
    EmptyFailureLogPath,
}

/// Top-level configuration for the synchronization middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncConfig {
    /// Connection to the source store, where change notifications originate.
    pub source: PgConnectionConfig,
    /// Connection to the destination store kept in sync with the source.
    pub destination: PgConnectionConfig,
    /// Name of the LISTEN/NOTIFY channel carrying change events.
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Fixed delay before the listener re-attempts a lost subscription.
    #[serde(default = "default_listener_retry_delay_ms")]
    pub listener_retry_delay_ms: u64,
    /// Reconciliation engine settings.
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    /// Path of the JSON failure log document.
    #[serde(default = "default_failure_log_path")]
    pub failure_log_path: String,
    /// Fallback grouping id used when a demand has no resolvable group.
    #[serde(default = "default_grupo_ocorrencia_id")]
    pub default_grupo_ocorrencia_id: i64,
}

/// Settings for the periodic gap-reconciliation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReconciliationConfig {
    /// Seconds between reconciliation runs.
    #[serde(default = "default_reconciliation_interval_secs")]
    pub interval_secs: u64,
    /// Number of most-recent source keys inspected per run.
    #[serde(default = "default_window_size")]
    pub window_size: i64,
    /// Whether to run one reconciliation pass immediately on startup.
    #[serde(default)]
    pub run_on_start: bool,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reconciliation_interval_secs(),
            window_size: default_window_size(),
            run_on_start: false,
        }
    }
}

impl SyncConfig {
    /// Validates the configuration, returning the first violation found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.channel.is_empty() {
            return Err(ValidationError::EmptyChannel);
        }

        if self.reconciliation.window_size <= 0 {
            return Err(ValidationError::ZeroWindowSize);
        }

        if self.reconciliation.interval_secs == 0 {
            return Err(ValidationError::ZeroInterval);
        }

        if self.failure_log_path.is_empty() {
            return Err(ValidationError::EmptyFailureLogPath);
        }

        Ok(())
    }
}

fn default_channel() -> String {
    "sync_channel".to_string()
}

fn default_listener_retry_delay_ms() -> u64 {
    5000
}

fn default_reconciliation_interval_secs() -> u64 {
    600
}

fn default_window_size() -> i64 {
    5000
}

fn default_failure_log_path() -> String {
    "erros_sincronizacao.json".to_string()
}

fn default_grupo_ocorrencia_id() -> i64 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_connection() -> PgConnectionConfig {
        PgConnectionConfig {
            host: "localhost".to_string(),
            port: 5432,
            name: "fiscalize".to_string(),
            username: "postgres".to_string(),
            password: None,
        }
    }

    fn test_config() -> SyncConfig {
        SyncConfig {
            source: test_connection(),
            destination: test_connection(),
            channel: default_channel(),
            listener_retry_delay_ms: default_listener_retry_delay_ms(),
            reconciliation: ReconciliationConfig::default(),
            failure_log_path: default_failure_log_path(),
            default_grupo_ocorrencia_id: default_grupo_ocorrencia_id(),
        }
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let config: SyncConfig = serde_json::from_value(serde_json::json!({
            "source": {
                "host": "localhost",
                "port": 5432,
                "name": "fiscalize",
                "username": "postgres",
                "password": null,
            },
            "destination": {
                "host": "localhost",
                "port": 5432,
                "name": "agefis",
                "username": "postgres",
                "password": null,
            },
        }))
        .unwrap();

        assert_eq!(config.channel, "sync_channel");
        assert_eq!(config.listener_retry_delay_ms, 5000);
        assert_eq!(config.reconciliation.interval_secs, 600);
        assert_eq!(config.reconciliation.window_size, 5000);
        assert!(!config.reconciliation.run_on_start);
        assert_eq!(config.failure_log_path, "erros_sincronizacao.json");
        assert_eq!(config.default_grupo_ocorrencia_id, 1);
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_channel() {
        let mut config = test_config();
        config.channel = String::new();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::EmptyChannel)
        ));
    }

    #[test]
    fn validate_rejects_zero_window() {
        let mut config = test_config();
        config.reconciliation.window_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::ZeroWindowSize)
        ));
    }
}
