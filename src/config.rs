//! Controller configuration
//!
//! Every knob is a CLI flag with an environment fallback so the same binary
//! runs from a Deployment manifest or a shell.

use std::time::Duration;

use clap::{Args, ValueEnum};

use crate::controller::WATCH_TIMEOUT_SECS;
use crate::retry::RetryConfig;
use crate::{
    Error, DEFAULT_MAX_RETRY_DELAY, DEFAULT_MIN_RETRY_DELAY, DEFAULT_NOT_READY_REQUEUE,
    DEFAULT_OPERATOR_NAMESPACE,
};

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Plain,
    /// One JSON object per line
    Json,
}

/// Runtime settings for the NVIDIADriver controller
#[derive(Args, Clone, Debug, PartialEq)]
pub struct ControllerConfig {
    /// Seconds to wait before re-checking a driver that is not ready yet
    #[arg(
        long,
        env = "NOT_READY_REQUEUE_SECS",
        default_value_t = DEFAULT_NOT_READY_REQUEUE.as_secs()
    )]
    pub not_ready_requeue_secs: u64,

    /// Backoff after the first failed pass, in milliseconds
    #[arg(
        long,
        env = "MIN_RETRY_DELAY_MS",
        default_value_t = DEFAULT_MIN_RETRY_DELAY.as_millis() as u64
    )]
    pub min_retry_delay_ms: u64,

    /// Upper bound on failure backoff, in seconds
    #[arg(
        long,
        env = "MAX_RETRY_DELAY_SECS",
        default_value_t = DEFAULT_MAX_RETRY_DELAY.as_secs()
    )]
    pub max_retry_delay_secs: u64,

    /// Server-side watch timeout; keep below the client read timeout
    #[arg(long, env = "WATCH_TIMEOUT_SECS", default_value_t = u64::from(WATCH_TIMEOUT_SECS))]
    pub watch_timeout_secs: u64,

    /// Namespace the driver DaemonSets are created in
    #[arg(long, env = "OPERATOR_NAMESPACE", default_value = DEFAULT_OPERATOR_NAMESPACE)]
    pub operator_namespace: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            not_ready_requeue_secs: DEFAULT_NOT_READY_REQUEUE.as_secs(),
            min_retry_delay_ms: DEFAULT_MIN_RETRY_DELAY.as_millis() as u64,
            max_retry_delay_secs: DEFAULT_MAX_RETRY_DELAY.as_secs(),
            watch_timeout_secs: u64::from(WATCH_TIMEOUT_SECS),
            operator_namespace: DEFAULT_OPERATOR_NAMESPACE.to_string(),
            log_format: LogFormat::Plain,
        }
    }
}

impl ControllerConfig {
    /// Reject settings the controller cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        if self.min_retry_delay() > self.max_retry_delay() {
            return Err(Error::configuration(format!(
                "min retry delay ({}ms) exceeds max retry delay ({}s)",
                self.min_retry_delay_ms, self.max_retry_delay_secs
            )));
        }
        if self.min_retry_delay_ms == 0 {
            return Err(Error::configuration("min retry delay must be positive"));
        }
        if self.watch_timeout_secs == 0 || self.watch_timeout_secs >= 30 {
            return Err(Error::configuration(format!(
                "watch timeout must be between 1 and 29 seconds, got {}",
                self.watch_timeout_secs
            )));
        }
        if self.operator_namespace.trim().is_empty() {
            return Err(Error::configuration("operator namespace must not be empty"));
        }
        Ok(())
    }

    /// Delay before re-checking a not-ready driver
    pub fn not_ready_delay(&self) -> Duration {
        Duration::from_secs(self.not_ready_requeue_secs)
    }

    /// Backoff after the first failure
    pub fn min_retry_delay(&self) -> Duration {
        Duration::from_millis(self.min_retry_delay_ms)
    }

    /// Cap on failure backoff
    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_secs(self.max_retry_delay_secs)
    }

    /// Server-side watch timeout
    pub fn watch_timeout(&self) -> Duration {
        Duration::from_secs(self.watch_timeout_secs)
    }

    /// Failure backoff applied by the controller error policy
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::bounded(self.min_retry_delay(), self.max_retry_delay())
    }
}
