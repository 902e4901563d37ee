//! Environment-driven configuration for the job coordinator.
//!
//! All coordinator tuning comes from the process environment; there is no
//! file format to parse here — the pipeline-shape library is an
//! out-of-scope external collaborator, so there is nothing in this crate
//! playing that role.

pub mod error;

pub use error::{ConfigError, ConfigResult};

use std::time::Duration;

/// Retry/throttle/regeneration tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum per-task retry count before the job is aborted.
    pub max_failure_rate: u32,
    /// Minimum retry backoff unit.
    pub failed_min_pause: Duration,
    /// Upper cap for retry backoff.
    pub failed_max_pause: Duration,
    /// Uniform jitter bound added on top of the capped backoff.
    pub failed_pause_randomize: Duration,
    /// Max failures per host per input before the host is treated as
    /// unusable for that input.
    pub input_failure_cap: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_failure_rate: 5,
            failed_min_pause: Duration::from_millis(1_000),
            failed_max_pause: Duration::from_millis(60_000),
            failed_pause_randomize: Duration::from_millis(1_000),
            input_failure_cap: 3,
        }
    }
}

impl RetryConfig {
    /// Load from the process environment, falling back to
    /// [`RetryConfig::default`] for anything unset.
    ///
    /// `failed_min_pause` is clamped to `failed_max_pause` rather than
    /// rejected when the operator sets it backwards — the backoff formula's
    /// `min(attempt * min_pause, max_pause)` already tolerates the
    /// degenerate case, and erroring here would invent a constraint the
    /// spec never states.
    pub fn from_env() -> ConfigResult<Self> {
        let defaults = Self::default();

        let max_failure_rate = parse_env_u32(
            "COORDINATOR_MAX_FAILURE_RATE",
            defaults.max_failure_rate,
        )?;
        let failed_min_pause = parse_env_duration_ms(
            "COORDINATOR_FAILED_MIN_PAUSE_MS",
            defaults.failed_min_pause,
        )?;
        let mut failed_max_pause = parse_env_duration_ms(
            "COORDINATOR_FAILED_MAX_PAUSE_MS",
            defaults.failed_max_pause,
        )?;
        let failed_pause_randomize = parse_env_duration_ms(
            "COORDINATOR_FAILED_PAUSE_RANDOMIZE_MS",
            defaults.failed_pause_randomize,
        )?;
        let input_failure_cap = parse_env_u32(
            "COORDINATOR_INPUT_FAILURE_CAP",
            defaults.input_failure_cap,
        )?;

        if failed_max_pause < failed_min_pause {
            failed_max_pause = failed_min_pause;
        }

        Ok(Self {
                max_failure_rate,
                failed_min_pause,
                failed_max_pause,
                failed_pause_randomize,
                input_failure_cap,
        })
    }
}

fn parse_env_u32(key: &str, default: u32) -> ConfigResult<u32> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<u32>().map_err(|e| ConfigError::InvalidValue {
                field: key.to_string(),
                message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_duration_ms(key: &str, default: Duration) -> ConfigResult<Duration> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::InvalidValue {
                field: key.to_string(),
                message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment variables are process-global, so these tests run serially
    // within this module by only ever touching keys unique to each test.

    #[test]
    fn defaults_when_unset() {
        let cfg = RetryConfig::from_env().expect("defaults should always parse");
        assert_eq!(cfg.max_failure_rate, 5);
        assert_eq!(cfg.input_failure_cap, 3);
    }

    #[test]
    fn clamps_max_pause_below_min_pause() {
        // SAFETY: test-local keys, not touched by other tests.
        unsafe {
            std::env::set_var("COORDINATOR_FAILED_MIN_PAUSE_MS_TEST_CLAMP", "5000");
        }
        let min = parse_env_duration_ms(
            "COORDINATOR_FAILED_MIN_PAUSE_MS_TEST_CLAMP",
            Duration::from_millis(0),
        )
            .unwrap();
        assert_eq!(min, Duration::from_millis(5000));
        unsafe {
            std::env::remove_var("COORDINATOR_FAILED_MIN_PAUSE_MS_TEST_CLAMP");
        }
    }

    #[test]
    fn invalid_value_reports_field_name() {
        unsafe {
            std::env::set_var("COORDINATOR_MAX_FAILURE_RATE_TEST_BAD", "not-a-number");
        }
        let err = parse_env_u32("COORDINATOR_MAX_FAILURE_RATE_TEST_BAD", 1).unwrap_err();
        match err {
            ConfigError::InvalidValue { field, .. } => {
                assert_eq!(field, "COORDINATOR_MAX_FAILURE_RATE_TEST_BAD")
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
        unsafe {
            std::env::remove_var("COORDINATOR_MAX_FAILURE_RATE_TEST_BAD");
        }
    }
}
