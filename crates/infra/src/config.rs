//! Engine configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::executor::{DEFAULT_TASK_TIMEOUT, DEFAULT_WORKER_COUNT};
use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::retry::{BackoffStrategy, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Tuning knobs of the orchestration engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
    /// Retry budget for tasks whose job does not set `max_retries`.
    pub max_task_retries: u32,
    pub task_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_task_retries: 3,
            task_timeout: DEFAULT_TASK_TIMEOUT,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default |
    /// |------------------------|---------|
    /// | `WORKER_COUNT`         | `8`     |
    /// | `QUEUE_CAPACITY`       | `1024`  |
    /// | `MAX_TASK_RETRIES`     | `3`     |
    /// | `TASK_TIMEOUT_SECONDS` | `300`   |
    /// | `RETRY_BASE_DELAY_MS`  | `500`   |
    /// | `RETRY_MAX_DELAY_MS`   | `30000` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let worker_count: usize = parse(&lookup, "WORKER_COUNT", "a positive integer")?
            .unwrap_or(defaults.worker_count);
        let queue_capacity: usize = parse(&lookup, "QUEUE_CAPACITY", "a positive integer")?
            .unwrap_or(defaults.queue_capacity);
        let max_task_retries: u32 =
            parse(&lookup, "MAX_TASK_RETRIES", "an integer between 0 and 10")?
                .unwrap_or(defaults.max_task_retries);
        let timeout_secs: u64 = parse(&lookup, "TASK_TIMEOUT_SECONDS", "a positive integer")?
            .unwrap_or(defaults.task_timeout.as_secs());
        let base_ms: u64 = parse(&lookup, "RETRY_BASE_DELAY_MS", "an integer")?
            .unwrap_or(defaults.retry_policy.base_delay.as_millis() as u64);
        let max_ms: u64 = parse(&lookup, "RETRY_MAX_DELAY_MS", "an integer")?
            .unwrap_or(defaults.retry_policy.max_delay.as_millis() as u64);
        let strategy: BackoffStrategy =
            parse(&lookup, "RETRY_STRATEGY", "one of fixed, linear, exponential")?
                .unwrap_or(defaults.retry_policy.strategy);

        positive("WORKER_COUNT", worker_count as u64)?;
        positive("QUEUE_CAPACITY", queue_capacity as u64)?;
        positive("TASK_TIMEOUT_SECONDS", timeout_secs)?;
        if max_task_retries > taskmill_jobs::params::MAX_RETRIES_LIMIT {
            return Err(ConfigError::Invalid {
                key: "MAX_TASK_RETRIES",
                expected: "an integer between 0 and 10",
                value: max_task_retries.to_string(),
            });
        }
        if max_ms < base_ms {
            return Err(ConfigError::Invalid {
                key: "RETRY_MAX_DELAY_MS",
                expected: "at least RETRY_BASE_DELAY_MS",
                value: max_ms.to_string(),
            });
        }

        Ok(Self {
            worker_count,
            queue_capacity,
            max_task_retries,
            task_timeout: Duration::from_secs(timeout_secs),
            retry_policy: RetryPolicy {
                strategy,
                ..RetryPolicy::exponential(
                    Duration::from_millis(base_ms),
                    Duration::from_millis(max_ms),
                )
            },
        })
    }
}

fn parse<T, F>(lookup: &F, key: &'static str, expected: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                key,
                expected,
                value: raw,
            }),
    }
}

fn positive(key: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            key,
            expected: "a positive integer",
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<EngineConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.queue_capacity, 1024);
        assert_eq!(config.max_task_retries, 3);
        assert_eq!(config.task_timeout, Duration::from_secs(300));
        assert_eq!(config.retry_policy.base_delay, Duration::from_millis(500));
        assert_eq!(config.retry_policy.max_delay, Duration::from_secs(30));
        assert_eq!(config.retry_policy.strategy, BackoffStrategy::Exponential);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = from_pairs(&[
            ("WORKER_COUNT", "2"),
            ("MAX_TASK_RETRIES", "0"),
            ("TASK_TIMEOUT_SECONDS", " 5 "),
            ("RETRY_BASE_DELAY_MS", "10"),
            ("RETRY_MAX_DELAY_MS", "100"),
            ("RETRY_STRATEGY", "linear"),
        ])
        .unwrap();
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.max_task_retries, 0);
        assert_eq!(config.task_timeout, Duration::from_secs(5));
        assert_eq!(config.retry_policy.max_delay, Duration::from_millis(100));
        assert_eq!(config.retry_policy.strategy, BackoffStrategy::Linear);
        let third = config.retry_policy.delay_for_attempt(3);
        assert!(third >= Duration::from_millis(27) && third <= Duration::from_millis(33));
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(from_pairs(&[("WORKER_COUNT", "many")]).is_err());
        assert!(from_pairs(&[("WORKER_COUNT", "0")]).is_err());
        assert!(from_pairs(&[("MAX_TASK_RETRIES", "11")]).is_err());
        assert!(from_pairs(&[("RETRY_STRATEGY", "random")]).is_err());
        assert!(from_pairs(&[("RETRY_BASE_DELAY_MS", "5000"), ("RETRY_MAX_DELAY_MS", "10")]).is_err());
    }
}
