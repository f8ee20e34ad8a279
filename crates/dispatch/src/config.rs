//! Startup configuration of the dispatch core.
//!
//! The completion mode is decided once, when the process starts, and injected into the
//! [`Dispatcher`](crate::Dispatcher). Configuration can come from json, from the environment
//! or be built in code:
//!
//! ```
//! use micro_dispatch::{CompletionMode, DispatchConfig, QueueConfig};
//! use std::time::Duration;
//!
//! let config = DispatchConfig::default()
//!     .with_completion(CompletionMode::Native)
//!     .with_queue(QueueConfig::default().with_workers(2).with_timeout(Duration::from_millis(250)));
//! assert_eq!(config.queue().workers(), 2);
//! ```

use crate::completion::CompletionMode;
use crate::error::ConfigError;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;
use std::time::Duration;

pub const ENV_COMPLETION_MODE: &str = "DISPATCH_COMPLETION_MODE";
pub const ENV_QUEUE_CAPACITY: &str = "DISPATCH_QUEUE_CAPACITY";
pub const ENV_QUEUE_WORKERS: &str = "DISPATCH_QUEUE_WORKERS";
pub const ENV_QUEUE_TIMEOUT_MS: &str = "DISPATCH_QUEUE_TIMEOUT_MS";

const DEFAULT_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_QUEUE_WORKERS: usize = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    completion: CompletionMode,
    queue: QueueConfig,
}

impl DispatchConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.queue.validate()?;
        Ok(config)
    }

    /// Reads the `DISPATCH_*` environment variables; unset ones keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(mode) = lookup(ENV_COMPLETION_MODE) {
            config.completion = CompletionMode::from_str(&mode)?;
        }
        if let Some(capacity) = lookup(ENV_QUEUE_CAPACITY) {
            config.queue.capacity = parse_number(ENV_QUEUE_CAPACITY, &capacity)?;
        }
        if let Some(workers) = lookup(ENV_QUEUE_WORKERS) {
            config.queue.workers = parse_number(ENV_QUEUE_WORKERS, &workers)?;
        }
        if let Some(timeout) = lookup(ENV_QUEUE_TIMEOUT_MS) {
            config.queue.timeout = Some(Duration::from_millis(parse_number(ENV_QUEUE_TIMEOUT_MS, &timeout)?));
        }

        config.queue.validate()?;
        Ok(config)
    }

    pub fn with_completion(mut self, completion: CompletionMode) -> Self {
        self.completion = completion;
        self
    }

    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    pub fn completion(&self) -> CompletionMode {
        self.completion
    }

    pub fn queue(&self) -> &QueueConfig {
        &self.queue
    }
}

/// Sizing of the async worker queue.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    capacity: usize,
    workers: usize,
    #[serde(rename = "timeout_ms", deserialize_with = "millis")]
    timeout: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: DEFAULT_QUEUE_CAPACITY, workers: DEFAULT_QUEUE_WORKERS, timeout: None }
    }
}

impl QueueConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Tasks that waited longer than `timeout` are answered without running.
    ///
    /// Kept at full precision; only json and the environment are limited to milliseconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::InvalidValue { key: "queue capacity", value: self.capacity.to_string() });
        }
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue { key: "queue workers", value: self.workers.to_string() });
        }
        Ok(())
    }
}

fn millis<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
}

fn parse_number<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue { key, value: value.to_string() })
}

#[cfg(test)]
mod tests {
    use super::{DispatchConfig, ENV_COMPLETION_MODE, ENV_QUEUE_CAPACITY, ENV_QUEUE_TIMEOUT_MS, QueueConfig};
    use crate::completion::CompletionMode;
    use crate::error::ConfigError;
    use std::collections::HashMap;
    use std::time::Duration;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<HashMap<_, _>>();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.completion(), CompletionMode::Blocking);
        assert_eq!(config.queue().capacity(), 1024);
        assert_eq!(config.queue().workers(), 1);
        assert_eq!(config.queue().timeout(), None);
    }

    #[test]
    fn from_json_with_partial_fields() {
        let config = DispatchConfig::from_json(r#"{"completion":"native","queue":{"timeout_ms":250}}"#).unwrap();
        assert_eq!(config.completion(), CompletionMode::Native);
        assert_eq!(config.queue().capacity(), 1024);
        assert_eq!(config.queue().timeout(), Some(Duration::from_millis(250)));

        assert!(matches!(DispatchConfig::from_json(r#"{"completion":"servlet"}"#), Err(ConfigError::Malformed(_))));
        assert!(matches!(DispatchConfig::from_json(r#"{"queue":{"workers":0}}"#), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn from_lookup_overrides_defaults() {
        let config = DispatchConfig::from_lookup(lookup(&[
            (ENV_COMPLETION_MODE, "NATIVE"),
            (ENV_QUEUE_CAPACITY, "16"),
            (ENV_QUEUE_TIMEOUT_MS, "10"),
        ]))
        .unwrap();

        let expected = DispatchConfig::default()
            .with_completion(CompletionMode::Native)
            .with_queue(QueueConfig::default().with_capacity(16).with_timeout(Duration::from_millis(10)));
        assert_eq!(config, expected);
    }

    #[test]
    fn from_lookup_rejects_garbage() {
        assert!(matches!(
            DispatchConfig::from_lookup(lookup(&[(ENV_COMPLETION_MODE, "servlet")])),
            Err(ConfigError::UnknownCompletionMode(_))
        ));
        assert!(matches!(
            DispatchConfig::from_lookup(lookup(&[(ENV_QUEUE_CAPACITY, "lots")])),
            Err(ConfigError::InvalidValue { key: ENV_QUEUE_CAPACITY, .. })
        ));
        assert!(DispatchConfig::from_lookup(lookup(&[])).is_ok());
    }

    #[test]
    fn sub_millisecond_budget_is_kept() {
        let queue = QueueConfig::default().with_timeout(Duration::from_micros(900));
        assert_eq!(queue.timeout(), Some(Duration::from_micros(900)));

        let queue = QueueConfig::default().with_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(queue.timeout(), Some(Duration::from_secs(u64::MAX)));
    }

    #[test]
    fn json_budget_is_in_milliseconds() {
        let config = DispatchConfig::from_json(r#"{"queue":{"timeout_ms":null}}"#).unwrap();
        assert_eq!(config.queue().timeout(), None);

        let config = DispatchConfig::from_json(r#"{"queue":{"timeout_ms":1500}}"#).unwrap();
        assert_eq!(config.queue().timeout(), Some(Duration::from_millis(1500)));
    }
}
