// crates/quarry-server/src/config/file.rs
// File-based configuration from ~/.quarry/config.toml

use crate::resilience::{BreakerConfig, RetryPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Top-level config structure
#[derive(Debug, Deserialize, Default)]
pub struct QuarryConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub resilience: ResilienceSection,
}

/// `[llm]` section, overrides the environment
#[derive(Debug, Deserialize, Default)]
pub struct LlmSection {
    pub reasoning_model: Option<String>,
    pub fast_model: Option<String>,
}

/// `[resilience]` section. Unset keys keep the built-in tuning.
#[derive(Debug, Deserialize, Default)]
pub struct ResilienceSection {
    pub failure_threshold: Option<u32>,
    pub success_threshold: Option<u32>,
    pub streaming_recovery_secs: Option<u64>,
    pub completion_recovery_secs: Option<u64>,
    pub stream_max_attempts: Option<u32>,
    pub call_max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub stream_idle_timeout_secs: Option<u64>,
    pub stream_max_secs: Option<u64>,
    pub llm_timeout_secs: Option<u64>,
    pub search_timeout_secs: Option<u64>,
}

impl ResilienceSection {
    fn breaker(&self, base: BreakerConfig, recovery_secs: Option<u64>) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold.unwrap_or(base.failure_threshold),
            success_threshold: self.success_threshold.unwrap_or(base.success_threshold),
            recovery_timeout: recovery_secs
                .map(Duration::from_secs)
                .unwrap_or(base.recovery_timeout),
        }
    }

    pub fn streaming_breaker(&self) -> BreakerConfig {
        self.breaker(BreakerConfig::streaming(), self.streaming_recovery_secs)
    }

    pub fn completion_breaker(&self) -> BreakerConfig {
        self.breaker(BreakerConfig::completion(), self.completion_recovery_secs)
    }

    fn policy(&self, base: RetryPolicy, attempts: Option<u32>) -> RetryPolicy {
        RetryPolicy {
            max_attempts: attempts.unwrap_or(base.max_attempts),
            base_delay: self
                .base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(base.base_delay),
            ..base
        }
    }

    pub fn connection_policy(&self) -> RetryPolicy {
        self.policy(RetryPolicy::connection_establishment(), self.stream_max_attempts)
    }

    pub fn full_call_policy(&self) -> RetryPolicy {
        self.policy(RetryPolicy::full_call(), self.call_max_attempts)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        self.stream_idle_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(crate::http::STREAM_IDLE_TIMEOUT)
    }

    pub fn stream_max(&self) -> Duration {
        self.stream_max_secs
            .map(Duration::from_secs)
            .unwrap_or(crate::http::STREAM_MAX_DURATION)
    }

    /// LLM full-call timeout, also the header wait when opening a stream
    pub fn llm_timeout(&self) -> Duration {
        self.llm_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(crate::http::LLM_TIMEOUT)
    }

    pub fn search_timeout(&self) -> Duration {
        self.search_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(crate::http::SEARCH_TIMEOUT)
    }
}

impl QuarryConfig {
    /// Load config from ~/.quarry/config.toml
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load from an explicit path, falling back to defaults on any problem
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded config from file");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
        }
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        super::quarry_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_config() {
        let toml = r#"
[llm]
reasoning_model = "o4-mini"

[resilience]
failure_threshold = 3
streaming_recovery_secs = 5
call_max_attempts = 4
base_delay_ms = 100
llm_timeout_secs = 30
stream_max_secs = 120
"#;
        let config: QuarryConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.llm.reasoning_model.as_deref(), Some("o4-mini"));
        assert!(config.llm.fast_model.is_none());

        let streaming = config.resilience.streaming_breaker();
        assert_eq!(streaming.failure_threshold, 3);
        assert_eq!(streaming.recovery_timeout, Duration::from_secs(5));
        assert_eq!(streaming.success_threshold, 2);

        let completion = config.resilience.completion_breaker();
        assert_eq!(completion.recovery_timeout, Duration::from_secs(60));

        let policy = config.resilience.full_call_policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.base_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_secs(10));

        assert_eq!(config.resilience.llm_timeout(), Duration::from_secs(30));
        assert_eq!(config.resilience.stream_max(), Duration::from_secs(120));
        assert_eq!(config.resilience.search_timeout(), crate::http::SEARCH_TIMEOUT);
    }

    #[test]
    fn test_parse_empty_config() {
        let config: QuarryConfig = toml::from_str("").unwrap();
        assert_eq!(config.resilience.streaming_breaker(), BreakerConfig::streaming());
        assert_eq!(config.resilience.connection_policy().max_attempts, 2);
        assert_eq!(config.resilience.stream_idle_timeout(), crate::http::STREAM_IDLE_TIMEOUT);
        assert_eq!(config.resilience.stream_max(), crate::http::STREAM_MAX_DURATION);
        assert_eq!(config.resilience.llm_timeout(), crate::http::LLM_TIMEOUT);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[llm]\nfast_model = \"gpt-4.1-nano\"").unwrap();
        let config = QuarryConfig::load_from(file.path());
        assert_eq!(config.llm.fast_model.as_deref(), Some("gpt-4.1-nano"));
    }

    #[test]
    fn test_invalid_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[resilience\nbroken").unwrap();
        let config = QuarryConfig::load_from(file.path());
        assert!(config.llm.reasoning_model.is_none());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = QuarryConfig::load_from(&dir.path().join("absent.toml"));
        assert!(config.resilience.failure_threshold.is_none());
    }
}
