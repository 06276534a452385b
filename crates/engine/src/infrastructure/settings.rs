//! Engine settings.
//!
//! Operational configuration for one engine instance: validation
//! strictness, recovery budgets, and generation backend connection details.
//! Values come from the environment (a `.env` file is honored) with
//! defaults tuned for local Ollama-class backends.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::use_cases::recovery::RecoveryConfig;
use crate::use_cases::validation::Strictness;

/// Default generation backend URL (OpenAI-compatible API).
pub const DEFAULT_BACKEND_BASE_URL: &str = "http://localhost:11434";

/// Default generation model.
pub const DEFAULT_BACKEND_MODEL: &str = "llama3.1:8b";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Narrative validation strictness (tunable per deployment)
    pub strictness: Strictness,
    /// Maximum re-generation attempts per turn beyond the first
    pub retry_budget: u32,
    /// Base recovery backoff in milliseconds; doubles per attempt
    pub base_backoff_ms: u64,
    /// Bound on total recovery time within one turn, in seconds
    pub total_recovery_timeout_secs: u64,
    /// Consecutive session failures before safe mode
    pub circuit_breaker_threshold: u32,
    /// Safe-mode triggers per session before escalation
    pub safe_mode_session_limit: u32,
    /// Per-call generation timeout in seconds
    pub generation_timeout_secs: u64,
    /// Generation backend base URL
    pub backend_base_url: String,
    /// Generation backend model name
    pub backend_model: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            strictness: Strictness::Normal,
            retry_budget: 3,
            base_backoff_ms: 1_000,
            total_recovery_timeout_secs: 30,
            circuit_breaker_threshold: 3,
            safe_mode_session_limit: 5,
            generation_timeout_secs: 60,
            backend_base_url: DEFAULT_BACKEND_BASE_URL.to_string(),
            backend_model: DEFAULT_BACKEND_MODEL.to_string(),
        }
    }
}

impl EngineSettings {
    /// Load settings from environment variables, falling back to defaults.
    ///
    /// Honors a local `.env` file. Variables: `TALEWEAVER_STRICTNESS`,
    /// `TALEWEAVER_RETRY_BUDGET`, `TALEWEAVER_BASE_BACKOFF_MS`,
    /// `TALEWEAVER_RECOVERY_TIMEOUT_SECS`, `TALEWEAVER_BREAKER_THRESHOLD`,
    /// `TALEWEAVER_SAFE_MODE_LIMIT`, `TALEWEAVER_GENERATION_TIMEOUT_SECS`,
    /// `TALEWEAVER_BACKEND_URL`, `TALEWEAVER_BACKEND_MODEL`.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Self {
            strictness: env_parse("TALEWEAVER_STRICTNESS", defaults.strictness),
            retry_budget: env_parse("TALEWEAVER_RETRY_BUDGET", defaults.retry_budget),
            base_backoff_ms: env_parse("TALEWEAVER_BASE_BACKOFF_MS", defaults.base_backoff_ms),
            total_recovery_timeout_secs: env_parse(
                "TALEWEAVER_RECOVERY_TIMEOUT_SECS",
                defaults.total_recovery_timeout_secs,
            ),
            circuit_breaker_threshold: env_parse(
                "TALEWEAVER_BREAKER_THRESHOLD",
                defaults.circuit_breaker_threshold,
            ),
            safe_mode_session_limit: env_parse(
                "TALEWEAVER_SAFE_MODE_LIMIT",
                defaults.safe_mode_session_limit,
            ),
            generation_timeout_secs: env_parse(
                "TALEWEAVER_GENERATION_TIMEOUT_SECS",
                defaults.generation_timeout_secs,
            ),
            backend_base_url: std::env::var("TALEWEAVER_BACKEND_URL")
                .unwrap_or(defaults.backend_base_url),
            backend_model: std::env::var("TALEWEAVER_BACKEND_MODEL")
                .unwrap_or(defaults.backend_model),
        }
    }

    pub fn recovery_config(&self) -> RecoveryConfig {
        RecoveryConfig {
            retry_budget: self.retry_budget,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            total_timeout: Duration::from_secs(self.total_recovery_timeout_secs),
            circuit_breaker_threshold: self.circuit_breaker_threshold,
            safe_mode_session_limit: self.safe_mode_session_limit,
        }
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_budgets() {
        let settings = EngineSettings::default();
        assert_eq!(settings.retry_budget, 3);
        assert_eq!(settings.base_backoff_ms, 1_000);
        assert_eq!(settings.total_recovery_timeout_secs, 30);
        assert_eq!(settings.circuit_breaker_threshold, 3);
        assert_eq!(settings.safe_mode_session_limit, 5);
        assert_eq!(settings.strictness, Strictness::Normal);
    }

    #[test]
    fn recovery_config_mirrors_settings() {
        let settings = EngineSettings {
            retry_budget: 2,
            base_backoff_ms: 50,
            ..EngineSettings::default()
        };
        let config = settings.recovery_config();
        assert_eq!(config.retry_budget, 2);
        assert_eq!(config.base_backoff, Duration::from_millis(50));
        assert_eq!(config.total_timeout, Duration::from_secs(30));
    }
}
