//! External collaborator port traits (generation backend, persistence,
//! prompt assembly).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use taleweaver_domain::{CampaignId, GameState};

use super::error::{GenerationError, StateStoreError};
use crate::use_cases::manifest::SceneManifest;
use crate::use_cases::parsing::ResponseSchema;
use crate::use_cases::validation::ValidationResult;

// =============================================================================
// Generation Types
// =============================================================================

/// One request to the generation backend.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Fully assembled prompt (built by the prompt collaborator)
    pub prompt: String,
    /// Field names the response is expected to contain
    pub schema_hint: ResponseSchema,
    /// Per-call timeout the adapter must enforce
    pub timeout: Duration,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, schema_hint: ResponseSchema) -> Self {
        Self {
            prompt: prompt.into(),
            schema_hint,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Raw text from the generation backend. Untrusted until parsed.
#[derive(Debug, Clone)]
pub struct GeneratedText {
    pub content: String,
    /// True when the backend stopped at its token limit; the parser's
    /// salvage strategy usually still recovers the narrative
    pub truncated: bool,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationPort: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedText, GenerationError>;
}

// =============================================================================
// Persistence Port
// =============================================================================

/// Keyed load/save with optimistic concurrency.
///
/// The engine passes back the timestamp it read so the store can detect
/// concurrent writers; conflicts are surfaced unchanged.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, campaign_id: CampaignId) -> Result<GameState, StateStoreError>;

    async fn save(
        &self,
        campaign_id: CampaignId,
        state: GameState,
        expected_timestamp: DateTime<Utc>,
    ) -> Result<(), StateStoreError>;
}

// =============================================================================
// Prompt Assembly Port
// =============================================================================

/// Prompt assembly is an upstream collaborator; the engine only consumes
/// its output. The retry variant amends the context with what went wrong so
/// the backend can correct itself.
#[cfg_attr(test, mockall::automock)]
pub trait PromptPort: Send + Sync {
    fn build_turn_prompt(
        &self,
        state: &GameState,
        manifest: &SceneManifest,
        player_action: &str,
    ) -> String;

    fn build_retry_prompt(
        &self,
        state: &GameState,
        manifest: &SceneManifest,
        player_action: &str,
        failure: &ValidationResult,
    ) -> String;
}
