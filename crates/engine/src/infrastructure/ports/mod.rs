//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Ports exist for:
//! - The generation backend (could swap Ollama -> Claude/OpenAI)
//! - Campaign state persistence (could swap memory -> a real store)
//! - Prompt assembly (owned by an upstream collaborator)

mod error;
mod external;

pub use error::{GenerationError, StateStoreError};
pub use external::{GeneratedText, GenerationPort, GenerationRequest, PromptPort, StateStore};

// =============================================================================
// Test-Only Mocks (only available during test builds)
// =============================================================================
#[cfg(test)]
pub use external::{MockGenerationPort, MockPromptPort, MockStateStore};
