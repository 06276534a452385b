//! Error types for infrastructure ports.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use taleweaver_domain::CampaignId;

/// Errors from the generation backend.
///
/// The engine treats every variant like a parse failure: the attempt is
/// routed into recovery, never surfaced to a user.
#[derive(Debug, Error, Clone)]
pub enum GenerationError {
    #[error("Generation request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid generation response: {0}")]
    InvalidResponse(String),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors from the persistence collaborator.
#[derive(Debug, Error, Clone)]
pub enum StateStoreError {
    #[error("Campaign state not found: {0}")]
    NotFound(CampaignId),

    /// A concurrent writer changed the state since it was read. Surfaced
    /// unchanged; resolving it is the persistence layer's concern.
    #[error("Concurrent write detected: expected timestamp {expected}, found {found}")]
    Conflict {
        expected: DateTime<Utc>,
        found: DateTime<Utc>,
    },

    #[error("State backend error: {0}")]
    Backend(String),
}
