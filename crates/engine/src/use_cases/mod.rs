//! Use cases - the turn pipeline stages.
//!
//! Each module owns one stage of the synchronization pipeline. Stages are
//! synchronous, in-memory, and pure apart from tracing; the only suspension
//! points live in the `turn` orchestrator (generation calls and recovery
//! backoff sleeps).

pub mod manifest;
pub mod merge;
pub mod parsing;
pub mod planning;
pub mod recovery;
pub mod turn;
pub mod validation;

// Re-export main types
pub use manifest::{build_scene_manifest, EntityActivity, ManifestEntity, SceneManifest};
pub use merge::{MergeOutcome, RejectedField, StateMerger};
pub use parsing::{parse_backend_output, NarrativeResponse, ParseStrategy, ResponseSchema};
pub use planning::{extract_planning_choices, render_planning_block, PlanningChoice, RiskLevel};
pub use recovery::{RecoveryConfig, RecoveryCoordinator, RecoveryDirective, RecoveryState};
pub use turn::{ProcessTurn, TurnError, TurnRequest};
pub use validation::{validate_narrative, Strictness, ValidationResult};
