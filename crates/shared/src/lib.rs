//! Taleweaver Protocol - Shared types crossing the engine boundary
//!
//! This crate contains the types the engine exposes to its API/UI consumers:
//! - Turn output DTOs (the sanitized result of one pipeline run)
//! - Planning choice DTOs (already-extracted, clickable choices)
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - Only serde and serde_json
//! 2. **No business logic** - Pure data types and serialization
//! 3. **No raw backend text** - Narrative is contractually plain text; the
//!    planning block's raw text never crosses this boundary, only the
//!    extracted choices do.

pub mod responses;

pub use responses::{PlanningChoiceInfo, TurnOutput};
