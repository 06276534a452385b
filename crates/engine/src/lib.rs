//! Taleweaver Engine library.
//!
//! The narrative-state synchronization engine: everything between a raw
//! generative-backend reply and the sanitized turn output the API layer is
//! allowed to see.
//!
//! ## Structure
//!
//! - `use_cases/` - The request-scoped pipeline stages (manifest, parsing,
//!   planning, validation, merge, recovery) and the `ProcessTurn`
//!   orchestrator that wires them together
//! - `infrastructure/` - Port traits for the external collaborators
//!   (generation backend, persistence, prompt assembly) plus adapters

pub mod infrastructure;
pub mod use_cases;

pub use use_cases::turn::{ProcessTurn, TurnError, TurnRequest};
