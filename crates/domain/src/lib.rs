//! Taleweaver Domain library.
//!
//! Canonical simulation types for the narrative-state synchronization engine:
//! the persisted `GameState`, the entity roster, missions, combat, the game
//! clock, and the unified `DomainError`.
//!
//! Within one request pipeline every read of `GameState` comes from a single
//! immutable snapshot; mutations happen only through the engine's state
//! merger and are never applied partially.

pub mod entities;
pub mod error;
pub mod game_state;
pub mod game_time;
pub mod ids;

pub use entities::{CombatState, Entity, EntityKind, Mission, MissionStatus};
pub use error::DomainError;
pub use game_state::GameState;
pub use game_time::{GameClock, TimeOfDay};
pub use ids::{ActionId, CampaignId, EntityId, MissionId, SessionId};
