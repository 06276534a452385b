//! GameState - the canonical, persisted simulation truth.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CampaignId, CombatState, DomainError, Entity, GameClock, Mission};

/// The authoritative campaign state for one campaign.
///
/// Loaded once per request by the persistence collaborator, mutated in memory
/// only by the engine's state merger, and handed back for persistence with a
/// refreshed `last_state_update_timestamp`. Mapping fields use `BTreeMap` so
/// serialization and merge iteration are deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub campaign_id: CampaignId,
    /// Name of the current scene's location
    pub location: String,
    /// Full roster: player characters, NPCs, and hazards across all locations
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub combat: Option<CombatState>,
    #[serde(default)]
    pub clock: GameClock,
    #[serde(default)]
    pub missions: Vec<Mission>,
    /// Relationship ledger: entity or faction name -> standing
    #[serde(default)]
    pub relationships: BTreeMap<String, i64>,
    /// Reputation ledger: faction name -> standing
    #[serde(default)]
    pub reputation: BTreeMap<String, i64>,
    /// Protected narrative memories; additive-only under the merge policy
    #[serde(default)]
    pub core_memories: Vec<String>,
    pub last_state_update_timestamp: DateTime<Utc>,
}

impl GameState {
    pub fn new(campaign_id: CampaignId, location: impl Into<String>) -> Self {
        Self {
            campaign_id,
            location: location.into(),
            entities: Vec::new(),
            combat: None,
            clock: GameClock::default(),
            missions: Vec::new(),
            relationships: BTreeMap::new(),
            reputation: BTreeMap::new(),
            core_memories: Vec::new(),
            last_state_update_timestamp: Utc::now(),
        }
    }

    pub fn with_entities(mut self, entities: Vec<Entity>) -> Self {
        self.entities = entities;
        self
    }

    pub fn with_missions(mut self, missions: Vec<Mission>) -> Self {
        self.missions = missions;
        self
    }

    pub fn with_core_memories(
        mut self,
        memories: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.core_memories = memories.into_iter().map(Into::into).collect();
        self
    }

    /// Entities whose location matches the current scene.
    pub fn entities_at_current_location(&self) -> Vec<&Entity> {
        self.entities
            .iter()
            .filter(|e| e.is_at(&self.location))
            .collect()
    }

    /// Validate the structural invariants persistence relies on.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.location.trim().is_empty() {
            return Err(DomainError::validation("location cannot be empty"));
        }
        for entity in &self.entities {
            if entity.name.trim().is_empty() {
                return Err(DomainError::validation("entity name cannot be empty"));
            }
        }
        Ok(())
    }
}
