//! Entity - any roster member the simulation tracks at a location.
//!
//! Player characters, NPCs, and environmental hazards share one record shape;
//! `kind` distinguishes them. `status` is a free-form tag list written by the
//! engine's state merger; the scene manifest interprets the tags it knows
//! (hidden, unconscious, departed, ...) and ignores the rest.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::EntityId;

/// What kind of roster member this is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    PlayerCharacter,
    Npc,
    Hazard,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::PlayerCharacter => write!(f, "player_character"),
            EntityKind::Npc => write!(f, "npc"),
            EntityKind::Hazard => write!(f, "hazard"),
        }
    }
}

/// A roster member with attributes, status tags, and an inventory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    /// Location name this entity currently occupies
    pub location: String,
    /// Free-form status tags ("hidden", "unconscious", "poisoned", ...)
    #[serde(default)]
    pub status: Vec<String>,
    /// Alias strings the narrative may use for this entity ("the old knight")
    #[serde(default)]
    pub descriptors: Vec<String>,
    /// Numeric attributes (health, strength, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, i64>,
    #[serde(default)]
    pub inventory: Vec<String>,
}

impl Entity {
    pub fn new(name: impl Into<String>, kind: EntityKind, location: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            kind,
            location: location.into(),
            status: Vec::new(),
            descriptors: Vec::new(),
            attributes: BTreeMap::new(),
            inventory: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.status = status.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_descriptors(
        mut self,
        descriptors: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.descriptors = descriptors.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: i64) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn with_inventory(mut self, items: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.inventory = items.into_iter().map(Into::into).collect();
        self
    }

    /// Case-insensitive location check.
    pub fn is_at(&self, location: &str) -> bool {
        self.location.eq_ignore_ascii_case(location)
    }

    /// Case-insensitive status tag check.
    pub fn has_status(&self, tag: &str) -> bool {
        self.status.iter().any(|s| s.eq_ignore_ascii_case(tag))
    }
}
