//! Combat state - initiative order and round tracking

use serde::{Deserialize, Serialize};

use crate::EntityId;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CombatState {
    pub active: bool,
    pub round: u32,
    /// Entity IDs in initiative order
    #[serde(default)]
    pub initiative: Vec<EntityId>,
}

impl CombatState {
    pub fn begin(initiative: Vec<EntityId>) -> Self {
        Self {
            active: true,
            round: 1,
            initiative,
        }
    }

    pub fn next_round(&self) -> CombatState {
        CombatState {
            active: self.active,
            round: self.round + 1,
            initiative: self.initiative.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_starts_at_round_one() {
        let combat = CombatState::begin(vec![EntityId::new(), EntityId::new()]);
        assert!(combat.active);
        assert_eq!(combat.round, 1);
        assert_eq!(combat.next_round().round, 2);
    }
}
