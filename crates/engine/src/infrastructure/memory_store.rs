//! In-memory state store.
//!
//! DashMap-backed `StateStore` with optimistic-concurrency conflict
//! detection. Used by tests and embedding consumers; production
//! deployments plug in a real persistence adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use taleweaver_domain::{CampaignId, GameState};

use crate::infrastructure::ports::{StateStore, StateStoreError};

#[derive(Default)]
pub struct InMemoryStateStore {
    states: DashMap<CampaignId, GameState>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a campaign state without a concurrency check (initial seed).
    pub fn seed(&self, state: GameState) {
        self.states.insert(state.campaign_id, state);
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load(&self, campaign_id: CampaignId) -> Result<GameState, StateStoreError> {
        self.states
            .get(&campaign_id)
            .map(|entry| entry.clone())
            .ok_or(StateStoreError::NotFound(campaign_id))
    }

    async fn save(
        &self,
        campaign_id: CampaignId,
        state: GameState,
        expected_timestamp: DateTime<Utc>,
    ) -> Result<(), StateStoreError> {
        if let Some(current) = self.states.get(&campaign_id) {
            let found = current.last_state_update_timestamp;
            if found != expected_timestamp {
                return Err(StateStoreError::Conflict {
                    expected: expected_timestamp,
                    found,
                });
            }
        }
        self.states.insert(campaign_id, state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> GameState {
        GameState::new(CampaignId::new(), "Cell")
    }

    #[tokio::test]
    async fn load_returns_seeded_state() {
        let store = InMemoryStateStore::new();
        let state = sample_state();
        let campaign_id = state.campaign_id;
        store.seed(state);

        let loaded = store.load(campaign_id).await.expect("seeded");
        assert_eq!(loaded.location, "Cell");
    }

    #[tokio::test]
    async fn load_unknown_campaign_is_not_found() {
        let store = InMemoryStateStore::new();
        let result = store.load(CampaignId::new()).await;
        assert!(matches!(result, Err(StateStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn save_with_matching_timestamp_succeeds() {
        let store = InMemoryStateStore::new();
        let state = sample_state();
        let campaign_id = state.campaign_id;
        let read_timestamp = state.last_state_update_timestamp;
        store.seed(state.clone());

        let mut updated = state;
        updated.location = "Corridor".into();
        updated.last_state_update_timestamp = Utc::now();

        store
            .save(campaign_id, updated, read_timestamp)
            .await
            .expect("no concurrent writer");

        let loaded = store.load(campaign_id).await.expect("present");
        assert_eq!(loaded.location, "Corridor");
    }

    #[tokio::test]
    async fn save_with_stale_timestamp_conflicts() {
        let store = InMemoryStateStore::new();
        let state = sample_state();
        let campaign_id = state.campaign_id;
        let read_timestamp = state.last_state_update_timestamp;
        store.seed(state.clone());

        // A concurrent writer lands first.
        let mut other = state.clone();
        other.last_state_update_timestamp = Utc::now();
        store
            .save(campaign_id, other, read_timestamp)
            .await
            .expect("first writer wins");

        // Our save with the stale read timestamp must conflict.
        let result = store.save(campaign_id, state, read_timestamp).await;
        assert!(matches!(result, Err(StateStoreError::Conflict { .. })));
    }
}
