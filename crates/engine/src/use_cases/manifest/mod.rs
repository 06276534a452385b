//! Scene manifest generation.
//!
//! Derives the authoritative "who is present" view for the current location
//! from a `GameState` snapshot, with a normalized descriptor index so later
//! stages look entities up by hash instead of scanning the narrative per
//! entity.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use taleweaver_domain::{EntityId, EntityKind, GameState};

/// Status tags that exclude an entity from the manifest entirely.
const ABSENT_MARKERS: [&str; 4] = ["departed", "removed", "dead", "absent"];

/// Status tags that mark an entity present but hidden from the scene.
const HIDDEN_MARKERS: [&str; 3] = ["hidden", "invisible", "concealed"];

/// Status tags that mark an entity present but inactive.
const UNCONSCIOUS_MARKERS: [&str; 3] = ["unconscious", "sleeping", "comatose"];

/// How an entity participates in the current scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityActivity {
    /// Present and able to act; the validator may require a mention
    Active,
    /// Present but concealed; mentioned-or-not is never an error
    Hidden,
    /// Present but out of action; mentioned-or-not is never an error
    Unconscious,
}

impl std::fmt::Display for EntityActivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityActivity::Active => write!(f, "active"),
            EntityActivity::Hidden => write!(f, "hidden"),
            EntityActivity::Unconscious => write!(f, "unconscious"),
        }
    }
}

/// One entity's manifest record.
#[derive(Debug, Clone)]
pub struct ManifestEntity {
    pub id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    pub status: Vec<String>,
    pub descriptors: Vec<String>,
    pub activity: EntityActivity,
}

/// Derived, read-only view of which entities are present at the current
/// location.
///
/// Regenerated whenever the snapshot's timestamp changes; cached for the
/// remainder of one request keyed by that timestamp, never across requests.
#[derive(Debug, Clone)]
pub struct SceneManifest {
    pub location: String,
    pub entities: Vec<ManifestEntity>,
    /// Timestamp of the snapshot this manifest was derived from
    pub generated_at: DateTime<Utc>,
    pub entity_count: usize,
    /// Set when the snapshot was malformed and the manifest is degraded
    pub error: Option<String>,
    descriptor_index: HashMap<String, EntityId>,
}

impl SceneManifest {
    /// A degraded manifest for a malformed snapshot.
    pub fn empty_with_error(generated_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            location: String::new(),
            entities: Vec::new(),
            generated_at,
            entity_count: 0,
            error: Some(error.into()),
            descriptor_index: HashMap::new(),
        }
    }

    /// Look up an entity by name or descriptor phrase. Input is normalized
    /// the same way the index was built.
    pub fn lookup(&self, phrase: &str) -> Option<EntityId> {
        self.descriptor_index.get(&normalize_phrase(phrase)).copied()
    }

    /// The normalized descriptor index (phrase -> entity id).
    pub fn descriptor_index(&self) -> &HashMap<String, EntityId> {
        &self.descriptor_index
    }

    pub fn entity(&self, id: EntityId) -> Option<&ManifestEntity> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Entities the validator may require the narrative to mention.
    pub fn active_entities(&self) -> Vec<&ManifestEntity> {
        self.entities
            .iter()
            .filter(|e| e.activity == EntityActivity::Active)
            .collect()
    }
}

/// Normalizes a name or descriptor for matching: lowercase, punctuation
/// treated as whitespace, consecutive whitespace collapsed. Narrative
/// tokens are canonicalized the same way, so index lookups stay exact.
pub fn normalize_phrase(phrase: &str) -> String {
    let cleaned: String = phrase
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn classify_activity(status: &[String]) -> Option<EntityActivity> {
    let has_any = |markers: &[&str]| {
        status
            .iter()
            .any(|s| markers.iter().any(|m| s.eq_ignore_ascii_case(m)))
    };

    if has_any(&ABSENT_MARKERS) {
        return None;
    }
    if has_any(&HIDDEN_MARKERS) {
        return Some(EntityActivity::Hidden);
    }
    if has_any(&UNCONSCIOUS_MARKERS) {
        return Some(EntityActivity::Unconscious);
    }
    Some(EntityActivity::Active)
}

/// Build the scene manifest for a snapshot's current location.
///
/// Pure function of its input. A malformed snapshot (empty location) yields
/// an empty manifest carrying an `error` marker so downstream stages degrade
/// instead of aborting.
pub fn build_scene_manifest(state: &GameState) -> SceneManifest {
    let generated_at = state.last_state_update_timestamp;

    if state.location.trim().is_empty() {
        tracing::warn!(
            campaign_id = %state.campaign_id,
            "game state has no current location, producing degraded manifest"
        );
        return SceneManifest::empty_with_error(generated_at, "game state has no current location");
    }

    let mut entities = Vec::new();
    let mut descriptor_index = HashMap::new();

    for entity in state.entities_at_current_location() {
        let Some(activity) = classify_activity(&entity.status) else {
            continue;
        };

        for phrase in std::iter::once(&entity.name).chain(entity.descriptors.iter()) {
            let normalized = normalize_phrase(phrase);
            if !normalized.is_empty() {
                descriptor_index.insert(normalized, entity.id);
            }
        }

        entities.push(ManifestEntity {
            id: entity.id,
            name: entity.name.clone(),
            kind: entity.kind,
            status: entity.status.clone(),
            descriptors: entity.descriptors.clone(),
            activity,
        });
    }

    let entity_count = entities.len();
    SceneManifest {
        location: state.location.clone(),
        entities,
        generated_at,
        entity_count,
        error: None,
        descriptor_index,
    }
}
