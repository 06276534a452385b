//! Narrative validation against the scene manifest.
//!
//! Checks that parsed narrative text and the authoritative entity presence
//! agree: present, active entities should not silently vanish, and the
//! narrative must not conjure roster entities that are not in the scene.
//!
//! Strictness is graduated and deployment-tunable: over-strict validation
//! blocks legitimate narrative variation (omitting background NPCs), while
//! no validation at all lets "everyone vanished" bugs through.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use taleweaver_domain::GameState;

use crate::use_cases::manifest::{normalize_phrase, EntityActivity, SceneManifest};

/// Longest descriptor phrase, in words, the reference scan will match.
const MAX_PHRASE_WORDS: usize = 4;

// =============================================================================
// Strictness
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Every active entity must be referenced by name
    Strict,
    /// Active entities must be referenced by name or descriptor
    #[default]
    Normal,
    /// Never flags missing entities, only fabricated ones
    Lenient,
}

impl std::fmt::Display for Strictness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strictness::Strict => write!(f, "strict"),
            Strictness::Normal => write!(f, "normal"),
            Strictness::Lenient => write!(f, "lenient"),
        }
    }
}

impl std::str::FromStr for Strictness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(Strictness::Strict),
            "normal" => Ok(Strictness::Normal),
            "lenient" => Ok(Strictness::Lenient),
            _ => Err(format!("Unknown strictness level: {}", s)),
        }
    }
}

// =============================================================================
// Validation Result
// =============================================================================

/// Produced once per narrative, consumed by the recovery coordinator.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub missing_entities: Vec<String>,
    pub extra_entities: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            ..Self::default()
        }
    }

    /// A failed result carrying pipeline errors rather than entity findings.
    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            is_valid: false,
            errors,
            ..Self::default()
        }
    }

    /// One-line summary for retry prompts and logs.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.missing_entities.is_empty() {
            parts.push(format!("missing: {}", self.missing_entities.join(", ")));
        }
        if !self.extra_entities.is_empty() {
            parts.push(format!("not present: {}", self.extra_entities.join(", ")));
        }
        if !self.errors.is_empty() {
            parts.push(self.errors.join("; "));
        }
        if parts.is_empty() {
            "ok".to_string()
        } else {
            parts.join("; ")
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Validate narrative text against the scene manifest.
///
/// The narrative is tokenized once into a phrase set (1..=4 word n-grams);
/// every check after that is a hash lookup, never a per-entity substring
/// scan. A degraded manifest skips entity checks entirely rather than
/// failing the turn on top of an already-broken snapshot.
pub fn validate_narrative(
    narrative: &str,
    manifest: &SceneManifest,
    state: &GameState,
    strictness: Strictness,
) -> ValidationResult {
    if let Some(reason) = &manifest.error {
        return ValidationResult {
            is_valid: true,
            missing_entities: Vec::new(),
            extra_entities: Vec::new(),
            errors: vec![format!("scene manifest unavailable: {}", reason)],
        };
    }

    let phrases = narrative_phrase_set(narrative);

    // Intersect the narrative's phrases against the manifest's descriptor
    // index: which entities are referenced at all, and which by full name.
    let mut referenced = HashSet::new();
    for (phrase, id) in manifest.descriptor_index() {
        if phrases.contains(phrase) {
            referenced.insert(*id);
        }
    }
    let mut referenced_by_name = HashSet::new();
    for entity in &manifest.entities {
        let name = normalize_phrase(&entity.name);
        if !name.is_empty() && phrases.contains(&name) {
            referenced_by_name.insert(entity.id);
        }
    }

    let missing_entities: Vec<String> = match strictness {
        Strictness::Lenient => Vec::new(),
        Strictness::Normal => manifest
            .entities
            .iter()
            .filter(|e| e.activity == EntityActivity::Active && !referenced.contains(&e.id))
            .map(|e| e.name.clone())
            .collect(),
        // Strict is not satisfied by descriptor-only references.
        Strictness::Strict => manifest
            .entities
            .iter()
            .filter(|e| {
                e.activity == EntityActivity::Active && !referenced_by_name.contains(&e.id)
            })
            .map(|e| e.name.clone())
            .collect(),
    };

    // Fabrications: roster entities outside the manifest, mentioned by full
    // name. Full-name matching avoids false positives from generic nouns.
    let extra_entities: Vec<String> = state
        .entities
        .iter()
        .filter(|e| manifest.lookup(&e.name) != Some(e.id))
        .filter(|e| {
            let name = normalize_phrase(&e.name);
            !name.is_empty() && phrases.contains(&name)
        })
        .map(|e| e.name.clone())
        .collect();

    let is_valid = missing_entities.is_empty() && extra_entities.is_empty();
    if !is_valid {
        tracing::debug!(
            strictness = %strictness,
            missing = ?missing_entities,
            extra = ?extra_entities,
            "narrative failed entity-presence validation"
        );
    }

    ValidationResult {
        is_valid,
        missing_entities,
        extra_entities,
        errors: Vec::new(),
    }
}

/// All 1..=4 word phrases of the narrative, under the same normalization
/// the descriptor index uses.
fn narrative_phrase_set(narrative: &str) -> HashSet<String> {
    let normalized = normalize_phrase(narrative);
    let words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();

    let mut phrases = HashSet::new();
    for window in 1..=MAX_PHRASE_WORDS {
        for chunk in words.windows(window) {
            phrases.insert(chunk.join(" "));
        }
    }
    phrases
}
