//! State update merging.
//!
//! Applies a response's proposed `field-path -> value` deltas onto the
//! canonical state with per-field policies resolved from a single registry.
//! One bad field never aborts the rest: every field is applied to a working
//! copy and verified against the state schema before it is kept, and every
//! rejection is recorded and logged, never silently dropped or silently
//! applied.
//!
//! A trailing `+` on the final path segment marks the update as an append
//! rather than a replace (the documented non-idempotent exception).

mod policies;

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::{Map, Value};

use taleweaver_domain::GameState;

pub use policies::{FieldPattern, MergePolicy, PolicyRegistry};

// =============================================================================
// Outcome
// =============================================================================

/// A proposed update that violated its field's merge policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedField {
    pub path: String,
    pub reason: String,
}

/// Result of one merge run.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub updated_state: GameState,
    pub applied_fields: Vec<String>,
    pub rejected_fields: Vec<RejectedField>,
}

impl MergeOutcome {
    pub fn rejected_paths(&self) -> Vec<&str> {
        self.rejected_fields
            .iter()
            .map(|field| field.path.as_str())
            .collect()
    }
}

// =============================================================================
// Merger
// =============================================================================

/// Applies proposed state deltas under the policy registry.
pub struct StateMerger {
    registry: PolicyRegistry,
}

impl Default for StateMerger {
    fn default() -> Self {
        Self::new(PolicyRegistry::campaign_defaults())
    }
}

impl StateMerger {
    pub fn new(registry: PolicyRegistry) -> Self {
        Self { registry }
    }

    /// Merge updates into a snapshot, producing a new state.
    ///
    /// The snapshot itself is never mutated; callers swap in
    /// `updated_state` wholesale, so a partially-applied state can never be
    /// observed.
    pub fn merge(&self, state: &GameState, updates: &BTreeMap<String, Value>) -> MergeOutcome {
        let mut doc = match serde_json::to_value(state) {
            Ok(value) => value,
            Err(err) => {
                // State that cannot be projected cannot be merged into.
                tracing::error!(
                    campaign_id = %state.campaign_id,
                    error = %err,
                    "failed to project state for merging"
                );
                return MergeOutcome {
                    updated_state: state.clone(),
                    applied_fields: Vec::new(),
                    rejected_fields: updates
                        .keys()
                        .map(|path| RejectedField {
                            path: path.clone(),
                            reason: "state could not be projected for merging".into(),
                        })
                        .collect(),
                };
            }
        };

        let mut applied_fields = Vec::new();
        let mut rejected_fields = Vec::new();

        for (raw_path, proposed) in updates {
            let (path, append) = split_append_marker(raw_path);
            let segments: Vec<&str> = path.split('.').collect();
            if segments.iter().any(|segment| segment.is_empty()) {
                rejected_fields.push(reject(raw_path, "invalid field path"));
                continue;
            }

            let mut candidate = doc.clone();
            let result = if append {
                apply_append(&mut candidate, &segments, proposed)
            } else {
                match self.registry.resolve(&segments) {
                    Some(policy) => apply_policy(&mut candidate, &segments, proposed, policy),
                    None => apply_default(&mut candidate, &segments, proposed),
                }
            };

            match result {
                Ok(()) => match serde_json::from_value::<GameState>(candidate.clone()) {
                    Ok(_) => {
                        doc = candidate;
                        applied_fields.push(raw_path.clone());
                    }
                    Err(err) => {
                        rejected_fields.push(reject(
                            raw_path,
                            format!("update is incompatible with the state schema: {}", err),
                        ));
                    }
                },
                Err(reason) => rejected_fields.push(reject(raw_path, reason)),
            }
        }

        for rejection in &rejected_fields {
            tracing::warn!(
                campaign_id = %state.campaign_id,
                path = %rejection.path,
                reason = %rejection.reason,
                "state update rejected"
            );
        }

        let mut updated_state =
            serde_json::from_value::<GameState>(doc).unwrap_or_else(|_| state.clone());
        updated_state.last_state_update_timestamp = Utc::now();

        MergeOutcome {
            updated_state,
            applied_fields,
            rejected_fields,
        }
    }
}

fn reject(path: &str, reason: impl Into<String>) -> RejectedField {
    RejectedField {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn split_append_marker(raw_path: &str) -> (&str, bool) {
    match raw_path.strip_suffix('+') {
        Some(stripped) => (stripped, true),
        None => (raw_path, false),
    }
}

// =============================================================================
// Policy Application
// =============================================================================

fn apply_policy(
    doc: &mut Value,
    segments: &[&str],
    proposed: &Value,
    policy: MergePolicy,
) -> Result<(), String> {
    let existing = get_path(doc, segments).cloned();
    let merged = match policy {
        MergePolicy::Replace => proposed.clone(),
        MergePolicy::AppendList | MergePolicy::AppendString => {
            append_value(existing.as_ref(), proposed)?
        }
        MergePolicy::ProtectedAdditive => protected_additive(existing.as_ref(), proposed)?,
        MergePolicy::ShapeCoerce => match existing.as_ref() {
            Some(value) => shape_coerce_merge(value, proposed)?,
            None => proposed.clone(),
        },
    };
    set_path(doc, segments, merged)
}

/// Default behavior for unregistered fields: dict values merge recursively
/// key-by-key, scalars and lists take the last write, and dict/list shape
/// drift is coerced rather than overwritten.
fn apply_default(doc: &mut Value, segments: &[&str], proposed: &Value) -> Result<(), String> {
    let merged = match get_path(doc, segments) {
        Some(existing) => merge_values(existing, proposed)?,
        None => proposed.clone(),
    };
    set_path(doc, segments, merged)
}

fn apply_append(doc: &mut Value, segments: &[&str], proposed: &Value) -> Result<(), String> {
    let existing = get_path(doc, segments).cloned();
    let merged = append_value(existing.as_ref(), proposed)?;
    set_path(doc, segments, merged)
}

fn merge_values(existing: &Value, proposed: &Value) -> Result<Value, String> {
    match (existing, proposed) {
        (Value::Object(current), Value::Object(update)) => {
            let mut merged = current.clone();
            for (key, value) in update {
                let next = match merged.get(key) {
                    Some(present) => merge_values(present, value)?,
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Ok(Value::Object(merged))
        }
        // The generator renders some fields as a dict one turn and a list
        // the next; that drift corrupted campaigns when handled ad hoc, so
        // it is coerced here as first-class logic.
        (Value::Array(current), Value::Object(update)) => coerce_map_into_records(current, update),
        (Value::Object(current), Value::Array(update)) => coerce_records_into_map(current, update),
        _ => Ok(proposed.clone()),
    }
}

fn append_value(existing: Option<&Value>, proposed: &Value) -> Result<Value, String> {
    match existing {
        None | Some(Value::Null) => Ok(proposed.clone()),
        Some(Value::Array(items)) => {
            let mut merged = items.clone();
            match proposed {
                Value::Array(new_items) => merged.extend(new_items.iter().cloned()),
                other => merged.push(other.clone()),
            }
            Ok(Value::Array(merged))
        }
        Some(Value::String(current)) => match proposed {
            Value::String(addition) if current.is_empty() => Ok(Value::String(addition.clone())),
            Value::String(addition) => Ok(Value::String(format!("{} {}", current, addition))),
            _ => Err("can only append a string to a string field".into()),
        },
        Some(_) => Err("append requires a list or string field".into()),
    }
}

fn protected_additive(existing: Option<&Value>, proposed: &Value) -> Result<Value, String> {
    match existing {
        None | Some(Value::Null) => Ok(proposed.clone()),
        Some(Value::Array(current)) => match proposed {
            Value::Array(update) => {
                let keeps_all = update.len() >= current.len()
                    && current.iter().all(|item| update.contains(item));
                if keeps_all {
                    Ok(Value::Array(update.clone()))
                } else {
                    Err("protected field is additive-only; update would drop existing entries"
                        .into())
                }
            }
            other => {
                let mut merged = current.clone();
                if !merged.contains(other) {
                    merged.push(other.clone());
                }
                Ok(Value::Array(merged))
            }
        },
        Some(Value::String(current)) => match proposed {
            Value::String(update) if update.starts_with(current.as_str()) => {
                Ok(Value::String(update.clone()))
            }
            Value::String(_) => {
                Err("protected field is additive-only; update would rewrite existing text".into())
            }
            _ => Err("protected string field requires a string update".into()),
        },
        Some(_) => Err("protected field cannot be replaced".into()),
    }
}

// =============================================================================
// Shape Coercion
// =============================================================================

fn shape_coerce_merge(existing: &Value, proposed: &Value) -> Result<Value, String> {
    match (existing, proposed) {
        (Value::Array(current), Value::Array(update)) => merge_record_lists(current, update),
        (Value::Object(_), Value::Object(_)) => merge_values(existing, proposed),
        (Value::Array(current), Value::Object(update)) => coerce_map_into_records(current, update),
        (Value::Object(current), Value::Array(update)) => coerce_records_into_map(current, update),
        _ => Err("update shape is incompatible with this field".into()),
    }
}

fn record_key(record: &Map<String, Value>) -> Option<&str> {
    record
        .get("id")
        .and_then(Value::as_str)
        .or_else(|| record.get("name").and_then(Value::as_str))
}

/// Dict keyed by id merged into a list of `{id, ...}` records.
fn coerce_map_into_records(
    current: &[Value],
    update: &Map<String, Value>,
) -> Result<Value, String> {
    let mut merged = current.to_vec();
    for (key, value) in update {
        let Some(object) = value.as_object() else {
            return Err(format!(
                "cannot coerce scalar entry '{}' into a record list",
                key
            ));
        };
        let position = merged.iter().position(|item| {
            item.as_object().is_some_and(|record| {
                record.get("id").and_then(Value::as_str) == Some(key.as_str())
                    || record.get("name").and_then(Value::as_str) == Some(key.as_str())
            })
        });
        match position {
            Some(at) => {
                let merged_record = merge_values(&merged[at], value)?;
                merged[at] = merged_record;
            }
            None => {
                let mut record = object.clone();
                if !record.contains_key("id") && !record.contains_key("name") {
                    record.insert("name".to_string(), Value::String(key.clone()));
                }
                merged.push(Value::Object(record));
            }
        }
    }
    Ok(Value::Array(merged))
}

/// List of `{id, ...}` records merged into a dict keyed by id.
fn coerce_records_into_map(
    current: &Map<String, Value>,
    update: &[Value],
) -> Result<Value, String> {
    let mut merged = current.clone();
    for item in update {
        let Some(record) = item.as_object() else {
            return Err("list entry is not a record".into());
        };
        let Some(key) = record_key(record) else {
            return Err("record lacks an 'id' or 'name' key".into());
        };
        let key = key.to_string();
        let next = match merged.get(&key) {
            Some(present) => merge_values(present, item)?,
            None => item.clone(),
        };
        merged.insert(key, next);
    }
    Ok(Value::Object(merged))
}

fn merge_record_lists(current: &[Value], update: &[Value]) -> Result<Value, String> {
    let mut merged = current.to_vec();
    for item in update {
        let Some(key) = item.as_object().and_then(record_key) else {
            return Err("list entry lacks an 'id' or 'name' key".into());
        };
        let position = merged.iter().position(|present| {
            present.as_object().is_some_and(|record| {
                record.get("id").and_then(Value::as_str) == Some(key)
                    || record.get("name").and_then(Value::as_str) == Some(key)
            })
        });
        match position {
            Some(at) => {
                let merged_record = merge_values(&merged[at], item)?;
                merged[at] = merged_record;
            }
            None => merged.push(item.clone()),
        }
    }
    Ok(Value::Array(merged))
}

// =============================================================================
// Path Navigation
// =============================================================================

fn get_path<'a>(doc: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut current = doc;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn set_path(doc: &mut Value, segments: &[&str], value: Value) -> Result<(), String> {
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| "empty field path".to_string())?;

    let mut current = doc;
    for segment in parents {
        current = match current {
            Value::Object(map) => map
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(items) => {
                let index: usize = segment
                    .parse()
                    .map_err(|_| format!("segment '{}' is not a list index", segment))?;
                items
                    .get_mut(index)
                    .ok_or_else(|| format!("index {} is out of bounds", index))?
            }
            _ => return Err(format!("cannot descend into scalar at '{}'", segment)),
        };
    }

    match current {
        Value::Object(map) => {
            map.insert((*last).to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index: usize = last
                .parse()
                .map_err(|_| format!("segment '{}' is not a list index", last))?;
            if index < items.len() {
                items[index] = value;
                Ok(())
            } else if index == items.len() {
                items.push(value);
                Ok(())
            } else {
                Err(format!(
                    "index {} is out of bounds for a list of {}",
                    index,
                    items.len()
                ))
            }
        }
        _ => Err(format!("cannot set '{}' inside a scalar value", last)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taleweaver_domain::{CampaignId, Entity, EntityKind, GameState};

    fn sample_state() -> GameState {
        GameState::new(CampaignId::new(), "Cell")
            .with_entities(vec![
                Entity::new("Knight", EntityKind::Npc, "Cell").with_attribute("health", 10),
                Entity::new("Healer", EntityKind::Npc, "Cell"),
            ])
            .with_core_memories(["met the king"])
    }

    fn updates(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(path, value)| (path.to_string(), value.clone()))
            .collect()
    }

    // =========================================================================
    // Default Merge Behavior
    // =========================================================================

    #[test]
    fn scalar_updates_replace_at_the_leaf() {
        let state = sample_state();
        let merger = StateMerger::default();

        let outcome = merger.merge(&state, &updates(&[("clock.hour", json!(21))]));

        assert_eq!(outcome.applied_fields, vec!["clock.hour".to_string()]);
        assert!(outcome.rejected_fields.is_empty());
        assert_eq!(outcome.updated_state.clock.hour, 21);
    }

    #[test]
    fn dict_updates_merge_recursively() {
        let mut state = sample_state();
        state.relationships.insert("Baron".into(), 2);
        let merger = StateMerger::default();

        let outcome = merger.merge(
            &state,
            &updates(&[("relationships", json!({"Warden": -3}))]),
        );

        assert_eq!(outcome.updated_state.relationships.get("Baron"), Some(&2));
        assert_eq!(outcome.updated_state.relationships.get("Warden"), Some(&-3));
    }

    #[test]
    fn nested_entity_attribute_update_applies_by_index() {
        let state = sample_state();
        let merger = StateMerger::default();

        let outcome = merger.merge(
            &state,
            &updates(&[("entities.0.attributes.health", json!(4))]),
        );

        assert!(outcome.rejected_fields.is_empty());
        assert_eq!(
            outcome.updated_state.entities[0].attributes.get("health"),
            Some(&4)
        );
    }

    // =========================================================================
    // Append Syntax
    // =========================================================================

    #[test]
    fn append_marker_extends_a_list() {
        let state = sample_state();
        let merger = StateMerger::default();

        let outcome = merger.merge(
            &state,
            &updates(&[("entities.0.inventory+", json!("iron key"))]),
        );

        assert_eq!(outcome.applied_fields, vec!["entities.0.inventory+".to_string()]);
        assert_eq!(
            outcome.updated_state.entities[0].inventory,
            vec!["iron key".to_string()]
        );
    }

    #[test]
    fn append_marker_concatenates_strings() {
        let state = sample_state();
        let merger = StateMerger::default();

        let outcome = merger.merge(
            &state,
            &updates(&[("entities.1.name+", json!("of the Vale"))]),
        );

        assert_eq!(outcome.updated_state.entities[1].name, "Healer of the Vale");
    }

    #[test]
    fn append_is_the_documented_idempotence_exception() {
        let state = sample_state();
        let merger = StateMerger::default();
        let delta = updates(&[("core_memories+", json!("found the key"))]);

        let once = merger.merge(&state, &delta);
        let twice = merger.merge(&once.updated_state, &delta);

        assert_eq!(once.updated_state.core_memories.len(), 2);
        assert_eq!(twice.updated_state.core_memories.len(), 3);
    }

    // =========================================================================
    // Protected Fields
    // =========================================================================

    #[test]
    fn protected_field_rejects_shrinking_update() {
        // Scenario: the generator proposes wiping core memories.
        let state = sample_state();
        let merger = StateMerger::default();

        let outcome = merger.merge(&state, &updates(&[("core_memories", json!([]))]));

        assert_eq!(outcome.rejected_paths(), vec!["core_memories"]);
        assert!(outcome.applied_fields.is_empty());
        assert_eq!(
            outcome.updated_state.core_memories,
            vec!["met the king".to_string()]
        );
    }

    #[test]
    fn protected_field_accepts_superset_update() {
        let state = sample_state();
        let merger = StateMerger::default();

        let outcome = merger.merge(
            &state,
            &updates(&[("core_memories", json!(["met the king", "escaped the cell"]))]),
        );

        assert!(outcome.rejected_fields.is_empty());
        assert_eq!(outcome.updated_state.core_memories.len(), 2);
    }

    #[test]
    fn protected_field_rejects_replacement() {
        let state = sample_state();
        let merger = StateMerger::default();

        let outcome = merger.merge(
            &state,
            &updates(&[("core_memories", json!(["a different past"]))]),
        );

        assert_eq!(outcome.rejected_paths(), vec!["core_memories"]);
        assert_eq!(
            outcome.updated_state.core_memories,
            vec!["met the king".to_string()]
        );
    }

    // =========================================================================
    // Shape Coercion
    // =========================================================================

    #[test]
    fn dict_keyed_update_coerces_into_entity_records() {
        // The generator sometimes sends entities as a dict keyed by name.
        let state = sample_state();
        let merger = StateMerger::default();

        let outcome = merger.merge(
            &state,
            &updates(&[(
                "entities",
                json!({"Knight": {"status": ["wounded"]}}),
            )]),
        );

        assert!(outcome.rejected_fields.is_empty(), "{:?}", outcome.rejected_fields);
        assert_eq!(
            outcome.updated_state.entities[0].status,
            vec!["wounded".to_string()]
        );
        // The untouched entity survives.
        assert_eq!(outcome.updated_state.entities[1].name, "Healer");
    }

    #[test]
    fn record_list_update_merges_by_key() {
        let state = sample_state();
        let merger = StateMerger::default();

        let outcome = merger.merge(
            &state,
            &updates(&[(
                "entities",
                json!([{"name": "Healer", "status": ["unconscious"]}]),
            )]),
        );

        assert!(outcome.rejected_fields.is_empty(), "{:?}", outcome.rejected_fields);
        assert_eq!(
            outcome.updated_state.entities[1].status,
            vec!["unconscious".to_string()]
        );
        assert_eq!(outcome.updated_state.entities.len(), 2);
    }

    #[test]
    fn records_coerce_into_a_map_in_the_other_direction() {
        let existing = json!({"escape": {"id": "escape", "progress": 1}});
        let update = json!([{"id": "escape", "progress": 2}, {"id": "rescue", "progress": 0}]);

        let merged = merge_values(&existing, &update).expect("coercion succeeds");

        assert_eq!(merged["escape"]["progress"], json!(2));
        assert_eq!(merged["rescue"]["progress"], json!(0));
    }

    #[test]
    fn scalar_entries_cannot_coerce_into_records() {
        let existing = json!([{"name": "Knight"}]);
        let update = json!({"Knight": "wounded"});

        let result = merge_values(&existing, &update);

        assert!(result.is_err());
    }

    // =========================================================================
    // Per-Field Isolation
    // =========================================================================

    #[test]
    fn one_bad_field_does_not_abort_the_rest() {
        let state = sample_state();
        let merger = StateMerger::default();

        let outcome = merger.merge(
            &state,
            &updates(&[
                ("clock.hour", json!("nine")), // wrong type
                ("location", json!("Corridor")),
            ]),
        );

        assert_eq!(outcome.applied_fields, vec!["location".to_string()]);
        assert_eq!(outcome.rejected_paths(), vec!["clock.hour"]);
        assert_eq!(outcome.updated_state.location, "Corridor");
        assert_eq!(outcome.updated_state.clock.hour, state.clock.hour);
    }

    #[test]
    fn schema_incompatible_update_is_rejected_with_reason() {
        let state = sample_state();
        let merger = StateMerger::default();

        let outcome = merger.merge(&state, &updates(&[("clock", json!("late evening"))]));

        assert_eq!(outcome.rejected_fields.len(), 1);
        assert!(outcome.rejected_fields[0]
            .reason
            .contains("incompatible with the state schema"));
    }

    #[test]
    fn out_of_bounds_index_is_rejected() {
        let state = sample_state();
        let merger = StateMerger::default();

        let outcome = merger.merge(&state, &updates(&[("entities.9.name", json!("Nobody"))]));

        assert_eq!(outcome.rejected_fields.len(), 1);
        assert!(outcome.rejected_fields[0].reason.contains("out of bounds"));
    }

    // =========================================================================
    // Idempotence
    // =========================================================================

    #[test]
    fn applying_the_same_updates_twice_changes_nothing_more() {
        let mut state = sample_state();
        state.relationships.insert("Baron".into(), 2);
        let merger = StateMerger::default();
        let delta = updates(&[
            ("location", json!("Corridor")),
            ("relationships", json!({"Warden": -3})),
            ("entities.0.attributes.health", json!(4)),
            ("core_memories", json!(["met the king", "escaped the cell"])),
        ]);

        let once = merger.merge(&state, &delta);
        let twice = merger.merge(&once.updated_state, &delta);

        assert_eq!(once.applied_fields, twice.applied_fields);
        assert_eq!(once.rejected_fields, twice.rejected_fields);
        assert_eq!(
            once.updated_state.location,
            twice.updated_state.location
        );
        assert_eq!(
            once.updated_state.relationships,
            twice.updated_state.relationships
        );
        assert_eq!(
            once.updated_state.entities[0].attributes,
            twice.updated_state.entities[0].attributes
        );
        assert_eq!(
            once.updated_state.core_memories,
            twice.updated_state.core_memories
        );
    }

    // =========================================================================
    // Registered Replace
    // =========================================================================

    #[test]
    fn location_replaces_wholesale() {
        let state = sample_state();
        let merger = StateMerger::default();

        let outcome = merger.merge(&state, &updates(&[("location", json!("Corridor"))]));

        assert_eq!(outcome.updated_state.location, "Corridor");
        assert!(outcome.applied_fields.contains(&"location".to_string()));
    }
}
