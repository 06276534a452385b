//! Response DTOs for the API/UI layer.

use serde::{Deserialize, Serialize};

// =============================================================================
// Planning Choice
// =============================================================================

/// A single clickable next-action choice extracted from a planning block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanningChoiceInfo {
    /// Stable 1-based position within the planning block
    pub id: u32,
    pub label: String,
    pub description: String,
    /// Heuristic classification: "safe", "risky", or "dangerous"
    pub risk_level: String,
    /// True for the synthesized trailing "Custom Action" choice
    pub is_custom: bool,
}

// =============================================================================
// Turn Output
// =============================================================================

/// The sanitized result of one turn pipeline run.
///
/// `narrative` is contractually guaranteed plain display text: it never
/// begins with a structural delimiter and never contains raw backend output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutput {
    pub narrative: String,
    #[serde(default)]
    pub planning_choices: Vec<PlanningChoiceInfo>,
    /// Whether the proposed state updates were merged and persisted this turn
    pub state_updates_applied: bool,
    #[serde(default)]
    pub entities_mentioned: Vec<String>,
}

impl TurnOutput {
    /// A degraded output that preserves state and carries a fixed narrative.
    pub fn degraded(narrative: impl Into<String>) -> Self {
        Self {
            narrative: narrative.into(),
            planning_choices: Vec::new(),
            state_updates_applied: false,
            entities_mentioned: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_output_serializes_with_snake_case_fields() {
        let output = TurnOutput {
            narrative: "The door creaks open.".into(),
            planning_choices: vec![PlanningChoiceInfo {
                id: 1,
                label: "Enter".into(),
                description: "Step through the doorway".into(),
                risk_level: "safe".into(),
                is_custom: false,
            }],
            state_updates_applied: true,
            entities_mentioned: vec!["Knight".into()],
        };

        let json = serde_json::to_string(&output).expect("serialize");
        assert!(json.contains("\"planning_choices\""));
        assert!(json.contains("\"state_updates_applied\":true"));
        assert!(json.contains("\"risk_level\":\"safe\""));
    }

    #[test]
    fn degraded_output_preserves_nothing_but_narrative() {
        let output = TurnOutput::degraded("The scene stabilizes.");
        assert!(!output.state_updates_applied);
        assert!(output.planning_choices.is_empty());
        assert!(output.entities_mentioned.is_empty());
    }
}
