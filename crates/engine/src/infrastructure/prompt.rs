//! Default prompt builder.
//!
//! Prompt assembly is owned by an upstream collaborator; this is the
//! deterministic default used by tests and embedding consumers that have no
//! dedicated prompt service. It renders the scene from the manifest, never
//! from raw state dumps, so the backend sees exactly the entities the
//! validator will check against.

use taleweaver_domain::GameState;

use crate::infrastructure::ports::PromptPort;
use crate::use_cases::manifest::SceneManifest;
use crate::use_cases::validation::ValidationResult;

pub struct TurnPromptBuilder;

impl TurnPromptBuilder {
    fn scene_summary(&self, state: &GameState, manifest: &SceneManifest) -> String {
        let present: Vec<String> = manifest
            .entities
            .iter()
            .map(|entity| format!("- {} ({}, {})", entity.name, entity.kind, entity.activity))
            .collect();
        let missions: Vec<String> = state
            .missions
            .iter()
            .filter(|mission| mission.is_open())
            .map(|mission| format!("- {}", mission.name))
            .collect();

        format!(
            "Location: {} ({}, day {})\nPresent:\n{}\nOpen missions:\n{}",
            manifest.location,
            state.clock.period(),
            state.clock.day,
            if present.is_empty() {
                "- nobody".to_string()
            } else {
                present.join("\n")
            },
            if missions.is_empty() {
                "- none".to_string()
            } else {
                missions.join("\n")
            },
        )
    }
}

impl PromptPort for TurnPromptBuilder {
    fn build_turn_prompt(
        &self,
        state: &GameState,
        manifest: &SceneManifest,
        player_action: &str,
    ) -> String {
        format!(
            "You are the game master of a tabletop campaign. Continue the story in \
             response to the player's action. Keep every present character in the \
             scene and do not introduce characters who are not listed.\n\n{}\n\n\
             Player action: {}",
            self.scene_summary(state, manifest),
            player_action
        )
    }

    fn build_retry_prompt(
        &self,
        state: &GameState,
        manifest: &SceneManifest,
        player_action: &str,
        failure: &ValidationResult,
    ) -> String {
        format!(
            "{}\n\nYour previous reply did not match the scene ({}). Rewrite it: \
             mention the characters present and do not invent absent ones.",
            self.build_turn_prompt(state, manifest, player_action),
            failure.summary()
        )
    }
}
