//! Turn orchestration.
//!
//! `ProcessTurn` wires the pipeline stages into one request-scoped run:
//! load snapshot -> scene manifest -> prompt -> generation -> parse ->
//! validate + extract planning -> merge -> save -> sanitized output.
//! Failures route through the recovery coordinator; the worst case a caller
//! ever sees is a fixed, generic narrative with the campaign state left
//! untouched.
//!
//! Stages execute strictly in order within a request. Nothing here is
//! shared between requests except the recovery coordinator's session
//! ledger; the manifest cache in particular is a local, request-scoped
//! value, never a process-wide one.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use taleweaver_domain::{CampaignId, GameState, SessionId};
use taleweaver_shared::TurnOutput;

use crate::infrastructure::correlation::CorrelationId;
use crate::infrastructure::ports::{
    GenerationPort, GenerationRequest, PromptPort, StateStore, StateStoreError,
};
use crate::infrastructure::settings::EngineSettings;
use crate::use_cases::manifest::{build_scene_manifest, SceneManifest};
use crate::use_cases::merge::StateMerger;
use crate::use_cases::parsing::{parse_backend_output, NarrativeResponse, ResponseSchema};
use crate::use_cases::planning::extract_planning_choices;
use crate::use_cases::recovery::{
    RecoveryCoordinator, RecoveryDirective, ESCALATED_NARRATIVE, SAFE_MODE_NARRATIVE,
};
use crate::use_cases::validation::{validate_narrative, Strictness, ValidationResult};

/// One player turn to process.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub campaign_id: CampaignId,
    pub session_id: SessionId,
    pub player_action: String,
    /// Caller-supplied deadline for the whole turn; a generation call that
    /// overruns it is abandoned and treated like any other failure
    pub deadline: Option<Duration>,
}

impl TurnRequest {
    pub fn new(
        campaign_id: CampaignId,
        session_id: SessionId,
        player_action: impl Into<String>,
    ) -> Self {
        Self {
            campaign_id,
            session_id,
            player_action: player_action.into(),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// Persistence failures, including optimistic-concurrency conflicts,
    /// surface unchanged; resolving them is the caller's concern.
    #[error("State store error: {0}")]
    State(#[from] StateStoreError),
}

/// Request-scoped manifest cache, keyed by the snapshot timestamp.
struct TurnContext {
    cached: Option<(DateTime<Utc>, SceneManifest)>,
}

impl TurnContext {
    fn new() -> Self {
        Self { cached: None }
    }

    fn manifest_for(&mut self, state: &GameState) -> &SceneManifest {
        let timestamp = state.last_state_update_timestamp;
        let fresh = matches!(&self.cached, Some((cached_at, _)) if *cached_at == timestamp);
        if !fresh {
            self.cached = Some((timestamp, build_scene_manifest(state)));
        }
        let (_, manifest) = self
            .cached
            .get_or_insert_with(|| (timestamp, build_scene_manifest(state)));
        manifest
    }
}

/// The synchronization pipeline's public entry point.
pub struct ProcessTurn {
    generation: Arc<dyn GenerationPort>,
    state_store: Arc<dyn StateStore>,
    prompts: Arc<dyn PromptPort>,
    recovery: Arc<RecoveryCoordinator>,
    merger: StateMerger,
    schema: ResponseSchema,
    strictness: Strictness,
    generation_timeout: Duration,
}

impl ProcessTurn {
    pub fn new(
        generation: Arc<dyn GenerationPort>,
        state_store: Arc<dyn StateStore>,
        prompts: Arc<dyn PromptPort>,
        recovery: Arc<RecoveryCoordinator>,
        settings: &EngineSettings,
    ) -> Self {
        Self {
            generation,
            state_store,
            prompts,
            recovery,
            merger: StateMerger::default(),
            schema: ResponseSchema::default(),
            strictness: settings.strictness,
            generation_timeout: settings.generation_timeout(),
        }
    }

    pub async fn execute(&self, request: TurnRequest) -> Result<TurnOutput, TurnError> {
        let correlation = CorrelationId::new();

        if self.recovery.is_escalated(request.session_id) {
            tracing::warn!(
                campaign_id = %request.campaign_id,
                session_id = %request.session_id,
                correlation = %correlation.short(),
                "session escalated; returning apology without generating"
            );
            return Ok(TurnOutput::degraded(ESCALATED_NARRATIVE));
        }

        let state = self.state_store.load(request.campaign_id).await?;
        let read_timestamp = state.last_state_update_timestamp;

        let mut context = TurnContext::new();
        let started = Instant::now();
        let mut failures: u32 = 0;
        let mut last_failure: Option<ValidationResult> = None;

        loop {
            let manifest = context.manifest_for(&state);
            let prompt = match &last_failure {
                None => self
                    .prompts
                    .build_turn_prompt(&state, manifest, &request.player_action),
                Some(failure) => self.prompts.build_retry_prompt(
                    &state,
                    manifest,
                    &request.player_action,
                    failure,
                ),
            };

            let timeout = self.effective_timeout(started, request.deadline);
            let generation_request =
                GenerationRequest::new(prompt, self.schema.clone()).with_timeout(timeout);
            let outcome =
                tokio::time::timeout(timeout, self.generation.generate(generation_request)).await;

            let failure = match outcome {
                Ok(Ok(text)) => {
                    let response = parse_backend_output(&text.content, &self.schema);
                    if response.is_fallback() {
                        tracing::warn!(
                            campaign_id = %request.campaign_id,
                            session_id = %request.session_id,
                            correlation = %correlation.short(),
                            "backend output unparseable; routing to recovery"
                        );
                        ValidationResult::failed(vec![
                            "backend output could not be parsed".to_string()
                        ])
                    } else {
                        let validation = validate_narrative(
                            &response.narrative,
                            manifest,
                            &state,
                            self.strictness,
                        );
                        if validation.is_valid {
                            return self
                                .complete_turn(&request, state, read_timestamp, response, correlation)
                                .await;
                        }
                        tracing::warn!(
                            campaign_id = %request.campaign_id,
                            session_id = %request.session_id,
                            correlation = %correlation.short(),
                            missing = ?validation.missing_entities,
                            extra = ?validation.extra_entities,
                            "narrative failed entity-presence validation"
                        );
                        validation
                    }
                }
                Ok(Err(err)) => {
                    tracing::warn!(
                        campaign_id = %request.campaign_id,
                        session_id = %request.session_id,
                        correlation = %correlation.short(),
                        error = %err,
                        "generation unavailable"
                    );
                    ValidationResult::failed(vec![format!("generation unavailable: {}", err)])
                }
                Err(_elapsed) => {
                    tracing::warn!(
                        campaign_id = %request.campaign_id,
                        session_id = %request.session_id,
                        correlation = %correlation.short(),
                        "generation deadline exceeded; abandoning call"
                    );
                    ValidationResult::failed(vec!["generation deadline exceeded".to_string()])
                }
            };

            failures += 1;
            let mut directive = self.recovery.on_failure(request.session_id, failures);
            if let RecoveryDirective::Retry { backoff, .. } = directive {
                // The retry budget is also bounded in wall-clock time.
                if started.elapsed() + backoff >= self.recovery.config().total_timeout {
                    directive = self.recovery.trip_safe_mode(request.session_id);
                }
            }

            match directive {
                RecoveryDirective::Retry { backoff, .. } => {
                    tokio::time::sleep(backoff).await;
                    last_failure = Some(failure);
                }
                RecoveryDirective::EnterSafeMode => {
                    tracing::error!(
                        campaign_id = %request.campaign_id,
                        session_id = %request.session_id,
                        correlation = %correlation.short(),
                        "turn degraded to safe mode; campaign state unchanged"
                    );
                    return Ok(TurnOutput::degraded(SAFE_MODE_NARRATIVE));
                }
                RecoveryDirective::Escalate => {
                    return Ok(TurnOutput::degraded(ESCALATED_NARRATIVE));
                }
            }
        }
    }

    async fn complete_turn(
        &self,
        request: &TurnRequest,
        state: GameState,
        read_timestamp: DateTime<Utc>,
        response: NarrativeResponse,
        correlation: CorrelationId,
    ) -> Result<TurnOutput, TurnError> {
        let choices = extract_planning_choices(&response.planning_block);
        let outcome = self.merger.merge(&state, &response.state_updates);

        self.state_store
            .save(request.campaign_id, outcome.updated_state, read_timestamp)
            .await?;
        self.recovery.record_success(request.session_id);

        tracing::info!(
            campaign_id = %request.campaign_id,
            session_id = %request.session_id,
            correlation = %correlation.short(),
            applied = outcome.applied_fields.len(),
            rejected = outcome.rejected_fields.len(),
            choices = choices.len(),
            "turn completed"
        );

        Ok(TurnOutput {
            narrative: response.narrative,
            planning_choices: choices.iter().map(|choice| choice.to_protocol()).collect(),
            state_updates_applied: true,
            entities_mentioned: response.entities_mentioned,
        })
    }

    fn effective_timeout(&self, started: Instant, deadline: Option<Duration>) -> Duration {
        match deadline {
            Some(total) => {
                let remaining = total.saturating_sub(started.elapsed());
                self.generation_timeout
                    .min(remaining)
                    .max(Duration::from_millis(1))
            }
            None => self.generation_timeout,
        }
    }
}
