//! Recovery coordination.
//!
//! Failure handling is a state machine per turn attempt:
//!
//! `Attempting -> Succeeded | Retrying -> SafeMode -> Escalated`
//!
//! Failing a player's turn outright breaks the session, but fabricating
//! unvalidated state is worse; safe mode trades narrative richness for
//! state integrity by returning a fixed, generic narrative with the last
//! known-good state untouched. Escalation stops automatic retries entirely
//! until a session is manually reset.

use std::time::Duration;

use dashmap::DashMap;

use taleweaver_domain::SessionId;

/// Fixed narrative returned when a turn degrades into safe mode.
pub const SAFE_MODE_NARRATIVE: &str =
    "The scene settles and stabilizes around you. Take a breath and try your action again.";

/// Minimal apology returned once a session is escalated.
pub const ESCALATED_NARRATIVE: &str =
    "We're sorry - the storyteller is struggling right now. Please try again a little later.";

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Maximum re-generation attempts per turn beyond the first
    pub retry_budget: u32,
    /// Base delay before the first retry; doubles each attempt
    pub base_backoff: Duration,
    /// Bound on total time spent recovering within one turn
    pub total_timeout: Duration,
    /// Consecutive failures in a session before tripping into safe mode
    pub circuit_breaker_threshold: u32,
    /// Safe-mode triggers per session before escalation
    pub safe_mode_session_limit: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            retry_budget: 3,
            base_backoff: Duration::from_secs(1),
            total_timeout: Duration::from_secs(30),
            circuit_breaker_threshold: 3,
            safe_mode_session_limit: 5,
        }
    }
}

// =============================================================================
// States and Directives
// =============================================================================

/// Where a turn sits in the recovery state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    Attempting,
    Succeeded,
    Retrying,
    SafeMode,
    Escalated,
}

impl std::fmt::Display for RecoveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryState::Attempting => write!(f, "attempting"),
            RecoveryState::Succeeded => write!(f, "succeeded"),
            RecoveryState::Retrying => write!(f, "retrying"),
            RecoveryState::SafeMode => write!(f, "safe_mode"),
            RecoveryState::Escalated => write!(f, "escalated"),
        }
    }
}

/// What the orchestrator should do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryDirective {
    Retry { attempt: u32, backoff: Duration },
    EnterSafeMode,
    Escalate,
}

#[derive(Debug, Default)]
struct SessionLedger {
    consecutive_failures: u32,
    safe_mode_triggers: u32,
    escalated: bool,
}

// =============================================================================
// Coordinator
// =============================================================================

/// Tracks failures per session and decides between retry, safe mode, and
/// escalation. Shared across turns; the ledger is keyed by session id.
pub struct RecoveryCoordinator {
    config: RecoveryConfig,
    sessions: DashMap<SessionId, SessionLedger>,
}

impl Default for RecoveryCoordinator {
    fn default() -> Self {
        Self::new(RecoveryConfig::default())
    }
}

impl RecoveryCoordinator {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Whether automatic retries are disabled for this session.
    pub fn is_escalated(&self, session_id: SessionId) -> bool {
        self.sessions
            .get(&session_id)
            .map(|ledger| ledger.escalated)
            .unwrap_or(false)
    }

    /// A turn completed cleanly; the consecutive-failure streak ends.
    pub fn record_success(&self, session_id: SessionId) {
        if let Some(mut ledger) = self.sessions.get_mut(&session_id) {
            ledger.consecutive_failures = 0;
        }
    }

    /// Record one failed attempt and decide what happens next.
    ///
    /// `attempt` is the 1-based count of generation attempts that have
    /// failed within the current turn.
    pub fn on_failure(&self, session_id: SessionId, attempt: u32) -> RecoveryDirective {
        let mut ledger = self.sessions.entry(session_id).or_default();
        if ledger.escalated {
            return RecoveryDirective::Escalate;
        }

        ledger.consecutive_failures += 1;
        let breaker_tripped = ledger.consecutive_failures >= self.config.circuit_breaker_threshold;
        let budget_exhausted = attempt > self.config.retry_budget;

        if breaker_tripped || budget_exhausted {
            return self.trip_safe_mode_locked(session_id, &mut ledger);
        }

        let backoff = self.backoff_for(attempt);
        tracing::info!(
            session_id = %session_id,
            attempt,
            backoff_ms = backoff.as_millis() as u64,
            state = %RecoveryState::Retrying,
            "recovery retrying turn"
        );
        RecoveryDirective::Retry {
            attempt: attempt + 1,
            backoff,
        }
    }

    /// Force a safe-mode transition (e.g., the total recovery timeout ran
    /// out before the retry budget did).
    pub fn trip_safe_mode(&self, session_id: SessionId) -> RecoveryDirective {
        let mut ledger = self.sessions.entry(session_id).or_default();
        if ledger.escalated {
            return RecoveryDirective::Escalate;
        }
        self.trip_safe_mode_locked(session_id, &mut ledger)
    }

    /// Manually reset a session's ledger, re-enabling automatic retries.
    pub fn reset_session(&self, session_id: SessionId) {
        self.sessions.remove(&session_id);
        tracing::info!(session_id = %session_id, "recovery ledger reset");
    }

    /// Exponential backoff: 1s, 2s, 4s for the default base.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.config.base_backoff.saturating_mul(factor)
    }

    fn trip_safe_mode_locked(
        &self,
        session_id: SessionId,
        ledger: &mut SessionLedger,
    ) -> RecoveryDirective {
        ledger.consecutive_failures = 0;
        ledger.safe_mode_triggers += 1;

        if ledger.safe_mode_triggers >= self.config.safe_mode_session_limit {
            ledger.escalated = true;
            tracing::error!(
                session_id = %session_id,
                safe_mode_triggers = ledger.safe_mode_triggers,
                state = %RecoveryState::Escalated,
                "session escalated; automatic retries disabled until reset"
            );
            return RecoveryDirective::Escalate;
        }

        tracing::error!(
            session_id = %session_id,
            safe_mode_triggers = ledger.safe_mode_triggers,
            state = %RecoveryState::SafeMode,
            "entering safe mode; returning last known-good state"
        );
        RecoveryDirective::EnterSafeMode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> RecoveryCoordinator {
        RecoveryCoordinator::new(RecoveryConfig::default())
    }

    // =========================================================================
    // Retry Budget
    // =========================================================================

    #[test]
    fn first_failures_get_exponential_backoff() {
        let recovery = coordinator();
        let session = SessionId::new();

        let first = recovery.on_failure(session, 1);
        assert_eq!(
            first,
            RecoveryDirective::Retry {
                attempt: 2,
                backoff: Duration::from_secs(1)
            }
        );

        let second = recovery.on_failure(session, 2);
        assert_eq!(
            second,
            RecoveryDirective::Retry {
                attempt: 3,
                backoff: Duration::from_secs(2)
            }
        );
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let recovery = coordinator();
        assert_eq!(recovery.backoff_for(1), Duration::from_secs(1));
        assert_eq!(recovery.backoff_for(2), Duration::from_secs(2));
        assert_eq!(recovery.backoff_for(3), Duration::from_secs(4));
    }

    #[test]
    fn exceeding_retry_budget_enters_safe_mode() {
        let config = RecoveryConfig {
            retry_budget: 2,
            circuit_breaker_threshold: 10,
            ..RecoveryConfig::default()
        };
        let recovery = RecoveryCoordinator::new(config);
        let session = SessionId::new();

        assert!(matches!(
            recovery.on_failure(session, 1),
            RecoveryDirective::Retry { .. }
        ));
        assert!(matches!(
            recovery.on_failure(session, 2),
            RecoveryDirective::Retry { .. }
        ));
        assert_eq!(
            recovery.on_failure(session, 3),
            RecoveryDirective::EnterSafeMode
        );
    }

    // =========================================================================
    // Circuit Breaker
    // =========================================================================

    #[test]
    fn third_consecutive_failure_trips_the_breaker() {
        // Scenario: three consecutive validation failures in one session.
        let recovery = coordinator();
        let session = SessionId::new();

        assert!(matches!(
            recovery.on_failure(session, 1),
            RecoveryDirective::Retry { .. }
        ));
        assert!(matches!(
            recovery.on_failure(session, 2),
            RecoveryDirective::Retry { .. }
        ));
        assert_eq!(
            recovery.on_failure(session, 3),
            RecoveryDirective::EnterSafeMode
        );
    }

    #[test]
    fn success_resets_the_failure_streak() {
        let recovery = coordinator();
        let session = SessionId::new();

        recovery.on_failure(session, 1);
        recovery.on_failure(session, 2);
        recovery.record_success(session);

        // Streak restarted: the next failure retries instead of tripping.
        assert!(matches!(
            recovery.on_failure(session, 1),
            RecoveryDirective::Retry { .. }
        ));
    }

    #[test]
    fn breaker_counts_across_turns_in_one_session() {
        let recovery = coordinator();
        let session = SessionId::new();

        // Two single-failure turns, no successes between them.
        recovery.on_failure(session, 1);
        recovery.on_failure(session, 1);
        // Third failure in the session trips the breaker even though each
        // turn was under its own retry budget.
        assert_eq!(
            recovery.on_failure(session, 1),
            RecoveryDirective::EnterSafeMode
        );
    }

    #[test]
    fn sessions_are_isolated() {
        let recovery = coordinator();
        let noisy = SessionId::new();
        let quiet = SessionId::new();

        recovery.on_failure(noisy, 1);
        recovery.on_failure(noisy, 2);

        assert!(matches!(
            recovery.on_failure(quiet, 1),
            RecoveryDirective::Retry { .. }
        ));
    }

    // =========================================================================
    // Escalation
    // =========================================================================

    #[test]
    fn safe_mode_limit_escalates_the_session() {
        let config = RecoveryConfig {
            safe_mode_session_limit: 2,
            ..RecoveryConfig::default()
        };
        let recovery = RecoveryCoordinator::new(config);
        let session = SessionId::new();

        assert_eq!(
            recovery.trip_safe_mode(session),
            RecoveryDirective::EnterSafeMode
        );
        assert_eq!(recovery.trip_safe_mode(session), RecoveryDirective::Escalate);
        assert!(recovery.is_escalated(session));
    }

    #[test]
    fn escalated_sessions_never_retry() {
        let config = RecoveryConfig {
            safe_mode_session_limit: 1,
            ..RecoveryConfig::default()
        };
        let recovery = RecoveryCoordinator::new(config);
        let session = SessionId::new();

        assert_eq!(recovery.trip_safe_mode(session), RecoveryDirective::Escalate);
        assert_eq!(recovery.on_failure(session, 1), RecoveryDirective::Escalate);
    }

    #[test]
    fn reset_reenables_retries() {
        let config = RecoveryConfig {
            safe_mode_session_limit: 1,
            ..RecoveryConfig::default()
        };
        let recovery = RecoveryCoordinator::new(config);
        let session = SessionId::new();

        recovery.trip_safe_mode(session);
        assert!(recovery.is_escalated(session));

        recovery.reset_session(session);

        assert!(!recovery.is_escalated(session));
        assert!(matches!(
            recovery.on_failure(session, 1),
            RecoveryDirective::Retry { .. }
        ));
    }
}
