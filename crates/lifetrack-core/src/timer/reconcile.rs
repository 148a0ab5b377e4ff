//! One-shot catch-up after a cold load.
//!
//! The process may have been suspended or killed while a phase was
//! running. Nothing ticked in the meantime, so the stored record may
//! describe a phase that has already ended. Reconciliation resolves
//! exactly that one phase; it never replays a backlog of cycles.

use serde::{Deserialize, Serialize};

use super::machine::{self, Transition};
use super::state::{Phase, TimerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Nothing was running.
    Inactive,
    /// Still inside the running phase (or a stopwatch); left as stored.
    InProgress,
    /// The running phase ended while unobserved and was completed.
    Completed { phase: Phase },
}

/// Reconcile a freshly loaded record against `now_ms`.
pub fn reconcile(loaded: &TimerState, now_ms: i64) -> (Transition, ReconcileOutcome) {
    if !loaded.running || loaded.is_idle() {
        return (Transition::unchanged(loaded), ReconcileOutcome::Inactive);
    }

    let transition = machine::tick(loaded, now_ms);
    let outcome = if transition.state == *loaded && transition.effects.is_empty() {
        ReconcileOutcome::InProgress
    } else {
        tracing::info!(
            phase = ?loaded.phase,
            mode = loaded.mode.as_str(),
            ends_at = loaded.phase_ends_at_epoch_ms,
            late_by_ms = loaded
                .phase_ends_at_epoch_ms
                .map(|ends| now_ms.saturating_sub(ends)),
            "phase ended while unobserved"
        );
        ReconcileOutcome::Completed {
            phase: loaded.phase,
        }
    };
    (transition, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::Effect;
    use crate::timer::{apply, StartParams, TimerEvent};

    const T0: i64 = 1_700_000_000_000;

    fn started(params: StartParams) -> TimerState {
        apply(&TimerState::default(), &TimerEvent::Start(params), T0).state
    }

    #[test]
    fn idle_and_paused_records_are_untouched() {
        let idle = TimerState::default();
        let (t, outcome) = reconcile(&idle, T0);
        assert_eq!(t.state, idle);
        assert_eq!(outcome, ReconcileOutcome::Inactive);

        let s = started(StartParams::countdown(600));
        let paused = apply(&s, &TimerEvent::Pause, T0 + 1000).state;
        let (t, outcome) = reconcile(&paused, T0 + 10_000_000);
        assert_eq!(t.state, paused);
        assert!(t.effects.is_empty());
        assert_eq!(outcome, ReconcileOutcome::Inactive);
    }

    #[test]
    fn running_before_deadline_is_untouched() {
        let s = started(StartParams::countdown(600));
        let (t, outcome) = reconcile(&s, T0 + 599_000);
        assert_eq!(t.state, s);
        assert!(t.effects.is_empty());
        assert_eq!(outcome, ReconcileOutcome::InProgress);
    }

    #[test]
    fn countup_is_never_completed_by_reconcile() {
        let s = started(StartParams::countup());
        let (t, outcome) = reconcile(&s, T0 + 30 * 86_400_000);
        assert_eq!(t.state, s);
        assert_eq!(outcome, ReconcileOutcome::InProgress);
    }

    #[test]
    fn countdown_killed_and_reloaded_late_completes_once() {
        let s = started(StartParams::countdown(600));
        let (t, outcome) = reconcile(&s, T0 + 900_000);
        assert!(t.state.is_idle());
        assert_eq!(t.recorded_minutes(), vec![10]);
        assert_eq!(outcome, ReconcileOutcome::Completed { phase: Phase::Focus });
        assert!(t.effects.contains(&Effect::CancelScheduled));
        assert!(t.effects.contains(&Effect::DismissOngoing));
    }

    #[test]
    fn pomodoro_days_late_resolves_only_the_active_phase() {
        let s = started(StartParams::pomodoro(1500, 300, 4));
        let now = T0 + 3 * 86_400_000;
        let (t, _) = reconcile(&s, now);
        assert_eq!(t.state.phase, Phase::Break);
        assert_eq!(t.state.cycles_completed, 1);
        assert_eq!(t.recorded_minutes(), vec![25]);
        // The follow-up break starts at load time, not at the stale deadline.
        assert_eq!(t.state.phase_started_at_epoch_ms, Some(now));

        // Reconciling the result again finds nothing more to do.
        let (again, outcome) = reconcile(&t.state, now);
        assert_eq!(again.state, t.state);
        assert_eq!(outcome, ReconcileOutcome::InProgress);
    }
}
