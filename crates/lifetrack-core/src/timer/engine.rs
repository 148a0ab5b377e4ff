//! Timer engine: the runtime around the pure state machine.
//!
//! The engine owns one account's timer record together with its
//! collaborators. It does not use internal threads - the caller feeds it
//! events (including periodic `Tick`s for the live display) and the
//! engine reads the clock once per event.
//!
//! ## Per-event pipeline
//!
//! ```text
//! reload stored record -> apply(state, event, now) -> entries built
//!                      -> commit (state + entries)
//!                      -> notification calls, in effect order
//! ```
//!
//! Persistence happens before any notification call, so after a crash the
//! worst case is a stale alert, never a wrong record.
//!
//! ## Usage
//!
//! ```ignore
//! let db = Database::open()?;
//! let mut engine = TimerEngine::load("default", db.account("default"), LogScheduler, SystemClock);
//! engine.dispatch(TimerEvent::Start(StartParams::countdown(600)))?;
//! // While visible, once a second:
//! engine.dispatch(TimerEvent::Tick)?;
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::machine::{apply, TimerEvent, Transition};
use super::reconcile::{reconcile, ReconcileOutcome};
use super::state::{CycleInfo, Mode, Phase, TimerState};
use crate::clock::Clock;
use crate::effects::{Effect, OngoingNotification};
use crate::entries::{monthly_minutes, EntryRecorder, FocusEntry};
use crate::error::{CoreError, DatabaseError};
use crate::notify::NotificationScheduler;
use crate::storage::PersistenceAdapter;

/// Read-only snapshot for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerView {
    pub account: String,
    pub mode: Mode,
    pub phase: Phase,
    pub running: bool,
    pub paused: bool,
    pub elapsed_ms: u64,
    /// `None` for countup and idle.
    pub remaining_ms: Option<u64>,
    pub display_text: String,
    pub cycle: CycleInfo,
    pub phase_ends_at_epoch_ms: Option<i64>,
    /// False while a write is queued for retry.
    pub durable: bool,
    pub notify_failures: u64,
}

/// What a single event did.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub view: TimerView,
    pub effects: Vec<Effect>,
    pub recorded: Vec<FocusEntry>,
}

/// Core timer engine for one account.
pub struct TimerEngine<P, N, C> {
    account: String,
    state: TimerState,
    store: P,
    notifier: N,
    recorder: EntryRecorder<C>,
    /// Entries from transitions whose commit failed. The state itself is
    /// always the in-memory one, so only entries need queueing.
    pending: Option<Vec<FocusEntry>>,
    show_ongoing: bool,
    notify_failures: u64,
    load_outcome: ReconcileOutcome,
}

impl<P, N, C> TimerEngine<P, N, C>
where
    P: PersistenceAdapter,
    N: NotificationScheduler,
    C: Clock,
{
    /// Load the stored record and reconcile it once against the clock.
    ///
    /// Never fails. If the reconciled record cannot be written it stays
    /// queued and [`TimerView::durable`] reports `false`.
    pub fn load(account: impl Into<String>, store: P, notifier: N, clock: C) -> Self {
        Self::load_with(account, store, notifier, clock, true)
    }

    /// Like [`TimerEngine::load`], optionally suppressing the ongoing indicator.
    pub fn load_with(
        account: impl Into<String>,
        store: P,
        notifier: N,
        clock: C,
        show_ongoing: bool,
    ) -> Self {
        let loaded = store.load();
        let mut engine = Self {
            account: account.into(),
            state: loaded.clone(),
            store,
            notifier,
            recorder: EntryRecorder::new(clock),
            pending: None,
            show_ongoing,
            notify_failures: 0,
            load_outcome: ReconcileOutcome::Inactive,
        };

        let now = engine.now();
        let (transition, outcome) = reconcile(&loaded, now);
        engine.load_outcome = outcome;
        tracing::debug!(account = %engine.account, ?outcome, "timer loaded");

        if matches!(outcome, ReconcileOutcome::Completed { .. }) {
            if let Err(e) = engine.commit_transition(transition, now) {
                tracing::warn!(account = %engine.account, error = %e, "reconciled state not saved");
            }
        } else if engine.state.phase.is_active() {
            // A fresh process has no indicator on screen yet.
            let view = engine.view_at(now);
            let refresh = Effect::ShowOngoing(OngoingNotification {
                phase: view.phase,
                mode: view.mode,
                running: view.running,
                display_text: view.display_text,
                cycle: view.cycle,
            });
            engine.run_notifications(&[refresh]);
        }
        engine
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    /// What reconciliation found when this engine was loaded.
    pub fn load_outcome(&self) -> ReconcileOutcome {
        self.load_outcome
    }

    pub fn is_durable(&self) -> bool {
        self.pending.is_none()
    }

    pub fn view(&self) -> TimerView {
        self.view_at(self.now())
    }

    pub fn entries(&self) -> Result<Vec<FocusEntry>, CoreError> {
        Ok(self.store.load_entries()?)
    }

    /// Focus minutes per `YYYY-MM`.
    pub fn monthly_minutes(&self) -> Result<BTreeMap<String, u64>, CoreError> {
        Ok(monthly_minutes(&self.entries()?))
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Apply one event at the current instant.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotDurable`] when the new state could not be saved.
    /// The transition still took effect in memory and the write is retried
    /// with the next event or [`TimerEngine::flush`].
    pub fn dispatch(&mut self, event: TimerEvent) -> Result<DispatchOutcome, CoreError> {
        let now = self.now();
        self.refresh();
        let transition = apply(&self.state, &event, now);
        if transition.effects.is_empty() && transition.state == self.state {
            if !matches!(event, TimerEvent::Tick) {
                tracing::debug!(?event, phase = ?self.state.phase, "event ignored");
            }
            if self.pending.is_some() {
                self.flush()?;
            }
            return Ok(DispatchOutcome {
                view: self.view_at(now),
                effects: Vec::new(),
                recorded: Vec::new(),
            });
        }

        tracing::info!(
            account = %self.account,
            ?event,
            from = ?self.state.phase,
            to = ?transition.state.phase,
            "timer transition"
        );
        self.commit_transition(transition, now)
    }

    /// Retry a queued write.
    pub fn flush(&mut self) -> Result<(), CoreError> {
        if self.pending.is_none() {
            return Ok(());
        }
        self.persist(Vec::new())
    }

    /// Delete a recorded entry by id.
    pub fn delete_entry(&self, id: &str) -> Result<bool, CoreError> {
        Ok(self.store.delete_entry(id)?)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn now(&self) -> i64 {
        self.recorder.clock().now_ms()
    }

    /// Pick up the stored record so events apply to the latest session,
    /// even when another process changed it since this engine loaded.
    /// A queued write means the in-memory state is newer and wins.
    fn refresh(&mut self) {
        if self.pending.is_some() {
            return;
        }
        let stored = self.store.load();
        if stored != self.state {
            tracing::debug!(
                account = %self.account,
                from = ?self.state.phase,
                to = ?stored.phase,
                "timer record changed by another writer"
            );
            self.state = stored;
        }
    }

    fn commit_transition(
        &mut self,
        transition: Transition,
        now: i64,
    ) -> Result<DispatchOutcome, CoreError> {
        let recorded: Vec<FocusEntry> = transition
            .effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::RecordEntry {
                    duration_minutes,
                    completed_at_epoch_ms,
                } => Some(
                    self.recorder
                        .record_completion(*duration_minutes, *completed_at_epoch_ms),
                ),
                _ => None,
            })
            .collect();

        self.state = transition.state;
        let persisted = self.persist(recorded.clone());
        self.run_notifications(&transition.effects);

        persisted.map(|()| DispatchOutcome {
            view: self.view_at(now),
            effects: transition.effects,
            recorded,
        })
    }

    fn persist(&mut self, new_entries: Vec<FocusEntry>) -> Result<(), CoreError> {
        let mut entries = self.pending.take().unwrap_or_default();
        entries.extend(new_entries);

        match self.store.commit(&self.state, &entries) {
            Ok(()) => {
                for entry in &entries {
                    tracing::info!(
                        account = %self.account,
                        id = %entry.id,
                        date = %entry.date,
                        minutes = entry.duration_minutes,
                        "focus entry recorded"
                    );
                }
                Ok(())
            }
            Err(source) => {
                tracing::warn!(
                    account = %self.account,
                    error = %source,
                    queued_entries = entries.len(),
                    "timer state not saved, will retry"
                );
                self.pending = Some(entries);
                Err(not_durable(source))
            }
        }
    }

    fn run_notifications(&mut self, effects: &[Effect]) {
        for effect in effects {
            let result = match effect {
                Effect::ScheduleCompletion {
                    ends_at_epoch_ms,
                    phase,
                } => self.notifier.schedule_completion(*ends_at_epoch_ms, *phase),
                Effect::CancelScheduled => self.notifier.cancel_scheduled(),
                Effect::ShowOngoing(ongoing) if self.show_ongoing => {
                    self.notifier.show_ongoing(ongoing)
                }
                Effect::ShowOngoing(_) => Ok(()),
                Effect::DismissOngoing => self.notifier.dismiss_ongoing(),
                Effect::RecordEntry { .. } => Ok(()),
            };
            if let Err(e) = result {
                self.notify_failures += 1;
                tracing::warn!(account = %self.account, ?effect, error = %e, "notification request failed");
            }
        }
    }

    fn view_at(&self, now: i64) -> TimerView {
        let s = &self.state;
        TimerView {
            account: self.account.clone(),
            mode: s.mode,
            phase: s.phase,
            running: s.running,
            paused: s.is_paused(),
            elapsed_ms: if s.phase.is_active() { s.elapsed_ms(now) } else { 0 },
            remaining_ms: s.remaining_ms(now),
            display_text: s.display_text(now),
            cycle: s.cycle_info(),
            phase_ends_at_epoch_ms: s.phase_ends_at_epoch_ms,
            durable: self.pending.is_none(),
            notify_failures: self.notify_failures,
        }
    }
}

fn not_durable(source: DatabaseError) -> CoreError {
    CoreError::NotDurable { source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notify::{NotifyCall, RecordingScheduler};
    use crate::storage::{Database, MemoryStore};
    use crate::timer::StartParams;

    const T0: i64 = 1_700_000_000_000;

    type Engine<'a> = TimerEngine<&'a MemoryStore, &'a RecordingScheduler, &'a ManualClock>;

    fn engine<'a>(
        store: &'a MemoryStore,
        notifier: &'a RecordingScheduler,
        clock: &'a ManualClock,
    ) -> Engine<'a> {
        TimerEngine::load("me", store, notifier, clock)
    }

    #[test]
    fn start_persists_before_returning() {
        let (store, notifier, clock) = (MemoryStore::new(), RecordingScheduler::new(), ManualClock::new(T0));
        let mut e = engine(&store, &notifier, &clock);
        let out = e
            .dispatch(TimerEvent::Start(StartParams::countdown(600)))
            .unwrap();
        assert_eq!(out.view.remaining_ms, Some(600_000));
        assert_eq!(store.load(), *e.state());
        assert_eq!(notifier.pending(), Some((T0 + 600_000, Phase::Focus)));
        assert!(notifier.ongoing().is_some());
    }

    #[test]
    fn countdown_killed_then_reloaded_records_once() {
        let (store, notifier, clock) = (MemoryStore::new(), RecordingScheduler::new(), ManualClock::new(T0));
        {
            let mut e = engine(&store, &notifier, &clock);
            e.dispatch(TimerEvent::Start(StartParams::countdown(600)))
                .unwrap();
        }

        clock.advance_secs(900);
        let e = engine(&store, &notifier, &clock);
        assert_eq!(
            e.load_outcome(),
            ReconcileOutcome::Completed { phase: Phase::Focus }
        );
        assert!(e.state().is_idle());
        let entries = e.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].duration_minutes, 10);
        assert_eq!(notifier.pending(), None);
        assert!(notifier.ongoing().is_none());

        // A second cold load finds nothing left to do.
        let e = engine(&store, &notifier, &clock);
        assert_eq!(e.load_outcome(), ReconcileOutcome::Inactive);
        assert_eq!(e.entries().unwrap().len(), 1);
    }

    #[test]
    fn reload_mid_phase_reshows_ongoing_only() {
        let (store, clock) = (MemoryStore::new(), ManualClock::new(T0));
        let first = RecordingScheduler::new();
        engine(&store, &first, &clock)
            .dispatch(TimerEvent::Start(StartParams::pomodoro(1500, 300, 4)))
            .unwrap();

        clock.advance_secs(60);
        let second = RecordingScheduler::new();
        let e = engine(&store, &second, &clock);
        assert_eq!(e.load_outcome(), ReconcileOutcome::InProgress);
        let calls = second.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            NotifyCall::Show(n) => assert_eq!(n.display_text, "24:00"),
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[test]
    fn pomodoro_runs_to_completion_with_ticks() {
        let (store, notifier, clock) = (MemoryStore::new(), RecordingScheduler::new(), ManualClock::new(T0));
        let mut e = engine(&store, &notifier, &clock);
        e.dispatch(TimerEvent::Start(StartParams::pomodoro(1500, 300, 4)))
            .unwrap();

        for cycle in 1..=4 {
            clock.advance_secs(1500);
            let out = e.dispatch(TimerEvent::Tick).unwrap();
            assert_eq!(out.recorded.len(), 1);
            if cycle < 4 {
                assert_eq!(out.view.phase, Phase::Break);
                assert_eq!(notifier.pending().map(|p| p.1), Some(Phase::Break));
                clock.advance_secs(300);
                let out = e.dispatch(TimerEvent::Tick).unwrap();
                assert_eq!(out.view.phase, Phase::Focus);
                assert_eq!(out.view.cycle.completed, cycle);
            } else {
                assert_eq!(out.view.phase, Phase::Idle);
            }
        }

        let entries = e.entries().unwrap();
        assert_eq!(entries.len(), 4);
        assert!(entries.iter().all(|en| en.duration_minutes == 25));
        assert_eq!(notifier.pending(), None);
        assert!(notifier.ongoing().is_none());
        assert_eq!(e.monthly_minutes().unwrap().values().sum::<u64>(), 100);
    }

    #[test]
    fn stop_cancels_then_dismisses() {
        let (store, notifier, clock) = (MemoryStore::new(), RecordingScheduler::new(), ManualClock::new(T0));
        let mut e = engine(&store, &notifier, &clock);
        e.dispatch(TimerEvent::Start(StartParams::countdown(600)))
            .unwrap();
        notifier.clear();
        clock.advance_secs(10);
        let out = e.dispatch(TimerEvent::Stop).unwrap();
        assert_eq!(out.view.phase, Phase::Idle);
        assert_eq!(notifier.calls(), vec![NotifyCall::Cancel, NotifyCall::Dismiss]);
        assert!(e.entries().unwrap().is_empty());
    }

    #[test]
    fn failed_save_keeps_transition_and_retries() {
        let (store, notifier, clock) = (MemoryStore::new(), RecordingScheduler::new(), ManualClock::new(T0));
        let mut e = engine(&store, &notifier, &clock);
        e.dispatch(TimerEvent::Start(StartParams::countdown(600)))
            .unwrap();

        store.fail_writes(true);
        clock.advance_secs(600);
        let err = e.dispatch(TimerEvent::Tick).unwrap_err();
        assert!(err.is_recoverable());
        assert!(e.state().is_idle());
        assert!(!e.view().durable);
        assert!(store.load_entries().unwrap().is_empty());
        // Notifications still follow the in-memory state.
        assert_eq!(notifier.pending(), None);

        store.fail_writes(false);
        e.dispatch(TimerEvent::Tick).unwrap();
        assert!(e.is_durable());
        assert!(store.load().is_idle());
        assert_eq!(store.load_entries().unwrap().len(), 1);
    }

    #[test]
    fn queued_entries_ride_along_with_next_transition() {
        let (store, notifier, clock) = (MemoryStore::new(), RecordingScheduler::new(), ManualClock::new(T0));
        let mut e = engine(&store, &notifier, &clock);
        e.dispatch(TimerEvent::Start(StartParams::countdown(600)))
            .unwrap();
        store.fail_writes(true);
        clock.advance_secs(600);
        assert!(e.dispatch(TimerEvent::Tick).is_err());

        store.fail_writes(false);
        let out = e
            .dispatch(TimerEvent::Start(StartParams::countup()))
            .unwrap();
        assert!(out.view.durable);
        assert_eq!(store.load_entries().unwrap().len(), 1);
        assert_eq!(store.load().mode, Mode::Countup);
    }

    #[test]
    fn notification_failures_do_not_affect_phases() {
        let (store, notifier, clock) = (MemoryStore::new(), RecordingScheduler::new(), ManualClock::new(T0));
        notifier.deny_permission(true);
        let mut e = engine(&store, &notifier, &clock);
        let out = e
            .dispatch(TimerEvent::Start(StartParams::pomodoro(60, 60, 2)))
            .unwrap();
        assert_eq!(out.view.phase, Phase::Focus);
        clock.advance_secs(60);
        let out = e.dispatch(TimerEvent::Tick).unwrap();
        assert_eq!(out.view.phase, Phase::Break);
        assert!(out.view.notify_failures > 0);
        assert_eq!(store.load_entries().unwrap().len(), 1);
    }

    #[test]
    fn events_apply_to_the_latest_stored_record() {
        let (store, clock) = (MemoryStore::new(), ManualClock::new(T0));
        let (watcher_notifier, other_notifier) = (RecordingScheduler::new(), RecordingScheduler::new());
        let mut watcher = engine(&store, &watcher_notifier, &clock);
        watcher
            .dispatch(TimerEvent::Start(StartParams::pomodoro(1500, 300, 4)))
            .unwrap();

        clock.advance_secs(60);
        let mut other = engine(&store, &other_notifier, &clock);
        other.dispatch(TimerEvent::Stop).unwrap();

        clock.advance_secs(1500);
        let out = watcher.dispatch(TimerEvent::Tick).unwrap();
        assert_eq!(out.view.phase, Phase::Idle);
        assert!(out.recorded.is_empty());
        assert!(store.load().is_idle());
        assert!(store.load_entries().unwrap().is_empty());
    }

    #[test]
    fn ignored_events_emit_nothing() {
        let (store, notifier, clock) = (MemoryStore::new(), RecordingScheduler::new(), ManualClock::new(T0));
        let mut e = engine(&store, &notifier, &clock);
        let out = e.dispatch(TimerEvent::Pause).unwrap();
        assert!(out.effects.is_empty());
        assert!(notifier.calls().is_empty());
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn ongoing_can_be_suppressed() {
        let (store, notifier, clock) = (MemoryStore::new(), RecordingScheduler::new(), ManualClock::new(T0));
        let mut e = TimerEngine::load_with("me", &store, &notifier, &clock, false);
        e.dispatch(TimerEvent::Start(StartParams::countdown(600)))
            .unwrap();
        assert!(notifier.ongoing().is_none());
        assert!(notifier.pending().is_some());
    }

    #[test]
    fn works_against_sqlite() {
        let db = Database::open_memory().unwrap();
        let (notifier, clock) = (RecordingScheduler::new(), ManualClock::new(T0));
        let mut e = TimerEngine::load("me", db.account("me"), &notifier, &clock);
        e.dispatch(TimerEvent::Start(StartParams::countup()))
            .unwrap();
        clock.advance_secs(125);
        let out = e.dispatch(TimerEvent::Stop).unwrap();
        assert_eq!(out.recorded[0].duration_minutes, 3);
        assert_eq!(out.recorded[0].date, "2023-11-14");

        let id = out.recorded[0].id.clone();
        assert!(e.delete_entry(&id).unwrap());
        assert!(e.entries().unwrap().is_empty());
    }
}
