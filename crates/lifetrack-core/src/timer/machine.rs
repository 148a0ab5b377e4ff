//! Focus timer state machine.
//!
//! A pure function of `(state, event, now)`. It never reads a clock,
//! never touches storage and never talks to the notification facility;
//! it only describes what should happen as a list of [`Effect`]s.
//!
//! ## Phase Transitions
//!
//! ```text
//! Idle -> Focus -> Idle                         (countdown, countup)
//! Idle -> Focus -> Break -> Focus -> ... -> Idle (pomodoro)
//! ```

use serde::{Deserialize, Serialize};

use super::state::{Mode, Phase, TimerState};
use crate::effects::{Effect, OngoingNotification};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimerEvent {
    Start(StartParams),
    Pause,
    Resume,
    Skip,
    Stop,
    /// Display refresh. May discover that the running phase has ended.
    Tick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartParams {
    pub mode: Mode,
    pub focus_duration_sec: u64,
    pub break_duration_sec: u64,
    pub cycles_target: u32,
}

impl StartParams {
    pub fn countdown(focus_duration_sec: u64) -> Self {
        Self {
            mode: Mode::Countdown,
            focus_duration_sec,
            break_duration_sec: 0,
            cycles_target: 1,
        }
    }

    pub fn countup() -> Self {
        Self {
            mode: Mode::Countup,
            focus_duration_sec: 0,
            break_duration_sec: 0,
            cycles_target: 1,
        }
    }

    pub fn pomodoro(focus_duration_sec: u64, break_duration_sec: u64, cycles_target: u32) -> Self {
        Self {
            mode: Mode::Pomodoro,
            focus_duration_sec,
            break_duration_sec,
            cycles_target,
        }
    }

    fn is_valid(&self) -> bool {
        match self.mode {
            Mode::Pomodoro => self.focus_duration_sec > 0 && self.cycles_target > 0,
            Mode::Countdown => self.focus_duration_sec > 0,
            Mode::Countup => true,
        }
    }
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: TimerState,
    pub effects: Vec<Effect>,
}

impl Transition {
    pub(crate) fn unchanged(state: &TimerState) -> Self {
        Self {
            state: state.clone(),
            effects: Vec::new(),
        }
    }

    /// Focus minutes recorded by this transition.
    pub fn recorded_minutes(&self) -> Vec<u32> {
        self.effects
            .iter()
            .filter_map(|e| match e {
                Effect::RecordEntry { duration_minutes, .. } => Some(*duration_minutes),
                _ => None,
            })
            .collect()
    }

    /// Prepend the effects of an earlier step in the same batch.
    fn after(mut self, mut earlier: Vec<Effect>) -> Self {
        earlier.append(&mut self.effects);
        self.effects = earlier;
        self
    }
}

/// Apply `event` to `state` at `now_ms`.
///
/// Events that make no sense for the current state are no-ops: the
/// state comes back unchanged with no effects.
pub fn apply(state: &TimerState, event: &TimerEvent, now_ms: i64) -> Transition {
    match event {
        TimerEvent::Start(params) => start(state, params, now_ms),
        TimerEvent::Pause => pause(state, now_ms),
        TimerEvent::Resume => resume(state, now_ms),
        TimerEvent::Skip => skip(state, now_ms),
        TimerEvent::Stop => stop(state, now_ms),
        TimerEvent::Tick => tick(state, now_ms),
    }
}

/// Resolve a running phase whose deadline has passed. Shared by `Tick`
/// and the resume reconciler.
pub(crate) fn tick(state: &TimerState, now_ms: i64) -> Transition {
    match state.phase_ends_at_epoch_ms {
        Some(ends) if state.is_due(now_ms) => complete(state, now_ms, ends),
        _ => Transition::unchanged(state),
    }
}

fn start(state: &TimerState, params: &StartParams, now_ms: i64) -> Transition {
    if !params.is_valid() {
        return Transition::unchanged(state);
    }

    // Only one session at a time: end the previous one first.
    let prior = if state.phase.is_active() {
        stop(state, now_ms).effects
    } else {
        Vec::new()
    };

    let (break_duration_sec, cycles_target) = match params.mode {
        Mode::Pomodoro => (params.break_duration_sec, params.cycles_target),
        Mode::Countdown | Mode::Countup => (0, 1),
    };
    let next = TimerState {
        mode: params.mode,
        phase: Phase::Focus,
        running: true,
        focus_duration_sec: params.focus_duration_sec,
        break_duration_sec,
        cycles_target,
        cycles_completed: 0,
        phase_started_at_epoch_ms: Some(now_ms),
        phase_ends_at_epoch_ms: params
            .mode
            .has_deadline()
            .then(|| deadline(now_ms, params.focus_duration_sec)),
        accumulated_ms: 0,
    };

    let mut effects = Vec::new();
    if let Some(ends) = next.phase_ends_at_epoch_ms {
        effects.push(Effect::ScheduleCompletion {
            ends_at_epoch_ms: ends,
            phase: Phase::Focus,
        });
    }
    effects.push(ongoing(&next, now_ms));
    Transition { state: next, effects }.after(prior)
}

fn pause(state: &TimerState, now_ms: i64) -> Transition {
    if !state.running {
        return Transition::unchanged(state);
    }
    if state.is_due(now_ms) {
        // The phase already ended; fold that in, then pause whatever follows.
        let done = tick(state, now_ms);
        if !done.state.running {
            return done;
        }
        let effects = done.effects;
        return pause(&done.state, now_ms).after(effects);
    }

    let Some(started) = state.phase_started_at_epoch_ms else {
        return Transition::unchanged(state);
    };
    let interval = now_ms.saturating_sub(started).max(0) as u64;
    let mut banked = state.accumulated_ms.saturating_add(interval);
    if let Some(target) = state.target_ms() {
        banked = banked.min(target);
    }

    let next = TimerState {
        running: false,
        phase_started_at_epoch_ms: None,
        phase_ends_at_epoch_ms: None,
        accumulated_ms: banked,
        ..state.clone()
    };

    let mut effects = Vec::new();
    if state.phase_ends_at_epoch_ms.is_some() {
        effects.push(Effect::CancelScheduled);
    }
    effects.push(ongoing(&next, now_ms));
    Transition { state: next, effects }
}

fn resume(state: &TimerState, now_ms: i64) -> Transition {
    if state.running || !state.phase.is_active() {
        return Transition::unchanged(state);
    }

    let ends = state.target_ms().map(|target| {
        let left = target.saturating_sub(state.accumulated_ms);
        now_ms.saturating_add(i64::try_from(left).unwrap_or(i64::MAX))
    });
    let next = TimerState {
        running: true,
        phase_started_at_epoch_ms: Some(now_ms),
        phase_ends_at_epoch_ms: ends,
        ..state.clone()
    };

    let mut effects = Vec::new();
    if let Some(ends) = ends {
        effects.push(Effect::CancelScheduled);
        effects.push(Effect::ScheduleCompletion {
            ends_at_epoch_ms: ends,
            phase: next.phase,
        });
    }
    effects.push(ongoing(&next, now_ms));
    Transition { state: next, effects }
}

fn skip(state: &TimerState, now_ms: i64) -> Transition {
    match (state.phase, state.mode) {
        (Phase::Idle, _) => Transition::unchanged(state),
        // A stopwatch has no deadline to jump to; finishing it is the
        // operator's completion path.
        (_, Mode::Countup) => stop(state, now_ms),
        _ => complete(state, now_ms, now_ms),
    }
}

fn stop(state: &TimerState, now_ms: i64) -> Transition {
    if !state.phase.is_active() {
        return Transition::unchanged(state);
    }

    let mut effects = vec![Effect::CancelScheduled, Effect::DismissOngoing];
    if state.mode == Mode::Countup && state.phase == Phase::Focus {
        let minutes = ceil_minutes(state.elapsed_ms(now_ms));
        if minutes > 0 {
            effects.push(Effect::RecordEntry {
                duration_minutes: minutes,
                completed_at_epoch_ms: now_ms,
            });
        }
    }
    Transition {
        state: TimerState::default(),
        effects,
    }
}

/// Run the completion path of the active phase. The next phase, if any,
/// starts fresh at `now_ms`.
fn complete(state: &TimerState, now_ms: i64, completed_at: i64) -> Transition {
    let mut effects = vec![Effect::CancelScheduled];

    let next = match state.phase {
        Phase::Idle => return Transition::unchanged(state),
        Phase::Focus => {
            let minutes = match state.mode {
                Mode::Countup => ceil_minutes(state.elapsed_ms(now_ms)),
                Mode::Pomodoro | Mode::Countdown => {
                    u32::try_from(state.focus_duration_sec / 60).unwrap_or(u32::MAX)
                }
            };
            if minutes > 0 {
                effects.push(Effect::RecordEntry {
                    duration_minutes: minutes,
                    completed_at_epoch_ms: completed_at,
                });
            }

            match state.mode {
                Mode::Countdown | Mode::Countup => None,
                Mode::Pomodoro => {
                    let cycles_completed = state.cycles_completed.saturating_add(1);
                    if cycles_completed >= state.cycles_target {
                        None
                    } else {
                        Some(TimerState {
                            cycles_completed,
                            ..fresh_phase(state, Phase::Break, state.break_duration_sec, now_ms)
                        })
                    }
                }
            }
        }
        Phase::Break => Some(fresh_phase(
            state,
            Phase::Focus,
            state.focus_duration_sec,
            now_ms,
        )),
    };

    match next {
        Some(next) => {
            if let Some(ends) = next.phase_ends_at_epoch_ms {
                effects.push(Effect::ScheduleCompletion {
                    ends_at_epoch_ms: ends,
                    phase: next.phase,
                });
            }
            effects.push(ongoing(&next, now_ms));
            Transition { state: next, effects }
        }
        None => {
            effects.push(Effect::DismissOngoing);
            Transition {
                state: TimerState::default(),
                effects,
            }
        }
    }
}

fn fresh_phase(state: &TimerState, phase: Phase, duration_sec: u64, now_ms: i64) -> TimerState {
    TimerState {
        phase,
        running: true,
        phase_started_at_epoch_ms: Some(now_ms),
        phase_ends_at_epoch_ms: Some(deadline(now_ms, duration_sec)),
        accumulated_ms: 0,
        ..state.clone()
    }
}

fn ongoing(state: &TimerState, now_ms: i64) -> Effect {
    Effect::ShowOngoing(OngoingNotification {
        phase: state.phase,
        mode: state.mode,
        running: state.running,
        display_text: state.display_text(now_ms),
        cycle: state.cycle_info(),
    })
}

fn deadline(now_ms: i64, duration_sec: u64) -> i64 {
    let ms = i64::try_from(duration_sec.saturating_mul(1000)).unwrap_or(i64::MAX);
    now_ms.saturating_add(ms)
}

fn ceil_minutes(ms: u64) -> u32 {
    u32::try_from(ms.div_ceil(60_000)).unwrap_or(u32::MAX)
}
