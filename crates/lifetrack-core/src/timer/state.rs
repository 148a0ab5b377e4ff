//! Persisted timer record and the read-only queries derived from it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Alternating focus/break blocks for a fixed number of cycles.
    #[default]
    Pomodoro,
    /// A single fixed-length focus block.
    Countdown,
    /// Open-ended stopwatch, finished by the operator.
    Countup,
}

impl Mode {
    /// Whether phases in this mode end at a fixed deadline.
    pub fn has_deadline(self) -> bool {
        !matches!(self, Mode::Countup)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Pomodoro => "pomodoro",
            Mode::Countdown => "countdown",
            Mode::Countup => "countup",
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pomodoro" => Ok(Mode::Pomodoro),
            "countdown" => Ok(Mode::Countdown),
            "countup" | "stopwatch" => Ok(Mode::Countup),
            other => Err(format!("unknown timer mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Focus,
    Break,
}

impl Phase {
    pub fn is_active(self) -> bool {
        !matches!(self, Phase::Idle)
    }
}

/// Progress through a pomodoro session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleInfo {
    pub completed: u32,
    pub target: u32,
}

/// The single per-account timer record.
///
/// Only the fields needed to recompute elapsed/remaining time from an
/// epoch instant are stored; nothing here ticks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimerState {
    pub mode: Mode,
    pub phase: Phase,
    pub running: bool,
    pub focus_duration_sec: u64,
    pub break_duration_sec: u64,
    pub cycles_target: u32,
    pub cycles_completed: u32,
    /// Set when the phase last transitioned to running.
    pub phase_started_at_epoch_ms: Option<i64>,
    /// Absolute deadline of a running countdown-style phase.
    pub phase_ends_at_epoch_ms: Option<i64>,
    /// Running time banked before the current interval.
    pub accumulated_ms: u64,
}

impl Default for TimerState {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            phase: Phase::Idle,
            running: false,
            focus_duration_sec: 0,
            break_duration_sec: 0,
            cycles_target: 1,
            cycles_completed: 0,
            phase_started_at_epoch_ms: None,
            phase_ends_at_epoch_ms: None,
            accumulated_ms: 0,
        }
    }
}

impl TimerState {
    // ── Queries ──────────────────────────────────────────────────────

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    pub fn is_paused(&self) -> bool {
        self.phase.is_active() && !self.running
    }

    pub fn accumulated_sec(&self) -> u64 {
        self.accumulated_ms / 1000
    }

    /// Target length of the current phase, `None` when it has no deadline.
    pub fn target_ms(&self) -> Option<u64> {
        if !self.mode.has_deadline() {
            return None;
        }
        let secs = match self.phase {
            Phase::Idle => return None,
            Phase::Focus => self.focus_duration_sec,
            Phase::Break => self.break_duration_sec,
        };
        Some(secs.saturating_mul(1000))
    }

    /// Total running time of the current phase at `now_ms`.
    pub fn elapsed_ms(&self, now_ms: i64) -> u64 {
        let live = match (self.running, self.phase_started_at_epoch_ms) {
            (true, Some(started)) => now_ms.saturating_sub(started).max(0) as u64,
            _ => 0,
        };
        self.accumulated_ms.saturating_add(live)
    }

    /// Time left in the current phase at `now_ms`; `None` for countup or idle.
    pub fn remaining_ms(&self, now_ms: i64) -> Option<u64> {
        let target = self.target_ms()?;
        if let (true, Some(ends)) = (self.running, self.phase_ends_at_epoch_ms) {
            return Some(ends.saturating_sub(now_ms).max(0) as u64);
        }
        Some(target.saturating_sub(self.elapsed_ms(now_ms)))
    }

    /// Whether a running phase has reached its deadline.
    pub fn is_due(&self, now_ms: i64) -> bool {
        self.running
            && self
                .phase_ends_at_epoch_ms
                .is_some_and(|ends| now_ms >= ends)
    }

    pub fn cycle_info(&self) -> CycleInfo {
        CycleInfo {
            completed: self.cycles_completed,
            target: self.cycles_target,
        }
    }

    /// Text for the live display: remaining time for deadline modes,
    /// elapsed time for countup.
    pub fn display_text(&self, now_ms: i64) -> String {
        if self.is_idle() {
            return String::new();
        }
        let ms = self
            .remaining_ms(now_ms)
            .unwrap_or_else(|| self.elapsed_ms(now_ms));
        let clock = format_clock(ms, self.remaining_ms(now_ms).is_some());
        if self.running {
            clock
        } else {
            format!("{clock} (paused)")
        }
    }

    /// Check the structural invariants of a loaded record.
    pub fn is_consistent(&self) -> bool {
        match self.phase {
            Phase::Idle => {
                !self.running
                    && self.phase_started_at_epoch_ms.is_none()
                    && self.phase_ends_at_epoch_ms.is_none()
            }
            Phase::Focus | Phase::Break => {
                if self.running && self.phase_started_at_epoch_ms.is_none() {
                    return false;
                }
                if self.running && self.mode.has_deadline() && self.phase_ends_at_epoch_ms.is_none()
                {
                    return false;
                }
                if !self.mode.has_deadline() && self.phase_ends_at_epoch_ms.is_some() {
                    return false;
                }
                if self.phase == Phase::Break && self.mode != Mode::Pomodoro {
                    return false;
                }
                if !self.deadline_within_target() {
                    return false;
                }
                match self.mode {
                    Mode::Pomodoro => {
                        self.cycles_target >= 1 && self.cycles_completed <= self.cycles_target
                    }
                    Mode::Countdown | Mode::Countup => {
                        self.cycles_target == 1 && self.cycles_completed <= 1
                    }
                }
            }
        }
    }

    /// Banked time plus the running segment may not exceed the phase length.
    fn deadline_within_target(&self) -> bool {
        let Some(target) = self.target_ms() else {
            return true;
        };
        if self.accumulated_ms > target {
            return false;
        }
        match (self.phase_started_at_epoch_ms, self.phase_ends_at_epoch_ms) {
            (Some(started), Some(ends)) => match u64::try_from(ends.saturating_sub(started)) {
                Ok(segment) => segment.saturating_add(self.accumulated_ms) <= target,
                Err(_) => false,
            },
            _ => true,
        }
    }

    // ── Lenient decoding ─────────────────────────────────────────────

    /// Decode a stored record, falling back to defaults field by field.
    ///
    /// Unknown keys are ignored and any key whose value does not decode
    /// keeps its default. Input that is not a JSON object yields the
    /// default record.
    pub fn from_json_lenient(json: &str) -> Self {
        let Ok(serde_json::Value::Object(stored)) = serde_json::from_str::<serde_json::Value>(json)
        else {
            return Self::default();
        };
        if let Ok(state) = serde_json::from_value::<Self>(serde_json::Value::Object(stored.clone())) {
            return state;
        }

        let mut merged = match serde_json::to_value(Self::default()) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => return Self::default(),
        };
        for (key, value) in stored {
            if !merged.contains_key(&key) {
                continue;
            }
            let mut candidate = merged.clone();
            candidate.insert(key, value);
            let candidate = serde_json::Value::Object(candidate);
            if serde_json::from_value::<Self>(candidate.clone()).is_ok() {
                if let serde_json::Value::Object(map) = candidate {
                    merged = map;
                }
            }
        }
        serde_json::from_value(serde_json::Value::Object(merged)).unwrap_or_default()
    }
}

/// `mm:ss`, or `h:mm:ss` past an hour. Remaining time rounds up so a
/// countdown shows `00:01` until it actually ends.
pub fn format_clock(ms: u64, round_up: bool) -> String {
    let secs = if round_up { ms.div_ceil(1000) } else { ms / 1000 };
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_countdown(started: i64, focus_sec: u64) -> TimerState {
        TimerState {
            mode: Mode::Countdown,
            phase: Phase::Focus,
            running: true,
            focus_duration_sec: focus_sec,
            phase_started_at_epoch_ms: Some(started),
            phase_ends_at_epoch_ms: Some(started + focus_sec as i64 * 1000),
            ..TimerState::default()
        }
    }

    #[test]
    fn default_is_idle_and_consistent() {
        let s = TimerState::default();
        assert!(s.is_idle());
        assert!(!s.running);
        assert!(s.is_consistent());
        assert_eq!(s.display_text(0), "");
    }

    #[test]
    fn remaining_and_elapsed_are_derived_from_now() {
        let s = running_countdown(10_000, 600);
        assert_eq!(s.remaining_ms(10_000), Some(600_000));
        assert_eq!(s.elapsed_ms(70_000), 60_000);
        assert_eq!(s.remaining_ms(70_000), Some(540_000));
        assert_eq!(s.remaining_ms(10_000_000), Some(0));
        assert!(s.is_due(610_000));
        assert!(!s.is_due(609_999));
    }

    #[test]
    fn paused_remaining_uses_banked_time() {
        let s = TimerState {
            mode: Mode::Countdown,
            phase: Phase::Focus,
            running: false,
            focus_duration_sec: 600,
            accumulated_ms: 120_000,
            ..TimerState::default()
        };
        assert_eq!(s.remaining_ms(999_999_999), Some(480_000));
        assert_eq!(s.display_text(0), "08:00 (paused)");
    }

    #[test]
    fn countup_has_no_remaining_time() {
        let s = TimerState {
            mode: Mode::Countup,
            phase: Phase::Focus,
            running: true,
            phase_started_at_epoch_ms: Some(0),
            accumulated_ms: 5_000,
            ..TimerState::default()
        };
        assert_eq!(s.remaining_ms(60_000), None);
        assert_eq!(s.elapsed_ms(60_000), 65_000);
        assert_eq!(s.display_text(60_000), "01:05");
        assert!(!s.is_due(i64::MAX));
    }

    #[test]
    fn format_clock_handles_hours_and_rounding() {
        assert_eq!(format_clock(1, true), "00:01");
        assert_eq!(format_clock(1, false), "00:00");
        assert_eq!(format_clock(3_725_000, false), "1:02:05");
    }

    #[test]
    fn inconsistent_records_are_detected() {
        let running_without_start = TimerState {
            phase: Phase::Focus,
            running: true,
            ..TimerState::default()
        };
        assert!(!running_without_start.is_consistent());

        let idle_but_running = TimerState {
            running: true,
            ..TimerState::default()
        };
        assert!(!idle_but_running.is_consistent());

        let overshot_cycles = TimerState {
            phase: Phase::Break,
            cycles_target: 2,
            cycles_completed: 3,
            ..TimerState::default()
        };
        assert!(!overshot_cycles.is_consistent());
    }

    #[test]
    fn deadline_beyond_phase_length_is_inconsistent() {
        const T0: i64 = 1_700_000_000_000;
        let running = TimerState {
            mode: Mode::Countdown,
            phase: Phase::Focus,
            running: true,
            focus_duration_sec: 600,
            phase_started_at_epoch_ms: Some(T0),
            phase_ends_at_epoch_ms: Some(T0 + 600_000),
            ..TimerState::default()
        };
        assert!(running.is_consistent());

        let far_future = TimerState {
            phase_ends_at_epoch_ms: Some(T0 + 365 * 24 * 3_600_000),
            ..running.clone()
        };
        assert!(!far_future.is_consistent());

        let ends_before_start = TimerState {
            phase_ends_at_epoch_ms: Some(T0 - 1),
            ..running.clone()
        };
        assert!(!ends_before_start.is_consistent());

        let resumed = TimerState {
            accumulated_ms: 120_000,
            phase_ends_at_epoch_ms: Some(T0 + 480_000),
            ..running.clone()
        };
        assert!(resumed.is_consistent());
        let resumed_too_long = TimerState {
            phase_ends_at_epoch_ms: Some(T0 + 600_000),
            ..resumed
        };
        assert!(!resumed_too_long.is_consistent());
    }

    #[test]
    fn lenient_decode_keeps_well_typed_fields() {
        let json = r#"{"mode":"countdown","focusDurationSec":"oops","cyclesTarget":1,"futureField":true}"#;
        let s = TimerState::from_json_lenient(json);
        assert_eq!(s.mode, Mode::Countdown);
        assert_eq!(s.focus_duration_sec, 0);
        assert_eq!(s.phase, Phase::Idle);
    }

    #[test]
    fn lenient_decode_of_garbage_is_default() {
        assert_eq!(TimerState::from_json_lenient("{not json"), TimerState::default());
        assert_eq!(TimerState::from_json_lenient("[1,2]"), TimerState::default());
    }

    #[test]
    fn serialized_keys_are_camel_case() {
        let json = serde_json::to_value(running_countdown(0, 60)).unwrap();
        assert_eq!(json["phaseEndsAtEpochMs"], 60_000);
        assert_eq!(json["mode"], "countdown");
        assert_eq!(json["phase"], "focus");
    }

    #[test]
    fn mode_parses_aliases() {
        assert_eq!("Stopwatch".parse::<Mode>().unwrap(), Mode::Countup);
        assert!("hourglass".parse::<Mode>().is_err());
    }
}
