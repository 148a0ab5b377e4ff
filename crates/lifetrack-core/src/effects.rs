use serde::{Deserialize, Serialize};

use crate::timer::{CycleInfo, Mode, Phase};

/// Every transition of the timer produces a batch of effects.
/// The runtime driver executes them in order after the new state is durable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    /// Replace the single scheduled OS alert.
    ScheduleCompletion {
        ends_at_epoch_ms: i64,
        phase: Phase,
    },
    /// Drop the scheduled OS alert, if any.
    CancelScheduled,
    /// Upsert the persistent "ongoing" indicator.
    ShowOngoing(OngoingNotification),
    DismissOngoing,
    /// A focus phase finished; persist a session record.
    RecordEntry {
        duration_minutes: u32,
        completed_at_epoch_ms: i64,
    },
}

/// Contents of the ongoing indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OngoingNotification {
    pub phase: Phase,
    pub mode: Mode,
    pub running: bool,
    pub display_text: String,
    pub cycle: CycleInfo,
}
