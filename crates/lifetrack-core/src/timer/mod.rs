mod engine;
mod machine;
mod reconcile;
mod state;

pub use engine::{DispatchOutcome, TimerEngine, TimerView};
pub use machine::{apply, StartParams, TimerEvent, Transition};
pub use reconcile::{reconcile, ReconcileOutcome};
pub use state::{format_clock, CycleInfo, Mode, Phase, TimerState};
