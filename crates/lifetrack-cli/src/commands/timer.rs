use std::time::Duration;

use clap::Subcommand;
use lifetrack_core::{
    Config, CoreError, Database, FocusEntry, Mode, TimerEvent, TimerView, ValidationError,
};
use serde::Serialize;

use super::{open_engine, print_json, CliEngine};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start a new session (replaces any running one)
    Start {
        /// pomodoro, countdown or countup
        #[arg(long)]
        mode: Option<Mode>,
        /// Focus length in minutes
        #[arg(long)]
        focus: Option<u32>,
        /// Break length in minutes (pomodoro only)
        #[arg(long = "break")]
        break_minutes: Option<u32>,
        /// Number of focus blocks (pomodoro only)
        #[arg(long)]
        cycles: Option<u32>,
    },
    /// Pause the running phase
    Pause,
    /// Resume a paused phase
    Resume,
    /// Skip to the next phase
    Skip,
    /// Stop and return to idle
    Stop,
    /// Advance the timer if its phase has ended
    Tick,
    /// Print current timer state as JSON
    Status,
    /// Tick in the foreground until the session ends or is paused
    Watch {
        /// Seconds between ticks
        #[arg(long, default_value = "1")]
        interval: u64,
    },
}

#[derive(Serialize)]
struct Report {
    #[serde(flatten)]
    view: TimerView,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    recorded: Vec<FocusEntry>,
}

impl Report {
    fn view_only(view: TimerView) -> Self {
        Self {
            view,
            recorded: Vec::new(),
        }
    }
}

pub fn run(action: TimerAction, account: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = Database::open()?;
    let mut engine = open_engine(&db, &config, account);

    match action {
        TimerAction::Start {
            mode,
            focus,
            break_minutes,
            cycles,
        } => {
            reject_zero("focus", focus)?;
            reject_zero("cycles", cycles)?;
            let params = config.start_params(mode, focus, break_minutes, cycles);
            dispatch(&mut engine, TimerEvent::Start(params))?;
        }
        TimerAction::Pause => dispatch(&mut engine, TimerEvent::Pause)?,
        TimerAction::Resume => dispatch(&mut engine, TimerEvent::Resume)?,
        TimerAction::Skip => dispatch(&mut engine, TimerEvent::Skip)?,
        TimerAction::Stop => dispatch(&mut engine, TimerEvent::Stop)?,
        TimerAction::Tick => dispatch(&mut engine, TimerEvent::Tick)?,
        TimerAction::Status => {
            print_json(&Report::view_only(engine.view()))?;
        }
        TimerAction::Watch { interval } => watch(&mut engine, interval.max(1))?,
    }
    Ok(())
}

fn reject_zero(field: &str, value: Option<u32>) -> Result<(), ValidationError> {
    if value == Some(0) {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: "must be at least 1".into(),
        });
    }
    Ok(())
}

/// Apply one event and print the resulting view. A failed save still
/// prints the in-memory view before reporting the error.
fn dispatch(engine: &mut CliEngine<'_>, event: TimerEvent) -> Result<(), Box<dyn std::error::Error>> {
    match engine.dispatch(event) {
        Ok(outcome) => print_json(&Report {
            view: outcome.view,
            recorded: outcome.recorded,
        }),
        Err(e @ CoreError::NotDurable { .. }) => {
            print_json(&Report::view_only(engine.view()))?;
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Each tick reloads the stored record, so pause, resume and stop issued
/// from other processes take effect here.
fn watch(engine: &mut CliEngine<'_>, interval: u64) -> Result<(), Box<dyn std::error::Error>> {
    let mut last_phase = engine.view().phase;
    loop {
        let view = match engine.dispatch(TimerEvent::Tick) {
            Ok(outcome) => {
                for entry in &outcome.recorded {
                    eprintln!("recorded {} min on {}", entry.duration_minutes, entry.date);
                }
                outcome.view
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!(error = %e, "watch: save failed, retrying next tick");
                engine.view()
            }
            Err(e) => return Err(e.into()),
        };

        if view.phase != last_phase {
            eprintln!("phase: {:?} -> {:?}", last_phase, view.phase);
            last_phase = view.phase;
        }
        // Nothing advances a paused phase; resume it from another command.
        if !view.phase.is_active() || view.paused {
            print_json(&Report::view_only(view))?;
            return Ok(());
        }
        eprint!("\r{}   ", view.display_text);
        std::thread::sleep(Duration::from_secs(interval));
    }
}
