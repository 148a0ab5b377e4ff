//! # Lifetrack Core Library
//!
//! This library provides the focus timer behind the Lifetrack personal
//! tracking app. The rest of the app (finance, books, mood, training) is
//! plain CRUD; the timer is the part that has to stay correct while the
//! process is suspended or killed.
//!
//! ## Architecture
//!
//! - **State machine**: a pure `apply(state, event, now)` that returns the
//!   next state and a list of effects. No clocks, no I/O.
//! - **Reconciler**: runs once on cold load and completes the phase that
//!   ended while nothing was ticking.
//! - **Engine**: wires the state machine to storage, the notification
//!   facility and a clock, persisting before it notifies.
//! - **Storage**: SQLite key-value record per account plus the focus entry
//!   log, and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: Runtime driver for one account
//! - [`apply`] / [`reconcile`]: Pure transition logic
//! - [`PersistenceAdapter`]: Storage contract ([`Database`], [`MemoryStore`])
//! - [`NotificationScheduler`]: OS alert contract
//! - [`Config`]: Application configuration management

pub mod clock;
pub mod effects;
pub mod entries;
pub mod error;
pub mod notify;
pub mod storage;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use effects::{Effect, OngoingNotification};
pub use entries::{date_key, monthly_minutes, EntryRecorder, FocusEntry};
pub use error::{ConfigError, CoreError, DatabaseError, NotifyError, ValidationError};
pub use notify::{LogScheduler, NoopScheduler, NotificationScheduler, NotifyCall, RecordingScheduler};
pub use storage::{AccountStore, Config, Database, MemoryStore, PersistenceAdapter};
pub use timer::{
    apply, reconcile, CycleInfo, DispatchOutcome, Mode, Phase, ReconcileOutcome, StartParams,
    TimerEngine, TimerEvent, TimerState, TimerView, Transition,
};
