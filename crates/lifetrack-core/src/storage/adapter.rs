//! Persistence contract for one account's timer.

use crate::entries::FocusEntry;
use crate::error::DatabaseError;
use crate::timer::TimerState;

/// Durable storage for a single account: the current timer record plus
/// the append-only log of completed focus sessions.
pub trait PersistenceAdapter {
    /// Load the timer record. Missing or corrupt data yields the idle
    /// default; this never fails.
    fn load(&self) -> TimerState;

    fn save(&self, state: &TimerState) -> Result<(), DatabaseError>;

    /// Append an entry. Appending an id that already exists is a no-op,
    /// so a retried write cannot duplicate a session.
    fn append_entry(&self, entry: &FocusEntry) -> Result<(), DatabaseError>;

    fn load_entries(&self) -> Result<Vec<FocusEntry>, DatabaseError>;

    /// Returns whether an entry with that id existed.
    fn delete_entry(&self, id: &str) -> Result<bool, DatabaseError>;

    /// Persist a transition: new entries first, then the state that
    /// produced them. Backends with transactions should make this atomic.
    fn commit(&self, state: &TimerState, entries: &[FocusEntry]) -> Result<(), DatabaseError> {
        for entry in entries {
            self.append_entry(entry)?;
        }
        self.save(state)
    }
}

impl<P: PersistenceAdapter + ?Sized> PersistenceAdapter for &P {
    fn load(&self) -> TimerState {
        (**self).load()
    }

    fn save(&self, state: &TimerState) -> Result<(), DatabaseError> {
        (**self).save(state)
    }

    fn append_entry(&self, entry: &FocusEntry) -> Result<(), DatabaseError> {
        (**self).append_entry(entry)
    }

    fn load_entries(&self) -> Result<Vec<FocusEntry>, DatabaseError> {
        (**self).load_entries()
    }

    fn delete_entry(&self, id: &str) -> Result<bool, DatabaseError> {
        (**self).delete_entry(id)
    }

    fn commit(&self, state: &TimerState, entries: &[FocusEntry]) -> Result<(), DatabaseError> {
        (**self).commit(state, entries)
    }
}

/// Decode a stored record and enforce the record invariants.
pub(crate) fn decode_state(json: &str) -> TimerState {
    if let Err(e) = serde_json::from_str::<TimerState>(json) {
        tracing::warn!(error = %e, "stored timer state is damaged, keeping readable fields");
    }
    let state = TimerState::from_json_lenient(json);
    if state.is_consistent() {
        state
    } else {
        tracing::warn!(?state, "stored timer state is inconsistent, resetting to idle");
        TimerState::default()
    }
}
