//! In-memory persistence with switchable write failures.

use std::cell::{Cell, RefCell};

use super::adapter::{decode_state, PersistenceAdapter};
use crate::entries::FocusEntry;
use crate::error::DatabaseError;
use crate::timer::TimerState;

/// Keeps the record as serialized JSON, exactly as a key-value store
/// would, so decoding behaves the same as with the real backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state_json: RefCell<Option<String>>,
    entries: RefCell<Vec<FocusEntry>>,
    fail_writes: Cell<bool>,
    writes: Cell<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the raw stored record (possibly malformed).
    pub fn with_raw_state(json: impl Into<String>) -> Self {
        let store = Self::default();
        *store.state_json.borrow_mut() = Some(json.into());
        store
    }

    /// Make every write fail until switched back.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    /// Number of successful commits/saves.
    pub fn write_count(&self) -> u64 {
        self.writes.get()
    }

    pub fn raw_state(&self) -> Option<String> {
        self.state_json.borrow().clone()
    }

    fn check(&self) -> Result<(), DatabaseError> {
        if self.fail_writes.get() {
            Err(DatabaseError::Unavailable("writes disabled".into()))
        } else {
            Ok(())
        }
    }
}

impl PersistenceAdapter for MemoryStore {
    fn load(&self) -> TimerState {
        match self.state_json.borrow().as_deref() {
            Some(json) => decode_state(json),
            None => TimerState::default(),
        }
    }

    fn save(&self, state: &TimerState) -> Result<(), DatabaseError> {
        self.check()?;
        let json = serde_json::to_string(state)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        *self.state_json.borrow_mut() = Some(json);
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }

    fn append_entry(&self, entry: &FocusEntry) -> Result<(), DatabaseError> {
        self.check()?;
        let mut entries = self.entries.borrow_mut();
        if !entries.iter().any(|e| e.id == entry.id) {
            entries.push(entry.clone());
        }
        Ok(())
    }

    fn load_entries(&self) -> Result<Vec<FocusEntry>, DatabaseError> {
        Ok(self.entries.borrow().clone())
    }

    fn delete_entry(&self, id: &str) -> Result<bool, DatabaseError> {
        self.check()?;
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        Ok(entries.len() != before)
    }

    fn commit(&self, state: &TimerState, entries: &[FocusEntry]) -> Result<(), DatabaseError> {
        // All or nothing, like the SQLite transaction.
        self.check()?;
        for entry in entries {
            self.append_entry(entry)?;
        }
        self.save(state)
    }
}
