//! SQLite-based storage.
//!
//! Provides persistent storage for:
//! - The per-account timer record (in the key-value table)
//! - Completed focus sessions
//!
//! A transition is written in a single transaction so a crash leaves
//! either the previous record or the new one, never a mix.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use super::adapter::{decode_state, PersistenceAdapter};
use super::data_dir;
use crate::entries::FocusEntry;
use crate::error::{CoreError, DatabaseError};
use crate::timer::TimerState;

const STATE_KEY_PREFIX: &str = "timer_state:";

/// SQLite database shared by all accounts on this device.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data_dir>/lifetrack.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("lifetrack.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open (or create) a database file at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests and throwaway sessions).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS kv (
                    key   TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS focus_entries (
                    id                  TEXT PRIMARY KEY,
                    account             TEXT NOT NULL,
                    date                TEXT NOT NULL,
                    duration_minutes    INTEGER NOT NULL,
                    created_at_epoch_ms INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_focus_entries_account_date
                    ON focus_entries(account, date);",
            )
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }

    /// Storage scoped to one account.
    pub fn account(&self, account: &str) -> AccountStore<'_> {
        AccountStore {
            db: self,
            account: account.to_string(),
        }
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

/// One account's view of the [`Database`].
pub struct AccountStore<'a> {
    db: &'a Database,
    account: String,
}

impl AccountStore<'_> {
    pub fn account(&self) -> &str {
        &self.account
    }

    fn state_key(&self) -> String {
        format!("{STATE_KEY_PREFIX}{}", self.account)
    }

    fn insert_entry(conn: &Connection, account: &str, entry: &FocusEntry) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO focus_entries
                (id, account, date, duration_minutes, created_at_epoch_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.id,
                account,
                entry.date,
                entry.duration_minutes,
                entry.created_at_epoch_ms,
            ],
        )?;
        Ok(())
    }

    fn encode(state: &TimerState) -> Result<String, DatabaseError> {
        serde_json::to_string(state).map_err(|e| DatabaseError::QueryFailed(e.to_string()))
    }
}

impl PersistenceAdapter for AccountStore<'_> {
    fn load(&self) -> TimerState {
        match self.db.kv_get(&self.state_key()) {
            Ok(Some(json)) => decode_state(&json),
            Ok(None) => TimerState::default(),
            Err(e) => {
                tracing::warn!(account = %self.account, error = %e, "failed to read timer state");
                TimerState::default()
            }
        }
    }

    fn save(&self, state: &TimerState) -> Result<(), DatabaseError> {
        self.db.kv_set(&self.state_key(), &Self::encode(state)?)?;
        Ok(())
    }

    fn append_entry(&self, entry: &FocusEntry) -> Result<(), DatabaseError> {
        Self::insert_entry(self.db.conn(), &self.account, entry)?;
        Ok(())
    }

    fn load_entries(&self) -> Result<Vec<FocusEntry>, DatabaseError> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, date, duration_minutes, created_at_epoch_ms
             FROM focus_entries
             WHERE account = ?1
             ORDER BY created_at_epoch_ms, id",
        )?;
        let rows = stmt.query_map(params![self.account], |row| {
            Ok(FocusEntry {
                id: row.get(0)?,
                date: row.get(1)?,
                duration_minutes: row.get(2)?,
                created_at_epoch_ms: row.get(3)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    fn delete_entry(&self, id: &str) -> Result<bool, DatabaseError> {
        let n = self.db.conn().execute(
            "DELETE FROM focus_entries WHERE id = ?1 AND account = ?2",
            params![id, self.account],
        )?;
        Ok(n > 0)
    }

    fn commit(&self, state: &TimerState, entries: &[FocusEntry]) -> Result<(), DatabaseError> {
        let json = Self::encode(state)?;
        let tx = self.db.conn().unchecked_transaction()?;
        for entry in entries {
            Self::insert_entry(&tx, &self.account, entry)?;
        }
        tx.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![self.state_key(), json],
        )?;
        tx.commit()?;
        Ok(())
    }
}
