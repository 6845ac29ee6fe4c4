use std::collections::HashMap;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::get_app_data_prefix;
use crate::error::StorageError;

/// Per-book string storage. Keys are scoped by book so two books never see
/// each other's progress or profiles.
pub trait KeyValueStore {
    fn get(&self, book: &str, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, book: &str, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, book: &str, key: &str) -> Result<(), StorageError>;
}

/// Stable short key for a book identifier (path, URL or server id).
pub fn book_key(book: &str) -> String {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(book.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// SQLite-backed store in `states.db` under the app data prefix.
pub struct State {
    conn: Connection,
}

impl State {
    pub fn new() -> Result<Self, StorageError> {
        let prefix = get_app_data_prefix().map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Self::open(&prefix.join("states.db"))
    }

    pub fn open(filepath: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = filepath.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(filepath)?;
        Self::init_db(&conn)?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::init_db(&conn)?;
        Ok(Self { conn })
    }

    // Safe to run against an existing database.
    fn init_db(conn: &Connection) -> Result<(), StorageError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS book_state (
                book_key TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at DATETIME DEFAULT (datetime('now')),
                PRIMARY KEY (book_key, key)
            );
            ",
        )?;
        Ok(())
    }

    /// Every key stored for a book, most recently written first.
    pub fn keys(&self, book: &str) -> Result<Vec<String>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM book_state WHERE book_key=? ORDER BY updated_at DESC, key")?;
        let rows = stmt.query_map(params![book_key(book)], |row| row.get(0))?;
        let mut keys = Vec::new();
        for key in rows {
            keys.push(key?);
        }
        Ok(keys)
    }
}

impl KeyValueStore for State {
    fn get(&self, book: &str, key: &str) -> Result<Option<String>, StorageError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM book_state WHERE book_key=? AND key=?",
                params![book_key(book), key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, book: &str, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO book_state (book_key, key, value, updated_at) VALUES (?, ?, ?, datetime('now'))",
            params![book_key(book), key, value],
        )?;
        Ok(())
    }

    fn remove(&mut self, book: &str, key: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "DELETE FROM book_state WHERE book_key=? AND key=?",
            params![book_key(book), key],
        )?;
        Ok(())
    }
}

/// Session-only storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<(String, String), String>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, book: &str, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(&(book_key(book), key.to_string())).cloned())
    }

    fn set(&mut self, book: &str, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .insert((book_key(book), key.to_string()), value.to_string());
        Ok(())
    }

    fn remove(&mut self, book: &str, key: &str) -> Result<(), StorageError> {
        self.entries.remove(&(book_key(book), key.to_string()));
        Ok(())
    }
}

/// Durable storage that never fails the caller.
///
/// The first storage error switches the session to memory for good (logged
/// once at warn); values written before that stay readable from memory since
/// every write is mirrored there. Malformed stored JSON reads as absent.
pub struct DurableState {
    durable: Option<Box<dyn KeyValueStore>>,
    memory: MemoryStore,
}

impl DurableState {
    pub fn new(durable: Box<dyn KeyValueStore>) -> Self {
        Self {
            durable: Some(durable),
            memory: MemoryStore::default(),
        }
    }

    /// Opens `states.db` under the app data prefix, falling back to memory.
    pub fn open_default() -> Self {
        match State::new() {
            Ok(state) => Self::new(Box::new(state)),
            Err(err) => {
                tracing::warn!(error = %err, "durable state unavailable, keeping progress for this session only");
                Self::memory_only()
            }
        }
    }

    pub fn memory_only() -> Self {
        Self {
            durable: None,
            memory: MemoryStore::default(),
        }
    }

    pub fn is_durable(&self) -> bool {
        self.durable.is_some()
    }

    fn degrade(&mut self, err: StorageError) {
        if self.durable.take().is_some() {
            tracing::warn!(error = %err, "storage failed, keeping state in memory for the rest of the session");
        }
    }

    pub fn get(&mut self, book: &str, key: &str) -> Option<String> {
        if let Ok(Some(value)) = self.memory.get(book, key) {
            return Some(value);
        }
        let result = self.durable.as_ref().map(|store| store.get(book, key));
        match result {
            Some(Ok(value)) => value,
            Some(Err(err)) => {
                self.degrade(err);
                None
            }
            None => None,
        }
    }

    pub fn set(&mut self, book: &str, key: &str, value: &str) {
        let _ = self.memory.set(book, key, value);
        let result = self.durable.as_mut().map(|store| store.set(book, key, value));
        if let Some(Err(err)) = result {
            self.degrade(err);
        }
    }

    pub fn remove(&mut self, book: &str, key: &str) {
        let _ = self.memory.remove(book, key);
        let result = self.durable.as_mut().map(|store| store.remove(book, key));
        if let Some(Err(err)) = result {
            self.degrade(err);
        }
    }

    pub fn load_json<T: DeserializeOwned>(&mut self, book: &str, key: &str) -> Option<T> {
        let raw = self.get(book, key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::debug!(key, error = %err, "ignoring malformed stored value");
                None
            }
        }
    }

    pub fn save_json<T: Serialize>(&mut self, book: &str, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(book, key, &raw),
            Err(err) => tracing::warn!(key, error = %err, "failed to serialise state"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _book: &str, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("quota exceeded".to_string()))
        }
        fn set(&mut self, _book: &str, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("quota exceeded".to_string()))
        }
        fn remove(&mut self, _book: &str, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("quota exceeded".to_string()))
        }
    }

    #[test]
    fn test_state_database_initialization() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("states.db");
        assert!(!db_path.exists());
        let state = State::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert!(state.keys("book").unwrap().is_empty());

        // Reopening an existing database keeps its schema and data.
        let mut state = state;
        state.set("book", "progress", "{}").unwrap();
        drop(state);
        let reopened = State::open(&db_path).unwrap();
        assert_eq!(reopened.get("book", "progress").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_set_replaces_and_remove_deletes() {
        let mut state = State::in_memory().unwrap();
        state.set("book", "progress", "a").unwrap();
        state.set("book", "progress", "b").unwrap();
        assert_eq!(state.get("book", "progress").unwrap().as_deref(), Some("b"));
        assert_eq!(state.keys("book").unwrap(), vec!["progress".to_string()]);

        state.remove("book", "progress").unwrap();
        assert_eq!(state.get("book", "progress").unwrap(), None);
    }

    #[test]
    fn test_multiple_books_isolation() {
        let mut state = State::in_memory().unwrap();
        state.set("/books/one.epub", "progress", "1").unwrap();
        state.set("/books/two.epub", "progress", "2").unwrap();
        assert_eq!(state.get("/books/one.epub", "progress").unwrap().as_deref(), Some("1"));
        assert_eq!(state.get("/books/two.epub", "progress").unwrap().as_deref(), Some("2"));
        assert_eq!(state.get("/books/three.epub", "progress").unwrap(), None);
    }

    #[test]
    fn test_book_key_is_stable() {
        assert_eq!(book_key("a"), book_key("a"));
        assert_ne!(book_key("a"), book_key("b"));
        assert_eq!(book_key("a").len(), 16);
    }

    #[test]
    fn test_durable_state_degrades_to_memory() {
        let mut durable = DurableState::new(Box::new(BrokenStore));
        assert!(durable.is_durable());
        durable.set("book", "progress", "42");
        assert!(!durable.is_durable());
        assert_eq!(durable.get("book", "progress").as_deref(), Some("42"));
    }

    #[test]
    fn test_malformed_json_reads_as_absent() {
        let mut durable = DurableState::new(Box::new(State::in_memory().unwrap()));
        durable.set("book", "progress", "{not json");
        let loaded: Option<serde_json::Value> = durable.load_json("book", "progress");
        assert!(loaded.is_none());
        assert!(durable.is_durable());
    }

    #[test]
    fn test_json_round_trip_through_sqlite() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("states.db");
        {
            let mut durable = DurableState::new(Box::new(State::open(&path).unwrap()));
            durable.save_json("book", "numbers", &vec![1, 2, 3]);
        }
        let mut durable = DurableState::new(Box::new(State::open(&path).unwrap()));
        assert_eq!(durable.load_json::<Vec<i32>>("book", "numbers"), Some(vec![1, 2, 3]));
    }
}
