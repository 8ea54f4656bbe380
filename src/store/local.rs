//! SQLite-backed local cache: one slot holding the full serialized
//! AppState, keyed by a fixed namespace string.
//!
//! All operations are synchronous (rusqlite is blocking). The slot is
//! small (one JSON blob), so writes are cheap enough to sit on the
//! mutation path as write-through.

use std::path::Path;

use rusqlite::{params, Connection};
use tracing::{info, warn};

use crate::error::TrialMateError;
use crate::model::{AppState, STORAGE_KEY};

/// Single-slot durable cache for the engine state.
pub struct LocalCache {
    conn: Connection,
}

impl LocalCache {
    /// Open or create the cache database at the given path.
    /// The `state_cache` table is created if it doesn't exist.
    pub fn new(db_path: &Path) -> Result<Self, TrialMateError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TrialMateError::Cache(format!("Failed to create data dir: {}", e)))?;
        }

        let conn = Connection::open(db_path).map_err(|e| {
            TrialMateError::Cache(format!("Failed to open cache database at {:?}: {}", db_path, e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS state_cache (
                slot TEXT PRIMARY KEY,
                state_json TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )
        .map_err(|e| TrialMateError::Cache(format!("Failed to create cache table: {}", e)))?;

        info!("Opened state cache at {:?}", db_path);
        Ok(Self { conn })
    }

    /// In-memory cache for tests and throwaway sessions.
    pub fn in_memory() -> Result<Self, TrialMateError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| TrialMateError::Cache(format!("Failed to open in-memory cache: {}", e)))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS state_cache (
                slot TEXT PRIMARY KEY,
                state_json TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )
        .map_err(|e| TrialMateError::Cache(format!("Failed to create cache table: {}", e)))?;
        Ok(Self { conn })
    }

    /// Load the cached state, if any.
    ///
    /// A missing slot returns None. So does a slot whose JSON no longer
    /// parses; a corrupt cache is logged and treated as absent, never
    /// surfaced as a fatal startup error.
    pub fn load(&self) -> Result<Option<AppState>, TrialMateError> {
        let result = self.conn.query_row(
            "SELECT state_json FROM state_cache WHERE slot = ?1",
            params![STORAGE_KEY],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(json) => match serde_json::from_str::<AppState>(&json) {
                Ok(state) => Ok(Some(state)),
                Err(e) => {
                    warn!("Cached state is malformed, falling back to defaults: {}", e);
                    Ok(None)
                }
            },
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(TrialMateError::Cache(format!("Cache read failed: {}", e))),
        }
    }

    /// Write the full state into the slot, replacing whatever was there.
    pub fn save(&self, state: &AppState) -> Result<(), TrialMateError> {
        let json = serde_json::to_string(state)
            .map_err(|e| TrialMateError::Cache(format!("Failed to serialize state: {}", e)))?;

        self.conn
            .execute(
                "INSERT OR REPLACE INTO state_cache (slot, state_json, updated_at)
                 VALUES (?1, ?2, datetime('now'))",
                params![STORAGE_KEY, json],
            )
            .map_err(|e| TrialMateError::Cache(format!("Cache write failed: {}", e)))?;
        Ok(())
    }

    /// Remove the slot entirely (reset).
    pub fn clear(&self) -> Result<(), TrialMateError> {
        self.conn
            .execute(
                "DELETE FROM state_cache WHERE slot = ?1",
                params![STORAGE_KEY],
            )
            .map_err(|e| TrialMateError::Cache(format!("Cache clear failed: {}", e)))?;
        info!("Cleared local state cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DailyLog;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::new(&dir.path().join("state.db")).unwrap();

        assert!(cache.load().unwrap().is_none());

        let mut state = AppState::default();
        state.plan.participant_name = "Ada".to_string();
        state
            .daily
            .insert("2024-03-01".to_string(), DailyLog::new("2024-03-01"));
        cache.save(&state).unwrap();

        let loaded = cache.load().unwrap().expect("cached state");
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_save_overwrites_slot() {
        let cache = LocalCache::in_memory().unwrap();

        let mut first = AppState::default();
        first.plan.participant_name = "First".to_string();
        cache.save(&first).unwrap();

        let mut second = AppState::default();
        second.plan.participant_name = "Second".to_string();
        cache.save(&second).unwrap();

        let loaded = cache.load().unwrap().unwrap();
        assert_eq!(loaded.plan.participant_name, "Second");
    }

    #[test]
    fn test_malformed_json_treated_as_absent() {
        let cache = LocalCache::in_memory().unwrap();
        cache
            .conn
            .execute(
                "INSERT INTO state_cache (slot, state_json) VALUES (?1, ?2)",
                params![STORAGE_KEY, "{not valid json"],
            )
            .unwrap();

        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn test_clear_removes_slot() {
        let cache = LocalCache::in_memory().unwrap();
        cache.save(&AppState::default()).unwrap();
        cache.clear().unwrap();
        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn test_reopen_persists_across_connections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.db");

        {
            let cache = LocalCache::new(&path).unwrap();
            let mut state = AppState::default();
            state.plan.start_date = "2024-01-01".to_string();
            cache.save(&state).unwrap();
        }

        let cache = LocalCache::new(&path).unwrap();
        let loaded = cache.load().unwrap().unwrap();
        assert_eq!(loaded.plan.start_date, "2024-01-01");
    }
}
