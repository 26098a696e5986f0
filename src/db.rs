//! Meme storage backed by SQLite.
//!
//! All access goes through [`MemeStore`], a cloneable handle around a single
//! shared connection. Mutations (`delete_by_file_id`, `rename`) check
//! ownership before touching the row.

use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A named, owned voice clip record.
#[derive(Debug, Clone, PartialEq)]
pub struct Meme {
    pub id: i64,
    pub name: String,
    pub file_id: String,
    pub owner_id: i64,
    pub times_used: i64,
}

/// A meme about to be inserted. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewMeme {
    pub name: String,
    pub file_id: String,
    pub owner_id: i64,
}

/// Errors produced by the meme store.
#[derive(Debug)]
pub enum StoreError {
    /// No record matches the given file id (or meme id).
    NotFound,
    /// The requester is not the owner of the record.
    Unauthorized,
    /// Underlying SQLite failure.
    Database(rusqlite::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "meme not found"),
            StoreError::Unauthorized => write!(f, "requester is not the owner of the meme"),
            StoreError::Database(e) => write!(f, "database error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err)
    }
}

/// Initialize the database schema.
pub fn init_database_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    info!("Initializing database schema...");

    // One row per uploaded voice clip. file_id is the natural lookup key
    // for incoming voice messages, so it must stay unambiguous.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS memes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            file_id TEXT NOT NULL UNIQUE,
            owner_id INTEGER NOT NULL,
            times_used INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    info!("Database schema initialized successfully");
    Ok(())
}

fn meme_from_row(row: &rusqlite::Row<'_>) -> Result<Meme, rusqlite::Error> {
    Ok(Meme {
        id: row.get(0)?,
        name: row.get(1)?,
        file_id: row.get(2)?,
        owner_id: row.get(3)?,
        times_used: row.get(4)?,
    })
}

const MEME_COLUMNS: &str = "id, name, file_id, owner_id, times_used";

/// Handle to the meme database, shared across handlers.
#[derive(Clone)]
pub struct MemeStore {
    conn: Arc<Mutex<Connection>>,
}

impl MemeStore {
    /// Open (or create) the database at `path` and initialize the schema.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        init_database_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Wrap an already opened connection, initializing the schema.
    pub fn new(conn: Connection) -> Result<Self, StoreError> {
        init_database_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert a new meme and return the stored record with its assigned id.
    pub async fn add(&self, meme: NewMeme) -> Result<Meme, StoreError> {
        let conn = self.conn.lock().await;

        conn.execute(
            "INSERT INTO memes (name, file_id, owner_id, times_used) VALUES (?1, ?2, ?3, 0)",
            params![meme.name, meme.file_id, meme.owner_id],
        )?;

        let id = conn.last_insert_rowid();
        info!("Meme '{}' added with ID: {}", meme.name, id);

        Ok(Meme {
            id,
            name: meme.name,
            file_id: meme.file_id,
            owner_id: meme.owner_id,
            times_used: 0,
        })
    }

    /// Exact lookup by Telegram voice file id.
    pub async fn get_by_file_id(&self, file_id: &str) -> Result<Meme, StoreError> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare(&format!(
            "SELECT {MEME_COLUMNS} FROM memes WHERE file_id = ?1"
        ))?;

        stmt.query_row(params![file_id], meme_from_row)
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    /// Whether a voice file id is a known meme.
    pub async fn exists(&self, file_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;

        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM memes WHERE file_id = ?1",
                params![file_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(found.is_some())
    }

    /// Case-insensitive substring search on meme names, in insertion order.
    pub async fn find(&self, query: &str) -> Result<Vec<Meme>, StoreError> {
        let conn = self.conn.lock().await;

        // Escape LIKE wildcards so the user query is matched literally.
        let pattern = format!(
            "%{}%",
            query
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_")
        );

        let mut stmt = conn.prepare(&format!(
            "SELECT {MEME_COLUMNS} FROM memes WHERE name LIKE ?1 ESCAPE '\\' ORDER BY id"
        ))?;

        let memes = stmt
            .query_map(params![pattern], meme_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(memes)
    }

    /// All memes, in insertion order.
    pub async fn get_all(&self) -> Result<Vec<Meme>, StoreError> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare(&format!("SELECT {MEME_COLUMNS} FROM memes ORDER BY id"))?;

        let memes = stmt
            .query_map([], meme_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(memes)
    }

    /// Delete a meme by file id. Only the owner may delete.
    pub async fn delete_by_file_id(
        &self,
        file_id: &str,
        requester_id: i64,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;

        let owner_id: i64 = conn
            .query_row(
                "SELECT owner_id FROM memes WHERE file_id = ?1",
                params![file_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StoreError::NotFound)?;

        if owner_id != requester_id {
            return Err(StoreError::Unauthorized);
        }

        conn.execute("DELETE FROM memes WHERE file_id = ?1", params![file_id])?;
        info!("Meme with file_id {file_id} deleted by user {requester_id}");

        Ok(())
    }

    /// Rename a meme. Only the owner may rename; id and file_id are untouched.
    pub async fn rename(
        &self,
        id: i64,
        new_name: &str,
        requester_id: i64,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;

        let owner_id: i64 = conn
            .query_row(
                "SELECT owner_id FROM memes WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StoreError::NotFound)?;

        if owner_id != requester_id {
            return Err(StoreError::Unauthorized);
        }

        conn.execute(
            "UPDATE memes SET name = ?1 WHERE id = ?2",
            params![new_name, id],
        )?;
        info!("Meme {id} renamed to '{new_name}' by user {requester_id}");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> MemeStore {
        let conn = Connection::open_in_memory().expect("in-memory database");
        MemeStore::new(conn).expect("schema init")
    }

    fn sample(name: &str, file_id: &str, owner_id: i64) -> NewMeme {
        NewMeme {
            name: name.to_string(),
            file_id: file_id.to_string(),
            owner_id,
        }
    }

    #[tokio::test]
    async fn test_add_assigns_id_and_returns_record() {
        let store = test_store();

        let meme = store.add(sample("airhorn", "FILE1", 1)).await.unwrap();

        assert!(meme.id > 0);
        assert_eq!(meme.name, "airhorn");
        assert_eq!(meme.file_id, "FILE1");
        assert_eq!(meme.owner_id, 1);
        assert_eq!(meme.times_used, 0);
    }

    #[tokio::test]
    async fn test_add_assigns_distinct_ids() {
        let store = test_store();

        let first = store.add(sample("one", "FILE1", 1)).await.unwrap();
        let second = store.add(sample("two", "FILE2", 1)).await.unwrap();

        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_add_duplicate_file_id_rejected() {
        let store = test_store();

        store.add(sample("first", "FILE1", 1)).await.unwrap();
        let result = store.add(sample("second", "FILE1", 2)).await;

        assert!(matches!(result, Err(StoreError::Database(_))));
    }

    #[tokio::test]
    async fn test_get_by_file_id_roundtrip() {
        let store = test_store();

        let added = store.add(sample("airhorn", "FILE1", 42)).await.unwrap();
        let fetched = store.get_by_file_id("FILE1").await.unwrap();

        assert_eq!(fetched, added);
    }

    #[tokio::test]
    async fn test_get_by_file_id_missing() {
        let store = test_store();

        let result = store.get_by_file_id("NOPE").await;

        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_exists() {
        let store = test_store();

        store.add(sample("airhorn", "FILE1", 1)).await.unwrap();

        assert!(store.exists("FILE1").await.unwrap());
        assert!(!store.exists("FILE2").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_substring_match() {
        let store = test_store();

        store.add(sample("party horn", "FILE1", 1)).await.unwrap();
        store.add(sample("sad trombone", "FILE2", 1)).await.unwrap();
        store.add(sample("air horn", "FILE3", 1)).await.unwrap();

        let results = store.find("horn").await.unwrap();
        let names: Vec<_> = results.iter().map(|m| m.name.as_str()).collect();

        assert_eq!(results.len(), 2);
        assert!(names.contains(&"party horn"));
        assert!(names.contains(&"air horn"));
    }

    #[tokio::test]
    async fn test_find_is_case_insensitive() {
        let store = test_store();

        store.add(sample("Party Horn", "FILE1", 1)).await.unwrap();

        let results = store.find("party").await.unwrap();

        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_find_escapes_like_wildcards() {
        let store = test_store();

        store.add(sample("100% legit", "FILE1", 1)).await.unwrap();
        store.add(sample("100 decibels", "FILE2", 1)).await.unwrap();

        let results = store.find("100%").await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "100% legit");
    }

    #[tokio::test]
    async fn test_find_no_match_returns_empty() {
        let store = test_store();

        store.add(sample("airhorn", "FILE1", 1)).await.unwrap();

        let results = store.find("trombone").await.unwrap();

        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_get_all() {
        let store = test_store();

        store.add(sample("one", "FILE1", 1)).await.unwrap();
        store.add(sample("two", "FILE2", 2)).await.unwrap();

        let all = store.get_all().await.unwrap();

        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_get_all_empty_store() {
        let store = test_store();

        let all = store.get_all().await.unwrap();

        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_owner() {
        let store = test_store();

        store.add(sample("airhorn", "FILE1", 1)).await.unwrap();
        store.delete_by_file_id("FILE1", 1).await.unwrap();

        let result = store.get_by_file_id("FILE1").await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_delete_by_non_owner_rejected() {
        let store = test_store();

        store.add(sample("airhorn", "FILE1", 1)).await.unwrap();
        let result = store.delete_by_file_id("FILE1", 2).await;

        assert!(matches!(result, Err(StoreError::Unauthorized)));

        // Record must be left intact.
        let meme = store.get_by_file_id("FILE1").await.unwrap();
        assert_eq!(meme.name, "airhorn");
        assert_eq!(meme.owner_id, 1);
    }

    #[tokio::test]
    async fn test_delete_missing() {
        let store = test_store();

        let result = store.delete_by_file_id("NOPE", 1).await;

        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_rename_by_owner() {
        let store = test_store();

        let meme = store.add(sample("old name", "FILE1", 1)).await.unwrap();
        store.rename(meme.id, "new name", 1).await.unwrap();

        let renamed = store.get_by_file_id("FILE1").await.unwrap();
        assert_eq!(renamed.name, "new name");
        assert_eq!(renamed.id, meme.id);
        assert_eq!(renamed.file_id, meme.file_id);
        assert_eq!(renamed.owner_id, meme.owner_id);
    }

    #[tokio::test]
    async fn test_rename_by_non_owner_rejected() {
        let store = test_store();

        let meme = store.add(sample("old name", "FILE1", 1)).await.unwrap();
        let result = store.rename(meme.id, "new name", 2).await;

        assert!(matches!(result, Err(StoreError::Unauthorized)));

        let unchanged = store.get_by_file_id("FILE1").await.unwrap();
        assert_eq!(unchanged, meme);
    }

    #[tokio::test]
    async fn test_rename_missing() {
        let store = test_store();

        let result = store.rename(999, "new name", 1).await;

        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[test]
    fn test_store_error_display() {
        assert_eq!(format!("{}", StoreError::NotFound), "meme not found");
        assert_eq!(
            format!("{}", StoreError::Unauthorized),
            "requester is not the owner of the meme"
        );
    }
}
