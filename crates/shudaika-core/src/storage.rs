use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::CoreError;
use crate::library::MediaLibrary;
use crate::models::{LibraryItem, MediaKind, ProviderIds};

const SCHEMA_V1: &str = include_str!("../../../migrations/001_initial.sql");

const ITEM_COLUMNS: &str = "id, name, year, path, kind, enabled, anilist_id, mal_id,
     animethemes_slug, updated_at";

/// SQLite-backed store of library folders.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    // ── Library item CRUD ───────────────────────────────────────

    /// Insert a new item, returning its auto-generated ID. `item.id` is ignored.
    pub fn insert_item(&self, item: &LibraryItem) -> Result<i64, CoreError> {
        self.conn.execute(
            "INSERT INTO library_item (name, year, path, kind, enabled, anilist_id, mal_id,
             animethemes_slug, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                item.name,
                item.year,
                item.path.to_string_lossy(),
                item.kind.as_db_str(),
                item.enabled as i32,
                item.ids.anilist.map(|v| v as i64),
                item.ids.mal.map(|v| v as i64),
                item.ids.animethemes_slug,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_item(&self, id: i64) -> Result<Option<LibraryItem>, CoreError> {
        self.conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM library_item WHERE id = ?1"),
                params![id],
                |row| Ok(row_to_item(row)),
            )
            .optional()
            .map_err(Into::into)
    }

    /// All items, enabled or not, ordered by name.
    pub fn all_items(&self) -> Result<Vec<LibraryItem>, CoreError> {
        self.query_items(&format!(
            "SELECT {ITEM_COLUMNS} FROM library_item ORDER BY name COLLATE NOCASE, id"
        ))
    }

    pub fn enabled_items(&self) -> Result<Vec<LibraryItem>, CoreError> {
        self.query_items(&format!(
            "SELECT {ITEM_COLUMNS} FROM library_item WHERE enabled = 1
             ORDER BY name COLLATE NOCASE, id"
        ))
    }

    pub fn delete_item(&self, id: i64) -> Result<(), CoreError> {
        let changed = self
            .conn
            .execute("DELETE FROM library_item WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(CoreError::NotFound(format!("library item {id}")));
        }
        Ok(())
    }

    pub fn set_enabled(&self, id: i64, enabled: bool) -> Result<(), CoreError> {
        let changed = self.conn.execute(
            "UPDATE library_item SET enabled = ?1, updated_at = ?2 WHERE id = ?3",
            params![enabled as i32, Utc::now().to_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(CoreError::NotFound(format!("library item {id}")));
        }
        Ok(())
    }

    /// Overwrite all three provider identifiers of an item.
    pub fn update_provider_ids(&self, id: i64, ids: &ProviderIds) -> Result<(), CoreError> {
        let changed = self.conn.execute(
            "UPDATE library_item SET anilist_id = ?1, mal_id = ?2, animethemes_slug = ?3,
             updated_at = ?4 WHERE id = ?5",
            params![
                ids.anilist.map(|v| v as i64),
                ids.mal.map(|v| v as i64),
                ids.animethemes_slug,
                Utc::now().to_rfc3339(),
                id,
            ],
        )?;
        if changed == 0 {
            return Err(CoreError::NotFound(format!("library item {id}")));
        }
        Ok(())
    }

    fn query_items(&self, sql: &str) -> Result<Vec<LibraryItem>, CoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map([], |row| Ok(row_to_item(row)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

impl MediaLibrary for Storage {
    fn entries(&self) -> Result<Vec<LibraryItem>, CoreError> {
        self.enabled_items()
    }

    fn set_provider_ids(&self, item_id: i64, ids: &ProviderIds) -> Result<(), CoreError> {
        self.update_provider_ids(item_id, ids)
    }
}

// ── Migrations ──────────────────────────────────────────────────

/// Run schema migrations using `PRAGMA user_version` for version tracking.
fn run_migrations(conn: &Connection) -> Result<(), CoreError> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        conn.execute_batch(SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", 1)?;
    }
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────

/// Parse a datetime string from SQLite (either RFC 3339 or SQLite's `datetime('now')` format).
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return naive.and_utc();
    }
    DateTime::default()
}

fn row_to_item(row: &rusqlite::Row<'_>) -> LibraryItem {
    let path: String = row.get(3).unwrap_or_default();
    let kind: String = row.get(4).unwrap_or_default();
    let updated_at: String = row.get(9).unwrap_or_default();

    LibraryItem {
        id: row.get(0).unwrap_or_default(),
        name: row.get(1).unwrap_or_default(),
        year: row.get(2).unwrap_or(None),
        path: PathBuf::from(path),
        kind: MediaKind::from_db_str(&kind).unwrap_or(MediaKind::Series),
        enabled: row.get::<_, i32>(5).unwrap_or(1) != 0,
        ids: ProviderIds {
            anilist: row.get::<_, Option<i64>>(6).unwrap_or(None).map(|v| v as u64),
            mal: row.get::<_, Option<i64>>(7).unwrap_or(None).map(|v| v as u64),
            animethemes_slug: row.get(8).unwrap_or(None),
        },
        updated_at: parse_datetime(&updated_at),
    }
}
