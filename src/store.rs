//! Postings index and song metadata store, backed by a single sqlite file.
//!
//! Metadata deletion is an immediate, O(1) row delete (§4.5). Posting
//! cleanup is lazy: `search` joins against the songs table so postings left
//! behind by a removed song are never returned, and `compact` is the
//! periodic maintenance pass that physically deletes them.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::hashing::Fingerprint;

pub type SongId = u64;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SongRecord {
    pub song_id: SongId,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub file_path: String,
    pub duration_seconds: f64,
    pub file_size_bytes: Option<u64>,
    pub date_added: String,
    pub fingerprint_count: u64,
}

/// Fields supplied by the caller on ingest; the store fills in `song_id`,
/// `date_added`, and `fingerprint_count`.
#[derive(Debug, Clone)]
pub struct NewSong {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub file_path: String,
    pub duration_seconds: f64,
    pub file_size_bytes: Option<u64>,
}

#[derive(Debug, Default)]
pub struct StoreStats {
    pub total_songs: u64,
    pub total_fingerprints: u64,
    pub total_duration_hours: f64,
    pub index_size_bytes: Option<u64>,
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (and create if absent) the backing store, verifying that its
    /// schema fingerprint matches the running engine's parameters.
    pub fn open(path: &Path, config: &EngineConfig) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = OFF;")?;
        Self::init_schema(&conn)?;
        Self::check_schema_fingerprint(&conn, config)?;
        Ok(Store { conn: Mutex::new(conn) })
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory(config: &EngineConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Self::check_schema_fingerprint(&conn, config)?;
        Ok(Store { conn: Mutex::new(conn) })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS engine_meta (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                schema_fingerprint TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS songs (
                song_id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                artist TEXT NOT NULL,
                album TEXT,
                file_path TEXT UNIQUE NOT NULL,
                duration_seconds REAL NOT NULL,
                file_size_bytes INTEGER,
                date_added TEXT NOT NULL,
                fingerprint_count INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS fingerprints (
                hash INTEGER NOT NULL,
                song_id INTEGER NOT NULL,
                anchor_time INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_fingerprints_hash ON fingerprints (hash);
            CREATE INDEX IF NOT EXISTS idx_fingerprints_song_id ON fingerprints (song_id);
            CREATE INDEX IF NOT EXISTS idx_songs_file_path ON songs (file_path);",
        )?;
        Ok(())
    }

    fn check_schema_fingerprint(conn: &Connection, config: &EngineConfig) -> Result<()> {
        let expected = config.schema_fingerprint();
        let found: Option<String> = conn
            .query_row("SELECT schema_fingerprint FROM engine_meta WHERE id = 0", [], |r| r.get(0))
            .optional()?;

        match found {
            None => {
                conn.execute(
                    "INSERT INTO engine_meta (id, schema_fingerprint) VALUES (0, ?1)",
                    params![expected],
                )?;
                Ok(())
            }
            Some(found) if found == expected => Ok(()),
            Some(found) => Err(EngineError::SchemaMismatch { expected, found }),
        }
    }

    /// Insert a song and its fingerprints. Atomic from the store's
    /// perspective: either the song row and all postings become visible, or
    /// neither does.
    pub fn add_song(&self, meta: &NewSong, fingerprints: &[Fingerprint]) -> Result<SongId> {
        let mut conn = self.conn.lock().expect("store mutex poisoned");
        let tx = conn.transaction()?;

        let date_added = chrono::Utc::now().to_rfc3339();
        let inserted = tx.execute(
            "INSERT INTO songs (title, artist, album, file_path, duration_seconds, file_size_bytes, date_added, fingerprint_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                meta.title,
                meta.artist,
                meta.album,
                meta.file_path,
                meta.duration_seconds,
                meta.file_size_bytes.map(|v| v as i64),
                date_added,
                fingerprints.len() as i64,
            ],
        );

        let song_id = match inserted {
            Ok(_) => tx.last_insert_rowid() as SongId,
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
                return Err(EngineError::DuplicatePath(meta.file_path.clone().into()));
            }
            Err(e) => return Err(e.into()),
        };

        {
            let mut stmt = tx.prepare("INSERT INTO fingerprints (hash, song_id, anchor_time) VALUES (?1, ?2, ?3)")?;
            for fp in fingerprints {
                stmt.execute(params![fp.hash_value as i64, song_id as i64, fp.anchor_time as i64])?;
            }
        }

        tx.commit()?;
        Ok(song_id)
    }

    /// Look up postings for every query hash, bucketed by song. Postings
    /// whose song has been removed are excluded by the join.
    pub fn search(&self, query_hashes: &[Fingerprint]) -> Result<HashMap<SongId, Vec<(u32, u32)>>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT f.song_id, f.anchor_time FROM fingerprints f
             INNER JOIN songs s ON s.song_id = f.song_id
             WHERE f.hash = ?1",
        )?;

        let mut matches: HashMap<SongId, Vec<(u32, u32)>> = HashMap::new();
        for q in query_hashes {
            let rows = stmt.query_map(params![q.hash_value as i64], |row| {
                Ok((row.get::<_, i64>(0)? as SongId, row.get::<_, i64>(1)? as u32))
            })?;
            for row in rows {
                let (song_id, db_anchor_time) = row?;
                matches.entry(song_id).or_default().push((db_anchor_time, q.anchor_time));
            }
        }
        Ok(matches)
    }

    pub fn get_song(&self, song_id: SongId) -> Result<Option<SongRecord>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        Self::row_to_song(&conn, "WHERE song_id = ?1", params![song_id as i64])
    }

    pub fn get_song_by_path(&self, file_path: &str) -> Result<Option<SongRecord>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        Self::row_to_song(&conn, "WHERE file_path = ?1", params![file_path])
    }

    fn row_to_song(conn: &Connection, clause: &str, args: impl rusqlite::Params) -> Result<Option<SongRecord>> {
        let sql = format!(
            "SELECT song_id, title, artist, album, file_path, duration_seconds, file_size_bytes, date_added, fingerprint_count
             FROM songs {clause}"
        );
        conn.query_row(&sql, args, Self::map_song_row).optional().map_err(Into::into)
    }

    fn map_song_row(row: &rusqlite::Row) -> rusqlite::Result<SongRecord> {
        Ok(SongRecord {
            song_id: row.get::<_, i64>(0)? as SongId,
            title: row.get(1)?,
            artist: row.get(2)?,
            album: row.get(3)?,
            file_path: row.get(4)?,
            duration_seconds: row.get(5)?,
            file_size_bytes: row.get::<_, Option<i64>>(6)?.map(|v| v as u64),
            date_added: row.get(7)?,
            fingerprint_count: row.get::<_, i64>(8)? as u64,
        })
    }

    /// Delete the metadata row immediately; postings are left for lazy
    /// filtering / later compaction.
    pub fn remove_song(&self, song_id: SongId) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let affected = conn.execute("DELETE FROM songs WHERE song_id = ?1", params![song_id as i64])?;
        if affected == 0 {
            return Err(EngineError::NotFound(song_id));
        }
        Ok(())
    }

    pub fn list(&self, limit: u32, offset: u32, search: Option<&str>) -> Result<Vec<SongRecord>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut rows = Vec::new();

        let sql = "SELECT song_id, title, artist, album, file_path, duration_seconds, file_size_bytes, date_added, fingerprint_count
                   FROM songs
                   WHERE (?1 IS NULL OR title LIKE '%' || ?1 || '%' OR artist LIKE '%' || ?1 || '%')
                   ORDER BY song_id ASC
                   LIMIT ?2 OFFSET ?3";
        let mut stmt = conn.prepare(sql)?;
        let mapped = stmt.query_map(params![search, limit, offset], Self::map_song_row)?;
        for row in mapped {
            rows.push(row?);
        }
        Ok(rows)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let total_songs: i64 = conn.query_row("SELECT COUNT(*) FROM songs", [], |r| r.get(0))?;
        let total_fingerprints: i64 =
            conn.query_row("SELECT COALESCE(SUM(fingerprint_count), 0) FROM songs", [], |r| r.get(0))?;
        let total_duration: f64 = conn.query_row("SELECT COALESCE(SUM(duration_seconds), 0.0) FROM songs", [], |r| r.get(0))?;

        Ok(StoreStats {
            total_songs: total_songs as u64,
            total_fingerprints: total_fingerprints as u64,
            total_duration_hours: total_duration / 3600.0,
            index_size_bytes: None,
        })
    }

    /// Physically delete postings whose song has been removed. Bounded
    /// retry is unnecessary here: a single DELETE is atomic under sqlite's
    /// own transaction semantics.
    pub fn compact(&self) -> Result<u64> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let deleted = conn.execute(
            "DELETE FROM fingerprints WHERE song_id NOT IN (SELECT song_id FROM songs)",
            [],
        )?;
        Ok(deleted as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_song(path: &str) -> NewSong {
        NewSong {
            title: "Test".into(),
            artist: "Artist".into(),
            album: None,
            file_path: path.into(),
            duration_seconds: 10.0,
            file_size_bytes: None,
        }
    }

    fn fp(hash: u64, anchor: u32) -> Fingerprint {
        Fingerprint { hash_value: hash, anchor_time: anchor }
    }

    #[test]
    fn add_and_get_song() {
        let cfg = EngineConfig::default();
        let store = Store::open_in_memory(&cfg).unwrap();
        let id = store.add_song(&new_song("a.wav"), &[fp(1, 0), fp(2, 5)]).unwrap();
        let song = store.get_song(id).unwrap().unwrap();
        assert_eq!(song.file_path, "a.wav");
        assert_eq!(song.fingerprint_count, 2);
    }

    #[test]
    fn duplicate_path_rejected() {
        let cfg = EngineConfig::default();
        let store = Store::open_in_memory(&cfg).unwrap();
        store.add_song(&new_song("a.wav"), &[fp(1, 0)]).unwrap();
        let second = store.add_song(&new_song("a.wav"), &[fp(2, 0)]);
        assert!(matches!(second, Err(EngineError::DuplicatePath(_))));
    }

    #[test]
    fn remove_then_get_not_found() {
        let cfg = EngineConfig::default();
        let store = Store::open_in_memory(&cfg).unwrap();
        let id = store.add_song(&new_song("a.wav"), &[fp(1, 0)]).unwrap();
        store.remove_song(id).unwrap();
        assert!(store.get_song(id).unwrap().is_none());
    }

    #[test]
    fn remove_missing_song_errors() {
        let cfg = EngineConfig::default();
        let store = Store::open_in_memory(&cfg).unwrap();
        assert!(matches!(store.remove_song(999), Err(EngineError::NotFound(999))));
    }

    #[test]
    fn search_excludes_postings_of_removed_song() {
        let cfg = EngineConfig::default();
        let store = Store::open_in_memory(&cfg).unwrap();
        let id = store.add_song(&new_song("a.wav"), &[fp(42, 3)]).unwrap();
        store.remove_song(id).unwrap();
        let results = store.search(&[fp(42, 0)]).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn compact_deletes_orphaned_postings() {
        let cfg = EngineConfig::default();
        let store = Store::open_in_memory(&cfg).unwrap();
        let id = store.add_song(&new_song("a.wav"), &[fp(42, 3)]).unwrap();
        store.remove_song(id).unwrap();
        let deleted = store.compact().unwrap();
        assert_eq!(deleted, 1);
    }

    #[test]
    fn list_paginates_in_stable_order() {
        let cfg = EngineConfig::default();
        let store = Store::open_in_memory(&cfg).unwrap();
        for i in 0..5 {
            store.add_song(&new_song(&format!("song{i}.wav")), &[]).unwrap();
        }
        let page1 = store.list(2, 0, None).unwrap();
        let page2 = store.list(2, 2, None).unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(page2.len(), 2);
        assert_ne!(page1[0].song_id, page2[0].song_id);
    }

    #[test]
    fn schema_mismatch_rejected_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.sqlite");
        let cfg_a = EngineConfig::default();
        {
            let _store = Store::open(&path, &cfg_a).unwrap();
        }
        let mut cfg_b = EngineConfig::default();
        cfg_b.n_fft = 4096;
        let reopened = Store::open(&path, &cfg_b);
        assert!(matches!(reopened, Err(EngineError::SchemaMismatch { .. })));
    }
}
