//! SQLite persistence for transcripts with an FTS5 search projection.
//!
//! One row per video. Writes go through `upsert`, which replaces an existing
//! row in place so its id and `created_at` survive and the search index is
//! updated by triggers in the same transaction.

use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

pub mod migrations;

use crate::extractors::StrategyKind;
use crate::transcript::{TranscriptSegment, VideoId};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database connection lock poisoned")]
    LockPoisoned,

    #[error("could not prepare database location: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not encode segments: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// What the service hands to the store
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub video_id: VideoId,
    pub title: String,
    pub channel: String,
    pub duration: Option<f64>,
    /// Flat text; the placeholder when no transcript exists
    pub transcript: String,
    pub segments: Vec<TranscriptSegment>,
    pub source_strategy: Option<StrategyKind>,
    pub language_code: Option<String>,
    pub is_auto_generated: bool,
}

/// A stored transcript
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptRecord {
    pub id: i64,
    pub video_id: String,
    pub title: String,
    pub channel: String,
    pub duration: Option<f64>,
    pub transcript: String,
    pub segments: Vec<TranscriptSegment>,
    pub source_strategy: Option<StrategyKind>,
    pub language_code: Option<String>,
    pub is_auto_generated: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub entry: TranscriptRecord,
    /// Matched excerpt with hits wrapped in `<mark>`
    pub snippet: String,
}

const RECORD_COLUMNS: &str = "t.id, t.video_id, t.title, t.channel, t.duration, t.transcript, t.segments, \
     t.source_strategy, t.language_code, t.is_auto_generated, t.created_at, t.updated_at";

pub struct TranscriptStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl TranscriptStore {
    /// Open (creating if needed) the database at `path` and migrate it
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        migrations::run_migrations(&conn)?;

        tracing::info!("Transcript database ready at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// On-disk location, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn with_connection<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&conn)
    }

    /// Insert or replace the record for `record.video_id`; returns its stable id
    pub fn upsert(&self, record: &NewRecord) -> Result<i64, StoreError> {
        let segments = serde_json::to_string(&record.segments)?;
        let now = Utc::now().to_rfc3339();

        self.with_connection(|conn| {
            let tx = conn.unchecked_transaction()?;

            let id: i64 = tx.query_row(
                r#"
                INSERT INTO transcripts (
                    video_id, title, channel, duration, transcript, segments,
                    source_strategy, language_code, is_auto_generated, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                ON CONFLICT(video_id) DO UPDATE SET
                    title = excluded.title,
                    channel = excluded.channel,
                    duration = excluded.duration,
                    transcript = excluded.transcript,
                    segments = excluded.segments,
                    source_strategy = excluded.source_strategy,
                    language_code = excluded.language_code,
                    is_auto_generated = excluded.is_auto_generated,
                    updated_at = excluded.updated_at
                RETURNING id
                "#,
                params![
                    record.video_id.as_str(),
                    record.title,
                    record.channel,
                    record.duration,
                    record.transcript,
                    segments,
                    record.source_strategy.map(|k| k.as_str()),
                    record.language_code,
                    record.is_auto_generated,
                    now,
                ],
                |row| row.get(0),
            )?;

            tx.commit()?;
            tracing::debug!("Stored transcript {} as record {}", record.video_id, id);
            Ok(id)
        })
    }

    /// Full-text search over title, channel and transcript text.
    ///
    /// Every whitespace-separated term must match; a blank query matches nothing.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>, StoreError> {
        let Some(expression) = match_expression(query) else {
            return Ok(Vec::new());
        };

        self.with_connection(|conn| {
            let sql = format!(
                "SELECT {}, snippet(transcript_search, -1, '<mark>', '</mark>', '...', 32) \
                 FROM transcript_search JOIN transcripts t ON t.id = transcript_search.rowid \
                 WHERE transcript_search MATCH ?1 \
                 ORDER BY rank",
                RECORD_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let hits = stmt
                .query_map([expression], |row| {
                    Ok(SearchHit {
                        entry: record_from_row(row)?,
                        snippet: row.get(12)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(hits)
        })
    }

    pub fn get(&self, id: i64) -> Result<Option<TranscriptRecord>, StoreError> {
        self.with_connection(|conn| {
            let sql = format!("SELECT {} FROM transcripts t WHERE t.id = ?1", RECORD_COLUMNS);
            Ok(conn.query_row(&sql, [id], record_from_row).optional()?)
        })
    }

    pub fn get_by_video_id(&self, video_id: &VideoId) -> Result<Option<TranscriptRecord>, StoreError> {
        self.with_connection(|conn| {
            let sql = format!("SELECT {} FROM transcripts t WHERE t.video_id = ?1", RECORD_COLUMNS);
            Ok(conn.query_row(&sql, [video_id.as_str()], record_from_row).optional()?)
        })
    }

    /// All records, newest first
    pub fn list(&self) -> Result<Vec<TranscriptRecord>, StoreError> {
        self.with_connection(|conn| {
            let sql = format!(
                "SELECT {} FROM transcripts t ORDER BY t.created_at DESC, t.id DESC",
                RECORD_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map([], record_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
    }

    /// Returns whether a record was removed
    pub fn delete(&self, id: i64) -> Result<bool, StoreError> {
        self.with_connection(|conn| {
            let removed = conn.execute("DELETE FROM transcripts WHERE id = ?1", [id])?;
            Ok(removed > 0)
        })
    }

    /// Rebuild the search projection from the transcripts table
    pub fn rebuild_search_index(&self) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            conn.execute("INSERT INTO transcript_search(transcript_search) VALUES ('rebuild')", [])?;
            tracing::info!("Search index rebuilt");
            Ok(())
        })
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        self.with_connection(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM transcripts", [], |row| row.get(0))?))
    }
}

/// Quote each term so user input is never read as FTS5 syntax.
///
/// Terms without a letter or digit tokenize to nothing and would match no row.
fn match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .filter(|term| term.chars().any(char::is_alphanumeric))
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" AND "))
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<TranscriptRecord> {
    let segments: String = row.get(6)?;
    let segments = serde_json::from_str(&segments)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;
    let source_strategy: Option<String> = row.get(7)?;

    Ok(TranscriptRecord {
        id: row.get(0)?,
        video_id: row.get(1)?,
        title: row.get(2)?,
        channel: row.get(3)?,
        duration: row.get(4)?,
        transcript: row.get(5)?,
        segments,
        source_strategy: source_strategy.and_then(|s| s.parse().ok()),
        language_code: row.get(8)?,
        is_auto_generated: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(video_id: &str, title: &str, transcript: &str) -> NewRecord {
        NewRecord {
            video_id: VideoId::parse(video_id).unwrap(),
            title: title.to_string(),
            channel: "Test Channel".to_string(),
            duration: Some(212.0),
            transcript: transcript.to_string(),
            segments: vec![TranscriptSegment {
                text: transcript.to_string(),
                start_seconds: 0.0,
                duration_seconds: 4.0,
            }],
            source_strategy: Some(StrategyKind::Process),
            language_code: Some("en".to_string()),
            is_auto_generated: false,
        }
    }

    #[test]
    fn test_search_returns_marked_snippet() {
        let store = TranscriptStore::in_memory().unwrap();
        store
            .upsert(&record("dQw4w9WgXcQ", "Rick Astley", "the quick brown fox jumps"))
            .unwrap();
        store
            .upsert(&record("jNQXAC9IVRw", "Me at the zoo", "elephants have really long trunks"))
            .unwrap();

        let hits = store.search("brown").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.video_id, "dQw4w9WgXcQ");
        assert!(hits[0].snippet.contains("<mark>brown</mark>"), "{}", hits[0].snippet);
    }

    #[test]
    fn test_search_requires_every_term() {
        let store = TranscriptStore::in_memory().unwrap();
        store.upsert(&record("dQw4w9WgXcQ", "a", "the quick brown fox")).unwrap();

        assert_eq!(store.search("quick fox").unwrap().len(), 1);
        assert!(store.search("quick zebra").unwrap().is_empty());
    }

    #[test]
    fn test_blank_query_matches_nothing() {
        let store = TranscriptStore::in_memory().unwrap();
        store.upsert(&record("dQw4w9WgXcQ", "a", "anything")).unwrap();

        assert!(store.search("").unwrap().is_empty());
        assert!(store.search("   ").unwrap().is_empty());
    }

    #[test]
    fn test_fts_syntax_is_treated_as_text() {
        let store = TranscriptStore::in_memory().unwrap();
        store.upsert(&record("dQw4w9WgXcQ", "a", "rock and roll")).unwrap();

        assert_eq!(store.search("\"rock").unwrap().len(), 1);
        assert!(store.search("rock OR zebra").unwrap().is_empty());
        assert_eq!(store.search("ROLL").unwrap().len(), 1);
    }

    #[test]
    fn test_punctuation_terms_are_ignored() {
        let store = TranscriptStore::in_memory().unwrap();
        store.upsert(&record("dQw4w9WgXcQ", "a", "rock - and roll? yes")).unwrap();

        assert_eq!(store.search("rock & roll").unwrap().len(), 1);
        assert_eq!(store.search("rock - roll").unwrap().len(), 1);
        assert_eq!(store.search("roll ?").unwrap().len(), 1);
        assert!(store.search("& - ?").unwrap().is_empty());
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let store = TranscriptStore::in_memory().unwrap();
        let first = store.upsert(&record("dQw4w9WgXcQ", "Old", "walrus content")).unwrap();
        let created = store.get(first).unwrap().unwrap().created_at;

        let second = store.upsert(&record("dQw4w9WgXcQ", "New", "penguin content")).unwrap();

        assert_eq!(first, second);
        assert_eq!(store.count().unwrap(), 1);

        let stored = store.get(second).unwrap().unwrap();
        assert_eq!(stored.title, "New");
        assert_eq!(stored.created_at, created);

        assert!(store.search("walrus").unwrap().is_empty());
        assert_eq!(store.search("penguin").unwrap().len(), 1);
    }

    #[test]
    fn test_record_keeps_segments_and_provenance() {
        let store = TranscriptStore::in_memory().unwrap();
        let id = store.upsert(&record("dQw4w9WgXcQ", "a", "hello there")).unwrap();

        let stored = store.get_by_video_id(&VideoId::parse("dQw4w9WgXcQ").unwrap()).unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.segments.len(), 1);
        assert_eq!(stored.segments[0].duration_seconds, 4.0);
        assert_eq!(stored.source_strategy, Some(StrategyKind::Process));
        assert_eq!(stored.language_code.as_deref(), Some("en"));
        assert_eq!(stored.duration, Some(212.0));
    }

    #[test]
    fn test_delete_removes_from_index() {
        let store = TranscriptStore::in_memory().unwrap();
        let id = store.upsert(&record("dQw4w9WgXcQ", "a", "ephemeral words")).unwrap();

        assert!(store.delete(id).unwrap());
        assert!(!store.delete(id).unwrap());
        assert!(store.get(id).unwrap().is_none());
        assert!(store.search("ephemeral").unwrap().is_empty());
    }

    #[test]
    fn test_rebuild_search_index() {
        let store = TranscriptStore::in_memory().unwrap();
        store.upsert(&record("dQw4w9WgXcQ", "a", "durable words")).unwrap();

        store.rebuild_search_index().unwrap();
        assert_eq!(store.search("durable").unwrap().len(), 1);
    }

    #[test]
    fn test_list_and_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("transcripts.db");

        {
            let store = TranscriptStore::open(&path).unwrap();
            store.upsert(&record("dQw4w9WgXcQ", "first", "one")).unwrap();
            store.upsert(&record("jNQXAC9IVRw", "second", "two")).unwrap();
        }

        let store = TranscriptStore::open(&path).unwrap();
        let titles: Vec<_> = store.list().unwrap().into_iter().map(|r| r.title).collect();
        assert_eq!(titles.len(), 2);
        assert!(titles.contains(&"first".to_string()));
        assert_eq!(store.path(), Some(path.as_path()));
    }
}
