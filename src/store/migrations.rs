use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Bring the database up to date
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let current_version = schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

pub fn schema_version(conn: &Connection) -> rusqlite::Result<i32> {
    let table_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}

/// Transcript table with segment provenance, plus its full-text projection
fn migrate_v1(conn: &Connection) -> rusqlite::Result<()> {
    tracing::info!("Running database migration v1");

    conn.execute_batch(
        r#"
        BEGIN;

        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS transcripts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            video_id TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            channel TEXT NOT NULL,
            duration REAL,
            transcript TEXT NOT NULL,
            segments TEXT NOT NULL DEFAULT '[]',
            source_strategy TEXT,
            language_code TEXT,
            is_auto_generated INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_transcripts_created_at ON transcripts(created_at);

        -- External-content index; rows are kept in step by the triggers below
        CREATE VIRTUAL TABLE IF NOT EXISTS transcript_search USING fts5(
            title,
            channel,
            transcript,
            content='transcripts',
            content_rowid='id'
        );

        CREATE TRIGGER IF NOT EXISTS transcripts_ai AFTER INSERT ON transcripts BEGIN
            INSERT INTO transcript_search(rowid, title, channel, transcript)
            VALUES (new.id, new.title, new.channel, new.transcript);
        END;

        CREATE TRIGGER IF NOT EXISTS transcripts_ad AFTER DELETE ON transcripts BEGIN
            INSERT INTO transcript_search(transcript_search, rowid, title, channel, transcript)
            VALUES ('delete', old.id, old.title, old.channel, old.transcript);
        END;

        CREATE TRIGGER IF NOT EXISTS transcripts_au AFTER UPDATE ON transcripts BEGIN
            INSERT INTO transcript_search(transcript_search, rowid, title, channel, transcript)
            VALUES ('delete', old.id, old.title, old.channel, old.transcript);
            INSERT INTO transcript_search(rowid, title, channel, transcript)
            VALUES (new.id, new.title, new.channel, new.transcript);
        END;

        INSERT INTO schema_version (version) VALUES (1);

        COMMIT;
        "#,
    )
}
