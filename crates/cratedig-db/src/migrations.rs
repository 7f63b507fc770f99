// SPDX-License-Identifier: GPL-3.0-or-later
//! Linear schema migration sequence guarded by a `schema_migrations` table
//! (spec §4.5). Each migration is a list of plain SQL statements; statement
//! errors that indicate the change was already applied (column/table/index
//! already exists) are tolerated so migrations are safe to re-run against a
//! database that was hand-patched or partially migrated by a crashed
//! process. A migration is recorded in `schema_migrations` only once every
//! one of its statements has executed without a *fatal* error.

use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

struct Migration {
    version: i64,
    description: &'static str,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "base schema: jobs, tracks, cache_entries, settings",
        statements: &[
            r#"CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                job_type TEXT NOT NULL,
                status TEXT NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                source_id TEXT NOT NULL,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS tracks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                upstream_id TEXT NOT NULL UNIQUE,
                title TEXT,
                artists TEXT NOT NULL DEFAULT '[]',
                artist_ids TEXT NOT NULL DEFAULT '[]',
                albums TEXT NOT NULL DEFAULT '[]',
                album_artists TEXT NOT NULL DEFAULT '[]',
                album_artist_ids TEXT NOT NULL DEFAULT '[]',
                album_id TEXT,
                disc_number INTEGER,
                track_number INTEGER,
                total_discs INTEGER,
                total_tracks INTEGER,
                year INTEGER,
                genre TEXT,
                label TEXT,
                isrc TEXT,
                copyright TEXT,
                composer TEXT,
                duration_seconds REAL,
                explicit INTEGER NOT NULL DEFAULT 0,
                compilation INTEGER NOT NULL DEFAULT 0,
                art_url TEXT,
                lyrics TEXT,
                subtitles TEXT,
                version TEXT,
                description TEXT,
                url TEXT,
                audio_quality TEXT,
                audio_modes TEXT NOT NULL DEFAULT '[]',
                release_date TEXT,
                barcode TEXT,
                catalog_number TEXT,
                release_type TEXT,
                release_id TEXT,
                external_recording_id TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                status TEXT NOT NULL DEFAULT 'missing',
                error TEXT,
                parent_job_id TEXT,
                file_path TEXT,
                extension TEXT,
                content_hash TEXT,
                last_verified_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT
            )"#,
            r#"CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                expires_at TEXT
            )"#,
            r#"CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"#,
        ],
    },
    Migration {
        version: 2,
        description: "add audio-analysis columns to tracks (bpm, key, scale, replay gain, peak)",
        statements: &[
            "ALTER TABLE tracks ADD COLUMN bpm REAL",
            "ALTER TABLE tracks ADD COLUMN musical_key TEXT",
            "ALTER TABLE tracks ADD COLUMN musical_scale TEXT",
            "ALTER TABLE tracks ADD COLUMN replay_gain REAL",
            "ALTER TABLE tracks ADD COLUMN peak REAL",
        ],
    },
    Migration {
        version: 3,
        description: "indexes, including the partial unique index enforcing at-most-one-active-job",
        statements: &[
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_active_unique \
             ON jobs(source_id, job_type) WHERE status IN ('queued', 'running')",
            "CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)",
            "CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at)",
            "CREATE INDEX IF NOT EXISTS idx_tracks_status ON tracks(status)",
            "CREATE INDEX IF NOT EXISTS idx_tracks_parent_job_id ON tracks(parent_job_id)",
            "CREATE INDEX IF NOT EXISTS idx_tracks_isrc ON tracks(isrc)",
        ],
    },
];

fn is_tolerable(err: &sqlx::Error) -> bool {
    let msg = err.to_string().to_lowercase();
    msg.contains("duplicate column")
        || msg.contains("already exists")
        || msg.contains("index") && msg.contains("exists")
}

pub(crate) async fn run(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    let applied: Vec<i64> = sqlx::query_scalar("SELECT version FROM schema_migrations")
        .fetch_all(pool)
        .await?;

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            debug!(target: "db", version = migration.version, "migration already applied");
            continue;
        }

        info!(target: "db", version = migration.version, description = migration.description, "applying migration");
        for stmt in migration.statements {
            if let Err(err) = sqlx::query(stmt).execute(pool).await {
                if is_tolerable(&err) {
                    warn!(target: "db", version = migration.version, %err, "tolerating already-applied statement");
                    continue;
                }
                return Err(err.into());
            }
        }

        sqlx::query(
            "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?, ?, ?)",
        )
        .bind(migration.version)
        .bind(migration.description)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;
    }

    Ok(())
}
