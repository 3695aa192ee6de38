//! SQLite metadata store.
//!
//! Connection-per-call with WAL enabled; every call runs on tokio's blocking
//! pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OpenFlags, Row};
use tracing::debug;

use super::{ChartRecord, EditCommit, MetadataError, MetadataStore};
use crate::ids::{ChartId, OwnerId};
use crate::request::{ChartMetadata, DescriptionChange};
use crate::slots::{AssetSet, AssetSlot};
use cas::ContentHash;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS charts (
    id TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    title TEXT NOT NULL,
    chart_author TEXT NOT NULL,
    artists TEXT NOT NULL,
    rating INTEGER NOT NULL,
    tags JSON NOT NULL DEFAULT '[]',
    description TEXT,
    chart_file_hash TEXT NOT NULL,
    music_file_hash TEXT NOT NULL,
    jacket_file_hash TEXT NOT NULL,
    background_v1_file_hash TEXT NOT NULL,
    background_v3_file_hash TEXT NOT NULL,
    preview_file_hash TEXT,
    background_file_hash TEXT,
    revision INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_charts_owner ON charts(owner);

CREATE TABLE IF NOT EXISTS leaderboards (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chart_id TEXT NOT NULL REFERENCES charts(id) ON DELETE CASCADE,
    submitter TEXT NOT NULL,
    score INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_leaderboards_chart ON leaderboards(chart_id);
"#;

const SELECT_CHART: &str = "SELECT id, owner, title, chart_author, artists, rating, tags, description,
        chart_file_hash, music_file_hash, jacket_file_hash,
        background_v1_file_hash, background_v3_file_hash,
        preview_file_hash, background_file_hash, revision
     FROM charts WHERE id = ?1";

/// Synchronous access to the chart database.
pub struct ChartDb {
    path: PathBuf,
}

/// Column values of one `charts` row before validation.
struct RawChart {
    id: String,
    owner: String,
    title: String,
    author: String,
    artists: String,
    rating: i32,
    tags: String,
    description: Option<String>,
    hashes: [Option<String>; 7],
    revision: i64,
}

impl RawChart {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner: row.get(1)?,
            title: row.get(2)?,
            author: row.get(3)?,
            artists: row.get(4)?,
            rating: row.get(5)?,
            tags: row.get(6)?,
            description: row.get(7)?,
            hashes: [
                row.get(8)?,
                row.get(9)?,
                row.get(10)?,
                row.get(11)?,
                row.get(12)?,
                row.get(13)?,
                row.get(14)?,
            ],
            revision: row.get(15)?,
        })
    }

    fn into_record(self) -> Result<ChartRecord, MetadataError> {
        let chart = self.id.clone();
        let corrupt = |message: String| MetadataError::Corrupt {
            chart: chart.clone(),
            message,
        };

        let mut hashes = Vec::with_capacity(self.hashes.len());
        for (slot, value) in SLOT_ORDER.iter().zip(self.hashes) {
            let hash = value
                .map(|s| s.parse::<ContentHash>())
                .transpose()
                .map_err(|e| corrupt(format!("{}: {}", slot.column(), e)))?;
            hashes.push(hash);
        }
        let required = |i: usize| {
            hashes[i]
                .clone()
                .ok_or_else(|| corrupt(format!("{} is null", SLOT_ORDER[i].column())))
        };
        let assets = AssetSet::new(required(0)?, required(1)?, required(2)?, required(3)?, required(4)?)
            .with_preview(hashes[5].clone())
            .with_background(hashes[6].clone());

        let tags: Vec<String> =
            serde_json::from_str(&self.tags).map_err(|e| corrupt(format!("tags: {}", e)))?;

        Ok(ChartRecord {
            id: ChartId::parse(&self.id).map_err(|e| corrupt(e.to_string()))?,
            owner: OwnerId::new(self.owner).map_err(|e| corrupt(e.to_string()))?,
            metadata: ChartMetadata {
                title: self.title,
                author: self.author,
                artists: self.artists,
                rating: self.rating,
                tags,
                description: self.description,
            },
            assets,
            revision: self.revision,
        })
    }
}

/// Slot order of the hash columns in [`SELECT_CHART`].
const SLOT_ORDER: [AssetSlot; 7] = [
    AssetSlot::Script,
    AssetSlot::Audio,
    AssetSlot::Jacket,
    AssetSlot::JacketVariant1,
    AssetSlot::JacketVariant2,
    AssetSlot::Preview,
    AssetSlot::Background,
];

fn hash_value(hash: Option<&ContentHash>) -> Value {
    match hash {
        Some(hash) => Value::Text(hash.to_string()),
        None => Value::Null,
    }
}

impl ChartDb {
    /// Open database at path, creating if necessary
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let db = Self { path };
        db.initialize()?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a connection with WAL mode and busy timeout
    pub fn conn(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open database: {:?}", self.path))?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA foreign_keys = ON;
        ",
        )?;

        Ok(conn)
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize database schema")?;
        Ok(())
    }

    pub fn create_chart(&self, record: &ChartRecord) -> Result<(), MetadataError> {
        let conn = self.conn()?;
        let meta = &record.metadata;
        let tags = serde_json::to_string(&meta.tags).context("Failed to encode tags")?;

        let mut values = vec![
            Value::Text(record.id.to_string()),
            Value::Text(record.owner.to_string()),
            Value::Text(meta.title.clone()),
            Value::Text(meta.author.clone()),
            Value::Text(meta.artists.clone()),
            Value::Integer(i64::from(meta.rating)),
            Value::Text(tags),
            meta.description.clone().map_or(Value::Null, Value::Text),
        ];
        values.extend(SLOT_ORDER.iter().map(|slot| hash_value(record.assets.get(*slot))));
        values.push(Value::Integer(record.revision));

        let result = conn.execute(
            "INSERT INTO charts (id, owner, title, chart_author, artists, rating, tags, description,
                chart_file_hash, music_file_hash, jacket_file_hash,
                background_v1_file_hash, background_v3_file_hash,
                preview_file_hash, background_file_hash, revision)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params_from_iter(values),
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(MetadataError::Duplicate(record.id.clone()))
            }
            Err(e) => Err(anyhow::Error::from(e).context("Failed to insert chart").into()),
        }
    }

    pub fn get_chart(&self, id: &ChartId) -> Result<Option<ChartRecord>, MetadataError> {
        let conn = self.conn()?;
        let result = conn.query_row(SELECT_CHART, [id.as_str()], RawChart::from_row);

        match result {
            Ok(raw) => raw.into_record().map(Some),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(anyhow::Error::from(e).context("Failed to read chart").into()),
        }
    }

    pub fn commit_edit(&self, commit: &EditCommit) -> Result<i64, MetadataError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;

        let mut sets: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        let mut set = |column: &str, value: Value| {
            values.push(value);
            sets.push(format!("{} = ?{}", column, values.len()));
        };

        let patch = &commit.patch;
        if let Some(title) = &patch.title {
            set("title", Value::Text(title.clone()));
        }
        if let Some(author) = &patch.author {
            set("chart_author", Value::Text(author.clone()));
        }
        if let Some(artists) = &patch.artists {
            set("artists", Value::Text(artists.clone()));
        }
        if let Some(rating) = patch.rating {
            set("rating", Value::Integer(i64::from(rating)));
        }
        if let Some(tags) = &patch.tags {
            let tags = serde_json::to_string(tags).context("Failed to encode tags")?;
            set("tags", Value::Text(tags));
        }
        match patch.description_change() {
            DescriptionChange::Keep => {}
            DescriptionChange::Clear => set("description", Value::Null),
            DescriptionChange::Set(text) => set("description", Value::Text(text.to_string())),
        }
        for update in &commit.updates {
            if update.hash.is_none() && !update.slot.is_optional() {
                return Err(MetadataError::Backend(anyhow!(
                    "refusing to clear required slot {}",
                    update.slot
                )));
            }
            set(update.slot.column(), hash_value(update.hash.as_ref()));
        }

        values.push(Value::Text(commit.chart.to_string()));
        let id_param = values.len();
        values.push(Value::Integer(commit.expected_revision));
        let revision_param = values.len();

        sets.push("revision = revision + 1".to_string());
        sets.push("updated_at = datetime('now')".to_string());
        let sql = format!(
            "UPDATE charts SET {} WHERE id = ?{} AND revision = ?{}",
            sets.join(", "),
            id_param,
            revision_param
        );

        let changed = tx
            .execute(&sql, params_from_iter(values))
            .context("Failed to update chart")?;
        if changed == 0 {
            let exists: bool = tx
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM charts WHERE id = ?1)",
                    [commit.chart.as_str()],
                    |row| row.get(0),
                )
                .context("Failed to check chart")?;
            return Err(if exists {
                MetadataError::Conflict {
                    chart: commit.chart.clone(),
                    expected: commit.expected_revision,
                }
            } else {
                MetadataError::NotFound(commit.chart.clone())
            });
        }

        if commit.reset_leaderboards {
            let removed = tx
                .execute(
                    "DELETE FROM leaderboards WHERE chart_id = ?1",
                    [commit.chart.as_str()],
                )
                .context("Failed to reset leaderboard")?;
            debug!(chart.id = %commit.chart, removed, "leaderboard reset");
        }

        tx.commit().context("Failed to commit chart edit")?;
        Ok(commit.expected_revision + 1)
    }

    /// Record a leaderboard entry for a chart.
    pub fn add_leaderboard_entry(&self, id: &ChartId, submitter: &str, score: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO leaderboards (chart_id, submitter, score) VALUES (?1, ?2, ?3)",
            (id.as_str(), submitter, score),
        )?;
        Ok(())
    }

    pub fn leaderboard_len(&self, id: &ChartId) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM leaderboards WHERE chart_id = ?1",
            [id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

/// [`MetadataStore`] over [`ChartDb`], running each call on the blocking pool.
#[derive(Clone)]
pub struct SqliteMetadataStore {
    db: Arc<ChartDb>,
}

impl SqliteMetadataStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            db: Arc::new(ChartDb::open(path)?),
        })
    }

    pub fn db(&self) -> &ChartDb {
        &self.db
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, MetadataError>
    where
        F: FnOnce(&ChartDb) -> Result<T, MetadataError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .context("Metadata task panicked")?
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn create_chart(&self, record: &ChartRecord) -> Result<(), MetadataError> {
        let record = record.clone();
        self.blocking(move |db| db.create_chart(&record)).await
    }

    async fn get_chart(&self, id: &ChartId) -> Result<Option<ChartRecord>, MetadataError> {
        let id = id.clone();
        self.blocking(move |db| db.get_chart(&id)).await
    }

    async fn commit_edit(&self, commit: &EditCommit) -> Result<i64, MetadataError> {
        let commit = commit.clone();
        self.blocking(move |db| db.commit_edit(&commit)).await
    }
}
