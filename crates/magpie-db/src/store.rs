//! SQLite-backed record store.
//!
//! Implements the merge-upsert policy: every incoming field overwrites the
//! stored one except the identifier and the two creation timestamps, which
//! are immutable once set. A later corrupted re-fetch can therefore never
//! alter a record's historical anchor.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder};

use magpie_core::error::AppError;
use magpie_core::record::Record;
use magpie_core::traits::RecordStore;

/// Database row shape; `record_id` maps to [`Record::id`].
#[derive(Debug, FromRow)]
struct RecordRow {
    collection: String,
    record_id: String,
    author: String,
    author_premium: bool,
    title: String,
    selftext: String,
    ups: i64,
    downs: i64,
    num_comments: i64,
    total_awards_received: i64,
    view_count: i64,
    subreddit_subscribers: i64,
    upvote_ratio: f64,
    removed: bool,
    created: i64,
    created_utc: i64,
    permalink: String,
    url: String,
}

impl From<RecordRow> for Record {
    fn from(row: RecordRow) -> Self {
        Record {
            id: row.record_id,
            collection: row.collection,
            author: row.author,
            author_premium: row.author_premium,
            title: row.title,
            selftext: row.selftext,
            ups: row.ups,
            downs: row.downs,
            num_comments: row.num_comments,
            total_awards_received: row.total_awards_received,
            view_count: row.view_count,
            subreddit_subscribers: row.subreddit_subscribers,
            upvote_ratio: row.upvote_ratio,
            removed: row.removed,
            created: row.created,
            created_utc: row.created_utc,
            permalink: row.permalink,
            url: row.url,
        }
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    collection            TEXT NOT NULL,
    record_id             TEXT NOT NULL,
    author                TEXT NOT NULL DEFAULT '',
    author_premium        INTEGER NOT NULL DEFAULT 0,
    title                 TEXT NOT NULL DEFAULT '',
    selftext              TEXT NOT NULL DEFAULT '',
    ups                   INTEGER NOT NULL DEFAULT 0,
    downs                 INTEGER NOT NULL DEFAULT 0,
    num_comments          INTEGER NOT NULL DEFAULT 0,
    total_awards_received INTEGER NOT NULL DEFAULT 0,
    view_count            INTEGER NOT NULL DEFAULT 0,
    subreddit_subscribers INTEGER NOT NULL DEFAULT 0,
    upvote_ratio          REAL NOT NULL DEFAULT 1.0,
    removed               INTEGER NOT NULL DEFAULT 0,
    created               INTEGER NOT NULL,
    created_utc           INTEGER NOT NULL,
    permalink             TEXT NOT NULL DEFAULT '',
    url                   TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (collection, record_id)
);

CREATE INDEX IF NOT EXISTS idx_records_collection_created
    ON records (collection, created_utc);
"#;

/// SQLite implementation of [`RecordStore`].
///
/// Cloning shares the underlying connection pool.
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Connection pool size. SQLite serializes writes anyway; a handful of
    /// connections covers concurrent reads.
    const MAX_CONNECTIONS: u32 = 5;

    /// Opens (creating if missing) the database at `path` and ensures the
    /// schema exists.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DatabaseError` if the file cannot be opened or
    /// the schema cannot be created.
    pub async fn connect(path: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(Self::MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;

        tracing::debug!(path, "Opened record store");
        Ok(store)
    }

    /// Opens an in-memory database, for tests.
    pub async fn in_memory() -> Result<Self, AppError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), AppError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Number of stored records for a collection.
    pub async fn count(&self, collection: &str) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM records WHERE collection = ?")
                .bind(collection)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

impl RecordStore for SqliteRecordStore {
    /// Inserts or merge-updates a batch in one transaction.
    ///
    /// `created` and `created_utc` keep their stored values on conflict;
    /// every other field takes the incoming value.
    async fn upsert_many(&self, collection: &str, records: &[Record]) -> Result<usize, AppError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO records (
                    collection, record_id, author, author_premium, title,
                    selftext, ups, downs, num_comments, total_awards_received,
                    view_count, subreddit_subscribers, upvote_ratio, removed,
                    created, created_utc, permalink, url
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (collection, record_id)
                DO UPDATE SET
                    author = excluded.author,
                    author_premium = excluded.author_premium,
                    title = excluded.title,
                    selftext = excluded.selftext,
                    ups = excluded.ups,
                    downs = excluded.downs,
                    num_comments = excluded.num_comments,
                    total_awards_received = excluded.total_awards_received,
                    view_count = excluded.view_count,
                    subreddit_subscribers = excluded.subreddit_subscribers,
                    upvote_ratio = excluded.upvote_ratio,
                    removed = excluded.removed,
                    permalink = excluded.permalink,
                    url = excluded.url
                "#,
            )
            .bind(collection)
            .bind(&record.id)
            .bind(&record.author)
            .bind(record.author_premium)
            .bind(&record.title)
            .bind(&record.selftext)
            .bind(record.ups)
            .bind(record.downs)
            .bind(record.num_comments)
            .bind(record.total_awards_received)
            .bind(record.view_count)
            .bind(record.subreddit_subscribers)
            .bind(record.upvote_ratio)
            .bind(record.removed)
            .bind(record.created)
            .bind(record.created_utc)
            .bind(&record.permalink)
            .bind(&record.url)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(records.len())
    }

    async fn select(
        &self,
        collection: &str,
        range: Option<(i64, i64)>,
        include_removed: bool,
    ) -> Result<Vec<Record>, AppError> {
        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("SELECT * FROM records WHERE collection = ");
        builder.push_bind(collection);

        if let Some((start, end)) = range {
            builder.push(" AND created_utc >= ");
            builder.push_bind(start);
            builder.push(" AND created_utc < ");
            builder.push_bind(end);
        }
        if !include_removed {
            builder.push(" AND removed = 0");
        }
        builder.push(" ORDER BY created_utc ASC");

        let rows: Vec<RecordRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Record::from).collect())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
