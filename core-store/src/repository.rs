//! Sample queue repository
//!
//! The single writer of the `synced` flag. Capture appends, the sync engine reads
//! the unsynced backlog and flips rows once the collector acknowledged them.

use crate::error::Result;
use crate::models::{NewSample, Sample, SampleId, SampleRow};
use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info, instrument};

/// Ids per `UPDATE ... IN (...)` statement, below SQLite's bind parameter limit
const MARK_CHUNK_SIZE: usize = 500;

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Persist a sample with `synced = false` and return its id
    ///
    /// An explicit id that already exists replaces the row, which also resets it
    /// to unsynced.
    ///
    /// # Errors
    ///
    /// Returns error if the sample fails validation or the write fails.
    async fn append(&self, sample: &NewSample) -> Result<SampleId>;

    /// Every unsynced sample, oldest capture first, insertion order on ties
    async fn list_unsynced(&self) -> Result<Vec<Sample>>;

    /// Mark the given samples as delivered, all or nothing
    ///
    /// Unknown and already-synced ids are ignored.
    ///
    /// # Returns
    ///
    /// Number of rows that changed from unsynced to synced.
    async fn mark_synced(&self, ids: &[SampleId]) -> Result<u64>;

    /// Number of unsynced samples, consistent with [`list_unsynced`](Self::list_unsynced)
    async fn count_unsynced(&self) -> Result<u64>;

    async fn find_by_id(&self, id: SampleId) -> Result<Option<Sample>>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

pub struct SqliteSampleStore {
    pool: SqlitePool,
}

impl SqliteSampleStore {
    /// Wrap a pool created by [`create_pool`](crate::db::create_pool); the schema
    /// must already be migrated.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SampleStore for SqliteSampleStore {
    #[instrument(skip(self, sample), fields(captured_at = sample.captured_at_millis))]
    async fn append(&self, sample: &NewSample) -> Result<SampleId> {
        sample.validate()?;

        let result = sqlx::query(
            r#"
            INSERT OR REPLACE INTO samples (
                id, subject_id, latitude, longitude, accuracy,
                captured_at_millis, speed, synced, insert_seq
            )
            VALUES (
                ?, ?, ?, ?, ?, ?, ?, 0,
                (SELECT COALESCE(MAX(insert_seq), 0) + 1 FROM samples)
            )
            "#,
        )
        .bind(sample.id.map(|id| id.0))
        .bind(&sample.subject_id)
        .bind(sample.latitude)
        .bind(sample.longitude)
        .bind(f64::from(sample.accuracy))
        .bind(sample.captured_at_millis)
        .bind(sample.speed.map(f64::from))
        .execute(&self.pool)
        .await?;

        let id = SampleId(result.last_insert_rowid());
        debug!(sample_id = %id, "Sample appended");
        Ok(id)
    }

    async fn list_unsynced(&self) -> Result<Vec<Sample>> {
        let rows: Vec<SampleRow> = sqlx::query_as(
            r#"
            SELECT id, subject_id, latitude, longitude, accuracy,
                   captured_at_millis, speed, synced
            FROM samples
            WHERE synced = 0
            ORDER BY captured_at_millis ASC, insert_seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Sample::from).collect())
    }

    #[instrument(skip(self, ids), fields(batch_size = ids.len()))]
    async fn mark_synced(&self, ids: &[SampleId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut changed = 0;

        for chunk in ids.chunks(MARK_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("UPDATE samples SET synced = 1 WHERE synced = 0 AND id IN (");
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(id.0);
            }
            separated.push_unseparated(")");

            changed += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;

        info!(requested = ids.len(), changed, "Samples marked synced");
        Ok(changed)
    }

    async fn count_unsynced(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM samples WHERE synced = 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn find_by_id(&self, id: SampleId) -> Result<Option<Sample>> {
        let row: Option<SampleRow> = sqlx::query_as(
            r#"
            SELECT id, subject_id, latitude, longitude, accuracy,
                   captured_at_millis, speed, synced
            FROM samples
            WHERE id = ?
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Sample::from))
    }
}
