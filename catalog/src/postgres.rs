//! The production [`MetadataCatalog`]: a `sqlx` connection pool against Postgres.
//!
//! The "assign if absent" race of §4.2 step 5 is pushed into the database itself via a
//! single `INSERT ... ON CONFLICT ... DO UPDATE ... WHERE ... RETURNING` statement,
//! rather than an application-level read-then-write — Postgres resolves concurrent
//! assigns to the same `(file_id, chunk_id)` without any extra locking on our side.

use async_trait::async_trait;
use clock::Time;
use data_types::{ChunkId, ChunkPlacementRow, FileId, WorkerId};
use observability_deps::tracing::debug;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::interface::{MetadataCatalog, QuerySnafu, Result, SaveOutcome};
use snafu::ResultExt;

#[derive(Debug)]
pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    /// Connect to `dsn` and run the schema migrations bundled with this crate.
    pub async fn connect(dsn: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new().max_connections(10).connect(dsn).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Wrap an already-connected, already-migrated pool (used by tests that share one
    /// pool across several catalogs).
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataCatalog for PostgresCatalog {
    async fn find_by_filename(&self, filename: &str) -> Result<Option<ChunkPlacementRow>> {
        sqlx::query_as::<_, ChunkPlacementRow>(
            r#"
            SELECT file_id, chunk_id, filename, size, worker_id, worker_address, upload_time
            FROM file_metadata
            WHERE filename = $1
            ORDER BY file_id, chunk_id
            LIMIT 1
            "#,
        )
        .bind(filename)
        .fetch_optional(&self.pool)
        .await
        .context(QuerySnafu)
    }

    async fn find_all_by_file_id(&self, file_id: &FileId) -> Result<Vec<ChunkPlacementRow>> {
        sqlx::query_as::<_, ChunkPlacementRow>(
            r#"
            SELECT file_id, chunk_id, filename, size, worker_id, worker_address, upload_time
            FROM file_metadata
            WHERE file_id = $1
            "#,
        )
        .bind(file_id.as_str())
        .fetch_all(&self.pool)
        .await
        .context(QuerySnafu)
    }

    async fn find_by_file_id_and_chunk_id(
        &self,
        file_id: &FileId,
        chunk_id: ChunkId,
    ) -> Result<Option<ChunkPlacementRow>> {
        sqlx::query_as::<_, ChunkPlacementRow>(
            r#"
            SELECT file_id, chunk_id, filename, size, worker_id, worker_address, upload_time
            FROM file_metadata
            WHERE file_id = $1 AND chunk_id = $2
            "#,
        )
        .bind(file_id.as_str())
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await
        .context(QuerySnafu)
    }

    async fn create_placeholder(
        &self,
        file_id: &FileId,
        filename: &str,
        size: i64,
        upload_time: Time,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO file_metadata (file_id, chunk_id, filename, size, worker_id, worker_address, upload_time)
            VALUES ($1, 0, $2, $3, NULL, NULL, $4)
            ON CONFLICT (file_id, chunk_id) DO NOTHING
            "#,
        )
        .bind(file_id.as_str())
        .bind(filename)
        .bind(size)
        .bind(upload_time.timestamp_nanos())
        .execute(&self.pool)
        .await
        .context(QuerySnafu)?;
        Ok(())
    }

    async fn assign(
        &self,
        file_id: &FileId,
        chunk_id: ChunkId,
        filename: &str,
        size: i64,
        worker_id: &WorkerId,
        worker_address: &str,
        upload_time: Time,
    ) -> Result<SaveOutcome> {
        let won = sqlx::query_as::<_, ChunkPlacementRow>(
            r#"
            INSERT INTO file_metadata (file_id, chunk_id, filename, size, worker_id, worker_address, upload_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (file_id, chunk_id) DO UPDATE
                SET worker_id = EXCLUDED.worker_id,
                    worker_address = EXCLUDED.worker_address,
                    upload_time = EXCLUDED.upload_time
                WHERE file_metadata.worker_id IS NULL
            RETURNING file_id, chunk_id, filename, size, worker_id, worker_address, upload_time
            "#,
        )
        .bind(file_id.as_str())
        .bind(chunk_id)
        .bind(filename)
        .bind(size)
        .bind(worker_id.as_str())
        .bind(worker_address)
        .bind(upload_time.timestamp_nanos())
        .fetch_optional(&self.pool)
        .await
        .context(QuerySnafu)?;

        match won {
            Some(row) => Ok(SaveOutcome::Inserted(row)),
            None => {
                debug!(%file_id, chunk_id, "assign lost the race, reading back the winner");
                let existing = self
                    .find_by_file_id_and_chunk_id(file_id, chunk_id)
                    .await?
                    .expect("a row must exist: our own insert either won or lost to one");
                Ok(SaveOutcome::AlreadyExists(existing))
            }
        }
    }
}
