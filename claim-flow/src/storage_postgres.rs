use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgPoolOptions, types::Json};
use tracing::info;

use crate::{
    error::{ClaimError, Result},
    record::{ClaimRecord, ClaimVersion},
    storage::{ClaimRepository, ensure_same_claim},
};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS claim_versions (
    claim_id         TEXT        NOT NULL,
    issued_at_micros BIGINT      NOT NULL,
    version_seq      INTEGER     NOT NULL,
    status           TEXT        NOT NULL,
    record           JSONB       NOT NULL,
    created_at       TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (claim_id, issued_at_micros, version_seq)
)
"#;

/// PostgreSQL-backed ClaimRepository.
///
/// Appends for one claim are serialized with a transaction-scoped advisory
/// lock, so the strict-ordering check also holds across processes.
pub struct PostgresClaimRepository {
    pool: PgPool,
}

impl PostgresClaimRepository {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        let repository = Self::from_pool(pool);
        repository.migrate().await?;
        info!("Connected to PostgreSQL claim repository");
        Ok(repository)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

fn decode_version(micros: i64, sequence: i32) -> Result<ClaimVersion> {
    let sequence = u32::try_from(sequence)
        .map_err(|_| ClaimError::StorageError(format!("negative version sequence {sequence}")))?;
    ClaimVersion::from_parts(micros, sequence)
        .ok_or_else(|| ClaimError::StorageError(format!("timestamp out of range: {micros}")))
}

#[async_trait]
impl ClaimRepository for PostgresClaimRepository {
    async fn get_latest(&self, claim_id: &str) -> Result<Option<ClaimRecord>> {
        let row = sqlx::query(
            "SELECT record FROM claim_versions WHERE claim_id = $1 \
             ORDER BY issued_at_micros DESC, version_seq DESC LIMIT 1",
        )
        .bind(claim_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<ClaimRecord> {
            let Json(record): Json<ClaimRecord> = row.try_get("record")?;
            Ok(record)
        })
        .transpose()
    }

    async fn append(&self, claim_id: &str, record: ClaimRecord) -> Result<()> {
        ensure_same_claim(claim_id, &record)?;

        let sequence = i32::try_from(record.version.sequence).map_err(|_| {
            ClaimError::StorageError(format!("version sequence too large: {}", record.version))
        })?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(claim_id)
            .execute(&mut *tx)
            .await?;

        let latest = sqlx::query(
            "SELECT issued_at_micros, version_seq FROM claim_versions WHERE claim_id = $1 \
             ORDER BY issued_at_micros DESC, version_seq DESC LIMIT 1",
        )
        .bind(claim_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = latest {
            let latest = decode_version(row.try_get("issued_at_micros")?, row.try_get("version_seq")?)?;
            if record.version <= latest {
                // Dropping the transaction rolls it back and releases the lock.
                return Err(ClaimError::VersionConflict {
                    claim_id: claim_id.to_string(),
                    attempted: record.version,
                    latest,
                });
            }
        }

        sqlx::query(
            "INSERT INTO claim_versions (claim_id, issued_at_micros, version_seq, status, record) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(claim_id)
        .bind(record.version.issued_at_micros())
        .bind(sequence)
        .bind(record.status.as_str())
        .bind(Json(&record))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_versions(&self, claim_id: &str) -> Result<Vec<ClaimRecord>> {
        let rows = sqlx::query(
            "SELECT record FROM claim_versions WHERE claim_id = $1 \
             ORDER BY issued_at_micros ASC, version_seq ASC",
        )
        .bind(claim_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<ClaimRecord> {
                let Json(record): Json<ClaimRecord> = row.try_get("record")?;
                Ok(record)
            })
            .collect()
    }
}
