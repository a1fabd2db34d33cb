//! Postgres-backed stores.
//!
//! One connection pool serves every store trait. Aggregates are persisted as
//! JSONB payloads; the columns the schedulers filter on (status, lease
//! expiry, created_at) are materialized alongside so claims stay indexable.
//! Claiming uses `FOR UPDATE SKIP LOCKED` so concurrent schedulers never
//! fight over the same page.
//!
//! The store traits are synchronous; this adapter owns a small Tokio runtime
//! and bridges with `block_on`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tokio::runtime::Runtime;
use uuid::Uuid;

use lineguard_core::{CanonicalItemId, Currency, ExplanationId, LineItemId, WorkerId};
use lineguard_events::AuditEntry;
use lineguard_items::{Explanation, LineItem, LineItemEvent, LineItemStatus};
use lineguard_pricing::{ExternalPriceObservation, PriceRange, RangeAdjustmentProposal};

use super::{
    ExplanationStore, LineItemStore, ObservationStore, PriceRangeStore, ProposalStore, StoreError,
    ValidationEventLog,
};

/// Schema expected by this adapter. Applied by `ensure_schema`, idempotent.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS line_items (
    line_item_id     UUID PRIMARY KEY,
    status           TEXT NOT NULL,
    lease_owner      UUID,
    lease_expires_at TIMESTAMPTZ,
    created_at       TIMESTAMPTZ NOT NULL,
    payload          JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_line_items_status ON line_items (status, created_at);

CREATE TABLE IF NOT EXISTS price_ranges (
    canonical_item_id UUID NOT NULL,
    currency          TEXT NOT NULL,
    payload           JSONB NOT NULL,
    PRIMARY KEY (canonical_item_id, currency)
);

CREATE TABLE IF NOT EXISTS external_price_sources (
    vendor_id  UUID NOT NULL,
    source_url TEXT NOT NULL,
    payload    JSONB NOT NULL,
    PRIMARY KEY (vendor_id, source_url)
);

CREATE TABLE IF NOT EXISTS explanations (
    explanation_id UUID PRIMARY KEY,
    line_item_id   UUID NOT NULL,
    submitted_at   TIMESTAMPTZ NOT NULL,
    payload        JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_explanations_item ON explanations (line_item_id, submitted_at);

CREATE TABLE IF NOT EXISTS range_proposals (
    proposal_id UUID PRIMARY KEY,
    created_at  TIMESTAMPTZ NOT NULL,
    payload     JSONB NOT NULL
);

CREATE TABLE IF NOT EXISTS validation_events (
    entry_id        UUID PRIMARY KEY,
    line_item_id    UUID NOT NULL,
    sequence_number BIGINT NOT NULL,
    recorded_at     TIMESTAMPTZ NOT NULL,
    payload         JSONB NOT NULL,
    UNIQUE (line_item_id, sequence_number)
);
"#;

/// All store traits over one Postgres pool.
#[derive(Debug, Clone)]
pub struct PostgresStores {
    pool: Arc<PgPool>,
    runtime: Arc<Runtime>,
}

impl PostgresStores {
    pub fn new(pool: PgPool) -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(StoreError::backend)?;
        Ok(Self {
            pool: Arc::new(pool),
            runtime: Arc::new(runtime),
        })
    }

    pub fn connect(database_url: &str) -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(StoreError::backend)?;
        let pool = runtime
            .block_on(
                PgPoolOptions::new()
                    .max_connections(8)
                    .connect(database_url),
            )
            .map_err(StoreError::backend)?;
        Ok(Self {
            pool: Arc::new(pool),
            runtime: Arc::new(runtime),
        })
    }

    /// Create any missing tables and indexes.
    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        self.runtime.block_on(async {
            sqlx::raw_sql(SCHEMA_SQL)
                .execute(&*self.pool)
                .await
                .map_err(StoreError::backend)?;
            Ok(())
        })
    }

    fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
        serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn from_json<T: serde::de::DeserializeOwned>(
        value: serde_json::Value,
    ) -> Result<T, StoreError> {
        serde_json::from_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

impl LineItemStore for PostgresStores {
    fn insert(&self, item: &LineItem) -> Result<(), StoreError> {
        let payload = Self::to_json(item)?;
        self.runtime.block_on(async {
            sqlx::query(
                r#"
                INSERT INTO line_items
                    (line_item_id, status, lease_owner, lease_expires_at, created_at, payload)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(item.line_item_id.as_uuid())
            .bind(item.status.as_str())
            .bind(item.lease.map(|l| *l.owner.as_uuid()))
            .bind(item.lease.map(|l| l.expires_at))
            .bind(item.created_at)
            .bind(payload)
            .execute(&*self.pool)
            .await
            .map_err(StoreError::backend)?;
            Ok(())
        })
    }

    fn get(&self, id: LineItemId) -> Result<Option<LineItem>, StoreError> {
        self.runtime.block_on(async {
            let row = sqlx::query("SELECT payload FROM line_items WHERE line_item_id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&*self.pool)
                .await
                .map_err(StoreError::backend)?;
            row.map(|r| Self::from_json(r.get::<serde_json::Value, _>("payload")))
                .transpose()
        })
    }

    fn update(&self, item: &LineItem) -> Result<(), StoreError> {
        let payload = Self::to_json(item)?;
        self.runtime.block_on(async {
            let result = sqlx::query(
                r#"
                UPDATE line_items
                SET status = $2, lease_owner = $3, lease_expires_at = $4, payload = $5
                WHERE line_item_id = $1
                "#,
            )
            .bind(item.line_item_id.as_uuid())
            .bind(item.status.as_str())
            .bind(item.lease.map(|l| *l.owner.as_uuid()))
            .bind(item.lease.map(|l| l.expires_at))
            .bind(payload)
            .execute(&*self.pool)
            .await
            .map_err(StoreError::backend)?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(item.line_item_id.to_string()));
            }
            Ok(())
        })
    }

    fn claim_batch(
        &self,
        status: LineItemStatus,
        worker: WorkerId,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LineItem>, StoreError> {
        self.runtime.block_on(async {
            let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

            let rows = sqlx::query(
                r#"
                SELECT payload FROM line_items
                WHERE status = $1
                  AND (lease_expires_at IS NULL OR lease_expires_at <= $2)
                ORDER BY created_at ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
                "#,
            )
            .bind(status.as_str())
            .bind(now)
            .bind(limit as i64)
            .fetch_all(&mut *tx)
            .await
            .map_err(StoreError::backend)?;

            let mut claimed = Vec::with_capacity(rows.len());
            for row in rows {
                let mut item: LineItem = Self::from_json(row.get("payload"))?;
                if !item.try_acquire_lease(worker, now) {
                    continue;
                }
                let payload = Self::to_json(&item)?;
                sqlx::query(
                    r#"
                    UPDATE line_items
                    SET lease_owner = $2, lease_expires_at = $3, payload = $4
                    WHERE line_item_id = $1
                    "#,
                )
                .bind(item.line_item_id.as_uuid())
                .bind(item.lease.map(|l| *l.owner.as_uuid()))
                .bind(item.lease.map(|l| l.expires_at))
                .bind(payload)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::backend)?;
                claimed.push(item);
            }

            tx.commit().await.map_err(StoreError::backend)?;
            Ok(claimed)
        })
    }

    fn release_lease(&self, id: LineItemId, worker: WorkerId) -> Result<(), StoreError> {
        self.runtime.block_on(async {
            let row = sqlx::query("SELECT payload FROM line_items WHERE line_item_id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&*self.pool)
                .await
                .map_err(StoreError::backend)?;
            let Some(row) = row else {
                return Ok(());
            };
            let mut item: LineItem = Self::from_json(row.get("payload"))?;
            item.release_lease(worker);
            let payload = Self::to_json(&item)?;
            sqlx::query(
                r#"
                UPDATE line_items
                SET lease_owner = $2, lease_expires_at = $3, payload = $4
                WHERE line_item_id = $1
                "#,
            )
            .bind(id.as_uuid())
            .bind(item.lease.map(|l| *l.owner.as_uuid()))
            .bind(item.lease.map(|l| l.expires_at))
            .bind(payload)
            .execute(&*self.pool)
            .await
            .map_err(StoreError::backend)?;
            Ok(())
        })
    }
}

impl PriceRangeStore for PostgresStores {
    fn get(
        &self,
        canonical_item_id: CanonicalItemId,
        currency: &Currency,
    ) -> Result<Option<PriceRange>, StoreError> {
        self.runtime.block_on(async {
            let row = sqlx::query(
                "SELECT payload FROM price_ranges WHERE canonical_item_id = $1 AND currency = $2",
            )
            .bind(canonical_item_id.as_uuid())
            .bind(currency.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(StoreError::backend)?;
            row.map(|r| Self::from_json(r.get::<serde_json::Value, _>("payload")))
                .transpose()
        })
    }

    fn upsert(&self, range: &PriceRange) -> Result<(), StoreError> {
        let payload = Self::to_json(range)?;
        self.runtime.block_on(async {
            sqlx::query(
                r#"
                INSERT INTO price_ranges (canonical_item_id, currency, payload)
                VALUES ($1, $2, $3)
                ON CONFLICT (canonical_item_id, currency) DO UPDATE SET payload = $3
                "#,
            )
            .bind(range.canonical_item_id.as_uuid())
            .bind(range.currency.as_str())
            .bind(payload)
            .execute(&*self.pool)
            .await
            .map_err(StoreError::backend)?;
            Ok(())
        })
    }
}

impl ObservationStore for PostgresStores {
    fn record(&self, observation: &ExternalPriceObservation) -> Result<(), StoreError> {
        let payload = Self::to_json(observation)?;
        self.runtime.block_on(async {
            sqlx::query(
                r#"
                INSERT INTO external_price_sources (vendor_id, source_url, payload)
                VALUES ($1, $2, $3)
                ON CONFLICT (vendor_id, source_url) DO UPDATE SET payload = $3
                "#,
            )
            .bind(observation.vendor_id.as_uuid())
            .bind(&observation.source_url)
            .bind(payload)
            .execute(&*self.pool)
            .await
            .map_err(StoreError::backend)?;
            Ok(())
        })
    }

    fn all(&self) -> Result<Vec<ExternalPriceObservation>, StoreError> {
        self.runtime.block_on(async {
            let rows = sqlx::query("SELECT payload FROM external_price_sources")
                .fetch_all(&*self.pool)
                .await
                .map_err(StoreError::backend)?;
            rows.into_iter()
                .map(|r| Self::from_json(r.get::<serde_json::Value, _>("payload")))
                .collect()
        })
    }
}

impl ExplanationStore for PostgresStores {
    fn insert(&self, explanation: &Explanation) -> Result<(), StoreError> {
        let payload = Self::to_json(explanation)?;
        self.runtime.block_on(async {
            sqlx::query(
                r#"
                INSERT INTO explanations (explanation_id, line_item_id, submitted_at, payload)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(explanation.explanation_id.as_uuid())
            .bind(explanation.line_item_id.as_uuid())
            .bind(explanation.submitted_at)
            .bind(payload)
            .execute(&*self.pool)
            .await
            .map_err(StoreError::backend)?;
            Ok(())
        })
    }

    fn update(&self, explanation: &Explanation) -> Result<(), StoreError> {
        let payload = Self::to_json(explanation)?;
        self.runtime.block_on(async {
            let result = sqlx::query(
                "UPDATE explanations SET payload = $2 WHERE explanation_id = $1",
            )
            .bind(explanation.explanation_id.as_uuid())
            .bind(payload)
            .execute(&*self.pool)
            .await
            .map_err(StoreError::backend)?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(explanation.explanation_id.to_string()));
            }
            Ok(())
        })
    }

    fn get(&self, id: ExplanationId) -> Result<Option<Explanation>, StoreError> {
        self.runtime.block_on(async {
            let row = sqlx::query("SELECT payload FROM explanations WHERE explanation_id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&*self.pool)
                .await
                .map_err(StoreError::backend)?;
            row.map(|r| Self::from_json(r.get::<serde_json::Value, _>("payload")))
                .transpose()
        })
    }

    fn latest_for_item(&self, line_item_id: LineItemId) -> Result<Option<Explanation>, StoreError> {
        self.runtime.block_on(async {
            let row = sqlx::query(
                r#"
                SELECT payload FROM explanations
                WHERE line_item_id = $1
                ORDER BY submitted_at DESC
                LIMIT 1
                "#,
            )
            .bind(line_item_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(StoreError::backend)?;
            row.map(|r| Self::from_json(r.get::<serde_json::Value, _>("payload")))
                .transpose()
        })
    }

    fn prior_feedback(&self, line_item_id: LineItemId) -> Result<Option<String>, StoreError> {
        self.runtime.block_on(async {
            let row = sqlx::query(
                r#"
                SELECT payload->>'rejection_reason' AS reason FROM explanations
                WHERE line_item_id = $1 AND payload->>'rejection_reason' IS NOT NULL
                ORDER BY submitted_at DESC
                LIMIT 1
                "#,
            )
            .bind(line_item_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(StoreError::backend)?;
            Ok(row.and_then(|r| r.get::<Option<String>, _>("reason")))
        })
    }
}

impl ProposalStore for PostgresStores {
    fn insert(&self, proposal: &RangeAdjustmentProposal) -> Result<(), StoreError> {
        let payload = Self::to_json(proposal)?;
        self.runtime.block_on(async {
            sqlx::query(
                r#"
                INSERT INTO range_proposals (proposal_id, created_at, payload)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(proposal.proposal_id.as_uuid())
            .bind(proposal.created_at)
            .bind(payload)
            .execute(&*self.pool)
            .await
            .map_err(StoreError::backend)?;
            Ok(())
        })
    }

    fn list(&self) -> Result<Vec<RangeAdjustmentProposal>, StoreError> {
        self.runtime.block_on(async {
            let rows = sqlx::query("SELECT payload FROM range_proposals ORDER BY created_at ASC")
                .fetch_all(&*self.pool)
                .await
                .map_err(StoreError::backend)?;
            rows.into_iter()
                .map(|r| Self::from_json(r.get::<serde_json::Value, _>("payload")))
                .collect()
        })
    }
}

/// Bounded retries when concurrent appenders race on a sequence number.
const APPEND_RETRIES: usize = 5;

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

impl ValidationEventLog for PostgresStores {
    fn append(&self, event: &LineItemEvent) -> Result<AuditEntry<LineItemEvent>, StoreError> {
        let payload = Self::to_json(event)?;
        let entry_id = Uuid::now_v7();
        let recorded_at = Utc::now();
        self.runtime.block_on(async {
            // Sequence assignment and insert are one statement, so the
            // UNIQUE (line_item_id, sequence_number) constraint arbitrates
            // between concurrent appenders; the loser re-reads the max.
            for _ in 0..APPEND_RETRIES {
                let result = sqlx::query(
                    r#"
                    INSERT INTO validation_events
                        (entry_id, line_item_id, sequence_number, recorded_at, payload)
                    SELECT $1, $2, COALESCE(MAX(sequence_number), 0) + 1, $3, $4
                    FROM validation_events
                    WHERE line_item_id = $2
                    RETURNING sequence_number
                    "#,
                )
                .bind(entry_id)
                .bind(event.line_item_id.as_uuid())
                .bind(recorded_at)
                .bind(&payload)
                .fetch_one(&*self.pool)
                .await;

                match result {
                    Ok(row) => {
                        let sequence = row.get::<i64, _>("sequence_number") as u64;
                        return Ok(AuditEntry::from_parts(
                            entry_id,
                            event.line_item_id,
                            sequence,
                            recorded_at,
                            event.clone(),
                        ));
                    }
                    Err(err) if is_unique_violation(&err) => continue,
                    Err(err) => return Err(StoreError::backend(err)),
                }
            }
            Err(StoreError::Backend(format!(
                "audit append contention for {}",
                event.line_item_id
            )))
        })
    }

    fn for_item(
        &self,
        line_item_id: LineItemId,
    ) -> Result<Vec<AuditEntry<LineItemEvent>>, StoreError> {
        self.runtime.block_on(async {
            let rows = sqlx::query(
                r#"
                SELECT entry_id, line_item_id, sequence_number, recorded_at, payload
                FROM validation_events
                WHERE line_item_id = $1
                ORDER BY sequence_number ASC
                "#,
            )
            .bind(line_item_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(StoreError::backend)?;

            rows.into_iter()
                .map(|r| {
                    let event: LineItemEvent = Self::from_json(r.get("payload"))?;
                    Ok(AuditEntry::from_parts(
                        r.get::<Uuid, _>("entry_id"),
                        line_item_id,
                        r.get::<i64, _>("sequence_number") as u64,
                        r.get::<DateTime<Utc>, _>("recorded_at"),
                        event,
                    ))
                })
                .collect()
        })
    }
}
