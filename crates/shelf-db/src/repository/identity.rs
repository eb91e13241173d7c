//! # Identity Repository
//!
//! Durable barcode → storefront product identity map.
//!
//! ## Data Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Identity Store                                   │
//! │                                                                         │
//! │  sync_aggregates                      variant_links                    │
//! │  ┌──────────────────────────┐        ┌──────────────────────────────┐  │
//! │  │ id          (uuid)       │ 1    * │ id        (uuid)             │  │
//! │  │ external_id (storefront) │◄───────│ owner_id  (never reassigned) │  │
//! │  │ created_at / updated_at  │        │ barcode   UNIQUE             │  │
//! │  └────────────┬─────────────┘        │ deleted   (soft delete)      │  │
//! │               │ 1                    │ on_storefront                │  │
//! │               │                      └──────────────────────────────┘  │
//! │               ▼ *                                                       │
//! │  sync_aggregate_tags (aggregate_id, position, tag)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Transactions
//! Writes go through [`IdentityTx`], one transaction per catalog item.
//! Dropping an `IdentityTx` without `commit()` rolls it back.
//!
//! In-memory databases have a single connection: while an `IdentityTx`
//! is open, use its methods rather than the repository's, or the pool
//! will wait for a connection that is never returned.

use chrono::Utc;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use shelf_core::{IdentityRecord, VariantLink};

const SELECT_AGGREGATE_BY_ID: &str =
    "SELECT id, external_id, created_at, updated_at FROM sync_aggregates WHERE id = ?1";

const SELECT_AGGREGATE_BY_EXTERNAL_ID: &str =
    "SELECT id, external_id, created_at, updated_at FROM sync_aggregates WHERE external_id = ?1";

const SELECT_LINK_BY_BARCODE: &str = "SELECT id, owner_id, barcode, deleted, on_storefront, created_at, updated_at \
     FROM variant_links WHERE barcode = ?1";

const SELECT_LINKS_BY_OWNER: &str = "SELECT id, owner_id, barcode, deleted, on_storefront, created_at, updated_at \
     FROM variant_links WHERE owner_id = ?1 ORDER BY created_at ASC, barcode ASC";

// =============================================================================
// Upsert Outcome
// =============================================================================

/// Result of a find-or-create write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert<T> {
    Created(T),
    Existing(T),
}

impl<T> Upsert<T> {
    pub fn was_created(&self) -> bool {
        matches!(self, Upsert::Created(_))
    }

    pub fn get(&self) -> &T {
        match self {
            Upsert::Created(value) | Upsert::Existing(value) => value,
        }
    }
}

// =============================================================================
// Shared Queries
// =============================================================================

async fn fetch_aggregate(
    conn: &mut SqliteConnection,
    sql: &str,
    key: &str,
) -> DbResult<Option<IdentityRecord>> {
    let record = sqlx::query_as::<_, IdentityRecord>(sql)
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;

    match record {
        Some(mut record) => {
            record.tags = sqlx::query_scalar::<_, String>(
                "SELECT tag FROM sync_aggregate_tags WHERE aggregate_id = ?1 ORDER BY position ASC",
            )
            .bind(&record.id)
            .fetch_all(&mut *conn)
            .await?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

async fn fetch_link(conn: &mut SqliteConnection, barcode: &str) -> DbResult<Option<VariantLink>> {
    let link = sqlx::query_as::<_, VariantLink>(SELECT_LINK_BY_BARCODE)
        .bind(barcode)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(link)
}

async fn fetch_links_of(conn: &mut SqliteConnection, owner_id: &str) -> DbResult<Vec<VariantLink>> {
    let links = sqlx::query_as::<_, VariantLink>(SELECT_LINKS_BY_OWNER)
        .bind(owner_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(links)
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for identity aggregates and variant links.
#[derive(Debug, Clone)]
pub struct IdentityRepository {
    pool: SqlitePool,
}

impl IdentityRepository {
    /// Creates a new IdentityRepository.
    pub fn new(pool: SqlitePool) -> Self {
        IdentityRepository { pool }
    }

    /// Opens a write scope.
    pub async fn begin(&self) -> DbResult<IdentityTx> {
        let tx = self.pool.begin().await?;
        Ok(IdentityTx { tx })
    }

    pub async fn find_aggregate(&self, id: &str) -> DbResult<Option<IdentityRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_aggregate(&mut conn, SELECT_AGGREGATE_BY_ID, id).await
    }

    pub async fn find_aggregate_by_external_id(
        &self,
        external_id: &str,
    ) -> DbResult<Option<IdentityRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_aggregate(&mut conn, SELECT_AGGREGATE_BY_EXTERNAL_ID, external_id).await
    }

    pub async fn find_link_by_barcode(&self, barcode: &str) -> DbResult<Option<VariantLink>> {
        let mut conn = self.pool.acquire().await?;
        fetch_link(&mut conn, barcode).await
    }

    /// All links of one aggregate, deleted ones included.
    pub async fn links_of(&self, aggregate_id: &str) -> DbResult<Vec<VariantLink>> {
        let mut conn = self.pool.acquire().await?;
        fetch_links_of(&mut conn, aggregate_id).await
    }

    pub async fn count_aggregates(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_aggregates")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Counts links, deleted ones included.
    pub async fn count_links(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM variant_links")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Transaction Scope
// =============================================================================

/// One identity-store write scope.
pub struct IdentityTx {
    tx: Transaction<'static, Sqlite>,
}

impl IdentityTx {
    pub async fn find_aggregate(&mut self, id: &str) -> DbResult<Option<IdentityRecord>> {
        fetch_aggregate(&mut self.tx, SELECT_AGGREGATE_BY_ID, id).await
    }

    pub async fn find_aggregate_by_external_id(
        &mut self,
        external_id: &str,
    ) -> DbResult<Option<IdentityRecord>> {
        fetch_aggregate(&mut self.tx, SELECT_AGGREGATE_BY_EXTERNAL_ID, external_id).await
    }

    pub async fn find_link_by_barcode(&mut self, barcode: &str) -> DbResult<Option<VariantLink>> {
        fetch_link(&mut self.tx, barcode).await
    }

    pub async fn links_of(&mut self, aggregate_id: &str) -> DbResult<Vec<VariantLink>> {
        fetch_links_of(&mut self.tx, aggregate_id).await
    }

    /// Inserts a new aggregate with its tags.
    pub async fn insert_aggregate(
        &mut self,
        external_id: Option<&str>,
        tags: &[String],
    ) -> DbResult<IdentityRecord> {
        let now = Utc::now();
        let record = IdentityRecord {
            id: Uuid::new_v4().to_string(),
            external_id: external_id.map(str::to_string),
            tags: tags.to_vec(),
            created_at: now,
            updated_at: now,
        };

        debug!(aggregate_id = %record.id, external_id = ?record.external_id, "Inserting aggregate");

        sqlx::query(
            "INSERT INTO sync_aggregates (id, external_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&record.id)
        .bind(&record.external_id)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DbError::from(e).with_value(external_id.unwrap_or_default()))?;

        for (position, tag) in record.tags.iter().enumerate() {
            sqlx::query(
                "INSERT INTO sync_aggregate_tags (aggregate_id, position, tag) VALUES (?1, ?2, ?3)",
            )
            .bind(&record.id)
            .bind(position as i64)
            .bind(tag)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(record)
    }

    /// Finds the aggregate for a storefront id or creates it with `tags`.
    ///
    /// Tags are only written on creation.
    pub async fn upsert_aggregate(
        &mut self,
        external_id: &str,
        tags: &[String],
    ) -> DbResult<Upsert<IdentityRecord>> {
        match self.find_aggregate_by_external_id(external_id).await? {
            Some(record) => Ok(Upsert::Existing(record)),
            None => {
                let record = self.insert_aggregate(Some(external_id), tags).await?;
                Ok(Upsert::Created(record))
            }
        }
    }

    /// Inserts a new link owned by `owner_id`.
    ///
    /// `on_storefront` records whether the barcode came from the owner's
    /// storefront product or from a POS variation.
    ///
    /// ## Errors
    /// [`DbError::UniqueViolation`] when the barcode is already linked.
    pub async fn insert_link(
        &mut self,
        owner_id: &str,
        barcode: &str,
        on_storefront: bool,
    ) -> DbResult<VariantLink> {
        let now = Utc::now();
        let link = VariantLink {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            barcode: barcode.to_string(),
            deleted: false,
            on_storefront,
            created_at: now,
            updated_at: now,
        };

        debug!(owner_id = %owner_id, barcode = %barcode, "Inserting variant link");

        sqlx::query(
            r#"
            INSERT INTO variant_links (id, owner_id, barcode, deleted, on_storefront, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&link.id)
        .bind(&link.owner_id)
        .bind(&link.barcode)
        .bind(link.deleted)
        .bind(link.on_storefront)
        .bind(link.created_at)
        .bind(link.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| DbError::from(e).with_value(barcode))?;

        Ok(link)
    }

    /// Returns the link for `barcode`, creating one under `owner_id` if none
    /// exists. An existing link is returned as-is whoever owns it.
    pub async fn upsert_link(
        &mut self,
        owner_id: &str,
        barcode: &str,
        on_storefront: bool,
    ) -> DbResult<Upsert<VariantLink>> {
        match self.find_link_by_barcode(barcode).await? {
            Some(link) => Ok(Upsert::Existing(link)),
            None => Ok(Upsert::Created(self.insert_link(owner_id, barcode, on_storefront).await?)),
        }
    }

    /// Records that the link's barcode is carried by the owner's storefront product.
    pub async fn mark_on_storefront(&mut self, link_id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE variant_links SET on_storefront = 1, updated_at = ?2 WHERE id = ?1")
            .bind(link_id)
            .bind(Utc::now())
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("VariantLink", link_id));
        }
        Ok(())
    }

    /// Sets or clears the soft-delete flag.
    pub async fn set_link_deleted(&mut self, link_id: &str, deleted: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE variant_links SET deleted = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(link_id)
            .bind(deleted)
            .bind(Utc::now())
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("VariantLink", link_id));
        }
        Ok(())
    }

    /// Bumps the aggregate's `updated_at`.
    pub async fn touch_aggregate(&mut self, aggregate_id: &str) -> DbResult<()> {
        sqlx::query("UPDATE sync_aggregates SET updated_at = ?2 WHERE id = ?1")
            .bind(aggregate_id)
            .bind(Utc::now())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn commit(self) -> DbResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> DbResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
