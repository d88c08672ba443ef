//! SQLite implementation of IMirrorRepository
//!
//! ## Type Mapping
//!
//! | Domain Type            | SQL Type | Strategy                                   |
//! |------------------------|----------|--------------------------------------------|
//! | Provider               | TEXT     | `as_str()` / `FromStr`                     |
//! | WorkspaceId, RootId    | TEXT     | `as_str()` / `new()`                       |
//! | MirrorStatus           | TEXT     | `as_str()` / `FromStr`                     |
//! | counters (u64)         | INTEGER  | cast through `i64`                         |
//! | DateTime<Utc>          | TEXT     | `to_rfc3339()` / `parse_from_rfc3339()`    |
//! | lease expiry           | INTEGER  | unix milliseconds                          |
//! | LeaseId                | TEXT     | UUID string                                |

use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use mirrorsync_core::domain::{
    Lease, LeaseId, MirrorCounters, MirrorRecord, MirrorStatus, Provider, RemoteRoot, RootId,
    WorkspaceId,
};
use mirrorsync_core::ports::{CacheStageTotals, IMirrorRepository};

use crate::CacheError;

/// SQLite-based implementation of the mirror record repository port
pub struct SqliteMirrorRepository {
    pool: SqlitePool,
}

impl SqliteMirrorRepository {
    /// Creates a new repository instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

fn to_db(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn from_db(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

fn now_str() -> String {
    Utc::now().to_rfc3339()
}

/// Parse a DateTime<Utc> from an RFC 3339 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, CacheError> {
    s.as_deref().map(parse_datetime).transpose()
}

/// Reconstruct a MirrorRecord from a database row
fn record_from_row(row: &SqliteRow) -> Result<MirrorRecord, CacheError> {
    let provider_str: String = row.get("provider");
    let workspace_str: String = row.get("workspace_id");
    let root_id_str: String = row.get("root_id");
    let root_name: String = row.get("root_name");
    let root_path: String = row.get("root_path");
    let status_str: String = row.get("status");
    let created_at_str: String = row.get("created_at");
    let updated_at_str: String = row.get("updated_at");
    let last_sync_str: Option<String> = row.get("last_sync_at");
    let sync_error: Option<String> = row.get("sync_error");
    let lease_holder: Option<String> = row.get("lease_holder");
    let lease_expires_at: Option<i64> = row.get("lease_expires_at");

    let provider: Provider = provider_str.parse().map_err(|e| {
        CacheError::SerializationError(format!("Invalid provider '{}': {}", provider_str, e))
    })?;

    let workspace_id = WorkspaceId::new(workspace_str.clone()).map_err(|e| {
        CacheError::SerializationError(format!("Invalid WorkspaceId '{}': {}", workspace_str, e))
    })?;

    let root_id = RootId::new(root_id_str.clone()).map_err(|e| {
        CacheError::SerializationError(format!("Invalid RootId '{}': {}", root_id_str, e))
    })?;

    let status: MirrorStatus = status_str.parse().map_err(|e| {
        CacheError::SerializationError(format!("Invalid status '{}': {}", status_str, e))
    })?;

    let counters = MirrorCounters {
        total_files: from_db(row.get("total_files")),
        total_bytes: from_db(row.get("total_bytes")),
        cache_synced_files: from_db(row.get("cache_synced_files")),
        cache_synced_bytes: from_db(row.get("cache_synced_bytes")),
        workspace_synced_files: from_db(row.get("workspace_synced_files")),
        workspace_synced_bytes: from_db(row.get("workspace_synced_bytes")),
        large_files: from_db(row.get("large_files")),
        large_bytes: from_db(row.get("large_bytes")),
    };

    let lease = match (lease_holder, lease_expires_at) {
        (Some(holder), Some(expires_ms)) => {
            let holder: LeaseId = holder.parse().map_err(|e| {
                CacheError::SerializationError(format!("Invalid lease holder: {}", e))
            })?;
            let expires_at = Utc.timestamp_millis_opt(expires_ms).single().ok_or_else(|| {
                CacheError::SerializationError(format!("Invalid lease expiry {}", expires_ms))
            })?;
            Some(Lease { holder, expires_at })
        }
        _ => None,
    };

    let mut record = MirrorRecord::with_timestamps(
        provider,
        workspace_id,
        RemoteRoot::new(root_id, root_name, root_path),
        parse_datetime(&created_at_str)?,
        parse_datetime(&updated_at_str)?,
    );
    record.set_status(status);
    record.set_counters(counters);
    record.set_last_sync_at(parse_optional_datetime(last_sync_str)?);
    record.set_sync_error(sync_error);
    record.set_lease(lease);

    Ok(record)
}

// ============================================================================
// IMirrorRepository implementation
// ============================================================================

#[async_trait::async_trait]
impl IMirrorRepository for SqliteMirrorRepository {
    async fn get(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
    ) -> anyhow::Result<Option<MirrorRecord>> {
        let row = sqlx::query("SELECT * FROM mirror_records WHERE provider = ? AND workspace_id = ?")
            .bind(provider.as_str())
            .bind(workspace.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(record_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> anyhow::Result<Vec<MirrorRecord>> {
        let rows = sqlx::query("SELECT * FROM mirror_records ORDER BY provider, workspace_id")
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(record_from_row(row)?);
        }
        Ok(records)
    }

    async fn save(&self, record: &MirrorRecord) -> anyhow::Result<()> {
        let counters = record.counters();
        let root = record.root();

        sqlx::query(
            "INSERT INTO mirror_records \
             (provider, workspace_id, root_id, root_name, root_path, status, \
              total_files, total_bytes, cache_synced_files, cache_synced_bytes, \
              workspace_synced_files, workspace_synced_bytes, large_files, large_bytes, \
              last_sync_at, sync_error, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (provider, workspace_id) DO UPDATE SET \
              root_id = excluded.root_id, \
              root_name = excluded.root_name, \
              root_path = excluded.root_path, \
              status = excluded.status, \
              total_files = excluded.total_files, \
              total_bytes = excluded.total_bytes, \
              cache_synced_files = excluded.cache_synced_files, \
              cache_synced_bytes = excluded.cache_synced_bytes, \
              workspace_synced_files = excluded.workspace_synced_files, \
              workspace_synced_bytes = excluded.workspace_synced_bytes, \
              large_files = excluded.large_files, \
              large_bytes = excluded.large_bytes, \
              last_sync_at = excluded.last_sync_at, \
              sync_error = excluded.sync_error, \
              updated_at = excluded.updated_at",
        )
        .bind(record.provider().as_str())
        .bind(record.workspace_id().as_str())
        .bind(root.id.as_str())
        .bind(&root.name)
        .bind(&root.path)
        .bind(record.status().as_str())
        .bind(to_db(counters.total_files))
        .bind(to_db(counters.total_bytes))
        .bind(to_db(counters.cache_synced_files))
        .bind(to_db(counters.cache_synced_bytes))
        .bind(to_db(counters.workspace_synced_files))
        .bind(to_db(counters.workspace_synced_bytes))
        .bind(to_db(counters.large_files))
        .bind(to_db(counters.large_bytes))
        .bind(record.last_sync_at().map(|dt| dt.to_rfc3339()))
        .bind(record.sync_error())
        .bind(record.created_at().to_rfc3339())
        .bind(record.updated_at().to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::trace!(
            provider = %record.provider(),
            workspace = %record.workspace_id(),
            status = %record.status(),
            "Saved mirror record"
        );
        Ok(())
    }

    async fn delete(&self, provider: Provider, workspace: &WorkspaceId) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM mirror_records WHERE provider = ? AND workspace_id = ?")
            .bind(provider.as_str())
            .bind(workspace.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_status(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        status: MirrorStatus,
        sync_error: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE mirror_records SET status = ?, sync_error = ?, updated_at = ? \
             WHERE provider = ? AND workspace_id = ?",
        )
        .bind(status.as_str())
        .bind(sync_error)
        .bind(now_str())
        .bind(provider.as_str())
        .bind(workspace.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_cache_progress(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        files: u64,
        bytes: u64,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE mirror_records SET cache_synced_files = ?, cache_synced_bytes = ?, updated_at = ? \
             WHERE provider = ? AND workspace_id = ?",
        )
        .bind(to_db(files))
        .bind(to_db(bytes))
        .bind(now_str())
        .bind(provider.as_str())
        .bind(workspace.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn complete_cache_stage(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        totals: &CacheStageTotals,
        last_sync_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE mirror_records SET \
              total_files = ?, total_bytes = ?, \
              cache_synced_files = ?, cache_synced_bytes = ?, \
              large_files = ?, large_bytes = ?, \
              last_sync_at = ?, status = ?, sync_error = NULL, updated_at = ? \
             WHERE provider = ? AND workspace_id = ?",
        )
        .bind(to_db(totals.total_files))
        .bind(to_db(totals.total_bytes))
        .bind(to_db(totals.cache_synced_files))
        .bind(to_db(totals.cache_synced_bytes))
        .bind(to_db(totals.large_files))
        .bind(to_db(totals.large_bytes))
        .bind(last_sync_at.to_rfc3339())
        .bind(MirrorStatus::SyncingWorkspace.as_str())
        .bind(now_str())
        .bind(provider.as_str())
        .bind(workspace.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn restore_counters(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        counters: &MirrorCounters,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE mirror_records SET \
              total_files = ?, total_bytes = ?, \
              cache_synced_files = ?, cache_synced_bytes = ?, \
              workspace_synced_files = ?, workspace_synced_bytes = ?, \
              large_files = ?, large_bytes = ?, updated_at = ? \
             WHERE provider = ? AND workspace_id = ?",
        )
        .bind(to_db(counters.total_files))
        .bind(to_db(counters.total_bytes))
        .bind(to_db(counters.cache_synced_files))
        .bind(to_db(counters.cache_synced_bytes))
        .bind(to_db(counters.workspace_synced_files))
        .bind(to_db(counters.workspace_synced_bytes))
        .bind(to_db(counters.large_files))
        .bind(to_db(counters.large_bytes))
        .bind(now_str())
        .bind(provider.as_str())
        .bind(workspace.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_workspace_progress(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        files: u64,
        bytes: u64,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE mirror_records SET workspace_synced_files = ?, workspace_synced_bytes = ?, \
              updated_at = ? \
             WHERE provider = ? AND workspace_id = ?",
        )
        .bind(to_db(files))
        .bind(to_db(bytes))
        .bind(now_str())
        .bind(provider.as_str())
        .bind(workspace.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn try_acquire_lease(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        holder: LeaseId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE mirror_records SET lease_holder = ?, lease_expires_at = ? \
             WHERE provider = ? AND workspace_id = ? \
               AND (lease_holder IS NULL OR lease_expires_at IS NULL OR lease_expires_at <= ?)",
        )
        .bind(holder.to_string())
        .bind(expires_at.timestamp_millis())
        .bind(provider.as_str())
        .bind(workspace.as_str())
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        let acquired = result.rows_affected() == 1;
        tracing::debug!(
            provider = %provider,
            workspace = %workspace,
            holder = %holder,
            acquired,
            "Lease acquisition attempted"
        );
        Ok(acquired)
    }

    async fn extend_lease(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        holder: LeaseId,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE mirror_records SET lease_expires_at = ? \
             WHERE provider = ? AND workspace_id = ? AND lease_holder = ?",
        )
        .bind(expires_at.timestamp_millis())
        .bind(provider.as_str())
        .bind(workspace.as_str())
        .bind(holder.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_lease(
        &self,
        provider: Provider,
        workspace: &WorkspaceId,
        holder: LeaseId,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE mirror_records SET lease_holder = NULL, lease_expires_at = NULL \
             WHERE provider = ? AND workspace_id = ? AND lease_holder = ?",
        )
        .bind(provider.as_str())
        .bind(workspace.as_str())
        .bind(holder.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
