// SPDX-License-Identifier: GPL-3.0-or-later
//! Generic key/value cache table backing C3 (spec §4.5, §4.8).

use anyhow::Result;
use chrono::Utc;
use sqlx::Row;
use tracing::debug;

use crate::model::parse_dt;
use crate::Db;

impl Db {
    /// Returns `None` both when the key is absent and when it has expired,
    /// deleting the expired row lazily so a stale entry never lingers past
    /// the point it's next looked up.
    pub async fn get_cache(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT value, expires_at FROM cache_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at: Option<String> = row.try_get("expires_at")?;
        if let Some(ts) = expires_at {
            if parse_dt(&ts)? <= Utc::now() {
                debug!(target: "db", key, "evicting expired cache entry");
                self.clear_cache(key).await?;
                return Ok(None);
            }
        }

        Ok(Some(row.try_get("value")?))
    }

    pub async fn set_cache(&self, key: &str, value: &[u8], ttl: Option<chrono::Duration>) -> Result<()> {
        let expires_at = ttl.map(|d| (Utc::now() + d).to_rfc3339());
        sqlx::query(
            "INSERT INTO cache_entries (key, value, expires_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn clear_cache(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM cache_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes every entry whose key starts with `prefix` (e.g. a
    /// namespace like `"artist:"`), used to empty one component's slice of
    /// the shared cache table without touching another's.
    pub async fn clear_cache_prefix(&self, prefix: &str) -> Result<()> {
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        sqlx::query("DELETE FROM cache_entries WHERE key LIKE ? ESCAPE '\\'")
            .bind(pattern)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes every expired row regardless of whether it's been looked up;
    /// used by periodic maintenance rather than the request path.
    pub async fn purge_expired_cache(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= ?")
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
