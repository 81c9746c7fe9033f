//! # Cache Store
//!
//! Durable memory of previously exported entities and of per-series provider
//! info, keyed by account and entity id.
//!
//! Writers to the same key are serialized through a per-key async lock so that
//! concurrent account or series tasks never interleave updates of one record.

use crate::error::{LibraryError, Result};
use crate::models::{CacheKey, CacheRecord, EntityKind, EntitySnapshot, ProviderInfo};
use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>>;

    /// Insert or replace a record
    async fn put(&self, record: &CacheRecord) -> Result<()>;

    async fn delete(&self, key: &CacheKey) -> Result<()>;

    /// Remove every record and provider info of an account, returning the
    /// number of entity records removed
    async fn clear_account(&self, account: &str) -> Result<u64>;

    /// All records of one kind for an account
    async fn list_account(&self, account: &str, kind: EntityKind) -> Result<Vec<CacheRecord>>;

    async fn get_provider_info(&self, account: &str, series_id: i64)
        -> Result<Option<ProviderInfo>>;

    async fn put_provider_info(&self, account: &str, info: &ProviderInfo) -> Result<()>;
}

/// SQLite-backed [`CacheStore`]
pub struct SqliteCacheStore {
    pool: Pool<Sqlite>,
    locks: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl SqliteCacheStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self {
            pool,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Lock for one key; entries nobody holds any more are dropped first
    async fn key_lock(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<CacheRecord> {
        let kind: String = row.try_get("kind")?;
        let kind = kind
            .parse::<EntityKind>()
            .map_err(|message| LibraryError::InvalidInput {
                field: "kind".to_string(),
                message,
            })?;
        let snapshot: String = row.try_get("snapshot")?;
        let snapshot: EntitySnapshot = serde_json::from_str(&snapshot)?;
        let missed_passes: i64 = row.try_get("missed_passes")?;

        Ok(CacheRecord {
            account: row.try_get("account")?,
            kind,
            entity_id: row.try_get("entity_id")?,
            parent_id: row.try_get("parent_id")?,
            snapshot,
            fingerprint: row.try_get("fingerprint")?,
            metadata_fingerprint: row.try_get("metadata_fingerprint")?,
            missed_passes: missed_passes.max(0) as u32,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>> {
        let row = sqlx::query(
            "SELECT * FROM cache_records WHERE account = ? AND kind = ? AND entity_id = ?",
        )
        .bind(&key.account)
        .bind(key.kind.as_str())
        .bind(&key.entity_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    #[instrument(skip(self, record), fields(key = %record.key()))]
    async fn put(&self, record: &CacheRecord) -> Result<()> {
        let lock = self.key_lock(&record.key()).await;
        let _guard = lock.lock().await;

        let snapshot = serde_json::to_string(&record.snapshot)?;
        sqlx::query(
            r#"
            INSERT INTO cache_records (
                account, kind, entity_id, parent_id, snapshot, fingerprint,
                metadata_fingerprint, missed_passes, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(account, kind, entity_id) DO UPDATE SET
                parent_id = excluded.parent_id,
                snapshot = excluded.snapshot,
                fingerprint = excluded.fingerprint,
                metadata_fingerprint = excluded.metadata_fingerprint,
                missed_passes = excluded.missed_passes,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.account)
        .bind(record.kind.as_str())
        .bind(&record.entity_id)
        .bind(&record.parent_id)
        .bind(snapshot)
        .bind(&record.fingerprint)
        .bind(&record.metadata_fingerprint)
        .bind(record.missed_passes as i64)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        debug!("Cache record stored");
        Ok(())
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn delete(&self, key: &CacheKey) -> Result<()> {
        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;

        sqlx::query("DELETE FROM cache_records WHERE account = ? AND kind = ? AND entity_id = ?")
            .bind(&key.account)
            .bind(key.kind.as_str())
            .bind(&key.entity_id)
            .execute(&self.pool)
            .await?;

        debug!("Cache record deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear_account(&self, account: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM cache_records WHERE account = ?")
            .bind(account)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM provider_info WHERE account = ?")
            .bind(account)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(removed, "Cleared account cache");
        Ok(removed)
    }

    async fn list_account(&self, account: &str, kind: EntityKind) -> Result<Vec<CacheRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM cache_records WHERE account = ? AND kind = ? ORDER BY entity_id",
        )
        .bind(account)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn get_provider_info(
        &self,
        account: &str,
        series_id: i64,
    ) -> Result<Option<ProviderInfo>> {
        let row = sqlx::query("SELECT payload FROM provider_info WHERE account = ? AND series_id = ?")
            .bind(account)
            .bind(series_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let payload: String = row.try_get("payload")?;
                Ok(Some(serde_json::from_str(&payload)?))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, info), fields(series_id = info.series_id))]
    async fn put_provider_info(&self, account: &str, info: &ProviderInfo) -> Result<()> {
        let key = CacheKey::new(account, EntityKind::Series, &format!("info:{}", info.series_id));
        let lock = self.key_lock(&key).await;
        let _guard = lock.lock().await;

        let payload = serde_json::to_string(info)?;
        let source = serde_json::to_value(info.source)?;
        sqlx::query(
            r#"
            INSERT INTO provider_info (account, series_id, source, payload, updated_at)
            VALUES (?, ?, ?, ?, strftime('%s', 'now'))
            ON CONFLICT(account, series_id) DO UPDATE SET
                source = excluded.source,
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(account)
        .bind(info.series_id)
        .bind(source.as_str().unwrap_or("primary"))
        .bind(payload)
        .execute(&self.pool)
        .await?;

        debug!(episodes = info.episodes.len(), "Provider info stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{EpisodeInfo, InfoSource, TargetPath};
    use std::path::PathBuf;

    async fn store() -> SqliteCacheStore {
        SqliteCacheStore::new(create_test_pool().await.unwrap())
    }

    fn record(account: &str, kind: EntityKind, id: &str) -> CacheRecord {
        let dir = PathBuf::from(format!("/vod/{}/Movies/Drama/{}", account, id));
        let snapshot = EntitySnapshot {
            title: id.to_string(),
            year: Some(2001),
            category: "Drama".to_string(),
            stream_url: Some(format!("http://host/proxy/vod/movie/{}", id)),
            target: TargetPath {
                root: PathBuf::from(format!("/vod/{}/Movies", account)),
                pointer: Some(dir.join(format!("{}.strm", id))),
                nfo: dir.join("movie.nfo"),
                poster: None,
                fanart: None,
                dir,
            },
        };
        CacheRecord::new(account, kind, id, snapshot, 1_700_000_000)
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let store = store().await;
        let mut rec = record("Demo", EntityKind::Movie, "42");
        rec.metadata_fingerprint = Some("meta".to_string());

        store.put(&rec).await.unwrap();
        let loaded = store.get(&rec.key()).await.unwrap();
        assert_eq!(loaded, Some(rec.clone()));

        rec.missed_passes = 1;
        store.put(&rec).await.unwrap();
        let loaded = store.get(&rec.key()).await.unwrap().unwrap();
        assert_eq!(loaded.missed_passes, 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = store().await;
        let key = CacheKey::new("Demo", EntityKind::Movie, "nope");
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let store = store().await;
        store.put(&record("Demo", EntityKind::Movie, "1")).await.unwrap();
        store.put(&record("Demo", EntityKind::Movie, "2")).await.unwrap();
        store
            .put(&record("Demo", EntityKind::Episode, "5:S01E01").with_parent("5"))
            .await
            .unwrap();

        let movies = store.list_account("Demo", EntityKind::Movie).await.unwrap();
        assert_eq!(movies.len(), 2);

        store
            .delete(&CacheKey::new("Demo", EntityKind::Movie, "1"))
            .await
            .unwrap();
        let movies = store.list_account("Demo", EntityKind::Movie).await.unwrap();
        assert_eq!(movies.len(), 1);

        let episodes = store.list_account("Demo", EntityKind::Episode).await.unwrap();
        assert_eq!(episodes[0].parent_id.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn test_clear_account_is_scoped() {
        let store = store().await;
        store.put(&record("Demo", EntityKind::Movie, "1")).await.unwrap();
        store.put(&record("Other", EntityKind::Movie, "1")).await.unwrap();
        store
            .put_provider_info("Demo", &ProviderInfo::primary(5, Vec::new()))
            .await
            .unwrap();

        let removed = store.clear_account("Demo").await.unwrap();
        assert_eq!(removed, 1);
        assert!(store
            .list_account("Demo", EntityKind::Movie)
            .await
            .unwrap()
            .is_empty());
        assert!(store.get_provider_info("Demo", 5).await.unwrap().is_none());
        assert_eq!(
            store.list_account("Other", EntityKind::Movie).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_provider_info_round_trip() {
        let store = store().await;
        let info = ProviderInfo {
            series_id: 9,
            episodes: vec![EpisodeInfo {
                id: "e1".to_string(),
                season: 1,
                episode: 2,
                title: "Two".to_string(),
                stream_url: "http://x/2".to_string(),
                plot: None,
                air_date: None,
            }],
            source: InfoSource::Merged,
        };

        store.put_provider_info("Demo", &info).await.unwrap();
        assert_eq!(store.get_provider_info("Demo", 9).await.unwrap(), Some(info));
    }

    #[tokio::test]
    async fn test_concurrent_puts_to_same_key() {
        let store = Arc::new(store().await);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let mut rec = record("Demo", EntityKind::Movie, "1");
                    rec.missed_passes = i;
                    store.put(&rec).await.unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        let all = store.list_account("Demo", EntityKind::Movie).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_released_key_locks_are_dropped() {
        let store = store().await;
        for id in 0..50 {
            let rec = record("Demo", EntityKind::Movie, &id.to_string());
            store.put(&rec).await.unwrap();
            store.delete(&rec.key()).await.unwrap();
        }
        assert!(store.locks.lock().await.len() <= 1);

        let held = store.key_lock(&CacheKey::new("Demo", EntityKind::Movie, "held")).await;
        store.put(&record("Demo", EntityKind::Movie, "other")).await.unwrap();
        let locks = store.locks.lock().await;
        assert!(locks.contains_key(&CacheKey::new("Demo", EntityKind::Movie, "held")));
        assert_eq!(locks.len(), 2);
        drop(locks);
        drop(held);
    }
}
