//! 本地持久化键值存储
//!
//! 值统一为 JSON 字符串。`set` 在底层存储确认写入后才返回。

use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::converter::errors::StorageError;

/// 持久化键值存储接口
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// 基于 SQLite（sqlx）的键值存储，表结构由迁移创建
pub struct SqliteKeyValueStore {
    db: Pool<Sqlite>,
}

impl SqliteKeyValueStore {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| {
                error!("[KVStore] 读取 key={} 失败: {:?}", key, e);
                StorageError::from(e)
            })?;

        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let sql = r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, strftime('%s', 'now'))
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
        "#;

        sqlx::query(sql)
            .bind(key)
            .bind(value)
            .execute(&self.db)
            .await
            .map_err(|e| {
                error!("[KVStore] 写入 key={} 失败: {:?}", key, e);
                StorageError::from(e)
            })?;

        debug!("[KVStore] 写入 key={}，长度 {}", key, value.len());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.db)
            .await
            .map_err(|e| {
                error!("[KVStore] 删除 key={} 失败: {:?}", key, e);
                StorageError::from(e)
            })?;
        Ok(())
    }
}

/// 内存键值存储（测试、访客临时会话使用），进程退出即丢失
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前所有 key（排序后返回）
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
