//! 待同步转换记录队列数据访问层（DAO）
//!
//! 整个队列以 JSON 数组形式保存在同一个 key 下，保持插入顺序。
//! 所有操作都在同一把锁内完成，保证并发入队不丢记录。
//!
//! 存储内容损坏时不阻塞离线记录：无法解析的内容移到隔离 key
//! （`pendingConversions.corrupt.<毫秒时间戳>`），队列按剩余可用记录继续。

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::converter::errors::StorageError;
use crate::converter::record::models::ConversionRecord;
use crate::converter::serialization::{decode_json_array_lenient, encode_json};
use crate::converter::storage::KeyValueStore;

/// 队列在键值存储中的 key
pub const PENDING_CONVERSIONS_KEY: &str = "pendingConversions";

/// 隔离 key 前缀
pub const QUARANTINE_KEY_PREFIX: &str = "pendingConversions.corrupt.";

/// 待同步队列 DAO
pub struct PendingQueueDao {
    store: Arc<dyn KeyValueStore>,
    lock: Mutex<()>,
}

impl PendingQueueDao {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// 读取队列，调用方必须持有锁
    async fn read(&self) -> Result<Vec<ConversionRecord>, StorageError> {
        let raw = self.store.get(PENDING_CONVERSIONS_KEY).await?;

        match decode_json_array_lenient::<ConversionRecord>(PENDING_CONVERSIONS_KEY, raw.as_deref()) {
            Ok(decoded) if decoded.rejected.is_empty() => Ok(decoded.items),
            Ok(decoded) => {
                warn!(
                    "[QueueDAO] 队列中有 {} 条记录无法解析，移入隔离区",
                    decoded.rejected.len()
                );
                let rejected = encode_json(PENDING_CONVERSIONS_KEY, &decoded.rejected)?;
                self.quarantine(&rejected).await?;
                self.write(&decoded.items).await?;
                Ok(decoded.items)
            }
            Err(e) => {
                error!("[QueueDAO] 待同步队列已损坏，移入隔离区后重建: {}", e);
                self.quarantine(raw.as_deref().unwrap_or_default()).await?;
                self.write(&[]).await?;
                Ok(Vec::new())
            }
        }
    }

    async fn quarantine(&self, raw: &str) -> Result<(), StorageError> {
        let key = format!("{}{}", QUARANTINE_KEY_PREFIX, Utc::now().timestamp_millis());
        self.store.set(&key, raw).await?;
        info!("[QueueDAO] 损坏内容已保存到 {}", key);
        Ok(())
    }

    async fn write(&self, records: &[ConversionRecord]) -> Result<(), StorageError> {
        let json = encode_json(PENDING_CONVERSIONS_KEY, &records)?;
        self.store.set(PENDING_CONVERSIONS_KEY, &json).await
    }

    /// 追加到队尾，存储确认写入后才返回
    pub async fn enqueue(&self, record: &ConversionRecord) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read().await?;
        records.push(record.clone());
        self.write(&records).await?;
        debug!(
            "[QueueDAO] 记录 {} 已入队，当前队列长度 {}",
            record.id,
            records.len()
        );
        Ok(())
    }

    /// 按插入顺序返回全部待同步记录
    pub async fn list_all(&self) -> Result<Vec<ConversionRecord>, StorageError> {
        let _guard = self.lock.lock().await;
        let records = self.read().await?;
        debug!("[QueueDAO] 读取待同步队列，共 {} 条", records.len());
        Ok(records)
    }

    /// 清空队列（写入空数组）
    pub async fn clear_all(&self) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        self.write(&[]).await?;
        info!("[QueueDAO] 待同步队列已清空");
        Ok(())
    }

    /// 只移除已确认提交的记录，flush 期间新入队的记录保留到下一次
    pub async fn remove_ids(&self, ids: &HashSet<String>) -> Result<usize, StorageError> {
        let _guard = self.lock.lock().await;
        let records = self.read().await?;
        let before = records.len();
        let remaining: Vec<ConversionRecord> = records
            .into_iter()
            .filter(|r| !ids.contains(&r.id))
            .collect();
        self.write(&remaining).await?;
        let removed = before - remaining.len();
        info!(
            "[QueueDAO] 移除已同步记录 {} 条，剩余 {} 条",
            removed,
            remaining.len()
        );
        Ok(removed)
    }

    /// 当前队列长度
    pub async fn len(&self) -> Result<usize, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.len())
    }
}
