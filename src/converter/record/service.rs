//! 转换记录同步服务层
//!
//! 读取待同步队列快照，整体批量提交到后端，成功后只移除快照中的记录。
//! 状态机：Idle -> Flushing -> Idle，失败不清队列，等下一次网络恢复再试。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::converter::errors::SyncError;
use crate::converter::record::api::ConversionBackend;
use crate::converter::record::dao::PendingQueueDao;
use crate::converter::record::listener::{EmptySyncListener, SyncListener};
use crate::converter::record::models::{ConversionRecord, ConversionSyncerConfig, FlushOutcome};
use crate::converter::record::types::DocumentWrite;

/// 转换记录同步器
pub struct ConversionSyncer {
    config: ConversionSyncerConfig,
    dao: Arc<PendingQueueDao>,
    backend: Arc<dyn ConversionBackend>,
    listener: Arc<dyn SyncListener>,
    /// 同一时间只允许一个 flush
    flush_lock: Mutex<()>,
}

impl ConversionSyncer {
    /// 创建新的同步器（使用默认空监听器）
    pub fn new(
        config: ConversionSyncerConfig,
        dao: Arc<PendingQueueDao>,
        backend: Arc<dyn ConversionBackend>,
    ) -> Self {
        Self::with_listener(config, dao, backend, Arc::new(EmptySyncListener))
    }

    /// 创建新的同步器（带自定义监听器）
    pub fn with_listener(
        config: ConversionSyncerConfig,
        dao: Arc<PendingQueueDao>,
        backend: Arc<dyn ConversionBackend>,
        listener: Arc<dyn SyncListener>,
    ) -> Self {
        info!(
            "[SyncService] 创建同步器，用户ID: {:?}, 提交超时: {:?}",
            config.user_id, config.commit_timeout
        );
        Self {
            config,
            dao,
            backend,
            listener,
            flush_lock: Mutex::new(()),
        }
    }

    pub fn dao(&self) -> &Arc<PendingQueueDao> {
        &self.dao
    }

    /// 将快照转换为批量写入，同一 ID 只写一次（保留最后一条）
    fn build_writes(collection_path: &str, snapshot: Vec<ConversionRecord>) -> Vec<DocumentWrite> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut writes: Vec<DocumentWrite> = Vec::with_capacity(snapshot.len());

        for record in snapshot {
            let write = DocumentWrite {
                collection_path: collection_path.to_string(),
                document_id: record.id.clone(),
                document: record,
            };
            match index.get(&write.document_id) {
                Some(&i) => {
                    warn!("[SyncService] 队列中存在重复记录ID: {}", write.document_id);
                    writes[i] = write;
                }
                None => {
                    index.insert(write.document_id.clone(), writes.len());
                    writes.push(write);
                }
            }
        }
        writes
    }

    /// 在线时直接提交单条记录（不经过本地队列）
    pub async fn commit_record(&self, record: &ConversionRecord) -> Result<(), SyncError> {
        let Some(collection_path) = self.config.collection_path() else {
            return Err(SyncError::Backend("未登录，无法提交".to_string()));
        };
        let writes = Self::build_writes(&collection_path, vec![record.clone()]);

        match tokio::time::timeout(self.config.commit_timeout, self.backend.commit_batch(writes))
            .await
        {
            Ok(Ok(())) => {
                debug!("[SyncService] 记录 {} 已直接提交", record.id);
                Ok(())
            }
            Ok(Err(e)) => Err(SyncError::Backend(format!("{:#}", e))),
            Err(_) => Err(SyncError::Timeout(self.config.commit_timeout.as_millis())),
        }
    }

    /// 将待同步队列整体提交到后端（事件触发用）
    ///
    /// 已有 flush 在进行时立即返回 [`FlushOutcome::Coalesced`]。
    pub async fn flush(&self) -> Result<FlushOutcome, SyncError> {
        let Some(collection_path) = self.config.collection_path() else {
            debug!("[SyncService] 访客模式，跳过同步");
            return Ok(FlushOutcome::Skipped);
        };

        let _guard = match self.flush_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!("[SyncService] 已有同步进行中，本次触发被合并");
                return Ok(FlushOutcome::Coalesced);
            }
        };
        self.flush_snapshot(&collection_path).await
    }

    /// 显式同步：等待进行中的 flush 结束后再同步一次，不返回 `Coalesced`
    ///
    /// 调用方拿到结果时，调用前已入队的记录都已提交（或同步失败）。
    pub async fn flush_and_wait(&self) -> Result<FlushOutcome, SyncError> {
        let Some(collection_path) = self.config.collection_path() else {
            debug!("[SyncService] 访客模式，跳过同步");
            return Ok(FlushOutcome::Skipped);
        };

        let _guard = self.flush_lock.lock().await;
        self.flush_snapshot(&collection_path).await
    }

    /// 调用方必须持有 flush_lock
    async fn flush_snapshot(&self, collection_path: &str) -> Result<FlushOutcome, SyncError> {
        let snapshot = match self.dao.list_all().await {
            Ok(records) => records,
            Err(e) => {
                error!("[SyncService] 读取待同步队列失败: {}", e);
                self.listener.on_sync_failed(e.to_string()).await;
                return Err(SyncError::Storage(e));
            }
        };

        if snapshot.is_empty() {
            debug!("[SyncService] 队列为空，无需同步");
            return Ok(FlushOutcome::Empty);
        }

        let writes = Self::build_writes(collection_path, snapshot);
        let written = writes.len();
        let ids: HashSet<String> = writes.iter().map(|w| w.document_id.clone()).collect();

        info!("[SyncService] 🔄 开始同步，共 {} 条记录", written);
        self.listener.on_sync_start(written).await;

        let commit = tokio::time::timeout(
            self.config.commit_timeout,
            self.backend.commit_batch(writes),
        )
        .await;

        let failure = match commit {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(SyncError::Backend(format!("{:#}", e))),
            Err(_) => Some(SyncError::Timeout(self.config.commit_timeout.as_millis())),
        };
        if let Some(e) = failure {
            error!("[SyncService] ❌ 同步失败，队列保持不变: {}", e);
            self.listener.on_sync_failed(e.to_string()).await;
            return Err(e);
        }

        // 后端已提交；若此处移除失败，下次重复提交同一 ID 只会覆盖
        let removed = match self.dao.remove_ids(&ids).await {
            Ok(n) => n,
            Err(e) => {
                error!("[SyncService] 提交成功但清理本地队列失败: {}", e);
                self.listener.on_sync_failed(e.to_string()).await;
                return Err(SyncError::Storage(e));
            }
        };

        info!(
            "[SyncService] ✅ 同步完成，写入 {} 个文档，移除 {} 条记录",
            written, removed
        );
        self.listener.on_sync_finish(written).await;
        Ok(FlushOutcome::Flushed { written, removed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::errors::StorageError;
    use crate::converter::storage::MemoryKeyValueStore;
    use crate::converter::units::QuantityType;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Once;
    use std::time::Duration;
    use tokio::sync::Notify;

    static INIT_LOGGER: Once = Once::new();

    fn init_test_logger() {
        INIT_LOGGER.call_once(|| {
            use tracing_subscriber::prelude::*;
            use tracing_subscriber::EnvFilter;

            let filter_layer = EnvFilter::new("info,unit_converter_sdk_core=debug");

            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_test_writer();

            let _ = tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt_layer)
                .try_init();
        });
    }

    /// 记录所有写入的后端，可切换为失败模式
    #[derive(Default)]
    struct RecordingBackend {
        writes: std::sync::Mutex<Vec<DocumentWrite>>,
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl RecordingBackend {
        fn written_ids(&self) -> Vec<String> {
            self.writes
                .lock()
                .unwrap()
                .iter()
                .map(|w| w.document_id.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ConversionBackend for RecordingBackend {
        async fn commit_batch(&self, writes: Vec<DocumentWrite>) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(anyhow::anyhow!("backend rejected batch"));
            }
            self.writes.lock().unwrap().extend(writes);
            Ok(())
        }
    }

    /// 提交时阻塞，直到测试放行
    struct GatedBackend {
        entered: Notify,
        release: Notify,
        inner: RecordingBackend,
    }

    #[async_trait]
    impl ConversionBackend for GatedBackend {
        async fn commit_batch(&self, writes: Vec<DocumentWrite>) -> anyhow::Result<()> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.commit_batch(writes).await
        }
    }

    struct HangingBackend;

    #[async_trait]
    impl ConversionBackend for HangingBackend {
        async fn commit_batch(&self, _writes: Vec<DocumentWrite>) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingListener {
        started: AtomicUsize,
        finished: AtomicUsize,
        failed: AtomicUsize,
    }

    #[async_trait]
    impl SyncListener for CountingListener {
        async fn on_sync_start(&self, _pending: usize) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        async fn on_sync_finish(&self, _flushed: usize) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
        async fn on_sync_failed(&self, _error: String) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn record(id: &str) -> ConversionRecord {
        let mut r = ConversionRecord::new(QuantityType::Weight, "kg", "lb");
        r.id = id.to_string();
        r
    }

    fn new_dao() -> Arc<PendingQueueDao> {
        Arc::new(PendingQueueDao::new(Arc::new(MemoryKeyValueStore::new())))
    }

    fn user_config() -> ConversionSyncerConfig {
        ConversionSyncerConfig::new(Some("u1".to_string()))
    }

    async fn ids_in(dao: &PendingQueueDao) -> Vec<String> {
        dao.list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect()
    }

    #[tokio::test]
    async fn flush_twice_writes_each_record_once() {
        init_test_logger();
        let dao = new_dao();
        for id in ["a", "b", "c"] {
            dao.enqueue(&record(id)).await.unwrap();
        }
        let backend = Arc::new(RecordingBackend::default());
        let listener = Arc::new(CountingListener::default());
        let syncer =
            ConversionSyncer::with_listener(user_config(), dao.clone(), backend.clone(), listener.clone());

        assert_eq!(
            syncer.flush().await.unwrap(),
            FlushOutcome::Flushed { written: 3, removed: 3 }
        );
        assert_eq!(syncer.flush().await.unwrap(), FlushOutcome::Empty);

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.written_ids(), vec!["a", "b", "c"]);
        assert!(dao.list_all().await.unwrap().is_empty());
        assert_eq!(listener.started.load(Ordering::SeqCst), 1);
        assert_eq!(listener.finished.load(Ordering::SeqCst), 1);

        let paths: HashSet<String> = backend
            .writes
            .lock()
            .unwrap()
            .iter()
            .map(|w| w.collection_path.clone())
            .collect();
        assert_eq!(paths, HashSet::from(["users/u1/conversions".to_string()]));
    }

    #[tokio::test]
    async fn failed_batch_leaves_queue_intact() {
        init_test_logger();
        let dao = new_dao();
        for id in ["a", "b"] {
            dao.enqueue(&record(id)).await.unwrap();
        }
        let backend = Arc::new(RecordingBackend::default());
        backend.fail.store(true, Ordering::SeqCst);
        let listener = Arc::new(CountingListener::default());
        let syncer =
            ConversionSyncer::with_listener(user_config(), dao.clone(), backend.clone(), listener.clone());

        assert!(matches!(syncer.flush().await, Err(SyncError::Backend(_))));
        assert_eq!(ids_in(&dao).await, vec!["a", "b"]);
        assert_eq!(listener.failed.load(Ordering::SeqCst), 1);

        // 下一次触发时后端恢复
        backend.fail.store(false, Ordering::SeqCst);
        assert_eq!(
            syncer.flush().await.unwrap(),
            FlushOutcome::Flushed { written: 2, removed: 2 }
        );
        assert_eq!(backend.written_ids(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn guest_session_skips_sync() {
        let dao = new_dao();
        dao.enqueue(&record("a")).await.unwrap();
        let backend = Arc::new(RecordingBackend::default());
        let syncer = ConversionSyncer::new(ConversionSyncerConfig::new(None), dao.clone(), backend.clone());

        assert_eq!(syncer.flush().await.unwrap(), FlushOutcome::Skipped);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(ids_in(&dao).await, vec!["a"]);
    }

    #[tokio::test]
    async fn concurrent_flush_is_coalesced_and_late_enqueue_survives() {
        init_test_logger();
        let dao = new_dao();
        dao.enqueue(&record("a")).await.unwrap();
        dao.enqueue(&record("b")).await.unwrap();

        let backend = Arc::new(GatedBackend {
            entered: Notify::new(),
            release: Notify::new(),
            inner: RecordingBackend::default(),
        });
        let syncer = Arc::new(ConversionSyncer::new(user_config(), dao.clone(), backend.clone()));

        let first = {
            let syncer = syncer.clone();
            tokio::spawn(async move { syncer.flush().await })
        };
        backend.entered.notified().await;

        // 第一个 flush 仍在进行：第二次触发被合并，期间入队的记录不属于快照
        assert_eq!(syncer.flush().await.unwrap(), FlushOutcome::Coalesced);
        dao.enqueue(&record("late")).await.unwrap();

        backend.release.notify_one();
        assert_eq!(
            first.await.unwrap().unwrap(),
            FlushOutcome::Flushed { written: 2, removed: 2 }
        );

        assert_eq!(backend.inner.written_ids(), vec!["a", "b"]);
        assert_eq!(ids_in(&dao).await, vec!["late"]);
    }

    #[tokio::test]
    async fn duplicate_ids_are_written_once() {
        let dao = new_dao();
        dao.enqueue(&record("dup")).await.unwrap();
        dao.enqueue(&record("x")).await.unwrap();
        dao.enqueue(&record("dup")).await.unwrap();
        let backend = Arc::new(RecordingBackend::default());
        let syncer = ConversionSyncer::new(user_config(), dao.clone(), backend.clone());

        // 三条队列记录合并为两个文档写入，三条都从队列移除
        assert_eq!(
            syncer.flush().await.unwrap(),
            FlushOutcome::Flushed { written: 2, removed: 3 }
        );
        assert_eq!(backend.written_ids(), vec!["dup", "x"]);
        assert!(ids_in(&dao).await.is_empty());
    }

    #[tokio::test]
    async fn waiting_flush_runs_after_the_in_flight_one() {
        init_test_logger();
        let dao = new_dao();
        dao.enqueue(&record("a")).await.unwrap();

        let backend = Arc::new(GatedBackend {
            entered: Notify::new(),
            release: Notify::new(),
            inner: RecordingBackend::default(),
        });
        let syncer = Arc::new(ConversionSyncer::new(user_config(), dao.clone(), backend.clone()));

        let first = {
            let syncer = syncer.clone();
            tokio::spawn(async move { syncer.flush().await })
        };
        backend.entered.notified().await;
        dao.enqueue(&record("b")).await.unwrap();

        let second = {
            let syncer = syncer.clone();
            tokio::spawn(async move { syncer.flush_and_wait().await })
        };
        backend.release.notify_one();
        assert_eq!(
            first.await.unwrap().unwrap(),
            FlushOutcome::Flushed { written: 1, removed: 1 }
        );

        backend.entered.notified().await;
        backend.release.notify_one();
        assert_eq!(
            second.await.unwrap().unwrap(),
            FlushOutcome::Flushed { written: 1, removed: 1 }
        );
        assert_eq!(backend.inner.written_ids(), vec!["a", "b"]);
        assert!(ids_in(&dao).await.is_empty());
    }

    #[tokio::test]
    async fn hung_backend_times_out_without_clearing() {
        let dao = new_dao();
        dao.enqueue(&record("a")).await.unwrap();
        let mut config = user_config();
        config.commit_timeout = Duration::from_millis(50);
        let syncer = ConversionSyncer::new(config, dao.clone(), Arc::new(HangingBackend));

        assert!(matches!(syncer.flush().await, Err(SyncError::Timeout(50))));
        assert_eq!(ids_in(&dao).await, vec!["a"]);
    }

    struct UnreadableStore;

    #[async_trait]
    impl crate::converter::storage::KeyValueStore for UnreadableStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("locked".into()))
        }
        async fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("locked".into()))
        }
        async fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("locked".into()))
        }
    }

    #[tokio::test]
    async fn unreadable_queue_is_a_storage_sync_error() {
        let dao = Arc::new(PendingQueueDao::new(Arc::new(UnreadableStore)));
        let backend = Arc::new(RecordingBackend::default());
        let syncer = ConversionSyncer::new(user_config(), dao, backend.clone());

        assert!(matches!(syncer.flush().await, Err(SyncError::Storage(_))));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }
}
