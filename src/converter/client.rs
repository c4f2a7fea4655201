//! 单位换算客户端核心实现模块
//!
//! 将换算函数、本地队列、同步器和网络监听组装在一起。配置通过
//! [`ClientConfig`] 显式传入，不使用全局可变状态。

use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::converter::auth::Session;
use crate::converter::convert::{format_result, parse_input};
use crate::converter::db::create_sqlite_pool_with_migration;
use crate::converter::errors::{ConvertError, StorageError, SyncError};
use crate::converter::network::{
    ConnectivityMonitor, HttpReachabilityProbe, ReachabilityProbe, SubscriptionId, SyncTrigger,
};
use crate::converter::record::{
    ConversionBackend, ConversionRecord, ConversionSyncer, ConversionSyncerConfig,
    EmptySyncListener, FlushOutcome, HttpConversionBackend, PendingQueueDao, SyncListener,
};
use crate::converter::storage::{KeyValueStore, SqliteKeyValueStore};
use crate::converter::units::QuantityType;

/// 客户端配置
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// 已认证用户 ID（访客为 None）
    pub user_id: Option<String>,
    /// 认证 token
    pub id_token: Option<String>,
    /// 后端文档存储 HTTP 地址
    pub api_base_url: String,
    /// 本地 SQLite 数据库 URL
    ///
    /// 例如：`sqlite://converter.db?mode=rwc`
    pub db_url: String,
    /// 连通性探测地址
    pub probe_url: String,
    /// 连通性探测间隔
    pub probe_interval: Duration,
    /// 后端批量提交超时
    pub commit_timeout: Duration,
    /// 本地存储不可用时内存暂存的最大记录数，超出时丢弃最旧的记录
    pub retry_buffer_capacity: usize,
}

impl ClientConfig {
    /// 创建默认配置
    pub fn new(user_id: String, id_token: String) -> Self {
        Self {
            user_id: Some(user_id),
            id_token: Some(id_token),
            ..Self::guest()
        }
    }

    /// 访客配置（不同步）
    pub fn guest() -> Self {
        Self {
            user_id: None,
            id_token: None,
            api_base_url: "http://localhost:8080".to_string(),
            db_url: "sqlite://converter.db?mode=rwc".to_string(),
            probe_url: "http://clients3.google.com/generate_204".to_string(),
            probe_interval: Duration::from_secs(5),
            commit_timeout: Duration::from_secs(15),
            retry_buffer_capacity: 256,
        }
    }

    /// 从当前会话生成配置
    pub fn from_session(session: &Session) -> Self {
        match (session.user_id(), session.id_token()) {
            (Some(uid), Some(token)) => Self::new(uid.to_string(), token.to_string()),
            _ => Self::guest(),
        }
    }

    pub fn is_guest(&self) -> bool {
        self.user_id.as_deref().map_or(true, str::is_empty)
    }

    fn syncer_config(&self) -> ConversionSyncerConfig {
        ConversionSyncerConfig {
            user_id: self.user_id.clone(),
            commit_timeout: self.commit_timeout,
        }
    }
}

/// 记录的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordDelivery {
    /// 在线，已直接提交到后端
    Committed,
    /// 已写入本地待同步队列
    Queued,
    /// 本地存储失败，暂存在内存中等待重试
    Buffered,
    /// 访客模式，不记录
    NotRecorded,
}

/// 一次换算的结果
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOutcome {
    pub value: f64,
    pub result: f64,
    /// 两位小数的展示文本
    pub display: String,
    pub delivery: RecordDelivery,
}

/// 单位换算客户端
pub struct ConverterClient {
    config: ClientConfig,
    dao: Arc<PendingQueueDao>,
    syncer: Arc<ConversionSyncer>,
    monitor: Arc<ConnectivityMonitor>,
    // 写入本地队列失败的记录，下次入队或同步时重试
    retry_buffer: Mutex<VecDeque<ConversionRecord>>,
    trigger_subscription: SubscriptionId,
}

impl ConverterClient {
    /// 使用 SQLite 存储和 HTTP 后端创建客户端
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        Self::connect_with_listener(config, Arc::new(EmptySyncListener)).await
    }

    /// 同上，带同步监听器
    pub async fn connect_with_listener(
        config: ClientConfig,
        listener: Arc<dyn SyncListener>,
    ) -> Result<Self> {
        info!(
            "[Client] 创建客户端，用户ID: {:?}, 数据库: {}",
            config.user_id, config.db_url
        );

        let pool = create_sqlite_pool_with_migration(&config.db_url).await?;
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteKeyValueStore::new(pool));

        let backend: Arc<dyn ConversionBackend> = match &config.id_token {
            Some(token) => Arc::new(HttpConversionBackend::with_token(
                config.api_base_url.clone(),
                token,
            )?),
            None => Arc::new(HttpConversionBackend::new(
                reqwest::Client::new(),
                config.api_base_url.clone(),
            )),
        };

        let probe: Arc<dyn ReachabilityProbe> = Arc::new(
            HttpReachabilityProbe::new(config.probe_url.clone(), Duration::from_secs(3))
                .context("创建连通性探测失败")?,
        );

        Ok(Self::with_parts(config, store, backend, probe, listener))
    }

    /// 用自定义的存储、后端和探测组装客户端；初始状态视为离线
    pub fn with_parts(
        config: ClientConfig,
        store: Arc<dyn KeyValueStore>,
        backend: Arc<dyn ConversionBackend>,
        probe: Arc<dyn ReachabilityProbe>,
        listener: Arc<dyn SyncListener>,
    ) -> Self {
        let dao = Arc::new(PendingQueueDao::new(store));
        let syncer = Arc::new(ConversionSyncer::with_listener(
            config.syncer_config(),
            dao.clone(),
            backend,
            listener,
        ));
        let monitor = Arc::new(ConnectivityMonitor::new(probe, false));
        let trigger_subscription = monitor.subscribe(Arc::new(SyncTrigger::new(syncer.clone())));

        Self {
            config,
            dao,
            syncer,
            monitor,
            retry_buffer: Mutex::new(VecDeque::new()),
            trigger_subscription,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    /// 推送式上报网络状态（平台回调调用）
    pub async fn set_online(&self, online: bool) -> bool {
        self.monitor.set_reachable(online).await
    }

    /// 启动后台连通性探测
    pub fn start_monitoring(&self) -> JoinHandle<()> {
        self.monitor.clone().spawn_polling(self.config.probe_interval)
    }

    /// 仅换算，不产生记录
    pub fn convert(
        &self,
        input: &str,
        ty: QuantityType,
        from: &str,
        to: &str,
    ) -> Result<f64, ConvertError> {
        crate::converter::convert::convert_input(input, ty, from, to)
    }

    /// 换算并记录
    ///
    /// 在线时直接提交；离线或提交失败时写入本地队列，等网络恢复再同步。
    pub async fn record_conversion(
        &self,
        input: &str,
        ty: QuantityType,
        from: &str,
        to: &str,
    ) -> Result<ConversionOutcome, ConvertError> {
        let value = parse_input(input)?;
        let result = crate::converter::convert::convert(value, ty, from, to)?;
        let display = format_result(result);

        let delivery = if self.config.is_guest() {
            RecordDelivery::NotRecorded
        } else {
            let record = ConversionRecord::new(ty, from, to).with_values(value, result);
            self.deliver(record).await
        };

        Ok(ConversionOutcome {
            value,
            result,
            display,
            delivery,
        })
    }

    async fn deliver(&self, record: ConversionRecord) -> RecordDelivery {
        self.retry_buffered().await;

        if self.monitor.is_online() {
            match self.syncer.commit_record(&record).await {
                Ok(()) => return RecordDelivery::Committed,
                Err(e) => warn!(
                    "[Client] 直接提交记录 {} 失败，转入本地队列: {}",
                    record.id, e
                ),
            }
        }

        match self.dao.enqueue(&record).await {
            Ok(()) => RecordDelivery::Queued,
            Err(e) => {
                error!("[Client] 记录 {} 写入本地队列失败，暂存内存: {}", record.id, e);
                let mut buffer = self.retry_buffer.lock().await;
                buffer.push_back(record);
                self.trim_buffer(&mut buffer);
                RecordDelivery::Buffered
            }
        }
    }

    /// 把内存暂存的记录重新写入本地队列，失败的继续保留
    async fn retry_buffered(&self) {
        let mut buffer = self.retry_buffer.lock().await;
        if buffer.is_empty() {
            return;
        }
        debug!("[Client] 重试写入 {} 条暂存记录", buffer.len());

        let mut still_pending = VecDeque::new();
        for record in buffer.drain(..) {
            if let Err(e) = self.dao.enqueue(&record).await {
                warn!("[Client] 暂存记录 {} 仍无法写入: {}", record.id, e);
                still_pending.push_back(record);
            }
        }
        *buffer = still_pending;
    }

    fn trim_buffer(&self, buffer: &mut VecDeque<ConversionRecord>) {
        let capacity = self.config.retry_buffer_capacity;
        while buffer.len() > capacity {
            if let Some(dropped) = buffer.pop_front() {
                warn!(
                    "[Client] 暂存记录超过上限 {}，丢弃最旧的记录 {}",
                    capacity, dropped.id
                );
            }
        }
    }

    /// 内存中暂存的记录数
    pub async fn buffered_count(&self) -> usize {
        self.retry_buffer.lock().await.len()
    }

    /// 手动同步
    ///
    /// 若网络恢复触发的同步正在进行，先等它结束，再同步剩余记录，
    /// 因此不会返回 `Coalesced`。
    pub async fn flush(&self) -> Result<FlushOutcome, SyncError> {
        self.retry_buffered().await;
        self.syncer.flush_and_wait().await
    }

    /// 待同步记录
    pub async fn pending(&self) -> Result<Vec<ConversionRecord>, StorageError> {
        self.dao.list_all().await
    }

    /// 显式清空本地队列
    pub async fn clear_pending(&self) -> Result<(), StorageError> {
        self.dao.clear_all().await
    }
}

impl Drop for ConverterClient {
    fn drop(&mut self) {
        self.monitor.unsubscribe(self.trigger_subscription);
    }
}
