//! 网络连通性监听
//!
//! 只保存当前在线状态（无历史）。状态每变化一次，向每个订阅者投递一次；
//! 重复上报相同状态不算变化。

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::converter::record::{ConversionSyncer, FlushOutcome};

/// 网络可达性探测接口
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// 通过 HEAD 请求探测指定 URL
pub struct HttpReachabilityProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpReachabilityProbe {
    pub fn new(url: String, timeout: Duration) -> anyhow::Result<Self> {
        use anyhow::Context;
        let client = reqwest::ClientBuilder::new()
            .timeout(timeout)
            .build()
            .context("创建探测 HTTP 客户端失败")?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl ReachabilityProbe for HttpReachabilityProbe {
    async fn is_reachable(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(resp) => {
                debug!("[Network] 探测 {} -> {}", self.url, resp.status());
                true
            }
            Err(e) => {
                debug!("[Network] 探测 {} 失败: {}", self.url, e);
                false
            }
        }
    }
}

/// 手动设置的探测结果（测试、强制离线模式）
#[derive(Default)]
pub struct StaticProbe {
    reachable: AtomicBool,
}

impl StaticProbe {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
        }
    }

    pub fn set(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReachabilityProbe for StaticProbe {
    async fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

/// 连通性变化监听器
#[async_trait]
pub trait ConnectivityListener: Send + Sync {
    async fn on_connectivity_changed(&self, online: bool);
}

pub type SubscriptionId = u64;

/// 网络连通性监听器
pub struct ConnectivityMonitor {
    probe: Arc<dyn ReachabilityProbe>,
    state: watch::Sender<bool>,
    listeners: std::sync::Mutex<Vec<(SubscriptionId, Arc<dyn ConnectivityListener>)>>,
    next_id: AtomicU64,
    // 串行化状态变化与投递，保证每次变化按顺序只投递一次
    transition: Mutex<()>,
}

impl ConnectivityMonitor {
    /// `initially_online` 为启动时的假定状态；未确认联网时应传 false
    pub fn new(probe: Arc<dyn ReachabilityProbe>, initially_online: bool) -> Self {
        let (state, _) = watch::channel(initially_online);
        Self {
            probe,
            state,
            listeners: std::sync::Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            transition: Mutex::new(()),
        }
    }

    /// 当前是否在线
    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// 订阅状态值（只关心最新值的调用方使用）
    pub fn subscribe_state(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// 注册变化监听器
    pub fn subscribe(&self, listener: Arc<dyn ConnectivityListener>) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push((id, listener));
        }
        debug!("[Network] 新增监听器 #{}", id);
        id
    }

    /// 取消注册，返回该 ID 是否存在
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.listeners.lock() {
            Ok(mut listeners) => {
                let before = listeners.len();
                listeners.retain(|(sid, _)| *sid != id);
                before != listeners.len()
            }
            Err(_) => false,
        }
    }

    /// 上报当前可达性，状态发生变化时返回 true 并通知所有监听器
    pub async fn set_reachable(&self, online: bool) -> bool {
        let _guard = self.transition.lock().await;

        let changed = self.state.send_if_modified(|current| {
            if *current != online {
                *current = online;
                true
            } else {
                false
            }
        });
        if !changed {
            return false;
        }

        if online {
            info!("[Network] 🔗 网络已恢复");
        } else {
            warn!("[Network] 🔌 网络已断开");
        }

        let listeners: Vec<Arc<dyn ConnectivityListener>> = match self.listeners.lock() {
            Ok(listeners) => listeners.iter().map(|(_, l)| l.clone()).collect(),
            Err(_) => Vec::new(),
        };
        for listener in listeners {
            listener.on_connectivity_changed(online).await;
        }
        true
    }

    /// 探测一次并上报
    pub async fn poll_once(&self) -> bool {
        let reachable = self.probe.is_reachable().await;
        self.set_reachable(reachable).await;
        reachable
    }

    /// 探测一次，只更新状态值，不通知监听器
    ///
    /// 一次性命令使用：进程很快退出，不应在后台启动由监听器触发的同步。
    pub async fn poll_quietly(&self) -> bool {
        let reachable = self.probe.is_reachable().await;
        let _guard = self.transition.lock().await;
        self.state.send_if_modified(|current| {
            let changed = *current != reachable;
            *current = reachable;
            changed
        });
        debug!("[Network] 静默探测结果: {}", reachable);
        reachable
    }

    /// 后台定时探测
    pub fn spawn_polling(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        info!("[Network] 启动连通性探测，间隔 {:?}", interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.poll_once().await;
            }
        })
    }
}

/// 网络恢复时触发一次同步
///
/// flush 在独立任务中执行，不阻塞后续状态投递；并发的触发由同步器合并。
pub struct SyncTrigger {
    syncer: Arc<ConversionSyncer>,
}

impl SyncTrigger {
    pub fn new(syncer: Arc<ConversionSyncer>) -> Self {
        Self { syncer }
    }
}

#[async_trait]
impl ConnectivityListener for SyncTrigger {
    async fn on_connectivity_changed(&self, online: bool) {
        if !online {
            return;
        }
        let syncer = self.syncer.clone();
        tokio::spawn(async move {
            match syncer.flush().await {
                Ok(FlushOutcome::Flushed { written, .. }) => {
                    info!("[Network] 网络恢复后同步 {} 条记录", written)
                }
                Ok(outcome) => debug!("[Network] 网络恢复后同步结果: {:?}", outcome),
                Err(e) => warn!("[Network] 网络恢复后同步失败，等待下次恢复重试: {}", e),
            }
        });
    }
}
