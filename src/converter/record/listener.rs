//! 同步监听器回调接口

use async_trait::async_trait;

/// 同步监听器回调接口
#[async_trait]
pub trait SyncListener: Send + Sync {
    /// 开始提交，参数为待提交记录数
    async fn on_sync_start(&self, pending: usize);

    /// 提交成功，参数为已从队列移除的记录数
    async fn on_sync_finish(&self, flushed: usize);

    /// 提交失败（队列保持不变，等待下一次触发）
    async fn on_sync_failed(&self, error: String);
}

/// 空实现（默认监听器）
pub struct EmptySyncListener;

#[async_trait]
impl SyncListener for EmptySyncListener {
    async fn on_sync_start(&self, _pending: usize) {}
    async fn on_sync_finish(&self, _flushed: usize) {}
    async fn on_sync_failed(&self, _error: String) {}
}
