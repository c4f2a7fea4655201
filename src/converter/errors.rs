//! 错误类型定义
//!
//! 换算错误返回给 UI 作为“无效结果”状态；存储和同步错误只记录日志，
//! 在下一次自然触发（下一次入队、下一次网络恢复）时重试。

use thiserror::Error;

/// 单位换算错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConvertError {
    /// 单位代码不属于该物理量类型
    #[error("无效的单位 '{unit}'（类型: {quantity}）")]
    InvalidUnit { quantity: String, unit: String },

    /// 输入值无法解析为有限数字
    #[error("无效的输入: {0}")]
    InvalidInput(String),
}

/// 本地持久化错误
#[derive(Debug, Error)]
pub enum StorageError {
    /// 底层存储不可用（连接失败、写入失败等）
    #[error("本地存储不可用: {0}")]
    Unavailable(String),

    /// 存储中的 JSON 内容已损坏
    #[error("本地存储数据损坏（key: {key}）: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        StorageError::Unavailable(e.to_string())
    }
}

/// 同步（批量提交到后端）错误
#[derive(Debug, Error)]
pub enum SyncError {
    /// 读取本地队列失败
    #[error("读取待同步队列失败: {0}")]
    Storage(#[from] StorageError),

    /// 后端批量写入被拒绝或网络失败
    #[error("后端批量写入失败: {0}")]
    Backend(String),

    /// 后端批量写入超时
    #[error("后端批量写入超时（{0} 毫秒）")]
    Timeout(u128),
}
