//! 转换记录模块
//!
//! 离线时记录入队，网络恢复后批量同步到后端文档存储

pub mod api;
pub mod dao;
pub mod listener;
pub mod models;
pub mod service;
pub mod types;

// 重新导出主要类型
pub use api::{ConversionBackend, HttpConversionBackend};
pub use dao::{PendingQueueDao, PENDING_CONVERSIONS_KEY, QUARANTINE_KEY_PREFIX};
pub use listener::{EmptySyncListener, SyncListener};
pub use models::{ConversionRecord, ConversionSyncerConfig, FlushOutcome};
pub use service::ConversionSyncer;
pub use types::{BatchWriteReq, BatchWriteResp, DocumentWrite, WriteResult};
