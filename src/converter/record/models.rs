//! 转换记录本地模型定义

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::converter::serialization::{generate_record_id, now_iso8601};
use crate::converter::units::QuantityType;

/// 转换记录（创建后不可变，以 `id` 为身份）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRecord {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub quantity: QuantityType,
    /// ISO-8601 时间字符串
    pub timestamp: String,
    /// 输入值（旧数据中可能没有）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// 换算结果（未舍入）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<f64>,
}

impl ConversionRecord {
    /// 以新生成的 ID 和当前时间创建记录
    pub fn new(quantity: QuantityType, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            id: generate_record_id(),
            from: from.into(),
            to: to.into(),
            quantity,
            timestamp: now_iso8601(),
            value: None,
            result: None,
        }
    }

    /// 附带输入值和换算结果
    pub fn with_values(mut self, value: f64, result: f64) -> Self {
        self.value = Some(value);
        self.result = Some(result);
        self
    }
}

/// 一次 flush 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// 队列为空，未访问后端
    Empty,
    /// 批量提交成功
    Flushed {
        /// 写入后端的文档数（重复 ID 合并后）
        written: usize,
        /// 从本地队列移除的记录数（包含重复 ID 的每一条）
        removed: usize,
    },
    /// 已有 flush 在进行，本次被合并
    Coalesced,
    /// 未登录（访客模式），不同步
    Skipped,
}

/// 转换记录同步器配置
#[derive(Debug, Clone)]
pub struct ConversionSyncerConfig {
    /// 已认证用户 ID；访客模式为 None
    pub user_id: Option<String>,
    /// 后端批量提交超时
    pub commit_timeout: Duration,
}

impl ConversionSyncerConfig {
    pub fn new(user_id: Option<String>) -> Self {
        Self {
            user_id,
            commit_timeout: Duration::from_secs(15),
        }
    }

    /// 文档集合路径：`users/{uid}/conversions`
    pub fn collection_path(&self) -> Option<String> {
        self.user_id
            .as_deref()
            .filter(|uid| !uid.is_empty())
            .map(|uid| format!("users/{}/conversions", uid))
    }
}
