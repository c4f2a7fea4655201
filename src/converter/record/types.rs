//! 后端批量写入 DTO

use serde::{Deserialize, Serialize};

use crate::converter::record::models::ConversionRecord;

/// 单个文档写入（collectionPath, documentId, document）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentWrite {
    pub collection_path: String,
    pub document_id: String,
    pub document: ConversionRecord,
}

/// 批量写入请求，整体提交、全部成功或全部失败
#[derive(Debug, Clone, Serialize)]
pub struct BatchWriteReq {
    pub writes: Vec<DocumentWrite>,
}

/// 单个写入的结果
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    #[serde(default)]
    pub update_time: Option<String>,
}

/// 批量写入响应，`write_results` 与请求中的 `writes` 一一对应
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchWriteResp {
    #[serde(default)]
    pub write_results: Vec<WriteResult>,
    #[serde(default)]
    pub commit_time: Option<String>,
}
