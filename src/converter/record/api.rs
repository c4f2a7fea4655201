//! 转换记录后端 HTTP API 客户端
//!
//! 后端是通用文档存储，只使用它的批量写入能力。

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use crate::converter::record::types::{BatchWriteReq, BatchWriteResp, DocumentWrite};
use crate::converter::types::handle_http_response;

/// 文档存储后端接口：批量写入整体提交
///
/// 以 `document_id` 为键，重复写入同一 ID 覆盖而不是新增。
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    async fn commit_batch(&self, writes: Vec<DocumentWrite>) -> Result<()>;
}

/// 基于 HTTP 的后端实现
pub struct HttpConversionBackend {
    client: reqwest::Client,
    api_base_url: String,
}

impl HttpConversionBackend {
    /// 创建新的后端客户端
    ///
    /// `client` 应该已经在外部配置好认证头
    pub fn new(client: reqwest::Client, api_base_url: String) -> Self {
        Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// 使用 ID token 创建带认证头的客户端（token 通过 default_headers 自动添加）
    pub fn with_token(api_base_url: String, id_token: &str) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", id_token))
                .context("无效的 token")?,
        );
        let client = reqwest::ClientBuilder::new()
            .default_headers(headers)
            .build()
            .context("创建 HTTP 客户端失败")?;
        Ok(Self::new(client, api_base_url))
    }

    fn batch_write_url(&self) -> String {
        format!("{}/v1/batchWrite", self.api_base_url)
    }
}

#[async_trait]
impl ConversionBackend for HttpConversionBackend {
    async fn commit_batch(&self, writes: Vec<DocumentWrite>) -> Result<()> {
        let operation_id = Uuid::new_v4().to_string();
        let url = self.batch_write_url();
        let count = writes.len();

        info!("[RecordAPI] 📡 提交批量写入，共 {} 条", count);
        debug!("[RecordAPI]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("operationID", &operation_id)
            .json(&BatchWriteReq { writes })
            .send()
            .await
            .context("请求失败")?;

        let resp: BatchWriteResp = handle_http_response(response, "批量写入").await?;
        // 未返回逐条结果时只以 HTTP 状态为准
        if !resp.write_results.is_empty() && resp.write_results.len() != count {
            return Err(anyhow::anyhow!(
                "批量写入结果数量不符：提交 {} 条，返回 {} 条",
                count,
                resp.write_results.len()
            ));
        }
        debug!(
            "[RecordAPI] 批量写入完成，{} 条，commitTime={:?}",
            count, resp.commit_time
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::record::models::ConversionRecord;
    use crate::converter::units::QuantityType;

    #[test]
    fn batch_request_wire_format() {
        let mut record = ConversionRecord::new(QuantityType::Time, "h", "min");
        record.id = "doc-1".into();
        record.timestamp = "2025-01-01T00:00:00.000Z".into();
        let req = BatchWriteReq {
            writes: vec![DocumentWrite {
                collection_path: "users/u1/conversions".into(),
                document_id: record.id.clone(),
                document: record,
            }],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["writes"][0]["collectionPath"], "users/u1/conversions");
        assert_eq!(json["writes"][0]["documentId"], "doc-1");
        assert_eq!(json["writes"][0]["document"]["type"], "time");
    }

    #[test]
    fn batch_response_wire_format() {
        let resp: BatchWriteResp = serde_json::from_str(
            r#"{"writeResults":[{"updateTime":"2025-01-01T00:00:01Z"},{}],"commitTime":"2025-01-01T00:00:01Z"}"#,
        )
        .unwrap();
        assert_eq!(resp.write_results.len(), 2);
        assert_eq!(resp.write_results[1].update_time, None);
        assert_eq!(resp.commit_time.as_deref(), Some("2025-01-01T00:00:01Z"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let backend =
            HttpConversionBackend::with_token("http://localhost:8080/".into(), "t").unwrap();
        assert_eq!(backend.batch_write_url(), "http://localhost:8080/v1/batchWrite");
    }
}
