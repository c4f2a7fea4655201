//! 文档存储 / 身份认证 REST 接口共用的响应处理
//!
//! 成功时响应体就是业务结构本身；失败时为 `{"error":{"code","message","status"}}`。

use serde::de::DeserializeOwned;
use serde::Deserialize;

/// 服务端错误响应体
#[derive(Debug, Deserialize)]
pub struct ServiceErrorBody {
    pub error: ServiceError,
}

#[derive(Debug, Deserialize)]
pub struct ServiceError {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
    /// 例如 `PERMISSION_DENIED`、`INVALID_ARGUMENT`（身份认证接口通常不带）
    #[serde(default)]
    pub status: String,
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.status.is_empty() {
            write!(f, "{} ({})", self.message, self.code)
        } else {
            write!(f, "{} ({} {})", self.message, self.code, self.status)
        }
    }
}

/// 从错误响应体提取可读信息，不是标准错误结构时原样返回
pub fn parse_service_error(body: &str) -> String {
    match serde_json::from_str::<ServiceErrorBody>(body) {
        Ok(b) => b.error.to_string(),
        Err(_) => body.to_string(),
    }
}

/// 通用 HTTP 响应处理：非 2xx 转为带服务端错误信息的 anyhow 错误，
/// 否则把响应体反序列化为 `T`
pub async fn handle_http_response<T: DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> anyhow::Result<T> {
    use anyhow::Context;
    use tracing::{debug, error};

    let status = response.status();
    let body = response.text().await.context("读取响应 body 失败")?;
    debug!("[HTTP] {}响应 Body: {}", operation_name, body);

    if !status.is_success() {
        let reason = parse_service_error(&body);
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 原因: {}",
            operation_name, status, reason
        );
        return Err(anyhow::anyhow!("{}失败 {}: {}", operation_name, status, reason));
    }

    // 部分写接口成功时返回空 body
    let body = if body.trim().is_empty() { "{}" } else { body.as_str() };
    serde_json::from_str(body).with_context(|| {
        format!("{}反序列化响应失败，原始响应: {}", operation_name, body)
    })
}
