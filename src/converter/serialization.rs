//! 记录 ID / 时间戳生成与队列 JSON 编解码

use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::converter::errors::StorageError;

/// 生成转换记录 ID（调用方生成，全局唯一）
pub fn generate_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// 当前 UTC 时间的 ISO-8601 字符串，例如 `2025-01-01T08:00:00.000Z`
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 宽松解码结果：能解析的元素与无法解析的原始元素
#[derive(Debug)]
pub struct LenientArray<T> {
    pub items: Vec<T>,
    pub rejected: Vec<Value>,
}

impl<T> Default for LenientArray<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

/// 按元素解码 JSON 数组，单个元素失败不影响其它元素
///
/// 空值、`null` 视为空数组；整体不是 JSON 数组时返回 `Corrupt`。
pub fn decode_json_array_lenient<T: DeserializeOwned>(
    key: &str,
    raw: Option<&str>,
) -> Result<LenientArray<T>, StorageError> {
    let raw = match raw {
        Some(s) if !s.trim().is_empty() && s.trim() != "null" => s,
        _ => return Ok(LenientArray::default()),
    };

    let values: Vec<Value> = serde_json::from_str(raw).map_err(|source| StorageError::Corrupt {
        key: key.to_string(),
        source,
    })?;

    let mut decoded = LenientArray::default();
    for value in values {
        match serde_json::from_value::<T>(value.clone()) {
            Ok(item) => decoded.items.push(item),
            Err(_) => decoded.rejected.push(value),
        }
    }
    Ok(decoded)
}

/// 序列化为 JSON 字符串写入存储
pub fn encode_json<T: Serialize>(key: &str, value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|source| StorageError::Corrupt {
        key: key.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(generate_record_id(), generate_record_id());
    }

    #[test]
    fn timestamp_is_rfc3339_utc() {
        let ts = now_iso8601();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn lenient_decode_handles_missing_null_and_corrupt() {
        let v: LenientArray<u32> = decode_json_array_lenient("k", None).unwrap();
        assert!(v.items.is_empty());
        let v: LenientArray<u32> = decode_json_array_lenient("k", Some("null")).unwrap();
        assert!(v.items.is_empty());
        let err = decode_json_array_lenient::<u32>("k", Some("{oops")).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[test]
    fn lenient_decode_keeps_good_elements() {
        let v: LenientArray<u32> =
            decode_json_array_lenient("k", Some(r#"[1, "two", 3, -4]"#)).unwrap();
        assert_eq!(v.items, vec![1, 3]);
        assert_eq!(v.rejected, vec![Value::from("two"), Value::from(-4)]);
    }
}
