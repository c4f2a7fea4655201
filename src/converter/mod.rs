pub mod auth;
pub mod client;
pub mod convert;
pub mod db;
pub mod errors;
pub mod network;
pub mod record;
pub mod serialization;
pub mod storage;
pub mod types;
pub mod units;

// 重新导出认证相关函数
pub use auth::{sign_in_async, sign_up_async, AuthUser, Session};

// 重新导出换算相关类型和函数
pub use convert::{convert, convert_input, format_result, parse_input};
pub use errors::{ConvertError, StorageError, SyncError};
pub use units::{QuantityType, UnitDef};
