//! SQLite 数据库工具：统一创建连接池并执行 sqlx 迁移
//!
//! 约定：本 crate 根目录下存在 `migrations/` 目录，存放所有迁移 SQL 文件。
//! 通过 `sqlx::migrate!()` 自动管理 schema 升级。

use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use tracing::info;

/// 将配置中的数据库路径规范化为 sqlx 可识别的 URL
///
/// - `sqlite:` 开头：原样使用
/// - 其它：视为文件路径，补全为 `sqlite://{path}?mode=rwc`
pub fn normalize_db_url(db_path: &str) -> String {
    if db_path.starts_with("sqlite:") {
        db_path.to_string()
    } else {
        format!("sqlite://{}?mode=rwc", db_path)
    }
}

/// 创建 SQLite 连接池并执行所有未执行的迁移
pub async fn create_sqlite_pool_with_migration(db_url: &str) -> Result<Pool<Sqlite>> {
    let db_url = normalize_db_url(db_url);
    // 内存库每个连接是独立的数据库，只能用单连接
    let max_connections = if db_url.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&db_url)
        .await
        .with_context(|| format!("连接SQLite数据库失败: {}", db_url))?;

    // 从 `migrations/` 目录读取迁移并执行
    sqlx::migrate!()
        .run(&pool)
        .await
        .context("执行数据库迁移失败")?;

    info!("[DB] SQLite 已就绪: {}", db_url);
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_plain_path() {
        assert_eq!(normalize_db_url("a/b.db"), "sqlite://a/b.db?mode=rwc");
        assert_eq!(normalize_db_url("sqlite::memory:"), "sqlite::memory:");
    }
}
