//! 单位换算 CLI
//!
//! 用于本地换算、查看/清空待同步队列、手动同步和监听网络恢复自动同步。

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};
use unit_converter_sdk_core::converter::record::SyncListener;
use unit_converter_sdk_core::converter::{format_result, sign_in_async, sign_up_async};
use unit_converter_sdk_core::{ClientConfig, ConverterClient, QuantityType, RecordDelivery};

/// 单位换算 CLI
#[derive(Parser, Debug)]
#[command(name = "converter-cli")]
#[command(about = "单位换算 CLI - 换算、离线队列与同步", long_about = None)]
struct Args {
    /// 本地 SQLite 数据库路径或 URL
    #[arg(long, env = "CONVERTER_DB", default_value = "sqlite://converter.db?mode=rwc")]
    db: String,

    /// 后端文档存储地址
    #[arg(long, env = "CONVERTER_API", default_value = "http://localhost:8080")]
    api: String,

    /// 用户 ID（不填为访客模式）
    #[arg(long, env = "CONVERTER_USER")]
    user: Option<String>,

    /// 认证 token
    #[arg(long, env = "CONVERTER_TOKEN")]
    token: Option<String>,

    /// 强制离线（不探测网络）
    #[arg(long)]
    offline: bool,

    /// 日志级别（默认: warn,unit_converter_sdk_core=info）
    #[arg(long, default_value = "warn,unit_converter_sdk_core=info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 换算并记录
    Convert {
        value: String,
        #[arg(value_name = "TYPE")]
        quantity: String,
        from: String,
        to: String,
    },
    /// 列出单位表
    Units {
        #[arg(value_name = "TYPE")]
        quantity: Option<String>,
    },
    /// 查看待同步队列
    Queue,
    /// 立即同步
    Flush,
    /// 清空待同步队列
    Clear,
    /// 持续探测网络，恢复时自动同步
    Watch {
        /// 运行时长（秒），0 表示持续运行
        #[arg(short, long, default_value = "0")]
        duration: u64,
    },
    /// 邮箱密码登录（或注册），输出用户 ID 和 token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, env = "CONVERTER_API_KEY")]
        api_key: String,
        #[arg(long, default_value = "https://identitytoolkit.googleapis.com")]
        auth_url: String,
        /// 注册新账号
        #[arg(long)]
        register: bool,
    },
}

/// 初始化日志（输出到 stderr，stdout 留给结果）
fn init_logger(log_level: &str) {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stderr_layer)
        .init();
}

struct CliSyncListener;

#[async_trait::async_trait]
impl SyncListener for CliSyncListener {
    async fn on_sync_start(&self, pending: usize) {
        info!("[CLI/Sync] 🔄 开始同步 {} 条记录", pending);
    }

    async fn on_sync_finish(&self, flushed: usize) {
        info!("[CLI/Sync] ✅ 同步完成，{} 条", flushed);
    }

    async fn on_sync_failed(&self, error: String) {
        error!("[CLI/Sync] ❌ 同步失败: {}", error);
    }
}

fn print_units(quantity: QuantityType) {
    println!("{}:", quantity);
    for unit in quantity.units() {
        println!("  {:<4} {}", unit.code, unit.label);
    }
}

/// 创建客户端；一次性命令只静默探测网络，不在后台启动同步
async fn build_client(args: &Args) -> Result<ConverterClient> {
    let mut config = match (&args.user, &args.token) {
        (Some(user), Some(token)) => ClientConfig::new(user.clone(), token.clone()),
        (Some(_), None) => {
            warn!("[CLI] 未提供 token，按访客模式运行");
            ClientConfig::guest()
        }
        _ => ClientConfig::guest(),
    };
    config.db_url = args.db.clone();
    config.api_base_url = args.api.clone();

    let client = ConverterClient::connect_with_listener(config, Arc::new(CliSyncListener)).await?;
    if !args.offline && !matches!(args.command, Command::Watch { .. }) {
        client.monitor().poll_quietly().await;
    }
    Ok(client)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level);

    match &args.command {
        Command::Units { quantity } => {
            match quantity {
                Some(q) => print_units(q.parse()?),
                None => QuantityType::ALL.into_iter().for_each(print_units),
            }
            return Ok(());
        }
        Command::Login {
            email,
            password,
            api_key,
            auth_url,
            register,
        } => {
            let user = if *register {
                sign_up_async(auth_url, api_key, email, password).await?
            } else {
                sign_in_async(auth_url, api_key, email, password).await?
            };
            println!("user_id={}", user.user_id);
            println!("token={}", user.id_token);
            return Ok(());
        }
        _ => {}
    }

    let client = build_client(&args).await?;
    info!(
        "[CLI] 🚀 客户端就绪，在线: {}, 访客: {}",
        client.is_online(),
        client.config().is_guest()
    );

    match &args.command {
        Command::Convert {
            value,
            quantity,
            from,
            to,
        } => {
            let quantity: QuantityType = quantity.parse()?;
            let outcome = client.record_conversion(value, quantity, from, to).await?;
            println!("{} {} = {} {}", value.trim(), from, outcome.display, to);
            match outcome.delivery {
                RecordDelivery::Committed => {
                    info!("[CLI] 记录已提交");
                    // 顺带同步上次离线时留下的记录
                    if !client.pending().await?.is_empty() {
                        let flushed = client.flush().await?;
                        info!("[CLI] 同步遗留记录: {:?}", flushed);
                    }
                }
                RecordDelivery::Queued => info!("[CLI] 离线，记录已加入待同步队列"),
                RecordDelivery::Buffered => warn!("[CLI] 本地存储失败，记录仅暂存于内存"),
                RecordDelivery::NotRecorded => {}
            }
        }
        Command::Queue => {
            let pending = client.pending().await?;
            println!("待同步记录（共 {} 条）:", pending.len());
            for r in pending {
                let result = r.result.map(format_result).unwrap_or_default();
                println!(
                    "  {} | {} | {} -> {} {} | {}",
                    r.timestamp, r.quantity, r.from, r.to, result, r.id
                );
            }
        }
        Command::Flush => {
            let outcome = client.flush().await?;
            println!("{:?}", outcome);
        }
        Command::Clear => {
            client.clear_pending().await?;
            println!("已清空");
        }
        Command::Watch { duration } => {
            if args.offline {
                warn!("[CLI] --offline 下 watch 不会探测网络");
            }
            let handle = (!args.offline).then(|| client.start_monitoring());
            if *duration > 0 {
                info!("[CLI] ⏰ {} 秒后自动退出", duration);
                sleep(Duration::from_secs(*duration)).await;
            } else {
                info!("[CLI] ⏰ 持续运行中，按 Ctrl+C 退出");
                tokio::signal::ctrl_c().await?;
            }
            if let Some(handle) = handle {
                handle.abort();
            }
            info!("[CLI] 👋 程序退出");
        }
        Command::Units { .. } | Command::Login { .. } => {}
    }

    Ok(())
}
