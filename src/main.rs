//! Limeade CLI
//!
//! 在内存文档上运行通知过滤器：重放场景、调试规则、查看配置

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use limeade::cli::{CheckArgs, ConfigArgs, ReplayArgs};

#[derive(Parser)]
#[command(name = "limeade")]
#[command(about = "Limeade - 自动隐藏匹配规则的页面通知")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 重放通知场景并报告被隐藏的通知
    Replay(ReplayArgs),
    /// 对单条通知求值规则
    Check(CheckArgs),
    /// 打印生效的配置
    Config(ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // 通过 RUST_LOG 环境变量控制日志级别，默认为 info
    // 例如: RUST_LOG=limeade=debug limeade replay scenario.json
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("limeade=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay(args) => limeade::cli::handle_replay(args).await?,
        Commands::Check(args) => limeade::cli::handle_check(args)?,
        Commands::Config(args) => limeade::cli::handle_config(args)?,
    }

    Ok(())
}
