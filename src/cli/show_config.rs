// src/cli/show_config.rs
//! Config 命令 - 打印生效的配置

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::config::FilterConfig;

/// Config 命令参数
#[derive(Args)]
pub struct ConfigArgs {
    /// 配置文件，默认读取 ~/.config/limeade/config.json
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

/// 处理 config 命令
pub fn handle_config(args: ConfigArgs) -> Result<()> {
    let config = FilterConfig::resolve(args.config.as_deref())?;
    if let Err(e) = config.validate() {
        eprintln!("⚠️  {}", e);
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
