// src/cli/check.rs
//! Check 命令 - 对单条通知求值规则，用于调试规则表达式

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::config::FilterConfig;
use crate::notification::{Category, NotificationRecord};
use crate::rule::RuleConfig;

/// Check 命令参数
#[derive(Args)]
pub struct CheckArgs {
    /// 通知类型: default, success, error, warning, info
    #[arg(long)]
    pub category: String,

    /// 通知文本
    #[arg(long)]
    pub text: String,

    /// 规则表达式，覆盖配置文件中的规则
    #[arg(long)]
    pub rule: Option<String>,

    /// 配置文件
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct CheckOutput {
    pub rule: String,
    pub record: NotificationRecord,
    pub hidden: bool,
}

/// 求值，不打印
pub fn check(args: &CheckArgs) -> Result<CheckOutput> {
    let category: Category = args.category.parse()?;
    let rule = match &args.rule {
        Some(source) => RuleConfig::Expression {
            source: source.clone(),
        },
        None => FilterConfig::resolve(args.config.as_deref())?.rule,
    };
    let compiled = rule
        .compile()
        .with_context(|| format!("Failed to compile rule: {}", rule.describe()))?;
    let record = NotificationRecord::new(category, args.text.clone());
    let hidden = compiled.evaluate(&record);
    Ok(CheckOutput {
        rule: rule.describe(),
        record,
        hidden,
    })
}

/// 处理 check 命令
pub fn handle_check(args: CheckArgs) -> Result<()> {
    let output = check(&args)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let verdict = if output.hidden { "hide" } else { "keep" };
        println!("{}  [{}] {}", verdict, output.record.category, output.record.text);
        println!("rule: {}", output.rule);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(category: &str, text: &str, rule: Option<&str>) -> CheckArgs {
        CheckArgs {
            category: category.to_string(),
            text: text.to_string(),
            rule: rule.map(str::to_string),
            config: None,
            json: false,
        }
    }

    #[test]
    fn test_explicit_rule() {
        let output = check(&args("warning", "disk full", Some("type == 'warning'"))).unwrap();
        assert!(output.hidden);
        assert_eq!(output.rule, "type == 'warning'");
    }

    #[test]
    fn test_unknown_category_is_error() {
        assert!(check(&args("fatal", "x", Some("true"))).is_err());
    }

    #[test]
    fn test_bad_rule_is_error() {
        let err = check(&args("error", "x", Some("text.contains("))).unwrap_err();
        assert!(err.to_string().contains("Failed to compile rule"));
    }
}
