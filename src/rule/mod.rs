//! 匹配规则 - 决定哪些通知需要隐藏
//!
//! 规则在启动时编译一次，之后只读。两种实现：
//! - [`ExpressionRule`]: CEL 子集表达式，如 `type == "error" && text.contains("BacklogWiki")`
//! - [`PatternRule`]: 可选类型 + 通配符文本
//!
//! # 使用示例
//! ```
//! use limeade::rule::{ExpressionRule, MatchRule};
//! use limeade::notification::{Category, NotificationRecord};
//!
//! let rule = ExpressionRule::compile(r#"type == "error" && text.contains("BacklogWiki")"#).unwrap();
//! assert!(rule.evaluate(&NotificationRecord::new(Category::Error, "BacklogWiki failed")));
//! ```

mod expression;
mod lexer;
mod pattern;

use serde::{Deserialize, Serialize};

use crate::notification::{Category, NotificationRecord};

pub use expression::{ExpressionRule, MAX_DEPTH};
pub use pattern::PatternRule;

/// 默认规则：隐藏包含 BacklogWiki 的错误通知
pub const DEFAULT_RULE: &str = r#"type == "error" && text.contains("BacklogWiki")"#;

/// 通知匹配谓词；纯函数，对任意记录都有定义
pub trait MatchRule {
    /// 返回 `true` 表示应隐藏
    fn evaluate(&self, record: &NotificationRecord) -> bool;
}

impl<F> MatchRule for F
where
    F: Fn(&NotificationRecord) -> bool,
{
    fn evaluate(&self, record: &NotificationRecord) -> bool {
        self(record)
    }
}

/// 规则编译错误，启动时即失败，没有兜底规则
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("empty rule expression")]
    Empty,
    #[error("unexpected character {found:?} at offset {offset}")]
    UnexpectedChar { found: char, offset: usize },
    #[error("invalid escape sequence \\{found} at offset {offset}")]
    InvalidEscape { found: char, offset: usize },
    #[error("unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },
    #[error("unexpected {found} at offset {offset}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
        offset: usize,
    },
    #[error("unexpected end of expression at offset {offset}, expected {expected}")]
    UnexpectedEnd { expected: &'static str, offset: usize },
    #[error("unknown variable `{name}` at offset {offset} (available: type, category, text)")]
    UnknownVariable { name: String, offset: usize },
    #[error("unknown method `{name}` at offset {offset}")]
    UnknownMethod { name: String, offset: usize },
    #[error("type mismatch at offset {offset}: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
        offset: usize,
    },
    #[error("`{method}` takes {expected} argument(s), got {found} (offset {offset})")]
    Arity {
        method: String,
        expected: usize,
        found: usize,
        offset: usize,
    },
    #[error("`matches` requires a string literal pattern (offset {offset})")]
    NonLiteralPattern { offset: usize },
    #[error("invalid regex at offset {offset}: {message}")]
    InvalidRegex { message: String, offset: usize },
    #[error("expression nested deeper than {max} levels at offset {offset}")]
    TooDeep { max: usize, offset: usize },
    #[error("invalid text pattern: {0}")]
    InvalidPattern(String),
}

/// 规则配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleConfig {
    /// 表达式规则
    Expression { source: String },
    /// 通配符规则
    Pattern {
        #[serde(default)]
        category: Option<Category>,
        text: String,
    },
}

impl Default for RuleConfig {
    fn default() -> Self {
        RuleConfig::Expression {
            source: DEFAULT_RULE.to_string(),
        }
    }
}

impl RuleConfig {
    pub fn compile(&self) -> Result<Box<dyn MatchRule>, RuleError> {
        match self {
            RuleConfig::Expression { source } => Ok(Box::new(ExpressionRule::compile(source)?)),
            RuleConfig::Pattern { category, text } => Ok(Box::new(PatternRule::new(*category, text)?)),
        }
    }

    /// 用于日志的简短描述
    pub fn describe(&self) -> String {
        match self {
            RuleConfig::Expression { source } => source.clone(),
            RuleConfig::Pattern {
                category: Some(category),
                text,
            } => format!("{} ~ {}", category, text),
            RuleConfig::Pattern { category: None, text } => format!("* ~ {}", text),
        }
    }
}
