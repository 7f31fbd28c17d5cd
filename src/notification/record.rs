//! 通知记录 - 从通知元素提取出的结构化数据

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 通知类型，对应 notistack 的 variant
///
/// 参考 https://notistack.com/features/customization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Default,
    Success,
    Error,
    Warning,
    Info,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Default,
        Category::Success,
        Category::Error,
        Category::Warning,
        Category::Info,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Default => "default",
            Category::Success => "success",
            Category::Error => "error",
            Category::Warning => "warning",
            Category::Info => "info",
        }
    }

    /// 按 class 中的 token 精确匹配；未知 token 返回 None，不做猜测
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == token)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 未知通知类型
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown notification category `{0}` (expected one of: default, success, error, warning, info)")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s).ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// 规则求值的输入，每次求值都从 DOM 重新提取
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub category: Category,
    pub text: String,
}

impl NotificationRecord {
    pub fn new(category: Category, text: impl Into<String>) -> Self {
        Self {
            category,
            text: text.into(),
        }
    }
}
