//! 通配符规则 - 可选类型 + 文本通配模式
//!
//! `*` 匹配任意长度（含换行），`?` 匹配单个字符，其余字符按字面匹配。
//! 模式匹配整段文本，子串匹配写成 `*BacklogWiki*`。

use regex::Regex;

use super::{MatchRule, RuleError};
use crate::notification::{Category, NotificationRecord};

#[derive(Debug, Clone)]
pub struct PatternRule {
    category: Option<Category>,
    pattern: String,
    regex: Regex,
}

impl PatternRule {
    pub fn new(category: Option<Category>, pattern: &str) -> Result<Self, RuleError> {
        let regex = Regex::new(&glob_to_regex(pattern))
            .map_err(|e| RuleError::InvalidPattern(e.to_string()))?;
        Ok(Self {
            category,
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn category(&self) -> Option<Category> {
        self.category
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl MatchRule for PatternRule {
    fn evaluate(&self, record: &NotificationRecord) -> bool {
        self.category.map_or(true, |c| c == record.category) && self.regex.is_match(&record.text)
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::from("(?s)^");
    let mut literal = String::new();
    for c in pattern.chars() {
        match c {
            '*' | '?' => {
                out.push_str(&regex::escape(&literal));
                literal.clear();
                out.push_str(if c == '*' { ".*" } else { "." });
            }
            _ => literal.push(c),
        }
    }
    out.push_str(&regex::escape(&literal));
    out.push('$');
    out
}
