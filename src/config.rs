//! 过滤器配置
//!
//! 配置文件为 JSON，所有字段都有默认值，缺省文件等同默认配置。
//! 默认位置：`<config dir>/limeade/config.json`（Linux 上为 `~/.config/limeade/config.json`）。

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::rule::RuleConfig;
use crate::watcher::FireSchedule;

pub const DEFAULT_CONTAINER_CLASS: &str = "notistack-SnackbarContainer";
pub const DEFAULT_CONTENT_CLASS: &str = "notistack-MuiContent";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// 通知容器的 class
    pub container_class: String,
    /// 通知内容元素的 class；类型标记为 `<content_class>-<token>`
    pub content_class: String,
    /// 立即触发的调度方式
    pub schedule: FireSchedule,
    pub rule: RuleConfig,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            container_class: DEFAULT_CONTAINER_CLASS.to_string(),
            content_class: DEFAULT_CONTENT_CLASS.to_string(),
            schedule: FireSchedule::default(),
            rule: RuleConfig::default(),
        }
    }
}

impl FilterConfig {
    /// 从指定文件加载
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: FilterConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// 从默认位置加载，文件不存在时使用默认配置
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// 命令行 `--config` 优先，否则使用默认位置
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::load_default(),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("limeade").join("config.json"))
    }

    /// class 名必须是非空的单个 token
    pub fn validate(&self) -> Result<(), String> {
        check_class("container_class", &self.container_class)?;
        check_class("content_class", &self.content_class)
    }
}

fn check_class(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{} must not be empty", field));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(format!("{} must be a single class name, got {:?}", field, value));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = FilterConfig::default();
        assert_eq!(config.container_class, "notistack-SnackbarContainer");
        assert_eq!(config.content_class, "notistack-MuiContent");
        assert_eq!(config.schedule, FireSchedule::Microtask);
        assert_eq!(config.rule, RuleConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"schedule": "next_paint"}}"#).unwrap();

        let config = FilterConfig::load(file.path()).unwrap();
        assert_eq!(config.schedule, FireSchedule::NextPaint);
        assert_eq!(config.container_class, DEFAULT_CONTAINER_CLASS);
    }

    #[test]
    fn test_load_rule_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        let json = serde_json::json!({
            "container_class": "toasts",
            "rule": { "kind": "pattern", "category": "warning", "text": "*disk*" }
        });
        write!(file, "{}", json).unwrap();

        let config = FilterConfig::load(file.path()).unwrap();
        assert_eq!(config.container_class, "toasts");
        assert!(matches!(config.rule, RuleConfig::Pattern { .. }));
    }

    #[test]
    fn test_load_reports_path_on_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = FilterConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_validate_rejects_bad_class_names() {
        let config = FilterConfig {
            container_class: String::new(),
            ..FilterConfig::default()
        };
        assert!(config.validate().unwrap_err().contains("container_class"));

        let config = FilterConfig {
            content_class: "two classes".to_string(),
            ..FilterConfig::default()
        };
        assert!(config.validate().unwrap_err().contains("content_class"));
    }
}
