//! Limeade - 观察页面通知容器，自动隐藏匹配规则的通知

pub mod cli;
pub mod config;
pub mod dom;
pub mod notification;
pub mod rule;
pub mod watcher;

pub use config::FilterConfig;
pub use dom::{Document, MutationRecord, Node, WatchScope};
pub use notification::{
    Category, ContentWatcher, ElementExtractor, FilterError, FilterStats, NotificationFilter,
    NotificationRecord, NotistackExtractor, PresenceWatcher,
};
pub use rule::{ExpressionRule, MatchRule, PatternRule, RuleConfig, RuleError};
pub use watcher::{ChangeWatcher, FireSchedule, WatchError, WatchOptions};
