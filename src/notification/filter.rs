//! NotificationFilter - 把配置、规则、提取器和 PresenceWatcher 组装起来的入口
//!
//! # 使用示例
//! ```
//! use limeade::config::FilterConfig;
//! use limeade::dom::Document;
//! use limeade::notification::NotificationFilter;
//!
//! let document = Document::new();
//! let filter = NotificationFilter::new(&document, &FilterConfig::default()).unwrap();
//! filter.start();
//! document.run_until_idle();
//! assert!(filter.is_running());
//! ```

use std::rc::Rc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::content::{FilterContext, FilterStats};
use super::extractor::{ElementExtractor, NotistackExtractor};
use super::presence::{PresenceState, PresenceWatcher};
use super::suppression::is_suppressed;
use crate::config::FilterConfig;
use crate::dom::{Document, Node};
use crate::rule::{MatchRule, RuleError};
use crate::watcher::WatchError;

/// 组装失败
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to compile rule: {0}")]
    Rule(#[from] RuleError),
    #[error("failed to build content extractor: {0}")]
    Extractor(#[from] regex::Error),
    #[error(transparent)]
    Watch(#[from] WatchError),
}

pub struct NotificationFilter {
    document: Document,
    context: Rc<FilterContext>,
    presence: PresenceWatcher,
    cancel: CancellationToken,
}

impl NotificationFilter {
    /// 按配置编译规则并组装；规则或配置有误时直接失败
    pub fn new(document: &Document, config: &FilterConfig) -> Result<Self, FilterError> {
        config.validate().map_err(FilterError::Config)?;
        let rule = config.rule.compile()?;
        let extractor = NotistackExtractor::new(&config.content_class)?;
        Self::with_parts(document, config, Box::new(extractor), rule)
    }

    /// 使用自定义提取器和规则组装
    pub fn with_parts(
        document: &Document,
        config: &FilterConfig,
        extractor: Box<dyn ElementExtractor>,
        rule: Box<dyn MatchRule>,
    ) -> Result<Self, FilterError> {
        let context = Rc::new(FilterContext::new(
            config.container_class.clone(),
            config.schedule,
            extractor,
            rule,
        ));
        let cancel = CancellationToken::new();
        let presence = PresenceWatcher::new(document, Rc::clone(&context), cancel.clone())?;
        Ok(Self {
            document: document.clone(),
            context,
            presence,
            cancel,
        })
    }

    pub fn start(&self) {
        if self.cancel.is_cancelled() {
            warn!("notification filter already stopped, start ignored");
            return;
        }
        self.presence.start();
        if self.presence.is_watching() {
            info!(
                container_class = %self.context.container_class,
                schedule = ?self.context.schedule,
                "notification filter started"
            );
        }
    }

    /// 停止发现新容器，并通过取消信号拆除所有 ContentWatcher；之后不可再启动
    pub fn stop(&self) {
        self.presence.stop();
        self.document.cancel_and_dispatch(&self.cancel);
        info!(stats = ?self.stats(), "notification filter stopped");
    }

    pub fn is_running(&self) -> bool {
        self.presence.state() == PresenceState::Watching
    }

    pub fn presence(&self) -> &PresenceWatcher {
        &self.presence
    }

    /// 外部取消信号；取消后在下一个检查点整体停止
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stats(&self) -> FilterStats {
        self.context.stats()
    }

    /// 当前文档中已被隐藏的通知元素，按文档顺序
    pub fn suppressed(&self) -> Vec<Node> {
        self.document
            .body()
            .children()
            .into_iter()
            .filter(|node| node.has_class(&self.context.container_class))
            .flat_map(|container| container.children())
            .filter(is_suppressed)
            .collect()
    }
}
