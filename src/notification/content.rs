//! ContentWatcher - 观察单个通知容器，隐藏匹配规则的通知
//!
//! 启动后先对容器现有子元素做一次全量检查（空批次），之后只检查每批新增的节点。
//! 新增节点插入时已带完整内容，所以只观察直接子节点即可。

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::extractor::ElementExtractor;
use super::suppression::{is_suppressed, suppress};
use crate::dom::{Document, Node, WatchScope};
use crate::rule::MatchRule;
use crate::watcher::{ChangeWatcher, FireSchedule, WatchError, WatchOptions};

/// 运行统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    /// 挂上 ContentWatcher 的容器数
    pub containers_attached: usize,
    /// 交给提取器的元素数（已隐藏的不计）
    pub elements_examined: usize,
    /// 被隐藏的元素数
    pub elements_suppressed: usize,
}

/// 所有 ContentWatcher 共享的只读部件和统计
pub struct FilterContext {
    pub(crate) container_class: String,
    pub(crate) schedule: FireSchedule,
    extractor: Box<dyn ElementExtractor>,
    rule: Box<dyn MatchRule>,
    stats: RefCell<FilterStats>,
}

impl FilterContext {
    pub fn new(
        container_class: impl Into<String>,
        schedule: FireSchedule,
        extractor: Box<dyn ElementExtractor>,
        rule: Box<dyn MatchRule>,
    ) -> Self {
        Self {
            container_class: container_class.into(),
            schedule,
            extractor,
            rule,
            stats: RefCell::new(FilterStats::default()),
        }
    }

    pub fn stats(&self) -> FilterStats {
        *self.stats.borrow()
    }

    pub(crate) fn record_container(&self) {
        self.stats.borrow_mut().containers_attached += 1;
    }

    /// 检查单个元素，匹配则隐藏；返回是否隐藏了它
    pub fn process(&self, element: &Node) -> bool {
        // 已隐藏的元素在提取之前短路
        if !element.is_element() || is_suppressed(element) {
            return false;
        }
        self.stats.borrow_mut().elements_examined += 1;

        let Some(record) = self.extractor.extract(element) else {
            return false;
        };
        if !self.rule.evaluate(&record) {
            debug!(category = %record.category, "notification does not match, kept");
            return false;
        }

        suppress(element);
        self.stats.borrow_mut().elements_suppressed += 1;
        info!(
            category = %record.category,
            text = %preview(&record.text),
            "notification suppressed"
        );
        true
    }
}

/// 日志用的文本预览，按字符截断避免切断多字节字符
fn preview(text: &str) -> String {
    const LIMIT: usize = 80;
    if text.chars().count() > LIMIT {
        let truncated: String = text.chars().take(LIMIT).collect();
        format!("{}...", truncated)
    } else {
        text.to_string()
    }
}

/// 绑定到单个通知容器的 watcher
#[derive(Debug, Clone)]
pub struct ContentWatcher {
    watcher: ChangeWatcher,
}

impl ContentWatcher {
    pub fn new(
        document: &Document,
        container: &Node,
        context: Rc<FilterContext>,
        cancel: CancellationToken,
    ) -> Result<Self, WatchError> {
        let options = WatchOptions {
            scope: WatchScope::Children,
            immediate: true,
            schedule: context.schedule,
            cancel: Some(cancel),
            stop_when_detached: true,
            ..WatchOptions::new(container)
        };
        let watcher = ChangeWatcher::new(document, options, move |records, watcher| {
            if records.is_empty() {
                for child in watcher.target().children() {
                    context.process(&child);
                }
                return;
            }
            for record in records {
                for node in &record.added_nodes {
                    context.process(node);
                }
            }
        })?;
        Ok(Self { watcher })
    }

    pub fn start(&self) {
        self.watcher.start();
    }

    pub fn stop(&self) {
        self.watcher.stop();
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_running()
    }

    pub fn watcher(&self) -> &ChangeWatcher {
        &self.watcher
    }

    pub fn container(&self) -> &Node {
        self.watcher.target()
    }
}
