//! PresenceWatcher - 发现新插入的通知容器并为其挂上 ContentWatcher
//!
//! 状态只有 Idle / Watching。自身不隐藏任何东西，只负责发现和分派。
//! ContentWatcher 由各自的原生注册保活，这里不持有它们，
//! 这样容器被移除后可以连同登记表条目一起被回收。

use std::cell::RefCell;
use std::rc::Rc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::content::{ContentWatcher, FilterContext};
use super::registry::ContainerRegistry;
use crate::dom::{Document, MutationRecord, Node, WatchScope, WeakDocument};
use crate::watcher::{ChangeWatcher, FireSchedule, WatchError, WatchOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    Idle,
    Watching,
}

pub struct PresenceWatcher {
    watcher: ChangeWatcher,
    registry: Rc<RefCell<ContainerRegistry>>,
}

impl PresenceWatcher {
    /// 绑定到文档 body；`cancel` 的子 token 会传给每个 ContentWatcher
    pub fn new(
        document: &Document,
        context: Rc<FilterContext>,
        cancel: CancellationToken,
    ) -> Result<Self, WatchError> {
        let registry = Rc::new(RefCell::new(ContainerRegistry::new()));
        let discovery = Discovery {
            document: document.downgrade(),
            context,
            registry: Rc::clone(&registry),
            cancel: cancel.clone(),
        };
        let options = WatchOptions {
            scope: WatchScope::Children,
            // 启动时已存在的容器也要接管
            immediate: true,
            schedule: FireSchedule::Synchronous,
            cancel: Some(cancel),
            ..WatchOptions::new(&document.body())
        };
        let watcher = ChangeWatcher::new(document, options, move |records, watcher| {
            discovery.on_batch(records, watcher.target())
        })?;
        Ok(Self { watcher, registry })
    }

    pub fn start(&self) {
        self.watcher.start();
    }

    pub fn stop(&self) {
        self.watcher.stop();
    }

    pub fn state(&self) -> PresenceState {
        if self.watcher.is_running() {
            PresenceState::Watching
        } else {
            PresenceState::Idle
        }
    }

    pub fn is_watching(&self) -> bool {
        self.state() == PresenceState::Watching
    }

    /// 仍存活的已登记容器数
    pub fn known_containers(&self) -> usize {
        self.registry.borrow().len()
    }
}

struct Discovery {
    document: WeakDocument,
    context: Rc<FilterContext>,
    registry: Rc<RefCell<ContainerRegistry>>,
    cancel: CancellationToken,
}

impl Discovery {
    fn on_batch(&self, records: &[MutationRecord], body: &Node) {
        if records.is_empty() {
            for child in body.children() {
                self.consider(&child);
            }
            return;
        }
        for record in records {
            for node in &record.added_nodes {
                self.consider(node);
            }
        }
    }

    fn consider(&self, node: &Node) {
        if !node.is_element() || !node.has_class(&self.context.container_class) {
            return;
        }
        if self.registry.borrow().has_seen(node) {
            debug!(container = ?node, "container already watched");
            return;
        }
        let Some(document) = self.document.upgrade() else {
            return;
        };

        match ContentWatcher::new(
            &document,
            node,
            Rc::clone(&self.context),
            self.cancel.child_token(),
        ) {
            Ok(content) => {
                content.start();
                if !content.is_running() {
                    debug!(container = ?node, "container left the document before it was watched");
                    return;
                }
                self.registry.borrow_mut().mark_watched(node, content.watcher());
                self.context.record_container();
                info!(container = ?node, "watching notification container");
            }
            Err(e) => warn!(container = ?node, error = %e, "failed to watch container"),
        }
    }
}
