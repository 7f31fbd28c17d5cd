//! 已观察容器登记表
//!
//! 以节点身份为键的弱引用旁表：只做成员判断，不延长容器（或其 watcher）的寿命。
//! 失效条目在下次登记时顺带清理。
//!
//! 条目可以关联容器上的 watcher。关联的 watcher 停止后（例如容器离开文档时自行终止），
//! 条目不再算作"已观察"，容器重新插入时会被再次接管。

use std::collections::HashMap;

use crate::dom::{Node, NodeKey, WeakNode};
use crate::watcher::{ChangeWatcher, WeakChangeWatcher};

#[derive(Debug)]
struct Entry {
    node: WeakNode,
    watcher: Option<WeakChangeWatcher>,
}

impl Entry {
    fn is_alive(&self) -> bool {
        self.node.is_alive()
    }

    fn is_active(&self) -> bool {
        self.watcher.as_ref().map_or(true, |w| w.is_running())
    }
}

#[derive(Debug, Default)]
pub struct ContainerRegistry {
    entries: HashMap<NodeKey, Entry>,
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_seen(&self, node: &Node) -> bool {
        self.entries
            .get(&node.key())
            .is_some_and(|entry| entry.node.points_to(node) && entry.is_active())
    }

    /// 登记容器；重复登记等同一次
    pub fn mark_seen(&mut self, node: &Node) {
        self.insert(node, None);
    }

    /// 登记容器及其 watcher
    pub fn mark_watched(&mut self, node: &Node, watcher: &ChangeWatcher) {
        self.insert(node, Some(watcher.downgrade()));
    }

    fn insert(&mut self, node: &Node, watcher: Option<WeakChangeWatcher>) {
        self.prune();
        self.entries.insert(
            node.key(),
            Entry {
                node: node.downgrade(),
                watcher,
            },
        );
    }

    /// 清理已被回收的容器，返回清理数量
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_alive());
        before - self.entries.len()
    }

    /// 仍存活的容器数量
    pub fn len(&self) -> usize {
        self.entries.values().filter(|e| e.is_alive()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
