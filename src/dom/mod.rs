//! 宿主页面模型 - 带浏览器式变更观察的单线程 DOM
//!
//! 节点通过 `Node` 句柄共享，身份比较；变更记录在微任务检查点批量投递。

mod document;
mod node;

pub use document::{
    AbortListenerId, Document, MutationRecord, ObserverId, WatchScope, WeakDocument,
};
pub use node::{DomError, Node, NodeKey, NodeKind, WeakNode};
