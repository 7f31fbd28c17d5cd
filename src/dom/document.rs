//! 文档与宿主事件循环
//!
//! 模拟浏览器对本库可见的那部分语义：
//! - 子节点变更只会排队，绝不会在修改调用内部同步回调观察者
//! - 微任务检查点按注册顺序向每个观察者投递一批记录
//! - 动画帧回调在 `render_frame` 时执行
//! - 取消信号在检查点被轮询，触发对应的 abort 监听器

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::node::{Node, NodeKind};

/// 原生观察范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchScope {
    /// 只观察目标的直接子节点
    #[default]
    Children,
    /// 观察目标的整个子树
    Subtree,
}

/// 一条子节点变更记录
#[derive(Debug, Clone)]
pub struct MutationRecord {
    /// 子节点列表发生变化的节点
    pub target: Node,
    pub added_nodes: Vec<Node>,
    pub removed_nodes: Vec<Node>,
}

/// 原生观察注册的句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// abort 监听器句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AbortListenerId(u64);

type MutationCallback = Rc<RefCell<dyn FnMut(Vec<MutationRecord>)>>;

struct Registration {
    id: ObserverId,
    target: Node,
    scope: WatchScope,
    callback: MutationCallback,
    pending: Vec<MutationRecord>,
}

impl Registration {
    fn observes(&self, changed: &Node) -> bool {
        match self.scope {
            WatchScope::Children => self.target.ptr_eq(changed),
            WatchScope::Subtree => self.target.contains(changed),
        }
    }
}

struct AbortListener {
    id: AbortListenerId,
    token: CancellationToken,
    callback: Box<dyn FnOnce()>,
}

#[derive(Default)]
struct HostState {
    next_id: u64,
    observers: Vec<Registration>,
    microtasks: VecDeque<Box<dyn FnOnce()>>,
    frames: Vec<Box<dyn FnOnce()>>,
    abort_listeners: Vec<AbortListener>,
}

impl HostState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

pub(crate) struct DocumentInner {
    root: Node,
    body: Node,
    state: RefCell<HostState>,
}

/// 文档句柄（单线程，可廉价克隆）
#[derive(Clone)]
pub struct Document {
    inner: Rc<DocumentInner>,
}

/// 不持有文档的弱引用，供节点和观察者回指
#[derive(Clone)]
pub struct WeakDocument(Weak<DocumentInner>);

impl Document {
    /// 创建只含 `<body>` 的空文档
    pub fn new() -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<DocumentInner>| {
            let owner = WeakDocument(weak.clone());
            let root = Node::new(NodeKind::Document, owner.clone());
            let body = Node::new(
                NodeKind::Element {
                    tag: "body".to_string(),
                },
                owner,
            );
            root.attach_unobserved(&body);
            DocumentInner {
                root,
                body,
                state: RefCell::new(HostState::default()),
            }
        });
        Self { inner }
    }

    /// 文档节点
    pub fn root(&self) -> Node {
        self.inner.root.clone()
    }

    pub fn body(&self) -> Node {
        self.inner.body.clone()
    }

    pub fn downgrade(&self) -> WeakDocument {
        WeakDocument(Rc::downgrade(&self.inner))
    }

    pub fn ptr_eq(&self, other: &Document) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn create_element(&self, tag: &str) -> Node {
        Node::new(
            NodeKind::Element {
                tag: tag.to_string(),
            },
            self.downgrade(),
        )
    }

    pub fn create_text(&self, text: &str) -> Node {
        let node = Node::new(NodeKind::Text, self.downgrade());
        node.set_text(text);
        node
    }

    /// 注册原生子节点观察
    pub fn observe<F>(&self, target: &Node, scope: WatchScope, callback: F) -> ObserverId
    where
        F: FnMut(Vec<MutationRecord>) + 'static,
    {
        let mut state = self.inner.state.borrow_mut();
        let id = ObserverId(state.next_id());
        state.observers.push(Registration {
            id,
            target: target.clone(),
            scope,
            callback: Rc::new(RefCell::new(callback)),
            pending: Vec::new(),
        });
        id
    }

    /// 注销观察并丢弃尚未投递的记录；返回是否确实注销了什么
    pub fn disconnect(&self, id: ObserverId) -> bool {
        let removed = {
            let mut state = self.inner.state.borrow_mut();
            state
                .observers
                .iter()
                .position(|r| r.id == id)
                .map(|index| state.observers.remove(index))
        };
        // 回调闭包在借用释放后再析构，闭包的 Drop 可能回到文档
        removed.is_some()
    }

    pub fn is_observing(&self, id: ObserverId) -> bool {
        self.inner.state.borrow().observers.iter().any(|r| r.id == id)
    }

    /// 当前存活的原生观察数量
    pub fn observer_count(&self) -> usize {
        self.inner.state.borrow().observers.len()
    }

    pub fn queue_microtask<F>(&self, task: F)
    where
        F: FnOnce() + 'static,
    {
        self.inner
            .state
            .borrow_mut()
            .microtasks
            .push_back(Box::new(task));
    }

    pub fn request_animation_frame<F>(&self, callback: F)
    where
        F: FnOnce() + 'static,
    {
        self.inner.state.borrow_mut().frames.push(Box::new(callback));
    }

    /// 在 `token` 被取消后的下一个检查点执行一次 `callback`
    pub fn on_abort<F>(&self, token: CancellationToken, callback: F) -> AbortListenerId
    where
        F: FnOnce() + 'static,
    {
        let mut state = self.inner.state.borrow_mut();
        let id = AbortListenerId(state.next_id());
        state.abort_listeners.push(AbortListener {
            id,
            token,
            callback: Box::new(callback),
        });
        id
    }

    pub fn remove_abort_listener(&self, id: AbortListenerId) -> bool {
        let removed = {
            let mut state = self.inner.state.borrow_mut();
            state
                .abort_listeners
                .iter()
                .position(|l| l.id == id)
                .map(|index| state.abort_listeners.remove(index))
        };
        removed.is_some()
    }

    pub fn abort_listener_count(&self) -> usize {
        self.inner.state.borrow().abort_listeners.len()
    }

    /// 取消 `token` 并立即分发所有已取消 token 的 abort 监听器
    ///
    /// `token` 的子 token 随之取消，其监听器也在此时运行。
    pub fn cancel_and_dispatch(&self, token: &CancellationToken) {
        token.cancel();
        self.dispatch_aborts();
    }

    /// 是否还有待执行的微任务、变更记录、abort 或动画帧
    pub fn has_pending_work(&self) -> bool {
        let state = self.inner.state.borrow();
        !state.microtasks.is_empty()
            || !state.frames.is_empty()
            || state.observers.iter().any(|r| !r.pending.is_empty())
            || state.abort_listeners.iter().any(|l| l.token.is_cancelled())
    }

    /// 微任务检查点：循环执行微任务、投递变更批次、分发 abort，直到没有新工作
    pub fn perform_microtask_checkpoint(&self) {
        loop {
            let task = self.inner.state.borrow_mut().microtasks.pop_front();
            if let Some(task) = task {
                task();
                continue;
            }
            if self.deliver_mutations() {
                continue;
            }
            if self.dispatch_aborts() {
                continue;
            }
            break;
        }
    }

    /// 执行一帧：运行当前排队的动画帧回调，每个回调后跟一次检查点
    ///
    /// 返回执行的回调数。回调中新请求的帧留到下一帧。
    pub fn render_frame(&self) -> usize {
        let frames = std::mem::take(&mut self.inner.state.borrow_mut().frames);
        let count = frames.len();
        for frame in frames {
            frame();
            self.perform_microtask_checkpoint();
        }
        count
    }

    /// 运行到完全空闲
    pub fn run_until_idle(&self) {
        loop {
            self.perform_microtask_checkpoint();
            if self.render_frame() == 0 {
                break;
            }
        }
    }

    pub(crate) fn queue_child_list(&self, target: &Node, added: Vec<Node>, removed: Vec<Node>) {
        let mut state = self.inner.state.borrow_mut();
        for registration in state.observers.iter_mut() {
            if registration.observes(target) {
                registration.pending.push(MutationRecord {
                    target: target.clone(),
                    added_nodes: added.clone(),
                    removed_nodes: removed.clone(),
                });
            }
        }
    }

    fn deliver_mutations(&self) -> bool {
        let batches: Vec<(ObserverId, MutationCallback, Vec<MutationRecord>)> = {
            let mut state = self.inner.state.borrow_mut();
            state
                .observers
                .iter_mut()
                .filter(|r| !r.pending.is_empty())
                .map(|r| (r.id, Rc::clone(&r.callback), std::mem::take(&mut r.pending)))
                .collect()
        };
        if batches.is_empty() {
            return false;
        }

        for (id, callback, records) in batches {
            // 本轮较早的回调可能已经注销了它
            if !self.is_observing(id) {
                continue;
            }
            match callback.try_borrow_mut() {
                Ok(mut callback) => (&mut *callback)(records),
                Err(_) => {
                    warn!(observer = ?id, "observer callback is busy, requeueing batch");
                    self.requeue(id, records);
                }
            }
        }
        true
    }

    fn requeue(&self, id: ObserverId, mut records: Vec<MutationRecord>) {
        let mut state = self.inner.state.borrow_mut();
        if let Some(registration) = state.observers.iter_mut().find(|r| r.id == id) {
            records.append(&mut registration.pending);
            registration.pending = records;
        }
    }

    fn dispatch_aborts(&self) -> bool {
        let fired: Vec<AbortListener> = {
            let mut state = self.inner.state.borrow_mut();
            let (fired, kept) = std::mem::take(&mut state.abort_listeners)
                .into_iter()
                .partition(|l| l.token.is_cancelled());
            state.abort_listeners = kept;
            fired
        };
        let any = !fired.is_empty();
        for listener in fired {
            (listener.callback)();
        }
        any
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Document")
            .field("observers", &state.observers.len())
            .field("microtasks", &state.microtasks.len())
            .field("frames", &state.frames.len())
            .field("abort_listeners", &state.abort_listeners.len())
            .finish()
    }
}

impl WeakDocument {
    pub fn upgrade(&self) -> Option<Document> {
        self.0.upgrade().map(|inner| Document { inner })
    }

    pub fn ptr_eq(&self, other: &WeakDocument) -> bool {
        self.0.ptr_eq(&other.0)
    }
}

impl fmt::Debug for WeakDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakDocument(alive: {})", self.0.strong_count() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn recorder(doc: &Document, target: &Node, scope: WatchScope) -> (ObserverId, Rc<RefCell<Vec<Vec<MutationRecord>>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let id = doc.observe(target, scope, move |records| sink.borrow_mut().push(records));
        (id, seen)
    }

    #[test]
    fn test_records_are_not_delivered_synchronously() {
        let doc = Document::new();
        let (_, seen) = recorder(&doc, &doc.body(), WatchScope::Children);

        doc.body().append_child(&doc.create_element("div")).unwrap();
        assert!(seen.borrow().is_empty());
        assert!(doc.has_pending_work());

        doc.perform_microtask_checkpoint();
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(seen.borrow()[0][0].added_nodes.len(), 1);
    }

    #[test]
    fn test_mutations_before_checkpoint_coalesce_into_one_batch() {
        let doc = Document::new();
        let (_, seen) = recorder(&doc, &doc.body(), WatchScope::Children);

        doc.body().append_child(&doc.create_element("a")).unwrap();
        doc.body().append_child(&doc.create_element("b")).unwrap();
        doc.perform_microtask_checkpoint();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].len(), 2);
    }

    #[test]
    fn test_children_scope_ignores_grandchildren() {
        let doc = Document::new();
        let wrapper = doc.create_element("div");
        doc.body().append_child(&wrapper).unwrap();
        let (_, children) = recorder(&doc, &doc.body(), WatchScope::Children);
        let (_, subtree) = recorder(&doc, &doc.body(), WatchScope::Subtree);

        wrapper.append_child(&doc.create_element("span")).unwrap();
        doc.perform_microtask_checkpoint();

        assert!(children.borrow().is_empty());
        assert_eq!(subtree.borrow().len(), 1);
    }

    #[test]
    fn test_disconnect_discards_pending_records() {
        let doc = Document::new();
        let (id, seen) = recorder(&doc, &doc.body(), WatchScope::Children);

        doc.body().append_child(&doc.create_element("div")).unwrap();
        assert!(doc.disconnect(id));
        assert!(!doc.disconnect(id));
        doc.perform_microtask_checkpoint();

        assert!(seen.borrow().is_empty());
        assert_eq!(doc.observer_count(), 0);
    }

    #[test]
    fn test_callback_mutations_are_delivered_in_same_checkpoint() {
        let doc = Document::new();
        let (_, seen) = recorder(&doc, &doc.body(), WatchScope::Subtree);
        let weak = doc.downgrade();
        let once = Cell::new(false);
        doc.observe(&doc.body(), WatchScope::Children, move |_| {
            if !once.replace(true) {
                if let Some(doc) = weak.upgrade() {
                    doc.body().append_child(&doc.create_element("echo")).unwrap();
                }
            }
        });

        doc.body().append_child(&doc.create_element("div")).unwrap();
        doc.perform_microtask_checkpoint();

        assert_eq!(seen.borrow().len(), 2);
        assert!(!doc.has_pending_work());
    }

    #[test]
    fn test_microtasks_and_frames() {
        let doc = Document::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&log);
        doc.request_animation_frame(move || sink.borrow_mut().push("frame"));
        let sink = Rc::clone(&log);
        doc.queue_microtask(move || sink.borrow_mut().push("microtask"));

        doc.perform_microtask_checkpoint();
        assert_eq!(*log.borrow(), vec!["microtask"]);

        assert_eq!(doc.render_frame(), 1);
        assert_eq!(*log.borrow(), vec!["microtask", "frame"]);
        assert_eq!(doc.render_frame(), 0);
    }

    #[test]
    fn test_abort_listener_fires_once_after_cancel() {
        let doc = Document::new();
        let token = CancellationToken::new();
        let fired = Rc::new(Cell::new(0));
        let counter = Rc::clone(&fired);
        doc.on_abort(token.clone(), move || counter.set(counter.get() + 1));

        doc.perform_microtask_checkpoint();
        assert_eq!(fired.get(), 0);

        token.cancel();
        doc.perform_microtask_checkpoint();
        doc.perform_microtask_checkpoint();
        assert_eq!(fired.get(), 1);
        assert_eq!(doc.abort_listener_count(), 0);
    }

    #[test]
    fn test_abort_dispatches_synchronously() {
        let doc = Document::new();
        let token = CancellationToken::new();
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        let id = doc.on_abort(token.clone(), move || flag.set(true));

        doc.cancel_and_dispatch(&token);
        assert!(fired.get());
        assert!(!doc.remove_abort_listener(id));
    }

    #[test]
    fn test_cancel_and_dispatch_flushes_every_cancelled_token() {
        let doc = Document::new();
        let parent = CancellationToken::new();
        let other = CancellationToken::new();
        let untouched = CancellationToken::new();
        let fired = Rc::new(Cell::new(0));
        for token in [parent.child_token(), other.clone(), untouched.clone()] {
            let counter = Rc::clone(&fired);
            doc.on_abort(token, move || counter.set(counter.get() + 1));
        }
        other.cancel();

        doc.cancel_and_dispatch(&parent);
        assert_eq!(fired.get(), 2);
        assert_eq!(doc.abort_listener_count(), 1);
    }
}
