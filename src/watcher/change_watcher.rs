//! ChangeWatcher - 对原生子树变更观察的封装
//!
//! # 生命周期
//! - `start()` 已运行时无操作；否则注册原生观察，按需以空批次立即触发一次
//! - `stop()` 已停止时无操作；否则注销原生观察、abort 监听器和脱离检测
//! - 取消信号在启动前已触发时，`start()` 直接停在 stopped
//!
//! 原生注册持有 watcher 的强引用，与浏览器中 observer 由被观察节点保活一致：
//! 调用方不保留句柄时，watcher 会一直工作到被停止。

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use super::options::{FireSchedule, WatchError, WatchOptions};
use crate::dom::{
    AbortListenerId, Document, MutationRecord, Node, ObserverId, WatchScope, WeakDocument,
};

type ChangeCallback = dyn FnMut(&[MutationRecord], &ChangeWatcher);

struct WatcherInner {
    document: WeakDocument,
    target: Node,
    scope: WatchScope,
    immediate: bool,
    schedule: FireSchedule,
    cancel: Option<tokio_util::sync::CancellationToken>,
    stop_when_detached: bool,
    on_change: RefCell<Box<ChangeCallback>>,
    native: Cell<Option<ObserverId>>,
    abort_listener: Cell<Option<AbortListenerId>>,
    detach_watcher: RefCell<Option<ChangeWatcher>>,
}

/// 子树变更观察器句柄
#[derive(Clone)]
pub struct ChangeWatcher {
    inner: Rc<WatcherInner>,
}

impl ChangeWatcher {
    /// 校验配置并创建 watcher（不启动）
    pub fn new<F>(document: &Document, options: WatchOptions, on_change: F) -> Result<Self, WatchError>
    where
        F: FnMut(&[MutationRecord], &ChangeWatcher) + 'static,
    {
        let target = options.target.ok_or(WatchError::MissingTarget)?;
        if !target.owner().ptr_eq(&document.downgrade()) {
            return Err(WatchError::ForeignTarget);
        }

        Ok(Self {
            inner: Rc::new(WatcherInner {
                document: document.downgrade(),
                target,
                scope: options.scope,
                immediate: options.immediate,
                schedule: options.schedule,
                cancel: options.cancel,
                stop_when_detached: options.stop_when_detached,
                on_change: RefCell::new(Box::new(on_change)),
                native: Cell::new(None),
                abort_listener: Cell::new(None),
                detach_watcher: RefCell::new(None),
            }),
        })
    }

    pub fn target(&self) -> &Node {
        &self.inner.target
    }

    pub fn scope(&self) -> WatchScope {
        self.inner.scope
    }

    pub fn schedule(&self) -> FireSchedule {
        self.inner.schedule
    }

    pub fn is_running(&self) -> bool {
        self.inner.native.get().is_some()
    }

    pub fn start(&self) {
        if self.is_running() {
            return;
        }
        let Some(document) = self.inner.document.upgrade() else {
            warn!(node = ?self.inner.target, "document is gone, watcher not started");
            return;
        };
        if self.inner.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            debug!(node = ?self.inner.target, "cancel signal already fired, watcher stays stopped");
            self.stop();
            return;
        }
        if self.inner.stop_when_detached && !self.inner.target.is_connected() {
            warn!(node = ?self.inner.target, "target is not in the document, watcher not started");
            return;
        }

        let watcher = self.clone();
        let id = document.observe(&self.inner.target, self.inner.scope, move |records| {
            watcher.dispatch(&records)
        });
        self.inner.native.set(Some(id));

        if let Some(token) = &self.inner.cancel {
            let watcher = self.clone();
            let listener = document.on_abort(token.clone(), move || {
                debug!(node = ?watcher.inner.target, "cancel signal fired");
                watcher.stop();
            });
            self.inner.abort_listener.set(Some(listener));
        }

        if self.inner.stop_when_detached {
            self.attach_detach_watcher(&document);
        }

        debug!(
            node = ?self.inner.target,
            scope = ?self.inner.scope,
            immediate = self.inner.immediate,
            "watcher started"
        );

        if self.inner.immediate {
            self.fire_immediate(&document);
        }
    }

    pub fn stop(&self) {
        let Some(id) = self.inner.native.take() else {
            return;
        };
        let listener = self.inner.abort_listener.take();
        if let Some(document) = self.inner.document.upgrade() {
            document.disconnect(id);
            if let Some(listener) = listener {
                document.remove_abort_listener(listener);
            }
        }
        // 先停主 watcher，再释放脱离检测
        let detach = self.inner.detach_watcher.borrow_mut().take();
        if let Some(detach) = detach {
            detach.dispose();
        }
        debug!(node = ?self.inner.target, "watcher stopped");
    }

    /// 停止且不再复用
    pub fn dispose(&self) {
        self.stop();
    }

    pub fn ptr_eq(&self, other: &ChangeWatcher) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakChangeWatcher {
        WeakChangeWatcher(Rc::downgrade(&self.inner))
    }

    fn dispatch(&self, records: &[MutationRecord]) {
        if !self.is_running() {
            return;
        }
        // 取消信号触发后，先于 abort 分发排队的批次一律丢弃
        if self.inner.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            debug!(node = ?self.inner.target, "cancel signal fired");
            self.stop();
            return;
        }
        // 同一任务内先移除再修改时，本批次可能早于脱离检测投递
        if self.inner.stop_when_detached && !self.inner.target.is_connected() {
            debug!(node = ?self.inner.target, "target left the document");
            self.stop();
            return;
        }
        match self.inner.on_change.try_borrow_mut() {
            Ok(mut on_change) => (&mut *on_change)(records, self),
            Err(_) => {
                // 回调内部重新 start() 的同步立即触发，推迟到微任务
                if let Some(document) = self.inner.document.upgrade() {
                    let watcher = self.clone();
                    let records = records.to_vec();
                    document.queue_microtask(move || watcher.dispatch(&records));
                }
            }
        }
    }

    fn fire_immediate(&self, document: &Document) {
        match self.inner.schedule {
            FireSchedule::Synchronous => self.dispatch(&[]),
            FireSchedule::Microtask => {
                let watcher = self.clone();
                document.queue_microtask(move || watcher.dispatch(&[]));
            }
            FireSchedule::NextPaint => {
                let watcher = self.clone();
                document.request_animation_frame(move || watcher.dispatch(&[]));
            }
        }
    }

    /// 在文档根上挂一个子树 watcher，目标脱离文档时停止自身
    fn attach_detach_watcher(&self, document: &Document) {
        let primary: Weak<WatcherInner> = Rc::downgrade(&self.inner);
        let options = WatchOptions {
            scope: WatchScope::Subtree,
            ..WatchOptions::new(&document.root())
        };
        let detach = ChangeWatcher::new(document, options, move |records, _| {
            if !records.iter().any(|r| !r.removed_nodes.is_empty()) {
                return;
            }
            let Some(inner) = primary.upgrade() else {
                return;
            };
            let primary = ChangeWatcher { inner };
            if !primary.target().is_connected() {
                debug!(node = ?primary.target(), "target left the document");
                primary.stop();
            }
        });

        match detach {
            Ok(detach) => {
                detach.start();
                *self.inner.detach_watcher.borrow_mut() = Some(detach);
            }
            Err(e) => warn!(error = %e, "failed to attach detach watcher"),
        }
    }
}

/// 不保活 watcher 的弱句柄
#[derive(Clone)]
pub struct WeakChangeWatcher(Weak<WatcherInner>);

impl WeakChangeWatcher {
    pub fn upgrade(&self) -> Option<ChangeWatcher> {
        self.0.upgrade().map(|inner| ChangeWatcher { inner })
    }

    /// watcher 仍存活且在运行
    pub fn is_running(&self) -> bool {
        self.upgrade().is_some_and(|w| w.is_running())
    }
}

impl fmt::Debug for WeakChangeWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakChangeWatcher(running: {})", self.is_running())
    }
}

impl fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeWatcher")
            .field("target", &self.inner.target)
            .field("scope", &self.inner.scope)
            .field("immediate", &self.inner.immediate)
            .field("schedule", &self.inner.schedule)
            .field("running", &self.is_running())
            .finish()
    }
}
