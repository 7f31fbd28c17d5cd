//! 变更观察子系统 - 启停生命周期、立即触发、随目标脱离自动终止

mod change_watcher;
mod options;

pub use change_watcher::{ChangeWatcher, WeakChangeWatcher};
pub use options::{FireSchedule, WatchError, WatchOptions};
pub use crate::dom::WatchScope;
