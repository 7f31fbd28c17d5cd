//! Watcher 配置记录

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::dom::{Node, WatchScope};

/// 立即触发（空批次）的调度时机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FireSchedule {
    /// 在 `start()` 内同步调用
    Synchronous,
    /// 推迟到当前任务结束（微任务）
    #[default]
    Microtask,
    /// 推迟到下一次绘制前（动画帧）
    NextPaint,
}

/// `ChangeWatcher` 的一次性配置
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    /// 被观察的节点，必填
    pub target: Option<Node>,
    pub scope: WatchScope,
    /// 启动后以空批次触发一次回调
    pub immediate: bool,
    pub schedule: FireSchedule,
    /// 外部取消信号
    pub cancel: Option<CancellationToken>,
    /// 目标离开文档时自行停止
    pub stop_when_detached: bool,
}

impl WatchOptions {
    pub fn new(target: &Node) -> Self {
        Self {
            target: Some(target.clone()),
            ..Self::default()
        }
    }
}

/// Watcher 构造错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WatchError {
    #[error("watch target is required")]
    MissingTarget,
    #[error("watch target belongs to a different document")]
    ForeignTarget,
}
