//! 隐藏动作
//!
//! 只改 `display`，不移除节点：移除会破坏页面框架内部状态。

use crate::dom::Node;

const HIDDEN: &str = "none";

pub fn is_suppressed(element: &Node) -> bool {
    element.style("display").as_deref() == Some(HIDDEN)
}

/// 隐藏元素；已隐藏时不做任何修改
pub fn suppress(element: &Node) {
    if !is_suppressed(element) {
        element.set_style("display", HIDDEN);
    }
}
