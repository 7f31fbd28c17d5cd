//! 通知过滤层 - 发现通知容器并隐藏匹配规则的通知
//!
//! # 结构
//! 1. `PresenceWatcher`：观察 body 的直接子节点，发现带容器 class 的元素
//! 2. `ContentWatcher`：每个容器一个，检查新插入的通知元素
//! 3. `ElementExtractor` + `MatchRule`：把元素转成记录，再决定是否隐藏
//! 4. `NotificationFilter`：按配置组装以上部件的入口
//!
//! 隐藏只改内联样式 `display: none`，不删除节点。

pub mod content;
pub mod extractor;
pub mod filter;
pub mod presence;
pub mod record;
pub mod registry;
pub mod suppression;

pub use content::{ContentWatcher, FilterContext, FilterStats};
pub use extractor::{ElementExtractor, NotistackExtractor};
pub use filter::{FilterError, NotificationFilter};
pub use presence::{PresenceState, PresenceWatcher};
pub use record::{Category, NotificationRecord, UnknownCategory};
pub use registry::ContainerRegistry;
pub use suppression::{is_suppressed, suppress};
