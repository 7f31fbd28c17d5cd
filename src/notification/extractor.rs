//! 通知元素提取器
//!
//! 通知元素结构（notistack）：
//! ```text
//! <div>                                   ← 容器的子元素（通知元素）
//!   <div class="notistack-MuiContent notistack-MuiContent-error">
//!     ...文本...
//! ```
//! 类型从内容元素的 `<content_class>-<token>` class 读出。

use regex::Regex;
use tracing::debug;

use super::record::{Category, NotificationRecord};
use super::suppression::is_suppressed;
use crate::dom::Node;

/// 从单个通知元素提取结构化记录
pub trait ElementExtractor {
    /// 不是可识别的通知（或已被隐藏）时返回 None
    fn extract(&self, element: &Node) -> Option<NotificationRecord>;
}

/// notistack 结构的提取器
#[derive(Debug, Clone)]
pub struct NotistackExtractor {
    content_class: String,
    category_pattern: Regex,
}

impl NotistackExtractor {
    pub fn new(content_class: &str) -> Result<Self, regex::Error> {
        let category_pattern = Regex::new(&format!(r"{}-(\w+)", regex::escape(content_class)))?;
        Ok(Self {
            content_class: content_class.to_string(),
            category_pattern,
        })
    }

    pub fn content_class(&self) -> &str {
        &self.content_class
    }
}

impl ElementExtractor for NotistackExtractor {
    fn extract(&self, element: &Node) -> Option<NotificationRecord> {
        if !element.is_element() || is_suppressed(element) {
            return None;
        }
        let content = element.query_class(&self.content_class)?;
        let class_name = content.class_name();
        let token = self.category_pattern.captures(&class_name)?.get(1)?.as_str();
        let Some(category) = Category::from_token(token) else {
            debug!(token = %token, "unrecognized notification category, skipping");
            return None;
        };
        Some(NotificationRecord {
            category,
            text: element.rendered_text(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::notification::suppression::suppress;

    const CONTENT: &str = "notistack-MuiContent";

    fn notification(doc: &Document, classes: &[&str], text: &str) -> Node {
        let element = doc.create_element("div");
        let content = doc.create_element("div").with_classes(classes);
        content.append_child(&doc.create_text(text)).unwrap();
        element.append_child(&content).unwrap();
        element
    }

    #[test]
    fn test_extracts_category_and_text() {
        let doc = Document::new();
        let extractor = NotistackExtractor::new(CONTENT).unwrap();
        let el = notification(
            &doc,
            &["notistack-MuiContent", "notistack-MuiContent-error"],
            "BacklogWiki の取得に失敗しました",
        );

        let record = extractor.extract(&el).unwrap();
        assert_eq!(record.category, Category::Error);
        assert_eq!(record.text, "BacklogWiki の取得に失敗しました");
    }

    #[test]
    fn test_unknown_token_yields_none() {
        let doc = Document::new();
        let extractor = NotistackExtractor::new(CONTENT).unwrap();
        let el = notification(
            &doc,
            &["notistack-MuiContent", "notistack-MuiContent-critical"],
            "BacklogWiki",
        );
        assert!(extractor.extract(&el).is_none());
    }

    #[test]
    fn test_missing_content_element_yields_none() {
        let doc = Document::new();
        let extractor = NotistackExtractor::new(CONTENT).unwrap();
        let el = notification(&doc, &["something-else"], "BacklogWiki");
        assert!(extractor.extract(&el).is_none());
    }

    #[test]
    fn test_content_without_marker_yields_none() {
        let doc = Document::new();
        let extractor = NotistackExtractor::new(CONTENT).unwrap();
        let el = notification(&doc, &["notistack-MuiContent"], "BacklogWiki");
        assert!(extractor.extract(&el).is_none());
    }

    #[test]
    fn test_suppressed_element_yields_none() {
        let doc = Document::new();
        let extractor = NotistackExtractor::new(CONTENT).unwrap();
        let el = notification(
            &doc,
            &["notistack-MuiContent", "notistack-MuiContent-error"],
            "BacklogWiki",
        );
        suppress(&el);
        assert!(extractor.extract(&el).is_none());
    }

    #[test]
    fn test_text_nodes_are_not_notifications() {
        let doc = Document::new();
        let extractor = NotistackExtractor::new(CONTENT).unwrap();
        assert!(extractor.extract(&doc.create_text("error")).is_none());
    }
}
