//! DOM 节点 - 引用计数的元素/文本节点

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use super::document::{Document, WeakDocument};

/// 节点树操作错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    /// 插入会产生环（节点插入到自身或后代之下）
    #[error("cannot insert a node under itself or one of its descendants")]
    HierarchyRequest,
    /// 文本/文档节点不接受这种子节点
    #[error("{0} nodes cannot hold this child")]
    InvalidParent(&'static str),
    /// 参考节点/被移除节点不是该父节点的子节点
    #[error("node is not a child of this parent")]
    NotAChild,
    /// 节点属于另一个文档
    #[error("node belongs to a different document")]
    WrongDocument,
}

/// 节点类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element { tag: String },
    Text,
}

pub(crate) struct NodeData {
    kind: NodeKind,
    owner: WeakDocument,
    parent: RefCell<Weak<NodeData>>,
    children: RefCell<Vec<Node>>,
    classes: RefCell<Vec<String>>,
    style: RefCell<BTreeMap<String, String>>,
    text: RefCell<String>,
}

/// 节点句柄，按身份比较（同一分配即同一节点）
#[derive(Clone)]
pub struct Node(Rc<NodeData>);

/// 不持有节点的弱引用
#[derive(Clone)]
pub struct WeakNode(Weak<NodeData>);

/// 稳定的节点身份，只在节点（或其弱引用）存活期间有效
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey(usize);

impl Node {
    pub(crate) fn new(kind: NodeKind, owner: WeakDocument) -> Self {
        Node(Rc::new(NodeData {
            kind,
            owner,
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            classes: RefCell::new(Vec::new()),
            style: RefCell::new(BTreeMap::new()),
            text: RefCell::new(String::new()),
        }))
    }

    pub fn kind(&self) -> &NodeKind {
        &self.0.kind
    }

    pub fn is_element(&self) -> bool {
        matches!(self.0.kind, NodeKind::Element { .. })
    }

    pub fn tag_name(&self) -> Option<&str> {
        match &self.0.kind {
            NodeKind::Element { tag } => Some(tag.as_str()),
            _ => None,
        }
    }

    pub fn key(&self) -> NodeKey {
        NodeKey(Rc::as_ptr(&self.0) as usize)
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakNode {
        WeakNode(Rc::downgrade(&self.0))
    }

    pub fn owner_document(&self) -> Option<Document> {
        self.0.owner.upgrade()
    }

    pub(crate) fn owner(&self) -> &WeakDocument {
        &self.0.owner
    }

    pub fn parent(&self) -> Option<Node> {
        self.0.parent.borrow().upgrade().map(Node)
    }

    pub fn next_sibling(&self) -> Option<Node> {
        let parent = self.parent()?;
        let children = parent.0.children.borrow();
        let index = children.iter().position(|c| c.ptr_eq(self))?;
        children.get(index + 1).cloned()
    }

    /// 当前子节点快照
    pub fn children(&self) -> Vec<Node> {
        self.0.children.borrow().clone()
    }

    pub fn child_count(&self) -> usize {
        self.0.children.borrow().len()
    }

    /// `other` 是否为自身或后代
    pub fn contains(&self, other: &Node) -> bool {
        let mut current = Some(other.clone());
        while let Some(node) = current {
            if node.ptr_eq(self) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// 是否挂在文档树上
    pub fn is_connected(&self) -> bool {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current.0.kind == NodeKind::Document
    }

    pub fn append_child(&self, child: &Node) -> Result<(), DomError> {
        self.insert_before(child, None)
    }

    /// 插入子节点；子节点若已有父节点，先从原父节点移除
    pub fn insert_before(&self, child: &Node, reference: Option<&Node>) -> Result<(), DomError> {
        match self.0.kind {
            NodeKind::Text => return Err(DomError::InvalidParent("text")),
            NodeKind::Document if child.0.kind != NodeKind::Document && !child.is_element() => {
                return Err(DomError::InvalidParent("document"))
            }
            _ => {}
        }
        if child.0.kind == NodeKind::Document {
            return Err(DomError::HierarchyRequest);
        }
        if !self.0.owner.ptr_eq(&child.0.owner) {
            return Err(DomError::WrongDocument);
        }
        if child.contains(self) {
            return Err(DomError::HierarchyRequest);
        }
        if let Some(reference) = reference {
            if !reference.parent().is_some_and(|p| p.ptr_eq(self)) {
                return Err(DomError::NotAChild);
            }
        }

        // 以自身为参照时，参照改为其后一个兄弟节点，位置保持不变
        let reference = match reference {
            Some(r) if r.ptr_eq(child) => child.next_sibling(),
            other => other.cloned(),
        };
        let reference = reference.as_ref();

        if let Some(old_parent) = child.parent() {
            old_parent.remove_child(child)?;
        }

        {
            let mut children = self.0.children.borrow_mut();
            let index = reference
                .and_then(|r| children.iter().position(|c| c.ptr_eq(r)))
                .unwrap_or(children.len());
            children.insert(index, child.clone());
        }
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);

        if let Some(document) = self.0.owner.upgrade() {
            document.queue_child_list(self, vec![child.clone()], Vec::new());
        }
        Ok(())
    }

    pub fn remove_child(&self, child: &Node) -> Result<(), DomError> {
        {
            let mut children = self.0.children.borrow_mut();
            let index = children
                .iter()
                .position(|c| c.ptr_eq(child))
                .ok_or(DomError::NotAChild)?;
            children.remove(index);
        }
        *child.0.parent.borrow_mut() = Weak::new();

        if let Some(document) = self.0.owner.upgrade() {
            document.queue_child_list(self, Vec::new(), vec![child.clone()]);
        }
        Ok(())
    }

    /// 从父节点移除自身；没有父节点时什么也不做
    pub fn remove(&self) {
        if let Some(parent) = self.parent() {
            // 自身一定在父节点的子列表里
            let _ = parent.remove_child(self);
        }
    }

    /// 不产生变更记录的挂载，只用于文档初始化
    pub(crate) fn attach_unobserved(&self, child: &Node) {
        self.0.children.borrow_mut().push(child.clone());
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.0.classes.borrow().iter().any(|c| c == class)
    }

    pub fn add_class(&self, class: &str) {
        if !self.has_class(class) {
            self.0.classes.borrow_mut().push(class.to_string());
        }
    }

    pub fn remove_class(&self, class: &str) {
        self.0.classes.borrow_mut().retain(|c| c != class);
    }

    /// 链式添加 class，便于构造测试/回放用的树
    pub fn with_classes(self, classes: &[&str]) -> Self {
        for class in classes {
            self.add_class(class);
        }
        self
    }

    /// 空格分隔的 class 列表，等价于 `className`
    pub fn class_name(&self) -> String {
        self.0.classes.borrow().join(" ")
    }

    pub fn set_class_name(&self, class_name: &str) {
        *self.0.classes.borrow_mut() = class_name.split_whitespace().map(String::from).collect();
    }

    pub fn style(&self, property: &str) -> Option<String> {
        self.0.style.borrow().get(property).cloned()
    }

    pub fn set_style(&self, property: &str, value: &str) {
        self.0
            .style
            .borrow_mut()
            .insert(property.to_string(), value.to_string());
    }

    pub fn remove_style(&self, property: &str) {
        self.0.style.borrow_mut().remove(property);
    }

    /// 文本节点内容；元素返回空串
    pub fn text(&self) -> String {
        self.0.text.borrow().clone()
    }

    pub fn set_text(&self, text: &str) {
        *self.0.text.borrow_mut() = text.to_string();
    }

    /// 深度优先查找第一个带指定 class 的后代（不含自身）
    pub fn query_class(&self, class: &str) -> Option<Node> {
        for child in self.children() {
            if child.is_element() && child.has_class(class) {
                return Some(child);
            }
            if let Some(found) = child.query_class(class) {
                return Some(found);
            }
        }
        None
    }

    /// 全部文本内容，包括隐藏部分
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out, false);
        out
    }

    /// 渲染出的可见文本：跳过 `display: none` 的后代子树
    ///
    /// 节点自身的 display 不参与判断，与 `innerText` 在根元素上的行为一致。
    pub fn rendered_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out, true);
        out.trim().to_string()
    }

    fn collect_text(&self, out: &mut String, visible_only: bool) {
        for child in self.children() {
            match child.kind() {
                NodeKind::Text => out.push_str(&child.text()),
                NodeKind::Element { .. } => {
                    if visible_only && child.style("display").as_deref() == Some("none") {
                        continue;
                    }
                    child.collect_text(out, visible_only);
                }
                NodeKind::Document => {}
            }
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.kind {
            NodeKind::Document => write!(f, "#document"),
            NodeKind::Text => write!(f, "#text({:?})", self.0.text.borrow()),
            NodeKind::Element { tag } => {
                let classes = self.0.classes.borrow();
                if classes.is_empty() {
                    write!(f, "<{}>", tag)
                } else {
                    write!(f, "<{}.{}>", tag, classes.join("."))
                }
            }
        }
    }
}

impl WeakNode {
    pub fn upgrade(&self) -> Option<Node> {
        self.0.upgrade().map(Node)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    /// 是否指向 `node`（不升级引用）
    pub fn points_to(&self, node: &Node) -> bool {
        std::ptr::eq(self.0.as_ptr(), Rc::as_ptr(&node.0))
    }

    pub fn key(&self) -> NodeKey {
        NodeKey(self.0.as_ptr() as usize)
    }
}

impl fmt::Debug for WeakNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(node) => write!(f, "WeakNode({:?})", node),
            None => write!(f, "WeakNode(<dropped>)"),
        }
    }
}
