use crate::style::inline::InlineStyle;
use html5ever::{LocalName, Namespace, QualName};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

pub mod dom_tree {
    use super::*;

    pub type NodeRef = Rc<RefCell<Node>>;
    pub type WeakNodeRef = Weak<RefCell<Node>>;

    pub const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

    #[derive(Debug)]
    pub struct Node {
        pub parent: Option<WeakNodeRef>,
        pub children: Vec<NodeRef>,
        pub data: NodeData,
    }

    #[derive(Debug, Clone)]
    pub enum NodeData {
        DocumentRoot,
        Element(ElementNode),
        Text(String),
        Comment(String),
    }

    #[derive(Debug, Clone)]
    pub struct ElementNode {
        /// Lowercase local name, e.g. "img".
        pub tag: String,
        pub qual_name: QualName,
        /// Attributes in source order. The `style` attribute is mirrored by
        /// `style` and rewritten from it on serialization.
        pub attributes: Vec<(String, String)>,
        pub style: InlineStyle,
    }

    /// A structural change observed under the document.
    #[derive(Debug, Clone)]
    pub struct MutationRecord {
        /// The node whose child list changed.
        pub target: NodeRef,
        pub added: usize,
        pub removed: usize,
    }

    #[derive(Debug, Default)]
    struct MutationQueue {
        observing: Cell<bool>,
        records: RefCell<Vec<MutationRecord>>,
    }

    #[derive(Debug)]
    pub struct Document {
        pub root: NodeRef,
        pub doctype: RefCell<Option<Doctype>>,
        mutations: MutationQueue,
    }

    #[derive(Debug)]
    pub struct Doctype {
        pub name: String,
        pub public_id: String,
        pub system_id: String,
    }

    impl Node {
        pub fn new(data: NodeData) -> NodeRef {
            Rc::new(RefCell::new(Node {
                parent: None,
                children: Vec::new(),
                data,
            }))
        }

        pub fn element(&self) -> Option<&ElementNode> {
            match &self.data {
                NodeData::Element(elem) => Some(elem),
                _ => None,
            }
        }

        pub fn element_mut(&mut self) -> Option<&mut ElementNode> {
            match &mut self.data {
                NodeData::Element(elem) => Some(elem),
                _ => None,
            }
        }

        pub fn is_element(&self) -> bool {
            matches!(self.data, NodeData::Element(_))
        }
    }

    impl ElementNode {
        pub fn new(qual_name: QualName) -> Self {
            ElementNode {
                tag: qual_name.local.to_ascii_lowercase().to_string(),
                qual_name,
                attributes: Vec::new(),
                style: InlineStyle::default(),
            }
        }

        /// An element in the HTML namespace.
        pub fn html(tag: &str) -> Self {
            let local = LocalName::from(tag.to_ascii_lowercase());
            ElementNode::new(QualName::new(None, Namespace::from(HTML_NAMESPACE), local))
        }

        /// Tag name as the DOM reports it for HTML elements ("IMG", "DIV").
        pub fn tag_name(&self) -> String {
            self.tag.to_ascii_uppercase()
        }

        pub fn is_tag(&self, tag: &str) -> bool {
            self.tag.eq_ignore_ascii_case(tag)
        }

        pub fn attribute(&self, name: &str) -> Option<&str> {
            self.attributes
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }

        pub fn set_attribute(&mut self, name: &str, value: &str) {
            match self
                .attributes
                .iter_mut()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
            {
                Some((_, existing)) => *existing = value.to_string(),
                None => self.attributes.push((name.to_string(), value.to_string())),
            }
        }

        pub fn remove_attribute(&mut self, name: &str) {
            self.attributes.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        }

        /// The `id` attribute, empty when absent.
        pub fn id(&self) -> &str {
            self.attribute("id").unwrap_or("")
        }

        /// The raw `class` attribute, empty when absent.
        pub fn class_name(&self) -> &str {
            self.attribute("class").unwrap_or("")
        }

        pub fn has_class(&self, class: &str) -> bool {
            self.class_name().split_whitespace().any(|c| c == class)
        }
    }

    pub fn new_document() -> Document {
        Document {
            root: Node::new(NodeData::DocumentRoot),
            doctype: RefCell::new(None),
            mutations: MutationQueue::default(),
        }
    }

    impl Default for Document {
        fn default() -> Self {
            new_document()
        }
    }

    pub fn new_element(tag: &str) -> NodeRef {
        Node::new(NodeData::Element(ElementNode::html(tag)))
    }

    pub fn parent(node: &NodeRef) -> Option<NodeRef> {
        node.borrow().parent.as_ref().and_then(Weak::upgrade)
    }

    /// The parent if it is an element; `None` for children of the document root.
    pub fn parent_element(node: &NodeRef) -> Option<NodeRef> {
        parent(node).filter(|p| p.borrow().is_element())
    }

    pub fn element_children(node: &NodeRef) -> Vec<NodeRef> {
        node.borrow()
            .children
            .iter()
            .filter(|c| c.borrow().is_element())
            .cloned()
            .collect()
    }

    /// 1-based position among the parent's element children.
    pub fn element_index(node: &NodeRef) -> Option<usize> {
        let parent = parent(node)?;
        element_children(&parent)
            .iter()
            .position(|c| Rc::ptr_eq(c, node))
            .map(|i| i + 1)
    }

    /// Number of element siblings including the node itself.
    pub fn element_sibling_count(node: &NodeRef) -> Option<usize> {
        parent(node).map(|p| element_children(&p).len())
    }

    pub fn previous_element_sibling(node: &NodeRef) -> Option<NodeRef> {
        let parent = parent(node)?;
        let siblings = element_children(&parent);
        let pos = siblings.iter().position(|c| Rc::ptr_eq(c, node))?;
        pos.checked_sub(1).map(|i| Rc::clone(&siblings[i]))
    }

    /// All element descendants of `node` in document order, excluding `node`.
    pub fn descendant_elements(node: &NodeRef) -> Vec<NodeRef> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeRef> = node.borrow().children.iter().rev().cloned().collect();
        while let Some(current) = stack.pop() {
            let current_ref = current.borrow();
            for child in current_ref.children.iter().rev() {
                stack.push(Rc::clone(child));
            }
            let is_elem = current_ref.is_element();
            drop(current_ref);
            if is_elem {
                out.push(current);
            }
        }
        out
    }

    /// Unlink `node` from its parent. No mutation record is produced.
    pub fn detach(node: &NodeRef) {
        if let Some(parent) = parent(node) {
            parent
                .borrow_mut()
                .children
                .retain(|c| !Rc::ptr_eq(c, node));
        }
        node.borrow_mut().parent = None;
    }

    /// Append `child` as the last child of `parent`, moving it if it is
    /// already attached elsewhere. No mutation record is produced.
    pub fn append(parent: &NodeRef, child: NodeRef) {
        detach(&child);
        child.borrow_mut().parent = Some(Rc::downgrade(parent));
        parent.borrow_mut().children.push(child);
    }

    /// Insert `child` before `reference` under `parent`; appends when
    /// `reference` is not a child of `parent`.
    pub fn insert_before(parent: &NodeRef, child: NodeRef, reference: &NodeRef) {
        detach(&child);
        child.borrow_mut().parent = Some(Rc::downgrade(parent));
        let mut parent_mut = parent.borrow_mut();
        let index = parent_mut
            .children
            .iter()
            .position(|c| Rc::ptr_eq(c, reference))
            .unwrap_or(parent_mut.children.len());
        parent_mut.children.insert(index, child);
    }

    impl Document {
        /// The `<html>` element.
        pub fn document_element(&self) -> Option<NodeRef> {
            element_children(&self.root).into_iter().next()
        }

        pub fn body(&self) -> Option<NodeRef> {
            self.elements()
                .into_iter()
                .find(|e| e.borrow().element().is_some_and(|el| el.is_tag("body")))
        }

        /// Every element in document order.
        pub fn elements(&self) -> Vec<NodeRef> {
            descendant_elements(&self.root)
        }

        pub fn get_element_by_id(&self, id: &str) -> Option<NodeRef> {
            self.elements()
                .into_iter()
                .find(|e| e.borrow().element().is_some_and(|el| el.id() == id))
        }

        pub fn create_element(&self, tag: &str) -> NodeRef {
            new_element(tag)
        }

        pub fn create_text_node(&self, text: &str) -> NodeRef {
            Node::new(NodeData::Text(text.to_string()))
        }

        pub fn append_child(&self, parent: &NodeRef, child: NodeRef) {
            if let Some(old_parent) = super::dom_tree::parent(&child) {
                self.record(&old_parent, 0, 1);
            }
            append(parent, child);
            self.record(parent, 1, 0);
        }

        pub fn insert_before(&self, parent: &NodeRef, child: NodeRef, reference: &NodeRef) {
            if let Some(old_parent) = super::dom_tree::parent(&child) {
                self.record(&old_parent, 0, 1);
            }
            insert_before(parent, child, reference);
            self.record(parent, 1, 0);
        }

        /// Remove `node` from the tree. Returns false if it was already detached.
        pub fn remove(&self, node: &NodeRef) -> bool {
            match super::dom_tree::parent(node) {
                Some(old_parent) => {
                    detach(node);
                    self.record(&old_parent, 0, 1);
                    true
                }
                None => false,
            }
        }

        /// Start recording child-list changes anywhere under the root.
        pub fn observe(&self) {
            self.mutations.observing.set(true);
        }

        /// Stop recording and drop pending records.
        pub fn disconnect(&self) {
            self.mutations.observing.set(false);
            self.mutations.records.borrow_mut().clear();
        }

        pub fn is_observed(&self) -> bool {
            self.mutations.observing.get()
        }

        pub fn take_records(&self) -> Vec<MutationRecord> {
            std::mem::take(&mut *self.mutations.records.borrow_mut())
        }

        fn record(&self, target: &NodeRef, added: usize, removed: usize) {
            if self.mutations.observing.get() {
                self.mutations.records.borrow_mut().push(MutationRecord {
                    target: Rc::clone(target),
                    added,
                    removed,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::dom_tree::*;

    fn build() -> (Document, NodeRef, Vec<NodeRef>) {
        let doc = new_document();
        let html = new_element("html");
        let body = new_element("body");
        append(&doc.root, html.clone());
        append(&html, body.clone());
        let kids: Vec<NodeRef> = ["p", "span", "p"].iter().map(|t| new_element(t)).collect();
        for kid in &kids {
            append(&body, kid.clone());
            append(&body, doc.create_text_node(" "));
        }
        (doc, body, kids)
    }

    #[test]
    fn element_index_skips_text_nodes() {
        let (_doc, _body, kids) = build();
        assert_eq!(element_index(&kids[0]), Some(1));
        assert_eq!(element_index(&kids[2]), Some(3));
        assert!(previous_element_sibling(&kids[0]).is_none());
        assert!(std::rc::Rc::ptr_eq(
            &previous_element_sibling(&kids[1]).unwrap(),
            &kids[0]
        ));
    }

    #[test]
    fn mutations_recorded_only_while_observed() {
        let (doc, body, kids) = build();
        doc.remove(&kids[1]);
        assert!(doc.take_records().is_empty());

        doc.observe();
        doc.append_child(&body, doc.create_element("div"));
        assert!(doc.remove(&kids[0]));
        assert!(!doc.remove(&kids[0]));
        let records = doc.take_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].added, 1);
        assert_eq!(records[1].removed, 1);

        doc.disconnect();
        doc.append_child(&body, doc.create_element("div"));
        assert!(doc.take_records().is_empty());
    }

    #[test]
    fn attribute_lookup_is_case_insensitive() {
        let mut elem = ElementNode::html("IMG");
        assert_eq!(elem.tag, "img");
        assert_eq!(elem.tag_name(), "IMG");
        elem.set_attribute("ID", "logo");
        elem.set_attribute("class", "a b");
        assert_eq!(elem.id(), "logo");
        assert!(elem.has_class("b"));
        elem.set_attribute("id", "brand");
        assert_eq!(elem.attributes.len(), 2);
        assert_eq!(elem.id(), "brand");
        elem.remove_attribute("CLASS");
        assert_eq!(elem.class_name(), "");
        assert_eq!(elem.attributes.len(), 1);
    }

    #[test]
    fn document_element_is_the_first_root_element() {
        let (doc, body, _kids) = build();
        let html = doc.document_element().unwrap();
        assert!(html.borrow().element().unwrap().is_tag("html"));
        assert!(std::rc::Rc::ptr_eq(&parent_element(&body).unwrap(), &html));
        assert!(parent_element(&html).is_none());
        assert!(new_document().document_element().is_none());
    }
}
