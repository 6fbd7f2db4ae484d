//! Parsing HTML into the page tree and rendering it back out.
//!
//! html5ever drives a custom `TreeSink` that builds `crate::dom::dom_tree`
//! nodes with parent links, and parses inline `style` attributes on the way in.

use crate::dom::dom_tree::{self, Document, Node, NodeData, NodeRef};
use crate::style::inline::InlineStyle;
use html5ever::interface::{ElemName, ElementFlags, NodeOrText, QuirksMode, TreeSink};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{Attribute, LocalName, Namespace, QualName};
use log::{debug, warn};
use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt::Write;

/// A list of void (self-closing) elements in HTML.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose text content is written without escaping.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "xmp", "iframe", "noembed", "noframes"];

/// Creates a DOM tree from the provided HTML content.
pub fn create_dom_tree(html_content: &str) -> Document {
    let tree_sink = RiceCookerTreeSink::new();
    html5ever::parse_document(tree_sink, Default::default()).one(html_content)
}

/// A TreeSink building the page tree. Holds the document being built and
/// the quirks mode the parser reports.
pub struct RiceCookerTreeSink {
    document: Document,
    quirks_mode: RefCell<QuirksMode>,
}

impl RiceCookerTreeSink {
    pub fn new() -> Self {
        Self {
            document: dom_tree::new_document(),
            quirks_mode: RefCell::new(QuirksMode::NoQuirks),
        }
    }
}

impl Default for RiceCookerTreeSink {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct SinkElemName {
    ns: Namespace,
    local: LocalName,
}

impl ElemName for SinkElemName {
    fn local_name(&self) -> &LocalName {
        &self.local
    }

    fn ns(&self) -> &Namespace {
        &self.ns
    }
}

/// Append text to `parent`, merging with a trailing text node.
fn append_text(parent: &NodeRef, text: &str) {
    let last = parent.borrow().children.last().cloned();
    if let Some(last) = last {
        if let NodeData::Text(existing) = &mut last.borrow_mut().data {
            existing.push_str(text);
            return;
        }
    }
    dom_tree::append(parent, Node::new(NodeData::Text(text.to_string())));
}

impl TreeSink for RiceCookerTreeSink {
    type Handle = NodeRef;
    type Output = Document;
    type ElemName<'a>
        = SinkElemName
    where
        Self: 'a;

    fn finish(self) -> Self::Output {
        self.document
    }

    fn parse_error(&self, msg: Cow<'static, str>) {
        debug!("HTML parse error: {}", msg);
    }

    fn get_document(&self) -> Self::Handle {
        self.document.root.clone()
    }

    fn elem_name<'a>(&'a self, target: &'a Self::Handle) -> Self::ElemName<'a> {
        match target.borrow().element() {
            Some(elem) => SinkElemName {
                ns: elem.qual_name.ns.clone(),
                local: elem.qual_name.local.clone(),
            },
            None => panic!("elem_name called on non-element node"),
        }
    }

    fn create_element(&self, name: QualName, attrs: Vec<Attribute>, _flags: ElementFlags) -> Self::Handle {
        let mut element = dom_tree::ElementNode::new(name);
        for attr in attrs {
            let key = attr.name.local.to_string();
            let value = attr.value.to_string();
            if key.eq_ignore_ascii_case("style") {
                element.style = InlineStyle::parse(&value).unwrap_or_else(|e| {
                    warn!("Keeping unparsed style on <{}>: {}", element.tag, e);
                    InlineStyle::unparsed(&value)
                });
                continue;
            }
            element.attributes.push((key, value));
        }
        Node::new(NodeData::Element(element))
    }

    fn create_comment(&self, text: StrTendril) -> Self::Handle {
        Node::new(NodeData::Comment(text.to_string()))
    }

    fn create_pi(&self, target: StrTendril, data: StrTendril) -> Self::Handle {
        Node::new(NodeData::Comment(format!("?{} {}", target, data)))
    }

    fn append(&self, parent: &Self::Handle, child: NodeOrText<Self::Handle>) {
        match child {
            NodeOrText::AppendNode(node) => dom_tree::append(parent, node),
            NodeOrText::AppendText(text) => append_text(parent, &text),
        }
    }

    fn append_based_on_parent_node(
        &self,
        element: &Self::Handle,
        prev_element: &Self::Handle,
        child: NodeOrText<Self::Handle>,
    ) {
        if dom_tree::parent(element).is_some() {
            self.append_before_sibling(element, child);
        } else {
            self.append(prev_element, child);
        }
    }

    fn append_doctype_to_document(&self, name: StrTendril, public_id: StrTendril, system_id: StrTendril) {
        *self.document.doctype.borrow_mut() = Some(dom_tree::Doctype {
            name: name.to_string(),
            public_id: public_id.to_string(),
            system_id: system_id.to_string(),
        });
    }

    fn get_template_contents(&self, target: &Self::Handle) -> Self::Handle {
        target.clone()
    }

    fn same_node(&self, x: &Self::Handle, y: &Self::Handle) -> bool {
        std::rc::Rc::ptr_eq(x, y)
    }

    fn set_quirks_mode(&self, mode: QuirksMode) {
        *self.quirks_mode.borrow_mut() = mode;
    }

    fn append_before_sibling(&self, sibling: &Self::Handle, child: NodeOrText<Self::Handle>) {
        let Some(parent) = dom_tree::parent(sibling) else {
            return;
        };
        let node = match child {
            NodeOrText::AppendNode(node) => node,
            NodeOrText::AppendText(text) => Node::new(NodeData::Text(text.to_string())),
        };
        dom_tree::insert_before(&parent, node, sibling);
    }

    fn add_attrs_if_missing(&self, target: &Self::Handle, attrs: Vec<Attribute>) {
        let mut target_node = target.borrow_mut();
        if let Some(elem_node) = target_node.element_mut() {
            for attr in attrs {
                let key = attr.name.local.to_string();
                if elem_node.attribute(&key).is_none() {
                    elem_node.attributes.push((key, attr.value.to_string()));
                }
            }
        }
    }

    fn remove_from_parent(&self, target: &Self::Handle) {
        dom_tree::detach(target);
    }

    fn reparent_children(&self, node: &Self::Handle, new_parent: &Self::Handle) {
        let children = std::mem::take(&mut node.borrow_mut().children);
        for child in children {
            child.borrow_mut().parent = None;
            dom_tree::append(new_parent, child);
        }
    }
}

/// Render the document back to HTML, with each element's inline style
/// written into its `style` attribute.
pub fn serialize_document(document: &Document) -> String {
    let mut out = String::new();
    if let Some(doctype) = &*document.doctype.borrow() {
        let _ = write!(out, "<!DOCTYPE {}>", doctype.name);
    }
    serialize_node(&document.root, &mut out);
    out
}

/// Render one subtree, including `node` itself.
pub fn serialize_node(node: &NodeRef, out: &mut String) {
    let node_ref = node.borrow();
    match &node_ref.data {
        NodeData::DocumentRoot => {
            for child in &node_ref.children {
                serialize_node(child, out);
            }
        }
        NodeData::Element(elem) => {
            let _ = write!(out, "<{}", elem.tag);
            let inline_style = !elem.style.is_empty();
            for (k, v) in &elem.attributes {
                if inline_style && k.eq_ignore_ascii_case("style") {
                    continue;
                }
                let _ = write!(out, " {}=\"{}\"", k, escape_attribute(v));
            }
            if inline_style {
                let _ = write!(out, " style=\"{}\"", escape_attribute(&elem.style.to_string()));
            }
            out.push('>');

            if VOID_ELEMENTS.contains(&elem.tag.as_str()) {
                return;
            }
            let raw = RAW_TEXT_ELEMENTS.contains(&elem.tag.as_str());
            for child in &node_ref.children {
                match (&child.borrow().data, raw) {
                    (NodeData::Text(text), true) => out.push_str(text),
                    _ => serialize_node(child, out),
                }
            }
            let _ = write!(out, "</{}>", elem.tag);
        }
        NodeData::Text(text) => out.push_str(&escape_text(text)),
        NodeData::Comment(text) => {
            let _ = write!(out, "<!--{}-->", text);
        }
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('\u{a0}', "&nbsp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('\u{a0}', "&nbsp;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trips_simple_page() {
        let html = r#"<!DOCTYPE html><html><head></head><body><div class="red" style="display: flex;">Hello &amp; bye<img id="logo" src="a.png"></div><!--note--></body></html>"#;
        let document = create_dom_tree(html);
        assert_eq!(serialize_document(&document), html);
    }

    #[test]
    fn inline_style_is_parsed_from_markup() {
        let document = create_dom_tree(r#"<p id="x" style="color: red; font-size: 12px">a</p>"#);
        let p = document.get_element_by_id("x").unwrap();
        let p_ref = p.borrow();
        let elem = p_ref.element().unwrap();
        assert_eq!(elem.style.get("color"), Some("red"));
        assert_eq!(elem.style.get("font-size"), Some("12px"));
        assert!(elem.attribute("style").is_none());
    }

    #[test]
    fn implied_elements_and_parent_links() {
        let document = create_dom_tree("<p>one<p>two");
        let body = document.body().unwrap();
        let paragraphs = dom_tree::element_children(&body);
        assert_eq!(paragraphs.len(), 2);
        for p in &paragraphs {
            assert!(std::rc::Rc::ptr_eq(&dom_tree::parent(p).unwrap(), &body));
        }
        assert_eq!(
            serialize_document(&document),
            "<html><head></head><body><p>one</p><p>two</p></body></html>"
        );
    }

    #[test]
    fn uppercase_markup_gets_lowercase_tags() {
        let document = create_dom_tree(r#"<DIV ID="box"><IMG SRC="a.png"></DIV>"#);
        let div = document.get_element_by_id("box").unwrap();
        let div_ref = div.borrow();
        let elem = div_ref.element().unwrap();
        assert!(elem.is_tag("div"));
        assert_eq!(elem.tag_name(), "DIV");
        assert!(serialize_document(&document).contains(r#"<div id="box"><img src="a.png"></div>"#));
    }

    #[test]
    fn adjacent_text_is_merged() {
        let document = create_dom_tree("<div id=\"t\">a&lt;b</div>");
        let div = document.get_element_by_id("t").unwrap();
        assert_eq!(div.borrow().children.len(), 1);
        let mut out = String::new();
        serialize_node(&div, &mut out);
        assert_eq!(out, "<div id=\"t\">a&lt;b</div>");
    }

    #[test]
    fn authored_style_survives_a_later_override() {
        let document = create_dom_tree(r#"<div id="a" style="color: red; {"></div>"#);
        let div = document.get_element_by_id("a").unwrap();
        div.borrow_mut()
            .element_mut()
            .unwrap()
            .style
            .set_property("font-size", "20px");
        let html = serialize_document(&document);
        assert!(html.contains("color: red"), "{}", html);
        assert!(html.contains("font-size: 20px;"), "{}", html);
        assert_eq!(html.matches("style=").count(), 1);
    }

    #[test]
    fn script_text_is_not_escaped() {
        let document = create_dom_tree("<script>if (a < b) {}</script>");
        assert!(serialize_document(&document).contains("<script>if (a < b) {}</script>"));
    }
}
