use crate::dom::dom_tree::{Document, NodeRef};
use crate::store::{StyleOverride, StyleStore};
use crate::style::selector::{query_selector_all, SelectorError};
use log::{debug, error};

/// Outcome of one pass over the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Selectors that matched at least one element.
    pub matched_selectors: usize,
    pub styled_elements: usize,
    /// Selectors that could not be queried. The rest of the pass still ran.
    pub failures: Vec<SelectorError>,
}

/// Set one inline style property on an element node. An empty value clears it.
pub fn set_style_property(node: &NodeRef, property: &str, value: &str) {
    if let Some(elem) = node.borrow_mut().element_mut() {
        elem.style.set_property(property, value);
    }
}

/// Apply one override to one element.
///
/// `src` only applies to `<img>`. The background group is applied whole or
/// not at all, keyed on the image being present.
pub fn apply_override(node: &NodeRef, style: &StyleOverride) {
    let mut node_mut = node.borrow_mut();
    let Some(elem) = node_mut.element_mut() else {
        return;
    };

    if elem.is_tag("img") {
        if let Some(src) = &style.src {
            elem.set_attribute("src", src);
        }
    }
    if let Some(background) = style.background() {
        for (property, value) in background.declarations() {
            elem.style.set_property(property, value);
        }
    }
    for (property, value) in style.style_declarations() {
        elem.style.set_property(property, value);
    }
}

/// Apply every stored override to every element its selector matches.
/// Applying the same store twice leaves the document as applying it once.
pub fn apply_store(document: &Document, store: &StyleStore) -> ApplyReport {
    let mut report = ApplyReport::default();
    for (selector, style) in store.iter() {
        match query_selector_all(document, selector) {
            Ok(elements) => {
                if !elements.is_empty() {
                    report.matched_selectors += 1;
                }
                for element in &elements {
                    apply_override(element, style);
                }
                report.styled_elements += elements.len();
            }
            Err(err) => {
                error!("Failed to apply styles for selector {}: {}", selector, err);
                report.failures.push(err);
            }
        }
    }
    debug!(
        "Applied {} override(s) to {} element(s)",
        report.matched_selectors, report.styled_elements
    );
    report
}
