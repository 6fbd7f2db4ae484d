//! Picking mode: hover highlights, a click selects.
//!
//! All picking state lives in a [`PickingSession`] owned by the page context,
//! so independent pages (and tests) never share a "current element".

use crate::agent::apply::set_style_property;
use crate::config::HighlightSettings;
use crate::dom::dom_tree::{Document, NodeRef};
use crate::messaging::SelectedElementDescriptor;
use log::debug;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEventKind {
    Over,
    Out,
    Click,
}

#[derive(Debug, Clone)]
pub struct PointerEvent {
    pub kind: PointerEventKind,
    pub target: NodeRef,
}

impl PointerEvent {
    pub fn over(target: NodeRef) -> Self {
        PointerEvent {
            kind: PointerEventKind::Over,
            target,
        }
    }

    pub fn out(target: NodeRef) -> Self {
        PointerEvent {
            kind: PointerEventKind::Out,
            target,
        }
    }

    pub fn click(target: NodeRef) -> Self {
        PointerEvent {
            kind: PointerEventKind::Click,
            target,
        }
    }
}

/// What the page should do with an event after the agent saw it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventOutcome {
    pub default_prevented: bool,
    pub propagation_stopped: bool,
}

/// Describe an element node for the inspector.
pub fn describe(node: &NodeRef) -> Option<SelectedElementDescriptor> {
    let node_ref = node.borrow();
    let elem = node_ref.element()?;
    Some(SelectedElementDescriptor {
        tag_name: elem.tag_name(),
        class_name: elem.class_name().to_string(),
        id: elem.id().to_string(),
    })
}

#[derive(Debug, Default)]
pub struct PickingSession {
    /// Listeners are installed.
    picking: bool,
    highlighted: Option<NodeRef>,
    selected: Option<NodeRef>,
}

impl PickingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_picking(&self) -> bool {
        self.picking
    }

    pub fn selected(&self) -> Option<NodeRef> {
        self.selected.clone()
    }

    pub fn highlighted(&self) -> Option<NodeRef> {
        self.highlighted.clone()
    }

    /// Enter picking mode. There is no cancel: it ends on a click or when
    /// the page unloads.
    pub fn start(&mut self, document: &Document) {
        if let Some(body) = document.body() {
            set_style_property(&body, "cursor", "crosshair");
        }
        self.picking = true;
    }

    /// Feed a pointer event. Returns the event outcome and, on the click that
    /// ends picking, the descriptor of the selected element.
    pub fn handle(
        &mut self,
        document: &Document,
        event: &PointerEvent,
        highlight: &HighlightSettings,
    ) -> (EventOutcome, Option<SelectedElementDescriptor>) {
        if !self.picking || !event.target.borrow().is_element() {
            return (EventOutcome::default(), None);
        }
        match event.kind {
            PointerEventKind::Over => {
                if let Some(previous) = self.highlighted.take() {
                    set_style_property(&previous, "outline", "");
                }
                set_style_property(&event.target, "outline", &highlight.hover_outline);
                set_style_property(&event.target, "outline-offset", &highlight.hover_outline_offset);
                self.highlighted = Some(Rc::clone(&event.target));
                (EventOutcome::default(), None)
            }
            PointerEventKind::Out => {
                set_style_property(&event.target, "outline", "");
                (EventOutcome::default(), None)
            }
            PointerEventKind::Click => {
                if let Some(body) = document.body() {
                    set_style_property(&body, "cursor", "default");
                }
                if let Some(previous) = self.highlighted.take() {
                    if !Rc::ptr_eq(&previous, &event.target) {
                        set_style_property(&previous, "outline", "");
                    }
                }
                set_style_property(&event.target, "outline", &highlight.selected_outline);
                self.selected = Some(Rc::clone(&event.target));
                self.picking = false;

                let descriptor = describe(&event.target);
                debug!("Picked {:?}", descriptor.as_ref().map(|d| d.label()));
                let outcome = EventOutcome {
                    default_prevented: true,
                    propagation_stopped: true,
                };
                (outcome, descriptor)
            }
        }
    }

    /// Remove the picking listeners without selecting anything.
    pub fn stop(&mut self) {
        self.picking = false;
        self.highlighted = None;
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }
}
