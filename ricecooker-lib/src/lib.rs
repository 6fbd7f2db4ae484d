//! Rice Cooker: pick an element on a page, override how it looks, and keep the
//! override applied on every later visit.
//!
//! The crate models the three surfaces of the extension (Page Agent, Control
//! Panel, Coordinator) over an in-memory DOM parsed with html5ever, and an
//! in-process [`browser::Browser`] that plays the host runtime.

pub mod agent {
    pub mod apply;
    pub mod context;
    pub mod page_agent;
    pub mod picking;
}
pub mod browser;
pub mod config;
pub mod coordinator;
pub mod dom;
pub mod error;
pub mod messaging;
pub mod panel;
pub mod parser {
    pub mod html;
}
pub mod retry;
pub mod runtime;
pub mod store;
pub mod style {
    pub mod inline;
    pub mod selector;
}

pub use error::{DeliveryError, Error, Result};
