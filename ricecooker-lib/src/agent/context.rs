//! The script context of one page: its document, picking state, and handles
//! to shared storage and settings. Every edit the Control Panel requests runs
//! here as a [`PageScript`].

use crate::agent::apply::{apply_store, ApplyReport};
use crate::agent::picking::PickingSession;
use crate::config::Settings;
use crate::dom::dom_tree::{Document, ElementNode};
use crate::error::Result;
use crate::store::{BackgroundImage, StorageArea, StyleOverride, StyleStore};
use crate::style::selector::derive_selector;
use log::{debug, info};
use std::rc::Rc;

/// A style control in the Control Panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleField {
    TextColor,
    BackgroundColor,
    FontSize,
    FontFamily,
}

impl StyleField {
    pub const ALL: [StyleField; 4] = [
        StyleField::TextColor,
        StyleField::BackgroundColor,
        StyleField::FontSize,
        StyleField::FontFamily,
    ];

    /// Id of the panel control bound to this field.
    pub fn control_id(&self) -> &'static str {
        match self {
            StyleField::TextColor => "textColor",
            StyleField::BackgroundColor => "bgColor",
            StyleField::FontSize => "fontSize",
            StyleField::FontFamily => "fontFamily",
        }
    }

    pub fn from_control_id(id: &str) -> Option<StyleField> {
        StyleField::ALL.into_iter().find(|f| f.control_id() == id)
    }

    pub fn css_property(&self) -> &'static str {
        match self {
            StyleField::TextColor => "color",
            StyleField::BackgroundColor => "background-color",
            StyleField::FontSize => "font-size",
            StyleField::FontFamily => "font-family",
        }
    }

    /// The value written to the page. Font sizes come from a numeric
    /// control and are taken as pixels.
    pub fn css_value(&self, raw: &str) -> String {
        match self {
            StyleField::FontSize => format!("{}px", raw.trim()),
            _ => raw.to_string(),
        }
    }

    fn record(&self, entry: &mut StyleOverride, value: String) {
        let slot = match self {
            StyleField::TextColor => &mut entry.color,
            StyleField::BackgroundColor => &mut entry.background_color,
            StyleField::FontSize => &mut entry.font_size,
            StyleField::FontFamily => &mut entry.font_family,
        };
        *slot = Some(value);
    }
}

/// Work the Control Panel executes in a page's script context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageScript {
    ApplyStoredStyles,
    UpdateStyle { field: StyleField, value: String },
    UpdateImageSource { url: String },
    UpdateBackgroundImage { url: String, size: String },
    RemoveSelectedElement,
}

pub struct PageContext {
    pub document: Document,
    pub session: PickingSession,
    pub storage: Rc<dyn StorageArea>,
    pub settings: Rc<Settings>,
    agent_installed: bool,
}

impl PageContext {
    pub fn new(document: Document, storage: Rc<dyn StorageArea>, settings: Rc<Settings>) -> Self {
        PageContext {
            document,
            session: PickingSession::new(),
            storage,
            settings,
            agent_installed: false,
        }
    }

    /// Mark the Page Agent as installed. Returns false if it already was.
    pub(crate) fn mark_agent_installed(&mut self) -> bool {
        !std::mem::replace(&mut self.agent_installed, true)
    }

    pub fn has_agent(&self) -> bool {
        self.agent_installed
    }

    pub fn run_script(&mut self, script: &PageScript) -> Result<()> {
        match script {
            PageScript::ApplyStoredStyles => self.apply_stored_styles().map(|_| ()),
            PageScript::UpdateStyle { field, value } => self.update_style(*field, value),
            PageScript::UpdateImageSource { url } => self.update_image_source(url),
            PageScript::UpdateBackgroundImage { url, size } => self.update_background_image(url, size),
            PageScript::RemoveSelectedElement => self.remove_selected_element().map(|_| ()),
        }
    }

    pub fn load_store(&self) -> Result<StyleStore> {
        StyleStore::load(self.storage.as_ref(), &self.settings.storage_key)
    }

    /// Read the store and apply every override to the document.
    pub fn apply_stored_styles(&self) -> Result<ApplyReport> {
        let store = self.load_store()?;
        Ok(apply_store(&self.document, &store))
    }

    /// Set one style property on the selected element and record it.
    /// Without a selection this does nothing.
    pub fn update_style(&mut self, field: StyleField, value: &str) -> Result<()> {
        let css_value = field.css_value(value);
        self.edit_selected(
            |elem| elem.style.set_property(field.css_property(), &css_value),
            |entry| field.record(entry, css_value.clone()),
        )
    }

    /// Point the selected `<img>` at a new source. Other elements are left alone.
    pub fn update_image_source(&mut self, url: &str) -> Result<()> {
        let is_image = self
            .session
            .selected()
            .is_some_and(|node| node.borrow().element().is_some_and(|e| e.is_tag("img")));
        if !is_image {
            debug!("Selected element is not an image; ignoring source update");
            return Ok(());
        }
        self.edit_selected(
            |elem| elem.set_attribute("src", url),
            |entry| entry.src = Some(url.to_string()),
        )
    }

    pub fn update_background_image(&mut self, url: &str, size: &str) -> Result<()> {
        let background = BackgroundImage::from_url(url, size);
        self.edit_selected(
            |elem| {
                for (property, value) in background.declarations() {
                    elem.style.set_property(property, value);
                }
            },
            |entry| entry.set_background(&background),
        )
    }

    /// Detach the selected element and drop its stored override. Overrides
    /// for other selectors are untouched. Returns whether anything was removed.
    pub fn remove_selected_element(&mut self) -> Result<bool> {
        let Some(node) = self.session.selected() else {
            debug!("No element selected; nothing to remove");
            return Ok(false);
        };
        let selector = derive_selector(&node);
        self.document.remove(&node);
        self.session.clear_selection();

        if let Some(selector) = selector {
            let mut store = self.load_store()?;
            if store.remove(&selector).is_some() {
                store.save(self.storage.as_ref(), &self.settings.storage_key)?;
            }
            info!("Removed element {}", selector);
        }
        Ok(true)
    }

    fn edit_selected<A, R>(&mut self, apply: A, record: R) -> Result<()>
    where
        A: FnOnce(&mut ElementNode),
        R: FnOnce(&mut StyleOverride),
    {
        let Some(node) = self.session.selected() else {
            debug!("No element selected; ignoring edit");
            return Ok(());
        };
        let Some(selector) = derive_selector(&node) else {
            return Ok(());
        };
        let mut store = self.load_store()?;

        if let Some(elem) = node.borrow_mut().element_mut() {
            apply(&mut *elem);
            elem.style
                .set_property("outline", &self.settings.highlight.edited_outline);
        }

        record(store.entry(&selector));
        store.save(self.storage.as_ref(), &self.settings.storage_key)?;
        debug!("Recorded override for {}", selector);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::picking::PointerEvent;
    use crate::parser::html::create_dom_tree;
    use crate::store::MemoryStorage;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn context(html: &str) -> PageContext {
        PageContext::new(
            create_dom_tree(html),
            Rc::new(MemoryStorage::new()),
            Rc::new(Settings::default()),
        )
    }

    fn select(ctx: &mut PageContext, id: &str) {
        let node = ctx.document.get_element_by_id(id).unwrap();
        ctx.session.start(&ctx.document);
        let highlight = ctx.settings.highlight.clone();
        ctx.session
            .handle(&ctx.document, &PointerEvent::click(node), &highlight);
    }

    fn stored(ctx: &PageContext) -> serde_json::Value {
        ctx.storage.get("elementStyles").unwrap().unwrap_or(json!(null))
    }

    #[test]
    fn edits_without_selection_are_noops() {
        let mut ctx = context(r#"<div id="a"></div>"#);
        ctx.update_style(StyleField::TextColor, "red").unwrap();
        ctx.update_background_image("x.png", "cover").unwrap();
        assert!(!ctx.remove_selected_element().unwrap());
        assert_eq!(stored(&ctx), json!(null));
    }

    #[test]
    fn font_size_is_stored_in_pixels() {
        let mut ctx = context(r#"<h1 id="title">T</h1>"#);
        select(&mut ctx, "title");
        ctx.run_script(&PageScript::UpdateStyle {
            field: StyleField::FontSize,
            value: "24".into(),
        })
        .unwrap();

        assert_eq!(stored(&ctx), json!({"#title": {"fontSize": "24px"}}));
        let title = ctx.document.get_element_by_id("title").unwrap();
        let title_ref = title.borrow();
        let elem = title_ref.element().unwrap();
        assert_eq!(elem.style.get("font-size"), Some("24px"));
        assert_eq!(elem.style.get("outline"), Some("2px solid #00ff00"));
    }

    #[test]
    fn image_source_only_changes_images() {
        let mut ctx = context(r#"<img class="hero" src="a.png"><p id="p">x</p>"#);
        select(&mut ctx, "p");
        ctx.update_image_source("b.png").unwrap();
        assert_eq!(stored(&ctx), json!(null));

        let img = ctx.document.elements().into_iter().find(|e| {
            e.borrow().element().is_some_and(|el| el.is_tag("img"))
        });
        let img = img.unwrap();
        ctx.session.start(&ctx.document);
        let highlight = ctx.settings.highlight.clone();
        ctx.session
            .handle(&ctx.document, &PointerEvent::click(img.clone()), &highlight);
        ctx.update_image_source("b.png").unwrap();

        assert_eq!(stored(&ctx), json!({".hero": {"src": "b.png"}}));
        assert_eq!(img.borrow().element().unwrap().attribute("src"), Some("b.png"));
    }

    #[test]
    fn remove_drops_only_its_own_entry() {
        let mut ctx = context(r#"<div id="a"></div><div id="b"></div>"#);
        ctx.storage
            .set(
                "elementStyles",
                json!({"#a": {"color": "red"}, "#b": {"color": "blue"}}),
            )
            .unwrap();
        select(&mut ctx, "a");
        assert!(ctx.remove_selected_element().unwrap());

        assert!(ctx.document.get_element_by_id("a").is_none());
        assert!(ctx.session.selected().is_none());
        assert_eq!(stored(&ctx), json!({"#b": {"color": "blue"}}));
    }

    #[test]
    fn control_ids_round_trip() {
        for field in StyleField::ALL {
            assert_eq!(StyleField::from_control_id(field.control_id()), Some(field));
        }
        assert_eq!(StyleField::from_control_id("imageUrl"), None);
    }
}
