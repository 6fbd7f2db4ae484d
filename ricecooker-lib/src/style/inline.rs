//! The inline `style` of an element.
//!
//! Declarations parsed from markup go through LightningCSS; declarations set
//! at runtime are stored verbatim, the way `element.style.x = value` is.

use crate::error::{Error, Result};
use lightningcss::printer::PrinterOptions;
use lightningcss::properties::Property;
use lightningcss::stylesheet::{ParserOptions, StyleAttribute};
use log::warn;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedDeclaration {
    /// Kebab-case property name, e.g. "background-color".
    pub property: String,
    pub value: String,
    pub important: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineStyle {
    declarations: Vec<OwnedDeclaration>,
    /// Authored text LightningCSS could not read, written back ahead of the
    /// declarations.
    unparsed: Option<String>,
}

impl InlineStyle {
    /// Parse the contents of a `style` attribute. Invalid declarations are
    /// skipped and the valid ones kept.
    pub fn parse(css_text: &str) -> Result<Self> {
        let options = ParserOptions {
            error_recovery: true,
            ..ParserOptions::default()
        };
        let attribute =
            StyleAttribute::parse(css_text, options).map_err(|e| Error::Style(e.to_string()))?;

        let block = &attribute.declarations;
        let mut declarations = Vec::new();
        for property in &block.declarations {
            if let Some(decl) = own_declaration(property, false) {
                declarations.push(decl);
            }
        }
        for property in &block.important_declarations {
            if let Some(decl) = own_declaration(property, true) {
                declarations.push(decl);
            }
        }
        Ok(InlineStyle {
            declarations,
            unparsed: None,
        })
    }

    /// A style that keeps `css_text` verbatim. Properties set later are
    /// written after it.
    pub fn unparsed(css_text: &str) -> Self {
        let trimmed = css_text.trim().trim_end_matches(';').trim_end();
        InlineStyle {
            declarations: Vec::new(),
            unparsed: (!trimmed.is_empty()).then(|| trimmed.to_string()),
        }
    }

    pub fn get(&self, property: &str) -> Option<&str> {
        self.declarations
            .iter()
            .find(|d| d.property == property)
            .map(|d| d.value.as_str())
    }

    /// Set a property. An empty value removes it.
    pub fn set_property(&mut self, property: &str, value: &str) {
        if value.is_empty() {
            self.remove_property(property);
            return;
        }
        match self.declarations.iter_mut().find(|d| d.property == property) {
            Some(decl) => {
                decl.value = value.to_string();
                decl.important = false;
            }
            None => self.declarations.push(OwnedDeclaration {
                property: property.to_string(),
                value: value.to_string(),
                important: false,
            }),
        }
    }

    pub fn remove_property(&mut self, property: &str) {
        self.declarations.retain(|d| d.property != property);
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty() && self.unparsed.is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OwnedDeclaration> {
        self.declarations.iter()
    }
}

fn own_declaration(property: &Property<'_>, important: bool) -> Option<OwnedDeclaration> {
    let name = property.property_id().name().to_string();
    match property.value_to_css_string(PrinterOptions::default()) {
        Ok(value) => Some(OwnedDeclaration {
            property: name,
            value,
            important,
        }),
        Err(e) => {
            warn!("Dropping inline declaration {}: {}", name, e);
            None
        }
    }
}

impl fmt::Display for InlineStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(raw) = &self.unparsed {
            write!(f, "{};", raw)?;
        }
        for (i, decl) in self.declarations.iter().enumerate() {
            if i > 0 || self.unparsed.is_some() {
                write!(f, " ")?;
            }
            write!(f, "{}: {}", decl.property, decl.value)?;
            if decl.important {
                write!(f, " !important")?;
            }
            write!(f, ";")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_style_attribute() {
        let style = InlineStyle::parse("display: flex; color: red !important").unwrap();
        assert_eq!(style.get("display"), Some("flex"));
        assert_eq!(style.get("color"), Some("red"));
        assert_eq!(style.to_string(), "display: flex; color: red !important;");
    }

    #[test]
    fn empty_value_removes_property() {
        let mut style = InlineStyle::default();
        style.set_property("outline", "2px solid #ff0000");
        style.set_property("outline-offset", "-2px");
        style.set_property("outline", "");
        assert_eq!(style.get("outline"), None);
        assert_eq!(style.to_string(), "outline-offset: -2px;");
    }

    #[test]
    fn invalid_declarations_are_skipped() {
        let style = InlineStyle::parse("color: red; width: ???; font-size: 12px").unwrap();
        assert_eq!(style.get("color"), Some("red"));
        assert_eq!(style.get("font-size"), Some("12px"));
    }

    #[test]
    fn unparsed_text_precedes_later_properties() {
        let mut style = InlineStyle::unparsed(" color: red; { ");
        assert!(!style.is_empty());
        assert_eq!(style.to_string(), "color: red; {;");
        style.set_property("font-size", "20px");
        assert_eq!(style.to_string(), "color: red; {; font-size: 20px;");
        assert!(InlineStyle::unparsed(" ; ").is_empty());
    }

    #[test]
    fn runtime_values_are_kept_verbatim() {
        let mut style = InlineStyle::default();
        style.set_property("background-image", "url('https://x/y.png')");
        assert_eq!(style.get("background-image"), Some("url('https://x/y.png')"));
    }
}
