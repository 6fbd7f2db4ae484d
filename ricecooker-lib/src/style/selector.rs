use crate::dom::dom_tree::{
    element_index, element_sibling_count, parent_element, previous_element_sibling,
    Document, ElementNode, NodeRef,
};
use thiserror::Error;

/// ------------------------------
/// 1. Selector Model
/// ------------------------------

/// Supported attribute selector operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeOperator {
    /// [attr="value"]
    Exact,
    /// [attr~="value"]
    Includes,
    /// [attr^="value"]
    Prefix,
    /// [attr$="value"]
    Suffix,
    /// [attr*="value"]
    Substring,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSelector {
    pub name: String,
    /// `None` means only an existence check.
    pub operator: Option<AttributeOperator>,
    pub value: Option<String>,
}

/// `An+B` from `:nth-child()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NthIndex {
    pub a: i32,
    pub b: i32,
}

impl NthIndex {
    /// Widened to i64: `b` may be any i32 the selector spelled out.
    pub fn matches(&self, index: i32) -> bool {
        let diff = i64::from(index) - i64::from(self.b);
        let a = i64::from(self.a);
        if a == 0 {
            return diff == 0;
        }
        diff % a == 0 && diff / a >= 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PseudoClass {
    NthChild(NthIndex),
    FirstChild,
    LastChild,
}

/// Tag, id, classes, attribute conditions and pseudo-classes that must all
/// hold for one element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompoundSelector {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: Vec<AttributeSelector>,
    pub pseudo_classes: Vec<PseudoClass>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Combinator {
    /// Descendant combinator (a space).
    Descendant,
    /// Child combinator (`>`).
    Child,
    /// Adjacent sibling combinator (`+`).
    AdjacentSibling,
    /// General sibling combinator (`~`).
    GeneralSibling,
}

/// A key compound selector and the parts to its left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexSelector {
    pub key: CompoundSelector,
    /// Ancestors with their combinators, nearest first (right-to-left order).
    pub ancestors: Vec<(Combinator, CompoundSelector)>,
}

/// Comma-separated selectors; an element matches if any of them matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList(pub Vec<ComplexSelector>);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{selector}' is not a valid selector: {reason} (at {position})")]
pub struct SelectorError {
    pub selector: String,
    pub position: usize,
    pub reason: String,
}

/// ------------------------------
/// 2. Selector Parsing
/// ------------------------------

pub fn parse_selector_list(selector: &str) -> Result<SelectorList, SelectorError> {
    let mut parser = SelectorParser::new(selector);
    let mut list = Vec::new();
    loop {
        list.push(parser.parse_complex()?);
        parser.skip_whitespace();
        match parser.peek() {
            None => break,
            Some(',') => {
                parser.bump();
            }
            Some(ch) => return Err(parser.error(format!("unexpected '{}'", ch))),
        }
    }
    Ok(SelectorList(list))
}

struct SelectorParser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> SelectorParser<'a> {
    fn new(source: &'a str) -> Self {
        SelectorParser {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn error(&self, reason: impl Into<String>) -> SelectorError {
        SelectorError {
            selector: self.source.to_string(),
            position: self.pos,
            reason: reason.into(),
        }
    }

    /// Returns true if any whitespace was consumed.
    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn parse_complex(&mut self) -> Result<ComplexSelector, SelectorError> {
        self.skip_whitespace();
        let mut parts = vec![self.parse_compound()?];
        let mut combinators = Vec::new();

        loop {
            let had_whitespace = self.skip_whitespace();
            let combinator = match self.peek() {
                None | Some(',') => break,
                Some('>') => Combinator::Child,
                Some('+') => Combinator::AdjacentSibling,
                Some('~') => Combinator::GeneralSibling,
                Some(_) if had_whitespace => Combinator::Descendant,
                Some(ch) => return Err(self.error(format!("unexpected '{}'", ch))),
            };
            if combinator != Combinator::Descendant {
                self.bump();
                self.skip_whitespace();
            }
            combinators.push(combinator);
            parts.push(self.parse_compound()?);
        }

        let key = parts.pop().ok_or_else(|| self.error("empty selector"))?;
        let ancestors = combinators.into_iter().zip(parts).rev().collect();
        Ok(ComplexSelector { key, ancestors })
    }

    fn parse_compound(&mut self) -> Result<CompoundSelector, SelectorError> {
        let mut compound = CompoundSelector::default();
        let mut matched_any = false;

        match self.peek() {
            Some('*') => {
                self.bump();
                matched_any = true;
            }
            Some(ch) if is_ident_start(ch) => {
                compound.tag = Some(self.parse_ident()?.to_ascii_lowercase());
                matched_any = true;
            }
            _ => {}
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.bump();
                    compound.id = Some(self.parse_ident()?);
                }
                Some('.') => {
                    self.bump();
                    compound.classes.push(self.parse_ident()?);
                }
                Some('[') => {
                    self.bump();
                    compound.attributes.push(self.parse_attribute()?);
                }
                Some(':') => {
                    self.bump();
                    compound.pseudo_classes.push(self.parse_pseudo_class()?);
                }
                _ => break,
            }
            matched_any = true;
        }

        if !matched_any {
            return Err(match self.peek() {
                Some(ch) => self.error(format!("expected a selector, found '{}'", ch)),
                None => self.error("expected a selector"),
            });
        }
        Ok(compound)
    }

    fn parse_ident(&mut self) -> Result<String, SelectorError> {
        let mut ident = String::new();
        while let Some(ch) = self.peek() {
            if ch == '\\' {
                self.bump();
                match self.bump() {
                    Some(escaped) => ident.push(escaped),
                    None => return Err(self.error("dangling escape")),
                }
            } else if is_ident_char(ch) {
                ident.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        let starts_badly = ident.chars().next().is_some_and(|c| c.is_ascii_digit())
            || ident.starts_with("--") && ident.len() == 2
            || ident.starts_with('-') && ident.chars().nth(1).is_some_and(|c| c.is_ascii_digit());
        if ident.is_empty() || starts_badly {
            return Err(self.error("expected an identifier"));
        }
        Ok(ident)
    }

    fn parse_attribute(&mut self) -> Result<AttributeSelector, SelectorError> {
        self.skip_whitespace();
        let name = self.parse_ident()?;
        self.skip_whitespace();

        let operator = match self.peek() {
            Some(']') => {
                self.bump();
                return Ok(AttributeSelector {
                    name,
                    operator: None,
                    value: None,
                });
            }
            Some('=') => {
                self.bump();
                AttributeOperator::Exact
            }
            Some(op @ ('~' | '^' | '$' | '*')) => {
                self.bump();
                if self.bump() != Some('=') {
                    return Err(self.error(format!("expected '=' after '{}'", op)));
                }
                match op {
                    '~' => AttributeOperator::Includes,
                    '^' => AttributeOperator::Prefix,
                    '$' => AttributeOperator::Suffix,
                    _ => AttributeOperator::Substring,
                }
            }
            _ => return Err(self.error("malformed attribute selector")),
        };

        self.skip_whitespace();
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.bump();
                let mut value = String::new();
                loop {
                    match self.bump() {
                        Some(ch) if ch == quote => break,
                        Some('\\') => match self.bump() {
                            Some(escaped) => value.push(escaped),
                            None => return Err(self.error("unterminated string")),
                        },
                        Some(ch) => value.push(ch),
                        None => return Err(self.error("unterminated string")),
                    }
                }
                value
            }
            _ => self.parse_ident()?,
        };

        self.skip_whitespace();
        if self.bump() != Some(']') {
            return Err(self.error("expected ']'"));
        }
        Ok(AttributeSelector {
            name,
            operator: Some(operator),
            value: Some(value),
        })
    }

    fn parse_pseudo_class(&mut self) -> Result<PseudoClass, SelectorError> {
        if self.peek() == Some(':') {
            return Err(self.error("pseudo-elements are not supported"));
        }
        let name = self.parse_ident()?.to_ascii_lowercase();
        match name.as_str() {
            "first-child" => Ok(PseudoClass::FirstChild),
            "last-child" => Ok(PseudoClass::LastChild),
            "nth-child" => {
                if self.bump() != Some('(') {
                    return Err(self.error("expected '(' after :nth-child"));
                }
                let mut argument = String::new();
                loop {
                    match self.bump() {
                        Some(')') => break,
                        Some(ch) => argument.push(ch),
                        None => return Err(self.error("unterminated :nth-child(")),
                    }
                }
                parse_nth(&argument)
                    .map(PseudoClass::NthChild)
                    .ok_or_else(|| self.error(format!("invalid :nth-child argument '{}'", argument)))
            }
            other => Err(self.error(format!("unsupported pseudo-class ':{}'", other))),
        }
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '-' || !ch.is_ascii()
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '-' || !ch.is_ascii()
}

/// Parse `An+B`, `odd` or `even`.
fn parse_nth(argument: &str) -> Option<NthIndex> {
    let compact: String = argument
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    match compact.as_str() {
        "" => return None,
        "odd" => return Some(NthIndex { a: 2, b: 1 }),
        "even" => return Some(NthIndex { a: 2, b: 0 }),
        _ => {}
    }
    match compact.split_once('n') {
        None => compact.parse().ok().map(|b| NthIndex { a: 0, b }),
        Some((a_part, b_part)) => {
            let a = match a_part {
                "" | "+" => 1,
                "-" => -1,
                digits => digits.parse().ok()?,
            };
            let b = if b_part.is_empty() {
                0
            } else if b_part.starts_with('+') || b_part.starts_with('-') {
                b_part.parse().ok()?
            } else {
                return None;
            };
            Some(NthIndex { a, b })
        }
    }
}

/// ------------------------------
/// 3. Selector Matching
/// ------------------------------

/// Returns true if the element matches the compound selector.
/// `node` is needed for structural pseudo-classes.
pub fn matches_compound(node: &NodeRef, elem: &ElementNode, compound: &CompoundSelector) -> bool {
    if let Some(ref tag) = compound.tag {
        if !elem.is_tag(tag) {
            return false;
        }
    }
    if let Some(ref id_val) = compound.id {
        if elem.id() != id_val {
            return false;
        }
    }
    if !compound.classes.iter().all(|c| elem.has_class(c)) {
        return false;
    }
    for attr_sel in &compound.attributes {
        let Some(actual) = elem.attribute(&attr_sel.name) else {
            return false;
        };
        let Some(expected) = attr_sel.value.as_deref() else {
            continue;
        };
        let ok = match attr_sel.operator {
            Some(AttributeOperator::Exact) => actual == expected,
            Some(AttributeOperator::Includes) => actual.split_whitespace().any(|w| w == expected),
            Some(AttributeOperator::Prefix) => !expected.is_empty() && actual.starts_with(expected),
            Some(AttributeOperator::Suffix) => !expected.is_empty() && actual.ends_with(expected),
            Some(AttributeOperator::Substring) => !expected.is_empty() && actual.contains(expected),
            None => true,
        };
        if !ok {
            return false;
        }
    }
    for pseudo in &compound.pseudo_classes {
        let ok = match pseudo {
            PseudoClass::NthChild(nth) => element_index(node)
                .is_some_and(|i| nth.matches(i32::try_from(i).unwrap_or(i32::MAX))),
            PseudoClass::FirstChild => element_index(node) == Some(1),
            PseudoClass::LastChild => match (element_index(node), element_sibling_count(node)) {
                (Some(i), Some(n)) => i == n,
                _ => false,
            },
        };
        if !ok {
            return false;
        }
    }
    true
}

fn node_matches_compound(node: &NodeRef, compound: &CompoundSelector) -> bool {
    let node_ref = node.borrow();
    match node_ref.element() {
        Some(elem) => matches_compound(node, elem, compound),
        None => false,
    }
}

/// Matches a ComplexSelector against a candidate element, right-to-left,
/// backtracking over descendant and general-sibling combinators.
pub fn matches_complex_selector(candidate: &NodeRef, complex: &ComplexSelector) -> bool {
    node_matches_compound(candidate, &complex.key) && matches_ancestors(candidate, &complex.ancestors)
}

fn matches_ancestors(node: &NodeRef, ancestors: &[(Combinator, CompoundSelector)]) -> bool {
    let Some(((combinator, compound), rest)) = ancestors.split_first() else {
        return true;
    };
    let accept = |other: &NodeRef| node_matches_compound(other, compound) && matches_ancestors(other, rest);
    match combinator {
        Combinator::Child => parent_element(node).is_some_and(|p| accept(&p)),
        Combinator::Descendant => {
            let mut ancestor = parent_element(node);
            while let Some(current) = ancestor {
                if accept(&current) {
                    return true;
                }
                ancestor = parent_element(&current);
            }
            false
        }
        Combinator::AdjacentSibling => previous_element_sibling(node).is_some_and(|s| accept(&s)),
        Combinator::GeneralSibling => {
            let mut sibling = previous_element_sibling(node);
            while let Some(current) = sibling {
                if accept(&current) {
                    return true;
                }
                sibling = previous_element_sibling(&current);
            }
            false
        }
    }
}

impl SelectorList {
    pub fn matches(&self, node: &NodeRef) -> bool {
        self.0.iter().any(|complex| matches_complex_selector(node, complex))
    }
}

/// Every element matching `selector`, in document order.
pub fn query_selector_all(document: &Document, selector: &str) -> Result<Vec<NodeRef>, SelectorError> {
    let list = parse_selector_list(selector)?;
    Ok(document
        .elements()
        .into_iter()
        .filter(|node| list.matches(node))
        .collect())
}

/// ------------------------------
/// 4. Selector Derivation
/// ------------------------------

/// The selector used to key stored overrides for an element.
///
/// `#id` when the element has an id, otherwise `.` plus the first class
/// token, otherwise `parent > tag:nth-child(k)`. Not guaranteed unique: two
/// elements sharing a first class, or a tag/position pattern under
/// same-named parents, derive the same selector.
pub fn derive_selector(node: &NodeRef) -> Option<String> {
    let node_ref = node.borrow();
    let elem = node_ref.element()?;

    if !elem.id().is_empty() {
        return Some(format!("#{}", elem.id()));
    }
    if let Some(first_class) = elem.class_name().split_whitespace().next() {
        return Some(format!(".{}", first_class));
    }

    let tag = elem.tag.to_ascii_lowercase();
    drop(node_ref);
    let Some(parent_node) = parent_element(node) else {
        // The root element (or a detached one) has no parent to anchor to.
        return Some(tag);
    };
    let parent_tag = parent_node
        .borrow()
        .element()
        .map(|p| p.tag.to_ascii_lowercase())?;
    let nth_child = element_index(node)?;
    Some(format!("{} > {}:nth-child({})", parent_tag, tag, nth_child))
}
