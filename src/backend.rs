//! Engine backends.
//!
//! The oracle consumes engines through three capability traits rather than
//! a shared base type: a [`UserAgent`] fetches and parses, an
//! [`EngineDocument`] exposes its sheets and root, and an
//! [`EngineElement`] answers structure and computed-style queries. Two
//! implementations live here: [`DomAgent`], a kuchiki-backed backend with a
//! small declared-value cascade, and [`SnapshotAgent`], which wires
//! precomputed snapshots (another engine's output, or test fixtures) into
//! the same interface.

use crate::error::CssDiffError;
use crate::selector::{ElementInfo, Selector, Specificity};
use crate::sheet::{Declaration, ParsedSheet};
use crate::value::ComputedStyleSnapshot;
use kuchiki::traits::TendrilSink;
use kuchiki::{NodeData, NodeRef};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleAttribute};
use std::collections::HashMap;
use std::rc::Rc;
use url::Url;

/// Attributes that carry presentational weight outside CSS.
const PRESENTATIONAL_ATTRS: &[&str] = &[
    "align", "bgcolor", "border", "cellpadding", "cellspacing", "height", "hspace", "text",
    "valign", "vspace", "width",
];

pub trait UserAgent {
    type Document: EngineDocument;

    fn name(&self) -> &str;
    fn fetch(&self, url: &Url) -> Result<Vec<u8>, CssDiffError>;
    fn parse(&self, html: &str, base_url: Option<Url>) -> Result<Self::Document, CssDiffError>;
}

pub trait EngineDocument {
    type Element: EngineElement;

    fn document_element(&self) -> Result<Self::Element, CssDiffError>;
    fn sheets(&self) -> &[ParsedSheet];

    fn sheet_hrefs(&self) -> Vec<String> {
        self.sheets()
            .iter()
            .filter_map(|sheet| sheet.href.clone())
            .collect()
    }
}

/// One child of an element, as the walker sees it.
pub enum ChildNode<E> {
    Element(E),
    Text(String),
    Other,
}

pub trait EngineElement: Clone {
    fn tag_name(&self) -> String;
    /// Selector-visible facts about this element.
    fn info(&self) -> ElementInfo;
    fn attributes(&self) -> Vec<(String, String)>;
    fn children(&self) -> Vec<ChildNode<Self>>
    where
        Self: Sized;
    fn computed_style(&self) -> Result<ComputedStyleSnapshot, CssDiffError>;
    fn has_presentational_hints(&self) -> bool;
    /// Tag path from the root, for findings (`html>body>div`).
    fn path(&self) -> String;
}

// ---------------------------------------------------------------------------
// kuchiki-backed backend

struct CascadeRule {
    selector: Selector,
    specificity: Specificity,
    order: usize,
    declarations: Vec<Declaration>,
}

struct DomShared {
    name: String,
    rules: Vec<CascadeRule>,
    sheets: Vec<ParsedSheet>,
    base_url: Option<Url>,
}

pub struct DomAgent {
    name: String,
    fetcher: Option<Box<dyn Fn(&Url) -> Result<Vec<u8>, CssDiffError>>>,
}

impl DomAgent {
    pub fn new(name: &str) -> DomAgent {
        DomAgent {
            name: name.to_string(),
            fetcher: None,
        }
    }

    /// Resolves linked style sheets through the given fetch hook (usually a
    /// fixture-cache lookup).
    pub fn with_fetcher(
        name: &str,
        fetcher: Box<dyn Fn(&Url) -> Result<Vec<u8>, CssDiffError>>,
    ) -> DomAgent {
        DomAgent {
            name: name.to_string(),
            fetcher: Some(fetcher),
        }
    }
}

impl UserAgent for DomAgent {
    type Document = DomDocument;

    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, url: &Url) -> Result<Vec<u8>, CssDiffError> {
        match &self.fetcher {
            Some(fetcher) => fetcher(url),
            None => Err(CssDiffError::Fetch(format!(
                "{}: no fetcher configured for {}",
                self.name, url
            ))),
        }
    }

    fn parse(&self, html: &str, base_url: Option<Url>) -> Result<DomDocument, CssDiffError> {
        let document = kuchiki::parse_html().one(html);
        let mut sheets = Vec::new();

        for node in document.inclusive_descendants() {
            let Some(element) = node.as_element() else {
                continue;
            };
            let tag = element.name.local.as_ref().to_ascii_lowercase();
            if tag == "style" {
                let css = node.text_contents();
                if !css.trim().is_empty() {
                    sheets.push(ParsedSheet::parse(&css, None, base_url.clone())?);
                }
            } else if tag == "link" {
                let attrs = element.attributes.borrow();
                let rel = attrs.get("rel").unwrap_or("").to_ascii_lowercase();
                let Some(href) = attrs.get("href") else {
                    continue;
                };
                if !rel.split_whitespace().any(|part| part == "stylesheet") {
                    continue;
                }
                let resolved = match &base_url {
                    Some(base) => base.join(href).ok(),
                    None => Url::parse(href).ok(),
                };
                let Some(resolved) = resolved else {
                    log::warn!("{}: unresolvable sheet href {}", self.name, href);
                    continue;
                };
                match self.fetch(&resolved) {
                    Ok(bytes) => {
                        let css = String::from_utf8_lossy(&bytes);
                        sheets.push(ParsedSheet::parse(
                            &css,
                            Some(href.to_string()),
                            Some(resolved),
                        )?);
                    }
                    Err(err) => {
                        // Degrades to an absent sheet rather than aborting.
                        log::warn!("{}: could not load {}: {}", self.name, resolved, err);
                    }
                }
            }
        }

        let mut rules = Vec::new();
        let mut order = 0usize;
        for sheet in &sheets {
            for record in &sheet.rules {
                for selector in &record.selectors {
                    rules.push(CascadeRule {
                        selector: selector.clone(),
                        specificity: selector.specificity(),
                        order,
                        declarations: record.declarations.clone(),
                    });
                }
                order += 1;
            }
        }

        Ok(DomDocument {
            root: document,
            shared: Rc::new(DomShared {
                name: self.name.clone(),
                rules,
                sheets,
                base_url,
            }),
        })
    }
}

pub struct DomDocument {
    root: NodeRef,
    shared: Rc<DomShared>,
}

impl EngineDocument for DomDocument {
    type Element = DomElement;

    fn document_element(&self) -> Result<DomElement, CssDiffError> {
        self.root
            .children()
            .find(|child| child.as_element().is_some())
            .map(|node| DomElement {
                node,
                shared: Rc::clone(&self.shared),
            })
            .ok_or_else(|| CssDiffError::MissingDocumentElement(self.shared.name.clone()))
    }

    fn sheets(&self) -> &[ParsedSheet] {
        &self.shared.sheets
    }
}

#[derive(Clone)]
pub struct DomElement {
    node: NodeRef,
    shared: Rc<DomShared>,
}

impl DomElement {
    fn info_shallow(node: &NodeRef) -> Option<ElementInfo> {
        let element = node.as_element()?;
        let attrs = element.attributes.borrow();
        let mut attr_map = HashMap::new();
        for (name, value) in attrs.map.iter() {
            attr_map.insert(
                name.local.as_ref().to_ascii_lowercase(),
                value.value.clone(),
            );
        }
        let classes = attrs
            .get("class")
            .map(|value| value.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        Some(ElementInfo {
            tag: element.name.local.as_ref().to_ascii_lowercase(),
            id: attrs.get("id").map(str::to_string),
            classes,
            attrs: attr_map,
            is_root: node
                .parent()
                .map(|parent| parent.as_element().is_none())
                .unwrap_or(true),
            child_index: 1,
            child_count: 1,
            prev_siblings: Vec::new(),
        })
    }

    fn ancestors_info(&self) -> Vec<ElementInfo> {
        let mut ancestors = Vec::new();
        let mut current = self.node.parent();
        while let Some(node) = current {
            if let Some(info) = Self::info_shallow(&node) {
                ancestors.push(info);
            }
            current = node.parent();
        }
        ancestors.reverse();
        ancestors
    }
}

impl EngineElement for DomElement {
    fn tag_name(&self) -> String {
        self.node
            .as_element()
            .map(|el| el.name.local.as_ref().to_ascii_lowercase())
            .unwrap_or_default()
    }

    fn info(&self) -> ElementInfo {
        let mut info = match Self::info_shallow(&self.node) {
            Some(info) => info,
            None => return ElementInfo::default(),
        };
        let mut prev = Vec::new();
        for sibling in self.node.preceding_siblings() {
            if let Some(sibling_info) = Self::info_shallow(&sibling) {
                prev.push(sibling_info);
            }
        }
        prev.reverse();
        let following = self
            .node
            .following_siblings()
            .filter(|node| node.as_element().is_some())
            .count();
        info.child_index = prev.len() + 1;
        info.child_count = prev.len() + 1 + following;
        info.prev_siblings = prev;
        info
    }

    fn attributes(&self) -> Vec<(String, String)> {
        let Some(element) = self.node.as_element() else {
            return Vec::new();
        };
        let attrs = element.attributes.borrow();
        attrs
            .map
            .iter()
            .map(|(name, value)| (name.local.as_ref().to_string(), value.value.clone()))
            .collect()
    }

    fn children(&self) -> Vec<ChildNode<DomElement>> {
        self.node
            .children()
            .map(|child| match child.data() {
                NodeData::Element(_) => ChildNode::Element(DomElement {
                    node: child.clone(),
                    shared: Rc::clone(&self.shared),
                }),
                NodeData::Text(text) => ChildNode::Text(text.borrow().to_string()),
                _ => ChildNode::Other,
            })
            .collect()
    }

    /// Declared winning value per property: presentational hints first,
    /// then rules by ascending specificity and order, inline style, and
    /// `!important` declarations last.
    fn computed_style(&self) -> Result<ComputedStyleSnapshot, CssDiffError> {
        let info = self.info();
        let ancestors = self.ancestors_info();
        let mut snapshot = ComputedStyleSnapshot::new(self.shared.base_url.clone());

        apply_presentational_hints(&info, &mut snapshot);

        let mut matched: Vec<&CascadeRule> = self
            .shared
            .rules
            .iter()
            .filter(|rule| rule.selector.matches(&info, &ancestors))
            .collect();
        matched.sort_by(|a, b| {
            a.specificity
                .cmp(&b.specificity)
                .then_with(|| a.order.cmp(&b.order))
        });

        for rule in &matched {
            for declaration in &rule.declarations {
                if !declaration.important {
                    snapshot.set_property(&declaration.name, &declaration.text, false);
                }
            }
        }

        let inline = self
            .node
            .as_element()
            .and_then(|el| el.attributes.borrow().get("style").map(str::to_string));
        let mut inline_important: Vec<Declaration> = Vec::new();
        if let Some(inline) = inline {
            if let Ok(style) = StyleAttribute::parse(&inline, ParserOptions::default()) {
                for property in &style.declarations.declarations {
                    if let Ok(text) = property.value_to_css_string(PrinterOptions::default()) {
                        snapshot.set_property(property.property_id().name(), &text, false);
                    }
                }
                for property in &style.declarations.important_declarations {
                    if let Ok(text) = property.value_to_css_string(PrinterOptions::default()) {
                        inline_important.push(Declaration {
                            name: property.property_id().name().to_string(),
                            text,
                            important: true,
                        });
                    }
                }
            }
        }

        for rule in &matched {
            for declaration in &rule.declarations {
                if declaration.important {
                    snapshot.set_property(&declaration.name, &declaration.text, true);
                }
            }
        }
        for declaration in inline_important {
            snapshot.set_property(&declaration.name, &declaration.text, true);
        }

        Ok(snapshot)
    }

    fn has_presentational_hints(&self) -> bool {
        let Some(element) = self.node.as_element() else {
            return false;
        };
        let attrs = element.attributes.borrow();
        PRESENTATIONAL_ATTRS
            .iter()
            .any(|name| attrs.get(*name).is_some())
    }

    fn path(&self) -> String {
        let mut tags = vec![self.tag_name()];
        let mut current = self.node.parent();
        while let Some(node) = current {
            if let Some(element) = node.as_element() {
                tags.push(element.name.local.as_ref().to_ascii_lowercase());
            }
            current = node.parent();
        }
        tags.reverse();
        tags.join(">")
    }
}

fn apply_presentational_hints(info: &ElementInfo, snapshot: &mut ComputedStyleSnapshot) {
    if let Some(bgcolor) = info.attrs.get("bgcolor") {
        snapshot.set_property("background-color", bgcolor, false);
    }
    if let Some(text) = info.attrs.get("text") {
        snapshot.set_property("color", text, false);
    }
    if let Some(align) = info.attrs.get("align") {
        snapshot.set_property("text-align", align, false);
    }
    for (attr, property) in [("width", "width"), ("height", "height")] {
        if let Some(value) = info.attrs.get(attr) {
            let value = value.trim();
            if value.chars().all(|ch| ch.is_ascii_digit()) && !value.is_empty() {
                snapshot.set_property(property, &format!("{}px", value), false);
            } else {
                snapshot.set_property(property, value, false);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// snapshot-backed backend

pub struct SnapshotAgent {
    name: String,
}

impl SnapshotAgent {
    pub fn new(name: &str) -> SnapshotAgent {
        SnapshotAgent {
            name: name.to_string(),
        }
    }

    /// Wraps an externally built tree as a document of this agent.
    pub fn document(
        &self,
        root: SnapshotElement,
        sheets: Vec<ParsedSheet>,
    ) -> SnapshotDocument {
        SnapshotDocument {
            name: self.name.clone(),
            root: Some(root),
            sheets,
        }
    }
}

impl UserAgent for SnapshotAgent {
    type Document = SnapshotDocument;

    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, url: &Url) -> Result<Vec<u8>, CssDiffError> {
        Err(CssDiffError::Fetch(format!(
            "{}: snapshot backend cannot fetch {}",
            self.name, url
        )))
    }

    fn parse(&self, _html: &str, _base_url: Option<Url>) -> Result<SnapshotDocument, CssDiffError> {
        Err(CssDiffError::Parse(format!(
            "{}: snapshot backend takes prebuilt trees",
            self.name
        )))
    }
}

pub struct SnapshotDocument {
    name: String,
    root: Option<SnapshotElement>,
    sheets: Vec<ParsedSheet>,
}

impl SnapshotDocument {
    /// A document with no root element, for exercising failure paths.
    pub fn empty(name: &str) -> SnapshotDocument {
        SnapshotDocument {
            name: name.to_string(),
            root: None,
            sheets: Vec::new(),
        }
    }
}

impl EngineDocument for SnapshotDocument {
    type Element = SnapshotElement;

    fn document_element(&self) -> Result<SnapshotElement, CssDiffError> {
        self.root
            .clone()
            .ok_or_else(|| CssDiffError::MissingDocumentElement(self.name.clone()))
    }

    fn sheets(&self) -> &[ParsedSheet] {
        &self.sheets
    }
}

enum SnapshotChild {
    Element(SnapshotElement),
    Text(String),
}

struct SnapshotNode {
    tag: String,
    attrs: Vec<(String, String)>,
    style: ComputedStyleSnapshot,
    children: Vec<SnapshotChild>,
    path: String,
    fail_style: Option<String>,
}

/// Builder-style element for precomputed trees.
#[derive(Clone)]
pub struct SnapshotElement(Rc<SnapshotNode>);

impl SnapshotElement {
    pub fn new(tag: &str) -> SnapshotElementBuilder {
        SnapshotElementBuilder {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
            style: ComputedStyleSnapshot::new(None),
            children: Vec::new(),
            fail_style: None,
        }
    }
}

pub struct SnapshotElementBuilder {
    tag: String,
    attrs: Vec<(String, String)>,
    style: ComputedStyleSnapshot,
    children: Vec<SnapshotChild>,
    fail_style: Option<String>,
}

impl SnapshotElementBuilder {
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push((name.to_string(), value.to_string()));
        self
    }

    pub fn style(mut self, style: ComputedStyleSnapshot) -> Self {
        self.style = style;
        self
    }

    pub fn property(mut self, name: &str, text: &str) -> Self {
        self.style.set_property(name, text, false);
        self
    }

    pub fn child(mut self, child: SnapshotElement) -> Self {
        self.children.push(SnapshotChild::Element(child));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.children.push(SnapshotChild::Text(text.to_string()));
        self
    }

    /// Makes `computed_style` fail with the given message, to exercise the
    /// fatal-error path.
    pub fn failing_style(mut self, message: &str) -> Self {
        self.fail_style = Some(message.to_string());
        self
    }

    pub fn build(self) -> SnapshotElement {
        let element = SnapshotElement(Rc::new(SnapshotNode {
            path: self.tag.clone(),
            tag: self.tag,
            attrs: self.attrs,
            style: self.style,
            children: self.children,
            fail_style: self.fail_style,
        }));
        element.with_paths(&element.0.tag.clone())
    }
}

impl SnapshotElement {
    fn with_paths(&self, path: &str) -> SnapshotElement {
        let children = self
            .0
            .children
            .iter()
            .map(|child| match child {
                SnapshotChild::Element(element) => {
                    let child_path = format!("{}>{}", path, element.0.tag);
                    SnapshotChild::Element(element.with_paths(&child_path))
                }
                SnapshotChild::Text(text) => SnapshotChild::Text(text.clone()),
            })
            .collect();
        SnapshotElement(Rc::new(SnapshotNode {
            tag: self.0.tag.clone(),
            attrs: self.0.attrs.clone(),
            style: self.0.style.clone(),
            children,
            path: path.to_string(),
            fail_style: self.0.fail_style.clone(),
        }))
    }
}

impl EngineElement for SnapshotElement {
    fn tag_name(&self) -> String {
        self.0.tag.clone()
    }

    fn info(&self) -> ElementInfo {
        let mut attrs = HashMap::new();
        for (name, value) in &self.0.attrs {
            attrs.insert(name.to_ascii_lowercase(), value.clone());
        }
        let classes = attrs
            .get("class")
            .map(|value| value.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        ElementInfo {
            tag: self.0.tag.clone(),
            id: attrs.get("id").cloned(),
            classes,
            attrs,
            is_root: !self.0.path.contains('>'),
            child_index: 1,
            child_count: 1,
            prev_siblings: Vec::new(),
        }
    }

    fn attributes(&self) -> Vec<(String, String)> {
        self.0.attrs.clone()
    }

    fn children(&self) -> Vec<ChildNode<SnapshotElement>> {
        self.0
            .children
            .iter()
            .map(|child| match child {
                SnapshotChild::Element(element) => ChildNode::Element(element.clone()),
                SnapshotChild::Text(text) => ChildNode::Text(text.clone()),
            })
            .collect()
    }

    fn computed_style(&self) -> Result<ComputedStyleSnapshot, CssDiffError> {
        if let Some(message) = &self.0.fail_style {
            return Err(CssDiffError::ComputedStyle {
                element: self.0.path.clone(),
                message: message.clone(),
            });
        }
        Ok(self.0.style.clone())
    }

    fn has_presentational_hints(&self) -> bool {
        self.0
            .attrs
            .iter()
            .any(|(name, _)| PRESENTATIONAL_ATTRS.contains(&name.to_ascii_lowercase().as_str()))
    }

    fn path(&self) -> String {
        self.0.path.clone()
    }
}
