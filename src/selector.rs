//! Selector parsing, matching and specificity.
//!
//! Selectors are parsed into an AST deriving `PartialEq`, so the round-trip
//! checker can test selector-list equality structurally instead of through
//! the value-equivalence engine. Matching runs against an [`ElementInfo`]
//! and its ancestor slice; a selector the parser cannot model is rejected
//! rather than approximated.

use std::collections::HashMap;

use crate::value::split_top_level;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Specificity(pub u16, pub u16, pub u16);

/// Element facts a selector can observe, detached from any backend tree.
#[derive(Debug, Clone, Default)]
pub struct ElementInfo {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: HashMap<String, String>,
    pub is_root: bool,
    pub child_index: usize,
    pub child_count: usize,
    pub prev_siblings: Vec<ElementInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleSelector {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<AttrSelector>,
    pub pseudos: Vec<PseudoClass>,
}

impl SimpleSelector {
    fn matches(&self, element: &ElementInfo) -> bool {
        self.tag
            .as_deref()
            .is_none_or(|tag| tag == "*" || tag == element.tag)
            && self
                .id
                .as_deref()
                .is_none_or(|id| element.id.as_deref() == Some(id))
            && self
                .classes
                .iter()
                .all(|class| element.classes.contains(class))
            && self.attrs.iter().all(|attr| attr.matches(element))
            && self.pseudos.iter().all(|pseudo| pseudo.matches(element))
    }

    fn specificity(&self) -> Specificity {
        let named_tag = matches!(self.tag.as_deref(), Some(tag) if tag != "*");
        let mut spec = Specificity(
            u16::from(self.id.is_some()),
            (self.classes.len() + self.attrs.len()) as u16,
            u16::from(named_tag),
        );
        for pseudo in &self.pseudos {
            // `:not` contributes its argument's weight, not its own.
            if let PseudoClass::Not(inner) = pseudo {
                let Specificity(ids, classes, tags) = inner.specificity();
                spec.0 += ids;
                spec.1 += classes;
                spec.2 += tags;
            } else {
                spec.1 += 1;
            }
        }
        spec
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PseudoClass {
    Root,
    FirstChild,
    LastChild,
    NthChildEven,
    NthChildOdd,
    NthChild(usize),
    NthChildFormula { a: i32, b: i32 },
    /// Dynamic or pseudo-element states never match a static snapshot.
    Inert(String),
    Not(Box<SimpleSelector>),
}

impl PseudoClass {
    fn matches(&self, element: &ElementInfo) -> bool {
        match self {
            PseudoClass::Root => element.is_root,
            PseudoClass::FirstChild => element.child_index == 1,
            PseudoClass::LastChild => element.child_index == element.child_count,
            PseudoClass::NthChildEven => element.child_index % 2 == 0,
            PseudoClass::NthChildOdd => element.child_index % 2 == 1,
            PseudoClass::NthChild(n) => element.child_index == *n,
            PseudoClass::NthChildFormula { a, b } => {
                let idx = element.child_index as i32;
                if *a == 0 {
                    return idx == *b;
                }
                if *a > 0 {
                    if idx < *b {
                        return false;
                    }
                    (idx - *b) % *a == 0
                } else {
                    if idx > *b {
                        return false;
                    }
                    (b - idx) % (-*a) == 0
                }
            }
            PseudoClass::Inert(_) => false,
            PseudoClass::Not(selector) => !selector.matches(element),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrSelector {
    pub name: String,
    pub op: AttrOp,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    Exists,
    Equals,
    Includes,
    DashMatch,
    Prefix,
    Suffix,
    Substring,
}

impl AttrSelector {
    fn matches(&self, element: &ElementInfo) -> bool {
        let Some(actual) = element.attrs.get(&self.name) else {
            return false;
        };
        let Some(expected) = self.value.as_deref() else {
            return matches!(self.op, AttrOp::Exists);
        };
        match self.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == expected,
            AttrOp::Includes => actual.split_ascii_whitespace().any(|word| word == expected),
            AttrOp::DashMatch => {
                actual == expected
                    || (actual.starts_with(expected)
                        && actual[expected.len()..].starts_with('-'))
            }
            AttrOp::Prefix => actual.starts_with(expected),
            AttrOp::Suffix => actual.ends_with(expected),
            AttrOp::Substring => actual.contains(expected),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
    AdjacentSibling,
    GeneralSibling,
}

/// One complex selector: compound parts joined by combinators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub parts: Vec<SimpleSelector>,
    pub combinators: Vec<Combinator>,
}

impl Selector {
    /// Parses one complex selector (no comma lists). Returns `None` for
    /// text the grammar here cannot represent.
    pub fn parse(selector: &str) -> Option<Selector> {
        let mut parts = Vec::new();
        let mut combinators = Vec::new();
        for token in tokenize(selector.trim())? {
            match token {
                SelectorToken::Compound(compound) => parts.push(parse_compound(&compound)?),
                SelectorToken::Join(combinator) => combinators.push(combinator),
            }
        }
        if parts.is_empty() || combinators.len() + 1 != parts.len() {
            return None;
        }
        Some(Selector { parts, combinators })
    }

    /// Splits a selector list on top-level commas (quoted attribute values
    /// may contain commas) and parses each entry. Unparseable entries are
    /// dropped, not approximated.
    pub fn parse_list(text: &str) -> Vec<Selector> {
        split_top_level(text, b',')
            .iter()
            .filter_map(|entry| Selector::parse(entry))
            .collect()
    }

    pub fn matches(&self, element: &ElementInfo, ancestors: &[ElementInfo]) -> bool {
        let Some((subject, prefix)) = self.parts.split_last() else {
            return false;
        };
        subject.matches(element) && matches_prefix(prefix, &self.combinators, element, ancestors)
    }

    pub fn specificity(&self) -> Specificity {
        let mut spec = Specificity(0, 0, 0);
        for part in &self.parts {
            let Specificity(ids, classes, tags) = part.specificity();
            spec.0 += ids;
            spec.1 += classes;
            spec.2 += tags;
        }
        spec
    }
}

/// Right-to-left walk over the remaining compound parts, backtracking
/// through candidate ancestors and siblings of `anchor`.
fn matches_prefix(
    parts: &[SimpleSelector],
    combinators: &[Combinator],
    anchor: &ElementInfo,
    ancestors: &[ElementInfo],
) -> bool {
    let (Some((part, head)), Some((combinator, head_combs))) =
        (parts.split_last(), combinators.split_last())
    else {
        return parts.is_empty();
    };
    match combinator {
        Combinator::Child => match ancestors.split_last() {
            Some((parent, rest)) => part.matches(parent) && matches_prefix(head, head_combs, parent, rest),
            None => false,
        },
        Combinator::Descendant => (0..ancestors.len()).rev().any(|idx| {
            part.matches(&ancestors[idx])
                && matches_prefix(head, head_combs, &ancestors[idx], &ancestors[..idx])
        }),
        Combinator::AdjacentSibling => match anchor.prev_siblings.last() {
            Some(prev) => part.matches(prev) && matches_prefix(head, head_combs, prev, ancestors),
            None => false,
        },
        Combinator::GeneralSibling => anchor.prev_siblings.iter().rev().any(|prev| {
            part.matches(prev) && matches_prefix(head, head_combs, prev, ancestors)
        }),
    }
}

enum SelectorToken {
    Compound(String),
    Join(Combinator),
}

/// Lexes a complex selector into compound units and the combinators
/// between them. Brackets, parentheses and quoted strings keep their
/// contents inside the current compound.
fn tokenize(text: &str) -> Option<Vec<SelectorToken>> {
    fn flush(buf: &mut String, tokens: &mut Vec<SelectorToken>) {
        if !buf.is_empty() {
            tokens.push(SelectorToken::Compound(std::mem::take(buf)));
        }
    }

    let mut tokens: Vec<SelectorToken> = Vec::new();
    let mut buf = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for ch in text.chars() {
        if let Some(closing) = quote {
            buf.push(ch);
            if ch == closing {
                quote = None;
            }
            continue;
        }
        if depth > 0 {
            match ch {
                '(' | '[' => depth += 1,
                ')' | ']' => depth -= 1,
                '"' | '\'' => quote = Some(ch),
                _ => {}
            }
            buf.push(ch);
            continue;
        }
        match ch {
            '"' | '\'' => {
                quote = Some(ch);
                buf.push(ch);
            }
            '(' | '[' => {
                depth += 1;
                buf.push(ch);
            }
            ')' | ']' => return None,
            '>' | '+' | '~' => {
                flush(&mut buf, &mut tokens);
                let join = match ch {
                    '>' => Combinator::Child,
                    '+' => Combinator::AdjacentSibling,
                    _ => Combinator::GeneralSibling,
                };
                match tokens.last_mut() {
                    // Whitespace already queued a descendant join; the
                    // explicit combinator takes its place.
                    Some(SelectorToken::Join(slot @ Combinator::Descendant)) => *slot = join,
                    Some(SelectorToken::Compound(_)) => tokens.push(SelectorToken::Join(join)),
                    _ => return None,
                }
            }
            ch if ch.is_whitespace() => {
                flush(&mut buf, &mut tokens);
                if matches!(tokens.last(), Some(SelectorToken::Compound(_))) {
                    tokens.push(SelectorToken::Join(Combinator::Descendant));
                }
            }
            _ => buf.push(ch),
        }
    }
    if quote.is_some() || depth > 0 {
        return None;
    }
    flush(&mut buf, &mut tokens);
    if matches!(tokens.last(), Some(SelectorToken::Join(_))) {
        return None;
    }
    Some(tokens)
}

/// The leading component of a compound selector plus the unconsumed rest.
enum Component<'a> {
    Tag(&'a str),
    Id(&'a str),
    Class(&'a str),
    Attr(&'a str),
    Pseudo { name: &'a str, arg: Option<&'a str> },
}

fn parse_compound(text: &str) -> Option<SimpleSelector> {
    let mut selector = SimpleSelector {
        tag: None,
        id: None,
        classes: Vec::new(),
        attrs: Vec::new(),
        pseudos: Vec::new(),
    };
    let mut rest = text.trim();
    if rest.is_empty() {
        return None;
    }
    let mut leading = true;
    while !rest.is_empty() {
        let (component, remainder) = next_component(rest)?;
        match component {
            Component::Tag(name) => {
                // A type selector is only valid in leading position.
                if !leading {
                    return None;
                }
                selector.tag = Some(name.to_ascii_lowercase());
            }
            Component::Id(id) => selector.id = Some(id.to_string()),
            Component::Class(class) => selector.classes.push(class.to_string()),
            Component::Attr(body) => selector.attrs.push(parse_attr(body)?),
            Component::Pseudo { name, arg } => selector.pseudos.push(parse_pseudo(name, arg)?),
        }
        leading = false;
        rest = remainder;
    }
    Some(selector)
}

fn next_component(text: &str) -> Option<(Component<'_>, &str)> {
    match text.chars().next()? {
        '[' => {
            let close = 1 + delimited_len(&text[1..], '[', ']')?;
            Some((Component::Attr(text[1..close].trim()), &text[close + 1..]))
        }
        ':' => {
            // Tolerate the pseudo-element double colon.
            let start = if text[1..].starts_with(':') { 2 } else { 1 };
            let name_len = ident_len(&text[start..]);
            if name_len == 0 {
                return None;
            }
            let name = &text[start..start + name_len];
            let rest = &text[start + name_len..];
            if let Some(body) = rest.strip_prefix('(') {
                let close = delimited_len(body, '(', ')')?;
                let component = Component::Pseudo {
                    name,
                    arg: Some(body[..close].trim()),
                };
                return Some((component, &body[close + 1..]));
            }
            Some((Component::Pseudo { name, arg: None }, rest))
        }
        '#' => {
            let len = ident_len(&text[1..]);
            if len == 0 {
                return None;
            }
            Some((Component::Id(&text[1..1 + len]), &text[1 + len..]))
        }
        '.' => {
            let len = ident_len(&text[1..]);
            if len == 0 {
                return None;
            }
            Some((Component::Class(&text[1..1 + len]), &text[1 + len..]))
        }
        '*' => Some((Component::Tag("*"), &text[1..])),
        _ => {
            let len = ident_len(text);
            if len == 0 {
                return None;
            }
            Some((Component::Tag(&text[..len]), &text[len..]))
        }
    }
}

/// Byte length of the leading identifier run.
fn ident_len(text: &str) -> usize {
    text.char_indices()
        .find(|(_, ch)| !(ch.is_alphanumeric() || matches!(ch, '-' | '_' | '\\')))
        .map_or(text.len(), |(idx, _)| idx)
}

/// Byte index of the delimiter closing an already-opened `open`, honoring
/// nesting and quoted strings. `text` starts just past the opener.
fn delimited_len(text: &str, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (idx, ch) in text.char_indices() {
        if let Some(closing) = quote {
            if ch == closing {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            ch if ch == open => depth += 1,
            ch if ch == close => {
                if depth == 0 {
                    return Some(idx);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

fn parse_attr(body: &str) -> Option<AttrSelector> {
    let Some(eq) = unquoted_position(body, '=') else {
        let name = body.trim().to_ascii_lowercase();
        if name.is_empty() {
            return None;
        }
        return Some(AttrSelector {
            name,
            op: AttrOp::Exists,
            value: None,
        });
    };
    let (op, name_end) = match body[..eq].chars().last() {
        Some('~') => (AttrOp::Includes, eq - 1),
        Some('|') => (AttrOp::DashMatch, eq - 1),
        Some('^') => (AttrOp::Prefix, eq - 1),
        Some('$') => (AttrOp::Suffix, eq - 1),
        Some('*') => (AttrOp::Substring, eq - 1),
        _ => (AttrOp::Equals, eq),
    };
    let name = body[..name_end].trim().to_ascii_lowercase();
    if name.is_empty() {
        return None;
    }
    let value = unquoted(body[eq + 1..].trim()).to_string();
    Some(AttrSelector {
        name,
        op,
        value: Some(value),
    })
}

fn unquoted_position(text: &str, needle: char) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (idx, ch) in text.char_indices() {
        match quote {
            Some(closing) => {
                if ch == closing {
                    quote = None;
                }
            }
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            None if ch == needle => return Some(idx),
            None => {}
        }
    }
    None
}

fn unquoted(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2
        && (bytes[0] == b'"' || bytes[0] == b'\'')
        && bytes[bytes.len() - 1] == bytes[0]
    {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

fn parse_pseudo(name: &str, arg: Option<&str>) -> Option<PseudoClass> {
    let name = name.to_ascii_lowercase();
    match (name.as_str(), arg) {
        ("not", Some(arg)) => Some(PseudoClass::Not(Box::new(parse_compound(arg)?))),
        ("root", None) => Some(PseudoClass::Root),
        ("first-child", None) => Some(PseudoClass::FirstChild),
        ("last-child", None) => Some(PseudoClass::LastChild),
        ("nth-child" | "nth-of-type", Some(arg)) => {
            if arg.eq_ignore_ascii_case("even") {
                return Some(PseudoClass::NthChildEven);
            }
            if arg.eq_ignore_ascii_case("odd") {
                return Some(PseudoClass::NthChildOdd);
            }
            if let Ok(n) = arg.parse::<usize>() {
                if n >= 1 {
                    return Some(PseudoClass::NthChild(n));
                }
            }
            let (a, b) = parse_nth(arg)?;
            Some(PseudoClass::NthChildFormula { a, b })
        }
        // hover/focus/visited and pseudo-elements: parse, never match.
        _ => Some(PseudoClass::Inert(name)),
    }
}

/// `an+b` with even/odd already handled by the caller.
fn parse_nth(expr: &str) -> Option<(i32, i32)> {
    let expr: String = expr
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    if expr.is_empty() {
        return None;
    }
    match expr.split_once('n') {
        None => Some((0, expr.parse().ok()?)),
        Some((coefficient, offset)) => {
            let a = match coefficient {
                "" | "+" => 1,
                "-" => -1,
                signed => signed.parse().ok()?,
            };
            let b = if offset.is_empty() {
                0
            } else {
                offset.parse().ok()?
            };
            Some((a, b))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(tag: &str, id: Option<&str>, classes: &[&str]) -> ElementInfo {
        ElementInfo {
            tag: tag.to_string(),
            id: id.map(str::to_string),
            classes: classes.iter().map(|c| c.to_string()).collect(),
            child_index: 1,
            child_count: 1,
            ..ElementInfo::default()
        }
    }

    #[test]
    fn parses_compound_chain() {
        let selector = Selector::parse("div.note > p#intro").expect("parse");
        assert_eq!(selector.parts.len(), 2);
        assert_eq!(selector.combinators, vec![Combinator::Child]);
        assert_eq!(selector.parts[0].tag.as_deref(), Some("div"));
        assert_eq!(selector.parts[0].classes, vec!["note".to_string()]);
        assert_eq!(selector.parts[1].id.as_deref(), Some("intro"));
    }

    #[test]
    fn structural_equality_of_reparsed_selector() {
        let a = Selector::parse("ul li.item:first-child").expect("parse");
        let b = Selector::parse("ul li.item:first-child").expect("parse");
        let c = Selector::parse("ul li.item:last-child").expect("parse");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn descendant_and_child_matching() {
        let html = element("html", None, &[]);
        let body = element("body", None, &[]);
        let div = element("div", None, &["note"]);
        let p = element("p", Some("intro"), &[]);
        let ancestors = [html, body, div];

        let child = Selector::parse("div.note > p#intro").expect("parse");
        assert!(child.matches(&p, &ancestors));
        let descendant = Selector::parse("body p").expect("parse");
        assert!(descendant.matches(&p, &ancestors));
        let miss = Selector::parse("div.other > p").expect("parse");
        assert!(!miss.matches(&p, &ancestors));
    }

    #[test]
    fn sibling_combinators_use_prev_siblings() {
        let mut p = element("p", None, &[]);
        p.prev_siblings = vec![element("h1", None, &[]), element("h2", None, &[])];
        p.child_index = 3;
        p.child_count = 3;
        let adjacent = Selector::parse("h2 + p").expect("parse");
        assert!(adjacent.matches(&p, &[]));
        let general = Selector::parse("h1 ~ p").expect("parse");
        assert!(general.matches(&p, &[]));
        let wrong = Selector::parse("h1 + p").expect("parse");
        assert!(!wrong.matches(&p, &[]));
    }

    #[test]
    fn attribute_operators() {
        let mut img = element("img", None, &[]);
        img.attrs
            .insert("src".to_string(), "/images/logo.png".to_string());
        assert!(Selector::parse("img[src]").expect("parse").matches(&img, &[]));
        assert!(
            Selector::parse("img[src^='/images']")
                .expect("parse")
                .matches(&img, &[])
        );
        assert!(
            Selector::parse("img[src$='.png']")
                .expect("parse")
                .matches(&img, &[])
        );
        assert!(
            !Selector::parse("img[src='logo.png']")
                .expect("parse")
                .matches(&img, &[])
        );
    }

    #[test]
    fn nth_child_formula() {
        let mut li = element("li", None, &[]);
        li.child_count = 6;
        let odd = Selector::parse("li:nth-child(odd)").expect("parse");
        let formula = Selector::parse("li:nth-child(3n+1)").expect("parse");
        li.child_index = 4;
        assert!(formula.matches(&li, &[]));
        assert!(!odd.matches(&li, &[]));
        li.child_index = 5;
        assert!(odd.matches(&li, &[]));
        assert!(!formula.matches(&li, &[]));
    }

    #[test]
    fn dynamic_pseudo_classes_never_match() {
        let a = element("a", None, &[]);
        let hover = Selector::parse("a:hover").expect("parse");
        assert!(!hover.matches(&a, &[]));
    }

    #[test]
    fn specificity_ordering() {
        let id = Selector::parse("#nav").expect("parse");
        let class = Selector::parse(".nav").expect("parse");
        let tag = Selector::parse("nav").expect("parse");
        assert!(id.specificity() > class.specificity());
        assert!(class.specificity() > tag.specificity());
        let not = Selector::parse("div:not(.hidden)").expect("parse");
        assert_eq!(not.specificity(), Specificity(0, 1, 1));
    }

    #[test]
    fn parse_list_drops_unparseable_entries() {
        let list = Selector::parse_list("p, , div.note");
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn quoted_comma_stays_inside_one_selector() {
        let list = Selector::parse_list("p[title='a,b'], div");
        assert_eq!(list.len(), 2);
        let mut titled = element("p", None, &[]);
        titled
            .attrs
            .insert("title".to_string(), "a,b".to_string());
        assert!(list[0].matches(&titled, &[]));
        assert!(!list[1].matches(&titled, &[]));
    }
}
