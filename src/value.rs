//! Parsed property values and per-element style snapshots.
//!
//! Backends hand the oracle serialized computed values; this module lifts
//! them into a closed tagged union so the equivalence engine can match on
//! value kind exhaustively instead of chaining ad-hoc type probes.

use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// Layer count assumed when the master property of a layered family is not
/// present in the owning snapshot.
pub const DEFAULT_MASTER_LENGTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListSeparator {
    Comma,
    Space,
}

/// Color channels on a 0-255 scale with alpha on 0-1, independent of the
/// notation the backend serialized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorValue {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub alpha: f32,
}

impl ColorValue {
    pub fn is_zero_alpha(&self) -> bool {
        self.alpha < 0.01
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Ident(String),
    Str(String),
    Number {
        value: f32,
        unit: Option<String>,
    },
    Color(ColorValue),
    Url(String),
    Gradient {
        kind: String,
        args: Vec<PropertyValue>,
    },
    Var {
        name: String,
        fallback: Option<Box<PropertyValue>>,
    },
    List {
        items: Vec<PropertyValue>,
        separator: ListSeparator,
    },
    Raw(String),
}

impl PropertyValue {
    /// Parses serialized computed-value text. Never fails: anything the
    /// tokenizer cannot model becomes an opaque `Raw` passthrough.
    pub fn parse(text: &str) -> PropertyValue {
        let text = text.trim();
        if text.is_empty() {
            return PropertyValue::Raw(String::new());
        }
        let comma_parts = split_top_level(text, b',');
        if comma_parts.len() > 1 {
            let items = comma_parts
                .iter()
                .map(|part| parse_space_separated(part))
                .collect();
            return PropertyValue::List {
                items,
                separator: ListSeparator::Comma,
            };
        }
        parse_space_separated(text)
    }

    pub fn is_comma_list(&self) -> bool {
        matches!(
            self,
            PropertyValue::List {
                separator: ListSeparator::Comma,
                ..
            }
        )
    }

    /// Comma-layer view: a non-list value is a single layer.
    pub fn layers(&self) -> Vec<&PropertyValue> {
        match self {
            PropertyValue::List {
                items,
                separator: ListSeparator::Comma,
            } => items.iter().collect(),
            other => vec![other],
        }
    }

    pub fn as_ident(&self) -> Option<&str> {
        match self {
            PropertyValue::Ident(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Ident(name) => f.write_str(name),
            PropertyValue::Str(value) => write!(f, "'{}'", value),
            PropertyValue::Number { value, unit } => {
                write!(f, "{}", value)?;
                if let Some(unit) = unit {
                    f.write_str(unit)?;
                }
                Ok(())
            }
            PropertyValue::Color(color) => {
                if (color.alpha - 1.0).abs() < f32::EPSILON {
                    write!(
                        f,
                        "rgb({}, {}, {})",
                        color.red.round(),
                        color.green.round(),
                        color.blue.round()
                    )
                } else {
                    write!(
                        f,
                        "rgba({}, {}, {}, {})",
                        color.red.round(),
                        color.green.round(),
                        color.blue.round(),
                        color.alpha
                    )
                }
            }
            PropertyValue::Url(target) => write!(f, "url('{}')", target),
            PropertyValue::Gradient { kind, args } => {
                write!(f, "{}(", kind)?;
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            PropertyValue::Var { name, fallback } => {
                write!(f, "var({}", name)?;
                if let Some(fallback) = fallback {
                    write!(f, ", {}", fallback)?;
                }
                f.write_str(")")
            }
            PropertyValue::List { items, separator } => {
                let join = match separator {
                    ListSeparator::Comma => ", ",
                    ListSeparator::Space => " ",
                };
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(join)?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            PropertyValue::Raw(text) => f.write_str(text),
        }
    }
}

fn parse_space_separated(text: &str) -> PropertyValue {
    let parts = split_top_level(text.trim(), b' ');
    if parts.len() > 1 {
        let items = parts.iter().map(|part| parse_component(part)).collect();
        return PropertyValue::List {
            items,
            separator: ListSeparator::Space,
        };
    }
    parse_component(text.trim())
}

fn parse_component(token: &str) -> PropertyValue {
    if token.is_empty() {
        return PropertyValue::Raw(String::new());
    }
    let bytes = token.as_bytes();
    if (bytes[0] == b'"' || bytes[0] == b'\'') && bytes.len() >= 2 && bytes[bytes.len() - 1] == bytes[0]
    {
        return PropertyValue::Str(unescape(&token[1..token.len() - 1]));
    }
    if let Some(inner) = function_body(token, "url") {
        return PropertyValue::Url(strip_quotes(inner.trim()).to_string());
    }
    if let Some(inner) = function_body(token, "var") {
        return parse_var(inner);
    }
    if let Some((kind, inner)) = gradient_body(token) {
        let args = split_top_level(inner, b',')
            .iter()
            .map(|arg| parse_space_separated(arg))
            .collect();
        return PropertyValue::Gradient {
            kind: kind.to_ascii_lowercase(),
            args,
        };
    }
    if let Some(value) = parse_number(token) {
        return value;
    }
    if let Some(color) = parse_color(token) {
        return PropertyValue::Color(color);
    }
    if token
        .chars()
        .all(|ch| ch.is_alphanumeric() || ch == '-' || ch == '_' || ch == '\\')
    {
        return PropertyValue::Ident(token.to_string());
    }
    PropertyValue::Raw(token.to_string())
}

fn parse_var(inner: &str) -> PropertyValue {
    let args = split_top_level(inner, b',');
    let name = args.first().map(|s| s.trim().to_string()).unwrap_or_default();
    let fallback = if args.len() > 1 {
        let rest = args[1..].join(",");
        Some(Box::new(PropertyValue::parse(&rest)))
    } else {
        None
    };
    PropertyValue::Var { name, fallback }
}

fn parse_number(token: &str) -> Option<PropertyValue> {
    let mut split = token.len();
    for (idx, ch) in token.char_indices() {
        let numeric = ch.is_ascii_digit()
            || ch == '.'
            || ((ch == '+' || ch == '-') && idx == 0)
            || ((ch == 'e' || ch == 'E') && token[..idx].chars().any(|c| c.is_ascii_digit()));
        if !numeric {
            split = idx;
            break;
        }
    }
    if split == 0 {
        return None;
    }
    let value: f32 = token[..split].parse().ok()?;
    let unit = token[split..].trim();
    if unit.is_empty() {
        return Some(PropertyValue::Number { value, unit: None });
    }
    if unit == "%" || unit.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return Some(PropertyValue::Number {
            value,
            unit: Some(unit.to_ascii_lowercase()),
        });
    }
    None
}

fn parse_color(token: &str) -> Option<ColorValue> {
    // `transparent` stays an ident so the zero-alpha heuristic sees it as
    // the keyword the backend reported, and `currentcolor` is not a color.
    let lower = token.to_ascii_lowercase();
    if lower == "transparent" || lower == "currentcolor" || lower == "inherit" {
        return None;
    }
    let functional = lower.starts_with("rgb(")
        || lower.starts_with("rgba(")
        || lower.starts_with("hsl(")
        || lower.starts_with("hsla(")
        || lower.starts_with("hwb(")
        || lower.starts_with("lab(")
        || lower.starts_with("lch(")
        || lower.starts_with("oklab(")
        || lower.starts_with("oklch(");
    let named = token.chars().all(|ch| ch.is_ascii_alphabetic());
    if !functional && !named && !token.starts_with('#') {
        return None;
    }
    let color = csscolorparser::parse(token).ok()?;
    Some(ColorValue {
        red: color.r * 255.0,
        green: color.g * 255.0,
        blue: color.b * 255.0,
        alpha: color.a,
    })
}

fn function_body<'a>(token: &'a str, name: &str) -> Option<&'a str> {
    let lower = token.to_ascii_lowercase();
    let prefix = format!("{}(", name);
    if lower.starts_with(&prefix) && token.ends_with(')') {
        return Some(&token[prefix.len()..token.len() - 1]);
    }
    None
}

fn gradient_body(token: &str) -> Option<(&str, &str)> {
    let open = token.find('(')?;
    if !token.ends_with(')') {
        return None;
    }
    let name = &token[..open];
    if !name.to_ascii_lowercase().ends_with("gradient") {
        return None;
    }
    Some((name, &token[open + 1..token.len() - 1]))
}

/// Splits on a delimiter at nesting depth zero, honoring parentheses,
/// brackets and quoted strings. A space delimiter collapses runs.
pub(crate) fn split_top_level(text: &str, delimiter: u8) -> Vec<String> {
    let mut parts = Vec::new();
    let mut buf = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for ch in text.chars() {
        if let Some(open) = quote {
            buf.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == open {
                quote = None;
            }
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
            ')' | ']' => {
                depth = depth.saturating_sub(1);
                buf.push(ch);
            }
            _ if depth == 0
                && ((delimiter == b' ' && ch.is_whitespace())
                    || (delimiter != b' ' && ch == delimiter as char)) =>
            {
                let trimmed = buf.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed.to_string());
                }
                buf.clear();
            }
            _ => buf.push(ch),
        }
    }
    let trimmed = buf.trim();
    if !trimmed.is_empty() {
        parts.push(trimmed.to_string());
    }
    parts
}

fn strip_quotes(token: &str) -> &str {
    let bytes = token.as_bytes();
    if bytes.len() >= 2
        && (bytes[0] == b'"' || bytes[0] == b'\'')
        && bytes[bytes.len() - 1] == bytes[0]
    {
        return &token[1..token.len() - 1];
    }
    token
}

/// Resolves CSS backslash escapes (`\66 oo` -> `foo`, `\'` -> `'`).
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let mut hex = String::new();
        while hex.len() < 6 {
            match chars.peek() {
                Some(next) if next.is_ascii_hexdigit() => {
                    hex.push(*next);
                    chars.next();
                }
                _ => break,
            }
        }
        if hex.is_empty() {
            if let Some(literal) = chars.next() {
                out.push(literal);
            }
            continue;
        }
        // A single whitespace terminates a hex escape and is consumed.
        if matches!(chars.peek(), Some(next) if next.is_whitespace()) {
            chars.next();
        }
        match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
            Some(decoded) => out.push(decoded),
            None => out.push('\u{fffd}'),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct StyleEntry {
    pub value: PropertyValue,
    pub text: String,
    pub important: bool,
}

/// Property name to declared value mapping for one element in one backend.
/// Carries the owning sheet's base URL so URL equivalence can resolve
/// relative forms.
#[derive(Debug, Clone, Default)]
pub struct ComputedStyleSnapshot {
    properties: BTreeMap<String, StyleEntry>,
    base_url: Option<Url>,
}

impl ComputedStyleSnapshot {
    pub fn new(base_url: Option<Url>) -> Self {
        Self {
            properties: BTreeMap::new(),
            base_url,
        }
    }

    pub fn set_property(&mut self, name: &str, text: &str, important: bool) {
        self.properties.insert(
            name.to_ascii_lowercase(),
            StyleEntry {
                value: PropertyValue::parse(text),
                text: text.trim().to_string(),
                important,
            },
        );
    }

    pub fn remove_property(&mut self, name: &str) {
        self.properties.remove(&name.to_ascii_lowercase());
    }

    pub fn entry(&self, name: &str) -> Option<&StyleEntry> {
        self.properties.get(&name.to_ascii_lowercase())
    }

    pub fn value(&self, name: &str) -> Option<&PropertyValue> {
        self.entry(name).map(|entry| &entry.value)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Declared layer count of a layered family's master property. Falls
    /// back to a permissive default when the master is not declared.
    pub fn master_length(&self, master: &str) -> usize {
        match self.value(master) {
            Some(PropertyValue::List {
                items,
                separator: ListSeparator::Comma,
            }) => items.len(),
            Some(_) => 1,
            None => DEFAULT_MASTER_LENGTH,
        }
    }

    /// Reported value text with the importance flag appended, the way
    /// findings quote values.
    pub fn display_text(&self, name: &str) -> String {
        match self.entry(name) {
            Some(entry) if entry.important => format!("{}!important", entry.text),
            Some(entry) => entry.text.clone(),
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_and_space_lists() {
        let value = PropertyValue::parse("5px 5px, 5px 5px");
        match &value {
            PropertyValue::List { items, separator } => {
                assert_eq!(*separator, ListSeparator::Comma);
                assert_eq!(items.len(), 2);
                assert!(matches!(
                    items[0],
                    PropertyValue::List {
                        separator: ListSeparator::Space,
                        ..
                    }
                ));
            }
            other => panic!("expected comma list, got {:?}", other),
        }
    }

    #[test]
    fn parses_numbers_with_units() {
        assert_eq!(
            PropertyValue::parse("10.5px"),
            PropertyValue::Number {
                value: 10.5,
                unit: Some("px".to_string())
            }
        );
        assert_eq!(
            PropertyValue::parse("-0px"),
            PropertyValue::Number {
                value: -0.0,
                unit: Some("px".to_string())
            }
        );
        assert_eq!(
            PropertyValue::parse("61%"),
            PropertyValue::Number {
                value: 61.0,
                unit: Some("%".to_string())
            }
        );
    }

    #[test]
    fn parses_color_notations_to_channels() {
        let hex = PropertyValue::parse("#f2f2f2");
        let hsl = PropertyValue::parse("hsl(0, 0%, 95%)");
        match (hex, hsl) {
            (PropertyValue::Color(a), PropertyValue::Color(b)) => {
                assert!((a.red - b.red).abs() < 1.0);
                assert!((a.green - b.green).abs() < 1.0);
                assert!((a.blue - b.blue).abs() < 1.0);
            }
            other => panic!("expected colors, got {:?}", other),
        }
    }

    #[test]
    fn transparent_stays_an_ident() {
        assert_eq!(
            PropertyValue::parse("transparent"),
            PropertyValue::Ident("transparent".to_string())
        );
    }

    #[test]
    fn parses_url_and_var() {
        assert_eq!(
            PropertyValue::parse("url('../foo.png')"),
            PropertyValue::Url("../foo.png".to_string())
        );
        let var = PropertyValue::parse("var(--accent, #fff)");
        match var {
            PropertyValue::Var { name, fallback } => {
                assert_eq!(name, "--accent");
                assert!(matches!(
                    fallback.as_deref(),
                    Some(PropertyValue::Color(_))
                ));
            }
            other => panic!("expected var(), got {:?}", other),
        }
    }

    #[test]
    fn parses_gradients_recursively() {
        let value =
            PropertyValue::parse("linear-gradient(131deg, #fff 0%, hsl(0, 0%, 95%) 100%)");
        match value {
            PropertyValue::Gradient { kind, args } => {
                assert_eq!(kind, "linear-gradient");
                assert_eq!(args.len(), 3);
            }
            other => panic!("expected gradient, got {:?}", other),
        }
    }

    #[test]
    fn gradient_arguments_keep_commas_out_of_nested_functions() {
        let value = PropertyValue::parse("linear-gradient(left, rgba(0, 0, 0, 0.5) 70%)");
        match value {
            PropertyValue::Gradient { args, .. } => assert_eq!(args.len(), 2),
            other => panic!("expected gradient, got {:?}", other),
        }
    }

    #[test]
    fn unescapes_hex_and_literal_escapes() {
        assert_eq!(unescape("\\66 oo"), "foo");
        assert_eq!(unescape("a\\'b"), "a'b");
        assert_eq!(unescape("plain"), "plain");
    }

    #[test]
    fn master_length_counts_comma_layers() {
        let mut snapshot = ComputedStyleSnapshot::new(None);
        snapshot.set_property("background-image", "url(a.png), url(b.png)", false);
        assert_eq!(snapshot.master_length("background-image"), 2);
        snapshot.set_property("background-image", "url(a.png)", false);
        assert_eq!(snapshot.master_length("background-image"), 1);
        assert_eq!(
            ComputedStyleSnapshot::new(None).master_length("background-image"),
            DEFAULT_MASTER_LENGTH
        );
    }

    #[test]
    fn display_text_appends_importance() {
        let mut snapshot = ComputedStyleSnapshot::new(None);
        snapshot.set_property("color", "red", true);
        assert_eq!(snapshot.display_text("color"), "red!important");
    }
}
