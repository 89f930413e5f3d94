//! Semantic value-equivalence engine.
//!
//! Decides whether two parsed property values are not meaningfully
//! different, given the owning property name. Heuristics deliberately favor
//! reporting a potential regression over hiding one: on exhaustion the
//! engine falls back to unescaped-text equality and then declares the
//! values different. Every branch is written order-symmetric and never
//! fails or panics.

use crate::property;
use crate::value::{ComputedStyleSnapshot, ListSeparator, PropertyValue, unescape};
use url::Url;

/// Inner three-way result: `Same` and `Different` are definitive, while
/// `Inconclusive` lets later heuristics keep trying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Same,
    Different,
    Inconclusive,
}

pub struct ValueComparator<'a> {
    style: &'a ComputedStyleSnapshot,
}

impl<'a> ValueComparator<'a> {
    pub fn new(style: &'a ComputedStyleSnapshot) -> Self {
        Self { style }
    }

    /// Whether the two values are not meaningfully different for `property`.
    pub fn is_equivalent(&self, property: &str, a: &PropertyValue, b: &PropertyValue) -> bool {
        if a == b {
            return true;
        }
        if self.matches_initial(property, a, b) || self.matches_initial(property, b, a) {
            return true;
        }
        if approx_numeric(a, b) {
            return true;
        }
        if property.eq_ignore_ascii_case("background-position") {
            if self.is_same_background_position(a, b) || self.is_same_background_position(b, a) {
                return true;
            }
        } else if property.eq_ignore_ascii_case("background-repeat") {
            let master_len = self.style.master_length("background-image");
            if self.is_same_layered_property(a, b, master_len) {
                return true;
            }
            if is_duplicated_pair(a, b) || is_duplicated_pair(b, a) {
                return true;
            }
        } else if property.eq_ignore_ascii_case("background-size") {
            let master_len = self.style.master_length("background-image");
            if self.is_same_layered_property(a, b, master_len) {
                return true;
            }
            if is_auto_pair(a, b) || is_auto_pair(b, a) {
                return true;
            }
        } else if let Some(master) = property::master_property(&property.to_ascii_lowercase()) {
            let master_len = self.style.master_length(master);
            if self.is_same_layered_property(a, b, master_len) {
                return true;
            }
        } else if property::is_item_layered(&property.to_ascii_lowercase())
            && self.is_same_layered_item(a, b)
        {
            return true;
        }
        if property.eq_ignore_ascii_case("font-family")
            && (font_family_matches(a, b) || font_family_matches(b, a))
        {
            return true;
        }
        match self.verdict(a, b) {
            Verdict::Same => return true,
            Verdict::Different => return false,
            Verdict::Inconclusive => {}
        }
        // Shorthand duplication: a scalar equals a non-comma list whose
        // every item it equals (`10` vs `10 10`).
        if self.scalar_matches_every_item(a, b) || self.scalar_matches_every_item(b, a) {
            return true;
        }
        unescape(&a.to_string()) == unescape(&b.to_string())
    }

    /// One side is the `initial`/`unset` keyword and the other resolves to
    /// the property's declared initial value.
    fn matches_initial(&self, property: &str, keyword: &PropertyValue, other: &PropertyValue) -> bool {
        let is_keyword = match keyword.as_ident() {
            Some(name) if name.eq_ignore_ascii_case("initial") => true,
            Some(name) if name.eq_ignore_ascii_case("unset") => {
                !property::is_inherited(&property.to_ascii_lowercase())
            }
            _ => false,
        };
        if !is_keyword {
            return false;
        }
        let Some(initial) = property::initial_value(&property.to_ascii_lowercase()) else {
            return false;
        };
        let initial = PropertyValue::parse(initial);
        initial == *other
            || self.verdict(&initial, other) == Verdict::Same
            || unescape(&initial.to_string()) == unescape(&other.to_string())
    }

    /// Layered multi-value comparison: slices both sides to at most
    /// `master_len` layers, compares item-wise, and checks cyclic
    /// repetition beyond the declared length against the shorter side.
    pub fn is_same_layered_property(
        &self,
        a: &PropertyValue,
        b: &PropertyValue,
        master_len: usize,
    ) -> bool {
        // A declared master always has at least one layer.
        let master_len = master_len.max(1);
        self.layered_one_way(a, b, master_len) || self.layered_one_way(b, a, master_len)
    }

    fn layered_one_way(&self, value: &PropertyValue, other: &PropertyValue, master_len: usize) -> bool {
        if master_len == 1 {
            let first = value.layers();
            let other_first = other.layers();
            return match (first.first(), other_first.first()) {
                (Some(item), Some(other_item)) => self.is_same_layered_item(item, other_item),
                _ => false,
            };
        }
        if value.is_comma_list() {
            let layers = value.layers();
            let len = layers.len().min(master_len);
            if !other.is_comma_list() {
                return false;
            }
            let other_layers = other.layers();
            if other_layers.len() < len {
                return false;
            }
            for i in 0..len {
                if !self.is_same_layered_item(layers[i], other_layers[i]) {
                    return false;
                }
            }
            for i in len..other_layers.len() {
                if !self.is_same_layered_item(layers[i % len], other_layers[i]) {
                    return false;
                }
            }
            return true;
        }
        if other.is_comma_list() {
            // A bare value equals its own repetition, sliced to the master
            // length, and only against layers it matches exactly; the
            // scalar-expansion shortcut does not apply here, so a default
            // expansion (`auto` vs `auto auto, auto auto`) stays a mismatch.
            let other_layers = other.layers();
            let len = other_layers.len().min(master_len);
            return other_layers[..len]
                .iter()
                .all(|layer| self.strict_item_eq(value, layer));
        }
        self.is_same_layered_item(value, other)
    }

    /// Single-layer comparison. Neither side is a comma-separated layer
    /// list; a scalar matches a list whose every item it equals.
    fn is_same_layered_item(&self, value: &PropertyValue, other: &PropertyValue) -> bool {
        if self.strict_item_eq(value, other) {
            return true;
        }
        self.scalar_matches_every_item(value, other)
            || self.scalar_matches_every_item(other, value)
    }

    fn strict_item_eq(&self, value: &PropertyValue, other: &PropertyValue) -> bool {
        value == other || approx_numeric(value, other) || self.verdict(value, other) == Verdict::Same
    }

    fn scalar_matches_every_item(&self, scalar: &PropertyValue, list: &PropertyValue) -> bool {
        let PropertyValue::List { items, .. } = list else {
            return false;
        };
        if matches!(scalar, PropertyValue::List { .. }) {
            return false;
        }
        !items.is_empty() && items.iter().all(|item| self.strict_item_eq(scalar, item))
    }

    /// `background-position` tolerates keyword/percentage pairs and a
    /// one-component value implying `center` on the omitted axis, on top of
    /// the layered repetition rules.
    pub fn is_same_background_position(&self, value: &PropertyValue, other: &PropertyValue) -> bool {
        if value.is_comma_list() {
            let layers = value.layers();
            if !other.is_comma_list() {
                return false;
            }
            let other_layers = other.layers();
            if other_layers.len() < layers.len() {
                return false;
            }
            let len = layers.len();
            for i in 0..len {
                if !self.is_same_position_item(layers[i], other_layers[i]) {
                    return false;
                }
            }
            for i in len..other_layers.len() {
                if !self.is_same_position_item(layers[i % len], other_layers[i]) {
                    return false;
                }
            }
            return true;
        }
        if other.is_comma_list() {
            // A bare position equals its own comma repetition.
            return other
                .layers()
                .iter()
                .all(|layer| self.is_same_position_item(value, layer));
        }
        self.is_same_layered_item(value, other) || self.is_same_position_item(value, other)
    }

    fn is_same_position_item(&self, value: &PropertyValue, other: &PropertyValue) -> bool {
        if value == other {
            return true;
        }
        if self.position_pair_matches(value, other) || self.position_pair_matches(other, value) {
            return true;
        }
        self.is_equivalent("", value, other)
    }

    fn position_pair_matches(&self, pair: &PropertyValue, other: &PropertyValue) -> bool {
        let PropertyValue::List { items, separator } = pair else {
            return false;
        };
        if *separator != ListSeparator::Space || items.len() != 2 {
            return false;
        }
        let second = items[1].to_string();
        if second.eq_ignore_ascii_case("center") {
            return items[0] == *other || self.strict_item_eq(&items[0], other);
        }
        let PropertyValue::List {
            items: other_items,
            separator: other_sep,
        } = other
        else {
            return false;
        };
        if *other_sep != ListSeparator::Space || other_items.len() != 2 {
            return false;
        }
        let first = items[0].to_string();
        let other_text = other.to_string();
        let is_origin = other_text == "0% 0%";
        // `top left` is not conformant order, but engines emit it.
        is_origin
            && ((first.eq_ignore_ascii_case("left") && second.eq_ignore_ascii_case("top"))
                || (first.eq_ignore_ascii_case("top") && second.eq_ignore_ascii_case("left")))
    }

    fn verdict(&self, value: &PropertyValue, other: &PropertyValue) -> Verdict {
        match (value, other) {
            (PropertyValue::Color(a), PropertyValue::Color(b)) => {
                let close = (a.red - b.red).abs() < 1.0
                    && (a.green - b.green).abs() < 1.0
                    && (a.blue - b.blue).abs() < 1.0
                    && (a.alpha - b.alpha).abs() < 0.01;
                if close { Verdict::Same } else { Verdict::Different }
            }
            (PropertyValue::Color(color), PropertyValue::Ident(name))
            | (PropertyValue::Ident(name), PropertyValue::Color(color))
                if name.eq_ignore_ascii_case("transparent") =>
            {
                if color.is_zero_alpha() {
                    Verdict::Same
                } else {
                    Verdict::Different
                }
            }
            (PropertyValue::Url(a), PropertyValue::Url(b)) => {
                if self.is_same_uri(a, b) || url_forms_equivalent(a, b) {
                    Verdict::Same
                } else {
                    Verdict::Different
                }
            }
            (PropertyValue::Str(a), PropertyValue::Str(b)) => {
                if unescape(a) == unescape(b) {
                    Verdict::Same
                } else {
                    Verdict::Different
                }
            }
            (
                PropertyValue::Gradient { kind, args },
                PropertyValue::Gradient {
                    kind: other_kind,
                    args: other_args,
                },
            ) => {
                if !kind.eq_ignore_ascii_case(other_kind) || args.len() != other_args.len() {
                    return Verdict::Different;
                }
                for (arg, other_arg) in args.iter().zip(other_args) {
                    if arg != other_arg && self.verdict(arg, other_arg) != Verdict::Same {
                        return Verdict::Different;
                    }
                }
                Verdict::Same
            }
            (
                PropertyValue::Var { name, fallback },
                PropertyValue::Var {
                    name: other_name,
                    fallback: other_fallback,
                },
            ) => {
                if name != other_name {
                    return Verdict::Different;
                }
                match (fallback, other_fallback) {
                    (None, None) => Verdict::Same,
                    (Some(a), Some(b)) => {
                        if a == b || self.verdict(a, b) == Verdict::Same {
                            Verdict::Same
                        } else {
                            Verdict::Different
                        }
                    }
                    _ => Verdict::Different,
                }
            }
            (PropertyValue::Number { .. }, PropertyValue::Number { .. }) => {
                if approx_numeric(value, other) {
                    Verdict::Same
                } else {
                    Verdict::Inconclusive
                }
            }
            (PropertyValue::Ident(a), PropertyValue::Ident(b)) => {
                if unescape(a).eq_ignore_ascii_case(&unescape(b)) {
                    Verdict::Same
                } else {
                    Verdict::Inconclusive
                }
            }
            (
                PropertyValue::List { items, separator },
                PropertyValue::List {
                    items: other_items,
                    separator: other_sep,
                },
            ) => {
                if items.len() != other_items.len() || separator != other_sep {
                    return Verdict::Different;
                }
                let mut result = Verdict::Same;
                for (item, other_item) in items.iter().zip(other_items) {
                    if item == other_item {
                        continue;
                    }
                    match self.verdict(item, other_item) {
                        Verdict::Different => return Verdict::Different,
                        Verdict::Inconclusive => result = Verdict::Inconclusive,
                        Verdict::Same => {}
                    }
                }
                result
            }
            _ => {
                if value == other {
                    Verdict::Same
                } else {
                    Verdict::Inconclusive
                }
            }
        }
    }

    fn is_same_uri(&self, uri: &str, other: &str) -> bool {
        let Some(base) = self.style.base_url() else {
            return uri == other;
        };
        match (base.join(uri), base.join(other)) {
            (Ok(resolved), Ok(other_resolved)) => resolved == other_resolved,
            _ => uri == other,
        }
    }
}

/// Numbers equal after rounding to three decimal digits in the same unit;
/// zero equals zero whatever the unit or sign. Equal-length lists compare
/// item-wise.
fn approx_numeric(value: &PropertyValue, other: &PropertyValue) -> bool {
    match (value, other) {
        (
            PropertyValue::Number { value: a, unit: a_unit },
            PropertyValue::Number { value: b, unit: b_unit },
        ) => {
            let a_scaled = (a * 1000.0).round() as i64;
            let b_scaled = (b * 1000.0).round() as i64;
            if a_scaled == 0 && b_scaled == 0 {
                return true;
            }
            a_scaled == b_scaled && a_unit == b_unit
        }
        (
            PropertyValue::List { items, .. },
            PropertyValue::List {
                items: other_items, ..
            },
        ) => {
            items.len() == other_items.len()
                && items
                    .iter()
                    .zip(other_items)
                    .all(|(a, b)| approx_numeric(a, b))
        }
        _ => false,
    }
}

/// Relative/absolute-form analysis for URLs with no resolvable base: one
/// side's absolute path ends with the other side's relative remainder.
fn url_forms_equivalent(uri: &str, other: &str) -> bool {
    if unescape(uri) == unescape(other) {
        return true;
    }
    let path = |raw: &str| -> String {
        match Url::parse(raw) {
            Ok(parsed) => parsed.path().to_string(),
            Err(_) => {
                let stripped = raw.strip_prefix("//").map_or(raw, |rest| {
                    rest.split_once('/').map_or("", |(_, path)| path)
                });
                stripped.to_string()
            }
        }
    };
    let a = path(uri);
    let b = path(other);
    let tail = |raw: &str| -> String {
        let mut rest = raw;
        loop {
            if let Some(next) = rest.strip_prefix("../") {
                rest = next;
            } else if let Some(next) = rest.strip_prefix("./") {
                rest = next;
            } else if let Some(next) = rest.strip_prefix('/') {
                rest = next;
            } else {
                break;
            }
        }
        rest.to_string()
    };
    let a_tail = tail(&a);
    let b_tail = tail(&b);
    !a_tail.is_empty() && (a_tail.ends_with(&b_tail) || b_tail.ends_with(&a_tail))
}

/// A scalar against a two-item list repeating that scalar
/// (`repeat` vs `repeat repeat`).
fn is_duplicated_pair(scalar: &PropertyValue, pair: &PropertyValue) -> bool {
    let PropertyValue::List { items, .. } = pair else {
        return false;
    };
    items.len() == 2 && items[0] == items[1] && items[0] == *scalar
}

fn is_auto_pair(value: &PropertyValue, other: &PropertyValue) -> bool {
    value.to_string().eq_ignore_ascii_case("auto")
        && other.to_string().eq_ignore_ascii_case("auto auto")
}

fn font_family_matches(value: &PropertyValue, other: &PropertyValue) -> bool {
    let PropertyValue::Str(text) = other else {
        return false;
    };
    let joined = match value {
        PropertyValue::Ident(name) => unescape(name),
        PropertyValue::List { items, separator } if *separator == ListSeparator::Space => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                match item.as_ident() {
                    Some(name) => parts.push(unescape(name)),
                    None => return false,
                }
            }
            parts.join(" ")
        }
        _ => return false,
    };
    joined == unescape(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PropertyValue;
    use url::Url;

    fn snapshot() -> ComputedStyleSnapshot {
        ComputedStyleSnapshot::new(Url::parse("http://www.example.com/dir/").ok())
    }

    fn equivalent(property: &str, a: &str, b: &str) -> bool {
        let style = snapshot();
        let comparator = ValueComparator::new(&style);
        let left = PropertyValue::parse(a);
        let right = PropertyValue::parse(b);
        let forward = comparator.is_equivalent(property, &left, &right);
        let backward = comparator.is_equivalent(property, &right, &left);
        assert_eq!(forward, backward, "asymmetric for {} vs {}", a, b);
        forward
    }

    #[test]
    fn reflexive_over_corpus() {
        let corpus = [
            "red",
            "10px",
            "url('../foo.png')",
            "hsl(207 6% 61% / 0.6)",
            "linear-gradient(131deg, #fff 0%, #f2f2f2 100%)",
            "var(--accent, #fff)",
            "5px 5px, 5px 5px",
            "left top",
            "'Times New Roman'",
        ];
        let style = snapshot();
        let comparator = ValueComparator::new(&style);
        for text in corpus {
            let value = PropertyValue::parse(text);
            assert!(
                comparator.is_equivalent("background-anything", &value, &value),
                "not reflexive for {}",
                text
            );
        }
    }

    #[test]
    fn color_notation_invariance() {
        assert!(equivalent(
            "background-color",
            "hsl(207 6% 61% / 0.6)",
            "rgb(59% 61% 63% / 0.6)"
        ));
        assert!(equivalent("background-color", "hsl(0, 0%, 95%)", "#f2f2f2"));
        assert!(!equivalent("background-color", "#f00", "#00f"));
    }

    #[test]
    fn zero_alpha_is_transparent() {
        assert!(equivalent("background-color", "rgba(0,0,0,0)", "transparent"));
        assert!(equivalent(
            "background-color",
            "hsl(24 20% 50% / 0)",
            "rgb(60% 48% 40% / 0)"
        ));
        assert!(!equivalent("background-color", "rgba(0,0,0,0.5)", "transparent"));
    }

    #[test]
    fn url_normalization_against_sheet_base() {
        assert!(equivalent(
            "background-image",
            "url('http://www.example.com/dir/file.png')",
            "url('../dir/file.png')"
        ));
        assert!(equivalent(
            "background-image",
            "url('http://www.example.com/dir/file.png')",
            "url('/dir/file.png')"
        ));
        assert!(equivalent(
            "background-image",
            "url('http://www.example.com/dir/file.png')",
            "url('//www.example.com/dir/file.png')"
        ));
        assert!(!equivalent(
            "background-image",
            "url('http://www.example.com/dir/file.png')",
            "url('/other/file.png')"
        ));
    }

    #[test]
    fn approximate_numbers() {
        assert!(equivalent("line-height", "1.0001", "1.0002"));
        assert!(equivalent("margin-top", "0px", "-0px"));
        assert!(equivalent("margin-top", "0px", "0em"));
        assert!(!equivalent("margin-top", "10px", "10em"));
        assert!(!equivalent("margin-top", "10px", "11px"));
    }

    #[test]
    fn layered_cyclic_repetition() {
        let style = snapshot();
        let comparator = ValueComparator::new(&style);
        let cases: &[(&str, &str, usize, bool)] = &[
            ("5px 5px", "5px 5px, 5px 5px", 2, true),
            ("auto", "auto auto, auto auto", 2, false),
            ("5px 5px, 5px 5px, 1px 1.5em", "5px 5px", 2, true),
            ("scroll", "scroll, scroll", 2, true),
            ("5px 5px", "5px 5px, 100%", 1, true),
            ("repeat", "repeat, no-repeat", 2, false),
            // Master length zero clamps to a single layer instead of
            // panicking, so only the first layers are consulted.
            ("repeat, no-repeat", "repeat, no-repeat, repeat", 0, true),
            ("repeat, no-repeat", "no-repeat", 0, false),
            ("scroll", "scroll, scroll", 0, true),
        ];
        for (a, b, master, expected) in cases {
            let left = PropertyValue::parse(a);
            let right = PropertyValue::parse(b);
            assert_eq!(
                comparator.is_same_layered_property(&left, &right, *master),
                *expected,
                "{} vs {} master {}",
                a,
                b,
                master
            );
            assert_eq!(
                comparator.is_same_layered_property(&right, &left, *master),
                *expected,
                "asymmetric: {} vs {}",
                b,
                a
            );
        }
    }

    #[test]
    fn background_repeat_respects_master_length() {
        let mut style = snapshot();
        style.set_property("background-image", "url(a.png), url(b.png)", false);
        let comparator = ValueComparator::new(&style);
        let left = PropertyValue::parse("repeat, repeat");
        let right = PropertyValue::parse("repeat");
        assert!(comparator.is_equivalent("background-repeat", &left, &right));
    }

    #[test]
    fn background_position_pairs() {
        let style = snapshot();
        let comparator = ValueComparator::new(&style);
        let cases: &[(&str, &str)] = &[
            ("left top", "0% 0%"),
            ("left 0px", "left -0px"),
            ("left top, center right", "0% 0%, center right"),
            ("center 10%", "center 10%, center 10%"),
            ("left 0px", "left 0"),
        ];
        for (a, b) in cases {
            let left = PropertyValue::parse(a);
            let right = PropertyValue::parse(b);
            assert!(
                comparator.is_same_background_position(&left, &right)
                    || comparator.is_same_background_position(&right, &left),
                "{} vs {}",
                a,
                b
            );
        }
        let left = PropertyValue::parse("left top");
        let right = PropertyValue::parse("100% 0%");
        assert!(!comparator.is_same_background_position(&left, &right));
    }

    #[test]
    fn one_component_position_implies_center() {
        assert!(equivalent("background-position", "center 10%", "center 10%"));
        assert!(equivalent("background-position", "left center", "left"));
    }

    #[test]
    fn gradients_compare_argument_wise() {
        assert!(equivalent(
            "background-image",
            "linear-gradient(131deg, #fff 0%, hsl(0, 0%, 95%) 100%)",
            "linear-gradient(131deg,#fff 0%,#f2f2f2 100%)"
        ));
        assert!(equivalent(
            "background-image",
            "linear-gradient(left, hsl(24 20% 50% / 0.1) 70%, hsl(24 20% 50% / 0))",
            "linear-gradient(left, hsl(24 20% 50% / 0.1) 70%, rgb(60% 48% 40% / 0))"
        ));
        assert!(!equivalent(
            "background-image",
            "linear-gradient(#fff, #000)",
            "radial-gradient(#fff, #000)"
        ));
    }

    #[test]
    fn strings_and_font_family() {
        assert!(equivalent("font-family", "Verdana", "'Verdana'"));
        assert!(equivalent("font-family", "Times New Roman", "'Times New Roman'"));
        assert!(!equivalent("font-family", "Verdana", "'Georgia'"));
        assert!(equivalent("content", "'\\66 oo'", "'foo'"));
    }

    #[test]
    fn var_references() {
        assert!(equivalent("color", "var(--accent)", "var(--accent)"));
        assert!(equivalent(
            "color",
            "var(--accent, #ff0000)",
            "var(--accent, rgb(255, 0, 0))"
        ));
        assert!(!equivalent("color", "var(--accent)", "var(--other)"));
        assert!(!equivalent("color", "var(--accent)", "var(--accent, red)"));
    }

    #[test]
    fn initial_keyword_resolves_against_database() {
        assert!(equivalent("background-repeat", "initial", "repeat"));
        assert!(equivalent("background-color", "initial", "transparent"));
        assert!(equivalent("margin-top", "unset", "0"));
        // `unset` computes to `inherit` for inherited properties.
        assert!(!equivalent("color", "unset", "black"));
    }

    #[test]
    fn scalar_list_shorthand_duplication() {
        assert!(equivalent("border-image-slice", "10", "10 10"));
        assert!(equivalent("grid-template-rows", "auto auto auto", "auto"));
        assert!(!equivalent("border-image-slice", "10", "10 20"));
    }

    #[test]
    fn transform_text_fallback() {
        assert!(equivalent("transform", "translateX(0%)", "translateX(0%)"));
        assert!(!equivalent("transform", "translateX(0%)", "translateY(0%)"));
    }
}
