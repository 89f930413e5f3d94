//! Style diffing and selector attribution.
//!
//! The raw diff is a key-set comparison of two snapshots; pruning then runs
//! every `differing` entry through the equivalence engine and drops the
//! cosmetic ones, and drops one-sided entries that merely state a
//! property's initial value. What remains is attributed: the style sheets
//! are searched for selectors capable of producing the property, and a
//! selector matching the element on one side only is the probable cause.

use crate::equiv::ValueComparator;
use crate::selector::{ElementInfo, Selector};
use crate::sheet::StyleSheetIndex;
use crate::value::{ComputedStyleSnapshot, PropertyValue, split_top_level};

/// Symmetric set-difference of two snapshots. Entries equal on both sides
/// (same text, same importance) are excluded by construction.
#[derive(Debug, Clone, Default)]
pub struct StyleDiff {
    pub only_left: Vec<String>,
    pub only_right: Vec<String>,
    pub differing: Vec<String>,
}

impl StyleDiff {
    pub fn is_empty(&self) -> bool {
        self.only_left.is_empty() && self.only_right.is_empty() && self.differing.is_empty()
    }
}

pub fn diff_snapshots(left: &ComputedStyleSnapshot, right: &ComputedStyleSnapshot) -> StyleDiff {
    let mut diff = StyleDiff::default();
    for name in left.property_names() {
        match (left.entry(name), right.entry(name)) {
            (Some(a), Some(b)) => {
                if a.text != b.text || a.important != b.important {
                    diff.differing.push(name.to_string());
                }
            }
            (Some(_), None) => diff.only_left.push(name.to_string()),
            _ => {}
        }
    }
    for name in right.property_names() {
        if left.entry(name).is_none() {
            diff.only_right.push(name.to_string());
        }
    }
    diff
}

/// Drops `differing` entries the equivalence engine accepts and one-sided
/// entries that only restate the property's initial value. The left
/// snapshot provides the comparison context (base URL, master lengths).
pub fn prune(diff: &mut StyleDiff, left: &ComputedStyleSnapshot, right: &ComputedStyleSnapshot) {
    let comparator = ValueComparator::new(left);
    diff.differing.retain(|name| {
        let (Some(a), Some(b)) = (left.entry(name), right.entry(name)) else {
            return true;
        };
        if a.important != b.important {
            return true;
        }
        !comparator.is_equivalent(name, &a.value, &b.value)
    });
    diff.only_left
        .retain(|name| !is_initial_entry(&comparator, left, name));
    let right_comparator = ValueComparator::new(right);
    diff.only_right
        .retain(|name| !is_initial_entry(&right_comparator, right, name));
}

fn is_initial_entry(
    comparator: &ValueComparator<'_>,
    snapshot: &ComputedStyleSnapshot,
    name: &str,
) -> bool {
    let initial = PropertyValue::Ident("initial".to_string());
    match snapshot.value(name) {
        Some(value) => comparator.is_equivalent(name, value, &initial),
        None => true,
    }
}

/// Selector-matching evidence for one residual mismatch. `one_sided` holds
/// the selectors whose matching outcome differs between backends; a
/// non-empty set points at selector matching, not value computation, as
/// the cause.
#[derive(Debug, Clone, Default)]
pub struct AttributionReport {
    pub property: String,
    pub matched_left: Vec<String>,
    pub matched_right: Vec<String>,
    pub one_sided: Vec<String>,
}

impl AttributionReport {
    pub fn explains_mismatch(&self) -> bool {
        !self.one_sided.is_empty()
    }

    /// No selector in any sheet matches the element on either side.
    pub fn no_matching_selector(&self) -> bool {
        self.matched_left.is_empty() && self.matched_right.is_empty()
    }
}

/// Searches every sheet for selectors that set `property` (to `value_text`
/// when given) and partitions them by matching outcome on each side.
pub fn attribute_mismatch(
    index: &StyleSheetIndex,
    property: &str,
    value_text: Option<&str>,
    left: (&ElementInfo, &[ElementInfo]),
    right: (&ElementInfo, &[ElementInfo]),
) -> AttributionReport {
    let refs = match value_text {
        Some(value) => index.rules_setting_value(property, value),
        None => index.rules_setting(property).to_vec(),
    };
    let mut report = AttributionReport {
        property: property.to_string(),
        ..AttributionReport::default()
    };
    for rule_ref in refs {
        let rule = index.rule(rule_ref);
        // Commas inside quoted attribute values do not separate selectors.
        for raw in split_top_level(&rule.selector_text, b',') {
            let text = raw.trim();
            let Some(selector) = Selector::parse(text) else {
                continue;
            };
            let matches_left = selector.matches(left.0, left.1);
            let matches_right = selector.matches(right.0, right.1);
            if matches_left {
                push_unique(&mut report.matched_left, text);
            }
            if matches_right {
                push_unique(&mut report.matched_right, text);
            }
            if matches_left != matches_right {
                push_unique(&mut report.one_sided, text);
            }
        }
    }
    report
}

fn push_unique(list: &mut Vec<String>, text: &str) {
    if !list.iter().any(|existing| existing == text) {
        list.push(text.to_string());
    }
}
