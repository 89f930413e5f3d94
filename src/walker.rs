//! Tree-alignment walker.
//!
//! Recursively compares two element trees that represent the same logical
//! document, tolerating non-element drift between backends. Style
//! verification runs on each aligned pair before descent, so the
//! shallowest mismatch is reported first. An unrecoverable style error
//! flushes the reporter and propagates.

use crate::OracleConfig;
use crate::backend::{ChildNode, EngineElement};
use crate::diff::{AttributionReport, attribute_mismatch, diff_snapshots, prune};
use crate::error::CssDiffError;
use crate::report::{Side, SiteReporter};
use crate::selector::ElementInfo;
use crate::sheet::StyleSheetIndex;
use crate::value::ComputedStyleSnapshot;

/// Elements in the subtree rooted at `element`, itself included.
pub fn count_elements<E: EngineElement>(element: &E) -> usize {
    let mut count = 1;
    for child in element.children() {
        if let ChildNode::Element(child) = child {
            count += count_elements(&child);
        }
    }
    count
}

pub struct TreeWalker<'a> {
    config: &'a OracleConfig,
    index: Option<&'a StyleSheetIndex>,
    verify_styles: bool,
}

impl<'a> TreeWalker<'a> {
    pub fn new(
        config: &'a OracleConfig,
        index: Option<&'a StyleSheetIndex>,
        verify_styles: bool,
    ) -> TreeWalker<'a> {
        TreeWalker {
            config,
            index,
            verify_styles,
        }
    }

    pub fn check_tree<L, R>(
        &self,
        left: &L,
        right: &R,
        reporter: &mut dyn SiteReporter,
    ) -> Result<(), CssDiffError>
    where
        L: EngineElement,
        R: EngineElement,
    {
        let mut left_ancestors = Vec::new();
        let mut right_ancestors = Vec::new();
        self.check_pair(left, right, &mut left_ancestors, &mut right_ancestors, reporter)
    }

    fn check_pair<L, R>(
        &self,
        left: &L,
        right: &R,
        left_ancestors: &mut Vec<ElementInfo>,
        right_ancestors: &mut Vec<ElementInfo>,
        reporter: &mut dyn SiteReporter,
    ) -> Result<(), CssDiffError>
    where
        L: EngineElement,
        R: EngineElement,
    {
        if !left.tag_name().eq_ignore_ascii_case(&right.tag_name()) {
            reporter.structural_mismatch(
                &left.path(),
                &format!(
                    "element <{}> on the left aligns with <{}> on the right",
                    left.tag_name(),
                    right.tag_name()
                ),
            );
            return Ok(());
        }

        if self.config.compare_attributes {
            compare_attributes(left, right, reporter);
        }

        if self.verify_styles {
            self.check_styles(left, right, left_ancestors, right_ancestors, reporter)?;
        }

        // Child alignment: advance a right-side delta past non-element
        // nodes for each left element child.
        let left_children = left.children();
        let right_children = right.children();
        let left_elements: Vec<&L> = left_children
            .iter()
            .filter_map(|child| match child {
                ChildNode::Element(element) => Some(element),
                _ => None,
            })
            .collect();
        let right_elements: Vec<&R> = right_children
            .iter()
            .filter_map(|child| match child {
                ChildNode::Element(element) => Some(element),
                _ => None,
            })
            .collect();

        if left_elements.len() != right_elements.len() {
            best_effort_child_diff(
                &left.path(),
                &left_children,
                &right_children,
                reporter,
            );
            return Ok(());
        }

        for (left_child, right_child) in left_elements.iter().zip(&right_elements) {
            left_ancestors.push(left.info());
            right_ancestors.push(right.info());
            let result = self.check_pair(
                *left_child,
                *right_child,
                left_ancestors,
                right_ancestors,
                reporter,
            );
            left_ancestors.pop();
            right_ancestors.pop();
            result?;
        }
        Ok(())
    }

    fn check_styles<L, R>(
        &self,
        left: &L,
        right: &R,
        left_ancestors: &[ElementInfo],
        right_ancestors: &[ElementInfo],
        reporter: &mut dyn SiteReporter,
    ) -> Result<(), CssDiffError>
    where
        L: EngineElement,
        R: EngineElement,
    {
        let left_style = match left.computed_style() {
            Ok(style) => style,
            Err(err) => return Err(fatal(err, reporter)),
        };
        let right_style = match right.computed_style() {
            Ok(style) => style,
            Err(err) => return Err(fatal(err, reporter)),
        };

        let mut diff = diff_snapshots(&left_style, &right_style);
        prune(&mut diff, &left_style, &right_style);
        if diff.is_empty() {
            return Ok(());
        }

        let left_info = left.info();
        let right_info = right.info();
        let path = left.path();
        let hints_differ = left.has_presentational_hints() != right.has_presentational_hints();

        for property in &diff.differing {
            let attribution = self.attribute(
                property,
                value_text(&left_style, property),
                (&left_info, left_ancestors),
                (&right_info, right_ancestors),
            );
            reporter.differing_value(
                &path,
                property,
                &left_style.display_text(property),
                &right_style.display_text(property),
                attribution.as_ref(),
            );
        }
        for property in &diff.only_left {
            self.report_one_sided(
                Side::Left,
                &path,
                property,
                &left_style,
                (&left_info, left_ancestors),
                (&right_info, right_ancestors),
                hints_differ,
                reporter,
            );
        }
        for property in &diff.only_right {
            self.report_one_sided(
                Side::Right,
                &path,
                property,
                &right_style,
                (&left_info, left_ancestors),
                (&right_info, right_ancestors),
                hints_differ,
                reporter,
            );
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn report_one_sided(
        &self,
        side: Side,
        path: &str,
        property: &str,
        style: &ComputedStyleSnapshot,
        left: (&ElementInfo, &[ElementInfo]),
        right: (&ElementInfo, &[ElementInfo]),
        hints_differ: bool,
        reporter: &mut dyn SiteReporter,
    ) {
        let attribution = self.attribute(property, value_text(style, property), left, right);
        if let Some(report) = &attribution {
            // An unexplained one-sided property where only one backend
            // applied presentational hints is a hint-support gap, not a
            // CSS regression. When both sides agree on hints it stays a
            // finding.
            if report.no_matching_selector() && self.config.ignore_non_css_hints && hints_differ {
                return;
            }
        }
        reporter.missing_property(
            side,
            path,
            property,
            &style.display_text(property),
            attribution.as_ref(),
        );
    }

    fn attribute(
        &self,
        property: &str,
        value_text: Option<&str>,
        left: (&ElementInfo, &[ElementInfo]),
        right: (&ElementInfo, &[ElementInfo]),
    ) -> Option<AttributionReport> {
        self.index
            .map(|index| attribute_mismatch(index, property, value_text, left, right))
    }
}

fn fatal(err: CssDiffError, reporter: &mut dyn SiteReporter) -> CssDiffError {
    reporter.fatal(&err);
    reporter.flush();
    err
}

fn value_text<'s>(style: &'s ComputedStyleSnapshot, property: &str) -> Option<&'s str> {
    style.entry(property).map(|entry| entry.text.as_str())
}

fn compare_attributes<L, R>(left: &L, right: &R, reporter: &mut dyn SiteReporter)
where
    L: EngineElement,
    R: EngineElement,
{
    let left_attrs = left.attributes();
    let right_attrs = right.attributes();
    for (name, value) in &left_attrs {
        let Some((_, right_value)) = right_attrs
            .iter()
            .find(|(other, _)| same_attribute_name(name, other))
        else {
            reporter.structural_mismatch(
                &left.path(),
                &format!("attribute '{}' present on the left side only", name),
            );
            continue;
        };
        // Class list ordering and spacing are not style-significant.
        if local_name(name) == "class" {
            continue;
        }
        if value != right_value {
            reporter.structural_mismatch(
                &left.path(),
                &format!(
                    "attribute '{}' is '{}' on the left, '{}' on the right",
                    name, value, right_value
                ),
            );
        }
    }
    for (name, _) in &right_attrs {
        if !left_attrs
            .iter()
            .any(|(other, _)| same_attribute_name(other, name))
        {
            reporter.structural_mismatch(
                &left.path(),
                &format!("attribute '{}' present on the right side only", name),
            );
        }
    }
}

/// Backends disagree on prefix retrieval; fall back to the local name.
fn same_attribute_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || local_name(a).eq_ignore_ascii_case(local_name(b))
}

fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

/// Child lists disagree on element count: report genuinely missing/extra
/// nodes, ignoring whitespace-only text, then give up on the subtree.
fn best_effort_child_diff<L, R>(
    path: &str,
    left_children: &[ChildNode<L>],
    right_children: &[ChildNode<R>],
    reporter: &mut dyn SiteReporter,
) where
    L: EngineElement,
    R: EngineElement,
{
    let left_tags: Vec<String> = left_children
        .iter()
        .filter_map(|child| match child {
            ChildNode::Element(element) => Some(element.tag_name()),
            _ => None,
        })
        .collect();
    let right_tags: Vec<String> = right_children
        .iter()
        .filter_map(|child| match child {
            ChildNode::Element(element) => Some(element.tag_name()),
            _ => None,
        })
        .collect();

    let (shorter, longer, longer_side) = if left_tags.len() <= right_tags.len() {
        (&left_tags, &right_tags, "right")
    } else {
        (&right_tags, &left_tags, "left")
    };

    let mut cursor = 0usize;
    for tag in shorter {
        while cursor < longer.len() && &longer[cursor] != tag {
            reporter.structural_mismatch(
                path,
                &format!("extra <{}> child on the {} side", longer[cursor], longer_side),
            );
            cursor += 1;
        }
        if cursor < longer.len() {
            cursor += 1;
        } else {
            reporter.structural_mismatch(
                path,
                &format!("<{}> child missing on the {} side", tag, longer_side),
            );
        }
    }
    for tag in &longer[cursor.min(longer.len())..] {
        reporter.structural_mismatch(
            path,
            &format!("extra <{}> child on the {} side", tag, longer_side),
        );
    }

    let left_texts = meaningful_texts(left_children);
    let right_texts = meaningful_texts(right_children);
    for text in &left_texts {
        if !right_texts.contains(text) {
            reporter.structural_mismatch(
                path,
                &format!("text '{}' present on the left side only", text),
            );
        }
    }
    for text in &right_texts {
        if !left_texts.contains(text) {
            reporter.structural_mismatch(
                path,
                &format!("text '{}' present on the right side only", text),
            );
        }
    }
}

fn meaningful_texts<E>(children: &[ChildNode<E>]) -> Vec<String> {
    children
        .iter()
        .filter_map(|child| match child {
            ChildNode::Text(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SnapshotElement;
    use crate::sheet::ParsedSheet;

    #[derive(Default)]
    struct RecordingReporter {
        structural: Vec<String>,
        differing: Vec<String>,
        missing: Vec<(Side, String, String)>,
        fatals: usize,
        flushes: usize,
    }

    impl SiteReporter for RecordingReporter {
        fn start_site(&mut self, _name: &str) {}
        fn side_descriptions(&mut self, _left: &str, _right: &str) {}
        fn sheet_count_mismatch(&mut self, _left: &[String], _right: &[String]) {}
        fn missing_property(
            &mut self,
            side: Side,
            _path: &str,
            property: &str,
            _value: &str,
            attribution: Option<&AttributionReport>,
        ) {
            let note = match attribution {
                Some(report) if report.no_matching_selector() => "no matching selector",
                Some(_) => "attributed",
                None => "unattributed",
            };
            self.missing
                .push((side, property.to_string(), note.to_string()));
        }
        fn differing_value(
            &mut self,
            _path: &str,
            property: &str,
            _left: &str,
            _right: &str,
            _attribution: Option<&AttributionReport>,
        ) {
            self.differing.push(property.to_string());
        }
        fn round_trip_failure(&mut self, _sheet: usize, _orig: &str, _re: &str, _detail: &str) {}
        fn structural_mismatch(&mut self, _path: &str, detail: &str) {
            self.structural.push(detail.to_string());
        }
        fn fatal(&mut self, _error: &CssDiffError) {
            self.fatals += 1;
        }
        fn finding_count(&self) -> usize {
            self.structural.len() + self.differing.len() + self.missing.len()
        }
        fn flush(&mut self) {
            self.flushes += 1;
        }
        fn close(&mut self) {}
    }

    fn config() -> OracleConfig {
        OracleConfig::default()
    }

    #[test]
    fn whitespace_only_drift_aligns_cleanly() {
        let left = SnapshotElement::new("html")
            .child(
                SnapshotElement::new("body")
                    .child(SnapshotElement::new("p").text("hello").build())
                    .child(SnapshotElement::new("p").text("world").build())
                    .build(),
            )
            .build();
        let right = SnapshotElement::new("html")
            .child(
                SnapshotElement::new("body")
                    .text("\n  ")
                    .child(SnapshotElement::new("p").text("hello").build())
                    .text("\n  ")
                    .child(SnapshotElement::new("p").text("world").build())
                    .text("\n")
                    .build(),
            )
            .build();
        let config = config();
        let walker = TreeWalker::new(&config, None, true);
        let mut reporter = RecordingReporter::default();
        walker.check_tree(&left, &right, &mut reporter).expect("walk");
        assert!(reporter.structural.is_empty(), "{:?}", reporter.structural);
        assert!(reporter.differing.is_empty());
    }

    #[test]
    fn layered_repetition_produces_no_diff() {
        let left = SnapshotElement::new("div")
            .property("background-image", "url(a.png), url(b.png)")
            .property("background-repeat", "repeat, repeat")
            .build();
        let right = SnapshotElement::new("div")
            .property("background-image", "url(a.png), url(b.png)")
            .property("background-repeat", "repeat")
            .build();
        let config = config();
        let walker = TreeWalker::new(&config, None, true);
        let mut reporter = RecordingReporter::default();
        walker.check_tree(&left, &right, &mut reporter).expect("walk");
        assert_eq!(reporter.finding_count(), 0);
    }

    #[test]
    fn unexplained_right_only_property_is_reported_without_selectors() {
        let sheet = ParsedSheet::parse("p { margin-top: 4px }", None, None).expect("parse");
        let index = StyleSheetIndex::build(vec![sheet]);
        let left = SnapshotElement::new("p").build();
        let right = SnapshotElement::new("p").property("color", "blue").build();
        let config = config();
        let walker = TreeWalker::new(&config, Some(&index), true);
        let mut reporter = RecordingReporter::default();
        walker.check_tree(&left, &right, &mut reporter).expect("walk");
        assert_eq!(reporter.missing.len(), 1);
        let (side, property, note) = &reporter.missing[0];
        assert_eq!(*side, Side::Right);
        assert_eq!(property, "color");
        assert_eq!(note, "no matching selector");
    }

    #[test]
    fn hint_support_gap_suppresses_unexplained_finding() {
        let sheet = ParsedSheet::parse("p { margin-top: 4px }", None, None).expect("parse");
        let index = StyleSheetIndex::build(vec![sheet]);
        let left = SnapshotElement::new("td").build();
        let right = SnapshotElement::new("td")
            .attr("bgcolor", "#ffffff")
            .property("background-color", "#ffffff")
            .build();
        let config = OracleConfig {
            compare_attributes: false,
            ..OracleConfig::default()
        };
        let walker = TreeWalker::new(&config, Some(&index), true);
        let mut reporter = RecordingReporter::default();
        walker.check_tree(&left, &right, &mut reporter).expect("walk");
        assert!(reporter.missing.is_empty());
    }

    #[test]
    fn matching_hint_support_still_reports_one_sided_property() {
        let sheet = ParsedSheet::parse("p { margin-top: 4px }", None, None).expect("parse");
        let index = StyleSheetIndex::build(vec![sheet]);
        let left = SnapshotElement::new("td").attr("bgcolor", "#ffffff").build();
        let right = SnapshotElement::new("td")
            .attr("bgcolor", "#ffffff")
            .property("background-color", "#ffffff")
            .build();
        let config = config();
        let walker = TreeWalker::new(&config, Some(&index), true);
        let mut reporter = RecordingReporter::default();
        walker.check_tree(&left, &right, &mut reporter).expect("walk");
        assert_eq!(reporter.missing.len(), 1);
        let (side, property, note) = &reporter.missing[0];
        assert_eq!(*side, Side::Right);
        assert_eq!(property, "background-color");
        assert_eq!(note, "no matching selector");
    }

    #[test]
    fn count_mismatch_reports_extra_child_and_abandons_subtree() {
        let left = SnapshotElement::new("body")
            .child(SnapshotElement::new("p").build())
            .build();
        let right = SnapshotElement::new("body")
            .child(SnapshotElement::new("p").build())
            .child(SnapshotElement::new("div").build())
            .build();
        let config = config();
        let walker = TreeWalker::new(&config, None, false);
        let mut reporter = RecordingReporter::default();
        walker.check_tree(&left, &right, &mut reporter).expect("walk");
        assert_eq!(reporter.structural.len(), 1);
        assert!(reporter.structural[0].contains("extra <div>"));
    }

    #[test]
    fn class_attribute_value_is_never_compared() {
        let left = SnapshotElement::new("p").attr("class", "b a").build();
        let right = SnapshotElement::new("p").attr("class", "a b").build();
        let config = config();
        let walker = TreeWalker::new(&config, None, false);
        let mut reporter = RecordingReporter::default();
        walker.check_tree(&left, &right, &mut reporter).expect("walk");
        assert!(reporter.structural.is_empty());
    }

    #[test]
    fn style_error_flushes_reporter_and_propagates() {
        let left = SnapshotElement::new("html")
            .child(SnapshotElement::new("body").failing_style("backend crash").build())
            .build();
        let right = SnapshotElement::new("html")
            .child(SnapshotElement::new("body").build())
            .build();
        let config = config();
        let walker = TreeWalker::new(&config, None, true);
        let mut reporter = RecordingReporter::default();
        let result = walker.check_tree(&left, &right, &mut reporter);
        assert!(matches!(result, Err(CssDiffError::ComputedStyle { .. })));
        assert_eq!(reporter.fatals, 1);
        assert!(reporter.flushes >= 1);
    }

    #[test]
    fn shallowest_mismatch_reported_before_descent() {
        let left = SnapshotElement::new("body")
            .property("color", "red")
            .child(SnapshotElement::new("p").property("color", "red").build())
            .build();
        let right = SnapshotElement::new("body")
            .property("color", "blue")
            .child(SnapshotElement::new("p").property("color", "green").build())
            .build();
        let config = config();
        let walker = TreeWalker::new(&config, None, true);
        let mut reporter = RecordingReporter::default();
        walker.check_tree(&left, &right, &mut reporter).expect("walk");
        assert_eq!(reporter.differing, vec!["color".to_string(), "color".to_string()]);
        assert_eq!(reporter.differing.len(), 2);
    }
}
