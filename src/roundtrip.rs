//! Rule round-trip checking.
//!
//! Each rule is re-parsed from both its canonical and minified
//! serializations; the results must carry an equivalent declaration set
//! (judged by the value-equivalence engine, with the original rule as the
//! comparison context) and a structurally equal selector list. Re-parse
//! failures are diagnostics, never errors. Rules whose serialization
//! contains U+FFFD come from undecodable input and are skipped.

use crate::diff::{diff_snapshots, prune};
use crate::sheet::{ParsedSheet, RuleRecord};
use url::Url;

#[derive(Debug, Clone)]
pub struct RoundTripReport {
    pub ok: bool,
    pub skipped: bool,
    pub original: String,
    pub reparsed: Option<String>,
    pub diagnostics: Vec<String>,
}

impl RoundTripReport {
    fn skipped(rule: &RuleRecord) -> RoundTripReport {
        RoundTripReport {
            ok: true,
            skipped: true,
            original: rule.canonical.clone(),
            reparsed: None,
            diagnostics: Vec::new(),
        }
    }
}

/// Pure per-rule check.
pub fn check_rule(rule: &RuleRecord, base_url: Option<&Url>) -> RoundTripReport {
    if rule.canonical.contains('\u{fffd}') || rule.minified.contains('\u{fffd}') {
        return RoundTripReport::skipped(rule);
    }

    let mut report = RoundTripReport {
        ok: true,
        skipped: false,
        original: rule.canonical.clone(),
        reparsed: None,
        diagnostics: Vec::new(),
    };

    for (text, form) in [(&rule.canonical, "canonical"), (&rule.minified, "minified")] {
        let reparsed = match ParsedSheet::parse(text, None, base_url.cloned()) {
            Ok(sheet) => sheet,
            Err(err) => {
                report.ok = false;
                report
                    .diagnostics
                    .push(format!("{} form does not re-parse: {}", form, err));
                continue;
            }
        };
        let Some(reparsed_rule) = reparsed.rules.first() else {
            report.ok = false;
            report
                .diagnostics
                .push(format!("{} form re-parses to no rule", form));
            continue;
        };
        if reparsed.rules.len() > 1 {
            report.ok = false;
            report.diagnostics.push(format!(
                "{} form re-parses to {} rules",
                form,
                reparsed.rules.len()
            ));
        }
        report.reparsed = Some(reparsed_rule.canonical.clone());

        if reparsed_rule.selectors != rule.selectors {
            report.ok = false;
            report.diagnostics.push(format!(
                "{} form changes the selector list: '{}' became '{}'",
                form, rule.selector_text, reparsed_rule.selector_text
            ));
        }

        let original_style = rule.snapshot(base_url.cloned());
        let reparsed_style = reparsed_rule.snapshot(base_url.cloned());
        let mut diff = diff_snapshots(&original_style, &reparsed_style);
        prune(&mut diff, &original_style, &reparsed_style);
        for property in &diff.only_left {
            report.ok = false;
            report.diagnostics.push(format!(
                "{} form loses '{}: {}'",
                form,
                property,
                original_style.display_text(property)
            ));
        }
        for property in &diff.only_right {
            report.ok = false;
            report.diagnostics.push(format!(
                "{} form gains '{}: {}'",
                form,
                property,
                reparsed_style.display_text(property)
            ));
        }
        for property in &diff.differing {
            report.ok = false;
            report.diagnostics.push(format!(
                "{} form changes '{}': '{}' became '{}'",
                form,
                property,
                original_style.display_text(property),
                reparsed_style.display_text(property)
            ));
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::Selector;

    fn rules(css: &str) -> Vec<RuleRecord> {
        ParsedSheet::parse(css, None, None).expect("parse").rules
    }

    #[test]
    fn accepted_rules_round_trip() {
        let css = "p.note > span { color: #f2f2f2; margin-top: 4px }\n\
            ul li:first-child { background: url('a.png') no-repeat }\n\
            #nav { display: none !important }";
        for rule in rules(css) {
            let report = check_rule(&rule, None);
            assert!(report.ok, "{}: {:?}", rule.canonical, report.diagnostics);
            assert!(!report.skipped);
            assert!(report.reparsed.is_some());
        }
    }

    #[test]
    fn selector_change_is_structural_not_textual() {
        let mut rule = rules("p { color: red }").remove(0);
        // Force a selector drift the way a broken serializer would.
        rule.canonical = "q { color: red }".to_string();
        rule.minified = "q{color:red}".to_string();
        let report = check_rule(&rule, None);
        assert!(!report.ok);
        assert!(
            report
                .diagnostics
                .iter()
                .any(|d| d.contains("selector list"))
        );
    }

    #[test]
    fn lost_declaration_is_diagnosed_with_both_texts() {
        let mut rule = rules("p { color: red; margin-top: 4px }").remove(0);
        rule.canonical = "p { color: red }".to_string();
        rule.minified = "p{color:red}".to_string();
        let report = check_rule(&rule, None);
        assert!(!report.ok);
        assert!(
            report
                .diagnostics
                .iter()
                .any(|d| d.contains("loses 'margin-top: 4px'"))
        );
        assert_eq!(report.original, rule.canonical);
    }

    #[test]
    fn replacement_character_skips_the_rule() {
        let mut rule = rules("p { color: red }").remove(0);
        rule.canonical = format!("p {{ content: '{}' }}", '\u{fffd}');
        let report = check_rule(&rule, None);
        assert!(report.skipped);
        assert!(report.ok);
    }

    #[test]
    fn reparsed_selectors_stay_structurally_equal() {
        let rule = rules("div.note   >   p { color: red }").remove(0);
        assert_eq!(
            rule.selectors,
            vec![Selector::parse("div.note > p").expect("parse")]
        );
        let report = check_rule(&rule, None);
        assert!(report.ok, "{:?}", report.diagnostics);
    }
}
