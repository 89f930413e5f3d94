//! Style-sheet extraction and the per-comparison reverse index.
//!
//! Sheets are parsed once with lightningcss and flattened into owned
//! [`RuleRecord`]s carrying both canonical and minified serializations, the
//! parsed selector list, and the extracted declarations. Everything
//! downstream (round-trip checking, selector attribution) works off these
//! records, so no lightningcss borrow outlives this module.

use crate::error::CssDiffError;
use crate::selector::Selector;
use crate::value::ComputedStyleSnapshot;
use lightningcss::rules::{CssRule, CssRuleList};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::traits::ToCss;
use std::collections::HashMap;
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub text: String,
    pub important: bool,
}

/// One style rule, detached from the parsed sheet.
#[derive(Debug, Clone)]
pub struct RuleRecord {
    pub selector_text: String,
    pub selectors: Vec<Selector>,
    pub declarations: Vec<Declaration>,
    pub canonical: String,
    pub minified: String,
    pub order: usize,
}

impl RuleRecord {
    /// Declared property set as a snapshot, for diffing through the
    /// equivalence engine.
    pub fn snapshot(&self, base_url: Option<Url>) -> ComputedStyleSnapshot {
        let mut snapshot = ComputedStyleSnapshot::new(base_url);
        for declaration in &self.declarations {
            snapshot.set_property(&declaration.name, &declaration.text, declaration.important);
        }
        snapshot
    }

    pub fn sets_property(&self, name: &str) -> bool {
        self.declarations
            .iter()
            .any(|declaration| declaration.name.eq_ignore_ascii_case(name))
    }

    pub fn sets_property_to(&self, name: &str, value_text: &str) -> bool {
        self.declarations.iter().any(|declaration| {
            declaration.name.eq_ignore_ascii_case(name)
                && declaration.text.trim().eq_ignore_ascii_case(value_text.trim())
        })
    }
}

#[derive(Debug, Clone)]
pub struct ParsedSheet {
    pub href: Option<String>,
    pub base_url: Option<Url>,
    pub rules: Vec<RuleRecord>,
}

impl ParsedSheet {
    pub fn parse(
        css: &str,
        href: Option<String>,
        base_url: Option<Url>,
    ) -> Result<ParsedSheet, CssDiffError> {
        let sheet = StyleSheet::parse(css, ParserOptions::default()).map_err(|err| {
            CssDiffError::Parse(format!(
                "style sheet {}: {}",
                href.as_deref().unwrap_or("<inline>"),
                err
            ))
        })?;
        let mut rules = Vec::new();
        let mut order = 0usize;
        collect_style_rules(sheet.rules, &mut rules, &mut order);
        Ok(ParsedSheet {
            href,
            base_url,
            rules,
        })
    }
}

fn minify_options() -> PrinterOptions<'static> {
    PrinterOptions {
        minify: true,
        ..PrinterOptions::default()
    }
}

fn collect_style_rules(rules: CssRuleList, out: &mut Vec<RuleRecord>, order: &mut usize) {
    for rule in rules.0 {
        match rule {
            CssRule::Style(style) => {
                let selector_text = style
                    .selectors
                    .to_css_string(PrinterOptions::default())
                    .unwrap_or_default();
                let selector_min = style
                    .selectors
                    .to_css_string(minify_options())
                    .unwrap_or_else(|_| selector_text.clone());
                let declarations_text = style
                    .declarations
                    .to_css_string(PrinterOptions::default())
                    .unwrap_or_default();
                let declarations_min = style
                    .declarations
                    .to_css_string(minify_options())
                    .unwrap_or_else(|_| declarations_text.clone());
                if declarations_text.trim().is_empty() {
                    *order += 1;
                    continue;
                }

                let mut declarations = Vec::new();
                for property in &style.declarations.declarations {
                    if let Ok(text) = property.value_to_css_string(PrinterOptions::default()) {
                        declarations.push(Declaration {
                            name: property.property_id().name().to_string(),
                            text,
                            important: false,
                        });
                    }
                }
                for property in &style.declarations.important_declarations {
                    if let Ok(text) = property.value_to_css_string(PrinterOptions::default()) {
                        declarations.push(Declaration {
                            name: property.property_id().name().to_string(),
                            text,
                            important: true,
                        });
                    }
                }

                out.push(RuleRecord {
                    selectors: Selector::parse_list(&selector_text),
                    canonical: format!("{} {{ {} }}", selector_text, declarations_text),
                    minified: format!("{}{{{}}}", selector_min, declarations_min),
                    selector_text,
                    declarations,
                    order: *order,
                });
                *order += 1;
            }
            CssRule::Media(media) => {
                collect_style_rules(media.rules, out, order);
            }
            CssRule::Supports(supports) => {
                collect_style_rules(supports.rules, out, order);
            }
            _ => {}
        }
    }
}

/// Reference to one rule of one sheet, stable for the lifetime of a
/// document comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleRef {
    pub sheet: usize,
    pub rule: usize,
}

/// Reverse index answering "which rules set property P (to value V)".
/// Built once per document comparison and read-only afterwards.
pub struct StyleSheetIndex {
    sheets: Vec<ParsedSheet>,
    by_property: HashMap<String, Vec<RuleRef>>,
}

impl StyleSheetIndex {
    pub fn build(sheets: Vec<ParsedSheet>) -> StyleSheetIndex {
        let mut by_property: HashMap<String, Vec<RuleRef>> = HashMap::new();
        for (sheet_idx, sheet) in sheets.iter().enumerate() {
            for (rule_idx, rule) in sheet.rules.iter().enumerate() {
                for declaration in &rule.declarations {
                    by_property
                        .entry(declaration.name.to_ascii_lowercase())
                        .or_default()
                        .push(RuleRef {
                            sheet: sheet_idx,
                            rule: rule_idx,
                        });
                }
            }
        }
        for refs in by_property.values_mut() {
            refs.dedup();
        }
        StyleSheetIndex {
            sheets,
            by_property,
        }
    }

    pub fn sheets(&self) -> &[ParsedSheet] {
        &self.sheets
    }

    pub fn rule(&self, rule_ref: RuleRef) -> &RuleRecord {
        &self.sheets[rule_ref.sheet].rules[rule_ref.rule]
    }

    pub fn rules_setting(&self, property: &str) -> &[RuleRef] {
        self.by_property
            .get(&property.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Rules setting the property to the given serialized value; falls back
    /// to any rule setting the property when none match the value exactly.
    pub fn rules_setting_value(&self, property: &str, value_text: &str) -> Vec<RuleRef> {
        let all = self.rules_setting(property);
        let exact: Vec<RuleRef> = all
            .iter()
            .copied()
            .filter(|r| self.rule(*r).sets_property_to(property, value_text))
            .collect();
        if exact.is_empty() {
            all.to_vec()
        } else {
            exact
        }
    }
}
