//! cssdiff is a differential-testing oracle for CSS/DOM engines.
//!
//! Two backends render (or replay) the same document; the oracle aligns the
//! element trees, takes a computed-style snapshot per aligned pair, prunes
//! every difference that a semantic value-equivalence engine judges
//! meaningless (layered background shorthands, color notations, relative
//! URL forms, escape sequences, approximate numbers), and reports whatever
//! survives, attributing each finding to the style-sheet rules that could
//! have produced it. Every sheet rule additionally has to survive a
//! serialize / minify / re-parse round trip.
//!
//! The entry point is [`SiteComparison`]: give it two parsed documents and
//! a [`SiteReporter`] and it runs sheet comparison, the round-trip pass,
//! and the tree walk, returning whether the pair passed.

pub mod backend;
pub mod cache;
pub mod diff;
pub mod equiv;
pub mod error;
pub mod property;
pub mod report;
pub mod roundtrip;
pub mod selector;
pub mod sheet;
pub mod value;
pub mod walker;

pub use backend::{
    ChildNode, DomAgent, DomDocument, DomElement, EngineDocument, EngineElement, SnapshotAgent,
    SnapshotDocument, SnapshotElement, UserAgent,
};
pub use cache::{CachedResponse, FixtureCache};
pub use diff::{AttributionReport, StyleDiff, attribute_mismatch, diff_snapshots, prune};
pub use equiv::ValueComparator;
pub use error::CssDiffError;
pub use report::{FileReporter, LogReporter, Side, SiteReporter};
pub use roundtrip::{RoundTripReport, check_rule};
pub use selector::{ElementInfo, Selector, Specificity};
pub use sheet::{Declaration, ParsedSheet, RuleRecord, StyleSheetIndex};
pub use value::{ComputedStyleSnapshot, ListSeparator, PropertyValue, StyleEntry};
pub use walker::{TreeWalker, count_elements};

/// Comparison knobs, one per behavior the original test-suite properties
/// file let users toggle.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Treat a comparison with findings but no fatal error as a failure.
    pub fail_on_warning: bool,
    /// Compare attribute presence and values on aligned elements.
    pub compare_attributes: bool,
    /// Suppress unexplained one-sided properties on elements that carry
    /// presentational attributes.
    pub ignore_non_css_hints: bool,
    /// Documents with more elements than this skip per-element style
    /// verification (structure and sheets are still checked).
    pub element_ceiling: usize,
}

impl Default for OracleConfig {
    fn default() -> OracleConfig {
        OracleConfig {
            fail_on_warning: true,
            compare_attributes: true,
            ignore_non_css_hints: true,
            element_ceiling: 2000,
        }
    }
}

/// Outcome of one site comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    /// Findings were reported but `fail_on_warning` is off.
    PassWithFindings,
    Fail,
}

impl Outcome {
    pub fn is_pass(&self) -> bool {
        !matches!(self, Outcome::Fail)
    }
}

/// Drives one left-vs-right comparison end to end.
pub struct SiteComparison {
    config: OracleConfig,
    site: String,
}

impl SiteComparison {
    pub fn new(site: &str, config: OracleConfig) -> SiteComparison {
        SiteComparison {
            config,
            site: site.to_string(),
        }
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// Runs sheet comparison, the per-rule round-trip pass over the left
    /// document's sheets, and the style-verifying tree walk. The reporter
    /// is closed on every exit path, including errors.
    pub fn compare_documents<L, R>(
        &self,
        left: &L,
        left_name: &str,
        right: &R,
        right_name: &str,
        reporter: &mut dyn SiteReporter,
    ) -> Result<Outcome, CssDiffError>
    where
        L: EngineDocument,
        R: EngineDocument,
    {
        reporter.start_site(&self.site);
        reporter.side_descriptions(left_name, right_name);
        let result = self.run(left, right, reporter);
        reporter.close();
        result
    }

    fn run<L, R>(
        &self,
        left: &L,
        right: &R,
        reporter: &mut dyn SiteReporter,
    ) -> Result<Outcome, CssDiffError>
    where
        L: EngineDocument,
        R: EngineDocument,
    {
        compare_sheet_lists(left, right, reporter);

        for (sheet_index, sheet) in left.sheets().iter().enumerate() {
            for rule in &sheet.rules {
                let report = roundtrip::check_rule(rule, sheet.base_url.as_ref());
                if report.ok || report.skipped {
                    continue;
                }
                let reparsed = report.reparsed.as_deref().unwrap_or("<no rule>");
                for detail in &report.diagnostics {
                    reporter.round_trip_failure(sheet_index, &report.original, reparsed, detail);
                }
            }
        }

        let index = StyleSheetIndex::build(left.sheets().to_vec());

        let left_root = left.document_element()?;
        let right_root = right.document_element()?;
        let element_count = count_elements(&left_root);
        let verify_styles = element_count <= self.config.element_ceiling;
        if !verify_styles {
            log::warn!(
                "{}: {} elements exceed the ceiling of {}, skipping style verification",
                self.site,
                element_count,
                self.config.element_ceiling
            );
        }

        let walker = TreeWalker::new(&self.config, Some(&index), verify_styles);
        walker.check_tree(&left_root, &right_root, reporter)?;

        reporter.flush();
        if reporter.finding_count() == 0 {
            Ok(Outcome::Pass)
        } else if self.config.fail_on_warning {
            Ok(Outcome::Fail)
        } else {
            Ok(Outcome::PassWithFindings)
        }
    }
}

fn compare_sheet_lists<L, R>(left: &L, right: &R, reporter: &mut dyn SiteReporter)
where
    L: EngineDocument,
    R: EngineDocument,
{
    let left_hrefs = left.sheet_hrefs();
    let right_hrefs = right.sheet_hrefs();
    let left_only: Vec<String> = left_hrefs
        .iter()
        .filter(|href| !right_hrefs.contains(href))
        .cloned()
        .collect();
    let right_only: Vec<String> = right_hrefs
        .iter()
        .filter(|href| !left_hrefs.contains(href))
        .cloned()
        .collect();
    if !left_only.is_empty() || !right_only.is_empty() {
        reporter.sheet_count_mismatch(&left_only, &right_only);
    }
}
