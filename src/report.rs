//! Reporting sinks.
//!
//! One reporter method per finding category, plus flush/close. Reporter
//! failures never abort a comparison: the file reporter degrades to a
//! logged warning and keeps counting findings, and the log reporter only
//! talks to the `log` facade.

use crate::diff::AttributionReport;
use crate::error::CssDiffError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn label(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

pub trait SiteReporter {
    fn start_site(&mut self, name: &str);
    fn side_descriptions(&mut self, left: &str, right: &str);
    /// Sheet hrefs present on one side only.
    fn sheet_count_mismatch(&mut self, left_hrefs: &[String], right_hrefs: &[String]);
    fn missing_property(
        &mut self,
        side: Side,
        path: &str,
        property: &str,
        value: &str,
        attribution: Option<&AttributionReport>,
    );
    fn differing_value(
        &mut self,
        path: &str,
        property: &str,
        left_value: &str,
        right_value: &str,
        attribution: Option<&AttributionReport>,
    );
    fn round_trip_failure(&mut self, sheet_index: usize, original: &str, reparsed: &str, detail: &str);
    fn structural_mismatch(&mut self, path: &str, detail: &str);
    /// A fatal error: recorded and flushed before the caller propagates it.
    fn fatal(&mut self, error: &CssDiffError);
    fn finding_count(&self) -> usize;
    fn flush(&mut self);
    fn close(&mut self);
}

fn describe_attribution(attribution: Option<&AttributionReport>) -> String {
    match attribution {
        Some(report) if report.explains_mismatch() => {
            format!("selector mismatch: {}", report.one_sided.join(", "))
        }
        Some(report) if report.no_matching_selector() => "no matching selector".to_string(),
        Some(_) => "selectors match on both sides".to_string(),
        None => "unattributed".to_string(),
    }
}

/// Findings through the `log` facade; nothing touches the filesystem.
#[derive(Default)]
pub struct LogReporter {
    site: String,
    findings: usize,
}

impl LogReporter {
    pub fn new() -> LogReporter {
        LogReporter::default()
    }
}

impl SiteReporter for LogReporter {
    fn start_site(&mut self, name: &str) {
        self.site = name.to_string();
        self.findings = 0;
    }

    fn side_descriptions(&mut self, left: &str, right: &str) {
        log::info!("{}: comparing {} against {}", self.site, left, right);
    }

    fn sheet_count_mismatch(&mut self, left_hrefs: &[String], right_hrefs: &[String]) {
        self.findings += 1;
        log::error!(
            "{}: sheet lists differ; left-only [{}], right-only [{}]",
            self.site,
            left_hrefs.join(", "),
            right_hrefs.join(", ")
        );
    }

    fn missing_property(
        &mut self,
        side: Side,
        path: &str,
        property: &str,
        value: &str,
        attribution: Option<&AttributionReport>,
    ) {
        self.findings += 1;
        log::error!(
            "{}: {} has {}: {} only on the {} side ({})",
            self.site,
            path,
            property,
            value,
            side.label(),
            describe_attribution(attribution)
        );
    }

    fn differing_value(
        &mut self,
        path: &str,
        property: &str,
        left_value: &str,
        right_value: &str,
        attribution: Option<&AttributionReport>,
    ) {
        self.findings += 1;
        log::error!(
            "{}: {} differs at {}: left '{}' vs right '{}' ({})",
            self.site,
            property,
            path,
            left_value,
            right_value,
            describe_attribution(attribution)
        );
    }

    fn round_trip_failure(&mut self, sheet_index: usize, original: &str, reparsed: &str, detail: &str) {
        self.findings += 1;
        log::error!(
            "{}: sheet {} rule does not round-trip ({}): '{}' became '{}'",
            self.site,
            sheet_index,
            detail,
            original,
            reparsed
        );
    }

    fn structural_mismatch(&mut self, path: &str, detail: &str) {
        self.findings += 1;
        log::error!("{}: structure differs at {}: {}", self.site, path, detail);
    }

    fn fatal(&mut self, error: &CssDiffError) {
        log::error!("{}: fatal: {}", self.site, error);
    }

    fn finding_count(&self) -> usize {
        self.findings
    }

    fn flush(&mut self) {}

    fn close(&mut self) {}
}

/// Per-site findings file, opened lazily on the first finding so a clean
/// comparison leaves nothing on disk.
pub struct FileReporter {
    path: PathBuf,
    site: String,
    writer: Option<BufWriter<File>>,
    findings: usize,
    last_sheet_index: Option<usize>,
}

impl FileReporter {
    pub fn new(path: impl AsRef<Path>) -> FileReporter {
        FileReporter {
            path: path.as_ref().to_path_buf(),
            site: String::new(),
            writer: None,
            findings: 0,
            last_sheet_index: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, line: &str) {
        if self.writer.is_none() {
            match File::create(&self.path) {
                Ok(file) => {
                    let mut writer = BufWriter::new(file);
                    if !self.site.is_empty() {
                        let _ = writeln!(writer, "Site: {}", self.site);
                    }
                    self.writer = Some(writer);
                }
                Err(err) => {
                    log::warn!(
                        "could not open report file {}: {}",
                        self.path.display(),
                        err
                    );
                    return;
                }
            }
        }
        if let Some(writer) = self.writer.as_mut() {
            if let Err(err) = writeln!(writer, "{}", line) {
                log::warn!("report write failed: {}", err);
            }
        }
    }
}

impl SiteReporter for FileReporter {
    fn start_site(&mut self, name: &str) {
        self.site = name.to_string();
        self.findings = 0;
        self.last_sheet_index = None;
    }

    fn side_descriptions(&mut self, left: &str, right: &str) {
        if self.writer.is_some() {
            let line = format!("Left: {}\nRight: {}", left, right);
            self.write_line(&line);
        } else {
            // Deferred until the first finding opens the file.
            self.site = format!("{} ({} vs {})", self.site, left, right);
        }
    }

    fn sheet_count_mismatch(&mut self, left_hrefs: &[String], right_hrefs: &[String]) {
        self.findings += 1;
        let line = format!(
            "Sheet lists differ. Left-only: [{}]. Right-only: [{}].",
            left_hrefs.join(", "),
            right_hrefs.join(", ")
        );
        self.write_line(&line);
    }

    fn missing_property(
        &mut self,
        side: Side,
        path: &str,
        property: &str,
        value: &str,
        attribution: Option<&AttributionReport>,
    ) {
        self.findings += 1;
        let line = format!(
            "Missing on {} side only at {}: {}: {} ({})",
            match side {
                Side::Left => "right",
                Side::Right => "left",
            },
            path,
            property,
            value,
            describe_attribution(attribution)
        );
        self.write_line(&line);
    }

    fn differing_value(
        &mut self,
        path: &str,
        property: &str,
        left_value: &str,
        right_value: &str,
        attribution: Option<&AttributionReport>,
    ) {
        self.findings += 1;
        let line = format!(
            "Different value at {}: {}: '{}' vs '{}' ({})",
            path,
            property,
            left_value,
            right_value,
            describe_attribution(attribution)
        );
        self.write_line(&line);
    }

    fn round_trip_failure(&mut self, sheet_index: usize, original: &str, reparsed: &str, detail: &str) {
        self.findings += 1;
        if self.last_sheet_index != Some(sheet_index) {
            let header = format!("Sheet {}:", sheet_index);
            self.write_line(&header);
            self.last_sheet_index = Some(sheet_index);
        }
        let line = format!(
            "  Rule does not round-trip ({}): '{}' became '{}'",
            detail, original, reparsed
        );
        self.write_line(&line);
    }

    fn structural_mismatch(&mut self, path: &str, detail: &str) {
        self.findings += 1;
        let line = format!("Structure differs at {}: {}", path, detail);
        self.write_line(&line);
    }

    fn fatal(&mut self, error: &CssDiffError) {
        let line = format!("Fatal: {}", error);
        self.write_line(&line);
        self.flush();
    }

    fn finding_count(&self) -> usize {
        self.findings
    }

    fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(err) = writer.flush() {
                log::warn!("report flush failed: {}", err);
            }
        }
    }

    fn close(&mut self) {
        self.flush();
        self.writer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_report_path(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .subsec_nanos();
        std::env::temp_dir().join(format!(
            "cssdiff-report-{}-{}-{}.txt",
            tag,
            std::process::id(),
            nanos
        ))
    }

    #[test]
    fn clean_comparison_leaves_no_file() {
        let path = temp_report_path("clean");
        let mut reporter = FileReporter::new(&path);
        reporter.start_site("example.com");
        reporter.side_descriptions("dom", "snapshot");
        reporter.close();
        assert!(!path.exists());
        assert_eq!(reporter.finding_count(), 0);
    }

    #[test]
    fn findings_open_the_file_lazily_and_count() {
        let path = temp_report_path("findings");
        let mut reporter = FileReporter::new(&path);
        reporter.start_site("example.com");
        reporter.differing_value("html>body>p", "color", "red", "blue", None);
        reporter.structural_mismatch("html>body", "extra <div> on right side");
        reporter.close();
        assert_eq!(reporter.finding_count(), 2);
        let contents = std::fs::read_to_string(&path).expect("report file");
        assert!(contents.contains("Site: example.com"));
        assert!(contents.contains("Different value at html>body>p"));
        assert!(contents.contains("extra <div> on right side"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn sheet_header_written_once_per_sheet() {
        let path = temp_report_path("sheets");
        let mut reporter = FileReporter::new(&path);
        reporter.start_site("example.com");
        reporter.round_trip_failure(0, "p{color:red}", "p{}", "declaration lost");
        reporter.round_trip_failure(0, "a{top:0}", "a{}", "declaration lost");
        reporter.round_trip_failure(1, "b{left:0}", "b{}", "declaration lost");
        reporter.close();
        let contents = std::fs::read_to_string(&path).expect("report file");
        assert_eq!(contents.matches("Sheet 0:").count(), 1);
        assert_eq!(contents.matches("Sheet 1:").count(), 1);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn fatal_flushes_pending_findings() {
        let path = temp_report_path("fatal");
        let mut reporter = FileReporter::new(&path);
        reporter.start_site("example.com");
        reporter.differing_value("html", "color", "red", "blue", None);
        reporter.fatal(&CssDiffError::ComputedStyle {
            element: "html>body".to_string(),
            message: "backend gave up".to_string(),
        });
        // File is readable before close because fatal flushed.
        let contents = std::fs::read_to_string(&path).expect("report file");
        assert!(contents.contains("Fatal: computed style error"));
        reporter.close();
        let _ = std::fs::remove_file(&path);
    }
}
