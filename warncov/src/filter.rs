//! Narrows a raw analyzer report down to the records worth triaging.

use error::*;

use regex::Regex;

use std::collections::HashSet;
use std::fs;
use std::path::Path;

lazy_static! {
    static ref IDENTIFIER_RE: Regex = Regex::new(r"\{[A-Za-z0-9_]+\}").expect("identifier regex");
}

/// Name of the analyzer check whose lines are always kept.
pub const DEFAULT_CHECK_NAME: &str = "check_host_input";

/// Driver sources reachable in the fuzzed configuration.
pub const DEFAULT_ALLOWED_DRIVERS: &[&str] = &[
    "drivers/virtio",
    "drivers/block/virtio_blk.c",
    "drivers/net/virtio_net.c",
    "drivers/char/virtio_console.c",
    "drivers/acpi",
    "drivers/char/hpet.c",
    "drivers/pci",
    "drivers/rtc/rtc-mc146818-lib.c",
    "drivers/firmware/qemu_fw_cfg.c",
    "drivers/net/tun.c",
    "drivers/net/tap.c",
    "drivers/firmware/efi",
];

/// Subsystems dropped entirely.
pub const DEFAULT_DENIED_PREFIXES: &[&str] = &["sound/", "samples/"];

/// Driver subtrees dropped even though their parent is allowed.
pub const DEFAULT_DENIED_DRIVERS: &[&str] = &["drivers/pci/controller/"];

/// Rules selecting the records of a report.
#[derive(Clone, Debug)]
pub struct ReportFilter {
    pub check_name: String,
    pub allowed_drivers: Vec<String>,
    pub denied_prefixes: Vec<String>,
    pub denied_drivers: Vec<String>,
}

fn to_strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for ReportFilter {
    fn default() -> ReportFilter {
        ReportFilter {
            check_name: DEFAULT_CHECK_NAME.to_owned(),
            allowed_drivers: to_strings(DEFAULT_ALLOWED_DRIVERS),
            denied_prefixes: to_strings(DEFAULT_DENIED_PREFIXES),
            denied_drivers: to_strings(DEFAULT_DENIED_DRIVERS),
        }
    }
}

impl ReportFilter {
    /// Whether a record passes the path rules.
    fn accepts(&self, record: &str) -> bool {
        // relative paths duplicate the absolute ones.
        if record.contains("../") {
            return false;
        }
        let body = record.trim_start();
        let body = body.trim_start_matches("./");
        if self.denied_prefixes.iter().any(|p| body.starts_with(&**p)) {
            return false;
        }
        if body.starts_with("drivers/") {
            if self.denied_drivers.iter().any(|d| record.contains(&**d)) {
                return false;
            }
            return self.allowed_drivers.iter().any(|d| record.contains(&**d));
        }
        true
    }

    /// Filters the text of a report, returning the retained records without their `;` terminator.
    ///
    /// The input should already be reduced to the [relevant lines](#method.relevant_lines). Records differing only
    /// in surrounding whitespace are returned once.
    pub fn filter<'a>(&self, relevant_lines: &'a str) -> Vec<&'a str> {
        let mut seen = HashSet::new();
        relevant_lines
            .split(';')
            .filter(|r| !r.trim().is_empty())
            .filter(|r| seen.insert(r.trim()))
            .filter(|r| self.accepts(r))
            .collect()
    }

    /// Keeps the lines of a report which can belong to a warning record.
    pub fn relevant_lines(&self, report: &str) -> String {
        let mut result = String::with_capacity(report.len());
        for line in report.split('\n') {
            if IDENTIFIER_RE.is_match(line) || line.contains(&*self.check_name) {
                result.push_str(line);
                result.push('\n');
            }
        }
        result
    }

    /// Filters a report, producing the text of the filtered report.
    pub fn apply(&self, report: &str) -> String {
        let lines = self.relevant_lines(report);
        let records = self.filter(&lines);
        let mut result = String::with_capacity(lines.len());
        for record in &records {
            result.push_str(record);
            result.push(';');
        }
        result
    }

    /// Filters the report at `input` and writes the result to `output`. Returns the number of retained records.
    ///
    /// # Errors
    ///
    /// * Returns [`InputNotFound`] if `input` does not exist.
    /// * Returns [`OutputAlreadyExists`] if `output` exists and `overwrite` is not set.
    ///
    /// [`InputNotFound`]: ../error/enum.ErrorKind.html#variant.InputNotFound
    /// [`OutputAlreadyExists`]: ../error/enum.ErrorKind.html#variant.OutputAlreadyExists
    pub fn apply_file(&self, input: &Path, output: &Path, overwrite: bool) -> Result<usize> {
        ensure!(input.is_file(), ErrorKind::InputNotFound(input.to_owned()));
        ensure!(overwrite || !output.exists(), ErrorKind::OutputAlreadyExists(output.to_owned()));

        let report = fs::read_to_string(input).at_path(input)?;
        let filtered = self.apply(&report);
        let count = filtered.matches(';').count();
        fs::write(output, filtered)?;
        info!("kept {} records of {}", count, input.display());
        Ok(count)
    }
}
