//! Correlation report.
//!
//! The [`Report`] structure collects everything derived from one [`Correlation`]: the summary, per-category
//! statistics, the per-function listing and, optionally, reachability verdicts. It is format-independent and can be
//! serialized via serde, e.g. to JSON with [`Report::to_json()`].
//!
//! [`Report`]: ./struct.Report.html
//! [`Correlation`]: ../correlate/struct.Correlation.html
//! [`Report::to_json()`]: ./struct.Report.html#method.to_json

use correlate::{CategoryStats, Correlation, FunctionListing, Headline, UncoveredFunctions};
#[cfg(feature = "serde_json")]
use error::*;
use reach::{adjusted_headline, Verdict};
use warning::{Category, Filter, WarningEntry};

#[cfg(feature = "serde_json")]
use serde_json;

use std::collections::BTreeMap;
#[cfg(feature = "serde_json")]
use std::io::Write;

/// Which parts of the correlation are listed.
#[derive(Clone, Debug, Default)]
pub struct ReportOptions {
    /// Selects the functions and categories of the function listing.
    pub filter: Filter,
    /// Omit covered entries from the function listing.
    pub only_not_covered: bool,
    /// Omit the function listing entirely.
    pub only_summary: bool,
}

/// Overall numbers.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize)]
pub struct Summary {
    pub covered_functions: usize,
    pub not_covered_functions: usize,
    pub partially_covered_functions: usize,
    pub covered_entries: usize,
    pub not_covered_entries: usize,
    /// Entry coverage excluding the `excluded`, `wrapper` and `unclassified` categories.
    pub headline: Headline,
}

/// Not covered `concern` and `safe` functions.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize)]
pub struct UncoveredSummary {
    pub concern: UncoveredFunctions,
    /// Does not repeat the functions listed in `concern`.
    pub safe: UncoveredFunctions,
}

/// The verdict of a single warning.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct VerdictLine {
    pub entry: WarningEntry,
    pub verdict: Verdict,
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct ReachabilitySummary {
    pub verdicts: Vec<VerdictLine>,
    /// Headline coverage after dropping the warnings with uncertain verdict.
    pub adjusted_headline: Headline,
}

/// A correlation report.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct Report {
    pub summary: Summary,
    pub categories: Vec<CategoryStats>,
    pub functions: Vec<FunctionListing>,
    pub uncovered: UncoveredSummary,
    pub reachability: Option<ReachabilitySummary>,
}

impl Report {
    /// Creates a report of the correlation.
    pub fn new(correlation: &Correlation, options: &ReportOptions) -> Report {
        let summary = Summary {
            covered_functions: correlation.covered_functions().len(),
            not_covered_functions: correlation.not_covered_functions().len(),
            partially_covered_functions: correlation.partially_covered_functions().len(),
            covered_entries: correlation.covered().len(),
            not_covered_entries: correlation.not_covered().len(),
            headline: correlation.headline(),
        };

        let functions = if options.only_summary {
            Vec::new()
        } else {
            correlation.function_listing(&options.filter, options.only_not_covered)
        };

        let concern = correlation.uncovered_functions(Category::Concern, &UncoveredFunctions::default());
        let safe = correlation.uncovered_functions(Category::Safe, &concern);

        Report {
            summary,
            categories: correlation.all_category_stats(),
            functions,
            uncovered: UncoveredSummary { concern, safe },
            reachability: None,
        }
    }

    /// Attaches reachability verdicts to the report.
    pub fn with_reachability(mut self, correlation: &Correlation, verdicts: &BTreeMap<WarningEntry, Verdict>) -> Report {
        self.reachability = Some(ReachabilitySummary {
            verdicts: verdicts
                .iter()
                .map(|(entry, verdict)| VerdictLine {
                    entry: entry.clone(),
                    verdict: verdict.clone(),
                })
                .collect(),
            adjusted_headline: adjusted_headline(correlation, verdicts),
        });
        self
    }

    /// Serializes the report as pretty-printed JSON.
    #[cfg(feature = "serde_json")]
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the report as JSON.
    #[cfg(feature = "serde_json")]
    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
