//! One correlation run over any number of inputs.
//!
//! ```rust,no_run
//! # use warncov::{Config, Session};
//! # use std::path::Path;
//! # fn run() -> warncov::Result<()> {
//! let mut session = Session::new(Config::default())?;
//! session.add_input(Path::new("/work/kafl_workdir"), None)?;
//! let correlation = session.finish()?;
//! println!("{:.2}% covered", correlation.headline().percentage());
//! # Ok(())
//! # }
//! ```

use config::Config;
use correlate::{match_coverage, Correlation};
use coverage::CoverageStore;
use database::CoverageDatabase;
use error::*;
use reach::{Reachability, Verdict};
use resolve::AddrInfo;
use trace::{self, TraceGraph};
use transfer::{transfer_files, TransferredRecord};
use warning::{WarningEntry, WarningStore};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// What a single input contributed.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct InputSummary {
    pub input: PathBuf,
    pub report: PathBuf,
    pub coverage_locations: usize,
    pub warnings: usize,
    /// Warnings of the report found at a covered location.
    pub hits: usize,
}

/// Accumulates warnings and covered entries of several inputs.
#[derive(Debug)]
pub struct Session {
    config: Config,
    warnings: WarningStore,
    covered: CoverageDatabase,
}

impl Session {
    /// Starts a session, loading the coverage database if the configuration asks for it.
    ///
    /// A database file which does not exist yet is treated as empty.
    pub fn new(config: Config) -> Result<Session> {
        let covered = match config.database_to_load() {
            Some(path) if path.exists() => CoverageDatabase::load(path)?,
            Some(path) => {
                info!("no database at {} yet, starting empty", path.display());
                CoverageDatabase::new()
            },
            None => CoverageDatabase::new(),
        };
        Ok(Session {
            config,
            warnings: WarningStore::new(),
            covered,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// All warnings of all inputs added so far.
    pub fn warnings(&self) -> &WarningStore {
        &self.warnings
    }

    /// Covered entries, including those loaded from the database.
    pub fn covered(&self) -> &CoverageDatabase {
        &self.covered
    }

    /// Locates the warning report of an input.
    ///
    /// An explicit report must exist. Otherwise the input must be a fuzz workdir containing one of the configured
    /// report candidates.
    pub fn find_report(&self, input: &Path, report: Option<&Path>) -> Result<PathBuf> {
        if let Some(report) = report {
            ensure!(report.is_file(), ErrorKind::InputNotFound(report.to_owned()));
            return Ok(report.to_owned());
        }
        let first_candidate = self.config.report_candidates.first().cloned().unwrap_or_default();
        // a plain coverage file says nothing about where its report is.
        ensure!(!input.is_file(), ErrorKind::InputNotFound(first_candidate));

        let mut last = input.join(first_candidate);
        for candidate in &self.config.report_candidates {
            last = input.join(candidate);
            if last.is_file() {
                return Ok(last);
            }
            debug!("no report at {}", last.display());
        }
        bail!(ErrorKind::InputNotFound(last));
    }

    /// Adds a coverage file or fuzz workdir, with its warning report.
    ///
    /// Returns `None` if the input was skipped because of `ignore_errors`.
    pub fn add_input(&mut self, input: &Path, report: Option<&Path>) -> Result<Option<InputSummary>> {
        info!("adding input {}", input.display());
        let coverage = CoverageStore::open(input, &self.config)?;

        let report = match self.find_report(input, report) {
            Ok(report) => report,
            Err(ref e) if self.config.ignore_errors => {
                warn!("{}, input skipped", e);
                return Ok(None);
            },
            Err(e) => return Err(e),
        };

        let warnings = WarningStore::open(&report)?;
        let hits = match_coverage(&warnings, &coverage);
        let summary = InputSummary {
            input: input.to_owned(),
            report,
            coverage_locations: coverage.len(),
            warnings: warnings.len(),
            hits: hits.len(),
        };

        let new = self.covered.extend(hits);
        debug!("{} hits, {} not seen before", summary.hits, new);
        self.warnings.merge(warnings);
        Ok(Some(summary))
    }

    /// Correlates the warnings seen so far with the covered entries seen so far.
    pub fn correlation(&self) -> Correlation {
        Correlation::from_covered(&self.warnings, self.covered.entries().iter().cloned())
    }

    /// Builds the trace graph from the trace files in `trace_dir`.
    pub fn load_traces(&self, trace_dir: &Path) -> Result<TraceGraph> {
        ensure!(trace_dir.is_dir(), ErrorKind::InputNotFound(trace_dir.to_owned()));
        let files = trace::discover(trace_dir)?;
        let mut graph = TraceGraph::new();
        graph.load(&files, self.config.workers(), self.config.splice_traces)?;
        Ok(graph)
    }

    /// Loads an address resolution dump, stripping the configured source prefix.
    pub fn load_addr_info(&self, path: &Path) -> Result<AddrInfo> {
        AddrInfo::open(path, self.config.source_prefix.as_ref().map(|s| &**s))
    }

    /// Decides the reachability of every not covered `concern` warning, using the warnings of the session as anchors.
    pub fn reachability(&self, correlation: &Correlation, graph: &TraceGraph, addrs: &AddrInfo) -> BTreeMap<WarningEntry, Verdict> {
        Reachability::new(graph, addrs, &self.config).with_anchors(&self.warnings).classify(correlation)
    }

    /// Transfers the annotations of `old` onto `new`, writing to `output`.
    pub fn transfer(&self, old: &Path, new: &Path, output: &Path) -> Result<Vec<TransferredRecord>> {
        transfer_files(old, new, output, &self.config)
    }

    /// Ends the session, saving the covered entries into the database if the configuration asks for it.
    pub fn finish(mut self) -> Result<Correlation> {
        let correlation = self.correlation();
        if let Some(path) = self.config.database_to_save().map(|p| p.to_owned()) {
            self.covered.save(&path)?;
        }
        Ok(correlation)
    }
}
