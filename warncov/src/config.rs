//! Run configuration.
//!
//! A [`Config`] is passed explicitly into every component that needs it. It can be built in code, starting from
//! `Config::default()`, or loaded from a TOML file:
//!
//! ```toml
//! database = "/srv/campaign/coverage.db"
//! load-database = true
//! save-database = true
//! source-prefix = "/src/linux/"
//! combine-coverage = false
//! max-depth = 5
//! entry-functions = ["start_kernel", "kernel_init", "do_syscall_64"]
//! ```
//!
//! Every key is optional.
//!
//! [`Config`]: ./struct.Config.html

use error::*;

use num_cpus;
use toml;

use std::fs;
use std::path::{Path, PathBuf};

/// Coverage files looked up inside a fuzz workdir, in order of preference.
pub const DEFAULT_COVERAGE_CANDIDATES: &[&str] = &[
    "traces/linecov.lst",
    "traces/smatch_match_rust.lst",
    "traces/smatch_match.lst",
    "traces/addr2line.lst",
];

/// Warning reports looked up inside a fuzz workdir, in order of preference.
pub const DEFAULT_REPORT_CANDIDATES: &[&str] = &["target/smatch_warns.txt_results_analyzed", "target/smatch_warns.txt"];

/// Functions from which every kernel path is assumed to start.
pub const DEFAULT_ENTRY_FUNCTIONS: &[&str] = &["start_kernel", "kernel_init"];

/// Default bound of the backward reachability search.
pub const DEFAULT_MAX_DEPTH: usize = 4;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Path of the persisted coverage database.
    pub database: Option<PathBuf>,
    /// Load the database when the session starts. Requires `database`.
    pub load_database: bool,
    /// Merge and save the database when the session finishes. Requires `database`.
    pub save_database: bool,
    /// Absolute prefix stripped from paths in the address resolution dump.
    pub source_prefix: Option<String>,
    pub coverage_candidates: Vec<PathBuf>,
    pub report_candidates: Vec<PathBuf>,
    /// Union all existing coverage candidates of a workdir instead of using the first one.
    pub combine_coverage: bool,
    /// Treat a missing coverage file as empty coverage instead of failing.
    pub ignore_errors: bool,
    /// Number of worker threads used to parse trace files.
    pub parallelism: usize,
    pub max_depth: usize,
    pub entry_functions: Vec<String>,
    /// Stitch trace fragments separated by the exit sentinel.
    pub splice_traces: bool,
    /// Keep old annotations which no longer match any new warning.
    pub keep_stale_annotations: bool,
    /// Allow replacing an existing output file.
    pub overwrite: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            database: None,
            load_database: false,
            save_database: false,
            source_prefix: None,
            coverage_candidates: DEFAULT_COVERAGE_CANDIDATES.iter().map(PathBuf::from).collect(),
            report_candidates: DEFAULT_REPORT_CANDIDATES.iter().map(PathBuf::from).collect(),
            combine_coverage: false,
            ignore_errors: false,
            parallelism: num_cpus::get(),
            max_depth: DEFAULT_MAX_DEPTH,
            entry_functions: DEFAULT_ENTRY_FUNCTIONS.iter().map(|s| s.to_string()).collect(),
            splice_traces: true,
            keep_stale_annotations: false,
            overwrite: false,
        }
    }
}

impl Config {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(s: &str) -> Result<Config> {
        Ok(toml::from_str(s)?)
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`InputNotFound`] if the file does not exist, and [`Toml`] if it is not a valid configuration.
    ///
    /// [`InputNotFound`]: ../error/enum.ErrorKind.html#variant.InputNotFound
    /// [`Toml`]: ../error/enum.ErrorKind.html#variant.Toml
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        ensure!(path.is_file(), ErrorKind::InputNotFound(path.to_owned()));
        let text = fs::read_to_string(path)?;
        Config::from_toml_str(&text).at_path(path)
    }

    /// The number of trace workers to use, never zero.
    pub fn workers(&self) -> usize {
        self.parallelism.max(1)
    }

    /// The database path, if the database should be loaded.
    pub fn database_to_load(&self) -> Option<&Path> {
        self.database.as_ref().filter(|_| self.load_database).map(|p| &**p)
    }

    /// The database path, if the database should be saved.
    pub fn database_to_save(&self) -> Option<&Path> {
        self.database.as_ref().filter(|_| self.save_database).map(|p| &**p)
    }
}
