//! Correlates static-analysis warning reports with coverage recorded during kernel fuzzing.
//!
//! The crate answers two questions for every warning of a report: "was this flagged code actually executed?" and,
//! when it was not, "is it at least reachable through the call edges observed while tracing?". It also carries human
//! triage annotations forward when a report is regenerated for a new kernel version.
//!
//! The main entry points are:
//!
//! * [`WarningStore`] and [`CoverageStore`], which parse the two inputs.
//! * [`Correlation`], which splits the warnings into covered and not covered sets.
//! * [`TraceGraph`] and [`Reachability`], which search the observed control-flow edges backwards.
//! * [`transfer()`](transfer/fn.transfer.html), which migrates annotations between two reports.
//! * [`Session`], which ties everything to a [`Config`] and the persisted [`CoverageDatabase`].

#![recursion_limit="128"] // needed for error_chain.

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde;
#[cfg(feature = "serde_json")]
extern crate serde_json;
extern crate bincode;
extern crate glob;
extern crate lz4_flex;
extern crate num_cpus;
extern crate petgraph;
extern crate rayon;
extern crate regex;
extern crate toml;

#[cfg(test)]
extern crate tempdir;

mod utils;
pub mod error;
pub mod config;
pub mod warning;
pub mod coverage;
pub mod trace;
pub mod resolve;
pub mod correlate;
pub mod reach;
pub mod report;
pub mod transfer;
pub mod filter;
pub mod database;
pub mod session;

pub use config::Config;
pub use correlate::Correlation;
pub use coverage::CoverageStore;
pub use database::CoverageDatabase;
pub use error::{Error, ErrorKind, Result};
pub use reach::{Reachability, Verdict};
pub use resolve::AddrInfo;
pub use session::Session;
pub use trace::TraceGraph;
pub use warning::{Categories, Category, Location, WarningEntry, WarningStore};
