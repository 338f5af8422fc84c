//! Errors related to the `warncov` crate.
//!
//! Please see documentation of the [`error-chain` crate](https://docs.rs/error-chain/0.12.0/error_chain/) for detailed
//! usage.
//!
//! Only [`InputNotFound`], [`OutputAlreadyExists`] and [`CoverageNotFound`] are meant to stop a run. The remaining
//! kinds are produced by the single-record parsers and are recovered locally by their callers, which skip the record
//! and log a message.
//!
//! [`InputNotFound`]: ./enum.ErrorKind.html#variant.InputNotFound
//! [`OutputAlreadyExists`]: ./enum.ErrorKind.html#variant.OutputAlreadyExists
//! [`CoverageNotFound`]: ./enum.ErrorKind.html#variant.CoverageNotFound

use std::io;
use std::path::{Path, PathBuf};

error_chain! {
    foreign_links {
        Io(io::Error) /** Wrapper of standard I/O error. */;
        Regex(::regex::Error) /** Wrapper of regex compilation error, e.g. from a user supplied filter. */;
        Bincode(::bincode::Error) /** Wrapper of the coverage database codec error. */;
        Toml(::toml::de::Error) /** Wrapper of configuration file error. */;
        GlobPattern(::glob::PatternError) /** Wrapper of trace discovery pattern error. */;
        ThreadPool(::rayon::ThreadPoolBuildError) /** Wrapper of worker pool creation error. */;
        Json(::serde_json::Error) #[cfg(feature="serde_json")] /** Wrapper of JSON error. */;
    }

    errors {
        /// A required input file or directory does not exist.
        InputNotFound(path: PathBuf) {
            description("input not found")
            display("input '{}' does not exist", path.display())
        }

        /// Writing the output would overwrite an existing file, and overwriting was not requested.
        OutputAlreadyExists(path: PathBuf) {
            description("output already exists")
            display("output '{}' already exists, enable `overwrite` to replace it", path.display())
        }

        /// The input is neither a readable coverage file nor a workdir containing any known coverage file.
        CoverageNotFound(path: PathBuf) {
            description("coverage not found")
            display("no coverage file found for '{}'", path.display())
        }

        /// A report or trace line does not match any expected pattern. Never fatal.
        MalformedRecord(line: String) {
            description("malformed record")
            display("malformed record {:?}", line)
        }

        /// A coverage file could not be decoded as text. The file is skipped.
        Decode(path: PathBuf) {
            description("cannot decode file as text")
            display("cannot decode '{}' as UTF-8 text", path.display())
        }

        /// A report record lacks the `{IDENTIFIER}` token needed for structured matching.
        MissingIdentifierToken(record: String) {
            description("missing identifier token")
            display("record has no {{IDENTIFIER}} token: {:?}", record)
        }
    }
}

impl ErrorKind {
    /// Whether the error is expected to happen routinely while scanning a report, and should not be reported as a
    /// warning.
    pub fn is_routine(&self) -> bool {
        match *self {
            ErrorKind::MalformedRecord(_) | ErrorKind::MissingIdentifierToken(_) => true,
            _ => false,
        }
    }
}

//----------------------------------------------------------------------------------------------------------------------

/// A trait to log contextual information. When applied on an error value, a warning message will be printed out to
/// indicate an unexpected error.
pub trait At: Sized {
    /// Checks whether the error is a routine parse miss.
    fn is_routine(&self) -> bool;

    /// Checks whether a warning should be printed out.
    fn should_warn(&self) -> bool {
        !self.is_routine()
    }

    /// Marks the current error with the file it came from.
    fn at_path(self, path: &Path) -> Self {
        if self.should_warn() {
            warn!("In file {}:", path.display())
        }
        self
    }

    /// Marks the current error with the file and line number it came from.
    fn at_line(self, path: &Path, lineno: usize) -> Self {
        if self.should_warn() {
            warn!("At {}:{}:", path.display(), lineno)
        }
        self
    }
}

impl<T, E: At> At for ::std::result::Result<T, E> {
    fn is_routine(&self) -> bool {
        self.as_ref().err().map_or(false, E::is_routine)
    }

    fn should_warn(&self) -> bool {
        self.as_ref().err().map_or(false, E::should_warn)
    }
}

impl At for ErrorKind {
    fn is_routine(&self) -> bool {
        ErrorKind::is_routine(self)
    }
}

impl At for Error {
    fn is_routine(&self) -> bool {
        self.kind().is_routine()
    }
}

impl At for io::Error {
    fn is_routine(&self) -> bool {
        false
    }
}

#[test]
fn test_routine_errors_do_not_warn() {
    let routine: Result<()> = Err(ErrorKind::MalformedRecord("hello".to_owned()).into());
    assert!(routine.is_routine());
    assert!(!routine.should_warn());

    let fatal: Result<()> = Err(ErrorKind::InputNotFound(PathBuf::from("/nonexistent")).into());
    assert!(!fatal.is_routine());
    assert!(fatal.should_warn());

    let fine: Result<()> = Ok(());
    assert!(!fine.should_warn());
}
