//! Source lines executed during a fuzzing run.
//!
//! Coverage comes as free text containing `path:line` tokens, e.g. the output of resolving every traced address. The
//! input may also be a fuzz workdir, in which case the coverage file is looked up from a list of candidates (see
//! [`Config::coverage_candidates`]).
//!
//! [`Config::coverage_candidates`]: ../config/struct.Config.html#structfield.coverage_candidates

use config::Config;
use error::*;
use warning::Location;

use regex::Regex;

use std::collections::BTreeSet;
use std::collections::btree_set;
use std::fs;
use std::iter::FromIterator;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref LOCATION_TOKEN_RE: Regex = Regex::new(r"([\w./-]+):([0-9]+)").expect("location token regex");
}

/// Extracts every `path:line` token of a text.
pub fn parse_locations(text: &str) -> Vec<Location> {
    LOCATION_TOKEN_RE
        .captures_iter(text)
        .filter_map(|caps| caps[2].parse().ok().map(|line| Location::new(&caps[1], line)))
        .collect()
}

/// The set of covered source locations of one or more runs.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct CoverageStore {
    locations: BTreeSet<Location>,
    files: Vec<PathBuf>,
    decode_errors: usize,
}

impl CoverageStore {
    pub fn new() -> CoverageStore {
        CoverageStore::default()
    }

    /// Parses coverage text.
    pub fn parse(text: &str) -> CoverageStore {
        parse_locations(text).into_iter().collect()
    }

    /// Adds the locations of a single coverage file.
    ///
    /// A file which is not valid UTF-8 is skipped with a warning and counted in
    /// [`decode_errors()`](#method.decode_errors). A file which cannot be read at all is [`CoverageNotFound`].
    ///
    /// [`CoverageNotFound`]: ../error/enum.ErrorKind.html#variant.CoverageNotFound
    pub fn add_file(&mut self, path: &Path) -> Result<()> {
        debug!("open coverage file {}", path.display());
        let bytes = fs::read(path).chain_err(|| ErrorKind::CoverageNotFound(path.to_owned()))?;
        match String::from_utf8(bytes) {
            Ok(text) => {
                let before = self.locations.len();
                self.locations.extend(parse_locations(&text));
                self.files.push(path.to_owned());
                debug!("{} new locations from {}", self.locations.len() - before, path.display());
            },
            Err(_) => {
                let e = Error::from(ErrorKind::Decode(path.to_owned()));
                warn!("{}, skipped", e);
                self.decode_errors += 1;
            },
        }
        Ok(())
    }

    /// Adds the coverage of a file or fuzz workdir.
    ///
    /// For a directory, the candidates of `config.coverage_candidates` are tried in order. The first existing one is
    /// used, or all existing ones if `config.combine_coverage` is set.
    ///
    /// # Errors
    ///
    /// Returns [`CoverageNotFound`] if `input` is neither a readable file nor a directory containing any readable
    /// candidate, unless `config.ignore_errors` is set. In that case the unreadable files are skipped.
    ///
    /// [`CoverageNotFound`]: ../error/enum.ErrorKind.html#variant.CoverageNotFound
    pub fn add_input(&mut self, input: &Path, config: &Config) -> Result<()> {
        let files = find_coverage_files(input, config);
        if files.is_empty() {
            if config.ignore_errors {
                warn!("no coverage found for {}, assuming empty coverage", input.display());
                return Ok(());
            }
            bail!(ErrorKind::CoverageNotFound(input.to_owned()));
        }
        for file in files {
            match self.add_file(&file) {
                Ok(()) => {},
                Err(ref e) if config.ignore_errors => warn!("{}, assuming empty coverage", e),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Loads the coverage of a file or fuzz workdir into a new store.
    pub fn open(input: &Path, config: &Config) -> Result<CoverageStore> {
        let mut store = CoverageStore::new();
        store.add_input(input, config)?;
        Ok(store)
    }

    /// Unions another store into this one.
    pub fn merge(&mut self, other: CoverageStore) {
        self.locations.extend(other.locations);
        self.files.extend(other.files);
        self.decode_errors += other.decode_errors;
    }

    pub fn insert(&mut self, location: Location) -> bool {
        self.locations.insert(location)
    }

    pub fn contains(&self, location: &Location) -> bool {
        self.locations.contains(location)
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<Location> {
        self.locations.iter()
    }

    /// The coverage files which contributed to this store.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Number of coverage files skipped because they could not be decoded.
    pub fn decode_errors(&self) -> usize {
        self.decode_errors
    }
}

impl FromIterator<Location> for CoverageStore {
    fn from_iter<I: IntoIterator<Item = Location>>(iter: I) -> CoverageStore {
        CoverageStore {
            locations: iter.into_iter().collect(),
            ..CoverageStore::default()
        }
    }
}

impl<'a> IntoIterator for &'a CoverageStore {
    type Item = &'a Location;
    type IntoIter = btree_set::Iter<'a, Location>;
    fn into_iter(self) -> Self::IntoIter {
        self.locations.iter()
    }
}

/// Lists the coverage files to read for an input.
fn find_coverage_files(input: &Path, config: &Config) -> Vec<PathBuf> {
    if input.is_file() {
        return vec![input.to_owned()];
    }
    if !input.is_dir() {
        return Vec::new();
    }

    let mut existing = config.coverage_candidates.iter().map(|c| input.join(c)).filter(|p| p.is_file());
    if config.combine_coverage {
        existing.collect()
    } else {
        existing.next().into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempdir::TempDir;

    #[test]
    fn test_parse_locations() {
        let store = CoverageStore::parse(
            "0xffffffff81000000: start_kernel at ./init/main.c:900\n\
             drivers/virtio/virtio.c:42 drivers/virtio/virtio.c:43, lib/string.c:7\n\
             no tokens here: 12\n",
        );
        assert_eq!(store.len(), 4);
        assert!(store.contains(&Location::new("init/main.c", 900)));
        assert!(store.contains(&Location::new("lib/string.c", 7)));
        assert!(!store.contains(&Location::new("here", 12)));
    }

    fn workdir_with_candidates() -> TempDir {
        let dir = TempDir::new("warncov-coverage").unwrap();
        fs::create_dir(dir.path().join("traces")).unwrap();
        fs::write(dir.path().join("traces/linecov.lst"), b"drivers/virtio/virtio.c:\xff\xfe42\n").unwrap();
        fs::write(dir.path().join("traces/smatch_match.lst"), "drivers/pci/probe.c:10\n").unwrap();
        dir
    }

    #[test]
    fn test_first_candidate_only() {
        let dir = workdir_with_candidates();
        let store = CoverageStore::open(dir.path(), &Config::default()).unwrap();
        assert_eq!(store.len(), 0);
        assert_eq!(store.decode_errors(), 1);
        assert!(store.files().is_empty());
    }

    #[test]
    fn test_combine_candidates() {
        let dir = workdir_with_candidates();
        let config = Config {
            combine_coverage: true,
            ..Config::default()
        };
        let store = CoverageStore::open(dir.path(), &config).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.decode_errors(), 1);
        assert!(store.contains(&Location::new("drivers/pci/probe.c", 10)));
        assert_eq!(store.files(), &[dir.path().join("traces/smatch_match.lst")][..]);
    }

    #[test]
    fn test_unreadable_file() {
        let dir = TempDir::new("warncov-coverage").unwrap();
        let missing = dir.path().join("linecov.lst");
        match *CoverageStore::new().add_file(&missing).unwrap_err().kind() {
            ErrorKind::CoverageNotFound(ref path) => assert_eq!(path, &missing),
            ref kind => panic!("unexpected error {:?}", kind),
        }
    }

    #[test]
    fn test_parse_is_normalized() {
        let store = CoverageStore::parse("./drivers/virtio/../pci/probe.c:10");
        assert!(store.contains(&Location::new("drivers/pci/probe.c", 10)));
    }
}
