//! Persisted set of covered warnings.
//!
//! Campaigns run incrementally: every invocation adds the warnings it saw covered to a database file shared by all
//! invocations. Saving re-reads the file and merges it first, so entries added by another process since this one
//! loaded the database survive. There is no locking, two processes saving at the same time can still lose each
//! other's entries.

use error::*;
use warning::WarningEntry;

use bincode;

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Covered warnings accumulated across runs.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct CoverageDatabase {
    entries: BTreeSet<WarningEntry>,
}

impl CoverageDatabase {
    pub fn new() -> CoverageDatabase {
        CoverageDatabase::default()
    }

    /// Loads a database file.
    ///
    /// # Errors
    ///
    /// Returns [`InputNotFound`] if the file does not exist, and [`Decode`] if it is not a database.
    ///
    /// [`InputNotFound`]: ../error/enum.ErrorKind.html#variant.InputNotFound
    /// [`Decode`]: ../error/enum.ErrorKind.html#variant.Decode
    pub fn load(path: &Path) -> Result<CoverageDatabase> {
        ensure!(path.is_file(), ErrorKind::InputNotFound(path.to_owned()));
        let bytes = fs::read(path)?;
        let db: CoverageDatabase = bincode::deserialize(&bytes).chain_err(|| ErrorKind::Decode(path.to_owned()))?;
        info!("loaded {} entries from {}", db.len(), path.display());
        Ok(db)
    }

    /// Merges the file at `path`, if it exists, into the database and writes the result back.
    ///
    /// The file is replaced atomically through a temporary file next to it.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if path.is_file() {
            let on_disk = CoverageDatabase::load(path)?;
            let before = self.len();
            self.merge(on_disk);
            debug!("merged {} entries written by others", self.len() - before);
        }

        let bytes = bincode::serialize(self)?;
        let mut tmp_name = path.file_name().map(|n| n.to_owned()).unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);
        fs::write(&tmp_path, &bytes).at_path(&tmp_path)?;
        fs::rename(&tmp_path, path)?;
        info!("saved {} entries to {}", self.len(), path.display());
        Ok(())
    }

    /// Unions another database into this one.
    pub fn merge(&mut self, other: CoverageDatabase) {
        self.entries.extend(other.entries);
    }

    /// Records covered entries. Returns the number of entries not seen before.
    pub fn extend<I: IntoIterator<Item = WarningEntry>>(&mut self, entries: I) -> usize {
        let before = self.entries.len();
        self.entries.extend(entries);
        self.entries.len() - before
    }

    pub fn contains(&self, entry: &WarningEntry) -> bool {
        self.entries.contains(entry)
    }

    pub fn entries(&self) -> &BTreeSet<WarningEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warning::{Category, Location};

    use tempdir::TempDir;

    fn entry(line: u32) -> WarningEntry {
        WarningEntry::new(Category::Concern, Location::new("mm/slab.c", line), "kmalloc")
    }

    #[test]
    fn test_save_merges_with_file() {
        let dir = TempDir::new("warncov-db").unwrap();
        let path = dir.path().join("coverage.db");

        let mut first = CoverageDatabase::new();
        assert_eq!(first.extend(vec![entry(1), entry(2)]), 2);
        first.save(&path).unwrap();

        // a second process which never loaded the database.
        let mut second = CoverageDatabase::new();
        assert_eq!(second.extend(vec![entry(2), entry(3)]), 2);
        second.save(&path).unwrap();
        assert_eq!(second.len(), 3);

        let loaded = CoverageDatabase::load(&path).unwrap();
        assert_eq!(loaded, second);
        assert!(loaded.contains(&entry(1)));
        assert!(!dir.path().join("coverage.db.tmp").exists());
    }

    #[test]
    fn test_load_missing() {
        let dir = TempDir::new("warncov-db").unwrap();
        match *CoverageDatabase::load(&dir.path().join("missing.db")).unwrap_err().kind() {
            ErrorKind::InputNotFound(_) => {},
            ref kind => panic!("unexpected error {:?}", kind),
        }
    }

    #[test]
    fn test_load_garbage() {
        let dir = TempDir::new("warncov-db").unwrap();
        let path = dir.path().join("garbage.db");
        fs::write(&path, b"\xff\xff\xff\xff\xff\xff\xff\xff\xff").unwrap();
        match *CoverageDatabase::load(&path).unwrap_err().kind() {
            ErrorKind::Decode(ref p) => assert_eq!(p, &path),
            ref kind => panic!("unexpected error {:?}", kind),
        }
    }
}
