//! Warning entries of a static-analysis report.
//!
//! A report is free text. Every line that looks like
//!
//! ```text
//! concern	drivers/virtio/virtio.c:42 virtio_probe() warn: ... {IDW1}
//! drivers/pci/probe.c:10 pci_probe() warn: ... {IDW2}
//! ```
//!
//! contributes a [`WarningEntry`]. The first form carries an explicit [`Category`] before the tab; the second form,
//! at the start of a line, is [`Category::Unclassified`]. Everything else in the report is ignored.
//!
//! [`WarningEntry`]: ./struct.WarningEntry.html
//! [`Category`]: ./enum.Category.html
//! [`Category::Unclassified`]: ./enum.Category.html#variant.Unclassified

use error::*;
use utils::normalize_path;

use regex::Regex;

use std::collections::BTreeSet;
use std::collections::btree_set;
use std::fmt;
use std::fs;
use std::iter::FromIterator;
use std::path::Path;
use std::str::FromStr;

lazy_static! {
    static ref CLASSIFIED_RE: Regex = Regex::new(r"(\S+)\t(\S+):([0-9]+) (\S+)\(\)").expect("classified entry regex");
    static ref UNCLASSIFIED_RE: Regex = Regex::new(r"^(\S+):([0-9]+) (\S+)\(\)").expect("unclassified entry regex");
}

/// The function name the analyzer prints when it cannot attribute a warning to a function.
const NULL_FUNCTION: &str = "(null)";

//----------------------------------------------------------------------------------------------------------------------
//{{{ Category

/// The bucket a warning has been classified into.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Potentially exploitable, needs attention.
    Concern,
    /// Reviewed and found harmless.
    Safe,
    /// Deliberately left out of the analysis.
    Excluded,
    /// The warning points into a thin wrapper around the real consumer.
    Wrapper,
    /// No classification token was present.
    Unclassified,
    /// The input comes from a trusted source.
    Trusted,
}

impl Category {
    /// All categories, in the order they are reported.
    pub const ALL: [Category; 6] = [
        Category::Safe,
        Category::Concern,
        Category::Wrapper,
        Category::Excluded,
        Category::Trusted,
        Category::Unclassified,
    ];

    /// The token of this category as written in the report.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Concern => "concern",
            Category::Safe => "safe",
            Category::Excluded => "excluded",
            Category::Wrapper => "wrapper",
            Category::Unclassified => "unclassified",
            Category::Trusted => "trusted",
        }
    }

    /// The singleton set containing this category.
    pub fn flag(self) -> Categories {
        match self {
            Category::Concern => Categories::CONCERN,
            Category::Safe => Categories::SAFE,
            Category::Excluded => Categories::EXCLUDED,
            Category::Wrapper => Categories::WRAPPER,
            Category::Unclassified => Categories::UNCLASSIFIED,
            Category::Trusted => Categories::TRUSTED,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;
    fn from_str(s: &str) -> Result<Category> {
        Ok(match s {
            "concern" => Category::Concern,
            "safe" => Category::Safe,
            "excluded" => Category::Excluded,
            "wrapper" => Category::Wrapper,
            "unclassified" => Category::Unclassified,
            "trusted" => Category::Trusted,
            _ => bail!(ErrorKind::MalformedRecord(s.to_owned())),
        })
    }
}

bitflags! {
    /// A set of categories.
    pub struct Categories: u8 {
        const CONCERN = 1;
        const SAFE = 2;
        const EXCLUDED = 4;
        const WRAPPER = 8;
        const UNCLASSIFIED = 16;
        const TRUSTED = 32;

        /// Categories counted by the headline "total coverage" metric. Excluded, wrapper and unclassified entries are
        /// noise that would inflate or deflate the number.
        const HEADLINE = Self::CONCERN.bits | Self::SAFE.bits | Self::TRUSTED.bits;
    }
}

impl Categories {
    /// Whether the set contains the category.
    pub fn has(self, category: Category) -> bool {
        self.contains(category.flag())
    }
}

impl Default for Categories {
    fn default() -> Categories {
        Categories::HEADLINE
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ Location

/// A source location `path:line`.
///
/// The path is always normalized, see [`Location::new()`](#method.new).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct Location {
    /// Normalized source path.
    pub path: String,
    /// Line number, 1-based.
    pub line: u32,
}

impl Location {
    /// Creates a location, stripping leading `./` and normalizing the path.
    pub fn new(path: &str, line: u32) -> Location {
        Location {
            path: normalize_path(path),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}:{}", self.path, self.line)
    }
}

impl FromStr for Location {
    type Err = Error;
    fn from_str(s: &str) -> Result<Location> {
        let malformed = || Error::from(ErrorKind::MalformedRecord(s.to_owned()));
        let colon = s.rfind(':').ok_or_else(malformed)?;
        let line = s[(colon + 1)..].parse().map_err(|_| malformed())?;
        Ok(Location::new(&s[..colon], line))
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ WarningEntry

/// One static-analyzer finding.
///
/// Two entries are the same finding if and only if category, location and function are all equal.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct WarningEntry {
    pub category: Category,
    pub location: Location,
    pub function: String,
}

impl WarningEntry {
    pub fn new(category: Category, location: Location, function: &str) -> WarningEntry {
        WarningEntry {
            category,
            location,
            function: function.to_owned(),
        }
    }
}

impl fmt::Display for WarningEntry {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}\t{} {}()", self.category, self.location, self.function)
    }
}

/// Parses a single report line into warning entries.
///
/// A line can produce up to two entries when it matches both the classified and the unclassified form; set semantics
/// of the [`WarningStore`] collapse them if they happen to be equal.
///
/// # Errors
///
/// Returns [`MalformedRecord`] if the line contains no warning at all. This is the normal outcome for the incidental
/// text between warnings.
///
/// [`WarningStore`]: ./struct.WarningStore.html
/// [`MalformedRecord`]: ../error/enum.ErrorKind.html#variant.MalformedRecord
pub fn parse_line(line: &str) -> Result<Vec<WarningEntry>> {
    let mut entries = Vec::new();

    for caps in CLASSIFIED_RE.captures_iter(line) {
        let category = match caps[1].parse::<Category>() {
            Ok(category) => category,
            Err(_) => {
                trace!("unknown classification {:?}", &caps[1]);
                continue;
            },
        };
        if let Ok(lineno) = caps[3].parse() {
            entries.push(WarningEntry::new(category, Location::new(&caps[2], lineno), &caps[4]));
        }
    }

    if let Some(caps) = UNCLASSIFIED_RE.captures(line) {
        if &caps[3] != NULL_FUNCTION {
            if let Ok(lineno) = caps[2].parse() {
                entries.push(WarningEntry::new(Category::Unclassified, Location::new(&caps[1], lineno), &caps[3]));
            }
        }
    }

    ensure!(!entries.is_empty(), ErrorKind::MalformedRecord(line.to_owned()));
    Ok(entries)
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ Filter

/// Selects entries by classification and function name.
///
/// Both patterns are regular expressions matched at the start of the string. An absent pattern accepts everything.
#[derive(Clone, Debug, Default)]
pub struct Filter {
    category: Option<Regex>,
    function: Option<Regex>,
}

impl Filter {
    /// Creates a filter from two patterns. Empty patterns are treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`Regex`] if either pattern is invalid.
    ///
    /// [`Regex`]: ../error/enum.ErrorKind.html#variant.Regex
    pub fn new(category_pattern: &str, function_pattern: &str) -> Result<Filter> {
        fn compile(pattern: &str) -> Result<Option<Regex>> {
            if pattern.is_empty() {
                return Ok(None);
            }
            Ok(Some(Regex::new(&format!("^(?:{})", pattern))?))
        }

        Ok(Filter {
            category: compile(category_pattern)?,
            function: compile(function_pattern)?,
        })
    }

    /// Whether the function name passes the function pattern.
    pub fn matches_function(&self, function: &str) -> bool {
        self.function.as_ref().map_or(true, |re| re.is_match(function))
    }

    /// Whether the category passes the classification pattern.
    pub fn matches_category(&self, category: Category) -> bool {
        self.category.as_ref().map_or(true, |re| re.is_match(category.as_str()))
    }

    /// Whether the entry passes both patterns.
    pub fn matches(&self, entry: &WarningEntry) -> bool {
        self.matches_category(entry.category) && self.matches_function(&entry.function)
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ WarningStore

/// The set of warning entries parsed from one or more reports.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct WarningStore {
    entries: BTreeSet<WarningEntry>,
}

impl WarningStore {
    /// Creates an empty store.
    pub fn new() -> WarningStore {
        WarningStore::default()
    }

    /// Parses the text of a report.
    pub fn parse(text: &str) -> WarningStore {
        let mut store = WarningStore::new();
        let mut skipped = 0;
        for line in text.lines() {
            match parse_line(line) {
                Ok(entries) => store.entries.extend(entries),
                Err(_) => skipped += 1,
            }
        }
        debug!("parsed {} warning entries, {} other lines", store.len(), skipped);
        store
    }

    /// Reads and parses a report file.
    ///
    /// A report that exists but cannot be read as text yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`InputNotFound`] if the file does not exist.
    ///
    /// [`InputNotFound`]: ../error/enum.ErrorKind.html#variant.InputNotFound
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WarningStore> {
        let path = path.as_ref();
        debug!("open warning report {}", path.display());
        ensure!(path.is_file(), ErrorKind::InputNotFound(path.to_owned()));
        match fs::read_to_string(path) {
            Ok(text) => Ok(WarningStore::parse(&text)),
            Err(e) => {
                warn!("cannot read warning report {}: {}", path.display(), e);
                Ok(WarningStore::new())
            },
        }
    }

    /// Returns the entries accepted by the filter.
    pub fn filter(&self, filter: &Filter) -> WarningStore {
        self.iter().filter(|e| filter.matches(e)).cloned().collect()
    }

    /// Adds all entries of another store.
    pub fn merge(&mut self, other: WarningStore) {
        self.entries.extend(other.entries);
    }

    pub fn insert(&mut self, entry: WarningEntry) -> bool {
        self.entries.insert(entry)
    }

    pub fn contains(&self, entry: &WarningEntry) -> bool {
        self.entries.contains(entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the entries in (category, location, function) order.
    pub fn iter(&self) -> btree_set::Iter<WarningEntry> {
        self.entries.iter()
    }

    pub fn as_set(&self) -> &BTreeSet<WarningEntry> {
        &self.entries
    }
}

impl FromIterator<WarningEntry> for WarningStore {
    fn from_iter<I: IntoIterator<Item = WarningEntry>>(iter: I) -> WarningStore {
        WarningStore {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a WarningStore {
    type Item = &'a WarningEntry;
    type IntoIter = btree_set::Iter<'a, WarningEntry>;
    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

//}}}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(category: Category, path: &str, line: u32, function: &str) -> WarningEntry {
        WarningEntry::new(category, Location::new(path, line), function)
    }

    #[test]
    fn test_parse_classified_line() {
        let entries = parse_line("concern\t./drivers/virtio/virtio.c:42 virtio_probe() warn: check {IDW1}").unwrap();
        assert_eq!(entries, vec![entry(Category::Concern, "drivers/virtio/virtio.c", 42, "virtio_probe")]);
    }

    #[test]
    fn test_parse_unclassified_line() {
        let entries = parse_line("drivers/pci/probe.c:10 pci_probe() warn: {IDW2}").unwrap();
        assert_eq!(entries, vec![entry(Category::Unclassified, "drivers/pci/probe.c", 10, "pci_probe")]);
    }

    #[test]
    fn test_parse_null_function_is_skipped() {
        assert!(parse_line("drivers/pci/probe.c:10 (null)() warn: {IDW2}").unwrap_err().is_routine());
    }

    #[test]
    fn test_parse_noise_is_malformed() {
        match *parse_line("  CC      drivers/pci/probe.o").unwrap_err().kind() {
            ErrorKind::MalformedRecord(_) => {},
            ref kind => panic!("unexpected error {:?}", kind),
        }
    }

    #[test]
    fn test_parse_unknown_classification() {
        assert!(parse_line("reviewed\tdrivers/pci/probe.c:10 pci_probe() {IDW2}").is_err());
    }

    #[test]
    fn test_parse_is_idempotent_and_deduplicates() {
        let report = "\
concern\tdrivers/virtio/virtio.c:42 virtio_probe(){IDW1}
;
concern\t./drivers/virtio/virtio.c:42 virtio_probe(){IDW1}
safe\tdrivers/pci/probe.c:10 pci_probe(){IDW2}
drivers/pci/probe.c:10 pci_probe(){IDW2}
random noise
";
        let first = WarningStore::parse(report);
        let second = WarningStore::parse(report);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert!(first.contains(&entry(Category::Unclassified, "drivers/pci/probe.c", 10, "pci_probe")));
    }

    #[test]
    fn test_filter() {
        let store: WarningStore = vec![
            entry(Category::Concern, "a.c", 1, "start_kernel"),
            entry(Category::Safe, "a.c", 2, "start_kernel"),
            entry(Category::Concern, "b.c", 3, "kernel_init"),
        ].into_iter().collect();

        let filter = Filter::new("concern|trusted", "").unwrap();
        assert_eq!(store.filter(&filter).len(), 2);

        let filter = Filter::new("concern", "kernel_").unwrap();
        assert_eq!(store.filter(&filter).iter().next().map(|e| &*e.function), Some("kernel_init"));

        // matches at the start only.
        let filter = Filter::new("", "init").unwrap();
        assert!(store.filter(&filter).is_empty());

        assert!(Filter::new("(", "").is_err());
    }

    #[test]
    fn test_categories() {
        let headline = Categories::default();
        assert!(headline.has(Category::Concern));
        assert!(headline.has(Category::Trusted));
        assert!(!headline.has(Category::Wrapper));
        assert!(!headline.has(Category::Unclassified));
        assert_eq!("trusted".parse::<Category>().unwrap(), Category::Trusted);
    }

    #[test]
    fn test_location_from_str() {
        let location: Location = "./mm/slab.c:1234".parse().unwrap();
        assert_eq!(location, Location::new("mm/slab.c", 1234));
        assert_eq!(location.to_string(), "mm/slab.c:1234");
        assert!("mm/slab.c".parse::<Location>().is_err());
        assert!("mm/slab.c:abc".parse::<Location>().is_err());
    }
}
