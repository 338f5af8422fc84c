//! Splits warnings into covered and not covered sets.
//!
//! A warning is covered if its exact location appears in the coverage. There is no fuzzy matching of lines: two
//! warnings on the same line are both covered, and are told apart by their function and category only.

use coverage::CoverageStore;
use utils::percentage;
use warning::{Categories, Category, Filter, WarningEntry, WarningStore};

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Returns the warnings located at some covered line.
pub fn match_coverage(warnings: &WarningStore, coverage: &CoverageStore) -> BTreeSet<WarningEntry> {
    let mut by_location = HashMap::new();
    for entry in warnings {
        by_location.entry(&entry.location).or_insert_with(Vec::new).push(entry);
    }

    let mut covered = BTreeSet::new();
    for location in coverage {
        if let Some(entries) = by_location.get(location) {
            trace!("hit {}", location);
            covered.extend(entries.iter().map(|&e| e.clone()));
        }
    }
    covered
}

/// The coverage state of a function.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FunctionCoverage {
    /// Every warning of the function is covered.
    Covered,
    /// No warning of the function is covered.
    NotCovered,
    /// Some, but not all, warnings of the function are covered.
    PartiallyCovered,
}

impl FunctionCoverage {
    /// The symbol of the state in listings: `+`, `-` or `/`.
    pub fn symbol(self) -> char {
        match self {
            FunctionCoverage::Covered => '+',
            FunctionCoverage::NotCovered => '-',
            FunctionCoverage::PartiallyCovered => '/',
        }
    }
}

/// Coverage statistics of a single category.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct CategoryStats {
    pub category: Category,
    pub covered_entries: usize,
    pub total_entries: usize,
    /// Functions with at least one covered warning of this category.
    pub covered_functions: usize,
    pub total_functions: usize,
    /// Functions with both covered and not covered warnings of this category.
    pub partially_covered_functions: usize,
}

impl CategoryStats {
    pub fn entry_percentage(&self) -> f64 {
        percentage(self.covered_entries, self.total_entries)
    }

    pub fn function_percentage(&self) -> f64 {
        percentage(self.covered_functions, self.total_functions)
    }
}

/// Coverage counted over a set of categories.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Serialize)]
pub struct Headline {
    pub covered: usize,
    pub total: usize,
}

impl Headline {
    pub fn percentage(&self) -> f64 {
        percentage(self.covered, self.total)
    }
}

/// A function with the warnings selected for listing.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct FunctionListing {
    pub function: String,
    pub coverage: FunctionCoverage,
    pub covered: Vec<WarningEntry>,
    pub not_covered: Vec<WarningEntry>,
}

/// Names of functions with not covered warnings.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize)]
pub struct UncoveredFunctions {
    /// No warning of these functions is covered.
    pub not_covered: BTreeSet<String>,
    /// Some other warning of these functions is covered.
    pub partially_covered: BTreeSet<String>,
}

impl UncoveredFunctions {
    pub fn contains(&self, function: &str) -> bool {
        self.not_covered.contains(function) || self.partially_covered.contains(function)
    }
}

/// The result of correlating a warning report with coverage.
///
/// `covered` and `not_covered` are disjoint and their union is the full set of warnings.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Correlation {
    covered: BTreeSet<WarningEntry>,
    not_covered: BTreeSet<WarningEntry>,
    covered_functions: BTreeSet<String>,
    not_covered_functions: BTreeSet<String>,
    partially_covered_functions: BTreeSet<String>,
}

impl Correlation {
    /// Correlates a report with the coverage of a run.
    pub fn new(warnings: &WarningStore, coverage: &CoverageStore) -> Correlation {
        Correlation::from_covered(warnings, match_coverage(warnings, coverage))
    }

    /// Builds the correlation from the set of entries known to be covered.
    ///
    /// Covered entries which are not part of `warnings`, e.g. loaded from the coverage database of an older report,
    /// are ignored.
    pub fn from_covered<I>(warnings: &WarningStore, covered: I) -> Correlation
    where
        I: IntoIterator<Item = WarningEntry>,
    {
        let covered = covered.into_iter().filter(|e| warnings.contains(e)).collect::<BTreeSet<_>>();
        let not_covered = warnings.as_set().difference(&covered).cloned().collect::<BTreeSet<_>>();

        let covered_functions = covered.iter().map(|e| e.function.clone()).collect::<BTreeSet<_>>();
        let (partially_covered_functions, not_covered_functions) = not_covered
            .iter()
            .map(|e| e.function.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .partition(|f| covered_functions.contains(f));

        info!("{} warnings covered, {} not covered", covered.len(), not_covered.len());
        Correlation {
            covered,
            not_covered,
            covered_functions,
            not_covered_functions,
            partially_covered_functions,
        }
    }

    pub fn covered(&self) -> &BTreeSet<WarningEntry> {
        &self.covered
    }

    pub fn not_covered(&self) -> &BTreeSet<WarningEntry> {
        &self.not_covered
    }

    pub fn is_covered(&self, entry: &WarningEntry) -> bool {
        self.covered.contains(entry)
    }

    /// Functions with at least one covered warning.
    pub fn covered_functions(&self) -> &BTreeSet<String> {
        &self.covered_functions
    }

    /// Functions without any covered warning.
    pub fn not_covered_functions(&self) -> &BTreeSet<String> {
        &self.not_covered_functions
    }

    /// Functions with both covered and not covered warnings.
    pub fn partially_covered_functions(&self) -> &BTreeSet<String> {
        &self.partially_covered_functions
    }

    /// The coverage state of a function, or `None` if it has no warnings.
    pub fn function_coverage(&self, function: &str) -> Option<FunctionCoverage> {
        if self.partially_covered_functions.contains(function) {
            Some(FunctionCoverage::PartiallyCovered)
        } else if self.covered_functions.contains(function) {
            Some(FunctionCoverage::Covered)
        } else if self.not_covered_functions.contains(function) {
            Some(FunctionCoverage::NotCovered)
        } else {
            None
        }
    }

    /// Statistics of one category. A category without entries has zero percent coverage.
    pub fn category_stats(&self, category: Category) -> CategoryStats {
        let covered = self.covered.iter().filter(|e| e.category == category).collect::<Vec<_>>();
        let not_covered = self.not_covered.iter().filter(|e| e.category == category).collect::<Vec<_>>();

        let covered_functions = covered.iter().map(|e| &*e.function).collect::<BTreeSet<_>>();
        let not_covered_functions = not_covered.iter().map(|e| &*e.function).collect::<BTreeSet<_>>();
        let only_not_covered = not_covered_functions.difference(&covered_functions).count();
        let partially_covered = not_covered_functions.intersection(&covered_functions).count();

        CategoryStats {
            category,
            covered_entries: covered.len(),
            total_entries: covered.len() + not_covered.len(),
            covered_functions: covered_functions.len(),
            total_functions: covered_functions.len() + only_not_covered,
            partially_covered_functions: partially_covered,
        }
    }

    /// Statistics of every category, in reporting order.
    pub fn all_category_stats(&self) -> Vec<CategoryStats> {
        Category::ALL.iter().map(|&c| self.category_stats(c)).collect()
    }

    /// Entry coverage over the given categories.
    pub fn headline_for(&self, categories: Categories) -> Headline {
        let covered = self.covered.iter().filter(|e| categories.has(e.category)).count();
        let not_covered = self.not_covered.iter().filter(|e| categories.has(e.category)).count();
        Headline {
            covered,
            total: covered + not_covered,
        }
    }

    /// Entry coverage over all categories except `excluded`, `wrapper` and `unclassified`.
    pub fn headline(&self) -> Headline {
        self.headline_for(Categories::HEADLINE)
    }

    /// Lists the warnings per function, sorted by function name.
    ///
    /// Only functions and categories accepted by the filter are listed, and functions left without any entry after
    /// filtering are skipped. With `only_not_covered`, covered entries are omitted.
    pub fn function_listing(&self, filter: &Filter, only_not_covered: bool) -> Vec<FunctionListing> {
        let mut functions = BTreeMap::new();
        let entries = self.covered
            .iter()
            .map(|e| (e, true))
            .chain(self.not_covered.iter().map(|e| (e, false)));
        for (entry, covered) in entries {
            if !filter.matches(entry) || (covered && only_not_covered) {
                continue;
            }
            let lists = functions.entry(&*entry.function).or_insert_with(|| (Vec::new(), Vec::new()));
            if covered {
                lists.0.push(entry.clone());
            } else {
                lists.1.push(entry.clone());
            }
        }

        functions
            .into_iter()
            .filter_map(|(function, (covered, not_covered))| {
                let coverage = self.function_coverage(function)?;
                Some(FunctionListing {
                    function: function.to_owned(),
                    coverage,
                    covered,
                    not_covered,
                })
            })
            .collect()
    }

    /// Not covered functions of a category.
    ///
    /// Functions already listed in `exclude` are skipped, so that e.g. `safe` functions can be listed without
    /// repeating the `concern` ones.
    pub fn uncovered_functions(&self, category: Category, exclude: &UncoveredFunctions) -> UncoveredFunctions {
        let mut result = UncoveredFunctions::default();
        for entry in self.not_covered.iter().filter(|e| e.category == category) {
            if exclude.contains(&entry.function) {
                continue;
            }
            if self.not_covered_functions.contains(&entry.function) {
                result.not_covered.insert(entry.function.clone());
            } else {
                result.partially_covered.insert(entry.function.clone());
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warning::Location;

    fn entry(category: Category, path: &str, line: u32, function: &str) -> WarningEntry {
        WarningEntry::new(category, Location::new(path, line), function)
    }

    fn sample() -> (WarningStore, CoverageStore) {
        let warnings = WarningStore::parse(
            "concern\tdrivers/virtio/virtio.c:42 virtio_probe(){IDW1}\n\
             safe\tdrivers/pci/probe.c:10 pci_probe(){IDW2}\n",
        );
        let coverage = CoverageStore::parse("drivers/virtio/virtio.c:42\n");
        (warnings, coverage)
    }

    #[test]
    fn test_correlate_scenario() {
        let (warnings, coverage) = sample();
        let correlation = Correlation::new(&warnings, &coverage);

        let virtio = entry(Category::Concern, "drivers/virtio/virtio.c", 42, "virtio_probe");
        let pci = entry(Category::Safe, "drivers/pci/probe.c", 10, "pci_probe");
        assert_eq!(correlation.covered().iter().collect::<Vec<_>>(), vec![&virtio]);
        assert_eq!(correlation.not_covered().iter().collect::<Vec<_>>(), vec![&pci]);
        assert_eq!(correlation.category_stats(Category::Concern).entry_percentage(), 100.0);
        assert_eq!(correlation.category_stats(Category::Safe).entry_percentage(), 0.0);
        assert_eq!(correlation.headline(), Headline { covered: 1, total: 2 });
    }

    #[test]
    fn test_partition_is_complete() {
        let (warnings, coverage) = sample();
        let correlation = Correlation::new(&warnings, &coverage);
        let union = correlation.covered().union(correlation.not_covered()).cloned().collect::<BTreeSet<_>>();
        assert_eq!(&union, warnings.as_set());
        assert_eq!(correlation.covered().intersection(correlation.not_covered()).count(), 0);
    }

    #[test]
    fn test_empty_category_is_zero_percent() {
        let (warnings, coverage) = sample();
        let stats = Correlation::new(&warnings, &coverage).category_stats(Category::Trusted);
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.entry_percentage(), 0.0);
        assert_eq!(stats.function_percentage(), 0.0);

        let empty = Correlation::new(&WarningStore::new(), &coverage);
        assert_eq!(empty.headline().percentage(), 0.0);
    }

    #[test]
    fn test_same_line_entries_are_all_covered() {
        let warnings: WarningStore = vec![
            entry(Category::Concern, "mm/slab.c", 5, "kmalloc"),
            entry(Category::Unclassified, "mm/slab.c", 5, "kmalloc"),
            entry(Category::Concern, "mm/slab.c", 6, "kmalloc"),
        ].into_iter()
            .collect();
        let coverage = CoverageStore::parse("mm/slab.c:5");
        let correlation = Correlation::new(&warnings, &coverage);
        assert_eq!(correlation.covered().len(), 2);
        assert_eq!(correlation.function_coverage("kmalloc"), Some(FunctionCoverage::PartiallyCovered));

        let stats = correlation.category_stats(Category::Concern);
        assert_eq!((stats.covered_functions, stats.total_functions, stats.partially_covered_functions), (1, 1, 1));
        // unclassified entries do not count toward the headline.
        assert_eq!(correlation.headline(), Headline { covered: 1, total: 2 });
    }

    #[test]
    fn test_from_covered_ignores_foreign_entries() {
        let (warnings, _) = sample();
        let foreign = entry(Category::Concern, "kernel/fork.c", 1, "copy_process");
        let virtio = entry(Category::Concern, "drivers/virtio/virtio.c", 42, "virtio_probe");
        let correlation = Correlation::from_covered(&warnings, vec![foreign, virtio]);
        assert_eq!(correlation.covered().len(), 1);
        assert_eq!(correlation.not_covered().len(), 1);
    }

    #[test]
    fn test_function_listing() {
        let warnings: WarningStore = vec![
            entry(Category::Concern, "a.c", 1, "alpha"),
            entry(Category::Safe, "a.c", 2, "alpha"),
            entry(Category::Concern, "b.c", 1, "beta"),
            entry(Category::Safe, "c.c", 1, "gamma"),
        ].into_iter()
            .collect();
        let coverage = CoverageStore::parse("a.c:1 c.c:1");
        let correlation = Correlation::new(&warnings, &coverage);

        let all = correlation.function_listing(&Filter::default(), false);
        let symbols = all.iter().map(|f| (&*f.function, f.coverage.symbol())).collect::<Vec<_>>();
        assert_eq!(symbols, vec![("alpha", '/'), ("beta", '-'), ("gamma", '+')]);

        let not_covered = correlation.function_listing(&Filter::default(), true);
        assert_eq!(not_covered.iter().map(|f| &*f.function).collect::<Vec<_>>(), vec!["alpha", "beta"]);
        assert!(not_covered[0].covered.is_empty());

        let concern = correlation.function_listing(&Filter::new("concern", "").unwrap(), false);
        assert_eq!(concern.iter().map(|f| &*f.function).collect::<Vec<_>>(), vec!["alpha", "beta"]);
        assert_eq!(concern[0].not_covered.len(), 0);
    }

    #[test]
    fn test_uncovered_functions() {
        let warnings: WarningStore = vec![
            entry(Category::Concern, "a.c", 1, "alpha"),
            entry(Category::Concern, "a.c", 2, "alpha"),
            entry(Category::Concern, "b.c", 1, "beta"),
            entry(Category::Safe, "b.c", 2, "beta"),
            entry(Category::Safe, "c.c", 1, "gamma"),
        ].into_iter()
            .collect();
        let coverage = CoverageStore::parse("a.c:1");
        let correlation = Correlation::new(&warnings, &coverage);

        let concern = correlation.uncovered_functions(Category::Concern, &UncoveredFunctions::default());
        assert_eq!(concern.not_covered.iter().collect::<Vec<_>>(), vec!["beta"]);
        assert_eq!(concern.partially_covered.iter().collect::<Vec<_>>(), vec!["alpha"]);

        let safe = correlation.uncovered_functions(Category::Safe, &concern);
        assert_eq!(safe.not_covered.iter().collect::<Vec<_>>(), vec!["gamma"]);
        assert!(safe.partially_covered.is_empty());
    }
}
