//! Backward reachability over observed edges.
//!
//! A warning that was never covered may still sit on a path the fuzzer almost took. Starting from the observed edges
//! into the warning's code, the search follows the back edges of the [`TraceGraph`], i.e. the edges that preceded
//! them in some trace, until it meets an entry function, the location of another analyzed warning, or the start of a
//! trace. The search is bounded by a maximum depth, so a negative answer only means "not found within the bound",
//! never "unreachable".
//!
//! [`TraceGraph`]: ../trace/struct.TraceGraph.html

use config::Config;
use correlate::{Correlation, Headline};
use resolve::AddrInfo;
use trace::{Address, Edge, TraceGraph, EXIT, TRACE_START};
use warning::{Categories, Category, Location, WarningEntry};

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

/// What terminated a successful search.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    /// An edge endpoint belongs to one of the entry functions.
    EntryFunction(String),
    /// An edge endpoint is the location of another analyzed warning.
    Warning(Location),
    /// The search walked back to the start of a trace.
    TraceStart,
}

/// The reachability verdict of a warning.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    /// Found a chain of `depth` observed edges leading to the anchor.
    Reachable { anchor: Anchor, depth: usize },
    /// Nothing found within the depth bound.
    Uncertain,
}

impl Verdict {
    pub fn is_reachable(&self) -> bool {
        match *self {
            Verdict::Reachable { .. } => true,
            Verdict::Uncertain => false,
        }
    }

    /// The symbol of the verdict in listings: `-` for reachable but not covered, `?` for uncertain.
    pub fn symbol(&self) -> char {
        if self.is_reachable() {
            '-'
        } else {
            '?'
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Verdict::Reachable { anchor: Anchor::EntryFunction(ref f), depth } => write!(fmt, "- via {}() at depth {}", f, depth),
            Verdict::Reachable { anchor: Anchor::Warning(ref l), depth } => write!(fmt, "- via {} at depth {}", l, depth),
            Verdict::Reachable { anchor: Anchor::TraceStart, depth } => write!(fmt, "- from trace start at depth {}", depth),
            Verdict::Uncertain => fmt.write_str("?"),
        }
    }
}

/// Searches the back edges of a trace graph.
#[derive(Debug)]
pub struct Reachability<'a> {
    graph: &'a TraceGraph,
    addrs: &'a AddrInfo,
    entry_functions: BTreeSet<String>,
    /// Locations of analyzed warnings and the functions they belong to.
    anchors: HashMap<Location, BTreeSet<String>>,
    max_depth: usize,
}

impl<'a> Reachability<'a> {
    /// Creates an analyzer using the entry functions and depth bound of the configuration.
    pub fn new(graph: &'a TraceGraph, addrs: &'a AddrInfo, config: &Config) -> Reachability<'a> {
        Reachability {
            graph,
            addrs,
            entry_functions: config.entry_functions.iter().cloned().collect(),
            anchors: HashMap::new(),
            max_depth: config.max_depth,
        }
    }

    /// Uses the locations of the `concern` and `safe` warnings among `warnings` as additional anchors.
    pub fn with_anchors<'w, I>(mut self, warnings: I) -> Reachability<'a>
    where
        I: IntoIterator<Item = &'w WarningEntry>,
    {
        for entry in warnings {
            if let Category::Concern | Category::Safe = entry.category {
                self.anchors.entry(entry.location.clone()).or_insert_with(BTreeSet::new).insert(entry.function.clone());
            }
        }
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Checks whether an edge endpoint terminates the search for code of `target`.
    fn anchor_of(&self, addr: Address, target: &str) -> Option<Anchor> {
        if addr == EXIT {
            return None;
        }
        let frames = self.addrs.frames(addr);
        if let Some(frame) = frames.iter().find(|f| self.entry_functions.contains(&f.function)) {
            return Some(Anchor::EntryFunction(frame.function.clone()));
        }
        let location = &self.addrs.resolve(addr)?.location;
        match self.anchors.get(location) {
            Some(functions) if functions.iter().any(|f| f != target) => Some(Anchor::Warning(location.clone())),
            _ => None,
        }
    }

    /// Walks back from a set of start edges, all at depth 1, and returns the nearest anchor.
    ///
    /// Every edge is expanded at most once, so the walk terminates on cyclic graphs.
    fn search(&self, start: Vec<Edge>, target: &str) -> Verdict {
        let mut visited = HashSet::new();
        let mut frontier = start.into_iter().map(|e| (e, 1)).collect::<VecDeque<_>>();

        while let Some((edge, depth)) = frontier.pop_front() {
            if depth > self.max_depth {
                trace!("abort search for {} at depth {}", target, depth);
                break;
            }
            if edge == TRACE_START {
                return Verdict::Reachable {
                    anchor: Anchor::TraceStart,
                    depth,
                };
            }
            if !visited.insert(edge) {
                continue;
            }
            for &addr in &[edge.src, edge.dst] {
                if let Some(anchor) = self.anchor_of(addr, target) {
                    return Verdict::Reachable { anchor, depth };
                }
            }
            frontier.extend(self.graph.prior_edges(edge).into_iter().map(|e| (e, depth + 1)));
        }

        Verdict::Uncertain
    }

    /// The observed edges into any of the addresses.
    fn edges_into(&self, addrs: &[Address]) -> Vec<Edge> {
        addrs
            .iter()
            .flat_map(|&addr| self.graph.callers(addr).into_iter().map(move |src| Edge::new(src, addr)))
            .collect()
    }

    /// Starts a search from every observed edge that enters the function.
    pub fn search_function(&self, function: &str) -> Verdict {
        let start = self.edges_into(&self.addrs.addresses_of_function(function));
        debug!("search {}() from {} edges", function, start.len());
        self.search(start, function)
    }

    /// Starts a search from the observed edges into the warning's line, or into its function if the line was not
    /// compiled into any traced address.
    pub fn search_entry(&self, entry: &WarningEntry) -> Verdict {
        let line_addrs = self.addrs.addresses_of_location(&entry.location);
        if line_addrs.is_empty() {
            return self.search_function(&entry.function);
        }
        self.search(self.edges_into(line_addrs), &entry.function)
    }

    /// Returns the verdict of every entry.
    pub fn verdicts<'w, I>(&self, entries: I) -> BTreeMap<WarningEntry, Verdict>
    where
        I: IntoIterator<Item = &'w WarningEntry>,
    {
        let verdicts = entries
            .into_iter()
            .map(|e| (e.clone(), self.search_entry(e)))
            .collect::<BTreeMap<_, _>>();
        info!(
            "{} of {} warnings reachable within depth {}",
            verdicts.values().filter(|v| v.is_reachable()).count(),
            verdicts.len(),
            self.max_depth
        );
        verdicts
    }

    /// Returns the verdict of every not covered `concern` warning.
    pub fn classify(&self, correlation: &Correlation) -> BTreeMap<WarningEntry, Verdict> {
        self.verdicts(correlation.not_covered().iter().filter(|e| e.category == Category::Concern))
    }

    /// Collects the addresses calling into the function, following callers of callers up to `levels` deep.
    ///
    /// An address is visited only once. The sentinel is never reported as a caller.
    pub fn callers_of(&self, function: &str, levels: usize) -> BTreeSet<Address> {
        let mut seen = BTreeSet::new();
        let mut frontier = VecDeque::new();
        frontier.push_back((function.to_owned(), 0));

        while let Some((function, level)) = frontier.pop_front() {
            let mut new_callers = Vec::new();
            for addr in self.addrs.addresses_of_function(&function) {
                for caller in self.graph.callers(addr) {
                    if caller != EXIT && seen.insert(caller) {
                        new_callers.push(caller);
                    }
                }
            }
            if level < levels {
                let functions = new_callers
                    .iter()
                    .filter_map(|&addr| self.addrs.function_of(addr))
                    .collect::<BTreeSet<_>>();
                frontier.extend(functions.into_iter().map(|f| (f.to_owned(), level + 1)));
            }
        }

        seen
    }
}

/// Entry coverage over the headline categories, ignoring the not covered entries whose verdict is uncertain.
pub fn adjusted_headline(correlation: &Correlation, verdicts: &BTreeMap<WarningEntry, Verdict>) -> Headline {
    let headline = correlation.headline_for(Categories::HEADLINE);
    let uncertain = correlation
        .not_covered()
        .iter()
        .filter(|e| Categories::HEADLINE.has(e.category))
        .filter(|e| verdicts.get(*e).map_or(false, |v| !v.is_reachable()))
        .count();
    Headline {
        covered: headline.covered,
        total: headline.total - uncertain,
    }
}
