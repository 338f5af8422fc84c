//! Control-flow edges observed while tracing fuzz inputs.
//!
//! A trace file is a list of `src,dst[,count]` lines in hexadecimal, optionally compressed as an LZ4 frame. Every
//! trace file is parsed into a [`TraceFragment`] independently, and the fragments are then merged into one
//! [`TraceGraph`].
//!
//! # Splicing
//!
//! Tracing pauses whenever execution leaves the traced region. The tracer writes this as an edge into the [`EXIT`]
//! sentinel, and the edge that resumes the trace comes out of the sentinel:
//!
//! ```text
//! ffffffff81000010,ffffffffffffffff
//! ffffffffffffffff,ffffffff82000000
//! ```
//!
//! In splice mode the pair is replaced by a single edge from a synthetic address, derived from the address before
//! the pause (see [`fold_splice_address()`]), to the address after it. Pauses at different call sites therefore do
//! not collapse into one node.
//!
//! [`TraceFragment`]: ./struct.TraceFragment.html
//! [`TraceGraph`]: ./struct.TraceGraph.html
//! [`EXIT`]: ./constant.EXIT.html
//! [`fold_splice_address()`]: ./fn.fold_splice_address.html

use error::*;
use utils::IntoStringLossy;

use glob::{glob, Pattern};
use lz4_flex::frame::FrameDecoder;
use petgraph::Direction;
use petgraph::graphmap::DiGraphMap;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// A code address.
pub type Address = u64;

/// The sentinel address marking where tracing paused or resumed.
pub const EXIT: Address = !0;

/// Addresses below this value do not belong to the kernel image.
pub const KERNEL_THRESHOLD: Address = 0xffff_ffff_0000_0000;

/// File name patterns of trace files inside a trace directory.
pub const TRACE_FILE_PATTERNS: &[&str] = &["fuzz*.lst.lz4", "payload_*.lz4"];

/// A directed control-flow transfer between two addresses.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct Edge {
    pub src: Address,
    pub dst: Address,
}

/// The edge preceding the first edge of every trace stream.
pub const TRACE_START: Edge = Edge { src: EXIT, dst: EXIT };

impl Edge {
    pub fn new(src: Address, dst: Address) -> Edge {
        Edge { src, dst }
    }

    /// Whether neither endpoint is the [`EXIT`](./constant.EXIT.html) sentinel.
    pub fn is_real(&self) -> bool {
        self.src != EXIT && self.dst != EXIT
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{:016x},{:016x}", self.src, self.dst)
    }
}

/// Derives the synthetic source address of a spliced edge from the address where tracing paused.
///
/// The result keeps 32 bits of the paused address in its upper half, and has all low bits set, which places it below
/// [`KERNEL_THRESHOLD`](./constant.KERNEL_THRESHOLD.html). Trace databases produced by other tools rely on this
/// exact value.
pub fn fold_splice_address(src: Address) -> Address {
    ((src % 0xffff_ffff) << 32) | 0xffff_ffff
}

/// Parses one `src,dst[,count]` trace line. The count defaults to 1.
pub fn parse_record(line: &str) -> Result<(Edge, u64)> {
    let malformed = || Error::from(ErrorKind::MalformedRecord(line.to_owned()));
    let parse_hex = |s: &str| Address::from_str_radix(s.trim(), 16).map_err(|_| malformed());

    let mut fields = line.split(',');
    let (src, dst) = match (fields.next(), fields.next()) {
        (Some(src), Some(dst)) => (parse_hex(src)?, parse_hex(dst)?),
        _ => return Err(malformed()),
    };
    let count = match fields.next() {
        Some(count) => parse_hex(count)?,
        None => 1,
    };
    ensure!(fields.next().is_none(), ErrorKind::MalformedRecord(line.to_owned()));
    Ok((Edge::new(src, dst), count))
}

//----------------------------------------------------------------------------------------------------------------------
//{{{ TraceFragment

/// The edges of a single trace file.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct TraceFragment {
    /// Summed hit count of every edge.
    pub edges: BTreeMap<Edge, u64>,
    /// For every edge, the edges which immediately preceded it in the stream.
    pub back_edges: BTreeMap<Edge, BTreeSet<Edge>>,
    /// Number of lines skipped because they could not be parsed.
    pub malformed: usize,
}

impl TraceFragment {
    /// Parses the text of a trace file.
    pub fn parse(text: &str, splice: bool) -> TraceFragment {
        let mut fragment = TraceFragment::default();
        let mut last_edge = TRACE_START;
        let mut paused_at = None;

        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let (mut edge, count) = match parse_record(line) {
                Ok(record) => record,
                Err(e) => {
                    warn!("line {}: {}", lineno + 1, e);
                    fragment.malformed += 1;
                    continue;
                },
            };

            if splice {
                if edge.dst == EXIT {
                    if paused_at.is_some() {
                        warn!("line {}: trace paused twice without resuming", lineno + 1);
                    }
                    paused_at = Some(fold_splice_address(edge.src));
                    continue;
                }
                if let Some(folded) = paused_at.take() {
                    if edge.src != EXIT {
                        warn!("line {}: trace resumed from {:016x} instead of the exit sentinel", lineno + 1, edge.src);
                    }
                    edge.src = folded;
                }
            }

            trace!("edge {} x{}", edge, count);
            let total = fragment.edges.entry(edge).or_insert(0);
            *total = total.saturating_add(count);
            fragment.back_edges.entry(edge).or_insert_with(BTreeSet::new).insert(last_edge);
            last_edge = edge;
        }

        fragment
    }

    /// Reads and parses a trace file. Files ending in `.lz4` are decompressed first.
    pub fn open(path: &Path, splice: bool) -> Result<TraceFragment> {
        debug!("open trace file {}", path.display());
        let text = read_trace_file(path)?;
        Ok(TraceFragment::parse(&text, splice))
    }
}

/// Reads a trace file as text, replacing undecodable bytes.
pub fn read_trace_file(path: &Path) -> Result<String> {
    if !path.is_file() {
        bail!(ErrorKind::InputNotFound(path.to_owned()));
    }
    let file = File::open(path)?;
    let mut bytes = Vec::new();
    if path.extension().map_or(false, |ext| ext == "lz4") {
        FrameDecoder::new(file).read_to_end(&mut bytes)?;
    } else {
        io::BufReader::new(file).read_to_end(&mut bytes)?;
    }
    Ok(bytes.into_string_lossy())
}

/// Lists the trace files inside a trace directory.
pub fn discover(trace_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let dir = Pattern::escape(&trace_dir.to_string_lossy());
    for pattern in TRACE_FILE_PATTERNS {
        let pattern = Path::new(&dir).join(pattern);
        for entry in glob(&pattern.to_string_lossy())? {
            match entry {
                Ok(path) => files.push(path),
                Err(e) => warn!("cannot access {}: {}", e.path().display(), e.error()),
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ TraceGraph

/// What a merged fragment added to the graph.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Serialize)]
pub struct MergeStats {
    /// Basic blocks (addresses) not seen in any previous fragment.
    pub new_blocks: usize,
    /// Real edges not seen in any previous fragment.
    pub new_edges: usize,
}

/// The union of all observed edges.
///
/// Merging is commutative: the graph does not depend on the order the fragments are merged in. Edges into or out of
/// the sentinel are kept for caller lookup and back-edge walks, but are never reported as observed edges.
#[derive(Clone, Debug, Default)]
pub struct TraceGraph {
    /// Address graph, weighted by hit count.
    graph: DiGraphMap<Address, u64>,
    /// Edge `a -> b` means edge `a` immediately preceded edge `b` in some trace.
    back_edges: DiGraphMap<Edge, ()>,
    traces: usize,
}

impl TraceGraph {
    pub fn new() -> TraceGraph {
        TraceGraph::default()
    }

    /// Merges the edges of one trace file into the graph.
    pub fn merge(&mut self, fragment: TraceFragment) -> MergeStats {
        let mut stats = MergeStats::default();

        for (edge, count) in fragment.edges {
            for &addr in &[edge.src, edge.dst] {
                if !self.graph.contains_node(addr) {
                    self.graph.add_node(addr);
                    if addr != EXIT {
                        stats.new_blocks += 1;
                    }
                }
            }
            if let Some(weight) = self.graph.edge_weight_mut(edge.src, edge.dst) {
                *weight = weight.saturating_add(count);
                continue;
            }
            self.graph.add_edge(edge.src, edge.dst, count);
            if edge.is_real() {
                stats.new_edges += 1;
            }
        }

        for (edge, priors) in fragment.back_edges {
            for prior in priors {
                self.back_edges.add_edge(prior, edge, ());
            }
        }

        self.traces += 1;
        stats
    }

    /// Parses the trace files on a pool of `workers` threads and merges them in order.
    ///
    /// Files that cannot be read are skipped with a warning. Returns the merge statistics of every file that was
    /// merged, in input order.
    pub fn load(&mut self, files: &[PathBuf], workers: usize, splice: bool) -> Result<Vec<(PathBuf, MergeStats)>> {
        let pool = ThreadPoolBuilder::new().num_threads(workers.max(1)).build()?;
        info!("parsing {} trace files on {} threads", files.len(), pool.current_num_threads());

        let fragments = pool.install(|| {
            files
                .par_iter()
                .map(|path| TraceFragment::open(path, splice))
                .collect::<Vec<_>>()
        });

        let mut stats = Vec::with_capacity(files.len());
        for (path, fragment) in files.iter().zip(fragments) {
            match fragment.at_path(path) {
                Ok(fragment) => {
                    let merged = self.merge(fragment);
                    debug!("{}: {} new blocks, {} new edges", path.display(), merged.new_blocks, merged.new_edges);
                    stats.push((path.clone(), merged));
                },
                Err(e) => warn!("{}, skipped", e),
            }
        }
        info!("merged {} traces: {} blocks, {} edges", self.traces, self.block_count(), self.edge_count());
        Ok(stats)
    }

    /// Number of merged trace files.
    pub fn trace_count(&self) -> usize {
        self.traces
    }

    /// Number of distinct addresses, excluding the sentinel.
    pub fn block_count(&self) -> usize {
        self.graph.nodes().filter(|&a| a != EXIT).count()
    }

    /// Number of distinct real edges.
    pub fn edge_count(&self) -> usize {
        self.edges().count()
    }

    /// Iterates the real edges and their total hit counts.
    pub fn edges<'a>(&'a self) -> impl Iterator<Item = (Edge, u64)> + 'a {
        self.graph
            .all_edges()
            .map(|(src, dst, &count)| (Edge::new(src, dst), count))
            .filter(|&(edge, _)| edge.is_real())
    }

    /// Whether the real edge has been observed.
    pub fn contains_edge(&self, edge: Edge) -> bool {
        edge.is_real() && self.graph.contains_edge(edge.src, edge.dst)
    }

    /// Total hit count of an edge.
    pub fn hit_count(&self, edge: Edge) -> Option<u64> {
        self.graph.edge_weight(edge.src, edge.dst).cloned()
    }

    /// Addresses observed jumping to `addr`, sorted.
    pub fn callers(&self, addr: Address) -> Vec<Address> {
        if !self.graph.contains_node(addr) {
            return Vec::new();
        }
        let mut callers = self.graph.neighbors_directed(addr, Direction::Incoming).collect::<Vec<_>>();
        callers.sort();
        callers
    }

    /// Edges observed immediately before `edge` in any trace, sorted.
    pub fn prior_edges(&self, edge: Edge) -> Vec<Edge> {
        if !self.back_edges.contains_node(edge) {
            return Vec::new();
        }
        let mut priors = self.back_edges.neighbors_directed(edge, Direction::Incoming).collect::<Vec<_>>();
        priors.sort();
        priors
    }

    /// Writes the real edges as `src,dst,count` lines, sorted by edge.
    pub fn write_edges<W: io::Write>(&self, mut writer: W) -> io::Result<()> {
        let mut edges = self.edges().collect::<Vec<_>>();
        edges.sort();
        for (edge, count) in edges {
            writeln!(writer, "{},{:x}", edge, count)?;
        }
        Ok(())
    }
}

//}}}

#[cfg(test)]
mod tests {
    use super::*;

    use tempdir::TempDir;

    use std::fs;

    const SPLICED: &str = "\
ffffffff81000000,ffffffff81000010
ffffffff81000010,ffffffffffffffff
ffffffffffffffff,ffffffff82000000
ffffffff82000000,ffffffff82000020,2
";

    #[test]
    fn test_parse_record() {
        assert_eq!(parse_record("ffffffff81000000,ffffffff81000010").unwrap(), (Edge::new(0xffff_ffff_8100_0000, 0xffff_ffff_8100_0010), 1));
        assert_eq!(parse_record("10,20,1f").unwrap(), (Edge::new(0x10, 0x20), 0x1f));
        assert!(parse_record("10").is_err());
        assert!(parse_record("10,zz").is_err());
        assert!(parse_record("1,2,3,4").is_err());
    }

    #[test]
    fn test_fold_splice_address() {
        assert_eq!(fold_splice_address(0xffff_ffff_8100_0010), 0x8100_0010_ffff_ffff);
        assert!(fold_splice_address(0xffff_ffff_8100_0010) < KERNEL_THRESHOLD);
    }

    #[test]
    fn test_splice() {
        let fragment = TraceFragment::parse(SPLICED, true);
        let first = Edge::new(0xffff_ffff_8100_0000, 0xffff_ffff_8100_0010);
        let spliced = Edge::new(0x8100_0010_ffff_ffff, 0xffff_ffff_8200_0000);
        let last = Edge::new(0xffff_ffff_8200_0000, 0xffff_ffff_8200_0020);

        assert_eq!(fragment.edges.keys().cloned().collect::<Vec<_>>(), vec![spliced, first, last]);
        assert_eq!(fragment.edges[&last], 2);
        assert_eq!(fragment.back_edges[&first], vec![TRACE_START].into_iter().collect::<BTreeSet<_>>());
        assert_eq!(fragment.back_edges[&spliced], vec![first].into_iter().collect::<BTreeSet<_>>());
        assert_eq!(fragment.back_edges[&last], vec![spliced].into_iter().collect::<BTreeSet<_>>());
    }

    #[test]
    fn test_no_splice() {
        let fragment = TraceFragment::parse(SPLICED, false);
        assert_eq!(fragment.edges.len(), 4);
        let mut graph = TraceGraph::new();
        let stats = graph.merge(fragment);
        assert_eq!(stats, MergeStats { new_blocks: 4, new_edges: 2 });
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_exit_edge_is_not_observed() {
        let text = "ffffffffaaaa0000,ffffffffbbbb0000,5\nffffffffbbbb0000,ffffffffffffffff,1\n";
        for &splice in &[true, false] {
            let mut graph = TraceGraph::new();
            graph.merge(TraceFragment::parse(text, splice));
            let edges = graph.edges().collect::<Vec<_>>();
            assert_eq!(edges, vec![(Edge::new(0xffff_ffff_aaaa_0000, 0xffff_ffff_bbbb_0000), 5)]);
            assert!(!graph.contains_edge(Edge::new(0xffff_ffff_bbbb_0000, EXIT)));
        }
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let fragment = TraceFragment::parse("10,20\ngarbage\n\n20,30,2\n", true);
        assert_eq!(fragment.malformed, 1);
        assert_eq!(fragment.edges.len(), 2);
        // the garbage line does not break the chain of back edges.
        assert_eq!(fragment.back_edges[&Edge::new(0x20, 0x30)], vec![Edge::new(0x10, 0x20)].into_iter().collect::<BTreeSet<_>>());
    }

    #[test]
    fn test_hit_counts_saturate() {
        let text = "10,20,ffffffffffffffff\n10,20,ffffffffffffffff\n";
        let fragment = TraceFragment::parse(text, true);
        assert_eq!(fragment.edges[&Edge::new(0x10, 0x20)], u64::max_value());

        let mut graph = TraceGraph::new();
        graph.merge(fragment.clone());
        graph.merge(fragment);
        assert_eq!(graph.hit_count(Edge::new(0x10, 0x20)), Some(u64::max_value()));
    }

    #[test]
    fn test_discover_in_dir_with_glob_characters() {
        let parent = TempDir::new("warncov-trace").unwrap();
        let dir = parent.path().join("run[1]*?");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("fuzz_00001.lst.lz4"), b"").unwrap();
        fs::write(dir.join("payload_00002.lz4"), b"").unwrap();
        fs::write(dir.join("notes.txt"), b"").unwrap();
        assert_eq!(
            discover(&dir).unwrap(),
            vec![dir.join("fuzz_00001.lst.lz4"), dir.join("payload_00002.lz4")]
        );
    }

    #[test]
    fn test_merge_is_additive() {
        let mut graph = TraceGraph::new();
        let first = graph.merge(TraceFragment::parse("10,20,1\n20,30,1\n", true));
        let second = graph.merge(TraceFragment::parse("20,30,4\n30,40\n", true));
        assert_eq!(first, MergeStats { new_blocks: 3, new_edges: 2 });
        assert_eq!(second, MergeStats { new_blocks: 1, new_edges: 1 });
        assert_eq!(graph.hit_count(Edge::new(0x20, 0x30)), Some(5));
        assert_eq!(graph.callers(0x30), vec![0x20]);
        assert_eq!(graph.prior_edges(Edge::new(0x20, 0x30)), vec![Edge::new(0x10, 0x20), TRACE_START]);
        assert_eq!(graph.trace_count(), 2);

        let mut out = Vec::new();
        graph.write_edges(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "0000000000000010,0000000000000020,1\n\
             0000000000000020,0000000000000030,5\n\
             0000000000000030,0000000000000040,1\n"
        );
    }
}
