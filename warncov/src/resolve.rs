//! Address resolution table.
//!
//! The table is parsed from the output of `eu-addr2line -afi`, which prints one line per address and one extra line
//! per inlined frame:
//!
//! ```text
//! 0xffffffff81a00010: virtio_dev_probe at /src/linux/drivers/virtio/virtio.c:301
//!  (inlined by) really_probe at /src/linux/drivers/base/dd.c:560
//! ```
//!
//! An inlined frame shares the address of the line before it. The last frame printed for an address is the one that
//! really owns the code, and it is what [`AddrInfo::resolve()`] returns.
//!
//! [`AddrInfo::resolve()`]: ./struct.AddrInfo.html#method.resolve

use error::*;
use trace::{Address, EXIT, KERNEL_THRESHOLD};
use warning::{Location, WarningEntry, WarningStore};

use regex::Regex;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

lazy_static! {
    static ref FRAME_RE: Regex = Regex::new(r"0x([0-9a-f]+): (\S+) at (\S+):([0-9]+)$").expect("frame regex");
    static ref INLINED_RE: Regex = Regex::new(r" \(inlined by\) (\S+) at (\S+):([0-9]+)$").expect("inlined frame regex");
}

/// The pseudo-function of addresses outside the kernel image.
pub const TRACE_EXIT_FUNCTION: &str = "trace_exit";

/// A resolved source frame.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Frame {
    pub function: String,
    pub location: Location,
}

/// Maps code addresses to source locations and functions, and back.
#[derive(Clone, Debug, Default)]
pub struct AddrInfo {
    frames: HashMap<Address, Vec<Frame>>,
    by_location: HashMap<Location, Vec<Address>>,
    by_function: HashMap<String, BTreeSet<Address>>,
}

impl AddrInfo {
    pub fn new() -> AddrInfo {
        AddrInfo::default()
    }

    /// Parses an address resolution dump. `source_prefix` is stripped from every path before it is normalized.
    pub fn parse(text: &str, source_prefix: Option<&str>) -> AddrInfo {
        let mut info = AddrInfo::new();
        let mut current = None;

        for line in text.lines() {
            if let Some(caps) = FRAME_RE.captures(line) {
                let addr = match Address::from_str_radix(&caps[1], 16) {
                    Ok(addr) => addr,
                    Err(_) => continue,
                };
                current = Some(addr);
                info.insert(addr, &caps[2], &caps[3], &caps[4], source_prefix);
            } else if let Some(caps) = INLINED_RE.captures(line) {
                match current {
                    Some(addr) => info.insert(addr, &caps[1], &caps[2], &caps[3], source_prefix),
                    None => debug!("inlined frame without address: {:?}", line),
                }
            }
        }

        debug!("resolved {} addresses", info.frames.len());
        info
    }

    /// Reads an address resolution dump.
    ///
    /// # Errors
    ///
    /// Returns [`InputNotFound`] if the file does not exist.
    ///
    /// [`InputNotFound`]: ../error/enum.ErrorKind.html#variant.InputNotFound
    pub fn open<P: AsRef<Path>>(path: P, source_prefix: Option<&str>) -> Result<AddrInfo> {
        let path = path.as_ref();
        ensure!(path.is_file(), ErrorKind::InputNotFound(path.to_owned()));
        let bytes = fs::read(path)?;
        Ok(AddrInfo::parse(&String::from_utf8_lossy(&bytes), source_prefix))
    }

    fn insert(&mut self, addr: Address, function: &str, path: &str, line: &str, source_prefix: Option<&str>) {
        let line = match line.parse() {
            Ok(line) => line,
            Err(_) => return,
        };
        let path = match source_prefix {
            Some(prefix) if path.starts_with(prefix) => &path[prefix.len()..],
            _ => path,
        };
        let location = Location::new(path, line);

        self.by_location.entry(location.clone()).or_insert_with(Vec::new).push(addr);
        self.by_function.entry(function.to_owned()).or_insert_with(BTreeSet::new).insert(addr);
        self.frames.entry(addr).or_insert_with(Vec::new).push(Frame {
            function: function.to_owned(),
            location,
        });
    }

    /// Whether the address is a real kernel code address.
    pub fn is_kernel_address(addr: Address) -> bool {
        addr != EXIT && addr >= KERNEL_THRESHOLD
    }

    /// Resolves an address to its outermost frame. Returns `None` for addresses outside the kernel image or missing
    /// from the dump.
    pub fn resolve(&self, addr: Address) -> Option<&Frame> {
        if !AddrInfo::is_kernel_address(addr) {
            return None;
        }
        self.frames.get(&addr).and_then(|frames| frames.last())
    }

    /// All frames of an address, innermost first.
    pub fn frames(&self, addr: Address) -> &[Frame] {
        if !AddrInfo::is_kernel_address(addr) {
            return &[];
        }
        self.frames.get(&addr).map_or(&[], |frames| &**frames)
    }

    /// The function owning an address. Addresses outside the kernel image belong to `trace_exit`.
    pub fn function_of(&self, addr: Address) -> Option<&str> {
        if !AddrInfo::is_kernel_address(addr) {
            return Some(TRACE_EXIT_FUNCTION);
        }
        self.resolve(addr).map(|frame| &*frame.function)
    }

    /// Addresses whose code belongs to the function, inlined or not, sorted.
    pub fn addresses_of_function(&self, function: &str) -> Vec<Address> {
        if function == TRACE_EXIT_FUNCTION {
            return vec![EXIT];
        }
        self.by_function.get(function).map_or_else(Vec::new, |addrs| addrs.iter().cloned().collect())
    }

    /// Addresses generated from a source line.
    pub fn addresses_of_location(&self, location: &Location) -> &[Address] {
        self.by_location.get(location).map_or(&[], |addrs| &**addrs)
    }

    /// Whether the function appears in the dump.
    pub fn knows_function(&self, function: &str) -> bool {
        function == TRACE_EXIT_FUNCTION || self.by_function.contains_key(function)
    }

    /// Number of resolved addresses.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Returns the warnings whose location was compiled into some traced address, grouped by location.
    pub fn observed_warnings<'a>(&self, warnings: &'a WarningStore) -> BTreeMap<&'a Location, Vec<&'a WarningEntry>> {
        let mut observed = BTreeMap::new();
        for entry in warnings {
            if self.by_location.contains_key(&entry.location) {
                observed.entry(&entry.location).or_insert_with(Vec::new).push(entry);
            }
        }
        observed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warning::Category;

    const DUMP: &str = "\
0xffffffff81a00010: virtio_dev_probe at /src/linux/drivers/virtio/virtio.c:301
 (inlined by) really_probe at /src/linux/drivers/base/dd.c:560
0xffffffff81a00020: virtio_dev_probe at /src/linux/drivers/virtio/virtio.c:305
??:0
0xffffffff81000000: start_kernel at /src/linux/init/main.c:900
";

    #[test]
    fn test_parse() {
        let info = AddrInfo::parse(DUMP, Some("/src/linux/"));
        assert_eq!(info.len(), 3);

        let frame = info.resolve(0xffff_ffff_81a0_0010).unwrap();
        assert_eq!(frame.function, "really_probe");
        assert_eq!(frame.location, Location::new("drivers/base/dd.c", 560));
        assert_eq!(info.frames(0xffff_ffff_81a0_0010).len(), 2);

        assert_eq!(info.addresses_of_function("virtio_dev_probe"), vec![0xffff_ffff_81a0_0010, 0xffff_ffff_81a0_0020]);
        assert_eq!(info.addresses_of_function("really_probe"), vec![0xffff_ffff_81a0_0010]);
        assert_eq!(info.addresses_of_location(&Location::new("init/main.c", 900)), &[0xffff_ffff_8100_0000]);
    }

    #[test]
    fn test_non_kernel_addresses() {
        let info = AddrInfo::parse(DUMP, None);
        assert_eq!(info.function_of(EXIT), Some(TRACE_EXIT_FUNCTION));
        assert_eq!(info.function_of(0x8100_0010_ffff_ffff), Some(TRACE_EXIT_FUNCTION));
        assert_eq!(info.function_of(0xffff_ffff_8200_0000), None);
        assert!(info.resolve(EXIT).is_none());
        assert_eq!(info.addresses_of_function(TRACE_EXIT_FUNCTION), vec![EXIT]);
        assert_eq!(info.resolve(0xffff_ffff_8100_0000).unwrap().location.path, "/src/linux/init/main.c");
    }

    #[test]
    fn test_observed_warnings() {
        let info = AddrInfo::parse(DUMP, Some("/src/linux/"));
        let warnings = WarningStore::parse(
            "concern\tdrivers/virtio/virtio.c:301 virtio_dev_probe() {IDW1}\n\
             safe\tdrivers/virtio/virtio.c:302 virtio_dev_probe() {IDW2}\n",
        );
        let observed = info.observed_warnings(&warnings);
        assert_eq!(observed.len(), 1);
        let entries = &observed[&Location::new("drivers/virtio/virtio.c", 301)];
        assert_eq!(entries[0].category, Category::Concern);
    }
}
