extern crate tempdir;
extern crate warncov;

use warncov::{Config, ErrorKind, Session};
use warncov::filter::ReportFilter;
use warncov::transfer::{split_records, Outcome, TransferStats};

use tempdir::TempDir;

use std::fs;
use std::path::{Path, PathBuf};

fn test_data(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("test-data").join(name)
}

#[test]
fn test_transfer_files() {
    let dir = TempDir::new("warncov-transfer").unwrap();
    let output = dir.path().join("transferred.txt");
    let session = Session::new(Config::default()).unwrap();

    let records = session.transfer(&test_data("old_annotated.txt"), &test_data("new_report.txt"), &output).unwrap();
    let outcomes = records.iter().map(|r| r.outcome).collect::<Vec<_>>();
    assert_eq!(outcomes, vec![Outcome::Exact, Outcome::Fuzzy, Outcome::New]);
    assert_eq!(records.iter().filter(|r| r.outcome.is_carried()).count(), 2);
    assert_eq!(
        TransferStats::of(&records),
        TransferStats {
            exact: 1,
            fuzzy: 1,
            new: 1,
            stale: 0,
        }
    );

    let written = fs::read_to_string(&output).unwrap();
    let written = split_records(&written);
    assert_eq!(written.len(), 3);
    assert!(written[0].starts_with("reviewed\tdrivers/pci/probe.c:10"));
    assert!(written[0].ends_with("[benign, bounded by caller]"));
    assert_eq!(
        written[1],
        "fixme\tdrivers/virtio/virtio.c:42 virtio_probe() warn: host input {IDW1}\n\t[needs a length check]"
    );
    assert_eq!(written[2], "drivers/net/virtio_net.c:77 virtnet_poll() warn: host input {IDW3}");
    assert!(!written.iter().any(|r| r.contains("{IDW9}")));

    // the output is never replaced silently.
    match *session.transfer(&test_data("old_annotated.txt"), &test_data("new_report.txt"), &output).unwrap_err().kind() {
        ErrorKind::OutputAlreadyExists(ref path) => assert_eq!(path, &output),
        ref kind => panic!("unexpected error {:?}", kind),
    }
}

#[test]
fn test_transfer_keeps_stale_and_overwrites() {
    let dir = TempDir::new("warncov-transfer").unwrap();
    let output = dir.path().join("transferred.txt");
    fs::write(&output, "previous run").unwrap();

    let config = Config {
        keep_stale_annotations: true,
        overwrite: true,
        ..Config::default()
    };
    let session = Session::new(config).unwrap();
    let records = session.transfer(&test_data("old_annotated.txt"), &test_data("new_report.txt"), &output).unwrap();

    let last = records.last().unwrap();
    assert_eq!(last.outcome, Outcome::Stale);
    assert!(last.outcome.is_carried());
    assert!(last.text.contains("{IDW9}"));
    assert_eq!(split_records(&fs::read_to_string(&output).unwrap()).len(), 4);
}

#[test]
fn test_transfer_missing_input() {
    let dir = TempDir::new("warncov-transfer").unwrap();
    let session = Session::new(Config::default()).unwrap();
    let missing = test_data("missing_report.txt");
    let output = dir.path().join("transferred.txt");

    match *session.transfer(&test_data("old_annotated.txt"), &missing, &output).unwrap_err().kind() {
        ErrorKind::InputNotFound(ref path) => assert_eq!(path, &missing),
        ref kind => panic!("unexpected error {:?}", kind),
    }
    assert!(!output.exists());
}

#[test]
fn test_filter_report_file() {
    let dir = TempDir::new("warncov-filter").unwrap();
    let input = dir.path().join("smatch_warns.txt");
    let output = dir.path().join("smatch_warns.filtered.txt");
    fs::write(
        &input,
        "drivers/pci/probe.c:10 pci_probe() warn: host input {IDW2};\n\
         sound/core/pcm.c:5 snd_pcm() warn: host input {IDW3};\n\
         mm/slab.c:7 kmalloc() warn: host input {IDW4};\n",
    ).unwrap();

    let filter = ReportFilter::default();
    assert_eq!(filter.apply_file(&input, &output, false).unwrap(), 2);
    let filtered = fs::read_to_string(&output).unwrap();
    assert!(filtered.contains("{IDW2}"));
    assert!(!filtered.contains("sound/"));

    match *filter.apply_file(&input, &output, false).unwrap_err().kind() {
        ErrorKind::OutputAlreadyExists(_) => {},
        ref kind => panic!("unexpected error {:?}", kind),
    }
    assert_eq!(filter.apply_file(&input, &output, true).unwrap(), 2);
}
