//! Carries triage annotations over to a regenerated report.
//!
//! An annotated report is a list of `;`-terminated records. Analysts prefix a record with a status token and a tab,
//! and may append a bracketed comment on a continuation line:
//!
//! ```text
//! reviewed	drivers/pci/probe.c:10 pci_probe() warn: 'val' from host {IDW2}
//! 	val = pci_read_config(dev)
//! 	[benign, bounded by caller];
//! ```
//!
//! When the kernel changes, line numbers and message text shift. [`transfer()`] matches every record of the new
//! report against the old annotated one:
//!
//! 1. If the new record appears verbatim inside an old record, the old record is kept as is.
//! 2. Otherwise, if an old record has the same path, `{IDENTIFIER}` token and function, the new record is emitted with
//!    the old status and comment.
//! 3. Otherwise the new record is emitted unchanged.
//!
//! Ties go to the first old record. Old records not matched by any new record are dropped, unless stale annotations
//! are kept explicitly.
//!
//! [`transfer()`]: ./fn.transfer.html

use config::Config;
use error::*;
use utils::normalize_path;

use regex::Regex;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

lazy_static! {
    static ref IDENTIFIER_RE: Regex = Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("identifier regex");
    static ref COMMENT_RE: Regex = Regex::new(r"\[.*?\]").expect("comment regex");
}

/// Separator between a record and its continuation lines.
const CONTINUATION: &str = "\n\t";

/// How an output record was produced.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// An old record containing the new record verbatim, carried over unchanged.
    Exact,
    /// The new record, with status and comment taken from an old record with the same key.
    Fuzzy,
    /// A new record without prior annotation.
    New,
    /// An old record which matched nothing. Only produced when stale annotations are kept.
    Stale,
}

impl Outcome {
    /// Whether the record carries an annotation from the old report.
    pub fn is_carried(self) -> bool {
        match self {
            Outcome::Exact | Outcome::Fuzzy | Outcome::Stale => true,
            Outcome::New => false,
        }
    }
}

/// A record of the transferred report.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct TransferredRecord {
    pub text: String,
    pub outcome: Outcome,
}

/// The key used to match records whose text changed: path, identifier and function token.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct RecordKey {
    pub path: String,
    pub identifier: String,
    pub function: String,
}

impl RecordKey {
    /// Extracts the key of a record.
    ///
    /// The path is the text before the first colon, after the status if any. The function token is the second
    /// whitespace-separated word after the first colon.
    ///
    /// # Errors
    ///
    /// Returns [`MissingIdentifierToken`] if the record has no `{IDENTIFIER}` token, and [`MalformedRecord`] if it has
    /// no function token.
    ///
    /// [`MissingIdentifierToken`]: ../error/enum.ErrorKind.html#variant.MissingIdentifierToken
    /// [`MalformedRecord`]: ../error/enum.ErrorKind.html#variant.MalformedRecord
    pub fn parse(record: &str) -> Result<RecordKey> {
        let identifier = match IDENTIFIER_RE.captures(record) {
            Some(caps) => caps[1].to_owned(),
            None => bail!(ErrorKind::MissingIdentifierToken(record.to_owned())),
        };

        let mut fields = record.split(':');
        let head = fields.next().unwrap_or("");
        let path = head.split('\t').nth(1).unwrap_or(head).trim();
        let function = match fields.next().and_then(|f| f.split_whitespace().nth(1)) {
            Some(function) => function,
            None => bail!(ErrorKind::MalformedRecord(record.to_owned())),
        };

        Ok(RecordKey {
            path: normalize_path(path),
            identifier,
            function: function.to_owned(),
        })
    }
}

/// Splits a report into trimmed, non-empty records.
pub fn split_records(text: &str) -> Vec<&str> {
    text.split(';').map(str::trim).filter(|r| !r.is_empty()).collect()
}

/// The status token of an annotated record, i.e. the text before the tab on its first line.
pub fn status_of(record: &str) -> Option<&str> {
    let first_line = record.split('\n').next().unwrap_or("");
    let tab = first_line.find('\t')?;
    Some(first_line[..tab].trim()).filter(|s| !s.is_empty())
}

/// The bracketed comment of an annotated record.
///
/// The comment is the first `[...]` on the second continuation line. A record with a single continuation line is
/// accepted too, if that line is nothing but the comment.
pub fn comment_of(record: &str) -> Option<&str> {
    let segments = record.split(CONTINUATION).collect::<Vec<_>>();
    if segments.len() > 2 {
        return COMMENT_RE.find(segments[2]).map(|m| m.as_str());
    }
    if segments.len() == 2 {
        let line = segments[1].trim();
        if let Some(m) = COMMENT_RE.find(line) {
            if m.start() == 0 && m.end() == line.len() {
                return Some(line);
            }
        }
    }
    None
}

/// Combines the status and comment of an old record with the text of a new one.
fn merge_annotation(old: &str, new: &str) -> String {
    let mut result = String::with_capacity(new.len() + 32);
    if let Some(status) = status_of(old) {
        result.push_str(status);
        result.push('\t');
    }
    result.push_str(new);
    if let Some(comment) = comment_of(old) {
        result.push_str(CONTINUATION);
        result.push_str(comment);
    }
    result
}

/// Matches the records of a new report against an old annotated one.
///
/// The output follows the order of the new report. With `keep_stale`, the unmatched old records are appended at the
/// end.
pub fn transfer(old: &str, new: &str, keep_stale: bool) -> Vec<TransferredRecord> {
    let old_records = split_records(old);
    let old_keys = old_records
        .iter()
        .map(|r| match RecordKey::parse(r) {
            Ok(key) => Some(key),
            Err(e) => {
                trace!("old record not eligible for fuzzy matching: {}", e);
                None
            },
        })
        .collect::<Vec<_>>();
    let mut matched = vec![false; old_records.len()];

    let mut result = Vec::new();
    for new_record in split_records(new) {
        if let Some(i) = old_records.iter().position(|old| old.contains(new_record)) {
            matched[i] = true;
            result.push(TransferredRecord {
                text: old_records[i].to_owned(),
                outcome: Outcome::Exact,
            });
            continue;
        }

        match RecordKey::parse(new_record) {
            Ok(key) => {
                if let Some(i) = old_keys.iter().position(|k| k.as_ref() == Some(&key)) {
                    matched[i] = true;
                    result.push(TransferredRecord {
                        text: merge_annotation(old_records[i], new_record),
                        outcome: Outcome::Fuzzy,
                    });
                    continue;
                }
            },
            Err(e) => debug!("new record not eligible for fuzzy matching: {}", e),
        }

        result.push(TransferredRecord {
            text: new_record.to_owned(),
            outcome: Outcome::New,
        });
    }

    let stale = matched.iter().filter(|&&m| !m).count();
    if keep_stale {
        for (record, _) in old_records.iter().zip(&matched).filter(|&(_, &m)| !m) {
            result.push(TransferredRecord {
                text: (*record).to_owned(),
                outcome: Outcome::Stale,
            });
        }
    } else if stale > 0 {
        info!("dropped {} stale annotated records", stale);
    }

    result
}

/// Writes records as `;`-terminated lines.
pub fn write_records<'a, W, I>(records: I, mut writer: W) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a TransferredRecord>,
{
    for record in records {
        write!(writer, "{};\n", record.text)?;
    }
    Ok(())
}

/// Number of output records per outcome.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Serialize)]
pub struct TransferStats {
    pub exact: usize,
    pub fuzzy: usize,
    pub new: usize,
    pub stale: usize,
}

impl TransferStats {
    pub fn of(records: &[TransferredRecord]) -> TransferStats {
        let mut stats = TransferStats::default();
        for record in records {
            match record.outcome {
                Outcome::Exact => stats.exact += 1,
                Outcome::Fuzzy => stats.fuzzy += 1,
                Outcome::New => stats.new += 1,
                Outcome::Stale => stats.stale += 1,
            }
        }
        stats
    }
}

/// Transfers the annotations of the report at `old_path` onto the report at `new_path`, and writes the result to
/// `output`.
///
/// # Errors
///
/// * Returns [`InputNotFound`] if either input does not exist.
/// * Returns [`OutputAlreadyExists`] if `output` exists and `config.overwrite` is not set.
///
/// [`InputNotFound`]: ../error/enum.ErrorKind.html#variant.InputNotFound
/// [`OutputAlreadyExists`]: ../error/enum.ErrorKind.html#variant.OutputAlreadyExists
pub fn transfer_files(old_path: &Path, new_path: &Path, output: &Path, config: &Config) -> Result<Vec<TransferredRecord>> {
    ensure!(new_path.is_file(), ErrorKind::InputNotFound(new_path.to_owned()));
    ensure!(old_path.is_file(), ErrorKind::InputNotFound(old_path.to_owned()));
    ensure!(config.overwrite || !output.exists(), ErrorKind::OutputAlreadyExists(output.to_owned()));

    let old = fs::read_to_string(old_path).at_path(old_path)?;
    let new = fs::read_to_string(new_path).at_path(new_path)?;
    let records = transfer(&old, &new, config.keep_stale_annotations);

    let mut writer = BufWriter::new(File::create(output)?);
    write_records(&records, &mut writer)?;
    writer.flush()?;

    let stats = TransferStats::of(&records);
    info!(
        "wrote {} records to {}: {} exact, {} fuzzy, {} new, {} stale",
        records.len(),
        output.display(),
        stats.exact,
        stats.fuzzy,
        stats.new,
        stats.stale
    );
    Ok(records)
}
