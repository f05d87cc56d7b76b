//! CSV import and export of rule sets.
//!
//! The file format is a header row `source,target,status,match_type` followed by one
//! rule per record. Ids, hit counts and timestamps are not exported.

pub mod csv;

use std::io::{BufReader, BufWriter, Read, Write};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{RedirectError, Result};
use crate::store::RuleStore;
use crate::types::{MatchType, NewRule, RedirectStatus};

use self::csv::{write_record, CsvReader};

/// Header row written on export
pub const CSV_HEADER: [&str; 4] = ["source", "target", "status", "match_type"];

/// Default number of rules fetched per store page during export
pub const DEFAULT_EXPORT_PAGE_SIZE: usize = 2000;

/// Export options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Rules fetched per `RuleStore::list` call; 0 means the default
    pub page_size: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_EXPORT_PAGE_SIZE,
        }
    }
}

impl ExportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

/// Outcome of an import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Rows inserted
    pub imported: usize,
    /// Rows ignored for a missing source or target or undecodable content
    pub skipped: usize,
}

/// Write every rule in `store` as CSV, newest first. Returns the number of rules written.
///
/// The store is read one page at a time, so the table is never held in memory at once.
pub fn export_csv<W: Write>(
    store: &dyn RuleStore,
    out: W,
    options: &ExportOptions,
) -> Result<usize> {
    let page_size = match options.page_size {
        0 => DEFAULT_EXPORT_PAGE_SIZE,
        n => n,
    };
    let mut out = BufWriter::new(out);
    write_record(&mut out, &CSV_HEADER)?;

    let mut exported = 0;
    let mut page = 1;
    loop {
        let chunk = store.list(page, page_size)?;
        for rule in &chunk.rows {
            let status = rule.status.code().to_string();
            write_record(
                &mut out,
                &[&rule.source, &rule.target, &status, rule.match_type.as_str()],
            )?;
        }
        exported += chunk.rows.len();

        if chunk.rows.is_empty() || page >= chunk.total_pages() {
            break;
        }
        page += 1;
    }

    out.flush()?;
    info!(exported, "exported redirect rules");
    Ok(exported)
}

/// Insert the rules in a CSV document. Additive only: existing rules are untouched and
/// duplicates are not detected.
///
/// The first record is a header and is discarded unread. Rows without a source or
/// target, and rows that cannot be decoded (invalid UTF-8, an unterminated quote), are
/// skipped and counted; a missing or non-numeric status becomes 301 and an unknown match
/// type becomes `exact`. Only I/O failures of `input` abort the import.
pub fn import_csv<R: Read>(store: &dyn RuleStore, input: R) -> Result<ImportReport> {
    let mut reader = CsvReader::new(BufReader::new(input));
    let mut report = ImportReport::default();

    // Header content is ignored, including an undecodable header.
    match reader.next_record() {
        Ok(None) => return Ok(report),
        Ok(Some(_)) | Err(RedirectError::Csv { .. }) => {}
        Err(e) => return Err(e),
    }

    loop {
        let fields = match reader.next_record() {
            Ok(Some(fields)) => fields,
            Ok(None) => break,
            Err(RedirectError::Csv { line, message }) => {
                debug!(line, %message, "skipping malformed row");
                report.skipped += 1;
                continue;
            }
            Err(e) => return Err(e),
        };
        let Some(rule) = parse_row(fields) else {
            debug!(line = reader.line(), "skipping row without source or target");
            report.skipped += 1;
            continue;
        };
        match store.insert(rule) {
            Ok(_) => report.imported += 1,
            Err(RedirectError::ValidationFailed(message)) => {
                debug!(line = reader.line(), %message, "skipping rejected row");
                report.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        imported = report.imported,
        skipped = report.skipped,
        "imported redirect rules"
    );
    Ok(report)
}

/// Turn one CSV record into a rule, or `None` when source or target is blank.
pub fn parse_row(fields: Vec<String>) -> Option<NewRule> {
    let mut fields = fields.into_iter().map(|f| f.trim().to_string());
    let source = fields.next().unwrap_or_default();
    let target = fields.next().unwrap_or_default();
    let status = fields.next().unwrap_or_default();
    let match_type = fields.next().unwrap_or_default();

    if source.is_empty() || target.is_empty() {
        return None;
    }

    let status = status
        .parse::<u16>()
        .ok()
        .filter(|&code| code != 0)
        .unwrap_or(RedirectStatus::default().code());

    Some(
        NewRule::new(source, target)
            .with_status(status)
            .with_match_type(MatchType::parse_or_default(&match_type)),
    )
}
