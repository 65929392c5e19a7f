#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::admin::error::ensure_exists;
use crate::admin::Result;
use crate::graph::{IdKind, Main};
use crate::storage::{read_file, read_main, write_main, Catalog, ReadReport};

const MAX_FINDINGS: usize = 32;

/// How much a finding undermines trust in the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySeverity {
    /// Noted, nothing wrong with the document.
    Info,
    /// Recoverable oddity; the document still loads.
    Warning,
    /// The document cannot be trusted.
    Error,
}

/// One observation about a document.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    /// Severity.
    pub severity: VerifySeverity,
    /// What was observed.
    pub message: String,
}

/// Outcome of verifying one document file.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    /// Whether no error was found.
    pub success: bool,
    /// Issues discovered during verification.
    pub findings: Vec<VerifyFinding>,
    /// Datablocks per kind code.
    pub counts: BTreeMap<&'static str, usize>,
    /// Counters of the full read, when it succeeded.
    pub read: Option<ReadReport>,
    /// Whether writing the graph again and reading it back reproduced it.
    pub rewrite_stable: Option<bool>,
}

fn push(findings: &mut Vec<VerifyFinding>, severity: VerifySeverity, message: impl Into<String>) {
    if findings.len() < MAX_FINDINGS {
        findings.push(VerifyFinding {
            severity,
            message: message.into(),
        });
    }
}

/// Reads and links the document at `path` and reports what it found.
///
/// Read failures become error findings; only a missing file or an I/O failure
/// outside the read itself fails the call.
pub fn verify(path: impl AsRef<Path>) -> Result<VerifyReport> {
    let path = path.as_ref();
    ensure_exists(path)?;
    let mut findings = Vec::new();
    let mut report = VerifyReport {
        success: false,
        findings: Vec::new(),
        counts: BTreeMap::new(),
        read: None,
        rewrite_stable: None,
    };

    match read_file(path) {
        Ok(outcome) => {
            for kind in IdKind::ALL {
                report.counts.insert(kind.code_str(), outcome.main.count(kind));
            }
            let read = &outcome.report;
            if read.dangling_pointers > 0 {
                push(
                    &mut findings,
                    VerifySeverity::Warning,
                    format!("{} dangling pointers were cleared", read.dangling_pointers),
                );
            }
            if read.unresolved_refs > 0 {
                push(
                    &mut findings,
                    VerifySeverity::Warning,
                    format!("{} name references did not resolve", read.unresolved_refs),
                );
            }
            if read.orphaned_data > 0 {
                push(
                    &mut findings,
                    VerifySeverity::Info,
                    format!("{} data blocks had no owner", read.orphaned_data),
                );
            }
            if read.remapped_blocks > 0 {
                push(
                    &mut findings,
                    VerifySeverity::Info,
                    format!("{} blocks used an older layout", read.remapped_blocks),
                );
            }
            let stable = rewrite_stable(&outcome.main, &mut findings);
            report.rewrite_stable = Some(stable);
            report.read = Some(outcome.report);
        }
        Err(err) => push(&mut findings, VerifySeverity::Error, err.to_string()),
    }

    report.success = !findings
        .iter()
        .any(|f| f.severity == VerifySeverity::Error);
    report.findings = findings;
    Ok(report)
}

fn rewrite_stable(main: &Main, findings: &mut Vec<VerifyFinding>) -> bool {
    let mut bytes = Vec::new();
    let reread = write_main(main, Catalog::compiled(), &mut bytes)
        .and_then(|_| read_main(bytes.as_slice(), Catalog::compiled()));
    match reread {
        Ok(outcome) if outcome.main.outline() == main.outline() => true,
        Ok(_) => {
            push(
                findings,
                VerifySeverity::Error,
                "graph changed when written again",
            );
            false
        }
        Err(err) => {
            push(
                findings,
                VerifySeverity::Error,
                format!("rewritten graph failed to read: {err}"),
            );
            false
        }
    }
}
