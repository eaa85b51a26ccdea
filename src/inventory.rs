//! Reads a set of inventory files in parallel and merges them into one
//! `key -> Record` map, tracking running kept/dropped totals per pollutant.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use tabled::Tabled;

use crate::emissions::Pollutant;
use crate::error::ParseError;
use crate::record::{Record, RecordOps};
use crate::readers::read_records;

/// Cooperative cancellation flag threaded through a long-running request.
/// Workers check it between stripes/files and return early without treating
/// cancellation as an error.
#[derive(Debug, Clone, Default)]
pub struct CancellationScope(Arc<AtomicBool>);

impl CancellationScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One row of the summary report: a pollutant's kept and dropped mass
/// totals (kg) across every file read.
#[derive(Debug, Clone, Tabled)]
pub struct PollutantSummaryRow {
    pub pollutant: String,
    pub kept_kg: f64,
    pub dropped_kg: f64,
}

/// The result of reading a batch of inventory files: the merged records plus
/// a per-pollutant summary suitable for printing with `tabled`.
#[derive(Debug, Clone, Default)]
pub struct InventoryReadReport {
    pub files_read: usize,
    pub records_merged: usize,
    pub summary: Vec<PollutantSummaryRow>,
}

/// A single file to be read, identified by path and an optional group label
/// (e.g. "onroad", "point") used only for reporting.
#[derive(Debug, Clone)]
pub struct InventoryFile {
    pub path: PathBuf,
    pub group: String,
}

impl InventoryFile {
    pub fn new(path: impl Into<PathBuf>, group: impl Into<String>) -> Self {
        Self { path: path.into(), group: group.into() }
    }
}

enum WorkerMessage {
    Record(Record),
    Failed { path: PathBuf, error: ParseError },
}

/// Read every file in `files` on its own thread (fanning in through an
/// `mpsc::channel`), merging arrivals into a single-threaded coordinator by
/// source key. Unlocatable-record filtering, if `locate` is supplied, logs
/// and skips records the locator rejects rather than failing the whole read.
pub fn read_inventory(
    files: &[InventoryFile],
    locate: Option<&dyn Fn(&Record) -> bool>,
    cancel: &CancellationScope,
) -> Result<(Vec<Record>, InventoryReadReport), ParseError> {
    let (tx, rx) = mpsc::channel::<WorkerMessage>();

    std::thread::scope(|scope| {
        for file in files {
            let tx = tx.clone();
            let cancel = cancel.clone();
            scope.spawn(move || {
                if cancel.is_cancelled() {
                    return;
                }
                match read_records(&file.path) {
                    Ok(records) => {
                        for record in records {
                            if cancel.is_cancelled() {
                                break;
                            }
                            let _ = tx.send(WorkerMessage::Record(record));
                        }
                    }
                    Err(error) => {
                        let _ = tx.send(WorkerMessage::Failed { path: file.path.clone(), error });
                    }
                }
            });
        }
        drop(tx);

        let mut merged: HashMap<String, Record> = HashMap::new();
        let mut kept_totals: HashMap<String, f64> = HashMap::new();
        let mut dropped_totals: HashMap<String, f64> = HashMap::new();
        let mut first_error: Option<ParseError> = None;

        for msg in rx {
            match msg {
                WorkerMessage::Record(record) => {
                    if let Some(locate) = locate {
                        if !locate(&record) {
                            log::warn!("dropping unlocatable record with key {}", record.key());
                            accumulate_totals(&mut dropped_totals, &record);
                            continue;
                        }
                    }
                    accumulate_totals(&mut kept_totals, &record);
                    match merged.get_mut(&record.key()) {
                        Some(existing) => existing.combine(&record),
                        None => {
                            merged.insert(record.key(), record);
                        }
                    }
                }
                WorkerMessage::Failed { path, error } => {
                    log::error!("failed to read {}: {error}", path.display());
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
        }

        if let Some(error) = first_error {
            return Err(error);
        }

        let mut pollutant_names: Vec<String> = kept_totals.keys().chain(dropped_totals.keys()).cloned().collect();
        pollutant_names.sort();
        pollutant_names.dedup();

        let summary = pollutant_names
            .into_iter()
            .map(|name| PollutantSummaryRow {
                kept_kg: kept_totals.get(&name).copied().unwrap_or(0.0),
                dropped_kg: dropped_totals.get(&name).copied().unwrap_or(0.0),
                pollutant: name,
            })
            .collect();

        let report = InventoryReadReport { files_read: files.len(), records_merged: merged.len(), summary };
        Ok((merged.into_values().collect(), report))
    })
}

fn accumulate_totals(totals: &mut HashMap<String, f64>, record: &Record) {
    for pollutant in record.emissions().all_pollutants() {
        if let Some(total) = record.totals(pollutant) {
            *totals.entry(pollutant_display_name(pollutant)).or_insert(0.0) += total.value;
        }
    }
}

fn pollutant_display_name(pollutant: &Pollutant) -> String {
    pollutant.to_string()
}

/// Render a report as a `tabled` grid string, suitable for CLI output.
pub fn render_report(report: &InventoryReadReport) -> String {
    use tabled::settings::Style;
    let mut table = tabled::Table::new(&report.summary);
    table.with(Style::modern());
    format!(
        "files read: {}\nrecords merged: {}\n{}",
        report.files_read, report.records_merged, table
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_orl_fixture(dir: &Path) -> PathBuf {
        let path = dir.join("fixture.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "#ORL NONROAD").unwrap();
        writeln!(f, "#COUNTRY=US").unwrap();
        writeln!(f, "#YEAR=2016").unwrap();
        writeln!(f, "37183,,0010100602,NAPHTH_72,1000,-9,").unwrap();
        path
    }

    #[test]
    fn read_inventory_merges_records_sharing_a_key() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = write_orl_fixture(dir.path());
        let path_b = dir.path().join("fixture2.csv");
        std::fs::copy(&path_a, &path_b).unwrap();

        let files = vec![InventoryFile::new(path_a, "nonroad"), InventoryFile::new(path_b, "nonroad")];
        let cancel = CancellationScope::new();
        let (records, report) = read_inventory(&files, None, &cancel).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(report.files_read, 2);
        assert_eq!(report.records_merged, 1);
    }

    #[test]
    fn locator_routes_rejected_records_to_dropped_totals() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_orl_fixture(dir.path());
        let files = vec![InventoryFile::new(path, "nonroad")];
        let cancel = CancellationScope::new();
        let (records, report) = read_inventory(&files, Some(&|_r: &Record| false), &cancel).unwrap();

        assert!(records.is_empty());
        assert!(report.summary.iter().any(|row| row.dropped_kg > 0.0));
    }
}
