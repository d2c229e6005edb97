use crate::database::column::ColumnType;
use crate::database::store::TableSummary;
use crate::database::table::Table;
use crate::database::value::Value;
use crate::error::ErrorKind;
use crate::error::EtlError;
use crate::error::ResultMessage;
use crate::pipeline::FailurePolicy;
use crate::pipeline::Phase;
use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use sha2::Digest as _;
use sha2::Sha256;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Read as _;
use std::path::Path;
use tracing::warn;

const HASH_BUFFER_SIZE: usize = 8192;

/// Lowercase hex SHA-256 digest of a file, read in fixed-size chunks.
pub fn sha256_file(path: &Path) -> Result<String, EtlError> {
    let hash = || -> Result<String, EtlError> {
        let mut reader = BufReader::with_capacity(HASH_BUFFER_SIZE, File::open(path)?);
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; HASH_BUFFER_SIZE];
        loop {
            let read = reader.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    };
    hash().with_prefix(&format!("Hashing '{}'", path.display()))
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedWithFailures,
    Aborted,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Skipped,
    Loaded,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub data_type: ColumnType,
    pub nulls: usize,
    /// Smallest and largest value of a numeric column
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl ColumnProfile {
    pub fn of(table: &Table) -> Vec<ColumnProfile> {
        table
            .columns
            .iter()
            .zip(table.null_counts())
            .enumerate()
            .map(|(index, (column, nulls))| {
                let (min, max) = if column.kind.is_numeric() {
                    numeric_range(table, index)
                } else {
                    (None, None)
                };
                ColumnProfile {
                    name: column.name.to_owned(),
                    data_type: column.kind,
                    nulls,
                    min,
                    max,
                }
            })
            .collect()
    }
}

fn numeric_range(table: &Table, index: usize) -> (Option<f64>, Option<f64>) {
    table
        .column_values(index)
        .filter_map(|value| match value {
            Value::BigInt(number) => Some(*number as f64),
            Value::Double(number) => Some(*number),
            _ => None,
        })
        .fold((None, None), |(min, max): (Option<f64>, Option<f64>), number| {
            (
                Some(min.map_or(number, |min| min.min(number))),
                Some(max.map_or(number, |max| max.max(number))),
            )
        })
}

/// Rows that repeat an earlier row cell for cell.
pub fn duplicate_rows(table: &Table) -> usize {
    let mut seen = HashSet::with_capacity(table.len());
    table
        .rows
        .iter()
        .filter(|row| !seen.insert(row.iter().map(Value::join_key).collect::<Vec<_>>()))
        .count()
}

/// Outcome of one rule entry.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EntryReport {
    /// 1-based position in the rule document
    pub index: usize,
    pub sheet: Option<String>,
    pub target: Option<String>,
    pub status: EntryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_rows: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnProfile>,
    /// Data quality findings that did not fail the entry
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub duration_ms: u64,
}

impl EntryReport {
    pub fn skipped(index: usize, target: Option<String>) -> Self {
        EntryReport {
            index,
            sheet: None,
            target,
            status: EntryStatus::Skipped,
            phase: None,
            error_kind: None,
            error: None,
            rows: None,
            duplicate_rows: None,
            columns: Vec::new(),
            warnings: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Marks the entry loaded and profiles the table it wrote.
    pub fn loaded(&mut self, rows: usize, table: &Table) {
        self.status = EntryStatus::Loaded;
        self.rows = Some(rows);
        self.columns = ColumnProfile::of(table);
        let duplicates = duplicate_rows(table);
        self.duplicate_rows = Some(duplicates);
        if rows == 0 {
            self.warnings.push(format!("table '{}' is empty", table.name));
        }
        if duplicates > 0 {
            self.warnings.push(format!("table '{}' has {duplicates} duplicate rows", table.name));
        }
        for warning in &self.warnings {
            warn!(table = %table.name, "{warning}");
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WorkbookInfo {
    pub path: String,
    pub size_bytes: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl WorkbookInfo {
    /// File metadata and the digest are best effort; the workbook has already been opened.
    pub fn of(path: &str) -> Self {
        let metadata = std::fs::metadata(path).ok();
        let sha256 = sha256_file(Path::new(path))
            .inspect_err(|error| warn!(%error, "cannot hash the workbook"))
            .ok();
        WorkbookInfo {
            path: path.to_owned(),
            size_bytes: metadata.as_ref().map(|metadata| metadata.len()),
            modified: metadata
                .and_then(|metadata| metadata.modified().ok())
                .map(DateTime::<Utc>::from),
            sha256,
        }
    }
}

/// The rule document a run was configured with.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RulesInfo {
    pub path: String,
    pub sha256: String,
}

impl RulesInfo {
    pub fn of(path: &Path) -> Result<Self, EtlError> {
        Ok(RulesInfo {
            path: path.display().to_string(),
            sha256: sha256_file(path)?,
        })
    }
}

/// Summary of a pipeline run, written as JSON for monitoring.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub workbook: WorkbookInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<RulesInfo>,
    pub database: String,
    pub policy: FailurePolicy,
    pub status: RunStatus,
    pub entries: Vec<EntryReport>,
    /// Store content at the end of the run
    pub tables: Vec<TableSummary>,
    /// Copies of the database and the workbook taken before the run
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub backups: Vec<String>,
    /// The error that stopped an aborted run
    #[serde(skip)]
    pub failure: Option<EtlError>,
}

impl RunReport {
    pub fn failed_entries(&self) -> impl Iterator<Item = &EntryReport> + '_ {
        self.entries
            .iter()
            .filter(|entry| entry.status == EntryStatus::Failed)
    }

    pub fn loaded_tables(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries
            .iter()
            .filter(|entry| entry.status == EntryStatus::Loaded)
            .filter_map(|entry| entry.target.as_deref())
    }

    pub fn write_json(&self, path: &Path) -> Result<(), EtlError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Turns an aborted run into the error of the entry that stopped it.
    pub fn into_result(mut self) -> Result<RunReport, EtlError> {
        match self.failure.take() {
            Some(failure) if self.status == RunStatus::Aborted => Err(failure),
            failure => {
                self.failure = failure;
                Ok(self)
            }
        }
    }
}
