use crate::pipeline::Phase;
use serde::Serialize;
use std::fmt::Display;
use thiserror::Error;

/// Broad classification of a failure, shared by the run report and the exit status.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    SourceNotFound,
    Schema,
    TypeCoercion,
    DataIntegrity,
    DependencyOrder,
    /// Malformed workbook content (zip container, xml parts, cell values)
    Source,
    /// Analytical store failures
    Store,
    Io,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::SourceNotFound => "source not found",
            ErrorKind::Schema => "schema",
            ErrorKind::TypeCoercion => "type coercion",
            ErrorKind::DataIntegrity => "data integrity",
            ErrorKind::DependencyOrder => "dependency order",
            ErrorKind::Source => "source",
            ErrorKind::Store => "store",
            ErrorKind::Io => "io",
        };
        f.write_str(name)
    }
}

/// Main error type of the ETL pipeline.
/// Aggregates the pipeline's own taxonomy with errors from dependencies and internal modules.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("{message}: {source}")]
    Context {
        message: String,
        #[source]
        source: Box<EtlError>,
    },

    #[error("Rule entry #{index} (table '{target}') failed while {phase}: {source}")]
    EntryFailed {
        index: usize,
        target: String,
        phase: Phase,
        #[source]
        source: Box<EtlError>,
    },

    #[error("Rule document is invalid:\n{}", list_problems(.0))]
    InvalidRuleDocument(Vec<EtlError>),

    // Pipeline taxonomy
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Source not found: {0}")]
    SourceNotFoundError(String),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Cannot convert value '{value}' in column '{column}' at data row index {row} to {target}")]
    TypeCoercionError {
        column: String,
        row: usize,
        value: String,
        target: String,
    },

    #[error("Data integrity error: {0}")]
    DataIntegrityError(String),

    #[error("Entry '{entry}' depends on table '{table}' {reason}")]
    DependencyOrderError {
        entry: String,
        table: String,
        reason: String,
    },

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    ParseFloatError(#[from] std::num::ParseFloatError),

    // Third-party library errors
    #[error("{0}")]
    DuckDBError(#[from] duckdb::Error),

    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("{0}")]
    JsonError(#[from] serde_json::Error),

    // Internal module errors
    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    #[error("{0}")]
    SpreadsheetError(#[from] crate::spreadsheet::SpreadsheetError),

    #[error("{0}")]
    RangeError(#[from] crate::database::range::RangeError),

    #[error("{0}")]
    ColumnError(#[from] crate::database::column::ColumnError),
}

fn list_problems(problems: &[EtlError]) -> String {
    problems
        .iter()
        .map(|problem| format!("  - {problem}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl EtlError {
    /// Classifies the error, looking through context and entry wrappers.
    pub fn kind(&self) -> ErrorKind {
        use crate::spreadsheet::SpreadsheetError;
        match self {
            EtlError::Context { source, .. } | EtlError::EntryFailed { source, .. } => source.kind(),
            EtlError::InvalidRuleDocument(problems) => problems
                .first()
                .map(EtlError::kind)
                .unwrap_or(ErrorKind::Configuration),
            EtlError::ConfigurationError(_)
            | EtlError::YamlError(_)
            | EtlError::RangeError(_)
            | EtlError::ColumnError(_) => ErrorKind::Configuration,
            EtlError::SourceNotFoundError(_) => ErrorKind::SourceNotFound,
            EtlError::SchemaError(_) => ErrorKind::Schema,
            EtlError::TypeCoercionError { .. } => ErrorKind::TypeCoercion,
            EtlError::DataIntegrityError(_) => ErrorKind::DataIntegrity,
            EtlError::DependencyOrderError { .. } => ErrorKind::DependencyOrder,
            EtlError::SpreadsheetError(error) => match error {
                SpreadsheetError::FileNotFound(_) | SpreadsheetError::SheetNotFound { .. } => {
                    ErrorKind::SourceNotFound
                }
                SpreadsheetError::WindowOutOfBounds { .. } => ErrorKind::Configuration,
                _ => ErrorKind::Source,
            },
            EtlError::ZipError(_)
            | EtlError::XmlError(_)
            | EtlError::XmlEncodingError(_)
            | EtlError::XmlAttributeError(_)
            | EtlError::XmlHelperError(_)
            | EtlError::ParseIntError(_)
            | EtlError::ParseFloatError(_) => ErrorKind::Source,
            EtlError::DuckDBError(_) => ErrorKind::Store,
            EtlError::IoError(_) | EtlError::JsonError(_) => ErrorKind::Io,
        }
    }

    /// Collapses a list of validation problems: one problem is returned as itself.
    pub(crate) fn from_problems(mut problems: Vec<EtlError>) -> Option<EtlError> {
        match problems.len() {
            0 => None,
            1 => problems.pop(),
            _ => Some(EtlError::InvalidRuleDocument(problems)),
        }
    }
}

pub(crate) trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, EtlError> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| EtlError::Context {
            message: message.to_owned(),
            source: Box::new(e),
        })
    }
}
