use crate::error::EtlError;
use crate::spreadsheet::reference::col_to_index;
use crate::spreadsheet::reference::index_to_col;
use regex::Regex;
use std::fmt::Display;
use std::sync::LazyLock;
use thiserror::Error;

static COLUMN_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z]+)(?::([A-Z]+))?$").expect("Hardcode regex pattern"));

/// Errors related to column range parsing.
#[derive(Error, Debug)]
pub enum RangeError {
    #[error("Invalid column range '{0}', expected letters like 'B:F'")]
    FormatError(String),

    #[error("Column range '{0}' is reversed")]
    ReversedError(String),
}

/// A non-empty, contiguous span of columns in letter notation, e.g. "B:F".
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ColumnRange {
    /// First column (0-based)
    pub first: usize,
    /// Last column (0-based, inclusive)
    pub last: usize,
}

impl ColumnRange {
    /// Parses "B:F" or a single column "C".
    pub fn parse(value: &str) -> Result<Self, EtlError> {
        let normalized = value.trim().to_ascii_uppercase();
        let captures = COLUMN_RANGE
            .captures(&normalized)
            .ok_or_else(|| RangeError::FormatError(value.to_owned()))?;
        let first = captures
            .get(1)
            .and_then(|matcher| col_to_index(matcher.as_str()))
            .ok_or_else(|| RangeError::FormatError(value.to_owned()))?;
        let last = match captures.get(2) {
            Some(matcher) => col_to_index(matcher.as_str())
                .ok_or_else(|| RangeError::FormatError(value.to_owned()))?,
            None => first,
        };
        if last < first {
            Err(RangeError::ReversedError(value.to_owned()))?
        }
        Ok(ColumnRange { first, last })
    }

    pub fn width(&self) -> usize {
        self.last - self.first + 1
    }

    pub fn contains(&self, col: usize) -> bool {
        col >= self.first && col <= self.last
    }
}

impl Display for ColumnRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", index_to_col(self.first), index_to_col(self.last))
    }
}
