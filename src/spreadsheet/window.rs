use crate::database::range::ColumnRange;
use crate::spreadsheet::reference::index_to_col;
use std::fmt::Display;

/// Rectangular part of a sheet requested by one rule entry:
/// `skip_rows` rows are skipped, then `header_rows` header rows are followed
/// by `data_rows` data rows, all spanning `columns`.
#[derive(Clone, Debug, PartialEq)]
pub struct Window {
    pub sheet: String,
    pub columns: ColumnRange,
    pub skip_rows: usize,
    pub header_rows: usize,
    pub data_rows: usize,
}

impl Window {
    /// First row (0-based) of the header block.
    pub fn first_row(&self) -> usize {
        self.skip_rows
    }

    /// Last row (0-based, inclusive) covered by the window.
    pub fn last_row(&self) -> usize {
        (self.skip_rows + self.header_rows + self.data_rows).saturating_sub(1)
    }

    pub fn width(&self) -> usize {
        self.columns.width()
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.first_row() && row <= self.last_row() && self.columns.contains(col)
    }
}

impl Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}'!{}{}:{}{}",
            self.sheet,
            index_to_col(self.columns.first),
            self.first_row() + 1,
            index_to_col(self.columns.last),
            self.last_row() + 1
        )
    }
}
