//! # Spreadsheet Reading
//!
//! Reads rectangular regions out of Office Open XML workbooks (`.xlsx`, `.xlsm`).
//! Cells keep their native type (number, text, date, boolean); empty cells
//! become missing values. The workbook is opened once and serves every rule
//! entry of a run.
pub(crate) mod cell;
pub(crate) mod reference;
pub mod region;
pub mod window;
pub mod xlsx;

#[cfg(test)]
pub(crate) mod fixture;

use crate::error::EtlError;
use crate::spreadsheet::region::Region;
use crate::spreadsheet::window::Window;
use crate::spreadsheet::xlsx::XlsxSpreadsheet;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Workbook '{0}' not found")]
    FileNotFound(String),

    #[error("Cannot detect spreadsheet format for '{0}', expected .xlsx or .xlsm")]
    UnsupportedFormat(String),

    #[error("Workbook part '{0}' is missing")]
    MissingPart(String),

    #[error("Workbook '{0}' contains no sheets")]
    EmptyWorkbook(String),

    #[error("Sheet '{sheet}' not found in workbook '{file}' (available: {available})")]
    SheetNotFound {
        file: String,
        sheet: String,
        available: String,
    },

    #[error("Window {window} exceeds the populated extent of the sheet ({extent})")]
    WindowOutOfBounds { window: String, extent: String },

    #[error("Invalid cell value '{value}' at {reference}")]
    CellValueError { reference: String, value: String },
}

/// A workbook that regions can be read from.
pub trait Spreadsheet {
    /// Returns the path of the workbook.
    fn name(&self) -> String;

    /// Sheet names in workbook order.
    fn sheet_names(&self) -> Vec<String>;

    /// Reads exactly the cells of `window`, failing when the sheet is absent
    /// or the window reaches past the populated part of the sheet.
    fn read_region(&mut self, window: &Window) -> Result<Region, EtlError>;
}

/// Opens a workbook, choosing the reader by file extension.
pub fn open_workbook(path: &Path) -> Result<Box<dyn Spreadsheet>, EtlError> {
    let name = path.display().to_string();
    if !path.is_file() {
        return Err(SpreadsheetError::FileNotFound(name).into());
    }
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| extension.to_ascii_lowercase());
    match extension.as_deref() {
        Some("xlsx") | Some("xlsm") => Ok(Box::new(XlsxSpreadsheet::open(path)?)),
        _ => Err(SpreadsheetError::UnsupportedFormat(name))?,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn missing_workbook_is_source_not_found() {
        let error = open_workbook(Path::new("/nonexistent/tracker.xlsx")).err().unwrap();
        assert_eq!(error.kind(), ErrorKind::SourceNotFound);
    }

    #[test]
    fn rejects_unknown_extensions() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("tracker.csv");
        std::fs::write(&path, "a,b\n").unwrap();
        let error = open_workbook(&path).err().unwrap();
        assert!(matches!(error, EtlError::SpreadsheetError(SpreadsheetError::UnsupportedFormat(_))));
    }
}
