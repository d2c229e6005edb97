use crate::database::value::Value;
use crate::spreadsheet::window::Window;

/// Raw cells of one window: header rows and data rows, each exactly as wide
/// as the requested column span. Missing cells are [`Value::Null`].
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub window: Window,
    pub header: Vec<Vec<Value>>,
    pub rows: Vec<Vec<Value>>,
}

impl Region {
    /// Creates a region of the window's shape with every cell missing.
    pub fn empty(window: Window) -> Self {
        let width = window.width();
        Region {
            header: vec![vec![Value::Null; width]; window.header_rows],
            rows: vec![vec![Value::Null; width]; window.data_rows],
            window,
        }
    }

    /// Places a value at an absolute sheet position; positions outside the window are ignored.
    pub fn set(&mut self, row: usize, col: usize, value: Value) {
        if !self.window.contains(row, col) {
            return;
        }
        let col = col - self.window.columns.first;
        let row = row - self.window.first_row();
        if row < self.window.header_rows {
            self.header[row][col] = value;
        } else {
            self.rows[row - self.window.header_rows][col] = value;
        }
    }
}
