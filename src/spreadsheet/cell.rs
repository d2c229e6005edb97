use crate::database::value::Value;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::SpreadsheetError;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use chrono::TimeDelta;

/// 9999-12-31 in the 1900 date system.
const MAX_SERIAL: f64 = 2_958_466.0;

/// Types of cell data in spreadsheet files.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    Boolean,
    Number,
    /// Date/time values stored as numbers from 1900 epoch
    NumberDateTime1900,
    /// Date values stored as numbers from 1900 epoch
    NumberDate1900,
    /// Time values stored as numbers from 1900 epoch
    NumberTime1900,
    /// Date/time values stored as numbers from 1904 epoch
    NumberDateTime1904,
    /// Date values stored as numbers from 1904 epoch
    NumberDate1904,
    /// Time values stored as numbers from 1904 epoch
    NumberTime1904,
    /// ISO 8601 date/time strings
    IsoDateTime,
    InlineString,
    /// Index into the shared string table
    SharedString,
    Error,
}

impl CellType {
    /// Maps built-in number format IDs to date/time cell types.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id {
            "22" => Some(if is_1904 { Self::NumberDateTime1904 } else { Self::NumberDateTime1900 }),
            "14" | "15" | "16" | "17" => Some(if is_1904 { Self::NumberDate1904 } else { Self::NumberDate1900 }),
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => {
                Some(if is_1904 { Self::NumberTime1904 } else { Self::NumberTime1900 })
            }
            _ => None,
        }
    }

    /// Analyzes a custom number format code for date and time tokens,
    /// skipping escaped characters, quoted literals and bracketed sections.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_bracket = false;
        let mut is_date = false;
        let mut is_time = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_bracket => is_literal = true,

                ']' if is_bracket => is_bracket = false,
                '[' if !is_literal => is_bracket = true,
                _ if is_literal || is_bracket => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time, is_1904) {
            (true, true, false) => Self::NumberDateTime1900,
            (true, true, true) => Self::NumberDateTime1904,
            (true, false, false) => Self::NumberDate1900,
            (true, false, true) => Self::NumberDate1904,
            (false, true, false) => Self::NumberTime1900,
            (false, true, true) => Self::NumberTime1904,
            (false, false, _) => Self::Number,
        }
    }

    fn is_1904(&self) -> bool {
        matches!(
            self,
            CellType::NumberDateTime1904 | CellType::NumberDate1904 | CellType::NumberTime1904
        )
    }
}

/// A single raw cell of a sheet with position, type and textual value.
#[derive(Clone, Debug)]
pub(crate) struct Cell {
    /// Row index (0-based)
    pub(crate) row: usize,
    /// Column index (0-based)
    pub(crate) col: usize,
    pub(crate) kind: CellType,
    pub(crate) value: String,
}

impl Cell {
    /// Returns the cell reference, e.g. "B2".
    pub(crate) fn reference(&self) -> String {
        index_to_reference(self.row, self.col)
    }

    /// Converts the raw cell into a native value without coercion.
    /// Empty text becomes a missing value.
    pub(crate) fn to_value(&self, shared_strings: &[String]) -> Result<Value, SpreadsheetError> {
        let value = match self.kind {
            CellType::Empty | CellType::Error => Value::Null,
            CellType::Boolean => Value::Boolean(self.value.trim() == "1" || self.value.trim() == "true"),
            CellType::Number => self.to_number()?,
            CellType::NumberDate1900 | CellType::NumberDate1904 => {
                Value::Date(self.to_datetime()?.date())
            }
            CellType::NumberDateTime1900 | CellType::NumberDateTime1904 => {
                Value::Timestamp(self.to_datetime()?)
            }
            CellType::NumberTime1900 | CellType::NumberTime1904 => Value::Time(self.to_time()?),
            CellType::IsoDateTime => self.to_iso_datetime()?,
            CellType::InlineString => to_text(&self.value),
            CellType::SharedString => {
                let index = self.value.trim().parse::<usize>().map_err(|_| self.invalid())?;
                let text = shared_strings.get(index).ok_or_else(|| self.invalid())?;
                to_text(text)
            }
        };
        Ok(value)
    }

    fn invalid(&self) -> SpreadsheetError {
        SpreadsheetError::CellValueError {
            reference: self.reference(),
            value: self.value.to_owned(),
        }
    }

    /// Integral literals become integers, everything else a double.
    fn to_number(&self) -> Result<Value, SpreadsheetError> {
        let text = self.value.trim();
        if let Ok(number) = text.parse::<i64>() {
            return Ok(Value::BigInt(number));
        }
        text.parse::<f64>()
            .map(Value::Double)
            .map_err(|_| self.invalid())
    }

    /// Serial day numbers beyond year 9999 in either direction are rejected.
    fn serial(&self) -> Result<f64, SpreadsheetError> {
        let serial = self.value.trim().parse::<f64>().map_err(|_| self.invalid())?;
        if !serial.is_finite() || serial.abs() >= MAX_SERIAL {
            return Err(self.invalid());
        }
        Ok(serial)
    }

    /// Converts a serial day number into a date and time,
    /// honoring the 1900 leap year bug and the 1904 date system.
    fn to_datetime(&self) -> Result<NaiveDateTime, SpreadsheetError> {
        let serial = self.serial()?;
        let days = serial.trunc() as i64;
        let offset = if self.kind.is_1904() {
            1_462
        } else if days < 60 {
            1
        } else {
            0
        };
        let base = NaiveDate::from_ymd_opt(1899, 12, 30).ok_or_else(|| self.invalid())?;
        let date = TimeDelta::try_days(days + offset)
            .and_then(|delta| base.checked_add_signed(delta))
            .ok_or_else(|| self.invalid())?;
        let micros = (serial.fract() * 86_400_000_000f64).round() as i64;
        date.and_time(NaiveTime::MIN)
            .checked_add_signed(TimeDelta::microseconds(micros))
            .ok_or_else(|| self.invalid())
    }

    fn to_time(&self) -> Result<NaiveTime, SpreadsheetError> {
        let fraction = self.serial()?.fract();
        if fraction < 0.0 {
            return Err(self.invalid());
        }
        let micros = (fraction * 86_400_000_000f64).round() as i64 % 86_400_000_000;
        NaiveTime::from_num_seconds_from_midnight_opt(
            (micros / 1_000_000) as u32,
            ((micros % 1_000_000) * 1_000) as u32,
        )
        .ok_or_else(|| self.invalid())
    }

    fn to_iso_datetime(&self) -> Result<Value, SpreadsheetError> {
        let text = self.value.trim();
        if text.contains('T') {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .map(Value::Timestamp)
                .map_err(|_| self.invalid())
        } else {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| self.invalid())
        }
    }
}

fn to_text(text: &str) -> Value {
    if text.is_empty() {
        Value::Null
    } else {
        Value::Varchar(text.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(kind: CellType, value: &str) -> Cell {
        Cell {
            row: 0,
            col: 0,
            kind,
            value: value.to_owned(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn types_numbers() {
        assert_eq!(cell(CellType::Number, "42").to_value(&[]).unwrap(), Value::BigInt(42));
        assert_eq!(cell(CellType::Number, "1.23").to_value(&[]).unwrap(), Value::Double(1.23));
        assert_eq!(cell(CellType::Number, "1E-3").to_value(&[]).unwrap(), Value::Double(0.001));
        assert!(cell(CellType::Number, "abc").to_value(&[]).is_err());
    }

    #[test]
    fn converts_serial_dates() {
        let to_value = |kind, value| cell(kind, value).to_value(&[]).unwrap();
        assert_eq!(to_value(CellType::NumberDate1900, "44616"), Value::Date(date(2022, 2, 24)));
        assert_eq!(to_value(CellType::NumberDate1900, "59"), Value::Date(date(1900, 2, 28)));
        assert_eq!(to_value(CellType::NumberDate1900, "61"), Value::Date(date(1900, 3, 1)));
        assert_eq!(to_value(CellType::NumberDate1904, "0"), Value::Date(date(1904, 1, 1)));
        assert_eq!(
            to_value(CellType::NumberDateTime1900, "44616.5"),
            Value::Timestamp(date(2022, 2, 24).and_hms_opt(12, 0, 0).unwrap())
        );
        assert_eq!(
            to_value(CellType::NumberTime1900, "0.75"),
            Value::Time(NaiveTime::from_hms_opt(18, 0, 0).unwrap())
        );
    }

    #[test]
    fn rejects_out_of_range_serials() {
        for (kind, value) in [
            (CellType::NumberDate1900, "1E+20"),
            (CellType::NumberDateTime1900, "-1E+20"),
            (CellType::NumberDateTime1904, "2958466"),
            (CellType::NumberTime1900, "NaN"),
            (CellType::NumberTime1900, "-0.5"),
            (CellType::NumberDate1900, "inf"),
        ] {
            assert!(
                matches!(cell(kind, value).to_value(&[]), Err(SpreadsheetError::CellValueError { .. })),
                "{value} as {kind:?}"
            );
        }
        assert_eq!(
            cell(CellType::NumberDate1900, "2958465").to_value(&[]).unwrap(),
            Value::Date(date(9999, 12, 31))
        );
    }

    #[test]
    fn resolves_strings() {
        let shared = vec!["Austria".to_owned(), String::new()];
        assert_eq!(cell(CellType::SharedString, "0").to_value(&shared).unwrap(), Value::from("Austria"));
        assert_eq!(cell(CellType::SharedString, "1").to_value(&shared).unwrap(), Value::Null);
        assert!(cell(CellType::SharedString, "7").to_value(&shared).is_err());
        assert_eq!(cell(CellType::InlineString, "EU").to_value(&[]).unwrap(), Value::from("EU"));
        assert_eq!(cell(CellType::Error, "#N/A").to_value(&[]).unwrap(), Value::Null);
        assert_eq!(cell(CellType::Boolean, "1").to_value(&[]).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn detects_custom_date_formats() {
        assert_eq!(CellType::parse_custom_number_format("dd/mm/yyyy", false), CellType::NumberDate1900);
        assert_eq!(CellType::parse_custom_number_format("yyyy-mm-dd hh:mm", true), CellType::NumberDateTime1904);
        assert_eq!(CellType::parse_custom_number_format("[Red]0.00", false), CellType::Number);
        assert_eq!(CellType::parse_custom_number_format("0.0\"days\"", false), CellType::Number);
        assert_eq!(CellType::parse_custom_number_format("hh:mm:ss", false), CellType::NumberTime1900);
    }
}
