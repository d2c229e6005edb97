use crate::database::column::ColumnType;
use crate::error::EtlError;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use chrono::Timelike;
use duckdb::types::TimeUnit;
use duckdb::types::Value as SqlValue;
use std::fmt::Display;

/// A single typed cell of an in-flight table.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// Missing value, written as SQL NULL
    #[default]
    Null,
    Boolean(bool),
    BigInt(i64),
    Double(f64),
    Varchar(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Time(NaiveTime),
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Column type this value naturally belongs to; `None` for missing values.
    pub fn kind(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(ColumnType::Boolean),
            Value::BigInt(_) => Some(ColumnType::BigInt),
            Value::Double(_) => Some(ColumnType::Double),
            Value::Varchar(_) => Some(ColumnType::Varchar),
            Value::Date(_) => Some(ColumnType::Date),
            Value::Timestamp(_) => Some(ColumnType::Timestamp),
            Value::Time(_) => Some(ColumnType::Time),
        }
    }

    /// Literal comparison used by value substitution and corrections.
    /// Integers and doubles compare numerically; everything else compares exactly.
    pub fn matches(&self, literal: &Value) -> bool {
        match (self, literal) {
            (Value::BigInt(a), Value::Double(b)) | (Value::Double(b), Value::BigInt(a)) => {
                (*a as f64) == *b
            }
            _ => self == literal,
        }
    }

    /// Canonical text of the value for equality joins; `None` for missing values.
    /// `5` and `5.0` share a key.
    pub fn join_key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Double(number) if number.fract() == 0.0 && number.abs() < 9.0e15 => {
                Some((*number as i64).to_string())
            }
            _ => Some(self.to_string()),
        }
    }

    /// Converts the value into the DuckDB representation of a column of type `kind`.
    pub fn to_sql_value(&self, kind: ColumnType) -> Result<SqlValue, EtlError> {
        let value = match (kind, self) {
            (_, Value::Null) => SqlValue::Null,
            (ColumnType::Varchar, value) => SqlValue::Text(value.to_string()),
            (ColumnType::Boolean, Value::Boolean(flag)) => SqlValue::Boolean(*flag),
            (ColumnType::BigInt, Value::BigInt(number)) => SqlValue::BigInt(*number),
            (ColumnType::Double, Value::BigInt(number)) => SqlValue::Double(*number as f64),
            (ColumnType::Double, Value::Double(number)) => SqlValue::Double(*number),
            (ColumnType::Date, Value::Date(date)) => SqlValue::Date32(days_since_epoch(date)?),
            (ColumnType::Date, Value::Timestamp(datetime)) => {
                SqlValue::Date32(days_since_epoch(&datetime.date())?)
            }
            (ColumnType::Timestamp, Value::Timestamp(datetime)) => {
                SqlValue::Timestamp(TimeUnit::Microsecond, datetime.and_utc().timestamp_micros())
            }
            (ColumnType::Timestamp, Value::Date(date)) => {
                let datetime = date.and_time(NaiveTime::MIN);
                SqlValue::Timestamp(TimeUnit::Microsecond, datetime.and_utc().timestamp_micros())
            }
            (ColumnType::Time, Value::Time(time)) => {
                let micros = time.num_seconds_from_midnight() as i64 * 1_000_000
                    + (time.nanosecond() / 1_000) as i64;
                SqlValue::Time64(TimeUnit::Microsecond, micros)
            }
            (kind, value) => Err(EtlError::DataIntegrityError(format!(
                "value '{value}' does not fit a {kind} column"
            )))?,
        };
        Ok(value)
    }

    /// Converts a value read back from DuckDB.
    pub fn from_sql_value(value: SqlValue) -> Result<Value, EtlError> {
        let value = match value {
            SqlValue::Null => Value::Null,
            SqlValue::Boolean(flag) => Value::Boolean(flag),
            SqlValue::TinyInt(number) => Value::BigInt(number as i64),
            SqlValue::SmallInt(number) => Value::BigInt(number as i64),
            SqlValue::Int(number) => Value::BigInt(number as i64),
            SqlValue::BigInt(number) => Value::BigInt(number),
            SqlValue::UTinyInt(number) => Value::BigInt(number as i64),
            SqlValue::USmallInt(number) => Value::BigInt(number as i64),
            SqlValue::UInt(number) => Value::BigInt(number as i64),
            SqlValue::Float(number) => Value::Double(number as f64),
            SqlValue::Double(number) => Value::Double(number),
            SqlValue::Text(text) => Value::Varchar(text),
            SqlValue::Date32(days) => Value::Date(epoch() + Duration::days(days as i64)),
            SqlValue::Timestamp(unit, amount) => {
                let micros = to_micros(unit, amount);
                let datetime = chrono::DateTime::from_timestamp_micros(micros)
                    .ok_or_else(|| EtlError::DataIntegrityError(format!("timestamp {micros} out of range")))?;
                Value::Timestamp(datetime.naive_utc())
            }
            SqlValue::Time64(unit, amount) => {
                let micros = to_micros(unit, amount);
                let time = NaiveTime::from_num_seconds_from_midnight_opt(
                    (micros / 1_000_000) as u32,
                    ((micros % 1_000_000) * 1_000) as u32,
                )
                .ok_or_else(|| EtlError::DataIntegrityError(format!("time {micros} out of range")))?;
                Value::Time(time)
            }
            other => Err(EtlError::SchemaError(format!(
                "unsupported store value {other:?}"
            )))?,
        };
        Ok(value)
    }
}

fn days_since_epoch(date: &NaiveDate) -> Result<i32, EtlError> {
    i32::try_from((*date - epoch()).num_days())
        .map_err(|_| EtlError::DataIntegrityError(format!("date {date} out of range")))
}

fn to_micros(unit: TimeUnit, amount: i64) -> i64 {
    match unit {
        TimeUnit::Second => amount * 1_000_000,
        TimeUnit::Millisecond => amount * 1_000,
        TimeUnit::Microsecond => amount,
        TimeUnit::Nanosecond => amount / 1_000,
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Boolean(flag) => write!(f, "{flag}"),
            Value::BigInt(number) => write!(f, "{number}"),
            Value::Double(number) => write!(f, "{number}"),
            Value::Varchar(text) => f.write_str(text),
            Value::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Value::Timestamp(datetime) => write!(f, "{}", datetime.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::Time(time) => write!(f, "{}", time.format("%H:%M:%S%.f")),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Varchar(text.to_owned())
    }
}

impl From<i64> for Value {
    fn from(number: i64) -> Self {
        Value::BigInt(number)
    }
}

impl From<f64> for Value {
    fn from(number: f64) -> Self {
        Value::Double(number)
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Boolean(flag)
    }
}
