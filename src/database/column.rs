use crate::error::EtlError;
use serde::Serialize;
use std::fmt::Display;
use thiserror::Error;

/// Errors related to column type parsing.
#[derive(Error, Debug)]
pub enum ColumnError {
    #[error("Invalid column type '{0}'")]
    TypeError(String),
}

/// Semantic types a column can hold in the in-flight table and the store.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Boolean,
    BigInt,
    Double,
    Varchar,
    /// Date and time with microsecond precision
    Timestamp,
    Date,
    Time,
}

/// A named, typed column of a table.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Column {
            name: name.into(),
            kind,
        }
    }
}

impl ColumnType {
    /// SQL type name used in `CREATE TABLE`.
    pub const fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Double => "DOUBLE",
            ColumnType::Varchar => "VARCHAR",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Date => "DATE",
            ColumnType::Time => "TIME",
        }
    }

    /// Parses a declared type, accepting SQL names and the dataframe-style
    /// aliases used by rule documents (`int`, `float`, `str`, ...).
    pub fn parse(name: &str) -> Result<Self, EtlError> {
        match name.trim().to_ascii_uppercase().as_str() {
            "BOOL" | "BOOLEAN" => Ok(Self::Boolean),
            "INT" | "INT64" | "BIGINT" | "INTEGER" => Ok(Self::BigInt),
            "FLOAT" | "FLOAT64" | "DOUBLE" | "DECIMAL" | "NUMERIC" => Ok(Self::Double),
            "STR" | "TEXT" | "STRING" | "OBJECT" | "VARCHAR" => Ok(Self::Varchar),
            "DATETIME" | "TIMESTAMP" => Ok(Self::Timestamp),
            "DATE" => Ok(Self::Date),
            "TIME" => Ok(Self::Time),
            _ => Err(ColumnError::TypeError(name.to_string()))?,
        }
    }

    /// Detects the most specific common type of a column from its non-missing values.
    /// Integers widen to doubles; anything inconsistent falls back to VARCHAR.
    pub fn detect<I>(types: I) -> ColumnType
    where
        I: IntoIterator<Item = Option<ColumnType>>,
    {
        let types: Vec<ColumnType> = types.into_iter().flatten().collect();
        if types.is_empty() {
            ColumnType::Varchar
        } else if types.iter().all(|kind| *kind == ColumnType::Boolean) {
            ColumnType::Boolean
        } else if types.iter().all(|kind| *kind == ColumnType::BigInt) {
            ColumnType::BigInt
        } else if types.iter().all(ColumnType::is_numeric) {
            ColumnType::Double
        } else if types.iter().all(|kind| *kind == ColumnType::Date) {
            ColumnType::Date
        } else if types.iter().all(|kind| *kind == ColumnType::Time) {
            ColumnType::Time
        } else if types
            .iter()
            .all(|kind| matches!(kind, ColumnType::Date | ColumnType::Timestamp))
        {
            ColumnType::Timestamp
        } else {
            ColumnType::Varchar
        }
    }

    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::BigInt | ColumnType::Double)
    }
}

impl Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_sql().to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!(ColumnType::parse("float").unwrap(), ColumnType::Double);
        assert_eq!(ColumnType::parse("Int").unwrap(), ColumnType::BigInt);
        assert_eq!(ColumnType::parse("str").unwrap(), ColumnType::Varchar);
        assert_eq!(ColumnType::parse(" bool ").unwrap(), ColumnType::Boolean);
        assert!(matches!(
            ColumnType::parse("money"),
            Err(EtlError::ColumnError(ColumnError::TypeError(_)))
        ));
    }

    #[test]
    fn detects_common_type() {
        use ColumnType::*;
        assert_eq!(ColumnType::detect(vec![Some(BigInt), None, Some(BigInt)]), BigInt);
        assert_eq!(ColumnType::detect(vec![Some(BigInt), Some(Double)]), Double);
        assert_eq!(ColumnType::detect(vec![Some(Date), Some(Timestamp)]), Timestamp);
        assert_eq!(ColumnType::detect(vec![Some(Varchar), Some(Double)]), Varchar);
        assert_eq!(ColumnType::detect(vec![None, None]), Varchar);
        assert_eq!(ColumnType::detect(Vec::new()), Varchar);
    }
}
