use crate::database::column::ColumnType;
use crate::database::table::Table;
use crate::database::value::Value;
use crate::error::EtlError;
use chrono::format::parse;
use chrono::format::Parsed;
use chrono::format::StrftimeItems;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use std::fmt::Display;
use tracing::debug;
use tracing::warn;

/// A column addressed by identifier or by 0-based position.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnRef {
    Name(String),
    Position(usize),
}

impl ColumnRef {
    pub fn resolve(&self, table: &Table) -> Result<usize, EtlError> {
        match self {
            ColumnRef::Name(name) => table.require_column(name),
            ColumnRef::Position(position) if *position < table.columns.len() => Ok(*position),
            ColumnRef::Position(position) => Err(EtlError::SchemaError(format!(
                "column position {position} is outside table '{}' with {} columns",
                table.name,
                table.columns.len()
            ))),
        }
    }
}

impl Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnRef::Name(name) => f.write_str(name),
            ColumnRef::Position(position) => write!(f, "#{position}"),
        }
    }
}

/// A cell-level fix for a known upstream data-entry error: in rows whose
/// `match_column` equals `equals`, `column` is set to `value`.
#[derive(Clone, Debug, PartialEq)]
pub struct Correction {
    pub match_column: ColumnRef,
    pub equals: Value,
    pub column: ColumnRef,
    pub value: Value,
}

impl Correction {
    /// Corrections enabled by `entry_correction: true`.
    pub fn builtin() -> Vec<Correction> {
        vec![Correction {
            match_column: ColumnRef::Position(0),
            equals: Value::from("German aid to Ukraine"),
            column: ColumnRef::Position(3),
            value: Value::Double(18.08),
        }]
    }
}

/// Replaces every cell of `column` that matches a configured literal.
pub fn replace_values(mut table: Table, column: &str, replacements: &[(Value, Value)]) -> Result<Table, EtlError> {
    let index = table.require_column(column)?;
    let mut replaced = 0usize;
    for row in table.rows.iter_mut() {
        if let Some((_, to)) = replacements.iter().find(|(from, _)| row[index].matches(from)) {
            row[index] = to.clone();
            replaced += 1;
        }
    }
    table.detect_kind(index);
    debug!(table = %table.name, column, replaced, "replaced values");
    Ok(table)
}

fn parse_boolean(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

fn to_integer(number: f64) -> Option<i64> {
    (number.is_finite() && number.fract() == 0.0 && number.abs() < 9.2e18).then_some(number as i64)
}

/// Converts one value to `kind`, `None` when it cannot be represented.
/// Missing values stay missing.
pub fn coerce_value(value: &Value, kind: ColumnType) -> Option<Value> {
    let coerced = match (kind, value) {
        (_, Value::Null) => Value::Null,
        (ColumnType::Varchar, Value::Varchar(text)) => Value::Varchar(text.to_owned()),
        (ColumnType::Varchar, value) => Value::Varchar(value.to_string()),

        (ColumnType::Boolean, Value::Boolean(flag)) => Value::Boolean(*flag),
        (ColumnType::Boolean, Value::BigInt(0)) => Value::Boolean(false),
        (ColumnType::Boolean, Value::BigInt(1)) => Value::Boolean(true),
        (ColumnType::Boolean, Value::Varchar(text)) => Value::Boolean(parse_boolean(text)?),

        (ColumnType::BigInt, Value::BigInt(number)) => Value::BigInt(*number),
        (ColumnType::BigInt, Value::Double(number)) => Value::BigInt(to_integer(*number)?),
        (ColumnType::BigInt, Value::Boolean(flag)) => Value::BigInt(*flag as i64),
        (ColumnType::BigInt, Value::Varchar(text)) => {
            let text = text.trim();
            match text.parse::<i64>() {
                Ok(number) => Value::BigInt(number),
                Err(_) => Value::BigInt(to_integer(text.parse::<f64>().ok()?)?),
            }
        }

        (ColumnType::Double, Value::BigInt(number)) => Value::Double(*number as f64),
        (ColumnType::Double, Value::Double(number)) => Value::Double(*number),
        (ColumnType::Double, Value::Boolean(flag)) => Value::Double(if *flag { 1.0 } else { 0.0 }),
        (ColumnType::Double, Value::Varchar(text)) => Value::Double(text.trim().parse::<f64>().ok()?),

        (ColumnType::Date, Value::Date(date)) => Value::Date(*date),
        (ColumnType::Date, Value::Timestamp(datetime)) => Value::Date(datetime.date()),
        (ColumnType::Date, Value::Varchar(text)) => {
            Value::Date(NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()?)
        }

        (ColumnType::Timestamp, Value::Timestamp(datetime)) => Value::Timestamp(*datetime),
        (ColumnType::Timestamp, Value::Date(date)) => Value::Timestamp(date.and_time(NaiveTime::MIN)),
        (ColumnType::Timestamp, Value::Varchar(text)) => {
            let text = text.trim();
            let datetime = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
                .ok()
                .or_else(|| {
                    NaiveDate::parse_from_str(text, "%Y-%m-%d")
                        .ok()
                        .map(|date| date.and_time(NaiveTime::MIN))
                })?;
            Value::Timestamp(datetime)
        }

        (ColumnType::Time, Value::Time(time)) => Value::Time(*time),
        (ColumnType::Time, Value::Timestamp(datetime)) => Value::Time(datetime.time()),
        (ColumnType::Time, Value::Varchar(text)) => {
            let text = text.trim();
            let time = NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
                .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
                .ok()?;
            Value::Time(time)
        }
        _ => return None,
    };
    Some(coerced)
}

/// Casts every cell of `column` to `kind`; the first cell that cannot be cast
/// fails the whole column with its row and raw value.
pub fn coerce_column(mut table: Table, column: &str, kind: ColumnType) -> Result<Table, EtlError> {
    let index = table.require_column(column)?;
    for (row, values) in table.rows.iter_mut().enumerate() {
        let coerced = coerce_value(&values[index], kind).ok_or_else(|| EtlError::TypeCoercionError {
            column: column.to_owned(),
            row,
            value: values[index].to_string(),
            target: kind.to_string(),
        })?;
        values[index] = coerced;
    }
    table.columns[index].kind = kind;
    Ok(table)
}

/// Parses text with a strftime format. Fields the format leaves out default
/// to the start of their range: "%Y" resolves to January 1st, "%H:%M" to
/// that time on 1900-01-01.
fn parse_datetime(text: &str, format: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
        return Some(datetime);
    }
    let mut parsed = Parsed::new();
    parse(&mut parsed, text, StrftimeItems::new(format)).ok()?;
    if parsed.to_naive_date().is_err() {
        let has_week = parsed.isoweek().is_some() || parsed.week_from_mon().is_some() || parsed.week_from_sun().is_some();
        if parsed.year().is_none() && parsed.year_mod_100().is_none() && parsed.isoyear().is_none() {
            parsed.set_year(1900).ok()?;
        }
        if parsed.month().is_none() && parsed.ordinal().is_none() && !has_week {
            parsed.set_month(1).ok()?;
        }
        if parsed.day().is_none() && parsed.ordinal().is_none() && !has_week {
            parsed.set_day(1).ok()?;
        }
    }
    let date = parsed.to_naive_date().ok()?;
    if parsed.hour_div_12().is_none() && parsed.hour_mod_12().is_none() {
        return Some(date.and_time(NaiveTime::MIN));
    }
    if parsed.minute().is_none() {
        parsed.set_minute(0).ok()?;
    }
    parsed.to_naive_time().ok().map(|time| date.and_time(time))
}

/// Parses every cell of `column` into a timestamp using `format`.
/// Cells already holding dates or timestamps are kept as they are.
pub fn parse_datetime_column(mut table: Table, column: &str, format: &str) -> Result<Table, EtlError> {
    let index = table.require_column(column)?;
    for (row, values) in table.rows.iter_mut().enumerate() {
        let parsed = match &values[index] {
            Value::Null => Some(Value::Null),
            Value::Timestamp(datetime) => Some(Value::Timestamp(*datetime)),
            Value::Date(date) => Some(Value::Timestamp(date.and_time(NaiveTime::MIN))),
            Value::Boolean(_) | Value::Time(_) => None,
            other => parse_datetime(&other.to_string(), format).map(Value::Timestamp),
        };
        values[index] = parsed.ok_or_else(|| EtlError::TypeCoercionError {
            column: column.to_owned(),
            row,
            value: values[index].to_string(),
            target: format!("datetime '{format}'"),
        })?;
    }
    table.columns[index].kind = ColumnType::Timestamp;
    Ok(table)
}

/// Replaces missing cells of `column` with the nearest preceding value.
/// The first row must hold a value. The column keeps its type.
pub fn forward_fill(mut table: Table, column: &str) -> Result<Table, EtlError> {
    let index = table.require_column(column)?;
    if table.rows.first().is_some_and(|row| row[index].is_null()) {
        Err(EtlError::DataIntegrityError(format!(
            "cannot forward-fill column '{column}' of table '{}': the first row is missing",
            table.name
        )))?
    }
    let mut last = Value::Null;
    for row in table.rows.iter_mut() {
        if row[index].is_null() {
            row[index] = last.clone();
        } else {
            last = row[index].clone();
        }
    }
    Ok(table)
}

/// Applies cell-level corrections, coercing each value to the column's
/// current type. Reapplying them changes nothing.
pub fn apply_corrections(mut table: Table, corrections: &[Correction]) -> Result<Table, EtlError> {
    for correction in corrections {
        let match_index = correction.match_column.resolve(&table)?;
        let index = correction.column.resolve(&table)?;
        let (name, kind) = (table.columns[index].name.to_owned(), table.columns[index].kind);
        let mut corrected = 0usize;
        for (row, values) in table.rows.iter_mut().enumerate() {
            if values[match_index].matches(&correction.equals) {
                values[index] = coerce_value(&correction.value, kind).ok_or_else(|| EtlError::TypeCoercionError {
                    column: name.to_owned(),
                    row,
                    value: correction.value.to_string(),
                    target: kind.to_string(),
                })?;
                corrected += 1;
            }
        }
        if corrected == 0 {
            warn!(
                table = %table.name,
                column = %correction.match_column,
                value = %correction.equals,
                "correction matched no row"
            );
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(name: &str, values: Vec<Value>) -> Table {
        Table::from_rows("t", vec![name.to_owned()], values.into_iter().map(|value| vec![value]).collect())
    }

    fn column(table: &Table) -> Vec<Value> {
        table.column_values(0).cloned().collect()
    }

    #[test]
    fn substitutes_placeholders_before_coercion() {
        let table = single("financial", vec![Value::from("."), Value::from("5"), Value::from("3.2")]);
        let table = replace_values(table, "financial", &[(Value::from("."), Value::BigInt(0))]).unwrap();
        let table = coerce_column(table, "financial", ColumnType::Double).unwrap();
        assert_eq!(column(&table), vec![Value::Double(0.0), Value::Double(5.0), Value::Double(3.2)]);
        assert_eq!(table.columns[0].kind, ColumnType::Double);
    }

    #[test]
    fn null_literal_fills_missing_cells() {
        let table = single("a", vec![Value::Null, Value::BigInt(0), Value::Double(2.0)]);
        let table = replace_values(
            table,
            "a",
            &[(Value::Null, Value::BigInt(-1)), (Value::BigInt(2), Value::BigInt(20))],
        )
        .unwrap();
        assert_eq!(column(&table), vec![Value::BigInt(-1), Value::BigInt(0), Value::BigInt(20)]);
        assert_eq!(table.columns[0].kind, ColumnType::BigInt);
    }

    #[test]
    fn coercion_failure_names_column_row_and_value() {
        let table = single("amount", vec![Value::from("1"), Value::from("n/a")]);
        match coerce_column(table, "amount", ColumnType::BigInt).unwrap_err() {
            EtlError::TypeCoercionError { column, row, value, target } => {
                assert_eq!((column.as_str(), row, value.as_str(), target.as_str()), ("amount", 1, "n/a", "bigint"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn coerces_between_types() {
        assert_eq!(coerce_value(&Value::Double(3.0), ColumnType::BigInt), Some(Value::BigInt(3)));
        assert_eq!(coerce_value(&Value::Double(3.5), ColumnType::BigInt), None);
        assert_eq!(coerce_value(&Value::from("3.0"), ColumnType::BigInt), Some(Value::BigInt(3)));
        assert_eq!(coerce_value(&Value::BigInt(7), ColumnType::Varchar), Some(Value::from("7")));
        assert_eq!(coerce_value(&Value::from("Yes"), ColumnType::Boolean), Some(Value::Boolean(true)));
        assert_eq!(coerce_value(&Value::BigInt(2), ColumnType::Boolean), None);
        assert_eq!(coerce_value(&Value::Null, ColumnType::Double), Some(Value::Null));
    }

    #[test]
    fn parses_datetimes_with_format() {
        let table = single("month", vec![Value::from("February 2022"), Value::Null, Value::from("March 2022")]);
        let table = parse_datetime_column(table, "month", "%B %Y").unwrap();
        let expected = |m| Value::Timestamp(NaiveDate::from_ymd_opt(2022, m, 1).unwrap().and_time(NaiveTime::MIN));
        assert_eq!(column(&table), vec![expected(2), Value::Null, expected(3)]);
        assert_eq!(table.columns[0].kind, ColumnType::Timestamp);

        let table = single("year", vec![Value::BigInt(2022), Value::from("2023")]);
        let table = parse_datetime_column(table, "year", "%Y").unwrap();
        let january = |y| Value::Timestamp(NaiveDate::from_ymd_opt(y, 1, 1).unwrap().and_time(NaiveTime::MIN));
        assert_eq!(column(&table), vec![january(2022), january(2023)]);

        let table = parse_datetime_column(single("month", vec![Value::from("03/2022")]), "month", "%m/%Y").unwrap();
        assert_eq!(column(&table), vec![expected(3)]);

        let table = parse_datetime_column(single("at", vec![Value::from("18:30")]), "at", "%H:%M").unwrap();
        let evening = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap().and_hms_opt(18, 30, 0).unwrap();
        assert_eq!(column(&table), vec![Value::Timestamp(evening)]);

        let table = single("day", vec![Value::from("24.02.2022")]);
        assert!(parse_datetime_column(table.clone(), "day", "%d.%m.%Y").is_ok());
        let error = parse_datetime_column(table, "day", "%Y-%m-%d").unwrap_err();
        assert!(matches!(error, EtlError::TypeCoercionError { row: 0, .. }));
    }

    #[test]
    fn forward_fill_is_idempotent() {
        let table = single("country", vec![Value::from("Austria"), Value::Null, Value::from("Belgium"), Value::Null]);
        let once = forward_fill(table, "country").unwrap();
        assert_eq!(
            column(&once),
            vec![Value::from("Austria"), Value::from("Austria"), Value::from("Belgium"), Value::from("Belgium")]
        );
        let twice = forward_fill(once.clone(), "country").unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn forward_fill_requires_first_value() {
        let table = single("country", vec![Value::Null, Value::from("Austria")]);
        assert!(matches!(forward_fill(table, "country"), Err(EtlError::DataIntegrityError(_))));
        assert!(forward_fill(single("country", vec![]), "country").is_ok());
        assert!(matches!(forward_fill(single("a", vec![]), "b"), Err(EtlError::SchemaError(_))));
    }

    #[test]
    fn builtin_correction_is_idempotent() {
        let table = Table::from_rows(
            "b_allocations",
            vec!["item".into(), "a".into(), "b".into(), "total".into()],
            vec![
                vec![Value::from("German aid to Ukraine"), Value::Null, Value::Null, Value::Double(1.0)],
                vec![Value::from("Other"), Value::Null, Value::Null, Value::Double(2.0)],
            ],
        );
        let once = apply_corrections(table, &Correction::builtin()).unwrap();
        assert_eq!(once.rows[0][3], Value::Double(18.08));
        assert_eq!(once.rows[1][3], Value::Double(2.0));
        let twice = apply_corrections(once.clone(), &Correction::builtin()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn corrections_and_fills_keep_the_declared_type() {
        let table = Table::from_rows(
            "b_allocations",
            vec!["item".into(), "a".into(), "b".into(), "n".into()],
            vec![
                vec![Value::from("German aid to Ukraine"), Value::Null, Value::Null, Value::from("3")],
                vec![Value::from("Other"), Value::Null, Value::Null, Value::Null],
            ],
        );
        let table = coerce_column(table, "n", ColumnType::BigInt).unwrap();
        let filled = forward_fill(table.clone(), "n").unwrap();
        assert_eq!(filled.columns[3].kind, ColumnType::BigInt);
        assert_eq!(filled.rows[1][3], Value::BigInt(3));

        match apply_corrections(table.clone(), &Correction::builtin()).unwrap_err() {
            EtlError::TypeCoercionError { column, row, value, target } => {
                assert_eq!((column.as_str(), row, value.as_str(), target.as_str()), ("n", 0, "18.08", "bigint"));
            }
            other => panic!("unexpected error {other}"),
        }

        let integral = Correction {
            value: Value::Double(18.0),
            ..Correction::builtin().remove(0)
        };
        let corrected = apply_corrections(table, &[integral]).unwrap();
        assert_eq!(corrected.columns[3].kind, ColumnType::BigInt);
        assert_eq!(corrected.rows[0][3], Value::BigInt(18));
    }

    #[test]
    fn correction_outside_table_is_schema_error() {
        let table = single("item", vec![Value::from("German aid to Ukraine")]);
        assert!(matches!(
            apply_corrections(table, &Correction::builtin()),
            Err(EtlError::SchemaError(_))
        ));
    }
}
