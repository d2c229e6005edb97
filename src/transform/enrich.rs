use crate::database::table::Table;
use crate::database::value::Value;
use crate::error::EtlError;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

static AND: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\s+and\s+").expect("Hardcode regex pattern"));

/// Optionally qualified, optionally quoted column name
static OPERAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?:(?:"([^"]+)"|([\w€$£%]+))\.)?(?:"([^"]+)"|([\w€$£%]+))$"#).expect("Hardcode regex pattern")
});

/// Read access to tables already persisted in the store.
pub trait LookupSource {
    /// Column names of a stored table, `None` when the table does not exist.
    fn columns(&self, table: &str) -> Result<Option<Vec<String>>, EtlError>;

    /// The given columns of every row of a stored table.
    fn fetch(&self, table: &str, columns: &[String]) -> Result<Vec<Vec<Value>>, EtlError>;
}

/// Appends `column` to the in-flight table, taking `source_column` from the
/// first row of `source_table` whose key columns equal the in-flight key columns.
#[derive(Clone, Debug, PartialEq)]
pub struct Enrichment {
    pub column: String,
    pub source_table: String,
    pub source_column: String,
    /// (in-flight column, source column) equality pairs
    pub keys: Vec<(String, String)>,
}

/// Parses a join predicate made only of column equalities joined by `AND`,
/// e.g. `country = zz_country_lookup.country_name`. The left side of each
/// equality names an in-flight column, the right side a column of `source_table`;
/// a side qualified with `source_table` swaps the two.
pub fn parse_join_predicate(predicate: &str, source_table: &str) -> Result<Vec<(String, String)>, EtlError> {
    let invalid = |reason: &str| EtlError::ConfigurationError(format!("join predicate '{predicate}' {reason}"));
    let parse_operand = |text: &str| {
        let captures = OPERAND.captures(text.trim())?;
        let qualifier = captures.get(1).or_else(|| captures.get(2)).map(|matcher| matcher.as_str());
        let name = captures.get(3).or_else(|| captures.get(4))?.as_str();
        let starts_with_digit = name.chars().next().is_some_and(|c| c.is_ascii_digit());
        (!starts_with_digit).then(|| (qualifier.map(str::to_owned), name.to_owned()))
    };

    if predicate.trim().is_empty() {
        return Err(invalid("is empty"));
    }
    let mut keys = Vec::new();
    for clause in AND.split(predicate.trim()) {
        let ((left_qualifier, left), (right_qualifier, right)) = clause
            .split_once('=')
            .filter(|(_, right)| !right.contains('='))
            .and_then(|(left, right)| parse_operand(left).zip(parse_operand(right)))
            .ok_or_else(|| invalid("may only contain column equalities joined by AND"))?;
        let key = match (left_qualifier, right_qualifier) {
            (Some(qualifier), _) if qualifier == source_table => (right, left),
            (_, Some(qualifier)) if qualifier != source_table => {
                return Err(invalid(&format!("references table '{qualifier}' instead of '{source_table}'")));
            }
            _ => (left, right),
        };
        keys.push(key);
    }
    Ok(keys)
}

/// Left-outer lookup: every in-flight row is kept, rows without a match get a
/// missing value. Rows with a missing key never match.
pub fn enrich(mut table: Table, enrichment: &Enrichment, source: &dyn LookupSource) -> Result<Table, EtlError> {
    if table.column_index(&enrichment.column).is_some() {
        Err(EtlError::SchemaError(format!(
            "enrichment column '{}' already exists in table '{}'",
            enrichment.column, table.name
        )))?
    }
    let left_indexes = enrichment
        .keys
        .iter()
        .map(|(left, _)| table.require_column(left))
        .collect::<Result<Vec<_>, _>>()?;

    let available = source.columns(&enrichment.source_table)?.ok_or_else(|| {
        EtlError::DependencyOrderError {
            entry: table.name.to_owned(),
            table: enrichment.source_table.to_owned(),
            reason: "which is not loaded".to_owned(),
        }
    })?;
    let mut projection: Vec<String> = enrichment.keys.iter().map(|(_, right)| right.to_owned()).collect();
    projection.push(enrichment.source_column.to_owned());
    if let Some(missing) = projection.iter().find(|column| !available.contains(column)) {
        Err(EtlError::SchemaError(format!(
            "column '{missing}' not found in table '{}' (columns: {})",
            enrichment.source_table,
            available.join(", ")
        )))?
    }

    let mut lookup = HashMap::<Vec<String>, Value>::new();
    for mut record in source.fetch(&enrichment.source_table, &projection)? {
        let value = record.pop().unwrap_or_default();
        let Some(key) = record.iter().map(Value::join_key).collect::<Option<Vec<_>>>() else {
            continue;
        };
        match lookup.get(&key) {
            Some(existing) if *existing != value => Err(EtlError::DataIntegrityError(format!(
                "table '{}' maps key ({}) to both '{existing}' and '{value}'",
                enrichment.source_table,
                key.join(", ")
            )))?,
            Some(_) => (),
            None => {
                lookup.insert(key, value);
            }
        }
    }

    let mut matched = 0usize;
    let values: Vec<Value> = table
        .rows
        .iter()
        .map(|row| {
            left_indexes
                .iter()
                .map(|index| row[*index].join_key())
                .collect::<Option<Vec<_>>>()
                .and_then(|key| lookup.get(&key).cloned())
                .inspect(|_| matched += 1)
                .unwrap_or_default()
        })
        .collect();
    table.push_column(&enrichment.column, values)?;
    debug!(
        table = %table.name,
        column = %enrichment.column,
        source = %enrichment.source_table,
        matched,
        rows = table.len(),
        "enriched table"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct Tables(BTreeMap<String, Table>);

    impl LookupSource for Tables {
        fn columns(&self, table: &str) -> Result<Option<Vec<String>>, EtlError> {
            Ok(self.0.get(table).map(|table| {
                table.column_names().into_iter().map(str::to_owned).collect()
            }))
        }

        fn fetch(&self, table: &str, columns: &[String]) -> Result<Vec<Vec<Value>>, EtlError> {
            let table = &self.0[table];
            let indexes: Vec<usize> = columns.iter().map(|name| table.column_index(name).unwrap()).collect();
            Ok(table
                .rows
                .iter()
                .map(|row| indexes.iter().map(|index| row[*index].clone()).collect())
                .collect())
        }
    }

    fn lookup(rows: Vec<(&str, &str)>) -> Tables {
        let table = Table::from_rows(
            "zz_country_lookup",
            vec!["country_name".into(), "iso3_code".into()],
            rows.into_iter()
                .map(|(name, code)| vec![Value::from(name), Value::from(code)])
                .collect(),
        );
        let mut tables = Tables::default();
        tables.0.insert(table.name.to_owned(), table);
        tables
    }

    fn iso3() -> Enrichment {
        Enrichment {
            column: "iso3_code".into(),
            source_table: "zz_country_lookup".into(),
            source_column: "iso3_code".into(),
            keys: vec![("country".into(), "country_name".into())],
        }
    }

    fn donors(names: Vec<Option<&str>>) -> Table {
        Table::from_rows(
            "b_allocations",
            vec!["country".into()],
            names.into_iter().map(|name| vec![name.map(Value::from).unwrap_or_default()]).collect(),
        )
    }

    #[test]
    fn keeps_every_row_and_nulls_misses() {
        let source = lookup(vec![("Austria", "AUT"), ("Belgium", "BEL")]);
        let table = enrich(donors(vec![Some("Belgium"), Some("EU institutions"), None, Some("Austria")]), &iso3(), &source).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(
            table.column_values(1).cloned().collect::<Vec<_>>(),
            vec![Value::from("BEL"), Value::Null, Value::Null, Value::from("AUT")]
        );
    }

    #[test]
    fn missing_source_table_is_dependency_error() {
        let error = enrich(donors(vec![Some("Austria")]), &iso3(), &Tables::default()).unwrap_err();
        assert!(matches!(error, EtlError::DependencyOrderError { .. }));
    }

    #[test]
    fn ambiguous_keys_are_integrity_errors() {
        let source = lookup(vec![("Austria", "AUT"), ("Austria", "AUS")]);
        let error = enrich(donors(vec![Some("Austria")]), &iso3(), &source).unwrap_err();
        assert!(matches!(error, EtlError::DataIntegrityError(_)));

        let source = lookup(vec![("Austria", "AUT"), ("Austria", "AUT")]);
        assert!(enrich(donors(vec![Some("Austria")]), &iso3(), &source).is_ok());
    }

    #[test]
    fn unknown_columns_are_schema_errors() {
        let source = lookup(vec![("Austria", "AUT")]);
        let mut enrichment = iso3();
        enrichment.source_column = "gdp".into();
        assert!(matches!(enrich(donors(vec![]), &enrichment, &source), Err(EtlError::SchemaError(_))));
        let mut enrichment = iso3();
        enrichment.column = "country".into();
        assert!(matches!(enrich(donors(vec![]), &enrichment, &source), Err(EtlError::SchemaError(_))));
    }

    #[test]
    fn parses_equality_predicates() {
        let keys = parse_join_predicate(
            "country = zz_country_lookup.country_name AND zz_country_lookup.year = t.year",
            "zz_country_lookup",
        )
        .unwrap();
        assert_eq!(
            keys,
            vec![
                ("country".to_owned(), "country_name".to_owned()),
                ("year".to_owned(), "year".to_owned())
            ]
        );
    }

    #[test]
    fn rejects_anything_but_equalities() {
        for predicate in [
            "",
            "country = country_name OR 1 = 1",
            "amount > 5",
            "lower(country) = country_name",
            "country <= country_name",
            "1 = 1",
            "country = other_table.country_name",
        ] {
            let error = parse_join_predicate(predicate, "zz_country_lookup").unwrap_err();
            assert!(matches!(error, EtlError::ConfigurationError(_)), "{predicate}");
        }
    }
}
