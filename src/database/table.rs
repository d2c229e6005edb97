use crate::database::column::Column;
use crate::database::column::ColumnType;
use crate::database::value::Value;
use crate::error::EtlError;

/// An in-flight table: named, typed columns and rows of values in row order.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Table {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Creates a table whose column types are detected from the rows.
    pub fn from_rows(name: impl Into<String>, names: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let columns = names
            .into_iter()
            .map(|name| Column::new(name, ColumnType::Varchar))
            .collect();
        let mut table = Table {
            name: name.into(),
            columns,
            rows,
        };
        for index in 0..table.columns.len() {
            table.detect_kind(index);
        }
        table
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// Like [`Table::column_index`], failing with a schema error naming the table.
    pub fn require_column(&self, name: &str) -> Result<usize, EtlError> {
        self.column_index(name).ok_or_else(|| {
            EtlError::SchemaError(format!(
                "column '{name}' not found in table '{}' (columns: {})",
                self.name,
                self.column_names().join(", ")
            ))
        })
    }

    /// Values of one column in row order.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |row| &row[index])
    }

    /// Re-detects the type of a column from its current values.
    pub fn detect_kind(&mut self, index: usize) {
        let kind = ColumnType::detect(self.column_values(index).map(Value::kind));
        self.columns[index].kind = kind;
    }

    /// Appends a column, failing when the name is already taken.
    pub fn push_column(&mut self, name: &str, values: Vec<Value>) -> Result<(), EtlError> {
        if self.column_index(name).is_some() {
            Err(EtlError::SchemaError(format!(
                "column '{name}' already exists in table '{}'",
                self.name
            )))?
        }
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        self.columns.push(Column::new(name, ColumnType::Varchar));
        self.detect_kind(self.columns.len() - 1);
        Ok(())
    }

    /// Number of missing values per column.
    pub fn null_counts(&self) -> Vec<usize> {
        (0..self.columns.len())
            .map(|index| self.column_values(index).filter(|value| value.is_null()).count())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_types_and_appends_columns() {
        let mut table = Table::from_rows(
            "t",
            vec!["country".into(), "amount".into()],
            vec![
                vec![Value::from("Austria"), Value::BigInt(1)],
                vec![Value::from("Belgium"), Value::Double(2.5)],
                vec![Value::Null, Value::Null],
            ],
        );
        assert_eq!(table.columns[0].kind, ColumnType::Varchar);
        assert_eq!(table.columns[1].kind, ColumnType::Double);
        assert_eq!(table.null_counts(), vec![1, 1]);

        table.push_column("flag", vec![Value::Boolean(true); 3]).unwrap();
        assert_eq!(table.columns[2].kind, ColumnType::Boolean);
        assert!(matches!(table.push_column("amount", Vec::new()), Err(EtlError::SchemaError(_))));
        assert!(table.require_column("missing").unwrap_err().to_string().contains("country, amount, flag"));
    }
}
