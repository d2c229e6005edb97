use crate::database::column::ColumnType;
use crate::database::table::Table;
use crate::database::value::Value;
use crate::error::EtlError;
use crate::error::ResultMessage;
use crate::transform::enrich::LookupSource;
use duckdb::Connection;
use serde::Serialize;
use std::path::Path;
use tracing::debug;
use tracing::info;

/// Shape of a table present in the store.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub rows: u64,
    pub columns: Vec<ColumnSummary>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub data_type: String,
}

/// Exclusive session against the analytical store, held for a whole run.
/// Dropping the session closes the connection.
pub struct Store {
    connection: Connection,
    location: String,
}

pub(crate) fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn build_create_table_sql(table: &Table) -> String {
    let columns = table
        .columns
        .iter()
        .map(|column| format!("{} {}", quote_identifier(&column.name), column.kind.as_sql()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({columns})", quote_identifier(&table.name))
}

impl Store {
    /// Opens (or creates) a single-file database.
    pub fn open(path: &Path) -> Result<Self, EtlError> {
        let location = path.display().to_string();
        let connection = Connection::open(path)
            .map_err(EtlError::from)
            .with_prefix(&format!("Opening database '{location}'"))?;
        debug!(database = %location, "opened store");
        Ok(Store { connection, location })
    }

    pub fn in_memory() -> Result<Self, EtlError> {
        Ok(Store {
            connection: Connection::open_in_memory()?,
            location: ":memory:".to_owned(),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Atomically replaces the table named after `table`: drop, create and bulk
    /// append run in one transaction, so a failure keeps the previous table.
    pub fn replace_table(&mut self, table: &Table) -> Result<usize, EtlError> {
        let transaction = self.connection.transaction()?;
        transaction.execute_batch(&format!(
            "DROP TABLE IF EXISTS {}; {};",
            quote_identifier(&table.name),
            build_create_table_sql(table)
        ))?;
        {
            let mut appender = transaction.appender(&table.name)?;
            for (index, row) in table.rows.iter().enumerate() {
                let values = row
                    .iter()
                    .zip(&table.columns)
                    .map(|(value, column)| value.to_sql_value(column.kind))
                    .collect::<Result<Vec<_>, _>>()
                    .with_prefix(&format!("Writing row {index} of '{}'", table.name))?;
                appender.append_row(duckdb::appender_params_from_iter(&values))?;
            }
            appender.flush()?;
        }
        transaction.commit()?;
        info!(table = %table.name, rows = table.len(), columns = table.columns.len(), "replaced table");
        Ok(table.len())
    }

    pub fn table_exists(&self, name: &str) -> Result<bool, EtlError> {
        let count: i64 = self.connection.query_row(
            "SELECT count(*) FROM information_schema.tables WHERE table_schema = 'main' AND table_name = ?",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Column names and SQL types of a table in declaration order.
    pub fn table_columns(&self, name: &str) -> Result<Vec<ColumnSummary>, EtlError> {
        let mut statement = self.connection.prepare(
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_schema = 'main' AND table_name = ? ORDER BY ordinal_position",
        )?;
        let columns = statement
            .query_map([name], |row| {
                Ok(ColumnSummary {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    /// Every table of the main schema with its row count and columns, sorted by name.
    pub fn list_tables(&self) -> Result<Vec<TableSummary>, EtlError> {
        let names = {
            let mut statement = self.connection.prepare(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = 'main' ORDER BY table_name",
            )?;
            let names = statement
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            names
        };
        names
            .into_iter()
            .map(|name| {
                let rows: i64 = self.connection.query_row(
                    &format!("SELECT count(*) FROM {}", quote_identifier(&name)),
                    [],
                    |row| row.get(0),
                )?;
                Ok(TableSummary {
                    columns: self.table_columns(&name)?,
                    rows: rows as u64,
                    name,
                })
            })
            .collect()
    }

    /// Reads the given columns of a stored table in storage order.
    pub fn read_columns(&self, table: &str, columns: &[String]) -> Result<Vec<Vec<Value>>, EtlError> {
        let projection = columns
            .iter()
            .map(|column| quote_identifier(column))
            .collect::<Vec<_>>()
            .join(", ");
        let mut statement = self
            .connection
            .prepare(&format!("SELECT {projection} FROM {}", quote_identifier(table)))?;
        let mut rows = statement.query([])?;
        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Vec::with_capacity(columns.len());
            for index in 0..columns.len() {
                record.push(Value::from_sql_value(row.get::<_, duckdb::types::Value>(index)?)?);
            }
            values.push(record);
        }
        Ok(values)
    }

    /// Reads a whole stored table back into memory.
    pub fn read_table(&self, name: &str) -> Result<Table, EtlError> {
        let names: Vec<String> = self
            .table_columns(name)?
            .into_iter()
            .map(|column| column.name)
            .collect();
        if names.is_empty() {
            Err(EtlError::SourceNotFoundError(format!("table '{name}' not found in '{}'", self.location)))?
        }
        let rows = self.read_columns(name, &names)?;
        let mut table = Table::from_rows(name, names, rows);
        for (column, summary) in table.columns.iter_mut().zip(self.table_columns(name)?) {
            if let Ok(kind) = ColumnType::parse(&summary.data_type) {
                column.kind = kind;
            }
        }
        Ok(table)
    }

    /// Closes the session, surfacing errors a plain drop would swallow.
    pub fn close(self) -> Result<(), EtlError> {
        self.connection.close().map_err(|(_, error)| EtlError::from(error))
    }
}

impl LookupSource for Store {
    fn columns(&self, table: &str) -> Result<Option<Vec<String>>, EtlError> {
        if !self.table_exists(table)? {
            return Ok(None);
        }
        let names = self
            .table_columns(table)?
            .into_iter()
            .map(|column| column.name)
            .collect();
        Ok(Some(names))
    }

    fn fetch(&self, table: &str, columns: &[String]) -> Result<Vec<Vec<Value>>, EtlError> {
        self.read_columns(table, columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::column::Column;
    use chrono::NaiveDate;

    fn allocations(amounts: &[f64]) -> Table {
        let mut table = Table::new(
            "c_allocated_over_time",
            vec![
                Column::new("month", ColumnType::Date),
                Column::new("allocated_eur_bn", ColumnType::Double),
            ],
        );
        for (index, amount) in amounts.iter().enumerate() {
            let date = NaiveDate::from_ymd_opt(2022, index as u32 + 1, 1).unwrap();
            table.rows.push(vec![Value::Date(date), Value::Double(*amount)]);
        }
        table
    }

    #[test]
    fn replaces_tables_without_accumulating() {
        let mut store = Store::in_memory().unwrap();
        store.replace_table(&allocations(&[1.0, 2.0])).unwrap();
        store.replace_table(&allocations(&[3.0, 4.0, 5.5])).unwrap();

        let table = store.read_table("c_allocated_over_time").unwrap();
        assert_eq!(table, allocations(&[3.0, 4.0, 5.5]));
        let tables = store.list_tables().unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows, 3);
        assert_eq!(tables[0].columns[1].data_type, "DOUBLE");
    }

    #[test]
    fn failed_replacement_keeps_previous_table() {
        let mut store = Store::in_memory().unwrap();
        store.replace_table(&allocations(&[1.0])).unwrap();

        let mut broken = allocations(&[2.0]);
        broken.rows.push(vec![Value::from("not a date"), Value::Double(3.0)]);
        assert!(store.replace_table(&broken).is_err());

        let table = store.read_table("c_allocated_over_time").unwrap();
        assert_eq!(table, allocations(&[1.0]));
    }

    #[test]
    fn quotes_unusual_identifiers() {
        let mut store = Store::in_memory().unwrap();
        let mut table = Table::new("e_allocations_refugees_€", vec![Column::new("select", ColumnType::Varchar)]);
        table.rows.push(vec![Value::from("Poland")]);
        store.replace_table(&table).unwrap();
        assert!(store.table_exists("e_allocations_refugees_€").unwrap());
        assert_eq!(
            store.columns("e_allocations_refugees_€").unwrap(),
            Some(vec!["select".to_owned()])
        );
        assert_eq!(store.columns("missing").unwrap(), None);
        assert_eq!(
            store.fetch("e_allocations_refugees_€", &["select".to_owned()]).unwrap(),
            vec![vec![Value::from("Poland")]]
        );
    }

    #[test]
    fn persists_to_file() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("tracker.duckdb");
        let mut store = Store::open(&path).unwrap();
        store.replace_table(&allocations(&[1.0])).unwrap();
        store.close().unwrap();

        let store = Store::open(&path).unwrap();
        assert_eq!(store.read_table("c_allocated_over_time").unwrap(), allocations(&[1.0]));
    }
}
