use crate::database::column::Column;
use crate::database::column::ColumnType;
use crate::database::table::Table;
use crate::database::value::Value;
use crate::error::EtlError;

/// Unpivot settings: `value_vars` columns become (`var_name`, `value_name`) row pairs.
#[derive(Clone, Debug, PartialEq)]
pub struct Melt {
    pub id_vars: Vec<String>,
    pub value_vars: Vec<String>,
    pub var_name: String,
    pub value_name: String,
}

impl Melt {
    /// Checks the settings without looking at a table.
    pub fn validate(&self) -> Result<(), EtlError> {
        if self.value_vars.is_empty() {
            Err(EtlError::SchemaError("melt needs at least one value column".to_owned()))?
        }
        if let Some(both) = self.id_vars.iter().find(|id| self.value_vars.contains(id)) {
            Err(EtlError::SchemaError(format!(
                "column '{both}' is listed as both identifier and value column"
            )))?
        }
        if self.var_name == self.value_name {
            Err(EtlError::SchemaError(format!(
                "melt output columns are both named '{}'",
                self.var_name
            )))?
        }
        for output in [&self.var_name, &self.value_name] {
            if self.id_vars.contains(output) {
                Err(EtlError::SchemaError(format!(
                    "melt output column '{output}' collides with an identifier column"
                )))?
            }
        }
        Ok(())
    }
}

/// Produces one row per (input row, value column) pair, value column major:
/// all rows for the first value column come first.
pub fn melt(table: Table, melt: &Melt) -> Result<Table, EtlError> {
    melt.validate()?;
    let id_indexes = melt
        .id_vars
        .iter()
        .map(|name| table.require_column(name))
        .collect::<Result<Vec<_>, _>>()?;
    let value_indexes = melt
        .value_vars
        .iter()
        .map(|name| table.require_column(name))
        .collect::<Result<Vec<_>, _>>()?;

    let mut columns: Vec<Column> = id_indexes
        .iter()
        .map(|index| table.columns[*index].clone())
        .collect();
    columns.push(Column::new(&melt.var_name, ColumnType::Varchar));
    columns.push(Column::new(&melt.value_name, ColumnType::Varchar));

    let mut reshaped = Table::new(table.name.to_owned(), columns);
    reshaped.rows.reserve(table.len() * value_indexes.len());
    for (variable, value_index) in melt.value_vars.iter().zip(&value_indexes) {
        for row in &table.rows {
            let mut output: Vec<Value> = id_indexes.iter().map(|index| row[*index].clone()).collect();
            output.push(Value::Varchar(variable.to_owned()));
            output.push(row[*value_index].clone());
            reshaped.rows.push(output);
        }
    }
    let value_column = reshaped.columns.len() - 1;
    reshaped.detect_kind(value_column);
    Ok(reshaped)
}
