//! # Table Transforms
//!
//! Every stage is a function from an in-flight table and its configuration to
//! a new table. A rule entry runs its stages in a fixed order: value
//! substitution, type coercion, datetime parsing, forward-fill, corrections,
//! reshape and finally enrichment.
pub mod enrich;
pub mod normalize;
pub mod reshape;
pub mod values;

use crate::database::column::ColumnType;
use crate::database::table::Table;
use crate::database::value::Value;
use crate::error::EtlError;
use crate::pipeline::Phase;
use crate::transform::enrich::Enrichment;
use crate::transform::enrich::LookupSource;
use crate::transform::reshape::Melt;
use crate::transform::values::Correction;

/// One configured operation on an in-flight table.
#[derive(Clone, Debug, PartialEq)]
pub enum Stage {
    ReplaceValues {
        column: String,
        replacements: Vec<(Value, Value)>,
    },
    Coerce {
        column: String,
        kind: ColumnType,
    },
    ParseDatetime {
        column: String,
        format: String,
    },
    ForwardFill {
        column: String,
    },
    Correct(Vec<Correction>),
    Reshape(Melt),
    Enrich(Enrichment),
}

impl Stage {
    pub fn phase(&self) -> Phase {
        match self {
            Stage::Reshape(_) => Phase::Reshaping,
            Stage::Enrich(_) => Phase::Enriching,
            _ => Phase::Transforming,
        }
    }

    /// Position of the stage kind in the fixed execution order.
    pub(crate) fn order(&self) -> u8 {
        match self {
            Stage::ReplaceValues { .. } => 0,
            Stage::Coerce { .. } => 1,
            Stage::ParseDatetime { .. } => 2,
            Stage::ForwardFill { .. } => 3,
            Stage::Correct(_) => 4,
            Stage::Reshape(_) => 5,
            Stage::Enrich(_) => 6,
        }
    }

    pub fn apply(&self, table: Table, source: &dyn LookupSource) -> Result<Table, EtlError> {
        match self {
            Stage::ReplaceValues { column, replacements } => values::replace_values(table, column, replacements),
            Stage::Coerce { column, kind } => values::coerce_column(table, column, *kind),
            Stage::ParseDatetime { column, format } => values::parse_datetime_column(table, column, format),
            Stage::ForwardFill { column } => values::forward_fill(table, column),
            Stage::Correct(corrections) => values::apply_corrections(table, corrections),
            Stage::Reshape(settings) => reshape::melt(table, settings),
            Stage::Enrich(enrichment) => enrich::enrich(table, enrichment, source),
        }
    }
}
