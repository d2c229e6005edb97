//! Serde model of the rule document. Every field is optional here; the
//! validation pass decides what an enabled entry must provide.
use indexmap::IndexMap;
use serde::Deserialize;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RuleEntry {
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub extract: Option<ExtractSpec>,
    #[serde(default)]
    pub transform: Option<TransformSpec>,
    #[serde(default)]
    pub load: Option<LoadSpec>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ExtractSpec {
    /// Sheet name
    pub name: Option<String>,
    pub column_range: Option<String>,
    /// Number of data rows below the header
    pub number_rows: Option<usize>,
    pub skip_rows: Option<usize>,
    pub number_header_rows: Option<usize>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TransformSpec {
    pub clean_column_names: Option<bool>,
    pub columnnames: Option<IndexMap<String, String>>,
    pub datetime: Option<IndexMap<String, String>>,
    pub datatypes: Option<IndexMap<String, String>>,
    pub reshape: Option<ReshapeSpec>,
    pub replace_values: Option<IndexMap<String, serde_yaml::Mapping>>,
    pub forward_fill_column: Option<String>,
    pub entry_correction: Option<CorrectionSpec>,
    pub add_columns: Option<IndexMap<String, AddColumnSpec>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ReshapeSpec {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub id_vars: Vec<String>,
    #[serde(default)]
    pub value_vars: Vec<String>,
    pub var_name: Option<String>,
    pub value_name: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum CorrectionSpec {
    /// `true` enables the built-in corrections
    Enabled(bool),
    Rules(Vec<CellCorrectionSpec>),
}

#[derive(Clone, Debug, Deserialize)]
pub struct CellCorrectionSpec {
    pub match_column: ColumnRefSpec,
    pub equals: serde_yaml::Value,
    pub column: ColumnRefSpec,
    pub value: serde_yaml::Value,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ColumnRefSpec {
    Position(usize),
    Name(String),
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AddColumnSpec {
    pub source_table: Option<String>,
    pub source_column: Option<String>,
    pub on: Option<JoinSpec>,
    /// Free-form SQL joins are not accepted; kept to report a precise error
    pub join_query: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum JoinSpec {
    /// In-flight column to source column
    Columns(IndexMap<String, String>),
    Predicate(String),
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LoadSpec {
    pub name: Option<String>,
}
