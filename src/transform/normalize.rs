use crate::database::table::Table;
use crate::database::value::Value;
use crate::error::EtlError;
use crate::spreadsheet::region::Region;
use indexmap::IndexMap;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::warn;

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("Hardcode regex pattern"));

/// Settings for turning header labels into column identifiers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NormalizeConfig {
    /// Lowercase and collapse punctuation into underscores
    pub clean: bool,
    /// Raw merged header label to final identifier
    pub renames: IndexMap<String, String>,
}

fn label_text(value: &Value) -> String {
    value.to_string().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Merges the header rows of each column into one label joined by spaces.
///
/// An empty cell in an upper header row inherits the nearest non-empty label to
/// its left when both columns carry a label further down, which recovers the
/// text of horizontally merged group headers.
pub fn merge_header_labels(header: &[Vec<Value>]) -> Vec<String> {
    let labels: Vec<Vec<String>> = header
        .iter()
        .map(|row| row.iter().map(label_text).collect())
        .collect();
    let width = labels.first().map(Vec::len).unwrap_or(0);
    let has_lower_label = |row: usize, col: usize| {
        labels[row + 1..].iter().any(|lower| !lower[col].is_empty())
    };

    let mut filled = labels.clone();
    for row in 0..labels.len().saturating_sub(1) {
        let mut anchor = None::<&str>;
        for col in 0..width {
            let label = labels[row][col].as_str();
            if !label.is_empty() {
                anchor = has_lower_label(row, col).then_some(label);
            } else if has_lower_label(row, col) {
                if let Some(anchor) = anchor {
                    filled[row][col] = anchor.to_owned();
                }
            } else {
                anchor = None;
            }
        }
    }

    (0..width)
        .map(|col| {
            filled
                .iter()
                .map(|row| row[col].as_str())
                .filter(|label| !label.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

/// Turns a header label into a lowercase identifier of ASCII letters, digits and underscores.
/// Currency and percent signs are spelled out so they survive.
pub fn clean_column_name(label: &str) -> String {
    let mut spelled = String::with_capacity(label.len());
    for character in label.chars() {
        match character {
            '€' => spelled.push_str(" eur "),
            '$' => spelled.push_str(" usd "),
            '£' => spelled.push_str(" gbp "),
            '%' => spelled.push_str(" pct "),
            '&' => spelled.push_str(" and "),
            _ => spelled.push(character),
        }
    }
    let lowered = spelled.to_lowercase();
    SEPARATORS.replace_all(&lowered, "_").trim_matches('_').to_owned()
}

/// Builds the normalized table of a region: merged, cleaned and renamed
/// column identifiers over the region's data rows.
pub fn normalize(region: Region, config: &NormalizeConfig, table_name: &str) -> Result<Table, EtlError> {
    let labels = merge_header_labels(&region.header);
    let mut sources = HashMap::<String, &str>::new();
    let mut names = Vec::with_capacity(labels.len());
    for (position, label) in labels.iter().enumerate() {
        let mut name = match config.renames.get(label) {
            Some(renamed) => renamed.to_owned(),
            None if config.clean => clean_column_name(label),
            None => label.to_owned(),
        };
        if name.is_empty() {
            name = format!("column{}", position + 1);
        }
        if let Some(previous) = sources.insert(name.to_owned(), label) {
            Err(EtlError::SchemaError(format!(
                "headers '{previous}' and '{label}' of table '{table_name}' both normalize to '{name}'"
            )))?
        }
        names.push(name);
    }

    for raw in config.renames.keys() {
        if !labels.contains(raw) {
            warn!(table = table_name, header = %raw, "rename matched no header");
        }
    }

    Ok(Table::from_rows(table_name, names, region.rows))
}
