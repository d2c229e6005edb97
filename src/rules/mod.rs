//! # Rule Documents
//!
//! A rule document is an ordered YAML list of entries, each describing how to
//! extract one sheet region, transform it and load it as a named table. The
//! document is validated as a whole before anything is extracted.
pub mod document;
pub mod plan;

use crate::error::EtlError;
use crate::error::ResultMessage;
use crate::rules::document::RuleEntry;
use std::path::Path;

/// Parses a rule document from YAML text.
pub fn parse_rules(text: &str) -> Result<Vec<RuleEntry>, EtlError> {
    let entries: Vec<RuleEntry> = serde_yaml::from_str(text)?;
    Ok(entries)
}

/// Reads and parses a rule document file.
pub fn load_rules(path: &Path) -> Result<Vec<RuleEntry>, EtlError> {
    let text = std::fs::read_to_string(path).map_err(|error| {
        EtlError::ConfigurationError(format!("cannot read rule document '{}': {error}", path.display()))
    })?;
    parse_rules(&text).with_prefix(&format!("Parsing rule document '{}'", path.display()))
}
