//! # Ukraine Support Tracker ETL
//!
//! Loads the multi-sheet Ukraine Support Tracker workbook into a DuckDB
//! database, one table per declarative rule entry.
//!
//! ## Pipeline
//!
//! For every enabled entry of the YAML rule document, in document order:
//!
//! - **Extract**: read a rectangular window (sheet, column range, skipped rows,
//!   header rows, data rows) with native cell types
//! - **Normalize**: merge multi-row headers and clean them into identifiers
//! - **Transform**: value substitution, type coercion, datetime parsing,
//!   forward-fill and entry corrections
//! - **Reshape**: optional melt from wide to long form
//! - **Enrich**: optional lookup columns from tables loaded earlier in the run
//! - **Load**: replace the target table atomically
//!
//! The rule document is validated as a whole before anything is extracted,
//! including the order of enrichment dependencies. Country group documents
//! are loaded first as the `zz_country_lookup` and `zz_country_groups` tables.
pub mod cli;
pub mod countries;
pub mod database;
pub mod error;
pub(crate) mod helpers;
pub mod pipeline;
pub mod rules;
pub mod spreadsheet;
pub mod transform;

pub use error::ErrorKind;
pub use error::EtlError;
