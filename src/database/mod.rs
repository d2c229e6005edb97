//! In-flight tables and the DuckDB store they are loaded into.
pub mod column;
pub mod range;
pub mod store;
pub mod table;
pub mod value;
