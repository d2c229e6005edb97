//! # Pipeline
//!
//! Drives every enabled rule entry through extraction, normalization,
//! transforms, reshape, enrichment and loading, one entry at a time, against
//! a single store session owned for the whole run.
pub mod backup;
pub mod orchestrator;
pub mod report;


use serde::Serialize;
use std::fmt::Display;

pub use backup::backup_files;
pub use orchestrator::run_files;
pub use orchestrator::Pipeline;
pub use report::RunReport;

/// Processing step of a rule entry, recorded when the entry fails.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Extracting,
    Normalizing,
    Transforming,
    Reshaping,
    Enriching,
    Loading,
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Extracting => "extracting",
            Phase::Normalizing => "normalizing",
            Phase::Transforming => "transforming",
            Phase::Reshaping => "reshaping",
            Phase::Enriching => "enriching",
            Phase::Loading => "loading",
        };
        f.write_str(name)
    }
}

/// What the run does after an entry fails.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failed entry
    #[default]
    Abort,
    /// Log the failure, leave the entry's table absent or stale and go on
    Continue,
}
