use crate::countries::CountryCategories;
use crate::database::store::Store;
use crate::database::table::Table;
use crate::error::EtlError;
use crate::error::ResultMessage;
use crate::pipeline::report::EntryReport;
use crate::pipeline::report::EntryStatus;
use crate::pipeline::report::RunReport;
use crate::pipeline::report::RunStatus;
use crate::pipeline::report::WorkbookInfo;
use crate::pipeline::FailurePolicy;
use crate::pipeline::Phase;
use crate::rules::plan::Dependency;
use crate::rules::plan::EntryPlan;
use crate::rules::plan::PlannedEntry;
use crate::rules::plan::RulePlan;
use crate::spreadsheet::open_workbook;
use crate::spreadsheet::Spreadsheet;
use crate::transform::normalize::normalize;
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::info_span;
use tracing::warn;

/// Runs a validated rule plan against one workbook and one store session.
pub struct Pipeline<'a> {
    plan: &'a RulePlan,
    countries: Option<&'a CountryCategories>,
    policy: FailurePolicy,
}

type PhaseResult<T> = Result<T, (Phase, EtlError)>;

trait InPhase<T> {
    fn in_phase(self, phase: Phase) -> PhaseResult<T>;
}

impl<T> InPhase<T> for Result<T, EtlError> {
    fn in_phase(self, phase: Phase) -> PhaseResult<T> {
        self.map_err(|error| (phase, error))
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

impl<'a> Pipeline<'a> {
    pub fn new(plan: &'a RulePlan, policy: FailurePolicy) -> Self {
        Pipeline {
            plan,
            countries: None,
            policy,
        }
    }

    /// Loads the country lookup tables before the first entry.
    pub fn with_countries(mut self, countries: &'a CountryCategories) -> Self {
        self.countries = Some(countries);
        self
    }

    /// Processes the entries in document order.
    ///
    /// Entry failures are recorded in the report and, under the abort policy,
    /// stop the run. Only failures outside any entry (loading the country
    /// tables, listing the store) are returned as errors.
    pub fn run(&self, workbook: &mut dyn Spreadsheet, store: &mut Store) -> Result<RunReport, EtlError> {
        let started_at = Utc::now();
        let start = Instant::now();
        info!(workbook = %workbook.name(), database = %store.location(), policy = ?self.policy, "starting run");

        // Table name to the entry that loaded it in this run, 0 for country tables
        let mut loaded = HashMap::<String, usize>::new();
        if let Some(countries) = self.countries {
            for table in [countries.lookup_table(), countries.groups_table()] {
                store
                    .replace_table(&table)
                    .with_prefix(&format!("Loading country table '{}'", table.name))?;
                loaded.insert(table.name, 0);
            }
        }

        let mut entries = Vec::with_capacity(self.plan.entries.len());
        let mut failure = None;
        for planned in &self.plan.entries {
            let entry = match planned {
                PlannedEntry::Disabled { number, target } => {
                    debug!(index = number, table = ?target, "entry disabled, skipping");
                    entries.push(EntryReport::skipped(*number, target.clone()));
                    continue;
                }
                PlannedEntry::Enabled(entry) => entry,
            };

            let span = info_span!("entry", index = entry.number, table = %entry.target);
            let _enter = span.enter();
            let entry_start = Instant::now();
            let mut report = EntryReport::skipped(entry.number, Some(entry.target.to_owned()));
            report.sheet = Some(entry.window.sheet.to_owned());

            match self.process(entry, workbook, store, &loaded) {
                Ok((rows, table)) => {
                    report.loaded(rows, &table);
                    report.duration_ms = elapsed_ms(entry_start);
                    loaded.insert(entry.target.to_owned(), entry.number);
                    entries.push(report);
                }
                Err((phase, source)) => {
                    let error = EtlError::EntryFailed {
                        index: entry.number,
                        target: entry.target.to_owned(),
                        phase,
                        source: Box::new(source),
                    };
                    report.status = EntryStatus::Failed;
                    report.phase = Some(phase);
                    report.error_kind = Some(error.kind());
                    report.error = Some(error.to_string());
                    report.duration_ms = elapsed_ms(entry_start);
                    entries.push(report);
                    match self.policy {
                        FailurePolicy::Abort => {
                            error!(%error, "entry failed, aborting run");
                            failure = Some(error);
                            break;
                        }
                        FailurePolicy::Continue => {
                            warn!(%error, "entry failed, its table is left absent or stale");
                        }
                    }
                }
            }
        }

        let status = if failure.is_some() {
            RunStatus::Aborted
        } else if entries.iter().any(|entry| entry.status == EntryStatus::Failed) {
            RunStatus::CompletedWithFailures
        } else {
            RunStatus::Completed
        };
        let report = RunReport {
            run_id: started_at.format("%Y%m%dT%H%M%S%.3fZ").to_string(),
            started_at,
            finished_at: Utc::now(),
            duration_ms: elapsed_ms(start),
            workbook: WorkbookInfo::of(&workbook.name()),
            rules: None,
            database: store.location().to_owned(),
            policy: self.policy,
            status,
            entries,
            tables: store.list_tables()?,
            backups: Vec::new(),
            failure,
        };
        info!(
            status = ?report.status,
            loaded = report.loaded_tables().count(),
            failed = report.failed_entries().count(),
            duration_ms = report.duration_ms,
            "run finished"
        );
        Ok(report)
    }

    /// Checks that every table the entry enriches from was loaded in this run.
    fn check_dependencies(entry: &EntryPlan, loaded: &HashMap<String, usize>) -> Result<(), EtlError> {
        for (table, dependency) in &entry.depends_on {
            if loaded.contains_key(table) {
                continue;
            }
            let reason = match dependency {
                Dependency::Entry(number) => format!("which entry #{number} failed to load"),
                Dependency::External(_) => "which was not loaded from the country document".to_owned(),
            };
            Err(EtlError::DependencyOrderError {
                entry: entry.target.to_owned(),
                table: table.to_owned(),
                reason,
            })?
        }
        Ok(())
    }

    fn process(
        &self,
        entry: &EntryPlan,
        workbook: &mut dyn Spreadsheet,
        store: &mut Store,
        loaded: &HashMap<String, usize>,
    ) -> PhaseResult<(usize, Table)> {
        Self::check_dependencies(entry, loaded).in_phase(Phase::Enriching)?;

        let region = workbook.read_region(&entry.window).in_phase(Phase::Extracting)?;
        debug!(window = %entry.window, "extracted region");

        let mut table: Table = normalize(region, &entry.normalize, &entry.target).in_phase(Phase::Normalizing)?;
        debug!(columns = ?table.column_names(), rows = table.len(), "normalized");

        for stage in &entry.stages {
            let phase = stage.phase();
            table = stage.apply(table, &*store).in_phase(phase)?;
            debug!(%phase, rows = table.len(), columns = table.columns.len(), "applied stage");
        }

        let rows = store.replace_table(&table).in_phase(Phase::Loading)?;
        Ok((rows, table))
    }
}

/// Opens the workbook and the database, checks that every enabled entry's
/// sheet exists, runs the plan and closes the store.
pub fn run_files(
    plan: &RulePlan,
    countries: Option<&CountryCategories>,
    workbook: &Path,
    database: &Path,
    policy: FailurePolicy,
) -> Result<RunReport, EtlError> {
    let mut workbook = open_workbook(workbook)?;
    plan.check_sheets(&workbook.name(), &workbook.sheet_names())?;
    let mut store = Store::open(database)?;

    let mut pipeline = Pipeline::new(plan, policy);
    if let Some(countries) = countries {
        pipeline = pipeline.with_countries(countries);
    }
    let report = pipeline.run(workbook.as_mut(), &mut store)?;
    store.close()?;
    Ok(report)
}
