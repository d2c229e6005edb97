use crate::countries::CountryCategories;
use crate::countries::COUNTRY_TABLES;
use crate::database::store::Store;
use crate::pipeline::backup_files;
use crate::pipeline::report::RulesInfo;
use crate::pipeline::run_files;
use crate::pipeline::FailurePolicy;
use crate::rules::load_rules;
use crate::rules::plan::RulePlan;
use crate::spreadsheet::open_workbook;
use anyhow::bail;
use anyhow::Context as _;
use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use clap::Subcommand;
use std::path::Path;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "support-tracker-etl", version, about = "Loads the Ukraine Support Tracker workbook into DuckDB")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every enabled rule entry and replace its table in the database
    Run {
        /// Source workbook (.xlsx or .xlsm)
        #[arg(short, long, env = "ETL_WORKBOOK")]
        workbook: PathBuf,

        /// YAML rule document
        #[arg(short, long, env = "ETL_RULES")]
        rules: PathBuf,

        /// YAML country category document; loads the country lookup tables
        #[arg(short, long, env = "ETL_COUNTRIES")]
        countries: Option<PathBuf>,

        /// DuckDB database file, created when missing
        #[arg(short, long, env = "ETL_DATABASE")]
        database: PathBuf,

        /// What to do when an entry fails
        #[arg(long, env = "ETL_ON_ERROR", value_enum, default_value_t = FailurePolicy::Abort)]
        on_error: FailurePolicy,

        /// Write the run report as JSON to this file
        #[arg(long, env = "ETL_REPORT")]
        report: Option<PathBuf>,

        /// Copy the database and the workbook into this directory before the run
        #[arg(long, env = "ETL_BACKUP_DIR")]
        backup_dir: Option<PathBuf>,
    },
    /// Validate the rule document without loading anything
    Validate {
        /// YAML rule document
        #[arg(short, long, env = "ETL_RULES")]
        rules: PathBuf,

        /// Also check that every enabled entry's sheet exists in this workbook
        #[arg(short, long, env = "ETL_WORKBOOK")]
        workbook: Option<PathBuf>,

        /// YAML country category document
        #[arg(short, long, env = "ETL_COUNTRIES")]
        countries: Option<PathBuf>,
    },
    /// List the tables of a database with their row counts and columns
    Inspect {
        /// DuckDB database file
        #[arg(short, long, env = "ETL_DATABASE")]
        database: PathBuf,
    },
}

pub fn run_command(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            workbook,
            rules,
            countries,
            database,
            on_error,
            report,
            backup_dir,
        } => handle_run(RunArgs {
            workbook: &workbook,
            rules: &rules,
            countries: countries.as_deref(),
            database: &database,
            policy: on_error,
            report_path: report.as_deref(),
            backup_dir: backup_dir.as_deref(),
        }),
        Commands::Validate {
            rules,
            workbook,
            countries,
        } => handle_validate(&rules, workbook.as_deref(), countries.as_deref()),
        Commands::Inspect { database } => handle_inspect(&database),
    }
}

/// Loads the country document, when given, and validates the rules against it.
fn load_plan(rules: &Path, countries: Option<&Path>) -> Result<(RulePlan, Option<CountryCategories>)> {
    let countries = countries.map(CountryCategories::from_file).transpose()?;
    let external_tables: &[&str] = if countries.is_some() { &COUNTRY_TABLES } else { &[] };
    let plan = RulePlan::build(&load_rules(rules)?, external_tables)?;
    Ok((plan, countries))
}

struct RunArgs<'a> {
    workbook: &'a Path,
    rules: &'a Path,
    countries: Option<&'a Path>,
    database: &'a Path,
    policy: FailurePolicy,
    report_path: Option<&'a Path>,
    backup_dir: Option<&'a Path>,
}

fn handle_run(args: RunArgs<'_>) -> Result<()> {
    let (plan, countries) = load_plan(args.rules, args.countries)?;
    let rules = RulesInfo::of(args.rules)?;
    info!(rules = %rules.path, sha256 = %rules.sha256, "loaded rule document");

    let backups = match args.backup_dir {
        Some(directory) => {
            let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f").to_string();
            backup_files(directory, &[args.database, args.workbook], &stamp)?
        }
        None => Vec::new(),
    };

    let mut report = run_files(&plan, countries.as_ref(), args.workbook, args.database, args.policy)?;
    report.rules = Some(rules);
    report.backups = backups.iter().map(|path| path.display().to_string()).collect();
    if let Some(path) = args.report_path {
        report
            .write_json(path)
            .with_context(|| format!("Failed to write run report to '{}'", path.display()))?;
        info!(report = %path.display(), "wrote run report");
    }

    let report = report.into_result()?;
    let failed: Vec<String> = report
        .failed_entries()
        .map(|entry| format!("#{}", entry.index))
        .collect();
    if !failed.is_empty() {
        bail!("{} rule entries failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}

fn handle_validate(rules: &Path, workbook: Option<&Path>, countries: Option<&Path>) -> Result<()> {
    let (plan, _) = load_plan(rules, countries)?;
    if let Some(workbook) = workbook {
        let workbook = open_workbook(workbook)?;
        plan.check_sheets(&workbook.name(), &workbook.sheet_names())?;
    }
    println!(
        "Rule document '{}' is valid: {} enabled of {} entries",
        rules.display(),
        plan.enabled().count(),
        plan.entries.len()
    );
    Ok(())
}

fn handle_inspect(database: &Path) -> Result<()> {
    if !database.is_file() {
        bail!("Database '{}' does not exist", database.display());
    }
    let store = Store::open(database)?;
    for table in store.list_tables()? {
        println!("{} ({} rows)", table.name, table.rows);
        for column in &table.columns {
            println!("  {} {}", column.name, column.data_type);
        }
    }
    store.close()?;
    Ok(())
}
