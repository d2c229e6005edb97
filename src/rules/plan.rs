use crate::database::column::ColumnType;
use crate::database::range::ColumnRange;
use crate::database::value::Value;
use crate::error::EtlError;
use crate::rules::document::AddColumnSpec;
use crate::rules::document::ColumnRefSpec;
use crate::rules::document::CorrectionSpec;
use crate::rules::document::ExtractSpec;
use crate::rules::document::JoinSpec;
use crate::rules::document::RuleEntry;
use crate::rules::document::TransformSpec;
use crate::spreadsheet::SpreadsheetError;
use crate::spreadsheet::window::Window;
use crate::transform::enrich::parse_join_predicate;
use crate::transform::enrich::Enrichment;
use crate::transform::normalize::NormalizeConfig;
use crate::transform::reshape::Melt;
use crate::transform::values::ColumnRef;
use crate::transform::values::Correction;
use crate::transform::Stage;
use chrono::format::Item;
use chrono::format::StrftimeItems;
use std::collections::HashMap;

/// Where an enrichment source table comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dependency {
    /// Loaded by the enabled entry with this number
    Entry(usize),
    /// Loaded before any entry, e.g. the country lookup tables
    External(String),
}

/// A validated, enabled rule entry ready to run.
#[derive(Clone, Debug, PartialEq)]
pub struct EntryPlan {
    /// 1-based position in the rule document
    pub number: usize,
    pub window: Window,
    pub normalize: NormalizeConfig,
    /// Stages in execution order
    pub stages: Vec<Stage>,
    pub target: String,
    /// Tables read by enrichment stages, as edges to the entries that load them
    pub depends_on: Vec<(String, Dependency)>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PlannedEntry {
    Disabled { number: usize, target: Option<String> },
    Enabled(EntryPlan),
}

/// The validated rule document.
#[derive(Clone, Debug, PartialEq)]
pub struct RulePlan {
    pub entries: Vec<PlannedEntry>,
}

fn literal(value: &serde_yaml::Value) -> Result<Value, EtlError> {
    let value = match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(flag) => Value::Boolean(*flag),
        serde_yaml::Value::Number(number) => match number.as_i64() {
            Some(integer) => Value::BigInt(integer),
            None => Value::Double(number.as_f64().unwrap_or(f64::NAN)),
        },
        serde_yaml::Value::String(text) => Value::Varchar(text.to_owned()),
        other => Err(EtlError::ConfigurationError(format!(
            "expected a scalar literal, found {other:?}"
        )))?,
    };
    Ok(value)
}

fn column_ref(spec: &ColumnRefSpec) -> ColumnRef {
    match spec {
        ColumnRefSpec::Position(position) => ColumnRef::Position(*position),
        ColumnRefSpec::Name(name) => ColumnRef::Name(name.to_owned()),
    }
}

fn validate_format(format: &str) -> Result<(), EtlError> {
    if format.trim().is_empty() || StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        Err(EtlError::ConfigurationError(format!("invalid datetime format '{format}'")))?
    }
    Ok(())
}

/// Collects the problems of one entry instead of stopping at the first.
struct Problems<'a> {
    label: String,
    list: &'a mut Vec<EtlError>,
}

impl Problems<'_> {
    fn push(&mut self, error: EtlError) {
        self.list.push(EtlError::Context {
            message: self.label.to_owned(),
            source: Box::new(error),
        });
    }

    fn check<T>(&mut self, result: Result<T, EtlError>) -> Option<T> {
        result.map_err(|error| self.push(error)).ok()
    }

    fn missing(&mut self, field: &str) {
        self.push(EtlError::ConfigurationError(format!("missing required field '{field}'")));
    }
}

fn plan_window(extract: Option<&ExtractSpec>, problems: &mut Problems) -> Option<Window> {
    let Some(extract) = extract else {
        problems.missing("extract");
        return None;
    };
    let sheet = extract.name.as_ref().filter(|name| !name.is_empty()).cloned();
    if sheet.is_none() {
        problems.missing("extract.name");
    }
    let columns = match &extract.column_range {
        Some(range) => problems.check(ColumnRange::parse(range)),
        None => {
            problems.missing("extract.column_range");
            None
        }
    };
    if extract.number_rows.is_none() {
        problems.missing("extract.number_rows");
    }
    let header_rows = extract.number_header_rows.unwrap_or(1);
    if header_rows == 0 {
        problems.push(EtlError::ConfigurationError(
            "extract.number_header_rows must be at least 1".to_owned(),
        ));
        return None;
    }
    Some(Window {
        sheet: sheet?,
        columns: columns?,
        skip_rows: extract.skip_rows.unwrap_or(0),
        header_rows,
        data_rows: extract.number_rows?,
    })
}

fn plan_enrichment(column: &str, spec: &AddColumnSpec, problems: &mut Problems) -> Option<Enrichment> {
    if spec.join_query.is_some() {
        problems.push(EtlError::ConfigurationError(format!(
            "add_columns.{column}.join_query is not supported, declare source_table, source_column and on"
        )));
        return None;
    }
    let source_table = spec.source_table.clone().filter(|name| !name.is_empty());
    let source_column = spec.source_column.clone().filter(|name| !name.is_empty());
    if source_table.is_none() {
        problems.missing(&format!("add_columns.{column}.source_table"));
    }
    if source_column.is_none() {
        problems.missing(&format!("add_columns.{column}.source_column"));
    }
    let source_table = source_table?;
    let keys = match &spec.on {
        None => {
            problems.missing(&format!("add_columns.{column}.on"));
            return None;
        }
        Some(JoinSpec::Columns(columns)) if columns.is_empty() => {
            problems.push(EtlError::ConfigurationError(format!(
                "add_columns.{column}.on declares no key columns"
            )));
            return None;
        }
        Some(JoinSpec::Columns(columns)) => columns
            .iter()
            .map(|(left, right)| (left.to_owned(), right.to_owned()))
            .collect(),
        Some(JoinSpec::Predicate(predicate)) => problems.check(parse_join_predicate(predicate, &source_table))?,
    };
    Some(Enrichment {
        column: column.to_owned(),
        source_table,
        source_column: source_column?,
        keys,
    })
}

fn plan_stages(transform: &TransformSpec, problems: &mut Problems) -> Vec<Stage> {
    let mut stages = Vec::new();
    for (column, mapping) in transform.replace_values.iter().flatten() {
        let replacements = mapping
            .iter()
            .map(|(from, to)| Ok((literal(from)?, literal(to)?)))
            .collect::<Result<Vec<_>, EtlError>>();
        if let Some(replacements) = problems.check(replacements) {
            stages.push(Stage::ReplaceValues {
                column: column.to_owned(),
                replacements,
            });
        }
    }
    for (column, kind) in transform.datatypes.iter().flatten() {
        if let Some(kind) = problems.check(ColumnType::parse(kind)) {
            stages.push(Stage::Coerce {
                column: column.to_owned(),
                kind,
            });
        }
    }
    for (column, format) in transform.datetime.iter().flatten() {
        if problems.check(validate_format(format)).is_some() {
            stages.push(Stage::ParseDatetime {
                column: column.to_owned(),
                format: format.to_owned(),
            });
        }
    }
    if let Some(column) = &transform.forward_fill_column {
        stages.push(Stage::ForwardFill {
            column: column.to_owned(),
        });
    }
    match &transform.entry_correction {
        Some(CorrectionSpec::Enabled(true)) => stages.push(Stage::Correct(Correction::builtin())),
        Some(CorrectionSpec::Rules(rules)) => {
            let corrections = rules
                .iter()
                .map(|rule| {
                    Ok(Correction {
                        match_column: column_ref(&rule.match_column),
                        equals: literal(&rule.equals)?,
                        column: column_ref(&rule.column),
                        value: literal(&rule.value)?,
                    })
                })
                .collect::<Result<Vec<_>, EtlError>>();
            if let Some(corrections) = problems.check(corrections) {
                stages.push(Stage::Correct(corrections));
            }
        }
        Some(CorrectionSpec::Enabled(false)) | None => (),
    }
    if let Some(reshape) = &transform.reshape {
        let kind = reshape.kind.as_deref().unwrap_or("melt");
        if kind != "melt" {
            problems.push(EtlError::ConfigurationError(format!(
                "unsupported reshape type '{kind}', expected 'melt'"
            )));
        } else {
            let melt = Melt {
                id_vars: reshape.id_vars.clone(),
                value_vars: reshape.value_vars.clone(),
                var_name: reshape.var_name.clone().unwrap_or_else(|| "variable".to_owned()),
                value_name: reshape.value_name.clone().unwrap_or_else(|| "value".to_owned()),
            };
            if problems.check(melt.validate()).is_some() {
                stages.push(Stage::Reshape(melt));
            }
        }
    }
    for (column, spec) in transform.add_columns.iter().flatten() {
        if let Some(enrichment) = plan_enrichment(column, spec, problems) {
            stages.push(Stage::Enrich(enrichment));
        }
    }
    stages.sort_by_key(Stage::order);
    stages
}

impl RulePlan {
    /// Validates the whole document. `external_tables` are loaded before any
    /// entry runs and may be used as enrichment sources.
    ///
    /// Every problem of every enabled entry is reported at once; disabled
    /// entries are not inspected beyond their target name.
    pub fn build(document: &[RuleEntry], external_tables: &[&str]) -> Result<RulePlan, EtlError> {
        let mut list = Vec::new();
        let targets: Vec<Option<&str>> = document
            .iter()
            .map(|entry| {
                entry
                    .load
                    .as_ref()
                    .and_then(|load| load.name.as_deref())
                    .filter(|name| !name.is_empty())
            })
            .collect();

        let mut loaded_by = HashMap::<&str, usize>::new();
        let mut entries = Vec::with_capacity(document.len());
        for (index, entry) in document.iter().enumerate() {
            let number = index + 1;
            if !entry.read {
                entries.push(PlannedEntry::Disabled {
                    number,
                    target: targets[index].map(str::to_owned),
                });
                continue;
            }

            let label = match targets[index] {
                Some(target) => format!("Rule entry #{number} ('{target}')"),
                None => format!("Rule entry #{number}"),
            };
            let mut problems = Problems { label, list: &mut list };
            let window = plan_window(entry.extract.as_ref(), &mut problems);
            let target = targets[index];
            match target {
                None => problems.missing("load.name"),
                Some(name) if external_tables.contains(&name) => problems.push(EtlError::ConfigurationError(
                    format!("table '{name}' is reserved for the country lookup"),
                )),
                Some(name) => {
                    if let Some(previous) = loaded_by.insert(name, number) {
                        problems.push(EtlError::ConfigurationError(format!(
                            "table '{name}' is already loaded by entry #{previous}"
                        )));
                    }
                }
            }

            let transform = entry.transform.clone().unwrap_or_default();
            let normalize = NormalizeConfig {
                clean: transform.clean_column_names.unwrap_or(false),
                renames: transform.columnnames.clone().unwrap_or_default(),
            };
            let stages = plan_stages(&transform, &mut problems);

            let mut depends_on = Vec::new();
            for stage in &stages {
                let Stage::Enrich(enrichment) = stage else { continue };
                let source = enrichment.source_table.as_str();
                let dependency = if external_tables.contains(&source) {
                    Ok(Dependency::External(source.to_owned()))
                } else if target == Some(source) {
                    Err("which is the entry's own table".to_owned())
                } else if let Some(loader) = loaded_by.get(source).filter(|loader| **loader != number) {
                    Ok(Dependency::Entry(*loader))
                } else {
                    let others = targets
                        .iter()
                        .enumerate()
                        .filter(|(other, name)| *other != index && **name == Some(source))
                        .map(|(other, _)| other)
                        .collect::<Vec<_>>();
                    Err(match others.first() {
                        Some(other) if !document[*other].read => {
                            format!("which is only loaded by disabled entry #{}", other + 1)
                        }
                        Some(other) => format!("which is loaded later, by entry #{}", other + 1),
                        None => "which no entry loads".to_owned(),
                    })
                };
                match dependency {
                    Ok(dependency) => depends_on.push((source.to_owned(), dependency)),
                    Err(reason) => problems.push(EtlError::DependencyOrderError {
                        entry: target.unwrap_or_default().to_owned(),
                        table: source.to_owned(),
                        reason,
                    }),
                }
            }

            if let (Some(window), Some(target)) = (window, target) {
                entries.push(PlannedEntry::Enabled(EntryPlan {
                    number,
                    window,
                    normalize,
                    stages,
                    target: target.to_owned(),
                    depends_on,
                }));
            }
        }

        match EtlError::from_problems(list) {
            Some(error) => Err(error),
            None => Ok(RulePlan { entries }),
        }
    }

    pub fn enabled(&self) -> impl Iterator<Item = &EntryPlan> + '_ {
        self.entries.iter().filter_map(|entry| match entry {
            PlannedEntry::Enabled(plan) => Some(plan),
            PlannedEntry::Disabled { .. } => None,
        })
    }

    /// Checks that every enabled entry's sheet exists in the workbook.
    pub fn check_sheets(&self, workbook: &str, sheet_names: &[String]) -> Result<(), EtlError> {
        let problems = self
            .enabled()
            .filter(|plan| !sheet_names.contains(&plan.window.sheet))
            .map(|plan| EtlError::Context {
                message: format!("Rule entry #{} ('{}')", plan.number, plan.target),
                source: Box::new(
                    SpreadsheetError::SheetNotFound {
                        file: workbook.to_owned(),
                        sheet: plan.window.sheet.to_owned(),
                        available: sheet_names.join(", "),
                    }
                    .into(),
                ),
            })
            .collect();
        match EtlError::from_problems(problems) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::rules::parse_rules;

    const COUNTRY_TABLES: &[&str] = &["zz_country_lookup", "zz_country_groups"];

    fn plan(yaml: &str) -> Result<RulePlan, EtlError> {
        RulePlan::build(&parse_rules(yaml).unwrap(), COUNTRY_TABLES)
    }

    #[test]
    fn builds_stages_in_fixed_order() {
        let plan = plan(
            r#"
- read: true
  extract: { name: "Fig 1", column_range: "b:f", number_rows: 30, skip_rows: 8, number_header_rows: 2 }
  transform:
    clean_column_names: true
    add_columns:
      iso3_code: { source_table: zz_country_lookup, source_column: iso3_code, on: { country: country_name } }
    forward_fill_column: country
    datatypes: { financial: float }
    replace_values: { financial: { ".": 0, ~: 0.0 } }
    unknown_option: 3
  load: { name: b_allocations }
- read: false
  extract: { name: "Fig 2" }
  load: { name: c_allocated_over_time }
"#,
        )
        .unwrap();
        assert_eq!(plan.entries.len(), 2);
        let entry = plan.enabled().next().unwrap();
        assert_eq!(entry.window.to_string(), "'Fig 1'!B9:F40");
        assert!(entry.normalize.clean);
        let order: Vec<u8> = entry.stages.iter().map(Stage::order).collect();
        assert_eq!(order, vec![0, 1, 3, 6]);
        assert_eq!(
            entry.stages[0],
            Stage::ReplaceValues {
                column: "financial".into(),
                replacements: vec![(Value::from("."), Value::BigInt(0)), (Value::Null, Value::Double(0.0))],
            }
        );
        assert_eq!(
            entry.depends_on,
            vec![("zz_country_lookup".to_owned(), Dependency::External("zz_country_lookup".into()))]
        );
        assert_eq!(
            plan.entries[1],
            PlannedEntry::Disabled { number: 2, target: Some("c_allocated_over_time".into()) }
        );
    }

    #[test]
    fn missing_required_fields_are_reported_together() {
        let error = plan(
            r#"
- read: true
  extract: { name: "Fig 1", column_range: "B:F" }
  load: {}
- read: true
  extract: { name: "Fig 2", column_range: "F:B", number_rows: 3 }
  transform: { datatypes: { a: money } }
  load: { name: t2 }
"#,
        )
        .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Configuration);
        let EtlError::InvalidRuleDocument(problems) = &error else {
            panic!("expected a problem list, got {error}");
        };
        assert_eq!(problems.len(), 4);
        let message = error.to_string();
        assert!(message.contains("extract.number_rows"));
        assert!(message.contains("load.name"));
        assert!(message.contains("Rule entry #2 ('t2')"));
    }

    #[test]
    fn disabled_entries_are_not_validated() {
        let plan = plan("- read: false\n  extract: { column_range: 'nonsense' }\n").unwrap();
        assert_eq!(plan.enabled().count(), 0);
    }

    #[test]
    fn enrichment_sources_must_load_earlier() {
        let document = |first_enabled: bool, order_swapped: bool| {
            let source = format!(
                "- read: {first_enabled}\n  extract: {{ name: S, column_range: A:B, number_rows: 1 }}\n  load: {{ name: source_table }}\n"
            );
            let dependent = "- read: true\n  extract: { name: S, column_range: A:B, number_rows: 1 }\n  transform:\n    add_columns:\n      x: { source_table: source_table, source_column: b, on: 'a = source_table.a' }\n  load: { name: dependent }\n";
            if order_swapped {
                format!("{dependent}{source}")
            } else {
                format!("{source}{dependent}")
            }
        };

        let ok = plan(&document(true, false)).unwrap();
        let dependent = ok.enabled().nth(1).unwrap();
        assert_eq!(dependent.depends_on, vec![("source_table".to_owned(), Dependency::Entry(1))]);

        for (enabled, swapped, reason) in [(false, false, "disabled entry #1"), (true, true, "later, by entry #2")] {
            let error = plan(&document(enabled, swapped)).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::DependencyOrder);
            assert!(error.to_string().contains(reason), "{error}");
        }
    }

    #[test]
    fn rejects_free_form_join_queries_and_duplicate_targets() {
        let error = plan(
            r#"
- read: true
  extract: { name: S, column_range: A:B, number_rows: 1 }
  transform:
    add_columns:
      x: { join_query: "SELECT * FROM t JOIN zz_country_lookup USING (country)" }
  load: { name: t }
- read: true
  extract: { name: S, column_range: A:B, number_rows: 1 }
  load: { name: t }
- read: true
  extract: { name: S, column_range: A:B, number_rows: 1 }
  load: { name: zz_country_lookup }
"#,
        )
        .unwrap_err();
        let message = error.to_string();
        assert!(message.contains("join_query is not supported"));
        assert!(message.contains("already loaded by entry #1"));
        assert!(message.contains("reserved for the country lookup"));
    }

    #[test]
    fn validates_reshape_and_datetime_settings() {
        let error = plan(
            r#"
- read: true
  extract: { name: S, column_range: A:C, number_rows: 1 }
  transform:
    datetime: { month: "%Q" }
    reshape: { type: melt, id_vars: [item], value_vars: [item, tanks] }
  load: { name: t }
"#,
        )
        .unwrap_err();
        let EtlError::InvalidRuleDocument(problems) = &error else {
            panic!("expected a problem list, got {error}");
        };
        assert_eq!(problems[0].kind(), ErrorKind::Configuration);
        assert_eq!(problems[1].kind(), ErrorKind::Schema);
    }

    #[test]
    fn builtin_correction_and_custom_rules() {
        let plan = plan(
            r#"
- read: true
  extract: { name: S, column_range: A:D, number_rows: 1 }
  transform: { entry_correction: true }
  load: { name: a }
- read: true
  extract: { name: S, column_range: A:D, number_rows: 1 }
  transform:
    entry_correction:
      - { match_column: country, equals: Estonia, column: 2, value: 0.25 }
  load: { name: b }
"#,
        )
        .unwrap();
        let stages: Vec<&Stage> = plan.enabled().flat_map(|entry| &entry.stages).collect();
        assert_eq!(stages[0], &Stage::Correct(Correction::builtin()));
        assert_eq!(
            stages[1],
            &Stage::Correct(vec![Correction {
                match_column: ColumnRef::Name("country".into()),
                equals: Value::from("Estonia"),
                column: ColumnRef::Position(2),
                value: Value::Double(0.25),
            }])
        );
    }

    #[test]
    fn checks_sheets_against_workbook() {
        let plan = plan("- read: true\n  extract: { name: Missing, column_range: A:B, number_rows: 1 }\n  load: { name: t }\n").unwrap();
        let error = plan.check_sheets("tracker.xlsx", &["Fig 1".to_owned()]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::SourceNotFound);
    }
}
