//! # Country Lookup Tables
//!
//! The country category document maps group labels (political or economic
//! blocs) to member countries and country names to ISO 3166 alpha-3 codes.
//! It is persisted as two lookup tables, independent of the sheet rules:
//!
//! ```yaml
//! EU_Member: [Austria, Belgium]
//! G7: [Canada, France]
//! Geographic_Europe: [Norway]
//! country_codes:
//!   Austria: AUT
//! ```
use crate::database::column::Column;
use crate::database::column::ColumnType;
use crate::database::table::Table;
use crate::database::value::Value;
use crate::error::EtlError;
use crate::error::ResultMessage;
use crate::transform::normalize::clean_column_name;
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::warn;

pub const COUNTRY_LOOKUP_TABLE: &str = "zz_country_lookup";
pub const COUNTRY_GROUPS_TABLE: &str = "zz_country_groups";

/// Tables produced from the country document, always loaded before the rule entries.
pub const COUNTRY_TABLES: [&str; 2] = [COUNTRY_LOOKUP_TABLE, COUNTRY_GROUPS_TABLE];

const EU_MEMBER_GROUP: &str = "EU_Member";
const GEOGRAPHIC_EUROPE_GROUP: &str = "Geographic_Europe";

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct CountryCategories {
    #[serde(default)]
    pub country_codes: IndexMap<String, String>,
    /// Group label to ordered member list
    #[serde(flatten)]
    pub groups: IndexMap<String, Vec<String>>,
}

fn is_country_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|byte| byte.is_ascii_uppercase())
}

impl CountryCategories {
    pub fn parse(text: &str) -> Result<Self, EtlError> {
        let categories: CountryCategories = serde_yaml::from_str(text)?;
        categories.validate()?;
        Ok(categories)
    }

    pub fn from_file(path: &Path) -> Result<Self, EtlError> {
        let text = std::fs::read_to_string(path).map_err(|error| {
            EtlError::ConfigurationError(format!("cannot read country document '{}': {error}", path.display()))
        })?;
        Self::parse(&text).with_prefix(&format!("Country document '{}'", path.display()))
    }

    /// Checks codes and the identifiers the group columns will get.
    pub fn validate(&self) -> Result<(), EtlError> {
        let mut problems = Vec::new();
        for (country, code) in &self.country_codes {
            if !is_country_code(code) {
                problems.push(EtlError::ConfigurationError(format!(
                    "country code '{code}' of '{country}' must be three uppercase letters"
                )));
            }
        }
        let mut identifiers = vec![
            "country_id".to_owned(),
            "country_name".to_owned(),
            "iso3_code".to_owned(),
            "eu_member".to_owned(),
            "geographic_europe".to_owned(),
        ];
        for group in self.flag_groups() {
            let identifier = clean_column_name(group);
            if identifier.is_empty() || identifiers.contains(&identifier) {
                problems.push(EtlError::ConfigurationError(format!(
                    "group '{group}' does not give a distinct column name ('{identifier}')"
                )));
            }
            identifiers.push(identifier);
        }
        match EtlError::from_problems(problems) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Groups that get their own flag column, in document order.
    fn flag_groups(&self) -> impl Iterator<Item = &str> + '_ {
        self.groups
            .keys()
            .map(String::as_str)
            .filter(|group| *group != EU_MEMBER_GROUP && *group != GEOGRAPHIC_EUROPE_GROUP)
    }

    fn is_member(&self, group: &str, country: &str) -> bool {
        self.groups
            .get(group)
            .is_some_and(|members| members.iter().any(|member| member == country))
    }

    /// One row per country found in any group, sorted by name.
    pub fn lookup_table(&self) -> Table {
        let countries: BTreeSet<&str> = self.groups.values().flatten().map(String::as_str).collect();
        for country in self.country_codes.keys() {
            if !countries.contains(country.as_str()) {
                warn!(country = %country, "country code given for a country in no group");
            }
        }

        let flag_groups: Vec<&str> = self.flag_groups().collect();
        let mut columns = vec![
            Column::new("country_id", ColumnType::BigInt),
            Column::new("country_name", ColumnType::Varchar),
            Column::new("iso3_code", ColumnType::Varchar),
        ];
        columns.extend(
            flag_groups
                .iter()
                .map(|group| Column::new(clean_column_name(group), ColumnType::Boolean)),
        );
        columns.push(Column::new("eu_member", ColumnType::Boolean));
        columns.push(Column::new("geographic_europe", ColumnType::Boolean));

        let mut table = Table::new(COUNTRY_LOOKUP_TABLE, columns);
        for (index, country) in countries.into_iter().enumerate() {
            let mut row = vec![
                Value::BigInt(index as i64 + 1),
                Value::from(country),
                self.country_codes
                    .get(country)
                    .map(|code| Value::from(code.as_str()))
                    .unwrap_or_default(),
            ];
            row.extend(
                flag_groups
                    .iter()
                    .map(|group| Value::Boolean(self.is_member(group, country))),
            );
            let eu_member = self.is_member(EU_MEMBER_GROUP, country);
            row.push(Value::Boolean(eu_member));
            row.push(Value::Boolean(
                eu_member || self.is_member(GEOGRAPHIC_EUROPE_GROUP, country),
            ));
            table.rows.push(row);
        }
        table
    }

    /// The group to member mapping, one row per membership.
    pub fn groups_table(&self) -> Table {
        let mut table = Table::new(
            COUNTRY_GROUPS_TABLE,
            vec![
                Column::new("group_name", ColumnType::Varchar),
                Column::new("position", ColumnType::BigInt),
                Column::new("country_name", ColumnType::Varchar),
            ],
        );
        for (group, members) in &self.groups {
            for (position, country) in members.iter().enumerate() {
                table.rows.push(vec![
                    Value::from(group.as_str()),
                    Value::BigInt(position as i64 + 1),
                    Value::from(country.as_str()),
                ]);
            }
        }
        table
    }
}
