//! Pipeline configuration persisted as YAML.
//!
//! A pipeline lists the source tables (CSV file, encoding, target table name,
//! link keys) and the cleaning options. [`PipelineConfig::default`] describes
//! the Global Electronics dataset so the loader runs without a config file.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};

use crate::{clean::CleanOptions, data::sanitize_identifier, keys::KeySpec};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSource {
    /// Target SQL table name.
    pub name: String,
    /// CSV file, relative to the data directory.
    pub file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fact: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<KeySpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub na_values: Vec<String>,
}

/// Missing-value markers applied to the sales, store, product and exchange
/// rate extracts. The customer file keeps them as text because `NA` is a
/// real state code there.
pub const COMMON_NA_VALUES: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

fn common_na_values() -> Vec<String> {
    COMMON_NA_VALUES.iter().map(|v| v.to_string()).collect()
}

impl TableSource {
    fn dimension(name: &str, file: &str, encoding: Option<&str>, keys: KeySpec) -> Self {
        Self {
            name: name.to_string(),
            file: PathBuf::from(file),
            encoding: encoding.map(str::to_string),
            fact: false,
            keys: Some(keys),
            na_values: common_na_values(),
        }
    }

    fn without_na_values(mut self) -> Self {
        self.na_values.clear();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineConfig {
    pub tables: Vec<TableSource>,
    #[serde(default)]
    pub cleaning: CleanOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let sales = TableSource {
            name: "fact_sales".to_string(),
            file: PathBuf::from("Sales.csv"),
            encoding: Some("latin1".to_string()),
            fact: true,
            keys: None,
            na_values: common_na_values(),
        };
        Self {
            tables: vec![
                sales,
                TableSource::dimension(
                    "dim_customers",
                    "Customers.csv",
                    Some("latin1"),
                    KeySpec::columns(["CustomerKey"]),
                )
                .without_na_values(),
                TableSource::dimension("dim_stores", "Stores.csv", None, KeySpec::columns(["StoreKey"])),
                TableSource::dimension(
                    "dim_products",
                    "Products.csv",
                    None,
                    KeySpec::columns(["ProductKey"]),
                ),
                TableSource::dimension(
                    "dim_exchange_rates",
                    "Exchange_Rates.csv",
                    None,
                    KeySpec::renamed([("Order Date", "Date"), ("Currency Code", "Currency")]),
                ),
            ],
            cleaning: CleanOptions::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Reading pipeline file {path:?}"))?;
        let config: PipelineConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Parsing pipeline YAML {path:?}"))?;
        config
            .validate()
            .with_context(|| format!("Validating pipeline {path:?}"))?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise the built-in dataset description.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing pipeline YAML")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = self.to_yaml_string()?;
        fs::write(path, yaml).with_context(|| format!("Writing pipeline file {path:?}"))
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.tables.is_empty(), "Pipeline defines no tables");
        self.fact_index()?;
        for (idx, table) in self.tables.iter().enumerate() {
            let sanitized = sanitize_identifier(&table.name);
            if let Some(other) = self.tables[..idx]
                .iter()
                .find(|t| sanitize_identifier(&t.name) == sanitized)
            {
                bail!(
                    "Tables '{}' and '{}' both map to SQL table `{sanitized}`",
                    other.name,
                    table.name
                );
            }
            match (&table.keys, table.fact) {
                (Some(_), true) => bail!("Fact table '{}' must not declare keys", table.name),
                (None, false) => bail!("Dimension table '{}' has no keys", table.name),
                _ => {}
            }
        }
        Ok(())
    }

    pub fn fact_index(&self) -> Result<usize> {
        let facts = self
            .tables
            .iter()
            .enumerate()
            .filter(|(_, t)| t.fact)
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();
        match facts.as_slice() {
            [idx] => Ok(*idx),
            [] => bail!("Pipeline declares no fact table"),
            _ => bail!("Pipeline declares {} fact tables; exactly one is supported", facts.len()),
        }
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    pub fn key_specs(&self) -> BTreeMap<usize, KeySpec> {
        self.tables
            .iter()
            .enumerate()
            .filter_map(|(idx, t)| t.keys.clone().map(|k| (idx, k)))
            .collect()
    }
}
