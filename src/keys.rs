//! Link-key specifications for dimension tables.
//!
//! A dimension is keyed either by a plain list of its own columns or by an
//! ordered rename map that reconciles the fact table's foreign-key names with
//! the dimension's column names. Both forms resolve into [`ResolvedKeys`]
//! before any SQL is generated.

use std::fmt;

use anyhow::{Result, anyhow, bail, ensure};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::data::sanitize_identifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySpec {
    /// Columns that together identify a dimension row.
    Columns(Vec<String>),
    /// `(sql_name, current_name)` pairs, in declaration order.
    Renamed(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKeys {
    /// Sanitized link-key columns, in declaration order.
    pub columns: Vec<String>,
    /// Sanitized `(current_name, sql_name)` renames to apply to the dimension.
    pub renames: Vec<(String, String)>,
}

impl ResolvedKeys {
    /// Maps an already-sanitized dimension column name through the renames.
    pub fn renamed<'a>(&'a self, column: &'a str) -> &'a str {
        self.renames
            .iter()
            .find(|(from, _)| from == column)
            .map_or(column, |(_, to)| to.as_str())
    }
}

impl KeySpec {
    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        KeySpec::Columns(columns.into_iter().map(Into::into).collect())
    }

    pub fn renamed<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        KeySpec::Renamed(
            pairs
                .into_iter()
                .map(|(sql, current)| (sql.into(), current.into()))
                .collect(),
        )
    }

    /// Sanitized SQL-facing key column names.
    pub fn sql_columns(&self) -> Vec<String> {
        match self {
            KeySpec::Columns(columns) => columns.iter().map(|c| sanitize_identifier(c)).collect(),
            KeySpec::Renamed(pairs) => pairs
                .iter()
                .map(|(sql, _)| sanitize_identifier(sql))
                .collect(),
        }
    }

    pub fn resolve(&self) -> Result<ResolvedKeys> {
        let columns = self.sql_columns();
        ensure!(!columns.is_empty(), "Key specification names no columns");
        for (idx, column) in columns.iter().enumerate() {
            ensure!(!column.is_empty(), "Key specification contains an empty column name");
            if columns[..idx].contains(column) {
                bail!("Key column '{column}' is listed more than once");
            }
        }
        let renames = match self {
            KeySpec::Columns(_) => Vec::new(),
            KeySpec::Renamed(pairs) => {
                let renames = pairs
                    .iter()
                    .map(|(sql, current)| (sanitize_identifier(current), sanitize_identifier(sql)))
                    .collect::<Vec<_>>();
                for (idx, (from, _)) in renames.iter().enumerate() {
                    if renames[..idx].iter().any(|(other, _)| other == from) {
                        bail!("Column '{from}' is renamed more than once");
                    }
                }
                renames
            }
        };
        Ok(ResolvedKeys { columns, renames })
    }
}

impl fmt::Display for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySpec::Columns(columns) => write!(f, "[{}]", columns.join(", ")),
            KeySpec::Renamed(pairs) => {
                let rendered = pairs
                    .iter()
                    .map(|(sql, current)| format!("{sql} <- {current}"))
                    .collect::<Vec<_>>();
                write!(f, "{{{}}}", rendered.join(", "))
            }
        }
    }
}

impl Serialize for KeySpec {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            KeySpec::Columns(columns) => columns.serialize(serializer),
            KeySpec::Renamed(pairs) => {
                let mut mapping = serde_yaml::Mapping::new();
                for (sql, current) in pairs {
                    mapping.insert(
                        serde_yaml::Value::String(sql.clone()),
                        serde_yaml::Value::String(current.clone()),
                    );
                }
                mapping.serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for KeySpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_yaml::Value::deserialize(deserializer)?;
        parse_key_spec(value).map_err(de::Error::custom)
    }
}

fn parse_key_spec(value: serde_yaml::Value) -> Result<KeySpec> {
    if let Some(token) = value.as_str() {
        return Ok(KeySpec::Columns(vec![token.to_string()]));
    }
    if let Some(sequence) = value.as_sequence() {
        let columns = sequence
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| anyhow!("Key columns must be strings, found {item:?}"))
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(KeySpec::Columns(columns));
    }
    if let Some(mapping) = value.as_mapping() {
        let pairs = mapping
            .iter()
            .map(|(sql, current)| {
                let sql = sql
                    .as_str()
                    .ok_or_else(|| anyhow!("Key rename names must be strings, found {sql:?}"))?;
                let current = current.as_str().ok_or_else(|| {
                    anyhow!("Key rename for '{sql}' must be a string, found {current:?}")
                })?;
                Ok((sql.to_string(), current.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(KeySpec::Renamed(pairs));
    }
    Err(anyhow!(
        "Unsupported key specification: expected a list or a mapping, found {value:?}"
    ))
}
