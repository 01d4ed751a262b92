//! Per-table cleaning applied before a frame is handed to the schema linker.
//!
//! Steps run in a fixed order: zero-fill of designated columns, numeric mean
//! imputation, delivery-date backfill, date normalization, age derivation,
//! price normalization and finally categorical mode imputation. Malformed
//! dates degrade to missing values; every other problem is an error.

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    data::{ColumnType, Value, parse_timestamp},
    frame::{Column, Frame},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CleanOptions {
    /// Numeric columns whose gaps mean "none" rather than "unknown".
    pub zero_fill_columns: Vec<String>,
    /// Text columns holding formatted currency amounts such as `$1,024.50`.
    pub price_columns: Vec<String>,
    pub order_date_column: String,
    pub delivery_date_column: String,
    /// Case-insensitive name fragments marking date-like columns.
    pub date_markers: Vec<String>,
    pub birthday_marker: String,
    pub age_column: String,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            zero_fill_columns: vec!["Square Meters".to_string()],
            price_columns: vec!["Unit Cost USD".to_string(), "Unit Price USD".to_string()],
            order_date_column: "Order Date".to_string(),
            delivery_date_column: "Delivery Date".to_string(),
            date_markers: vec!["date".to_string(), "day".to_string()],
            birthday_marker: "birthday".to_string(),
            age_column: "Age".to_string(),
        }
    }
}

impl CleanOptions {
    fn is_date_like(&self, name: &str) -> bool {
        let lowered = name.to_lowercase();
        self.date_markers
            .iter()
            .any(|marker| lowered.contains(&marker.to_lowercase()))
    }
}

/// Cleans one frame. `today` anchors the age calculation.
pub fn clean_frame(mut frame: Frame, options: &CleanOptions, today: NaiveDate) -> Result<Frame> {
    frame.validate().context("Validating frame before cleaning")?;
    let rows = frame.row_count();

    zero_fill(&mut frame, &options.zero_fill_columns);
    fill_numeric_means(&mut frame);
    backfill_delivery_dates(&mut frame, options);
    normalize_dates(&mut frame, options);
    derive_age(&mut frame, options, today)?;
    normalize_prices(&mut frame, &options.price_columns)?;
    fill_categorical_modes(&mut frame)?;

    debug_assert_eq!(frame.row_count(), rows);
    Ok(frame)
}

fn zero_fill(frame: &mut Frame, columns: &[String]) {
    for name in columns {
        let Some(column) = frame.column_mut(name) else {
            continue;
        };
        let zero = match column.datatype {
            ColumnType::Integer => Value::Integer(0),
            ColumnType::Float => Value::Float(0.0),
            other => {
                warn!("Skipping zero-fill for '{name}': column is {other}");
                continue;
            }
        };
        let filled = column.missing_count();
        for cell in column.values.iter_mut().filter(|v| v.is_none()) {
            *cell = Some(zero.clone());
        }
        if filled > 0 {
            debug!("Zero-filled {filled} cell(s) in '{name}'");
        }
    }
}

fn fill_numeric_means(frame: &mut Frame) {
    for column in frame
        .columns
        .iter_mut()
        .filter(|c| c.datatype.is_numeric() && c.has_missing())
    {
        let present = column
            .values
            .iter()
            .flatten()
            .filter_map(Value::as_f64)
            .collect::<Vec<_>>();
        if present.is_empty() {
            warn!("Column '{}' has no values to average; leaving gaps", column.name);
            continue;
        }
        let mean = present.iter().sum::<f64>() / present.len() as f64;
        if column.datatype == ColumnType::Integer {
            widen_to_float(column);
        }
        let filled = column.missing_count();
        for cell in column.values.iter_mut().filter(|v| v.is_none()) {
            *cell = Some(Value::Float(mean));
        }
        debug!("Filled {filled} cell(s) in '{}' with mean {mean}", column.name);
    }
}

fn widen_to_float(column: &mut Column) {
    for value in column.values.iter_mut().flatten() {
        if let Value::Integer(i) = value {
            *value = Value::Float(*i as f64);
        }
    }
    column.datatype = ColumnType::Float;
}

fn backfill_delivery_dates(frame: &mut Frame, options: &CleanOptions) {
    let Some(order_idx) = frame.column_index(&options.order_date_column) else {
        return;
    };
    let Some(delivery_idx) = frame.column_index(&options.delivery_date_column) else {
        return;
    };
    let order_values = frame.columns[order_idx].values.clone();
    let delivery = &mut frame.columns[delivery_idx];
    let mut filled = 0usize;
    for (cell, order) in delivery.values.iter_mut().zip(order_values) {
        if cell.is_none() && order.is_some() {
            *cell = order;
            filled += 1;
        }
    }
    if filled > 0 {
        debug!(
            "Backfilled {filled} '{}' value(s) from '{}'",
            options.delivery_date_column, options.order_date_column
        );
    }
}

fn normalize_dates(frame: &mut Frame, options: &CleanOptions) {
    for column in frame
        .columns
        .iter_mut()
        .filter(|c| options.is_date_like(&c.name))
    {
        let mut unparsable = 0usize;
        for cell in column.values.iter_mut() {
            let parsed = cell.as_ref().and_then(|value| match value {
                Value::DateTime(dt) => Some(*dt),
                other => parse_timestamp(&other.as_display()).ok(),
            });
            if cell.is_some() && parsed.is_none() {
                unparsable += 1;
            }
            *cell = parsed.map(Value::DateTime);
        }
        column.datatype = ColumnType::DateTime;
        if unparsable > 0 {
            warn!(
                "Column '{}': {unparsable} value(s) could not be parsed as dates",
                column.name
            );
        }
    }
}

/// Whole years elapsed between `birth` and `today`.
pub fn age_on(birth: NaiveDateTime, today: NaiveDate) -> i64 {
    let years = i64::from(today.year() - birth.year());
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years - 1
    } else {
        years
    }
}

fn derive_age(frame: &mut Frame, options: &CleanOptions, today: NaiveDate) -> Result<()> {
    let marker = options.birthday_marker.to_lowercase();
    let Some(birthday) = frame
        .columns
        .iter()
        .find(|c| c.name.to_lowercase().contains(&marker))
    else {
        return Ok(());
    };
    let ages = birthday
        .values
        .iter()
        .map(|cell| match cell {
            Some(Value::DateTime(dt)) => Some(Value::Integer(age_on(*dt, today))),
            _ => None,
        })
        .collect::<Vec<_>>();
    match frame.column_mut(&options.age_column) {
        Some(existing) => {
            existing.datatype = ColumnType::Integer;
            existing.values = ages;
        }
        None => frame.push_column(Column::new(&options.age_column, ColumnType::Integer, ages))?,
    }
    Ok(())
}

fn normalize_prices(frame: &mut Frame, columns: &[String]) -> Result<()> {
    let noise = Regex::new(r"[^\d.\-]").context("Compiling price pattern")?;
    for name in columns {
        let Some(column) = frame.column_mut(name) else {
            continue;
        };
        for (row, cell) in column.values.iter_mut().enumerate() {
            let Some(value) = cell.as_ref() else {
                continue;
            };
            let amount = match value {
                Value::Float(f) => *f,
                Value::Integer(i) => *i as f64,
                other => {
                    let raw = other.as_display();
                    let stripped = noise.replace_all(&raw, "");
                    stripped.parse::<f64>().map_err(|_| {
                        anyhow!("Column '{name}' row {}: '{raw}' is not a price", row + 1)
                    })?
                }
            };
            *cell = Some(Value::Float(amount));
        }
        column.datatype = ColumnType::Float;
    }
    Ok(())
}

/// Most frequent value; ties resolve to the lexicographically smallest.
pub fn mode<'a, I>(values: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|(a_value, a_count), (b_value, b_count)| {
            a_count.cmp(b_count).then_with(|| b_value.cmp(a_value))
        })
        .map(|(value, _)| value)
}

fn fill_categorical_modes(frame: &mut Frame) -> Result<()> {
    for column in frame
        .columns
        .iter_mut()
        .filter(|c| c.datatype == ColumnType::String && c.has_missing())
    {
        let most_common = mode(column.values.iter().flatten().filter_map(|v| match v {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }))
        .map(str::to_string);
        let Some(most_common) = most_common else {
            bail!(
                "Column '{}' has no values to derive a mode from",
                column.name
            );
        };
        let filled = column.missing_count();
        for cell in column.values.iter_mut().filter(|v| v.is_none()) {
            *cell = Some(Value::String(most_common.clone()));
        }
        debug!(
            "Filled {filled} cell(s) in '{}' with mode '{most_common}'",
            column.name
        );
    }
    Ok(())
}
