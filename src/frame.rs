//! In-memory column store shared by ingest, cleaning and the schema linker.
//!
//! A [`Frame`] is an ordered list of named [`Column`]s. Every column carries a
//! single [`ColumnType`] and one optional [`Value`] per row; `None` marks a
//! missing cell. Rows are aligned by position across all columns.

use anyhow::{Result, bail, ensure};

use crate::data::{ColumnType, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub datatype: ColumnType,
    pub values: Vec<Option<Value>>,
}

impl Column {
    pub fn new(name: impl Into<String>, datatype: ColumnType, values: Vec<Option<Value>>) -> Self {
        Self {
            name: name.into(),
            datatype,
            values,
        }
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    pub fn has_missing(&self) -> bool {
        self.values.iter().any(Option::is_none)
    }

    /// Verifies every present value matches the declared datatype.
    pub fn ensure_homogeneous(&self) -> Result<()> {
        for (row, value) in self.values.iter().enumerate() {
            if let Some(value) = value
                && value.column_type() != self.datatype
            {
                bail!(
                    "Column '{}' is declared {} but row {} holds a {} value",
                    self.name,
                    self.datatype,
                    row + 1,
                    value.column_type()
                );
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub columns: Vec<Column>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper used heavily by tests and the CSV reader.
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        datatype: ColumnType,
        values: Vec<Option<Value>>,
    ) -> Result<Self> {
        self.push_column(Column::new(name, datatype, values))?;
        Ok(self)
    }

    pub fn push_column(&mut self, column: Column) -> Result<()> {
        ensure!(
            self.column_index(&column.name).is_none(),
            "Column '{}' already exists",
            column.name
        );
        if let Some(first) = self.columns.first() {
            ensure!(
                first.values.len() == column.values.len(),
                "Column '{}' has {} row(s) but the frame has {}",
                column.name,
                column.values.len(),
                first.values.len()
            );
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Returns the cells of one row, in column order.
    pub fn row(&self, index: usize) -> Vec<Option<&Value>> {
        self.columns
            .iter()
            .map(|c| c.values.get(index).and_then(Option::as_ref))
            .collect()
    }

    pub fn rename_columns<F>(&mut self, mut rename: F)
    where
        F: FnMut(&str) -> String,
    {
        for column in &mut self.columns {
            column.name = rename(&column.name);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let rows = self.row_count();
        for (idx, column) in self.columns.iter().enumerate() {
            ensure!(
                column.values.len() == rows,
                "Column '{}' has {} row(s) but the frame has {}",
                column.name,
                column.values.len(),
                rows
            );
            if let Some(dup) = self.columns[..idx].iter().find(|c| c.name == column.name) {
                bail!("Duplicate column name '{}'", dup.name);
            }
            column.ensure_homogeneous()?;
        }
        Ok(())
    }
}
