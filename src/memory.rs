//! In-process catalog implementing [`Database`].
//!
//! Used for dry runs (`plan`) and tests. It enforces the subset of MySQL
//! behaviour the linker depends on: tables referenced by a foreign key cannot
//! be dropped, NOT NULL and primary-key uniqueness are checked on insert, and
//! adding a foreign key verifies every existing row. Sessions work on a staged
//! copy of the catalog that is published on commit and discarded on rollback.

use std::{
    cell::RefCell,
    collections::{BTreeMap, HashSet},
};

use anyhow::{Result, anyhow, bail, ensure};
use log::debug;

use crate::{
    data::Value,
    database::{Database, Session, ensure_aligned},
    frame::Frame,
    sql::{ForeignKeyDef, IndexDef, Statement, TableDef, insert_prefix},
};

pub type Row = Vec<Option<Value>>;

#[derive(Debug, Clone)]
pub struct StoredTable {
    pub definition: TableDef,
    pub rows: Vec<Row>,
    pub indexes: Vec<IndexDef>,
    pub foreign_keys: Vec<ForeignKeyDef>,
}

impl StoredTable {
    fn column_positions(&self, columns: &[String]) -> Result<Vec<usize>> {
        columns
            .iter()
            .map(|name| {
                self.definition
                    .columns
                    .iter()
                    .position(|c| &c.name == name)
                    .ok_or_else(|| {
                        anyhow!(
                            "Unknown column `{name}` in table `{}`",
                            self.definition.name
                        )
                    })
            })
            .collect()
    }

    fn key_of(row: &Row, positions: &[usize]) -> Option<Vec<String>> {
        positions
            .iter()
            .map(|&idx| row[idx].as_ref().map(Value::as_display))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
struct Catalog {
    tables: BTreeMap<String, StoredTable>,
    journal: Vec<String>,
}

impl Catalog {
    fn table(&self, name: &str) -> Result<&StoredTable> {
        self.tables
            .get(name)
            .ok_or_else(|| anyhow!("Table `{name}` doesn't exist"))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut StoredTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| anyhow!("Table `{name}` doesn't exist"))
    }

    fn apply(&mut self, statement: &Statement) -> Result<()> {
        match statement {
            Statement::DropTable(name) => self.drop_table(name),
            Statement::CreateTable(definition) => self.create_table(definition),
            Statement::CreateIndex(index) => self.create_index(index),
            Statement::AddForeignKey(fk) => self.add_foreign_key(fk),
        }
    }

    fn drop_table(&mut self, name: &str) -> Result<()> {
        if !self.tables.contains_key(name) {
            return Ok(());
        }
        if let Some((owner, fk)) = self.tables.iter().find_map(|(owner, table)| {
            table
                .foreign_keys
                .iter()
                .find(|fk| fk.referenced_table == name && owner != name)
                .map(|fk| (owner.clone(), fk.name.clone()))
        }) {
            bail!(
                "Cannot drop table `{name}` referenced by foreign key constraint `{fk}` on table `{owner}`"
            );
        }
        self.tables.remove(name);
        Ok(())
    }

    fn create_table(&mut self, definition: &TableDef) -> Result<()> {
        ensure!(
            !self.tables.contains_key(&definition.name),
            "Table `{}` already exists",
            definition.name
        );
        ensure!(!definition.columns.is_empty(), "A table must have at least 1 column");
        for (idx, column) in definition.columns.iter().enumerate() {
            if definition.columns[..idx].iter().any(|c| c.name == column.name) {
                bail!("Duplicate column name `{}`", column.name);
            }
        }
        for key in &definition.primary_key {
            let column = definition
                .column(key)
                .ok_or_else(|| anyhow!("Key column `{key}` doesn't exist in table"))?;
            ensure!(
                !column.nullable,
                "All parts of a PRIMARY KEY must be NOT NULL (`{key}`)"
            );
        }
        self.tables.insert(
            definition.name.clone(),
            StoredTable {
                definition: definition.clone(),
                rows: Vec::new(),
                indexes: Vec::new(),
                foreign_keys: Vec::new(),
            },
        );
        Ok(())
    }

    fn create_index(&mut self, index: &IndexDef) -> Result<()> {
        let table = self.table_mut(&index.table)?;
        table.column_positions(&index.columns)?;
        ensure!(
            !table.indexes.iter().any(|i| i.name == index.name),
            "Duplicate key name `{}`",
            index.name
        );
        table.indexes.push(index.clone());
        Ok(())
    }

    fn add_foreign_key(&mut self, fk: &ForeignKeyDef) -> Result<()> {
        ensure!(
            fk.columns.len() == fk.referenced_columns.len(),
            "Foreign key `{}` column count mismatch",
            fk.name
        );
        ensure!(
            !self
                .tables
                .values()
                .any(|t| t.foreign_keys.iter().any(|existing| existing.name == fk.name)),
            "Duplicate foreign key constraint name `{}`",
            fk.name
        );
        let parent = self.table(&fk.referenced_table)?;
        let parent_positions = parent.column_positions(&fk.referenced_columns)?;
        let mut parent_key = parent.definition.primary_key.clone();
        parent_key.sort();
        let mut referenced = fk.referenced_columns.clone();
        referenced.sort();
        ensure!(
            parent_key == referenced,
            "Missing index for constraint `{}` in the referenced table `{}`",
            fk.name,
            fk.referenced_table
        );
        let parent_keys = parent
            .rows
            .iter()
            .filter_map(|row| StoredTable::key_of(row, &parent_positions))
            .collect::<HashSet<_>>();

        let child = self.table(&fk.table)?;
        let child_positions = child.column_positions(&fk.columns)?;
        for (idx, row) in child.rows.iter().enumerate() {
            if let Some(key) = StoredTable::key_of(row, &child_positions)
                && !parent_keys.contains(&key)
            {
                bail!(
                    "Cannot add foreign key constraint `{}`: row {} references missing {:?} in `{}`",
                    fk.name,
                    idx + 1,
                    key,
                    fk.referenced_table
                );
            }
        }
        self.table_mut(&fk.table)?.foreign_keys.push(fk.clone());
        Ok(())
    }

    fn insert(&mut self, definition: &TableDef, frame: &Frame) -> Result<u64> {
        ensure_aligned(definition, frame)?;
        let table = self.table_mut(&definition.name)?;
        let pk_positions = table.column_positions(&table.definition.primary_key.clone())?;
        let mut seen = table
            .rows
            .iter()
            .filter_map(|row| StoredTable::key_of(row, &pk_positions))
            .collect::<HashSet<_>>();
        let mut staged = Vec::with_capacity(frame.row_count());
        for idx in 0..frame.row_count() {
            let row = frame.row(idx).into_iter().map(|v| v.cloned()).collect::<Row>();
            for (column, value) in table.definition.columns.iter().zip(&row) {
                ensure!(
                    column.nullable || value.is_some(),
                    "Column `{}` cannot be null (row {})",
                    column.name,
                    idx + 1
                );
            }
            if !pk_positions.is_empty()
                && let Some(key) = StoredTable::key_of(&row, &pk_positions)
                && !seen.insert(key.clone())
            {
                bail!(
                    "Duplicate entry {:?} for key `{}`.PRIMARY (row {})",
                    key,
                    definition.name,
                    idx + 1
                );
            }
            staged.push(row);
        }
        let inserted = staged.len() as u64;
        table.rows.extend(staged);
        Ok(inserted)
    }
}

/// Transactional in-memory database with a statement journal.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    catalog: RefCell<Catalog>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.catalog.borrow().tables.keys().cloned().collect()
    }

    pub fn table(&self, name: &str) -> Option<StoredTable> {
        self.catalog.borrow().tables.get(name).cloned()
    }

    pub fn row_count(&self, name: &str) -> Option<usize> {
        self.catalog.borrow().tables.get(name).map(|t| t.rows.len())
    }

    /// Every committed statement in execution order, inserts summarized.
    pub fn journal(&self) -> Vec<String> {
        self.catalog.borrow().journal.clone()
    }
}

impl Database for MemoryDatabase {
    fn session(&self) -> Result<Box<dyn Session + '_>> {
        let staged = self.catalog.borrow().clone();
        Ok(Box::new(MemorySession {
            database: self,
            staged,
        }))
    }
}

struct MemorySession<'a> {
    database: &'a MemoryDatabase,
    staged: Catalog,
}

impl Session for MemorySession<'_> {
    fn execute(&mut self, statement: &Statement) -> Result<()> {
        let rendered = statement.to_string();
        debug!("{rendered}");
        self.staged.apply(statement)?;
        self.staged.journal.push(rendered);
        Ok(())
    }

    fn insert(&mut self, table: &TableDef, frame: &Frame) -> Result<u64> {
        let inserted = self.staged.insert(table, frame)?;
        self.staged.journal.push(format!(
            "{} -- {inserted} row(s)",
            insert_prefix(&table.name, &table.column_names())
        ));
        Ok(inserted)
    }

    fn commit(self: Box<Self>) -> Result<()> {
        *self.database.catalog.borrow_mut() = self.staged;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
