//! Star-schema materialization.
//!
//! [`materialize`] rebuilds one fact table and its dimension tables in
//! foreign-key-safe order:
//!
//! 1. drop the fact table, which owns every foreign key;
//! 2. rebuild each dimension (drop, create with a composite primary key over
//!    its link columns, bulk load);
//! 3. create and bulk load the fact table with NOT NULL foreign-key columns;
//! 4. per dimension, index the fact table's link columns and add the
//!    `fk_<fact>_<dimension>` constraint.
//!
//! Every drop/create, bulk load, index and constraint step runs in its own
//! scoped session and the first failure aborts the run. Table DDL and the
//! row load are separate scopes: MySQL commits DDL implicitly, so a failed
//! load rolls back its rows and leaves the freshly created table empty.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow, ensure};
use itertools::Itertools;
use log::{debug, info};

use crate::{
    data::sanitize_identifier,
    database::{Database, scoped},
    error::LoadError,
    frame::Frame,
    keys::{KeySpec, ResolvedKeys},
    sql::{ForeignKeyDef, IndexDef, Statement, TableDef},
};

#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedTable {
    pub definition: TableDef,
    pub rows: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub dimension: String,
    pub indexes: Vec<IndexDef>,
    pub foreign_key: ForeignKeyDef,
}

/// Description of the schema left in the database by a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct StarSchema {
    pub fact: MaterializedTable,
    pub dimensions: Vec<MaterializedTable>,
    pub relationships: Vec<Relationship>,
}

impl StarSchema {
    pub fn dimension(&self, name: &str) -> Option<&MaterializedTable> {
        self.dimensions.iter().find(|d| d.definition.name == name)
    }
}

fn check_inputs(
    tables: &[Frame],
    table_names: &[String],
    key_specs: &BTreeMap<usize, KeySpec>,
    fact_index: usize,
) -> Result<(), LoadError> {
    let invalid = |msg: String| Err(LoadError::InvalidInput(msg));
    if tables.len() != table_names.len() {
        return invalid(format!(
            "{} table(s) but {} table name(s)",
            tables.len(),
            table_names.len()
        ));
    }
    if fact_index >= tables.len() {
        return invalid(format!(
            "fact index {fact_index} is out of range for {} table(s)",
            tables.len()
        ));
    }
    for idx in (0..tables.len()).filter(|idx| *idx != fact_index) {
        if !key_specs.contains_key(&idx) {
            return invalid(format!(
                "dimension {} (index {idx}) has no key specification",
                table_names[idx]
            ));
        }
    }
    if let Some(idx) = key_specs.keys().find(|idx| **idx >= tables.len()) {
        return invalid(format!("key specification for unknown table index {idx}"));
    }
    if let Some(name) = table_names
        .iter()
        .map(|n| sanitize_identifier(n))
        .duplicates()
        .next()
    {
        return invalid(format!("more than one table maps to SQL table `{name}`"));
    }
    Ok(())
}

/// Applies sanitization and key renames to a dimension frame.
fn prepare_dimension(frame: &Frame, keys: &ResolvedKeys) -> Result<Frame> {
    let mut frame = frame.clone();
    frame.rename_columns(sanitize_identifier);
    for (from, to) in &keys.renames {
        ensure!(
            frame.column_index(from).is_some(),
            "Key column '{from}' (renamed to '{to}') not found"
        );
    }
    frame.rename_columns(|name| keys.renamed(name).to_string());
    for key in &keys.columns {
        ensure!(
            frame.column_index(key).is_some(),
            "Key column '{key}' not found; columns are {:?}",
            frame.headers()
        );
    }
    frame.validate()?;
    Ok(frame)
}

/// Rebuilds the star schema described by `tables` inside `database`.
///
/// `table_names[i]` names `tables[i]`; `tables[fact_index]` is the fact table
/// and every other index must have an entry in `key_specs`.
pub fn materialize(
    tables: &[Frame],
    table_names: &[String],
    key_specs: &BTreeMap<usize, KeySpec>,
    fact_index: usize,
    database: &dyn Database,
) -> Result<StarSchema, LoadError> {
    check_inputs(tables, table_names, key_specs, fact_index)?;
    let names = table_names
        .iter()
        .map(|n| sanitize_identifier(n))
        .collect::<Vec<_>>();
    let fact_name = names[fact_index].clone();

    let mut resolved = BTreeMap::new();
    for (&idx, spec) in key_specs.iter().filter(|(idx, _)| **idx != fact_index) {
        let keys = spec
            .resolve()
            .map_err(|e| LoadError::InvalidInput(format!("{} keys {spec}: {e:#}", names[idx])))?;
        debug!("Dimension {} keyed by {spec}", names[idx]);
        resolved.insert(idx, keys);
    }

    info!("Dropping fact table {fact_name}");
    scoped(database, &format!("dropping {fact_name}"), |session| {
        session.execute(&Statement::DropTable(fact_name.clone()))
    })
    .map_err(|source| LoadError::DropFact {
        table: fact_name.clone(),
        source,
    })?;

    let mut dimensions = Vec::new();
    for (idx, frame) in tables.iter().enumerate() {
        if idx == fact_index {
            continue;
        }
        let name = &names[idx];
        let table = load_dimension(database, name, frame, &resolved[&idx]).map_err(|source| {
            LoadError::Dimension {
                table: name.clone(),
                source,
            }
        })?;
        dimensions.push(table);
    }

    let foreign_key_columns = resolved
        .values()
        .flat_map(|keys| keys.columns.iter().cloned())
        .unique()
        .collect::<Vec<_>>();
    let fact = load_fact(database, &fact_name, &tables[fact_index], &foreign_key_columns)
        .map_err(|source| LoadError::Fact {
            table: fact_name.clone(),
            source,
        })?;

    let mut relationships = Vec::new();
    for (&idx, keys) in &resolved {
        let dimension = &names[idx];
        let relationship =
            link_dimension(database, &fact_name, dimension, keys).map_err(|source| {
                LoadError::Constraint {
                    table: fact_name.clone(),
                    dimension: dimension.clone(),
                    source,
                }
            })?;
        relationships.push(relationship);
    }

    info!(
        "Materialized {} with {} dimension(s) and {} relationship(s)",
        fact_name,
        dimensions.len(),
        relationships.len()
    );
    Ok(StarSchema {
        fact,
        dimensions,
        relationships,
    })
}

fn load_dimension(
    database: &dyn Database,
    name: &str,
    frame: &Frame,
    keys: &ResolvedKeys,
) -> Result<MaterializedTable> {
    let frame = prepare_dimension(frame, keys)?;
    let definition = TableDef::from_frame(name, &frame, &keys.columns, &keys.columns);
    info!(
        "Loading dimension {name}: {} row(s), primary key {:?}",
        frame.row_count(),
        keys.columns
    );
    scoped(database, &format!("creating dimension {name}"), |session| {
        session.execute(&Statement::DropTable(name.to_string()))?;
        session.execute(&Statement::CreateTable(definition.clone()))
    })?;
    let rows = scoped(database, &format!("loading dimension {name}"), |session| {
        session.insert(&definition, &frame)
    })?;
    Ok(MaterializedTable { definition, rows })
}

fn load_fact(
    database: &dyn Database,
    name: &str,
    frame: &Frame,
    foreign_key_columns: &[String],
) -> Result<MaterializedTable> {
    let mut frame = frame.clone();
    frame.rename_columns(sanitize_identifier);
    frame.validate()?;
    if let Some(missing) = foreign_key_columns
        .iter()
        .find(|c| frame.column_index(c).is_none())
    {
        return Err(anyhow!(
            "Foreign key column '{missing}' not found; columns are {:?}",
            frame.headers()
        ));
    }
    let definition = TableDef::from_frame(name, &frame, foreign_key_columns, &[]);
    info!("Loading fact table {name}: {} row(s)", frame.row_count());
    scoped(database, &format!("creating fact table {name}"), |session| {
        session.execute(&Statement::CreateTable(definition.clone()))
    })?;
    let rows = scoped(database, &format!("loading fact table {name}"), |session| {
        session.insert(&definition, &frame)
    })?;
    Ok(MaterializedTable { definition, rows })
}

fn link_dimension(
    database: &dyn Database,
    fact_name: &str,
    dimension: &str,
    keys: &ResolvedKeys,
) -> Result<Relationship> {
    let mut indexes = Vec::with_capacity(keys.columns.len());
    for column in &keys.columns {
        let index = IndexDef::for_column(fact_name, column);
        scoped(database, &format!("creating index {}", index.name), |session| {
            session.execute(&Statement::CreateIndex(index.clone()))
        })?;
        indexes.push(index);
    }
    let foreign_key = ForeignKeyDef::linking(fact_name, dimension, &keys.columns);
    info!("Adding constraint {}", foreign_key.name);
    scoped(
        database,
        &format!("adding constraint {}", foreign_key.name),
        |session| session.execute(&Statement::AddForeignKey(foreign_key.clone())),
    )?;
    Ok(Relationship {
        dimension: dimension.to_string(),
        indexes,
        foreign_key,
    })
}
