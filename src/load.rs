//! `load` and `plan` commands: read, clean and materialize every source table.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use log::info;

use crate::{
    clean::{CleanOptions, clean_frame},
    cli::{LoadArgs, PlanArgs, SourceArgs},
    config::PipelineConfig,
    database::Database,
    frame::Frame,
    ingest::{ReadOptions, read_frame},
    io_utils,
    linker::{StarSchema, materialize},
    memory::MemoryDatabase,
    mysql::MySqlDatabase,
};

pub fn execute_load(args: &LoadArgs) -> Result<()> {
    let config = PipelineConfig::load_or_default(args.source.config.as_deref())?;
    let frames = prepare_frames(&config, &args.source, Local::now().date_naive())?;
    let database = MySqlDatabase::connect(&args.database_url)?;
    let schema = run_pipeline(&config, &frames, &database)?;
    report(&schema);
    Ok(())
}

pub fn execute_plan(args: &PlanArgs) -> Result<()> {
    let config = PipelineConfig::load_or_default(args.source.config.as_deref())?;
    let frames = prepare_frames(&config, &args.source, Local::now().date_naive())?;
    let database = MemoryDatabase::new();
    let schema = run_pipeline(&config, &frames, &database)?;
    for statement in database.journal() {
        println!("{statement};");
    }
    report(&schema);
    Ok(())
}

/// Reads and cleans every table the pipeline names, in pipeline order.
pub fn prepare_frames(
    config: &PipelineConfig,
    source: &SourceArgs,
    today: NaiveDate,
) -> Result<Vec<Frame>> {
    config.validate()?;
    config
        .tables
        .iter()
        .map(|table| {
            let path = source.data_dir.join(&table.file);
            let delimiter = io_utils::resolve_input_delimiter(&path, source.delimiter);
            let encoding = io_utils::resolve_encoding(table.encoding.as_deref())?;
            let options = ReadOptions {
                na_values: table.na_values.clone(),
                ..ReadOptions::new(delimiter, encoding)
            };
            read_and_clean(&path, &options, &config.cleaning, today)
                .with_context(|| format!("Preparing table {}", table.name))
        })
        .collect()
}

pub fn read_and_clean(
    path: &Path,
    options: &ReadOptions,
    cleaning: &CleanOptions,
    today: NaiveDate,
) -> Result<Frame> {
    let frame = read_frame(path, options)?;
    info!(
        "Read {} row(s) across {} column(s) from {path:?}",
        frame.row_count(),
        frame.columns.len()
    );
    clean_frame(frame, cleaning, today).with_context(|| format!("Cleaning {path:?}"))
}

pub fn run_pipeline(
    config: &PipelineConfig,
    frames: &[Frame],
    database: &dyn Database,
) -> Result<StarSchema> {
    let schema = materialize(
        frames,
        &config.table_names(),
        &config.key_specs(),
        config.fact_index()?,
        database,
    )?;
    Ok(schema)
}

fn report(schema: &StarSchema) {
    for table in schema.dimensions.iter().chain(std::iter::once(&schema.fact)) {
        info!(
            "{}: {} row(s), {} column(s)",
            table.definition.name,
            table.rows,
            table.definition.columns.len()
        );
    }
    for relationship in &schema.relationships {
        info!(
            "{} -> {} via {:?}",
            relationship.foreign_key.name,
            relationship.dimension,
            relationship.foreign_key.columns
        );
    }
}
