pub mod clean;
pub mod cli;
pub mod config;
pub mod data;
pub mod database;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod io_utils;
pub mod keys;
pub mod linker;
pub mod load;
pub mod memory;
pub mod mysql;
pub mod sql;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    cli::{Cli, Commands},
    config::PipelineConfig,
    ingest::ReadOptions,
};

pub use crate::{error::LoadError, keys::KeySpec, linker::materialize};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("star_loader", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Load(args) => load::execute_load(&args),
        Commands::Plan(args) => load::execute_plan(&args),
        Commands::Clean(args) => handle_clean(&args),
        Commands::InitConfig(args) => handle_init_config(&args),
    }
}

fn handle_clean(args: &cli::CleanArgs) -> Result<()> {
    let config = PipelineConfig::load_or_default(args.config.as_deref())?;
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let options = ReadOptions {
        na_values: args.na_values.clone(),
        ..ReadOptions::new(delimiter, encoding)
    };
    let frame = load::read_and_clean(
        &args.input,
        &options,
        &config.cleaning,
        Local::now().date_naive(),
    )?;
    let rows = ingest::write_frame(&frame, args.output.as_deref(), delimiter)
        .context("Writing cleaned output")?;
    let destination = args
        .output
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "stdout".to_string());
    info!("Cleaned {rows} row(s) from {:?} -> {destination}", args.input);
    Ok(())
}

fn handle_init_config(args: &cli::InitConfigArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        bail!(
            "{:?} already exists; pass --force to overwrite",
            args.output
        );
    }
    PipelineConfig::default().save(&args.output)?;
    info!("Default pipeline written to {:?}", args.output);
    Ok(())
}
