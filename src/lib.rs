pub mod cli;
pub mod config;
pub mod dashboard;
pub mod data;
pub mod error;
pub mod extract;
pub mod frame;
pub mod io_utils;
pub mod keys;
pub mod persist;
pub mod pipeline;
pub mod reconcile;
pub mod source;
pub mod table;
pub mod warehouse;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug};

use crate::{
    cli::{Cli, Commands},
    config::PipelineConfig,
    dashboard::DashboardState,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("northwind_bi", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let mut config = PipelineConfig::load_or_default(cli.config.as_deref())?;
    if let Some(path) = &cli.config {
        debug!("Loaded configuration from {path:?}");
    }
    match cli.command {
        Commands::Extract(args) => {
            args.paths.apply(&mut config);
            if args.input_encoding.is_some() {
                config.input_encoding = args.input_encoding;
            }
            pipeline::run_extract(&config).map(drop)
        }
        Commands::Transform(args) => {
            args.paths.apply(&mut config);
            pipeline::run_transform(&config).map(drop)
        }
        Commands::Load(args) => {
            args.paths.apply(&mut config);
            args.expectation.apply(&mut config);
            pipeline::run_load(&config).map(drop)
        }
        Commands::Export(args) => {
            args.paths.apply(&mut config);
            args.warehouse.apply(&mut config);
            pipeline::run_export(&config).map(drop)
        }
        Commands::Dashboard(args) => {
            args.paths.apply(&mut config);
            if let Some(bind) = args.bind {
                config.dashboard.bind = bind;
            }
            if let Some(title) = args.title {
                config.dashboard.title = title;
            }
            handle_dashboard(&config)
        }
        Commands::Run(args) => {
            args.paths.apply(&mut config);
            args.expectation.apply(&mut config);
            args.warehouse.apply(&mut config);
            if args.input_encoding.is_some() {
                config.input_encoding = args.input_encoding;
            }
            pipeline::run_all(&config, args.export).map(drop)
        }
        Commands::Config(paths) => {
            paths.apply(&mut config);
            print!("{}", config.to_yaml()?);
            Ok(())
        }
    }
}

fn handle_dashboard(config: &PipelineConfig) -> Result<()> {
    let state = DashboardState::new(config.final_parquet(), config.dashboard.title.clone());
    dashboard::serve(state, config.dashboard.bind)
        .with_context(|| format!("Serving the dashboard on {}", config.dashboard.bind))
}
