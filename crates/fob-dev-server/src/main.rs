//! fob-dev - multi-target development server.

use clap::Parser;
use fob_dev_server::{cli, error, logger, ui, Delegates, DevServer, DevServerConfig, ExternalEndpoints};
use fob_multi_compiler::OutputDirEngine;
use miette::Result;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);
    ui::init_colors(args.no_color);

    run(args).await.map_err(error::to_miette)
}

async fn run(args: cli::Cli) -> fob_dev_server::Result<()> {
    let cwd = std::env::current_dir()?;
    let config = DevServerConfig::load(args.config.as_deref(), &cwd, &args.overrides())?;

    let engine = Arc::new(OutputDirEngine::new(config.root_dir.clone()));
    let delegates = Delegates::from_config(&config);

    DevServer::new(config, engine, delegates, ExternalEndpoints::default())?
        .run()
        .await
}
