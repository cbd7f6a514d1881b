//! The farmstand server: a GraphQL API for farms and their products.

use clap::Parser;
use std::env;

use crate::{
    args::{Args, Command},
    config::Config,
    prelude::*,
};

mod api;
mod args;
mod config;
mod cmd;
mod db;
mod http;
mod logger;
mod prelude;


#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Log error in case stdout is not connected and it is logged into a file.
        error!("{:?}", e);

        // Show a somewhat nice representation of the error
        eprintln!();
        eprintln!();
        bunt::eprintln!("{$red}▶▶▶ {$bold}Error:{/$}{/$} {[yellow+intense]}", e);
        eprintln!();
        if e.chain().len() > 1 {
            bunt::eprintln!("{$red+italic}Caused by:{/$}");
        }

        for (i, cause) in e.chain().skip(1).enumerate() {
            eprint!(" {: >1$}", "", i * 2);
            eprintln!("‣ {cause}");
        }

        std::process::exit(1);
    }
}

/// Main entry point.
async fn run() -> Result<()> {
    // If `RUST_BACKTRACE` wasn't already set, we default to `1`. Panics are
    // not expected to happen regularly and a backtrace is almost always
    // useful then.
    if env::var("RUST_BACKTRACE") == Err(env::VarError::NotPresent) {
        env::set_var("RUST_BACKTRACE", "1");
    }

    // Parse CLI args.
    let args = Args::parse();

    // Configure output via `bunt`
    bunt::set_stdout_color_choice(args.stdout_color());
    bunt::set_stderr_color_choice(args.stderr_color());


    // Dispatch subcommand.
    match &args.cmd {
        Command::Serve { shared } => {
            let config = load_config_and_init_logger(shared, &args)?;
            start_server(config).await?;
        }
        Command::Db { cmd, shared } => {
            let config = load_config_and_init_logger(shared, &args)?;
            db::cmd::run(cmd, &config).await?;
        }
        Command::Check { shared } => cmd::check::run(shared, &args).await?,
        Command::WriteConfig { target } => config::write_template(target.as_ref())?,
        Command::ExportApiSchema { args } => cmd::export_api_schema::run(args)?,
    }

    Ok(())
}

async fn start_server(config: Config) -> Result<()> {
    info!("Starting farmstand server ...");
    trace!("Configuration: {:#?}", config);

    let db = db::create_pool(&config.db)
        .context("failed to create database connection pool")?;

    // Requests made while the database is unreachable are answered with 503,
    // so this is not fatal.
    if let Err(e) = db::check_connection(&db).await {
        warn!("Could not connect to database: {e:#}");
    }

    // Start web server
    let root_node = api::root_node();
    http::serve(&config.http, root_node, db).await
        .context("failed to start HTTP server")?;

    info!("Server stopped");
    Ok(())
}


pub(crate) fn load_config_and_init_logger(shared: &args::Shared, args: &Args) -> Result<Config> {
    // Load configuration.
    let (config, path) = Config::load(shared.config.as_deref())?;

    // Initialize logger. Unfortunately, we can only do this here
    // after reading the config.
    logger::init(&config.log, args.stdout_color(), args.cmd.name())?;
    match path {
        Some(path) => info!("Loaded config from '{}'", path.display()),
        None => info!("No config file found: using environment variables and defaults"),
    }

    Ok(config)
}
