//! This module defines the command line arguments farmstand accepts.

use std::path::PathBuf;
use termcolor::ColorChoice;

use crate::{cmd, db::cmd::DbCommand};


#[derive(Debug, clap::Parser)]
#[command(about = "GraphQL API for managing farms and their products.", version)]
pub(crate) struct Args {
    #[command(subcommand)]
    pub(crate) cmd: Command,

    /// Whether to use colors and other ANSI codes in the output.
    #[arg(long, global = true, value_enum, default_value_t = ColorMode::Auto)]
    pub(crate) color: ColorMode,
}

#[derive(Debug, clap::Subcommand)]
pub(crate) enum Command {
    /// Starts the HTTP server serving the GraphQL API.
    Serve {
        #[command(flatten)]
        shared: Shared,
    },

    /// Checks the configuration and the database connection.
    ///
    /// Exits with 0 if everything is Ok, and with 1 otherwise.
    Check {
        #[command(flatten)]
        shared: Shared,
    },

    /// Database operations.
    Db {
        #[command(subcommand)]
        cmd: DbCommand,

        #[command(flatten)]
        shared: Shared,
    },

    /// Outputs a template for the configuration file (which includes
    /// descriptions or all options).
    WriteConfig {
        /// Target file. If not specified, the template is written to stdout.
        target: Option<PathBuf>,
    },

    /// Exports the API as GraphQL schema.
    ExportApiSchema {
        #[command(flatten)]
        args: cmd::export_api_schema::Args,
    },
}

impl Command {
    /// Short name used for log files.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Serve { .. } => "serve",
            Self::Check { .. } => "check",
            Self::Db { .. } => "db",
            Self::WriteConfig { .. } | Self::ExportApiSchema { .. } => "other",
        }
    }
}

#[derive(Debug, clap::Args)]
pub(crate) struct Shared {
    /// Path to the configuration file. If this is not specified, farmstand
    /// will check `FARMSTAND_CONFIG_PATH` and then try opening `config.toml`
    /// or `/etc/farmstand/config.toml`. Without any file, only environment
    /// variables and defaults are used.
    #[arg(short, long)]
    pub(crate) config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum ColorMode {
    Auto,
    Always,
    Never,
}

impl Args {
    pub(crate) fn stdout_color(&self) -> ColorChoice {
        match self.color {
            ColorMode::Auto if std::io::IsTerminal::is_terminal(&std::io::stdout()) => {
                ColorChoice::Auto
            }
            ColorMode::Auto => ColorChoice::Never,
            ColorMode::Always => ColorChoice::Always,
            ColorMode::Never => ColorChoice::Never,
        }
    }

    pub(crate) fn stderr_color(&self) -> ColorChoice {
        match self.color {
            ColorMode::Auto if std::io::IsTerminal::is_terminal(&std::io::stderr()) => {
                ColorChoice::Auto
            }
            ColorMode::Auto => ColorChoice::Never,
            ColorMode::Always => ColorChoice::Always,
            ColorMode::Never => ColorChoice::Never,
        }
    }
}
