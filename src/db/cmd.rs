use std::path::{Path, PathBuf};

use crate::{prelude::*, config::Config};
use super::{DbConnection, create_pool};


#[derive(Debug, clap::Subcommand)]
pub(crate) enum DbCommand {
    /// Runs an `.sql` script with the configured database connection. Use
    /// this with `util/schema.sql` to create the tables `farmstand` expects.
    Script {
        /// Path to a file containing an SQL script.
        script: PathBuf,
    },
}

/// Entry point for `db` commands.
pub(crate) async fn run(cmd: &DbCommand, config: &Config) -> Result<()> {
    // Connect to database
    let pool = create_pool(&config.db)?;
    let db = pool.get().await.context("failed to connect to database")?;

    // Dispatch command
    match cmd {
        DbCommand::Script { script } => run_script(&db, script).await?,
    }

    drop(db);
    pool.close();
    Ok(())
}

async fn run_script(db: &DbConnection, script_path: &Path) -> Result<()> {
    let script = tokio::fs::read_to_string(script_path)
        .await
        .context(format!("failed to read script file '{}'", script_path.display()))?;

    db.batch_execute(&script).await.context("failed to execute script")?;
    info!("Successfully ran SQL script '{}'", script_path.display());

    Ok(())
}
