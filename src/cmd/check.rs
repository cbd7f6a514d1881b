//! A subcommand making sure the configuration can be loaded and the database
//! is reachable.

use crate::{
    args::{Args, Shared},
    load_config_and_init_logger,
    prelude::*,
    db,
};


pub(crate) async fn run(shared: &Shared, args: &Args) -> Result<()> {
    let config = load_config_and_init_logger(shared, args)
        .context("failed to load config: cannot proceed with `check` command")?;

    info!("Starting to verify various things...");
    let server_cert = check_server_cert(&config.db);
    let db_connection = check_db(&config.db).await;
    info!("Done verifing various things");


    // Print summary after all log output
    let mut any_errors = false;
    println!();
    bunt::println!("{$bold+blue+intense}Summary{/$}");
    println!();
    print_outcome(&mut any_errors, "Load configuration", &Ok(()));
    print_outcome(&mut any_errors, "Load DB server certificate", &server_cert);
    print_outcome(&mut any_errors, "Connection to DB", &db_connection);

    println!();
    if any_errors {
        bunt::println!("{$red+intense}➡  Errors have occured!{/$}");
        std::process::exit(1);
    } else {
        bunt::println!("{$green+intense}⮕  Everything OK{/$}");
        Ok(())
    }
}

fn check_server_cert(config: &db::DbConfig) -> Result<()> {
    if let Some(path) = &config.server_cert {
        debug!("Trying to open '{}' for reading...", path.display());
        std::fs::File::open(path)
            .with_context(|| format!("could not open '{}' for reading", path.display()))?;
    }
    Ok(())
}

async fn check_db(config: &db::DbConfig) -> Result<()> {
    let pool = db::create_pool(config)?;
    let out = db::check_connection(&pool).await;
    pool.close();
    out
}

fn print_outcome<T>(any_errors: &mut bool, label: &str, result: &Result<T>) {
    match result {
        Ok(_) => {
            bunt::println!(" ▸ {[bold+intense]}  {$green+bold}✔ ok{/$}", label);
        }
        Err(e) => {
            *any_errors = true;
            bunt::println!(" ▸ {[bold+intense]}  {$red+bold}✘ error{/$}", label);
            bunt::println!("      {$red}▶▶▶ {$bold}Error:{/$}{/$} {[yellow+intense]}", e);
            println!();
            bunt::println!("      {$red+italic}Caused by:{/$}");

            for (i, cause) in e.chain().skip(1).enumerate() {
                print!("       {: >1$}", "", i * 2);
                println!("‣ {cause}");
            }
            println!();
        }
    }
}
