use deadpool_postgres::Pool;
use juniper::http::GraphQLBatchRequest;
use secrecy::ExposeSecret;
use serde_json::Value;
use tokio_postgres::{Client, NoTls};

use crate::{api, prelude::*};
use super::super::{DbConfig, create_pool};


async fn conn(config: &DbConfig) -> Result<Client> {
    let mut pg_config = tokio_postgres::config::Config::new();
    pg_config
        .user(&config.user)
        .dbname(&config.database)
        .host(&config.host)
        .port(config.port)
        .application_name("farmstand DB tests");
    if let Some(password) = &config.password {
        pg_config.password(password.expose_secret());
    }

    let (client, connection) = pg_config.connect(NoTls)
        .await
        .context("could not connect to DB in test")?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            panic!("PG connection error: {e}");
        }
    });

    Ok(client)
}

/// A temporary DB with our schema, used for a single unit test. Is removed
/// on drop.
///
/// Be sure to use the multi threaded Tokio runtime or else `drop` will hang
/// indefinitely!
pub(super) struct TestDb {
    pool: Option<Pool>,
    controller: Client,
    db_name: String,
    root: api::RootNode,
}

impl TestDb {
    /// Creates a new temporary database with connection data from the dev
    /// config and creates all tables in it.
    pub(super) async fn new() -> Result<Self> {
        let config = crate::config::Config::load_from(
            concat!(env!("CARGO_MANIFEST_DIR"), "/util/dev-config/config.toml"),
        )
            .context("failed to load config")?;

        // Create connection to original database and create a new temporary one.
        let controller = conn(&config.db).await?;
        let db_name = format!("farmstand_test_{}", rand::random::<u64>());
        controller.execute(&format!("create database {db_name}"), &[]).await
            .context("failed to create temporary test DB")?;

        let pool = create_pool(&DbConfig { database: db_name.clone(), ..config.db })?;
        pool.get().await?
            .batch_execute(include_str!("../../../util/schema.sql"))
            .await
            .context("failed to create tables in test DB")?;

        Ok(Self {
            pool: Some(pool),
            controller,
            db_name,
            root: api::root_node(),
        })
    }

    /// Executes a GraphQL request (single or batch, given as JSON) in its own
    /// transaction, exactly as the HTTP handler does.
    pub(super) async fn execute(&self, request: Value) -> Result<api::Executed> {
        let request: GraphQLBatchRequest = serde_json::from_value(request)?;
        api::execute(&request, &self.root, self.pool()).await
    }

    /// Executes a single GraphQL query and returns the JSON response.
    pub(super) async fn gql(&self, query: &str) -> Result<Value> {
        let out = self.execute(serde_json::json!({ "query": query })).await?;
        Ok(out.response)
    }

    /// Like `gql`, but fails if the response contains errors. Returns `data`.
    pub(super) async fn gql_ok(&self, query: &str) -> Result<Value> {
        let mut response = self.gql(query).await?;
        if let Some(errors) = response.get("errors") {
            bail!("unexpected errors in GraphQL response: {errors}");
        }
        Ok(response["data"].take())
    }

    /// Creates a farm with the given name and products (given as name and
    /// quantity) and returns its ID.
    pub(super) async fn add_farm(&self, name: &str, products: &[(&str, i32)]) -> Result<String> {
        let products = products.iter()
            .map(|(name, quantity)| format!(
                r#"{{ name: "{name}", availability: true, quantity: {quantity},
                    price: 1.5, pictures: [] }}"#,
            ))
            .collect::<Vec<_>>()
            .join(", ");

        let data = self.gql_ok(&format!(r#"mutation {{
            createFarm(input: {{
                farmName: "{name}",
                ownerName: "Owner of {name}",
                address: "1 Farm Road",
                latitude: 47.5,
                longitude: 8.25,
                pictures: [],
                products: [{products}],
            }}) {{ id }}
        }}"#)).await?;

        data["createFarm"]["id"].as_str()
            .map(ToOwned::to_owned)
            .ok_or_else(|| anyhow!("createFarm did not return an ID"))
    }

    /// Returns the number of rows in `table`, bypassing the API.
    pub(super) async fn count(&self, table: &str) -> Result<i64> {
        let row = self.pool().get().await?
            .query_one(&format!("select count(*) from {table}"), &[])
            .await?;
        Ok(row.get(0))
    }

    fn pool(&self) -> &Pool {
        self.pool.as_ref().unwrap()
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        // Since there is no "async drop" in Rust yet, this is a bit annoying.
        // First we need to close the pool to close all connections to the
        // temporary database. Then we drop the database within `block_on`.
        //
        // This code requires the multi threaded Tokio runtime! :(
        if let Some(pool) = self.pool.take() {
            pool.close();
        }
        futures::executor::block_on(async move {
            self.controller.execute(&format!("drop database {} with (force)", self.db_name), &[])
                .await
                .expect("failed to drop temporary test DB");
        });
    }
}
