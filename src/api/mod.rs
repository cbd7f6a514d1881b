//! Definition of the GraphQL API.

use deadpool_postgres::Pool;
use juniper::{EmptySubscription, http::GraphQLBatchRequest};

use crate::{db::Transaction, prelude::*};
use self::{
    mutation::Mutation,
    query::Query,
};

pub(crate) mod err;
pub(crate) mod model;

mod context;
mod mutation;
mod query;

pub(crate) use self::context::Context;


/// Creates and returns the API root node.
pub(crate) fn root_node() -> RootNode {
    RootNode::new(Query, Mutation, EmptySubscription::new())
}

/// Type of our API root node.
pub(crate) type RootNode = juniper::RootNode<'static, Query, Mutation, EmptySubscription<Context>>;


/// The outcome of one executed API request.
pub(crate) struct Executed {
    /// The GraphQL response (`data`/`errors`) as JSON.
    pub(crate) response: serde_json::Value,

    /// Whether the response is free of errors, i.e. whether the transaction
    /// was committed.
    pub(crate) committed: bool,

    /// Whether some resolver failed because no DB connection was available.
    pub(crate) db_unavailable: bool,

    pub(crate) num_queries: u32,
}

/// Executes `request` within a new transaction using a connection from
/// `pool`. The connection is only obtained once a resolver accesses the
/// database.
///
/// The transaction is committed if the response contains no errors and is
/// rolled back otherwise. That includes field errors: a single failing field
/// undoes all effects of the request. For batched requests, all operations
/// share one transaction, so one failing operation rolls back all of them.
pub(crate) async fn execute(
    request: &GraphQLBatchRequest,
    root: &RootNode,
    pool: &Pool,
) -> Result<Executed> {
    let context = Context { db: Transaction::new(pool.clone()) };

    let response = {
        let response = request.execute(root, &context).await;
        serde_json::to_value(&response).context("failed to serialize GraphQL response")?
    };
    let committed = !contains_errors(&response);

    let Context { db } = context;
    let num_queries = db.num_queries();
    let db_unavailable = db.was_unavailable();
    if committed {
        db.commit().await.context("failed to commit transaction")?;
    } else {
        debug!("API request resulted in errors: rolling back transaction");
        db.rollback().await.context("failed to roll back transaction")?;
    }

    Ok(Executed { response, committed, db_unavailable, num_queries })
}

/// Returns whether the serialized (single or batch) response contains any
/// request or field errors.
fn contains_errors(response: &serde_json::Value) -> bool {
    match response {
        serde_json::Value::Array(responses) => responses.iter().any(contains_errors),
        single => single.get("errors").is_some(),
    }
}
