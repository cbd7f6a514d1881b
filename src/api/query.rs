use juniper::graphql_object;

use crate::db::types::Key;
use super::{
    Context,
    err::{ApiResult, not_found},
    model::farm::Farm,
};


/// The root query object.
pub(crate) struct Query;

#[graphql_object(context = Context)]
impl Query {
    /// Returns a friendly greeting. Handy to check that the API is up.
    fn hello() -> &'static str {
        "Hello, world!"
    }

    /// Returns the farm with the given ID, including its products. Fails with
    /// a `NOT_FOUND` error if there is no such farm.
    async fn get_farm(id: Key, context: &Context) -> ApiResult<Option<Farm>> {
        match Farm::load_by_key(id, context).await? {
            Some(farm) => Ok(Some(farm)),
            None => Err(not_found!(key = "farm.not-found", "there is no farm with ID {}", id)),
        }
    }

    /// Returns all farms, ordered by ID.
    async fn get_all_farms(context: &Context) -> ApiResult<Vec<Farm>> {
        Farm::load_all(context).await
    }
}
