use juniper::graphql_object;

use crate::db::types::Key;
use super::{
    Context,
    err::ApiResult,
    model::farm::{Farm, FarmInput},
};


/// The root mutation object.
pub(crate) struct Mutation;

#[graphql_object(context = Context)]
impl Mutation {
    /// Creates a new farm together with all products listed in `input`.
    async fn create_farm(input: FarmInput, context: &Context) -> ApiResult<Farm> {
        Farm::create(input, context).await
    }

    /// Overwrites all fields of the farm with the given ID. Products listed in
    /// `input` are updated if they have an ID and belong to that farm; other
    /// entries are ignored. Returns `null` if there is no farm with that ID.
    async fn update_farm(id: Key, input: FarmInput, context: &Context) -> ApiResult<Option<Farm>> {
        Farm::update(id, input, context).await
    }

    /// Deletes the farm with the given ID and all its products. Always
    /// returns `true`, also if no such farm existed.
    async fn delete_farm(id: Key, context: &Context) -> ApiResult<bool> {
        Farm::delete(id, context).await?;
        Ok(true)
    }
}
