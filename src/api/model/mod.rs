//! Definition of all GraphQL types that represent data in our database.

pub(crate) mod farm;
pub(crate) mod product;
