use crate::db::Transaction;


/// The context that is accessible to every resolver in our API.
pub(crate) struct Context {
    /// The transaction of the current request. All resolvers of a request
    /// share it, so a request either has all its effects or none.
    pub(crate) db: Transaction,
}

impl juniper::Context for Context {}
