use std::{
    fmt,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
    time::{Duration, Instant},
};
use deadpool_postgres::{Pool, PoolError};
use postgres_types::{BorrowToSql, ToSql};
use tokio::sync::OnceCell;
use tokio_postgres::{Row, RowStream};

use crate::prelude::*;
use super::DbConnection;


/// A database transaction that has been started for one API request.
///
/// The connection is checked out of the pool and the transaction is started
/// on the first query, so requests not touching the database work without
/// it. The transaction owns its connection. It has to be finished with
/// [`Transaction::commit`] or [`Transaction::rollback`]. If it is dropped
/// without that, the connection is detached from the pool and closed, so
/// that no other request can ever see the unfinished transaction.
pub(crate) struct Transaction {
    pool: Pool,
    conn: OnceCell<DbConnection>,
    num_queries: AtomicU32,
    unavailable: AtomicBool,
}

/// Error of a [`Transaction`] query.
#[derive(Debug)]
pub(crate) enum DbError {
    /// No connection could be obtained from the pool.
    Unavailable(PoolError),

    /// Starting the transaction or executing the query failed.
    Query(tokio_postgres::Error),
}

impl From<tokio_postgres::Error> for DbError {
    fn from(src: tokio_postgres::Error) -> Self {
        Self::Query(src)
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(e) => write!(f, "failed to obtain DB connection: {e}"),
            Self::Query(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for DbError {}

impl Transaction {
    /// Creates a transaction that will use a connection from `pool`. No
    /// connection is obtained yet.
    pub(crate) fn new(pool: Pool) -> Self {
        Self {
            pool,
            conn: OnceCell::new(),
            num_queries: AtomicU32::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    pub(crate) fn num_queries(&self) -> u32 {
        self.num_queries.load(Ordering::SeqCst)
    }

    /// Whether a query failed because no connection could be obtained.
    pub(crate) fn was_unavailable(&self) -> bool {
        self.unavailable.load(Ordering::SeqCst)
    }

    pub(crate) async fn commit(mut self) -> Result<(), tokio_postgres::Error> {
        self.finish("commit").await
    }

    pub(crate) async fn rollback(mut self) -> Result<(), tokio_postgres::Error> {
        self.finish("rollback").await
    }

    async fn finish(&mut self, statement: &str) -> Result<(), tokio_postgres::Error> {
        // After this, `Drop` sees no connection, even if the statement fails.
        // A failed `commit` leaves no open transaction behind.
        let Some(conn) = self.conn.take() else {
            trace!("No DB connection used: nothing to '{statement}'");
            return Ok(());
        };
        trace!("Finishing transaction with '{statement}'");
        conn.batch_execute(statement).await
    }

    /// Returns the connection of this transaction, obtaining it and starting
    /// the transaction first if this is the first query.
    async fn conn(&self) -> Result<&DbConnection, DbError> {
        self.conn.get_or_try_init(|| self.begin()).await
    }

    async fn begin(&self) -> Result<DbConnection, DbError> {
        let before = Instant::now();
        let conn = self.pool.get().await.map_err(|e| {
            error!("Failed to obtain DB connection for API request: {e}");
            self.unavailable.store(true, Ordering::SeqCst);
            DbError::Unavailable(e)
        })?;

        let acquire_conn_time = before.elapsed();
        if acquire_conn_time > Duration::from_millis(5) {
            warn!("Acquiring DB connection from pool took {:.2?}", acquire_conn_time);
        }

        trace!("Starting transaction");
        conn.batch_execute("begin").await?;
        Ok(conn)
    }

    fn increase_num_queries(&self) {
        self.num_queries.fetch_add(1, Ordering::SeqCst);
    }

    // The following methods mirror the ones from `tokio_postgres::Client` and
    // automatically use the statement cache. This means every query
    // additionally incurs an `RwLock` read lock and a hashmap lookup, but
    // that's a lot cheaper than preparing the statement each time.

    pub(crate) async fn query_one(
        &self,
        query: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Row, DbError> {
        trace!("Executing SQL query: \"{}\" with {:?}", query, params);
        let conn = self.conn().await?;
        let statement = conn.prepare_cached(query).await?;
        self.increase_num_queries();
        conn.query_one(&statement, params).await.map_err(Into::into)
    }

    pub(crate) async fn query_opt(
        &self,
        query: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Option<Row>, DbError> {
        trace!("Executing SQL query: \"{}\" with {:?}", query, params);
        let conn = self.conn().await?;
        let statement = conn.prepare_cached(query).await?;
        self.increase_num_queries();
        conn.query_opt(&statement, params).await.map_err(Into::into)
    }

    pub(crate) async fn query_raw<P, I>(&self, query: &str, params: I) -> Result<RowStream, DbError>
    where
        P: BorrowToSql,
        I: IntoIterator<Item = P> + std::fmt::Debug,
        I::IntoIter: ExactSizeIterator,
    {
        trace!("Executing SQL query: \"{}\" with {:?}", query, params);
        let conn = self.conn().await?;
        let statement = conn.prepare_cached(query).await?;
        self.increase_num_queries();
        conn.query_raw(&statement, params).await.map_err(Into::into)
    }

    pub(crate) async fn execute(
        &self,
        query: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, DbError> {
        trace!("Executing SQL query: \"{}\" with {:?}", query, params);
        let conn = self.conn().await?;
        let statement = conn.prepare_cached(query).await?;
        self.increase_num_queries();
        conn.execute(&statement, params).await.map_err(Into::into)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!("Transaction dropped without commit or rollback: closing its DB connection");
            drop(DbConnection::take(conn));
        }
    }
}
