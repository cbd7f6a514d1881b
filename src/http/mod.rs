//! The HTTP server, handler and routes.
//!
//! This file itself contains fairly little business logic and just sets up the
//! `hyper` server, catches errors and handles graceful shutdown. The main
//! logic is in `handlers.rs`.

use bytes::Bytes;
use deadpool_postgres::Pool;
use http_body_util::Full;
use hyper::service::service_fn;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::{conn::auto, graceful::GracefulShutdown},
};
use std::{
    convert::Infallible,
    future::Future,
    net::{IpAddr, SocketAddr},
    panic::AssertUnwindSafe,
    pin::pin,
    sync::Arc,
    time::Duration,
};
use tokio::net::TcpListener;

use crate::{api, prelude::*};
use self::{
    cors::CorsConfig,
    handlers::handle,
};


pub(crate) mod cors;
mod handlers;
mod log;
pub(crate) mod response;


/// HTTP server configuration.
#[derive(Debug, Clone, confique::Config)]
pub(crate) struct HttpConfig {
    /// The TCP port the HTTP server should listen on.
    #[config(default = 4000, env = "FARMSTAND_HTTP_PORT")]
    pub(crate) port: u16,

    /// The bind address to listen on.
    #[config(default = "0.0.0.0", env = "FARMSTAND_HTTP_ADDRESS")]
    pub(crate) address: IpAddr,

    /// How long to wait for open connections to finish after receiving a
    /// shutdown signal (SIGINT or SIGTERM). Remaining connections are closed
    /// forcefully after that.
    #[config(default = "10s", deserialize_with = crate::config::deserialize_duration)]
    pub(crate) shutdown_timeout: Duration,

    #[config(nested)]
    pub(crate) cors: CorsConfig,
}

impl HttpConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        self.cors.validate().context("invalid `http.cors` configuration")
    }
}


// Our responses always use a fully buffered body. Requests use whatever
// hyper hands us.
pub(crate) type Response<T = Full<Bytes>> = hyper::Response<T>;
type Request<T = hyper::body::Incoming> = hyper::Request<T>;


/// Context that the request handler has access to.
struct Context {
    api_root: api::RootNode,
    db_pool: Pool,
    cors: CorsConfig,
}


/// Starts the HTTP server. The future returned by this function must be awaited
/// to actually run it. It resolves once the server received a shutdown signal
/// and all connections are closed (or the shutdown timeout is reached). The
/// DB pool is closed before returning.
pub(crate) async fn serve(
    config: &HttpConfig,
    api_root: api::RootNode,
    db: Pool,
) -> Result<()> {
    let ctx = Arc::new(Context {
        api_root,
        db_pool: db,
        cors: config.cors.clone(),
    });

    let addr = SocketAddr::new(config.address, config.port);
    let listener = TcpListener::bind(addr).await
        .with_context(|| format!("failed to bind to {addr}"))?;
    info!("Listening on http://{}", listener.local_addr()?);

    let builder = auto::Builder::new(TokioExecutor::new());
    let graceful = GracefulShutdown::new();
    let mut shutdown = pin!(shutdown_signal());

    // Accept loop: every connection is served by its own task. `graceful`
    // keeps track of all of them so that we can wait for them on shutdown.
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("Failed to accept TCP connection: {e}");
                        continue;
                    }
                };

                let ctx = Arc::clone(&ctx);
                let service = service_fn(move |req| {
                    handle_internal_errors(handle(req, Arc::clone(&ctx)))
                });
                let conn = builder.serve_connection(TokioIo::new(stream), service).into_owned();
                let conn = graceful.watch(conn);
                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        debug!("Error while serving connection from {peer}: {e}");
                    }
                });
            }

            _ = &mut shutdown => {
                info!("Received shutdown signal: not accepting new connections anymore");
                break;
            }
        }
    }

    drop(listener);
    tokio::select! {
        _ = graceful.shutdown() => info!("All HTTP connections closed"),
        _ = tokio::time::sleep(config.shutdown_timeout) => {
            warn!(
                "Timed out waiting for HTTP connections to close after {:?}",
                config.shutdown_timeout,
            );
        }
    }

    ctx.db_pool.close();
    info!("Closed database pool");

    Ok(())
}

/// Resolves when the process receives SIGINT or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {e}");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => { stream.recv().await; }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// This just wraps another future and catches all panics that might occur when
/// resolving/polling that given future. This ensures that we always answer with
/// `500` instead of just crashing the thread and closing the connection.
async fn handle_internal_errors(
    future: impl Future<Output = Response>,
) -> Result<Response, Infallible> {
    // The `AssertUnwindSafe` is necessary: a panicking handler does not leave
    // any shared state broken. Its transaction, if any, is dropped without
    // commit, which closes the DB connection.
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(response) => Ok(response),
        Err(panic) => {
            // For most panics (which use `panic!` like `println!`), the payload
            // is either `&str` or `String`.
            let msg = panic.downcast_ref::<String>()
                .map(|s| s.as_str())
                .or(panic.downcast_ref::<&str>().map(|s| *s));

            match msg {
                Some(msg) => error!("INTERNAL SERVER ERROR: HTTP handler panicked: '{}'", msg),
                None => error!("INTERNAL SERVER ERROR: HTTP handler panicked"),
            }

            Ok(response::internal_server_error())
        }
    }
}
