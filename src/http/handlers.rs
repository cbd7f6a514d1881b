use http_body_util::BodyExt;
use hyper::{Method, StatusCode, body::Body, header};
use juniper::http::GraphQLBatchRequest;
use std::{fmt, sync::Arc, time::Instant};

use crate::{api, prelude::*};
use super::{Context, Request, Response, log, response};


/// This is the main HTTP entry point, called for each incoming request.
pub(super) async fn handle<B>(req: Request<B>, ctx: Arc<Context>) -> Response
where
    B: Body,
    B::Error: fmt::Display,
{
    log::req::log(&req);
    log::headers::log(&req);

    let method = req.method().clone();
    let path = req.uri().path().trim_end_matches('/').to_owned();
    let req_headers = req.headers().clone();

    let mut response = match (&method, path.as_str()) {
        // CORS preflight requests are answered for all paths.
        (&Method::OPTIONS, _) => return ctx.cors.preflight(&req_headers),

        (&Method::POST, "/graphql") => handle_api(req, &ctx).await,
        (_, "/graphql") => response::method_not_allowed("POST, OPTIONS"),

        // The interactive GraphQL API explorer/IDE.
        (&Method::GET, "/graphiql") => {
            response::html(juniper::http::graphiql::graphiql_source("/graphql", None))
        }
        (_, "/graphiql") => response::method_not_allowed("GET, OPTIONS"),

        (method, path) => {
            debug!("Responding with 404 to {:?} '{}'", method, path);
            response::not_found()
        }
    };

    ctx.cors.apply(&req_headers, &mut response);
    response
}

/// Handles a request to `/graphql`.
async fn handle_api<B>(req: Request<B>, ctx: &Context) -> Response
where
    B: Body,
    B::Error: fmt::Display,
{
    let before = Instant::now();

    let body = match req.into_body().collect().await {
        Ok(body) => body.to_bytes(),
        Err(e) => {
            warn!("Failed to read body of API request: {e}");
            return response::bad_request(Some("failed to read request body"));
        }
    };

    let request = match serde_json::from_slice::<GraphQLBatchRequest>(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!("Received invalid API request: {e}");
            return response::bad_request(Some(&format!("invalid GraphQL request: {e}")));
        }
    };

    let out = match api::execute(&request, &ctx.api_root, &ctx.db_pool).await {
        Ok(out) => out,
        Err(e) => {
            error!("Failed to execute API request in transaction: {e:#}");
            return response::service_unavailable();
        }
    };

    let body = match serde_json::to_vec(&out.response) {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to serialize API response: {e}");
            return response::internal_server_error();
        }
    };

    debug!(
        "Finished /graphql query in {:.2?} (with {} SQL queries, {})",
        before.elapsed(),
        out.num_queries,
        if out.committed { "committed" } else { "rolled back" },
    );

    let mut response = response::json(body);
    if out.db_unavailable {
        *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
    }
    response.headers_mut().insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-store"));
    response
}
