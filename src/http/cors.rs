//! Cross Origin Resource Sharing (CORS).
//!
//! There is one policy for the whole server: a list of allowed origins,
//! where `*` allows every origin.

use hyper::{
    HeaderMap,
    StatusCode,
    header::{self, HeaderValue},
};
use std::time::Duration;

use crate::prelude::*;
use super::Response;


#[derive(Debug, Clone, confique::Config)]
pub(crate) struct CorsConfig {
    /// Origins that are allowed to access the API from a browser, e.g.
    /// `["https://farms.example.com"]`. The entry `"*"` allows all origins.
    /// An empty list disables CORS headers completely.
    #[config(default = ["*"])]
    pub(crate) allowed_origins: Vec<String>,

    /// How long browsers may cache the result of a preflight request. "0"
    /// means that no `Access-Control-Max-Age` header is sent.
    #[config(default = "0", deserialize_with = crate::config::deserialize_duration)]
    pub(crate) max_age: Duration,
}

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";

impl CorsConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        for origin in &self.allowed_origins {
            if origin != "*" && (origin.ends_with('/') || !origin.contains("://")) {
                bail!("'{origin}' is not a valid origin (expected e.g. 'https://example.com')");
            }
            if HeaderValue::from_str(origin).is_err() {
                bail!("'{origin}' contains characters that are not allowed in HTTP headers");
            }
        }

        if self.allows_any_origin() && self.allowed_origins.len() > 1 {
            warn!("`http.cors.allowed_origins` contains \"*\": all other entries are irrelevant");
        }

        Ok(())
    }

    pub(crate) fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }

    /// Returns the value for `Access-Control-Allow-Origin` for a request with
    /// the given headers, or `None` if the origin is not allowed.
    fn allow_origin(&self, req_headers: &HeaderMap) -> Option<HeaderValue> {
        if self.allows_any_origin() {
            return Some(HeaderValue::from_static("*"));
        }

        let origin = req_headers.get(header::ORIGIN)?;
        self.allowed_origins.iter()
            .any(|allowed| allowed.as_bytes() == origin.as_bytes())
            .then(|| origin.clone())
    }

    /// Adds the CORS headers to a normal (non-preflight) response.
    pub(crate) fn apply(&self, req_headers: &HeaderMap, response: &mut Response) {
        let headers = response.headers_mut();
        if !self.allows_any_origin() && !self.allowed_origins.is_empty() {
            headers.append(header::VARY, HeaderValue::from_static("origin"));
        }

        if let Some(origin) = self.allow_origin(req_headers) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }
    }

    /// Answers a preflight `OPTIONS` request.
    pub(crate) fn preflight(&self, req_headers: &HeaderMap) -> Response {
        let mut response = Response::new(Default::default());
        *response.status_mut() = StatusCode::NO_CONTENT;
        self.apply(req_headers, &mut response);

        // Preflights of disallowed origins get no permissions at all.
        if self.allow_origin(req_headers).is_none() {
            return response;
        }

        let headers = response.headers_mut();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        if let Some(requested) = req_headers.get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
            headers.append(
                header::VARY,
                HeaderValue::from_static("access-control-request-headers"),
            );
        }
        if !self.max_age.is_zero() {
            headers.insert(header::ACCESS_CONTROL_MAX_AGE, self.max_age.as_secs().into());
        }

        response
    }
}
