//! API error handling.
//!
//! We define our own error to use for all resolvers. It has a `From` impl to
//! be created from DB errors. This module also offers a couple macros to
//! easily create an error.
//!
//! Besides the message, each error has a coarse "kind" and an optional
//! machine readable "key". Both end up in the `extensions` of the GraphQL
//! error so that clients can tell "no such farm" apart from server problems.

use juniper::{FieldError, IntoFieldError, ScalarValue, graphql_value};

use crate::{db::DbError, prelude::*};


pub(crate) type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub(crate) struct ApiError {
    pub(crate) msg: String,
    pub(crate) kind: ApiErrorKind,
    pub(crate) key: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApiErrorKind {
    /// The requested object does not exist.
    NotFound,

    /// Some server error out of control of the API user.
    InternalServerError,

    /// The database could not be reached. Retrying later might help.
    ServiceUnavailable,
}

impl ApiErrorKind {
    fn kind_str(&self) -> &str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }

    fn message_prefix(&self) -> &str {
        match self {
            Self::NotFound => "Not found",
            Self::InternalServerError => "Internal server error",
            Self::ServiceUnavailable => "Service unavailable",
        }
    }
}

impl From<tokio_postgres::Error> for ApiError {
    fn from(src: tokio_postgres::Error) -> Self {
        // This is the last point where we have the full error, so we log it
        // here. The message sent to the client stays short.
        error!("DB Error when executing query: {src}");
        debug!("Detailed error: {src:#?}");

        Self {
            msg: format!("DB error: {}", src),
            kind: ApiErrorKind::InternalServerError,
            key: None,
        }
    }
}

impl From<DbError> for ApiError {
    fn from(src: DbError) -> Self {
        match src {
            DbError::Query(e) => e.into(),
            DbError::Unavailable(_) => Self {
                msg: "database is not reachable, try again later".into(),
                kind: ApiErrorKind::ServiceUnavailable,
                key: None,
            },
        }
    }
}

impl<S: ScalarValue> IntoFieldError<S> for ApiError {
    fn into_field_error(self) -> FieldError<S> {
        let msg = format!("{}: {}", self.kind.message_prefix(), self.msg);
        let ext = if let Some(key) = self.key {
            graphql_value!({
                "kind": (self.kind.kind_str()),
                "key": key,
            })
        } else {
            graphql_value!({
                "kind": (self.kind.kind_str()),
            })
        };

        FieldError::new(msg, ext)
    }
}


// ===== Helper macros to easily create errors ==================================================

/// Creates an `ApiError` with a `format!` like syntax.
macro_rules! api_err {
    ($kind:ident, key = $key:literal, $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::api::err::ApiError {
            msg: format!($fmt $(, $arg)*),
            kind: $crate::api::err::ApiErrorKind::$kind,
            key: Some($key),
        }
    };
    ($kind:ident, $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::api::err::ApiError {
            msg: format!($fmt $(, $arg)*),
            kind: $crate::api::err::ApiErrorKind::$kind,
            key: None,
        }
    };
}

macro_rules! not_found {
    ($($t:tt)+) => { $crate::api::err::api_err!(NotFound, $($t)*) };
}

pub(crate) use api_err;
pub(crate) use not_found;
