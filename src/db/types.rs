use std::fmt;

use juniper::{GraphQLScalar, InputValue, ScalarValue};
use postgres_types::{FromSql, ToSql};


/// Our primary database ID type, which we call "key". In the database, it's a
/// `bigint` (`i64`), assigned by the database on insert.
///
/// In the API, keys are exposed as `ID`, serialized as decimal string. As
/// input, both the string form and a plain integer are accepted.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, FromSql, ToSql, GraphQLScalar)]
#[postgres(transparent)]
#[graphql(
    name = "ID",
    description = "A server-generated identifier",
    to_output_with = Self::to_output,
    from_input_with = Self::from_input,
    parse_token(String, i32),
)]
pub(crate) struct Key(pub(crate) i64);

impl Key {
    fn to_output<S: ScalarValue>(&self) -> juniper::Value<S> {
        juniper::Value::scalar(self.0.to_string())
    }

    fn from_input<S: ScalarValue>(input: &InputValue<S>) -> Result<Self, String> {
        if let Some(i) = input.as_int_value() {
            return Ok(Self(i.into()));
        }

        let s = input.as_string_value().ok_or("expected string or integer for ID")?;
        s.parse().map_err(|e| format!("invalid ID '{s}': {e}"))
    }
}

impl std::str::FromStr for Key {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.0)
    }
}
