//! ISBN type.
//!
//! Catalog ISBNs use the store's `ddd-dddddddddd` layout (a three digit
//! prefix, a dash, then ten digits). Uniqueness is enforced by the database.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Errors that can occur when parsing an [`Isbn`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IsbnError {
    /// The input does not match `ddd-dddddddddd`.
    #[error("ISBN must look like 978-0123456789")]
    InvalidFormat,
}

/// A validated ISBN in `ddd-dddddddddd` form.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Isbn(String);

impl Isbn {
    /// Parse an ISBN.
    ///
    /// # Errors
    ///
    /// Returns `IsbnError::InvalidFormat` unless the input is three digits, a
    /// dash and ten digits.
    pub fn parse(s: &str) -> Result<Self, IsbnError> {
        let s = s.trim();
        let (prefix, body) = s.split_once('-').ok_or(IsbnError::InvalidFormat)?;
        let all_digits = |part: &str, len: usize| {
            part.len() == len && part.bytes().all(|b| b.is_ascii_digit())
        };
        if !all_digits(prefix, 3) || !all_digits(body, 10) {
            return Err(IsbnError::InvalidFormat);
        }
        Ok(Self(s.to_owned()))
    }

    /// Returns the ISBN as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Isbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Isbn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Isbn {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Isbn {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::parse(&s)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Isbn {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}
