//! Validated email address.
//!
//! Validation is deliberately shallow: a shopper's address only has to be
//! plausible enough to send an order confirmation to. Deliverability is the
//! mail transport's problem.

use core::fmt;

use serde::{Deserialize, Serialize};

/// RFC 5321 upper bound on address length.
const MAX_LEN: usize = 254;

/// Why an address was rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("email cannot be empty")]
    Empty,

    #[error("email exceeds {MAX_LEN} characters")]
    TooLong,

    /// Structurally not `local@domain` with both sides present.
    #[error("email is not a valid address: {0}")]
    Malformed(&'static str),
}

/// A shopper's email address, validated at the boundary.
///
/// Serializes as a plain string; order rows and cart documents store it
/// as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// Validate and wrap an address.
    ///
    /// Accepts anything of the form `local@domain` within the RFC 5321
    /// length limit.
    ///
    /// # Errors
    ///
    /// Returns [`EmailError`] for empty, overlong, or structurally invalid
    /// input.
    pub fn parse(s: &str) -> Result<Self, EmailError> {
        if s.is_empty() {
            return Err(EmailError::Empty);
        }
        if s.len() > MAX_LEN {
            return Err(EmailError::TooLong);
        }
        match s.split_once('@') {
            None => Err(EmailError::Malformed("missing @")),
            Some(("", _)) => Err(EmailError::Malformed("nothing before @")),
            Some((_, "")) => Err(EmailError::Malformed("nothing after @")),
            Some(_) => Ok(Self(s.to_owned())),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unwrap into the owned address string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Email {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Email {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Email {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        // Stored values were validated on the way in.
        Ok(Self(<String as sqlx::Decode<sqlx::Postgres>>::decode(
            value,
        )?))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Email {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plausible_addresses() {
        for ok in [
            "shopper@example.com",
            "first.last+orders@shop.example.co.uk",
            "a@b",
        ] {
            assert!(Email::parse(ok).is_ok(), "{ok}");
        }
    }

    #[test]
    fn test_rejects_structural_garbage() {
        assert_eq!(Email::parse(""), Err(EmailError::Empty));
        assert!(matches!(
            Email::parse("not-an-email"),
            Err(EmailError::Malformed(_))
        ));
        assert!(matches!(
            Email::parse("@example.com"),
            Err(EmailError::Malformed(_))
        ));
        assert!(matches!(
            Email::parse("shopper@"),
            Err(EmailError::Malformed(_))
        ));
    }

    #[test]
    fn test_rejects_overlong_address() {
        let long = format!("{}@example.com", "x".repeat(250));
        assert_eq!(Email::parse(&long), Err(EmailError::TooLong));
    }

    #[test]
    fn test_display_and_unwrap() {
        let email = Email::parse("shopper@example.com").unwrap();
        assert_eq!(email.to_string(), "shopper@example.com");
        assert_eq!(email.as_str(), "shopper@example.com");
        assert_eq!(email.into_inner(), "shopper@example.com");
    }

    #[test]
    fn test_serializes_transparently() {
        let email = Email::parse("shopper@example.com").unwrap();
        let json = serde_json::to_string(&email).unwrap();
        assert_eq!(json, "\"shopper@example.com\"");
        assert_eq!(serde_json::from_str::<Email>(&json).unwrap(), email);
    }
}
