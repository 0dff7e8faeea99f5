//! Identifier types for iap-billing.
//!
//! Store-assigned purchase identifiers arrive as opaque strings and are
//! wrapped in validated newtypes. Queue jobs get their own time-ordered
//! `JobId` so operators can correlate log lines with queue rows.
//!
//! # Macro-based ID Types
//!
//! The `store_id_type!` macro reduces boilerplate for the string-backed
//! identifier types, ensuring consistent validation, serialization, parsing,
//! and display.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Longest identifier accepted from a client or a platform notification.
pub const MAX_ID_LENGTH: usize = 128;

/// Macro to define a string-backed identifier type with standard trait implementations.
///
/// This macro generates a newtype wrapper around `String` with implementations for:
/// - `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - `Serialize`, `Deserialize` (as string, validated)
/// - `FromStr`, `Display`, `Debug`
/// - `TryFrom<String>`, `Into<String>`
/// - `AsRef<[u8]>`
///
/// Values are trimmed; empty values and values longer than `MAX_ID_LENGTH`
/// are rejected.
macro_rules! store_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create a validated identifier.
            ///
            /// # Errors
            ///
            /// Returns an error if the value is blank or too long.
            pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
                let value = value.into();
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(IdError::Empty);
                }
                if trimmed.len() > MAX_ID_LENGTH {
                    return Err(IdError::TooLong {
                        max: MAX_ID_LENGTH,
                    });
                }
                if trimmed.len() == value.len() {
                    Ok(Self(value))
                } else {
                    Ok(Self(trimmed.to_string()))
                }
            }

            /// Return the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                self.0.as_bytes()
            }
        }
    };
}

store_id_type!(
    TransactionId,
    "A platform-assigned purchase transaction identifier.\n\nEvery renewal of a subscription carries a new transaction id."
);
store_id_type!(
    OriginalTransactionId,
    "The stable identifier of a subscription's renewal lineage.\n\nAll renewals of one subscription share this id; subscription rows are keyed by it."
);

impl From<TransactionId> for OriginalTransactionId {
    /// The first transaction of a lineage is its own original transaction.
    fn from(id: TransactionId) -> Self {
        Self(id.0)
    }
}

/// A queue job identifier using ULID for time-ordering.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(Ulid);

impl JobId {
    /// Create a new `JobId` from a ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Generate a new `JobId` with the current timestamp.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Return the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> &Ulid {
        &self.0
    }
}

impl FromStr for JobId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ulid = Ulid::from_string(s).map_err(|_| IdError::InvalidUlid)?;
        Ok(Self(ulid))
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for JobId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0.to_string()
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is empty or only whitespace.
    #[error("identifier is empty")]
    Empty,

    /// The input exceeds the maximum identifier length.
    #[error("identifier exceeds {max} characters")]
    TooLong {
        /// Maximum accepted length.
        max: usize,
    },

    /// The input is not a valid ULID.
    #[error("invalid ULID format")]
    InvalidUlid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_id_trims_whitespace() {
        let id = TransactionId::new("  1000000123456789 ").unwrap();
        assert_eq!(id.as_str(), "1000000123456789");
    }

    #[test]
    fn transaction_id_rejects_blank() {
        assert_eq!(TransactionId::new("   "), Err(IdError::Empty));
        assert_eq!(TransactionId::new(""), Err(IdError::Empty));
    }

    #[test]
    fn transaction_id_rejects_overlong() {
        let long = "x".repeat(MAX_ID_LENGTH + 1);
        assert_eq!(
            TransactionId::new(long),
            Err(IdError::TooLong { max: MAX_ID_LENGTH })
        );
    }

    #[test]
    fn transaction_id_serde_json() {
        let id = TransactionId::new("tx1").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"tx1\"");
        let parsed: TransactionId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn blank_transaction_id_fails_deserialization() {
        let parsed: Result<TransactionId, _> = serde_json::from_str("\" \"");
        assert!(parsed.is_err());
    }

    #[test]
    fn original_transaction_id_from_transaction_id() {
        let tx = TransactionId::new("tx1").unwrap();
        let original = OriginalTransactionId::from(tx);
        assert_eq!(original.as_str(), "tx1");
    }

    #[test]
    fn job_id_roundtrip() {
        let id = JobId::generate();
        let parsed = JobId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn job_id_rejects_garbage() {
        assert_eq!(JobId::from_str("not-a-ulid"), Err(IdError::InvalidUlid));
    }
}
