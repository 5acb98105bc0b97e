//! Newtype wrapper for payment identifiers.
//!
//! A payment id is supplied by the producer and doubles as the file name of
//! the queued item, so it is validated once at construction and never again.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Returned when a string cannot be used as a payment id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid payment id {0:?}: must be 1 to 200 bytes, must not start with '.', and must not contain '/', '\\' or NUL")]
pub struct InvalidPaymentId(pub String);

/// Longest accepted id, in bytes. `<id>.json.lock` must fit in a 255-byte
/// file name.
pub const MAX_PAYMENT_ID_LEN: usize = 200;

/// An externally supplied payment identifier.
///
/// Valid ids are non-empty, at most [`MAX_PAYMENT_ID_LEN`] bytes, contain no
/// path separators or NUL bytes, and do not start with a dot. This keeps
/// `<id>.json` a plain file inside the store directory: no traversal, no
/// hidden files, no clash with `.`/`..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PaymentId(String);

impl PaymentId {
    /// Validates and wraps a payment id.
    pub fn parse(s: impl Into<String>) -> Result<Self, InvalidPaymentId> {
        let s = s.into();
        if s.is_empty()
            || s.len() > MAX_PAYMENT_ID_LEN
            || s.starts_with('.')
            || s.contains('/')
            || s.contains('\\')
            || s.contains('\0')
        {
            return Err(InvalidPaymentId(s));
        }
        Ok(PaymentId(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The item file name for this id (`<id>.json`).
    pub fn file_name(&self) -> String {
        format!("{}.json", self.0)
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for PaymentId {
    type Error = InvalidPaymentId;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        PaymentId::parse(s)
    }
}

impl From<PaymentId> for String {
    fn from(id: PaymentId) -> Self {
        id.0
    }
}
