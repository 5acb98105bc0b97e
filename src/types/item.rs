//! The queued payment item.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ids::PaymentId;

/// One payment request as it sits in a queue store.
///
/// `amount` is opaque to the queue. Any other top-level field of the
/// producer's payload is carried in `extra` so the item reaches the delivery
/// targets and the ledger with everything the producer sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: PaymentId,

    #[serde(default)]
    pub amount: Value,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QueueItem {
    pub fn new(id: PaymentId, amount: impl Into<Value>) -> Self {
        QueueItem {
            id,
            amount: amount.into(),
            extra: Map::new(),
        }
    }

    /// Parses an item from the bytes of a queue file.
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// The canonical encoding: compact JSON on a single line.
    ///
    /// `serde_json` escapes control characters inside strings, so the output
    /// never contains a raw newline. The ledger relies on this.
    pub fn to_canonical_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
