//! On-chain pointer records.

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::limits::MAX_TRANSACTION_SIZE;
use crate::{ProtocolError, Result};

/// One on-chain message pointer observed for an address.
///
/// Produced by a network receiver, persisted by the state store and
/// consumed once per receive by the receive pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Block the transaction was included in.
    pub block_number: i64,
    /// Chain-native transaction hash.
    pub hash: Vec<u8>,
    /// Serialized envelope.
    pub envelope_data: Vec<u8>,
    /// Raw address the recipient should reply to instead, if any.
    pub rekey_address: Option<Vec<u8>>,
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
        .with_limit(MAX_TRANSACTION_SIZE as u64)
}

impl Transaction {
    /// Create a transaction without a rekey address.
    pub fn new(block_number: i64, hash: Vec<u8>, envelope_data: Vec<u8>) -> Self {
        Self {
            block_number,
            hash,
            envelope_data,
            rekey_address: None,
        }
    }

    /// Attach a rekey address.
    pub fn with_rekey_address(mut self, rekey_address: Vec<u8>) -> Self {
        self.rekey_address = Some(rekey_address);
        self
    }

    /// Serialize for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        wire_options()
            .serialize(self)
            .map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Deserialize from storage.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_TRANSACTION_SIZE {
            return Err(ProtocolError::Serialization(format!(
                "transaction too large: {} bytes",
                bytes.len()
            )));
        }
        wire_options()
            .deserialize(bytes)
            .map_err(|e| ProtocolError::Serialization(e.to_string()))
    }
}
