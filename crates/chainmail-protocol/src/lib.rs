//! # chainmail-protocol
//!
//! Data model and wire formats for chainmail.
//!
//! This crate provides:
//! - **Address codec**: per-protocol mapping between presentable address
//!   strings (hex, SS58 base58, base32) and raw address bytes
//! - **Envelope codec**: the tagged envelope that tells a recipient how a
//!   message body was encrypted and where it is stored
//! - **Message**: headers + body with a content-derived 144-bit id
//! - **Transaction**: the on-chain pointer record handed to the receiver
//! - **NameServiceStatus**: RFC 1035-style status codes for name lookups

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod envelope;
pub mod error;
pub mod limits;
pub mod message;
pub mod name_service;
pub mod transaction;

#[cfg(test)]
mod proptests;

pub use address::{
    decode, encode, encode_block_id, encode_hash, Address, EncodedAddress, EncodedValue,
    EncodingKind, Protocol,
};
pub use envelope::{Envelope, EnvelopeKind, Location, LocationSource, LocationTable};
pub use error::{ProtocolError, Result};
pub use message::{Headers, Message, MessageId, DEFAULT_CONTENT_TYPE, MESSAGE_ID_SIZE};
pub use name_service::NameServiceStatus;
pub use transaction::Transaction;
