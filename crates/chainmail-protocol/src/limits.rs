//! Protocol limits and constants.
//!
//! All protocol limits are defined here for consistent enforcement.

// === Envelopes ===

/// Maximum serialized envelope size accepted by the decoder (128 KiB).
pub const MAX_ENVELOPE_SIZE: usize = 128 * 1024;

/// Maximum length of a decrypted locator (URL or resource id).
pub const MAX_LOCATOR_LEN: usize = 2048;

// === Messages ===

/// Maximum serialized message size (4 MiB).
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Maximum subject length in bytes.
pub const MAX_SUBJECT_LEN: usize = 998;

// === Transactions ===

/// Maximum serialized transaction record size.
pub const MAX_TRANSACTION_SIZE: usize = MAX_ENVELOPE_SIZE + 1024;
