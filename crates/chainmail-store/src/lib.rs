//! # chainmail-store
//!
//! Local persistence for chainmail.
//!
//! Provides:
//! - [`StateStore`]: transactions observed per address, and per-message read state
//! - [`ContentCache`]: decrypted message content keyed by locator
//! - In-memory implementations for tests and ephemeral clients
//! - [`SledStore`]: both traits on one sled database, optionally encrypting
//!   cached plaintext at rest
//!
//! Every implementation is safe to share between concurrent receive calls.
//!
//! ```
//! use chainmail_protocol::{Protocol, Transaction};
//! use chainmail_store::{MemoryStateStore, StateStore};
//!
//! let store = MemoryStateStore::new();
//! let tx = Transaction::new(1, vec![0xaa], vec![0x01]);
//! assert!(store.put_transaction(Protocol::Ethereum, "mainnet", &[0u8; 20], &tx).unwrap());
//! assert_eq!(store.get_transactions(Protocol::Ethereum, "mainnet", &[0u8; 20]).unwrap().len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod error;
pub mod sled_store;
pub mod state;

pub use cache::{ContentCache, MemoryContentCache};
pub use error::{Result, StoreError};
pub use sled_store::SledStore;
pub use state::{MemoryStateStore, StateStore};
