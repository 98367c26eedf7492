//! # chainmail-core
//!
//! Protocol-agnostic mail pipelines for chainmail.
//!
//! This is the main entry point for applications: it composes messages,
//! seals them into envelopes, publishes them through per-network backends,
//! and turns on-chain transactions back into messages.
//!
//! ## Quick Start
//!
//! ```ignore
//! use chainmail_core::{ClientConfig, MailClient, MemoryLedger, NetworkKey, SendRequest};
//!
//! let ledger = Arc::new(MemoryLedger::new());
//! let client = MailClient::builder(ClientConfig::in_memory())
//!     .with_network(NetworkKey::new(Protocol::Ethereum, "mainnet"), ledger)
//!     .build()?;
//!
//! let request = SendRequest::new(Protocol::Ethereum, "mainnet", alice, bob, "hello", body)
//!     .with_recipient_key(bob_key, "x25519");
//! client.send(request, &cancel).await?;
//!
//! for result in client.receive(&bob_address, Some(true), &options, &cancel).await? {
//!     match result {
//!         Ok(message) => println!("{}: {}", message.block_id.value, message.subject),
//!         Err(failure) => eprintln!("{}", failure),
//!     }
//! }
//! ```
//!
//! ## Architecture
//!
//! - **SendPipeline**: validate, resolve capabilities, encrypt, store, submit
//! - **ReceivePipeline**: refresh, decode, resolve decrypter, open content,
//!   merge read state, one result per transaction
//! - **DecrypterResolver**: ordered key derivation strategies per decrypter kind
//! - **ContentOpener**: cache-first content retrieval
//! - **NameService**: forward and reverse lookups with status mapping
//!
//! Backends are registered per `(protocol, network)` in a
//! [`CapabilityRegistry`] that tells unknown combinations apart from
//! disabled ones.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backends;
pub mod client;
pub mod config;
pub mod content;
pub mod error;
pub mod keystore;
pub mod memory;
pub mod naming;
pub mod receive;
pub mod registry;
pub mod resolver;
pub mod send;

mod guard;

pub use backends::{
    ContentFetcher, ContentStore, NetworkReceiver, NetworkSender, OutgoingTransaction,
    StoredContent,
};
pub use client::{MailClient, MailClientBuilder};
pub use config::{ClientConfig, ClientConfigBuilder, ConfigError};
pub use content::{ContentOpener, OpenedContent};
pub use error::{CoreError, ErrorKind, Result, SendStep};
pub use keystore::{KeyDerivation, KeyDerivationOptions, Keystore, MemoryKeystore, UnlockedKey};
pub use memory::{MemoryContentStore, MemoryLedger};
pub use naming::{
    to_status, AddressResolver, ForwardResolution, NameResolutionError, NameResolver,
    NameService, ReverseResolution, StaticNameResolver,
};
pub use receive::{MessageFailure, MessageResult, ReceiveStage, ReceivePipeline, ReceivedMessage};
pub use registry::{Capability, CapabilityRegistry, Lookup, NetworkKey};
pub use resolver::DecrypterResolver;
pub use send::{SendPipeline, SendRequest};

// Re-export the cancellation token every pipeline call takes
pub use tokio_util::sync::CancellationToken;
