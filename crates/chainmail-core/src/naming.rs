//! Name-service lookups and status mapping.
//!
//! Resolvers report semantic negatives (the name does not exist, the
//! server refused) as [`NameResolutionError`] sentinels. [`to_status`]
//! turns those into a [`NameServiceStatus`]; anything that is not a
//! sentinel is a real failure and surfaces as [`CoreError::NameResolution`]
//! instead of being squeezed into a status code.
//!
//! | Sentinel                                  | Status     | Code |
//! |-------------------------------------------|------------|------|
//! | none                                      | `NOERROR`  | 0    |
//! | [`NameResolutionError::FormatError`]      | `FORMERR`  | 1    |
//! | [`NameResolutionError::ServerFailure`]    | `SERVFAIL` | 2    |
//! | [`NameResolutionError::NonExistentDomain`]| `NXDOMAIN` | 3    |
//! | [`NameResolutionError::NotImplemented`]   | `NOTIMP`   | 4    |
//! | [`NameResolutionError::Refused`]          | `REFUSED`  | 5    |

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chainmail_protocol::{Address, NameServiceStatus};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::guard::guarded;
use crate::registry::{CapabilityRegistry, NetworkKey};
use crate::{CoreError, Result};

/// What a resolver can report besides a result.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum NameResolutionError {
    /// The query was malformed.
    #[error("malformed query")]
    FormatError,
    /// The resolver could not answer.
    #[error("server failure")]
    ServerFailure,
    /// The name or address has no record.
    #[error("non-existent domain")]
    NonExistentDomain,
    /// The resolver does not support this kind of query.
    #[error("not implemented")]
    NotImplemented,
    /// The resolver refused to answer.
    #[error("refused")]
    Refused,
    /// The resolution mechanism itself failed.
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Map a resolver outcome to a status.
///
/// # Errors
///
/// Returns [`CoreError::NameResolution`] for [`NameResolutionError::Backend`].
pub fn to_status(error: Option<&NameResolutionError>) -> Result<NameServiceStatus> {
    match error {
        None => Ok(NameServiceStatus::Ok),
        Some(NameResolutionError::FormatError) => Ok(NameServiceStatus::FormatError),
        Some(NameResolutionError::ServerFailure) => Ok(NameServiceStatus::ServerFailure),
        Some(NameResolutionError::NonExistentDomain) => Ok(NameServiceStatus::NonExistentDomain),
        Some(NameResolutionError::NotImplemented) => Ok(NameServiceStatus::NotImplemented),
        Some(NameResolutionError::Refused) => Ok(NameServiceStatus::Refused),
        Some(NameResolutionError::Backend(reason)) => Err(CoreError::NameResolution(reason.clone())),
    }
}

/// Forward lookups: name to raw address.
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Resolve `name` to raw address bytes.
    async fn resolve_name(&self, name: &str) -> std::result::Result<Vec<u8>, NameResolutionError>;
}

/// Reverse lookups: raw address to name.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Resolve `raw` address bytes to a name.
    async fn resolve_address(&self, raw: &[u8])
        -> std::result::Result<String, NameResolutionError>;
}

/// Outcome of a forward lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardResolution {
    /// Encoded address, empty unless `status` is ok.
    pub address: String,
    /// Lookup status.
    pub status: NameServiceStatus,
}

/// Outcome of a reverse lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReverseResolution {
    /// Name, empty unless `status` is ok.
    pub name: String,
    /// Lookup status.
    pub status: NameServiceStatus,
}

/// Forward and reverse resolution over per-network resolvers.
pub struct NameService {
    names: CapabilityRegistry<dyn NameResolver>,
    addresses: CapabilityRegistry<dyn AddressResolver>,
    timeout: Duration,
}

impl std::fmt::Debug for NameService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameService")
            .field("names", &self.names)
            .field("addresses", &self.addresses)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl NameService {
    /// Create a service.
    pub fn new(
        names: CapabilityRegistry<dyn NameResolver>,
        addresses: CapabilityRegistry<dyn AddressResolver>,
        timeout: Duration,
    ) -> Self {
        Self {
            names,
            addresses,
            timeout,
        }
    }

    /// Resolve `name` on `key`'s network.
    ///
    /// # Errors
    ///
    /// - [`CoreError::UnsupportedCombination`] / [`CoreError::BackendDisabled`]
    /// - [`CoreError::NameResolution`] if the resolver itself failed
    /// - [`CoreError::Cancelled`] / [`CoreError::Timeout`]
    pub async fn resolve_name(
        &self,
        key: &NetworkKey,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<ForwardResolution> {
        let resolver = self.names.require(key)?;
        let outcome = guarded(cancel, self.timeout, "resolver.resolve_name", async {
            Ok(resolver.resolve_name(name).await)
        })
        .await?;

        let resolution = match outcome {
            Ok(raw) => match key.protocol.encode_address(&raw) {
                Ok(encoded) => ForwardResolution {
                    address: encoded.value,
                    status: NameServiceStatus::Ok,
                },
                Err(e) => {
                    return Err(CoreError::NameResolution(format!(
                        "resolver returned an invalid address: {}",
                        e
                    )))
                }
            },
            Err(sentinel) => ForwardResolution {
                address: String::new(),
                status: to_status(Some(&sentinel))?,
            },
        };
        debug!(%key, status = %resolution.status, "resolved name");
        Ok(resolution)
    }

    /// Resolve the encoded `address` on `key`'s network to a name.
    ///
    /// An address that does not decode for the network's protocol yields
    /// [`NameServiceStatus::FormatError`] without calling the resolver.
    ///
    /// # Errors
    ///
    /// Same as [`NameService::resolve_name`].
    pub async fn resolve_address(
        &self,
        key: &NetworkKey,
        address: &str,
        cancel: &CancellationToken,
    ) -> Result<ReverseResolution> {
        let resolver = self.addresses.require(key)?;
        let raw = match Address::parse(address, key.protocol, key.network.clone()) {
            Ok(parsed) => parsed.raw().to_vec(),
            Err(e) => {
                debug!(%key, error = %e, "reverse lookup of malformed address");
                return Ok(ReverseResolution {
                    name: String::new(),
                    status: NameServiceStatus::FormatError,
                });
            }
        };

        let outcome = guarded(cancel, self.timeout, "resolver.resolve_address", async {
            Ok(resolver.resolve_address(&raw).await)
        })
        .await?;

        let resolution = match outcome {
            Ok(name) => ReverseResolution {
                name,
                status: NameServiceStatus::Ok,
            },
            Err(sentinel) => ReverseResolution {
                name: String::new(),
                status: to_status(Some(&sentinel))?,
            },
        };
        debug!(%key, status = %resolution.status, "resolved address");
        Ok(resolution)
    }
}

/// Fixed name table, usable as both a forward and a reverse resolver.
#[derive(Debug, Default)]
pub struct StaticNameResolver {
    names: RwLock<HashMap<String, Vec<u8>>>,
    errors: RwLock<HashMap<String, NameResolutionError>>,
}

impl StaticNameResolver {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `name` to `raw`.
    pub fn insert(&self, name: impl Into<String>, raw: Vec<u8>) {
        if let Ok(mut names) = self.names.write() {
            names.insert(name.into().to_ascii_lowercase(), raw);
        }
    }

    /// Make lookups of `query` fail with `error`. For reverse lookups the
    /// query is the hex-encoded raw address.
    pub fn fail_with(&self, query: impl Into<String>, error: NameResolutionError) {
        if let Ok(mut errors) = self.errors.write() {
            errors.insert(query.into().to_ascii_lowercase(), error);
        }
    }

    fn scripted(&self, query: &str) -> std::result::Result<(), NameResolutionError> {
        let errors = self
            .errors
            .read()
            .map_err(|_| NameResolutionError::Backend("resolver lock poisoned".into()))?;
        match errors.get(query) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NameResolver for StaticNameResolver {
    async fn resolve_name(&self, name: &str) -> std::result::Result<Vec<u8>, NameResolutionError> {
        let name = name.to_ascii_lowercase();
        self.scripted(&name)?;
        let names = self
            .names
            .read()
            .map_err(|_| NameResolutionError::Backend("resolver lock poisoned".into()))?;
        names
            .get(&name)
            .cloned()
            .ok_or(NameResolutionError::NonExistentDomain)
    }
}

#[async_trait]
impl AddressResolver for StaticNameResolver {
    async fn resolve_address(
        &self,
        raw: &[u8],
    ) -> std::result::Result<String, NameResolutionError> {
        self.scripted(&hex::encode(raw))?;
        let names = self
            .names
            .read()
            .map_err(|_| NameResolutionError::Backend("resolver lock poisoned".into()))?;
        let mut matches: Vec<&String> = names
            .iter()
            .filter(|(_, value)| value.as_slice() == raw)
            .map(|(name, _)| name)
            .collect();
        matches.sort();
        matches
            .first()
            .map(|name| (*name).clone())
            .ok_or(NameResolutionError::NonExistentDomain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use chainmail_protocol::Protocol;

    const RAW: [u8; 20] = [0xab; 20];

    fn service(resolver: Arc<StaticNameResolver>) -> (NameService, NetworkKey) {
        let key = NetworkKey::new(Protocol::Ethereum, "mainnet");
        let mut names: CapabilityRegistry<dyn NameResolver> = CapabilityRegistry::new();
        let mut addresses: CapabilityRegistry<dyn AddressResolver> = CapabilityRegistry::new();
        names.register(key.clone(), resolver.clone());
        addresses.register(key.clone(), resolver);
        (
            NameService::new(names, addresses, Duration::from_secs(5)),
            key,
        )
    }

    #[test]
    fn test_to_status() {
        assert_eq!(to_status(None).unwrap(), NameServiceStatus::Ok);
        assert_eq!(
            to_status(Some(&NameResolutionError::NonExistentDomain))
                .unwrap()
                .code(),
            3
        );
        assert_eq!(
            to_status(Some(&NameResolutionError::Refused)).unwrap().code(),
            5
        );
        let err = to_status(Some(&NameResolutionError::Backend("boom".into()))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn test_forward_and_reverse() {
        let resolver = Arc::new(StaticNameResolver::new());
        resolver.insert("alice.eth", RAW.to_vec());
        let (service, key) = service(resolver);
        let cancel = CancellationToken::new();

        let forward = service
            .resolve_name(&key, "Alice.eth", &cancel)
            .await
            .unwrap();
        assert_eq!(forward.status, NameServiceStatus::Ok);
        assert_eq!(forward.address, format!("0x{}", hex::encode(RAW)));

        let reverse = service
            .resolve_address(&key, &forward.address, &cancel)
            .await
            .unwrap();
        assert_eq!(reverse.name, "alice.eth");
    }

    #[tokio::test]
    async fn test_nxdomain_is_a_result() {
        let (service, key) = service(Arc::new(StaticNameResolver::new()));
        let forward = service
            .resolve_name(&key, "nobody.eth", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(forward.address, "");
        assert_eq!(forward.status.code(), 3);
    }

    #[tokio::test]
    async fn test_backend_failure_is_an_error() {
        let resolver = Arc::new(StaticNameResolver::new());
        resolver.fail_with("broken.eth", NameResolutionError::Backend("rpc down".into()));
        let (service, key) = service(resolver);
        let err = service
            .resolve_name(&key, "broken.eth", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NameResolution(_)));
    }

    #[tokio::test]
    async fn test_malformed_reverse_query() {
        let (service, key) = service(Arc::new(StaticNameResolver::new()));
        let reverse = service
            .resolve_address(&key, "not-an-address", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reverse.status, NameServiceStatus::FormatError);
        assert_eq!(reverse.name, "");
    }

    #[tokio::test]
    async fn test_unregistered_network() {
        let (service, _) = service(Arc::new(StaticNameResolver::new()));
        let err = service
            .resolve_name(
                &NetworkKey::new(Protocol::Algorand, "mainnet"),
                "x",
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedCombination(_)));
    }

    // ==================== Property Tests ====================

    use proptest::prelude::*;

    fn sentinel() -> impl Strategy<Value = NameResolutionError> {
        prop_oneof![
            Just(NameResolutionError::FormatError),
            Just(NameResolutionError::ServerFailure),
            Just(NameResolutionError::NonExistentDomain),
            Just(NameResolutionError::NotImplemented),
            Just(NameResolutionError::Refused),
        ]
    }

    proptest! {
        #[test]
        fn prop_sentinels_map_to_error_codes(error in sentinel()) {
            let status = to_status(Some(&error)).unwrap();
            prop_assert!(!status.is_ok());
            prop_assert!((1..=5).contains(&status.code()));
            prop_assert_eq!(NameServiceStatus::from_code(status.code()), Some(status));
        }

        #[test]
        fn prop_backend_errors_never_become_statuses(reason in ".*") {
            let err = to_status(Some(&NameResolutionError::Backend(reason))).unwrap_err();
            prop_assert_eq!(err.kind(), ErrorKind::Internal);
        }
    }
}
