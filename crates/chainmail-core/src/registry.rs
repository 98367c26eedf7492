//! Per-network capability registry.
//!
//! Backends (senders, receivers, name resolvers) are registered per
//! `(protocol, network)` pair. A registry distinguishes three states:
//!
//! | State      | Meaning                                   | `require` error                       |
//! |------------|-------------------------------------------|---------------------------------------|
//! | absent     | the combination is unknown                | [`CoreError::UnsupportedCombination`] |
//! | disabled   | known, but switched off by configuration  | [`CoreError::BackendDisabled`]        |
//! | enabled    | a backend is available                    | none                                  |

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chainmail_protocol::Protocol;
use serde::{Deserialize, Serialize};

use crate::{CoreError, Result};

/// A `(protocol, network)` pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkKey {
    /// Ledger family.
    pub protocol: Protocol,
    /// Network name within the family (`mainnet`, `testnet`, ...).
    pub network: String,
}

impl NetworkKey {
    /// Create a key.
    pub fn new(protocol: Protocol, network: impl Into<String>) -> Self {
        Self {
            protocol,
            network: network.into(),
        }
    }
}

impl fmt::Display for NetworkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.protocol, self.network)
    }
}

/// A registered entry.
pub enum Capability<T: ?Sized> {
    /// The backend is available.
    Enabled(Arc<T>),
    /// The combination is known but switched off.
    Disabled,
}

impl<T: ?Sized> Clone for Capability<T> {
    fn clone(&self) -> Self {
        match self {
            Capability::Enabled(backend) => Capability::Enabled(Arc::clone(backend)),
            Capability::Disabled => Capability::Disabled,
        }
    }
}

/// Result of a registry lookup.
pub enum Lookup<'a, T: ?Sized> {
    /// Nothing registered.
    Absent,
    /// Registered as disabled.
    Disabled,
    /// Registered and enabled.
    Enabled(&'a Arc<T>),
}

impl<T: ?Sized> Lookup<'_, T> {
    /// Whether this is [`Lookup::Absent`].
    pub fn is_absent(&self) -> bool {
        matches!(self, Lookup::Absent)
    }

    /// Whether this is [`Lookup::Disabled`].
    pub fn is_disabled(&self) -> bool {
        matches!(self, Lookup::Disabled)
    }

    /// Whether this is [`Lookup::Enabled`].
    pub fn is_enabled(&self) -> bool {
        matches!(self, Lookup::Enabled(_))
    }
}

/// Backends of one kind keyed by [`NetworkKey`].
pub struct CapabilityRegistry<T: ?Sized> {
    entries: HashMap<NetworkKey, Capability<T>>,
}

impl<T: ?Sized> Default for CapabilityRegistry<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T: ?Sized> Clone for CapabilityRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for CapabilityRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self
            .entries
            .iter()
            .map(|(key, entry)| {
                let state = match entry {
                    Capability::Enabled(_) => "enabled",
                    Capability::Disabled => "disabled",
                };
                format!("{}={}", key, state)
            })
            .collect();
        keys.sort();
        f.debug_struct("CapabilityRegistry")
            .field("entries", &keys)
            .finish()
    }
}

impl<T: ?Sized> CapabilityRegistry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an enabled backend, replacing any previous entry.
    pub fn register(&mut self, key: NetworkKey, backend: Arc<T>) {
        self.entries.insert(key, Capability::Enabled(backend));
    }

    /// Register a combination as known but disabled.
    pub fn disable(&mut self, key: NetworkKey) {
        self.entries.insert(key, Capability::Disabled);
    }

    /// Forget a combination entirely.
    pub fn remove(&mut self, key: &NetworkKey) {
        self.entries.remove(key);
    }

    /// Look up a combination.
    pub fn lookup(&self, key: &NetworkKey) -> Lookup<'_, T> {
        match self.entries.get(key) {
            None => Lookup::Absent,
            Some(Capability::Disabled) => Lookup::Disabled,
            Some(Capability::Enabled(backend)) => Lookup::Enabled(backend),
        }
    }

    /// The enabled backend for a combination.
    ///
    /// # Errors
    ///
    /// - [`CoreError::UnsupportedCombination`] if nothing is registered
    /// - [`CoreError::BackendDisabled`] if the combination is disabled
    pub fn require(&self, key: &NetworkKey) -> Result<Arc<T>> {
        match self.lookup(key) {
            Lookup::Absent => Err(CoreError::UnsupportedCombination(key.clone())),
            Lookup::Disabled => Err(CoreError::BackendDisabled(key.clone())),
            Lookup::Enabled(backend) => Ok(Arc::clone(backend)),
        }
    }

    /// Registered keys, enabled or not.
    pub fn keys(&self) -> impl Iterator<Item = &NetworkKey> {
        self.entries.keys()
    }

    /// Number of registered combinations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    trait Backend: Send + Sync {
        fn name(&self) -> &'static str;
    }

    struct Named(&'static str);

    impl Backend for Named {
        fn name(&self) -> &'static str {
            self.0
        }
    }

    #[test]
    fn test_three_states() {
        let mut registry: CapabilityRegistry<dyn Backend> = CapabilityRegistry::new();
        let mainnet = NetworkKey::new(Protocol::Ethereum, "mainnet");
        let sepolia = NetworkKey::new(Protocol::Ethereum, "sepolia");
        let algorand = NetworkKey::new(Protocol::Algorand, "mainnet");

        registry.register(mainnet.clone(), Arc::new(Named("eth")));
        registry.disable(sepolia.clone());

        assert!(registry.lookup(&mainnet).is_enabled());
        assert!(registry.lookup(&sepolia).is_disabled());
        assert!(registry.lookup(&algorand).is_absent());

        assert_eq!(registry.require(&mainnet).unwrap().name(), "eth");

        let disabled = registry.require(&sepolia).err().unwrap();
        assert!(matches!(disabled, CoreError::BackendDisabled(_)));
        assert_eq!(disabled.kind(), ErrorKind::UnsupportedCombination);

        let absent = registry.require(&algorand).err().unwrap();
        assert!(matches!(absent, CoreError::UnsupportedCombination(ref k) if *k == algorand));
    }

    #[test]
    fn test_remove_and_replace() {
        let mut registry: CapabilityRegistry<dyn Backend> = CapabilityRegistry::new();
        let key = NetworkKey::new(Protocol::Substrate, "polkadot");

        registry.disable(key.clone());
        registry.register(key.clone(), Arc::new(Named("dot")));
        assert!(registry.lookup(&key).is_enabled());

        registry.remove(&key);
        assert!(registry.lookup(&key).is_absent());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_key_display() {
        assert_eq!(
            NetworkKey::new(Protocol::Algorand, "testnet").to_string(),
            "algorand/testnet"
        );
    }
}
