//! Configuration for the chainmail client.
//!
//! # Example
//!
//! ```
//! use chainmail_core::config::ClientConfigBuilder;
//! use std::time::Duration;
//!
//! let config = ClientConfigBuilder::new()
//!     .with_in_memory_storage()
//!     .with_request_timeout(Duration::from_secs(10))
//!     .with_location(1, "https://gateway.example/ipfs")
//!     .with_default_envelope("0x50")
//!     .build_validated()
//!     .unwrap();
//! assert_eq!(config.receive.concurrency, 8);
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chainmail_crypto::KdfParams;
use chainmail_protocol::{EnvelopeKind, LocationTable};
use serde::{Deserialize, Serialize};

/// Default per-call timeout for collaborator requests.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default number of transactions processed concurrently per receive.
const DEFAULT_RECEIVE_CONCURRENCY: usize = 8;

/// Main client configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Local storage.
    pub storage: StorageConfig,

    /// Collaborator calls.
    pub network: NetworkConfig,

    /// Receive pipeline.
    pub receive: ReceiveConfig,

    /// Content locations.
    pub locations: LocationConfig,

    /// Key sealing.
    pub keystore: KeystoreConfig,
}

impl ClientConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Create a configuration for in-memory operation (useful for testing).
    pub fn in_memory() -> Self {
        ClientConfigBuilder::new().with_in_memory_storage().build()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.storage.in_memory && self.storage.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "storage.data_dir".into(),
                reason: "data directory cannot be empty when not using in-memory storage".into(),
            });
        }

        if self.network.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "network.request_timeout".into(),
                reason: "request timeout must be greater than zero".into(),
            });
        }

        if self.receive.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "receive.concurrency".into(),
                reason: "concurrency must be greater than zero".into(),
            });
        }

        if let Err(e) = self.locations.default_envelope.parse::<EnvelopeKind>() {
            return Err(ConfigError::InvalidValue {
                field: "locations.default_envelope".into(),
                reason: e.to_string(),
            });
        }

        if let Some((code, _)) = self
            .locations
            .codes
            .iter()
            .find(|(_, base)| base.trim().is_empty())
        {
            return Err(ConfigError::InvalidValue {
                field: format!("locations.codes.{}", code),
                reason: "base URL cannot be empty".into(),
            });
        }

        let kdf = &self.keystore.kdf;
        if kdf.iterations == 0 || kdf.parallelism == 0 {
            return Err(ConfigError::InvalidValue {
                field: "keystore.kdf".into(),
                reason: "iterations and parallelism must be greater than zero".into(),
            });
        }
        if kdf.memory_kib < 8 * kdf.parallelism {
            return Err(ConfigError::InvalidValue {
                field: "keystore.kdf.memory_kib".into(),
                reason: "memory must be at least 8 KiB per lane".into(),
            });
        }

        Ok(())
    }
}

/// Storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for the sled database.
    ///
    /// Defaults to the platform data directory, e.g. `~/.local/share/chainmail`.
    pub data_dir: PathBuf,

    /// Keep everything in memory. Data is lost when the client is dropped.
    pub in_memory: bool,

    /// Seal cached plaintext on disk.
    pub encrypt_cache: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            in_memory: false,
            encrypt_cache: true,
        }
    }
}

/// Collaborator call configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Upper bound on any single keystore, chain or storage call.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Receive pipeline configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReceiveConfig {
    /// Transactions processed concurrently within one receive call.
    pub concurrency: usize,

    /// Refresh from the network when the caller does not say.
    pub refresh_by_default: bool,
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_RECEIVE_CONCURRENCY,
            refresh_by_default: true,
        }
    }
}

/// Content location configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Location code to base URL, for content-addressed envelopes.
    pub codes: BTreeMap<u64, String>,

    /// Envelope kind used when a send request names none.
    pub default_envelope: String,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            codes: BTreeMap::new(),
            default_envelope: EnvelopeKind::Inline.name().to_string(),
        }
    }
}

impl LocationConfig {
    /// The code table used to resolve content-addressed envelopes.
    pub fn table(&self) -> LocationTable {
        LocationTable::from(self.codes.clone())
    }
}

/// Keystore configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KeystoreConfig {
    /// Argon2id cost for passphrase-sealed seeds.
    pub kdf: KdfParams,
}

/// Builder for constructing `ClientConfig` with custom values.
#[derive(Clone, Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    /// Build the final configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }

    /// Build and validate the configuration.
    pub fn build_validated(self) -> Result<ClientConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }

    // ===== Storage Configuration =====

    /// Set the data directory.
    pub fn with_data_dir(mut self, path: PathBuf) -> Self {
        self.config.storage.data_dir = path;
        self
    }

    /// Use in-memory storage.
    pub fn with_in_memory_storage(mut self) -> Self {
        self.config.storage.in_memory = true;
        self
    }

    /// Use disk storage (default).
    pub fn with_disk_storage(mut self) -> Self {
        self.config.storage.in_memory = false;
        self
    }

    /// Seal cached plaintext on disk (default).
    pub fn with_encrypted_cache(mut self) -> Self {
        self.config.storage.encrypt_cache = true;
        self
    }

    /// Store cached plaintext as-is.
    pub fn with_unencrypted_cache(mut self) -> Self {
        self.config.storage.encrypt_cache = false;
        self
    }

    // ===== Network Configuration =====

    /// Set the per-call timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.network.request_timeout = timeout;
        self
    }

    // ===== Receive Configuration =====

    /// Set how many transactions are processed at once.
    pub fn with_receive_concurrency(mut self, concurrency: usize) -> Self {
        self.config.receive.concurrency = concurrency;
        self
    }

    /// Set the default refresh behaviour.
    pub fn with_refresh_by_default(mut self, refresh: bool) -> Self {
        self.config.receive.refresh_by_default = refresh;
        self
    }

    // ===== Location Configuration =====

    /// Map a location code to a base URL.
    pub fn with_location(mut self, code: u64, base_url: impl Into<String>) -> Self {
        self.config.locations.codes.insert(code, base_url.into());
        self
    }

    /// Set the default envelope kind by name (`"0x01"`, `"0x02"`, `"0x50"`).
    pub fn with_default_envelope(mut self, kind: impl Into<String>) -> Self {
        self.config.locations.default_envelope = kind.into();
        self
    }

    // ===== Keystore Configuration =====

    /// Set the Argon2id cost parameters.
    pub fn with_kdf_params(mut self, params: KdfParams) -> Self {
        self.config.keystore.kdf = params;
        self
    }
}

/// Configuration error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid configuration value.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The field name.
        field: String,
        /// The reason it's invalid.
        reason: String,
    },
}

/// Get the default data directory for the current platform.
fn default_data_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("chainmail");
    }

    if let Some(home_dir) = dirs::home_dir() {
        return home_dir.join(".chainmail");
    }

    PathBuf::from(".chainmail")
}

/// Serde support for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    #[derive(Serialize, Deserialize)]
    struct DurationRepr {
        secs: u64,
        nanos: u32,
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        DurationRepr {
            secs: duration.as_secs(),
            nanos: duration.subsec_nanos(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let repr = DurationRepr::deserialize(deserializer)?;
        Ok(Duration::new(repr.secs, repr.nanos))
    }
}
