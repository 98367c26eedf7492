//! Address codec.
//!
//! Each supported protocol fixes exactly one presentable encoding:
//!
//! | Protocol    | Encoding        | Raw layout                                              |
//! |-------------|-----------------|---------------------------------------------------------|
//! | `ethereum`  | `0x` + hex      | 20-byte account                                         |
//! | `substrate` | base58 (SS58)   | 1-2 byte prefix, 32-byte account, 2-byte BLAKE2b check  |
//! | `algorand`  | base32, no pad  | 32-byte public key, 4-byte SHA-512/256 check            |
//!
//! Raw bytes are what the chain clients and the keystore work with. The
//! codec validates length and checksum in both directions, so
//! `decode(encode(raw)) == raw` for every raw value `encode` accepts.
//!
//! ```
//! use chainmail_protocol::address::{decode, encode, EncodingKind};
//!
//! let raw = decode("0xde0b295669a9fd93d5f28d9ec85e40f4cb697bae", "ethereum").unwrap();
//! assert_eq!(raw.len(), 20);
//!
//! let encoded = encode(&raw, "ethereum").unwrap();
//! assert_eq!(encoded.value, "0xde0b295669a9fd93d5f28d9ec85e40f4cb697bae");
//! assert_eq!(encoded.encoding, EncodingKind::HexZeroXPrefix);
//! ```

use std::fmt;
use std::str::FromStr;

use blake2::{Blake2b512, Digest};
use data_encoding::BASE32_NOPAD;
use serde::{Deserialize, Serialize};
use sha2::Sha512_256;

use crate::{ProtocolError, Result};

const ETHEREUM_ADDRESS_LEN: usize = 20;

const SS58_PREFIX: &[u8] = b"SS58PRE";
const SS58_ACCOUNT_LEN: usize = 32;
const SS58_CHECKSUM_LEN: usize = 2;

const ALGORAND_PUBLIC_KEY_LEN: usize = 32;
const ALGORAND_CHECKSUM_LEN: usize = 4;
const ALGORAND_ADDRESS_LEN: usize = ALGORAND_PUBLIC_KEY_LEN + ALGORAND_CHECKSUM_LEN;

/// A supported ledger family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Account-based chains with 20-byte hex addresses.
    Ethereum,
    /// Chains with SS58 base58 addresses.
    Substrate,
    /// Chains with base32 public-key addresses.
    Algorand,
}

impl Protocol {
    /// All supported protocols.
    pub const ALL: [Protocol; 3] = [Protocol::Ethereum, Protocol::Substrate, Protocol::Algorand];

    /// The protocol identifier string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Protocol::Ethereum => "ethereum",
            Protocol::Substrate => "substrate",
            Protocol::Algorand => "algorand",
        }
    }

    /// The canonical address encoding for this protocol.
    pub const fn address_encoding(self) -> EncodingKind {
        match self {
            Protocol::Ethereum => EncodingKind::HexZeroXPrefix,
            Protocol::Substrate => EncodingKind::Base58,
            Protocol::Algorand => EncodingKind::Base32,
        }
    }

    /// The encoding used to present transaction hashes.
    pub const fn hash_encoding(self) -> EncodingKind {
        match self {
            Protocol::Ethereum | Protocol::Substrate => EncodingKind::HexZeroXPrefix,
            Protocol::Algorand => EncodingKind::Base32,
        }
    }

    /// Decode a presentable address into raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedAddress`] if the string is not in
    /// this protocol's encoding or fails the length/checksum rules.
    pub fn decode_address(self, value: &str) -> Result<Vec<u8>> {
        let raw = match self {
            Protocol::Ethereum => {
                let digits = value
                    .strip_prefix("0x")
                    .ok_or_else(|| ProtocolError::malformed_address(self, "missing 0x prefix"))?;
                hex::decode(digits)
                    .map_err(|e| ProtocolError::malformed_address(self, e.to_string()))?
            }
            Protocol::Substrate => bs58::decode(value)
                .into_vec()
                .map_err(|e| ProtocolError::malformed_address(self, e.to_string()))?,
            Protocol::Algorand => BASE32_NOPAD
                .decode(value.as_bytes())
                .map_err(|e| ProtocolError::malformed_address(self, e.to_string()))?,
        };
        self.validate_raw(&raw)?;
        Ok(raw)
    }

    /// Encode raw address bytes into this protocol's presentable form.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedAddress`] if `raw` is not a valid
    /// raw address for this protocol.
    pub fn encode_address(self, raw: &[u8]) -> Result<EncodedAddress> {
        self.validate_raw(raw)?;
        Ok(EncodedValue {
            value: self.address_encoding().encode(raw),
            encoding: self.address_encoding(),
        })
    }

    /// Check raw bytes against this protocol's length and checksum rules.
    pub fn validate_raw(self, raw: &[u8]) -> Result<()> {
        match self {
            Protocol::Ethereum => {
                if raw.len() != ETHEREUM_ADDRESS_LEN {
                    return Err(ProtocolError::malformed_address(
                        self,
                        format!("expected {} bytes, got {}", ETHEREUM_ADDRESS_LEN, raw.len()),
                    ));
                }
            }
            Protocol::Substrate => validate_ss58(raw)?,
            Protocol::Algorand => {
                if raw.len() != ALGORAND_ADDRESS_LEN {
                    return Err(ProtocolError::malformed_address(
                        self,
                        format!("expected {} bytes, got {}", ALGORAND_ADDRESS_LEN, raw.len()),
                    ));
                }
                let (public_key, checksum) = raw.split_at(ALGORAND_PUBLIC_KEY_LEN);
                if algorand_checksum(public_key) != checksum {
                    return Err(ProtocolError::malformed_address(self, "checksum mismatch"));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ProtocolError::UnsupportedProtocol(s.to_string()))
    }
}

/// How a byte string is presented.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncodingKind {
    /// Lowercase hex with a `0x` prefix.
    HexZeroXPrefix,
    /// Bitcoin-alphabet base58.
    Base58,
    /// RFC 4648 base32 without padding.
    Base32,
}

impl EncodingKind {
    /// Stable tag reported alongside encoded values.
    pub const fn as_str(self) -> &'static str {
        match self {
            EncodingKind::HexZeroXPrefix => "hex/0x-prefix",
            EncodingKind::Base58 => "base58/plain",
            EncodingKind::Base32 => "base32/plain",
        }
    }

    /// Encode bytes without any protocol validation.
    pub fn encode(self, bytes: &[u8]) -> String {
        match self {
            EncodingKind::HexZeroXPrefix => format!("0x{}", hex::encode(bytes)),
            EncodingKind::Base58 => bs58::encode(bytes).into_string(),
            EncodingKind::Base32 => BASE32_NOPAD.encode(bytes),
        }
    }
}

impl fmt::Display for EncodingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An encoded value together with the encoding that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedValue {
    /// The presentable string.
    pub value: String,
    /// The encoding used.
    pub encoding: EncodingKind,
}

/// An encoded address. Derived from raw bytes, never stored on its own.
pub type EncodedAddress = EncodedValue;

/// Decode `value` as an address of `protocol`.
///
/// # Errors
///
/// - [`ProtocolError::UnsupportedProtocol`] for unknown protocol identifiers
/// - [`ProtocolError::MalformedAddress`] for invalid strings
pub fn decode(value: &str, protocol: &str) -> Result<Vec<u8>> {
    Protocol::from_str(protocol)?.decode_address(value)
}

/// Encode raw address bytes for `protocol`.
///
/// # Errors
///
/// - [`ProtocolError::UnsupportedProtocol`] for unknown protocol identifiers
/// - [`ProtocolError::MalformedAddress`] for invalid raw bytes
pub fn encode(raw: &[u8], protocol: &str) -> Result<EncodedAddress> {
    Protocol::from_str(protocol)?.encode_address(raw)
}

/// Encode a transaction hash the way `protocol` presents hashes.
pub fn encode_hash(protocol: Protocol, hash: &[u8]) -> EncodedValue {
    let encoding = protocol.hash_encoding();
    EncodedValue {
        value: encoding.encode(hash),
        encoding,
    }
}

/// Encode a block number as `0x`-prefixed hex.
pub fn encode_block_id(block_number: i64) -> EncodedValue {
    EncodedValue {
        value: format!("{:#x}", block_number),
        encoding: EncodingKind::HexZeroXPrefix,
    }
}

/// Build a raw SS58 address from a simple (single byte, < 64) network prefix.
pub fn substrate_raw_address(prefix: u8, account: &[u8; SS58_ACCOUNT_LEN]) -> Result<Vec<u8>> {
    if prefix >= 64 {
        return Err(ProtocolError::malformed_address(
            Protocol::Substrate,
            format!("simple prefix must be below 64, got {}", prefix),
        ));
    }
    let mut raw = Vec::with_capacity(1 + SS58_ACCOUNT_LEN + SS58_CHECKSUM_LEN);
    raw.push(prefix);
    raw.extend_from_slice(account);
    let checksum = ss58_checksum(&raw);
    raw.extend_from_slice(&checksum);
    Ok(raw)
}

/// Build a raw Algorand address from a 32-byte public key.
pub fn algorand_raw_address(public_key: &[u8; ALGORAND_PUBLIC_KEY_LEN]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(ALGORAND_ADDRESS_LEN);
    raw.extend_from_slice(public_key);
    raw.extend_from_slice(&algorand_checksum(public_key));
    raw
}

fn validate_ss58(raw: &[u8]) -> Result<()> {
    let prefix_len = match raw.first() {
        Some(b) if *b < 64 => 1,
        Some(b) if *b < 128 => 2,
        Some(b) => {
            return Err(ProtocolError::malformed_address(
                Protocol::Substrate,
                format!("reserved prefix byte 0x{:02x}", b),
            ))
        }
        None => {
            return Err(ProtocolError::malformed_address(
                Protocol::Substrate,
                "empty address",
            ))
        }
    };

    let expected = prefix_len + SS58_ACCOUNT_LEN + SS58_CHECKSUM_LEN;
    if raw.len() != expected {
        return Err(ProtocolError::malformed_address(
            Protocol::Substrate,
            format!("expected {} bytes, got {}", expected, raw.len()),
        ));
    }

    let (payload, checksum) = raw.split_at(raw.len() - SS58_CHECKSUM_LEN);
    if ss58_checksum(payload) != checksum {
        return Err(ProtocolError::malformed_address(
            Protocol::Substrate,
            "checksum mismatch",
        ));
    }
    Ok(())
}

fn ss58_checksum(payload: &[u8]) -> [u8; SS58_CHECKSUM_LEN] {
    let mut hasher = Blake2b512::new();
    hasher.update(SS58_PREFIX);
    hasher.update(payload);
    let digest = hasher.finalize();
    [digest[0], digest[1]]
}

fn algorand_checksum(public_key: &[u8]) -> [u8; ALGORAND_CHECKSUM_LEN] {
    let digest = Sha512_256::digest(public_key);
    let mut checksum = [0u8; ALGORAND_CHECKSUM_LEN];
    checksum.copy_from_slice(&digest[digest.len() - ALGORAND_CHECKSUM_LEN..]);
    checksum
}

/// A decoded address on a specific network.
///
/// Raw bytes are validated on construction and never change afterwards.
/// Comparing addresses across protocols is meaningless; equality includes
/// the protocol and network.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    protocol: Protocol,
    network: String,
    raw: Vec<u8>,
}

impl Address {
    /// Create an address from raw bytes, validating them.
    pub fn new(protocol: Protocol, network: impl Into<String>, raw: Vec<u8>) -> Result<Self> {
        protocol.validate_raw(&raw)?;
        Ok(Self {
            protocol,
            network: network.into(),
            raw,
        })
    }

    /// Decode a presentable address string.
    pub fn parse(value: &str, protocol: Protocol, network: impl Into<String>) -> Result<Self> {
        let raw = protocol.decode_address(value)?;
        Ok(Self {
            protocol,
            network: network.into(),
            raw,
        })
    }

    /// The protocol.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// The network name.
    pub fn network(&self) -> &str {
        &self.network
    }

    /// The raw address bytes.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// The presentable form of this address.
    pub fn encoded(&self) -> EncodedAddress {
        let encoding = self.protocol.address_encoding();
        EncodedValue {
            value: encoding.encode(&self.raw),
            encoding,
        }
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Address({}/{}/{})",
            self.protocol,
            self.network,
            self.encoded().value
        )
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded().value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ETH_ADDRESS: &str = "0xde0b295669a9fd93d5f28d9ec85e40f4cb697bae";
    const ALICE_SS58: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
    const ALICE_ACCOUNT: &str = "d43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";
    const ALGORAND_ZERO: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAY5HFKQ";

    #[test]
    fn test_ethereum_decode_encode() {
        let raw = decode(ETH_ADDRESS, "ethereum").unwrap();
        assert_eq!(
            raw,
            hex::decode("de0b295669a9fd93d5f28d9ec85e40f4cb697bae").unwrap()
        );

        let encoded = encode(&raw, "ethereum").unwrap();
        assert_eq!(encoded.value, ETH_ADDRESS);
        assert_eq!(encoded.encoding, EncodingKind::HexZeroXPrefix);
    }

    #[test]
    fn test_ethereum_rejects_missing_prefix_and_bad_length() {
        assert!(matches!(
            decode("de0b295669a9fd93d5f28d9ec85e40f4cb697bae", "ethereum"),
            Err(ProtocolError::MalformedAddress { .. })
        ));
        assert!(matches!(
            decode("0xde0b29", "ethereum"),
            Err(ProtocolError::MalformedAddress { .. })
        ));
        assert!(matches!(
            decode("0xzz0b295669a9fd93d5f28d9ec85e40f4cb697bae", "ethereum"),
            Err(ProtocolError::MalformedAddress { .. })
        ));
    }

    #[test]
    fn test_substrate_known_address() {
        let raw = decode(ALICE_SS58, "substrate").unwrap();
        assert_eq!(raw.len(), 35);
        assert_eq!(raw[0], 42);
        assert_eq!(hex::encode(&raw[1..33]), ALICE_ACCOUNT);
        assert_eq!(encode(&raw, "substrate").unwrap().value, ALICE_SS58);
    }

    #[test]
    fn test_substrate_checksum_enforced() {
        let mut raw = decode(ALICE_SS58, "substrate").unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        assert!(matches!(
            encode(&raw, "substrate"),
            Err(ProtocolError::MalformedAddress { .. })
        ));

        let tampered = bs58::encode(&raw).into_string();
        assert!(decode(&tampered, "substrate").is_err());
    }

    #[test]
    fn test_substrate_raw_builder() {
        let raw = substrate_raw_address(42, &[7u8; 32]).unwrap();
        assert!(Protocol::Substrate.validate_raw(&raw).is_ok());
        assert!(substrate_raw_address(64, &[7u8; 32]).is_err());
    }

    #[test]
    fn test_algorand_known_address() {
        let raw = decode(ALGORAND_ZERO, "algorand").unwrap();
        assert_eq!(raw.len(), 36);
        assert!(raw[..32].iter().all(|b| *b == 0));
        assert_eq!(encode(&raw, "algorand").unwrap().value, ALGORAND_ZERO);
    }

    #[test]
    fn test_algorand_checksum_enforced() {
        let mut raw = algorand_raw_address(&[5u8; 32]);
        assert!(encode(&raw, "algorand").is_ok());
        raw[33] ^= 0xff;
        assert!(encode(&raw, "algorand").is_err());
        assert!(decode("not-base32!", "algorand").is_err());
    }

    #[test]
    fn test_unsupported_protocol() {
        assert!(matches!(
            decode(ETH_ADDRESS, "bitcoin"),
            Err(ProtocolError::UnsupportedProtocol(p)) if p == "bitcoin"
        ));
        assert!(matches!(
            encode(&[0u8; 20], ""),
            Err(ProtocolError::UnsupportedProtocol(_))
        ));
    }

    #[test]
    fn test_address_parse_and_display() {
        let address = Address::parse(ETH_ADDRESS, Protocol::Ethereum, "mainnet").unwrap();
        assert_eq!(address.protocol(), Protocol::Ethereum);
        assert_eq!(address.network(), "mainnet");
        assert_eq!(address.to_string(), ETH_ADDRESS);
        assert!(Address::new(Protocol::Ethereum, "mainnet", vec![1, 2, 3]).is_err());
    }

    #[test]
    fn test_hash_and_block_encodings() {
        let eth = encode_hash(Protocol::Ethereum, &[0xab, 0xcd]);
        assert_eq!(eth.value, "0xabcd");
        assert_eq!(eth.encoding.as_str(), "hex/0x-prefix");

        let algo = encode_hash(Protocol::Algorand, &[0u8; 5]);
        assert_eq!(algo.value, "AAAAAAAA");
        assert_eq!(algo.encoding, EncodingKind::Base32);

        assert_eq!(encode_block_id(255).value, "0xff");
        assert_eq!(encode_block_id(0).value, "0x0");
    }
}
