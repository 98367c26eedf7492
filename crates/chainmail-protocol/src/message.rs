//! Mail messages and content-derived message ids.
//!
//! A [`Message`] is what the envelope's location descriptor ultimately
//! points at: headers plus body, serialized with bincode and encrypted by
//! the sender. The [`MessageId`] is derived from the content, so fetching
//! the same logical message twice always yields the same id. Read state is
//! keyed by it.

use std::fmt;

use bincode::Options;
use chainmail_crypto::Hash256;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::limits::{MAX_MESSAGE_SIZE, MAX_SUBJECT_LEN};
use crate::{ProtocolError, Result};

/// Size of a message id in bytes (144 bits).
pub const MESSAGE_ID_SIZE: usize = 18;

/// Content type used when the sender gives none.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=\"UTF-8\"";

/// Domain separator for message id derivation.
const MESSAGE_ID_DOMAIN: &[u8] = b"CHAINMAIL-MESSAGE-ID-v1";

/// A 144-bit content-derived message identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId([u8; MESSAGE_ID_SIZE]);

impl MessageId {
    /// Wrap raw id bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; MESSAGE_ID_SIZE] = bytes.try_into().map_err(|_| {
            ProtocolError::InvalidMessage(format!(
                "message id must be {} bytes, got {}",
                MESSAGE_ID_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// Raw id bytes.
    pub fn as_bytes(&self) -> &[u8; MESSAGE_ID_SIZE] {
        &self.0
    }

    /// Lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the hex form.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| ProtocolError::InvalidMessage(format!("message id: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Derive the id for `headers` and `body`.
    pub fn derive(headers: &Headers, body: &[u8]) -> Self {
        let seconds = headers.date.timestamp().to_le_bytes();
        let nanos = headers.date.timestamp_subsec_nanos().to_le_bytes();
        let reply_to = optional_field(headers.reply_to.as_deref());
        let rekey_to = optional_field(headers.rekey_to.as_deref());

        let digest = Hash256::hash_many(&[
            MESSAGE_ID_DOMAIN,
            headers.from.as_bytes(),
            headers.to.as_bytes(),
            &reply_to,
            &rekey_to,
            &seconds,
            &nanos,
            headers.subject.as_bytes(),
            headers.content_type.as_bytes(),
            body,
        ]);

        let mut id = [0u8; MESSAGE_ID_SIZE];
        id.copy_from_slice(&digest.as_bytes()[..MESSAGE_ID_SIZE]);
        Self(id)
    }
}

fn optional_field(value: Option<&str>) -> Vec<u8> {
    match value {
        None => vec![0],
        Some(v) => {
            let mut out = Vec::with_capacity(1 + v.len());
            out.push(1);
            out.extend_from_slice(v.as_bytes());
            out
        }
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.to_hex())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Mail headers.
///
/// Addresses are kept in their presentable encoding so the message body
/// is readable without knowing the protocol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Address replies should go to, if not `from`.
    pub reply_to: Option<String>,
    /// Address the sender is moving to.
    pub rekey_to: Option<String>,
    /// Composition time, truncated to microseconds.
    pub date: DateTime<Utc>,
    /// Subject line.
    pub subject: String,
    /// MIME content type of the body.
    pub content_type: String,
}

impl Headers {
    /// Create headers dated now with the default content type.
    pub fn new(from: impl Into<String>, to: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            reply_to: None,
            rekey_to: None,
            date: Utc::now().trunc_subsecs(6),
            subject: subject.into(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }

    /// Set the reply-to address.
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Set the rekey-to address.
    pub fn with_rekey_to(mut self, rekey_to: impl Into<String>) -> Self {
        self.rekey_to = Some(rekey_to.into());
        self
    }

    /// Set the date.
    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    /// Set the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    fn validate(&self) -> Result<()> {
        if self.from.is_empty() {
            return Err(ProtocolError::InvalidMessage("missing from address".into()));
        }
        if self.to.is_empty() {
            return Err(ProtocolError::InvalidMessage("missing to address".into()));
        }
        if self.subject.is_empty() {
            return Err(ProtocolError::InvalidMessage("empty subject".into()));
        }
        if self.subject.len() > MAX_SUBJECT_LEN {
            return Err(ProtocolError::InvalidMessage(format!(
                "subject too long: {} bytes exceeds maximum {} bytes",
                self.subject.len(),
                MAX_SUBJECT_LEN
            )));
        }
        if self.content_type.is_empty() {
            return Err(ProtocolError::InvalidMessage("empty content type".into()));
        }
        Ok(())
    }
}

/// A composed message. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    headers: Headers,
    body: Vec<u8>,
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
        .with_limit(MAX_MESSAGE_SIZE as u64)
}

impl Message {
    /// Compose a message, deriving its id.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidMessage`] for an empty subject or
    /// body, missing addresses, or oversize fields.
    pub fn compose(headers: Headers, body: Vec<u8>) -> Result<Self> {
        headers.validate()?;
        if body.is_empty() {
            return Err(ProtocolError::InvalidMessage("empty body".into()));
        }
        let id = MessageId::derive(&headers, &body);
        Ok(Self { id, headers, body })
    }

    /// The content-derived id.
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// The headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The subject.
    pub fn subject(&self) -> &str {
        &self.headers.subject
    }

    /// The body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Take ownership of headers and body.
    pub fn into_parts(self) -> (MessageId, Headers, Vec<u8>) {
        (self.id, self.headers, self.body)
    }

    /// Serialize for encryption.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        wire_options()
            .serialize(self)
            .map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Deserialize decrypted content.
    ///
    /// The embedded id is checked against the id re-derived from the
    /// decoded headers and body.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidMessage`] if the bytes are oversize,
    /// do not decode, fail validation, or carry a mismatching id.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::InvalidMessage(format!(
                "message too large: {} bytes exceeds maximum {} bytes",
                bytes.len(),
                MAX_MESSAGE_SIZE
            )));
        }
        let message: Message = wire_options()
            .deserialize(bytes)
            .map_err(|e| ProtocolError::InvalidMessage(e.to_string()))?;

        let recomposed = Self::compose(message.headers, message.body)?;
        if recomposed.id != message.id {
            return Err(ProtocolError::InvalidMessage("message id mismatch".into()));
        }
        Ok(recomposed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn headers() -> Headers {
        Headers::new(
            "0x1111111111111111111111111111111111111111",
            "0x2222222222222222222222222222222222222222",
            "hello",
        )
        .with_date(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_id_is_deterministic() {
        let a = Message::compose(headers(), b"body".to_vec()).unwrap();
        let b = Message::compose(headers(), b"body".to_vec()).unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(a.id().as_bytes().len(), MESSAGE_ID_SIZE);
    }

    #[test]
    fn test_id_depends_on_content() {
        let base = Message::compose(headers(), b"body".to_vec()).unwrap();
        let other_body = Message::compose(headers(), b"Body".to_vec()).unwrap();
        let other_reply =
            Message::compose(headers().with_reply_to("0x33"), b"body".to_vec()).unwrap();
        let other_rekey =
            Message::compose(headers().with_rekey_to("0x33"), b"body".to_vec()).unwrap();

        assert_ne!(base.id(), other_body.id());
        assert_ne!(base.id(), other_reply.id());
        assert_ne!(other_reply.id(), other_rekey.id());
    }

    #[test]
    fn test_roundtrip_preserves_id() {
        let message = Message::compose(
            headers().with_content_type("text/html"),
            b"<p>hi</p>".to_vec(),
        )
        .unwrap();
        let decoded = Message::from_bytes(&message.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.headers().content_type, "text/html");
    }

    #[test]
    fn test_validation() {
        assert!(Message::compose(headers(), vec![]).is_err());

        let mut no_subject = headers();
        no_subject.subject.clear();
        assert!(Message::compose(no_subject, b"x".to_vec()).is_err());

        let mut long_subject = headers();
        long_subject.subject = "s".repeat(MAX_SUBJECT_LEN + 1);
        assert!(Message::compose(long_subject, b"x".to_vec()).is_err());

        let mut no_to = headers();
        no_to.to.clear();
        assert!(Message::compose(no_to, b"x".to_vec()).is_err());
    }

    #[test]
    fn test_tampered_id_rejected() {
        let message = Message::compose(headers(), b"body".to_vec()).unwrap();
        let mut bytes = message.to_bytes().unwrap();
        bytes[0] ^= 0xff;
        assert!(matches!(
            Message::from_bytes(&bytes),
            Err(ProtocolError::InvalidMessage(reason)) if reason == "message id mismatch"
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(Message::from_bytes(b"not a message").is_err());
        assert!(Message::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_id_hex_roundtrip() {
        let id = Message::compose(headers(), b"body".to_vec()).unwrap().id();
        assert_eq!(MessageId::from_hex(&id.to_hex()).unwrap(), id);
        assert!(MessageId::from_hex("abcd").is_err());
    }
}
