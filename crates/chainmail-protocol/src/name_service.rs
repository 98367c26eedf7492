//! Name-service status taxonomy.
//!
//! Forward (name → address) and reverse (address → name) lookups report
//! their outcome with the response codes of RFC 1035 §4.1.1. A status is a
//! *result*: a lookup for a name that does not exist still succeeds, with
//! [`NameServiceStatus::NonExistentDomain`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// RFC 1035 style lookup status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NameServiceStatus {
    /// No error condition.
    Ok = 0,
    /// The query was malformed.
    FormatError = 1,
    /// The resolver could not process the query.
    ServerFailure = 2,
    /// The name (or address) does not exist.
    NonExistentDomain = 3,
    /// The resolver does not support this kind of query.
    NotImplemented = 4,
    /// The resolver refused the query.
    Refused = 5,
}

impl NameServiceStatus {
    /// All statuses in code order.
    pub const ALL: [NameServiceStatus; 6] = [
        NameServiceStatus::Ok,
        NameServiceStatus::FormatError,
        NameServiceStatus::ServerFailure,
        NameServiceStatus::NonExistentDomain,
        NameServiceStatus::NotImplemented,
        NameServiceStatus::Refused,
    ];

    /// Numeric code.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Parse a numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// RFC 1035 mnemonic.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            NameServiceStatus::Ok => "NOERROR",
            NameServiceStatus::FormatError => "FORMERR",
            NameServiceStatus::ServerFailure => "SERVFAIL",
            NameServiceStatus::NonExistentDomain => "NXDOMAIN",
            NameServiceStatus::NotImplemented => "NOTIMP",
            NameServiceStatus::Refused => "REFUSED",
        }
    }

    /// Whether the lookup produced a value.
    pub const fn is_ok(self) -> bool {
        matches!(self, NameServiceStatus::Ok)
    }
}

impl fmt::Display for NameServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
