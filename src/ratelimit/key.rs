//! Rate key generation and handling.

use std::fmt;

/// The kind of subject a rate key identifies.
///
/// Each kind carries its own limit policy and its own namespace, so an
/// address and a credential with the same raw text never share state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// Client network address
    Ip,
    /// API credential
    Token,
}

impl KeyKind {
    /// Namespace tag used as the key prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyKind::Ip => "ip",
            KeyKind::Token => "token",
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key that uniquely identifies a rate-limited subject.
///
/// Rendered as `<kind>:<value>`, e.g. `ip:10.0.0.1` or `token:abc123`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateKey {
    kind: KeyKind,
    value: String,
}

impl RateKey {
    /// Create a key for a client address.
    pub fn ip(address: impl Into<String>) -> Self {
        Self {
            kind: KeyKind::Ip,
            value: address.into(),
        }
    }

    /// Create a key for an API credential.
    pub fn token(credential: impl Into<String>) -> Self {
        Self {
            kind: KeyKind::Token,
            value: credential.into(),
        }
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    /// The raw identity value without the kind tag.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}
