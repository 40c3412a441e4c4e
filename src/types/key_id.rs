use std::fmt;

use crate::errors::{Error, Result};

/// Eight octet key identifier.
#[derive(Clone, Copy, Eq, PartialEq, Hash, derive_more::Debug)]
#[debug("KeyId({})", hex::encode(_0))]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct KeyId([u8; 8]);

impl AsRef<[u8]> for KeyId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 8]> for KeyId {
    fn from(value: [u8; 8]) -> Self {
        KeyId(value)
    }
}

impl KeyId {
    /// Key id of the wildcard (anonymous) recipient.
    pub const WILDCARD: KeyId = KeyId([0u8; 8]);

    pub fn from_slice(input: &[u8]) -> Result<KeyId> {
        let raw: [u8; 8] = input.try_into().map_err(|_| Error::MalformedPacket {
            message: format!("key id of {} bytes", input.len()),
        })?;
        Ok(KeyId(raw))
    }

    pub fn is_wildcard(&self) -> bool {
        *self == Self::WILDCARD
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

/// Key fingerprint: MD5 for v2/v3 keys, SHA-1 for v4 keys.
#[derive(Clone, Eq, PartialEq, Hash, derive_more::Debug)]
pub enum Fingerprint {
    #[debug("{}", hex::encode(_0))]
    V3([u8; 16]),
    #[debug("{}", hex::encode(_0))]
    V4([u8; 20]),
}

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Fingerprint::V3(fp) => fp,
            Fingerprint::V4(fp) => fp,
        }
    }

    /// The v4 key id is the low 64 bits of the fingerprint.
    ///
    /// v3 key ids are derived from the RSA modulus instead, so they return `None`.
    pub fn key_id(&self) -> Option<KeyId> {
        match self {
            Fingerprint::V3(_) => None,
            Fingerprint::V4(fp) => KeyId::from_slice(&fp[12..]).ok(),
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.as_bytes()))
    }
}
