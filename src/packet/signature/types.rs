use bitfield::bitfield;
use bytes::Bytes;
use num_enum::{FromPrimitive, IntoPrimitive};

/// Available signature versions.
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
#[repr(u8)]
pub enum SignatureVersion {
    /// Deprecated, same layout as v3.
    V2 = 2,
    V3 = 3,
    V4 = 4,

    #[num_enum(catch_all)]
    #[cfg_attr(test, proptest(skip))]
    Other(u8),
}

impl Default for SignatureVersion {
    fn default() -> Self {
        Self::V4
    }
}

impl SignatureVersion {
    pub fn is_legacy(self) -> bool {
        matches!(self, SignatureVersion::V2 | SignatureVersion::V3)
    }
}

/// Signature types.
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.2.1>
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
#[repr(u8)]
pub enum SignatureType {
    /// Signature of a binary document.
    Binary = 0x00,
    /// Signature of a canonical text document, line endings are hashed as CRLF.
    Text = 0x01,
    /// Standalone signature, over its own subpackets only.
    Standalone = 0x02,
    /// Generic certification of a User ID and Public-Key packet.
    CertGeneric = 0x10,
    /// Persona certification: no verification of the claim was done.
    CertPersona = 0x11,
    /// Casual certification.
    CertCasual = 0x12,
    /// Positive certification, usually issued by the key owner.
    CertPositive = 0x13,
    /// Subkey binding, issued by the primary key.
    SubkeyBinding = 0x18,
    /// Primary key binding, issued by a signing subkey.
    KeyBinding = 0x19,
    /// Signature directly on a key.
    Key = 0x1F,
    KeyRevocation = 0x20,
    SubkeyRevocation = 0x28,
    CertRevocation = 0x30,
    Timestamp = 0x40,
    /// Third-party confirmation of another signature.
    ThirdParty = 0x50,

    #[num_enum(catch_all)]
    #[cfg_attr(test, proptest(skip))]
    Other(u8),
}

impl SignatureType {
    /// Signatures over a key and a user id or attribute.
    pub fn is_certification(self) -> bool {
        matches!(
            self,
            SignatureType::CertGeneric
                | SignatureType::CertPersona
                | SignatureType::CertCasual
                | SignatureType::CertPositive
                | SignatureType::CertRevocation
        )
    }

    /// Signatures over a primary key and a subkey.
    pub fn is_key_binding(self) -> bool {
        matches!(
            self,
            SignatureType::SubkeyBinding
                | SignatureType::KeyBinding
                | SignatureType::SubkeyRevocation
        )
    }

    /// Signatures over a single key.
    pub fn is_key_signature(self) -> bool {
        matches!(self, SignatureType::Key | SignatureType::KeyRevocation)
    }

    pub fn is_revocation(self) -> bool {
        matches!(
            self,
            SignatureType::KeyRevocation
                | SignatureType::SubkeyRevocation
                | SignatureType::CertRevocation
        )
    }
}

bitfield! {
    /// Key usage flags.
    /// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.2.3.21>
    #[derive(Default, PartialEq, Eq, Copy, Clone)]
    pub struct KeyFlags(u8);
    impl Debug;

    pub certify, set_certify: 0;
    pub sign, set_sign: 1;
    pub encrypt_comms, set_encrypt_comms: 2;
    pub encrypt_storage, set_encrypt_storage: 3;
    pub shared, set_shared: 4;
    pub authentication, set_authentication: 5;
    pub group, set_group: 7;
}

impl From<&[u8]> for KeyFlags {
    fn from(other: &[u8]) -> Self {
        KeyFlags(other.first().copied().unwrap_or_default())
    }
}

impl From<KeyFlags> for u8 {
    fn from(flags: KeyFlags) -> Self {
        flags.0
    }
}

/// Codes for revocation reasons.
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum RevocationCode {
    NoReason = 0,
    KeySuperseded = 1,
    KeyCompromised = 2,
    KeyRetired = 3,
    CertUserIdInvalid = 32,

    #[num_enum(catch_all)]
    Other(u8),
}

/// A notation: name/value pair, flagged human readable or not.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Notation {
    pub readable: bool,
    pub name: Bytes,
    pub value: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_flags() {
        let mut flags = KeyFlags::default();
        flags.set_certify(true);
        flags.set_sign(true);
        assert_eq!(flags.0, 0b11);
        assert!(!KeyFlags::from(&[0x0C][..]).sign());
        assert!(KeyFlags::from(&[0x0C][..]).encrypt_storage());
        assert_eq!(KeyFlags::from(&[][..]), KeyFlags::default());
    }

    #[test]
    fn classification() {
        assert!(SignatureType::CertPositive.is_certification());
        assert!(SignatureType::CertRevocation.is_revocation());
        assert!(SignatureType::SubkeyBinding.is_key_binding());
        assert!(!SignatureType::Binary.is_certification());
        assert_eq!(SignatureType::from(0x50), SignatureType::ThirdParty);
        assert_eq!(SignatureType::from(0x51), SignatureType::Other(0x51));
    }
}
