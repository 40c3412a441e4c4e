use std::io::{self, BufRead};

use crate::errors::{Error, Result};
use crate::packet::{
    CompressedData, LiteralData, Marker, ModDetectionCode, OnePassSignature, PacketTrait,
    PublicKey, PublicKeyEncryptedSessionKey, SecretKey, Signature, SymEncryptedData,
    SymEncryptedProtectedData, SymKeyEncryptedSessionKey, Trust, UserAttribute, UserId,
};
use crate::ser::Serialize;
use crate::types::Tag;

/// Represents a Packet. A packet is the record structure used to encode a chunk of data in OpenPGP.
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-4>
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Packet {
    CompressedData(CompressedData),
    PublicKey(PublicKey),
    PublicSubkey(PublicKey),
    SecretKey(SecretKey),
    SecretSubkey(SecretKey),
    LiteralData(LiteralData),
    Marker(Marker),
    ModDetectionCode(ModDetectionCode),
    OnePassSignature(OnePassSignature),
    PublicKeyEncryptedSessionKey(PublicKeyEncryptedSessionKey),
    Signature(Signature),
    SymEncryptedData(SymEncryptedData),
    SymEncryptedProtectedData(SymEncryptedProtectedData),
    SymKeyEncryptedSessionKey(SymKeyEncryptedSessionKey),
    Trust(Trust),
    UserAttribute(UserAttribute),
    UserId(UserId),
}

macro_rules! impl_from_packet {
    ($($variant:ident => $typ:ty),* $(,)?) => {
        $(
            impl From<$typ> for Packet {
                fn from(p: $typ) -> Self {
                    Packet::$variant(p)
                }
            }
        )*
    };
}

impl_from_packet!(
    CompressedData => CompressedData,
    LiteralData => LiteralData,
    Marker => Marker,
    ModDetectionCode => ModDetectionCode,
    OnePassSignature => OnePassSignature,
    PublicKeyEncryptedSessionKey => PublicKeyEncryptedSessionKey,
    Signature => Signature,
    SymEncryptedData => SymEncryptedData,
    SymEncryptedProtectedData => SymEncryptedProtectedData,
    SymKeyEncryptedSessionKey => SymKeyEncryptedSessionKey,
    Trust => Trust,
    UserAttribute => UserAttribute,
    UserId => UserId,
);

impl From<PublicKey> for Packet {
    fn from(key: PublicKey) -> Self {
        if key.is_subkey() {
            Packet::PublicSubkey(key)
        } else {
            Packet::PublicKey(key)
        }
    }
}

impl From<SecretKey> for Packet {
    fn from(key: SecretKey) -> Self {
        if key.public_key().is_subkey() {
            Packet::SecretSubkey(key)
        } else {
            Packet::SecretKey(key)
        }
    }
}

impl Packet {
    /// Parses the body of a packet with the given tag.
    pub fn from_reader<B: BufRead>(tag: Tag, mut body: B) -> Result<Self> {
        let packet: Packet = match tag {
            Tag::PublicKeyEncryptedSessionKey => {
                PublicKeyEncryptedSessionKey::try_from_reader(&mut body)?.into()
            }
            Tag::Signature => Signature::try_from_reader(&mut body)?.into(),
            Tag::SymKeyEncryptedSessionKey => {
                SymKeyEncryptedSessionKey::try_from_reader(&mut body)?.into()
            }
            Tag::OnePassSignature => OnePassSignature::try_from_reader(&mut body)?.into(),
            Tag::SecretKey | Tag::SecretSubkey => SecretKey::try_from_reader(tag, &mut body)?.into(),
            Tag::PublicKey | Tag::PublicSubkey => PublicKey::try_from_reader(tag, &mut body)?.into(),
            Tag::CompressedData => CompressedData::try_from_reader(&mut body)?.into(),
            Tag::SymEncryptedData => SymEncryptedData::try_from_reader(&mut body)?.into(),
            Tag::Marker => Marker::try_from_reader(&mut body)?.into(),
            Tag::LiteralData => LiteralData::try_from_reader(&mut body)?.into(),
            Tag::Trust => Trust::try_from_reader(&mut body)?.into(),
            Tag::UserId => UserId::try_from_reader(&mut body)?.into(),
            Tag::UserAttribute => UserAttribute::try_from_reader(&mut body)?.into(),
            Tag::SymEncryptedProtectedData => {
                SymEncryptedProtectedData::try_from_reader(&mut body)?.into()
            }
            Tag::ModDetectionCode => ModDetectionCode::try_from_reader(&mut body)?.into(),
            Tag::Other(tag) => {
                return Err(Error::UnsupportedVersion {
                    message: format!("packet tag {tag}"),
                })
            }
        };
        Ok(packet)
    }

    fn as_dyn(&self) -> &dyn DynPacket {
        match self {
            Self::CompressedData(p) => p,
            Self::PublicKey(p) | Self::PublicSubkey(p) => p,
            Self::SecretKey(p) | Self::SecretSubkey(p) => p,
            Self::LiteralData(p) => p,
            Self::Marker(p) => p,
            Self::ModDetectionCode(p) => p,
            Self::OnePassSignature(p) => p,
            Self::PublicKeyEncryptedSessionKey(p) => p,
            Self::Signature(p) => p,
            Self::SymEncryptedData(p) => p,
            Self::SymEncryptedProtectedData(p) => p,
            Self::SymKeyEncryptedSessionKey(p) => p,
            Self::Trust(p) => p,
            Self::UserAttribute(p) => p,
            Self::UserId(p) => p,
        }
    }
}

/// Object safe view on packet bodies.
trait DynPacket {
    fn dyn_to_writer(&self, w: &mut dyn io::Write) -> Result<()>;
    fn dyn_write_len(&self) -> usize;
    fn dyn_tag(&self) -> Tag;
}

impl<T: PacketTrait> DynPacket for T {
    fn dyn_to_writer(&self, mut w: &mut dyn io::Write) -> Result<()> {
        self.to_writer(&mut w)
    }

    fn dyn_write_len(&self) -> usize {
        self.write_len()
    }

    fn dyn_tag(&self) -> Tag {
        self.tag()
    }
}

impl Serialize for Packet {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.as_dyn().dyn_to_writer(writer)
    }

    fn write_len(&self) -> usize {
        self.as_dyn().dyn_write_len()
    }
}

impl PacketTrait for Packet {
    fn tag(&self) -> Tag {
        self.as_dyn().dyn_tag()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_by_tag() {
        let packet = Packet::from_reader(Tag::UserId, &b"Alice <alice@example.com>"[..]).unwrap();
        assert_eq!(packet.tag(), Tag::UserId);
        assert_eq!(packet.to_bytes().unwrap(), b"Alice <alice@example.com>");

        let packet = Packet::from_reader(Tag::Marker, &b"PGP"[..]).unwrap();
        assert_eq!(packet, Packet::Marker(Marker));
        assert!(Packet::from_reader(Tag::Other(60), &b""[..]).is_err());
    }
}
