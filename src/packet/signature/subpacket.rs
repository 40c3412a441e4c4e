use std::io::{self, BufRead};

use byteorder::{BigEndian, WriteBytesExt};
use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use num_enum::{FromPrimitive, IntoPrimitive};

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::Result;
use crate::parsing_reader::BufReadParsing;
use crate::ser::{time_to_u32, u32_to_time, Serialize};
use crate::types::{CompressionAlgorithm, Fingerprint, KeyId};

use super::{KeyFlags, Notation, RevocationCode, Signature};

/// Available signature subpacket types, without the critical bit.
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.2.3.1>
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
#[repr(u8)]
pub enum SubpacketType {
    SignatureCreationTime = 2,
    SignatureExpirationTime = 3,
    ExportableCertification = 4,
    TrustSignature = 5,
    RegularExpression = 6,
    Revocable = 7,
    KeyExpirationTime = 9,
    PreferredSymmetricAlgorithms = 11,
    RevocationKey = 12,
    Issuer = 16,
    Notation = 20,
    PreferredHashAlgorithms = 21,
    PreferredCompressionAlgorithms = 22,
    KeyServerPreferences = 23,
    PreferredKeyServer = 24,
    PrimaryUserId = 25,
    PolicyUri = 26,
    KeyFlags = 27,
    SignersUserId = 28,
    RevocationReason = 29,
    Features = 30,
    SignatureTarget = 31,
    EmbeddedSignature = 32,
    IssuerFingerprint = 33,

    #[num_enum(catch_all)]
    Other(#[cfg_attr(test, proptest(strategy = "34u8..128"))] u8),
}

/// Encoded length of a subpacket, covering the type octet and the data.
///
/// The parsed form is kept so that re-encoding reproduces the hashed bytes exactly,
/// even for non minimal encodings.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum SubpacketLength {
    One(#[cfg_attr(test, proptest(strategy = "1u8..=191"))] u8),
    Two(#[cfg_attr(test, proptest(strategy = "192u16..=8383"))] u16),
    Five(#[cfg_attr(test, proptest(strategy = "1u32..100_000"))] u32),
}

impl SubpacketLength {
    pub(crate) fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        let olen = i.read_u8()?;
        let len = match olen {
            0..=191 => Self::One(olen),
            192..=254 => {
                let a = i.read_u8()?;
                Self::Two(((u16::from(olen) - 192) << 8) + 192 + u16::from(a))
            }
            255 => Self::Five(i.read_be_u32()?),
        };
        Ok(len)
    }

    /// The minimal encoding of `len`.
    pub(crate) fn encode(len: u32) -> Self {
        match len {
            0..=191 => Self::One(len as u8),
            192..=8383 => Self::Two(len as u16),
            _ => Self::Five(len),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Self::One(l) => usize::from(*l),
            Self::Two(l) => usize::from(*l),
            Self::Five(l) => *l as usize,
        }
    }
}

impl Serialize for SubpacketLength {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            Self::One(l) => writer.write_u8(*l)?,
            Self::Two(l) => {
                writer.write_u8((((l - 192) >> 8) + 192) as u8)?;
                writer.write_u8(((l - 192) & 0xFF) as u8)?;
            }
            Self::Five(l) => {
                writer.write_u8(0xFF)?;
                writer.write_u32::<BigEndian>(*l)?;
            }
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Two(_) => 2,
            Self::Five(_) => 5,
        }
    }
}

/// A signature subpacket, kept in raw form with typed constructors and accessors.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct Subpacket {
    typ: SubpacketType,
    is_critical: bool,
    len: SubpacketLength,
    #[debug("{}", hex::encode(data))]
    data: Bytes,
}

impl Subpacket {
    /// A non critical subpacket.
    pub fn new(typ: SubpacketType, data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        let len = SubpacketLength::encode(u32::try_from(data.len() + 1)?);
        Ok(Subpacket {
            typ,
            is_critical: false,
            len,
            data,
        })
    }

    /// Marks the subpacket critical: implementations that do not know it must reject the
    /// signature.
    pub fn critical(mut self) -> Self {
        self.is_critical = true;
        self
    }

    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        let len = SubpacketLength::try_from_reader(&mut i)?;
        ensure!(len.len() > 0, "empty subpacket");
        let raw_typ = i.read_u8()?;
        let data = i.take_bytes(len.len() - 1)?;

        Ok(Subpacket {
            typ: SubpacketType::from(raw_typ & 0x7F),
            is_critical: raw_typ & 0x80 != 0,
            len,
            data,
        })
    }

    /// Parses a whole subpacket area.
    pub(crate) fn parse_area(mut area: &[u8]) -> Result<Vec<Self>> {
        let mut packets = Vec::new();
        while !area.is_empty() {
            packets.push(Subpacket::try_from_reader(&mut area)?);
        }
        Ok(packets)
    }

    pub fn typ(&self) -> SubpacketType {
        self.typ
    }

    pub fn is_critical(&self) -> bool {
        self.is_critical
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn creation_time(time: DateTime<Utc>) -> Result<Self> {
        Self::new(
            SubpacketType::SignatureCreationTime,
            time_to_u32(&time).to_be_bytes().to_vec(),
        )
    }

    /// Expiration in seconds after the signature creation.
    pub fn signature_expiration_time(secs: u32) -> Result<Self> {
        Self::new(SubpacketType::SignatureExpirationTime, secs.to_be_bytes().to_vec())
    }

    /// Expiration in seconds after the key creation.
    pub fn key_expiration_time(secs: u32) -> Result<Self> {
        Self::new(SubpacketType::KeyExpirationTime, secs.to_be_bytes().to_vec())
    }

    pub fn exportable_certification(exportable: bool) -> Result<Self> {
        Self::new(SubpacketType::ExportableCertification, vec![u8::from(exportable)])
    }

    pub fn trust_signature(depth: u8, amount: u8) -> Result<Self> {
        Self::new(SubpacketType::TrustSignature, vec![depth, amount])
    }

    pub fn revocable(revocable: bool) -> Result<Self> {
        Self::new(SubpacketType::Revocable, vec![u8::from(revocable)])
    }

    pub fn issuer(key_id: KeyId) -> Result<Self> {
        Self::new(SubpacketType::Issuer, key_id.as_ref().to_vec())
    }

    pub fn issuer_fingerprint(fp: &Fingerprint) -> Result<Self> {
        let mut data = Vec::with_capacity(21);
        // Only v4 fingerprints have a defined version octet here.
        data.push(4);
        data.extend_from_slice(fp.as_bytes());
        Self::new(SubpacketType::IssuerFingerprint, data)
    }

    pub fn preferred_symmetric_algorithms(algs: &[SymmetricKeyAlgorithm]) -> Result<Self> {
        Self::new(
            SubpacketType::PreferredSymmetricAlgorithms,
            algs.iter().map(|&a| u8::from(a)).collect::<Vec<_>>(),
        )
    }

    pub fn preferred_hash_algorithms(algs: &[HashAlgorithm]) -> Result<Self> {
        Self::new(
            SubpacketType::PreferredHashAlgorithms,
            algs.iter().map(|&a| u8::from(a)).collect::<Vec<_>>(),
        )
    }

    pub fn preferred_compression_algorithms(algs: &[CompressionAlgorithm]) -> Result<Self> {
        Self::new(
            SubpacketType::PreferredCompressionAlgorithms,
            algs.iter().map(|&a| u8::from(a)).collect::<Vec<_>>(),
        )
    }

    pub fn key_server_preferences(prefs: &[u8]) -> Result<Self> {
        Self::new(SubpacketType::KeyServerPreferences, prefs.to_vec())
    }

    pub fn primary_user_id(primary: bool) -> Result<Self> {
        Self::new(SubpacketType::PrimaryUserId, vec![u8::from(primary)])
    }

    pub fn key_flags(flags: KeyFlags) -> Result<Self> {
        Self::new(SubpacketType::KeyFlags, vec![u8::from(flags)])
    }

    pub fn signers_user_id(id: &str) -> Result<Self> {
        Self::new(SubpacketType::SignersUserId, id.as_bytes().to_vec())
    }

    pub fn revocation_reason(code: RevocationCode, reason: &str) -> Result<Self> {
        let mut data = Vec::with_capacity(1 + reason.len());
        data.push(code.into());
        data.extend_from_slice(reason.as_bytes());
        Self::new(SubpacketType::RevocationReason, data)
    }

    pub fn features(features: &[u8]) -> Result<Self> {
        Self::new(SubpacketType::Features, features.to_vec())
    }

    pub fn notation(notation: &Notation) -> Result<Self> {
        let mut data = BytesMut::with_capacity(8 + notation.name.len() + notation.value.len());
        data.put_u8(if notation.readable { 0x80 } else { 0 });
        data.put_bytes(0, 3);
        data.put_u16(u16::try_from(notation.name.len())?);
        data.put_u16(u16::try_from(notation.value.len())?);
        data.put_slice(&notation.name);
        data.put_slice(&notation.value);
        Self::new(SubpacketType::Notation, data.freeze())
    }

    pub fn embedded_signature(sig: &Signature) -> Result<Self> {
        Self::new(SubpacketType::EmbeddedSignature, sig.to_bytes()?)
    }

    /// Interpretation of the data as a four octet timestamp.
    pub(crate) fn as_time(&self) -> Option<DateTime<Utc>> {
        self.as_u32().map(u32_to_time)
    }

    pub(crate) fn as_u32(&self) -> Option<u32> {
        let raw: [u8; 4] = self.data[..].try_into().ok()?;
        Some(u32::from_be_bytes(raw))
    }

    pub(crate) fn as_bool(&self) -> Option<bool> {
        self.data.first().map(|b| *b != 0)
    }

    pub(crate) fn as_notation(&self) -> Option<Notation> {
        let d = &self.data[..];
        if d.len() < 8 {
            return None;
        }
        let name_len = usize::from(u16::from_be_bytes([d[4], d[5]]));
        let value_len = usize::from(u16::from_be_bytes([d[6], d[7]]));
        if d.len() != 8 + name_len + value_len {
            return None;
        }
        Some(Notation {
            readable: d[0] & 0x80 != 0,
            name: self.data.slice(8..8 + name_len),
            value: self.data.slice(8 + name_len..),
        })
    }
}

impl Serialize for Subpacket {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.len.to_writer(writer)?;
        let typ = u8::from(self.typ) | if self.is_critical { 0x80 } else { 0 };
        writer.write_u8(typ)?;
        writer.write_all(&self.data)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.len.write_len() + 1 + self.data.len()
    }
}
