use std::io::{self, BufRead};

use byteorder::{BigEndian, WriteBytesExt};
use num_enum::{FromPrimitive, IntoPrimitive};

use crate::errors::Result;
use crate::parsing_reader::BufReadParsing;

/// Length of a packet body, as announced by its header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PacketLength {
    Fixed(u32),
    /// Old format only: the body runs to the end of the input.
    Indeterminate,
    /// New format only: a chunk of `n` bytes, followed by another length.
    Partial(u32),
}

impl PacketLength {
    /// Reads a new format length field.
    pub fn try_from_reader<R: BufRead>(mut r: R) -> Result<Self> {
        let olen = r.read_u8()?;
        let len = match olen {
            0..=191 => PacketLength::Fixed(olen.into()),
            192..=223 => {
                let second = r.read_u8()?;
                PacketLength::Fixed(((u32::from(olen) - 192) << 8) + 192 + u32::from(second))
            }
            224..=254 => PacketLength::Partial(1 << (olen & 0x1F)),
            255 => PacketLength::Fixed(r.read_be_u32()?),
        };
        Ok(len)
    }

    /// Bytes needed to encode `len` as a new format fixed length.
    pub fn fixed_encoding_len(len: u32) -> usize {
        if len < 192 {
            1
        } else if len < 8384 {
            2
        } else {
            5
        }
    }

    /// Writes a new format length field.
    pub fn to_writer_new<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match *self {
            PacketLength::Fixed(len) if len < 192 => writer.write_u8(len as u8)?,
            PacketLength::Fixed(len) if len < 8384 => {
                let len = len - 192;
                writer.write_u8(((len >> 8) + 192) as u8)?;
                writer.write_u8((len & 0xFF) as u8)?;
            }
            PacketLength::Fixed(len) => {
                writer.write_u8(0xFF)?;
                writer.write_u32::<BigEndian>(len)?;
            }
            PacketLength::Partial(len) => {
                if !len.is_power_of_two() || len > 1 << 30 {
                    invalid_op!("partial length {} is not a power of two up to 2^30", len);
                }
                writer.write_u8(0xE0 | len.trailing_zeros() as u8)?;
            }
            PacketLength::Indeterminate => {
                invalid_op!("new format headers cannot express an indeterminate length")
            }
        }
        Ok(())
    }
}

/// Packet tag.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-4.3>
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, FromPrimitive, IntoPrimitive)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
#[repr(u8)]
pub enum Tag {
    /// Public-Key Encrypted Session Key Packet
    PublicKeyEncryptedSessionKey = 1,
    /// Signature Packet
    Signature = 2,
    /// Symmetric-Key Encrypted Session Key Packet
    SymKeyEncryptedSessionKey = 3,
    /// One-Pass Signature Packet
    OnePassSignature = 4,
    /// Secret-Key Packet
    SecretKey = 5,
    /// Public-Key Packet
    PublicKey = 6,
    /// Secret-Subkey Packet
    SecretSubkey = 7,
    /// Compressed Data Packet
    CompressedData = 8,
    /// Symmetrically Encrypted Data Packet
    SymEncryptedData = 9,
    /// Marker Packet
    Marker = 10,
    /// Literal Data Packet
    LiteralData = 11,
    /// Trust Packet
    Trust = 12,
    /// User ID Packet
    UserId = 13,
    /// Public-Subkey Packet
    PublicSubkey = 14,
    /// User Attribute Packet
    UserAttribute = 17,
    /// Sym. Encrypted and Integrity Protected Data Packet
    SymEncryptedProtectedData = 18,
    /// Modification Detection Code Packet
    ModDetectionCode = 19,

    /// Reserved and experimental tags (0, 15, 16, 60..=63, ...).
    #[num_enum(catch_all)]
    #[cfg_attr(test, proptest(skip))]
    Other(u8),
}

impl Tag {
    /// Only these packets may use partial or indeterminate body lengths.
    pub fn allows_streaming(self) -> bool {
        matches!(
            self,
            Tag::LiteralData
                | Tag::CompressedData
                | Tag::SymEncryptedData
                | Tag::SymEncryptedProtectedData
        )
    }

    /// The old header packs the tag into four bits.
    pub fn fits_old_format(self) -> bool {
        u8::from(self) < 16
    }
}

/// The two header encodings.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum PacketHeaderVersion {
    /// Tag in bits 5..2, two bit length type.
    Old,
    /// Tag in the low six bits, self describing length.
    #[default]
    New,
}

/// Version of a key packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, FromPrimitive, IntoPrimitive)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
#[repr(u8)]
pub enum KeyVersion {
    V2 = 2,
    V3 = 3,
    V4 = 4,

    #[num_enum(catch_all)]
    #[cfg_attr(test, proptest(skip))]
    Other(u8),
}

impl Default for KeyVersion {
    fn default() -> Self {
        Self::V4
    }
}

impl KeyVersion {
    /// Size of the fingerprint in bytes, `None` for unknown versions.
    pub const fn fingerprint_len(&self) -> Option<usize> {
        match self {
            KeyVersion::V2 | KeyVersion::V3 => Some(16),
            KeyVersion::V4 => Some(20),
            KeyVersion::Other(_) => None,
        }
    }

    /// v2 and v3 keys share one layout.
    pub const fn is_legacy(&self) -> bool {
        matches!(self, KeyVersion::V2 | KeyVersion::V3)
    }
}
