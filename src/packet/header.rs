use std::io::BufRead;

use bitfields::bitfield;
use byteorder::{BigEndian, WriteBytesExt};
use log::debug;

use crate::errors::Result;
use crate::parsing_reader::BufReadParsing;
use crate::ser::Serialize;
use crate::types::{PacketHeaderVersion, PacketLength, Tag};

/// Largest chunk a partial length may announce.
pub const MAX_PARTIAL_LEN: u32 = 1 << 30;

/// A decoded packet header: tag, framing family and announced body length.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-4.2>
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PacketHeader {
    Old {
        header: OldPacketHeader,
        length: PacketLength,
    },
    New {
        header: NewPacketHeader,
        length: PacketLength,
    },
}

impl PacketHeader {
    /// Reads a single packet header.
    pub fn try_from_reader<R: BufRead>(mut r: R) -> Result<Self> {
        let first = r.read_u8()?;

        match first & 0b1100_0000 {
            0b1100_0000 => {
                let header = NewPacketHeader::from_bits(first);
                let length = PacketLength::try_from_reader(&mut r)?;
                ensure!(header.tag() != 0, "packet tag 0 is reserved");
                Ok(PacketHeader::New { header, length })
            }
            0b1000_0000 => {
                let header = OldPacketHeader::from_bits(first);
                let length = match header.length_type() {
                    0 => PacketLength::Fixed(r.read_u8()?.into()),
                    1 => PacketLength::Fixed(r.read_be_u16()?.into()),
                    2 => PacketLength::Fixed(r.read_be_u32()?),
                    _ => PacketLength::Indeterminate,
                };
                ensure!(header.tag() != 0, "packet tag 0 is reserved");
                Ok(PacketHeader::Old { header, length })
            }
            _ => malformed!("invalid packet header byte {:#04x}", first),
        }
    }

    /// Builds a header, choosing the shortest length encoding.
    pub fn from_parts(
        version: PacketHeaderVersion,
        tag: Tag,
        length: PacketLength,
    ) -> Result<Self> {
        match version {
            PacketHeaderVersion::Old => {
                let typ = match length {
                    PacketLength::Fixed(len) => old_fixed_type(len),
                    PacketLength::Indeterminate => 3,
                    PacketLength::Partial(_) => {
                        invalid_op!("partial lengths are only supported in new format headers")
                    }
                };
                if !tag.fits_old_format() {
                    invalid_op!("tag {:?} does not fit into an old format header", tag);
                }

                Ok(Self::Old {
                    header: OldPacketHeaderBuilder::new()
                        .with_tag(tag.into())
                        .with_length_type(typ)
                        .build(),
                    length,
                })
            }
            PacketHeaderVersion::New => {
                match length {
                    PacketLength::Indeterminate => {
                        invalid_op!("indeterminate lengths are only supported in old format headers")
                    }
                    PacketLength::Partial(l) if !l.is_power_of_two() || l > MAX_PARTIAL_LEN => {
                        invalid_op!("partial length {} is not a power of two up to 2^30", l)
                    }
                    _ => {}
                }

                Ok(Self::New {
                    header: NewPacketHeaderBuilder::new().with_tag(tag.into()).build(),
                    length,
                })
            }
        }
    }

    pub const fn version(&self) -> PacketHeaderVersion {
        match self {
            Self::Old { .. } => PacketHeaderVersion::Old,
            Self::New { .. } => PacketHeaderVersion::New,
        }
    }

    pub fn packet_length(&self) -> PacketLength {
        match self {
            Self::Old { length, .. } | Self::New { length, .. } => *length,
        }
    }

    pub fn tag(&self) -> Tag {
        match self {
            Self::Old { header, .. } => header.tag().into(),
            Self::New { header, .. } => header.tag().into(),
        }
    }
}

impl Serialize for PacketHeader {
    fn to_writer<W: std::io::Write>(&self, writer: &mut W) -> Result<()> {
        debug!("writing packet header {:?}", self);

        match self {
            Self::New { header, length } => {
                writer.write_u8(header.into_bits())?;
                length.to_writer_new(writer)?;
            }
            Self::Old { header, length } => {
                writer.write_u8(header.into_bits())?;
                match (header.length_type(), length) {
                    (0, PacketLength::Fixed(len)) => writer.write_u8(u8::try_from(*len)?)?,
                    (1, PacketLength::Fixed(len)) => {
                        writer.write_u16::<BigEndian>(u16::try_from(*len)?)?
                    }
                    (2, PacketLength::Fixed(len)) => writer.write_u32::<BigEndian>(*len)?,
                    (3, PacketLength::Indeterminate) => {}
                    (typ, length) => {
                        invalid_op!("length type {} cannot encode {:?}", typ, length)
                    }
                }
            }
        }

        Ok(())
    }

    fn write_len(&self) -> usize {
        match self {
            Self::New { length, .. } => match length {
                PacketLength::Fixed(len) => 1 + PacketLength::fixed_encoding_len(*len),
                _ => 2,
            },
            Self::Old { header, .. } => match header.length_type() {
                0 => 2,
                1 => 3,
                2 => 5,
                _ => 1,
            },
        }
    }
}

/// Old format header byte: `10TTTTLL`.
#[bitfield(u8, order = msb)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct OldPacketHeader {
    #[bits(1, default = true)]
    _padding: bool,
    #[bits(1, default = false)]
    _version: bool,
    #[bits(4)]
    tag: u8,
    #[bits(2)]
    length_type: u8,
}

/// New format header byte: `11TTTTTT`.
#[bitfield(u8, order = msb)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct NewPacketHeader {
    #[bits(1, default = true)]
    _padding: bool,
    #[bits(1, default = true)]
    _version: bool,
    #[bits(6)]
    tag: u8,
}

fn old_fixed_type(len: u32) -> u8 {
    if len < 256 {
        0
    } else if len < 65536 {
        1
    } else {
        2
    }
}
