use std::io::{self, BufRead};

use byteorder::{BigEndian, WriteBytesExt};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use num_enum::{FromPrimitive, IntoPrimitive};

use crate::errors::Result;
use crate::packet::PacketTrait;
use crate::parsing_reader::BufReadParsing;
use crate::ser::{time_to_u32, truncate_time, u32_to_time, Serialize};
use crate::types::Tag;

/// File name marking content that should not be stored ("for your eyes only").
pub const CONSOLE: &str = "_CONSOLE";

/// Format octet of a literal data packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
#[repr(u8)]
pub enum DataMode {
    Binary = b'b',
    Text = b't',
    Utf8 = b'u',

    #[num_enum(catch_all)]
    Other(u8),
}

/// Everything in front of the content: format, file name and modification time.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct LiteralDataHeader {
    pub mode: DataMode,
    #[debug("{:?}", String::from_utf8_lossy(file_name))]
    pub file_name: Bytes,
    pub modification_time: DateTime<Utc>,
}

impl LiteralDataHeader {
    pub fn new(mode: DataMode, file_name: &str, modification_time: DateTime<Utc>) -> Self {
        LiteralDataHeader {
            mode,
            file_name: Bytes::copy_from_slice(file_name.as_bytes()),
            modification_time: truncate_time(&modification_time),
        }
    }

    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        let mode = DataMode::from(i.read_u8()?);
        let file_name = i.read_len_prefixed()?;
        let modification_time = u32_to_time(i.read_be_u32()?);

        Ok(LiteralDataHeader {
            mode,
            file_name,
            modification_time,
        })
    }

    pub fn is_for_your_eyes_only(&self) -> bool {
        &self.file_name[..] == CONSOLE.as_bytes()
    }
}

impl Serialize for LiteralDataHeader {
    fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        w.write_u8(self.mode.into())?;
        w.write_u8(u8::try_from(self.file_name.len())?)?;
        w.write_all(&self.file_name)?;
        w.write_u32::<BigEndian>(time_to_u32(&self.modification_time))?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        1 + 1 + self.file_name.len() + 4
    }
}

/// Literal Data Packet, held in memory.
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.9>
///
/// Streaming access goes through the message reader and the literal data generator.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct LiteralData {
    header: LiteralDataHeader,
    #[debug("{} bytes", data.len())]
    data: Bytes,
}

impl LiteralData {
    pub fn new(header: LiteralDataHeader, data: Bytes) -> Self {
        LiteralData { header, data }
    }

    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        let header = LiteralDataHeader::try_from_reader(&mut i)?;
        let data = i.rest()?;
        Ok(LiteralData { header, data })
    }

    pub fn header(&self) -> &LiteralDataHeader {
        &self.header
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Serialize for LiteralData {
    fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        self.header.to_writer(w)?;
        w.write_all(&self.data)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.header.write_len() + self.data.len()
    }
}

impl PacketTrait for LiteralData {
    fn tag(&self) -> Tag {
        Tag::LiteralData
    }
}
