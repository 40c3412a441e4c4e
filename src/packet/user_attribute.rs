use std::io::{self, BufRead};

use bytes::Bytes;

use crate::errors::Result;
use crate::packet::PacketTrait;
use crate::parsing_reader::BufReadParsing;
use crate::ser::Serialize;
use crate::types::Tag;

/// User Attribute Packet
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.12>
///
/// The attribute subpackets (images) are opaque here.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct UserAttribute {
    #[debug("{} bytes", data.len())]
    data: Bytes,
}

impl UserAttribute {
    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        Ok(UserAttribute { data: i.rest()? })
    }

    pub fn from_bytes(data: Bytes) -> Self {
        UserAttribute { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Serialize for UserAttribute {
    fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.data)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.data.len()
    }
}

impl PacketTrait for UserAttribute {
    fn tag(&self) -> Tag {
        Tag::UserAttribute
    }
}
