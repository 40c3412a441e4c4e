use std::io::{self, BufRead};

use bytes::Bytes;

use crate::errors::Result;
use crate::packet::PacketTrait;
use crate::parsing_reader::BufReadParsing;
use crate::ser::Serialize;
use crate::types::Tag;

/// User ID Packet
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.11>
///
/// The bytes are kept as found, they are UTF-8 by convention only.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
#[debug("UserId({:?})", String::from_utf8_lossy(id))]
pub struct UserId {
    id: Bytes,
}

impl UserId {
    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        Ok(UserId { id: i.rest()? })
    }

    pub fn from_str(id: &str) -> Self {
        UserId {
            id: Bytes::copy_from_slice(id.as_bytes()),
        }
    }

    pub fn id(&self) -> &[u8] {
        &self.id
    }

    pub fn as_str(&self) -> Result<&str> {
        Ok(std::str::from_utf8(&self.id)?)
    }
}

impl Serialize for UserId {
    fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.id)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.id.len()
    }
}

impl PacketTrait for UserId {
    fn tag(&self) -> Tag {
        Tag::UserId
    }
}
