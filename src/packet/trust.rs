use std::io::{self, BufRead};

use bytes::Bytes;

use crate::errors::Result;
use crate::packet::PacketTrait;
use crate::parsing_reader::BufReadParsing;
use crate::ser::Serialize;
use crate::types::Tag;

/// Trust Packet
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.10>
///
/// Implementation specific, only carried through.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct Trust {
    #[debug("{}", hex::encode(data))]
    data: Bytes,
}

impl Trust {
    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        Ok(Trust { data: i.rest()? })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Serialize for Trust {
    fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.data)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.data.len()
    }
}

impl PacketTrait for Trust {
    fn tag(&self) -> Tag {
        Tag::Trust
    }
}
