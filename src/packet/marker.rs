use std::io::{self, BufRead};

use crate::errors::Result;
use crate::packet::PacketTrait;
use crate::parsing_reader::BufReadParsing;
use crate::ser::Serialize;
use crate::types::Tag;

const PGP: [u8; 3] = *b"PGP";

/// Marker Packet, must be ignored when received.
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.8>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Marker;

impl Marker {
    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        i.read_tag(&PGP)?;
        Ok(Marker)
    }
}

impl Serialize for Marker {
    fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&PGP)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        PGP.len()
    }
}

impl PacketTrait for Marker {
    fn tag(&self) -> Tag {
        Tag::Marker
    }
}
