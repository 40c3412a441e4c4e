use std::io::{self, BufRead};

use crate::errors::Result;
use crate::packet::PacketTrait;
use crate::parsing_reader::BufReadParsing;
use crate::ser::Serialize;
use crate::types::Tag;

/// Modification Detection Code Packet
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.14>
///
/// Only ever appears inside the plaintext of an integrity protected packet.
#[derive(Clone, Copy, PartialEq, Eq, derive_more::Debug)]
pub struct ModDetectionCode {
    /// SHA-1 over the plaintext, including the prefix and the MDC header bytes.
    #[debug("{}", hex::encode(hash))]
    hash: [u8; 20],
}

impl ModDetectionCode {
    /// The fixed header of the MDC packet as it is hashed: new format tag 19, length 20.
    pub const HEADER: [u8; 2] = [0xD3, 0x14];

    pub fn new(hash: [u8; 20]) -> Self {
        ModDetectionCode { hash }
    }

    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        Ok(ModDetectionCode {
            hash: i.read_array()?,
        })
    }

    pub fn hash(&self) -> &[u8; 20] {
        &self.hash
    }
}

impl Serialize for ModDetectionCode {
    fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.hash)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        20
    }
}

impl PacketTrait for ModDetectionCode {
    fn tag(&self) -> Tag {
        Tag::ModDetectionCode
    }
}
