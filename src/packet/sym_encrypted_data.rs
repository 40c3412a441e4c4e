use std::io::{self, BufRead};

use bytes::Bytes;

use crate::errors::Result;
use crate::packet::PacketTrait;
use crate::parsing_reader::BufReadParsing;
use crate::ser::Serialize;
use crate::types::Tag;

/// Symmetrically Encrypted Data Packet, without integrity protection.
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.7>
///
/// The ciphertext uses the OpenPGP CFB variant with a resync after the prefix.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct SymEncryptedData {
    #[debug("{} bytes", data.len())]
    data: Bytes,
}

impl SymEncryptedData {
    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        Ok(SymEncryptedData { data: i.rest()? })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Serialize for SymEncryptedData {
    fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.data)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.data.len()
    }
}

impl PacketTrait for SymEncryptedData {
    fn tag(&self) -> Tag {
        Tag::SymEncryptedData
    }
}
