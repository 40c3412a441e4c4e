use std::io::{self, BufRead};

use byteorder::WriteBytesExt;
use bytes::Bytes;

use crate::errors::Result;
use crate::packet::PacketTrait;
use crate::parsing_reader::BufReadParsing;
use crate::ser::Serialize;
use crate::types::Tag;

/// The only defined version of the integrity protected packet.
pub const SEIPD_VERSION: u8 = 1;

/// Symmetrically Encrypted Integrity Protected Data Packet
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.13>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct SymEncryptedProtectedData {
    #[debug("{} bytes", data.len())]
    data: Bytes,
}

impl SymEncryptedProtectedData {
    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        let version = i.read_u8()?;
        if version != SEIPD_VERSION {
            return Err(crate::errors::Error::UnsupportedVersion {
                message: format!("integrity protected data version {version}"),
            });
        }
        Ok(SymEncryptedProtectedData { data: i.rest()? })
    }

    /// The ciphertext, behind the version octet.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Serialize for SymEncryptedProtectedData {
    fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        w.write_u8(SEIPD_VERSION)?;
        w.write_all(&self.data)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        1 + self.data.len()
    }
}

impl PacketTrait for SymEncryptedProtectedData {
    fn tag(&self) -> Tag {
        Tag::SymEncryptedProtectedData
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;

    #[test]
    fn version_is_checked() {
        let parsed = SymEncryptedProtectedData::try_from_reader(&[1u8, 9, 9][..]).unwrap();
        assert_eq!(parsed.data(), &[9, 9]);
        assert_eq!(parsed.to_bytes().unwrap(), [1, 9, 9]);
        assert!(matches!(
            SymEncryptedProtectedData::try_from_reader(&[2u8, 9][..]),
            Err(Error::UnsupportedVersion { .. })
        ));
    }
}
