use std::io::{self, BufRead};

use byteorder::WriteBytesExt;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::{Error, Result};
use crate::packet::{PacketTrait, SignatureConfig, SignatureType};
use crate::parsing_reader::BufReadParsing;
use crate::ser::Serialize;
use crate::types::{KeyId, Tag};

/// One-Pass Signature Packet, version 3
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.4>
///
/// Announces a signature that follows the signed data, so readers can hash in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnePassSignature {
    pub typ: SignatureType,
    pub hash_algorithm: HashAlgorithm,
    pub pub_algorithm: PublicKeyAlgorithm,
    pub key_id: KeyId,
    /// True when no further one-pass signature packet follows before the data.
    pub last: bool,
}

impl OnePassSignature {
    pub fn new(config: &SignatureConfig, key_id: KeyId, last: bool) -> Self {
        OnePassSignature {
            typ: config.typ,
            hash_algorithm: config.hash_alg,
            pub_algorithm: config.pub_alg,
            key_id,
            last,
        }
    }

    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        let version = i.read_u8()?;
        if version != 3 {
            return Err(Error::UnsupportedVersion {
                message: format!("one pass signature version {version}"),
            });
        }
        let typ = SignatureType::from(i.read_u8()?);
        let hash_algorithm = HashAlgorithm::from(i.read_u8()?);
        let pub_algorithm = PublicKeyAlgorithm::from(i.read_u8()?);
        let key_id = KeyId::from(i.read_array::<8>()?);
        let last = i.read_u8()? != 0;

        Ok(OnePassSignature {
            typ,
            hash_algorithm,
            pub_algorithm,
            key_id,
            last,
        })
    }
}

impl Serialize for OnePassSignature {
    fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&[
            3,
            self.typ.into(),
            self.hash_algorithm.into(),
            self.pub_algorithm.into(),
        ])?;
        w.write_all(self.key_id.as_ref())?;
        w.write_u8(self.last.into())?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        13
    }
}

impl PacketTrait for OnePassSignature {
    fn tag(&self) -> Tag {
        Tag::OnePassSignature
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn layout() {
        let raw = hex!("03 00 02 11 0102030405060708 01");
        let ops = OnePassSignature::try_from_reader(&raw[..]).unwrap();
        assert_eq!(ops.typ, SignatureType::Binary);
        assert_eq!(ops.hash_algorithm, HashAlgorithm::Sha1);
        assert_eq!(ops.pub_algorithm, PublicKeyAlgorithm::DSA);
        assert!(ops.last);
        assert_eq!(ops.to_bytes().unwrap(), raw);
    }

    #[test]
    fn unknown_version() {
        let raw = hex!("04 00 02 11 0102030405060708 01");
        assert!(OnePassSignature::try_from_reader(&raw[..]).is_err());
    }
}
