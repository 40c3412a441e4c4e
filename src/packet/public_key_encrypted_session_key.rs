use std::io::{self, BufRead};

use byteorder::WriteBytesExt;
use bytes::Bytes;
use log::debug;
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::crypto::checksum;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::crypto::Decryptor;
use crate::errors::{Error, Result};
use crate::packet::{PacketTrait, PublicKey};
use crate::parsing_reader::BufReadParsing;
use crate::ser::Serialize;
use crate::types::{KeyId, Mpi, Tag};

/// Algorithm specific encrypted session key material.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub enum PkeskValues {
    /// `m^e mod n`
    Rsa { c: Mpi },
    Elgamal { e: Mpi, v: Mpi },
    Ecdh {
        /// Ephemeral public point.
        public_point: Mpi,
        /// AES key wrapped session info.
        #[debug("{}", hex::encode(encrypted_key))]
        encrypted_key: Bytes,
    },
    Other(#[debug("{}", hex::encode(_0))] Bytes),
}

/// Public-Key Encrypted Session Key Packet, version 3.
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.1>
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PublicKeyEncryptedSessionKey {
    key_id: KeyId,
    algorithm: PublicKeyAlgorithm,
    values: PkeskValues,
}

impl PublicKeyEncryptedSessionKey {
    pub fn new(key_id: KeyId, algorithm: PublicKeyAlgorithm, values: PkeskValues) -> Self {
        PublicKeyEncryptedSessionKey {
            key_id,
            algorithm,
            values,
        }
    }

    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        let version = i.read_u8()?;
        if version != 3 {
            return Err(Error::UnsupportedVersion {
                message: format!("PKESK version {version}"),
            });
        }
        let key_id = KeyId::from(i.read_array::<8>()?);
        let algorithm = PublicKeyAlgorithm::from(i.read_u8()?);

        let values = match algorithm {
            PublicKeyAlgorithm::RSA | PublicKeyAlgorithm::RSAEncrypt | PublicKeyAlgorithm::RSASign => {
                PkeskValues::Rsa {
                    c: Mpi::try_from_reader(&mut i)?,
                }
            }
            PublicKeyAlgorithm::Elgamal | PublicKeyAlgorithm::ElgamalEncrypt => PkeskValues::Elgamal {
                e: Mpi::try_from_reader(&mut i)?,
                v: Mpi::try_from_reader(&mut i)?,
            },
            PublicKeyAlgorithm::ECDH => PkeskValues::Ecdh {
                public_point: Mpi::try_from_reader(&mut i)?,
                encrypted_key: i.read_len_prefixed()?,
            },
            _ => PkeskValues::Other(i.rest()?),
        };

        Ok(PublicKeyEncryptedSessionKey {
            key_id,
            algorithm,
            values,
        })
    }

    /// Encrypts `alg ‖ session_key ‖ checksum` to `recipient`.
    ///
    /// With `obfuscate`, ECDH session info is padded so all ciphers wrap to the same size.
    pub fn from_session_key<R: CryptoRng + Rng>(
        rng: &mut R,
        recipient: &PublicKey,
        alg: SymmetricKeyAlgorithm,
        session_key: &[u8],
        obfuscate: bool,
    ) -> Result<Self> {
        debug!("encrypting session key to {}", recipient.key_id());
        let info = encode_session_info(alg, session_key);
        let values = recipient.encrypt_session_info(rng, &info, obfuscate)?;
        Ok(PublicKeyEncryptedSessionKey {
            key_id: recipient.key_id(),
            algorithm: recipient.algorithm(),
            values,
        })
    }

    /// Recovers the session cipher and key with the recipient's private key.
    pub fn decrypt<D: Decryptor + ?Sized>(
        &self,
        key: &D,
    ) -> Result<(SymmetricKeyAlgorithm, Zeroizing<Vec<u8>>)> {
        let info = key.decrypt_session_info(&self.values)?;
        decode_session_info(&info)
    }

    /// Recipient key id, [`KeyId::WILDCARD`] for anonymous recipients.
    pub fn key_id(&self) -> KeyId {
        self.key_id
    }

    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.algorithm
    }

    pub fn values(&self) -> &PkeskValues {
        &self.values
    }
}

impl Serialize for PublicKeyEncryptedSessionKey {
    fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        w.write_u8(3)?;
        w.write_all(self.key_id.as_ref())?;
        w.write_u8(self.algorithm.into())?;
        match &self.values {
            PkeskValues::Rsa { c } => c.to_writer(w)?,
            PkeskValues::Elgamal { e, v } => {
                e.to_writer(w)?;
                v.to_writer(w)?;
            }
            PkeskValues::Ecdh {
                public_point,
                encrypted_key,
            } => {
                public_point.to_writer(w)?;
                w.write_u8(u8::try_from(encrypted_key.len())?)?;
                w.write_all(encrypted_key)?;
            }
            PkeskValues::Other(data) => w.write_all(data)?,
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        let values = match &self.values {
            PkeskValues::Rsa { c } => c.write_len(),
            PkeskValues::Elgamal { e, v } => e.write_len() + v.write_len(),
            PkeskValues::Ecdh {
                public_point,
                encrypted_key,
            } => public_point.write_len() + 1 + encrypted_key.len(),
            PkeskValues::Other(data) => data.len(),
        };
        1 + 8 + 1 + values
    }
}

/// `alg ‖ key ‖ sum16(key)`
pub(crate) fn encode_session_info(alg: SymmetricKeyAlgorithm, key: &[u8]) -> Zeroizing<Vec<u8>> {
    let mut info = Zeroizing::new(Vec::with_capacity(key.len() + 3));
    info.push(alg.into());
    info.extend_from_slice(key);
    info.extend_from_slice(&checksum::calculate_simple(key).to_be_bytes());
    info
}

pub(crate) fn decode_session_info(
    info: &[u8],
) -> Result<(SymmetricKeyAlgorithm, Zeroizing<Vec<u8>>)> {
    ensure!(info.len() > 3, "session info of {} bytes", info.len());
    let alg = SymmetricKeyAlgorithm::from(info[0]);
    let key = &info[1..info.len() - 2];
    let expected = checksum::read_simple([info[info.len() - 2], info[info.len() - 1]]);
    let found = checksum::calculate_simple(key);
    if expected != found {
        return Err(Error::SessionKeyChecksum { expected, found });
    }
    if alg.key_size() != key.len() {
        malformed!("{:?} session key of {} bytes", alg, key.len());
    }
    Ok((alg, Zeroizing::new(key.to_vec())))
}

impl PacketTrait for PublicKeyEncryptedSessionKey {
    fn tag(&self) -> Tag {
        Tag::PublicKeyEncryptedSessionKey
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn session_info_checksum() {
        let key = [1u8; 16];
        let info = encode_session_info(SymmetricKeyAlgorithm::AES128, &key);
        assert_eq!(&info[..], &[&[7u8][..], &key[..], &[0, 16][..]].concat()[..]);

        let (alg, back) = decode_session_info(&info).unwrap();
        assert_eq!(alg, SymmetricKeyAlgorithm::AES128);
        assert_eq!(&back[..], &key[..]);

        let mut bad = info.to_vec();
        bad[17] ^= 1;
        assert!(matches!(
            decode_session_info(&bad),
            Err(Error::SessionKeyChecksum { expected: 0x0110, found: 16 })
        ));
    }

    #[test]
    fn ecdh_layout() {
        let packet = PublicKeyEncryptedSessionKey::new(
            KeyId::from([1, 2, 3, 4, 5, 6, 7, 8]),
            PublicKeyAlgorithm::ECDH,
            PkeskValues::Ecdh {
                public_point: Mpi::from_slice(&[0x40, 9, 9]),
                encrypted_key: Bytes::from_static(&[7; 40]),
            },
        );
        let raw = packet.to_bytes().unwrap();
        assert_eq!(raw.len(), packet.write_len());
        assert_eq!(&raw[..10], &[3, 1, 2, 3, 4, 5, 6, 7, 8, 18]);
        assert_eq!(raw[15], 40);
        assert_eq!(
            PublicKeyEncryptedSessionKey::try_from_reader(&raw[..]).unwrap(),
            packet
        );
    }

    #[test]
    fn rsa_layout() {
        let raw = [3, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 9, 0x01, 0xFF];
        let packet = PublicKeyEncryptedSessionKey::try_from_reader(&raw[..]).unwrap();
        assert!(packet.key_id().is_wildcard());
        assert_eq!(
            packet.values(),
            &PkeskValues::Rsa {
                c: Mpi::from_slice(&[1, 0xFF])
            }
        );
        assert_eq!(packet.to_bytes().unwrap(), raw);
    }
}
