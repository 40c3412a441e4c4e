use std::io::{self, BufRead};

use byteorder::WriteBytesExt;
use bytes::Bytes;
use log::debug;
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{Error, Result};
use crate::packet::PacketTrait;
use crate::parsing_reader::BufReadParsing;
use crate::ser::Serialize;
use crate::types::{StringToKey, Tag, DEFAULT_ITER_COUNT};

/// Symmetric-Key Encrypted Session Key Packet, version 4.
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.3>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct SymKeyEncryptedSessionKey {
    sym_algorithm: SymmetricKeyAlgorithm,
    s2k: StringToKey,
    /// `alg ‖ session key`, encrypted with the S2K key. Absent when the S2K key
    /// itself is the session key.
    #[debug("{:?}", encrypted_key.as_ref().map(hex::encode))]
    encrypted_key: Option<Bytes>,
}

impl SymKeyEncryptedSessionKey {
    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        let version = i.read_u8()?;
        if version != 4 {
            return Err(Error::UnsupportedVersion {
                message: format!("SKESK version {version}"),
            });
        }
        let sym_algorithm = SymmetricKeyAlgorithm::from(i.read_u8()?);
        let s2k = StringToKey::try_from_reader(&mut i)?;
        let rest = i.rest()?;
        let encrypted_key = (!rest.is_empty()).then_some(rest);

        Ok(SymKeyEncryptedSessionKey {
            sym_algorithm,
            s2k,
            encrypted_key,
        })
    }

    /// A packet whose derived key is used directly as the session key.
    ///
    /// Returns the packet and the session key.
    pub fn new_direct<R: CryptoRng + Rng>(
        rng: &mut R,
        passphrase: &[u8],
        alg: SymmetricKeyAlgorithm,
        hash: HashAlgorithm,
    ) -> Result<(Self, Zeroizing<Vec<u8>>)> {
        let s2k = StringToKey::new_iterated(rng, hash, DEFAULT_ITER_COUNT);
        let key = s2k.derive_key(passphrase, alg.key_size())?;
        let packet = SymKeyEncryptedSessionKey {
            sym_algorithm: alg,
            s2k,
            encrypted_key: None,
        };
        Ok((packet, key))
    }

    /// A packet carrying `session_alg ‖ session_key`, encrypted under the passphrase.
    ///
    /// The wrapping cipher is `alg`, the same as the session cipher.
    pub fn encrypt<R: CryptoRng + Rng>(
        rng: &mut R,
        passphrase: &[u8],
        alg: SymmetricKeyAlgorithm,
        hash: HashAlgorithm,
        session_key: &[u8],
    ) -> Result<Self> {
        let s2k = StringToKey::new_iterated(rng, hash, DEFAULT_ITER_COUNT);
        let key = s2k.derive_key(passphrase, alg.key_size())?;

        let mut data = Zeroizing::new(Vec::with_capacity(1 + session_key.len()));
        data.push(alg.into());
        data.extend_from_slice(session_key);
        let iv = vec![0u8; alg.block_size()];
        alg.encrypt_with_iv_regular(&key, &iv, &mut data)?;

        Ok(SymKeyEncryptedSessionKey {
            sym_algorithm: alg,
            s2k,
            encrypted_key: Some(Bytes::copy_from_slice(&data)),
        })
    }

    pub fn sym_algorithm(&self) -> SymmetricKeyAlgorithm {
        self.sym_algorithm
    }

    pub fn s2k(&self) -> &StringToKey {
        &self.s2k
    }

    /// Recovers the session cipher and key with `passphrase`.
    ///
    /// A wrong passphrase is not detected here, only by the data packet later on.
    pub fn decrypt(
        &self,
        passphrase: &[u8],
    ) -> Result<(SymmetricKeyAlgorithm, Zeroizing<Vec<u8>>)> {
        let key = self
            .s2k
            .derive_key(passphrase, self.sym_algorithm.key_size())?;

        let Some(encrypted_key) = &self.encrypted_key else {
            return Ok((self.sym_algorithm, key));
        };

        let mut data = Zeroizing::new(encrypted_key.to_vec());
        let iv = vec![0u8; self.sym_algorithm.block_size()];
        self.sym_algorithm
            .decrypt_with_iv_regular(&key, &iv, &mut data)?;

        let Some((alg, session_key)) = data.split_first() else {
            malformed!("empty encrypted session key");
        };
        let alg = SymmetricKeyAlgorithm::from(*alg);
        debug!("SKESK session cipher {:?}", alg);
        if alg.key_size() != session_key.len() {
            // Garbage from a wrong passphrase usually ends up here.
            return Err(Error::WrongPassphrase {
                expected: format!("{} byte key", alg.key_size()),
                found: format!("{} bytes", session_key.len()),
            });
        }

        Ok((alg, Zeroizing::new(session_key.to_vec())))
    }
}

impl Serialize for SymKeyEncryptedSessionKey {
    fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        w.write_u8(4)?;
        w.write_u8(self.sym_algorithm.into())?;
        self.s2k.to_writer(w)?;
        if let Some(key) = &self.encrypted_key {
            w.write_all(key)?;
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        2 + self.s2k.write_len() + self.encrypted_key.as_ref().map_or(0, |k| k.len())
    }
}

impl PacketTrait for SymKeyEncryptedSessionKey {
    fn tag(&self) -> Tag {
        Tag::SymKeyEncryptedSessionKey
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn direct_key() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let (packet, key) = SymKeyEncryptedSessionKey::new_direct(
            &mut rng,
            b"secret",
            SymmetricKeyAlgorithm::CAST5,
            HashAlgorithm::Sha1,
        )
        .unwrap();
        let raw = packet.to_bytes().unwrap();
        assert_eq!(raw.len(), 2 + 11);
        let parsed = SymKeyEncryptedSessionKey::try_from_reader(&raw[..]).unwrap();
        let (alg, recovered) = parsed.decrypt(b"secret").unwrap();
        assert_eq!(alg, SymmetricKeyAlgorithm::CAST5);
        assert_eq!(recovered, key);
    }

    #[test]
    fn wrapped_key() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let session_key = SymmetricKeyAlgorithm::AES256.new_session_key(&mut rng);
        let packet = SymKeyEncryptedSessionKey::encrypt(
            &mut rng,
            b"pw",
            SymmetricKeyAlgorithm::AES256,
            HashAlgorithm::Sha256,
            &session_key,
        )
        .unwrap();
        let raw = packet.to_bytes().unwrap();
        let parsed = SymKeyEncryptedSessionKey::try_from_reader(&raw[..]).unwrap();
        assert_eq!(parsed, packet);
        let (alg, key) = parsed.decrypt(b"pw").unwrap();
        assert_eq!(alg, SymmetricKeyAlgorithm::AES256);
        assert_eq!(key, session_key);
    }

    #[test]
    fn version_check() {
        assert!(matches!(
            SymKeyEncryptedSessionKey::try_from_reader(&[5u8, 7, 0, 2][..]),
            Err(Error::UnsupportedVersion { .. })
        ));
    }
}
