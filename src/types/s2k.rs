use std::io::{self, BufRead};

use byteorder::WriteBytesExt;
use bytes::Bytes;
use log::debug;
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::Result;
use crate::parsing_reader::BufReadParsing;
use crate::ser::Serialize;

/// Iteration count byte used for new protections, 65536 hashed octets.
pub const DEFAULT_ITER_COUNT: u8 = 0x60;

/// String-to-key specifier: how a passphrase becomes a symmetric key.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-3.7>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub enum StringToKey {
    Simple {
        hash_alg: HashAlgorithm,
    },
    Salted {
        hash_alg: HashAlgorithm,
        #[debug("{}", hex::encode(salt))]
        salt: [u8; 8],
    },
    IteratedAndSalted {
        hash_alg: HashAlgorithm,
        #[debug("{}", hex::encode(salt))]
        salt: [u8; 8],
        /// Encoded count, see [`StringToKey::decode_count`].
        count: u8,
    },
    /// GnuPG extension 101: the secret key material is absent.
    GnuDummy {
        hash_alg: HashAlgorithm,
        mode: GnuDummyMode,
    },
}

/// Protection modes of the GnuPG dummy S2K.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub enum GnuDummyMode {
    /// No secret material at all (mode 1001).
    NoSecret,
    /// Secret material lives on a smartcard (mode 1002).
    DivertToCard {
        #[debug("{}", hex::encode(serial))]
        serial: Bytes,
    },
}

impl StringToKey {
    /// A fresh iterated and salted specifier.
    pub fn new_iterated<R: CryptoRng + Rng>(rng: &mut R, hash_alg: HashAlgorithm, count: u8) -> Self {
        let mut salt = [0u8; 8];
        rng.fill(&mut salt);
        StringToKey::IteratedAndSalted {
            hash_alg,
            salt,
            count,
        }
    }

    /// The specifier used when protecting new material: SHA-1, count byte 0x60.
    pub fn new_default<R: CryptoRng + Rng>(rng: &mut R) -> Self {
        Self::new_iterated(rng, HashAlgorithm::Sha1, DEFAULT_ITER_COUNT)
    }

    /// Decodes the one byte iteration count into the number of hashed octets.
    pub fn decode_count(c: u8) -> usize {
        (16 + usize::from(c & 15)) << (usize::from(c >> 4) + 6)
    }

    pub fn hash_alg(&self) -> HashAlgorithm {
        match self {
            StringToKey::Simple { hash_alg }
            | StringToKey::Salted { hash_alg, .. }
            | StringToKey::IteratedAndSalted { hash_alg, .. }
            | StringToKey::GnuDummy { hash_alg, .. } => *hash_alg,
        }
    }

    pub fn is_gnu_dummy(&self) -> bool {
        matches!(self, StringToKey::GnuDummy { .. })
    }

    /// Derives a key of `key_size` bytes from the passphrase.
    ///
    /// When one digest is not enough, further hash contexts are preloaded with one
    /// more zero octet each and their outputs concatenated.
    pub fn derive_key(&self, passphrase: &[u8], key_size: usize) -> Result<Zeroizing<Vec<u8>>> {
        let hash_alg = self.hash_alg();
        let Some(digest_size) = hash_alg.digest_size() else {
            unsupported_err!("hash algorithm {} for S2K", hash_alg);
        };
        debug!("deriving {} byte key with {:?}", key_size, self);

        let mut key = Zeroizing::new(Vec::with_capacity(key_size + digest_size));
        let mut preload = 0;

        while key.len() < key_size {
            let mut hasher = hash_alg.new_hasher()?;
            hasher.update(&vec![0u8; preload]);

            match self {
                StringToKey::Simple { .. } => hasher.update(passphrase),
                StringToKey::Salted { salt, .. } => {
                    hasher.update(salt);
                    hasher.update(passphrase);
                }
                StringToKey::IteratedAndSalted { salt, count, .. } => {
                    let mut data = Zeroizing::new(Vec::with_capacity(salt.len() + passphrase.len()));
                    data.extend_from_slice(salt);
                    data.extend_from_slice(passphrase);

                    // At least one full copy of salt and passphrase is hashed.
                    let count = Self::decode_count(*count).max(data.len());
                    for _ in 0..count / data.len() {
                        hasher.update(&data);
                    }
                    hasher.update(&data[..count % data.len()]);
                }
                StringToKey::GnuDummy { .. } => {
                    invalid_op!("the GNU dummy S2K carries no secret to derive a key for")
                }
            }

            key.extend_from_slice(&hasher.finalize());
            preload += 1;
        }
        key.truncate(key_size);

        Ok(key)
    }

    /// Key derivation for legacy protections without an S2K specifier: simple MD5.
    pub fn legacy_key(passphrase: &[u8], alg: SymmetricKeyAlgorithm) -> Result<Zeroizing<Vec<u8>>> {
        StringToKey::Simple {
            hash_alg: HashAlgorithm::Md5,
        }
        .derive_key(passphrase, alg.key_size())
    }

    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        let typ = i.read_u8()?;
        let hash_alg = HashAlgorithm::from(i.read_u8()?);

        let s2k = match typ {
            0 => StringToKey::Simple { hash_alg },
            1 => StringToKey::Salted {
                hash_alg,
                salt: i.read_array()?,
            },
            3 => StringToKey::IteratedAndSalted {
                hash_alg,
                salt: i.read_array()?,
                count: i.read_u8()?,
            },
            101 => {
                i.read_tag(b"GNU")?;
                let mode = match i.read_u8()? {
                    1 => GnuDummyMode::NoSecret,
                    2 => GnuDummyMode::DivertToCard {
                        serial: i.read_len_prefixed()?,
                    },
                    other => unsupported_err!("GNU S2K protection mode {}", other),
                };
                StringToKey::GnuDummy { hash_alg, mode }
            }
            other => unsupported_err!("S2K type {}", other),
        };

        Ok(s2k)
    }
}

impl Serialize for StringToKey {
    fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        match self {
            StringToKey::Simple { hash_alg } => {
                w.write_all(&[0, (*hash_alg).into()])?;
            }
            StringToKey::Salted { hash_alg, salt } => {
                w.write_all(&[1, (*hash_alg).into()])?;
                w.write_all(salt)?;
            }
            StringToKey::IteratedAndSalted {
                hash_alg,
                salt,
                count,
            } => {
                w.write_all(&[3, (*hash_alg).into()])?;
                w.write_all(salt)?;
                w.write_u8(*count)?;
            }
            StringToKey::GnuDummy { hash_alg, mode } => {
                w.write_all(&[101, (*hash_alg).into()])?;
                w.write_all(b"GNU")?;
                match mode {
                    GnuDummyMode::NoSecret => w.write_u8(1)?,
                    GnuDummyMode::DivertToCard { serial } => {
                        w.write_u8(2)?;
                        w.write_u8(u8::try_from(serial.len())?)?;
                        w.write_all(serial)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        match self {
            StringToKey::Simple { .. } => 2,
            StringToKey::Salted { .. } => 10,
            StringToKey::IteratedAndSalted { .. } => 11,
            StringToKey::GnuDummy { mode, .. } => match mode {
                GnuDummyMode::NoSecret => 6,
                GnuDummyMode::DivertToCard { serial } => 7 + serial.len(),
            },
        }
    }
}

/// How secret key material is protected, the usage octet of a secret key packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S2kUsage {
    /// Plaintext material with a two octet checksum.
    Unprotected,
    /// Encrypted, two octet checksum (255).
    Checksum,
    /// Encrypted, SHA-1 trailer (254).
    Sha1,
    /// Pre RFC 2440: the octet is the cipher id, the key is simple MD5.
    LegacyCipher(SymmetricKeyAlgorithm),
}

impl From<u8> for S2kUsage {
    fn from(value: u8) -> Self {
        match value {
            0 => S2kUsage::Unprotected,
            254 => S2kUsage::Sha1,
            255 => S2kUsage::Checksum,
            alg => S2kUsage::LegacyCipher(alg.into()),
        }
    }
}

impl From<S2kUsage> for u8 {
    fn from(value: S2kUsage) -> Self {
        match value {
            S2kUsage::Unprotected => 0,
            S2kUsage::Sha1 => 254,
            S2kUsage::Checksum => 255,
            S2kUsage::LegacyCipher(alg) => alg.into(),
        }
    }
}

impl S2kUsage {
    /// Size of the integrity trailer behind the secret fields.
    pub fn trailer_len(self) -> usize {
        match self {
            S2kUsage::Sha1 => 20,
            _ => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn count_formula() {
        assert_eq!(StringToKey::decode_count(0), 1024);
        assert_eq!(StringToKey::decode_count(0x60), 65536);
        assert_eq!(StringToKey::decode_count(0xFF), 65_011_712);
    }

    #[test]
    fn simple_md5_known_answer() {
        let key = StringToKey::Simple {
            hash_alg: HashAlgorithm::Md5,
        }
        .derive_key(b"abc", 16)
        .unwrap();
        assert_eq!(hex::encode(&*key), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn multiple_contexts_are_preloaded() {
        let s2k = StringToKey::Simple {
            hash_alg: HashAlgorithm::Sha1,
        };
        let key = s2k.derive_key(b"pw", 32).unwrap();
        assert_eq!(&key[..20], &HashAlgorithm::Sha1.digest(b"pw").unwrap()[..]);
        assert_eq!(
            &key[20..],
            &HashAlgorithm::Sha1.digest(b"\x00pw").unwrap()[..12]
        );
    }

    #[test]
    fn salt_changes_output() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let s2k = StringToKey::new_iterated(&mut rng, HashAlgorithm::Sha256, 0x10);
        let StringToKey::IteratedAndSalted { hash_alg, mut salt, count } = s2k.clone() else {
            unreachable!()
        };
        salt[0] ^= 1;
        let flipped = StringToKey::IteratedAndSalted { hash_alg, salt, count };

        let a = s2k.derive_key(b"hello", 16).unwrap();
        let b = s2k.derive_key(b"hello", 16).unwrap();
        let c = flipped.derive_key(b"hello", 16).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn iterated_short_count_hashes_everything_once() {
        let salt = [1u8; 8];
        let s2k = StringToKey::IteratedAndSalted {
            hash_alg: HashAlgorithm::Sha1,
            salt,
            count: 0,
        };
        // 1024 octets of salt+passphrase, repeated.
        let pw = b"0123456789abcdef";
        let mut data = Vec::new();
        while data.len() < 1024 {
            data.extend_from_slice(&salt);
            data.extend_from_slice(pw);
        }
        data.truncate(1024);
        let key = s2k.derive_key(pw, 20).unwrap();
        assert_eq!(&key[..], &HashAlgorithm::Sha1.digest(&data).unwrap()[..]);
    }

    #[test]
    fn gnu_dummy_parsing() {
        let raw = hex::decode("6502474e5501").unwrap();
        let s2k = StringToKey::try_from_reader(&raw[..]).unwrap();
        assert_eq!(
            s2k,
            StringToKey::GnuDummy {
                hash_alg: HashAlgorithm::Sha1,
                mode: GnuDummyMode::NoSecret
            }
        );
        assert!(s2k.derive_key(b"x", 16).is_err());
        assert_eq!(s2k.to_bytes().unwrap(), raw);

        let raw = hex::decode("6502474e550203010203").unwrap();
        let s2k = StringToKey::try_from_reader(&raw[..]).unwrap();
        assert_eq!(s2k.write_len(), raw.len());
        assert_eq!(s2k.to_bytes().unwrap(), raw);
    }

    #[test]
    fn unknown_type() {
        assert!(StringToKey::try_from_reader(&[2, 2][..]).is_err());
    }

    #[test]
    fn usage_octets() {
        assert_eq!(S2kUsage::from(0), S2kUsage::Unprotected);
        assert_eq!(S2kUsage::from(254), S2kUsage::Sha1);
        assert_eq!(
            S2kUsage::from(3),
            S2kUsage::LegacyCipher(SymmetricKeyAlgorithm::CAST5)
        );
        assert_eq!(u8::from(S2kUsage::Checksum), 255);
    }

    proptest! {
        #[test]
        fn iterated_roundtrip(hash in 1u8..4, salt: [u8; 8], count: u8) {
            let s2k = StringToKey::IteratedAndSalted { hash_alg: hash.into(), salt, count };
            let raw = s2k.to_bytes().unwrap();
            prop_assert_eq!(raw.len(), s2k.write_len());
            prop_assert_eq!(StringToKey::try_from_reader(&raw[..]).unwrap(), s2k);
        }
    }
}
