use aes::{Aes128, Aes192, Aes256};
use blowfish::Blowfish;
use camellia::{Camellia128, Camellia192, Camellia256};
use cast5::Cast5;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use cfb_mode::{BufDecryptor, BufEncryptor, Decryptor, Encryptor};
use cipher::{BlockCipher, BlockEncryptMut};
use des::TdesEde3;
use idea::Idea;
use num_enum::{FromPrimitive, IntoPrimitive};
use rand::{CryptoRng, Rng};
use twofish::Twofish;
use zeroize::Zeroizing;

use crate::errors::Result;

/// Runs `$body` with `$c` bound to the block cipher type of `$alg`.
macro_rules! with_cipher {
    ($alg:expr, $c:ident => $body:expr) => {
        match $alg {
            SymmetricKeyAlgorithm::IDEA => {
                type $c = Idea;
                $body
            }
            SymmetricKeyAlgorithm::TripleDES => {
                type $c = TdesEde3;
                $body
            }
            SymmetricKeyAlgorithm::CAST5 => {
                type $c = Cast5;
                $body
            }
            SymmetricKeyAlgorithm::Blowfish => {
                type $c = Blowfish;
                $body
            }
            SymmetricKeyAlgorithm::AES128 => {
                type $c = Aes128;
                $body
            }
            SymmetricKeyAlgorithm::AES192 => {
                type $c = Aes192;
                $body
            }
            SymmetricKeyAlgorithm::AES256 => {
                type $c = Aes256;
                $body
            }
            SymmetricKeyAlgorithm::Twofish => {
                type $c = Twofish;
                $body
            }
            SymmetricKeyAlgorithm::Camellia128 => {
                type $c = Camellia128;
                $body
            }
            SymmetricKeyAlgorithm::Camellia192 => {
                type $c = Camellia192;
                $body
            }
            SymmetricKeyAlgorithm::Camellia256 => {
                type $c = Camellia256;
                $body
            }
            SymmetricKeyAlgorithm::Plaintext => {
                invalid_op!("'Plaintext' is not a legal cipher for encrypted data")
            }
            SymmetricKeyAlgorithm::Other(id) => unsupported_err!("symmetric algorithm {}", id),
        }
    };
}

/// Available symmetric key algorithms.
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-9.2>
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash, FromPrimitive, IntoPrimitive)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
#[repr(u8)]
pub enum SymmetricKeyAlgorithm {
    /// Plaintext or unencrypted data
    Plaintext = 0,
    IDEA = 1,
    TripleDES = 2,
    CAST5 = 3,
    Blowfish = 4,
    AES128 = 7,
    AES192 = 8,
    AES256 = 9,
    /// Twofish with 256-bit key
    Twofish = 10,
    Camellia128 = 11,
    Camellia192 = 12,
    Camellia256 = 13,

    #[num_enum(catch_all)]
    Other(#[cfg_attr(test, proptest(strategy = "14u8.."))] u8),
}

impl Default for SymmetricKeyAlgorithm {
    fn default() -> Self {
        Self::AES128
    }
}

impl zeroize::DefaultIsZeroes for SymmetricKeyAlgorithm {}

impl SymmetricKeyAlgorithm {
    /// The size of a single block in bytes.
    pub fn block_size(self) -> usize {
        match self {
            SymmetricKeyAlgorithm::IDEA
            | SymmetricKeyAlgorithm::TripleDES
            | SymmetricKeyAlgorithm::CAST5
            | SymmetricKeyAlgorithm::Blowfish => 8,
            SymmetricKeyAlgorithm::AES128
            | SymmetricKeyAlgorithm::AES192
            | SymmetricKeyAlgorithm::AES256
            | SymmetricKeyAlgorithm::Twofish
            | SymmetricKeyAlgorithm::Camellia128
            | SymmetricKeyAlgorithm::Camellia192
            | SymmetricKeyAlgorithm::Camellia256 => 16,
            SymmetricKeyAlgorithm::Plaintext | SymmetricKeyAlgorithm::Other(_) => 0,
        }
    }

    /// The size of the key in bytes.
    pub const fn key_size(self) -> usize {
        match self {
            SymmetricKeyAlgorithm::IDEA => 16,
            SymmetricKeyAlgorithm::TripleDES => 24,
            SymmetricKeyAlgorithm::CAST5 => 16,
            SymmetricKeyAlgorithm::Blowfish => 16,
            SymmetricKeyAlgorithm::AES128 => 16,
            SymmetricKeyAlgorithm::AES192 => 24,
            SymmetricKeyAlgorithm::AES256 => 32,
            SymmetricKeyAlgorithm::Twofish => 32,
            SymmetricKeyAlgorithm::Camellia128 => 16,
            SymmetricKeyAlgorithm::Camellia192 => 24,
            SymmetricKeyAlgorithm::Camellia256 => 32,
            SymmetricKeyAlgorithm::Plaintext | SymmetricKeyAlgorithm::Other(_) => 0,
        }
    }

    /// Generates a random session key of the right size.
    pub fn new_session_key<R: CryptoRng + Rng>(self, rng: &mut R) -> Zeroizing<Vec<u8>> {
        let mut key = Zeroizing::new(vec![0u8; self.key_size()]);
        rng.fill_bytes(&mut key);
        key
    }

    /// Decrypts in place with regular CFB. Any length is accepted; a trailing partial
    /// block uses only as many key stream bytes as it has.
    pub fn decrypt_with_iv_regular(self, key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()> {
        with_cipher!(self, C => Decryptor::<C>::new_from_slices(key, iv)?.decrypt(data));
        Ok(())
    }

    /// Encrypts in place with regular CFB, see [`Self::decrypt_with_iv_regular`].
    pub fn encrypt_with_iv_regular(self, key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()> {
        with_cipher!(self, C => Encryptor::<C>::new_from_slices(key, iv)?.encrypt(data));
        Ok(())
    }

    /// Incremental CFB encryption, usable over arbitrarily sized writes.
    pub fn stream_encryptor(self, key: &[u8], iv: &[u8]) -> Result<CfbStream> {
        let core: Box<dyn CfbCore> = with_cipher!(self, C => Box::new(
            EncryptCore(BufEncryptor::<C>::new_from_slices(key, iv)?)
        ));
        Ok(CfbStream { core })
    }

    /// Incremental CFB decryption.
    pub fn stream_decryptor(self, key: &[u8], iv: &[u8]) -> Result<CfbStream> {
        let core: Box<dyn CfbCore> = with_cipher!(self, C => Box::new(
            DecryptCore(BufDecryptor::<C>::new_from_slices(key, iv)?)
        ));
        Ok(CfbStream { core })
    }
}

trait CfbCore {
    fn apply(&mut self, data: &mut [u8]);
}

struct EncryptCore<C: BlockEncryptMut + BlockCipher>(BufEncryptor<C>);
struct DecryptCore<C: BlockEncryptMut + BlockCipher>(BufDecryptor<C>);

impl<C: BlockEncryptMut + BlockCipher> CfbCore for EncryptCore<C> {
    fn apply(&mut self, data: &mut [u8]) {
        self.0.encrypt(data)
    }
}

impl<C: BlockEncryptMut + BlockCipher> CfbCore for DecryptCore<C> {
    fn apply(&mut self, data: &mut [u8]) {
        self.0.decrypt(data)
    }
}

/// A CFB key stream in one direction, carrying its position across calls.
pub struct CfbStream {
    core: Box<dyn CfbCore>,
}

impl CfbStream {
    /// Transforms `data` in place.
    pub fn apply(&mut self, data: &mut [u8]) {
        self.core.apply(data)
    }
}

impl std::fmt::Debug for CfbStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CfbStream").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    const ALGS: [SymmetricKeyAlgorithm; 11] = [
        SymmetricKeyAlgorithm::IDEA,
        SymmetricKeyAlgorithm::TripleDES,
        SymmetricKeyAlgorithm::CAST5,
        SymmetricKeyAlgorithm::Blowfish,
        SymmetricKeyAlgorithm::AES128,
        SymmetricKeyAlgorithm::AES192,
        SymmetricKeyAlgorithm::AES256,
        SymmetricKeyAlgorithm::Twofish,
        SymmetricKeyAlgorithm::Camellia128,
        SymmetricKeyAlgorithm::Camellia192,
        SymmetricKeyAlgorithm::Camellia256,
    ];

    #[test]
    fn one_shot_and_streaming_agree() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for alg in ALGS {
            let key = alg.new_session_key(&mut rng);
            let iv = vec![0u8; alg.block_size()];
            let plain: Vec<u8> = (0..77u8).collect();

            let mut one_shot = plain.clone();
            alg.encrypt_with_iv_regular(&key, &iv, &mut one_shot).unwrap();

            let mut streamed = plain.clone();
            let mut enc = alg.stream_encryptor(&key, &iv).unwrap();
            for chunk in streamed.chunks_mut(5) {
                enc.apply(chunk);
            }
            assert_eq!(one_shot, streamed, "{alg:?}");

            let mut dec = alg.stream_decryptor(&key, &iv).unwrap();
            for chunk in streamed.chunks_mut(3) {
                dec.apply(chunk);
            }
            assert_eq!(streamed, plain, "{alg:?}");

            alg.decrypt_with_iv_regular(&key, &iv, &mut one_shot).unwrap();
            assert_eq!(one_shot, plain, "{alg:?}");
        }
    }

    #[test]
    fn rejects_plaintext_and_bad_keys() {
        let mut data = [0u8; 4];
        assert!(SymmetricKeyAlgorithm::Plaintext
            .encrypt_with_iv_regular(&[], &[], &mut data)
            .is_err());
        assert!(SymmetricKeyAlgorithm::AES128
            .encrypt_with_iv_regular(&[0u8; 5], &[0u8; 16], &mut data)
            .is_err());
        assert!(SymmetricKeyAlgorithm::Other(99)
            .stream_decryptor(&[0u8; 16], &[0u8; 16])
            .is_err());
    }

    #[test]
    fn sizes() {
        assert_eq!(SymmetricKeyAlgorithm::CAST5.block_size(), 8);
        assert_eq!(SymmetricKeyAlgorithm::AES256.key_size(), 32);
        assert_eq!(SymmetricKeyAlgorithm::from(7), SymmetricKeyAlgorithm::AES128);
    }
}
