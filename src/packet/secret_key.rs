use std::io::{self, BufRead};

use byteorder::WriteBytesExt;
use bytes::Bytes;
use log::debug;
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::crypto::checksum;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::crypto::PrivateKey;
use crate::errors::{Error, Result};
use crate::packet::{PacketTrait, PublicKey};
use crate::parsing_reader::BufReadParsing;
use crate::ser::Serialize;
use crate::types::{
    GnuDummyMode, KeyId, KeyVersion, PlainSecretParams, S2kUsage, StringToKey, Tag,
};

/// Secret-Key and Secret-Subkey Packets
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.5.3>
///
/// The secret part is kept exactly as stored: ciphertext for protected keys,
/// plaintext for unprotected ones, always including the integrity trailer.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct SecretKey {
    details: PublicKey,
    usage: S2kUsage,
    /// Cipher protecting the secret, `Plaintext` when unprotected.
    sym_alg: SymmetricKeyAlgorithm,
    s2k: Option<StringToKey>,
    #[debug("{:?}", iv.as_ref().map(hex::encode))]
    iv: Option<Bytes>,
    #[debug("..")]
    secret_data: Bytes,
}

impl SecretKey {
    pub fn try_from_reader<B: BufRead>(tag: Tag, mut i: B) -> Result<Self> {
        let details = PublicKey::try_from_reader(tag, &mut i)?;
        let usage = S2kUsage::from(i.read_u8()?);

        let (sym_alg, s2k) = match usage {
            S2kUsage::Unprotected => (SymmetricKeyAlgorithm::Plaintext, None),
            S2kUsage::Checksum | S2kUsage::Sha1 => {
                let alg = SymmetricKeyAlgorithm::from(i.read_u8()?);
                (alg, Some(StringToKey::try_from_reader(&mut i)?))
            }
            S2kUsage::LegacyCipher(alg) => (alg, None),
        };

        let has_iv = usage != S2kUsage::Unprotected
            && !s2k.as_ref().is_some_and(StringToKey::is_gnu_dummy);
        let iv = if has_iv {
            Some(i.take_bytes(sym_alg.block_size())?)
        } else {
            None
        };
        let secret_data = i.rest()?;
        debug!(
            "secret key {} usage {:?} cipher {:?}",
            details.key_id(),
            usage,
            sym_alg
        );

        Ok(SecretKey {
            details,
            usage,
            sym_alg,
            s2k,
            iv,
            secret_data,
        })
    }

    /// An unprotected secret key, with a two octet checksum.
    pub fn from_plain(details: PublicKey, params: &PlainSecretParams) -> Result<Self> {
        let mut data = Zeroizing::new(params.to_bytes()?);
        let sum = checksum::calculate_simple(&data);
        data.extend_from_slice(&sum.to_be_bytes());
        Ok(SecretKey {
            details,
            usage: S2kUsage::Unprotected,
            sym_alg: SymmetricKeyAlgorithm::Plaintext,
            s2k: None,
            iv: None,
            secret_data: Bytes::copy_from_slice(&data),
        })
    }

    /// Encrypts plain secret material under `passphrase`, with a SHA-1 or checksum trailer.
    pub fn protect<R: CryptoRng + Rng>(
        rng: &mut R,
        details: PublicKey,
        params: &PlainSecretParams,
        alg: SymmetricKeyAlgorithm,
        passphrase: &[u8],
        use_sha1: bool,
    ) -> Result<Self> {
        let mut plain = Zeroizing::new(params.to_bytes()?);
        let usage = if use_sha1 {
            let digest = checksum::calculate_sha1(&plain);
            plain.extend_from_slice(&digest);
            S2kUsage::Sha1
        } else {
            let sum = checksum::calculate_simple(&plain);
            plain.extend_from_slice(&sum.to_be_bytes());
            S2kUsage::Checksum
        };
        let unprotected = SecretKey {
            details,
            usage: S2kUsage::Unprotected,
            sym_alg: SymmetricKeyAlgorithm::Plaintext,
            s2k: None,
            iv: None,
            secret_data: Bytes::new(),
        };
        unprotected.seal(rng, plain, usage, alg, passphrase)
    }

    /// A stub for keys whose secret lives elsewhere.
    pub fn new_gnu_dummy(details: PublicKey, mode: GnuDummyMode) -> Self {
        SecretKey {
            details,
            usage: S2kUsage::Checksum,
            sym_alg: SymmetricKeyAlgorithm::Plaintext,
            s2k: Some(StringToKey::GnuDummy {
                hash_alg: Default::default(),
                mode,
            }),
            iv: None,
            secret_data: Bytes::new(),
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.details
    }

    pub fn version(&self) -> KeyVersion {
        self.details.version()
    }

    pub fn key_id(&self) -> KeyId {
        self.details.key_id()
    }

    pub fn usage(&self) -> S2kUsage {
        self.usage
    }

    pub fn sym_alg(&self) -> SymmetricKeyAlgorithm {
        self.sym_alg
    }

    pub fn s2k(&self) -> Option<&StringToKey> {
        self.s2k.as_ref()
    }

    pub fn is_signing_key(&self) -> bool {
        self.details.is_signing_key()
    }

    /// True for GNU dummy stubs, which carry no secret at all.
    pub fn is_private_key_empty(&self) -> bool {
        self.s2k.as_ref().is_some_and(StringToKey::is_gnu_dummy)
    }

    /// The same secret with a different public packet, which must have the same key id.
    pub fn replace_public_key(&self, details: PublicKey) -> Result<Self> {
        if details.key_id() != self.key_id() {
            invalid_op!("key ids do not match");
        }
        Ok(SecretKey {
            details,
            ..self.clone()
        })
    }

    pub(crate) fn into_subkey(mut self) -> Self {
        self.details = self.details.into_subkey();
        self
    }

    /// Derives the key protecting the secret.
    fn unlock_key(&self, passphrase: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        match (&self.usage, &self.s2k) {
            (S2kUsage::LegacyCipher(alg), _) => StringToKey::legacy_key(passphrase, *alg),
            (_, Some(s2k)) => s2k.derive_key(passphrase, self.sym_alg.key_size()),
            (_, None) => malformed!("protected secret key without S2K"),
        }
    }

    /// The plaintext secret fields followed by their trailer, integrity checked.
    fn decrypt_raw(&self, passphrase: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if self.is_private_key_empty() {
            invalid_op!("secret key {} has no secret material", self.key_id());
        }
        let mut data = Zeroizing::new(self.secret_data.to_vec());
        if self.usage != S2kUsage::Unprotected {
            let key = self.unlock_key(passphrase)?;
            let Some(iv) = &self.iv else {
                malformed!("protected secret key without IV");
            };
            if self.details.version().is_legacy() {
                self.decrypt_legacy_mpis(&key, iv, &mut data)?;
            } else {
                self.sym_alg.decrypt_with_iv_regular(&key, iv, &mut data)?;
            }
        }

        self.check_trailer(&data)?;
        Ok(data)
    }

    /// v2/v3 keys encrypt each MPI value separately, leaving the bit counts in the clear.
    ///
    /// The IV of each value is the last block of ciphertext before it ends.
    fn decrypt_legacy_mpis(&self, key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()> {
        let bs = self.sym_alg.block_size();
        let encrypted = self.secret_data.clone();
        let mut iv = iv.to_vec();
        let mut pos = 0;
        for _ in 0..4 {
            ensure!(pos + 2 <= data.len(), "truncated v3 secret key");
            let bits = usize::from(u16::from_be_bytes([data[pos], data[pos + 1]]));
            let start = pos + 2;
            let end = start + bits.div_ceil(8);
            ensure!(end <= data.len(), "truncated v3 secret key");

            self.sym_alg
                .decrypt_with_iv_regular(key, &iv, &mut data[start..end])?;
            ensure!(end >= bs, "v3 secret key value shorter than a block");
            iv = encrypted[end - bs..end].to_vec();
            pos = end;
        }
        Ok(())
    }

    fn encrypt_legacy_mpis(
        alg: SymmetricKeyAlgorithm,
        key: &[u8],
        iv: &[u8],
        data: &mut [u8],
    ) -> Result<()> {
        let bs = alg.block_size();
        let mut iv = iv.to_vec();
        let mut pos = 0;
        for _ in 0..4 {
            ensure!(pos + 2 <= data.len(), "v3 secret keys carry four values");
            let bits = usize::from(u16::from_be_bytes([data[pos], data[pos + 1]]));
            let start = pos + 2;
            let end = start + bits.div_ceil(8);
            ensure!(end <= data.len(), "v3 secret keys carry four values");

            alg.encrypt_with_iv_regular(key, &iv, &mut data[start..end])?;
            ensure!(end >= bs, "v3 secret key value shorter than a block");
            iv = data[end - bs..end].to_vec();
            pos = end;
        }
        Ok(())
    }

    fn check_trailer(&self, data: &[u8]) -> Result<()> {
        let trailer_len = self.usage.trailer_len();
        ensure!(
            data.len() >= trailer_len,
            "secret key data shorter than its trailer"
        );
        let (body, trailer) = data.split_at(data.len() - trailer_len);
        let (expected, found) = match self.usage {
            S2kUsage::Sha1 => (hex::encode(trailer), hex::encode(checksum::calculate_sha1(body))),
            _ => (
                hex::encode(trailer),
                hex::encode(checksum::calculate_simple(body).to_be_bytes()),
            ),
        };
        if expected == found {
            return Ok(());
        }
        if self.usage == S2kUsage::Unprotected {
            malformed!("secret key checksum {} does not match {}", found, expected);
        }
        Err(Error::WrongPassphrase { expected, found })
    }

    /// Decrypts and parses the secret fields.
    pub fn plain_secret_params(&self, passphrase: &[u8]) -> Result<PlainSecretParams> {
        let data = self.decrypt_raw(passphrase)?;
        let body = &data[..data.len() - self.usage.trailer_len()];
        PlainSecretParams::try_from_reader(self.details.algorithm(), body)
    }

    /// Unlocks the key for signing and decryption.
    pub fn extract_private_key(&self, passphrase: &[u8]) -> Result<PrivateKey> {
        let params = self.plain_secret_params(passphrase)?;
        PrivateKey::new(self.details.clone(), &params)
    }

    /// Re-protects the secret under `new_passphrase` and `new_alg`.
    ///
    /// `Plaintext` removes the protection, rewriting a SHA-1 trailer to a checksum.
    /// GNU dummy stubs are returned unchanged.
    pub fn copy_with_new_password<R: CryptoRng + Rng>(
        &self,
        rng: &mut R,
        old_passphrase: &[u8],
        new_passphrase: &[u8],
        new_alg: SymmetricKeyAlgorithm,
    ) -> Result<Self> {
        if self.is_private_key_empty() {
            return Ok(self.clone());
        }
        let mut plain = self.decrypt_raw(old_passphrase)?;

        if new_alg == SymmetricKeyAlgorithm::Plaintext {
            if self.usage == S2kUsage::Sha1 {
                sha1_to_checksum(&mut plain);
            }
            return Ok(SecretKey {
                details: self.details.clone(),
                usage: S2kUsage::Unprotected,
                sym_alg: SymmetricKeyAlgorithm::Plaintext,
                s2k: None,
                iv: None,
                secret_data: Bytes::copy_from_slice(&plain),
            });
        }

        let usage = match self.usage {
            S2kUsage::Unprotected => S2kUsage::Checksum,
            usage => usage,
        };
        self.seal(rng, plain, usage, new_alg, new_passphrase)
    }

    /// Encrypts `plain`, which already carries the trailer matching `usage`.
    fn seal<R: CryptoRng + Rng>(
        &self,
        rng: &mut R,
        mut plain: Zeroizing<Vec<u8>>,
        usage: S2kUsage,
        alg: SymmetricKeyAlgorithm,
        passphrase: &[u8],
    ) -> Result<Self> {
        let mut iv = vec![0u8; alg.block_size()];
        rng.fill_bytes(&mut iv);

        let (usage, s2k) = if self.details.version().is_legacy() {
            // Legacy protection only knows the two octet checksum.
            if usage == S2kUsage::Sha1 {
                sha1_to_checksum(&mut plain);
            }
            let key = StringToKey::legacy_key(passphrase, alg)?;
            Self::encrypt_legacy_mpis(alg, &key, &iv, &mut plain)?;
            (S2kUsage::LegacyCipher(alg), None)
        } else {
            let s2k = StringToKey::new_default(rng);
            let key = s2k.derive_key(passphrase, alg.key_size())?;
            alg.encrypt_with_iv_regular(&key, &iv, &mut plain)?;
            let usage = match usage {
                S2kUsage::LegacyCipher(_) => S2kUsage::Checksum,
                usage => usage,
            };
            (usage, Some(s2k))
        };

        Ok(SecretKey {
            details: self.details.clone(),
            usage,
            sym_alg: alg,
            s2k,
            iv: Some(iv.into()),
            secret_data: Bytes::copy_from_slice(&plain),
        })
    }
}

fn sha1_to_checksum(plain: &mut Zeroizing<Vec<u8>>) {
    let len = plain.len().saturating_sub(20);
    plain.truncate(len);
    let sum = checksum::calculate_simple(plain);
    plain.extend_from_slice(&sum.to_be_bytes());
}

impl Serialize for SecretKey {
    fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        self.details.to_writer(w)?;
        w.write_u8(self.usage.into())?;
        if matches!(self.usage, S2kUsage::Checksum | S2kUsage::Sha1) {
            w.write_u8(self.sym_alg.into())?;
            if let Some(s2k) = &self.s2k {
                s2k.to_writer(w)?;
            }
        }
        if let Some(iv) = &self.iv {
            w.write_all(iv)?;
        }
        w.write_all(&self.secret_data)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        let mut len = self.details.write_len() + 1;
        if matches!(self.usage, S2kUsage::Checksum | S2kUsage::Sha1) {
            len += 1 + self.s2k.as_ref().map(Serialize::write_len).unwrap_or_default();
        }
        len + self.iv.as_ref().map(Bytes::len).unwrap_or_default() + self.secret_data.len()
    }
}

impl PacketTrait for SecretKey {
    fn tag(&self) -> Tag {
        if self.details.is_subkey() {
            Tag::SecretSubkey
        } else {
            Tag::SecretKey
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::crypto::hash::HashAlgorithm;
    use crate::crypto::public_key::PublicKeyAlgorithm;
    use crate::crypto::{eddsa, rsa, Signer, Verifier};

    fn eddsa_key(rng: &mut ChaCha8Rng) -> (PublicKey, PlainSecretParams) {
        let (public, secret) = eddsa::generate_key(rng);
        let created = Utc.timestamp_opt(1_600_000_000, 0).unwrap();
        (
            PublicKey::new(PublicKeyAlgorithm::EdDSALegacy, created, public),
            secret,
        )
    }

    fn reparse(key: &SecretKey) -> SecretKey {
        let raw = key.to_bytes().unwrap();
        assert_eq!(raw.len(), key.write_len());
        SecretKey::try_from_reader(key.tag(), &raw[..]).unwrap()
    }

    #[test]
    fn unprotected_roundtrip() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let (public, secret) = eddsa_key(&mut rng);
        let key = SecretKey::from_plain(public, &secret).unwrap();
        let back = reparse(&key);
        assert_eq!(back, key);
        assert_eq!(back.plain_secret_params(b"").unwrap(), secret);
    }

    #[test]
    fn passphrase_gate() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let (public, secret) = eddsa_key(&mut rng);
        for use_sha1 in [true, false] {
            let key = SecretKey::protect(
                &mut rng,
                public.clone(),
                &secret,
                SymmetricKeyAlgorithm::AES128,
                b"correct horse",
                use_sha1,
            )
            .unwrap();
            let key = reparse(&key);
            assert_eq!(key.plain_secret_params(b"correct horse").unwrap(), secret);
            assert!(matches!(
                key.plain_secret_params(b"wrong horse"),
                Err(Error::WrongPassphrase { .. })
            ));

            let private = key.extract_private_key(b"correct horse").unwrap();
            let digest = HashAlgorithm::Sha256.digest(b"data").unwrap();
            let sig = private.sign(HashAlgorithm::Sha256, &digest).unwrap();
            assert!(public.verify(HashAlgorithm::Sha256, &digest, &sig).unwrap());
        }
    }

    #[test]
    fn copy_with_new_password() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let (public, secret) = eddsa_key(&mut rng);
        let key = SecretKey::protect(
            &mut rng,
            public,
            &secret,
            SymmetricKeyAlgorithm::CAST5,
            b"old",
            true,
        )
        .unwrap();

        let changed = key
            .copy_with_new_password(&mut rng, b"old", b"new", SymmetricKeyAlgorithm::AES256)
            .unwrap();
        assert_eq!(changed.usage(), S2kUsage::Sha1);
        assert_eq!(changed.sym_alg(), SymmetricKeyAlgorithm::AES256);
        assert!(changed.plain_secret_params(b"old").is_err());
        assert_eq!(changed.plain_secret_params(b"new").unwrap(), secret);

        let stripped = changed
            .copy_with_new_password(&mut rng, b"new", b"", SymmetricKeyAlgorithm::Plaintext)
            .unwrap();
        assert_eq!(stripped.usage(), S2kUsage::Unprotected);
        assert_eq!(stripped, SecretKey::from_plain(key.public_key().clone(), &secret).unwrap());

        let wrong = key.copy_with_new_password(&mut rng, b"bad", b"new", SymmetricKeyAlgorithm::AES128);
        assert!(matches!(wrong, Err(Error::WrongPassphrase { .. })));
    }

    #[test]
    fn v3_rsa_protection() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let (public, secret) = rsa::generate_key(&mut rng, 1024).unwrap();
        let public = PublicKey::new_v3(Utc.timestamp_opt(0, 0).unwrap(), 0, public).unwrap();
        let plain = SecretKey::from_plain(public.clone(), &secret).unwrap();

        let protected = plain
            .copy_with_new_password(&mut rng, b"", b"legacy", SymmetricKeyAlgorithm::CAST5)
            .unwrap();
        assert_eq!(
            protected.usage(),
            S2kUsage::LegacyCipher(SymmetricKeyAlgorithm::CAST5)
        );
        assert!(protected.s2k().is_none());

        let protected = reparse(&protected);
        // Bit counts stay in the clear.
        let raw = protected.to_bytes().unwrap();
        let offset = public.write_len() + 1 + 8;
        let PlainSecretParams::RSA { d, .. } = &secret else {
            panic!("not RSA");
        };
        assert_eq!(&raw[offset..offset + 2], &(d.bit_len() as u16).to_be_bytes());
        assert_ne!(&raw[offset + 2..offset + 2 + d.len()], d.as_bytes());

        assert_eq!(protected.plain_secret_params(b"legacy").unwrap(), secret);
        assert!(matches!(
            protected.plain_secret_params(b"other"),
            Err(Error::WrongPassphrase { .. })
        ));
    }

    #[test]
    fn gnu_dummy_stub() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let (public, _) = eddsa_key(&mut rng);
        let stub = SecretKey::new_gnu_dummy(public, GnuDummyMode::NoSecret);
        assert!(stub.is_private_key_empty());
        let back = reparse(&stub);
        assert_eq!(back, stub);
        assert!(matches!(
            back.extract_private_key(b""),
            Err(Error::InvalidOperation { .. })
        ));
    }

    #[test]
    fn replace_public_key_checks_id() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let (public, secret) = eddsa_key(&mut rng);
        let key = SecretKey::from_plain(public.clone(), &secret).unwrap();
        assert!(key.replace_public_key(public.clone()).is_ok());

        let (other, _) = eddsa_key(&mut rng);
        assert!(matches!(
            key.replace_public_key(other),
            Err(Error::InvalidOperation { .. })
        ));
    }

    #[test]
    fn corrupt_unprotected_checksum_is_malformed() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let (public, secret) = eddsa_key(&mut rng);
        let key = SecretKey::from_plain(public, &secret).unwrap();
        let mut raw = key.to_bytes().unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        let key = SecretKey::try_from_reader(Tag::SecretKey, &raw[..]).unwrap();
        assert!(matches!(
            key.plain_secret_params(b""),
            Err(Error::MalformedPacket { .. })
        ));
    }
}
