use chrono::{DateTime, SubsecRound, Utc};
use derive_builder::Builder;
use log::debug;
use rand::{CryptoRng, Rng};

use crate::composed::{SignedKeyDetails, SignedSecretKey, SignedSecretSubKey, SignedUser};
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::crypto::{ecdh, eddsa, rsa, PrivateKey};
use crate::errors::{Error, Result};
use crate::packet::{KeyFlags, PublicKey, SecretKey, SignatureConfig, SignatureType, Subpacket, UserId};
use crate::types::{CompressionAlgorithm, PlainSecretParams, PublicParams};

/// Algorithms keys can be generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// RSA with the given modulus size in bits.
    Rsa(u32),
    /// EdDSA over Ed25519, signing only.
    Ed25519Legacy,
    /// ECDH over Curve25519, encryption only.
    ECDH,
}

impl KeyType {
    pub fn to_alg(self) -> PublicKeyAlgorithm {
        match self {
            KeyType::Rsa(_) => PublicKeyAlgorithm::RSA,
            KeyType::Ed25519Legacy => PublicKeyAlgorithm::EdDSALegacy,
            KeyType::ECDH => PublicKeyAlgorithm::ECDH,
        }
    }

    pub fn can_sign(self) -> bool {
        self.to_alg().can_sign()
    }

    pub fn can_encrypt(self) -> bool {
        self.to_alg().can_encrypt()
    }

    fn generate<R: Rng + CryptoRng>(self, rng: &mut R) -> Result<(PublicParams, PlainSecretParams)> {
        match self {
            KeyType::Rsa(bits) => rsa::generate_key(rng, bits as usize),
            KeyType::Ed25519Legacy => Ok(eddsa::generate_key(rng)),
            KeyType::ECDH => Ok(ecdh::generate_key(
                rng,
                HashAlgorithm::Sha256,
                SymmetricKeyAlgorithm::AES128,
            )),
        }
    }
}

/// Parameters for [`SecretKeyParams::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(build_fn(validate = "Self::validate", error = "Error"))]
pub struct SecretKeyParams {
    /// Algorithm of the primary key, which must be able to sign.
    key_type: KeyType,

    #[builder(setter(into))]
    primary_user_id: String,
    #[builder(default)]
    user_ids: Vec<String>,

    /// Protects all generated secrets when set.
    #[builder(default)]
    passphrase: Option<String>,
    #[builder(default = "SymmetricKeyAlgorithm::AES128")]
    protection_algorithm: SymmetricKeyAlgorithm,

    /// Hash of the self signatures.
    #[builder(default)]
    hash_algorithm: HashAlgorithm,

    // -- Preferences
    #[builder(default = "vec![SymmetricKeyAlgorithm::AES256, SymmetricKeyAlgorithm::AES128]")]
    preferred_symmetric_algorithms: Vec<SymmetricKeyAlgorithm>,
    #[builder(default = "vec![HashAlgorithm::Sha256, HashAlgorithm::Sha512]")]
    preferred_hash_algorithms: Vec<HashAlgorithm>,
    #[builder(default = "vec![CompressionAlgorithm::ZLIB, CompressionAlgorithm::ZIP]")]
    preferred_compression_algorithms: Vec<CompressionAlgorithm>,

    #[builder(default = "Utc::now().trunc_subsecs(0)")]
    created_at: DateTime<Utc>,

    /// Algorithm of an encryption subkey, if one is wanted.
    #[builder(default)]
    subkey: Option<KeyType>,
}

impl SecretKeyParamsBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        match self.key_type {
            Some(KeyType::Rsa(bits)) if bits < 1024 => {
                return Err(format!("RSA keys need at least 1024 bits, got {bits}"));
            }
            Some(key_type) if !key_type.can_sign() => {
                return Err(format!("{key_type:?} cannot be used for a primary key"));
            }
            _ => {}
        }
        if let Some(Some(subkey)) = self.subkey {
            if let KeyType::Rsa(bits) = subkey {
                if bits < 1024 {
                    return Err(format!("RSA keys need at least 1024 bits, got {bits}"));
                }
            }
            if !subkey.can_encrypt() {
                return Err(format!("{subkey:?} cannot be used for encryption"));
            }
        }
        if let (Some(Some(_)), Some(SymmetricKeyAlgorithm::Plaintext)) =
            (&self.passphrase, self.protection_algorithm)
        {
            return Err("a passphrase needs a protection algorithm".into());
        }
        Ok(())
    }
}

impl SecretKeyParams {
    /// Generates the key material and self signs the result.
    pub fn generate<R: Rng + CryptoRng>(&self, rng: &mut R) -> Result<SignedSecretKey> {
        let (public_params, secret_params) = self.key_type.generate(rng)?;
        let primary = PublicKey::new(self.key_type.to_alg(), self.created_at, public_params);
        let signer = PrivateKey::new(primary.clone(), &secret_params)?;
        debug!("generated primary key {}", primary.key_id());

        let mut users = Vec::with_capacity(1 + self.user_ids.len());
        for (i, id) in std::iter::once(&self.primary_user_id)
            .chain(&self.user_ids)
            .enumerate()
        {
            let id = UserId::from_str(id);
            let signature = self
                .certification_config(&primary, i == 0)?
                .sign_certification(&signer, &primary, &id)?;
            users.push(SignedUser {
                id,
                signatures: vec![signature],
            });
        }

        let mut secret_subkeys = Vec::new();
        if let Some(key_type) = self.subkey {
            let (public_params, secret_params) = key_type.generate(rng)?;
            let subkey =
                PublicKey::new(key_type.to_alg(), self.created_at, public_params).into_subkey();

            let mut flags = KeyFlags::default();
            flags.set_encrypt_comms(true);
            flags.set_encrypt_storage(true);
            let mut config = SignatureConfig::for_key(
                SignatureType::SubkeyBinding,
                &primary,
                self.hash_algorithm,
                self.created_at,
            )?;
            config.hashed_subpackets.push(Subpacket::key_flags(flags)?);
            let binding = config.sign_key_binding(&signer, &primary, &subkey)?;
            debug!("bound subkey {}", subkey.key_id());

            secret_subkeys.push(SignedSecretSubKey {
                key: self.seal(rng, subkey, &secret_params)?,
                signatures: vec![binding],
            });
        }

        let primary_key = self.seal(rng, primary, &secret_params)?;
        Ok(SignedSecretKey::new(
            primary_key,
            SignedKeyDetails {
                users,
                ..Default::default()
            },
            Vec::new(),
            secret_subkeys,
        ))
    }

    fn certification_config(&self, key: &PublicKey, primary: bool) -> Result<SignatureConfig> {
        let mut flags = KeyFlags::default();
        flags.set_certify(true);
        flags.set_sign(true);

        let mut config = SignatureConfig::for_key(
            SignatureType::CertPositive,
            key,
            self.hash_algorithm,
            self.created_at,
        )?;
        config.hashed_subpackets.extend([
            Subpacket::key_flags(flags)?,
            Subpacket::preferred_symmetric_algorithms(&self.preferred_symmetric_algorithms)?,
            Subpacket::preferred_hash_algorithms(&self.preferred_hash_algorithms)?,
            Subpacket::preferred_compression_algorithms(&self.preferred_compression_algorithms)?,
        ]);
        if primary {
            config
                .hashed_subpackets
                .push(Subpacket::primary_user_id(true)?);
        }
        Ok(config)
    }

    fn seal<R: Rng + CryptoRng>(
        &self,
        rng: &mut R,
        key: PublicKey,
        params: &PlainSecretParams,
    ) -> Result<SecretKey> {
        match &self.passphrase {
            Some(passphrase) => SecretKey::protect(
                rng,
                key,
                params,
                self.protection_algorithm,
                passphrase.as_bytes(),
                true,
            ),
            None => SecretKey::from_plain(key, params),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::ser::Serialize;

    #[test]
    fn generated_key_is_self_consistent() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let key = SecretKeyParamsBuilder::default()
            .key_type(KeyType::Ed25519Legacy)
            .primary_user_id("Alice <alice@example.com>")
            .user_ids(vec!["alice@work.example".into()])
            .subkey(Some(KeyType::ECDH))
            .passphrase(Some("hunter2".into()))
            .build()
            .unwrap()
            .generate(&mut rng)
            .unwrap();

        assert_eq!(key.details.users.len(), 2);
        let cert = &key.details.users[0].signatures[0];
        assert!(cert.is_primary());
        assert_eq!(
            cert.preferred_symmetric_algs(),
            vec![SymmetricKeyAlgorithm::AES256, SymmetricKeyAlgorithm::AES128]
        );
        assert!(!key.details.users[1].signatures[0].is_primary());
        assert!(key.secret_subkeys[0].signatures[0].key_flags().encrypt_comms());

        assert!(key.verify().unwrap());
        assert!(key.extract_private_key(b"hunter2").is_ok());
        assert!(key.extract_private_key(b"hunter3").is_err());

        let parsed = SignedSecretKey::from_bytes(&key.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn rejects_unusable_parameters() {
        let err = SecretKeyParamsBuilder::default()
            .key_type(KeyType::ECDH)
            .primary_user_id("x")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("primary key"));

        assert!(SecretKeyParamsBuilder::default()
            .key_type(KeyType::Ed25519Legacy)
            .primary_user_id("x")
            .subkey(Some(KeyType::Ed25519Legacy))
            .build()
            .is_err());

        assert!(SecretKeyParamsBuilder::default()
            .key_type(KeyType::Rsa(512))
            .primary_user_id("x")
            .build()
            .is_err());

        // Missing required field.
        assert!(SecretKeyParamsBuilder::default()
            .key_type(KeyType::Ed25519Legacy)
            .build()
            .is_err());
    }
}
