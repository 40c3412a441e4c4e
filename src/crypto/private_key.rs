use log::debug;
use zeroize::Zeroizing;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::{dsa, ecdh, ecdsa, eddsa, rsa, Decryptor, Signer};
use crate::errors::Result;
use crate::packet::{PkeskValues, PublicKey};
use crate::types::{KeyId, Mpi, PlainSecretParams, PublicParams};

/// Decrypted secret key material, bound to its backend.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub enum SecretMaterial {
    Rsa(rsa::SecretKey),
    Dsa(dsa::SecretKey),
    Ecdsa(ecdsa::SecretKey),
    EdDsa(eddsa::SecretKey),
    Ecdh(ecdh::SecretKey),
    /// Parsed, but no backend is available.
    Elgamal(#[debug("..")] Mpi),
}

/// A usable private key: the public packet plus its decrypted secret.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PrivateKey {
    public: PublicKey,
    secret: SecretMaterial,
}

impl PrivateKey {
    /// Binds `params` to `public`, checking that both halves belong together.
    pub fn new(public: PublicKey, params: &PlainSecretParams) -> Result<Self> {
        let secret = match (public.params(), params) {
            (PublicParams::RSA { n, e }, PlainSecretParams::RSA { d, p, q, .. }) => {
                SecretMaterial::Rsa(rsa::SecretKey::try_from_mpis(n, e, d, p, q)?)
            }
            (PublicParams::DSA { p, q, g, y }, PlainSecretParams::DSA(x)) => {
                SecretMaterial::Dsa(dsa::SecretKey::try_from_mpis(p, q, g, y, x)?)
            }
            (PublicParams::ECDSA { curve, p }, PlainSecretParams::ECDSA(d)) => {
                let key = ecdsa::SecretKey::try_from_mpi(curve, d)?;
                ensure!(
                    key.public_point() == p.as_bytes(),
                    "ECDSA secret does not match the public point"
                );
                SecretMaterial::Ecdsa(key)
            }
            (PublicParams::EdDSALegacy { curve, .. }, PlainSecretParams::EdDSALegacy(seed)) => {
                SecretMaterial::EdDsa(eddsa::SecretKey::try_from_mpi(curve, seed)?)
            }
            (PublicParams::ECDH { curve, .. }, PlainSecretParams::ECDH(d)) => {
                SecretMaterial::Ecdh(ecdh::SecretKey::try_from_mpi(curve, d)?)
            }
            (PublicParams::Elgamal { .. }, PlainSecretParams::Elgamal(x)) => {
                SecretMaterial::Elgamal(x.clone())
            }
            (PublicParams::Unknown { .. }, _) => {
                unsupported_err!("private keys for {:?}", public.algorithm())
            }
            (_, _) => malformed!("secret parameters do not match the {:?} key", public.algorithm()),
        };
        Ok(PrivateKey { public, secret })
    }

    pub fn key_id(&self) -> KeyId {
        self.public.key_id()
    }

    pub fn secret(&self) -> &SecretMaterial {
        &self.secret
    }
}

impl Signer for PrivateKey {
    fn public_key(&self) -> &PublicKey {
        &self.public
    }

    fn sign(&self, hash: HashAlgorithm, digest: &[u8]) -> Result<Vec<Mpi>> {
        debug!("signing with {} using {}", self.key_id(), hash);
        match &self.secret {
            SecretMaterial::Rsa(key) => key.sign(hash, digest),
            SecretMaterial::Dsa(key) => key.sign(hash, digest),
            SecretMaterial::Ecdsa(key) => key.sign(digest),
            SecretMaterial::EdDsa(key) => key.sign(digest),
            SecretMaterial::Ecdh(_) => bail!("ECDH keys can not sign"),
            SecretMaterial::Elgamal(_) => unsupported_err!("Elgamal signatures"),
        }
    }
}

impl Decryptor for PrivateKey {
    fn decrypt_session_info(&self, values: &PkeskValues) -> Result<Zeroizing<Vec<u8>>> {
        debug!("decrypting session key with {}", self.key_id());
        match (&self.secret, values) {
            (SecretMaterial::Rsa(key), PkeskValues::Rsa { c }) => key.decrypt(c),
            (
                SecretMaterial::Ecdh(key),
                PkeskValues::Ecdh {
                    public_point,
                    encrypted_key,
                },
            ) => key.decrypt(
                self.public.params(),
                self.public.fingerprint().as_bytes(),
                public_point,
                encrypted_key,
            ),
            (SecretMaterial::Elgamal(_), _) => unsupported_err!("Elgamal decryption"),
            (SecretMaterial::Rsa(_) | SecretMaterial::Ecdh(_), _) => {
                malformed!("session key values do not match the {:?} key", self.public.algorithm())
            }
            _ => invalid_op!("{:?} keys can not decrypt", self.public.algorithm()),
        }
    }
}
