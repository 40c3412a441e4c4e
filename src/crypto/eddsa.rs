use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use rand::{CryptoRng, Rng};
use signature::{Signer as _, Verifier as _};
use zeroize::Zeroizing;

use crate::crypto::ecc_curve::EccCurve;
use crate::errors::Result;
use crate::types::{Mpi, PlainSecretParams, PublicParams};

/// Ed25519 secret seed.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct SecretKey {
    #[debug("..")]
    key: SigningKey,
}

impl SecretKey {
    pub(crate) fn try_from_mpi(curve: &EccCurve, seed: &Mpi) -> Result<Self> {
        if curve != &EccCurve::Ed25519 {
            unsupported_err!("EdDSA over {}", curve.name());
        }
        ensure!(seed.len() <= 32, "EdDSA secret of {} bytes", seed.len());
        let mut bytes = Zeroizing::new([0u8; 32]);
        bytes.copy_from_slice(&seed.to_padded(32));
        Ok(SecretKey {
            key: SigningKey::from_bytes(&bytes),
        })
    }

    /// EdDSA signs the digest itself, as the message.
    pub fn sign(&self, digest: &[u8]) -> Result<Vec<Mpi>> {
        let bytes = self.key.sign(digest).to_bytes();
        Ok(vec![Mpi::from_slice(&bytes[..32]), Mpi::from_slice(&bytes[32..])])
    }
}

/// The native public key behind a `0x40` prefixed point.
fn public_key(q: &Mpi) -> Result<VerifyingKey> {
    let q = q.as_bytes();
    ensure_eq!(q.len(), 33, "EdDSA point length");
    ensure_eq!(q[0], 0x40, "EdDSA point prefix");
    let mut raw = [0u8; 32];
    raw.copy_from_slice(&q[1..]);
    Ok(VerifyingKey::from_bytes(&raw)?)
}

pub fn verify(curve: &EccCurve, q: &Mpi, digest: &[u8], sig: &[Mpi]) -> Result<bool> {
    if curve != &EccCurve::Ed25519 {
        unsupported_err!("EdDSA over {}", curve.name());
    }
    ensure_eq!(sig.len(), 2, "EdDSA signature values");
    let key = public_key(q)?;
    let (r, s) = (sig[0].as_bytes(), sig[1].as_bytes());
    if r.len() > 32 || s.len() > 32 {
        return Ok(false);
    }
    // Values may have been encoded short.
    let mut raw = [0u8; 64];
    raw[32 - r.len()..32].copy_from_slice(r);
    raw[64 - s.len()..].copy_from_slice(s);

    Ok(key.verify(digest, &Signature::from_bytes(&raw)).is_ok())
}

pub fn generate_key<R: Rng + CryptoRng>(rng: &mut R) -> (PublicParams, PlainSecretParams) {
    let mut seed = Zeroizing::new([0u8; 32]);
    rng.fill_bytes(&mut *seed);
    let secret = SigningKey::from_bytes(&seed);

    let mut q = Vec::with_capacity(33);
    q.push(0x40);
    q.extend_from_slice(secret.verifying_key().as_bytes());

    (
        PublicParams::EdDSALegacy {
            curve: EccCurve::Ed25519,
            q: Mpi::from_slice(&q),
        },
        PlainSecretParams::EdDSALegacy(Mpi::from_slice(&seed[..])),
    )
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn sign_verify() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let (PublicParams::EdDSALegacy { curve, q }, PlainSecretParams::EdDSALegacy(seed)) =
            generate_key(&mut rng)
        else {
            panic!("not EdDSA");
        };
        let key = SecretKey::try_from_mpi(&curve, &seed).unwrap();
        let digest = [7u8; 32];
        let sig = key.sign(&digest).unwrap();
        assert!(verify(&curve, &q, &digest, &sig).unwrap());
        assert!(!verify(&curve, &q, &[8u8; 32], &sig).unwrap());
    }
}
