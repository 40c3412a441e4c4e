use signature::hazmat::{PrehashSigner, PrehashVerifier};

use crate::crypto::ecc_curve::EccCurve;
use crate::errors::Result;
use crate::types::Mpi;

/// ECDSA secret scalar on one of the supported NIST curves.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub enum SecretKey {
    P256(#[debug("..")] p256::ecdsa::SigningKey),
    P384(#[debug("..")] p384::ecdsa::SigningKey),
}

impl SecretKey {
    pub(crate) fn try_from_mpi(curve: &EccCurve, d: &Mpi) -> Result<Self> {
        match curve {
            EccCurve::P256 => Ok(SecretKey::P256(p256::ecdsa::SigningKey::from_slice(
                &d.to_padded(32),
            )?)),
            EccCurve::P384 => Ok(SecretKey::P384(p384::ecdsa::SigningKey::from_slice(
                &d.to_padded(48),
            )?)),
            _ => unsupported_err!("ECDSA over {}", curve.name()),
        }
    }

    pub fn sign(&self, digest: &[u8]) -> Result<Vec<Mpi>> {
        let (r, s) = match self {
            SecretKey::P256(key) => {
                let sig: p256::ecdsa::Signature = key.sign_prehash(digest)?;
                let (r, s) = sig.split_bytes();
                (r.to_vec(), s.to_vec())
            }
            SecretKey::P384(key) => {
                let sig: p384::ecdsa::Signature = key.sign_prehash(digest)?;
                let (r, s) = sig.split_bytes();
                (r.to_vec(), s.to_vec())
            }
        };
        Ok(vec![Mpi::from_slice(&r), Mpi::from_slice(&s)])
    }

    /// SEC1 uncompressed public point.
    pub fn public_point(&self) -> Vec<u8> {
        match self {
            SecretKey::P256(key) => key.verifying_key().to_encoded_point(false).as_bytes().to_vec(),
            SecretKey::P384(key) => key.verifying_key().to_encoded_point(false).as_bytes().to_vec(),
        }
    }
}

/// Joins `r` and `s`, each left padded to the field size.
fn fixed_signature(sig: &[Mpi], field_len: usize) -> Result<Vec<u8>> {
    ensure_eq!(sig.len(), 2, "ECDSA signature values");
    ensure!(
        sig[0].len() <= field_len && sig[1].len() <= field_len,
        "ECDSA signature value too large"
    );
    let mut raw = sig[0].to_padded(field_len);
    raw.extend_from_slice(&sig[1].to_padded(field_len));
    Ok(raw)
}

pub fn verify(curve: &EccCurve, point: &Mpi, digest: &[u8], sig: &[Mpi]) -> Result<bool> {
    match curve {
        EccCurve::P256 => {
            let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(point.as_bytes())?;
            let Ok(sig) = p256::ecdsa::Signature::from_slice(&fixed_signature(sig, 32)?) else {
                return Ok(false);
            };
            Ok(key.verify_prehash(digest, &sig).is_ok())
        }
        EccCurve::P384 => {
            let key = p384::ecdsa::VerifyingKey::from_sec1_bytes(point.as_bytes())?;
            let Ok(sig) = p384::ecdsa::Signature::from_slice(&fixed_signature(sig, 48)?) else {
                return Ok(false);
            };
            Ok(key.verify_prehash(digest, &sig).is_ok())
        }
        _ => unsupported_err!("ECDSA over {}", curve.name()),
    }
}
