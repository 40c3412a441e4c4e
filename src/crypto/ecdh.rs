//! ECDH session key transport over Curve25519, RFC 6637.

use cipher::generic_array::GenericArray;
use log::debug;
use rand::{CryptoRng, Rng};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroizing;

use crate::crypto::ecc_curve::EccCurve;
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::Result;
use crate::types::{Mpi, PlainSecretParams, PublicParams};

/// 20 octets representing "Anonymous Sender    ".
const ANON_SENDER: [u8; 20] = *b"Anonymous Sender    ";

/// Padded session info of obfuscated messages is at least this long.
const OBFUSCATED_MIN_LEN: usize = 40;

/// Curve25519 secret, held in native little endian order.
#[derive(Clone, derive_more::Debug)]
pub struct SecretKey {
    #[debug("..")]
    secret: StaticSecret,
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        self.secret.as_bytes() == other.secret.as_bytes()
    }
}

impl Eq for SecretKey {}

impl SecretKey {
    /// The MPI holds the scalar in big endian order.
    pub(crate) fn try_from_mpi(curve: &EccCurve, d: &Mpi) -> Result<Self> {
        if curve != &EccCurve::Curve25519 {
            unsupported_err!("ECDH over {}", curve.name());
        }
        ensure!(d.len() <= 32, "ECDH secret of {} bytes", d.len());
        let mut raw = Zeroizing::new([0u8; 32]);
        raw.copy_from_slice(&d.to_padded(32));
        raw.reverse();
        Ok(SecretKey {
            secret: StaticSecret::from(*raw),
        })
    }

    /// Recovers the padded session info from an ephemeral point and wrapped key.
    pub fn decrypt(
        &self,
        params: &PublicParams,
        fingerprint: &[u8],
        ephemeral: &Mpi,
        wrapped: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        debug!("ECDH decrypt");
        let PublicParams::ECDH {
            curve,
            hash,
            alg_sym,
            ..
        } = params
        else {
            bail!("ECDH decryption with non ECDH parameters");
        };

        let their_public = x25519_point(ephemeral)?;
        let shared = Zeroizing::new(self.secret.diffie_hellman(&their_public).to_bytes());

        let param = build_ecdh_param(curve.oid(), *alg_sym, *hash, fingerprint)?;
        let z = kdf(*hash, &shared[..], alg_sym.key_size(), &param)?;
        let padded = unwrap_key(&z, wrapped)?;
        unpad(padded)
    }
}

/// The native point behind a `0x40` prefixed Curve25519 point.
fn x25519_point(p: &Mpi) -> Result<X25519Public> {
    let p = p.as_bytes();
    ensure_eq!(p.len(), 33, "Curve25519 point length");
    ensure_eq!(p[0], 0x40, "Curve25519 point prefix");
    let mut raw = [0u8; 32];
    raw.copy_from_slice(&p[1..]);
    Ok(X25519Public::from(raw))
}

/// KDF parameters, RFC 6637 section 8.
pub fn build_ecdh_param(
    oid: &[u8],
    alg_sym: SymmetricKeyAlgorithm,
    hash: HashAlgorithm,
    fingerprint: &[u8],
) -> Result<Vec<u8>> {
    let mut param = Vec::with_capacity(1 + oid.len() + 5 + ANON_SENDER.len() + fingerprint.len());
    param.push(u8::try_from(oid.len())?);
    param.extend_from_slice(oid);
    param.push(PublicKeyAlgorithm::ECDH.into());
    param.extend_from_slice(&[0x03, 0x01, hash.into(), alg_sym.into()]);
    param.extend_from_slice(&ANON_SENDER);
    param.extend_from_slice(fingerprint);
    Ok(param)
}

/// Key derivation function, RFC 6637 section 7.
pub fn kdf(hash: HashAlgorithm, z: &[u8], length: usize, param: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let mut hasher = hash.new_hasher()?;
    hasher.update(&[0, 0, 0, 1]);
    hasher.update(z);
    hasher.update(param);
    let mut digest = Zeroizing::new(hasher.finalize().to_vec());
    ensure!(
        digest.len() >= length,
        "{} digest too short for a {} byte key",
        hash,
        length
    );
    digest.truncate(length);
    Ok(digest)
}

/// PKCS#5 padding of the session info to a multiple of 8 bytes.
///
/// With `obfuscate`, short inputs are padded to 40 bytes so the wrapped key does not
/// reveal the cipher.
pub fn pad(data: &[u8], obfuscate: bool) -> Zeroizing<Vec<u8>> {
    let mut padded_len = ((data.len() >> 3) + 1) << 3;
    if obfuscate {
        padded_len = padded_len.max(OBFUSCATED_MIN_LEN);
    }
    let pad = padded_len - data.len();
    let mut out = Zeroizing::new(Vec::with_capacity(padded_len));
    out.extend_from_slice(data);
    out.resize(padded_len, pad as u8);
    out
}

pub fn unpad(mut data: Zeroizing<Vec<u8>>) -> Result<Zeroizing<Vec<u8>>> {
    let Some(&pad) = data.last() else {
        malformed!("empty session info");
    };
    let pad = usize::from(pad);
    ensure!(pad != 0 && pad <= data.len(), "invalid session info padding");
    let start = data.len() - pad;
    ensure!(
        data[start..].iter().all(|b| usize::from(*b) == pad),
        "invalid session info padding"
    );
    data.truncate(start);
    Ok(data)
}

fn wrap_key(kek: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    Ok(match kek.len() {
        16 => aes_kw::KekAes128::new(GenericArray::from_slice(kek)).wrap_vec(data)?,
        24 => aes_kw::KekAes192::new(GenericArray::from_slice(kek)).wrap_vec(data)?,
        32 => aes_kw::KekAes256::new(GenericArray::from_slice(kek)).wrap_vec(data)?,
        n => unsupported_err!("key wrap with a {} byte key", n),
    })
}

fn unwrap_key(kek: &[u8], data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    Ok(Zeroizing::new(match kek.len() {
        16 => aes_kw::KekAes128::new(GenericArray::from_slice(kek)).unwrap_vec(data)?,
        24 => aes_kw::KekAes192::new(GenericArray::from_slice(kek)).unwrap_vec(data)?,
        32 => aes_kw::KekAes256::new(GenericArray::from_slice(kek)).unwrap_vec(data)?,
        n => unsupported_err!("key unwrap with a {} byte key", n),
    }))
}

/// Wraps `session_info` for the recipient point `p`; returns the ephemeral point and the
/// wrapped key.
pub fn encrypt<R: CryptoRng + Rng>(
    rng: &mut R,
    params: &PublicParams,
    fingerprint: &[u8],
    session_info: &[u8],
    obfuscate: bool,
) -> Result<(Mpi, Vec<u8>)> {
    debug!("ECDH encrypt");
    let PublicParams::ECDH {
        curve,
        p,
        hash,
        alg_sym,
    } = params
    else {
        bail!("ECDH encryption with non ECDH parameters");
    };
    if curve != &EccCurve::Curve25519 {
        unsupported_err!("ECDH over {}", curve.name());
    }

    let their_public = x25519_point(p)?;
    let ephemeral = StaticSecret::random_from_rng(&mut *rng);
    let our_public = X25519Public::from(&ephemeral);
    let shared = Zeroizing::new(ephemeral.diffie_hellman(&their_public).to_bytes());

    let param = build_ecdh_param(curve.oid(), *alg_sym, *hash, fingerprint)?;
    let z = kdf(*hash, &shared[..], alg_sym.key_size(), &param)?;
    let wrapped = wrap_key(&z, &pad(session_info, obfuscate))?;

    let mut point = Vec::with_capacity(33);
    point.push(0x40);
    point.extend_from_slice(our_public.as_bytes());

    Ok((Mpi::from_slice(&point), wrapped))
}

/// Generates a Curve25519 encryption key, storing the scalar big endian.
pub fn generate_key<R: Rng + CryptoRng>(
    rng: &mut R,
    hash: HashAlgorithm,
    alg_sym: SymmetricKeyAlgorithm,
) -> (PublicParams, PlainSecretParams) {
    let secret = StaticSecret::random_from_rng(&mut *rng);
    let public = X25519Public::from(&secret);

    let mut p = Vec::with_capacity(33);
    p.push(0x40);
    p.extend_from_slice(public.as_bytes());

    let mut d = Zeroizing::new(secret.to_bytes());
    d.reverse();

    (
        PublicParams::ECDH {
            curve: EccCurve::Curve25519,
            p: Mpi::from_slice(&p),
            hash,
            alg_sym,
        },
        PlainSecretParams::ECDH(Mpi::from_slice(&d[..])),
    )
}
