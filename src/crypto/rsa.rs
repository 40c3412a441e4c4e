use num_bigint::traits::ModInverse;
use num_bigint::BigUint;
use rand::{CryptoRng, Rng};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroizing;

use crate::crypto::hash::HashAlgorithm;
use crate::errors::Result;
use crate::types::{Mpi, PlainSecretParams, PublicParams};

/// Private RSA key, checked for consistency on construction.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct SecretKey {
    #[debug("..")]
    key: RsaPrivateKey,
}

impl SecretKey {
    pub(crate) fn try_from_mpis(n: &Mpi, e: &Mpi, d: &Mpi, p: &Mpi, q: &Mpi) -> Result<Self> {
        let key = RsaPrivateKey::from_components(
            n.into(),
            e.into(),
            d.into(),
            vec![p.into(), q.into()],
        )?;
        key.validate()?;
        Ok(SecretKey { key })
    }

    /// Sign using RSA, with PKCS1v15 padding.
    pub fn sign(&self, hash: HashAlgorithm, digest: &[u8]) -> Result<Vec<Mpi>> {
        let sig = self.key.sign(scheme(hash)?, digest)?;
        Ok(vec![Mpi::from_slice(&sig)])
    }

    /// RSA decryption using PKCS1v15 padding.
    pub fn decrypt(&self, c: &Mpi) -> Result<Zeroizing<Vec<u8>>> {
        let c = c.to_padded(self.key.size());
        let m = self.key.decrypt(Pkcs1v15Encrypt, &c)?;
        Ok(Zeroizing::new(m))
    }
}

fn scheme(hash: HashAlgorithm) -> Result<Pkcs1v15Sign> {
    Ok(match hash {
        HashAlgorithm::Md5 => Pkcs1v15Sign::new::<md5::Md5>(),
        HashAlgorithm::Sha1 => Pkcs1v15Sign::new::<sha1::Sha1>(),
        HashAlgorithm::Ripemd160 => Pkcs1v15Sign::new::<ripemd::Ripemd160>(),
        HashAlgorithm::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
        HashAlgorithm::Sha384 => Pkcs1v15Sign::new::<sha2::Sha384>(),
        HashAlgorithm::Sha512 => Pkcs1v15Sign::new::<sha2::Sha512>(),
        HashAlgorithm::Sha224 => Pkcs1v15Sign::new::<sha2::Sha224>(),
        HashAlgorithm::Sha3_256 => Pkcs1v15Sign::new::<sha3::Sha3_256>(),
        HashAlgorithm::Sha3_512 => Pkcs1v15Sign::new::<sha3::Sha3_512>(),
        HashAlgorithm::Other(id) => unsupported_err!("hash algorithm {} for RSA", id),
    })
}

fn public_key(n: &Mpi, e: &Mpi) -> Result<RsaPublicKey> {
    Ok(RsaPublicKey::new(n.into(), e.into())?)
}

/// Verify a RSA, PKCS1v15 padded signature.
pub fn verify(n: &Mpi, e: &Mpi, hash: HashAlgorithm, digest: &[u8], sig: &Mpi) -> Result<bool> {
    let key = public_key(n, e)?;
    let sig = sig.to_padded(key.size());
    Ok(key.verify(scheme(hash)?, digest, &sig).is_ok())
}

/// RSA encryption using PKCS1v15 padding.
pub fn encrypt<R: CryptoRng + Rng>(rng: &mut R, n: &Mpi, e: &Mpi, plain: &[u8]) -> Result<Mpi> {
    let key = public_key(n, e)?;
    let data = key.encrypt(rng, Pkcs1v15Encrypt, plain)?;
    Ok(Mpi::from_slice(&data))
}

/// Generate an RSA key pair.
pub fn generate_key<R: Rng + CryptoRng>(
    rng: &mut R,
    bit_size: usize,
) -> Result<(PublicParams, PlainSecretParams)> {
    let key = RsaPrivateKey::new(rng, bit_size)?;

    let (p, q) = match key.primes() {
        [a, b] if a < b => (a, b),
        [a, b] => (b, a),
        _ => bail!("RSA key with more than two primes"),
    };
    let u = p
        .clone()
        .mod_inverse(q)
        .and_then(|u| u.to_biguint())
        .ok_or_else(|| format_err!("primes are not coprime"))?;

    Ok((
        PublicParams::RSA {
            n: key.n().into(),
            e: key.e().into(),
        },
        PlainSecretParams::RSA {
            d: key.d().into(),
            p: p.into(),
            q: q.into(),
            u: Mpi::from(&u),
        },
    ))
}

/// Checks `d * e ≡ 1 mod λ(n)`, via the key consistency test of the backend.
pub fn is_consistent(n: &Mpi, e: &Mpi, d: &Mpi, p: &Mpi, q: &Mpi) -> bool {
    SecretKey::try_from_mpis(n, e, d, p, q).is_ok()
        && BigUint::from(p) * BigUint::from(q) == BigUint::from(n)
}
