use dsa::{Components, Signature, SigningKey, VerifyingKey};
use signature::hazmat::PrehashVerifier;

use crate::crypto::hash::HashAlgorithm;
use crate::errors::Result;
use crate::types::Mpi;

#[derive(Clone, PartialEq, derive_more::Debug)]
pub struct SecretKey {
    #[debug("..")]
    key: SigningKey,
}

impl Eq for SecretKey {}

fn verifying_key(p: &Mpi, q: &Mpi, g: &Mpi, y: &Mpi) -> Result<VerifyingKey> {
    let components = Components::from_components(p.into(), q.into(), g.into())?;
    Ok(VerifyingKey::from_components(components, y.into())?)
}

impl SecretKey {
    pub(crate) fn try_from_mpis(p: &Mpi, q: &Mpi, g: &Mpi, y: &Mpi, x: &Mpi) -> Result<Self> {
        let key = SigningKey::from_components(verifying_key(p, q, g, y)?, x.into())?;
        Ok(SecretKey { key })
    }

    /// Deterministic (RFC 6979) DSA signature over a digest.
    pub fn sign(&self, hash: HashAlgorithm, digest: &[u8]) -> Result<Vec<Mpi>> {
        let key = &self.key;
        let signature = match hash {
            HashAlgorithm::Md5 => key.sign_prehashed_rfc6979::<md5::Md5>(digest),
            HashAlgorithm::Sha1 => key.sign_prehashed_rfc6979::<sha1::Sha1>(digest),
            HashAlgorithm::Ripemd160 => key.sign_prehashed_rfc6979::<ripemd::Ripemd160>(digest),
            HashAlgorithm::Sha256 => key.sign_prehashed_rfc6979::<sha2::Sha256>(digest),
            HashAlgorithm::Sha384 => key.sign_prehashed_rfc6979::<sha2::Sha384>(digest),
            HashAlgorithm::Sha512 => key.sign_prehashed_rfc6979::<sha2::Sha512>(digest),
            HashAlgorithm::Sha224 => key.sign_prehashed_rfc6979::<sha2::Sha224>(digest),
            HashAlgorithm::Sha3_256 => key.sign_prehashed_rfc6979::<sha3::Sha3_256>(digest),
            HashAlgorithm::Sha3_512 => key.sign_prehashed_rfc6979::<sha3::Sha3_512>(digest),
            HashAlgorithm::Other(id) => unsupported_err!("hash algorithm {} for DSA", id),
        }?;

        Ok(vec![signature.r().into(), signature.s().into()])
    }
}

pub fn verify(p: &Mpi, q: &Mpi, g: &Mpi, y: &Mpi, digest: &[u8], sig: &[Mpi]) -> Result<bool> {
    ensure_eq!(sig.len(), 2, "DSA signature values");
    let key = verifying_key(p, q, g, y)?;
    let Ok(signature) = Signature::from_components((&sig[0]).into(), (&sig[1]).into()) else {
        return Ok(false);
    };
    Ok(key.verify_prehash(digest, &signature).is_ok())
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use num_traits::Num;

    use super::*;

    fn hex_mpi(s: &str) -> Mpi {
        Mpi::from(BigUint::from_str_radix(s, 16).unwrap())
    }

    // RFC 6979, A.2.1: DSA, 1024 bits
    #[test]
    fn rfc6979_sha1() {
        let p = hex_mpi("86F5CA03DCFEB225063FF830A0C769B9DD9D6153AD91D7CE27F787C43278B447E6533B86B18BED6E8A48B784A14C252C5BE0DBF60B86D6385BD2F12FB763ED8873ABFD3F5BA2E0A8C0A59082EAC056935E529DAF7C610467899C77ADEDFC846C881870B7B19B2B58F9BE0521A17002E3BDD6B86685EE90B3D9A1B02B782B1779");
        let q = hex_mpi("996F967F6C8E388D9E28D01E205FBA957A5698B1");
        let g = hex_mpi("07B0F92546150B62514BB771E2A0C0CE387F03BDA6C56B505209FF25FD3C133D89BBCD97E904E09114D9A7DEFDEADFC9078EA544D2E401AEECC40BB9FBBF78FD87995A10A1C27CB7789B594BA7EFB5C4326A9FE59A070E136DB77175464ADCA417BE5DCE2F40D10A46A3A3943F26AB7FD9C0398FF8C76EE0A56826A8A88F1DBD");
        let x = hex_mpi("411602CB19A6CCC34494D79D98EF1E7ED5AF25F7");
        let y = hex_mpi("5DF5E01DED31D0297E274E1691C192FE5868FEF9E19A84776454B100CF16F65392195A38B90523E2542EE61871C0440CB87C322FC4B4D2EC5E1E7EC766E1BE8D4CE935437DC11C3C8FD426338933EBFE739CB3465F4D3668C5E473508253B1E682F65CBDC4FAE93C2EA212390E54905A86E2223170B44EAA7DA5DD9FFCFB7F3B");

        let key = SecretKey::try_from_mpis(&p, &q, &g, &y, &x).unwrap();
        let digest = HashAlgorithm::Sha1.digest(b"sample").unwrap();
        let sig = key.sign(HashAlgorithm::Sha1, &digest).unwrap();
        assert_eq!(sig[0], hex_mpi("2E1A0C2562B2912CAAF89186FB0F42001585DA55"));
        assert_eq!(sig[1], hex_mpi("29EFB6B0AFF2D7A68EB70CA313022253B9A88DF5"));

        assert!(verify(&p, &q, &g, &y, &digest, &sig).unwrap());
        let other = HashAlgorithm::Sha1.digest(b"test").unwrap();
        assert!(!verify(&p, &q, &g, &y, &other, &sig).unwrap());
    }
}
