use std::io::{self, BufRead};

use byteorder::{BigEndian, WriteBytesExt};
use chrono::{DateTime, Utc};
use digest::Digest;
use md5::Md5;
use rand::{CryptoRng, Rng};
use sha1::Sha1;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::{dsa, ecdh, ecdsa, eddsa, rsa, Verifier};
use crate::errors::{Error, Result};
use crate::packet::{PacketTrait, PkeskValues};
use crate::parsing_reader::BufReadParsing;
use crate::ser::{time_to_u32, truncate_time, u32_to_time, Serialize};
use crate::types::{Fingerprint, KeyId, KeyVersion, Mpi, PublicParams, Tag};

/// Public-Key and Public-Subkey Packets
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.5.1.1>
///
/// Both share one body layout; `is_subkey` selects the tag.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PublicKey {
    is_subkey: bool,
    version: KeyVersion,
    created_at: DateTime<Utc>,
    /// Validity in days, v2/v3 only. Zero means no expiration.
    expiration: Option<u16>,
    algorithm: PublicKeyAlgorithm,
    params: PublicParams,
}

impl PublicKey {
    /// A v4 primary key.
    pub fn new(
        algorithm: PublicKeyAlgorithm,
        created_at: DateTime<Utc>,
        params: PublicParams,
    ) -> Self {
        PublicKey {
            is_subkey: false,
            version: KeyVersion::V4,
            created_at: truncate_time(&created_at),
            expiration: None,
            algorithm,
            params,
        }
    }

    /// A v3 RSA key with a validity period in days.
    pub fn new_v3(created_at: DateTime<Utc>, validity_days: u16, params: PublicParams) -> Result<Self> {
        let PublicParams::RSA { .. } = params else {
            unsupported_err!("v3 keys must be RSA");
        };
        Ok(PublicKey {
            is_subkey: false,
            version: KeyVersion::V3,
            created_at: truncate_time(&created_at),
            expiration: Some(validity_days),
            algorithm: PublicKeyAlgorithm::RSA,
            params,
        })
    }

    pub fn try_from_reader<B: BufRead>(tag: Tag, mut i: B) -> Result<Self> {
        let is_subkey = match tag {
            Tag::PublicKey | Tag::SecretKey => false,
            Tag::PublicSubkey | Tag::SecretSubkey => true,
            _ => invalid_op!("{:?} is not a key packet", tag),
        };

        let version = KeyVersion::from(i.read_u8()?);
        let created_at = u32_to_time(i.read_be_u32()?);
        let expiration = match version {
            KeyVersion::V2 | KeyVersion::V3 => Some(i.read_be_u16()?),
            KeyVersion::V4 => None,
            KeyVersion::Other(v) => {
                return Err(Error::UnsupportedVersion {
                    message: format!("key version {v}"),
                })
            }
        };
        let algorithm = PublicKeyAlgorithm::from(i.read_u8()?);
        if version.is_legacy()
            && !matches!(
                algorithm,
                PublicKeyAlgorithm::RSA | PublicKeyAlgorithm::RSAEncrypt | PublicKeyAlgorithm::RSASign
            )
        {
            unsupported_err!("v{} key with algorithm {:?}", u8::from(version), algorithm);
        }
        let params = PublicParams::try_from_reader(algorithm, &mut i)?;

        Ok(PublicKey {
            is_subkey,
            version,
            created_at,
            expiration,
            algorithm,
            params,
        })
    }

    /// The same key material, tagged as a subkey.
    pub fn into_subkey(mut self) -> Self {
        self.is_subkey = true;
        self
    }

    /// The same key material, tagged as a primary key.
    pub fn into_primary(mut self) -> Self {
        self.is_subkey = false;
        self
    }

    pub fn is_subkey(&self) -> bool {
        self.is_subkey
    }

    pub fn version(&self) -> KeyVersion {
        self.version
    }

    pub fn created_at(&self) -> &DateTime<Utc> {
        &self.created_at
    }

    pub fn expiration(&self) -> Option<u16> {
        self.expiration
    }

    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.algorithm
    }

    pub fn params(&self) -> &PublicParams {
        &self.params
    }

    pub fn is_signing_key(&self) -> bool {
        self.algorithm.can_sign()
    }

    pub fn is_encryption_key(&self) -> bool {
        self.algorithm.can_encrypt()
    }

    /// MD5 over the RSA values for v2/v3, SHA-1 over the hashing form for v4.
    pub fn fingerprint(&self) -> Fingerprint {
        match (&self.version, &self.params) {
            (KeyVersion::V2 | KeyVersion::V3, PublicParams::RSA { n, e }) => {
                let mut h = Md5::new();
                h.update(n.as_bytes());
                h.update(e.as_bytes());
                Fingerprint::V3(h.finalize().into())
            }
            _ => Fingerprint::V4(self.v4_fingerprint()),
        }
    }

    fn v4_fingerprint(&self) -> [u8; 20] {
        let mut params = Vec::with_capacity(self.params.write_len());
        // Writing into a vector cannot fail.
        let _ = self.params.to_writer(&mut params);

        let header = self.body_header();
        let len = u16::try_from(header.len() + params.len()).unwrap_or(u16::MAX);

        let mut h = Sha1::new();
        h.update([0x99]);
        h.update(len.to_be_bytes());
        h.update(&header);
        h.update(&params);
        h.finalize().into()
    }

    /// Low 64 bits of the modulus for v2/v3 keys, of the fingerprint for v4 keys.
    pub fn key_id(&self) -> KeyId {
        let mut id = [0u8; 8];
        match (&self.version, &self.params) {
            (KeyVersion::V2 | KeyVersion::V3, PublicParams::RSA { n, .. }) => {
                let n = n.to_padded(8);
                id.copy_from_slice(&n[n.len() - 8..]);
            }
            _ => id.copy_from_slice(&self.v4_fingerprint()[12..]),
        }
        KeyId::from(id)
    }

    /// Version, creation time, validity and algorithm.
    fn body_header(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8);
        out.push(self.version.into());
        out.extend_from_slice(&time_to_u32(&self.created_at).to_be_bytes());
        if let Some(days) = self.expiration {
            out.extend_from_slice(&days.to_be_bytes());
        }
        out.push(self.algorithm.into());
        out
    }

    /// The form hashed by key signatures and fingerprints: `0x99 ‖ u16 length ‖ body`.
    pub fn to_writer_old<W: io::Write>(&self, w: &mut W) -> Result<()> {
        w.write_u8(0x99)?;
        w.write_u16::<BigEndian>(u16::try_from(self.write_len())?)?;
        self.to_writer(w)
    }

    /// Encrypts session info to this key.
    pub fn encrypt_session_info<R: CryptoRng + Rng>(
        &self,
        rng: &mut R,
        session_info: &[u8],
        obfuscate: bool,
    ) -> Result<PkeskValues> {
        match &self.params {
            PublicParams::RSA { n, e } => Ok(PkeskValues::Rsa {
                c: rsa::encrypt(rng, n, e, session_info)?,
            }),
            PublicParams::ECDH { .. } => {
                let fp = self.fingerprint();
                let (public_point, wrapped) =
                    ecdh::encrypt(rng, &self.params, fp.as_bytes(), session_info, obfuscate)?;
                Ok(PkeskValues::Ecdh {
                    public_point,
                    encrypted_key: wrapped.into(),
                })
            }
            _ => unsupported_err!("encryption to {:?} keys", self.algorithm),
        }
    }
}

impl Verifier for PublicKey {
    fn verify(&self, hash: HashAlgorithm, digest: &[u8], signature: &[Mpi]) -> Result<bool> {
        match &self.params {
            PublicParams::RSA { n, e } => {
                ensure_eq!(signature.len(), 1, "RSA signature values");
                rsa::verify(n, e, hash, digest, &signature[0])
            }
            PublicParams::DSA { p, q, g, y } => dsa::verify(p, q, g, y, digest, signature),
            PublicParams::ECDSA { curve, p } => ecdsa::verify(curve, p, digest, signature),
            PublicParams::EdDSALegacy { curve, q } => eddsa::verify(curve, q, digest, signature),
            PublicParams::ECDH { .. } => bail!("ECDH keys can not be used for verification"),
            PublicParams::Elgamal { .. } => unsupported_err!("Elgamal signatures"),
            PublicParams::Unknown { .. } => {
                unsupported_err!("verification with {:?} keys", self.algorithm)
            }
        }
    }
}

impl Serialize for PublicKey {
    fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.body_header())?;
        self.params.to_writer(w)
    }

    fn write_len(&self) -> usize {
        let header = if self.expiration.is_some() { 8 } else { 6 };
        header + self.params.write_len()
    }
}

impl PacketTrait for PublicKey {
    fn tag(&self) -> Tag {
        if self.is_subkey {
            Tag::PublicSubkey
        } else {
            Tag::PublicKey
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use hex_literal::hex;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::crypto::ecc_curve::EccCurve;

    fn ed25519_key() -> PublicKey {
        PublicKey::new(
            PublicKeyAlgorithm::EdDSALegacy,
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            PublicParams::EdDSALegacy {
                curve: EccCurve::Ed25519,
                q: Mpi::from_slice(&[0x40; 33]),
            },
        )
    }

    #[test]
    fn v4_roundtrip_and_fingerprint() {
        let key = ed25519_key();
        let body = key.to_bytes().unwrap();
        assert_eq!(body.len(), key.write_len());
        assert_eq!(&body[..6], &hex!("04 6553f100 16"));

        let back = PublicKey::try_from_reader(Tag::PublicKey, &body[..]).unwrap();
        assert_eq!(back, key);

        let mut hashed = Vec::new();
        key.to_writer_old(&mut hashed).unwrap();
        assert_eq!(hashed[0], 0x99);
        assert_eq!(usize::from(u16::from_be_bytes([hashed[1], hashed[2]])), body.len());

        let expected: [u8; 20] = Sha1::digest(&hashed).into();
        assert_eq!(key.fingerprint(), Fingerprint::V4(expected));
        assert_eq!(key.key_id().as_ref(), &expected[12..]);
    }

    #[test]
    fn v3_rsa_ids() {
        let n = Mpi::from_slice(&hex!("c0ffee0102030405060708"));
        let e = Mpi::from_slice(&[1, 0, 1]);
        let key = PublicKey::new_v3(
            Utc.timestamp_opt(0, 0).unwrap(),
            30,
            PublicParams::RSA {
                n: n.clone(),
                e: e.clone(),
            },
        )
        .unwrap();
        assert_eq!(key.key_id(), KeyId::from(hex!("0102030405060708")));

        let expected: [u8; 16] = Md5::digest(hex!("c0ffee0102030405060708010001")).into();
        assert_eq!(key.fingerprint(), Fingerprint::V3(expected));

        let body = key.to_bytes().unwrap();
        assert_eq!(&body[..8], &[3, 0, 0, 0, 0, 0, 30, 1]);
        let back = PublicKey::try_from_reader(Tag::PublicSubkey, &body[..]).unwrap();
        assert!(back.is_subkey());
        assert_eq!(back.tag(), Tag::PublicSubkey);
        assert_eq!(back.into_primary(), key);
    }

    #[test]
    fn v3_requires_rsa() {
        let body = [3, 0, 0, 0, 0, 0, 0, 17];
        assert!(matches!(
            PublicKey::try_from_reader(Tag::PublicKey, &body[..]),
            Err(Error::UnsupportedAlgorithm { .. })
        ));
    }

    #[test]
    fn unknown_version() {
        assert!(matches!(
            PublicKey::try_from_reader(Tag::PublicKey, &[5u8, 0, 0, 0, 0, 1][..]),
            Err(Error::UnsupportedVersion { .. })
        ));
    }
}
