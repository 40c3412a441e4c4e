//! Signature packets, their subpackets, and the hashing that produces and checks them.

mod config;
mod hasher;
mod subpacket;
mod types;

use std::io::{self, BufRead, Read};

use byteorder::{BigEndian, WriteBytesExt};
use chrono::{DateTime, Utc};
use log::debug;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::crypto::Verifier;
use crate::errors::{Error, Result};
use crate::packet::{PacketTrait, PublicKey};
use crate::parsing_reader::BufReadParsing;
use crate::ser::{time_to_u32, u32_to_time, Serialize};
use crate::types::{CompressionAlgorithm, Fingerprint, KeyId, Mpi, Tag};

pub use self::config::{SignatureConfig, SignatureConfigBuilder};
pub use self::hasher::{HashMode, SignatureHasher};
pub use self::subpacket::{Subpacket, SubpacketLength, SubpacketType};
pub use self::types::{KeyFlags, Notation, RevocationCode, SignatureType, SignatureVersion};

/// Signature Packet
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.2>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct Signature {
    pub config: SignatureConfig,
    /// Left 16 bits of the signed hash.
    #[debug("{}", hex::encode(signed_hash_value))]
    pub signed_hash_value: [u8; 2],
    pub signature: Vec<Mpi>,
}

impl Signature {
    pub fn from_config(config: SignatureConfig, signed_hash_value: [u8; 2], signature: Vec<Mpi>) -> Self {
        Signature {
            config,
            signed_hash_value,
            signature,
        }
    }

    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        let version = SignatureVersion::from(i.read_u8()?);
        let config = match version {
            SignatureVersion::V2 | SignatureVersion::V3 => {
                let hashed_len = i.read_u8()?;
                ensure_eq!(hashed_len, 5, "v3 signature hashed length");
                let typ = SignatureType::from(i.read_u8()?);
                let created = u32_to_time(i.read_be_u32()?);
                let issuer = KeyId::from(i.read_array::<8>()?);
                let pub_alg = PublicKeyAlgorithm::from(i.read_u8()?);
                let hash_alg = HashAlgorithm::from(i.read_u8()?);

                let mut config = SignatureConfig::new_v3(typ, pub_alg, hash_alg, created, issuer);
                config.version = version;
                config
            }
            SignatureVersion::V4 => {
                let typ = SignatureType::from(i.read_u8()?);
                let pub_alg = PublicKeyAlgorithm::from(i.read_u8()?);
                let hash_alg = HashAlgorithm::from(i.read_u8()?);

                let hashed_len = i.read_be_u16()?;
                let hashed = i.take_bytes(hashed_len.into())?;
                let hashed_subpackets = Subpacket::parse_area(&hashed)?;

                let unhashed_len = i.read_be_u16()?;
                let unhashed = i.take_bytes(unhashed_len.into())?;
                let unhashed_subpackets = Subpacket::parse_area(&unhashed)?;

                SignatureConfig::new_v4(typ, pub_alg, hash_alg, hashed_subpackets, unhashed_subpackets)
            }
            SignatureVersion::Other(v) => {
                return Err(Error::UnsupportedVersion {
                    message: format!("signature version {v}"),
                })
            }
        };

        let signed_hash_value = i.read_array::<2>()?;
        let mut signature = Vec::new();
        while i.has_remaining()? {
            signature.push(Mpi::try_from_reader(&mut i)?);
        }

        Ok(Signature {
            config,
            signed_hash_value,
            signature,
        })
    }

    pub fn typ(&self) -> SignatureType {
        self.config.typ
    }

    pub fn version(&self) -> SignatureVersion {
        self.config.version
    }

    pub fn pub_alg(&self) -> PublicKeyAlgorithm {
        self.config.pub_alg
    }

    pub fn hash_alg(&self) -> HashAlgorithm {
        self.config.hash_alg
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.config.created()
    }

    pub fn issuer(&self) -> Option<KeyId> {
        self.config.issuer()
    }

    /// Issuer fingerprints (v4 form) from the subpackets.
    pub fn issuer_fingerprint(&self) -> Option<Fingerprint> {
        let sp = self
            .config
            .find_subpacket(SubpacketType::IssuerFingerprint, false)?;
        match sp.data() {
            [4, fp @ ..] => fp.try_into().ok().map(Fingerprint::V4),
            _ => None,
        }
    }

    pub fn signature_expiration_time(&self) -> Option<u32> {
        self.config
            .find_subpacket(SubpacketType::SignatureExpirationTime, true)
            .and_then(Subpacket::as_u32)
    }

    pub fn key_expiration_time(&self) -> Option<u32> {
        self.config
            .find_subpacket(SubpacketType::KeyExpirationTime, true)
            .and_then(Subpacket::as_u32)
    }

    pub fn preferred_symmetric_algs(&self) -> Vec<SymmetricKeyAlgorithm> {
        self.raw_list(SubpacketType::PreferredSymmetricAlgorithms)
    }

    pub fn preferred_hash_algs(&self) -> Vec<HashAlgorithm> {
        self.raw_list(SubpacketType::PreferredHashAlgorithms)
    }

    pub fn preferred_compression_algs(&self) -> Vec<CompressionAlgorithm> {
        self.raw_list(SubpacketType::PreferredCompressionAlgorithms)
    }

    fn raw_list<T: From<u8>>(&self, typ: SubpacketType) -> Vec<T> {
        self.config
            .find_subpacket(typ, true)
            .map(|p| p.data().iter().map(|&b| T::from(b)).collect())
            .unwrap_or_default()
    }

    pub fn key_flags(&self) -> KeyFlags {
        self.config
            .find_subpacket(SubpacketType::KeyFlags, true)
            .map(|p| KeyFlags::from(p.data()))
            .unwrap_or_default()
    }

    pub fn features(&self) -> &[u8] {
        self.config
            .find_subpacket(SubpacketType::Features, true)
            .map(Subpacket::data)
            .unwrap_or_default()
    }

    pub fn key_server_preferences(&self) -> &[u8] {
        self.config
            .find_subpacket(SubpacketType::KeyServerPreferences, true)
            .map(Subpacket::data)
            .unwrap_or_default()
    }

    pub fn is_primary(&self) -> bool {
        self.config
            .find_subpacket(SubpacketType::PrimaryUserId, true)
            .and_then(Subpacket::as_bool)
            .unwrap_or(false)
    }

    /// Signatures are revocable unless stated otherwise.
    pub fn is_revocable(&self) -> bool {
        self.config
            .find_subpacket(SubpacketType::Revocable, true)
            .and_then(Subpacket::as_bool)
            .unwrap_or(true)
    }

    /// Certifications are exportable unless stated otherwise.
    pub fn exportable_certification(&self) -> bool {
        self.config
            .find_subpacket(SubpacketType::ExportableCertification, true)
            .and_then(Subpacket::as_bool)
            .unwrap_or(true)
    }

    /// Trust depth and amount.
    pub fn trust_signature(&self) -> Option<(u8, u8)> {
        match self
            .config
            .find_subpacket(SubpacketType::TrustSignature, true)?
            .data()
        {
            [depth, amount] => Some((*depth, *amount)),
            _ => None,
        }
    }

    pub fn signers_user_id(&self) -> Option<&[u8]> {
        self.config
            .find_subpacket(SubpacketType::SignersUserId, true)
            .map(Subpacket::data)
    }

    pub fn revocation_reason_code(&self) -> Option<RevocationCode> {
        self.config
            .find_subpacket(SubpacketType::RevocationReason, true)
            .and_then(|p| p.data().first())
            .map(|&c| RevocationCode::from(c))
    }

    pub fn revocation_reason_string(&self) -> Option<&[u8]> {
        self.config
            .find_subpacket(SubpacketType::RevocationReason, true)
            .and_then(|p| p.data().get(1..))
    }

    pub fn notations(&self) -> Vec<Notation> {
        self.config
            .hashed_subpackets
            .iter()
            .filter(|p| p.typ() == SubpacketType::Notation)
            .filter_map(Subpacket::as_notation)
            .collect()
    }

    /// The embedded back signature of signing subkeys, if present.
    pub fn embedded_signature(&self) -> Option<Result<Signature>> {
        self.config
            .find_subpacket(SubpacketType::EmbeddedSignature, false)
            .map(|p| Signature::try_from_reader(p.data()))
    }

    /// Critical subpackets of types this library does not interpret.
    pub fn unknown_critical_subpackets(&self) -> impl Iterator<Item = &Subpacket> {
        self.config
            .subpackets()
            .filter(|p| p.is_critical() && matches!(p.typ(), SubpacketType::Other(_)))
    }

    /// Is `key` a possible issuer of this signature?
    ///
    /// Signatures without issuer information match every key.
    fn matches_issuer(&self, key: &PublicKey) -> bool {
        let id_ok = self.issuer().map_or(true, |id| id.is_wildcard() || id == key.key_id());
        let fp_ok = self
            .issuer_fingerprint()
            .map_or(true, |fp| fp == key.fingerprint());
        id_ok && fp_ok
    }

    /// Checks the signature over a finished hasher.
    ///
    /// `Ok(false)` means the signature does not verify; errors are reserved for
    /// unusable inputs.
    pub fn verify_hasher(&self, key: &PublicKey, hasher: SignatureHasher) -> Result<bool> {
        if !self.matches_issuer(key) {
            debug!("issuer {:?} does not match key {}", self.issuer(), key.key_id());
            return Ok(false);
        }
        if hasher.hash_alg() != self.hash_alg() {
            invalid_op!(
                "hasher uses {}, signature {}",
                hasher.hash_alg(),
                self.hash_alg()
            );
        }
        let digest = hasher.finalize(&self.config.trailer()?);
        if digest[..2] != self.signed_hash_value {
            debug!(
                "left 16 bits mismatch: {} vs {}",
                hex::encode(&digest[..2]),
                hex::encode(self.signed_hash_value)
            );
            return Ok(false);
        }
        key.verify(self.hash_alg(), &digest, &self.signature)
    }

    /// Verifies a document signature over `data`.
    pub fn verify<R: Read>(&self, key: &PublicKey, data: R) -> Result<bool> {
        self.verify_with_options(key, data, false)
    }

    /// Verifies a document signature; for text signatures trailing whitespace can be
    /// left out of the hash, as cleartext signatures require.
    pub fn verify_with_options<R: Read>(
        &self,
        key: &PublicKey,
        mut data: R,
        ignore_trailing_whitespace: bool,
    ) -> Result<bool> {
        let mut hasher = self.config.new_hasher(ignore_trailing_whitespace)?;
        match self.typ() {
            SignatureType::Binary | SignatureType::Text => {
                io::copy(&mut data, &mut hasher)?;
            }
            SignatureType::Standalone | SignatureType::Timestamp => {}
            typ => invalid_op!("{:?} is not a document signature", typ),
        }
        self.verify_hasher(key, hasher)
    }

    /// Verifies a certification of `id` on `key`, issued by `signer`.
    pub fn verify_certification(
        &self,
        signer: &PublicKey,
        key: &PublicKey,
        id: &impl PacketTrait,
    ) -> Result<bool> {
        if !self.typ().is_certification() {
            invalid_op!("{:?} is not a certification", self.typ());
        }
        let mut hasher = self.config.new_hasher(false)?;
        SignatureConfig::hash_key(&mut hasher, key)?;
        self.config.hash_identity(&mut hasher, id)?;
        self.verify_hasher(signer, hasher)
    }

    /// Verifies a binding between `primary` and `subkey`, issued by `signer`.
    pub fn verify_key_binding(
        &self,
        signer: &PublicKey,
        primary: &PublicKey,
        subkey: &PublicKey,
    ) -> Result<bool> {
        if !self.typ().is_key_binding() {
            invalid_op!("{:?} is not a key binding", self.typ());
        }
        let mut hasher = self.config.new_hasher(false)?;
        SignatureConfig::hash_key(&mut hasher, primary)?;
        SignatureConfig::hash_key(&mut hasher, subkey)?;
        self.verify_hasher(signer, hasher)
    }

    /// Verifies a direct key signature or key revocation made by `key` on itself.
    pub fn verify_key(&self, key: &PublicKey) -> Result<bool> {
        self.verify_key_by(key, key)
    }

    /// Verifies a direct key signature or revocation on `key`, issued by `signer`.
    pub fn verify_key_by(&self, signer: &PublicKey, key: &PublicKey) -> Result<bool> {
        if !self.typ().is_key_signature() {
            invalid_op!("{:?} is not a key signature", self.typ());
        }
        let mut hasher = self.config.new_hasher(false)?;
        SignatureConfig::hash_key(&mut hasher, key)?;
        self.verify_hasher(signer, hasher)
    }
}

impl Serialize for Signature {
    fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        let config = &self.config;
        w.write_u8(config.version.into())?;
        match config.version {
            SignatureVersion::V2 | SignatureVersion::V3 => {
                let (Some(created), Some(issuer)) = (config.created, config.issuer) else {
                    invalid_op!("v3 signature needs creation time and issuer");
                };
                w.write_u8(5)?;
                w.write_u8(config.typ.into())?;
                w.write_u32::<BigEndian>(time_to_u32(&created))?;
                w.write_all(issuer.as_ref())?;
                w.write_u8(config.pub_alg.into())?;
                w.write_u8(config.hash_alg.into())?;
            }
            SignatureVersion::V4 => {
                w.write_u8(config.typ.into())?;
                w.write_u8(config.pub_alg.into())?;
                w.write_u8(config.hash_alg.into())?;

                w.write_u16::<BigEndian>(u16::try_from(config.hashed_subpackets.write_len())?)?;
                config.hashed_subpackets.to_writer(w)?;
                w.write_u16::<BigEndian>(u16::try_from(config.unhashed_subpackets.write_len())?)?;
                config.unhashed_subpackets.to_writer(w)?;
            }
            SignatureVersion::Other(v) => {
                return Err(Error::UnsupportedVersion {
                    message: format!("signature version {v}"),
                })
            }
        }
        w.write_all(&self.signed_hash_value)?;
        self.signature.to_writer(w)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        let config = &self.config;
        let header = if config.version.is_legacy() {
            1 + 1 + 5 + 8 + 2
        } else {
            1 + 3 + 2 + config.hashed_subpackets.write_len() + 2 + config.unhashed_subpackets.write_len()
        };
        header + 2 + self.signature.write_len()
    }
}

impl PacketTrait for Signature {
    fn tag(&self) -> Tag {
        Tag::Signature
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use hex_literal::hex;

    use super::*;

    fn sample_v4() -> Signature {
        let created = Utc.timestamp_opt(1_600_000_000, 0).unwrap();
        let mut flags = KeyFlags::default();
        flags.set_sign(true);
        let config = SignatureConfig::new_v4(
            SignatureType::CertPositive,
            PublicKeyAlgorithm::RSA,
            HashAlgorithm::Sha256,
            vec![
                Subpacket::creation_time(created).unwrap(),
                Subpacket::key_flags(flags).unwrap(),
                Subpacket::preferred_symmetric_algorithms(&[
                    SymmetricKeyAlgorithm::AES256,
                    SymmetricKeyAlgorithm::AES128,
                ])
                .unwrap(),
                Subpacket::primary_user_id(true).unwrap(),
            ],
            vec![Subpacket::issuer(KeyId::from(hex!("0102030405060708"))).unwrap()],
        );
        Signature::from_config(config, [0xAB, 0xCD], vec![Mpi::from_slice(&[1, 2, 3])])
    }

    #[test]
    fn v4_roundtrip_and_accessors() {
        let sig = sample_v4();
        let raw = sig.to_bytes().unwrap();
        assert_eq!(raw.len(), sig.write_len());
        let parsed = Signature::try_from_reader(&raw[..]).unwrap();
        assert_eq!(parsed, sig);

        assert_eq!(parsed.created().unwrap().timestamp(), 1_600_000_000);
        assert_eq!(parsed.issuer(), Some(KeyId::from(hex!("0102030405060708"))));
        assert!(parsed.key_flags().sign());
        assert!(parsed.is_primary());
        assert!(parsed.is_revocable());
        assert_eq!(
            parsed.preferred_symmetric_algs(),
            vec![SymmetricKeyAlgorithm::AES256, SymmetricKeyAlgorithm::AES128]
        );
        assert!(parsed.embedded_signature().is_none());
    }

    #[test]
    fn v3_roundtrip() {
        let config = SignatureConfig::new_v3(
            SignatureType::Binary,
            PublicKeyAlgorithm::DSA,
            HashAlgorithm::Sha1,
            Utc.timestamp_opt(1000, 0).unwrap(),
            KeyId::from([7; 8]),
        );
        let sig = Signature::from_config(
            config,
            [1, 2],
            vec![Mpi::from_slice(&[5]), Mpi::from_slice(&[6, 7])],
        );
        let raw = sig.to_bytes().unwrap();
        assert_eq!(raw[..3], [3, 5, 0]);
        assert_eq!(raw.len(), sig.write_len());
        assert_eq!(Signature::try_from_reader(&raw[..]).unwrap(), sig);
    }

    #[test]
    fn embedded_signature() {
        let inner = sample_v4();
        let mut outer = sample_v4();
        outer
            .config
            .unhashed_subpackets
            .push(Subpacket::embedded_signature(&inner).unwrap());
        let raw = outer.to_bytes().unwrap();
        let parsed = Signature::try_from_reader(&raw[..]).unwrap();
        assert_eq!(parsed.embedded_signature().unwrap().unwrap(), inner);
    }

    #[test]
    fn unknown_critical() {
        let mut sig = sample_v4();
        sig.config
            .hashed_subpackets
            .push(Subpacket::new(SubpacketType::Other(100), vec![1]).unwrap().critical());
        assert_eq!(sig.unknown_critical_subpackets().count(), 1);
    }

    #[test]
    fn unsupported_version() {
        assert!(matches!(
            Signature::try_from_reader(&[5u8, 0, 0][..]),
            Err(Error::UnsupportedVersion { .. })
        ));
    }
}
