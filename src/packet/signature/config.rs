use std::io::Read;

use byteorder::{BigEndian, WriteBytesExt};
use chrono::{DateTime, Utc};
use derive_builder::Builder;
use log::debug;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::Signer;
use crate::errors::{Error, Result};
use crate::packet::{PacketTrait, PublicKey};
use crate::ser::{time_to_u32, Serialize};
use crate::types::{KeyId, Tag};

use super::{HashMode, Signature, SignatureHasher, SignatureType, SignatureVersion, Subpacket, SubpacketType};

/// Everything about a signature except the signature values themselves.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(build_fn(error = "Error"))]
pub struct SignatureConfig {
    #[builder(default)]
    pub version: SignatureVersion,
    pub typ: SignatureType,
    pub pub_alg: PublicKeyAlgorithm,
    #[builder(default)]
    pub hash_alg: HashAlgorithm,

    #[builder(default)]
    pub hashed_subpackets: Vec<Subpacket>,
    #[builder(default)]
    pub unhashed_subpackets: Vec<Subpacket>,

    /// Creation time of v2/v3 signatures.
    #[builder(default)]
    pub created: Option<DateTime<Utc>>,
    /// Issuer of v2/v3 signatures.
    #[builder(default)]
    pub issuer: Option<KeyId>,
}

impl SignatureConfig {
    pub fn new_v4(
        typ: SignatureType,
        pub_alg: PublicKeyAlgorithm,
        hash_alg: HashAlgorithm,
        hashed_subpackets: Vec<Subpacket>,
        unhashed_subpackets: Vec<Subpacket>,
    ) -> Self {
        SignatureConfig {
            version: SignatureVersion::V4,
            typ,
            pub_alg,
            hash_alg,
            hashed_subpackets,
            unhashed_subpackets,
            created: None,
            issuer: None,
        }
    }

    pub fn new_v3(
        typ: SignatureType,
        pub_alg: PublicKeyAlgorithm,
        hash_alg: HashAlgorithm,
        created: DateTime<Utc>,
        issuer: KeyId,
    ) -> Self {
        SignatureConfig {
            version: SignatureVersion::V3,
            typ,
            pub_alg,
            hash_alg,
            hashed_subpackets: Vec::new(),
            unhashed_subpackets: Vec::new(),
            created: Some(created),
            issuer: Some(issuer),
        }
    }

    /// The common v4 layout: creation time hashed, issuer unhashed.
    pub fn for_key(typ: SignatureType, key: &PublicKey, hash_alg: HashAlgorithm, created: DateTime<Utc>) -> Result<Self> {
        Ok(Self::new_v4(
            typ,
            key.algorithm(),
            hash_alg,
            vec![Subpacket::creation_time(created)?],
            vec![Subpacket::issuer(key.key_id())?],
        ))
    }

    pub fn typ(&self) -> SignatureType {
        self.typ
    }

    /// The serialized hashed subpacket area, without its length.
    pub fn hashed_area(&self) -> Result<Vec<u8>> {
        self.hashed_subpackets.to_bytes()
    }

    /// The bytes appended to the hashed data before finalization.
    pub fn trailer(&self) -> Result<Vec<u8>> {
        match self.version {
            SignatureVersion::V2 | SignatureVersion::V3 => {
                let Some(created) = self.created else {
                    invalid_op!("v3 signature without creation time");
                };
                let mut trailer = Vec::with_capacity(5);
                trailer.write_u8(self.typ.into())?;
                trailer.write_u32::<BigEndian>(time_to_u32(&created))?;
                Ok(trailer)
            }
            SignatureVersion::V4 => {
                let hashed = self.hashed_area()?;
                let hashed_len = u16::try_from(hashed.len())?;

                let mut trailer = Vec::with_capacity(6 + hashed.len() + 6);
                trailer.write_u8(self.version.into())?;
                trailer.write_u8(self.typ.into())?;
                trailer.write_u8(self.pub_alg.into())?;
                trailer.write_u8(self.hash_alg.into())?;
                trailer.write_u16::<BigEndian>(hashed_len)?;
                trailer.extend_from_slice(&hashed);

                trailer.write_u8(self.version.into())?;
                trailer.write_u8(0xFF)?;
                trailer.write_u32::<BigEndian>(6 + u32::from(hashed_len))?;
                Ok(trailer)
            }
            SignatureVersion::Other(v) => Err(Error::UnsupportedVersion {
                message: format!("signature version {v}"),
            }),
        }
    }

    /// How document data is hashed for this signature type.
    pub fn hash_mode(&self, ignore_trailing_whitespace: bool) -> HashMode {
        match self.typ {
            SignatureType::Text => HashMode::Text {
                ignore_trailing_whitespace,
            },
            _ => HashMode::Binary,
        }
    }

    pub fn new_hasher(&self, ignore_trailing_whitespace: bool) -> Result<SignatureHasher> {
        SignatureHasher::new(self.hash_alg, self.hash_mode(ignore_trailing_whitespace))
    }

    /// Hashes the key, as part of key and certification signatures.
    pub(crate) fn hash_key(hasher: &mut SignatureHasher, key: &PublicKey) -> Result<()> {
        let mut buf = Vec::with_capacity(3 + key.write_len());
        key.to_writer_old(&mut buf)?;
        hasher.update_raw(&buf);
        Ok(())
    }

    /// Hashes a user id or user attribute packet, as part of certifications.
    pub(crate) fn hash_identity(&self, hasher: &mut SignatureHasher, id: &impl PacketTrait) -> Result<()> {
        let body = id.to_bytes()?;
        if !self.version.is_legacy() {
            let prefix = match id.tag() {
                Tag::UserId => 0xB4,
                Tag::UserAttribute => 0xD1,
                tag => invalid_op!("{:?} cannot be certified", tag),
            };
            let mut header = [prefix, 0, 0, 0, 0];
            header[1..].copy_from_slice(&u32::try_from(body.len())?.to_be_bytes());
            hasher.update_raw(&header);
        }
        hasher.update_raw(&body);
        Ok(())
    }

    /// Signs a finished document hash.
    pub fn sign_hasher(self, signer: &impl Signer, hasher: SignatureHasher) -> Result<Signature> {
        ensure_eq!(hasher.hash_alg(), self.hash_alg, "hasher algorithm");
        let digest = hasher.finalize(&self.trailer()?);
        let signed_hash_value = [digest[0], digest[1]];
        let values = signer.sign(self.hash_alg, &digest)?;

        Ok(Signature::from_config(self, signed_hash_value, values))
    }

    /// Signs a document, binary or canonical text depending on the signature type.
    pub fn sign<R: Read>(self, signer: &impl Signer, mut data: R) -> Result<Signature> {
        let mut hasher = self.new_hasher(false)?;
        match self.typ {
            SignatureType::Binary | SignatureType::Text => {
                std::io::copy(&mut data, &mut hasher)?;
            }
            SignatureType::Standalone | SignatureType::Timestamp => {}
            typ => invalid_op!("{:?} is not a document signature", typ),
        }
        self.sign_hasher(signer, hasher)
    }

    /// Certifies the binding between `key` and a user id or attribute.
    pub fn sign_certification(
        self,
        signer: &impl Signer,
        key: &PublicKey,
        id: &impl PacketTrait,
    ) -> Result<Signature> {
        if !self.typ.is_certification() {
            invalid_op!("{:?} is not a certification", self.typ);
        }
        debug!("certifying {:?} of {}", id.tag(), key.key_id());

        let mut hasher = self.new_hasher(false)?;
        Self::hash_key(&mut hasher, key)?;
        self.hash_identity(&mut hasher, id)?;
        self.sign_hasher(signer, hasher)
    }

    /// Binds `subkey` to `primary` (or revokes the binding).
    pub fn sign_key_binding(
        self,
        signer: &impl Signer,
        primary: &PublicKey,
        subkey: &PublicKey,
    ) -> Result<Signature> {
        if !self.typ.is_key_binding() {
            invalid_op!("{:?} is not a key binding", self.typ);
        }
        debug!("binding {} to {}", subkey.key_id(), primary.key_id());

        let mut hasher = self.new_hasher(false)?;
        Self::hash_key(&mut hasher, primary)?;
        Self::hash_key(&mut hasher, subkey)?;
        self.sign_hasher(signer, hasher)
    }

    /// Direct key signature or key revocation.
    pub fn sign_key(self, signer: &impl Signer, key: &PublicKey) -> Result<Signature> {
        if !self.typ.is_key_signature() {
            invalid_op!("{:?} is not a key signature", self.typ);
        }
        let mut hasher = self.new_hasher(false)?;
        Self::hash_key(&mut hasher, key)?;
        self.sign_hasher(signer, hasher)
    }

    /// Hashed subpackets first, then unhashed ones.
    pub fn subpackets(&self) -> impl Iterator<Item = &Subpacket> {
        self.hashed_subpackets
            .iter()
            .chain(self.unhashed_subpackets.iter())
    }

    fn find(&self, typ: SubpacketType) -> Option<&Subpacket> {
        self.subpackets().find(|p| p.typ() == typ)
    }

    /// Only the hashed area is trusted for most properties.
    fn find_hashed(&self, typ: SubpacketType) -> Option<&Subpacket> {
        self.hashed_subpackets.iter().find(|p| p.typ() == typ)
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        if self.created.is_some() {
            return self.created;
        }
        self.find_hashed(SubpacketType::SignatureCreationTime)
            .and_then(Subpacket::as_time)
    }

    pub fn issuer(&self) -> Option<KeyId> {
        if self.issuer.is_some() {
            return self.issuer;
        }
        self.find(SubpacketType::Issuer)
            .and_then(|p| KeyId::from_slice(p.data()).ok())
    }

    pub(crate) fn find_subpacket(&self, typ: SubpacketType, hashed_only: bool) -> Option<&Subpacket> {
        if hashed_only {
            self.find_hashed(typ)
        } else {
            self.find(typ)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn v4_trailer_layout() {
        let created = Utc.timestamp_opt(0x11223344, 0).unwrap();
        let config = SignatureConfig::new_v4(
            SignatureType::Binary,
            PublicKeyAlgorithm::RSA,
            HashAlgorithm::Sha256,
            vec![Subpacket::creation_time(created).unwrap()],
            vec![Subpacket::issuer(KeyId::from([9; 8])).unwrap()],
        );
        let trailer = config.trailer().unwrap();
        assert_eq!(
            trailer,
            vec![
                4, 0x00, 1, 8, 0, 6, 5, 2, 0x11, 0x22, 0x33, 0x44, 4, 0xFF, 0, 0, 0, 12
            ]
        );
        assert_eq!(config.created(), Some(created));
        assert_eq!(config.issuer(), Some(KeyId::from([9; 8])));
    }

    #[test]
    fn v3_trailer_layout() {
        let created = Utc.timestamp_opt(1, 0).unwrap();
        let config = SignatureConfig::new_v3(
            SignatureType::Text,
            PublicKeyAlgorithm::RSA,
            HashAlgorithm::Sha1,
            created,
            KeyId::from([1; 8]),
        );
        assert_eq!(config.trailer().unwrap(), vec![1, 0, 0, 0, 1]);
    }

    #[test]
    fn builder_defaults() {
        let config = SignatureConfigBuilder::default()
            .typ(SignatureType::Key)
            .pub_alg(PublicKeyAlgorithm::EdDSALegacy)
            .build()
            .unwrap();
        assert_eq!(config.version, SignatureVersion::V4);
        assert_eq!(config.hash_alg, HashAlgorithm::Sha256);
        assert!(config.created().is_none());
        assert!(SignatureConfigBuilder::default().build().is_err());
    }
}
