//! Transferable keys: a primary key with its identities, subkeys and signatures.
//!
//! Updates are functional. Every `add_*`/`remove_*` call returns a new key and leaves
//! the original untouched, so a key shared between rings never changes under them.

use std::io::{self, BufRead};
use std::iter::Peekable;

use log::{debug, warn};
use rand::{CryptoRng, Rng};

use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::crypto::PrivateKey;
use crate::errors::Result;
use crate::packet::{
    Packet, PacketHeader, PacketParser, PacketSink, PacketTrait, PacketWriter, PublicKey,
    SecretKey, Signature, SignatureType, UserAttribute, UserId,
};
use crate::ser::Serialize;
use crate::types::{Fingerprint, KeyId, PacketHeaderVersion, PacketLength};

/// A user id with its certifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUser {
    pub id: UserId,
    pub signatures: Vec<Signature>,
}

/// A user attribute with its certifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUserAttribute {
    pub attr: UserAttribute,
    pub signatures: Vec<Signature>,
}

/// Everything attached to the primary key itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignedKeyDetails {
    pub revocation_signatures: Vec<Signature>,
    pub direct_signatures: Vec<Signature>,
    pub users: Vec<SignedUser>,
    pub user_attributes: Vec<SignedUserAttribute>,
}

impl SignedKeyDetails {
    fn add_certification(&self, id: &UserId, signature: Signature) -> Self {
        let mut details = self.clone();
        match details.users.iter_mut().find(|user| &user.id == id) {
            Some(user) => user.signatures.push(signature),
            None => details.users.push(SignedUser {
                id: id.clone(),
                signatures: vec![signature],
            }),
        }
        details
    }

    fn add_attribute_certification(&self, attr: &UserAttribute, signature: Signature) -> Self {
        let mut details = self.clone();
        match details
            .user_attributes
            .iter_mut()
            .find(|user| &user.attr == attr)
        {
            Some(user) => user.signatures.push(signature),
            None => details.user_attributes.push(SignedUserAttribute {
                attr: attr.clone(),
                signatures: vec![signature],
            }),
        }
        details
    }

    fn add_direct_signature(&self, signature: Signature) -> Self {
        let mut details = self.clone();
        if signature.typ() == SignatureType::KeyRevocation {
            details.revocation_signatures.push(signature);
        } else {
            details.direct_signatures.push(signature);
        }
        details
    }

    fn remove_certification(&self, id: &UserId, signature: &Signature) -> Self {
        let mut details = self.clone();
        for user in details.users.iter_mut().filter(|user| &user.id == id) {
            user.signatures.retain(|sig| sig != signature);
        }
        details
    }

    fn remove_user_id(&self, id: &UserId) -> Self {
        let mut details = self.clone();
        details.users.retain(|user| &user.id != id);
        details
    }

    fn certifications(&self, id: &UserId) -> &[Signature] {
        self.users
            .iter()
            .find(|user| &user.id == id)
            .map(|user| &user.signatures[..])
            .unwrap_or_default()
    }

    /// True if any certification of `id` on `key` by `signer` verifies.
    fn verify_certification(&self, signer: &PublicKey, key: &PublicKey, id: &UserId) -> Result<bool> {
        for signature in self.certifications(id) {
            if signature.verify_certification(signer, key, id)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Checks all signatures the primary key issued on itself.
    fn verify_self_signatures(&self, key: &PublicKey) -> Result<bool> {
        let key_id = key.key_id();
        let issued = |sig: &&Signature| sig.issuer().map_or(true, |issuer| issuer == key_id);

        for sig in self
            .revocation_signatures
            .iter()
            .chain(&self.direct_signatures)
            .filter(issued)
        {
            if !sig.verify_key(key)? {
                debug!("direct signature of {} does not verify", key_id);
                return Ok(false);
            }
        }
        for user in &self.users {
            for sig in user.signatures.iter().filter(issued) {
                if !sig.verify_certification(key, key, &user.id)? {
                    debug!("self certification of {:?} does not verify", user.id);
                    return Ok(false);
                }
            }
        }
        for attr in &self.user_attributes {
            for sig in attr.signatures.iter().filter(issued) {
                if !sig.verify_certification(key, key, &attr.attr)? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn write_packets<S: PacketSink>(&self, sink: &mut S) -> Result<()> {
        for sig in self
            .revocation_signatures
            .iter()
            .chain(&self.direct_signatures)
        {
            sink.write_packet(sig)?;
        }
        for user in &self.users {
            sink.write_packet(&user.id)?;
            for sig in &user.signatures {
                sink.write_packet(sig)?;
            }
        }
        for attr in &self.user_attributes {
            sink.write_packet(&attr.attr)?;
            for sig in &attr.signatures {
                sink.write_packet(sig)?;
            }
        }
        Ok(())
    }

    fn packets_len(&self) -> usize {
        let sigs = |sigs: &[Signature]| sigs.iter().map(framed_len).sum::<usize>();
        sigs(&self.revocation_signatures)
            + sigs(&self.direct_signatures)
            + self
                .users
                .iter()
                .map(|user| framed_len(&user.id) + sigs(&user.signatures))
                .sum::<usize>()
            + self
                .user_attributes
                .iter()
                .map(|attr| framed_len(&attr.attr) + sigs(&attr.signatures))
                .sum::<usize>()
    }
}

/// Size of a packet with a new format header, as [`PacketWriter`] writes it.
fn framed_len<P: PacketTrait>(packet: &P) -> usize {
    let len = packet.write_len();
    let header = u32::try_from(len)
        .ok()
        .and_then(|len| {
            PacketHeader::from_parts(PacketHeaderVersion::New, packet.tag(), PacketLength::Fixed(len))
                .ok()
        })
        .map_or(0, |header| header.write_len());
    header + len
}

/// A subkey with its binding signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPublicSubKey {
    pub key: PublicKey,
    pub signatures: Vec<Signature>,
}

impl SignedPublicSubKey {
    /// True if a binding signature by `primary` verifies.
    pub fn verify(&self, primary: &PublicKey) -> Result<bool> {
        for sig in self.signatures.iter().filter(|sig| sig.typ().is_key_binding()) {
            if sig.verify_key_binding(primary, primary, &self.key)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// A secret subkey with its binding signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedSecretSubKey {
    pub key: SecretKey,
    pub signatures: Vec<Signature>,
}

/// A transferable public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPublicKey {
    pub primary_key: PublicKey,
    pub details: SignedKeyDetails,
    pub public_subkeys: Vec<SignedPublicSubKey>,
}

impl SignedPublicKey {
    pub fn new(
        primary_key: PublicKey,
        details: SignedKeyDetails,
        public_subkeys: Vec<SignedPublicSubKey>,
    ) -> Self {
        SignedPublicKey {
            primary_key,
            details,
            public_subkeys,
        }
    }

    /// Parses exactly one key.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut keys = Self::from_reader_many(bytes);
        let Some(key) = keys.next() else {
            malformed!("no key found");
        };
        let key = key?;
        if keys.next().is_some() {
            malformed!("more than one key found");
        }
        Ok(key)
    }

    /// Parses a sequence of keys. A broken key yields an error and parsing resumes at
    /// the next primary key.
    pub fn from_reader_many<R: BufRead>(reader: R) -> impl Iterator<Item = Result<Self>> {
        KeyParser::new(PacketParser::new(reader)).map(|key| key.and_then(Self::try_from_parts))
    }

    fn try_from_parts(parts: KeyParts) -> Result<Self> {
        let Primary::Public(primary_key) = parts.primary else {
            malformed!("expected a public key, found a secret key");
        };
        let mut public_subkeys = Vec::with_capacity(parts.subkeys.len());
        for (subkey, signatures) in parts.subkeys {
            let Packet::PublicSubkey(key) = subkey else {
                malformed!("secret subkey in a public key");
            };
            public_subkeys.push(SignedPublicSubKey { key, signatures });
        }
        Ok(SignedPublicKey {
            primary_key,
            details: parts.details,
            public_subkeys,
        })
    }

    pub fn key_id(&self) -> KeyId {
        self.primary_key.key_id()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.primary_key.fingerprint()
    }

    /// The primary key or the subkey with this id.
    pub fn get_key(&self, key_id: KeyId) -> Option<&PublicKey> {
        std::iter::once(&self.primary_key)
            .chain(self.public_subkeys.iter().map(|sub| &sub.key))
            .find(|key| key.key_id() == key_id)
    }

    pub fn certifications(&self, id: &UserId) -> &[Signature] {
        self.details.certifications(id)
    }

    /// True if `signer` certified `id` on this key.
    pub fn verify_certification(&self, signer: &PublicKey, id: &UserId) -> Result<bool> {
        self.details
            .verify_certification(signer, &self.primary_key, id)
    }

    /// Checks the self signatures and the subkey bindings.
    pub fn verify(&self) -> Result<bool> {
        if !self.details.verify_self_signatures(&self.primary_key)? {
            return Ok(false);
        }
        for sub in &self.public_subkeys {
            if !sub.verify(&self.primary_key)? {
                warn!("subkey {} has no valid binding", sub.key.key_id());
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn add_certification(&self, id: &UserId, signature: Signature) -> Self {
        self.with_details(self.details.add_certification(id, signature))
    }

    pub fn add_attribute_certification(&self, attr: &UserAttribute, signature: Signature) -> Self {
        self.with_details(self.details.add_attribute_certification(attr, signature))
    }

    /// Adds a direct key signature, or a revocation for revocation signatures.
    pub fn add_direct_signature(&self, signature: Signature) -> Self {
        self.with_details(self.details.add_direct_signature(signature))
    }

    /// Removes `signature` from the certifications of `id`. The user id stays.
    pub fn remove_certification(&self, id: &UserId, signature: &Signature) -> Self {
        self.with_details(self.details.remove_certification(id, signature))
    }

    pub fn remove_user_id(&self, id: &UserId) -> Self {
        self.with_details(self.details.remove_user_id(id))
    }

    fn with_details(&self, details: SignedKeyDetails) -> Self {
        SignedPublicKey {
            primary_key: self.primary_key.clone(),
            details,
            public_subkeys: self.public_subkeys.clone(),
        }
    }
}

impl Serialize for SignedPublicKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        let mut sink = PacketWriter::new(writer);
        sink.write_packet(&self.primary_key)?;
        self.details.write_packets(&mut sink)?;
        for sub in &self.public_subkeys {
            sink.write_packet(&sub.key)?;
            for sig in &sub.signatures {
                sink.write_packet(sig)?;
            }
        }
        sink.finish()?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        framed_len(&self.primary_key)
            + self.details.packets_len()
            + self
                .public_subkeys
                .iter()
                .map(|sub| framed_len(&sub.key) + sub.signatures.iter().map(framed_len).sum::<usize>())
                .sum::<usize>()
    }
}

/// A transferable secret key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedSecretKey {
    pub primary_key: SecretKey,
    pub details: SignedKeyDetails,
    pub public_subkeys: Vec<SignedPublicSubKey>,
    pub secret_subkeys: Vec<SignedSecretSubKey>,
}

impl SignedSecretKey {
    pub fn new(
        primary_key: SecretKey,
        details: SignedKeyDetails,
        public_subkeys: Vec<SignedPublicSubKey>,
        secret_subkeys: Vec<SignedSecretSubKey>,
    ) -> Self {
        SignedSecretKey {
            primary_key,
            details,
            public_subkeys,
            secret_subkeys,
        }
    }

    /// Parses exactly one key.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut keys = Self::from_reader_many(bytes);
        let Some(key) = keys.next() else {
            malformed!("no key found");
        };
        let key = key?;
        if keys.next().is_some() {
            malformed!("more than one key found");
        }
        Ok(key)
    }

    pub fn from_reader_many<R: BufRead>(reader: R) -> impl Iterator<Item = Result<Self>> {
        KeyParser::new(PacketParser::new(reader)).map(|key| key.and_then(Self::try_from_parts))
    }

    fn try_from_parts(parts: KeyParts) -> Result<Self> {
        let Primary::Secret(primary_key) = parts.primary else {
            malformed!("expected a secret key, found a public key");
        };
        let mut public_subkeys = Vec::new();
        let mut secret_subkeys = Vec::new();
        for (subkey, signatures) in parts.subkeys {
            match subkey {
                Packet::PublicSubkey(key) => public_subkeys.push(SignedPublicSubKey { key, signatures }),
                Packet::SecretSubkey(key) => secret_subkeys.push(SignedSecretSubKey { key, signatures }),
                packet => malformed!("unexpected {:?} in subkey position", packet.tag()),
            }
        }
        Ok(SignedSecretKey {
            primary_key,
            details: parts.details,
            public_subkeys,
            secret_subkeys,
        })
    }

    pub fn key_id(&self) -> KeyId {
        self.primary_key.key_id()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.primary_key.public_key().fingerprint()
    }

    /// The public half, with every secret subkey turned into its public subkey.
    pub fn signed_public_key(&self) -> SignedPublicKey {
        let mut public_subkeys = self.public_subkeys.clone();
        public_subkeys.extend(self.secret_subkeys.iter().map(|sub| SignedPublicSubKey {
            key: sub.key.public_key().clone(),
            signatures: sub.signatures.clone(),
        }));
        SignedPublicKey {
            primary_key: self.primary_key.public_key().clone(),
            details: self.details.clone(),
            public_subkeys,
        }
    }

    /// The primary secret key or the secret subkey with this id.
    pub fn get_secret_key(&self, key_id: KeyId) -> Option<&SecretKey> {
        std::iter::once(&self.primary_key)
            .chain(self.secret_subkeys.iter().map(|sub| &sub.key))
            .find(|key| key.key_id() == key_id)
    }

    /// Unlocks the primary key.
    pub fn extract_private_key(&self, passphrase: &[u8]) -> Result<PrivateKey> {
        self.primary_key.extract_private_key(passphrase)
    }

    pub fn certifications(&self, id: &UserId) -> &[Signature] {
        self.details.certifications(id)
    }

    pub fn verify_certification(&self, signer: &PublicKey, id: &UserId) -> Result<bool> {
        self.details
            .verify_certification(signer, self.primary_key.public_key(), id)
    }

    pub fn verify(&self) -> Result<bool> {
        self.signed_public_key().verify()
    }

    pub fn add_certification(&self, id: &UserId, signature: Signature) -> Self {
        self.with_details(self.details.add_certification(id, signature))
    }

    pub fn add_attribute_certification(&self, attr: &UserAttribute, signature: Signature) -> Self {
        self.with_details(self.details.add_attribute_certification(attr, signature))
    }

    pub fn add_direct_signature(&self, signature: Signature) -> Self {
        self.with_details(self.details.add_direct_signature(signature))
    }

    pub fn remove_certification(&self, id: &UserId, signature: &Signature) -> Self {
        self.with_details(self.details.remove_certification(id, signature))
    }

    pub fn remove_user_id(&self, id: &UserId) -> Self {
        self.with_details(self.details.remove_user_id(id))
    }

    /// Takes over the public material, identities and signatures of `key`, keeping
    /// the secrets. Subkeys are matched by key id.
    pub fn replace_public_key(&self, key: &SignedPublicKey) -> Result<Self> {
        if self.key_id() != key.key_id() {
            invalid_op!("key ids do not match");
        }
        let primary_key = self.primary_key.replace_public_key(key.primary_key.clone())?;

        let mut secret_subkeys = Vec::with_capacity(self.secret_subkeys.len());
        for sub in &self.secret_subkeys {
            let replaced = match key
                .public_subkeys
                .iter()
                .find(|public| public.key.key_id() == sub.key.key_id())
            {
                Some(public) => SignedSecretSubKey {
                    key: sub.key.replace_public_key(public.key.clone())?,
                    signatures: public.signatures.clone(),
                },
                None => sub.clone(),
            };
            secret_subkeys.push(replaced);
        }
        let public_subkeys = key
            .public_subkeys
            .iter()
            .filter(|public| {
                !secret_subkeys
                    .iter()
                    .any(|sub| sub.key.key_id() == public.key.key_id())
            })
            .cloned()
            .collect();

        Ok(SignedSecretKey {
            primary_key,
            details: key.details.clone(),
            public_subkeys,
            secret_subkeys,
        })
    }

    /// Re-protects the primary key and all secret subkeys.
    pub fn copy_with_new_password<R: CryptoRng + Rng>(
        &self,
        rng: &mut R,
        old_passphrase: &[u8],
        new_passphrase: &[u8],
        new_alg: SymmetricKeyAlgorithm,
    ) -> Result<Self> {
        let primary_key =
            self.primary_key
                .copy_with_new_password(rng, old_passphrase, new_passphrase, new_alg)?;
        let mut secret_subkeys = Vec::with_capacity(self.secret_subkeys.len());
        for sub in &self.secret_subkeys {
            secret_subkeys.push(SignedSecretSubKey {
                key: sub
                    .key
                    .copy_with_new_password(rng, old_passphrase, new_passphrase, new_alg)?,
                signatures: sub.signatures.clone(),
            });
        }
        Ok(SignedSecretKey {
            primary_key,
            details: self.details.clone(),
            public_subkeys: self.public_subkeys.clone(),
            secret_subkeys,
        })
    }

    fn with_details(&self, details: SignedKeyDetails) -> Self {
        SignedSecretKey {
            primary_key: self.primary_key.clone(),
            details,
            public_subkeys: self.public_subkeys.clone(),
            secret_subkeys: self.secret_subkeys.clone(),
        }
    }
}

impl Serialize for SignedSecretKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        let mut sink = PacketWriter::new(writer);
        sink.write_packet(&self.primary_key)?;
        self.details.write_packets(&mut sink)?;
        for sub in &self.secret_subkeys {
            sink.write_packet(&sub.key)?;
            for sig in &sub.signatures {
                sink.write_packet(sig)?;
            }
        }
        for sub in &self.public_subkeys {
            sink.write_packet(&sub.key)?;
            for sig in &sub.signatures {
                sink.write_packet(sig)?;
            }
        }
        sink.finish()?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        let subs = |key_len: usize, sigs: &[Signature]| key_len + sigs.iter().map(framed_len).sum::<usize>();
        framed_len(&self.primary_key)
            + self.details.packets_len()
            + self
                .secret_subkeys
                .iter()
                .map(|sub| subs(framed_len(&sub.key), &sub.signatures))
                .sum::<usize>()
            + self
                .public_subkeys
                .iter()
                .map(|sub| subs(framed_len(&sub.key), &sub.signatures))
                .sum::<usize>()
    }
}

enum Primary {
    Public(PublicKey),
    Secret(SecretKey),
}

/// The packets of one transferable key, grouped.
struct KeyParts {
    primary: Primary,
    details: SignedKeyDetails,
    /// Subkey packets with their signatures.
    subkeys: Vec<(Packet, Vec<Signature>)>,
}

#[derive(Clone, Copy)]
enum Section {
    Primary,
    User(usize),
    Attribute(usize),
    Subkey(usize),
}

/// Groups a packet stream into transferable keys. Trust packets are dropped.
struct KeyParser<I: Iterator<Item = Result<Packet>>> {
    packets: Peekable<I>,
}

fn is_primary(packet: Option<&Result<Packet>>) -> bool {
    matches!(
        packet,
        Some(Ok(Packet::PublicKey(_))) | Some(Ok(Packet::SecretKey(_)))
    )
}

impl<I: Iterator<Item = Result<Packet>>> KeyParser<I> {
    fn new(packets: I) -> Self {
        KeyParser {
            packets: packets.peekable(),
        }
    }

    /// Drops packets up to the next primary key.
    fn skip_to_primary(&mut self) {
        while self.packets.peek().is_some() && !is_primary(self.packets.peek()) {
            self.packets.next();
        }
    }

    fn parse_rest(&mut self, primary: Primary) -> Result<KeyParts> {
        let mut details = SignedKeyDetails::default();
        let mut subkeys: Vec<(Packet, Vec<Signature>)> = Vec::new();
        let mut section = Section::Primary;

        while self.packets.peek().is_some() && !is_primary(self.packets.peek()) {
            let Some(packet) = self.packets.next() else {
                break;
            };
            match packet? {
                Packet::Trust(_) => {}
                Packet::Signature(sig) => match section {
                    Section::Primary => {
                        if sig.typ() == SignatureType::KeyRevocation {
                            details.revocation_signatures.push(sig);
                        } else {
                            details.direct_signatures.push(sig);
                        }
                    }
                    Section::User(i) => details.users[i].signatures.push(sig),
                    Section::Attribute(i) => details.user_attributes[i].signatures.push(sig),
                    Section::Subkey(i) => subkeys[i].1.push(sig),
                },
                Packet::UserId(id) => {
                    details.users.push(SignedUser {
                        id,
                        signatures: Vec::new(),
                    });
                    section = Section::User(details.users.len() - 1);
                }
                Packet::UserAttribute(attr) => {
                    details.user_attributes.push(SignedUserAttribute {
                        attr,
                        signatures: Vec::new(),
                    });
                    section = Section::Attribute(details.user_attributes.len() - 1);
                }
                subkey @ (Packet::PublicSubkey(_) | Packet::SecretSubkey(_)) => {
                    subkeys.push((subkey, Vec::new()));
                    section = Section::Subkey(subkeys.len() - 1);
                }
                packet => malformed!("unexpected {:?} packet in a key", packet.tag()),
            }
        }

        Ok(KeyParts {
            primary,
            details,
            subkeys,
        })
    }
}

impl<I: Iterator<Item = Result<Packet>>> Iterator for KeyParser<I> {
    type Item = Result<KeyParts>;

    fn next(&mut self) -> Option<Self::Item> {
        let primary = loop {
            match self.packets.next()? {
                Ok(Packet::Trust(_)) => {}
                Ok(Packet::PublicKey(key)) => break Primary::Public(key),
                Ok(Packet::SecretKey(key)) => break Primary::Secret(key),
                Ok(packet) => {
                    self.skip_to_primary();
                    return Some(Err(format_err!(
                        "expected a primary key, found {:?}",
                        packet.tag()
                    )));
                }
                Err(err) => {
                    self.skip_to_primary();
                    return Some(Err(err));
                }
            }
        };

        let parts = self.parse_rest(primary);
        if parts.is_err() {
            self.skip_to_primary();
        }
        Some(parts)
    }
}
