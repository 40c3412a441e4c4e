//! Collections of transferable keys, as stored in `pubring` and `secring` files.

use std::io::{self, BufRead};

use log::warn;

use crate::composed::{SignedPublicKey, SignedSecretKey};
use crate::errors::Result;
use crate::packet::{PublicKey, SecretKey};
use crate::ser::Serialize;
use crate::types::KeyId;

/// An ordered set of public keys.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublicKeyRing {
    keys: Vec<SignedPublicKey>,
}

impl PublicKeyRing {
    pub fn new(keys: Vec<SignedPublicKey>) -> Self {
        PublicKeyRing { keys }
    }

    /// Parses a keyring. Keys that fail to parse are logged and left out.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut keys = Vec::new();
        for key in SignedPublicKey::from_reader_many(reader) {
            match key {
                Ok(key) => keys.push(key),
                // A truncated file is not a skippable key.
                Err(err @ crate::errors::Error::UnexpectedEndOfStream) => return Err(err),
                Err(err) => warn!("skipping unreadable key: {}", err),
            }
        }
        Ok(PublicKeyRing { keys })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(bytes)
    }

    /// Finds a primary key or subkey by id.
    pub fn get_key(&self, key_id: KeyId) -> Option<&PublicKey> {
        self.keys.iter().find_map(|key| key.get_key(key_id))
    }

    /// The transferable key holding the primary key or subkey with this id.
    pub fn get_signed_key(&self, key_id: KeyId) -> Option<&SignedPublicKey> {
        self.keys.iter().find(|key| key.get_key(key_id).is_some())
    }

    /// A new ring with `key` added, replacing a key with the same primary id.
    pub fn insert(&self, key: SignedPublicKey) -> Self {
        let mut keys: Vec<_> = self
            .keys
            .iter()
            .filter(|k| k.key_id() != key.key_id())
            .cloned()
            .collect();
        keys.push(key);
        PublicKeyRing { keys }
    }

    /// A new ring without the key whose primary id is `key_id`.
    pub fn remove(&self, key_id: KeyId) -> Self {
        PublicKeyRing {
            keys: self
                .keys
                .iter()
                .filter(|k| k.key_id() != key_id)
                .cloned()
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignedPublicKey> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Serialize for PublicKeyRing {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.keys.to_writer(writer)
    }

    fn write_len(&self) -> usize {
        self.keys.write_len()
    }
}

/// An ordered set of secret keys.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecretKeyRing {
    keys: Vec<SignedSecretKey>,
}

impl SecretKeyRing {
    pub fn new(keys: Vec<SignedSecretKey>) -> Self {
        SecretKeyRing { keys }
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut keys = Vec::new();
        for key in SignedSecretKey::from_reader_many(reader) {
            match key {
                Ok(key) => keys.push(key),
                Err(err @ crate::errors::Error::UnexpectedEndOfStream) => return Err(err),
                Err(err) => warn!("skipping unreadable secret key: {}", err),
            }
        }
        Ok(SecretKeyRing { keys })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(bytes)
    }

    /// Finds a primary secret key or secret subkey by id.
    pub fn get_secret_key(&self, key_id: KeyId) -> Option<&SecretKey> {
        self.keys.iter().find_map(|key| key.get_secret_key(key_id))
    }

    pub fn get_signed_key(&self, key_id: KeyId) -> Option<&SignedSecretKey> {
        self.keys
            .iter()
            .find(|key| key.get_secret_key(key_id).is_some())
    }

    pub fn insert(&self, key: SignedSecretKey) -> Self {
        let mut keys: Vec<_> = self
            .keys
            .iter()
            .filter(|k| k.key_id() != key.key_id())
            .cloned()
            .collect();
        keys.push(key);
        SecretKeyRing { keys }
    }

    pub fn remove(&self, key_id: KeyId) -> Self {
        SecretKeyRing {
            keys: self
                .keys
                .iter()
                .filter(|k| k.key_id() != key_id)
                .cloned()
                .collect(),
        }
    }

    /// The public ring matching this secret ring.
    pub fn public_key_ring(&self) -> PublicKeyRing {
        PublicKeyRing::new(self.keys.iter().map(SignedSecretKey::signed_public_key).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignedSecretKey> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Serialize for SecretKeyRing {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.keys.to_writer(writer)
    }

    fn write_len(&self) -> usize {
        self.keys.write_len()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::composed::{KeyType, SecretKeyParamsBuilder};
    use crate::packet::{PacketSink, PacketWriter, UserId};

    fn generate(seed: u64, id: &str) -> SignedSecretKey {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        SecretKeyParamsBuilder::default()
            .key_type(KeyType::Ed25519Legacy)
            .primary_user_id(id.to_string())
            .subkey(Some(KeyType::ECDH))
            .build()
            .unwrap()
            .generate(&mut rng)
            .unwrap()
    }

    #[test]
    fn lookup_by_primary_and_subkey() {
        let alice = generate(1, "alice");
        let bob = generate(2, "bob");
        let ring = SecretKeyRing::new(vec![alice.clone(), bob.clone()]);

        let bytes = ring.to_bytes().unwrap();
        let parsed = SecretKeyRing::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, ring);

        let sub_id = bob.secret_subkeys[0].key.key_id();
        assert_eq!(parsed.get_signed_key(sub_id).unwrap().key_id(), bob.key_id());
        assert!(parsed.get_secret_key(alice.key_id()).is_some());

        let public = parsed.public_key_ring();
        assert_eq!(public.len(), 2);
        assert!(public.get_key(sub_id).is_some());
    }

    #[test]
    fn insert_and_remove_are_functional() {
        let alice = generate(3, "alice").signed_public_key();
        let bob = generate(4, "bob").signed_public_key();

        let empty = PublicKeyRing::default();
        let one = empty.insert(alice.clone());
        let two = one.insert(bob.clone()).insert(alice.clone());
        assert!(empty.is_empty());
        assert_eq!(one.len(), 1);
        assert_eq!(two.len(), 2);

        let removed = two.remove(alice.key_id());
        assert_eq!(two.len(), 2);
        assert_eq!(removed.iter().collect::<Vec<_>>(), vec![&bob]);
    }

    #[test]
    fn broken_keys_are_skipped() {
        let alice = generate(5, "alice").signed_public_key();
        let bob = generate(6, "bob").signed_public_key();
        let mut stray = PacketWriter::new(Vec::new());
        stray.write_packet(&UserId::from_str("stray")).unwrap();
        let mut bytes = stray.finish().unwrap();
        bytes.extend(alice.to_bytes().unwrap());
        bytes.extend(bob.to_bytes().unwrap());

        let ring = PublicKeyRing::from_bytes(&bytes).unwrap();
        assert_eq!(ring.len(), 2);

        // Truncation is not a recoverable key.
        assert!(PublicKeyRing::from_bytes(&bytes[..bytes.len() - 3]).is_err());
    }
}
