//! OpenPGP objects made of several packets: messages and transferable keys.
//!
//! Messages are written by stacking generators, each one a [`PacketSink`] that owns
//! the sink below it, and read back through [`PgpMessage`], one layer at a time.
//! Keys are parsed into [`SignedPublicKey`] and [`SignedSecretKey`], collected in
//! rings, and generated with [`SecretKeyParamsBuilder`].
//!
//! [`PacketSink`]: crate::packet::PacketSink

mod generator;
mod key_gen;
mod key_ring;
mod message;
mod signed_key;
mod sym_data;

pub use self::{
    generator::{
        CompressedDataGenerator, EncryptedDataWriter, EncryptedMessageGenerator,
        LiteralDataGenerator, SignedMessageGenerator,
    },
    key_gen::{KeyType, SecretKeyParams, SecretKeyParamsBuilder},
    key_ring::{PublicKeyRing, SecretKeyRing},
    message::{
        CompressedMessage, EncryptedMessage, LiteralMessage, MarkerMessage, PgpMessage,
        SignedMessage,
    },
    signed_key::{
        SignedKeyDetails, SignedPublicKey, SignedPublicSubKey, SignedSecretKey,
        SignedSecretSubKey, SignedUser, SignedUserAttribute,
    },
};
