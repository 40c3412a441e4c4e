//! # pgpkit
//!
//! An OpenPGP (RFC 4880) toolkit: a byte exact packet codec, signature hashing,
//! passphrase protection of secret keys, and streaming pipelines that write and read
//! literal, compressed, encrypted and signed messages.
//!
//! The [`packet`] module holds the individual packets and their framing, [`composed`]
//! builds messages and transferable keys on top of them.

#[macro_use]
pub mod errors;

pub mod composed;
pub mod crypto;
pub mod packet;
pub mod parsing_reader;
pub mod ser;
pub mod types;

pub use self::composed::{
    PgpMessage, PublicKeyRing, SecretKeyParamsBuilder, SecretKeyRing, SignedPublicKey,
    SignedSecretKey,
};
pub use self::packet::{PacketParser, PacketSink, PacketWriter, PacketWriterConfig};
