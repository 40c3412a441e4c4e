//! Message generators.
//!
//! Each generator wraps a [`PacketSink`] and is a sink itself, so a message is built
//! by stacking them, outermost first:
//!
//! ```ignore
//! let writer = PacketWriter::new(Vec::new());
//! let compressed = CompressedDataGenerator::open(writer, CompressionAlgorithm::ZIP)?;
//! let signed = SignedMessageGenerator::open(compressed, &key, SignatureType::Binary, HashAlgorithm::Sha256)?;
//! let mut literal = LiteralDataGenerator::open(signed, &header, None)?;
//! literal.write_all(b"hello world!\n")?;
//! let bytes = literal.finish()?.finish()?.finish()?.finish()?;
//! ```
//!
//! `finish()` closes a layer and returns the sink it wrapped, so layers close
//! inner to outer.

use std::io::{self, Write};

use chrono::Utc;
use log::debug;
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::composed::sym_data::DataEncryptor;
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::crypto::Signer;
use crate::errors::{Error, Result};
use crate::packet::{
    BodyLength, Compressor, LiteralDataHeader, OnePassSignature, PacketSink, PacketWriter,
    PacketWriterConfig, PublicKey, PublicKeyEncryptedSessionKey, SignatureConfig,
    SignatureHasher, SignatureType, StreamBody, SymKeyEncryptedSessionKey, SEIPD_VERSION,
};
use crate::ser::Serialize;
use crate::types::{CompressionAlgorithm, Tag};

/// Forwards the sink operations of a layer to its nested packet writer.
///
/// Literal content written inside the layer is reported to the enclosing sink as
/// well, so signers outside of compression or encryption still see the plain data.
macro_rules! delegate_sink {
    ($name:ident) => {
        impl<S: PacketSink> PacketSink for $name<S> {
            fn config(&self) -> PacketWriterConfig {
                self.inner.config()
            }

            fn write_raw_packet(&mut self, tag: Tag, body: &[u8]) -> Result<()> {
                if tag == Tag::LiteralData {
                    self.outer_sink().literal_content(literal_payload(body)?)?;
                }
                self.inner.write_raw_packet(tag, body)
            }

            fn begin_stream(&mut self, tag: Tag, prefix: &[u8], length: BodyLength) -> Result<()> {
                self.inner.begin_stream(tag, prefix, length)?;
                self.in_literal = tag == Tag::LiteralData;
                Ok(())
            }

            fn write_stream(&mut self, data: &[u8]) -> Result<()> {
                if self.in_literal {
                    self.outer_sink().literal_content(data)?;
                }
                self.inner.write_stream(data)
            }

            fn end_stream(&mut self) -> Result<()> {
                self.in_literal = false;
                self.inner.end_stream()
            }

            fn literal_content(&mut self, data: &[u8]) -> Result<()> {
                self.outer_sink().literal_content(data)
            }
        }
    };
}

/// The content of a literal data packet, behind its header.
fn literal_payload(body: &[u8]) -> Result<&[u8]> {
    let header = LiteralDataHeader::try_from_reader(body)?;
    Ok(&body[header.write_len()..])
}

/// Streams the content of a literal data packet.
#[derive(Debug)]
pub struct LiteralDataGenerator<S: PacketSink> {
    sink: S,
}

impl<S: PacketSink> LiteralDataGenerator<S> {
    /// Starts the packet. With a known content `length` the packet gets a fixed
    /// length, otherwise it is written in partial chunks.
    pub fn open(mut sink: S, header: &LiteralDataHeader, length: Option<u64>) -> Result<Self> {
        let prefix = header.to_bytes()?;
        let body_length = match length {
            Some(len) => BodyLength::Fixed(prefix.len() as u64 + len),
            None => BodyLength::Partial,
        };
        sink.begin_stream(Tag::LiteralData, &prefix, body_length)?;
        Ok(LiteralDataGenerator { sink })
    }

    pub fn finish(mut self) -> Result<S> {
        self.sink.end_stream()?;
        Ok(self.sink)
    }
}

impl<S: PacketSink> Write for LiteralDataGenerator<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.write_stream(buf).map_err(Error::into_io)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Compresses every packet written into it into one compressed data packet.
#[derive(Debug)]
pub struct CompressedDataGenerator<S: PacketSink> {
    inner: PacketWriter<Compressor<StreamBody<S>>>,
    in_literal: bool,
}

impl<S: PacketSink> CompressedDataGenerator<S> {
    pub fn open(mut sink: S, alg: CompressionAlgorithm) -> Result<Self> {
        let config = sink.config();
        sink.begin_stream(Tag::CompressedData, &[alg.into()], BodyLength::Partial)?;
        let compressor = Compressor::new(alg, StreamBody::new(sink))?;
        debug!("compressing with {:?}", alg);
        Ok(CompressedDataGenerator {
            inner: PacketWriter::with_config(compressor, config),
            in_literal: false,
        })
    }

    pub fn finish(self) -> Result<S> {
        let compressor = self.inner.finish()?;
        compressor.finish()?.finish()
    }

    fn outer_sink(&mut self) -> &mut S {
        self.inner.get_mut().get_mut().get_mut()
    }
}

delegate_sink!(CompressedDataGenerator);

#[derive(derive_more::Debug)]
enum Method {
    Password {
        #[debug(skip)]
        passphrase: Zeroizing<Vec<u8>>,
        hash: HashAlgorithm,
    },
    PublicKey {
        key: PublicKey,
        obfuscate: bool,
    },
}

/// Collects the ways a message can be decrypted, then opens the encrypted layer.
#[derive(Debug)]
pub struct EncryptedMessageGenerator {
    alg: SymmetricKeyAlgorithm,
    with_integrity_packet: bool,
    methods: Vec<Method>,
    opened: bool,
}

impl EncryptedMessageGenerator {
    /// `with_integrity_packet` selects SEIPD with a modification detection code over
    /// the plain SED packet.
    pub fn new(alg: SymmetricKeyAlgorithm, with_integrity_packet: bool) -> Self {
        EncryptedMessageGenerator {
            alg,
            with_integrity_packet,
            methods: Vec::new(),
            opened: false,
        }
    }

    /// Allows decryption with `passphrase`, derived with an iterated and salted S2K.
    pub fn add_password(&mut self, passphrase: &[u8], hash: HashAlgorithm) {
        self.methods.push(Method::Password {
            passphrase: Zeroizing::new(passphrase.to_vec()),
            hash,
        });
    }

    /// Allows decryption with the secret half of `key`.
    ///
    /// `obfuscate` pads ECDH session info to hide the session key size.
    pub fn add_public_key(&mut self, key: &PublicKey, obfuscate: bool) {
        self.methods.push(Method::PublicKey {
            key: key.clone(),
            obfuscate,
        });
    }

    /// Writes the session key packets and starts the encrypted data packet.
    pub fn open<R: CryptoRng + Rng, S: PacketSink>(
        &mut self,
        rng: &mut R,
        mut sink: S,
    ) -> Result<EncryptedDataWriter<S>> {
        if self.opened {
            invalid_op!("encrypted message generator already opened");
        }
        if self.methods.is_empty() {
            invalid_op!("no encryption methods specified");
        }
        if self.alg == SymmetricKeyAlgorithm::Plaintext {
            invalid_op!("cannot encrypt with the plaintext algorithm");
        }
        self.opened = true;

        let session_key = match self.methods.as_slice() {
            [Method::Password { passphrase, hash }] => {
                let (skesk, key) =
                    SymKeyEncryptedSessionKey::new_direct(rng, passphrase, self.alg, *hash)?;
                sink.write_packet(&skesk)?;
                key
            }
            methods => {
                let session_key = self.alg.new_session_key(rng);
                for method in methods {
                    match method {
                        Method::Password { passphrase, hash } => {
                            let skesk = SymKeyEncryptedSessionKey::encrypt(
                                rng,
                                passphrase,
                                self.alg,
                                *hash,
                                &session_key,
                            )?;
                            sink.write_packet(&skesk)?;
                        }
                        Method::PublicKey { key, obfuscate } => {
                            let pkesk = PublicKeyEncryptedSessionKey::from_session_key(
                                rng,
                                key,
                                self.alg,
                                &session_key,
                                *obfuscate,
                            )?;
                            sink.write_packet(&pkesk)?;
                        }
                    }
                }
                session_key
            }
        };

        let (tag, prefix): (Tag, &[u8]) = if self.with_integrity_packet {
            (Tag::SymEncryptedProtectedData, &[SEIPD_VERSION])
        } else {
            (Tag::SymEncryptedData, &[])
        };
        debug!("encrypting with {:?} into {:?}", self.alg, tag);

        let config = sink.config();
        sink.begin_stream(tag, prefix, BodyLength::Partial)?;
        let encryptor = DataEncryptor::new(
            rng,
            StreamBody::new(sink),
            self.alg,
            &session_key,
            self.with_integrity_packet,
        )?;
        Ok(EncryptedDataWriter {
            inner: PacketWriter::with_config(encryptor, config),
            in_literal: false,
        })
    }
}

/// The open encrypted layer of a message.
#[derive(Debug)]
pub struct EncryptedDataWriter<S: PacketSink> {
    inner: PacketWriter<DataEncryptor<StreamBody<S>>>,
    in_literal: bool,
}

impl<S: PacketSink> EncryptedDataWriter<S> {
    /// Writes the modification detection code, if any, and closes the packet.
    pub fn finish(self) -> Result<S> {
        let encryptor = self.inner.finish()?;
        encryptor.finish()?.finish()
    }

    fn outer_sink(&mut self) -> &mut S {
        self.inner.get_mut().get_mut().get_mut()
    }
}

delegate_sink!(EncryptedDataWriter);

/// Signs the literal data written through it with a one-pass signature.
///
/// Other packets pass through unhashed, so compressed, encrypted or further signed
/// layers may sit between this one and the literal data.
#[derive(derive_more::Debug)]
pub struct SignedMessageGenerator<'k, S: PacketSink, K: Signer> {
    sink: S,
    #[debug(skip)]
    signer: &'k K,
    config: SignatureConfig,
    hasher: SignatureHasher,
    in_literal: bool,
}

impl<'k, S: PacketSink, K: Signer> SignedMessageGenerator<'k, S, K> {
    /// Writes the one-pass signature packet.
    pub fn open(mut sink: S, signer: &'k K, typ: SignatureType, hash_alg: HashAlgorithm) -> Result<Self> {
        let key = signer.public_key();
        let config = SignatureConfig::for_key(typ, key, hash_alg, Utc::now())?;
        let hasher = config.new_hasher(false)?;

        let ops = OnePassSignature::new(&config, key.key_id(), true);
        sink.write_packet(&ops)?;
        debug!("signing as {} with {}", key.key_id(), hash_alg);

        Ok(SignedMessageGenerator {
            sink,
            signer,
            config,
            hasher,
            in_literal: false,
        })
    }

    /// Appends the signature packet.
    pub fn finish(mut self) -> Result<S> {
        if self.in_literal {
            invalid_op!("literal data still open");
        }
        let signature = self.config.sign_hasher(self.signer, self.hasher)?;
        self.sink.write_packet(&signature)?;
        Ok(self.sink)
    }
}

impl<S: PacketSink, K: Signer> PacketSink for SignedMessageGenerator<'_, S, K> {
    fn config(&self) -> PacketWriterConfig {
        self.sink.config()
    }

    fn write_raw_packet(&mut self, tag: Tag, body: &[u8]) -> Result<()> {
        if tag == Tag::LiteralData {
            self.hasher.update(literal_payload(body)?);
        }
        self.sink.write_raw_packet(tag, body)
    }

    fn begin_stream(&mut self, tag: Tag, prefix: &[u8], length: BodyLength) -> Result<()> {
        self.sink.begin_stream(tag, prefix, length)?;
        self.in_literal = tag == Tag::LiteralData;
        Ok(())
    }

    fn write_stream(&mut self, data: &[u8]) -> Result<()> {
        if self.in_literal {
            self.hasher.update(data);
        }
        self.sink.write_stream(data)
    }

    fn end_stream(&mut self) -> Result<()> {
        self.in_literal = false;
        self.sink.end_stream()
    }

    fn literal_content(&mut self, data: &[u8]) -> Result<()> {
        self.hasher.update(data);
        self.sink.literal_content(data)
    }
}
