//! Layer by layer reading of messages.
//!
//! A message is peeled one layer at a time: [`PgpMessage::from_reader`] looks at the
//! first packet and returns the matching variant, and each container variant hands
//! out the next layer on request. Nothing is read ahead of what the caller consumes.

use std::io::{self, BufRead, BufReader, Read};

use log::{debug, warn};
use zeroize::Zeroizing;

use crate::composed::sym_data::{check_prefix, DataDecryptor};
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::crypto::PrivateKey;
use crate::errors::{Error, Result};
use crate::packet::{
    Decompressor, HashMode, LiteralDataHeader, OnePassSignature, Packet, PacketBodyReader,
    PacketHeader, PublicKey, PublicKeyEncryptedSessionKey, Signature, SignatureHasher,
    SignatureType, SymKeyEncryptedSessionKey, SEIPD_VERSION,
};
use crate::parsing_reader::BufReadParsing;
use crate::types::{CompressionAlgorithm, StringToKey, Tag};

type Source<'a> = Box<dyn BufRead + 'a>;

/// Largest encrypted prefix: a 16 byte block plus the two repeated bytes.
const MAX_PREFIX_LEN: usize = 18;

/// Sees literal content as the caller reads it.
trait LiteralTap {
    fn update(&mut self, data: &[u8]);

    /// The literal body has been read to its end.
    fn finish(&mut self);

    fn is_done(&self) -> bool;
}

fn reborrow<'b>(tap: &'b mut Option<&mut dyn LiteralTap>) -> Option<&'b mut dyn LiteralTap> {
    match tap {
        Some(tap) => {
            let tap: &'b mut dyn LiteralTap = &mut **tap;
            Some(tap)
        }
        None => None,
    }
}

/// One layer of a message.
#[derive(Debug)]
pub enum PgpMessage<'a> {
    Literal(LiteralMessage<'a>),
    Compressed(CompressedMessage<'a>),
    Signed(SignedMessage<'a>),
    Encrypted(EncryptedMessage<'a>),
    Marker(MarkerMessage<'a>),
}

impl<'a> PgpMessage<'a> {
    /// Reads the header of the outermost layer.
    pub fn from_reader<R: BufRead + 'a>(reader: R) -> Result<Self> {
        Self::next_layer(Box::new(reader), None)
    }

    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self> {
        Self::from_reader(bytes)
    }

    fn next_layer(mut source: Source<'a>, tap: Option<&'a mut dyn LiteralTap>) -> Result<Self> {
        let header = PacketHeader::try_from_reader(&mut source)?;
        debug!("message layer {:?}", header);

        let message = match header.tag() {
            Tag::LiteralData => {
                let mut body = PacketBodyReader::new(header, source)?;
                let data_header = LiteralDataHeader::try_from_reader(&mut body)?;
                PgpMessage::Literal(LiteralMessage {
                    header: data_header,
                    body,
                    tap,
                })
            }
            Tag::CompressedData => {
                let mut body = PacketBodyReader::new(header, source)?;
                let alg = CompressionAlgorithm::from(body.read_u8()?);
                let decompressor = Decompressor::new(alg, body)?;
                PgpMessage::Compressed(CompressedMessage {
                    alg,
                    reader: BufReader::new(decompressor),
                    tap,
                })
            }
            Tag::OnePassSignature => {
                let Packet::OnePassSignature(ops) = read_packet(header, &mut source)? else {
                    malformed!("expected a one-pass signature");
                };
                let hasher = SignatureHasher::new(ops.hash_algorithm, ops_hash_mode(&ops))?;
                PgpMessage::Signed(SignedMessage {
                    ops: Some(ops),
                    signature: None,
                    source,
                    tap: SignatureTap::new(hasher, tap),
                })
            }
            Tag::Signature => {
                let Packet::Signature(signature) = read_packet(header, &mut source)? else {
                    malformed!("expected a signature");
                };
                let hasher = signature.config.new_hasher(false)?;
                PgpMessage::Signed(SignedMessage {
                    ops: None,
                    signature: Some(signature),
                    source,
                    tap: SignatureTap::new(hasher, tap),
                })
            }
            Tag::PublicKeyEncryptedSessionKey
            | Tag::SymKeyEncryptedSessionKey
            | Tag::SymEncryptedData
            | Tag::SymEncryptedProtectedData => {
                PgpMessage::Encrypted(EncryptedMessage::new(header, source, tap)?)
            }
            Tag::Marker => {
                read_packet(header, &mut source)?;
                PgpMessage::Marker(MarkerMessage { source, tap })
            }
            tag => malformed!("unexpected {:?} packet at the start of a message", tag),
        };
        Ok(message)
    }

    /// Opens the next layer of container variants.
    ///
    /// Encrypted messages must have been decrypted first; literal data has no inner
    /// layer.
    pub fn read_message(&mut self) -> Result<PgpMessage<'_>> {
        match self {
            PgpMessage::Literal(_) => invalid_op!("literal data is the innermost layer"),
            PgpMessage::Compressed(m) => m.read_message(),
            PgpMessage::Signed(m) => m.read_message(),
            PgpMessage::Encrypted(m) => m.read_message(),
            PgpMessage::Marker(m) => m.read_message(),
        }
    }
}

/// Parses a whole packet and leaves the source behind it.
fn read_packet(header: PacketHeader, source: &mut Source<'_>) -> Result<Packet> {
    let mut body = PacketBodyReader::new(header, source)?;
    let packet = Packet::from_reader(header.tag(), &mut body)?;
    body.drain()?;
    Ok(packet)
}

fn ops_hash_mode(ops: &OnePassSignature) -> HashMode {
    match ops.typ {
        SignatureType::Text => HashMode::Text {
            ignore_trailing_whitespace: false,
        },
        _ => HashMode::Binary,
    }
}

/// The literal content of a message. Reading it feeds any enclosing signatures.
#[derive(derive_more::Debug)]
pub struct LiteralMessage<'a> {
    header: LiteralDataHeader,
    #[debug(skip)]
    body: PacketBodyReader<Source<'a>>,
    #[debug(skip)]
    tap: Option<&'a mut dyn LiteralTap>,
}

impl LiteralMessage<'_> {
    pub fn header(&self) -> &LiteralDataHeader {
        &self.header
    }

    /// Reads the remaining content.
    pub fn data(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.read_to_end(&mut out)?;
        Ok(out)
    }
}

impl Drop for LiteralMessage<'_> {
    fn drop(&mut self) {
        // Enclosing signatures cover the content the caller skipped.
        if self.tap.is_some() {
            if let Err(err) = io::copy(self, &mut io::sink()) {
                warn!("skipping literal data: {}", err);
            }
        }
    }
}

impl Read for LiteralMessage<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.body.read(buf)?;
        if let Some(tap) = &mut self.tap {
            if n == 0 && !buf.is_empty() {
                tap.finish();
            } else {
                tap.update(&buf[..n]);
            }
        }
        Ok(n)
    }
}

/// A compressed layer, inflated while the inner layer is read.
#[derive(derive_more::Debug)]
pub struct CompressedMessage<'a> {
    alg: CompressionAlgorithm,
    #[debug(skip)]
    reader: BufReader<Decompressor<PacketBodyReader<Source<'a>>>>,
    #[debug(skip)]
    tap: Option<&'a mut dyn LiteralTap>,
}

impl CompressedMessage<'_> {
    pub fn algorithm(&self) -> CompressionAlgorithm {
        self.alg
    }

    pub fn read_message(&mut self) -> Result<PgpMessage<'_>> {
        PgpMessage::next_layer(Box::new(&mut self.reader), reborrow(&mut self.tap))
    }
}

impl Drop for CompressedMessage<'_> {
    fn drop(&mut self) {
        let Some(tap) = &self.tap else {
            return;
        };
        if !tap.is_done() {
            if let Err(err) = self.read_message() {
                warn!("skipping compressed content: {}", err);
            }
        }
        // The enclosing signature packet follows the compressed packet.
        if let Err(err) = self.reader.get_mut().get_mut().drain() {
            warn!("skipping compressed data: {}", err);
        }
    }
}

/// Hashes literal content for one signature and passes it on to outer ones.
struct SignatureTap<'a> {
    hasher: SignatureHasher,
    parent: Option<&'a mut dyn LiteralTap>,
    done: bool,
}

impl<'a> SignatureTap<'a> {
    fn new(hasher: SignatureHasher, parent: Option<&'a mut dyn LiteralTap>) -> Self {
        SignatureTap {
            hasher,
            parent,
            done: false,
        }
    }
}

impl LiteralTap for SignatureTap<'_> {
    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        if let Some(parent) = &mut self.parent {
            parent.update(data);
        }
    }

    fn finish(&mut self) {
        self.done = true;
        if let Some(parent) = &mut self.parent {
            parent.finish();
        }
    }

    fn is_done(&self) -> bool {
        self.done
    }
}

/// A signed layer, either one-pass (signature behind the data) or with the
/// signature in front.
#[derive(derive_more::Debug)]
pub struct SignedMessage<'a> {
    ops: Option<OnePassSignature>,
    signature: Option<Signature>,
    #[debug(skip)]
    source: Source<'a>,
    #[debug(skip)]
    tap: SignatureTap<'a>,
}

impl SignedMessage<'_> {
    /// The one-pass signature packet, if the message uses that layout.
    pub fn one_pass_signature(&self) -> Option<&OnePassSignature> {
        self.ops.as_ref()
    }

    pub fn read_message(&mut self) -> Result<PgpMessage<'_>> {
        let tap: &mut dyn LiteralTap = &mut self.tap;
        PgpMessage::next_layer(Box::new(&mut self.source), Some(tap))
    }

    /// The signature, reading it from behind the data for one-pass layouts.
    pub fn signature(&mut self) -> Result<&Signature> {
        self.load_signature()?;
        match &self.signature {
            Some(signature) => Ok(signature),
            None => invalid_op!("no signature"),
        }
    }

    fn load_signature(&mut self) -> Result<()> {
        if self.signature.is_some() {
            return Ok(());
        }
        if !self.tap.done {
            invalid_op!("signed content has not been read completely");
        }
        let header = PacketHeader::try_from_reader(&mut self.source)?;
        let Packet::Signature(signature) = read_packet(header, &mut self.source)? else {
            malformed!("expected a signature packet, found {:?}", header.tag());
        };
        if let Some(ops) = &self.ops {
            ensure_eq!(ops.typ, signature.typ(), "signature type");
            ensure_eq!(ops.hash_algorithm, signature.hash_alg(), "signature hash algorithm");
            if ops.key_id != signature.issuer().unwrap_or(ops.key_id) {
                warn!("one-pass signature issuer {} differs from signature", ops.key_id);
            }
        }
        self.signature = Some(signature);
        Ok(())
    }

    /// Checks the signature over the literal content read so far.
    ///
    /// The content has to be drained first.
    pub fn verify(&mut self, key: &PublicKey) -> Result<bool> {
        if !self.tap.done {
            invalid_op!("signed content has not been read completely");
        }
        self.load_signature()?;
        match &self.signature {
            Some(signature) => signature.verify_hasher(key, self.tap.hasher.clone()),
            None => invalid_op!("no signature"),
        }
    }
}

impl Drop for SignedMessage<'_> {
    fn drop(&mut self) {
        // Nested one-pass signatures end in reverse order, so the enclosing layer
        // reads on only once this trailing signature is out of the way.
        if self.tap.parent.is_none() {
            return;
        }
        if !self.tap.done {
            if let Err(err) = self.read_message() {
                warn!("skipping signed content: {}", err);
                return;
            }
        }
        if let Err(err) = self.load_signature() {
            warn!("skipping nested signature: {}", err);
        }
    }
}

#[derive(Debug)]
enum Esk {
    Password(SymKeyEncryptedSessionKey),
    PublicKey(PublicKeyEncryptedSessionKey),
}

type SessionKey = (SymmetricKeyAlgorithm, Zeroizing<Vec<u8>>);

type DecryptedSource<'a> =
    BufReader<DataDecryptor<io::Chain<io::Cursor<Vec<u8>>, PacketBodyReader<Source<'a>>>>>;

enum EncryptedState<'a> {
    Sealed(PacketBodyReader<Source<'a>>),
    Open(DecryptedSource<'a>),
    /// Only seen if building the decryptor failed half way.
    Broken,
}

/// An encrypted layer: session key packets and the encrypted data.
#[derive(derive_more::Debug)]
pub struct EncryptedMessage<'a> {
    esks: Vec<Esk>,
    protected: bool,
    #[debug(skip)]
    state: EncryptedState<'a>,
    #[debug(skip)]
    tap: Option<&'a mut dyn LiteralTap>,
}

impl<'a> EncryptedMessage<'a> {
    fn new(
        mut header: PacketHeader,
        mut source: Source<'a>,
        tap: Option<&'a mut dyn LiteralTap>,
    ) -> Result<Self> {
        let mut esks = Vec::new();
        loop {
            match header.tag() {
                Tag::SymEncryptedData | Tag::SymEncryptedProtectedData => break,
                Tag::PublicKeyEncryptedSessionKey
                | Tag::SymKeyEncryptedSessionKey
                | Tag::Marker => match read_packet(header, &mut source)? {
                    Packet::PublicKeyEncryptedSessionKey(p) => esks.push(Esk::PublicKey(p)),
                    Packet::SymKeyEncryptedSessionKey(p) => esks.push(Esk::Password(p)),
                    _ => {}
                },
                tag => malformed!("unexpected {:?} packet in an encrypted message", tag),
            }
            header = PacketHeader::try_from_reader(&mut source)?;
        }

        let protected = header.tag() == Tag::SymEncryptedProtectedData;
        let mut body = PacketBodyReader::new(header, source)?;
        if protected {
            let version = body.read_u8()?;
            if version != SEIPD_VERSION {
                return Err(Error::UnsupportedVersion {
                    message: format!("integrity protected data version {version}"),
                });
            }
        }
        debug!("{} session key packets, protected: {}", esks.len(), protected);

        Ok(EncryptedMessage {
            esks,
            protected,
            state: EncryptedState::Sealed(body),
            tap,
        })
    }

    /// True for SEIPD, where tampering is detected.
    pub fn is_integrity_protected(&self) -> bool {
        self.protected
    }

    pub fn password_packets(&self) -> impl Iterator<Item = &SymKeyEncryptedSessionKey> {
        self.esks.iter().filter_map(|esk| match esk {
            Esk::Password(p) => Some(p),
            Esk::PublicKey(_) => None,
        })
    }

    pub fn public_key_packets(&self) -> impl Iterator<Item = &PublicKeyEncryptedSessionKey> {
        self.esks.iter().filter_map(|esk| match esk {
            Esk::PublicKey(p) => Some(p),
            Esk::Password(_) => None,
        })
    }

    /// Decrypts with a passphrase and returns the inner layer.
    ///
    /// Messages without any session key packet use IDEA keyed with the MD5 of the
    /// passphrase.
    pub fn decrypt_message(&mut self, passphrase: &[u8]) -> Result<PgpMessage<'_>> {
        let mut candidates = Vec::new();
        let mut last_err = None;
        if self.esks.is_empty() {
            let alg = SymmetricKeyAlgorithm::IDEA;
            candidates.push((alg, StringToKey::legacy_key(passphrase, alg)?));
        }
        for skesk in self.password_packets() {
            match skesk.decrypt(passphrase) {
                Ok(candidate) => candidates.push(candidate),
                Err(err) => last_err = Some(err),
            }
        }
        self.unlock(candidates, last_err)?;
        self.read_message()
    }

    /// Decrypts with the session key packet addressed to `key` and returns the inner
    /// layer. Wildcard recipients are tried as well.
    pub fn decrypt_message_with_key(&mut self, key: &PrivateKey) -> Result<PgpMessage<'_>> {
        let key_id = key.key_id();
        let mut candidates = Vec::new();
        let mut last_err = None;
        for pkesk in self.public_key_packets() {
            if pkesk.key_id() != key_id && !pkesk.key_id().is_wildcard() {
                continue;
            }
            match pkesk.decrypt(key) {
                Ok(candidate) => candidates.push(candidate),
                Err(err) => {
                    debug!("session key packet for {}: {:?}", pkesk.key_id(), err);
                    last_err = Some(err);
                }
            }
        }
        if candidates.is_empty() && last_err.is_none() {
            invalid_op!("no session key packet for key {}", key_id);
        }
        self.unlock(candidates, last_err)?;
        self.read_message()
    }

    /// Picks the first candidate that passes the quick check and sets up decryption.
    fn unlock(&mut self, candidates: Vec<SessionKey>, mut last_err: Option<Error>) -> Result<()> {
        let EncryptedState::Sealed(body) = &mut self.state else {
            invalid_op!("message already decrypted");
        };

        let mut prefix = Vec::with_capacity(MAX_PREFIX_LEN);
        body.take(MAX_PREFIX_LEN as u64).read_to_end(&mut prefix)?;

        let mut chosen = None;
        for (alg, key) in candidates {
            let len = alg.block_size() + 2;
            if prefix.len() < len {
                last_err = Some(Error::UnexpectedEndOfStream);
                continue;
            }
            match check_prefix(alg, &key, &prefix[..len]) {
                Ok(_) => {
                    chosen = Some((alg, key));
                    break;
                }
                Err(err) => last_err = Some(err),
            }
        }
        let Some((alg, key)) = chosen else {
            return Err(last_err.unwrap_or_else(|| Error::InvalidOperation {
                message: "no session key available".to_string(),
            }));
        };
        debug!("session key found, {:?}", alg);

        let EncryptedState::Sealed(body) = std::mem::replace(&mut self.state, EncryptedState::Broken)
        else {
            invalid_op!("message already decrypted");
        };
        let len = alg.block_size() + 2;
        let rest = io::Cursor::new(prefix[len..].to_vec());
        let decryptor = DataDecryptor::new(rest.chain(body), alg, &key, &prefix[..len], self.protected)?;
        self.state = EncryptedState::Open(BufReader::new(decryptor));
        Ok(())
    }

    /// The inner layer of a decrypted message.
    pub fn read_message(&mut self) -> Result<PgpMessage<'_>> {
        match &mut self.state {
            EncryptedState::Open(reader) => {
                PgpMessage::next_layer(Box::new(reader), reborrow(&mut self.tap))
            }
            EncryptedState::Sealed(_) => invalid_op!("message is still encrypted"),
            EncryptedState::Broken => invalid_op!("message could not be decrypted"),
        }
    }
}

impl Drop for EncryptedMessage<'_> {
    fn drop(&mut self) {
        let Some(tap) = &self.tap else {
            return;
        };
        if !tap.is_done() && matches!(self.state, EncryptedState::Open(_)) {
            if let Err(err) = self.read_message() {
                warn!("skipping decrypted content: {}", err);
            }
        }
        let drained = match &mut self.state {
            EncryptedState::Sealed(body) => body.drain(),
            EncryptedState::Open(reader) => reader.get_mut().get_mut().get_mut().1.drain(),
            EncryptedState::Broken => Ok(0),
        };
        if let Err(err) = drained {
            warn!("skipping encrypted data: {}", err);
        }
    }
}

/// A marker packet in front of the actual message.
#[derive(derive_more::Debug)]
pub struct MarkerMessage<'a> {
    #[debug(skip)]
    source: Source<'a>,
    #[debug(skip)]
    tap: Option<&'a mut dyn LiteralTap>,
}

impl MarkerMessage<'_> {
    /// The layer behind the marker.
    pub fn read_message(&mut self) -> Result<PgpMessage<'_>> {
        PgpMessage::next_layer(Box::new(&mut self.source), reborrow(&mut self.tap))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::composed::{
        CompressedDataGenerator, EncryptedMessageGenerator, LiteralDataGenerator,
        SignedMessageGenerator,
    };
    use crate::crypto::hash::HashAlgorithm;
    use crate::crypto::public_key::PublicKeyAlgorithm;
    use crate::crypto::{ecdh, eddsa, Signer};
    use crate::packet::{DataMode, Marker, PacketSink, PacketWriter, SignatureConfig, UserId};

    fn literal(data: &[u8]) -> Vec<u8> {
        let header = LiteralDataHeader::new(DataMode::Binary, "msg.txt", Utc::now());
        let mut literal =
            LiteralDataGenerator::open(PacketWriter::new(Vec::new()), &header, None).unwrap();
        literal.write_all(data).unwrap();
        literal.finish().unwrap().finish().unwrap()
    }

    fn signing_key(seed: u64) -> PrivateKey {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let (public, secret) = eddsa::generate_key(&mut rng);
        let public = PublicKey::new(PublicKeyAlgorithm::EdDSALegacy, Utc::now(), public);
        PrivateKey::new(public, &secret).unwrap()
    }

    #[test]
    fn plain_literal() {
        let raw = literal(b"hello");
        let mut message = PgpMessage::from_bytes(&raw).unwrap();
        let PgpMessage::Literal(literal) = &mut message else {
            panic!("expected literal data");
        };
        assert_eq!(&literal.header().file_name[..], b"msg.txt");
        assert_eq!(literal.data().unwrap(), b"hello");
        assert!(message.read_message().is_err());
    }

    #[test]
    fn marker_is_skipped() {
        let mut writer = PacketWriter::new(Vec::new());
        writer.write_packet(&Marker).unwrap();
        let mut raw = writer.finish().unwrap();
        raw.extend(literal(b"behind a marker"));

        let mut message = PgpMessage::from_bytes(&raw).unwrap();
        assert!(matches!(message, PgpMessage::Marker(_)));
        let PgpMessage::Literal(mut literal) = message.read_message().unwrap() else {
            panic!("expected literal data");
        };
        assert_eq!(literal.data().unwrap(), b"behind a marker");
    }

    #[test]
    fn signed_text_is_canonicalized() {
        let key = signing_key(5);
        let header = LiteralDataHeader::new(DataMode::Text, "", Utc::now());
        let signed = SignedMessageGenerator::open(
            PacketWriter::new(Vec::new()),
            &key,
            SignatureType::Text,
            HashAlgorithm::Sha256,
        )
        .unwrap();
        let mut literal = LiteralDataGenerator::open(signed, &header, None).unwrap();
        literal.write_all(b"line one\nline two\n").unwrap();
        let raw = literal.finish().unwrap().finish().unwrap().finish().unwrap();

        let mut message = PgpMessage::from_bytes(&raw).unwrap();
        let PgpMessage::Signed(signed) = &mut message else {
            panic!("expected a signed message");
        };
        assert!(signed.verify(key.public_key()).is_err(), "content not read yet");
        {
            let PgpMessage::Literal(mut literal) = signed.read_message().unwrap() else {
                panic!("expected literal data");
            };
            assert_eq!(literal.data().unwrap(), b"line one\nline two\n");
        }
        assert!(signed.verify(key.public_key()).unwrap());
        assert!(!signed.verify(signing_key(6).public_key()).unwrap());

        // The same text with CRLF line endings carries the same signature.
        let signature = signed.signature().unwrap().clone();
        assert!(signature
            .verify(key.public_key(), &b"line one\r\nline two\r\n"[..])
            .unwrap());
    }

    #[test]
    fn prefix_signature_layout() {
        let key = signing_key(7);
        let config = SignatureConfig::for_key(
            SignatureType::Binary,
            key.public_key(),
            HashAlgorithm::Sha256,
            Utc::now(),
        )
        .unwrap();
        let signature = config.sign(&key, &b"old style"[..]).unwrap();

        let mut writer = PacketWriter::new(Vec::new());
        writer.write_packet(&signature).unwrap();
        let mut raw = writer.finish().unwrap();
        raw.extend(literal(b"old style"));

        let mut message = PgpMessage::from_bytes(&raw).unwrap();
        let PgpMessage::Signed(signed) = &mut message else {
            panic!("expected a signed message");
        };
        assert!(signed.one_pass_signature().is_none());
        {
            let PgpMessage::Literal(mut literal) = signed.read_message().unwrap() else {
                panic!("expected literal data");
            };
            literal.data().unwrap();
        }
        assert!(signed.verify(key.public_key()).unwrap());
    }

    #[test]
    fn outer_signature_after_partly_read_inner_layer() {
        let outer_key = signing_key(9);
        let inner_key = signing_key(10);
        let outer = SignedMessageGenerator::open(
            PacketWriter::new(Vec::new()),
            &outer_key,
            SignatureType::Binary,
            HashAlgorithm::Sha256,
        )
        .unwrap();
        let inner =
            SignedMessageGenerator::open(outer, &inner_key, SignatureType::Text, HashAlgorithm::Sha512)
                .unwrap();
        let header = LiteralDataHeader::new(DataMode::Binary, "", Utc::now());
        let mut literal = LiteralDataGenerator::open(inner, &header, None).unwrap();
        literal.write_all(b"read only in part").unwrap();
        let raw = literal.finish().unwrap().finish().unwrap().finish().unwrap().finish().unwrap();

        let mut message = PgpMessage::from_bytes(&raw).unwrap();
        let PgpMessage::Signed(signed) = &mut message else {
            panic!("expected a signed message");
        };
        {
            let PgpMessage::Signed(mut inner) = signed.read_message().unwrap() else {
                panic!("expected a nested signed message");
            };
            let PgpMessage::Literal(mut literal) = inner.read_message().unwrap() else {
                panic!("expected literal data");
            };
            let mut start = [0u8; 4];
            literal.read_exact(&mut start).unwrap();
            assert_eq!(&start, b"read");
        }
        let signature = signed.signature().unwrap();
        assert_eq!(signature.hash_alg(), HashAlgorithm::Sha256);
        assert_eq!(signature.typ(), SignatureType::Binary);
        assert!(signed.verify(outer_key.public_key()).unwrap());
    }

    #[test]
    fn public_key_encryption() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let (public, secret) =
            ecdh::generate_key(&mut rng, HashAlgorithm::Sha256, SymmetricKeyAlgorithm::AES128);
        let public = PublicKey::new(PublicKeyAlgorithm::ECDH, Utc::now(), public);
        let key = PrivateKey::new(public.clone(), &secret).unwrap();

        let mut generator = EncryptedMessageGenerator::new(SymmetricKeyAlgorithm::AES256, true);
        generator.add_public_key(&public, true);
        generator.add_password(b"fallback", HashAlgorithm::Sha256);
        let encrypted = generator
            .open(&mut rng, PacketWriter::new(Vec::new()))
            .unwrap();
        let mut compressed =
            CompressedDataGenerator::open(encrypted, CompressionAlgorithm::ZLIB).unwrap();
        let header = LiteralDataHeader::new(DataMode::Binary, "", Utc::now());
        let mut literal = LiteralDataGenerator::open(&mut compressed, &header, None).unwrap();
        literal.write_all(&[0x55; 5000]).unwrap();
        literal.finish().unwrap();
        let raw = compressed.finish().unwrap().finish().unwrap().finish().unwrap();

        for by_key in [true, false] {
            let mut message = PgpMessage::from_bytes(&raw).unwrap();
            let PgpMessage::Encrypted(encrypted) = &mut message else {
                panic!("expected an encrypted message");
            };
            assert_eq!(encrypted.public_key_packets().count(), 1);
            assert_eq!(encrypted.password_packets().count(), 1);
            let mut inner = if by_key {
                encrypted.decrypt_message_with_key(&key).unwrap()
            } else {
                encrypted.decrypt_message(b"fallback").unwrap()
            };
            let PgpMessage::Compressed(compressed) = &mut inner else {
                panic!("expected compressed data");
            };
            let PgpMessage::Literal(mut literal) = compressed.read_message().unwrap() else {
                panic!("expected literal data");
            };
            assert_eq!(literal.data().unwrap(), vec![0x55; 5000]);
        }
    }

    #[test]
    fn decrypt_twice_fails() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut generator = EncryptedMessageGenerator::new(SymmetricKeyAlgorithm::AES128, true);
        generator.add_password(b"pw", HashAlgorithm::Sha256);
        let mut encrypted = generator
            .open(&mut rng, PacketWriter::new(Vec::new()))
            .unwrap();
        let header = LiteralDataHeader::new(DataMode::Binary, "", Utc::now());
        let mut literal = LiteralDataGenerator::open(&mut encrypted, &header, None).unwrap();
        literal.write_all(b"x").unwrap();
        literal.finish().unwrap();
        let raw = encrypted.finish().unwrap().finish().unwrap();

        let mut message = PgpMessage::from_bytes(&raw).unwrap();
        let PgpMessage::Encrypted(encrypted) = &mut message else {
            panic!("expected an encrypted message");
        };
        encrypted.decrypt_message(b"pw").unwrap();
        assert!(encrypted.decrypt_message(b"pw").is_err());
        assert!(encrypted.read_message().is_ok());
    }

    #[test]
    fn unexpected_first_packet() {
        let raw = {
            let mut writer = PacketWriter::new(Vec::new());
            writer
                .write_packet(&UserId::from_str("Alice"))
                .unwrap();
            writer.finish().unwrap()
        };
        assert!(matches!(
            PgpMessage::from_bytes(&raw),
            Err(Error::MalformedPacket { .. })
        ));
    }
}
