use std::io::Write;

use chrono::Utc;
use pgpkit::composed::{
    CompressedDataGenerator, EncryptedMessageGenerator, LiteralDataGenerator, PgpMessage,
    SignedMessageGenerator,
};
use pgpkit::crypto::hash::HashAlgorithm;
use pgpkit::crypto::public_key::PublicKeyAlgorithm;
use pgpkit::crypto::sym::SymmetricKeyAlgorithm;
use pgpkit::crypto::{ecdh, eddsa, rsa, PrivateKey, Signer};
use pgpkit::errors::{Error, Result};
use pgpkit::packet::{
    DataMode, LiteralDataHeader, PacketHeader, PacketParser, PacketSink, PacketWriter,
    PacketTrait, PacketWriterConfigBuilder, PublicKey, SignatureType,
};
use pgpkit::types::{CompressionAlgorithm, PacketLength, Tag};
use pretty_assertions::assert_eq;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use testresult::TestResult;

fn header(mode: DataMode) -> LiteralDataHeader {
    LiteralDataHeader::new(mode, "", Utc::now())
}

fn write_literal<S: PacketSink>(sink: S, data: &[u8]) -> Result<S> {
    let mut literal = LiteralDataGenerator::open(sink, &header(DataMode::Binary), None)?;
    literal.write_all(data)?;
    literal.finish()
}

fn password_message(alg: SymmetricKeyAlgorithm, mdc: bool, data: &[u8]) -> Result<Vec<u8>> {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut generator = EncryptedMessageGenerator::new(alg, mdc);
    generator.add_password(b"correct horse", HashAlgorithm::Sha256);
    let encrypted = generator.open(&mut rng, PacketWriter::new(Vec::new()))?;
    write_literal(encrypted, data)?.finish()?.finish()
}

/// Decrypts a password protected literal message.
fn decrypt_literal(raw: &[u8], passphrase: &[u8]) -> Result<Vec<u8>> {
    let mut message = PgpMessage::from_bytes(raw)?;
    let PgpMessage::Encrypted(encrypted) = &mut message else {
        panic!("expected an encrypted message");
    };
    let mut inner = encrypted.decrypt_message(passphrase)?;
    let PgpMessage::Literal(literal) = &mut inner else {
        panic!("expected literal data");
    };
    literal.data()
}

#[test]
fn compressed_signed_literal() -> TestResult {
    let _ = pretty_env_logger::try_init();

    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let (public, secret) = rsa::generate_key(&mut rng, 1024)?;
    let key = PrivateKey::new(PublicKey::new(PublicKeyAlgorithm::RSA, Utc::now(), public), &secret)?;

    let compressed =
        CompressedDataGenerator::open(PacketWriter::new(Vec::new()), CompressionAlgorithm::ZIP)?;
    let signed =
        SignedMessageGenerator::open(compressed, &key, SignatureType::Binary, HashAlgorithm::Sha1)?;
    let raw = write_literal(signed, b"hello world!\n")?
        .finish()?
        .finish()?
        .finish()?;

    let mut message = PgpMessage::from_bytes(&raw)?;
    let PgpMessage::Compressed(compressed) = &mut message else {
        panic!("expected compressed data");
    };
    assert_eq!(compressed.algorithm(), CompressionAlgorithm::ZIP);

    let mut inner = compressed.read_message()?;
    let PgpMessage::Signed(signed) = &mut inner else {
        panic!("expected a signed message");
    };
    let ops = signed
        .one_pass_signature()
        .cloned()
        .expect("one-pass layout");
    assert_eq!(ops.hash_algorithm, HashAlgorithm::Sha1);
    assert_eq!(ops.key_id, key.key_id());
    assert!(ops.last);

    // Verification needs the content first.
    assert!(matches!(
        signed.verify(key.public_key()),
        Err(Error::InvalidOperation { .. })
    ));
    {
        let PgpMessage::Literal(mut literal) = signed.read_message()? else {
            panic!("expected literal data");
        };
        assert_eq!(literal.data()?, b"hello world!\n");
    }
    assert!(signed.verify(key.public_key())?);
    assert_eq!(signed.signature()?.hash_alg(), HashAlgorithm::Sha1);
    Ok(())
}

fn eddsa_key(seed: u64) -> Result<PrivateKey> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let (public, secret) = eddsa::generate_key(&mut rng);
    PrivateKey::new(
        PublicKey::new(PublicKeyAlgorithm::EdDSALegacy, Utc::now(), public),
        &secret,
    )
}

/// Signs a literal twice, the inner signature as canonical text.
fn doubly_signed(outer: &PrivateKey, inner: &PrivateKey, data: &[u8]) -> Result<Vec<u8>> {
    let signed = SignedMessageGenerator::open(
        PacketWriter::new(Vec::new()),
        outer,
        SignatureType::Binary,
        HashAlgorithm::Sha256,
    )?;
    let nested = SignedMessageGenerator::open(signed, inner, SignatureType::Text, HashAlgorithm::Sha512)?;
    write_literal(nested, data)?.finish()?.finish()?.finish()
}

#[test]
fn nested_signatures() -> TestResult {
    let _ = pretty_env_logger::try_init();

    let outer_key = eddsa_key(10)?;
    let inner_key = eddsa_key(11)?;
    let raw = doubly_signed(&outer_key, &inner_key, b"signed twice\n")?;

    // Only the outer signature is checked; the inner layer is left alone.
    let mut message = PgpMessage::from_bytes(&raw)?;
    let PgpMessage::Signed(outer) = &mut message else {
        panic!("expected a signed message");
    };
    {
        let PgpMessage::Signed(mut inner) = outer.read_message()? else {
            panic!("expected a nested signed message");
        };
        let PgpMessage::Literal(mut literal) = inner.read_message()? else {
            panic!("expected literal data");
        };
        assert_eq!(literal.data()?, b"signed twice\n");
    }
    assert!(outer.verify(outer_key.public_key())?);
    assert_eq!(outer.signature()?.issuer(), Some(outer_key.key_id()));

    // Both signatures, innermost first.
    let mut message = PgpMessage::from_bytes(&raw)?;
    let PgpMessage::Signed(outer) = &mut message else {
        panic!("expected a signed message");
    };
    {
        let PgpMessage::Signed(inner) = &mut outer.read_message()? else {
            panic!("expected a nested signed message");
        };
        assert_eq!(
            inner.one_pass_signature().map(|ops| ops.typ),
            Some(SignatureType::Text)
        );
        {
            let PgpMessage::Literal(mut literal) = inner.read_message()? else {
                panic!("expected literal data");
            };
            literal.data()?;
        }
        assert!(inner.verify(inner_key.public_key())?);
        assert!(!inner.verify(outer_key.public_key())?);
    }
    assert!(outer.verify(outer_key.public_key())?);
    assert!(!outer.verify(inner_key.public_key())?);

    // Skipping the inner layer entirely still leaves the outer one verifiable.
    let mut message = PgpMessage::from_bytes(&raw)?;
    let PgpMessage::Signed(outer) = &mut message else {
        panic!("expected a signed message");
    };
    drop(outer.read_message()?);
    assert!(outer.verify(outer_key.public_key())?);
    Ok(())
}

#[test]
fn signature_over_compressed_data() -> TestResult {
    let _ = pretty_env_logger::try_init();

    let key = eddsa_key(12)?;
    let signed = SignedMessageGenerator::open(
        PacketWriter::new(Vec::new()),
        &key,
        SignatureType::Binary,
        HashAlgorithm::Sha256,
    )?;
    let compressed = CompressedDataGenerator::open(signed, CompressionAlgorithm::ZLIB)?;
    let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
    let raw = write_literal(compressed, &data)?
        .finish()?
        .finish()?
        .finish()?;

    let tags: Vec<Tag> = PacketParser::new(&raw[..])
        .map(|packet| packet.map(|p| p.tag()))
        .collect::<Result<_>>()?;
    assert_eq!(
        tags,
        vec![Tag::OnePassSignature, Tag::CompressedData, Tag::Signature]
    );

    let mut message = PgpMessage::from_bytes(&raw)?;
    let PgpMessage::Signed(signed) = &mut message else {
        panic!("expected a signed message");
    };
    {
        let PgpMessage::Compressed(compressed) = &mut signed.read_message()? else {
            panic!("expected compressed data");
        };
        assert_eq!(compressed.algorithm(), CompressionAlgorithm::ZLIB);
        let PgpMessage::Literal(mut literal) = compressed.read_message()? else {
            panic!("expected literal data");
        };
        assert_eq!(literal.data()?, data);
    }
    assert!(signed.verify(key.public_key())?);
    assert!(!signed.verify(eddsa_key(13)?.public_key())?);
    Ok(())
}

#[test]
fn cast5_password_without_mdc() -> TestResult {
    let _ = pretty_env_logger::try_init();

    let raw = password_message(SymmetricKeyAlgorithm::CAST5, false, b"no integrity here")?;
    let tags: Vec<Tag> = PacketParser::new(&raw[..])
        .map(|packet| packet.map(|p| p.tag()))
        .collect::<Result<_>>()?;
    assert_eq!(tags, vec![Tag::SymKeyEncryptedSessionKey, Tag::SymEncryptedData]);

    assert_eq!(decrypt_literal(&raw, b"correct horse")?, b"no integrity here");
    assert!(matches!(
        decrypt_literal(&raw, b"battery staple"),
        Err(Error::WrongPassphrase { .. })
    ));
    Ok(())
}

#[test]
fn tampered_integrity_protected_data() -> TestResult {
    let _ = pretty_env_logger::try_init();

    let mut raw = password_message(SymmetricKeyAlgorithm::AES128, true, b"attack at dawn")?;
    assert_eq!(decrypt_literal(&raw, b"correct horse")?, b"attack at dawn");

    // The last byte belongs to the encrypted modification detection code.
    let last = raw.len() - 1;
    raw[last] ^= 0x80;
    assert!(matches!(
        decrypt_literal(&raw, b"correct horse"),
        Err(Error::MdcMismatch)
    ));
    Ok(())
}

#[test]
fn encrypted_compressed_signed_with_keys() -> TestResult {
    let _ = pretty_env_logger::try_init();

    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let (public, secret) = eddsa::generate_key(&mut rng);
    let signer = PrivateKey::new(
        PublicKey::new(PublicKeyAlgorithm::EdDSALegacy, Utc::now(), public),
        &secret,
    )?;
    let (public, secret) =
        ecdh::generate_key(&mut rng, HashAlgorithm::Sha256, SymmetricKeyAlgorithm::AES128);
    let recipient = PrivateKey::new(
        PublicKey::new(PublicKeyAlgorithm::ECDH, Utc::now(), public),
        &secret,
    )?;

    let mut generator = EncryptedMessageGenerator::new(SymmetricKeyAlgorithm::AES256, true);
    generator.add_public_key(recipient.public_key(), false);
    let encrypted = generator.open(&mut rng, PacketWriter::new(Vec::new()))?;
    let compressed = CompressedDataGenerator::open(encrypted, CompressionAlgorithm::ZLIB)?;
    let signed =
        SignedMessageGenerator::open(compressed, &signer, SignatureType::Binary, HashAlgorithm::Sha256)?;
    let data: Vec<u8> = (0..100_000u32).map(|i| (i * 7 % 256) as u8).collect();
    let raw = write_literal(signed, &data)?
        .finish()?
        .finish()?
        .finish()?
        .finish()?;

    let mut message = PgpMessage::from_bytes(&raw)?;
    let PgpMessage::Encrypted(encrypted) = &mut message else {
        panic!("expected an encrypted message");
    };
    assert!(encrypted.is_integrity_protected());
    let mut decrypted = encrypted.decrypt_message_with_key(&recipient)?;
    let PgpMessage::Compressed(compressed) = &mut decrypted else {
        panic!("expected compressed data");
    };
    let mut inner = compressed.read_message()?;
    let PgpMessage::Signed(signed) = &mut inner else {
        panic!("expected a signed message");
    };
    {
        let PgpMessage::Literal(mut literal) = signed.read_message()? else {
            panic!("expected literal data");
        };
        assert_eq!(literal.data()?, data);
    }
    assert!(signed.verify(signer.public_key())?);
    assert!(!signed.verify(recipient.public_key()).unwrap_or(false));
    Ok(())
}

#[test]
fn partial_chunks_round_trip() -> TestResult {
    let _ = pretty_env_logger::try_init();

    let config = PacketWriterConfigBuilder::default().chunk_size(512).build()?;
    let data: Vec<u8> = (0..5000u32).map(|i| i as u8).collect();
    let raw = write_literal(PacketWriter::with_config(Vec::new(), config), &data)?.finish()?;

    let first = PacketHeader::try_from_reader(&raw[..])?;
    assert_eq!(first.tag(), Tag::LiteralData);
    assert_eq!(first.packet_length(), PacketLength::Partial(512));

    let mut message = PgpMessage::from_bytes(&raw)?;
    let PgpMessage::Literal(literal) = &mut message else {
        panic!("expected literal data");
    };
    assert_eq!(literal.data()?, data);

    // A known length gives a single fixed length packet instead.
    let mut literal = LiteralDataGenerator::open(
        PacketWriter::with_config(Vec::new(), config),
        &header(DataMode::Binary),
        Some(data.len() as u64),
    )?;
    literal.write_all(&data)?;
    let raw = literal.finish()?.finish()?;
    assert!(matches!(
        PacketHeader::try_from_reader(&raw[..])?.packet_length(),
        PacketLength::Fixed(_)
    ));
    Ok(())
}

#[test]
fn text_literal_is_passed_through() -> TestResult {
    let _ = pretty_env_logger::try_init();

    let mut literal = LiteralDataGenerator::open(
        PacketWriter::new(Vec::new()),
        &LiteralDataHeader::new(DataMode::Text, "notes.txt", Utc::now()),
        None,
    )?;
    literal.write_all(b"line\r\nline\n")?;
    let raw = literal.finish()?.finish()?;

    let mut message = PgpMessage::from_bytes(&raw)?;
    let PgpMessage::Literal(literal) = &mut message else {
        panic!("expected literal data");
    };
    assert_eq!(literal.header().mode, DataMode::Text);
    assert_eq!(literal.data()?, b"line\r\nline\n");
    Ok(())
}

#[test]
fn generator_contracts() -> TestResult {
    let _ = pretty_env_logger::try_init();

    let mut rng = ChaCha8Rng::seed_from_u64(4);
    let mut generator = EncryptedMessageGenerator::new(SymmetricKeyAlgorithm::AES128, true);
    let err = generator
        .open(&mut rng, PacketWriter::new(Vec::new()))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "invalid operation: no encryption methods specified"
    );
    Ok(())
}
