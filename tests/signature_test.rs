use chrono::{SubsecRound, Utc};
use pgpkit::crypto::hash::HashAlgorithm;
use pgpkit::crypto::public_key::PublicKeyAlgorithm;
use pgpkit::crypto::{rsa, PrivateKey, Signer};
use pgpkit::packet::{PublicKey, Signature, SignatureConfig, SignatureType};
use pgpkit::ser::Serialize;
use pretty_assertions::assert_eq;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use testresult::TestResult;

fn rsa_key(seed: u64) -> TestResult<PrivateKey> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let (public, secret) = rsa::generate_key(&mut rng, 1024)?;
    let public = PublicKey::new(PublicKeyAlgorithm::RSA, Utc::now(), public);
    Ok(PrivateKey::new(public, &secret)?)
}

fn sign(key: &PrivateKey, typ: SignatureType, data: &[u8]) -> TestResult<Signature> {
    let config = SignatureConfig::for_key(
        typ,
        key.public_key(),
        HashAlgorithm::Sha256,
        Utc::now().trunc_subsecs(0),
    )?;
    Ok(config.sign(key, data)?)
}

#[test]
fn rsa_binary_signature() -> TestResult {
    let _ = pretty_env_logger::try_init();

    let key = rsa_key(1)?;
    let other = rsa_key(2)?;
    let signature = sign(&key, SignatureType::Binary, b"hello world!")?;

    assert_eq!(signature.issuer(), Some(key.key_id()));
    assert!(signature.verify(key.public_key(), &b"hello world!"[..])?);
    assert!(!signature.verify(other.public_key(), &b"hello world!"[..])?);

    let mut altered = b"hello world!".to_vec();
    for i in 0..altered.len() {
        altered[i] ^= 0x01;
        assert!(!signature.verify(key.public_key(), &altered[..])?);
        altered[i] ^= 0x01;
    }
    Ok(())
}

#[test]
fn signature_survives_serialization() -> TestResult {
    let _ = pretty_env_logger::try_init();

    let key = rsa_key(3)?;
    let signature = sign(&key, SignatureType::Binary, b"hello world!")?;
    let bytes = signature.to_bytes()?;
    assert_eq!(bytes.len(), signature.write_len());

    let parsed = Signature::try_from_reader(&bytes[..])?;
    assert_eq!(parsed, signature);
    assert!(parsed.verify(key.public_key(), &b"hello world!"[..])?);
    Ok(())
}

#[test]
fn canonical_text_signature() -> TestResult {
    let _ = pretty_env_logger::try_init();

    let key = rsa_key(4)?;
    let signature = sign(&key, SignatureType::Text, b"first\nsecond\n")?;

    // Line endings are normalized before hashing.
    for variant in [&b"first\r\nsecond\r\n"[..], b"first\rsecond\r", b"first\nsecond\n"] {
        assert!(signature.verify(key.public_key(), variant)?);
    }
    assert!(!signature.verify(key.public_key(), &b"first\nsecond"[..])?);

    // Trailing whitespace only counts unless the caller asks to ignore it.
    assert!(!signature.verify(key.public_key(), &b"first  \nsecond\t\n"[..])?);
    assert!(signature.verify_with_options(key.public_key(), &b"first  \nsecond\t\n"[..], true)?);

    // A binary signature does not normalize anything.
    let binary = sign(&key, SignatureType::Binary, b"first\nsecond\n")?;
    assert!(!binary.verify(key.public_key(), &b"first\r\nsecond\r\n"[..])?);
    Ok(())
}

#[test]
fn document_verification_rejects_key_signatures() -> TestResult {
    let _ = pretty_env_logger::try_init();

    let key = rsa_key(5)?;
    let config = SignatureConfig::for_key(
        SignatureType::Key,
        key.public_key(),
        HashAlgorithm::Sha256,
        Utc::now(),
    )?;
    let signature = config.sign_key(&key, key.public_key())?;
    assert!(signature.verify_key(key.public_key())?);
    assert!(signature.verify(key.public_key(), &b""[..]).is_err());
    Ok(())
}
