//! # Cryptography module
//!
//! Algorithm identifiers, symmetric primitives and the adapters between packet
//! material and the asymmetric backends.

use zeroize::Zeroizing;

use self::hash::HashAlgorithm;
use crate::errors::Result;
use crate::packet::{PkeskValues, PublicKey};
use crate::types::Mpi;

pub use self::private_key::{PrivateKey, SecretMaterial};

// Symmetric

pub mod sym;

// Encryption & Signing

pub mod dsa;
pub mod ecdh;
pub mod ecdsa;
pub mod eddsa;
pub mod rsa;

// Misc

pub mod checksum;
pub mod ecc_curve;
pub mod hash;
pub mod private_key;
pub mod public_key;

/// Keys that can produce signatures.
pub trait Signer {
    /// The public half, used for issuer information.
    fn public_key(&self) -> &PublicKey;

    /// Signs a finished digest, returning the algorithm specific signature values.
    fn sign(&self, hash: HashAlgorithm, digest: &[u8]) -> Result<Vec<Mpi>>;
}

/// Keys that can check signatures.
pub trait Verifier {
    /// `Ok(false)` for signatures that do not verify; errors for unusable keys or
    /// malformed signature values.
    fn verify(&self, hash: HashAlgorithm, digest: &[u8], signature: &[Mpi]) -> Result<bool>;
}

/// Keys that can recover session keys.
pub trait Decryptor {
    /// Returns the session info, `cipher ‖ key ‖ checksum`.
    fn decrypt_session_info(&self, values: &PkeskValues) -> Result<Zeroizing<Vec<u8>>>;
}
