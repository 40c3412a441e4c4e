use std::io::{self, BufRead};

use bytes::Bytes;

use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::Result;
use crate::parsing_reader::BufReadParsing;
use crate::ser::Serialize;
use crate::types::Mpi;

/// Unencrypted secret key material, as stored inside a secret key packet.
///
/// Values are kept in their MPI form so re-encoding is byte exact.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub enum PlainSecretParams {
    RSA {
        #[debug("..")]
        d: Mpi,
        #[debug("..")]
        p: Mpi,
        #[debug("..")]
        q: Mpi,
        /// p⁻¹ mod q
        #[debug("..")]
        u: Mpi,
    },
    DSA(#[debug("..")] Mpi),
    ECDSA(#[debug("..")] Mpi),
    /// The scalar of Curve25519 keys is stored in reversed (big endian) order.
    ECDH(#[debug("..")] Mpi),
    EdDSALegacy(#[debug("..")] Mpi),
    Elgamal(#[debug("..")] Mpi),
    Unknown(#[debug("..")] Bytes),
}

impl PlainSecretParams {
    /// Parses the secret fields of a key with algorithm `alg`, without checksum.
    pub fn try_from_reader<B: BufRead>(alg: PublicKeyAlgorithm, mut i: B) -> Result<Self> {
        let params = match alg {
            PublicKeyAlgorithm::RSA | PublicKeyAlgorithm::RSAEncrypt | PublicKeyAlgorithm::RSASign => {
                PlainSecretParams::RSA {
                    d: Mpi::try_from_reader(&mut i)?,
                    p: Mpi::try_from_reader(&mut i)?,
                    q: Mpi::try_from_reader(&mut i)?,
                    u: Mpi::try_from_reader(&mut i)?,
                }
            }
            PublicKeyAlgorithm::DSA => PlainSecretParams::DSA(Mpi::try_from_reader(&mut i)?),
            PublicKeyAlgorithm::ECDSA => PlainSecretParams::ECDSA(Mpi::try_from_reader(&mut i)?),
            PublicKeyAlgorithm::ECDH => PlainSecretParams::ECDH(Mpi::try_from_reader(&mut i)?),
            PublicKeyAlgorithm::EdDSALegacy => {
                PlainSecretParams::EdDSALegacy(Mpi::try_from_reader(&mut i)?)
            }
            PublicKeyAlgorithm::Elgamal | PublicKeyAlgorithm::ElgamalEncrypt => {
                PlainSecretParams::Elgamal(Mpi::try_from_reader(&mut i)?)
            }
            _ => PlainSecretParams::Unknown(i.rest()?),
        };
        Ok(params)
    }

    /// The individual MPIs, in wire order.
    pub fn mpis(&self) -> Vec<&Mpi> {
        match self {
            PlainSecretParams::RSA { d, p, q, u } => vec![d, p, q, u],
            PlainSecretParams::DSA(x)
            | PlainSecretParams::ECDSA(x)
            | PlainSecretParams::ECDH(x)
            | PlainSecretParams::EdDSALegacy(x)
            | PlainSecretParams::Elgamal(x) => vec![x],
            PlainSecretParams::Unknown(_) => Vec::new(),
        }
    }
}

impl Serialize for PlainSecretParams {
    fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        match self {
            PlainSecretParams::Unknown(data) => w.write_all(data)?,
            _ => self.mpis().to_writer(w)?,
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        match self {
            PlainSecretParams::Unknown(data) => data.len(),
            _ => self.mpis().write_len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsa_fields_in_order() {
        let params = PlainSecretParams::RSA {
            d: Mpi::from_slice(&[1]),
            p: Mpi::from_slice(&[2]),
            q: Mpi::from_slice(&[3]),
            u: Mpi::from_slice(&[4]),
        };
        let raw = params.to_bytes().unwrap();
        assert_eq!(raw, [0, 1, 1, 0, 2, 2, 0, 2, 3, 0, 3, 4]);
        let back = PlainSecretParams::try_from_reader(PublicKeyAlgorithm::RSA, &raw[..]).unwrap();
        assert_eq!(back, params);
        assert_eq!(format!("{back:?}"), "RSA { d: .., p: .., q: .., u: .. }");
    }
}
