use std::io::{self, BufRead};

use byteorder::WriteBytesExt;
use bytes::Bytes;

use crate::crypto::ecc_curve::EccCurve;
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::Result;
use crate::parsing_reader::BufReadParsing;
use crate::ser::Serialize;
use crate::types::Mpi;

/// Algorithm specific public key material.
#[derive(PartialEq, Eq, Clone, derive_more::Debug)]
pub enum PublicParams {
    RSA {
        n: Mpi,
        e: Mpi,
    },
    DSA {
        p: Mpi,
        q: Mpi,
        g: Mpi,
        y: Mpi,
    },
    ECDSA {
        curve: EccCurve,
        /// SEC1 encoded point.
        p: Mpi,
    },
    ECDH {
        curve: EccCurve,
        /// Public point, `0x40 ‖ u` for Curve25519.
        p: Mpi,
        hash: HashAlgorithm,
        alg_sym: SymmetricKeyAlgorithm,
    },
    EdDSALegacy {
        curve: EccCurve,
        q: Mpi,
    },
    Elgamal {
        p: Mpi,
        g: Mpi,
        y: Mpi,
    },
    Unknown {
        #[debug("{}", hex::encode(data))]
        data: Bytes,
    },
}

impl PublicParams {
    /// Parses the public parameters of a key with algorithm `typ`.
    ///
    /// The reader must be limited to the parameters, unknown algorithms take all of it.
    pub fn try_from_reader<B: BufRead>(typ: PublicKeyAlgorithm, mut i: B) -> Result<Self> {
        let params = match typ {
            PublicKeyAlgorithm::RSA | PublicKeyAlgorithm::RSAEncrypt | PublicKeyAlgorithm::RSASign => {
                PublicParams::RSA {
                    n: Mpi::try_from_reader(&mut i)?,
                    e: Mpi::try_from_reader(&mut i)?,
                }
            }
            PublicKeyAlgorithm::DSA => PublicParams::DSA {
                p: Mpi::try_from_reader(&mut i)?,
                q: Mpi::try_from_reader(&mut i)?,
                g: Mpi::try_from_reader(&mut i)?,
                y: Mpi::try_from_reader(&mut i)?,
            },
            PublicKeyAlgorithm::ECDSA => PublicParams::ECDSA {
                curve: read_curve(&mut i)?,
                p: Mpi::try_from_reader(&mut i)?,
            },
            PublicKeyAlgorithm::ECDH => {
                let curve = read_curve(&mut i)?;
                let p = Mpi::try_from_reader(&mut i)?;
                let kdf_len = i.read_u8()?;
                ensure_eq!(kdf_len, 3, "ECDH KDF parameter length");
                let reserved = i.read_u8()?;
                ensure_eq!(reserved, 1, "ECDH KDF parameter version");
                PublicParams::ECDH {
                    curve,
                    p,
                    hash: i.read_u8()?.into(),
                    alg_sym: i.read_u8()?.into(),
                }
            }
            PublicKeyAlgorithm::EdDSALegacy => PublicParams::EdDSALegacy {
                curve: read_curve(&mut i)?,
                q: Mpi::try_from_reader(&mut i)?,
            },
            PublicKeyAlgorithm::Elgamal | PublicKeyAlgorithm::ElgamalEncrypt => {
                PublicParams::Elgamal {
                    p: Mpi::try_from_reader(&mut i)?,
                    g: Mpi::try_from_reader(&mut i)?,
                    y: Mpi::try_from_reader(&mut i)?,
                }
            }
            _ => PublicParams::Unknown { data: i.rest()? },
        };
        Ok(params)
    }

    /// The curve of elliptic curve keys.
    pub fn curve(&self) -> Option<&EccCurve> {
        match self {
            PublicParams::ECDSA { curve, .. }
            | PublicParams::ECDH { curve, .. }
            | PublicParams::EdDSALegacy { curve, .. } => Some(curve),
            _ => None,
        }
    }
}

fn read_curve<B: BufRead>(mut i: B) -> Result<EccCurve> {
    let len = i.read_u8()?;
    ensure!(len != 0 && len != 0xFF, "reserved curve OID length {}", len);
    let oid = i.take_bytes(len.into())?;
    Ok(EccCurve::from_oid(&oid))
}

fn write_curve<W: io::Write>(curve: &EccCurve, w: &mut W) -> Result<()> {
    let oid = curve.oid();
    w.write_u8(u8::try_from(oid.len())?)?;
    w.write_all(oid)?;
    Ok(())
}

impl Serialize for PublicParams {
    fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        match self {
            PublicParams::RSA { n, e } => {
                n.to_writer(w)?;
                e.to_writer(w)?;
            }
            PublicParams::DSA { p, q, g, y } => {
                [p, q, g, y].to_writer(w)?;
            }
            PublicParams::ECDSA { curve, p } => {
                write_curve(curve, w)?;
                p.to_writer(w)?;
            }
            PublicParams::ECDH {
                curve,
                p,
                hash,
                alg_sym,
            } => {
                write_curve(curve, w)?;
                p.to_writer(w)?;
                w.write_all(&[3, 1, (*hash).into(), (*alg_sym).into()])?;
            }
            PublicParams::EdDSALegacy { curve, q } => {
                write_curve(curve, w)?;
                q.to_writer(w)?;
            }
            PublicParams::Elgamal { p, g, y } => {
                [p, g, y].to_writer(w)?;
            }
            PublicParams::Unknown { data } => w.write_all(data)?,
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        match self {
            PublicParams::RSA { n, e } => n.write_len() + e.write_len(),
            PublicParams::DSA { p, q, g, y } => [p, q, g, y].write_len(),
            PublicParams::ECDSA { curve, p } => 1 + curve.oid().len() + p.write_len(),
            PublicParams::ECDH { curve, p, .. } => 1 + curve.oid().len() + p.write_len() + 4,
            PublicParams::EdDSALegacy { curve, q } => 1 + curve.oid().len() + q.write_len(),
            PublicParams::Elgamal { p, g, y } => [p, g, y].write_len(),
            PublicParams::Unknown { data } => data.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecdh_roundtrip() {
        let params = PublicParams::ECDH {
            curve: EccCurve::Curve25519,
            p: Mpi::from_slice(&[0x40; 33]),
            hash: HashAlgorithm::Sha256,
            alg_sym: SymmetricKeyAlgorithm::AES128,
        };
        let raw = params.to_bytes().unwrap();
        assert_eq!(raw.len(), params.write_len());
        assert_eq!(&raw[raw.len() - 4..], &[3, 1, 8, 7]);
        let back = PublicParams::try_from_reader(PublicKeyAlgorithm::ECDH, &raw[..]).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn bad_kdf_params() {
        let mut raw = PublicParams::ECDH {
            curve: EccCurve::P256,
            p: Mpi::from_slice(&[4, 1, 2]),
            hash: HashAlgorithm::Sha256,
            alg_sym: SymmetricKeyAlgorithm::AES128,
        }
        .to_bytes()
        .unwrap();
        let n = raw.len();
        raw[n - 3] = 2;
        assert!(PublicParams::try_from_reader(PublicKeyAlgorithm::ECDH, &raw[..]).is_err());
    }

    #[test]
    fn unknown_algorithm_keeps_bytes() {
        let raw = [1u8, 2, 3, 4];
        let params = PublicParams::try_from_reader(PublicKeyAlgorithm::Other(99), &raw[..]).unwrap();
        assert_eq!(params.to_bytes().unwrap(), raw);
    }
}
