use std::io::{self, BufRead};

use byteorder::{BigEndian, WriteBytesExt};
use bytes::Bytes;
use num_bigint::BigUint;

use crate::errors::Result;
use crate::parsing_reader::BufReadParsing;
use crate::ser::Serialize;

/// Largest MPI accepted on input, same limit as gnupg.
const MAX_EXTERN_MPI_BITS: u16 = 16384;

/// A multiprecision integer: two byte bit count followed by the big endian magnitude.
///
/// The stored bytes never carry leading zeros, so the encoding is always minimal.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-3.2>
#[derive(Default, Clone, PartialEq, Eq, Hash, derive_more::Debug)]
pub struct Mpi(#[debug("{}", hex::encode(_0))] Bytes);

impl Mpi {
    /// Interprets `raw` as an unsigned big endian number, without length prefix.
    pub fn from_slice(raw: &[u8]) -> Self {
        Mpi(Bytes::copy_from_slice(strip_leading_zeros(raw)))
    }

    /// Parses a length prefixed MPI.
    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        let len_bits = i.read_be_u16()?;
        ensure!(
            len_bits <= MAX_EXTERN_MPI_BITS,
            "mpi of {} bits exceeds the {} bit limit",
            len_bits,
            MAX_EXTERN_MPI_BITS
        );

        let len_bytes = (usize::from(len_bits) + 7) >> 3;
        let raw = i.take_bytes(len_bytes)?;
        let offset = raw.len() - strip_leading_zeros(&raw).len();

        Ok(Mpi(raw.slice(offset..)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of significant bits.
    pub fn bit_len(&self) -> usize {
        bit_size(&self.0)
    }

    /// The magnitude left padded with zeros to `len` bytes.
    ///
    /// Values longer than `len` are returned unchanged.
    pub fn to_padded(&self, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len.saturating_sub(self.0.len())];
        out.extend_from_slice(&self.0);
        out
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }
}

#[inline]
fn bit_size(val: &[u8]) -> usize {
    match val.first() {
        None => 0,
        Some(first) => val.len() * 8 - first.leading_zeros() as usize,
    }
}

#[inline]
pub(crate) fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    bytes
        .iter()
        .position(|b| *b != 0)
        .map_or(&[], |offset| &bytes[offset..])
}

impl AsRef<[u8]> for Mpi {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Mpi {
    fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        w.write_u16::<BigEndian>(u16::try_from(self.bit_len())?)?;
        w.write_all(&self.0)?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        2 + self.0.len()
    }
}

impl From<BigUint> for Mpi {
    fn from(other: BigUint) -> Self {
        Mpi::from(&other)
    }
}

impl From<&BigUint> for Mpi {
    fn from(other: &BigUint) -> Self {
        Mpi::from_slice(&other.to_bytes_be())
    }
}

impl From<&Mpi> for BigUint {
    fn from(other: &Mpi) -> Self {
        other.to_biguint()
    }
}
