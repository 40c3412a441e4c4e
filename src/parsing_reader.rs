use std::io::{BufRead, Read};

use bytes::{BufMut, Bytes, BytesMut};

use crate::errors::{Error, Result};

/// Parsing helpers on top of [`BufRead`].
///
/// All reads are exact: running out of input yields [`Error::UnexpectedEndOfStream`].
pub trait BufReadParsing: BufRead + Sized {
    fn read_u8(&mut self) -> Result<u8> {
        let [b] = self.read_array::<1>()?;
        Ok(b)
    }

    fn read_be_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array::<2>()?))
    }

    fn read_be_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array::<4>()?))
    }

    fn has_remaining(&mut self) -> Result<bool> {
        Ok(!self.fill_buf()?.is_empty())
    }

    fn read_array<const C: usize>(&mut self) -> Result<[u8; C]> {
        let mut arr = [0u8; C];
        let mut filled = 0;

        while filled < C {
            let buf = self.fill_buf()?;
            if buf.is_empty() {
                return Err(Error::UnexpectedEndOfStream);
            }
            let n = (C - filled).min(buf.len());
            arr[filled..filled + n].copy_from_slice(&buf[..n]);
            filled += n;
            self.consume(n);
        }

        Ok(arr)
    }

    /// Reads exactly `size` bytes.
    fn take_bytes(&mut self, size: usize) -> Result<Bytes> {
        // Grow with the data actually present, a bogus length must not allocate upfront.
        let mut out = BytesMut::with_capacity(size.min(1024));

        while out.len() < size {
            let buf = self.fill_buf()?;
            if buf.is_empty() {
                return Err(Error::UnexpectedEndOfStream);
            }
            let n = (size - out.len()).min(buf.len());
            out.extend_from_slice(&buf[..n]);
            self.consume(n);
        }

        Ok(out.freeze())
    }

    /// Reads everything up to the end of the input.
    fn rest(&mut self) -> Result<Bytes> {
        let mut writer = BytesMut::new().writer();
        std::io::copy(self, &mut writer)?;
        Ok(writer.into_inner().freeze())
    }

    /// Consumes the remaining input, returning how many bytes were skipped.
    fn drain(&mut self) -> Result<u64> {
        Ok(std::io::copy(self, &mut std::io::sink())?)
    }

    fn read_tag<const C: usize>(&mut self, tag: &[u8; C]) -> Result<()> {
        let found = self.read_array::<C>()?;
        if &found != tag {
            return Err(Error::MalformedPacket {
                message: format!("expected {}, found {}", hex::encode(tag), hex::encode(found)),
            });
        }
        Ok(())
    }

    /// Reads a length prefixed (one byte) field.
    fn read_len_prefixed(&mut self) -> Result<Bytes> {
        let len = self.read_u8()?;
        self.take_bytes(len.into())
    }

    /// Limits the reader to the next `limit` bytes without consuming them upfront.
    fn read_take(&mut self, limit: u64) -> std::io::Take<&mut Self> {
        Read::take(self, limit)
    }
}

impl<B: BufRead> BufReadParsing for B {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_integers() {
        let mut input = &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07][..];
        assert_eq!(input.read_u8().unwrap(), 1);
        assert_eq!(input.read_be_u16().unwrap(), 0x0203);
        assert_eq!(input.read_be_u32().unwrap(), 0x04050607);
        assert!(!input.has_remaining().unwrap());
    }

    #[test]
    fn short_input_is_end_of_stream() {
        let mut input = &[0x01][..];
        assert!(matches!(
            input.read_be_u16(),
            Err(Error::UnexpectedEndOfStream)
        ));

        let mut input = &b"abc"[..];
        assert!(matches!(
            input.take_bytes(4),
            Err(Error::UnexpectedEndOfStream)
        ));
    }

    #[test]
    fn tag_mismatch() {
        let mut input = &b"GNV"[..];
        assert!(input.read_tag(b"GNU").is_err());
        let mut input = &b"GNU!"[..];
        input.read_tag(b"GNU").unwrap();
        assert_eq!(input.rest().unwrap(), &b"!"[..]);
    }
}
