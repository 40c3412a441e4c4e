use std::io::{self, BufRead, Read, Write};

use byteorder::WriteBytesExt;
use bytes::Bytes;
use flate2::bufread::{DeflateDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, ZlibEncoder};
use flate2::Compression;

use crate::errors::Result;
use crate::packet::PacketTrait;
use crate::parsing_reader::BufReadParsing;
use crate::ser::Serialize;
use crate::types::{CompressionAlgorithm, Tag};

/// Compressed Data Packet, held in memory.
/// Ref: <https://www.rfc-editor.org/rfc/rfc4880.html#section-5.6>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct CompressedData {
    compression_algorithm: CompressionAlgorithm,
    #[debug("{} bytes", compressed_data.len())]
    compressed_data: Bytes,
}

impl CompressedData {
    pub fn try_from_reader<B: BufRead>(mut i: B) -> Result<Self> {
        let compression_algorithm = CompressionAlgorithm::from(i.read_u8()?);
        let compressed_data = i.rest()?;
        Ok(CompressedData {
            compression_algorithm,
            compressed_data,
        })
    }

    /// Compresses `data` in one go.
    pub fn compress(alg: CompressionAlgorithm, data: &[u8]) -> Result<Self> {
        let mut compressor = Compressor::new(alg, Vec::new())?;
        compressor.write_all(data)?;
        let compressed_data = compressor.finish()?.into();
        Ok(CompressedData {
            compression_algorithm: alg,
            compressed_data,
        })
    }

    pub fn algorithm(&self) -> CompressionAlgorithm {
        self.compression_algorithm
    }

    pub fn decompress(&self) -> Result<Decompressor<&[u8]>> {
        Decompressor::new(self.compression_algorithm, &self.compressed_data[..])
    }
}

impl Serialize for CompressedData {
    fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        w.write_u8(self.compression_algorithm.into())?;
        w.write_all(&self.compressed_data)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        1 + self.compressed_data.len()
    }
}

impl PacketTrait for CompressedData {
    fn tag(&self) -> Tag {
        Tag::CompressedData
    }
}

/// Inflates a compressed body as it is read.
#[derive(derive_more::Debug)]
pub enum Decompressor<R: BufRead> {
    Uncompressed(#[debug(skip)] R),
    Zip(#[debug(skip)] DeflateDecoder<R>),
    Zlib(#[debug(skip)] ZlibDecoder<R>),
    #[cfg(feature = "bzip2")]
    Bzip2(#[debug(skip)] bzip2::bufread::BzDecoder<R>),
}

impl<R: BufRead> Decompressor<R> {
    pub fn new(alg: CompressionAlgorithm, source: R) -> Result<Self> {
        let decompressor = match alg {
            CompressionAlgorithm::Uncompressed => Decompressor::Uncompressed(source),
            CompressionAlgorithm::ZIP => Decompressor::Zip(DeflateDecoder::new(source)),
            CompressionAlgorithm::ZLIB => Decompressor::Zlib(ZlibDecoder::new(source)),
            #[cfg(feature = "bzip2")]
            CompressionAlgorithm::BZip2 => {
                Decompressor::Bzip2(bzip2::bufread::BzDecoder::new(source))
            }
            alg => unsupported_err!("compression algorithm {:?}", alg),
        };
        Ok(decompressor)
    }

    /// The compressed input, positioned wherever inflating stopped.
    pub fn get_mut(&mut self) -> &mut R {
        match self {
            Decompressor::Uncompressed(r) => r,
            Decompressor::Zip(r) => r.get_mut(),
            Decompressor::Zlib(r) => r.get_mut(),
            #[cfg(feature = "bzip2")]
            Decompressor::Bzip2(r) => r.get_mut(),
        }
    }
}

impl<R: BufRead> Read for Decompressor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Decompressor::Uncompressed(r) => r.read(buf),
            Decompressor::Zip(r) => r.read(buf),
            Decompressor::Zlib(r) => r.read(buf),
            #[cfg(feature = "bzip2")]
            Decompressor::Bzip2(r) => r.read(buf),
        }
    }
}

/// Deflates everything written into it onto `W`.
#[derive(derive_more::Debug)]
pub enum Compressor<W: Write> {
    Uncompressed(#[debug(skip)] W),
    Zip(#[debug(skip)] DeflateEncoder<W>),
    Zlib(#[debug(skip)] ZlibEncoder<W>),
    #[cfg(feature = "bzip2")]
    Bzip2(#[debug(skip)] bzip2::write::BzEncoder<W>),
}

impl<W: Write> Compressor<W> {
    pub fn new(alg: CompressionAlgorithm, sink: W) -> Result<Self> {
        let compressor = match alg {
            CompressionAlgorithm::Uncompressed => Compressor::Uncompressed(sink),
            CompressionAlgorithm::ZIP => {
                Compressor::Zip(DeflateEncoder::new(sink, Compression::default()))
            }
            CompressionAlgorithm::ZLIB => {
                Compressor::Zlib(ZlibEncoder::new(sink, Compression::default()))
            }
            #[cfg(feature = "bzip2")]
            CompressionAlgorithm::BZip2 => {
                Compressor::Bzip2(bzip2::write::BzEncoder::new(sink, bzip2::Compression::default()))
            }
            alg => unsupported_err!("compression algorithm {:?}", alg),
        };
        Ok(compressor)
    }

    pub fn get_ref(&self) -> &W {
        match self {
            Compressor::Uncompressed(w) => w,
            Compressor::Zip(w) => w.get_ref(),
            Compressor::Zlib(w) => w.get_ref(),
            #[cfg(feature = "bzip2")]
            Compressor::Bzip2(w) => w.get_ref(),
        }
    }

    pub fn get_mut(&mut self) -> &mut W {
        match self {
            Compressor::Uncompressed(w) => w,
            Compressor::Zip(w) => w.get_mut(),
            Compressor::Zlib(w) => w.get_mut(),
            #[cfg(feature = "bzip2")]
            Compressor::Bzip2(w) => w.get_mut(),
        }
    }

    /// Writes the compression trailer and returns the sink.
    pub fn finish(self) -> Result<W> {
        let sink = match self {
            Compressor::Uncompressed(w) => w,
            Compressor::Zip(w) => w.finish()?,
            Compressor::Zlib(w) => w.finish()?,
            #[cfg(feature = "bzip2")]
            Compressor::Bzip2(w) => w.finish()?,
        };
        Ok(sink)
    }
}

impl<W: Write> Write for Compressor<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Compressor::Uncompressed(w) => w.write(buf),
            Compressor::Zip(w) => w.write(buf),
            Compressor::Zlib(w) => w.write(buf),
            #[cfg(feature = "bzip2")]
            Compressor::Bzip2(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Compressor::Uncompressed(w) => w.flush(),
            Compressor::Zip(w) => w.flush(),
            Compressor::Zlib(w) => w.flush(),
            #[cfg(feature = "bzip2")]
            Compressor::Bzip2(w) => w.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(alg: CompressionAlgorithm) {
        let data = b"hello hello hello hello hello world".repeat(20);
        let packet = CompressedData::compress(alg, &data).unwrap();
        let raw = packet.to_bytes().unwrap();
        let parsed = CompressedData::try_from_reader(&raw[..]).unwrap();
        assert_eq!(parsed.algorithm(), alg);

        let mut out = Vec::new();
        parsed.decompress().unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn zip() {
        roundtrip(CompressionAlgorithm::ZIP);
    }

    #[test]
    fn zlib() {
        roundtrip(CompressionAlgorithm::ZLIB);
    }

    #[test]
    fn uncompressed() {
        roundtrip(CompressionAlgorithm::Uncompressed);
    }

    #[cfg(feature = "bzip2")]
    #[test]
    fn bzip2() {
        roundtrip(CompressionAlgorithm::BZip2);
    }

    #[test]
    fn unknown_algorithm() {
        assert!(CompressedData::compress(CompressionAlgorithm::Other(9), b"x").is_err());
    }
}
