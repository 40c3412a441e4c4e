//! Packet output: framing of whole packets and of streamed bodies.

use std::io::{self, Write};

use byteorder::WriteBytesExt;
use derive_builder::Builder;
use log::debug;

use crate::errors::{Error, Result};
use crate::packet::header::{PacketHeader, MAX_PARTIAL_LEN};
use crate::packet::PacketTrait;
use crate::ser::Serialize;
use crate::types::{PacketHeaderVersion, PacketLength, Tag};

/// Chunk size used for partial body lengths unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 16;

/// The first partial chunk must be at least this large.
pub const MIN_CHUNK_SIZE: usize = 512;

/// Framing preferences of a [`PacketWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder)]
#[builder(build_fn(validate = "Self::validate", error = "Error"))]
pub struct PacketWriterConfig {
    /// Emit old format headers where the tag and length allow it.
    #[builder(default)]
    pub prefer_old_format: bool,
    /// Size of partial body chunks, a power of two between 512 and 2^30.
    #[builder(default = "DEFAULT_CHUNK_SIZE")]
    pub chunk_size: usize,
}

impl PacketWriterConfigBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(size) = self.chunk_size {
            if !size.is_power_of_two() || size < MIN_CHUNK_SIZE || size > MAX_PARTIAL_LEN as usize
            {
                return Err(format!(
                    "chunk size {size} must be a power of two between {MIN_CHUNK_SIZE} and 2^30"
                ));
            }
        }
        Ok(())
    }
}

impl Default for PacketWriterConfig {
    fn default() -> Self {
        Self {
            prefer_old_format: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// How a streamed body announces its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyLength {
    /// The total body size, including any prefix, is known upfront.
    Fixed(u64),
    /// Unknown size, written as new format partial chunks.
    Partial,
    /// Unknown size, old format header running to the end of the output.
    Indeterminate,
}

/// Destination for packets.
///
/// Implemented by [`PacketWriter`] and by every message generator layer, so layers
/// stack as plain decorators around each other.
pub trait PacketSink {
    /// Framing preferences, inherited by nested writers.
    fn config(&self) -> PacketWriterConfig;

    /// Writes a complete packet with the given body.
    fn write_raw_packet(&mut self, tag: Tag, body: &[u8]) -> Result<()>;

    /// Starts a packet whose body is streamed.
    ///
    /// `prefix` holds leading body bytes that are framing of the packet itself (for
    /// example the literal data header), as opposed to the content passed to
    /// [`PacketSink::write_stream`].
    fn begin_stream(&mut self, tag: Tag, prefix: &[u8], length: BodyLength) -> Result<()>;

    fn write_stream(&mut self, data: &[u8]) -> Result<()>;

    /// Closes the currently open stream.
    fn end_stream(&mut self) -> Result<()>;

    /// Receives the content of literal data packets that a nested layer writes in
    /// compressed or encrypted form.
    fn literal_content(&mut self, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    fn write_packet<P: PacketTrait>(&mut self, packet: &P) -> Result<()>
    where
        Self: Sized,
    {
        let body = packet.to_bytes()?;
        self.write_raw_packet(packet.tag(), &body)
    }
}

impl<S: PacketSink + ?Sized> PacketSink for &mut S {
    fn config(&self) -> PacketWriterConfig {
        (**self).config()
    }

    fn write_raw_packet(&mut self, tag: Tag, body: &[u8]) -> Result<()> {
        (**self).write_raw_packet(tag, body)
    }

    fn begin_stream(&mut self, tag: Tag, prefix: &[u8], length: BodyLength) -> Result<()> {
        (**self).begin_stream(tag, prefix, length)
    }

    fn write_stream(&mut self, data: &[u8]) -> Result<()> {
        (**self).write_stream(data)
    }

    fn end_stream(&mut self) -> Result<()> {
        (**self).end_stream()
    }

    fn literal_content(&mut self, data: &[u8]) -> Result<()> {
        (**self).literal_content(data)
    }
}

#[derive(Debug)]
enum OpenStream {
    Fixed { remaining: u64 },
    /// `remaining` is set when a declared length too large for a length field is
    /// written in chunks.
    Partial {
        buffer: Vec<u8>,
        remaining: Option<u64>,
    },
    Indeterminate,
}

/// Frames packets onto a byte writer.
#[derive(Debug)]
pub struct PacketWriter<W: Write> {
    inner: W,
    config: PacketWriterConfig,
    stream: Option<OpenStream>,
}

impl<W: Write> PacketWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_config(inner, PacketWriterConfig::default())
    }

    pub fn with_config(inner: W, config: PacketWriterConfig) -> Self {
        PacketWriter {
            inner,
            config,
            stream: None,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Flushes and returns the underlying writer. Fails while a stream is open.
    pub fn finish(mut self) -> Result<W> {
        if self.stream.is_some() {
            invalid_op!("packet stream still open");
        }
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn header_version(&self, tag: Tag) -> PacketHeaderVersion {
        if self.config.prefer_old_format && tag.fits_old_format() {
            PacketHeaderVersion::Old
        } else {
            PacketHeaderVersion::New
        }
    }

    fn write_partial_chunk(&mut self, len: usize) -> Result<()> {
        debug_assert!(len.is_power_of_two());
        let Some(OpenStream::Partial { buffer, .. }) = &mut self.stream else {
            invalid_op!("no partial stream open");
        };
        self.inner.write_u8(0xE0 | len.trailing_zeros() as u8)?;
        self.inner.write_all(&buffer[..len])?;
        buffer.drain(..len);
        Ok(())
    }
}

impl<W: Write> PacketSink for PacketWriter<W> {
    fn config(&self) -> PacketWriterConfig {
        self.config
    }

    fn write_raw_packet(&mut self, tag: Tag, body: &[u8]) -> Result<()> {
        if self.stream.is_some() {
            invalid_op!("cannot write a packet while a packet stream is open");
        }
        match u32::try_from(body.len()) {
            Ok(len) => {
                let header =
                    PacketHeader::from_parts(self.header_version(tag), tag, PacketLength::Fixed(len))?;
                header.to_writer(&mut self.inner)?;
                self.inner.write_all(body)?;
            }
            Err(_) => {
                self.begin_stream(tag, &[], BodyLength::Partial)?;
                self.write_stream(body)?;
                self.end_stream()?;
            }
        }
        Ok(())
    }

    fn begin_stream(&mut self, tag: Tag, prefix: &[u8], length: BodyLength) -> Result<()> {
        if self.stream.is_some() {
            invalid_op!("a packet stream is already open");
        }
        debug!("begin stream {:?} {:?}", tag, length);

        let stream = match length {
            BodyLength::Fixed(len) => match u32::try_from(len) {
                Ok(len) => {
                    let header = PacketHeader::from_parts(
                        self.header_version(tag),
                        tag,
                        PacketLength::Fixed(len),
                    )?;
                    header.to_writer(&mut self.inner)?;
                    OpenStream::Fixed {
                        remaining: len.into(),
                    }
                }
                // Too large for any definite length field, but still checked.
                Err(_) => OpenStream::Partial {
                    buffer: Vec::with_capacity(self.config.chunk_size),
                    remaining: Some(len),
                },
            },
            BodyLength::Partial => OpenStream::Partial {
                buffer: Vec::with_capacity(self.config.chunk_size),
                remaining: None,
            },
            BodyLength::Indeterminate => {
                let header = PacketHeader::from_parts(
                    PacketHeaderVersion::Old,
                    tag,
                    PacketLength::Indeterminate,
                )?;
                header.to_writer(&mut self.inner)?;
                OpenStream::Indeterminate
            }
        };
        if matches!(stream, OpenStream::Partial { .. }) {
            if !tag.allows_streaming() {
                invalid_op!("{:?} packets cannot use partial lengths", tag);
            }
            self.inner.write_u8(0b1100_0000 | u8::from(tag))?;
        }
        self.stream = Some(stream);
        self.write_stream(prefix)
    }

    fn write_stream(&mut self, mut data: &[u8]) -> Result<()> {
        let chunk_size = self.config.chunk_size;
        match &mut self.stream {
            None => invalid_op!("no packet stream open"),
            Some(OpenStream::Fixed { remaining }) => {
                let len = data.len() as u64;
                if len > *remaining {
                    invalid_op!("body exceeds the declared length by {}", len - *remaining);
                }
                *remaining -= len;
                self.inner.write_all(data)?;
            }
            Some(OpenStream::Indeterminate) => self.inner.write_all(data)?,
            Some(OpenStream::Partial { remaining, .. }) => {
                if let Some(remaining) = remaining {
                    let len = data.len() as u64;
                    if len > *remaining {
                        invalid_op!("body exceeds the declared length by {}", len - *remaining);
                    }
                    *remaining -= len;
                }
                while !data.is_empty() {
                    let Some(OpenStream::Partial { buffer, .. }) = &mut self.stream else {
                        invalid_op!("partial stream closed while writing");
                    };
                    // A full buffer is only emitted once more data follows, so the last
                    // chunk always carries a definite length.
                    if buffer.len() == chunk_size {
                        self.write_partial_chunk(chunk_size)?;
                        continue;
                    }
                    let n = (chunk_size - buffer.len()).min(data.len());
                    buffer.extend_from_slice(&data[..n]);
                    data = &data[n..];
                }
            }
        }
        Ok(())
    }

    fn end_stream(&mut self) -> Result<()> {
        match self.stream.take() {
            None => invalid_op!("no packet stream open"),
            Some(OpenStream::Fixed { remaining }) => {
                if remaining != 0 {
                    invalid_op!("stream closed {} bytes short of its declared length", remaining);
                }
            }
            Some(OpenStream::Indeterminate) => {}
            Some(OpenStream::Partial { buffer, remaining }) => {
                if let Some(remaining) = remaining.filter(|r| *r != 0) {
                    invalid_op!("stream closed {} bytes short of its declared length", remaining);
                }
                PacketLength::Fixed(u32::try_from(buffer.len())?).to_writer_new(&mut self.inner)?;
                self.inner.write_all(&buffer)?;
            }
        }
        self.inner.flush()?;
        Ok(())
    }
}

/// Adapts the open stream of a [`PacketSink`] into an [`io::Write`].
///
/// Nested layers (compression, encryption) write their own packets into this.
#[derive(Debug)]
pub struct StreamBody<S: PacketSink> {
    sink: S,
}

impl<S: PacketSink> StreamBody<S> {
    pub fn new(sink: S) -> Self {
        StreamBody { sink }
    }

    pub fn get_ref(&self) -> &S {
        &self.sink
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Closes the stream on the sink and hands the sink back.
    pub fn finish(mut self) -> Result<S> {
        self.sink.end_stream()?;
        Ok(self.sink)
    }
}

impl<S: PacketSink> Write for StreamBody<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.write_stream(buf).map_err(Error::into_io)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::body_reader::PacketBodyReader;
    use crate::parsing_reader::BufReadParsing;

    fn stream_packet(config: PacketWriterConfig, body: &[u8]) -> Vec<u8> {
        let mut writer = PacketWriter::with_config(Vec::new(), config);
        writer
            .begin_stream(Tag::LiteralData, &[], BodyLength::Partial)
            .unwrap();
        for chunk in body.chunks(1000) {
            writer.write_stream(chunk).unwrap();
        }
        writer.end_stream().unwrap();
        writer.finish().unwrap()
    }

    /// Counts the length headers following the first header byte.
    fn count_chunks(mut encoded: &[u8]) -> usize {
        encoded.read_u8().unwrap();
        let mut chunks = 0;
        loop {
            chunks += 1;
            match PacketLength::try_from_reader(&mut encoded).unwrap() {
                PacketLength::Partial(n) => {
                    encoded.take_bytes(n as usize).unwrap();
                }
                PacketLength::Fixed(n) => {
                    encoded.take_bytes(n as usize).unwrap();
                    assert!(encoded.is_empty());
                    return chunks;
                }
                PacketLength::Indeterminate => unreachable!(),
            }
        }
    }

    #[test]
    fn partial_chunk_counts() {
        let k = 9;
        let chunk = 1usize << k;
        let config = PacketWriterConfigBuilder::default()
            .chunk_size(chunk)
            .build()
            .unwrap();

        for n in [0, 1, chunk - 1, chunk, chunk + 1, 10 * chunk] {
            let body: Vec<u8> = (0..n).map(|i| i as u8).collect();
            let encoded = stream_packet(config, &body);
            let expected = n.div_ceil(chunk).max(1);
            assert_eq!(count_chunks(&encoded), expected, "body of {n} bytes");

            let header = PacketHeader::try_from_reader(&encoded[..]).unwrap();
            let mut reader = PacketBodyReader::new(header, &encoded[1..]).unwrap();
            assert_eq!(reader.rest().unwrap(), body, "body of {n} bytes");
        }
    }

    #[test]
    fn default_chunking() {
        let body = vec![7u8; DEFAULT_CHUNK_SIZE + 1];
        let encoded = stream_packet(PacketWriterConfig::default(), &body);
        assert_eq!(encoded[1], 0xF0);
        assert_eq!(count_chunks(&encoded), 2);
    }

    #[test]
    fn chunk_size_validation() {
        assert!(PacketWriterConfigBuilder::default()
            .chunk_size(1000)
            .build()
            .is_err());
        assert!(PacketWriterConfigBuilder::default()
            .chunk_size(256)
            .build()
            .is_err());
    }

    #[test]
    fn old_format_preference() {
        let config = PacketWriterConfigBuilder::default()
            .prefer_old_format(true)
            .build()
            .unwrap();
        let mut writer = PacketWriter::with_config(Vec::new(), config);
        writer.write_raw_packet(Tag::UserId, b"alice").unwrap();
        writer
            .write_raw_packet(Tag::SymEncryptedProtectedData, &[1, 2])
            .unwrap();
        let out = writer.finish().unwrap();
        assert_eq!(out, [&[0xB4, 5][..], b"alice", &[0xD2, 2, 1, 2]].concat());
    }

    #[test]
    fn fixed_stream_enforces_length() {
        let mut writer = PacketWriter::new(Vec::new());
        writer
            .begin_stream(Tag::LiteralData, b"ab", BodyLength::Fixed(4))
            .unwrap();
        assert!(writer.write_stream(b"cde").is_err());
        writer.write_stream(b"c").unwrap();
        assert!(writer.end_stream().is_err());

        let mut writer = PacketWriter::new(Vec::new());
        writer
            .begin_stream(Tag::LiteralData, b"ab", BodyLength::Fixed(4))
            .unwrap();
        writer.write_stream(b"cd").unwrap();
        writer.end_stream().unwrap();
        assert_eq!(writer.finish().unwrap(), vec![0xCB, 4, b'a', b'b', b'c', b'd']);
    }

    #[test]
    fn oversized_fixed_stream_keeps_its_length() {
        let declared = u64::from(u32::MAX) + 2;
        let mut writer = PacketWriter::new(Vec::new());
        writer
            .begin_stream(Tag::LiteralData, b"ab", BodyLength::Fixed(declared))
            .unwrap();
        writer.write_stream(b"cd").unwrap();
        let err = writer.end_stream().unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("invalid operation: stream closed {} bytes short of its declared length", declared - 4)
        );
    }

    #[test]
    fn indeterminate_stream() {
        let mut writer = PacketWriter::new(Vec::new());
        writer
            .begin_stream(Tag::CompressedData, &[0], BodyLength::Indeterminate)
            .unwrap();
        writer.write_stream(b"xyz").unwrap();
        writer.end_stream().unwrap();
        assert_eq!(writer.finish().unwrap(), vec![0xA3, 0, b'x', b'y', b'z']);
    }

    #[test]
    fn contract_violations() {
        let mut writer = PacketWriter::new(Vec::new());
        assert!(writer.write_stream(b"x").is_err());
        assert!(writer.end_stream().is_err());
        assert!(writer
            .begin_stream(Tag::UserId, &[], BodyLength::Partial)
            .is_err());

        writer
            .begin_stream(Tag::LiteralData, &[], BodyLength::Partial)
            .unwrap();
        assert!(writer
            .begin_stream(Tag::LiteralData, &[], BodyLength::Partial)
            .is_err());
        assert!(writer.write_raw_packet(Tag::Marker, b"PGP").is_err());
    }
}
