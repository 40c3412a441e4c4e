use std::io::{self, BufRead, Read};

use log::debug;

use crate::errors::{Error, Result};
use crate::packet::header::PacketHeader;
use crate::types::{PacketLength, Tag};

/// Reads the body of a single packet, reassembling partial chunks transparently.
///
/// The reader stops exactly at the end of the body, leaving the source positioned at
/// the next packet header.
#[derive(Debug)]
pub struct PacketBodyReader<R: BufRead> {
    header: PacketHeader,
    source: R,
    state: State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Inside a chunk; `last` is false for partial chunks.
    Chunk { remaining: u64, last: bool },
    /// Old format body running to the end of the source.
    ToEnd,
    Done,
}

impl<R: BufRead> PacketBodyReader<R> {
    /// Starts reading the body announced by `header` from `source`.
    pub fn new(header: PacketHeader, source: R) -> Result<Self> {
        let tag = header.tag();
        let state = match header.packet_length() {
            PacketLength::Fixed(len) => State::Chunk {
                remaining: len.into(),
                last: true,
            },
            PacketLength::Indeterminate => State::ToEnd,
            PacketLength::Partial(len) => {
                ensure!(
                    tag.allows_streaming(),
                    "partial body length on {:?} packet",
                    tag
                );
                // RFC 4880: the first partial length must be at least 512 bytes.
                ensure!(len >= 512, "first partial chunk of {} bytes is too small", len);
                State::Chunk {
                    remaining: len.into(),
                    last: false,
                }
            }
        };

        Ok(PacketBodyReader {
            header,
            source,
            state,
        })
    }

    pub fn tag(&self) -> Tag {
        self.header.tag()
    }

    pub fn packet_header(&self) -> PacketHeader {
        self.header
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.source
    }

    /// Returns the source; any unread body bytes stay in it.
    pub fn into_inner(self) -> R {
        self.source
    }

    /// Moves past exhausted chunks until data, the end of the body, or an error.
    fn advance(&mut self) -> Result<()> {
        while let State::Chunk {
            remaining: 0,
            last,
        } = self.state
        {
            if last {
                self.state = State::Done;
                break;
            }
            self.state = match PacketLength::try_from_reader(&mut self.source)? {
                PacketLength::Fixed(len) => State::Chunk {
                    remaining: len.into(),
                    last: true,
                },
                PacketLength::Partial(len) => State::Chunk {
                    remaining: len.into(),
                    last: false,
                },
                PacketLength::Indeterminate => {
                    malformed!("indeterminate length inside a partial body")
                }
            };
            debug!("{:?}: next body chunk {:?}", self.header.tag(), self.state);
        }
        Ok(())
    }
}

impl<R: BufRead> BufRead for PacketBodyReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.advance().map_err(Error::into_io)?;

        match self.state {
            State::Done => Ok(&[]),
            State::ToEnd => self.source.fill_buf(),
            State::Chunk { remaining, .. } => {
                let buf = self.source.fill_buf()?;
                if buf.is_empty() {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "packet body truncated",
                    ));
                }
                let n = usize::try_from(remaining).unwrap_or(usize::MAX).min(buf.len());
                Ok(&buf[..n])
            }
        }
    }

    fn consume(&mut self, amt: usize) {
        self.source.consume(amt);
        if let State::Chunk { remaining, .. } = &mut self.state {
            *remaining -= amt as u64;
        }
    }
}

impl<R: BufRead> Read for PacketBodyReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let buf = self.fill_buf()?;
        let n = buf.len().min(out.len());
        out[..n].copy_from_slice(&buf[..n]);
        self.consume(n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing_reader::BufReadParsing;

    fn reader(raw: &[u8]) -> PacketBodyReader<&[u8]> {
        let mut raw = raw;
        let header = PacketHeader::try_from_reader(&mut raw).unwrap();
        PacketBodyReader::new(header, raw).unwrap()
    }

    #[test]
    fn fixed_body_stops_at_boundary() {
        let raw = [0xCB, 0x03, b'a', b'b', b'c', 0xCA, 0x03];
        let mut body = reader(&raw);
        assert_eq!(body.rest().unwrap(), &b"abc"[..]);
        assert!(body.is_done());
        assert_eq!(body.into_inner(), &[0xCA, 0x03]);
    }

    #[test]
    fn partial_chunks_are_joined() {
        let mut raw = vec![0xCB, 0xE9];
        raw.extend(vec![1u8; 512]);
        raw.push(0xE0);
        raw.push(2);
        raw.push(2);
        raw.extend([3, 3, 3]);
        let mut body = reader(&raw);
        let data = body.rest().unwrap();
        assert_eq!(data.len(), 512 + 1 + 2);
        assert_eq!(&data[510..], &[1, 1, 2, 3, 3]);
    }

    #[test]
    fn small_first_partial_is_rejected() {
        let raw = [0xCB, 0xE1, 0, 0, 0x00];
        let mut src = &raw[..];
        let header = PacketHeader::try_from_reader(&mut src).unwrap();
        assert!(PacketBodyReader::new(header, src).is_err());
    }

    #[test]
    fn partial_not_allowed_for_user_id() {
        let raw = [0xCD, 0xE9];
        let mut src = &raw[..];
        let header = PacketHeader::try_from_reader(&mut src).unwrap();
        assert!(PacketBodyReader::new(header, src).is_err());
    }

    #[test]
    fn truncated_body() {
        let raw = [0xCB, 0x05, b'a', b'b'];
        let mut body = reader(&raw);
        assert!(matches!(body.rest(), Err(Error::UnexpectedEndOfStream)));
    }

    #[test]
    fn indeterminate_body() {
        let raw = [0xAF, b'x', b'y'];
        let mut body = reader(&raw);
        assert_eq!(body.tag(), Tag::LiteralData);
        assert_eq!(body.rest().unwrap(), &b"xy"[..]);
    }
}
