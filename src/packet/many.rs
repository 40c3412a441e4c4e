use std::io::BufRead;

use log::{debug, warn};

use crate::errors::{Error, Result};
use crate::packet::{Packet, PacketBodyReader, PacketHeader};
use crate::parsing_reader::BufReadParsing;

/// Parses packets one after the other from a byte stream.
///
/// A broken header ends the iteration after yielding its error, since the position of
/// the next packet is unknown. A broken body is reported and skipped.
#[derive(Debug)]
pub struct PacketParser<R: BufRead> {
    reader: R,
    done: bool,
}

impl<R: BufRead> PacketParser<R> {
    pub fn new(reader: R) -> Self {
        PacketParser {
            reader,
            done: false,
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn next_packet(&mut self) -> Option<Result<Packet>> {
        match self.reader.has_remaining() {
            Ok(false) => return None,
            Ok(true) => {}
            Err(err) => return Some(Err(err)),
        }

        let header = match PacketHeader::try_from_reader(&mut self.reader) {
            Ok(header) => header,
            Err(err) => {
                warn!("invalid packet header: {:?}", err);
                self.done = true;
                return Some(Err(err));
            }
        };
        debug!("found header {:?}", header);

        let mut body = match PacketBodyReader::new(header, &mut self.reader) {
            Ok(body) => body,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };
        let res = Packet::from_reader(header.tag(), &mut body);

        // Skip whatever the body parser left behind.
        if let Err(err) = body.drain() {
            self.done = true;
            return Some(Err(err));
        }

        match res {
            Ok(packet) => Some(Ok(packet)),
            Err(Error::UnexpectedEndOfStream) => {
                self.done = true;
                Some(Err(Error::UnexpectedEndOfStream))
            }
            Err(err) => {
                warn!("skipping {:?} packet: {:?}", header.tag(), err);
                Some(Err(err))
            }
        }
    }
}

impl<R: BufRead> Iterator for PacketParser<R> {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let res = self.next_packet();
        if res.is_none() {
            self.done = true;
        }
        res
    }
}
