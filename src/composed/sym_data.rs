//! Symmetric framing of message data.
//!
//! Both the plain (SED) and the integrity protected (SEIPD) variants start with a
//! block of random bytes whose last two bytes are repeated. SED resynchronizes the
//! CFB state after that prefix; SEIPD keeps going and closes with an MDC packet.

use std::io::{self, Read, Write};

use log::{debug, warn};
use rand::{CryptoRng, Rng};
use sha1::{Digest, Sha1};

use crate::crypto::sym::{CfbStream, SymmetricKeyAlgorithm};
use crate::errors::{Error, Result};
use crate::packet::ModDetectionCode;

/// Size of the MDC packet inside the plaintext: header plus SHA-1.
const MDC_PACKET_LEN: usize = 22;

const READ_CHUNK: usize = 8 * 1024;

/// Encrypts message data on its way into `W`.
#[derive(derive_more::Debug)]
pub(crate) struct DataEncryptor<W: Write> {
    sink: W,
    cfb: CfbStream,
    #[debug(skip)]
    mdc: Option<Sha1>,
}

impl<W: Write> DataEncryptor<W> {
    /// Writes the encrypted random prefix to `sink`.
    pub(crate) fn new<R: CryptoRng + Rng>(
        rng: &mut R,
        mut sink: W,
        alg: SymmetricKeyAlgorithm,
        key: &[u8],
        protected: bool,
    ) -> Result<Self> {
        let bs = alg.block_size();
        let mut prefix = vec![0u8; bs + 2];
        rng.fill_bytes(&mut prefix[..bs]);
        prefix[bs] = prefix[bs - 2];
        prefix[bs + 1] = prefix[bs - 1];

        let mdc = protected.then(|| {
            let mut hasher = Sha1::new();
            hasher.update(&prefix);
            hasher
        });

        let mut cfb = alg.stream_encryptor(key, &vec![0u8; bs])?;
        cfb.apply(&mut prefix);
        sink.write_all(&prefix)?;

        if !protected {
            cfb = alg.stream_encryptor(key, &prefix[2..])?;
        }

        Ok(DataEncryptor { sink, cfb, mdc })
    }

    pub(crate) fn get_mut(&mut self) -> &mut W {
        &mut self.sink
    }

    /// Appends the MDC packet for protected data and returns the sink.
    pub(crate) fn finish(mut self) -> Result<W> {
        if let Some(mut hasher) = self.mdc.take() {
            hasher.update(ModDetectionCode::HEADER);
            let mut trailer = Vec::with_capacity(MDC_PACKET_LEN);
            trailer.extend_from_slice(&ModDetectionCode::HEADER);
            trailer.extend_from_slice(&hasher.finalize());
            self.cfb.apply(&mut trailer);
            self.sink.write_all(&trailer)?;
        }
        self.sink.flush()?;
        Ok(self.sink)
    }
}

impl<W: Write> Write for DataEncryptor<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(hasher) = &mut self.mdc {
            hasher.update(buf);
        }
        let mut data = buf.to_vec();
        self.cfb.apply(&mut data);
        self.sink.write_all(&data)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

/// Reads the still encrypted prefix from the start of the data.
pub(crate) fn read_prefix<R: Read>(source: &mut R, alg: SymmetricKeyAlgorithm) -> Result<Vec<u8>> {
    let mut prefix = vec![0u8; alg.block_size() + 2];
    source.read_exact(&mut prefix)?;
    Ok(prefix)
}

/// Decrypts the prefix with `key` and compares the repeated bytes.
///
/// A mismatch means the key is wrong, barring a 1 in 65536 accident.
pub(crate) fn check_prefix(
    alg: SymmetricKeyAlgorithm,
    key: &[u8],
    prefix: &[u8],
) -> Result<(CfbStream, Vec<u8>)> {
    let bs = alg.block_size();
    ensure_eq!(prefix.len(), bs + 2, "encrypted prefix length");

    let mut cfb = alg.stream_decryptor(key, &vec![0u8; bs])?;
    let mut plain = prefix.to_vec();
    cfb.apply(&mut plain);

    if plain[bs - 2..bs] != plain[bs..] {
        return Err(Error::WrongPassphrase {
            expected: hex::encode(&plain[bs - 2..bs]),
            found: hex::encode(&plain[bs..]),
        });
    }
    Ok((cfb, plain))
}

/// Decrypts message data read from `R`.
///
/// For protected data the last 22 plaintext bytes are held back until the end of
/// the input, where they must form an MDC packet matching everything before it.
#[derive(derive_more::Debug)]
pub(crate) struct DataDecryptor<R: Read> {
    #[debug(skip)]
    source: R,
    cfb: CfbStream,
    #[debug(skip)]
    mdc: Option<Sha1>,
    #[debug("{} bytes", pending.len())]
    pending: Vec<u8>,
    hold_back: usize,
    eof: bool,
    checked: bool,
}

impl<R: Read> DataDecryptor<R> {
    /// `prefix` is the encrypted prefix already taken from `source`.
    pub(crate) fn new(
        source: R,
        alg: SymmetricKeyAlgorithm,
        key: &[u8],
        prefix: &[u8],
        protected: bool,
    ) -> Result<Self> {
        let (cfb, plain_prefix) = check_prefix(alg, key, prefix)?;
        let (cfb, mdc, hold_back) = if protected {
            let mut hasher = Sha1::new();
            hasher.update(&plain_prefix);
            (cfb, Some(hasher), MDC_PACKET_LEN)
        } else {
            (alg.stream_decryptor(key, &prefix[2..])?, None, 0)
        };

        Ok(DataDecryptor {
            source,
            cfb,
            mdc,
            pending: Vec::new(),
            hold_back,
            eof: false,
            checked: false,
        })
    }

    /// The still encrypted input.
    pub(crate) fn get_mut(&mut self) -> &mut R {
        &mut self.source
    }

    fn fill(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.source.read(&mut chunk)?;
        if n == 0 {
            self.eof = true;
            return Ok(());
        }
        self.cfb.apply(&mut chunk[..n]);
        self.pending.extend_from_slice(&chunk[..n]);
        Ok(())
    }

    fn check_trailer(&mut self) -> Result<()> {
        let Some(hasher) = &self.mdc else {
            return Ok(());
        };
        if self.pending.len() < MDC_PACKET_LEN {
            warn!("protected data ends before its modification detection code");
            return Err(Error::MdcMismatch);
        }
        let split = self.pending.len() - MDC_PACKET_LEN;
        let (content, trailer) = self.pending.split_at(split);

        let mut hasher = hasher.clone();
        hasher.update(content);
        hasher.update(ModDetectionCode::HEADER);
        let digest = hasher.finalize();

        if trailer[..2] != ModDetectionCode::HEADER || trailer[2..] != digest[..] {
            warn!("modification detection code mismatch");
            return Err(Error::MdcMismatch);
        }
        debug!("modification detection code verified");
        self.mdc = None;
        Ok(())
    }
}

impl<R: Read> Read for DataDecryptor<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        // Stay ahead far enough to know whether the held back bytes are the end.
        while !self.eof && self.pending.len() <= self.hold_back + out.len() {
            self.fill()?;
        }
        if self.eof && !self.checked {
            self.check_trailer().map_err(Error::into_io)?;
            self.checked = true;
        }

        let available = self.pending.len().saturating_sub(self.hold_back);
        let n = available.min(out.len());
        out[..n].copy_from_slice(&self.pending[..n]);
        if let Some(hasher) = &mut self.mdc {
            hasher.update(&self.pending[..n]);
        }
        self.pending.drain(..n);
        Ok(n)
    }
}
