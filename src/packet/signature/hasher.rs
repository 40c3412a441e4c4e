use std::io;

use digest::DynDigest;

use crate::crypto::hash::HashAlgorithm;
use crate::errors::Result;

/// How document bytes are fed into the hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashMode {
    /// Every byte is hashed as is.
    Binary,
    /// Line endings are hashed as CRLF.
    ///
    /// With `ignore_trailing_whitespace`, spaces and tabs in front of a line break (or
    /// the end of the data) are left out.
    Text { ignore_trailing_whitespace: bool },
}

/// Streaming hash over the pre-image of a signature.
///
/// Document bytes go through [`SignatureHasher::update`], which applies the
/// canonicalization of the [`HashMode`]. Key material, user ids and trailers go through
/// [`SignatureHasher::update_raw`].
pub struct SignatureHasher {
    hash_alg: HashAlgorithm,
    hasher: Box<dyn DynDigest>,
    mode: HashMode,
    last_was_cr: bool,
    pending_whitespace: Vec<u8>,
}

impl SignatureHasher {
    pub fn new(hash_alg: HashAlgorithm, mode: HashMode) -> Result<Self> {
        Ok(SignatureHasher {
            hash_alg,
            hasher: hash_alg.new_hasher()?,
            mode,
            last_was_cr: false,
            pending_whitespace: Vec::new(),
        })
    }

    pub fn hash_alg(&self) -> HashAlgorithm {
        self.hash_alg
    }

    pub fn mode(&self) -> HashMode {
        self.mode
    }

    /// Feeds document bytes.
    pub fn update(&mut self, data: &[u8]) {
        let HashMode::Text {
            ignore_trailing_whitespace,
        } = self.mode
        else {
            self.hasher.update(data);
            return;
        };

        let mut start = 0;
        for (pos, &b) in data.iter().enumerate() {
            match b {
                b'\r' => {
                    self.hasher.update(&data[start..pos]);
                    self.pending_whitespace.clear();
                    self.hasher.update(b"\r\n");
                    start = pos + 1;
                }
                b'\n' => {
                    self.hasher.update(&data[start..pos]);
                    self.pending_whitespace.clear();
                    if !self.last_was_cr {
                        self.hasher.update(b"\r\n");
                    }
                    start = pos + 1;
                }
                b' ' | b'\t' if ignore_trailing_whitespace => {
                    self.hasher.update(&data[start..pos]);
                    self.pending_whitespace.push(b);
                    start = pos + 1;
                }
                _ => {
                    if !self.pending_whitespace.is_empty() {
                        self.hasher.update(&self.pending_whitespace);
                        self.pending_whitespace.clear();
                    }
                }
            }
            self.last_was_cr = b == b'\r';
        }
        self.hasher.update(&data[start..]);
    }

    /// Feeds bytes that are not subject to canonicalization.
    pub fn update_raw(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Appends the trailer and returns the digest.
    ///
    /// Whitespace still pending at the end of the document is dropped.
    pub fn finalize(mut self, trailer: &[u8]) -> Box<[u8]> {
        self.hasher.update(trailer);
        self.hasher.finalize()
    }
}

impl Clone for SignatureHasher {
    fn clone(&self) -> Self {
        SignatureHasher {
            hash_alg: self.hash_alg,
            hasher: self.hasher.box_clone(),
            mode: self.mode,
            last_was_cr: self.last_was_cr,
            pending_whitespace: self.pending_whitespace.clone(),
        }
    }
}

impl std::fmt::Debug for SignatureHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureHasher")
            .field("hash_alg", &self.hash_alg)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl io::Write for SignatureHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
