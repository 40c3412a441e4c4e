use sha1::{Digest, Sha1};

/// Two octet checksum: sum of all octets mod 65536.
#[inline]
pub fn calculate_simple(data: &[u8]) -> u16 {
    data.iter()
        .fold(0u16, |sum, b| sum.wrapping_add(u16::from(*b)))
}

/// Reads a big endian two octet checksum.
#[inline]
pub fn read_simple(raw: [u8; 2]) -> u16 {
    u16::from_be_bytes(raw)
}

/// SHA-1 over `data`, the integrity trailer of `Sha1` protected secret keys.
#[inline]
pub fn calculate_sha1(data: &[u8]) -> [u8; 20] {
    Sha1::digest(data).into()
}
