//! # Serialize trait module

use std::io;

use chrono::{DateTime, TimeZone, Utc};

use crate::errors::Result;

/// Byte exact encoding of packet bodies and their fields.
pub trait Serialize {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()>;

    /// Number of bytes `to_writer` produces.
    fn write_len(&self) -> usize;

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.write_len());
        self.to_writer(&mut buf)?;

        Ok(buf)
    }
}

impl<T: Serialize> Serialize for &T {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        (*self).to_writer(writer)
    }

    fn write_len(&self) -> usize {
        (*self).write_len()
    }
}

impl<T: Serialize> Serialize for [T] {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        for x in self {
            x.to_writer(writer)?;
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.iter().map(Serialize::write_len).sum()
    }
}

impl<T: Serialize> Serialize for Vec<T> {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.as_slice().to_writer(writer)
    }

    fn write_len(&self) -> usize {
        self.as_slice().write_len()
    }
}

/// Packet timestamps are 32 bit unix seconds; later times saturate.
pub(crate) fn time_to_u32(t: &DateTime<Utc>) -> u32 {
    u32::try_from(t.timestamp()).unwrap_or(if t.timestamp() < 0 { 0 } else { u32::MAX })
}

pub(crate) fn u32_to_time(secs: u32) -> DateTime<Utc> {
    Utc.timestamp_opt(i64::from(secs), 0)
        .single()
        .unwrap_or_default()
}

/// Drops sub-second precision, which packets cannot carry.
pub(crate) fn truncate_time(t: &DateTime<Utc>) -> DateTime<Utc> {
    u32_to_time(time_to_u32(t))
}
