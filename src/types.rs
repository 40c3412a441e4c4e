mod compression;
mod key_id;
mod mpi;
mod packet;
mod params;
mod s2k;

pub use self::{
    compression::CompressionAlgorithm,
    key_id::{Fingerprint, KeyId},
    mpi::Mpi,
    packet::*,
    params::{PlainSecretParams, PublicParams},
    s2k::{GnuDummyMode, S2kUsage, StringToKey, DEFAULT_ITER_COUNT},
};

pub(crate) use self::mpi::strip_leading_zeros;
