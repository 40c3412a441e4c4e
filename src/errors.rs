use std::num::TryFromIntError;

use snafu::Snafu;

pub type Result<T, E = Error> = ::std::result::Result<T, E>;

/// Error types
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// The encoding of a header, length or field violates the packet format.
    #[snafu(display("malformed packet: {message}"))]
    MalformedPacket { message: String },
    /// A declared length runs past the end of the available input.
    #[snafu(display("unexpected end of stream"))]
    UnexpectedEndOfStream,
    #[snafu(display("unsupported algorithm: {message}"))]
    UnsupportedAlgorithm { message: String },
    #[snafu(display("unsupported version: {message}"))]
    UnsupportedVersion { message: String },
    /// Integrity check over decrypted secret key material failed.
    #[snafu(display("checksum mismatch, passphrase wrong, expected {expected} found {found}"))]
    WrongPassphrase { expected: String, found: String },
    #[snafu(display("session key checksum mismatch, expected {expected:04x} found {found:04x}"))]
    SessionKeyChecksum { expected: u16, found: u16 },
    #[snafu(display("modification detection code mismatch"))]
    MdcMismatch,
    /// The caller violated the usage contract of an object.
    #[snafu(display("invalid operation: {message}"))]
    InvalidOperation { message: String },
    #[snafu(display("not yet implemented: {message}"))]
    Unimplemented { message: String },
    #[snafu(display("{message}"))]
    Message { message: String },
    #[snafu(display("invalid key length"))]
    InvalidKeyLength,
    #[snafu(display("key wrap failed"))]
    KeyWrap,
    #[snafu(display("io error: {source}"))]
    IO { source: std::io::Error },
    #[snafu(transparent)]
    Rsa { source: rsa::errors::Error },
    #[snafu(transparent)]
    Signature { source: signature::Error },
    #[snafu(transparent)]
    EllipticCurve { source: elliptic_curve::Error },
    #[snafu(transparent)]
    TryFromInt { source: TryFromIntError },
    #[snafu(transparent)]
    Utf8 { source: std::str::Utf8Error },
}

impl Error {
    /// Wraps this error so it can travel through `std::io` traits.
    pub(crate) fn into_io(self) -> std::io::Error {
        match self {
            Error::IO { source } => source,
            err => std::io::Error::new(std::io::ErrorKind::Other, err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            return Error::UnexpectedEndOfStream;
        }
        if err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            if let Some(inner) = err.into_inner() {
                if let Ok(err) = inner.downcast::<Error>() {
                    return *err;
                }
            }
            return Error::Message {
                message: "lost error while unwrapping io error".to_string(),
            };
        }
        Error::IO { source: err }
    }
}

impl From<cipher::InvalidLength> for Error {
    fn from(_: cipher::InvalidLength) -> Error {
        Error::InvalidKeyLength
    }
}

impl From<aes_kw::Error> for Error {
    fn from(_: aes_kw::Error) -> Error {
        Error::KeyWrap
    }
}

impl From<String> for Error {
    fn from(err: String) -> Error {
        Error::Message { message: err }
    }
}

impl From<derive_builder::UninitializedFieldError> for Error {
    fn from(err: derive_builder::UninitializedFieldError) -> Error {
        Error::Message {
            message: err.to_string(),
        }
    }
}

#[macro_export]
macro_rules! unimplemented_err {
    ($e:expr) => {
        return Err($crate::errors::Error::Unimplemented { message: $e.to_string() })
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::Unimplemented { message: format!($fmt, $($arg)+)})
    };
}

#[macro_export]
macro_rules! unsupported_err {
    ($e:expr) => {
        return Err($crate::errors::Error::UnsupportedAlgorithm { message: $e.to_string()})
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::UnsupportedAlgorithm { message: format!($fmt, $($arg)+) })
    };
}

#[macro_export]
macro_rules! malformed {
    ($e:expr) => {
        return Err($crate::errors::Error::MalformedPacket { message: $e.to_string() })
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::MalformedPacket { message: format!($fmt, $($arg)+) })
    };
}

#[macro_export]
macro_rules! invalid_op {
    ($e:expr) => {
        return Err($crate::errors::Error::InvalidOperation { message: $e.to_string() })
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::InvalidOperation { message: format!($fmt, $($arg)+) })
    };
}

#[macro_export]
macro_rules! bail {
    ($e:expr) => {
        return Err($crate::errors::Error::Message { message: $e.to_string() })
    };
    ($fmt:expr, $($arg:tt)+) => {
        return Err($crate::errors::Error::Message { message: format!($fmt, $($arg)+) })
    };
}

#[macro_export]
macro_rules! format_err {
    ($e:expr) => {
        $crate::errors::Error::Message { message: $e.to_string() }
    };
    ($fmt:expr, $($arg:tt)+) => {
        $crate::errors::Error::Message { message: format!($fmt, $($arg)+) }
    };
}

#[macro_export(local_inner_macros)]
macro_rules! ensure {
    ($cond:expr, $e:expr) => {
        if !($cond) {
            malformed!($e);
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)+) => {
        if !($cond) {
            malformed!($fmt, $($arg)+);
        }
    };
}

#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr, $($arg:tt)+) => ({
        match (&($left), &($right)) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    return Err($crate::errors::Error::MalformedPacket {
                        message: format!("{}: expected {:?}, found {:?}", format_args!($($arg)+), right_val, left_val),
                    });
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_roundtrip_keeps_error() {
        let err = Error::MdcMismatch.into_io();
        let back: Error = err.into();
        assert!(matches!(back, Error::MdcMismatch));
    }

    #[test]
    fn eof_maps_to_end_of_stream() {
        let err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short");
        assert!(matches!(Error::from(err), Error::UnexpectedEndOfStream));
    }
}
