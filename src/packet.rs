//! # Packet module
//!
//! Handles everything in relationship to packets: framing, the individual packet
//! bodies and the signature machinery.

mod body_reader;
mod header;
mod many;
mod packet_sum;
mod packet_trait;
mod writer;

mod compressed_data;
mod literal_data;
mod marker;
mod mod_detection_code;
mod one_pass_signature;
mod public_key;
mod public_key_encrypted_session_key;
mod secret_key;
mod signature;
mod sym_encrypted_data;
mod sym_encrypted_protected_data;
mod sym_key_encrypted_session_key;
mod trust;
mod user_attribute;
mod user_id;

pub(crate) use self::public_key_encrypted_session_key::{decode_session_info, encode_session_info};
pub use self::{
    body_reader::PacketBodyReader,
    compressed_data::*,
    header::{NewPacketHeader, OldPacketHeader, PacketHeader, MAX_PARTIAL_LEN},
    literal_data::*,
    many::*,
    marker::*,
    mod_detection_code::*,
    one_pass_signature::*,
    packet_sum::*,
    packet_trait::*,
    public_key::*,
    public_key_encrypted_session_key::{PkeskValues, PublicKeyEncryptedSessionKey},
    secret_key::*,
    signature::*,
    sym_encrypted_data::*,
    sym_encrypted_protected_data::*,
    sym_key_encrypted_session_key::*,
    trust::*,
    user_attribute::*,
    user_id::*,
    writer::*,
};
