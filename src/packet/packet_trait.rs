use crate::ser::Serialize;
use crate::types::Tag;

/// A packet body that knows its own tag.
pub trait PacketTrait: Serialize {
    fn tag(&self) -> Tag;
}

impl<T: PacketTrait> PacketTrait for &T {
    fn tag(&self) -> Tag {
        (*self).tag()
    }
}
