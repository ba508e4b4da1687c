use std::fmt::{Display, Formatter};

/// 15-bit wrap-around sequence number of a sequenced packet. Ordering between ids is only
///  meaningful relative to a base, see [PacketId::distance_from].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PacketId(u16);

impl Display for PacketId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PacketId {
    pub const ZERO: PacketId = PacketId(0);
    pub const FIRST: PacketId = PacketId(1);

    const MASK: u16 = 0x7fff;
    /// ids less than half the id space ahead of a base count as 'after' it
    pub const HALF_RANGE: u16 = 0x4000;

    pub fn from_raw(value: u16) -> Self {
        Self(value & Self::MASK)
    }

    pub fn to_raw(&self) -> u16 {
        self.0
    }

    pub fn next(&self) -> PacketId {
        PacketId(self.0.wrapping_add(1) & Self::MASK)
    }

    pub fn prev(&self) -> PacketId {
        PacketId(self.0.wrapping_sub(1) & Self::MASK)
    }

    /// forward distance from `base` to `self`, in `0..0x8000`
    pub fn distance_from(&self, base: PacketId) -> u16 {
        self.0.wrapping_sub(base.0) & Self::MASK
    }

    /// true if `self` is `other` or precedes it (modulo wrap-around)
    pub fn is_at_or_before(&self, other: PacketId) -> bool {
        other.distance_from(*self) < Self::HALF_RANGE
    }
}
