use bytes::{Buf, BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::commands::{clamp_enum, clamp_value, get_bool, mask_bit, put_bool, AtemCommand, ClosedEnum, CommandName, ProtocolVersion};
use crate::util::buf::ensure_remaining;

pub const MAX_MASK_VERTICAL: i16 = 9000;
pub const MAX_MASK_HORIZONTAL: i16 = 16000;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum KeyType {
    Luma = 0,
    Chroma = 1,
    Pattern = 2,
    Dve = 3,
}
impl ClosedEnum for KeyType {
    const LOWEST: Self = KeyType::Luma;
    const HIGHEST: Self = KeyType::Dve;
}

/// `KeOn`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UpstreamKeyerOnAir {
    pub mix_effect: u8,
    pub keyer: u8,
    pub on_air: bool,
}
impl AtemCommand for UpstreamKeyerOnAir {
    const NAME: CommandName = CommandName::new(b"KeOn");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.mix_effect);
        buf.put_u8(self.keyer);
        put_bool(buf, self.on_air);
        buf.put_u8(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 3)?;
        Ok(UpstreamKeyerOnAir {
            mix_effect: buf.get_u8(),
            keyer: buf.get_u8(),
            on_air: get_bool(buf),
        })
    }
}

/// `CKOn`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeUpstreamKeyerOnAir {
    pub mix_effect: u8,
    pub keyer: u8,
    pub on_air: bool,
}
impl AtemCommand for ChangeUpstreamKeyerOnAir {
    const NAME: CommandName = CommandName::new(b"CKOn");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.mix_effect);
        buf.put_u8(self.keyer);
        put_bool(buf, self.on_air);
        buf.put_u8(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 3)?;
        Ok(ChangeUpstreamKeyerOnAir {
            mix_effect: buf.get_u8(),
            keyer: buf.get_u8(),
            on_air: get_bool(buf),
        })
    }
}

/// `KeBP`: base properties of an upstream keyer
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UpstreamKeyerBase {
    pub mix_effect: u8,
    pub keyer: u8,
    pub key_type: KeyType,
    pub can_fly: bool,
    pub fly_enabled: bool,
    pub fill_source: u16,
    pub cut_source: u16,
    pub masked: bool,
    /// -9000..=9000
    pub mask_top: i16,
    pub mask_bottom: i16,
    /// -16000..=16000
    pub mask_left: i16,
    pub mask_right: i16,
}
impl AtemCommand for UpstreamKeyerBase {
    const NAME: CommandName = CommandName::new(b"KeBP");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.mix_effect);
        buf.put_u8(self.keyer);
        buf.put_u8(self.key_type.into());
        put_bool(buf, self.can_fly);
        put_bool(buf, self.fly_enabled);
        buf.put_u8(0);
        buf.put_u16(self.fill_source);
        buf.put_u16(self.cut_source);
        put_bool(buf, self.masked);
        buf.put_u8(0);
        buf.put_i16(self.mask_top);
        buf.put_i16(self.mask_bottom);
        buf.put_i16(self.mask_left);
        buf.put_i16(self.mask_right);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 20)?;
        let mix_effect = buf.get_u8();
        let keyer = buf.get_u8();
        let key_type = clamp_enum(buf.get_u8(), "KeBP.key_type");
        let can_fly = get_bool(buf);
        let fly_enabled = get_bool(buf);
        buf.advance(1);
        let fill_source = buf.get_u16();
        let cut_source = buf.get_u16();
        let masked = get_bool(buf);
        buf.advance(1);
        Ok(UpstreamKeyerBase {
            mix_effect,
            keyer,
            key_type,
            can_fly,
            fly_enabled,
            fill_source,
            cut_source,
            masked,
            mask_top: clamp_value(buf.get_i16(), -MAX_MASK_VERTICAL, MAX_MASK_VERTICAL, "KeBP.mask_top"),
            mask_bottom: clamp_value(buf.get_i16(), -MAX_MASK_VERTICAL, MAX_MASK_VERTICAL, "KeBP.mask_bottom"),
            mask_left: clamp_value(buf.get_i16(), -MAX_MASK_HORIZONTAL, MAX_MASK_HORIZONTAL, "KeBP.mask_left"),
            mask_right: clamp_value(buf.get_i16(), -MAX_MASK_HORIZONTAL, MAX_MASK_HORIZONTAL, "KeBP.mask_right"),
        })
    }
}

/// `CKTp`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeUpstreamKeyerType {
    pub mix_effect: u8,
    pub keyer: u8,
    pub key_type: Option<KeyType>,
    pub fly_enabled: Option<bool>,
}
impl AtemCommand for ChangeUpstreamKeyerType {
    const NAME: CommandName = CommandName::new(b"CKTp");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(mask_bit(&self.key_type, 0x01) | mask_bit(&self.fly_enabled, 0x02));
        buf.put_u8(self.mix_effect);
        buf.put_u8(self.keyer);
        buf.put_u8(self.key_type.map(u8::from).unwrap_or(0));
        put_bool(buf, self.fly_enabled.unwrap_or(false));
        buf.put_bytes(0, 3);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 5)?;
        let mask = buf.get_u8();
        let mix_effect = buf.get_u8();
        let keyer = buf.get_u8();
        let key_type = buf.get_u8();
        let fly_enabled = get_bool(buf);
        Ok(ChangeUpstreamKeyerType {
            mix_effect,
            keyer,
            key_type: (mask & 0x01 != 0).then(|| clamp_enum(key_type, "CKTp.key_type")),
            fly_enabled: (mask & 0x02 != 0).then_some(fly_enabled),
        })
    }
}

/// `CKeF`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeUpstreamKeyerFillSource {
    pub mix_effect: u8,
    pub keyer: u8,
    pub source: u16,
}
impl AtemCommand for ChangeUpstreamKeyerFillSource {
    const NAME: CommandName = CommandName::new(b"CKeF");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.mix_effect);
        buf.put_u8(self.keyer);
        buf.put_u16(self.source);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 4)?;
        Ok(ChangeUpstreamKeyerFillSource {
            mix_effect: buf.get_u8(),
            keyer: buf.get_u8(),
            source: buf.get_u16(),
        })
    }
}

/// `CKeC`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeUpstreamKeyerCutSource {
    pub mix_effect: u8,
    pub keyer: u8,
    pub source: u16,
}
impl AtemCommand for ChangeUpstreamKeyerCutSource {
    const NAME: CommandName = CommandName::new(b"CKeC");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.mix_effect);
        buf.put_u8(self.keyer);
        buf.put_u16(self.source);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 4)?;
        Ok(ChangeUpstreamKeyerCutSource {
            mix_effect: buf.get_u8(),
            keyer: buf.get_u8(),
            source: buf.get_u16(),
        })
    }
}

/// `DskS`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DownstreamKeyerState {
    pub keyer: u8,
    pub on_air: bool,
    pub in_transition: bool,
    pub is_auto_transitioning: bool,
    pub remaining_frames: u8,
}
impl AtemCommand for DownstreamKeyerState {
    const NAME: CommandName = CommandName::new(b"DskS");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.keyer);
        put_bool(buf, self.on_air);
        put_bool(buf, self.in_transition);
        put_bool(buf, self.is_auto_transitioning);
        buf.put_u8(self.remaining_frames);
        buf.put_bytes(0, 3);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 5)?;
        Ok(DownstreamKeyerState {
            keyer: buf.get_u8(),
            on_air: get_bool(buf),
            in_transition: get_bool(buf),
            is_auto_transitioning: get_bool(buf),
            remaining_frames: buf.get_u8(),
        })
    }
}

/// `DskB`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DownstreamKeyerSources {
    pub keyer: u8,
    pub fill_source: u16,
    pub cut_source: u16,
}
impl AtemCommand for DownstreamKeyerSources {
    const NAME: CommandName = CommandName::new(b"DskB");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.keyer);
        buf.put_u8(0);
        buf.put_u16(self.fill_source);
        buf.put_u16(self.cut_source);
        buf.put_u16(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 6)?;
        let keyer = buf.get_u8();
        buf.advance(1);
        Ok(DownstreamKeyerSources {
            keyer,
            fill_source: buf.get_u16(),
            cut_source: buf.get_u16(),
        })
    }
}

/// `CDsL`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeDownstreamKeyerOnAir {
    pub keyer: u8,
    pub on_air: bool,
}
impl AtemCommand for ChangeDownstreamKeyerOnAir {
    const NAME: CommandName = CommandName::new(b"CDsL");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.keyer);
        put_bool(buf, self.on_air);
        buf.put_u16(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 2)?;
        Ok(ChangeDownstreamKeyerOnAir {
            keyer: buf.get_u8(),
            on_air: get_bool(buf),
        })
    }
}

/// `DDsA`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AutoDownstreamKeyer {
    pub keyer: u8,
}
impl AtemCommand for AutoDownstreamKeyer {
    const NAME: CommandName = CommandName::new(b"DDsA");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.keyer);
        buf.put_bytes(0, 3);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 1)?;
        Ok(AutoDownstreamKeyer {
            keyer: buf.get_u8(),
        })
    }
}

/// `CDsF`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeDownstreamKeyerFillSource {
    pub keyer: u8,
    pub source: u16,
}
impl AtemCommand for ChangeDownstreamKeyerFillSource {
    const NAME: CommandName = CommandName::new(b"CDsF");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.keyer);
        buf.put_u8(0);
        buf.put_u16(self.source);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 4)?;
        let keyer = buf.get_u8();
        buf.advance(1);
        Ok(ChangeDownstreamKeyerFillSource {
            keyer,
            source: buf.get_u16(),
        })
    }
}

/// `CDsC`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeDownstreamKeyerCutSource {
    pub keyer: u8,
    pub source: u16,
}
impl AtemCommand for ChangeDownstreamKeyerCutSource {
    const NAME: CommandName = CommandName::new(b"CDsC");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.keyer);
        buf.put_u8(0);
        buf.put_u16(self.source);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 4)?;
        let keyer = buf.get_u8();
        buf.advance(1);
        Ok(ChangeDownstreamKeyerCutSource {
            keyer,
            source: buf.get_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyer_base_clamps_masks() {
        let mut raw = BytesMut::new();
        raw.put_slice(&[0, 1, 7, 1, 0, 0, 0, 5, 0, 6, 1, 0]);
        raw.put_i16(-30000);
        raw.put_i16(9000);
        raw.put_i16(16001);
        raw.put_i16(0);
        let mut buf: &[u8] = &raw;

        let decoded = UpstreamKeyerBase::deser(&mut buf, ProtocolVersion::LATEST).unwrap();
        assert_eq!(decoded.key_type, KeyType::Dve);
        assert_eq!(decoded.mask_top, -MAX_MASK_VERTICAL);
        assert_eq!(decoded.mask_bottom, MAX_MASK_VERTICAL);
        assert_eq!(decoded.mask_left, MAX_MASK_HORIZONTAL);
        assert_eq!(decoded.mask_right, 0);
        assert_eq!(decoded.fill_source, 5);
        assert_eq!(decoded.cut_source, 6);
    }
}
