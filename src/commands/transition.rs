use bitflags::bitflags;
use bytes::{Buf, BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::commands::{clamp_enum, clamp_value, get_bool, mask_bit, put_bool, AtemCommand, ClosedEnum, CommandName, ProtocolVersion};
use crate::util::buf::ensure_remaining;

/// full travel of the transition handle
pub const MAX_HANDLE_POSITION: u16 = 10000;
pub const MIN_MIX_RATE: u8 = 1;
pub const MAX_MIX_RATE: u8 = 250;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum TransitionStyle {
    Mix = 0,
    Dip = 1,
    Wipe = 2,
    Dve = 3,
    Sting = 4,
}
impl ClosedEnum for TransitionStyle {
    const LOWEST: Self = TransitionStyle::Mix;
    const HIGHEST: Self = TransitionStyle::Sting;
}

bitflags! {
    /// layers that take part in the next transition
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
    pub struct TransitionSelection: u8 {
        const BACKGROUND = 0x01;
        const KEY1 = 0x02;
        const KEY2 = 0x04;
        const KEY3 = 0x08;
        const KEY4 = 0x10;
    }
}

/// `TrSS`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransitionProperties {
    pub mix_effect: u8,
    pub style: TransitionStyle,
    pub selection: TransitionSelection,
    pub next_style: TransitionStyle,
    pub next_selection: TransitionSelection,
}
impl AtemCommand for TransitionProperties {
    const NAME: CommandName = CommandName::new(b"TrSS");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.mix_effect);
        buf.put_u8(self.style.into());
        buf.put_u8(self.selection.bits());
        buf.put_u8(self.next_style.into());
        buf.put_u8(self.next_selection.bits());
        buf.put_bytes(0, 3);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 5)?;
        Ok(TransitionProperties {
            mix_effect: buf.get_u8(),
            style: clamp_enum(buf.get_u8(), "TrSS.style"),
            selection: TransitionSelection::from_bits_truncate(buf.get_u8()),
            next_style: clamp_enum(buf.get_u8(), "TrSS.next_style"),
            next_selection: TransitionSelection::from_bits_truncate(buf.get_u8()),
        })
    }
}

/// `CTTp`: changes the style and / or selection of the *next* transition
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeTransitionProperties {
    pub mix_effect: u8,
    pub style: Option<TransitionStyle>,
    pub selection: Option<TransitionSelection>,
}
impl AtemCommand for ChangeTransitionProperties {
    const NAME: CommandName = CommandName::new(b"CTTp");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(mask_bit(&self.style, 0x01) | mask_bit(&self.selection, 0x02));
        buf.put_u8(self.mix_effect);
        buf.put_u8(self.style.map(u8::from).unwrap_or(0));
        buf.put_u8(self.selection.map(|s| s.bits()).unwrap_or(0));
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 4)?;
        let mask = buf.get_u8();
        let mix_effect = buf.get_u8();
        let style = buf.get_u8();
        let selection = buf.get_u8();
        Ok(ChangeTransitionProperties {
            mix_effect,
            style: (mask & 0x01 != 0).then(|| clamp_enum(style, "CTTp.style")),
            selection: (mask & 0x02 != 0).then(|| TransitionSelection::from_bits_truncate(selection)),
        })
    }
}

/// `TrPs`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransitionPosition {
    pub mix_effect: u8,
    pub in_transition: bool,
    pub remaining_frames: u8,
    /// 0..=10000
    pub handle_position: u16,
}
impl AtemCommand for TransitionPosition {
    const NAME: CommandName = CommandName::new(b"TrPs");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.mix_effect);
        put_bool(buf, self.in_transition);
        buf.put_u8(self.remaining_frames);
        buf.put_u8(0);
        buf.put_u16(self.handle_position);
        buf.put_u16(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 6)?;
        let mix_effect = buf.get_u8();
        let in_transition = get_bool(buf);
        let remaining_frames = buf.get_u8();
        buf.advance(1);
        Ok(TransitionPosition {
            mix_effect,
            in_transition,
            remaining_frames,
            handle_position: clamp_value(buf.get_u16(), 0, MAX_HANDLE_POSITION, "TrPs.handle_position"),
        })
    }
}

/// `CTPs`: moves the transition handle
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeTransitionPosition {
    pub mix_effect: u8,
    pub handle_position: u16,
}
impl AtemCommand for ChangeTransitionPosition {
    const NAME: CommandName = CommandName::new(b"CTPs");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.mix_effect);
        buf.put_u8(0);
        buf.put_u16(self.handle_position);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 4)?;
        let mix_effect = buf.get_u8();
        buf.advance(1);
        Ok(ChangeTransitionPosition {
            mix_effect,
            handle_position: buf.get_u16(),
        })
    }
}

/// `TrPr`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransitionPreview {
    pub mix_effect: u8,
    pub enabled: bool,
}
impl AtemCommand for TransitionPreview {
    const NAME: CommandName = CommandName::new(b"TrPr");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.mix_effect);
        put_bool(buf, self.enabled);
        buf.put_u16(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 2)?;
        Ok(TransitionPreview {
            mix_effect: buf.get_u8(),
            enabled: get_bool(buf),
        })
    }
}

/// `CTPr`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeTransitionPreview {
    pub mix_effect: u8,
    pub enabled: bool,
}
impl AtemCommand for ChangeTransitionPreview {
    const NAME: CommandName = CommandName::new(b"CTPr");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.mix_effect);
        put_bool(buf, self.enabled);
        buf.put_u16(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 2)?;
        Ok(ChangeTransitionPreview {
            mix_effect: buf.get_u8(),
            enabled: get_bool(buf),
        })
    }
}

/// `TMxP`: mix transition rate in frames
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransitionMixSettings {
    pub mix_effect: u8,
    pub rate: u8,
}
impl AtemCommand for TransitionMixSettings {
    const NAME: CommandName = CommandName::new(b"TMxP");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.mix_effect);
        buf.put_u8(self.rate);
        buf.put_u16(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 2)?;
        Ok(TransitionMixSettings {
            mix_effect: buf.get_u8(),
            rate: clamp_value(buf.get_u8(), MIN_MIX_RATE, MAX_MIX_RATE, "TMxP.rate"),
        })
    }
}

/// `CTMx`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeTransitionMixSettings {
    pub mix_effect: u8,
    pub rate: u8,
}
impl AtemCommand for ChangeTransitionMixSettings {
    const NAME: CommandName = CommandName::new(b"CTMx");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.mix_effect);
        buf.put_u8(self.rate);
        buf.put_u16(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 2)?;
        Ok(ChangeTransitionMixSettings {
            mix_effect: buf.get_u8(),
            rate: buf.get_u8(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::in_range(vec![0, 1, 7, 0, 0x13, 0x88], 5000)]
    #[case::above_max(vec![0, 1, 7, 0, 0xff, 0xff], MAX_HANDLE_POSITION)]
    fn test_transition_position_clamps_handle(#[case] raw: Vec<u8>, #[case] expected: u16) {
        let mut buf: &[u8] = &raw;
        let decoded = TransitionPosition::deser(&mut buf, ProtocolVersion::LATEST).unwrap();
        assert_eq!(decoded.handle_position, expected);
        assert_eq!(decoded.remaining_frames, 7);
    }

    #[rstest]
    #[case::zero(0, MIN_MIX_RATE)]
    #[case::regular(30, 30)]
    #[case::too_slow(255, MAX_MIX_RATE)]
    fn test_mix_rate_clamped(#[case] raw: u8, #[case] expected: u8) {
        let mut buf: &[u8] = &[1, raw, 0, 0];
        assert_eq!(TransitionMixSettings::deser(&mut buf, ProtocolVersion::LATEST).unwrap().rate, expected);
    }

    #[test]
    fn test_unknown_style_clamped() {
        let mut buf: &[u8] = &[0, 9, 0x01, 0, 0x03, 0, 0, 0];
        let decoded = TransitionProperties::deser(&mut buf, ProtocolVersion::LATEST).unwrap();
        assert_eq!(decoded.style, TransitionStyle::Sting);
        assert_eq!(decoded.next_style, TransitionStyle::Mix);
        assert_eq!(decoded.next_selection, TransitionSelection::BACKGROUND | TransitionSelection::KEY1);
    }

    #[test]
    fn test_change_properties_mask() {
        let mut buf = BytesMut::new();
        ChangeTransitionProperties { mix_effect: 1, style: None, selection: Some(TransitionSelection::KEY3) }
            .ser(&mut buf, ProtocolVersion::LATEST);
        assert_eq!(buf.as_ref(), &[0x02, 1, 0, 0x08]);
    }
}
