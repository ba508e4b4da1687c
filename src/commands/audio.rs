use bytes::{Buf, BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::commands::{clamp_enum, clamp_value, get_bool, mask_bit, put_bool, AtemCommand, ClosedEnum, CommandName, ProtocolVersion};
use crate::util::buf::ensure_remaining;

/// +6 dB
pub const MAX_GAIN: u16 = 65381;
pub const MAX_BALANCE: i16 = 10000;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum AudioMixOption {
    Off = 0,
    On = 1,
    AudioFollowVideo = 2,
}
impl ClosedEnum for AudioMixOption {
    const LOWEST: Self = AudioMixOption::Off;
    const HIGHEST: Self = AudioMixOption::AudioFollowVideo;
}

/// `AMIP`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AudioMixerInput {
    pub index: u16,
    pub mix_option: AudioMixOption,
    pub gain: u16,
    pub balance: i16,
}
impl AtemCommand for AudioMixerInput {
    const NAME: CommandName = CommandName::new(b"AMIP");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u16(self.index);
        buf.put_u8(self.mix_option.into());
        buf.put_u8(0);
        buf.put_u16(self.gain);
        buf.put_i16(self.balance);
        buf.put_u32(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 8)?;
        let index = buf.get_u16();
        let mix_option = clamp_enum(buf.get_u8(), "AMIP.mix_option");
        buf.advance(1);
        Ok(AudioMixerInput {
            index,
            mix_option,
            gain: clamp_value(buf.get_u16(), 0, MAX_GAIN, "AMIP.gain"),
            balance: clamp_value(buf.get_i16(), -MAX_BALANCE, MAX_BALANCE, "AMIP.balance"),
        })
    }
}

/// `CAMI`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeAudioMixerInput {
    pub index: u16,
    pub mix_option: Option<AudioMixOption>,
    pub gain: Option<u16>,
    pub balance: Option<i16>,
}
impl AtemCommand for ChangeAudioMixerInput {
    const NAME: CommandName = CommandName::new(b"CAMI");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(mask_bit(&self.mix_option, 0x01) | mask_bit(&self.gain, 0x02) | mask_bit(&self.balance, 0x04));
        buf.put_u8(0);
        buf.put_u16(self.index);
        buf.put_u8(self.mix_option.map(u8::from).unwrap_or(0));
        buf.put_u8(0);
        buf.put_u16(self.gain.unwrap_or(0));
        buf.put_i16(self.balance.unwrap_or(0));
        buf.put_u16(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 10)?;
        let mask = buf.get_u8();
        buf.advance(1);
        let index = buf.get_u16();
        let mix_option = buf.get_u8();
        buf.advance(1);
        let gain = buf.get_u16();
        let balance = buf.get_i16();
        Ok(ChangeAudioMixerInput {
            index,
            mix_option: (mask & 0x01 != 0).then(|| clamp_enum(mix_option, "CAMI.mix_option")),
            gain: (mask & 0x02 != 0).then_some(gain),
            balance: (mask & 0x04 != 0).then_some(balance),
        })
    }
}

/// `AMMO`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AudioMixerMaster {
    pub gain: u16,
    pub balance: i16,
    pub follow_fade_to_black: bool,
}
impl AtemCommand for AudioMixerMaster {
    const NAME: CommandName = CommandName::new(b"AMMO");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u16(self.gain);
        buf.put_i16(self.balance);
        put_bool(buf, self.follow_fade_to_black);
        buf.put_bytes(0, 3);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 5)?;
        Ok(AudioMixerMaster {
            gain: clamp_value(buf.get_u16(), 0, MAX_GAIN, "AMMO.gain"),
            balance: clamp_value(buf.get_i16(), -MAX_BALANCE, MAX_BALANCE, "AMMO.balance"),
            follow_fade_to_black: get_bool(buf),
        })
    }
}

/// `CAMM`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeAudioMixerMaster {
    pub gain: Option<u16>,
    pub balance: Option<i16>,
    pub follow_fade_to_black: Option<bool>,
}
impl AtemCommand for ChangeAudioMixerMaster {
    const NAME: CommandName = CommandName::new(b"CAMM");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(mask_bit(&self.gain, 0x01) | mask_bit(&self.balance, 0x02) | mask_bit(&self.follow_fade_to_black, 0x04));
        buf.put_u8(0);
        buf.put_u16(self.gain.unwrap_or(0));
        buf.put_i16(self.balance.unwrap_or(0));
        put_bool(buf, self.follow_fade_to_black.unwrap_or(false));
        buf.put_u8(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 7)?;
        let mask = buf.get_u8();
        buf.advance(1);
        let gain = buf.get_u16();
        let balance = buf.get_i16();
        let follow_fade_to_black = get_bool(buf);
        Ok(ChangeAudioMixerMaster {
            gain: (mask & 0x01 != 0).then_some(gain),
            balance: (mask & 0x02 != 0).then_some(balance),
            follow_fade_to_black: (mask & 0x04 != 0).then_some(follow_fade_to_black),
        })
    }
}
