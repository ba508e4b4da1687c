use bytes::{Buf, BufMut, BytesMut};

use crate::commands::{get_bool, put_bool, AtemCommand, CommandName, ProtocolVersion};
use crate::util::buf::{ensure_remaining, get_fixed_string, put_fixed_string};

/// `_ver`: protocol version, sent first in the initial state dump
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}
impl Version {
    pub fn protocol_version(&self) -> ProtocolVersion {
        ProtocolVersion::from_parts(self.major, self.minor)
    }
}
impl AtemCommand for Version {
    const NAME: CommandName = CommandName::new(b"_ver");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u16(self.major);
        buf.put_u16(self.minor);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 4)?;
        Ok(Version {
            major: buf.get_u16(),
            minor: buf.get_u16(),
        })
    }
}

/// `_pin`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProductIdentifier {
    pub name: String,
    pub model: u8,
}
impl AtemCommand for ProductIdentifier {
    const NAME: CommandName = CommandName::new(b"_pin");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        put_fixed_string(buf, &self.name, 40);
        buf.put_u8(self.model);
        buf.put_bytes(0, 3);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 41)?;
        Ok(ProductIdentifier {
            name: get_fixed_string(buf, 40),
            model: buf.get_u8(),
        })
    }
}

/// `_top`: capability counts of the device
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Topology {
    pub mix_effects: u8,
    pub sources: u8,
    pub downstream_keyers: u8,
    pub auxiliaries: u8,
    pub mix_minus_outputs: u8,
    pub media_players: u8,
    pub serial_ports: u8,
    pub hyperdecks: u8,
    pub dves: u8,
    pub stingers: u8,
    pub super_sources: u8,
}
impl AtemCommand for Topology {
    const NAME: CommandName = CommandName::new(b"_top");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.mix_effects);
        buf.put_u8(self.sources);
        buf.put_u8(self.downstream_keyers);
        buf.put_u8(self.auxiliaries);
        buf.put_u8(self.mix_minus_outputs);
        buf.put_u8(self.media_players);
        buf.put_u8(self.serial_ports);
        buf.put_u8(self.hyperdecks);
        buf.put_u8(self.dves);
        buf.put_u8(self.stingers);
        buf.put_u8(self.super_sources);
        buf.put_u8(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 11)?;
        Ok(Topology {
            mix_effects: buf.get_u8(),
            sources: buf.get_u8(),
            downstream_keyers: buf.get_u8(),
            auxiliaries: buf.get_u8(),
            mix_minus_outputs: buf.get_u8(),
            media_players: buf.get_u8(),
            serial_ports: buf.get_u8(),
            hyperdecks: buf.get_u8(),
            dves: buf.get_u8(),
            stingers: buf.get_u8(),
            super_sources: buf.get_u8(),
        })
    }
}

/// `_MeC`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MixEffectConfig {
    pub mix_effect: u8,
    pub keyer_count: u8,
}
impl AtemCommand for MixEffectConfig {
    const NAME: CommandName = CommandName::new(b"_MeC");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.mix_effect);
        buf.put_u8(self.keyer_count);
        buf.put_u16(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 2)?;
        Ok(MixEffectConfig {
            mix_effect: buf.get_u8(),
            keyer_count: buf.get_u8(),
        })
    }
}

/// `_mpl`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MediaPoolConfig {
    pub still_count: u8,
    pub clip_count: u8,
}
impl AtemCommand for MediaPoolConfig {
    const NAME: CommandName = CommandName::new(b"_mpl");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.still_count);
        buf.put_u8(self.clip_count);
        buf.put_u16(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 2)?;
        Ok(MediaPoolConfig {
            still_count: buf.get_u8(),
            clip_count: buf.get_u8(),
        })
    }
}

/// `InCm`: marks the end of the initial state dump
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InitComplete;
impl AtemCommand for InitComplete {
    const NAME: CommandName = CommandName::new(b"InCm");

    fn ser(&self, _buf: &mut BytesMut, _version: ProtocolVersion) {
    }

    fn deser(_buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        Ok(InitComplete)
    }
}

/// `Warn`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Warning {
    pub text: String,
}
impl AtemCommand for Warning {
    const NAME: CommandName = CommandName::new(b"Warn");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        put_fixed_string(buf, &self.text, 44);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 44)?;
        Ok(Warning {
            text: get_fixed_string(buf, 44),
        })
    }
}

/// `Powr`: one bit per power supply
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PowerStatus {
    pub main_power: bool,
    pub backup_power: bool,
}
impl AtemCommand for PowerStatus {
    const NAME: CommandName = CommandName::new(b"Powr");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.main_power as u8 | (self.backup_power as u8) << 1);
        buf.put_bytes(0, 3);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 1)?;
        let bits = buf.get_u8();
        Ok(PowerStatus {
            main_power: bits & 0x01 != 0,
            backup_power: bits & 0x02 != 0,
        })
    }
}

/// `Time`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TimeCode {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub frames: u8,
    pub drop_frame: bool,
}
impl AtemCommand for TimeCode {
    const NAME: CommandName = CommandName::new(b"Time");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.hours);
        buf.put_u8(self.minutes);
        buf.put_u8(self.seconds);
        buf.put_u8(self.frames);
        buf.put_u8(0);
        put_bool(buf, self.drop_frame);
        buf.put_u16(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 6)?;
        let hours = buf.get_u8();
        let minutes = buf.get_u8();
        let seconds = buf.get_u8();
        let frames = buf.get_u8();
        buf.advance(1);
        Ok(TimeCode {
            hours,
            minutes,
            seconds,
            frames,
            drop_frame: get_bool(buf),
        })
    }
}
