use bitflags::bitflags;
use bytes::{Buf, BufMut, BytesMut};

use crate::commands::{get_bool, put_bool, AtemCommand, CommandName, ProtocolVersion};
use crate::util::buf::{ensure_remaining, get_fixed_string, padding_to_u32, put_fixed_string};
use crate::util::safe_converter::SaturatingCast;

const LONG_NAME_LEN: usize = 20;
const SHORT_NAME_LEN: usize = 4;

/// `InPr`
///
/// Before protocol 2.28 the external port fields are single bytes and there is no
///  'names are default' flag; it decodes as `false` there.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InputProperties {
    pub source: u16,
    pub long_name: String,
    pub short_name: String,
    pub are_names_default: bool,
    /// bit set of available external port types
    pub external_ports_available: u16,
    pub external_port_type: u16,
    pub internal_port_type: u8,
    pub source_availability: u8,
    pub me_availability: u8,
}
impl AtemCommand for InputProperties {
    const NAME: CommandName = CommandName::new(b"InPr");

    fn ser(&self, buf: &mut BytesMut, version: ProtocolVersion) {
        buf.put_u16(self.source);
        put_fixed_string(buf, &self.long_name, LONG_NAME_LEN);
        put_fixed_string(buf, &self.short_name, SHORT_NAME_LEN);
        if version >= ProtocolVersion::V8_0 {
            put_bool(buf, self.are_names_default);
            buf.put_u8(0);
            buf.put_u16(self.external_ports_available);
            buf.put_u16(self.external_port_type);
        }
        else {
            buf.put_u8(self.external_ports_available as u8);
            buf.put_u8(self.external_port_type as u8);
        }
        buf.put_u8(self.internal_port_type);
        buf.put_u8(self.source_availability);
        buf.put_u8(self.me_availability);
        buf.put_u8(0);
    }

    fn deser(buf: &mut &[u8], version: ProtocolVersion) -> anyhow::Result<Self> {
        let is_legacy = version < ProtocolVersion::V8_0;
        ensure_remaining(buf, if is_legacy { 31 } else { 35 })?;

        let source = buf.get_u16();
        let long_name = get_fixed_string(buf, LONG_NAME_LEN);
        let short_name = get_fixed_string(buf, SHORT_NAME_LEN);
        let (are_names_default, external_ports_available, external_port_type) = if is_legacy {
            (false, buf.get_u8() as u16, buf.get_u8() as u16)
        }
        else {
            let are_names_default = get_bool(buf);
            buf.advance(1);
            (are_names_default, buf.get_u16(), buf.get_u16())
        };

        Ok(InputProperties {
            source,
            long_name,
            short_name,
            are_names_default,
            external_ports_available,
            external_port_type,
            internal_port_type: buf.get_u8(),
            source_availability: buf.get_u8(),
            me_availability: buf.get_u8(),
        })
    }
}

/// `CInL`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeInputProperties {
    pub source: u16,
    pub long_name: Option<String>,
    pub short_name: Option<String>,
    pub external_port_type: Option<u16>,
}
impl AtemCommand for ChangeInputProperties {
    const NAME: CommandName = CommandName::new(b"CInL");

    fn ser(&self, buf: &mut BytesMut, version: ProtocolVersion) {
        let mask = self.long_name.is_some() as u8
            | (self.short_name.is_some() as u8) << 1
            | (self.external_port_type.is_some() as u8) << 2;
        buf.put_u8(mask);
        buf.put_u8(0);
        buf.put_u16(self.source);
        put_fixed_string(buf, self.long_name.as_deref().unwrap_or(""), LONG_NAME_LEN);
        put_fixed_string(buf, self.short_name.as_deref().unwrap_or(""), SHORT_NAME_LEN);
        let port_type = self.external_port_type.unwrap_or(0);
        if version >= ProtocolVersion::V8_0 {
            buf.put_u16(port_type);
            buf.put_u16(0);
        }
        else {
            buf.put_u8(port_type as u8);
            buf.put_bytes(0, 3);
        }
    }

    fn deser(buf: &mut &[u8], version: ProtocolVersion) -> anyhow::Result<Self> {
        let is_legacy = version < ProtocolVersion::V8_0;
        ensure_remaining(buf, if is_legacy { 29 } else { 30 })?;

        let mask = buf.get_u8();
        buf.advance(1);
        let source = buf.get_u16();
        let long_name = get_fixed_string(buf, LONG_NAME_LEN);
        let short_name = get_fixed_string(buf, SHORT_NAME_LEN);
        let port_type = if is_legacy { buf.get_u8() as u16 } else { buf.get_u16() };

        Ok(ChangeInputProperties {
            source,
            long_name: (mask & 0x01 != 0).then_some(long_name),
            short_name: (mask & 0x02 != 0).then_some(short_name),
            external_port_type: (mask & 0x04 != 0).then_some(port_type),
        })
    }
}

/// `AuxS`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuxSource {
    pub aux: u8,
    pub source: u16,
}
impl AtemCommand for AuxSource {
    const NAME: CommandName = CommandName::new(b"AuxS");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.aux);
        buf.put_u8(0);
        buf.put_u16(self.source);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 4)?;
        let aux = buf.get_u8();
        buf.advance(1);
        Ok(AuxSource {
            aux,
            source: buf.get_u16(),
        })
    }
}

/// `CAuS`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeAuxSource {
    pub aux: u8,
    pub source: u16,
}
impl AtemCommand for ChangeAuxSource {
    const NAME: CommandName = CommandName::new(b"CAuS");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(0x01);
        buf.put_u8(self.aux);
        buf.put_u16(self.source);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 4)?;
        buf.advance(1);
        Ok(ChangeAuxSource {
            aux: buf.get_u8(),
            source: buf.get_u16(),
        })
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
    pub struct TallyFlags: u8 {
        const PROGRAM = 0x01;
        const PREVIEW = 0x02;
    }
}

/// `TlIn`: tally state for every input, by input index
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TallyByIndex {
    pub entries: Vec<TallyFlags>,
}
impl AtemCommand for TallyByIndex {
    const NAME: CommandName = CommandName::new(b"TlIn");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        let count: u16 = self.entries.len().saturating_cast();
        buf.put_u16(count);
        for flags in self.entries.iter().take(count as usize) {
            buf.put_u8(flags.bits());
        }
        buf.put_bytes(0, padding_to_u32(2 + count as usize));
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 2)?;
        let count = buf.get_u16() as usize;
        ensure_remaining(buf, count)?;
        let entries = (0..count)
            .map(|_| TallyFlags::from_bits_truncate(buf.get_u8()))
            .collect();
        Ok(TallyByIndex { entries })
    }
}
