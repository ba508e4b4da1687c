use bytes::{Buf, BufMut, BytesMut};

use crate::commands::{get_bool, put_bool, AtemCommand, CommandName, ProtocolVersion};
use crate::util::buf::ensure_remaining;

/// `PrgI`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProgramInput {
    pub mix_effect: u8,
    pub source: u16,
}
impl AtemCommand for ProgramInput {
    const NAME: CommandName = CommandName::new(b"PrgI");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.mix_effect);
        buf.put_u8(0);
        buf.put_u16(self.source);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 4)?;
        let mix_effect = buf.get_u8();
        buf.advance(1);
        Ok(ProgramInput {
            mix_effect,
            source: buf.get_u16(),
        })
    }
}

/// `PrvI`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PreviewInput {
    pub mix_effect: u8,
    pub source: u16,
    /// preview is visible on program, e.g. during a transition preview
    pub in_program: bool,
}
impl AtemCommand for PreviewInput {
    const NAME: CommandName = CommandName::new(b"PrvI");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.mix_effect);
        buf.put_u8(0);
        buf.put_u16(self.source);
        put_bool(buf, self.in_program);
        buf.put_bytes(0, 3);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 5)?;
        let mix_effect = buf.get_u8();
        buf.advance(1);
        Ok(PreviewInput {
            mix_effect,
            source: buf.get_u16(),
            in_program: get_bool(buf),
        })
    }
}

/// `CPgI`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeProgramInput {
    pub mix_effect: u8,
    pub source: u16,
}
impl AtemCommand for ChangeProgramInput {
    const NAME: CommandName = CommandName::new(b"CPgI");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.mix_effect);
        buf.put_u8(0);
        buf.put_u16(self.source);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 4)?;
        let mix_effect = buf.get_u8();
        buf.advance(1);
        Ok(ChangeProgramInput {
            mix_effect,
            source: buf.get_u16(),
        })
    }
}

/// `CPvI`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangePreviewInput {
    pub mix_effect: u8,
    pub source: u16,
}
impl AtemCommand for ChangePreviewInput {
    const NAME: CommandName = CommandName::new(b"CPvI");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.mix_effect);
        buf.put_u8(0);
        buf.put_u16(self.source);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 4)?;
        let mix_effect = buf.get_u8();
        buf.advance(1);
        Ok(ChangePreviewInput {
            mix_effect,
            source: buf.get_u16(),
        })
    }
}

/// `DCut`: swaps program and preview without a transition
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Cut {
    pub mix_effect: u8,
}
impl AtemCommand for Cut {
    const NAME: CommandName = CommandName::new(b"DCut");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.mix_effect);
        buf.put_bytes(0, 3);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 1)?;
        Ok(Cut {
            mix_effect: buf.get_u8(),
        })
    }
}

/// `DAut`: runs the configured transition
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Auto {
    pub mix_effect: u8,
}
impl AtemCommand for Auto {
    const NAME: CommandName = CommandName::new(b"DAut");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.mix_effect);
        buf.put_bytes(0, 3);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 1)?;
        Ok(Auto {
            mix_effect: buf.get_u8(),
        })
    }
}
