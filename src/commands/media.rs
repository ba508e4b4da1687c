use bytes::{Buf, BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::commands::{clamp_enum, get_bool, mask_bit, put_bool, AtemCommand, ClosedEnum, CommandName, ProtocolVersion};
use crate::util::buf::{ensure_remaining, get_fixed_string, padding_to_u32, put_fixed_string};

const CLIP_NAME_LEN: usize = 64;

/// `MPfe`: one slot of the still store
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MediaPoolFrame {
    pub bank: u8,
    pub index: u16,
    pub is_used: bool,
    pub hash: [u8; 16],
    pub file_name: String,
}
impl AtemCommand for MediaPoolFrame {
    const NAME: CommandName = CommandName::new(b"MPfe");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        let name = self.file_name.as_bytes();
        let name = &name[..name.len().min(u8::MAX as usize)];

        buf.put_u8(self.bank);
        buf.put_u8(0);
        buf.put_u16(self.index);
        put_bool(buf, self.is_used);
        buf.put_slice(&self.hash);
        buf.put_u8(0);
        buf.put_u8(name.len() as u8);
        buf.put_slice(name);
        buf.put_bytes(0, padding_to_u32(23 + name.len()));
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 23)?;
        let bank = buf.get_u8();
        buf.advance(1);
        let index = buf.get_u16();
        let is_used = get_bool(buf);
        let mut hash = [0u8; 16];
        buf.copy_to_slice(&mut hash);
        buf.advance(1);
        let name_len = buf.get_u8() as usize;
        ensure_remaining(buf, name_len)?;
        Ok(MediaPoolFrame {
            bank,
            index,
            is_used,
            hash,
            file_name: get_fixed_string(buf, name_len),
        })
    }
}

/// `MPCS`: one slot of the clip store
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MediaPoolClip {
    pub index: u8,
    pub is_used: bool,
    pub name: String,
    pub frame_count: u16,
}
impl AtemCommand for MediaPoolClip {
    const NAME: CommandName = CommandName::new(b"MPCS");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.index);
        put_bool(buf, self.is_used);
        put_fixed_string(buf, &self.name, CLIP_NAME_LEN);
        buf.put_u16(self.frame_count);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 68)?;
        Ok(MediaPoolClip {
            index: buf.get_u8(),
            is_used: get_bool(buf),
            name: get_fixed_string(buf, CLIP_NAME_LEN),
            frame_count: buf.get_u16(),
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MediaSourceType {
    Still = 1,
    Clip = 2,
}
impl ClosedEnum for MediaSourceType {
    const LOWEST: Self = MediaSourceType::Still;
    const HIGHEST: Self = MediaSourceType::Clip;
}

/// `MPCE`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MediaPlayerSource {
    pub player: u8,
    pub source_type: MediaSourceType,
    pub still_index: u8,
    pub clip_index: u8,
}
impl AtemCommand for MediaPlayerSource {
    const NAME: CommandName = CommandName::new(b"MPCE");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(self.player);
        buf.put_u8(self.source_type.into());
        buf.put_u8(self.still_index);
        buf.put_u8(self.clip_index);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 4)?;
        Ok(MediaPlayerSource {
            player: buf.get_u8(),
            source_type: clamp_enum(buf.get_u8(), "MPCE.source_type"),
            still_index: buf.get_u8(),
            clip_index: buf.get_u8(),
        })
    }
}

/// `MPSS`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeMediaPlayerSource {
    pub player: u8,
    pub source_type: Option<MediaSourceType>,
    pub still_index: Option<u8>,
    pub clip_index: Option<u8>,
}
impl AtemCommand for ChangeMediaPlayerSource {
    const NAME: CommandName = CommandName::new(b"MPSS");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u8(mask_bit(&self.source_type, 0x01) | mask_bit(&self.still_index, 0x02) | mask_bit(&self.clip_index, 0x04));
        buf.put_u8(self.player);
        buf.put_u8(self.source_type.map(u8::from).unwrap_or(0));
        buf.put_u8(self.still_index.unwrap_or(0));
        buf.put_u8(self.clip_index.unwrap_or(0));
        buf.put_bytes(0, 3);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 5)?;
        let mask = buf.get_u8();
        let player = buf.get_u8();
        let source_type = buf.get_u8();
        let still_index = buf.get_u8();
        let clip_index = buf.get_u8();
        Ok(ChangeMediaPlayerSource {
            player,
            source_type: (mask & 0x01 != 0).then(|| clamp_enum(source_type, "MPSS.source_type")),
            still_index: (mask & 0x02 != 0).then_some(still_index),
            clip_index: (mask & 0x04 != 0).then_some(clip_index),
        })
    }
}
