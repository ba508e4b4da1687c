use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::commands::{get_bool, put_bool, AtemCommand, CommandName, ProtocolVersion, FRAME_HEADER_LEN};
use crate::util::buf::{ensure_remaining, get_fixed_string, padding_to_u32, put_fixed_string};
use crate::util::safe_converter::SaturatingCast;

/// `LOCK`: requests or releases the lock on a media store
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LockRequest {
    pub store: u16,
    pub locked: bool,
}
impl AtemCommand for LockRequest {
    const NAME: CommandName = CommandName::new(b"LOCK");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u16(self.store);
        put_bool(buf, self.locked);
        buf.put_u8(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 3)?;
        Ok(LockRequest {
            store: buf.get_u16(),
            locked: get_bool(buf),
        })
    }
}

/// `LKST`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LockState {
    pub store: u16,
    pub locked: bool,
}
impl AtemCommand for LockState {
    const NAME: CommandName = CommandName::new(b"LKST");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u16(self.store);
        put_bool(buf, self.locked);
        buf.put_u8(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 3)?;
        Ok(LockState {
            store: buf.get_u16(),
            locked: get_bool(buf),
        })
    }
}

/// `LKOB`: the lock was granted to this client
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LockObtained {
    pub store: u16,
}
impl AtemCommand for LockObtained {
    const NAME: CommandName = CommandName::new(b"LKOB");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u16(self.store);
        buf.put_u16(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 2)?;
        Ok(LockObtained {
            store: buf.get_u16(),
        })
    }
}

/// `FTSD`: announces an upload
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransferUploadRequest {
    pub transfer_id: u16,
    pub store: u16,
    pub slot: u16,
    pub size: u32,
    pub mode: u16,
}
impl AtemCommand for TransferUploadRequest {
    const NAME: CommandName = CommandName::new(b"FTSD");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u16(self.transfer_id);
        buf.put_u16(self.store);
        buf.put_u16(0);
        buf.put_u16(self.slot);
        buf.put_u32(self.size);
        buf.put_u16(self.mode);
        buf.put_u16(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 14)?;
        let transfer_id = buf.get_u16();
        let store = buf.get_u16();
        buf.advance(2);
        Ok(TransferUploadRequest {
            transfer_id,
            store,
            slot: buf.get_u16(),
            size: buf.get_u32(),
            mode: buf.get_u16(),
        })
    }
}

/// `FTCD`: the device is ready for `chunk_count` more chunks of at most `chunk_size` bytes
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransferChunkParams {
    pub transfer_id: u16,
    pub chunk_size: u16,
    pub chunk_count: u16,
}
impl AtemCommand for TransferChunkParams {
    const NAME: CommandName = CommandName::new(b"FTCD");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u16(self.transfer_id);
        buf.put_u32(0);
        buf.put_u16(self.chunk_size);
        buf.put_u16(self.chunk_count);
        buf.put_u16(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 10)?;
        let transfer_id = buf.get_u16();
        buf.advance(4);
        Ok(TransferChunkParams {
            transfer_id,
            chunk_size: buf.get_u16(),
            chunk_count: buf.get_u16(),
        })
    }
}

/// `FTDa`: one chunk of transfer data. Chunks carry no index, the device appends them in the
///  order they arrive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransferData {
    pub transfer_id: u16,
    pub data: Bytes,
}
impl TransferData {
    /// transfer id and size fields in front of the data
    pub const OVERHEAD: usize = FRAME_HEADER_LEN + 4;
}
impl AtemCommand for TransferData {
    const NAME: CommandName = CommandName::new(b"FTDa");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u16(self.transfer_id);
        buf.put_u16(self.data.len().saturating_cast());
        buf.put_slice(&self.data);
        buf.put_bytes(0, padding_to_u32(self.data.len()));
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 4)?;
        let transfer_id = buf.get_u16();
        let size = buf.get_u16() as usize;
        ensure_remaining(buf, size)?;
        Ok(TransferData {
            transfer_id,
            data: buf.copy_to_bytes(size),
        })
    }
}

/// `FTFD`: metadata sent after the last chunk of an upload
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransferFileDescription {
    pub transfer_id: u16,
    pub name: String,
    pub description: String,
    pub hash: [u8; 16],
}
impl AtemCommand for TransferFileDescription {
    const NAME: CommandName = CommandName::new(b"FTFD");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u16(self.transfer_id);
        put_fixed_string(buf, &self.name, 64);
        put_fixed_string(buf, &self.description, 128);
        buf.put_slice(&self.hash);
        buf.put_u16(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 210)?;
        let transfer_id = buf.get_u16();
        let name = get_fixed_string(buf, 64);
        let description = get_fixed_string(buf, 128);
        let mut hash = [0u8; 16];
        buf.copy_to_slice(&mut hash);
        Ok(TransferFileDescription {
            transfer_id,
            name,
            description,
            hash,
        })
    }
}

/// `FTDC`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransferComplete {
    pub transfer_id: u16,
}
impl AtemCommand for TransferComplete {
    const NAME: CommandName = CommandName::new(b"FTDC");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u16(self.transfer_id);
        buf.put_u16(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 2)?;
        Ok(TransferComplete {
            transfer_id: buf.get_u16(),
        })
    }
}

/// `FTDE`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransferError {
    pub transfer_id: u16,
    pub code: u8,
}
impl AtemCommand for TransferError {
    const NAME: CommandName = CommandName::new(b"FTDE");

    fn ser(&self, buf: &mut BytesMut, _version: ProtocolVersion) {
        buf.put_u16(self.transfer_id);
        buf.put_u8(self.code);
        buf.put_u8(0);
    }

    fn deser(buf: &mut &[u8], _version: ProtocolVersion) -> anyhow::Result<Self> {
        ensure_remaining(buf, 3)?;
        Ok(TransferError {
            transfer_id: buf.get_u16(),
            code: buf.get_u8(),
        })
    }
}
