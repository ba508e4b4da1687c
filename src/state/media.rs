use crate::commands::MediaSourceType;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MediaState {
    pub still_pool: Vec<StillSlot>,
    pub clip_pool: Vec<ClipSlot>,
    pub players: Vec<MediaPlayer>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StillSlot {
    pub is_used: bool,
    pub hash: [u8; 16],
    pub file_name: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ClipSlot {
    pub is_used: bool,
    pub name: String,
    pub frame_count: u16,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MediaPlayer {
    pub source_type: Option<MediaSourceType>,
    pub still_index: u8,
    pub clip_index: u8,
}
