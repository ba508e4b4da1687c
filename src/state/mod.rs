//! The mirrored device state. These are plain records: they are written only by
//!  [crate::state_sync::apply_command] and reflect what the device reported, never what was
//!  requested.

use std::collections::BTreeMap;

use crate::commands::{MediaPoolConfig, ProtocolVersion, TimeCode, Topology};
use crate::state::audio::AudioState;
use crate::state::media::MediaState;
use crate::state::video::VideoState;

pub mod audio;
pub mod media;
pub mod video;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AtemState {
    pub info: DeviceInfo,
    pub video: VideoState,
    /// keyed by source id
    pub inputs: BTreeMap<u16, InputChannel>,
    pub audio: AudioState,
    pub media: MediaState,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeviceInfo {
    pub api_version: Option<ProtocolVersion>,
    pub product_name: Option<String>,
    pub model: u8,
    pub capabilities: Option<Topology>,
    /// number of upstream keyers, by mix effect bus
    pub mix_effect_keyers: Vec<u8>,
    pub media_pool: Option<MediaPoolConfig>,
    /// the device finished sending its initial state dump
    pub init_complete: bool,
    pub main_power: bool,
    pub backup_power: bool,
    pub last_warning: Option<String>,
    pub timecode: Option<TimeCode>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InputChannel {
    pub long_name: String,
    pub short_name: String,
    pub are_names_default: bool,
    pub external_ports_available: u16,
    pub external_port_type: u16,
    pub internal_port_type: u8,
    pub source_availability: u8,
    pub me_availability: u8,
}

/// Returns the element at `index`, growing `items` with default elements if the device
///  addresses an index beyond what it announced so far.
pub(crate) fn grow_to<T: Default>(items: &mut Vec<T>, index: usize) -> &mut T {
    if index >= items.len() {
        items.resize_with(index + 1, T::default);
    }
    &mut items[index]
}

/// grows `items` to at least `count` elements, never shrinks
pub(crate) fn presize<T: Default>(items: &mut Vec<T>, count: usize) {
    if items.len() < count {
        items.resize_with(count, T::default);
    }
}
