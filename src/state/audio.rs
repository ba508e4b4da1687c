use std::collections::BTreeMap;

use crate::commands::AudioMixOption;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AudioState {
    /// keyed by audio source index, which is sparse
    pub channels: BTreeMap<u16, AudioChannel>,
    pub master: AudioMaster,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AudioChannel {
    pub mix_option: Option<AudioMixOption>,
    pub gain: u16,
    pub balance: i16,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AudioMaster {
    pub gain: u16,
    pub balance: i16,
    pub follow_fade_to_black: bool,
}
