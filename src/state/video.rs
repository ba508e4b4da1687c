use crate::commands::{KeyType, TallyFlags, TransitionSelection, TransitionStyle};

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VideoState {
    pub mix_effects: Vec<MixEffect>,
    pub downstream_keyers: Vec<DownstreamKeyer>,
    /// selected source, by aux output
    pub auxiliaries: Vec<u16>,
    /// by input index, as the device orders its tally
    pub tally: Vec<TallyFlags>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MixEffect {
    pub program_input: u16,
    pub preview_input: u16,
    pub preview_in_program: bool,
    pub transition: TransitionState,
    pub upstream_keyers: Vec<UpstreamKeyer>,
}

/// Enum-valued fields are `None` until the device reports them.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TransitionState {
    pub style: Option<TransitionStyle>,
    pub selection: Option<TransitionSelection>,
    pub next_style: Option<TransitionStyle>,
    pub next_selection: Option<TransitionSelection>,
    pub in_transition: bool,
    pub remaining_frames: u8,
    pub handle_position: u16,
    pub preview: bool,
    pub mix_rate: u8,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UpstreamKeyer {
    pub on_air: bool,
    pub key_type: Option<KeyType>,
    pub can_fly: bool,
    pub fly_enabled: bool,
    pub fill_source: u16,
    pub cut_source: u16,
    pub mask: KeyerMask,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct KeyerMask {
    pub enabled: bool,
    pub top: i16,
    pub bottom: i16,
    pub left: i16,
    pub right: i16,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DownstreamKeyer {
    pub on_air: bool,
    pub in_transition: bool,
    pub is_auto_transitioning: bool,
    pub remaining_frames: u8,
    pub fill_source: u16,
    pub cut_source: u16,
}
