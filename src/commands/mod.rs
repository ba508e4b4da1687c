//! Typed commands and their binary layouts.
//!
//! Every command type implements [AtemCommand] with the fixed layout for its four-character
//!  name. The closed [Command] enum wraps all of them and dispatches decoding through a lookup
//!  table keyed by name. Unknown names decode to `None` so that newer firmware does not break
//!  the client.
//!
//! Out-of-range values reported by the device are clamped to the nearest valid value and
//!  logged, never rejected: the device is the source of truth.

use std::fmt::{Debug, Display, Formatter};
use std::sync::LazyLock;
use anyhow::bail;
use bytes::{Buf, BufMut, BytesMut};
use num_enum::TryFromPrimitive;
use rustc_hash::FxHashMap;
use tracing::warn;

use crate::error::ProtocolError;
use crate::util::safe_converter::PrecheckedCast;

pub mod audio;
pub mod data_transfer;
pub mod device;
pub mod input;
pub mod keyer;
pub mod media;
pub mod mix_effect;
pub mod transition;

pub use audio::*;
pub use data_transfer::*;
pub use device::*;
pub use input::*;
pub use keyer::*;
pub use media::*;
pub use mix_effect::*;
pub use transition::*;

/// length, reserved, four-character name
pub const FRAME_HEADER_LEN: usize = 8;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct CommandName(pub [u8; 4]);

impl CommandName {
    pub const fn new(name: &[u8; 4]) -> CommandName {
        CommandName(*name)
    }
}

impl Display for CommandName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}
impl Debug for CommandName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CommandName({})", self)
    }
}

/// `major << 16 | minor` as reported by the device's `_ver` command
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ProtocolVersion(pub u32);

impl ProtocolVersion {
    /// firmware 7.2
    pub const V7_2: ProtocolVersion = ProtocolVersion(0x0002_0016);
    /// firmware 8.0, changes the layout of the input property commands
    pub const V8_0: ProtocolVersion = ProtocolVersion(0x0002_001C);
    /// firmware 8.1.1
    pub const V8_1_1: ProtocolVersion = ProtocolVersion(0x0002_001E);
    /// assumed until the device reports its version
    pub const LATEST: ProtocolVersion = Self::V8_1_1;

    pub fn from_parts(major: u16, minor: u16) -> ProtocolVersion {
        ProtocolVersion(((major as u32) << 16) | minor as u32)
    }

    pub fn major(&self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn minor(&self) -> u16 {
        self.0 as u16
    }
}

impl Display for ProtocolVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

/// A command with a fixed binary layout. The same trait serves setters (sent by the client) and
///  notifiers (sent by the device) so that both directions can be encoded and decoded.
pub trait AtemCommand: Sized {
    const NAME: CommandName;

    /// writes the payload, i.e. everything after the frame header
    fn ser(&self, buf: &mut BytesMut, version: ProtocolVersion);

    /// Parses the payload. Devices may append padding or fields this client does not know
    ///  about, so trailing bytes are ignored.
    fn deser(buf: &mut &[u8], version: ProtocolVersion) -> anyhow::Result<Self>;
}

/// Closed enumerations on the wire. Unknown raw values are clamped to the nearest end of the
///  range.
pub trait ClosedEnum: TryFromPrimitive<Primitive = u8> + Into<u8> + Copy + Debug {
    const LOWEST: Self;
    const HIGHEST: Self;
}

pub(crate) fn clamp_enum<T: ClosedEnum>(raw: u8, field: &str) -> T {
    match T::try_from_primitive(raw) {
        Ok(value) => value,
        Err(_) => {
            let clamped = if raw < T::LOWEST.into() { T::LOWEST } else { T::HIGHEST };
            warn!("{}: value {} out of range, clamped to {:?}", field, raw, clamped);
            clamped
        }
    }
}

pub(crate) fn clamp_value<T: PartialOrd + Copy + Display>(raw: T, min: T, max: T, field: &str) -> T {
    if raw < min {
        warn!("{}: value {} below minimum, clamped to {}", field, raw, min);
        min
    }
    else if raw > max {
        warn!("{}: value {} above maximum, clamped to {}", field, raw, max);
        max
    }
    else {
        raw
    }
}

pub(crate) fn get_bool(buf: &mut impl Buf) -> bool {
    buf.get_u8() != 0
}

pub(crate) fn put_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(value as u8);
}

/// sets `bit` in a change mask if the setter field is present
pub(crate) fn mask_bit<T>(value: &Option<T>, bit: u8) -> u8 {
    if value.is_some() { bit } else { 0 }
}

type Decoder = fn(&[u8], ProtocolVersion) -> anyhow::Result<Command>;

fn decode_as<T: AtemCommand + Into<Command>>(payload: &[u8], version: ProtocolVersion) -> anyhow::Result<Command> {
    let mut buf = payload;
    Ok(T::deser(&mut buf, version)?.into())
}

macro_rules! atem_commands {
    ($($variant:ident),* $(,)?) => {
        /// All commands known to this client, in both directions
        #[derive(Clone, Debug, Eq, PartialEq)]
        pub enum Command {
            $($variant($variant),)*
        }

        $(
        impl From<$variant> for Command {
            fn from(value: $variant) -> Command {
                Command::$variant(value)
            }
        }
        )*

        impl Command {
            pub fn name(&self) -> CommandName {
                match self {
                    $(Command::$variant(_) => <$variant as AtemCommand>::NAME,)*
                }
            }

            fn ser_payload(&self, buf: &mut BytesMut, version: ProtocolVersion) {
                match self {
                    $(Command::$variant(cmd) => cmd.ser(buf, version),)*
                }
            }
        }

        static DECODERS: LazyLock<FxHashMap<CommandName, Decoder>> = LazyLock::new(|| {
            let mut decoders = FxHashMap::default();
            $(decoders.insert(<$variant as AtemCommand>::NAME, decode_as::<$variant> as Decoder);)*
            decoders
        });

        #[cfg(test)]
        const NUM_COMMAND_TYPES: usize = [$(stringify!($variant)),*].len();
    };
}

atem_commands!(
    Version, ProductIdentifier, Topology, MixEffectConfig, MediaPoolConfig, InitComplete, Warning, PowerStatus, TimeCode,
    ProgramInput, PreviewInput, ChangeProgramInput, ChangePreviewInput, Cut, Auto,
    TransitionProperties, ChangeTransitionProperties, TransitionPosition, ChangeTransitionPosition,
    TransitionPreview, ChangeTransitionPreview, TransitionMixSettings, ChangeTransitionMixSettings,
    UpstreamKeyerOnAir, ChangeUpstreamKeyerOnAir, UpstreamKeyerBase, ChangeUpstreamKeyerType,
    ChangeUpstreamKeyerFillSource, ChangeUpstreamKeyerCutSource,
    DownstreamKeyerState, DownstreamKeyerSources, ChangeDownstreamKeyerOnAir, AutoDownstreamKeyer,
    ChangeDownstreamKeyerFillSource, ChangeDownstreamKeyerCutSource,
    InputProperties, ChangeInputProperties, AuxSource, ChangeAuxSource, TallyByIndex,
    AudioMixerInput, ChangeAudioMixerInput, AudioMixerMaster, ChangeAudioMixerMaster,
    MediaPoolFrame, MediaPoolClip, MediaPlayerSource, ChangeMediaPlayerSource,
    LockRequest, LockState, LockObtained, TransferUploadRequest, TransferChunkParams, TransferData,
    TransferFileDescription, TransferComplete, TransferError,
);

impl Command {
    /// Decodes a command payload. `Ok(None)` means the name is unknown to this client; the
    ///  caller should skip it.
    pub fn decode(name: CommandName, payload: &[u8], version: ProtocolVersion) -> anyhow::Result<Option<Command>> {
        match DECODERS.get(&name) {
            Some(decoder) => decoder(payload, version).map(Some),
            None => Ok(None),
        }
    }

    /// Serializes the command with its frame header.
    pub fn encode_frame(&self, version: ProtocolVersion) -> anyhow::Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u16(0);
        buf.put_u16(0);
        buf.put_slice(&self.name().0);
        self.ser_payload(&mut buf, version);

        if buf.len() > u16::MAX as usize {
            bail!("{} frame of {} bytes exceeds the frame length field", self.name(), buf.len());
        }
        let len: u16 = buf.len().prechecked_cast();
        buf[..2].copy_from_slice(&len.to_be_bytes());
        Ok(buf)
    }

    /// commands that belong to the data transfer sub-protocol and are routed to its manager
    pub fn is_data_transfer(&self) -> bool {
        matches!(self,
            Command::LockState(_) | Command::LockObtained(_) | Command::TransferChunkParams(_)
            | Command::TransferData(_) | Command::TransferComplete(_) | Command::TransferError(_)
        )
    }
}

/// a command frame inside a packet payload, not decoded yet
#[derive(Debug, Eq, PartialEq)]
pub struct RawFrame<'a> {
    pub name: CommandName,
    pub payload: &'a [u8],
}

/// Splits off the next command frame. A frame with an inconsistent length field makes the rest
///  of the packet unusable since the start of the next frame is unknown.
pub fn next_frame<'a>(buf: &mut &'a [u8]) -> Result<Option<RawFrame<'a>>, ProtocolError> {
    if buf.is_empty() {
        return Ok(None);
    }
    if buf.len() < FRAME_HEADER_LEN {
        return Err(ProtocolError::MalformedCommand(format!("{} trailing bytes are too short for a frame header", buf.len())));
    }

    let len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
    if len < FRAME_HEADER_LEN || len > buf.len() {
        return Err(ProtocolError::MalformedCommand(format!("frame length {} does not fit the remaining {} bytes", len, buf.len())));
    }

    let name = CommandName([buf[4], buf[5], buf[6], buf[7]]);
    let payload = &buf[FRAME_HEADER_LEN..len];
    buf.advance(len);
    Ok(Some(RawFrame { name, payload }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rstest::rstest;

    #[test]
    fn test_command_names_are_unique() {
        assert_eq!(DECODERS.len(), NUM_COMMAND_TYPES);
    }

    #[test]
    fn test_encode_frame() {
        let frame = Command::from(Cut { mix_effect: 1 })
            .encode_frame(ProtocolVersion::LATEST)
            .unwrap();
        assert_eq!(frame.as_ref(), b"\x00\x0c\x00\x00DCut\x01\x00\x00\x00");
    }

    #[test]
    fn test_next_frame_sequence() {
        let raw = b"\x00\x0c\x00\x00DCut\x01\x00\x00\x00\x00\x08\x00\x00InCm";
        let mut buf: &[u8] = raw;

        let first = next_frame(&mut buf).unwrap().unwrap();
        assert_eq!(first.name, CommandName::new(b"DCut"));
        assert_eq!(first.payload, &[1, 0, 0, 0]);

        let second = next_frame(&mut buf).unwrap().unwrap();
        assert_eq!(second.name, CommandName::new(b"InCm"));
        assert!(second.payload.is_empty());

        assert_eq!(next_frame(&mut buf).unwrap(), None);
    }

    #[rstest]
    #[case::short_header(b"\x00\x0c\x00\x00DC".to_vec())]
    #[case::length_below_header(b"\x00\x04\x00\x00DCut".to_vec())]
    #[case::length_beyond_packet(b"\x00\x20\x00\x00DCut\x01\x00\x00\x00".to_vec())]
    fn test_next_frame_malformed(#[case] raw: Vec<u8>) {
        let mut buf: &[u8] = &raw;
        assert!(matches!(next_frame(&mut buf), Err(ProtocolError::MalformedCommand(_))));
    }

    #[test]
    fn test_decode_unknown_name() {
        let decoded = Command::decode(CommandName::new(b"Zzzz"), &[1, 2, 3, 4], ProtocolVersion::LATEST).unwrap();
        assert_eq!(decoded, None);
    }

    #[test]
    fn test_decode_truncated_payload() {
        assert!(Command::decode(CommandName::new(b"PrgI"), &[1, 0], ProtocolVersion::LATEST).is_err());
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let decoded = Command::decode(CommandName::new(b"PrgI"), &[2, 0, 0, 4, 0xff, 0xff], ProtocolVersion::LATEST).unwrap();
        assert_eq!(decoded, Some(Command::ProgramInput(ProgramInput { mix_effect: 2, source: 4 })));
    }

    fn sample_commands() -> Vec<Command> {
        vec![
            Version { major: 2, minor: 30 }.into(),
            ProductIdentifier { name: "ATEM Television Studio HD".to_string(), model: 5 }.into(),
            Topology { mix_effects: 2, sources: 24, downstream_keyers: 2, auxiliaries: 3, mix_minus_outputs: 0, media_players: 2, serial_ports: 1, hyperdecks: 4, dves: 1, stingers: 1, super_sources: 1 }.into(),
            MixEffectConfig { mix_effect: 1, keyer_count: 4 }.into(),
            MediaPoolConfig { still_count: 20, clip_count: 2 }.into(),
            InitComplete.into(),
            Warning { text: "Media pool full".to_string() }.into(),
            PowerStatus { main_power: true, backup_power: false }.into(),
            TimeCode { hours: 10, minutes: 11, seconds: 12, frames: 24, drop_frame: true }.into(),
            ProgramInput { mix_effect: 3, source: 1000 }.into(),
            PreviewInput { mix_effect: 0, source: 3010, in_program: true }.into(),
            ChangeProgramInput { mix_effect: 1, source: 2 }.into(),
            ChangePreviewInput { mix_effect: 0, source: 3 }.into(),
            Cut { mix_effect: 1 }.into(),
            Auto { mix_effect: 0 }.into(),
            TransitionProperties { mix_effect: 0, style: TransitionStyle::Wipe, selection: TransitionSelection::BACKGROUND | TransitionSelection::KEY2, next_style: TransitionStyle::Dip, next_selection: TransitionSelection::KEY1 }.into(),
            ChangeTransitionProperties { mix_effect: 1, style: Some(TransitionStyle::Sting), selection: None }.into(),
            TransitionPosition { mix_effect: 0, in_transition: true, remaining_frames: 17, handle_position: 5000 }.into(),
            ChangeTransitionPosition { mix_effect: 1, handle_position: 9999 }.into(),
            TransitionPreview { mix_effect: 1, enabled: true }.into(),
            ChangeTransitionPreview { mix_effect: 0, enabled: true }.into(),
            TransitionMixSettings { mix_effect: 0, rate: 25 }.into(),
            ChangeTransitionMixSettings { mix_effect: 1, rate: 250 }.into(),
            UpstreamKeyerOnAir { mix_effect: 0, keyer: 3, on_air: true }.into(),
            ChangeUpstreamKeyerOnAir { mix_effect: 1, keyer: 0, on_air: true }.into(),
            UpstreamKeyerBase { mix_effect: 1, keyer: 2, key_type: KeyType::Chroma, can_fly: true, fly_enabled: false, fill_source: 5, cut_source: 6, masked: true, mask_top: -9000, mask_bottom: 4500, mask_left: -16000, mask_right: 12 }.into(),
            ChangeUpstreamKeyerType { mix_effect: 0, keyer: 1, key_type: None, fly_enabled: Some(true) }.into(),
            ChangeUpstreamKeyerFillSource { mix_effect: 1, keyer: 1, source: 3010 }.into(),
            ChangeUpstreamKeyerCutSource { mix_effect: 1, keyer: 1, source: 3011 }.into(),
            DownstreamKeyerState { keyer: 1, on_air: true, in_transition: false, is_auto_transitioning: true, remaining_frames: 8 }.into(),
            DownstreamKeyerSources { keyer: 0, fill_source: 3010, cut_source: 3011 }.into(),
            ChangeDownstreamKeyerOnAir { keyer: 1, on_air: true }.into(),
            AutoDownstreamKeyer { keyer: 1 }.into(),
            ChangeDownstreamKeyerFillSource { keyer: 0, source: 3020 }.into(),
            ChangeDownstreamKeyerCutSource { keyer: 0, source: 3021 }.into(),
            InputProperties { source: 1, long_name: "Camera 1".to_string(), short_name: "CAM1".to_string(), are_names_default: true, external_ports_available: 0x0b, external_port_type: 2, internal_port_type: 0, source_availability: 0x1f, me_availability: 3 }.into(),
            ChangeInputProperties { source: 2, long_name: Some("Stage".to_string()), short_name: None, external_port_type: Some(4) }.into(),
            AuxSource { aux: 2, source: 10010 }.into(),
            ChangeAuxSource { aux: 0, source: 8001 }.into(),
            TallyByIndex { entries: vec![TallyFlags::PROGRAM, TallyFlags::empty(), TallyFlags::PREVIEW | TallyFlags::PROGRAM] }.into(),
            AudioMixerInput { index: 1301, mix_option: AudioMixOption::AudioFollowVideo, gain: 32768, balance: -2500 }.into(),
            ChangeAudioMixerInput { index: 2, mix_option: Some(AudioMixOption::On), gain: None, balance: Some(-10000) }.into(),
            AudioMixerMaster { gain: 65381, balance: 10000, follow_fade_to_black: true }.into(),
            ChangeAudioMixerMaster { gain: None, balance: Some(100), follow_fade_to_black: Some(true) }.into(),
            MediaPoolFrame { bank: 0, index: 3, is_used: true, hash: [7; 16], file_name: "logo.png".to_string() }.into(),
            MediaPoolClip { index: 1, is_used: true, name: "Opener".to_string(), frame_count: 250 }.into(),
            MediaPlayerSource { player: 0, source_type: MediaSourceType::Still, still_index: 12, clip_index: 1 }.into(),
            ChangeMediaPlayerSource { player: 1, source_type: Some(MediaSourceType::Clip), still_index: None, clip_index: Some(1) }.into(),
            LockRequest { store: 2, locked: true }.into(),
            LockState { store: 0, locked: false }.into(),
            LockObtained { store: 1 }.into(),
            TransferUploadRequest { transfer_id: 7, store: 0, slot: 4, size: 1_000_000, mode: 1 }.into(),
            TransferChunkParams { transfer_id: 7, chunk_size: 1392, chunk_count: 20 }.into(),
            TransferData { transfer_id: 7, data: Bytes::from_static(&[1, 2, 3, 4, 5]) }.into(),
            TransferFileDescription { transfer_id: 7, name: "still".to_string(), description: "a still".to_string(), hash: [0xab; 16] }.into(),
            TransferComplete { transfer_id: 7 }.into(),
            TransferError { transfer_id: 7, code: 1 }.into(),
        ]
    }

    #[test]
    fn test_samples_cover_every_command() {
        let names = sample_commands().iter()
            .map(Command::name)
            .collect::<std::collections::BTreeSet<_>>();
        assert_eq!(names.len(), NUM_COMMAND_TYPES);
    }

    #[test]
    fn test_decode_reverses_encode() {
        for command in sample_commands() {
            let frame = command.encode_frame(ProtocolVersion::LATEST).unwrap();
            let mut buf: &[u8] = &frame;
            let raw = next_frame(&mut buf).unwrap().unwrap();
            assert_eq!(raw.name, command.name());
            assert_eq!(frame.len() % 4, 0, "{} frame is not padded", raw.name);

            let decoded = Command::decode(raw.name, raw.payload, ProtocolVersion::LATEST).unwrap();
            assert_eq!(decoded, Some(command));
        }
    }

    #[rstest]
    #[case::legacy(ProtocolVersion::V7_2, 32)]
    #[case::current(ProtocolVersion::V8_0, 36)]
    fn test_input_properties_layout_by_version(#[case] version: ProtocolVersion, #[case] expected_len: usize) {
        let command: Command = InputProperties { source: 1, long_name: "Camera 1".to_string(), short_name: "CAM1".to_string(), are_names_default: false, external_ports_available: 3, external_port_type: 2, internal_port_type: 0, source_availability: 0x1f, me_availability: 3 }.into();
        let frame = command.encode_frame(version).unwrap();
        assert_eq!(frame.len(), FRAME_HEADER_LEN + expected_len);

        let decoded = Command::decode(command.name(), &frame[FRAME_HEADER_LEN..], version).unwrap();
        assert_eq!(decoded, Some(command));
    }

    #[test]
    fn test_protocol_version() {
        let version = ProtocolVersion::from_parts(2, 28);
        assert_eq!(version, ProtocolVersion::V8_0);
        assert_eq!(version.to_string(), "2.28");
        assert!(ProtocolVersion::V7_2 < version);
    }
}
