//! Applies decoded notifier commands to the mirrored state.
//!
//! Every notifier writes all the fields it carries and reports the path(s) it addresses,
//!  whether or not the values differ from what was there before. Re-applying a command is
//!  therefore a no-op on the tree and reports the same paths again. Setters and transfer
//!  commands do not describe device state and report nothing.

use tracing::trace;

use crate::commands::Command;
use crate::state::{grow_to, presize, AtemState};

/// Applies `command` to `state`, returning the dotted paths of the nodes it wrote.
pub fn apply_command(state: &mut AtemState, command: &Command) -> Vec<String> {
    match command {
        Command::Version(cmd) => {
            state.info.api_version = Some(cmd.protocol_version());
            vec!["info.apiVersion".to_string()]
        }
        Command::ProductIdentifier(cmd) => {
            state.info.product_name = Some(cmd.name.clone());
            state.info.model = cmd.model;
            vec!["info.productIdentifier".to_string()]
        }
        Command::Topology(cmd) => {
            presize(&mut state.video.mix_effects, cmd.mix_effects as usize);
            presize(&mut state.video.downstream_keyers, cmd.downstream_keyers as usize);
            presize(&mut state.video.auxiliaries, cmd.auxiliaries as usize);
            presize(&mut state.media.players, cmd.media_players as usize);
            state.info.capabilities = Some(cmd.clone());
            vec!["info.capabilities".to_string()]
        }
        Command::MixEffectConfig(cmd) => {
            *grow_to(&mut state.info.mix_effect_keyers, cmd.mix_effect as usize) = cmd.keyer_count;
            let me = grow_to(&mut state.video.mix_effects, cmd.mix_effect as usize);
            presize(&mut me.upstream_keyers, cmd.keyer_count as usize);
            vec![format!("info.mixEffects.{}", cmd.mix_effect)]
        }
        Command::MediaPoolConfig(cmd) => {
            presize(&mut state.media.still_pool, cmd.still_count as usize);
            presize(&mut state.media.clip_pool, cmd.clip_count as usize);
            state.info.media_pool = Some(cmd.clone());
            vec!["info.mediaPool".to_string()]
        }
        Command::InitComplete(_) => {
            state.info.init_complete = true;
            vec!["info.initComplete".to_string()]
        }
        Command::Warning(cmd) => {
            state.info.last_warning = Some(cmd.text.clone());
            vec!["info.lastWarning".to_string()]
        }
        Command::PowerStatus(cmd) => {
            state.info.main_power = cmd.main_power;
            state.info.backup_power = cmd.backup_power;
            vec!["info.power".to_string()]
        }
        Command::TimeCode(cmd) => {
            state.info.timecode = Some(cmd.clone());
            vec!["info.timecode".to_string()]
        }

        Command::ProgramInput(cmd) => {
            grow_to(&mut state.video.mix_effects, cmd.mix_effect as usize).program_input = cmd.source;
            vec![format!("video.ME.{}.programInput", cmd.mix_effect)]
        }
        Command::PreviewInput(cmd) => {
            let me = grow_to(&mut state.video.mix_effects, cmd.mix_effect as usize);
            me.preview_input = cmd.source;
            me.preview_in_program = cmd.in_program;
            vec![format!("video.ME.{}.previewInput", cmd.mix_effect)]
        }
        Command::TransitionProperties(cmd) => {
            let transition = &mut grow_to(&mut state.video.mix_effects, cmd.mix_effect as usize).transition;
            transition.style = Some(cmd.style);
            transition.selection = Some(cmd.selection);
            transition.next_style = Some(cmd.next_style);
            transition.next_selection = Some(cmd.next_selection);
            vec![format!("video.ME.{}.transition.properties", cmd.mix_effect)]
        }
        Command::TransitionPosition(cmd) => {
            let transition = &mut grow_to(&mut state.video.mix_effects, cmd.mix_effect as usize).transition;
            transition.in_transition = cmd.in_transition;
            transition.remaining_frames = cmd.remaining_frames;
            transition.handle_position = cmd.handle_position;
            vec![format!("video.ME.{}.transition.position", cmd.mix_effect)]
        }
        Command::TransitionPreview(cmd) => {
            grow_to(&mut state.video.mix_effects, cmd.mix_effect as usize).transition.preview = cmd.enabled;
            vec![format!("video.ME.{}.transition.preview", cmd.mix_effect)]
        }
        Command::TransitionMixSettings(cmd) => {
            grow_to(&mut state.video.mix_effects, cmd.mix_effect as usize).transition.mix_rate = cmd.rate;
            vec![format!("video.ME.{}.transition.mixRate", cmd.mix_effect)]
        }

        Command::UpstreamKeyerOnAir(cmd) => {
            let me = grow_to(&mut state.video.mix_effects, cmd.mix_effect as usize);
            grow_to(&mut me.upstream_keyers, cmd.keyer as usize).on_air = cmd.on_air;
            vec![format!("video.ME.{}.upstreamKeyers.{}.onAir", cmd.mix_effect, cmd.keyer)]
        }
        Command::UpstreamKeyerBase(cmd) => {
            let me = grow_to(&mut state.video.mix_effects, cmd.mix_effect as usize);
            let keyer = grow_to(&mut me.upstream_keyers, cmd.keyer as usize);
            keyer.key_type = Some(cmd.key_type);
            keyer.can_fly = cmd.can_fly;
            keyer.fly_enabled = cmd.fly_enabled;
            keyer.fill_source = cmd.fill_source;
            keyer.cut_source = cmd.cut_source;
            keyer.mask.enabled = cmd.masked;
            keyer.mask.top = cmd.mask_top;
            keyer.mask.bottom = cmd.mask_bottom;
            keyer.mask.left = cmd.mask_left;
            keyer.mask.right = cmd.mask_right;
            vec![format!("video.ME.{}.upstreamKeyers.{}", cmd.mix_effect, cmd.keyer)]
        }
        Command::DownstreamKeyerState(cmd) => {
            let keyer = grow_to(&mut state.video.downstream_keyers, cmd.keyer as usize);
            keyer.on_air = cmd.on_air;
            keyer.in_transition = cmd.in_transition;
            keyer.is_auto_transitioning = cmd.is_auto_transitioning;
            keyer.remaining_frames = cmd.remaining_frames;
            vec![format!("video.downstreamKeyers.{}", cmd.keyer)]
        }
        Command::DownstreamKeyerSources(cmd) => {
            let keyer = grow_to(&mut state.video.downstream_keyers, cmd.keyer as usize);
            keyer.fill_source = cmd.fill_source;
            keyer.cut_source = cmd.cut_source;
            vec![format!("video.downstreamKeyers.{}.sources", cmd.keyer)]
        }

        Command::InputProperties(cmd) => {
            let input = state.inputs.entry(cmd.source).or_default();
            input.long_name = cmd.long_name.clone();
            input.short_name = cmd.short_name.clone();
            input.are_names_default = cmd.are_names_default;
            input.external_ports_available = cmd.external_ports_available;
            input.external_port_type = cmd.external_port_type;
            input.internal_port_type = cmd.internal_port_type;
            input.source_availability = cmd.source_availability;
            input.me_availability = cmd.me_availability;
            vec![format!("inputs.{}", cmd.source)]
        }
        Command::AuxSource(cmd) => {
            *grow_to(&mut state.video.auxiliaries, cmd.aux as usize) = cmd.source;
            vec![format!("video.auxiliaries.{}", cmd.aux)]
        }
        Command::TallyByIndex(cmd) => {
            state.video.tally = cmd.entries.clone();
            (0..cmd.entries.len())
                .map(|i| format!("video.tally.{}", i))
                .collect()
        }

        Command::AudioMixerInput(cmd) => {
            let channel = state.audio.channels.entry(cmd.index).or_default();
            channel.mix_option = Some(cmd.mix_option);
            channel.gain = cmd.gain;
            channel.balance = cmd.balance;
            vec![format!("audio.channels.{}", cmd.index)]
        }
        Command::AudioMixerMaster(cmd) => {
            state.audio.master.gain = cmd.gain;
            state.audio.master.balance = cmd.balance;
            state.audio.master.follow_fade_to_black = cmd.follow_fade_to_black;
            vec!["audio.master".to_string()]
        }

        Command::MediaPoolFrame(cmd) => {
            if cmd.bank != 0 {
                trace!("ignoring frame {} of media bank {}", cmd.index, cmd.bank);
                return Vec::new();
            }
            let slot = grow_to(&mut state.media.still_pool, cmd.index as usize);
            slot.is_used = cmd.is_used;
            slot.hash = cmd.hash;
            slot.file_name = cmd.file_name.clone();
            vec![format!("media.stillPool.{}", cmd.index)]
        }
        Command::MediaPoolClip(cmd) => {
            let slot = grow_to(&mut state.media.clip_pool, cmd.index as usize);
            slot.is_used = cmd.is_used;
            slot.name = cmd.name.clone();
            slot.frame_count = cmd.frame_count;
            vec![format!("media.clipPool.{}", cmd.index)]
        }
        Command::MediaPlayerSource(cmd) => {
            let player = grow_to(&mut state.media.players, cmd.player as usize);
            player.source_type = Some(cmd.source_type);
            player.still_index = cmd.still_index;
            player.clip_index = cmd.clip_index;
            vec![format!("media.players.{}", cmd.player)]
        }

        // setters are never sent by the device, transfer commands are handled by the
        //  data transfer manager
        Command::ChangeProgramInput(_) | Command::ChangePreviewInput(_) | Command::Cut(_) | Command::Auto(_)
        | Command::ChangeTransitionProperties(_) | Command::ChangeTransitionPosition(_)
        | Command::ChangeTransitionPreview(_) | Command::ChangeTransitionMixSettings(_)
        | Command::ChangeUpstreamKeyerOnAir(_) | Command::ChangeUpstreamKeyerType(_)
        | Command::ChangeUpstreamKeyerFillSource(_) | Command::ChangeUpstreamKeyerCutSource(_)
        | Command::ChangeDownstreamKeyerOnAir(_) | Command::AutoDownstreamKeyer(_)
        | Command::ChangeDownstreamKeyerFillSource(_) | Command::ChangeDownstreamKeyerCutSource(_)
        | Command::ChangeInputProperties(_) | Command::ChangeAuxSource(_)
        | Command::ChangeAudioMixerInput(_) | Command::ChangeAudioMixerMaster(_)
        | Command::ChangeMediaPlayerSource(_)
        | Command::LockRequest(_) | Command::LockState(_) | Command::LockObtained(_)
        | Command::TransferUploadRequest(_) | Command::TransferChunkParams(_) | Command::TransferData(_)
        | Command::TransferFileDescription(_) | Command::TransferComplete(_) | Command::TransferError(_) => {
            Vec::new()
        }
    }
}
