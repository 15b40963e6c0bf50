// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::handoff::{HandoffSender, SampleSwap};
use super::{resolve_sound, EngineError, EngineState, SharedState};
use crate::audio::{ms_to_samples, samples_to_ms};
use crate::params::{ParameterId, ParameterSnapshot};
use crate::samples::SoundLibrary;
use crate::transport::LoopRange;
use crate::voices::{Group, SlotId};

/// The control-thread side of the engine.
///
/// Everything a UI or host automation needs goes through here: parameter
/// writes, loop settings, sound loading and playback status. Nothing in this
/// type is called from the audio thread.
pub struct Controller {
    shared: Arc<SharedState>,
    library: Arc<dyn SoundLibrary>,
    handoff: HandoffSender,
}

impl Controller {
    pub(super) fn new(
        shared: Arc<SharedState>,
        library: Arc<dyn SoundLibrary>,
        handoff: HandoffSender,
    ) -> Self {
        Self {
            shared,
            library,
            handoff,
        }
    }

    /// Writes a parameter, clamped to its range. Returns the stored value.
    pub fn set_parameter(&self, id: ParameterId, value: f32) -> f32 {
        self.shared.parameters.set(id, value)
    }

    pub fn set_parameter_by_name(&self, name: &str, value: f32) -> Result<f32, EngineError> {
        Ok(self.shared.parameters.set_by_name(name, value)?)
    }

    pub fn parameter(&self, id: ParameterId) -> f32 {
        self.shared.parameters.get(id)
    }

    pub fn parameters(&self) -> ParameterSnapshot {
        self.shared.parameters.snapshot()
    }

    /// The engine's current sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate.load(Ordering::Acquire)
    }

    /// Sets the loop bounds in frames. Invalid bounds are normalized, never
    /// rejected; the stored range is returned.
    pub fn set_loop_points(&self, start: u64, end: u64) -> LoopRange {
        self.shared.loop_region.set_loop_points(start, end)
    }

    /// Rate of the frames loop bounds and positions count in: group one's
    /// sample, or the engine before a sample is loaded.
    fn loop_rate(&self) -> u32 {
        match self.shared.loop_region.sample_rate() {
            0 => self.sample_rate(),
            rate => rate,
        }
    }

    /// Sets the loop bounds in milliseconds.
    pub fn set_loop_points_ms(&self, start_ms: f64, end_ms: f64) -> LoopRange {
        let rate = self.loop_rate();
        self.set_loop_points(ms_to_samples(start_ms, rate), ms_to_samples(end_ms, rate))
    }

    pub fn loop_range(&self) -> LoopRange {
        self.shared.loop_region.range()
    }

    /// The loop bounds in milliseconds.
    pub fn loop_range_ms(&self) -> (f64, f64) {
        let range = self.loop_range();
        let rate = self.loop_rate();
        (samples_to_ms(range.start, rate), samples_to_ms(range.end, rate))
    }

    pub fn set_loop_enabled(&self, enabled: bool) {
        self.shared.loop_region.set_enabled(enabled);
        debug!(enabled, "Loop toggled");
    }

    pub fn is_looping(&self) -> bool {
        self.shared.loop_region.is_enabled()
    }

    /// Length in frames of group one's clean sample, which the loop applies to.
    pub fn audio_length(&self) -> u64 {
        self.shared.loop_region.sample_length()
    }

    pub fn audio_length_ms(&self) -> f64 {
        samples_to_ms(self.audio_length(), self.loop_rate())
    }

    /// Names of every sound the library can load.
    pub fn available_sounds(&self) -> Vec<String> {
        self.library.list_available()
    }

    /// The name of the sound last loaded into a group.
    pub fn loaded_sound(&self, group: Group) -> Option<String> {
        self.shared.sounds.read()[group.index()]
            .as_ref()
            .map(|sound| sound.name.clone())
    }

    /// Loads a sound into both slots of a group.
    ///
    /// A clean/excited pair is preferred; a sound without one plays as both
    /// variants. On failure the group keeps whatever it had.
    pub fn load_sound(&self, group: Group, name: &str) -> Result<(), EngineError> {
        self.collect_garbage();

        let pair = resolve_sound(self.library.as_ref(), name).inspect_err(|e| {
            warn!(sound = name, err = %e, "Unable to load sound");
        })?;

        self.handoff.send_all(vec![
            SampleSwap {
                slot: SlotId::clean(group),
                sample: Some(pair.clean.clone()),
            },
            SampleSwap {
                slot: SlotId::excited(group),
                sample: Some(pair.excited.clone()),
            },
        ])?;
        self.shared.record_sound(group, name, &pair);
        Ok(())
    }

    /// Empties both slots of a group.
    pub fn clear_sound(&self, group: Group) -> Result<(), EngineError> {
        self.collect_garbage();
        self.handoff.send_all(vec![
            SampleSwap {
                slot: SlotId::clean(group),
                sample: None,
            },
            SampleSwap {
                slot: SlotId::excited(group),
                sample: None,
            },
        ])?;
        if group == Group::One {
            self.shared.loop_region.set_sample_length(0, 0);
        }
        self.shared.sounds.write()[group.index()] = None;
        info!(%group, "Sound cleared");
        Ok(())
    }

    /// Asks the engine to end the current note at the next block, even while
    /// looping.
    pub fn stop_playback(&self) {
        self.shared.stop_requested.store(true, Ordering::Release);
    }

    /// The transport cursor in frames, as of the last processed block.
    pub fn playback_position(&self) -> u64 {
        self.shared.status.position()
    }

    pub fn playback_position_ms(&self) -> f64 {
        samples_to_ms(self.playback_position(), self.loop_rate())
    }

    pub fn is_note_active(&self) -> bool {
        self.shared.status.is_note_active()
    }

    pub fn dropped_events(&self) -> u64 {
        self.shared.status.dropped_events()
    }

    /// Drops samples the engine has finished with. Returns how many.
    pub fn collect_garbage(&self) -> usize {
        self.handoff.collect_garbage()
    }

    /// Serializes parameters, loop settings and loaded sound names.
    pub fn get_state(&self) -> Result<Vec<u8>, EngineError> {
        Ok(serde_json::to_vec(&self.shared.state())?)
    }

    /// Restores a blob from [`Controller::get_state`], reloading its sounds.
    /// A sound that can't be loaded is logged and skipped.
    pub fn set_state(&self, state: &[u8]) -> Result<(), EngineError> {
        let state: EngineState = serde_json::from_slice(state)?;
        for (group, name) in [Group::One, Group::Two].into_iter().zip(&state.sounds) {
            if let Some(name) = name {
                if let Err(e) = self.load_sound(group, name) {
                    warn!(sound = name, %group, err = %e, "Unable to restore sound");
                }
            }
        }
        // Loop bounds go last; loading group one resets them
        self.shared.apply_state(&state);
        Ok(())
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("loop_range", &self.loop_range())
            .field("looping", &self.is_looping())
            .field("pending_swaps", &self.handoff.pending())
            .finish()
    }
}
