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

//! The real-time engine and its control-thread counterpart.
//!
//! [`create`] builds a connected pair. The [`Engine`] runs on the audio thread
//! and owns the voice bank, transport and effects. The [`Controller`] stays
//! on the control thread and talks to the engine only through atomics and
//! the sample handoff.
//!
//! Ownership of shared state:
//! - parameters, loop bounds and loop enable: written by the controller, read
//!   by the engine once per block
//! - playback status: written by the engine, read by the controller
//! - loaded sound names: written and read by the controller only

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audio::{AudioBuffer, ProcessSpec, MAX_CHANNELS};
use crate::config::EngineConfig;
use crate::mixer::{mix_sources, EffectsChain, SourcePair};
use crate::params::{ParameterError, ParameterId, ParameterStore};
use crate::plugin::Plugin;
use crate::samples::{SampleError, SamplePair, SoundLibrary};
use crate::transport::{LoopRange, LoopRegion, Transport, TransportEvent};
use crate::voices::{Group, SlotId, VoiceBank, VoiceEvent, VoiceEventKind};

mod controller;
mod events;
mod handoff;

pub use controller::Controller;
pub use events::{EventQueue, MidiEvent, NoteEvent};
pub use handoff::{handoff, HandoffReceiver, HandoffSender, SampleSwap};

/// Errors raised while configuring or driving the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Unsupported layout: {0}")]
    UnsupportedLayout(ProcessSpec),

    #[error("Sample handoff queue is full")]
    HandoffFull,

    #[error("The audio engine has been dropped")]
    Disconnected,

    #[error(transparent)]
    Sample(#[from] SampleError),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error("Invalid engine state: {0}")]
    State(#[from] serde_json::Error),
}

/// Playback status published by the audio thread after every block.
#[derive(Debug, Default)]
pub struct EngineStatus {
    position: AtomicU64,
    note_active: AtomicBool,
    dropped_events: AtomicU64,
}

impl EngineStatus {
    /// The transport cursor in frames.
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    pub fn is_note_active(&self) -> bool {
        self.note_active.load(Ordering::Acquire)
    }

    /// Voice events dropped because a block had more than the queue holds.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Acquire)
    }
}

/// A sound that has been handed to the engine.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct LoadedSound {
    pub name: String,
    /// Length of the clean variant in frames
    pub frames: u64,
    pub sample_rate: u32,
}

/// Everything the host persists between sessions.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct EngineState {
    pub parameters: BTreeMap<String, f32>,
    pub loop_enabled: bool,
    pub loop_range: LoopRange,
    /// Sound names for group one and group two.
    #[serde(default)]
    pub sounds: [Option<String>; 2],
}

/// State shared between the engine and the controller.
#[derive(Debug)]
pub(crate) struct SharedState {
    pub(crate) parameters: ParameterStore,
    pub(crate) loop_region: LoopRegion,
    pub(crate) status: EngineStatus,
    pub(crate) stop_requested: AtomicBool,
    pub(crate) sample_rate: AtomicU32,
    pub(crate) sounds: RwLock<[Option<LoadedSound>; 2]>,
}

impl SharedState {
    fn new(sample_rate: u32) -> Self {
        Self {
            parameters: ParameterStore::new(),
            loop_region: LoopRegion::new(),
            status: EngineStatus::default(),
            stop_requested: AtomicBool::new(false),
            sample_rate: AtomicU32::new(sample_rate),
            sounds: RwLock::new([None, None]),
        }
    }

    pub(crate) fn state(&self) -> EngineState {
        let sounds = self.sounds.read();
        EngineState {
            parameters: self.parameters.values(),
            loop_enabled: self.loop_region.is_enabled(),
            loop_range: self.loop_region.range(),
            sounds: [
                sounds[0].as_ref().map(|s| s.name.clone()),
                sounds[1].as_ref().map(|s| s.name.clone()),
            ],
        }
    }

    /// Records a sound handed to `group`. Loading group one moves the loop
    /// onto the new sample.
    pub(crate) fn record_sound(&self, group: Group, name: &str, pair: &SamplePair) {
        let loaded = LoadedSound {
            name: name.to_string(),
            frames: pair.clean.frames() as u64,
            sample_rate: pair.clean.sample_rate(),
        };
        if group == Group::One {
            self.loop_region
                .set_sample_length(loaded.frames, loaded.sample_rate);
        }
        info!(
            sound = name,
            %group,
            frames = loaded.frames,
            sample_rate = loaded.sample_rate,
            "Sound loaded"
        );
        self.sounds.write()[group.index()] = Some(loaded);
    }

    /// Restores parameters and loop settings. Sounds are left alone.
    pub(crate) fn apply_state(&self, state: &EngineState) {
        for (name, value) in &state.parameters {
            match ParameterId::from_name(name) {
                Some(id) => {
                    self.parameters.set(id, *value);
                }
                None => warn!(parameter = name, "Skipping unknown parameter in state"),
            }
        }
        self.loop_region.restore(state.loop_range);
        self.loop_region.set_enabled(state.loop_enabled);
        info!(
            loop_enabled = state.loop_enabled,
            loop_range = %state.loop_range,
            "Engine state restored"
        );
    }
}

/// Loads a sound's clean/excited pair. A sound without a pair plays the
/// same sample as both variants.
pub(crate) fn resolve_sound(
    library: &dyn SoundLibrary,
    name: &str,
) -> Result<SamplePair, SampleError> {
    match library.load_pair_by_name(name) {
        Ok(pair) => Ok(pair),
        Err(SampleError::NotFound(_)) => {
            debug!(sound = name, "No clean/excited pair, using a single sample");
            let sample = library.load_by_name(name)?;
            Ok(SamplePair {
                clean: sample.clone(),
                excited: sample,
            })
        }
        Err(e) => Err(e),
    }
}

/// The audio-thread half of the sampler.
pub struct Engine {
    shared: Arc<SharedState>,
    library: Arc<dyn SoundLibrary>,
    handoff: HandoffReceiver,
    bank: VoiceBank,
    transport: Transport,
    effects: EffectsChain,
    scratch: [AudioBuffer; 4],
    host_events: EventQueue,
    block_events: EventQueue,
    max_events_per_block: usize,
    spec: Option<ProcessSpec>,
}

/// Builds a connected engine and controller from a configuration.
pub fn create(
    config: &EngineConfig,
    library: Arc<dyn SoundLibrary>,
) -> Result<(Engine, Controller), EngineError> {
    let shared = Arc::new(SharedState::new(config.sample_rate()));
    for (name, value) in config.parameters() {
        shared.parameters.set_by_name(name, *value)?;
    }

    let (sender, receiver) = handoff(config.handoff_capacity());
    let mut transport = Transport::new();
    transport.set_engine_rate(config.sample_rate());
    let engine = Engine {
        shared: shared.clone(),
        library: library.clone(),
        handoff: receiver,
        bank: VoiceBank::new(config.voices_per_slot(), config.sample_rate() as f32),
        transport,
        effects: EffectsChain::new(config.filter()),
        scratch: Default::default(),
        host_events: EventQueue::with_capacity(0),
        block_events: EventQueue::with_capacity(0),
        max_events_per_block: config.max_events_per_block(),
        spec: None,
    };
    let controller = Controller::new(shared, library, sender);

    info!(
        sample_rate = config.sample_rate(),
        voices_per_slot = config.voices_per_slot(),
        filter = ?config.filter(),
        "Engine created"
    );
    Ok((engine, controller))
}

impl Engine {
    /// The spec passed to the last successful prepare.
    pub fn spec(&self) -> Option<ProcessSpec> {
        self.spec
    }

    pub fn status(&self) -> &EngineStatus {
        &self.shared.status
    }

    /// Installs any samples the controller has sent since the last block.
    fn apply_swaps(&mut self) {
        while let Some(swap) = self.handoff.next_swap() {
            if swap.slot == SlotId::Group1Clean {
                self.transport.reset();
            }
            if let Some(old) = self.bank.load_sample(swap.slot, swap.sample) {
                self.handoff.retire(old);
            }
        }
    }

    /// Installs a sound directly. Only for callers holding the engine
    /// exclusively outside the audio callback, so replaced samples are
    /// dropped here.
    fn install_sound(&mut self, group: Group, name: &str, pair: SamplePair) {
        self.shared.record_sound(group, name, &pair);
        if group == Group::One {
            self.transport.reset();
        }
        self.bank.load_sample(SlotId::clean(group), Some(pair.clean));
        self.bank.load_sample(SlotId::excited(group), Some(pair.excited));
    }

    fn process_chunk(
        &mut self,
        outputs: &mut [&mut [f32]],
        events: &[MidiEvent],
        offset: usize,
        len: usize,
        last: bool,
    ) {
        self.apply_swaps();
        self.block_events.clear();
        self.host_events.clear();

        if self.shared.stop_requested.swap(false, Ordering::AcqRel) {
            if let Some(event) = self.transport.stop() {
                push_transport_event(&mut self.block_events, event);
            }
        }

        // Host events for this chunk, in delivery order
        let region = &self.shared.loop_region;
        let end = offset + len;
        for event in events {
            let at = event.offset as usize;
            if at < offset || (at >= end && !last) {
                continue;
            }
            let local = (at - offset).min(len - 1);
            match event.kind {
                NoteEvent::NoteOn { note, velocity } => {
                    let start = self.transport.note_on(region, note, velocity);
                    if let Some(released) = start.released {
                        self.host_events.push(VoiceEvent {
                            offset: local,
                            kind: VoiceEventKind::NoteOff { note: released },
                        });
                    }
                    self.host_events.push(VoiceEvent {
                        offset: local,
                        kind: VoiceEventKind::NoteOn {
                            note,
                            velocity,
                            start_frame: start.start_frame,
                        },
                    });
                }
                NoteEvent::NoteOff { note } => {
                    if self.transport.note_off(region, note) {
                        self.host_events.push(VoiceEvent {
                            offset: local,
                            kind: VoiceEventKind::NoteOff { note },
                        });
                    }
                }
            }
        }

        let parameters = &self.shared.parameters;
        let envelopes_changed = parameters.take_pending_change();
        let snapshot = parameters.snapshot();
        if envelopes_changed {
            self.bank.set_envelope(Group::One, snapshot.envelope1);
            self.bank.set_envelope(Group::Two, snapshot.envelope2);
        }

        // Loop restarts go ahead of everything the host sent
        if let Some(event) = self.transport.advance(region, len as u64) {
            push_transport_event(&mut self.block_events, event);
        }
        self.block_events.extend_from(&self.host_events);

        for slot in SlotId::ALL {
            self.bank.render(
                slot,
                &mut self.scratch[slot.index()],
                self.block_events.as_slice(),
                len,
            );
        }

        let channels = outputs
            .len()
            .min(self.scratch[0].num_channels())
            .min(MAX_CHANNELS);
        let mut chunk: [&mut [f32]; MAX_CHANNELS] = Default::default();
        for (target, channel) in chunk.iter_mut().zip(outputs.iter_mut()).take(channels) {
            *target = &mut channel[offset..end];
        }

        let [clean1, excited1, clean2, excited2] = &self.scratch;
        for (index, destination) in chunk.iter_mut().take(channels).enumerate() {
            let sources = [
                SourcePair {
                    clean: clean1.channel(index),
                    excited: excited1.channel(index),
                },
                SourcePair {
                    clean: clean2.channel(index),
                    excited: excited2.channel(index),
                },
            ];
            mix_sources(destination, &sources, snapshot.mix);
        }
        self.effects.process(&mut chunk[..channels], &snapshot);
    }

    fn publish_status(&mut self) {
        let status = &self.shared.status;
        status
            .position
            .store(self.transport.cursor(), Ordering::Release);
        status
            .note_active
            .store(self.transport.is_active(), Ordering::Release);
        let dropped = self.host_events.take_dropped() + self.block_events.take_dropped();
        if dropped > 0 {
            status.dropped_events.fetch_add(dropped, Ordering::AcqRel);
        }
    }
}

fn push_transport_event(queue: &mut EventQueue, event: TransportEvent) {
    match event {
        TransportEvent::Restart {
            note,
            velocity,
            start_frame,
        } => {
            queue.push(VoiceEvent {
                offset: 0,
                kind: VoiceEventKind::NoteOff { note },
            });
            queue.push(VoiceEvent {
                offset: 1,
                kind: VoiceEventKind::NoteOn {
                    note,
                    velocity,
                    start_frame,
                },
            });
        }
        TransportEvent::Release { note } => {
            queue.push(VoiceEvent {
                offset: 0,
                kind: VoiceEventKind::NoteOff { note },
            });
        }
    }
}

impl Plugin for Engine {
    fn prepare(&mut self, spec: ProcessSpec) -> Result<(), EngineError> {
        if !spec.is_supported() {
            warn!(%spec, "Rejecting unsupported layout");
            return Err(EngineError::UnsupportedLayout(spec));
        }

        let sample_rate = spec.sample_rate as f32;
        self.bank.set_sample_rate(sample_rate);
        self.transport.reset();
        self.transport.set_engine_rate(spec.sample_rate);
        self.effects.prepare(&spec);
        self.scratch =
            std::array::from_fn(|_| AudioBuffer::new(spec.num_channels, spec.max_block_size));
        // A restart adds two events ahead of the host's
        self.host_events = EventQueue::with_capacity(self.max_events_per_block);
        self.block_events = EventQueue::with_capacity(self.max_events_per_block + 2);
        self.shared
            .sample_rate
            .store(spec.sample_rate, Ordering::Release);
        self.spec = Some(spec);

        info!(%spec, "Engine prepared");
        Ok(())
    }

    fn process(&mut self, outputs: &mut [&mut [f32]], events: &[MidiEvent]) {
        for channel in outputs.iter_mut() {
            channel.fill(0.0);
        }
        let Some(spec) = self.spec else {
            return;
        };

        let frames = outputs.iter().map(|c| c.len()).min().unwrap_or(0);
        let mut offset = 0;
        while offset < frames {
            let len = (frames - offset).min(spec.max_block_size);
            let last = offset + len >= frames;
            self.process_chunk(outputs, events, offset, len, last);
            offset += len;
        }
        self.publish_status();
    }

    fn get_state(&self) -> Result<Vec<u8>, EngineError> {
        Ok(serde_json::to_vec(&self.shared.state())?)
    }

    /// Restores a blob from [`Plugin::get_state`], reloading its sounds. A
    /// sound that can't be loaded is logged and skipped; saved loop bounds
    /// then wait for the next group one sound.
    fn set_state(&mut self, state: &[u8]) -> Result<(), EngineError> {
        let state: EngineState = serde_json::from_slice(state)?;
        for (group, name) in Group::ALL.into_iter().zip(&state.sounds) {
            let Some(name) = name else {
                continue;
            };
            match resolve_sound(self.library.as_ref(), name) {
                Ok(pair) => self.install_sound(group, name, pair),
                Err(e) => warn!(sound = name, %group, err = %e, "Unable to restore sound"),
            }
        }
        self.shared.apply_state(&state);
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("spec", &self.spec)
            .field("transport", &self.transport)
            .field("voices_per_slot", &self.bank.voices_per_slot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::samples::{MemoryLibrary, SamplePair};
    use crate::testutil::{constant_sample, output_buffers, ramp_sample};

    fn library() -> Arc<MemoryLibrary> {
        let library = MemoryLibrary::new();
        library.insert_pair(
            "pad",
            SamplePair {
                clean: ramp_sample("pad_clean", 48000, 48000),
                excited: constant_sample("pad_excited", 0.3, 48000, 48000),
            },
        );
        library.insert("long", constant_sample("long", 0.5, 48000, 48000));
        library.insert("other", constant_sample("other", 0.25, 48000, 48000));
        library.insert("slow", constant_sample("slow", 0.5, 24000, 24000));
        Arc::new(library)
    }

    fn prepared(config: &EngineConfig) -> (Engine, Controller) {
        let (mut engine, controller) = create(config, library()).unwrap();
        engine.prepare(config.process_spec()).unwrap();
        (engine, controller)
    }

    /// Runs `blocks` blocks of `frames`, sending a note-on at the start.
    fn render(engine: &mut Engine, blocks: usize, frames: usize) -> Vec<Vec<f32>> {
        let mut rendered = vec![Vec::new(); 2];
        for block in 0..blocks {
            let mut buffers = output_buffers(2, frames);
            {
                let mut outputs: Vec<&mut [f32]> =
                    buffers.iter_mut().map(|b| b.as_mut_slice()).collect();
                let events = if block == 0 {
                    vec![MidiEvent::note_on(0, 60, 127)]
                } else {
                    vec![]
                };
                engine.process(&mut outputs, &events);
            }
            for (all, block) in rendered.iter_mut().zip(buffers) {
                all.extend(block);
            }
        }
        rendered
    }

    fn run(engine: &mut Engine, frames: usize, events: &[MidiEvent]) -> Vec<Vec<f32>> {
        let mut buffers = output_buffers(2, frames);
        {
            let mut outputs: Vec<&mut [f32]> =
                buffers.iter_mut().map(|b| b.as_mut_slice()).collect();
            engine.process(&mut outputs, events);
        }
        buffers
    }

    fn is_silent(buffers: &[Vec<f32>]) -> bool {
        buffers.iter().all(|b| b.iter().all(|s| *s == 0.0))
    }

    /// Value of the "pad_clean" ramp at `frame`.
    fn ramp(frame: usize) -> f32 {
        frame as f32 / 48000.0
    }

    fn instant_envelope(config: EngineConfig) -> EngineConfig {
        config
            .with_parameter("attack", 0.0)
            .with_parameter("release", 0.0)
    }

    #[test]
    fn test_unsupported_layout() {
        let (mut engine, _controller) = create(&EngineConfig::default(), library()).unwrap();
        for spec in [
            ProcessSpec::new(48000, 512, 3),
            ProcessSpec::new(48000, 512, 0),
            ProcessSpec::new(0, 512, 2),
            ProcessSpec::new(48000, 0, 2),
        ] {
            assert!(matches!(
                engine.prepare(spec),
                Err(EngineError::UnsupportedLayout(_))
            ));
        }
        assert_eq!(engine.spec(), None);
    }

    #[test]
    fn test_unprepared_engine_is_silent() {
        let (mut engine, controller) = create(&EngineConfig::default(), library()).unwrap();
        controller.load_sound(Group::One, "long").unwrap();
        let mut buffers = vec![vec![1.0f32; 64]; 2];
        {
            let mut outputs: Vec<&mut [f32]> =
                buffers.iter_mut().map(|b| b.as_mut_slice()).collect();
            engine.process(&mut outputs, &[MidiEvent::note_on(0, 60, 127)]);
        }
        assert!(is_silent(&buffers));
    }

    #[test]
    fn test_note_produces_sound() {
        let config = EngineConfig::default().with_block_size(128);
        let (mut engine, controller) = prepared(&config);
        controller.load_sound(Group::One, "long").unwrap();

        let rendered = render(&mut engine, 4, 256);
        assert!(!is_silent(&rendered));
        assert!(rendered[0].iter().all(|s| s.abs() <= 1.0));
        assert!(controller.is_note_active());
        assert_eq!(controller.playback_position(), 1024);
    }

    #[test]
    fn test_mix_endpoints_match_single_variant() {
        let clean_only = |mix: f32, sound: &str| {
            let config = EngineConfig::default()
                .with_block_size(128)
                .with_parameter("mix", mix);
            let (mut engine, controller) = prepared(&config);
            controller.load_sound(Group::One, sound).unwrap();
            render(&mut engine, 4, 300)
        };

        // A lone sound plays as both variants, so either endpoint is that sound
        assert_eq!(clean_only(0.0, "pad"), clean_only(0.0, "pad_clean"));
        assert_eq!(clean_only(100.0, "pad"), clean_only(100.0, "pad_excited"));
        assert_ne!(clean_only(0.0, "pad"), clean_only(100.0, "pad"));
    }

    #[test]
    fn test_loop_scenario_wraps_cursor() {
        let config = EngineConfig::default().with_block_size(1000);
        let (mut engine, controller) = prepared(&config);
        controller.load_sound(Group::One, "long").unwrap();
        assert_eq!(controller.audio_length(), 48000);
        controller.set_loop_points(0, 24000);
        controller.set_loop_enabled(true);

        render(&mut engine, 30, 1000);
        assert_eq!(controller.playback_position(), 6000);
        assert!(controller.is_note_active());
    }

    #[test]
    fn test_chunking_matches_block_size() {
        let config = EngineConfig::default().with_block_size(1000);
        let (mut engine, controller) = prepared(&config);
        controller.load_sound(Group::One, "long").unwrap();
        controller.set_loop_points(0, 24000);
        controller.set_loop_enabled(true);

        // One host call split into 30 engine blocks
        run(&mut engine, 30000, &[MidiEvent::note_on(0, 60, 127)]);
        assert_eq!(controller.playback_position(), 6000);
    }

    #[test]
    fn test_non_matching_note_off_keeps_playing() {
        let config = EngineConfig::default().with_block_size(256);
        let (mut engine, controller) = prepared(&config);
        controller.load_sound(Group::One, "long").unwrap();

        run(&mut engine, 256, &[MidiEvent::note_on(0, 60, 127)]);
        run(&mut engine, 256, &[MidiEvent::note_off(10, 61)]);
        let later = run(&mut engine, 256, &[]);
        assert!(controller.is_note_active());
        assert!(!is_silent(&later));
    }

    #[test]
    fn test_note_off_while_looping_keeps_sounding() {
        let config = EngineConfig::default().with_block_size(256);
        let (mut engine, controller) = prepared(&config);
        controller.load_sound(Group::One, "long").unwrap();
        controller.set_loop_points(0, 2000);
        controller.set_loop_enabled(true);

        run(&mut engine, 256, &[MidiEvent::note_on(0, 60, 127)]);
        run(&mut engine, 256, &[MidiEvent::note_off(0, 60)]);
        for _ in 0..20 {
            run(&mut engine, 256, &[]);
        }
        let later = run(&mut engine, 256, &[]);
        assert!(controller.is_note_active());
        assert!(!is_silent(&later));

        controller.stop_playback();
        run(&mut engine, 256, &[]);
        assert!(!controller.is_note_active());
        assert_eq!(controller.playback_position(), 0);
    }

    #[test]
    fn test_note_off_without_loop_releases() {
        let config = EngineConfig::default()
            .with_block_size(256)
            .with_parameter("release", 0.0);
        let (mut engine, controller) = prepared(&config);
        controller.load_sound(Group::One, "long").unwrap();

        run(&mut engine, 256, &[MidiEvent::note_on(0, 60, 127)]);
        run(&mut engine, 256, &[MidiEvent::note_off(0, 60)]);
        assert!(!controller.is_note_active());
        assert!(is_silent(&run(&mut engine, 256, &[])));
    }

    #[test]
    fn test_loads_from_another_thread() {
        let config = EngineConfig::default().with_block_size(64);
        let (mut engine, controller) = prepared(&config);

        let loader = thread::spawn(move || {
            for i in 0..50 {
                let name = if i % 2 == 0 { "long" } else { "other" };
                loop {
                    match controller.load_sound(Group::Two, name) {
                        Ok(()) => break,
                        Err(EngineError::HandoffFull) => thread::yield_now(),
                        Err(e) => panic!("load failed: {}", e),
                    }
                }
                controller.collect_garbage();
            }
            controller
        });

        let mut buffers = output_buffers(2, 64);
        while !loader.is_finished() {
            let mut outputs: Vec<&mut [f32]> =
                buffers.iter_mut().map(|b| b.as_mut_slice()).collect();
            engine.process(&mut outputs, &[MidiEvent::note_on(0, 60, 127)]);
        }
        let controller = loader.join().unwrap();
        run(&mut engine, 64, &[]);
        controller.collect_garbage();
        assert_eq!(controller.loaded_sound(Group::Two).as_deref(), Some("other"));
    }

    #[test]
    fn test_state_roundtrip() {
        let config = EngineConfig::default();
        let (mut engine, controller) = prepared(&config);
        controller.load_sound(Group::One, "long").unwrap();
        controller.set_parameter(ParameterId::Mix, 35.0);
        controller.set_loop_points(100, 2000);
        controller.set_loop_enabled(true);
        let state = engine.get_state().unwrap();

        let (mut restored, other) = prepared(&config);
        other.load_sound(Group::One, "long").unwrap();
        restored.set_state(&state).unwrap();
        assert_eq!(other.parameter(ParameterId::Mix), 35.0);
        assert_eq!(other.loop_range(), LoopRange::new(100, 2000));
        assert!(other.is_looping());

        assert!(matches!(
            restored.set_state(b"not json"),
            Err(EngineError::State(_))
        ));
    }

    #[test]
    fn test_unknown_config_parameter() {
        let config = EngineConfig::default().with_parameter("volume", 1.0);
        assert!(matches!(
            create(&config, library()),
            Err(EngineError::Parameter(ParameterError::Unknown(_)))
        ));
    }

    #[test]
    fn test_loop_restart_retriggers_at_loop_start() {
        let config = instant_envelope(EngineConfig::default().with_block_size(1000));
        let (mut engine, controller) = prepared(&config);
        controller.load_sound(Group::One, "pad_clean").unwrap();
        controller.set_loop_points(10000, 13000);
        controller.set_loop_enabled(true);

        let rendered = render(&mut engine, 4, 1000);
        let out = &rendered[0];
        assert!((out[0] - ramp(10000)).abs() < 1e-6);
        assert!((out[1999] - ramp(11999)).abs() < 1e-6);

        // Third block wraps: note-off at offset 0, note-on from the loop start at 1
        assert_eq!(out[2000], 0.0);
        assert!((out[2001] - ramp(10000)).abs() < 1e-6);
        assert!((out[2999] - ramp(10998)).abs() < 1e-6);
        assert!((out[3000] - ramp(10999)).abs() < 1e-6);
        assert_eq!(controller.playback_position(), 11000);
    }

    #[test]
    fn test_host_note_on_in_wrapping_block_starts_one_voice() {
        let config = instant_envelope(EngineConfig::default().with_block_size(1000));
        let (mut engine, controller) = prepared(&config);
        controller.load_sound(Group::One, "pad_clean").unwrap();
        // Shorter than a block, so the first block would also wrap
        controller.set_loop_points(10000, 10500);
        controller.set_loop_enabled(true);

        let first = run(&mut engine, 1000, &[MidiEvent::note_on(0, 60, 127)]);
        assert_eq!(engine.bank.active_voices(SlotId::Group1Clean), 1);
        assert!((first[0][0] - ramp(10000)).abs() < 1e-6);
        assert!((first[0][999] - ramp(10999)).abs() < 1e-6);

        // The wrap comes on the next block instead
        let second = run(&mut engine, 1000, &[]);
        assert_eq!(engine.bank.active_voices(SlotId::Group1Clean), 1);
        assert_eq!(second[0][0], 0.0);
        assert!((second[0][1] - ramp(10000)).abs() < 1e-6);
    }

    #[test]
    fn test_stop_ends_note_released_during_loop() {
        let config = EngineConfig::default()
            .with_block_size(256)
            .with_parameter("release", 0.0);
        let (mut engine, controller) = prepared(&config);
        controller.load_sound(Group::One, "long").unwrap();
        controller.set_loop_points(0, 4000);
        controller.set_loop_enabled(true);

        run(&mut engine, 256, &[MidiEvent::note_on(0, 60, 127)]);
        run(&mut engine, 256, &[MidiEvent::note_off(0, 60)]);
        run(&mut engine, 256, &[MidiEvent::note_on(0, 62, 127)]);
        for _ in 0..40 {
            run(&mut engine, 256, &[]);
        }
        assert_eq!(engine.bank.active_voices(SlotId::Group1Clean), 1);

        controller.stop_playback();
        run(&mut engine, 256, &[MidiEvent::note_off(0, 62)]);
        assert!(!controller.is_note_active());
        for slot in SlotId::ALL {
            assert_eq!(engine.bank.active_voices(slot), 0);
        }
        assert!(is_silent(&run(&mut engine, 256, &[])));
    }

    #[test]
    fn test_loop_counts_frames_of_the_sample() {
        // 24kHz sample on a 48kHz engine: one second is 24000 sample frames
        let config = EngineConfig::default().with_block_size(1000);
        let (mut engine, controller) = prepared(&config);
        controller.load_sound(Group::One, "slow").unwrap();
        assert_eq!(controller.audio_length(), 24000);
        assert_eq!(controller.audio_length_ms(), 1000.0);
        assert_eq!(controller.loop_range_ms(), (0.0, 1000.0));
        controller.set_loop_enabled(true);

        render(&mut engine, 47, 1000);
        assert_eq!(controller.playback_position(), 23500);
        assert!(controller.is_note_active());

        // The 48th block, one second in, wraps
        run(&mut engine, 1000, &[]);
        assert_eq!(controller.playback_position(), 0);
        run(&mut engine, 1000, &[]);
        assert_eq!(controller.playback_position(), 500);
        assert_eq!(controller.playback_position_ms(), 500.0 * 1000.0 / 24000.0);
    }

    #[test]
    fn test_state_restores_into_empty_engine() {
        let config = EngineConfig::default();
        let (engine, controller) = prepared(&config);
        controller.load_sound(Group::One, "long").unwrap();
        controller.set_loop_points(100, 2000);
        controller.set_loop_enabled(true);
        let state = engine.get_state().unwrap();

        let (mut restored, other) = prepared(&config);
        restored.set_state(&state).unwrap();
        assert_eq!(other.loaded_sound(Group::One).as_deref(), Some("long"));
        assert_eq!(other.audio_length(), 48000);
        assert_eq!(other.loop_range(), LoopRange::new(100, 2000));
        assert!(other.is_looping());
        assert!(restored.bank.sample(SlotId::Group1Clean).is_some());
    }

    #[test]
    fn test_restored_loop_waits_for_missing_sound() {
        let state = EngineState {
            parameters: BTreeMap::new(),
            loop_enabled: true,
            loop_range: LoopRange::new(100, 2000),
            sounds: [Some("gone".to_string()), None],
        };
        let (mut engine, controller) = prepared(&EngineConfig::default());
        engine
            .set_state(&serde_json::to_vec(&state).unwrap())
            .unwrap();
        assert_eq!(controller.loaded_sound(Group::One), None);
        assert_eq!(controller.loop_range(), LoopRange::default());

        controller.load_sound(Group::One, "long").unwrap();
        assert_eq!(controller.loop_range(), LoopRange::new(100, 2000));
    }
}
