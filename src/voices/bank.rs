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

//! The four sample slots and their voice pools.

use std::fmt;
use std::sync::Arc;

use super::envelope::{Adsr, HasEnvelope};
use super::voice::{pitch_ratio, Voice};
use crate::audio::AudioBuffer;
use crate::params::AdsrParameters;
use crate::samples::Sample;

/// One of the two sounds the engine plays at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    One,
    Two,
}

impl Group {
    pub const ALL: [Group; 2] = [Group::One, Group::Two];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Group::One => write!(f, "group 1"),
            Group::Two => write!(f, "group 2"),
        }
    }
}

/// Addresses one of the four sample slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotId {
    Group1Clean,
    Group1Excited,
    Group2Clean,
    Group2Excited,
}

impl SlotId {
    pub const ALL: [SlotId; 4] = [
        SlotId::Group1Clean,
        SlotId::Group1Excited,
        SlotId::Group2Clean,
        SlotId::Group2Excited,
    ];

    pub fn clean(group: Group) -> SlotId {
        match group {
            Group::One => SlotId::Group1Clean,
            Group::Two => SlotId::Group2Clean,
        }
    }

    pub fn excited(group: Group) -> SlotId {
        match group {
            Group::One => SlotId::Group1Excited,
            Group::Two => SlotId::Group2Excited,
        }
    }

    pub fn group(self) -> Group {
        match self {
            SlotId::Group1Clean | SlotId::Group1Excited => Group::One,
            SlotId::Group2Clean | SlotId::Group2Excited => Group::Two,
        }
    }

    pub fn is_excited(self) -> bool {
        matches!(self, SlotId::Group1Excited | SlotId::Group2Excited)
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = if self.is_excited() { "excited" } else { "clean" };
        write!(f, "{} {}", self.group(), variant)
    }
}

/// A note event addressed to the voice bank, positioned within a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceEvent {
    /// Frame offset within the block being rendered
    pub offset: usize,
    pub kind: VoiceEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceEventKind {
    /// Start a voice reading from `start_frame` of the sample.
    NoteOn {
        note: u8,
        velocity: u8,
        start_frame: u64,
    },
    NoteOff { note: u8 },
}

#[derive(Debug)]
struct Slot {
    sample: Option<Arc<Sample>>,
    voices: Vec<Voice>,
    next_age: u64,
}

impl Slot {
    fn note_on(&mut self, note: u8, velocity: u8, start_frame: u64, engine_rate: f32) {
        let Some(sample) = self.sample.as_deref() else {
            return;
        };
        let increment = pitch_ratio(note, sample.sample_rate(), engine_rate);

        self.next_age += 1;
        let age = self.next_age;
        if let Some(voice) = self.steal_voice() {
            voice.start(note, velocity, start_frame, increment, age);
        }
    }

    /// Picks the voice to use for a new note: a free one if there is one,
    /// otherwise the oldest releasing voice, otherwise the oldest voice.
    fn steal_voice(&mut self) -> Option<&mut Voice> {
        if let Some(index) = self.voices.iter().position(|v| !v.is_playing()) {
            return self.voices.get_mut(index);
        }
        let oldest = |voices: &[Voice], releasing_only: bool| {
            voices
                .iter()
                .enumerate()
                .filter(|(_, v)| !releasing_only || v.is_releasing())
                .min_by_key(|(_, v)| v.age())
                .map(|(index, _)| index)
        };
        let index = oldest(&self.voices, true).or_else(|| oldest(&self.voices, false))?;
        self.voices.get_mut(index)
    }

    fn note_off(&mut self, note: u8) {
        for voice in self.voices.iter_mut() {
            if voice.is_playing() && voice.note() == note {
                voice.release();
            }
        }
    }

    fn stop_all(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.stop();
        }
    }
}

/// Holds the four sample slots and a fixed pool of voices for each.
///
/// The bank lives on the audio thread. Voices are allocated once up front;
/// nothing here allocates, locks or frees a sample while rendering. Samples
/// replaced by [`VoiceBank::load_sample`] are handed back to the caller so
/// they can be dropped elsewhere.
#[derive(Debug)]
pub struct VoiceBank {
    slots: [Slot; 4],
    engine_rate: f32,
}

impl VoiceBank {
    pub fn new(voices_per_slot: usize, engine_rate: f32) -> Self {
        let voices_per_slot = voices_per_slot.max(1);
        let slot = || Slot {
            sample: None,
            voices: vec![
                Voice::new(Adsr::new(AdsrParameters::default(), engine_rate));
                voices_per_slot
            ],
            next_age: 0,
        };
        Self {
            slots: [slot(), slot(), slot(), slot()],
            engine_rate,
        }
    }

    /// Changes the engine rate. Every voice is stopped.
    pub fn set_sample_rate(&mut self, engine_rate: f32) {
        self.engine_rate = engine_rate;
        for slot in self.slots.iter_mut() {
            for voice in slot.voices.iter_mut() {
                voice.stop();
                voice.envelope_mut().set_sample_rate(engine_rate);
            }
        }
    }

    pub fn voices_per_slot(&self) -> usize {
        self.slots[0].voices.len()
    }

    /// Replaces the sample in a slot, stopping that slot's voices. Returns the
    /// previous sample.
    pub fn load_sample(&mut self, slot: SlotId, sample: Option<Arc<Sample>>) -> Option<Arc<Sample>> {
        let slot = &mut self.slots[slot.index()];
        slot.stop_all();
        std::mem::replace(&mut slot.sample, sample)
    }

    pub fn sample(&self, slot: SlotId) -> Option<&Arc<Sample>> {
        self.slots[slot.index()].sample.as_ref()
    }

    /// Starts `note` in every slot so clean and excited stay in lock-step.
    pub fn note_on(&mut self, note: u8, velocity: u8, start_frame: u64) {
        let engine_rate = self.engine_rate;
        for slot in self.slots.iter_mut() {
            slot.note_on(note, velocity, start_frame, engine_rate);
        }
    }

    /// Releases `note` in every slot.
    pub fn note_off(&mut self, note: u8) {
        for slot in self.slots.iter_mut() {
            slot.note_off(note);
        }
    }

    /// Silences every voice immediately.
    pub fn stop_all(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.stop_all();
        }
    }

    /// Applies new envelope times to every voice of a group.
    pub fn set_envelope(&mut self, group: Group, parameters: AdsrParameters) {
        for slot in [SlotId::clean(group), SlotId::excited(group)] {
            for voice in self.slots[slot.index()].voices.iter_mut() {
                voice.set_envelope(parameters);
            }
        }
    }

    pub fn active_voices(&self, slot: SlotId) -> usize {
        self.slots[slot.index()]
            .voices
            .iter()
            .filter(|v| v.is_playing())
            .count()
    }

    /// Renders `len` frames of one slot into `output`, overwriting it.
    ///
    /// Events are applied to this slot in order at their offsets. Offsets are
    /// clamped so they never move backwards or past the block. An empty slot
    /// renders silence.
    pub fn render(&mut self, slot: SlotId, output: &mut AudioBuffer, events: &[VoiceEvent], len: usize) {
        output.clear(len);
        let len = output.len();
        let engine_rate = self.engine_rate;
        let slot = &mut self.slots[slot.index()];

        let mut cursor = 0;
        for event in events {
            let offset = event.offset.clamp(cursor, len);
            render_voices(slot, output, cursor, offset);
            cursor = offset;

            match event.kind {
                VoiceEventKind::NoteOn {
                    note,
                    velocity,
                    start_frame,
                } => slot.note_on(note, velocity, start_frame, engine_rate),
                VoiceEventKind::NoteOff { note } => slot.note_off(note),
            }
        }
        render_voices(slot, output, cursor, len);
    }
}

fn render_voices(slot: &mut Slot, output: &mut AudioBuffer, start: usize, end: usize) {
    if start >= end {
        return;
    }
    let Slot { sample, voices, .. } = slot;
    let Some(sample) = sample.as_deref() else {
        return;
    };
    for voice in voices.iter_mut() {
        voice.render(sample, output, start, end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::constant_sample;

    const RATE: f32 = 48000.0;

    fn instant() -> AdsrParameters {
        AdsrParameters {
            attack: 0.0,
            decay: 0.0,
            sustain: 1.0,
            release: 0.0,
        }
    }

    fn bank_with(slot: SlotId, value: f32) -> VoiceBank {
        let mut bank = VoiceBank::new(3, RATE);
        bank.set_envelope(Group::One, instant());
        bank.set_envelope(Group::Two, instant());
        bank.load_sample(slot, Some(constant_sample("s", value, 1000, 48000)));
        bank
    }

    fn note_on(offset: usize, note: u8) -> VoiceEvent {
        VoiceEvent {
            offset,
            kind: VoiceEventKind::NoteOn {
                note,
                velocity: 127,
                start_frame: 0,
            },
        }
    }

    fn note_off(offset: usize, note: u8) -> VoiceEvent {
        VoiceEvent {
            offset,
            kind: VoiceEventKind::NoteOff { note },
        }
    }

    #[test]
    fn test_slot_ids() {
        assert_eq!(SlotId::clean(Group::Two), SlotId::Group2Clean);
        assert_eq!(SlotId::excited(Group::One), SlotId::Group1Excited);
        assert_eq!(SlotId::Group2Excited.group(), Group::Two);
        assert_eq!(SlotId::Group1Excited.to_string(), "group 1 excited");
        for (index, slot) in SlotId::ALL.into_iter().enumerate() {
            assert_eq!(slot.index(), index);
        }
    }

    #[test]
    fn test_empty_slot_renders_silence() {
        let mut bank = VoiceBank::new(3, RATE);
        let mut output = AudioBuffer::new(2, 32);
        output.channel_mut(0).fill(1.0);
        bank.render(SlotId::Group1Clean, &mut output, &[note_on(0, 60)], 32);
        assert!(output.channel(0).iter().all(|s| *s == 0.0));
        assert_eq!(bank.active_voices(SlotId::Group1Clean), 0);
    }

    #[test]
    fn test_events_apply_at_offsets() {
        let mut bank = bank_with(SlotId::Group1Clean, 0.5);
        let mut output = AudioBuffer::new(1, 16);
        let events = [note_on(4, 60), note_off(10, 60)];
        bank.render(SlotId::Group1Clean, &mut output, &events, 16);

        let rendered = output.channel(0);
        assert!(rendered[..4].iter().all(|s| *s == 0.0));
        assert!(rendered[4..10].iter().all(|s| *s == 0.5));
        assert!(rendered[10..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_out_of_order_offsets_are_clamped() {
        let mut bank = bank_with(SlotId::Group1Clean, 0.5);
        let mut output = AudioBuffer::new(1, 16);
        let events = [note_on(8, 60), note_off(2, 60), note_on(100, 62)];
        bank.render(SlotId::Group1Clean, &mut output, &events, 16);

        // The late note-off lands at frame 8, right after the note-on
        assert!(output.channel(0).iter().all(|s| *s == 0.0));
        assert_eq!(bank.active_voices(SlotId::Group1Clean), 1);
    }

    #[test]
    fn test_voice_stealing() {
        let mut bank = bank_with(SlotId::Group1Clean, 0.25);
        let mut output = AudioBuffer::new(1, 8);
        let events = [note_on(0, 60), note_on(1, 62), note_on(2, 64), note_on(3, 65)];
        bank.render(SlotId::Group1Clean, &mut output, &events, 8);
        assert_eq!(bank.active_voices(SlotId::Group1Clean), 3);

        let notes: Vec<u8> = bank.slots[0].voices.iter().map(|v| v.note()).collect();
        assert!(!notes.contains(&60));
        assert!(notes.contains(&65));
    }

    #[test]
    fn test_stealing_prefers_releasing_voice() {
        let mut bank = VoiceBank::new(2, RATE);
        bank.set_envelope(
            Group::One,
            AdsrParameters {
                release: 1.0,
                ..instant()
            },
        );
        bank.load_sample(SlotId::Group1Clean, Some(constant_sample("s", 1.0, 1000, 48000)));
        let mut output = AudioBuffer::new(1, 8);
        let events = [note_on(0, 60), note_on(1, 62), note_off(2, 62), note_on(3, 64)];
        bank.render(SlotId::Group1Clean, &mut output, &events, 8);

        let notes: Vec<u8> = bank.slots[0].voices.iter().map(|v| v.note()).collect();
        assert!(notes.contains(&60));
        assert!(notes.contains(&64));
    }

    #[test]
    fn test_load_sample_returns_previous() {
        let mut bank = bank_with(SlotId::Group2Excited, 0.5);
        bank.note_on(60, 127, 0);
        assert_eq!(bank.active_voices(SlotId::Group2Excited), 1);

        let old = bank.load_sample(SlotId::Group2Excited, None);
        assert_eq!(old.map(|s| s.name().to_string()), Some("s".to_string()));
        assert_eq!(bank.active_voices(SlotId::Group2Excited), 0);
        assert!(bank.sample(SlotId::Group2Excited).is_none());
    }

    #[test]
    fn test_note_on_reaches_every_loaded_slot() {
        let mut bank = VoiceBank::new(3, RATE);
        for slot in SlotId::ALL {
            bank.load_sample(slot, Some(constant_sample("s", 1.0, 100, 48000)));
        }
        bank.note_on(60, 100, 0);
        for slot in SlotId::ALL {
            assert_eq!(bank.active_voices(slot), 1);
        }
        bank.stop_all();
        for slot in SlotId::ALL {
            assert_eq!(bank.active_voices(slot), 0);
        }
    }
}
