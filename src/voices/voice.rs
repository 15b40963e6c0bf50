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

//! A single playing instance of a sample.

use super::envelope::{Adsr, EnvelopeStage, HasEnvelope};
use crate::audio::AudioBuffer;
use crate::samples::Sample;

/// MIDI note at which a sample plays back at its recorded pitch.
pub const ROOT_NOTE: u8 = 60;

/// Playback increment for `note` when a sample recorded at `sample_rate`
/// plays on an engine running at `engine_rate`.
pub fn pitch_ratio(note: u8, sample_rate: u32, engine_rate: f32) -> f64 {
    let semitones = note as f64 - ROOT_NOTE as f64;
    2f64.powf(semitones / 12.0) * sample_rate as f64 / engine_rate as f64
}

/// A voice reads its slot's sample at a fractional position. It never owns
/// the sample; the bank lends it for the duration of a render call.
#[derive(Debug, Clone)]
pub struct Voice {
    playing: bool,
    note: u8,
    gain: f32,
    position: f64,
    increment: f64,
    age: u64,
    envelope: Adsr,
}

impl Voice {
    pub fn new(envelope: Adsr) -> Self {
        Self {
            playing: false,
            note: 0,
            gain: 0.0,
            position: 0.0,
            increment: 1.0,
            age: 0,
            envelope,
        }
    }

    /// Starts (or restarts) the voice at `start_frame`.
    pub fn start(&mut self, note: u8, velocity: u8, start_frame: u64, increment: f64, age: u64) {
        self.playing = true;
        self.note = note;
        self.gain = velocity.min(127) as f32 / 127.0;
        self.position = start_frame as f64;
        self.increment = increment;
        self.age = age;
        self.envelope.note_on();
    }

    /// Moves the envelope into its release stage.
    pub fn release(&mut self) {
        self.envelope.note_off();
    }

    /// Silences the voice immediately.
    pub fn stop(&mut self) {
        self.playing = false;
        self.envelope.reset();
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_releasing(&self) -> bool {
        self.playing && self.envelope.stage() == EnvelopeStage::Release
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn age(&self) -> u64 {
        self.age
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// Adds this voice's output for frames `start..end` into `output`.
    pub fn render(&mut self, sample: &Sample, output: &mut AudioBuffer, start: usize, end: usize) {
        let frames = sample.frames();
        for frame in start..end {
            if !self.playing {
                return;
            }

            let index = self.position as usize;
            if index >= frames {
                self.stop();
                return;
            }
            let frac = (self.position - index as f64) as f32;
            let level = self.envelope.next_sample() * self.gain;

            for channel in 0..output.num_channels() {
                let data = sample.channel(channel);
                let s0 = data[index];
                let s1 = data.get(index + 1).copied().unwrap_or(s0);
                output.channel_mut(channel)[frame] += (s0 + (s1 - s0) * frac) * level;
            }

            self.position += self.increment;
            if !self.envelope.is_active() {
                self.stop();
            }
        }
    }
}

impl HasEnvelope for Voice {
    fn envelope(&self) -> &Adsr {
        &self.envelope
    }

    fn envelope_mut(&mut self) -> &mut Adsr {
        &mut self.envelope
    }
}
