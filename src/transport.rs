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

//! Playback cursor and loop-restart state machine.
//!
//! [`LoopRegion`] is shared: the control thread writes the loop bounds and
//! enable flag, the audio thread reads them once per block. [`Transport`] is
//! owned by the audio thread and tracks the held note and the cursor.
//!
//! Looping works by re-triggering the note. When a block would carry the
//! cursor to or past the loop end, the transport emits a restart (a note-off
//! then a note-on at the loop start, at block offsets 0 and 1) and moves the
//! cursor back to the loop start.
//!
//! Loop bounds and the cursor count frames of group one's clean sample at
//! that sample's own rate, the same unit voices read in. The transport
//! converts each block of engine frames into sample frames as it advances.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A half-open loop range `[start, end)` in sample frames.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopRange {
    pub start: u64,
    pub end: u64,
}

impl LoopRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Normalizes a requested range against a sample of `length` frames.
    ///
    /// Reversed bounds are swapped, both bounds are clamped to `[0, length]`
    /// and an empty range is widened to one frame. Against an empty sample the
    /// result is the empty range `[0, 0)`.
    pub fn normalized(start: u64, end: u64, length: u64) -> Self {
        if length == 0 {
            return Self::default();
        }
        let (start, end) = if start > end { (end, start) } else { (start, end) };
        let start = start.min(length);
        let end = end.min(length);
        if start < end {
            Self { start, end }
        } else if end < length {
            Self {
                start,
                end: end + 1,
            }
        } else {
            Self {
                start: start - 1,
                end,
            }
        }
    }

    fn pack(self) -> u64 {
        (self.start << 32) | (self.end & u32::MAX as u64)
    }

    fn unpack(word: u64) -> Self {
        Self {
            start: word >> 32,
            end: word & u32::MAX as u64,
        }
    }
}

impl fmt::Display for LoopRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Loop settings shared between the control and audio threads.
///
/// Both bounds live in one atomic word, so a reader never sees the start of
/// one range paired with the end of another. Bounds are limited to
/// `u32::MAX` frames (about 24 hours at 48kHz); longer samples are treated as
/// that long.
#[derive(Debug, Default)]
pub struct LoopRegion {
    enabled: AtomicBool,
    sample_length: AtomicU64,
    sample_rate: AtomicU32,
    range: AtomicU64,
    // A restored range waiting for a sample to apply to
    restored: AtomicU64,
    restore_pending: AtomicBool,
}

impl LoopRegion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the length and rate of the sample the loop applies to. The loop
    /// is reset to cover the whole sample, unless a range restored while no
    /// sample was loaded is waiting, in which case that range is applied.
    pub fn set_sample_length(&self, length: u64, sample_rate: u32) {
        let length = length.min(u32::MAX as u64);
        self.sample_length.store(length, Ordering::Release);
        self.sample_rate.store(sample_rate, Ordering::Release);

        if length > 0 && self.restore_pending.swap(false, Ordering::AcqRel) {
            let requested = LoopRange::unpack(self.restored.load(Ordering::Acquire));
            let range = LoopRange::normalized(requested.start, requested.end, length);
            self.range.store(range.pack(), Ordering::Release);
            debug!(length, sample_rate, %range, "Restored loop applied");
            return;
        }
        self.range
            .store(LoopRange::new(0, length).pack(), Ordering::Release);
        debug!(length, sample_rate, "Loop reset to full sample");
    }

    pub fn sample_length(&self) -> u64 {
        self.sample_length.load(Ordering::Acquire)
    }

    /// The rate of the sample the loop applies to, or 0 with no sample.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Acquire)
    }

    /// Restores saved loop bounds. With no sample loaded the bounds are kept
    /// and applied when the next sample arrives.
    pub fn restore(&self, range: LoopRange) -> LoopRange {
        let requested = LoopRange::new(
            range.start.min(u32::MAX as u64),
            range.end.min(u32::MAX as u64),
        );
        self.restored.store(requested.pack(), Ordering::Release);
        let pending = self.sample_length() == 0;
        self.restore_pending.store(pending, Ordering::Release);
        self.set_loop_points(requested.start, requested.end)
    }

    /// Sets the loop bounds in frames, normalizing them to a valid range.
    /// Returns the range that was stored.
    pub fn set_loop_points(&self, start: u64, end: u64) -> LoopRange {
        let range = LoopRange::normalized(start, end, self.sample_length());
        self.range.store(range.pack(), Ordering::Release);
        debug!(requested_start = start, requested_end = end, %range, "Loop points set");
        range
    }

    pub fn range(&self) -> LoopRange {
        LoopRange::unpack(self.range.load(Ordering::Acquire))
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// The range to wrap on, if looping is on and the range is usable.
    pub fn active_range(&self) -> Option<LoopRange> {
        if !self.is_enabled() {
            return None;
        }
        let range = self.range();
        (!range.is_empty()).then_some(range)
    }
}

/// Whether a note is sounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing {
        note: u8,
        velocity: u8,
        /// False once the key was released while the loop kept playing.
        held: bool,
    },
}

/// Note events the transport synthesizes for the voice bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// Stop `note` at offset 0 and start it again from `start_frame` at
    /// offset 1.
    Restart {
        note: u8,
        velocity: u8,
        start_frame: u64,
    },
    /// Release `note` at offset 0.
    Release { note: u8 },
}

/// The effect of a host note-on on the voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteStart {
    /// Frame voices should start reading from.
    pub start_frame: u64,
    /// A note whose key-up was swallowed by the loop and that must be
    /// released before the new note starts.
    pub released: Option<u8>,
}

/// The audio thread's playback cursor.
#[derive(Debug)]
pub struct Transport {
    cursor: u64,
    state: PlaybackState,
    engine_rate: u32,
    // Sub-frame carry when the sample and engine rates differ
    remainder: f64,
    // Set by a host note-on, cleared by the next advance
    retriggered: bool,
}

impl Transport {
    pub fn new() -> Self {
        Self {
            cursor: 0,
            state: PlaybackState::Idle,
            engine_rate: 0,
            remainder: 0.0,
            retriggered: false,
        }
    }

    /// Sets the rate the engine renders at. Zero counts engine frames as
    /// sample frames.
    pub fn set_engine_rate(&mut self, engine_rate: u32) {
        self.engine_rate = engine_rate;
    }

    /// Returns to idle with the cursor at zero.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.remainder = 0.0;
        self.retriggered = false;
        self.state = PlaybackState::Idle;
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, PlaybackState::Playing { .. })
    }

    pub fn active_note(&self) -> Option<u8> {
        match self.state {
            PlaybackState::Idle => None,
            PlaybackState::Playing { note, .. } => Some(note),
        }
    }

    /// Starts tracking `note`. Voices start from the loop start while
    /// looping, otherwise from the top of the sample. A previous note that is
    /// only still sounding because the loop swallowed its note-off is handed
    /// back for release, since nothing else would ever end it.
    pub fn note_on(&mut self, region: &LoopRegion, note: u8, velocity: u8) -> NoteStart {
        let released = match self.state {
            PlaybackState::Playing {
                note: previous,
                held: false,
                ..
            } => Some(previous),
            _ => None,
        };
        self.cursor = region.active_range().map(|r| r.start).unwrap_or(0);
        self.remainder = 0.0;
        self.retriggered = true;
        self.state = PlaybackState::Playing {
            note,
            velocity,
            held: true,
        };
        NoteStart {
            start_frame: self.cursor,
            released,
        }
    }

    /// Handles a note-off. Returns whether the voices should see it.
    ///
    /// A note-off for the tracked note ends playback when looping is off.
    /// While looping it is swallowed and the loop keeps sounding. Any other
    /// note-off leaves the transport alone and passes through.
    pub fn note_off(&mut self, region: &LoopRegion, note: u8) -> bool {
        let PlaybackState::Playing {
            note: active,
            velocity,
            ..
        } = self.state
        else {
            return true;
        };
        if active != note {
            return true;
        }

        if region.is_enabled() {
            self.state = PlaybackState::Playing {
                note,
                velocity,
                held: false,
            };
            false
        } else {
            self.reset();
            true
        }
    }

    /// Advances the cursor by one block of `frames` engine frames. Returns
    /// the event to inject at the start of this block, if any.
    ///
    /// A block in which the host re-triggered the note never restarts it as
    /// well; the wrap happens on the following block instead.
    pub fn advance(&mut self, region: &LoopRegion, frames: u64) -> Option<TransportEvent> {
        let retriggered = std::mem::take(&mut self.retriggered);
        let PlaybackState::Playing { note, velocity, held } = self.state else {
            return None;
        };

        let step = self.sample_frames(region.sample_rate(), frames);
        let new_position = self.cursor.saturating_add(step);
        match region.active_range() {
            Some(range) if new_position >= range.end && !retriggered => {
                self.cursor = range.start;
                self.remainder = 0.0;
                Some(TransportEvent::Restart {
                    note,
                    velocity,
                    start_frame: range.start,
                })
            }
            None if !held => {
                // Looping was switched off after the key came up
                self.reset();
                Some(TransportEvent::Release { note })
            }
            _ => {
                self.cursor = new_position;
                None
            }
        }
    }

    /// Converts engine frames into frames of a sample at `sample_rate`,
    /// carrying the fractional part between blocks.
    fn sample_frames(&mut self, sample_rate: u32, frames: u64) -> u64 {
        if sample_rate == 0 || self.engine_rate == 0 || sample_rate == self.engine_rate {
            return frames;
        }
        let exact =
            frames as f64 * sample_rate as f64 / self.engine_rate as f64 + self.remainder;
        let whole = exact.floor();
        self.remainder = exact - whole;
        whole as u64
    }

    /// Ends playback regardless of loop state.
    pub fn stop(&mut self) -> Option<TransportEvent> {
        let note = self.active_note()?;
        self.reset();
        Some(TransportEvent::Release { note })
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}
