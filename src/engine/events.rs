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

//! Note events delivered by the host and the per-block event queue.

use midly::live::LiveEvent;
use midly::MidiMessage;

use crate::voices::VoiceEvent;

/// The note messages the engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
}

/// A host MIDI event positioned within the block being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent {
    /// Frame offset from the start of the block
    pub offset: u32,
    pub kind: NoteEvent,
}

impl MidiEvent {
    pub fn note_on(offset: u32, note: u8, velocity: u8) -> Self {
        Self {
            offset,
            kind: NoteEvent::NoteOn { note, velocity },
        }
    }

    pub fn note_off(offset: u32, note: u8) -> Self {
        Self {
            offset,
            kind: NoteEvent::NoteOff { note },
        }
    }

    /// Parses a raw MIDI message. Returns None for anything that isn't a
    /// note message. A note-on with zero velocity is a note-off.
    pub fn parse(offset: u32, raw: &[u8]) -> Option<Self> {
        let LiveEvent::Midi { message, .. } = LiveEvent::parse(raw).ok()? else {
            return None;
        };
        match message {
            MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => {
                Some(Self::note_off(offset, key.as_int()))
            }
            MidiMessage::NoteOn { key, vel } => {
                Some(Self::note_on(offset, key.as_int(), vel.as_int()))
            }
            MidiMessage::NoteOff { key, .. } => Some(Self::note_off(offset, key.as_int())),
            _ => None,
        }
    }
}

/// A fixed-capacity list of voice events for one block.
///
/// Capacity is reserved once; events pushed past it are counted and dropped
/// so the audio thread never grows the list.
#[derive(Debug)]
pub struct EventQueue {
    events: Vec<VoiceEvent>,
    capacity: usize,
    dropped: u64,
}

impl EventQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Appends an event. Returns false if the queue was full.
    pub fn push(&mut self, event: VoiceEvent) -> bool {
        if self.events.len() >= self.capacity {
            self.dropped += 1;
            return false;
        }
        self.events.push(event);
        true
    }

    /// Appends every event from another queue, in order.
    pub fn extend_from(&mut self, other: &EventQueue) {
        for event in other.as_slice() {
            self.push(*event);
        }
    }

    pub fn as_slice(&self) -> &[VoiceEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events dropped since the last call.
    pub fn take_dropped(&mut self) -> u64 {
        std::mem::take(&mut self.dropped)
    }
}
