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

//! The host-facing plugin interface.

use crate::audio::ProcessSpec;
use crate::engine::{EngineError, MidiEvent};

/// The fixed entry points a host drives.
///
/// `prepare` runs before any audio and again whenever the host setup changes.
/// `process` runs on the audio thread and must not block or allocate.
/// `get_state` and `set_state` exchange an opaque blob with the host's
/// persistence layer.
pub trait Plugin {
    fn prepare(&mut self, spec: ProcessSpec) -> Result<(), EngineError>;

    /// Renders one block into `outputs`, one slice per channel.
    fn process(&mut self, outputs: &mut [&mut [f32]], events: &[MidiEvent]);

    fn get_state(&self) -> Result<Vec<u8>, EngineError>;

    fn set_state(&mut self, state: &[u8]) -> Result<(), EngineError>;
}
