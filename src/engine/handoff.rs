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

//! Moves samples between the control thread and the audio thread.
//!
//! The control thread builds a sample completely, then sends it down a
//! bounded channel. The audio thread installs it at the start of a block and
//! sends whatever it replaced back on the retire channel, so the last
//! reference to an old sample is always dropped on the control thread.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::debug;

use super::EngineError;
use crate::samples::Sample;
use crate::voices::SlotId;

/// A request to put `sample` (or nothing) into `slot`.
#[derive(Debug)]
pub struct SampleSwap {
    pub slot: SlotId,
    pub sample: Option<Arc<Sample>>,
}

/// Control-thread end of the handoff.
#[derive(Debug)]
pub struct HandoffSender {
    swaps: Sender<SampleSwap>,
    retired: Receiver<Arc<Sample>>,
}

/// Audio-thread end of the handoff.
#[derive(Debug)]
pub struct HandoffReceiver {
    swaps: Receiver<SampleSwap>,
    retired: Sender<Arc<Sample>>,
}

/// Creates a connected handoff pair that can hold `capacity` pending swaps.
pub fn handoff(capacity: usize) -> (HandoffSender, HandoffReceiver) {
    let capacity = capacity.max(1);
    let (swap_tx, swap_rx) = bounded(capacity);
    // Room for every pending swap plus a full set of slots
    let (retire_tx, retire_rx) = bounded(capacity + SlotId::ALL.len());
    (
        HandoffSender {
            swaps: swap_tx,
            retired: retire_rx,
        },
        HandoffReceiver {
            swaps: swap_rx,
            retired: retire_tx,
        },
    )
}

impl HandoffSender {
    /// Queues every swap, or none of them if they don't all fit.
    pub fn send_all(&self, swaps: Vec<SampleSwap>) -> Result<(), EngineError> {
        let free = self
            .swaps
            .capacity()
            .unwrap_or(usize::MAX)
            .saturating_sub(self.swaps.len());
        if swaps.len() > free {
            return Err(EngineError::HandoffFull);
        }
        for swap in swaps {
            match self.swaps.try_send(swap) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => return Err(EngineError::HandoffFull),
                Err(TrySendError::Disconnected(_)) => return Err(EngineError::Disconnected),
            }
        }
        Ok(())
    }

    /// Swaps that haven't been picked up by the audio thread yet.
    pub fn pending(&self) -> usize {
        self.swaps.len()
    }

    /// Drops every sample the audio thread has retired. Returns how many.
    pub fn collect_garbage(&self) -> usize {
        let mut collected = 0;
        for sample in self.retired.try_iter() {
            debug!(sample = sample.name(), "Releasing retired sample");
            drop(sample);
            collected += 1;
        }
        collected
    }
}

impl HandoffReceiver {
    /// Takes the next swap, unless the retire channel has no room for the
    /// sample it would replace. Never blocks.
    pub fn next_swap(&self) -> Option<SampleSwap> {
        if self.retired.is_full() {
            return None;
        }
        self.swaps.try_recv().ok()
    }

    /// Hands a replaced sample back to the control thread.
    pub fn retire(&self, sample: Arc<Sample>) {
        // Only fails once the control side is gone, and then nothing else
        // holds the sample either
        let _ = self.retired.try_send(sample);
    }
}
