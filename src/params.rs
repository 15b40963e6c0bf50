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

//! Lock-free parameter store shared between the control and audio threads.
//!
//! Every parameter lives in its own atomic word (f32 bits). Writers clamp and
//! store, then raise a pending flag; the audio thread reads a snapshot once per
//! block and only recomputes envelope state when the flag was raised. Fields
//! are independently atomic: a snapshot taken during a burst of writes may mix
//! old and new values of different parameters, but never a torn value.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tracing::{debug, warn};

/// Errors raised by parameter lookups and state persistence.
#[derive(Debug, thiserror::Error)]
pub enum ParameterError {
    #[error("Unknown parameter: {0}")]
    Unknown(String),

    #[error("Parameter state error: {0}")]
    State(#[from] serde_json::Error),
}

/// Identifies one automatable parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterId {
    Attack,
    Decay,
    Sustain,
    Release,
    Attack2,
    Decay2,
    Sustain2,
    Release2,
    FilterFrequency,
    FilterResonance,
    Mix,
}

/// The declared bounds and default of a parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterRange {
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

impl ParameterRange {
    const fn new(min: f32, max: f32, default: f32) -> Self {
        Self { min, max, default }
    }

    /// Clamps a value into the range. NaN maps to the default.
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.default;
        }
        value.clamp(self.min, self.max)
    }
}

const PARAMETER_COUNT: usize = 11;

const ENVELOPE_TIME: ParameterRange = ParameterRange::new(0.0, 5.0, 0.1);

impl ParameterId {
    /// All parameters in storage order.
    pub const ALL: [ParameterId; PARAMETER_COUNT] = [
        ParameterId::Attack,
        ParameterId::Decay,
        ParameterId::Sustain,
        ParameterId::Release,
        ParameterId::Attack2,
        ParameterId::Decay2,
        ParameterId::Sustain2,
        ParameterId::Release2,
        ParameterId::FilterFrequency,
        ParameterId::FilterResonance,
        ParameterId::Mix,
    ];

    /// The persisted name of this parameter.
    pub fn name(self) -> &'static str {
        match self {
            ParameterId::Attack => "attack",
            ParameterId::Decay => "decay",
            ParameterId::Sustain => "sustain",
            ParameterId::Release => "release",
            ParameterId::Attack2 => "attack2",
            ParameterId::Decay2 => "decay2",
            ParameterId::Sustain2 => "sustain2",
            ParameterId::Release2 => "release2",
            ParameterId::FilterFrequency => "filter_frequency",
            ParameterId::FilterResonance => "filter_resonance",
            ParameterId::Mix => "mix",
        }
    }

    /// Looks a parameter up by its persisted name.
    pub fn from_name(name: &str) -> Option<ParameterId> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }

    /// The declared range for this parameter.
    pub fn range(self) -> ParameterRange {
        match self {
            ParameterId::Attack | ParameterId::Attack2 => ParameterRange {
                default: 0.01,
                ..ENVELOPE_TIME
            },
            ParameterId::Decay
            | ParameterId::Decay2
            | ParameterId::Release
            | ParameterId::Release2 => ENVELOPE_TIME,
            ParameterId::Sustain | ParameterId::Sustain2 => ParameterRange::new(0.0, 1.0, 1.0),
            ParameterId::FilterFrequency => ParameterRange::new(20.0, 20_000.0, 20_000.0),
            ParameterId::FilterResonance => ParameterRange::new(0.1, 10.0, 0.707),
            ParameterId::Mix => ParameterRange::new(0.0, 100.0, 0.0),
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Attack, decay and release in seconds; sustain as a level in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdsrParameters {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Default for AdsrParameters {
    fn default() -> Self {
        Self {
            attack: ParameterId::Attack.range().default,
            decay: ParameterId::Decay.range().default,
            sustain: ParameterId::Sustain.range().default,
            release: ParameterId::Release.range().default,
        }
    }
}

/// An immutable per-block copy of every parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSnapshot {
    pub envelope1: AdsrParameters,
    pub envelope2: AdsrParameters,
    pub filter_frequency: f32,
    pub filter_resonance: f32,
    /// Mix amount in percent, 0 = clean only, 100 = excited only.
    pub mix: f32,
}

impl Default for ParameterSnapshot {
    fn default() -> Self {
        Self {
            envelope1: AdsrParameters::default(),
            envelope2: AdsrParameters::default(),
            filter_frequency: ParameterId::FilterFrequency.range().default,
            filter_resonance: ParameterId::FilterResonance.range().default,
            mix: ParameterId::Mix.range().default,
        }
    }
}

/// Process-wide parameter storage.
pub struct ParameterStore {
    values: [AtomicU32; PARAMETER_COUNT],
    pending: AtomicBool,
}

impl ParameterStore {
    /// Creates a store holding every parameter's default. The pending flag
    /// starts raised so the first block picks up the envelopes.
    pub fn new() -> Self {
        Self {
            values: ParameterId::ALL.map(|id| AtomicU32::new(id.range().default.to_bits())),
            pending: AtomicBool::new(true),
        }
    }

    /// Writes a parameter, clamped to its range. Returns the stored value.
    pub fn set(&self, id: ParameterId, value: f32) -> f32 {
        let clamped = id.range().clamp(value);
        self.values[id.index()].store(clamped.to_bits(), Ordering::Release);
        self.pending.store(true, Ordering::Release);
        clamped
    }

    /// Writes a parameter by its persisted name.
    pub fn set_by_name(&self, name: &str, value: f32) -> Result<f32, ParameterError> {
        let id = ParameterId::from_name(name).ok_or_else(|| ParameterError::Unknown(name.into()))?;
        Ok(self.set(id, value))
    }

    /// Reads a single parameter.
    pub fn get(&self, id: ParameterId) -> f32 {
        f32::from_bits(self.values[id.index()].load(Ordering::Acquire))
    }

    /// Takes a snapshot of every parameter. Wait-free.
    pub fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            envelope1: AdsrParameters {
                attack: self.get(ParameterId::Attack),
                decay: self.get(ParameterId::Decay),
                sustain: self.get(ParameterId::Sustain),
                release: self.get(ParameterId::Release),
            },
            envelope2: AdsrParameters {
                attack: self.get(ParameterId::Attack2),
                decay: self.get(ParameterId::Decay2),
                sustain: self.get(ParameterId::Sustain2),
                release: self.get(ParameterId::Release2),
            },
            filter_frequency: self.get(ParameterId::FilterFrequency),
            filter_resonance: self.get(ParameterId::FilterResonance),
            mix: self.get(ParameterId::Mix),
        }
    }

    pub fn has_pending_change(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub fn clear_pending_change(&self) {
        self.pending.store(false, Ordering::Release);
    }

    /// Clears the pending flag, returning whether it was raised.
    pub fn take_pending_change(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Returns the flat name to value map used for persistence.
    pub fn values(&self) -> BTreeMap<String, f32> {
        ParameterId::ALL
            .into_iter()
            .map(|id| (id.name().to_string(), self.get(id)))
            .collect()
    }

    /// Serializes the current values as an opaque blob.
    pub fn serialize(&self) -> Result<Vec<u8>, ParameterError> {
        Ok(serde_json::to_vec(&self.values())?)
    }

    /// Restores values from a blob produced by [`ParameterStore::serialize`].
    /// Unknown names are skipped; missing names keep their current value.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<(), ParameterError> {
        let values: BTreeMap<String, f32> = serde_json::from_slice(bytes)?;
        for (name, value) in values {
            match ParameterId::from_name(&name) {
                Some(id) => {
                    let stored = self.set(id, value);
                    debug!(parameter = name, value = stored, "Parameter restored");
                }
                None => warn!(parameter = name, "Skipping unknown parameter in state"),
            }
        }
        Ok(())
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ParameterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterStore")
            .field("values", &self.values())
            .field("pending", &self.has_pending_change())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_defaults() {
        let store = ParameterStore::new();
        let snapshot = store.snapshot();
        assert_eq!(snapshot, ParameterSnapshot::default());
        assert_eq!(snapshot.envelope1.sustain, 1.0);
        assert_eq!(snapshot.mix, 0.0);
        assert!(store.has_pending_change());
    }

    #[test]
    fn test_set_clamps() {
        let store = ParameterStore::new();
        assert_eq!(store.set(ParameterId::Mix, 150.0), 100.0);
        assert_eq!(store.set(ParameterId::Mix, -3.0), 0.0);
        assert_eq!(store.set(ParameterId::Sustain2, 2.0), 1.0);
        assert_eq!(store.set(ParameterId::FilterFrequency, 1.0), 20.0);
        assert_eq!(store.set(ParameterId::Attack, f32::NAN), 0.01);
    }

    #[test]
    fn test_pending_flag() {
        let store = ParameterStore::new();
        assert!(store.take_pending_change());
        assert!(!store.take_pending_change());

        store.set(ParameterId::Decay, 1.0);
        assert!(store.has_pending_change());
        store.clear_pending_change();
        assert!(!store.has_pending_change());
    }

    #[test]
    fn test_set_by_name() {
        let store = ParameterStore::new();
        assert_eq!(store.set_by_name("release2", 2.5).unwrap(), 2.5);
        assert_eq!(store.snapshot().envelope2.release, 2.5);
        assert!(matches!(
            store.set_by_name("volume", 1.0),
            Err(ParameterError::Unknown(_))
        ));
    }

    #[test]
    fn test_name_round_trip() {
        for id in ParameterId::ALL {
            assert_eq!(ParameterId::from_name(id.name()), Some(id));
        }
    }

    #[test]
    fn test_state_restore() {
        let store = ParameterStore::new();
        store.set(ParameterId::Mix, 42.0);
        store.set(ParameterId::Attack2, 1.5);
        let blob = store.serialize().unwrap();

        let restored = ParameterStore::new();
        restored.deserialize(&blob).unwrap();
        assert_eq!(restored.values(), store.values());
    }

    #[test]
    fn test_state_restore_skips_unknown_and_clamps() {
        let store = ParameterStore::new();
        store
            .deserialize(br#"{"mix": 500.0, "gain": 3.0}"#)
            .unwrap();
        assert_eq!(store.get(ParameterId::Mix), 100.0);
        assert!(store.deserialize(b"not json").is_err());
    }

    #[test]
    fn test_concurrent_snapshot_sees_whole_values() {
        let store = Arc::new(ParameterStore::new());
        let writer_store = store.clone();
        let writer = thread::spawn(move || {
            for i in 0..10_000 {
                let value = if i % 2 == 0 { 25.0 } else { 75.0 };
                writer_store.set(ParameterId::Mix, value);
                writer_store.set(ParameterId::Attack, value / 100.0);
            }
        });

        for _ in 0..10_000 {
            let snapshot = store.snapshot();
            assert!([0.0, 25.0, 75.0].contains(&snapshot.mix));
            assert!([0.01, 0.25, 0.75].contains(&snapshot.envelope1.attack));
        }
        writer.join().unwrap();
    }
}
