//! # Clavier
//!
//! Clavier plays standard MIDI files on a physical or virtual MIDI output
//! device in real time. Outgoing messages can be transformed on the fly
//! (channel remapping, velocity scaling), and no note is ever left stuck
//! "on" no matter how playback ends.
//!
//! ## Modules
//!
//! - `audio`: the device session ([`MidiDevice`]), the MIDI file reader,
//!   the per-event transform, and the playback engine that drives one run
//!   from start to guaranteed-clean finish.
//! - `commands`: dispatch of named operations (`play <file>`,
//!   `midi connect <port>`, ...) to the device session and playback
//!   engine, returning status strings.
//!
//! ## Example
//!
//! ```no_run
//! use clavier::{MidiDevice, PlaybackEngine, TransformConfig};
//! use std::sync::Arc;
//!
//! let device = Arc::new(MidiDevice::new());
//! device.connect("FluidSynth")?;
//!
//! let engine = PlaybackEngine::new(device.clone());
//! engine.start(
//!     "song.mid",
//!     TransformConfig::new().with_velocity_scale(0.8),
//! )?;
//! engine.wait();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audio;
pub mod commands;

// Re-export commonly used types for convenience
pub use crate::audio::midi::{DeviceError, MidiDevice, MidiEvent, MidiSink};
pub use crate::audio::midi_file::{MidiFile, MidiFileError, TimedEvent};
pub use crate::audio::playback_engine::{PlayError, PlaybackEngine};
pub use crate::audio::transform::{ChannelRemapFn, TransformConfig};
