pub mod midi;
pub mod midi_file;
pub mod playback_engine;
pub mod transform;

pub use midi::{DeviceError, MidiDevice, MidiEvent, MidiSink};
pub use midi_file::{MidiFile, MidiFileError, TimedEvent};
pub use playback_engine::{PlayError, PlaybackEngine};
pub use transform::{ChannelRemapFn, TransformConfig};
