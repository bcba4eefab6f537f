//! Per-event transformation between the file reader and the device.
//!
//! Note events get velocity scaling and channel remapping; other channel
//! messages get channel remapping only; meta events pass through untouched.
//! Dispatch is a total match over the event kinds, so a message without a
//! velocity or channel field simply takes the arm that doesn't touch it.

use crate::audio::midi::MidiEvent;
use std::fmt;
use std::sync::Arc;

/// Maps an input channel to an output channel, or `None` to drop the
/// event entirely.
pub type ChannelRemapFn = Arc<dyn Fn(u8) -> Option<u8> + Send + Sync>;

/// Configuration for one playback run's transformation pipeline.
#[derive(Clone)]
pub struct TransformConfig {
    /// Per-message channel remap; `None` leaves channels untouched.
    pub channel_remap: Option<ChannelRemapFn>,
    /// Multiplier applied to note velocities, rounded to nearest and
    /// clamped to the 0-127 MIDI range.
    pub velocity_scale: f32,
    /// Drop meta / non-sound events before transformation.
    pub discard_meta: bool,
    /// Trace each event at info level as it is processed.
    pub verbose: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            channel_remap: None,
            velocity_scale: 1.0,
            discard_meta: false,
            verbose: false,
        }
    }
}

impl TransformConfig {
    /// Identity transform: every event goes out as it came in.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the channel remap function.
    pub fn with_channel_remap(
        mut self,
        remap: impl Fn(u8) -> Option<u8> + Send + Sync + 'static,
    ) -> Self {
        self.channel_remap = Some(Arc::new(remap));
        self
    }

    /// Set the velocity multiplier.
    pub fn with_velocity_scale(mut self, scale: f32) -> Self {
        self.velocity_scale = scale;
        self
    }

    /// Drop meta events before transformation.
    pub fn with_discard_meta(mut self) -> Self {
        self.discard_meta = true;
        self
    }

    /// Trace each processed event at info level.
    pub fn with_verbose(mut self) -> Self {
        self.verbose = true;
        self
    }
}

impl fmt::Debug for TransformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformConfig")
            .field("channel_remap", &self.channel_remap.as_ref().map(|_| "<fn>"))
            .field("velocity_scale", &self.velocity_scale)
            .field("discard_meta", &self.discard_meta)
            .field("verbose", &self.verbose)
            .finish()
    }
}

/// Apply the configured transform to one event.
///
/// Returns `None` when the channel remap drops the event; the caller must
/// then skip it entirely (no send, no down-key update).
pub fn apply(config: &TransformConfig, event: &MidiEvent) -> Option<MidiEvent> {
    let event = match *event {
        MidiEvent::NoteOn {
            channel,
            note,
            velocity,
        } => MidiEvent::NoteOn {
            channel,
            note,
            velocity: scale_velocity(velocity, config.velocity_scale),
        },
        MidiEvent::NoteOff {
            channel,
            note,
            velocity,
        } => MidiEvent::NoteOff {
            channel,
            note,
            velocity: scale_velocity(velocity, config.velocity_scale),
        },
        ref other => other.clone(),
    };
    match (&config.channel_remap, event.channel()) {
        (Some(remap), Some(channel)) => Some(event.with_channel(remap(channel)?)),
        _ => Some(event),
    }
}

fn scale_velocity(velocity: u8, scale: f32) -> u8 {
    (f32::from(velocity) * scale).round().clamp(0.0, 127.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_on(channel: u8, note: u8, velocity: u8) -> MidiEvent {
        MidiEvent::NoteOn {
            channel,
            note,
            velocity,
        }
    }

    #[test]
    fn test_identity_leaves_events_alone() {
        let config = TransformConfig::new();
        let event = note_on(3, 60, 100);
        assert_eq!(apply(&config, &event), Some(event));
        assert_eq!(apply(&config, &MidiEvent::Meta), Some(MidiEvent::Meta));
    }

    #[test]
    fn test_velocity_scaling_rounds_to_nearest() {
        let config = TransformConfig::new().with_velocity_scale(0.505);
        // 100 * 0.505 = 50.5, rounds away from zero to 51
        assert_eq!(apply(&config, &note_on(0, 60, 100)), Some(note_on(0, 60, 51)));

        let config = TransformConfig::new().with_velocity_scale(0.5);
        assert_eq!(apply(&config, &note_on(0, 60, 101)), Some(note_on(0, 60, 51)));
    }

    #[test]
    fn test_velocity_scaling_clamps_to_midi_range() {
        let config = TransformConfig::new().with_velocity_scale(4.0);
        assert_eq!(apply(&config, &note_on(0, 60, 100)), Some(note_on(0, 60, 127)));
    }

    #[test]
    fn test_velocity_scale_zero_yields_silent_note_on() {
        let config = TransformConfig::new().with_velocity_scale(0.0);
        assert_eq!(apply(&config, &note_on(0, 60, 100)), Some(note_on(0, 60, 0)));
    }

    #[test]
    fn test_scaling_ignores_non_note_events() {
        let config = TransformConfig::new().with_velocity_scale(0.0);
        let cc = MidiEvent::ControlChange {
            channel: 0,
            controller: 64,
            value: 127,
        };
        assert_eq!(apply(&config, &cc), Some(cc.clone()));
    }

    #[test]
    fn test_channel_remap_moves_events() {
        let config = TransformConfig::new().with_channel_remap(|ch| Some(ch + 1));
        assert_eq!(apply(&config, &note_on(0, 60, 100)), Some(note_on(1, 60, 100)));

        let bend = MidiEvent::Other {
            status: 0xE0,
            data: vec![0, 64],
        };
        let remapped = apply(&config, &bend).unwrap();
        assert_eq!(remapped.channel(), Some(1));
    }

    #[test]
    fn test_channel_remap_discard_drops_event() {
        let config = TransformConfig::new().with_channel_remap(|_| None);
        assert_eq!(apply(&config, &note_on(0, 60, 100)), None);
    }

    #[test]
    fn test_remap_leaves_meta_untouched() {
        let config = TransformConfig::new().with_channel_remap(|_| None);
        // Meta has no channel, so even an all-discard remap passes it through
        assert_eq!(apply(&config, &MidiEvent::Meta), Some(MidiEvent::Meta));
    }

    #[test]
    fn test_selective_remap() {
        let config =
            TransformConfig::new().with_channel_remap(|ch| if ch == 9 { None } else { Some(ch) });
        assert_eq!(apply(&config, &note_on(9, 36, 100)), None);
        assert_eq!(apply(&config, &note_on(0, 60, 100)), Some(note_on(0, 60, 100)));
    }
}
