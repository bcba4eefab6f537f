//! Standard MIDI file reading.
//!
//! Parses a .mid file with midly, merges every track into one
//! absolute-time-ordered event list, and converts delta-times plus tempo
//! meta-events into wall-clock offsets. Actually waiting out those offsets
//! is the playback loop's job.

use crate::audio::midi::MidiEvent;
use log::debug;
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Tempo assumed until the first tempo meta-event, per the SMF spec
/// (500 000 us per quarter note = 120 BPM).
const DEFAULT_US_PER_BEAT: f64 = 500_000.0;

/// Errors from reading a MIDI file.
#[derive(Debug, Error)]
pub enum MidiFileError {
    #[error("failed to read MIDI file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse MIDI file: {0}")]
    Parse(#[from] midly::Error),
}

/// One event with its wall-clock offset from the start of the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedEvent {
    pub offset: Duration,
    pub event: MidiEvent,
}

/// A parsed MIDI file, flattened to a single time-ordered event list.
///
/// Finite and not restartable: consumers iterate `events` once, pacing
/// themselves against each offset.
#[derive(Debug)]
pub struct MidiFile {
    pub events: Vec<TimedEvent>,
}

struct TickEvent {
    tick: u64,
    event: MidiEvent,
    /// Set when this event is a tempo meta (us per quarter note).
    tempo: Option<u32>,
}

impl MidiFile {
    /// Read and parse the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MidiFileError> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let file = Self::from_bytes(&data)?;
        debug!(
            "loaded {}: {} events, {:?} long",
            path.display(),
            file.events.len(),
            file.duration()
        );
        Ok(file)
    }

    /// Parse an in-memory MIDI file.
    pub fn from_bytes(data: &[u8]) -> Result<Self, MidiFileError> {
        let smf = Smf::parse(data)?;

        // Merge all tracks by absolute tick. The sort is stable, so
        // simultaneous events keep track order, which puts a format-1
        // tempo track's changes ahead of the notes they govern.
        let mut ticked: Vec<TickEvent> = Vec::new();
        for track in &smf.tracks {
            let mut tick: u64 = 0;
            for track_event in track {
                tick += u64::from(track_event.delta.as_int());
                let tempo = match track_event.kind {
                    TrackEventKind::Meta(MetaMessage::Tempo(t)) => Some(t.as_int()),
                    _ => None,
                };
                ticked.push(TickEvent {
                    tick,
                    event: decode(&track_event.kind),
                    tempo,
                });
            }
        }
        ticked.sort_by_key(|e| e.tick);

        // Walk the merged list converting ticks to wall clock under the
        // running tempo. A tempo change applies from its own tick onward.
        let mut us_per_beat = DEFAULT_US_PER_BEAT;
        let mut last_tick = 0u64;
        let mut elapsed_us = 0.0f64;
        let mut events = Vec::with_capacity(ticked.len());
        for tick_event in ticked {
            let delta_ticks = (tick_event.tick - last_tick) as f64;
            elapsed_us += delta_ticks * us_per_tick(&smf.header.timing, us_per_beat);
            last_tick = tick_event.tick;
            if let Some(tempo) = tick_event.tempo {
                us_per_beat = f64::from(tempo);
            }
            events.push(TimedEvent {
                offset: Duration::from_micros(elapsed_us as u64),
                event: tick_event.event,
            });
        }

        Ok(MidiFile { events })
    }

    /// Wall-clock length of the file (offset of its last event).
    pub fn duration(&self) -> Duration {
        self.events.last().map(|e| e.offset).unwrap_or(Duration::ZERO)
    }
}

/// Microseconds per tick under the file's timing scheme. Metrical timing
/// follows the running tempo; SMPTE timecode is fixed and ignores tempo
/// meta-events.
fn us_per_tick(timing: &Timing, us_per_beat: f64) -> f64 {
    match timing {
        Timing::Metrical(ticks_per_beat) => us_per_beat / f64::from(ticks_per_beat.as_int()),
        Timing::Timecode(fps, subframe) => {
            1_000_000.0 / (f64::from(fps.as_f32()) * f64::from(*subframe))
        }
    }
}

fn decode(kind: &TrackEventKind) -> MidiEvent {
    match kind {
        TrackEventKind::Midi { channel, message } => {
            let channel = channel.as_int();
            match *message {
                // Velocity-0 note-ons are preserved as-is; the down-key
                // logic treats them as note-offs
                MidiMessage::NoteOn { key, vel } => MidiEvent::NoteOn {
                    channel,
                    note: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::NoteOff { key, vel } => MidiEvent::NoteOff {
                    channel,
                    note: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::Controller { controller, value } => MidiEvent::ControlChange {
                    channel,
                    controller: controller.as_int(),
                    value: value.as_int(),
                },
                MidiMessage::ProgramChange { program } => MidiEvent::Other {
                    status: 0xC0 | channel,
                    data: vec![program.as_int()],
                },
                MidiMessage::Aftertouch { key, vel } => MidiEvent::Other {
                    status: 0xA0 | channel,
                    data: vec![key.as_int(), vel.as_int()],
                },
                MidiMessage::ChannelAftertouch { vel } => MidiEvent::Other {
                    status: 0xD0 | channel,
                    data: vec![vel.as_int()],
                },
                MidiMessage::PitchBend { bend } => {
                    let raw = bend.0.as_int();
                    MidiEvent::Other {
                        status: 0xE0 | channel,
                        data: vec![(raw & 0x7F) as u8, (raw >> 7) as u8],
                    }
                }
            }
        }
        // Meta, SysEx and escape events carry no channel and make no sound
        _ => MidiEvent::Meta,
    }
}
