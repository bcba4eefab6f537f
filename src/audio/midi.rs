//! MIDI output device session.
//!
//! Owns the single open connection to a MIDI output endpoint (via midir)
//! and exposes the send/panic capability the playback engine is written
//! against. Endpoint selection UI is external; the chosen port name is the
//! input to [`MidiDevice::connect`].

use log::{debug, info, trace};
use midir::{MidiOutput, MidiOutputConnection};
use std::sync::Mutex;
use thiserror::Error;

/// Client name registered with the platform MIDI subsystem.
const CLIENT_NAME: &str = "Clavier";

/// CC 120: immediately mute the device.
const ALL_SOUND_OFF: u8 = 120;
/// CC 123: release every held note.
const ALL_NOTES_OFF: u8 = 123;

/// Errors from the device session.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Send or panic attempted before a port was connected.
    #[error("not connected to a MIDI output port")]
    NotInitialized,
    /// The requested endpoint could not be found or opened.
    #[error("MIDI output unavailable: {0}")]
    Unavailable(String),
    /// A write to the open port failed.
    #[error("MIDI send failed: {0}")]
    Io(String),
}

/// One decoded MIDI message.
///
/// Channel voice messages keep their fields; anything else that can appear
/// in a file (program change, pitch bend, aftertouch) is kept as raw status
/// and data bytes so it can be forwarded unmodified. Meta, SysEx and escape
/// events carry no channel and make no sound; they are folded into `Meta`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiEvent {
    /// Note On: channel (0-15), note (0-127), velocity (0-127).
    /// Velocity 0 is semantically a note-off and is preserved as-is.
    NoteOn { channel: u8, note: u8, velocity: u8 },
    /// Note Off: channel, note, release velocity.
    NoteOff { channel: u8, note: u8, velocity: u8 },
    /// Control Change: channel, controller number, value.
    ControlChange { channel: u8, controller: u8, value: u8 },
    /// Any other channel voice message, as status byte plus data bytes.
    Other { status: u8, data: Vec<u8> },
    /// Meta / SysEx / escape event. No wire form at the output boundary.
    Meta,
}

impl MidiEvent {
    /// The MIDI channel this message is addressed to, if it has one.
    pub fn channel(&self) -> Option<u8> {
        match self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::ControlChange { channel, .. } => Some(*channel),
            MidiEvent::Other { status, .. } => Some(status & 0x0F),
            MidiEvent::Meta => None,
        }
    }

    /// The same message readdressed to `channel` (clamped to 0-15).
    /// `Meta` has no channel and is returned unchanged.
    pub fn with_channel(self, channel: u8) -> MidiEvent {
        let channel = channel & 0x0F;
        match self {
            MidiEvent::NoteOn { note, velocity, .. } => MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            },
            MidiEvent::NoteOff { note, velocity, .. } => MidiEvent::NoteOff {
                channel,
                note,
                velocity,
            },
            MidiEvent::ControlChange {
                controller, value, ..
            } => MidiEvent::ControlChange {
                channel,
                controller,
                value,
            },
            MidiEvent::Other { status, data } => MidiEvent::Other {
                status: (status & 0xF0) | channel,
                data,
            },
            MidiEvent::Meta => MidiEvent::Meta,
        }
    }

    /// Whether this message reaches the device (everything but `Meta`).
    pub fn is_sound(&self) -> bool {
        !matches!(self, MidiEvent::Meta)
    }

    /// Raw bytes for the wire, or `None` for events with no wire form.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        match self {
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } => Some(vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]),
            MidiEvent::NoteOff {
                channel,
                note,
                velocity,
            } => Some(vec![0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]),
            MidiEvent::ControlChange {
                channel,
                controller,
                value,
            } => Some(vec![0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F]),
            MidiEvent::Other { status, data } => {
                let mut bytes = Vec::with_capacity(1 + data.len());
                bytes.push(*status);
                bytes.extend_from_slice(data);
                Some(bytes)
            }
            MidiEvent::Meta => None,
        }
    }
}

/// The send/panic capability the playback engine depends on.
///
/// Implemented by [`MidiDevice`] in production and by recording doubles in
/// tests.
pub trait MidiSink: Send + Sync {
    /// Write one message to the output. Events with no wire form are
    /// accepted and ignored.
    fn send(&self, event: &MidiEvent) -> Result<(), DeviceError>;

    /// Forcibly silence the output (all sound off + all notes off,
    /// every channel).
    fn panic(&self) -> Result<(), DeviceError>;
}

struct OpenPort {
    connection: MidiOutputConnection,
    port_name: String,
}

/// The device session: at most one open MIDI output connection.
///
/// Created once at startup and shared (by `Arc`) with whatever drives
/// playback. `send` and `panic` before [`MidiDevice::connect`] fail with
/// [`DeviceError::NotInitialized`].
pub struct MidiDevice {
    port: Mutex<Option<OpenPort>>,
}

impl MidiDevice {
    /// Create an unconnected session.
    pub fn new() -> Self {
        Self {
            port: Mutex::new(None),
        }
    }

    /// List available MIDI output ports.
    /// Note: Creates a temporary MIDI client, which can sometimes fail on macOS.
    /// Retries up to 3 times with a small delay.
    pub fn list_ports() -> Result<Vec<String>, DeviceError> {
        let mut last_err = None;
        for attempt in 0..3 {
            if attempt > 0 {
                std::thread::sleep(std::time::Duration::from_millis(100));
            }
            match MidiOutput::new(CLIENT_NAME) {
                Ok(midi_out) => {
                    let ports = midi_out.ports();
                    let names: Vec<String> = ports
                        .iter()
                        .filter_map(|p| midi_out.port_name(p).ok())
                        .collect();
                    return Ok(names);
                }
                Err(e) => {
                    last_err = Some(e);
                }
            }
        }
        Err(DeviceError::Unavailable(format!(
            "MIDI initialization failed after 3 attempts: {:?}",
            last_err
        )))
    }

    /// Connect to the first output port whose name contains `port_name`.
    /// A previous connection, if any, is silenced and closed first.
    pub fn connect(&self, port_name: &str) -> Result<(), DeviceError> {
        let midi_out =
            MidiOutput::new(CLIENT_NAME).map_err(|e| DeviceError::Unavailable(e.to_string()))?;
        let ports = midi_out.ports();

        let port = ports
            .iter()
            .find(|p| {
                midi_out
                    .port_name(p)
                    .map(|name| name.contains(port_name))
                    .unwrap_or(false)
            })
            .ok_or_else(|| DeviceError::Unavailable(format!("MIDI port '{}' not found", port_name)))?;

        let actual_name = midi_out
            .port_name(port)
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?;
        let connection = midi_out
            .connect(port, "clavier-out")
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?;

        let mut slot = self.port.lock().unwrap();
        if let Some(previous) = slot.take() {
            Self::close_port(previous);
        }
        *slot = Some(OpenPort {
            connection,
            port_name: actual_name.clone(),
        });
        info!("connected to MIDI port '{}'", actual_name);
        Ok(())
    }

    /// Silence and close the current connection, if any.
    pub fn disconnect(&self) {
        let mut slot = self.port.lock().unwrap();
        if let Some(open) = slot.take() {
            Self::close_port(open);
        }
    }

    /// Whether a port is currently open.
    pub fn is_connected(&self) -> bool {
        self.port.lock().unwrap().is_some()
    }

    /// Name of the connected port, if any.
    pub fn connected_port(&self) -> Option<String> {
        self.port
            .lock()
            .unwrap()
            .as_ref()
            .map(|open| open.port_name.clone())
    }

    fn close_port(mut open: OpenPort) {
        // Best-effort silence; the port is going away either way
        for channel in 0..16u8 {
            let _ = open.connection.send(&[0xB0 | channel, ALL_SOUND_OFF, 0]);
            let _ = open.connection.send(&[0xB0 | channel, ALL_NOTES_OFF, 0]);
        }
        info!("disconnected from MIDI port '{}'", open.port_name);
        open.connection.close();
    }
}

impl Default for MidiDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiSink for MidiDevice {
    fn send(&self, event: &MidiEvent) -> Result<(), DeviceError> {
        let mut slot = self.port.lock().unwrap();
        let open = slot.as_mut().ok_or(DeviceError::NotInitialized)?;
        match event.to_bytes() {
            Some(bytes) => {
                trace!("midi send: {:02x?}", bytes);
                open.connection
                    .send(&bytes)
                    .map_err(|e| DeviceError::Io(e.to_string()))
            }
            None => {
                trace!("no wire form for {:?}, skipped at device boundary", event);
                Ok(())
            }
        }
    }

    fn panic(&self) -> Result<(), DeviceError> {
        let mut slot = self.port.lock().unwrap();
        let open = slot.as_mut().ok_or(DeviceError::NotInitialized)?;
        debug!("midi panic: all sound off + all notes off, channels 1-16");
        for channel in 0..16u8 {
            open.connection
                .send(&[0xB0 | channel, ALL_SOUND_OFF, 0])
                .map_err(|e| DeviceError::Io(e.to_string()))?;
            open.connection
                .send(&[0xB0 | channel, ALL_NOTES_OFF, 0])
                .map_err(|e| DeviceError::Io(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for MidiDevice {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on_encoding() {
        let event = MidiEvent::NoteOn {
            channel: 0,
            note: 60,
            velocity: 100,
        };
        assert_eq!(event.to_bytes(), Some(vec![0x90, 60, 100]));

        let event = MidiEvent::NoteOn {
            channel: 9,
            note: 36,
            velocity: 127,
        };
        assert_eq!(event.to_bytes(), Some(vec![0x99, 36, 127]));
    }

    #[test]
    fn test_note_off_encoding() {
        let event = MidiEvent::NoteOff {
            channel: 1,
            note: 64,
            velocity: 0,
        };
        assert_eq!(event.to_bytes(), Some(vec![0x81, 64, 0]));
    }

    #[test]
    fn test_control_change_encoding() {
        let event = MidiEvent::ControlChange {
            channel: 15,
            controller: 64,
            value: 127,
        };
        assert_eq!(event.to_bytes(), Some(vec![0xBF, 64, 127]));
    }

    #[test]
    fn test_other_encoding_keeps_raw_bytes() {
        // Program change on channel 3
        let event = MidiEvent::Other {
            status: 0xC3,
            data: vec![42],
        };
        assert_eq!(event.to_bytes(), Some(vec![0xC3, 42]));
    }

    #[test]
    fn test_meta_has_no_wire_form() {
        assert_eq!(MidiEvent::Meta.to_bytes(), None);
        assert!(!MidiEvent::Meta.is_sound());
        assert_eq!(MidiEvent::Meta.channel(), None);
    }

    #[test]
    fn test_with_channel_readdresses_status_nibble() {
        let event = MidiEvent::Other {
            status: 0xE0,
            data: vec![0, 64],
        };
        let moved = event.with_channel(5);
        assert_eq!(moved.channel(), Some(5));
        assert_eq!(moved.to_bytes(), Some(vec![0xE5, 0, 64]));

        let note = MidiEvent::NoteOn {
            channel: 0,
            note: 60,
            velocity: 80,
        };
        assert_eq!(note.with_channel(3).channel(), Some(3));
    }

    #[test]
    fn test_send_before_connect_fails() {
        let device = MidiDevice::new();
        let event = MidiEvent::NoteOn {
            channel: 0,
            note: 60,
            velocity: 100,
        };
        assert!(matches!(
            device.send(&event),
            Err(DeviceError::NotInitialized)
        ));
        assert!(matches!(device.panic(), Err(DeviceError::NotInitialized)));
        assert!(!device.is_connected());
        assert_eq!(device.connected_port(), None);
    }

    #[test]
    fn test_connect_to_unknown_port_fails() {
        let device = MidiDevice::new();
        // Fails whether the backend is missing or the port name simply
        // doesn't exist; both are Unavailable
        let result = device.connect("no-such-port-can-possibly-exist");
        assert!(matches!(result, Err(DeviceError::Unavailable(_))));
    }

    #[test]
    fn test_list_ports() {
        // Actual ports depend on the system; just exercise the call
        match MidiDevice::list_ports() {
            Ok(ports) => println!("{} MIDI output port(s)", ports.len()),
            Err(_) => println!("Skipping list_ports test - no MIDI backend"),
        }
    }
}
