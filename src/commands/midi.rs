//! Device session commands

use crate::audio::midi::{MidiDevice, MidiSink};
use crate::commands::{CommandContext, CommandResult};
use colored::*;

/// Handle `midi devices` command - list available MIDI output ports
pub fn cmd_midi_devices(_args: &str, _ctx: &mut CommandContext) -> CommandResult {
    match MidiDevice::list_ports() {
        Ok(ports) => {
            if ports.is_empty() {
                CommandResult::Message(
                    "No MIDI output ports found. Make sure a MIDI device or virtual port is connected."
                        .yellow()
                        .to_string(),
                )
            } else {
                let mut output = format!("{}\n", "🎹 Available MIDI Output Ports:".bold());
                for (i, port) in ports.iter().enumerate() {
                    output.push_str(&format!("  {}. {}\n", i + 1, port.cyan()));
                }
                output.push_str(&format!(
                    "\n{} {}",
                    "Use".dimmed(),
                    "midi connect <port name>".green()
                ));
                CommandResult::Message(output)
            }
        }
        Err(e) => CommandResult::Error(format!("Failed to list MIDI ports: {}", e)),
    }
}

/// Handle `midi connect <port>` command - connect to a MIDI output port
pub fn cmd_midi_connect(args: &str, ctx: &mut CommandContext) -> CommandResult {
    if args.is_empty() {
        return CommandResult::Error(
            "Usage: midi connect <port name>\nUse 'midi devices' to see available ports"
                .to_string(),
        );
    }

    match ctx.device.connect(args) {
        Ok(()) => CommandResult::Message(format!("🎹 Connected to MIDI port: {}", args.green())),
        Err(e) => CommandResult::Error(format!("Failed to connect to '{}': {}", args, e)),
    }
}

/// Handle `midi disconnect` command
pub fn cmd_midi_disconnect(_args: &str, ctx: &mut CommandContext) -> CommandResult {
    ctx.device.disconnect();
    CommandResult::Message("🎹 Disconnected from MIDI".to_string())
}

/// Handle `midi status` command - show MIDI connection status
pub fn cmd_midi_status(_args: &str, ctx: &mut CommandContext) -> CommandResult {
    let mut output = format!("{}\n", "🎹 MIDI Status:".bold());

    if ctx.device.is_connected() {
        output.push_str(&format!("  Status: {}\n", "Connected".green().bold()));
        if let Some(name) = ctx.device.connected_port() {
            output.push_str(&format!("  Port: {}\n", name.cyan()));
        }
    } else {
        output.push_str(&format!("  Status: {}\n", "Not connected".yellow()));
    }

    let playback = if ctx.engine.is_finished() {
        "idle".to_string()
    } else {
        "playing".to_string()
    };
    output.push_str(&format!("  Playback: {}\n", playback));

    CommandResult::Message(output)
}

/// Handle `midi panic` command - silence the device immediately
pub fn cmd_midi_panic(_args: &str, ctx: &mut CommandContext) -> CommandResult {
    match ctx.device.panic() {
        Ok(()) => CommandResult::Message(
            "🎹 MIDI Panic: All Sound Off + All Notes Off sent to all channels"
                .yellow()
                .to_string(),
        ),
        Err(e) => CommandResult::Error(format!("Failed to send MIDI panic: {}", e)),
    }
}
