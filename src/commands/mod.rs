//! Command registry for the tool-call boundary.
//!
//! Provides a clean, extensible pattern for dispatching named operations
//! to the device session and playback engine. Handlers answer with status
//! strings; the play command answers within the time it takes to validate
//! the path, never the time it takes to finish playing.

pub mod midi;
pub mod play;

use crate::audio::midi::MidiDevice;
use crate::audio::playback_engine::PlaybackEngine;
use std::sync::Arc;

/// Result of executing a command
#[derive(Debug)]
pub enum CommandResult {
    /// Command executed, show this message
    Message(String),
    /// Error occurred
    Error(String),
    /// Not a command, nothing matched
    NotACommand,
}

/// Context passed to command handlers
pub struct CommandContext {
    pub device: Arc<MidiDevice>,
    pub engine: Arc<PlaybackEngine>,
}

impl CommandContext {
    pub fn new(device: Arc<MidiDevice>, engine: Arc<PlaybackEngine>) -> Self {
        Self { device, engine }
    }
}

/// A command handler function
pub type CommandHandler = fn(&str, &mut CommandContext) -> CommandResult;

/// Registry of available commands
pub struct CommandRegistry {
    /// Commands indexed by their prefix (e.g., "play status")
    /// Sorted by prefix length descending for longest-match-first lookup
    commands: Vec<(String, CommandHandler)>,
}

impl CommandRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Register a command with its prefix
    pub fn register(&mut self, prefix: &str, handler: CommandHandler) {
        self.commands.push((prefix.to_string(), handler));
        // Sort by prefix length descending for longest-match-first
        self.commands.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    }

    /// Execute a command, returning NotACommand if no match found
    pub fn execute(&self, input: &str, ctx: &mut CommandContext) -> CommandResult {
        for (prefix, handler) in &self.commands {
            if input == prefix || input.starts_with(&format!("{} ", prefix)) {
                let args = if input.len() > prefix.len() {
                    input[prefix.len()..].trim()
                } else {
                    ""
                };
                return handler(args, ctx);
            }
        }
        CommandResult::NotACommand
    }

    /// Get all registered command prefixes
    pub fn list_commands(&self) -> Vec<&str> {
        self.commands.iter().map(|(p, _)| p.as_str()).collect()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a fully populated command registry with all built-in commands
pub fn create_registry() -> CommandRegistry {
    let mut registry = CommandRegistry::new();

    // Register commands (order matters for prefix matching - register specific first)
    registry.register("play status", play::cmd_play_status);
    registry.register("play stop", play::cmd_play_stop);
    registry.register("play", play::cmd_play);

    // Device session commands
    registry.register("midi devices", midi::cmd_midi_devices);
    registry.register("midi connect", midi::cmd_midi_connect);
    registry.register("midi disconnect", midi::cmd_midi_disconnect);
    registry.register("midi status", midi::cmd_midi_status);
    registry.register("midi panic", midi::cmd_midi_panic);

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_context() -> CommandContext {
        let device = Arc::new(MidiDevice::new());
        let engine = Arc::new(PlaybackEngine::new(device.clone()));
        CommandContext::new(device, engine)
    }

    #[test]
    fn test_longest_prefix_wins() {
        let registry = create_registry();
        let mut ctx = test_context();

        // "play status" must reach the status handler, not `play` with
        // "status" as a filename
        let result = registry.execute("play status", &mut ctx);
        match result {
            CommandResult::Message(msg) => assert!(msg.contains("finished")),
            other => panic!("expected status message, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_input_is_not_a_command() {
        let registry = create_registry();
        let mut ctx = test_context();
        assert!(matches!(
            registry.execute("definitely not a command", &mut ctx),
            CommandResult::NotACommand
        ));
    }

    #[test]
    fn test_play_missing_file_reports_error() {
        let registry = create_registry();
        let mut ctx = test_context();
        let result = registry.execute("play /no/such/file.mid", &mut ctx);
        match result {
            CommandResult::Error(msg) => assert!(msg.contains("not found")),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_midi_status_without_connection() {
        let registry = create_registry();
        let mut ctx = test_context();
        let result = registry.execute("midi status", &mut ctx);
        match result {
            CommandResult::Message(msg) => assert!(msg.contains("Not connected")),
            other => panic!("expected status message, got {:?}", other),
        }
    }
}
