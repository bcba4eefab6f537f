//! Playback commands

use crate::audio::playback_engine::PlayError;
use crate::audio::transform::TransformConfig;
use crate::commands::{CommandContext, CommandResult};
use colored::*;

/// Handle `play <file>` command - start background playback of a MIDI file.
/// Responds within the time it takes to validate the path.
pub fn cmd_play(args: &str, ctx: &mut CommandContext) -> CommandResult {
    if args.is_empty() {
        return CommandResult::Error("Usage: play <file.mid>".to_string());
    }

    match ctx.engine.start(args, TransformConfig::default()) {
        Ok(()) => CommandResult::Message(format!("🎹 Playing {}", args.green())),
        Err(PlayError::FileNotFound(path)) => {
            CommandResult::Error(format!("File not found: {}", path.display()))
        }
        Err(PlayError::Busy) => CommandResult::Error(
            "Playback already in progress. Use 'play stop' first.".to_string(),
        ),
        Err(e) => CommandResult::Error(format!("Failed to start playback: {}", e)),
    }
}

/// Handle `play status` command - non-blocking completion check.
/// Reports completion, not success or failure.
pub fn cmd_play_status(_args: &str, ctx: &mut CommandContext) -> CommandResult {
    if ctx.engine.is_finished() {
        CommandResult::Message("Playback finished".green().to_string())
    } else {
        CommandResult::Message("Still playing...".yellow().to_string())
    }
}

/// Handle `play stop` command - request cancellation of the active playback.
pub fn cmd_play_stop(_args: &str, ctx: &mut CommandContext) -> CommandResult {
    match ctx.engine.stop() {
        Ok(()) => CommandResult::Message("🎹 Playback stopped".yellow().to_string()),
        Err(e) => CommandResult::Error(format!("Failed to stop playback: {}", e)),
    }
}
