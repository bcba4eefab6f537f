//! MIDI file playback engine.
//!
//! Drives one playback run from start to guaranteed-clean finish: a
//! persistent worker thread paces each event against the file's own timing,
//! applies the configured transform, forwards the result to the shared
//! [`MidiSink`], and tracks which keys are down. Every exit path (stream
//! exhausted, send failure, cancellation, shutdown) silences the device
//! and releases held notes before the job is reported finished.

use crate::audio::midi::{MidiEvent, MidiSink};
use crate::audio::midi_file::MidiFile;
use crate::audio::transform::{self, TransformConfig};
use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use log::{debug, info, trace, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// How often the worker re-checks for commands while waiting out a
/// pacing delay.
const COMMAND_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Errors reported synchronously by [`PlaybackEngine::start`].
#[derive(Debug, Error)]
pub enum PlayError {
    /// The requested path does not reference a readable file. No
    /// background work was started.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    /// Another job is active. Overlapping playback against the one shared
    /// device connection is rejected rather than interleaved.
    #[error("playback already in progress")]
    Busy,
    /// The worker thread is gone.
    #[error("playback engine has shut down")]
    Shutdown,
}

/// Commands that can be sent to the playback worker.
enum WorkerCommand {
    /// Start playing a file.
    Play {
        path: PathBuf,
        config: TransformConfig,
    },
    /// Soft-cancel the active job.
    Stop,
    /// Shut down the worker thread.
    Shutdown,
}

/// Engine for background playback of MIDI files against a shared sink.
///
/// One persistent worker thread serves all jobs; at most one job is active
/// at a time, and a second [`start`](PlaybackEngine::start) while one is in
/// flight is rejected with [`PlayError::Busy`].
pub struct PlaybackEngine {
    command_tx: Sender<WorkerCommand>,
    playing: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl PlaybackEngine {
    /// Create a new engine with a persistent playback thread writing to
    /// `sink`.
    pub fn new(sink: Arc<dyn MidiSink>) -> Self {
        let (command_tx, command_rx) = unbounded();
        let playing = Arc::new(AtomicBool::new(false));
        let worker_playing = playing.clone();

        let worker = thread::spawn(move || {
            PlaybackWorker::new(sink, command_rx, worker_playing).run();
        });

        PlaybackEngine {
            command_tx,
            playing,
            worker: Some(worker),
        }
    }

    /// Start playing `path` in the background.
    ///
    /// The path and busy state are validated synchronously; on success the
    /// call returns as soon as the job is handed to the worker, before any
    /// sound is made. Completion is observed through
    /// [`is_finished`](PlaybackEngine::is_finished), not a return value.
    pub fn start(&self, path: impl AsRef<Path>, config: TransformConfig) -> Result<(), PlayError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(PlayError::FileNotFound(path.to_path_buf()));
        }
        if self
            .playing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PlayError::Busy);
        }
        let job = WorkerCommand::Play {
            path: path.to_path_buf(),
            config,
        };
        if self.command_tx.send(job).is_err() {
            self.playing.store(false, Ordering::SeqCst);
            return Err(PlayError::Shutdown);
        }
        info!("playback started: {}", path.display());
        Ok(())
    }

    /// Request soft cancellation of the active job.
    ///
    /// Observed at the next iteration boundary or pacing poll; the job
    /// proceeds to cleanup and finishes normally. A no-op when idle.
    pub fn stop(&self) -> Result<(), PlayError> {
        self.command_tx
            .send(WorkerCommand::Stop)
            .map_err(|_| PlayError::Shutdown)
    }

    /// Non-blocking completion poll: true iff no job is running.
    ///
    /// Says nothing about whether the last job succeeded; in-flight errors
    /// only reach the log.
    pub fn is_finished(&self) -> bool {
        !self.playing.load(Ordering::SeqCst)
    }

    /// Block until the active job, if any, has finished (cleanup included).
    pub fn wait(&self) {
        while self.playing.load(Ordering::SeqCst) {
            thread::sleep(COMMAND_POLL_INTERVAL);
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        let _ = self.command_tx.send(WorkerCommand::Shutdown);
        // Joining guarantees an in-flight job's cleanup ran before the
        // engine is gone
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Outcome of waiting out one pacing delay.
enum Pace {
    Elapsed,
    Cancelled,
    Shutdown,
}

/// How one job's event loop ended.
enum StreamEnd {
    Exhausted,
    Cancelled,
    Shutdown,
}

/// The worker side: runs jobs on its own thread.
struct PlaybackWorker {
    sink: Arc<dyn MidiSink>,
    command_rx: Receiver<WorkerCommand>,
    playing: Arc<AtomicBool>,
}

impl PlaybackWorker {
    fn new(
        sink: Arc<dyn MidiSink>,
        command_rx: Receiver<WorkerCommand>,
        playing: Arc<AtomicBool>,
    ) -> Self {
        Self {
            sink,
            command_rx,
            playing,
        }
    }

    fn run(&self) {
        while let Ok(command) = self.command_rx.recv() {
            match command {
                WorkerCommand::Play { path, config } => {
                    let shutdown = self.play_file(&path, &config);
                    self.playing.store(false, Ordering::SeqCst);
                    if shutdown {
                        break;
                    }
                }
                // A Stop with no active job has nothing to cancel
                WorkerCommand::Stop => {}
                WorkerCommand::Shutdown => break,
            }
        }
    }

    /// Run one job to completion; returns whether shutdown was requested
    /// while it played. Cleanup runs no matter how the event loop ended.
    fn play_file(&self, path: &Path, config: &TransformConfig) -> bool {
        let mut down_keys: HashSet<(u8, u8)> = HashSet::new();
        let result = self.run_stream(path, config, &mut down_keys);
        self.release_keys(&mut down_keys);
        match result {
            Ok(StreamEnd::Exhausted) => {
                info!("playback finished: {}", path.display());
                false
            }
            Ok(StreamEnd::Cancelled) => {
                info!("playback cancelled: {}", path.display());
                false
            }
            Ok(StreamEnd::Shutdown) => true,
            Err(e) => {
                warn!("playback of {} aborted: {:#}", path.display(), e);
                false
            }
        }
    }

    /// The blocking read-pace-transform-send loop for one job.
    fn run_stream(
        &self,
        path: &Path,
        config: &TransformConfig,
        down_keys: &mut HashSet<(u8, u8)>,
    ) -> Result<StreamEnd> {
        let file =
            MidiFile::load(path).with_context(|| format!("loading {}", path.display()))?;
        let started = Instant::now();

        for timed in &file.events {
            // Events are never delivered early
            match self.pace_until(started + timed.offset) {
                Pace::Elapsed => {}
                Pace::Cancelled => return Ok(StreamEnd::Cancelled),
                Pace::Shutdown => return Ok(StreamEnd::Shutdown),
            }

            if config.discard_meta && !timed.event.is_sound() {
                continue;
            }
            let Some(event) = transform::apply(config, &timed.event) else {
                // Remap discard: no send, no down-key update
                continue;
            };

            if config.verbose {
                info!("{:?} @ {:?}", event, timed.offset);
            } else {
                trace!("{:?} @ {:?}", event, timed.offset);
            }

            self.sink
                .send(&event)
                .context("sending event to MIDI output")?;

            // Track what was actually sent, post-transform
            match event {
                MidiEvent::NoteOn {
                    channel,
                    note,
                    velocity,
                } if velocity > 0 => {
                    down_keys.insert((channel, note));
                }
                MidiEvent::NoteOn { channel, note, .. }
                | MidiEvent::NoteOff { channel, note, .. } => {
                    down_keys.remove(&(channel, note));
                }
                _ => {}
            }
        }

        Ok(StreamEnd::Exhausted)
    }

    /// Silence the device, then explicitly release every note still held.
    /// Not every device honors its own panic handling, so the explicit
    /// note-offs back it up. Failures here only reach the log; cleanup
    /// never raises.
    fn release_keys(&self, down_keys: &mut HashSet<(u8, u8)>) {
        if let Err(e) = self.sink.panic() {
            warn!("panic during cleanup failed: {}", e);
        }
        if !down_keys.is_empty() {
            debug!("cleanup: releasing {} held note(s)", down_keys.len());
        }
        for (channel, note) in down_keys.drain() {
            let off = MidiEvent::NoteOff {
                channel,
                note,
                velocity: 0,
            };
            if let Err(e) = self.sink.send(&off) {
                warn!("cleanup note-off for {} failed: {}", note, e);
            }
        }
    }

    /// Wait until `deadline`, checking for Stop/Shutdown periodically.
    fn pace_until(&self, deadline: Instant) -> Pace {
        loop {
            match self.command_rx.try_recv() {
                Ok(WorkerCommand::Stop) => return Pace::Cancelled,
                Ok(WorkerCommand::Shutdown) | Err(TryRecvError::Disconnected) => {
                    return Pace::Shutdown
                }
                // Busy rejection at the API means no new job arrives here
                Ok(WorkerCommand::Play { .. }) => {}
                Err(TryRecvError::Empty) => {}
            }
            let now = Instant::now();
            if now >= deadline {
                return Pace::Elapsed;
            }
            thread::sleep((deadline - now).min(COMMAND_POLL_INTERVAL));
        }
    }
}
