//! Per-player streaming thread.
//!
//! Each player owns one worker for its whole lifetime. The worker owns the output sink (the
//! device stream never leaves this thread) and runs play sessions: pop the next source,
//! decode, resample, remix, write to the sink, and repeat until the queue is exhausted.
//!
//! Control operations never wait on this thread. They mutate the shared state cell and, for
//! `stop`/`close`, bump the session counter; a session whose counter went stale stops at its
//! next chunk and leaves the state alone.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::completion::Completer;
use crate::config::{PlaybackConfig, PlayerConfig};
use crate::error::{PlayerError, Result};
use crate::queue::PlaybackQueue;
use crate::resample::StreamResampler;
use crate::sink::{OutputSink, SinkControls, remix};
use crate::source::Source;
use crate::state::{PlaybackState, Transition};
use crate::status::SinkInfo;

/// Commands accepted by the streaming thread.
#[derive(Debug)]
pub(crate) enum WorkerCommand {
    Play { session: u64, completer: Completer },
    Shutdown,
}

/// State guarded by the player's lock. Held only for transitions.
#[derive(Debug, Default)]
pub(crate) struct Inner {
    pub(crate) state: PlaybackState,
    pub(crate) queue: PlaybackQueue,
    pub(crate) now_playing: Option<std::path::PathBuf>,
}

/// State shared between a player handle and its streaming thread.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) id: u64,
    pub(crate) inner: Mutex<Inner>,
    pub(crate) session: AtomicU64,
    pub(crate) closed: AtomicBool,
    pub(crate) controls: SinkControls,
    pub(crate) sink_info: Mutex<Option<SinkInfo>>,
}

impl Shared {
    pub(crate) fn new(id: u64, controls: SinkControls) -> Self {
        Self {
            id,
            inner: Mutex::new(Inner::default()),
            session: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            controls,
            sink_info: Mutex::new(None),
        }
    }

    /// Whether `session` has been superseded by `stop`/`close`.
    pub(crate) fn is_stale(&self, session: u64) -> bool {
        self.closed.load(Ordering::Relaxed) || self.session.load(Ordering::Relaxed) != session
    }
}

/// Spawn the streaming thread for a player.
pub(crate) fn spawn(
    shared: Arc<Shared>,
    config: PlayerConfig,
) -> (Sender<WorkerCommand>, thread::JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
    let join = thread::spawn(move || worker_main(shared, config, cmd_rx));
    (cmd_tx, join)
}

fn worker_main(shared: Arc<Shared>, config: PlayerConfig, cmd_rx: Receiver<WorkerCommand>) {
    let mut sink: Option<OutputSink> = None;

    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            WorkerCommand::Shutdown => break,
            WorkerCommand::Play {
                session,
                mut completer,
            } => {
                tracing::info!(player = shared.id, session, "playback started");
                let mut started = false;
                loop {
                    let result = run_session(&shared, &config, &mut sink, session, &mut started);
                    match finish_session(&shared, session, result, completer, sink.as_ref()) {
                        // Sources were appended while the tail was rendering.
                        Some(pending) => completer = pending,
                        None => break,
                    }
                }
            }
        }
    }

    drop(sink);
    tracing::debug!(player = shared.id, "streaming thread exited");
}

/// Play the queue until it is exhausted and fully rendered.
fn run_session(
    shared: &Shared,
    config: &PlayerConfig,
    sink_slot: &mut Option<OutputSink>,
    session: u64,
    started: &mut bool,
) -> Result<()> {
    let cancelled = || shared.is_stale(session);

    loop {
        let next = {
            let mut inner = shared.inner.lock();
            if cancelled() {
                return Err(PlayerError::Stopped);
            }
            let next = inner.queue.pop();
            inner.now_playing = next.as_ref().map(|s| s.path().to_path_buf());
            next
        };

        let Some(mut source) = next else {
            if let Some(sink) = sink_slot.as_ref() {
                if !sink.drain(&cancelled) {
                    return Err(PlayerError::Stopped);
                }
            }
            return Ok(());
        };

        let sink = match sink_slot.take() {
            Some(sink) => sink,
            None => {
                let sink = OutputSink::open(
                    &config.output,
                    &config.playback,
                    source.spec().sample_rate,
                    shared.controls.clone(),
                )?;
                *shared.sink_info.lock() = Some(SinkInfo {
                    device: sink.device_name().to_string(),
                    sample_rate: sink.sample_rate(),
                    channels: sink.channels() as u16,
                });
                sink
            }
        };
        let sink = sink_slot.insert(sink);
        if !*started {
            sink.begin_session();
            *started = true;
        }

        stream_source(&mut source, sink, &config.playback, &cancelled)?;
    }
}

/// Decode one source to the end, writing everything to the sink.
fn stream_source(
    source: &mut Source,
    sink: &mut OutputSink,
    playback: &PlaybackConfig,
    cancelled: &dyn Fn() -> bool,
) -> Result<()> {
    let spec = source.spec().clone();
    let mut resampler = if spec.sample_rate != sink.sample_rate() {
        Some(
            StreamResampler::new(
                spec.sample_rate,
                sink.sample_rate(),
                spec.channels,
                playback.chunk_frames,
            )
            .map_err(resample_error)?,
        )
    } else {
        None
    };
    tracing::info!(
        path = %source.path().display(),
        format = spec.format.as_str(),
        source_rate_hz = spec.sample_rate,
        output_rate_hz = sink.sample_rate(),
        resampling = resampler.is_some(),
        "source streaming"
    );

    loop {
        if cancelled() {
            return Err(PlayerError::Stopped);
        }

        let (samples, done) = match source.next_chunk()? {
            Some(chunk) => match resampler.as_mut() {
                Some(r) => (r.process(&chunk).map_err(resample_error)?, false),
                None => (chunk, false),
            },
            None => match resampler.as_mut() {
                Some(r) => (r.finish().map_err(resample_error)?, true),
                None => (Vec::new(), true),
            },
        };

        if !samples.is_empty() {
            let mixed = remix(&samples, spec.channels, sink.channels());
            if !sink.write(&mixed, cancelled) {
                return Err(PlayerError::Stopped);
            }
        }

        if done {
            return Ok(());
        }
    }
}

fn resample_error(e: anyhow::Error) -> PlayerError {
    PlayerError::Decode(format!("{e:#}"))
}

/// Apply the terminal transition for a session and fire its completion.
///
/// Staleness is decided once, under the state lock, so a `stop` racing the end of a session
/// either lands first (the completion reports `Stopped`) or after the completion fired.
/// Returns the completer when the session has to continue with sources appended meanwhile.
fn finish_session(
    shared: &Shared,
    session: u64,
    result: Result<()>,
    completer: Completer,
    sink: Option<&OutputSink>,
) -> Option<Completer> {
    let result = {
        let mut inner = shared.inner.lock();
        if shared.is_stale(session) {
            Err(PlayerError::Stopped)
        } else if result.is_ok() && !inner.queue.is_empty() {
            return Some(completer);
        } else {
            inner.now_playing = None;
            let transition = match &result {
                Ok(()) => Transition::Exhausted,
                Err(e) => {
                    let abandoned = inner.queue.clear();
                    tracing::warn!(player = shared.id, session, abandoned, "playback failed: {e}");
                    Transition::Failed
                }
            };
            if let Some(next) = inner.state.apply(transition) {
                inner.state = next;
            }
            shared.controls.paused.store(false, Ordering::Relaxed);
            result
        }
    };

    if result.is_err() {
        if let Some(sink) = sink {
            sink.discard();
        }
    }

    match &result {
        Ok(()) => tracing::info!(player = shared.id, session, "playback finished"),
        Err(PlayerError::Stopped) => {
            tracing::info!(player = shared.id, session, "playback stopped")
        }
        Err(_) => {}
    }
    completer.complete(result);
    None
}
