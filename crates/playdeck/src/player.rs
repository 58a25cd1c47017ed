//! Player handle.
//!
//! A [`Player`] owns a queue of sources, a state cell, a gain and a dedicated streaming
//! thread. All control operations are synchronous and never wait on the audio path; `play`
//! returns immediately and reports the end of playback through a [`Completion`] (or a
//! callback run on the player's streaming thread).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::completion::{self, Completer, Completion};
use crate::config::PlayerConfig;
use crate::error::{PlayerError, Result};
use crate::sink::SinkControls;
use crate::source::Source;
use crate::state::{PlaybackState, Transition};
use crate::status::{PlayerStatus, elapsed_from_frames};
use crate::volume::VolumeController;
use crate::worker::{self, Shared, WorkerCommand};

static NEXT_PLAYER_ID: AtomicU64 = AtomicU64::new(1);

/// An independent playback engine instance.
///
/// Players share nothing; any number may play concurrently. The output device is opened on
/// the first `play` and released by [`close`](Player::close) or drop.
pub struct Player {
    shared: Arc<Shared>,
    cmd_tx: Sender<WorkerCommand>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    worker_thread: thread::ThreadId,
}

impl Player {
    /// A player rendering to the default output device.
    pub fn new() -> Self {
        Self::with_config(PlayerConfig::default())
    }

    pub fn with_config(config: PlayerConfig) -> Self {
        let id = NEXT_PLAYER_ID.fetch_add(1, Ordering::Relaxed);
        let volume = Arc::new(VolumeController::new(config.initial_gain));
        let shared = Arc::new(Shared::new(id, SinkControls::new(volume)));
        let (cmd_tx, join) = worker::spawn(shared.clone(), config);
        let worker_thread = join.thread().id();
        tracing::debug!(player = id, "player created");
        Self {
            shared,
            cmd_tx,
            worker: Mutex::new(Some(join)),
            worker_thread,
        }
    }

    /// Process-unique id used in log lines.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Open `path` and add it to the end of the queue.
    ///
    /// Allowed in any state. On error the queue is unchanged.
    pub fn append(&self, path: impl AsRef<Path>) -> Result<()> {
        if self.is_closed() {
            return Err(PlayerError::Closed);
        }
        let source = Source::open(path)?;
        let mut inner = self.shared.inner.lock();
        if self.is_closed() {
            return Err(PlayerError::Closed);
        }
        tracing::debug!(
            player = self.shared.id,
            path = %source.path().display(),
            queued = inner.queue.len() + 1,
            "source appended"
        );
        inner.queue.push(source);
        Ok(())
    }

    /// Start streaming the queue.
    ///
    /// Only valid from `Idle` or `Finished`. The returned [`Completion`] resolves once the
    /// queue is exhausted and every sample has been rendered, or with the error that ended
    /// playback.
    pub fn play(&self) -> Result<Completion> {
        let (completer, completion) = completion::channel();
        self.start(completer)?;
        Ok(completion)
    }

    /// Like [`play`](Player::play), but reports the outcome to `on_complete`.
    ///
    /// The callback runs on this player's streaming thread, or inline when the queue is
    /// empty. It may freely call into other players, or into this one.
    pub fn play_with(&self, on_complete: impl FnOnce(Result<()>) + Send + 'static) -> Result<()> {
        self.start(Completer::callback(on_complete))
    }

    fn start(&self, completer: Completer) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        if self.is_closed() {
            return Err(PlayerError::Closed);
        }
        let Some(next) = inner.state.apply(Transition::Play) else {
            return Err(PlayerError::InvalidState(inner.state));
        };

        if inner.queue.is_empty() {
            inner.state = PlaybackState::Finished;
            drop(inner);
            tracing::debug!(player = self.shared.id, "play with empty queue");
            completer.complete(Ok(()));
            return Ok(());
        }

        let previous = inner.state;
        inner.state = next;
        self.shared.controls.paused.store(false, Ordering::Relaxed);
        let session = self.shared.session.load(Ordering::Relaxed);
        if self
            .cmd_tx
            .send(WorkerCommand::Play { session, completer })
            .is_err()
        {
            inner.state = previous;
            return Err(PlayerError::Closed);
        }
        Ok(())
    }

    /// Suspend output without dropping buffered audio. No-op unless `Playing`.
    pub fn pause(&self) {
        let mut inner = self.shared.inner.lock();
        if let Some(next) = inner.state.apply(Transition::Pause) {
            inner.state = next;
            self.shared.controls.paused.store(true, Ordering::Relaxed);
            tracing::debug!(player = self.shared.id, "paused");
        }
    }

    /// Continue from the exact sample where output stopped. No-op unless `Paused`.
    pub fn resume(&self) {
        let mut inner = self.shared.inner.lock();
        if let Some(next) = inner.state.apply(Transition::Resume) {
            inner.state = next;
            self.shared.controls.paused.store(false, Ordering::Relaxed);
            tracing::debug!(player = self.shared.id, "resumed");
        }
    }

    /// Set the gain. Fails with `Locked` while `Playing`.
    pub fn volume(&self, level: f32) -> Result<()> {
        let inner = self.shared.inner.lock();
        if self.is_closed() {
            return Err(PlayerError::Closed);
        }
        let gain = self.shared.controls.volume.set(level, inner.state)?;
        tracing::debug!(player = self.shared.id, gain, "volume set");
        Ok(())
    }

    /// Cancel playback and discard the queue. The in-flight completion reports `Stopped`.
    pub fn stop(&self) {
        let mut inner = self.shared.inner.lock();
        self.halt(&mut inner);
    }

    fn halt(&self, inner: &mut worker::Inner) {
        self.shared.session.fetch_add(1, Ordering::Relaxed);
        let discarded = inner.queue.clear();
        inner.now_playing = None;
        if let Some(next) = inner.state.apply(Transition::Stop) {
            inner.state = next;
        }
        tracing::debug!(player = self.shared.id, discarded, "stopped");
    }

    /// Stop playback, shut down the streaming thread and release the output.
    ///
    /// Idempotent. Called automatically on drop.
    pub fn close(&self) {
        {
            let mut inner = self.shared.inner.lock();
            if self.shared.closed.swap(true, Ordering::Relaxed) {
                return;
            }
            self.halt(&mut inner);
        }
        let _ = self.cmd_tx.send(WorkerCommand::Shutdown);

        let join = self.worker.lock().take();
        if let Some(join) = join {
            // From a completion callback the streaming thread exits on its own.
            if thread::current().id() != self.worker_thread && join.join().is_err() {
                tracing::warn!(player = self.shared.id, "streaming thread panicked");
            }
        }
        tracing::debug!(player = self.shared.id, "player closed");
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.inner.lock().state
    }

    pub fn gain(&self) -> f32 {
        self.shared.controls.volume.get()
    }

    /// Number of sources waiting to be played.
    pub fn queued(&self) -> usize {
        self.shared.inner.lock().queue.len()
    }

    pub fn queued_paths(&self) -> Vec<PathBuf> {
        self.shared.inner.lock().queue.paths()
    }

    /// Output time rendered during the current (or last) play.
    pub fn position(&self) -> Duration {
        let rate = self.shared.sink_info.lock().as_ref().map(|s| s.sample_rate);
        elapsed_from_frames(self.shared.controls.played_frames.load(Ordering::Relaxed), rate)
    }

    pub fn status(&self) -> PlayerStatus {
        let (state, now_playing, queued) = {
            let inner = self.shared.inner.lock();
            (inner.state, inner.now_playing.clone(), inner.queue.paths())
        };
        PlayerStatus {
            state,
            gain: self.gain(),
            now_playing,
            queued,
            played_frames: self.shared.controls.played_frames.load(Ordering::Relaxed),
            underrun_events: self.shared.controls.underrun_events.load(Ordering::Relaxed),
            sink: self.shared.sink_info.lock().clone(),
        }
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputTarget;
    use crate::sink::Capture;
    use crate::test_support::{
        fixture, null_config, tone_ramp_samples, write_level, write_tone, write_wav_i16,
    };

    const WAIT: Duration = Duration::from_secs(10);

    fn wait(completion: &Completion) -> Result<()> {
        completion
            .wait_timeout(WAIT)
            .expect("playback did not complete in time")
    }

    fn wait_for_state(player: &Player, state: PlaybackState) {
        let deadline = std::time::Instant::now() + WAIT;
        while player.state() != state {
            assert!(std::time::Instant::now() < deadline, "never reached {state:?}");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn plays_queue_in_order_and_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        write_level(&a, 8_000, 1, 400, 8_192);
        write_level(&b, 8_000, 1, 400, -8_192);

        let capture = Capture::new();
        let player = Player::with_config(null_config(8_000, 1, Some(capture.clone())));
        player.append(&a).unwrap();
        player.append(&b).unwrap();
        assert_eq!(player.queued_paths(), vec![a, b]);

        let done = player.play().unwrap();
        assert_eq!(player.state(), PlaybackState::Playing);
        assert!(wait(&done).is_ok());

        assert_eq!(player.state(), PlaybackState::Finished);
        assert_eq!(player.queued(), 0);
        let mut expected = vec![0.25f32; 400];
        expected.extend(vec![-0.25f32; 400]);
        assert_eq!(capture.audible(), expected);
        assert_eq!(player.position(), Duration::from_millis(100));
    }

    #[test]
    fn append_during_playback_extends_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        write_tone(&a, 8_000, 1, 800);
        write_level(&b, 8_000, 1, 200, -8_192);

        let capture = Capture::new();
        let player = Player::with_config(null_config(8_000, 1, Some(capture.clone())));
        player.append(&a).unwrap();
        let done = player.play().unwrap();
        player.append(&b).unwrap();
        assert!(wait(&done).is_ok());

        let audible = capture.audible();
        assert_eq!(audible.len(), 1_000);
        assert!(audible[800..].iter().all(|s| *s == -0.25));
    }

    #[test]
    fn missing_file_is_rejected_and_other_players_keep_going() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        write_tone(&a, 8_000, 1, 400);

        let other = Player::with_config(null_config(8_000, 1, None));
        other.append(&a).unwrap();
        let other_done = other.play().unwrap();

        let player = Player::with_config(null_config(8_000, 1, None));
        let err = player.append(dir.path().join("missing.wav")).unwrap_err();
        assert!(matches!(err, PlayerError::FileNotFound { .. }));
        assert_eq!(player.queued(), 0);
        assert_eq!(player.state(), PlaybackState::Idle);

        assert!(wait(&other_done).is_ok());
    }

    #[test]
    fn unrecognized_content_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"definitely not audio").unwrap();

        let player = Player::with_config(null_config(8_000, 1, None));
        assert!(matches!(
            player.append(&path),
            Err(PlayerError::UnsupportedFormat { .. })
        ));
        assert_eq!(player.queued(), 0);
    }

    #[test]
    fn volume_is_locked_while_playing_and_allowed_when_paused() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        write_tone(&a, 8_000, 1, 2_000);

        let player = Player::with_config(null_config(8_000, 1, None));
        player.append(&a).unwrap();
        let done = player.play().unwrap();

        assert!(matches!(player.volume(0.3), Err(PlayerError::Locked)));
        assert_eq!(player.gain(), 1.0);

        player.pause();
        player.volume(0.3).unwrap();
        assert_eq!(player.gain(), 0.3);
        assert!(matches!(
            player.volume(f32::NAN),
            Err(PlayerError::InvalidGain(_))
        ));

        player.resume();
        assert!(wait(&done).is_ok());
        player.volume(0.6).unwrap();
        assert_eq!(player.gain(), 0.6);
    }

    #[test]
    fn pause_and_resume_keep_every_sample() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("ramp.wav");
        let ramp: Vec<i16> = (1..=2_400).collect();
        write_wav_i16(&a, 8_000, 1, &ramp);

        let capture = Capture::new();
        let player = Player::with_config(null_config(8_000, 1, Some(capture.clone())));
        player.append(&a).unwrap();
        let done = player.play().unwrap();

        thread::sleep(Duration::from_millis(60));
        player.pause();
        assert_eq!(player.state(), PlaybackState::Paused);
        thread::sleep(Duration::from_millis(20));
        let frozen = player.position();
        thread::sleep(Duration::from_millis(80));
        assert_eq!(player.position(), frozen);
        assert!(done.try_result().is_none());

        player.resume();
        assert!(wait(&done).is_ok());

        let expected: Vec<f32> = ramp.iter().map(|v| *v as f32 / 32_768.0).collect();
        assert_eq!(capture.audible(), expected);
    }

    #[test]
    fn completion_of_one_player_resumes_another() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        write_tone(&a, 8_000, 1, 800);
        write_tone(&b, 8_000, 1, 1_600);

        let first = Player::with_config(null_config(8_000, 1, None));
        let second = Arc::new(Player::with_config(null_config(8_000, 1, None)));
        first.append(&a).unwrap();
        second.append(&b).unwrap();

        let (tx, rx) = crossbeam_channel::bounded(1);
        let resumed = second.clone();
        first
            .play_with(move |result| {
                resumed.resume();
                tx.send(result.is_ok()).unwrap();
            })
            .unwrap();
        let second_done = second.play().unwrap();

        thread::sleep(Duration::from_millis(20));
        second.pause();
        assert_eq!(second.state(), PlaybackState::Paused);

        assert_eq!(rx.recv_timeout(WAIT), Ok(true));
        assert!(wait(&second_done).is_ok());
        assert_eq!(first.state(), PlaybackState::Finished);
        assert_eq!(second.state(), PlaybackState::Finished);
    }

    #[test]
    fn play_is_rejected_while_playing_or_paused() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        write_tone(&a, 8_000, 1, 1_600);

        let player = Player::with_config(null_config(8_000, 1, None));
        player.append(&a).unwrap();
        let done = player.play().unwrap();

        assert!(matches!(
            player.play(),
            Err(PlayerError::InvalidState(PlaybackState::Playing))
        ));
        player.pause();
        assert!(matches!(
            player.play(),
            Err(PlayerError::InvalidState(PlaybackState::Paused))
        ));
        player.resume();
        assert!(wait(&done).is_ok());
    }

    #[test]
    fn pause_and_resume_outside_their_states_do_nothing() {
        let player = Player::with_config(null_config(8_000, 1, None));
        player.resume();
        assert_eq!(player.state(), PlaybackState::Idle);
        player.pause();
        assert_eq!(player.state(), PlaybackState::Idle);
    }

    #[test]
    fn play_with_empty_queue_finishes_immediately() {
        let player = Player::with_config(null_config(8_000, 1, None));
        let done = player.play().unwrap();
        assert!(matches!(done.try_result(), Some(Ok(()))));
        assert_eq!(player.state(), PlaybackState::Finished);
        assert!(player.status().sink.is_none());
    }

    #[test]
    fn stop_reports_stopped_and_allows_a_new_play() {
        let dir = tempfile::tempdir().unwrap();
        let long = dir.path().join("long.wav");
        let short = dir.path().join("short.wav");
        write_tone(&long, 8_000, 1, 8_000);
        write_tone(&short, 8_000, 1, 200);

        let player = Player::with_config(null_config(8_000, 1, None));
        player.append(&long).unwrap();
        player.append(&short).unwrap();
        let done = player.play().unwrap();

        thread::sleep(Duration::from_millis(30));
        player.stop();
        assert_eq!(player.state(), PlaybackState::Idle);
        assert_eq!(player.queued(), 0);
        assert!(matches!(wait(&done), Err(PlayerError::Stopped)));
        assert_eq!(player.state(), PlaybackState::Idle);

        player.append(&short).unwrap();
        let again = player.play().unwrap();
        assert!(wait(&again).is_ok());
        assert_eq!(player.state(), PlaybackState::Finished);
    }

    #[test]
    fn finished_player_can_play_again() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        write_tone(&a, 8_000, 1, 300);

        let capture = Capture::new();
        let player = Player::with_config(null_config(8_000, 1, Some(capture.clone())));
        player.append(&a).unwrap();
        assert!(wait(&player.play().unwrap()).is_ok());
        player.append(&a).unwrap();
        assert!(wait(&player.play().unwrap()).is_ok());

        assert_eq!(capture.audible().len(), 600);
    }

    #[test]
    fn gain_scales_rendered_samples() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        write_tone(&a, 8_000, 1, 400);

        let capture = Capture::new();
        let player = Player::with_config(null_config(8_000, 1, Some(capture.clone())));
        player.volume(0.5).unwrap();
        player.append(&a).unwrap();
        assert!(wait(&player.play().unwrap()).is_ok());

        assert_eq!(capture.audible(), vec![0.125f32; 400]);
    }

    #[test]
    fn mono_source_is_duplicated_to_stereo_output() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        write_tone(&a, 8_000, 1, 400);

        let capture = Capture::new();
        let player = Player::with_config(null_config(8_000, 2, Some(capture.clone())));
        player.append(&a).unwrap();
        assert!(wait(&player.play().unwrap()).is_ok());

        assert_eq!(capture.audible(), vec![0.25f32; 800]);
        let sink = player.status().sink.unwrap();
        assert_eq!(sink.channels, 2);
        assert_eq!(sink.device, "null");
    }

    #[test]
    fn source_is_resampled_to_output_rate() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        write_tone(&a, 8_000, 1, 4_000);

        let capture = Capture::new();
        let player = Player::with_config(null_config(16_000, 1, Some(capture.clone())));
        player.append(&a).unwrap();
        assert!(wait(&player.play().unwrap()).is_ok());

        let status = player.status();
        assert_eq!(status.sink.map(|s| s.sample_rate), Some(16_000));
        let rendered = status.played_frames;
        assert!((6_000..=8_800).contains(&rendered), "rendered {rendered} frames");
    }

    #[test]
    fn flac_source_plays_every_sample() {
        let capture = Capture::new();
        let player = Player::with_config(null_config(8_000, 1, Some(capture.clone())));
        player.append(fixture("tone_ramp.flac")).unwrap();
        assert!(wait(&player.play().unwrap()).is_ok());

        assert_eq!(capture.audible(), tone_ramp_samples());
        assert_eq!(player.position(), Duration::from_millis(125));
    }

    #[test]
    fn decode_error_mid_stream_abandons_the_queue() {
        let dir = tempfile::tempdir().unwrap();
        let next = dir.path().join("next.wav");
        write_level(&next, 8_000, 1, 400, -8_192);

        let capture = Capture::new();
        let player = Player::with_config(null_config(8_000, 1, Some(capture.clone())));
        player.append(fixture("reserved_subframe.flac")).unwrap();
        player.append(&next).unwrap();
        let done = player.play().unwrap();

        assert!(matches!(wait(&done), Err(PlayerError::Decode(_))));
        // The sender is gone once the single result was delivered.
        assert!(matches!(done.try_result(), Some(Err(PlayerError::Closed))));
        assert_eq!(player.state(), PlaybackState::Finished);
        assert_eq!(player.queued(), 0);
        assert!(player.status().now_playing.is_none());

        let audible = capture.audible();
        assert!(audible.len() <= 256, "rendered {} samples", audible.len());
        assert!(audible.iter().all(|s| *s == 0.25));

        player.append(&next).unwrap();
        assert!(wait(&player.play().unwrap()).is_ok());
        assert_eq!(capture.audible().iter().filter(|s| **s == -0.25).count(), 400);
    }

    #[test]
    fn missing_output_device_fails_through_completion() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        write_tone(&a, 8_000, 1, 400);

        let mut config = null_config(8_000, 1, None);
        config.output = OutputTarget::Device {
            needle: Some("no-such-output-device-7f3a".to_string()),
        };
        let player = Player::with_config(config);
        player.append(&a).unwrap();
        player.append(&a).unwrap();
        let done = player.play().unwrap();

        assert!(matches!(wait(&done), Err(PlayerError::Device(_))));
        assert_eq!(player.state(), PlaybackState::Finished);
        assert_eq!(player.queued(), 0);
    }

    #[test]
    fn closed_player_rejects_operations() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        write_tone(&a, 8_000, 1, 400);

        let player = Player::with_config(null_config(8_000, 1, None));
        player.append(&a).unwrap();
        player.close();
        player.close();

        assert_eq!(player.state(), PlaybackState::Idle);
        assert_eq!(player.queued(), 0);
        assert!(matches!(player.append(&a), Err(PlayerError::Closed)));
        assert!(matches!(player.play(), Err(PlayerError::Closed)));
        assert!(matches!(player.volume(0.5), Err(PlayerError::Closed)));
        player.pause();
        player.resume();
        player.stop();
    }

    #[test]
    fn close_from_own_completion_does_not_deadlock() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        write_tone(&a, 8_000, 1, 200);

        let player = Arc::new(Player::with_config(null_config(8_000, 1, None)));
        player.append(&a).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let handle = player.clone();
        player
            .play_with(move |result| {
                handle.close();
                tx.send(result.is_ok()).unwrap();
            })
            .unwrap();

        assert_eq!(rx.recv_timeout(WAIT), Ok(true));
        wait_for_state(&player, PlaybackState::Idle);
        assert!(matches!(player.play(), Err(PlayerError::Closed)));
    }
}
