//! Single-shot completion channel for `play`.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::error::{PlayerError, Result};

/// Create a connected completer/completion pair.
pub(crate) fn channel() -> (Completer, Completion) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    (Completer::Channel(tx), Completion { rx })
}

pub(crate) type Callback = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// Producer half, owned by the streaming thread. Consumed on use so it can only fire once.
pub(crate) enum Completer {
    Channel(Sender<Result<()>>),
    /// Invoked on the player's streaming thread.
    Callback(Callback),
}

impl Completer {
    pub(crate) fn callback(f: impl FnOnce(Result<()>) + Send + 'static) -> Self {
        Completer::Callback(Box::new(f))
    }

    pub(crate) fn complete(self, result: Result<()>) {
        match self {
            // The caller may have dropped its Completion; nothing to report then.
            Completer::Channel(tx) => {
                let _ = tx.send(result);
            }
            Completer::Callback(f) => f(result),
        }
    }
}

impl std::fmt::Debug for Completer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Completer::Channel(_) => f.write_str("Completer::Channel"),
            Completer::Callback(_) => f.write_str("Completer::Callback"),
        }
    }
}

/// Caller half returned by [`Player::play`](crate::Player::play).
#[derive(Debug)]
pub struct Completion {
    rx: Receiver<Result<()>>,
}

impl Completion {
    /// Block until playback finishes.
    pub fn wait(self) -> Result<()> {
        self.rx.recv().unwrap_or(Err(PlayerError::Closed))
    }

    /// Block for at most `timeout`. `None` means playback is still running.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<()>> {
        match self.rx.recv_timeout(timeout) {
            Ok(r) => Some(r),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(PlayerError::Closed)),
        }
    }

    /// Non-blocking poll.
    pub fn try_result(&self) -> Option<Result<()>> {
        match self.rx.try_recv() {
            Ok(r) => Some(r),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(PlayerError::Closed)),
        }
    }
}
