//! Player state machine.

/// Lifecycle state of a player.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing started yet, or reset by `stop`.
    #[default]
    Idle,
    /// Streaming samples to the output sink.
    Playing,
    /// Streaming suspended; the decode position is kept.
    Paused,
    /// The queue ran out or a source failed. `play` may start again.
    Finished,
}

/// Events that move a player between states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Play,
    Pause,
    Resume,
    /// Queue exhausted and all written samples rendered.
    Exhausted,
    /// A source or the sink failed mid-stream.
    Failed,
    Stop,
}

impl PlaybackState {
    /// Apply `transition`, returning the next state or `None` when the event does not apply.
    pub fn apply(self, transition: Transition) -> Option<PlaybackState> {
        use PlaybackState::*;
        match (self, transition) {
            (Idle | Finished, Transition::Play) => Some(Playing),
            (Playing, Transition::Pause) => Some(Paused),
            (Paused, Transition::Resume) => Some(Playing),
            (Playing | Paused, Transition::Exhausted | Transition::Failed) => Some(Finished),
            (_, Transition::Stop) => Some(Idle),
            _ => None,
        }
    }

    /// Whether gain may be changed in this state.
    pub fn allows_gain_change(self) -> bool {
        self != PlaybackState::Playing
    }
}

#[cfg(test)]
mod tests {
    use super::PlaybackState::*;
    use super::*;

    #[test]
    fn happy_path_walks_the_diagram() {
        let s = Idle.apply(Transition::Play).unwrap();
        assert_eq!(s, Playing);
        let s = s.apply(Transition::Pause).unwrap();
        assert_eq!(s, Paused);
        let s = s.apply(Transition::Resume).unwrap();
        assert_eq!(s, Playing);
        assert_eq!(s.apply(Transition::Exhausted), Some(Finished));
        assert_eq!(Playing.apply(Transition::Failed), Some(Finished));
    }

    #[test]
    fn mismatched_events_are_rejected() {
        assert_eq!(Idle.apply(Transition::Pause), None);
        assert_eq!(Finished.apply(Transition::Pause), None);
        assert_eq!(Playing.apply(Transition::Resume), None);
        assert_eq!(Idle.apply(Transition::Resume), None);
        assert_eq!(Playing.apply(Transition::Play), None);
        assert_eq!(Paused.apply(Transition::Play), None);
        assert_eq!(Idle.apply(Transition::Exhausted), None);
    }

    #[test]
    fn finished_can_play_again_and_stop_always_resets() {
        assert_eq!(Finished.apply(Transition::Play), Some(Playing));
        for s in [Idle, Playing, Paused, Finished] {
            assert_eq!(s.apply(Transition::Stop), Some(Idle));
        }
    }

    #[test]
    fn gain_is_locked_only_while_playing() {
        assert!(Idle.allows_gain_change());
        assert!(Paused.allows_gain_change());
        assert!(Finished.allows_gain_change());
        assert!(!Playing.allows_gain_change());
    }
}
