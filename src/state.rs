//! Player lifecycle states and transition legality.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Idle,
    Inited,
    Prepared,
    Started,
    Paused,
    NearlyCompleted,
    Completed,
    Stopped,
    Error,
}

/// The events a running player can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    SetDataSource,
    PrepareOk,
    PrepareFail,
    Start,
    Pause,
    Resume,
    NearingEos,
    SinkDrained,
    Stop,
    Reset,
    Fatal,
}

impl State {
    /// Apply `event` to `self`, returning the resulting state.
    ///
    /// Any event not explicitly listed for the current state maps to `Error`, except
    /// `Reset` (legal from every state, including `Error`) and `Fatal` (legal from every
    /// state).
    #[must_use]
    pub fn apply(self, event: Event) -> State {
        use Event::{
            Fatal, NearingEos, Pause, PrepareFail, PrepareOk, Reset, Resume, SetDataSource,
            SinkDrained, Start, Stop,
        };
        use State::{
            Completed, Error, Idle, Inited, NearlyCompleted, Paused, Prepared, Started, Stopped,
        };

        if event == Reset {
            return Idle;
        }
        if event == Fatal {
            return Error;
        }

        match (self, event) {
            (Idle, SetDataSource) => Inited,
            (Inited, PrepareOk) => Prepared,
            (Inited, PrepareFail) => Error,
            (Prepared, Start) => Started,
            (Started, Pause) => Paused,
            (Paused, Resume) => Started,
            (Started, NearingEos) => NearlyCompleted,
            (NearlyCompleted, SinkDrained) => Completed,
            // "any playing" may stop.
            (Started | Paused | NearlyCompleted, Stop) => Stopped,
            _ => Error,
        }
    }

    #[must_use]
    pub fn is_playing(self) -> bool {
        matches!(self, State::Started | State::Paused | State::NearlyCompleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normal_playthrough_sequence() {
        let mut s = State::Idle;
        let seq = [
            Event::SetDataSource,
            Event::PrepareOk,
            Event::Start,
            Event::NearingEos,
            Event::SinkDrained,
        ];
        let expect = [
            State::Inited,
            State::Prepared,
            State::Started,
            State::NearlyCompleted,
            State::Completed,
        ];
        for (ev, want) in seq.iter().zip(expect.iter()) {
            s = s.apply(*ev);
            assert_eq!(s, *want);
        }
    }

    #[test]
    fn reset_returns_to_idle_from_any_state() {
        for s in [
            State::Idle,
            State::Inited,
            State::Prepared,
            State::Started,
            State::Paused,
            State::NearlyCompleted,
            State::Completed,
            State::Stopped,
            State::Error,
        ] {
            assert_eq!(s.apply(Event::Reset), State::Idle);
        }
    }

    #[test]
    fn stop_from_any_playing_state_reaches_stopped() {
        for s in [State::Started, State::Paused, State::NearlyCompleted] {
            assert_eq!(s.apply(Event::Stop), State::Stopped);
        }
    }

    #[test]
    fn unexpected_event_is_error() {
        assert_eq!(State::Idle.apply(Event::Start), State::Error);
        assert_eq!(State::Prepared.apply(Event::Pause), State::Error);
        assert_eq!(State::Completed.apply(Event::Pause), State::Error);
    }

    #[test]
    fn fatal_is_legal_from_every_state() {
        for s in [
            State::Idle,
            State::Inited,
            State::Prepared,
            State::Started,
            State::Paused,
            State::NearlyCompleted,
            State::Completed,
            State::Stopped,
            State::Error,
        ] {
            assert_eq!(s.apply(Event::Fatal), State::Error);
        }
    }
}
