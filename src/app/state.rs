use crate::messages::{Message, MessageKind, MessageLog};

/// Where the voice session currently is. Exactly one holds at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Voice server unreachable.
    #[default]
    Offline,
    Idle,
    /// A single-shot capture is in flight.
    ListeningOnce,
    /// The server is capturing continuously until stopped.
    ListeningContinuous,
}

impl SessionState {
    pub fn affordances(self) -> Affordances {
        match self {
            Self::Offline | Self::ListeningOnce => Affordances {
                listen: false,
                start: false,
                stop: false,
                speak: true,
            },
            Self::Idle => Affordances {
                listen: true,
                start: true,
                stop: false,
                speak: true,
            },
            Self::ListeningContinuous => Affordances {
                listen: false,
                start: false,
                stop: true,
                speak: true,
            },
        }
    }

    /// Text for the status line.
    pub fn status_text(self) -> &'static str {
        match self {
            Self::Offline => "Server offline - Please wait...",
            Self::Idle => "Ready",
            Self::ListeningOnce => "Listening...",
            Self::ListeningContinuous => "Continuous listening active",
        }
    }
}

/// Which user actions are currently enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Affordances {
    pub listen: bool,
    pub start: bool,
    pub stop: bool,
    pub speak: bool,
}

/// User-facing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ListenOnce,
    StartContinuous,
    StopContinuous,
    TestSpeak,
}

/// Session state before and after handling an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateDelta {
    pub before: SessionState,
    pub after: SessionState,
}

impl StateDelta {
    pub fn unchanged(state: SessionState) -> Self {
        Self {
            before: state,
            after: state,
        }
    }

    pub fn changed(&self) -> bool {
        self.before != self.after
    }
}

/// Notifications sent to observers of the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    MessageAppended(Message),
}

/// The session data owned by the coordinator.
#[derive(Debug, Default)]
pub struct Session {
    state: SessionState,
    log: MessageLog,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// Returns the previous state.
    pub(super) fn set_state(&mut self, to: SessionState) -> SessionState {
        std::mem::replace(&mut self.state, to)
    }

    pub(super) fn record(&mut self, kind: MessageKind, text: impl Into<String>) -> Message {
        let message = Message::new(kind, text);
        self.log.append(message.clone());
        message
    }
}
