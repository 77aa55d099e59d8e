use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use super::state::{Action, Affordances, Session, SessionEvent, SessionState, StateDelta};
use crate::backend::VoiceBackend;
use crate::config::Config;
use crate::error::ClientError;
use crate::health::HealthHandle;
use crate::messages::{Message, MessageKind};

/// Phrases and limits the coordinator works with.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub wake_word: String,
    pub wake_reply: String,
    pub demo_phrase: String,
    pub listen_timeout: Option<Duration>,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            wake_word: config.wake_word.clone(),
            wake_reply: config.wake_reply.clone(),
            demo_phrase: config.demo_phrase.clone(),
            listen_timeout: config.listen_timeout(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Owns the session and is the only thing that changes it.
///
/// Runs on a single thread. Each operation checks its precondition before
/// the first await, so a second request arriving while one is in flight is
/// rejected instead of queued. No `RefCell` borrow is held across an await.
pub struct Coordinator<B> {
    backend: Rc<B>,
    settings: SessionSettings,
    session: RefCell<Session>,
    /// A capture-affecting request (listen/start/stop) is awaiting the server.
    busy: Cell<bool>,
    /// The server dropped while busy; go offline once the request settles.
    offline_pending: Cell<bool>,
    health: Option<HealthHandle>,
    observer: Option<async_channel::Sender<SessionEvent>>,
}

/// Clears `busy` and settles a single-shot capture back to `Idle` however
/// the request future ends, including being dropped mid-await.
struct InFlight<'a, B> {
    coordinator: &'a Coordinator<B>,
}

impl<B> Drop for InFlight<'_, B> {
    fn drop(&mut self) {
        self.coordinator.settle();
    }
}

impl<B> Coordinator<B> {
    pub fn state(&self) -> SessionState {
        self.session.borrow().state()
    }

    pub fn affordances(&self) -> Affordances {
        self.state().affordances()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.session.borrow().log().snapshot().to_vec()
    }

    pub fn last_message(&self) -> Option<Message> {
        self.session.borrow().log().last().cloned()
    }

    pub fn message_count(&self) -> usize {
        self.session.borrow().log().len()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    /// Feed a reachability transition from the health monitor.
    /// `listening` is the server's own view of continuous capture.
    pub fn set_reachable(&self, reachable: bool, listening: bool) {
        if !reachable && self.busy.get() {
            log::info!("Voice server dropped mid-request, going offline once it settles");
            self.offline_pending.set(true);
            return;
        }
        self.offline_pending.set(false);

        match (self.state(), reachable) {
            (SessionState::Offline, true) => {
                if listening {
                    self.transition(SessionState::ListeningContinuous);
                    self.push(
                        MessageKind::System,
                        "Voice server connected (continuous listening already active)",
                    );
                } else {
                    self.transition(SessionState::Idle);
                    self.push(MessageKind::System, "Voice server connected");
                }
            }
            (SessionState::Idle | SessionState::ListeningContinuous, false) => self.go_offline(),
            _ => {}
        }
    }

    fn settle(&self) {
        self.busy.set(false);
        if self.state() == SessionState::ListeningOnce {
            self.transition(SessionState::Idle);
        }
        if self.offline_pending.take() {
            self.go_offline();
        }
    }

    fn go_offline(&self) {
        if self.state() != SessionState::Offline {
            self.transition(SessionState::Offline);
            self.push(MessageKind::System, "Voice server disconnected");
        }
    }

    fn transition(&self, to: SessionState) {
        let from = self.session.borrow_mut().set_state(to);
        if from != to {
            log::info!("Session {from:?} -> {to:?}");
            self.emit(SessionEvent::StateChanged(to));
        }
    }

    fn push(&self, kind: MessageKind, text: impl Into<String>) {
        let message = self.session.borrow_mut().record(kind, text);
        self.emit(SessionEvent::MessageAppended(message));
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(ref tx) = self.observer {
            let _ = tx.try_send(event);
        }
    }

    /// Claim the request slot if nothing is in flight and the session is in
    /// `required`.
    fn begin(&self, action: Action, required: SessionState) -> Option<InFlight<'_, B>> {
        let state = self.state();
        if self.busy.get() || state != required {
            log::info!("Ignoring {action:?} while {state:?} (busy={})", self.busy.get());
            return None;
        }
        self.busy.set(true);
        Some(InFlight { coordinator: self })
    }

    fn note_failure(&self, err: &ClientError) {
        if err.is_network() {
            if let Some(ref health) = self.health {
                health.report_unreachable();
            }
        }
    }

    fn is_wake_word(&self, transcript: &str) -> bool {
        let wake = self.settings.wake_word.trim().to_lowercase();
        !wake.is_empty() && transcript.to_lowercase().contains(&wake)
    }
}

impl<B: VoiceBackend> Coordinator<B> {
    pub fn new(backend: Rc<B>, settings: SessionSettings) -> Self {
        Self {
            backend,
            settings,
            session: RefCell::new(Session::new()),
            busy: Cell::new(false),
            offline_pending: Cell::new(false),
            health: None,
            observer: None,
        }
    }

    /// Report network failures to the health monitor so it resumes polling.
    pub fn with_health(mut self, health: HealthHandle) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_observer(mut self, observer: async_channel::Sender<SessionEvent>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub async fn dispatch(&self, action: Action) -> StateDelta {
        match action {
            Action::ListenOnce => self.listen_once().await,
            Action::StartContinuous => self.start_continuous().await,
            Action::StopContinuous => self.stop_continuous().await,
            Action::TestSpeak => self.test_speak().await,
        }
    }

    /// Capture a single utterance. Always ends back in `Idle`.
    pub async fn listen_once(&self) -> StateDelta {
        let before = self.state();
        let Some(request) = self.begin(Action::ListenOnce, SessionState::Idle) else {
            return StateDelta::unchanged(before);
        };
        self.transition(SessionState::ListeningOnce);

        let result = match self.settings.listen_timeout {
            Some(limit) => tokio::time::timeout(limit, self.backend.listen_once())
                .await
                .unwrap_or_else(|_| Err(ClientError::Backend("Timed out waiting for speech".into()))),
            None => self.backend.listen_once().await,
        };

        match result {
            Ok(text) => {
                log::info!("Heard: {text:?}");
                let wake = self.is_wake_word(&text);
                self.push(MessageKind::User, text);
                if wake {
                    self.acknowledge_wake_word().await;
                }
            }
            Err(e) => {
                log::warn!("Listen failed: {e}");
                self.push(MessageKind::Error, failure_text(&e));
                self.note_failure(&e);
            }
        }

        drop(request);
        StateDelta {
            before,
            after: self.state(),
        }
    }

    async fn acknowledge_wake_word(&self) {
        log::info!("Wake word detected");
        let reply = self.settings.wake_reply.clone();
        match self.backend.speak(&reply).await {
            Ok(()) => self.push(MessageKind::Assistant, reply),
            Err(e) => {
                log::warn!("Wake word reply failed: {e}");
                self.push(
                    MessageKind::Error,
                    format!("Failed to answer wake word: {}", failure_text(&e)),
                );
                self.note_failure(&e);
            }
        }
    }

    pub async fn start_continuous(&self) -> StateDelta {
        let before = self.state();
        let Some(request) = self.begin(Action::StartContinuous, SessionState::Idle) else {
            return StateDelta::unchanged(before);
        };

        match self.backend.start_continuous().await {
            Ok(()) => {
                self.transition(SessionState::ListeningContinuous);
                self.push(MessageKind::Assistant, "Continuous listening started");
            }
            Err(e) => {
                log::warn!("Start listening failed: {e}");
                self.push(
                    MessageKind::Error,
                    format!("Failed to start listening: {}", failure_text(&e)),
                );
                self.note_failure(&e);
            }
        }

        drop(request);
        StateDelta {
            before,
            after: self.state(),
        }
    }

    /// Stop continuous capture. On failure the session stays in
    /// `ListeningContinuous`, mirroring how a failed start stays `Idle`.
    pub async fn stop_continuous(&self) -> StateDelta {
        let before = self.state();
        let Some(request) =
            self.begin(Action::StopContinuous, SessionState::ListeningContinuous)
        else {
            return StateDelta::unchanged(before);
        };

        match self.backend.stop_continuous().await {
            Ok(()) => {
                self.transition(SessionState::Idle);
                self.push(MessageKind::Assistant, "Continuous listening stopped");
            }
            Err(e) => {
                log::warn!("Stop listening failed: {e}");
                self.push(
                    MessageKind::Error,
                    format!("Failed to stop listening: {}", failure_text(&e)),
                );
                self.note_failure(&e);
            }
        }

        drop(request);
        StateDelta {
            before,
            after: self.state(),
        }
    }

    /// Speak the demo phrase. Allowed in every state.
    pub async fn test_speak(&self) -> StateDelta {
        let before = self.state();
        let phrase = self.settings.demo_phrase.clone();
        match self.backend.speak(&phrase).await {
            Ok(()) => self.push(MessageKind::Assistant, phrase),
            Err(e) => {
                log::warn!("Speech test failed: {e}");
                self.push(
                    MessageKind::Error,
                    format!("Speech test failed: {}", failure_text(&e)),
                );
                self.note_failure(&e);
            }
        }
        StateDelta {
            before,
            after: self.state(),
        }
    }
}

fn failure_text(err: &ClientError) -> String {
    match err {
        ClientError::NetworkUnavailable(_) => "Failed to connect to voice server".to_string(),
        other => other.to_string(),
    }
}
