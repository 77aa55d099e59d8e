//! Scripted in-memory voice server shared by the unit tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::Duration;

use crate::backend::{ServerStatus, VoiceBackend};
use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Speak(String),
    Listen,
    Start,
    Stop,
    Health,
}

/// Each operation pops its next scripted result; an empty script means success.
#[derive(Default)]
pub struct FakeBackend {
    calls: RefCell<Vec<Call>>,
    speak: RefCell<VecDeque<Result<(), ClientError>>>,
    listen: RefCell<VecDeque<Result<String, ClientError>>>,
    start: RefCell<VecDeque<Result<(), ClientError>>>,
    stop: RefCell<VecDeque<Result<(), ClientError>>>,
    health: RefCell<VecDeque<Result<ServerStatus, ClientError>>>,
    listen_delay: Cell<Duration>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_speak(&self, results: impl IntoIterator<Item = Result<(), ClientError>>) {
        self.speak.borrow_mut().extend(results);
    }

    pub fn script_listen(&self, results: impl IntoIterator<Item = Result<String, ClientError>>) {
        self.listen.borrow_mut().extend(results);
    }

    pub fn script_start(&self, results: impl IntoIterator<Item = Result<(), ClientError>>) {
        self.start.borrow_mut().extend(results);
    }

    pub fn script_stop(&self, results: impl IntoIterator<Item = Result<(), ClientError>>) {
        self.stop.borrow_mut().extend(results);
    }

    pub fn script_health(
        &self,
        results: impl IntoIterator<Item = Result<ServerStatus, ClientError>>,
    ) {
        self.health.borrow_mut().extend(results);
    }

    /// Make `listen_once` take this long before answering.
    pub fn set_listen_delay(&self, delay: Duration) {
        self.listen_delay.set(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(*c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl VoiceBackend for FakeBackend {
    async fn speak(&self, text: &str) -> Result<(), ClientError> {
        self.record(Call::Speak(text.to_string()));
        self.speak.borrow_mut().pop_front().unwrap_or(Ok(()))
    }

    async fn listen_once(&self) -> Result<String, ClientError> {
        self.record(Call::Listen);
        let delay = self.listen_delay.get();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.listen
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }

    async fn start_continuous(&self) -> Result<(), ClientError> {
        self.record(Call::Start);
        self.start.borrow_mut().pop_front().unwrap_or(Ok(()))
    }

    async fn stop_continuous(&self) -> Result<(), ClientError> {
        self.record(Call::Stop);
        self.stop.borrow_mut().pop_front().unwrap_or(Ok(()))
    }

    async fn check_health(&self) -> Result<ServerStatus, ClientError> {
        self.record(Call::Health);
        self.health
            .borrow_mut()
            .pop_front()
            .unwrap_or(Ok(ServerStatus::default()))
    }
}
