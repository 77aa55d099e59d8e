use crate::app::{Action, Affordances, SessionEvent, SessionState};
use crate::health::HealthStatus;
use crate::messages::Message;

/// A parsed line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Action(Action),
    Log,
    Status,
    Retry,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let word = line.trim().to_lowercase();
    match word.as_str() {
        "" => Command::Empty,
        "listen" | "l" => Command::Action(Action::ListenOnce),
        "start" | "s" => Command::Action(Action::StartContinuous),
        "stop" | "x" => Command::Action(Action::StopContinuous),
        "speak" | "t" => Command::Action(Action::TestSpeak),
        "log" => Command::Log,
        "status" => Command::Status,
        "retry" | "r" => Command::Retry,
        "help" | "?" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        _ => Command::Unknown(word),
    }
}

/// Whether the button for `action` would be enabled.
pub fn is_enabled(action: Action, affordances: Affordances) -> bool {
    match action {
        Action::ListenOnce => affordances.listen,
        Action::StartContinuous => affordances.start,
        Action::StopContinuous => affordances.stop,
        Action::TestSpeak => affordances.speak,
    }
}

/// One-line summary of the state plus which actions are available.
pub fn status_line(state: SessionState) -> String {
    let a = state.affordances();
    let mark = |on: bool| if on { "on" } else { "off" };
    format!(
        "{}  [listen:{} start:{} stop:{} speak:{}]",
        state.status_text(),
        mark(a.listen),
        mark(a.start),
        mark(a.stop),
        mark(a.speak)
    )
}

pub fn render_event(event: &SessionEvent) {
    match event {
        SessionEvent::StateChanged(state) => println!("-- {}", status_line(*state)),
        SessionEvent::MessageAppended(message) => println!("{message}"),
    }
}

pub fn print_log(messages: &[Message]) {
    if messages.is_empty() {
        println!("Waiting for commands...");
        return;
    }
    for message in messages {
        println!("{message}");
    }
}

pub fn print_status(state: SessionState, health: &HealthStatus, last: Option<&Message>) {
    println!("{}", status_line(state));
    if let Some(message) = last {
        println!("Last: {message}");
    }
    match health.last_checked_at {
        Some(at) => println!(
            "Voice server {} (last checked {})",
            if health.reachable { "reachable" } else { "unreachable" },
            at.format("%H:%M:%S")
        ),
        None => println!("Voice server not checked yet"),
    }
}

pub fn print_help() {
    println!("Commands:");
    println!("  listen (l)   capture one utterance");
    println!("  start  (s)   start continuous listening");
    println!("  stop   (x)   stop continuous listening");
    println!("  speak  (t)   speech test");
    println!("  log          show the message log");
    println!("  status       show session and server status");
    println!("  retry  (r)   check the voice server again now");
    println!("  quit   (q)");
}
