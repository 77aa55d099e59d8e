mod coordinator;
mod state;

pub use coordinator::{Coordinator, SessionSettings};
pub use state::{Action, Affordances, SessionEvent, SessionState};
