//! Per-session context shared across pipeline executions

mod clock;
mod file_store;
mod store;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use file_store::FileSessionStore;
pub use store::{InMemorySessionStore, SessionError, SessionStore};
pub use types::{Location, Session, SessionPatch};
