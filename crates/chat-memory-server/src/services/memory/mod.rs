//! Session memory
//!
//! Bounded, in-process conversation history keyed by session id:
//! - capacity bound on the number of sessions
//! - idle TTL with lazy eviction on access
//! - per-session cap on stored turns (oldest dropped first)

mod clock;
mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{MemoryError, SessionStore};
pub use types::{Role, Session, SessionSummary, StoreStats, Turn};
