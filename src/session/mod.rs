//! Recognition session management
//!
//! A session moves through Listening, Resolved, Superseded and Destroyed.
//! The controller guarantees that only the newest session can publish or
//! complete the caller's request, and that the request completes once.

mod controller;
mod machine;
mod pending;

pub use controller::{ListenOptions, RecognitionController};
pub use machine::SessionState;
pub use pending::{PendingCall, Reply};
