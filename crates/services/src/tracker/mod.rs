//! In-memory session tracking and its persistence.

mod documents;
mod service;
mod state;
mod writer;

pub use crate::error::{TrackerError, WriteFailure, WriteKind};
pub use service::SessionTracker;
pub use state::{SessionPhase, TrackerEvent, TrackerState};
pub use writer::PendingWrite;
