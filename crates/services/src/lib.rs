#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod evaluation;
pub mod identity;
pub mod oracle;
pub mod results;
pub mod tracker;

pub use quiz_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, OracleError, ResultsError, TrackerError, WriteFailure, WriteKind};
pub use evaluation::EvaluationService;
pub use identity::{IdentityProvider, StaticIdentity};
pub use oracle::{LlmOracle, OracleConfig, OracleRequest, ScoringOracle};
pub use results::{ResultsService, SessionResults};
pub use tracker::{PendingWrite, SessionPhase, SessionTracker, TrackerEvent, TrackerState};
