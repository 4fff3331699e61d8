use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::error::AppServicesError;
use crate::evaluation::EvaluationService;
use crate::identity::IdentityProvider;
use crate::oracle::{LlmOracle, ScoringOracle};
use crate::results::ResultsService;
use crate::tracker::SessionTracker;

/// Assembles app-facing services over one document store.
#[derive(Clone)]
pub struct AppServices {
    clock: Clock,
    storage: Storage,
    identity: Arc<dyn IdentityProvider>,
    evaluation: Arc<EvaluationService>,
    results: Arc<ResultsService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage and the environment-configured oracle.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        let oracle = LlmOracle::from_env();
        let timeout = oracle.timeout();
        let evaluation = EvaluationService::new(Arc::new(oracle)).with_oracle_timeout(timeout);
        Ok(Self::assemble(clock, storage, identity, evaluation))
    }

    /// Build services over an in-memory store with the given oracle.
    #[must_use]
    pub fn in_memory(
        clock: Clock,
        identity: Arc<dyn IdentityProvider>,
        oracle: Arc<dyn ScoringOracle>,
    ) -> Self {
        Self::assemble(
            clock,
            Storage::in_memory(),
            identity,
            EvaluationService::new(oracle),
        )
    }

    fn assemble(
        clock: Clock,
        storage: Storage,
        identity: Arc<dyn IdentityProvider>,
        evaluation: EvaluationService,
    ) -> Self {
        let results = Arc::new(ResultsService::new(Arc::clone(&storage.documents)));
        Self {
            clock,
            storage,
            identity,
            evaluation: Arc::new(evaluation),
            results,
        }
    }

    /// A fresh tracker writing to this store.
    #[must_use]
    pub fn tracker(&self) -> SessionTracker {
        SessionTracker::new(
            self.clock,
            Arc::clone(&self.storage.documents),
            Arc::clone(&self.identity),
        )
    }

    #[must_use]
    pub fn evaluation(&self) -> Arc<EvaluationService> {
        Arc::clone(&self.evaluation)
    }

    #[must_use]
    pub fn results(&self) -> Arc<ResultsService> {
        Arc::clone(&self.results)
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}
