//! Debounced free-text search.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::{QueryParams, QueryState};
use crate::error::SyncError;

use super::engine::SyncEngine;
use super::fetcher::Fetcher;
use super::scheduler::Debouncer;

/// Turns keystrokes into at most one query per quiet period.
///
/// Each `set_query` validates the new params at once and restarts the timer;
/// only the text still current when the timer fires is queried. Results are
/// published on a watch channel.
pub struct SearchDebouncer<F: Fetcher> {
    engine: SyncEngine<F>,
    base: QueryParams,
    field: String,
    debouncer: Debouncer,
    results: watch::Sender<Option<QueryState<F::Data>>>,
}

impl<F: Fetcher> SearchDebouncer<F> {
    pub(crate) fn new(engine: SyncEngine<F>, base: QueryParams, field: String, delay: Duration) -> Self {
        let (results, _) = watch::channel(None);
        Self {
            engine,
            base,
            field,
            debouncer: Debouncer::new(delay),
            results,
        }
    }

    /// Params the search would query for `text`.
    pub fn params_for(&self, text: &str) -> QueryParams {
        self.base.clone().with(self.field.as_str(), text.trim())
    }

    /// Record a new search text.
    ///
    /// Malformed input fails here, synchronously, and cancels nothing.
    pub fn set_query(&self, text: &str) -> Result<(), SyncError> {
        let params = self.params_for(text);
        let key = self.engine.key_for(&params)?;
        debug!(key = %key, "Search input changed");

        let engine = self.engine.clone();
        let results = self.results.clone();
        self.debouncer.schedule(async move {
            match engine.query(&params).await {
                Ok(result) => {
                    results.send_replace(Some(result.into_state()));
                }
                Err(e) => warn!(error = %e, "Debounced search failed"),
            }
        });
        Ok(())
    }

    /// Drop the pending search, if any.
    pub fn cancel(&self) {
        self.debouncer.cancel();
    }

    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// State of the last search that ran.
    pub fn latest(&self) -> Option<QueryState<F::Data>> {
        self.results.borrow().clone()
    }

    /// Receiver that changes whenever a search completes.
    pub fn results(&self) -> watch::Receiver<Option<QueryState<F::Data>>> {
        self.results.subscribe()
    }
}
