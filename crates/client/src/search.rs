//! Search-as-you-type suggestions.
//!
//! Each keystroke starts a new lookup and aborts the previous one, so only
//! the latest query can ever publish results.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use depot_core::Suggestion;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::ClientError;
use crate::http::ApiClient;

/// Queries shorter than this clear the results without a request.
pub const MIN_QUERY_LEN: usize = 2;

/// Source of suggestions for a query.
pub trait SuggestionSource: Send + Sync + 'static {
    fn suggestions(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Vec<Suggestion>, ClientError>> + Send;
}

impl SuggestionSource for ApiClient {
    async fn suggestions(&self, query: &str) -> Result<Vec<Suggestion>, ClientError> {
        self.suggest(query).await
    }
}

/// Published suggestion state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuggestionState {
    /// The query these results belong to.
    pub query: String,
    pub results: Vec<Suggestion>,
    pub loading: bool,
}

#[derive(Default)]
struct Latest {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

/// Superseding suggestion lookups.
pub struct Suggestions<S> {
    source: Arc<S>,
    latest: Arc<Mutex<Latest>>,
    state: Arc<watch::Sender<SuggestionState>>,
}

impl<S: SuggestionSource> Suggestions<S> {
    #[must_use]
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
            latest: Arc::default(),
            state: Arc::new(watch::channel(SuggestionState::default()).0),
        }
    }

    /// Subscribe to suggestion results.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SuggestionState> {
        self.state.subscribe()
    }

    /// The latest published state.
    #[must_use]
    pub fn current(&self) -> SuggestionState {
        self.state.borrow().clone()
    }

    /// Look up suggestions for `query`, superseding any earlier lookup.
    pub fn query(&self, query: &str) {
        let query = query.trim().to_string();
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(task) = latest.task.take() {
            task.abort();
        }
        latest.generation += 1;
        let generation = latest.generation;

        if query.chars().count() < MIN_QUERY_LEN {
            self.state.send_replace(SuggestionState {
                query,
                ..SuggestionState::default()
            });
            return;
        }

        self.state.send_replace(SuggestionState {
            query: query.clone(),
            results: Vec::new(),
            loading: true,
        });

        let source = Arc::clone(&self.source);
        let shared = Arc::clone(&self.latest);
        let state = Arc::clone(&self.state);
        latest.task = Some(tokio::spawn(async move {
            let results = match source.suggestions(&query).await {
                Ok(results) => results,
                Err(e) => {
                    debug!(query = %query, error = %e, "Suggestion lookup failed");
                    Vec::new()
                }
            };

            // Checked under the lock so a newer query cannot slip in between
            let latest = shared.lock().unwrap_or_else(PoisonError::into_inner);
            if latest.generation == generation {
                state.send_replace(SuggestionState {
                    query,
                    results,
                    loading: false,
                });
            }
        }));
    }

    /// Cancel any lookup and clear results.
    pub fn clear(&self) {
        self.query("");
    }
}

impl<S> Drop for Suggestions<S> {
    fn drop(&mut self) {
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = latest.task.take() {
            task.abort();
        }
    }
}
