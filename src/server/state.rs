//! Application state.

use crate::analysis::Aggregator;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    /// Articles shorter than this (after trimming) are rejected.
    pub min_article_chars: usize,
    /// Cancelled on shutdown.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(aggregator: Aggregator, min_article_chars: usize, shutdown: CancellationToken) -> Self {
        Self {
            aggregator: Arc::new(aggregator),
            min_article_chars,
            shutdown,
        }
    }
}
