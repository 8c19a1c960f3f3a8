//! Background caching pass over every accessible score

use crate::fetcher::DocumentFetcher;
use crate::states::CacheStates;
use crate::types::*;
use futures::future::join_all;
use score_store::DurableStore;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cancellation token for one pass. Checked between scores, never mid-fetch.
#[derive(Debug, Clone, Default)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome counts of one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
}

#[derive(Clone)]
pub struct CacheCoordinator {
    fetcher: Arc<DocumentFetcher>,
    media: Arc<dyn DurableStore>,
    states: CacheStates,
}

impl CacheCoordinator {
    pub fn new(fetcher: Arc<DocumentFetcher>, media: Arc<dyn DurableStore>) -> Self {
        Self {
            fetcher,
            media,
            states: CacheStates::new(),
        }
    }

    pub fn states(&self) -> &CacheStates {
        &self.states
    }

    /// Cache every part of every score in `scores`, one score at a time.
    ///
    /// Failures are contained per score and reported through
    /// [`CacheStates`]. Only reading the key snapshot can fail the pass.
    pub async fn run_pass<F>(
        &self,
        scores: &[Score],
        liveness: &Liveness,
        mut on_progress: F,
    ) -> Result<PassReport>
    where
        F: FnMut(usize, usize, &Score),
    {
        let cached: HashSet<String> = self.media.keys().await?.into_iter().collect();
        let total = scores.len();
        let mut report = PassReport::default();

        for (i, score) in scores.iter().enumerate() {
            if liveness.is_cancelled() {
                log::info!("Caching pass cancelled after {} of {}", i, total);
                report.cancelled = true;
                break;
            }

            log::info!(
                "Processing score {} of {}: {} - {}",
                i + 1,
                total,
                score.title,
                score.artist
            );
            on_progress(i + 1, total, score);

            report.attempted += 1;
            match self.cache_score(score, &cached).await {
                CacheState::Success => report.succeeded += 1,
                _ => report.failed += 1,
            }
        }

        Ok(report)
    }

    async fn cache_score(&self, score: &Score, cached: &HashSet<String>) -> CacheState {
        self.states.transition(&score.key, CacheState::Working);

        let pending: Vec<&Part> = score
            .parts
            .iter()
            .filter(|part| {
                let hit = cached.contains(&part.cache_key());
                if hit {
                    log::debug!("Already cached: {}", part.url);
                }
                !hit
            })
            .collect();

        let results = join_all(pending.iter().map(|part| self.fetcher.fetch(part))).await;

        let mut outcome = CacheState::Success;
        for (part, result) in pending.iter().zip(results) {
            if let Err(e) = result {
                log::warn!("Failed to cache {}: {}", part.url, e);
                outcome = CacheState::Failed;
            }
        }

        self.states.transition(&score.key, outcome);
        outcome
    }
}
