//! Per-request orchestration.
//!
//! buyer input -> interpreter -> matcher -> for each candidate, concurrently:
//! rewriter -> fact guard (-> one bounded repair) -> accepted or fallback.
//! Results come back in the matcher's rank order regardless of which
//! listing finishes first.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::core::fact_guard::FactGuard;
use crate::core::index::IndexError;
use crate::core::interpreter::{InterpretationError, PreferenceInterpreter};
use crate::core::matcher::Matcher;
use crate::core::rewriter::{highlights, DescriptionRewriter};
use crate::models::{
    BuyerProfile, Constraint, FallbackReason, HardFilters, ListingRecord, MatchCandidate,
    PersonalizedNarrative,
};

/// Whole-request failures; per-listing problems never surface here
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Could not interpret buyer input: {0}")]
    Interpretation(#[from] InterpretationError),

    #[error("Listing index query failed: {0}")]
    IndexQuery(#[from] IndexError),

    #[error("Request cancelled")]
    Cancelled,
}

/// Caller-facing request
#[derive(Debug, Clone)]
pub struct BuyerRequest {
    pub buyer_text: String,
    pub constraints: BTreeMap<String, Constraint>,
    pub k: usize,
    pub extra_filters: HardFilters,
}

#[derive(Debug, Clone)]
pub struct RankedNarrative {
    pub candidate: MatchCandidate,
    pub narrative: PersonalizedNarrative,
}

#[derive(Debug)]
pub struct PipelineResponse {
    pub results: Vec<RankedNarrative>,
    pub eligible: usize,
    pub total_indexed: usize,
}

/// States of one rewrite attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteState {
    Draft,
    Verifying { attempt: u32 },
    RepairRequested { attempt: u32 },
    Accepted,
    Fallback,
}

/// Rewrites and verifies a single listing
pub struct NarrativeWorker {
    rewriter: DescriptionRewriter,
    guard: FactGuard,
    max_repairs: u32,
}

impl NarrativeWorker {
    pub fn new(rewriter: DescriptionRewriter, guard: FactGuard, max_repairs: u32) -> Self {
        Self {
            rewriter,
            guard,
            max_repairs,
        }
    }

    /// Draft → Verifying → {Accepted | RepairRequested → Verifying → {Accepted | Fallback}}
    ///
    /// The number of repair rounds is capped by `max_repairs`; any model
    /// failure ends in Fallback with the original description.
    pub async fn personalize(
        &self,
        listing: &ListingRecord,
        profile: &BuyerProfile,
        known_locations: &BTreeSet<String>,
    ) -> PersonalizedNarrative {
        let highlights = highlights(listing, profile);
        let mut state = RewriteState::Draft;
        tracing::debug!(state = ?state, highlights = ?highlights, "Drafting narrative");

        let mut draft = match self.rewriter.draft(listing, profile, &highlights).await {
            Ok(draft) => draft,
            Err(e) => {
                tracing::warn!(error = %e, "Rewrite failed, using original description");
                return PersonalizedNarrative::fallback(listing, FallbackReason::RewriteUnavailable);
            }
        };

        let mut attempt = 1;
        loop {
            state = advance(state, RewriteState::Verifying { attempt });
            let verdict = self
                .guard
                .verify(&draft, listing, &highlights, known_locations);

            if verdict.accepted {
                advance(state, RewriteState::Accepted);
                return PersonalizedNarrative::accepted(listing, draft, verdict.checked, attempt);
            }

            tracing::debug!(
                attempt,
                discrepancies = ?verdict.discrepancies,
                "Draft failed verification"
            );

            if attempt > self.max_repairs {
                advance(state, RewriteState::Fallback);
                tracing::warn!(attempt, "Verification failed after repair, using original description");
                return PersonalizedNarrative::fallback(listing, FallbackReason::VerificationFailed);
            }

            state = advance(state, RewriteState::RepairRequested { attempt });
            draft = match self
                .rewriter
                .repair(listing, profile, &highlights, &draft, &verdict.discrepancies)
                .await
            {
                Ok(repaired) => repaired,
                Err(e) => {
                    advance(state, RewriteState::Fallback);
                    tracing::warn!(error = %e, "Repair failed, using original description");
                    return PersonalizedNarrative::fallback(listing, FallbackReason::RewriteUnavailable);
                }
            };
            attempt += 1;
        }
    }
}

fn advance(from: RewriteState, to: RewriteState) -> RewriteState {
    tracing::trace!(from = ?from, to = ?to, "Rewrite state transition");
    to
}

/// End-to-end personalization pipeline
pub struct Personalizer {
    interpreter: PreferenceInterpreter,
    matcher: Matcher,
    worker: Arc<NarrativeWorker>,
    parallelism: usize,
}

impl Personalizer {
    pub fn new(
        interpreter: PreferenceInterpreter,
        matcher: Matcher,
        worker: NarrativeWorker,
        parallelism: usize,
    ) -> Self {
        Self {
            interpreter,
            matcher,
            worker: Arc::new(worker),
            parallelism: parallelism.max(1),
        }
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Run one buyer request
    ///
    /// Cancelling `cancel` stops scheduling further listings; rewrites already
    /// running are allowed to finish (or time out) before `Cancelled` is
    /// returned.
    pub async fn run(
        &self,
        request: BuyerRequest,
        cancel: &CancellationToken,
    ) -> Result<PipelineResponse, PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let profile = self
            .interpreter
            .interpret(&request.buyer_text, &request.constraints)
            .await?;

        let matched = self
            .matcher
            .find_matches(&profile, request.k, &request.extra_filters)?;
        let known_locations = Arc::new(self.matcher.index().known_locations()?);

        tracing::info!(
            candidates = matched.candidates.len(),
            eligible = matched.eligible,
            total = matched.total_indexed,
            "Matched listings"
        );

        let profile = Arc::new(profile);
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut tasks = JoinSet::new();
        let mut cancelled = false;

        for (slot, candidate) in matched.candidates.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                cancelled = true;
                break;
            };

            let worker = Arc::clone(&self.worker);
            let listing = Arc::clone(&candidate.listing);
            let profile = Arc::clone(&profile);
            let known_locations = Arc::clone(&known_locations);
            let span = tracing::debug_span!("personalize", listing_id = %listing.id, rank = candidate.rank);

            tasks.spawn(
                async move {
                    let _permit = permit;
                    let narrative = worker.personalize(&listing, &profile, &known_locations).await;
                    (slot, narrative)
                }
                .instrument(span),
            );
        }

        let mut narratives: Vec<Option<PersonalizedNarrative>> = vec![None; matched.candidates.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, narrative)) => narratives[slot] = Some(narrative),
                Err(e) => tracing::warn!(error = %e, "Narrative worker failed"),
            }
        }

        if cancelled {
            tracing::info!("Request cancelled, in-flight rewrites drained");
            return Err(PipelineError::Cancelled);
        }

        let results = matched
            .candidates
            .into_iter()
            .zip(narratives)
            .map(|(candidate, narrative)| {
                let narrative = narrative.unwrap_or_else(|| {
                    PersonalizedNarrative::fallback(&candidate.listing, FallbackReason::WorkerFailed)
                });
                RankedNarrative { candidate, narrative }
            })
            .collect();

        Ok(PipelineResponse {
            results,
            eligible: matched.eligible,
            total_indexed: matched.total_indexed,
        })
    }
}
