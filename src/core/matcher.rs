use std::sync::Arc;

use crate::core::index::{IndexError, ListingIndex};
use crate::models::{BuyerProfile, HardFilters, MatchCandidate};

/// Result of the matching process
#[derive(Debug)]
pub struct MatchResult {
    pub candidates: Vec<MatchCandidate>,
    /// Listings that passed the hard filters
    pub eligible: usize,
    /// Listings in the index when the query ran
    pub total_indexed: usize,
}

/// Main matching orchestrator
///
/// # Pipeline Stages
/// 1. Hard filters from the profile's explicit constraints (plus any extra
///    filters supplied by the caller)
/// 2. Similarity scoring against the listing index
/// 3. Threshold, ranking and truncation to `k`
///
/// Soft preferences only reach this stage through the preference vector, so
/// they can reorder listings but never make an ineligible listing eligible.
#[derive(Clone)]
pub struct Matcher {
    index: Arc<ListingIndex>,
}

impl Matcher {
    pub fn new(index: Arc<ListingIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &Arc<ListingIndex> {
        &self.index
    }

    /// Find up to `k` ranked candidates for a buyer profile
    ///
    /// # Arguments
    /// * `profile` - Interpreted buyer profile with preference vector
    /// * `k` - Maximum number of candidates (a `k` of zero yields nothing)
    /// * `extra_filters` - Additional hard filters; the profile's own
    ///   constraints win on conflicting attributes
    pub fn find_matches(
        &self,
        profile: &BuyerProfile,
        k: usize,
        extra_filters: &HardFilters,
    ) -> Result<MatchResult, IndexError> {
        let filters = profile.hard_filters().merged(extra_filters);

        if k == 0 {
            return Ok(MatchResult {
                candidates: Vec::new(),
                eligible: 0,
                total_indexed: self.index.len(),
            });
        }

        let outcome = self.index.query(&profile.vector, k, &filters)?;

        let candidates = outcome
            .hits
            .into_iter()
            .enumerate()
            .map(|(i, hit)| MatchCandidate {
                listing: hit.listing,
                score: hit.score,
                rank: i + 1,
            })
            .collect();

        Ok(MatchResult {
            candidates,
            eligible: outcome.eligible,
            total_indexed: outcome.total,
        })
    }
}
