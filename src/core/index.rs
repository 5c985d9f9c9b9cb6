//! In-memory listing index with similarity search.
//!
//! Holds one vector + metadata record per listing. Queries apply hard filters
//! first, then score the remaining listings and rank them.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::core::filters::matches_hard_filters;
use crate::core::similarity::{l2_norm, rank_order, SimilarityMetric};
use crate::models::{HardFilters, ListingRecord};

/// Errors raised by the listing index
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Vector has zero norm")]
    ZeroNormVector,

    #[error("Listing identifier must not be empty")]
    EmptyIdentifier,

    #[error("Index unavailable: {0}")]
    Unavailable(String),
}

/// Scored hit returned by [`ListingIndex::query`]
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub listing: Arc<ListingRecord>,
    pub score: f32,
}

/// Result of a query, with counts for observability
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub hits: Vec<IndexHit>,
    /// Listings that passed the hard filters
    pub eligible: usize,
    /// Listings in the index at query time
    pub total: usize,
}

/// Vector index over listings
///
/// Reads take a shared lock; `upsert` swaps the whole record under the write
/// lock, so a query never observes a partially written listing.
pub struct ListingIndex {
    entries: RwLock<HashMap<String, Arc<ListingRecord>>>,
    dimensions: usize,
    metric: SimilarityMetric,
    min_similarity: f32,
}

impl ListingIndex {
    pub fn new(dimensions: usize, metric: SimilarityMetric, min_similarity: f32) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            dimensions,
            metric,
            min_similarity,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    pub fn min_similarity(&self) -> f32 {
        self.min_similarity
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_vector(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        if l2_norm(vector) < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }
        Ok(())
    }

    /// Identifier and vector checks applied before a record may be stored
    pub fn check_record(&self, record: &ListingRecord) -> Result<(), IndexError> {
        if record.id.trim().is_empty() {
            return Err(IndexError::EmptyIdentifier);
        }
        self.check_vector(&record.embedding)
    }

    /// Insert or replace a listing; idempotent on identifier
    pub fn upsert(&self, record: ListingRecord) -> Result<(), IndexError> {
        self.check_record(&record)?;

        let mut entries = self
            .entries
            .write()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        let id = record.id.clone();
        let replaced = entries.insert(id.clone(), Arc::new(record)).is_some();
        tracing::trace!(listing_id = %id, replaced, "Listing upserted");
        Ok(())
    }

    /// Insert or replace several listings at once
    ///
    /// Every record is checked first; if any fails, nothing is written.
    pub fn upsert_batch(&self, records: Vec<ListingRecord>) -> Result<usize, IndexError> {
        for record in &records {
            self.check_record(record)?;
        }

        let mut entries = self
            .entries
            .write()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        let count = records.len();
        for record in records {
            entries.insert(record.id.clone(), Arc::new(record));
        }
        tracing::trace!(count, "Listing batch upserted");
        Ok(count)
    }

    pub fn remove(&self, id: &str) -> Result<Option<Arc<ListingRecord>>, IndexError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        Ok(entries.remove(id))
    }

    pub fn get(&self, id: &str) -> Result<Option<Arc<ListingRecord>>, IndexError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        Ok(entries.get(id).cloned())
    }

    /// Distinct location names across indexed listings
    pub fn known_locations(&self) -> Result<BTreeSet<String>, IndexError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        Ok(entries
            .values()
            .filter_map(|listing| listing.location().map(str::to_string))
            .collect())
    }

    /// Return up to `k` listings passing `filters` with similarity at or
    /// above the configured minimum, by descending score then ascending id.
    ///
    /// No eligible listing is not an error: the hits are simply empty.
    pub fn query(
        &self,
        vector: &[f32],
        k: usize,
        filters: &HardFilters,
    ) -> Result<QueryOutcome, IndexError> {
        self.check_vector(vector)?;
        let query_norm = l2_norm(vector);

        let entries = self
            .entries
            .read()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        let total = entries.len();

        let eligible: Vec<&Arc<ListingRecord>> = entries
            .values()
            .filter(|listing| matches_hard_filters(listing, filters))
            .collect();
        let eligible_count = eligible.len();

        let mut hits: Vec<IndexHit> = eligible
            .into_iter()
            .filter_map(|listing| {
                let score = self.metric.score(vector, query_norm, &listing.embedding);
                (score >= self.min_similarity).then(|| IndexHit {
                    listing: Arc::clone(listing),
                    score,
                })
            })
            .collect();
        drop(entries);

        hits.sort_by(|a, b| rank_order(a.score, &a.listing.id, b.score, &b.listing.id));
        hits.truncate(k);

        Ok(QueryOutcome {
            hits,
            eligible: eligible_count,
            total,
        })
    }
}
