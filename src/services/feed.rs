use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use validator::Validate;

use crate::core::index::{IndexError, ListingIndex};
use crate::core::rewriter::fact_sheet;
use crate::models::{ListingPayload, ListingRecord};
use crate::services::embedding::{EmbeddingError, EmbeddingService};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Failed to read listing feed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse listing feed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid listing {id}: {message}")]
    Invalid { id: String, message: String },

    #[error("Failed to embed listing {id}: {source}")]
    Embedding {
        id: String,
        #[source]
        source: EmbeddingError,
    },

    #[error("Failed to index listing: {0}")]
    Index(#[from] IndexError),
}

/// Read a JSON array of listings from disk
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Vec<ListingRecord>, FeedError> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    let payloads: Vec<ListingPayload> = serde_json::from_str(&raw)?;
    validate_payloads(payloads)
}

/// Validate incoming payloads and convert them into records
pub fn validate_payloads(payloads: Vec<ListingPayload>) -> Result<Vec<ListingRecord>, FeedError> {
    payloads
        .into_iter()
        .map(|payload| {
            payload.validate().map_err(|e| FeedError::Invalid {
                id: payload.id.clone(),
                message: e.to_string(),
            })?;
            Ok(ListingRecord::from(payload))
        })
        .collect()
}

/// Text embedded for a listing that arrives without a vector
pub fn embedding_text(listing: &ListingRecord) -> String {
    format!("{}\n{}", listing.description.trim(), fact_sheet(listing))
}

/// Embed listings that lack a vector and upsert the whole batch into the index
///
/// All-or-nothing: every record is embedded and checked before any is
/// written, so a failure leaves the index unchanged.
pub async fn ingest(
    records: Vec<ListingRecord>,
    embedder: &dyn EmbeddingService,
    index: &ListingIndex,
    timeout: Duration,
) -> Result<usize, FeedError> {
    let mut prepared = Vec::with_capacity(records.len());
    for mut record in records {
        if record.embedding.is_empty() {
            let text = embedding_text(&record);
            let embedded = tokio::time::timeout(timeout, embedder.embed(&text))
                .await
                .map_err(|_| EmbeddingError::Timeout(timeout))
                .and_then(|r| r);
            record.embedding = embedded.map_err(|source| FeedError::Embedding {
                id: record.id.clone(),
                source,
            })?;
        }
        prepared.push(record);
    }

    let count = index.upsert_batch(prepared)?;
    tracing::info!(count, total = index.len(), "Listings ingested");
    Ok(count)
}
