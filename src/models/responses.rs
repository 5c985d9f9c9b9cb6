use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use crate::models::domain::{AttributeValue, ListingRecord, NarrativeOutcome};

/// One ranked, personalized listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedListing {
    #[serde(rename = "listingId")]
    pub listing_id: String,
    pub rank: usize,
    pub similarity: f32,
    pub narrative: String,
    pub accepted: bool,
    pub outcome: NarrativeOutcome,
}

/// Response for find matches endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindMatchesResponse {
    #[serde(rename = "requestId")]
    pub request_id: uuid::Uuid,
    pub results: Vec<MatchedListing>,
    #[serde(rename = "totalIndexed")]
    pub total_indexed: usize,
}

/// Listing as shown to API callers (vector omitted)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingView {
    pub id: String,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub description: String,
}

impl From<&ListingRecord> for ListingView {
    fn from(record: &ListingRecord) -> Self {
        Self {
            id: record.id.clone(),
            attributes: record.attributes.clone(),
            description: record.description.clone(),
        }
    }
}

/// Upsert listings response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertListingsResponse {
    pub upserted: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "indexedListings")]
    pub indexed_listings: usize,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
