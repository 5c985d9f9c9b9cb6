use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;
use crate::models::domain::{AttributeValue, Constraint, ListingRecord};

/// Request to find and personalize matching listings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FindMatchesRequest {
    #[validate(length(min = 1, max = 4000))]
    #[serde(alias = "buyer_text", rename = "buyerText")]
    pub buyer_text: String,
    #[serde(default)]
    pub constraints: BTreeMap<String, Constraint>,
    #[validate(range(min = 1))]
    #[serde(default)]
    pub k: Option<u16>,
}

/// A listing as pushed by the feed; the embedding is computed when absent
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ListingPayload {
    #[validate(length(min = 1))]
    pub id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    #[validate(length(min = 1))]
    pub description: String,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

impl From<ListingPayload> for ListingRecord {
    fn from(payload: ListingPayload) -> Self {
        ListingRecord {
            id: payload.id,
            attributes: payload.attributes,
            description: payload.description,
            embedding: payload.embedding.unwrap_or_default(),
        }
    }
}

/// Request to insert or replace listings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpsertListingsRequest {
    #[validate(length(min = 1), nested)]
    pub listings: Vec<ListingPayload>,
}
