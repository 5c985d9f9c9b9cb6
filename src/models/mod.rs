// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    AttributeValue, BuyerProfile, Constraint, FallbackReason, HardFilters, ListingRecord,
    MatchCandidate, NarrativeOutcome, PersonalizedNarrative, Preference,
};
pub use requests::{FindMatchesRequest, ListingPayload, UpsertListingsRequest};
pub use responses::{
    ErrorResponse, FindMatchesResponse, HealthResponse, ListingView, MatchedListing,
    UpsertListingsResponse,
};
