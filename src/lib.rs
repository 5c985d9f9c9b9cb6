//! HomeMatch - personalized real-estate listing matching
//!
//! Interprets a buyer's free-text preferences, retrieves the listings that
//! satisfy their hard requirements ranked by semantic similarity, and rewrites
//! each listing's description for that buyer without altering a single fact.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{
    BuyerRequest, FactGuard, ListingIndex, Matcher, Personalizer, PipelineError,
    PreferenceInterpreter, SimilarityMetric,
};
pub use models::{
    BuyerProfile, Constraint, FindMatchesRequest, FindMatchesResponse, ListingRecord,
    PersonalizedNarrative, Preference,
};
