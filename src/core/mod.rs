// Core algorithm exports
pub mod fact_guard;
pub mod filters;
pub mod index;
pub mod interpreter;
pub mod matcher;
pub mod pipeline;
pub mod rewriter;
pub mod similarity;
pub mod vocabulary;

pub use fact_guard::{Discrepancy, DiscrepancyKind, FactGuard, Verdict};
pub use filters::{matches_hard_filters, satisfies};
pub use index::{IndexError, ListingIndex};
pub use interpreter::{InterpretationError, PreferenceInterpreter};
pub use matcher::{MatchResult, Matcher};
pub use pipeline::{BuyerRequest, NarrativeWorker, PipelineError, PipelineResponse, Personalizer};
pub use rewriter::{DescriptionRewriter, RewriteError};
pub use similarity::{cosine_similarity, SimilarityMetric};
