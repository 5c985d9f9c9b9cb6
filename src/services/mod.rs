// Service exports
pub mod embedding;
pub mod feed;
pub mod llm;

pub use embedding::{CachedEmbedder, EmbeddingError, EmbeddingService, HttpEmbeddingClient};
pub use feed::FeedError;
pub use llm::{CompletionRequest, HttpLanguageModel, LanguageModel, ModelError};
