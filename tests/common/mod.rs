// Shared fixtures for the HomeMatch integration tests
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use homematch::core::{
    DescriptionRewriter, FactGuard, ListingIndex, Matcher, NarrativeWorker, Personalizer,
    PreferenceInterpreter, SimilarityMetric,
};
use homematch::models::domain::{
    ATTR_AMENITIES, ATTR_BEDROOMS, ATTR_LOCATION, ATTR_PRICE, ATTR_SQUARE_FEET,
};
use homematch::models::{AttributeValue, ListingRecord};
use homematch::services::embedding::{EmbedFuture, EmbeddingService};
use homematch::services::llm::{CompletionFuture, CompletionRequest, LanguageModel, ModelError};

pub const DIMENSIONS: usize = 3;

/// Embeds text onto three axes: quiet, urban, and a constant baseline
pub struct KeywordEmbedder;

impl EmbeddingService for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword"
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn embed<'a>(&'a self, text: &'a str) -> EmbedFuture<'a> {
        let lower = text.to_lowercase();
        let quiet = ["quiet", "calm", "peaceful"].iter().filter(|w| lower.contains(*w)).count();
        let urban = ["downtown", "walkable", "nightlife"].iter().filter(|w| lower.contains(*w)).count();
        Box::pin(async move { Ok(vec![quiet as f32, urban as f32, 0.5]) })
    }
}

pub type Script = dyn Fn(&CompletionRequest, usize) -> (Duration, Result<String, ModelError>) + Send + Sync;

/// Language model whose replies are decided by a closure over the request
/// and the 0-based call number
pub struct ScriptedModel {
    script: Box<Script>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&CompletionRequest, usize) -> (Duration, Result<String, ModelError>) + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn complete(&self, request: CompletionRequest) -> CompletionFuture<'_> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let (delay, reply) = (self.script)(&request, n);
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            reply
        })
    }
}

pub fn instant(reply: &str) -> (Duration, Result<String, ModelError>) {
    (Duration::ZERO, Ok(reply.to_string()))
}

pub fn is_repair(request: &CompletionRequest) -> bool {
    request.prompt.contains("Your previous draft")
}

pub fn create_listing(
    id: &str,
    bedrooms: i64,
    price: f64,
    description: &str,
    embedding: Vec<f32>,
) -> ListingRecord {
    let mut attributes = BTreeMap::new();
    attributes.insert(ATTR_BEDROOMS.to_string(), AttributeValue::Integer(bedrooms));
    attributes.insert(ATTR_PRICE.to_string(), AttributeValue::Number(price));
    ListingRecord {
        id: id.to_string(),
        attributes,
        description: description.to_string(),
        embedding,
    }
}

/// Listing A of the reference scenario: quiet, 4 bedrooms, $480,000
pub fn listing_a() -> ListingRecord {
    let mut listing = create_listing(
        "A",
        4,
        480_000.0,
        "Four-bedroom colonial on a tree-lined lane in Maple Grove.",
        vec![1.0, 0.0, 0.5],
    );
    listing.attributes.insert("quiet".to_string(), AttributeValue::Flag(true));
    listing
        .attributes
        .insert(ATTR_LOCATION.to_string(), AttributeValue::Text("Maple Grove".to_string()));
    listing
        .attributes
        .insert(ATTR_SQUARE_FEET.to_string(), AttributeValue::Integer(2_100));
    listing.attributes.insert(
        ATTR_AMENITIES.to_string(),
        AttributeValue::Tags(BTreeSet::from(["garage".to_string()])),
    );
    listing
}

/// Listing B of the reference scenario: 2 bedrooms downtown, $450,000
pub fn listing_b() -> ListingRecord {
    let mut listing = create_listing(
        "B",
        2,
        450_000.0,
        "Two-bedroom condo steps from downtown nightlife.",
        vec![0.0, 1.0, 0.5],
    );
    listing
        .attributes
        .insert(ATTR_LOCATION.to_string(), AttributeValue::Text("Downtown".to_string()));
    listing
}

pub fn create_index(listings: Vec<ListingRecord>) -> Arc<ListingIndex> {
    let index = Arc::new(ListingIndex::new(DIMENSIONS, SimilarityMetric::Cosine, 0.0));
    for listing in listings {
        index.upsert(listing).unwrap();
    }
    index
}

pub struct PipelineOptions {
    pub parallelism: usize,
    pub max_repairs: u32,
    pub rewrite_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            parallelism: 4,
            max_repairs: 1,
            rewrite_timeout: Duration::from_secs(5),
        }
    }
}

pub fn create_personalizer(
    index: Arc<ListingIndex>,
    model: Arc<dyn LanguageModel>,
    options: PipelineOptions,
) -> Personalizer {
    let interpreter = PreferenceInterpreter::new(Arc::new(KeywordEmbedder), DIMENSIONS, Duration::from_secs(5));
    let matcher = Matcher::new(index);
    let rewriter = DescriptionRewriter::new(model, 400, 0.2, options.rewrite_timeout);
    let worker = NarrativeWorker::new(rewriter, FactGuard::default(), options.max_repairs);
    Personalizer::new(interpreter, matcher, worker, options.parallelism)
}
