use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use homematch::config::{LoggingSettings, Settings};
use homematch::core::{
    DescriptionRewriter, FactGuard, ListingIndex, Matcher, NarrativeWorker, Personalizer,
    PreferenceInterpreter, SimilarityMetric,
};
use homematch::routes::{self, matches::AppState};
use homematch::services::{feed, CachedEmbedder, EmbeddingService, HttpEmbeddingClient, HttpLanguageModel};

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST))
            .json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle path errors (e.g. malformed listing ids)
pub fn handle_path_error(err: error::PathError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    JsonError {
        error: "invalid_path".to_string(),
        message: format!("Invalid path: {}", err),
        status_code: 400,
    }
    .into()
}

fn init_tracing(logging: &LoggingSettings) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if logging.format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

fn startup_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", context, e);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    init_tracing(&settings.logging);
    info!("Starting HomeMatch listing service...");

    let metric: SimilarityMetric = settings
        .index
        .metric
        .parse()
        .map_err(|e| startup_error("Invalid index metric", e))?;
    let dimensions = settings.embedding.dimensions;

    // Embedding service, fronted by an in-process cache
    let http_embedder = HttpEmbeddingClient::new(
        settings.embedding.base_url.clone(),
        settings.embedding.api_key.clone(),
        settings.embedding.model.clone(),
        dimensions,
        settings.embedding.timeout(),
    )
    .map_err(|e| startup_error("Failed to create embedding client", e))?;
    let embedder: Arc<dyn EmbeddingService> = Arc::new(CachedEmbedder::new(
        Arc::new(http_embedder),
        settings.embedding.cache_size,
        Duration::from_secs(settings.embedding.cache_ttl_secs),
    ));

    info!(
        model = %settings.embedding.model,
        dimensions,
        cache_size = settings.embedding.cache_size,
        "Embedding service initialized"
    );

    let model = HttpLanguageModel::new(
        settings.llm.base_url.clone(),
        settings.llm.api_key.clone(),
        settings.llm.model.clone(),
        settings.llm.timeout(),
    )
    .map_err(|e| startup_error("Failed to create language model client", e))?;

    info!(model = %settings.llm.model, "Language model client initialized");

    let index = Arc::new(ListingIndex::new(dimensions, metric, settings.index.min_similarity));

    if let Some(path) = &settings.feed.path {
        let records = feed::load_file(path).map_err(|e| startup_error("Failed to load listing feed", e))?;
        let count = feed::ingest(records, embedder.as_ref(), &index, settings.embedding.timeout())
            .await
            .map_err(|e| startup_error("Failed to ingest listing feed", e))?;
        info!(path = %path.display(), count, "Listing feed loaded");
    }

    let interpreter = PreferenceInterpreter::new(Arc::clone(&embedder), dimensions, settings.embedding.timeout());
    let matcher = Matcher::new(Arc::clone(&index));
    let rewriter = DescriptionRewriter::new(
        Arc::new(model),
        settings.llm.max_tokens,
        settings.llm.temperature,
        settings.llm.timeout(),
    );
    let guard = FactGuard::new(settings.rewrite.price_tolerance, settings.rewrite.area_tolerance);
    let worker = NarrativeWorker::new(rewriter, guard, settings.rewrite.max_repairs);
    let personalizer = Personalizer::new(interpreter, matcher, worker, settings.rewrite.parallelism);

    info!(
        metric = %metric,
        min_similarity = settings.index.min_similarity,
        parallelism = settings.rewrite.parallelism,
        max_repairs = settings.rewrite.max_repairs,
        "Pipeline initialized"
    );

    let app_state = AppState {
        personalizer: Arc::new(personalizer),
        index,
        embedder,
        matching: settings.matching.clone(),
        embed_timeout: settings.embedding.timeout(),
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::PathConfig::default().error_handler(handle_path_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
