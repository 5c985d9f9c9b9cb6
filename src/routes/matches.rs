use actix_web::{http::StatusCode, web, HttpResponse, Responder};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use validator::Validate;

use crate::config::MatchingSettings;
use crate::core::index::ListingIndex;
use crate::core::interpreter::InterpretationError;
use crate::core::pipeline::{BuyerRequest, PipelineError, Personalizer};
use crate::models::{
    ErrorResponse, FindMatchesRequest, FindMatchesResponse, HardFilters, HealthResponse,
    MatchedListing,
};
use crate::services::EmbeddingService;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub personalizer: Arc<Personalizer>,
    pub index: Arc<ListingIndex>,
    pub embedder: Arc<dyn EmbeddingService>,
    pub matching: MatchingSettings,
    pub embed_timeout: std::time::Duration,
}

/// Configure all match-related routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/matches/find", web::post().to(find_matches));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let indexed = state.index.len();
    let status = if indexed > 0 { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        indexed_listings: indexed,
    })
}

/// Find matches endpoint
///
/// POST /api/v1/matches/find
///
/// Request body:
/// ```json
/// {
///   "buyerText": "quiet street, 3+ bedrooms, budget $500k",
///   "constraints": { "price": { "kind": "range", "max": 500000 } },
///   "k": 5
/// }
/// ```
async fn find_matches(
    state: web::Data<AppState>,
    req: web::Json<FindMatchesRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for find_matches request: field_errors={:?}", errors);
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Validation failed".to_string(),
            message: errors.to_string(),
            status_code: 400,
        });
    }

    let req = req.into_inner();
    let k = req
        .k
        .unwrap_or(state.matching.default_limit)
        .min(state.matching.max_limit) as usize;
    let request_id = uuid::Uuid::new_v4();

    tracing::info!(%request_id, k, constraints = req.constraints.len(), "Finding matches");

    // Dropping the handler (client went away) cancels outstanding rewrites
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let request = BuyerRequest {
        buyer_text: req.buyer_text,
        constraints: req.constraints,
        k,
        extra_filters: HardFilters::none(),
    };

    let response = match state.personalizer.run(request, &cancel).await {
        Ok(response) => response,
        Err(e) => {
            let status = status_for(&e);
            tracing::warn!(%request_id, error = %e, status = status.as_u16(), "Request failed");
            return HttpResponse::build(status).json(ErrorResponse {
                error: error_label(&e).to_string(),
                message: e.to_string(),
                status_code: status.as_u16(),
            });
        }
    };

    let results: Vec<MatchedListing> = response
        .results
        .into_iter()
        .map(|ranked| MatchedListing {
            listing_id: ranked.narrative.listing_id().to_string(),
            rank: ranked.candidate.rank,
            similarity: ranked.candidate.score,
            narrative: ranked.narrative.text().to_string(),
            accepted: ranked.narrative.is_accepted(),
            outcome: ranked.narrative.outcome().clone(),
        })
        .collect();

    tracing::info!(
        %request_id,
        returned = results.len(),
        eligible = response.eligible,
        accepted = results.iter().filter(|r| r.accepted).count(),
        "Returning matches"
    );

    HttpResponse::Ok().json(FindMatchesResponse {
        request_id,
        results,
        total_indexed: response.total_indexed,
    })
}

/// HTTP status for a failed pipeline run
pub fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::Interpretation(InterpretationError::EmptyInput) => StatusCode::BAD_REQUEST,
        PipelineError::Interpretation(InterpretationError::Embedding(_)) => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::Interpretation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::IndexQuery(_) => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn error_label(error: &PipelineError) -> &'static str {
    match error {
        PipelineError::Interpretation(_) => "Interpretation failed",
        PipelineError::IndexQuery(_) => "Listing index unavailable",
        PipelineError::Cancelled => "Request cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::index::IndexError;
    use crate::services::EmbeddingError;

    #[test]
    fn test_health_check_response() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            version: "0.1.0".to_string(),
            timestamp: chrono::Utc::now(),
            indexed_listings: 3,
        };

        assert_eq!(response.status, "healthy");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["indexedListings"], 3);
    }

    #[test]
    fn test_error_status_mapping() {
        let empty = PipelineError::Interpretation(InterpretationError::EmptyInput);
        assert_eq!(status_for(&empty), StatusCode::BAD_REQUEST);

        let embed = PipelineError::Interpretation(InterpretationError::Embedding(
            EmbeddingError::Unavailable("down".to_string()),
        ));
        assert_eq!(status_for(&embed), StatusCode::SERVICE_UNAVAILABLE);

        let dims = PipelineError::Interpretation(InterpretationError::DimensionMismatch {
            expected: 4,
            got: 3,
        });
        assert_eq!(status_for(&dims), StatusCode::UNPROCESSABLE_ENTITY);

        let index = PipelineError::IndexQuery(IndexError::Unavailable("poisoned".to_string()));
        assert_eq!(status_for(&index), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(&PipelineError::Cancelled), StatusCode::SERVICE_UNAVAILABLE);
    }
}
