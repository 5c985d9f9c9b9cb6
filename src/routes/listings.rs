use actix_web::{web, HttpResponse, Responder};
use validator::Validate;

use crate::core::index::IndexError;
use crate::models::{ErrorResponse, ListingView, UpsertListingsRequest, UpsertListingsResponse};
use crate::routes::matches::AppState;
use crate::services::feed::{self, FeedError};

/// Configure listing feed routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/listings", web::put().to(upsert_listings))
        .service(
            web::resource("/listings/{id}")
                .route(web::get().to(get_listing))
                .route(web::delete().to(remove_listing)),
        );
}

/// Insert or replace listings
///
/// PUT /api/v1/listings
///
/// Listings without an `embedding` are embedded from their description and
/// attributes before indexing. Re-sending an identifier replaces the listing.
async fn upsert_listings(
    state: web::Data<AppState>,
    req: web::Json<UpsertListingsRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "Validation failed".to_string(),
            message: errors.to_string(),
            status_code: 400,
        });
    }

    let records = match feed::validate_payloads(req.into_inner().listings) {
        Ok(records) => records,
        Err(e) => return feed_error_response(e),
    };

    match feed::ingest(records, state.embedder.as_ref(), &state.index, state.embed_timeout).await {
        Ok(upserted) => HttpResponse::Ok().json(UpsertListingsResponse { upserted }),
        Err(e) => feed_error_response(e),
    }
}

/// GET /api/v1/listings/{id}
async fn get_listing(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = path.into_inner();
    match state.index.get(&id) {
        Ok(Some(listing)) => HttpResponse::Ok().json(ListingView::from(listing.as_ref())),
        Ok(None) => HttpResponse::NotFound().json(ErrorResponse {
            error: "Listing not found".to_string(),
            message: format!("No listing with id {}", id),
            status_code: 404,
        }),
        Err(e) => {
            tracing::error!("Failed to read listing {}: {}", id, e);
            HttpResponse::ServiceUnavailable().json(ErrorResponse {
                error: "Listing index unavailable".to_string(),
                message: e.to_string(),
                status_code: 503,
            })
        }
    }
}

/// DELETE /api/v1/listings/{id}
async fn remove_listing(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = path.into_inner();
    match state.index.remove(&id) {
        Ok(Some(_)) => {
            tracing::info!(listing_id = %id, "Listing removed");
            HttpResponse::NoContent().finish()
        }
        Ok(None) => HttpResponse::NotFound().json(ErrorResponse {
            error: "Listing not found".to_string(),
            message: format!("No listing with id {}", id),
            status_code: 404,
        }),
        Err(e) => HttpResponse::ServiceUnavailable().json(ErrorResponse {
            error: "Listing index unavailable".to_string(),
            message: e.to_string(),
            status_code: 503,
        }),
    }
}

fn feed_error_response(e: FeedError) -> HttpResponse {
    let status_code = match &e {
        FeedError::Embedding { .. } | FeedError::Index(IndexError::Unavailable(_)) => 503,
        FeedError::Io(_) => 500,
        _ => 400,
    };
    tracing::warn!(error = %e, status_code, "Listing upsert failed");

    let body = ErrorResponse {
        error: "Listing upsert failed".to_string(),
        message: e.to_string(),
        status_code,
    };
    match status_code {
        503 => HttpResponse::ServiceUnavailable().json(body),
        500 => HttpResponse::InternalServerError().json(body),
        _ => HttpResponse::BadRequest().json(body),
    }
}
