// Integration tests for the HomeMatch pipeline

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use homematch::core::interpreter::InterpretationError;
use homematch::core::{BuyerRequest, PipelineError};
use homematch::models::{Constraint, FallbackReason, HardFilters, NarrativeOutcome};
use homematch::services::llm::ModelError;
use tokio_util::sync::CancellationToken;

const SCENARIO: &str = "Looking for a quiet street, 3+ bedrooms, budget $500k";

fn request(text: &str, k: usize) -> BuyerRequest {
    BuyerRequest {
        buyer_text: text.to_string(),
        constraints: BTreeMap::new(),
        k,
        extra_filters: HardFilters::none(),
    }
}

#[tokio::test]
async fn test_scenario_hard_filters_and_repair() {
    let index = create_index(vec![listing_a(), listing_b()]);
    let model = ScriptedModel::new(|req, _| {
        if is_repair(req) {
            instant("A quiet 4-bedroom colonial in Maple Grove, offered at $480,000.")
        } else {
            instant("A quiet 5-bedroom colonial in Maple Grove, offered at $480,000.")
        }
    });
    let personalizer = create_personalizer(index, model.clone(), PipelineOptions::default());

    let response = personalizer
        .run(request(SCENARIO, 5), &CancellationToken::new())
        .await
        .unwrap();

    // B has 2 bedrooms and never appears, however similar it is
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.eligible, 1);
    assert_eq!(response.total_indexed, 2);

    let result = &response.results[0];
    assert_eq!(result.candidate.listing.id, "A");
    assert_eq!(result.candidate.rank, 1);
    assert!(result.narrative.is_accepted());
    assert!(result.narrative.text().contains("4-bedroom"));
    assert!(!result.narrative.text().contains("5-bedroom"));
    assert_eq!(result.narrative.outcome(), &NarrativeOutcome::Accepted { attempts: 2 });
    assert!(result.narrative.checked_attributes().contains("bedrooms"));
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn test_hard_filter_beats_higher_similarity() {
    // B is the closer vector match for "quiet walkable" but has only 2 bedrooms
    let mut b = listing_b();
    b.embedding = vec![1.0, 1.0, 0.5];
    let index = create_index(vec![listing_a(), b]);
    let model = ScriptedModel::new(|_, _| instant("A quiet 4-bedroom colonial in Maple Grove."));
    let personalizer = create_personalizer(index, model, PipelineOptions::default());

    let response = personalizer
        .run(
            request("quiet walkable neighborhood, 3+ bedrooms, budget $500k", 5),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let ids: Vec<&str> = response.results.iter().map(|r| r.candidate.listing.id.as_str()).collect();
    assert_eq!(ids, vec!["A"]);
    assert!(response.results[0].narrative.is_accepted());
}

#[tokio::test]
async fn test_repeated_rejection_returns_original_description() {
    let index = create_index(vec![listing_a(), listing_b()]);
    let model = ScriptedModel::new(|_, _| instant("A quiet 5-bedroom home with a pool."));
    let personalizer = create_personalizer(index, model.clone(), PipelineOptions::default());

    let response = personalizer
        .run(request(SCENARIO, 5), &CancellationToken::new())
        .await
        .unwrap();

    let narrative = &response.results[0].narrative;
    assert!(!narrative.is_accepted());
    assert_eq!(narrative.text(), listing_a().description);
    assert_eq!(
        narrative.outcome(),
        &NarrativeOutcome::Fallback { reason: FallbackReason::VerificationFailed }
    );
    // One draft plus one bounded repair
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn test_max_repairs_zero_skips_repair() {
    let index = create_index(vec![listing_a()]);
    let model = ScriptedModel::new(|_, _| instant("A quiet 5-bedroom home."));
    let options = PipelineOptions { max_repairs: 0, ..Default::default() };
    let personalizer = create_personalizer(index, model.clone(), options);

    let response = personalizer
        .run(request(SCENARIO, 5), &CancellationToken::new())
        .await
        .unwrap();

    assert!(!response.results[0].narrative.is_accepted());
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn test_model_failure_isolated_to_one_listing() {
    let index = create_index(vec![
        create_listing("calm-1", 3, 400_000.0, "Calm cottage with a garden.", vec![1.0, 0.0, 0.5]),
        create_listing("calm-2", 3, 410_000.0, "Calm ranch near the park.", vec![0.9, 0.1, 0.5]),
        create_listing("calm-3", 3, 420_000.0, "Calm bungalow by the creek.", vec![0.8, 0.2, 0.5]),
    ]);
    let model = ScriptedModel::new(|req, _| {
        if req.prompt.contains("ranch") {
            (Duration::ZERO, Err(ModelError::Unavailable("upstream 503".to_string())))
        } else {
            instant("A peaceful 3-bedroom retreat.")
        }
    });
    let personalizer = create_personalizer(index, model, PipelineOptions::default());

    let response = personalizer
        .run(request("somewhere quiet with 3 bedrooms", 5), &CancellationToken::new())
        .await
        .unwrap();

    let ids: Vec<&str> = response.results.iter().map(|r| r.candidate.listing.id.as_str()).collect();
    assert_eq!(ids, vec!["calm-1", "calm-2", "calm-3"]);

    let failed = &response.results[1].narrative;
    assert_eq!(failed.text(), "Calm ranch near the park.");
    assert_eq!(
        failed.outcome(),
        &NarrativeOutcome::Fallback { reason: FallbackReason::RewriteUnavailable }
    );
    assert!(response.results[0].narrative.is_accepted());
    assert!(response.results[2].narrative.is_accepted());
}

#[tokio::test]
async fn test_rank_order_survives_out_of_order_completion() {
    let index = create_index(vec![
        create_listing("first", 3, 1.0, "Quiet first home.", vec![1.0, 0.0, 0.5]),
        create_listing("second", 3, 1.0, "Quiet second home.", vec![0.7, 0.3, 0.5]),
        create_listing("third", 3, 1.0, "Quiet third home.", vec![0.4, 0.6, 0.5]),
    ]);
    // Highest-ranked listing is the slowest to rewrite
    let model = ScriptedModel::new(|req, _| {
        let delay = if req.prompt.contains("first") {
            Duration::from_millis(120)
        } else if req.prompt.contains("second") {
            Duration::from_millis(60)
        } else {
            Duration::ZERO
        };
        (delay, Ok("A quiet home.".to_string()))
    });
    let personalizer = create_personalizer(index, model, PipelineOptions::default());

    let response = personalizer
        .run(request("quiet", 3), &CancellationToken::new())
        .await
        .unwrap();

    let ids: Vec<&str> = response.results.iter().map(|r| r.candidate.listing.id.as_str()).collect();
    let ranks: Vec<usize> = response.results.iter().map(|r| r.candidate.rank).collect();
    assert_eq!(ids, vec!["first", "second", "third"]);
    assert_eq!(ranks, vec![1, 2, 3]);
    assert!(response.results.iter().all(|r| r.narrative.is_accepted()));
}

#[tokio::test]
async fn test_rewrite_timeout_falls_back() {
    let index = create_index(vec![listing_a()]);
    let model = ScriptedModel::new(|_, _| (Duration::from_millis(500), Ok("A quiet home.".to_string())));
    let options = PipelineOptions {
        rewrite_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let personalizer = create_personalizer(index, model, options);

    let response = personalizer
        .run(request(SCENARIO, 1), &CancellationToken::new())
        .await
        .unwrap();

    let narrative = &response.results[0].narrative;
    assert_eq!(narrative.text(), listing_a().description);
    assert_eq!(
        narrative.outcome(),
        &NarrativeOutcome::Fallback { reason: FallbackReason::RewriteUnavailable }
    );
}

#[tokio::test]
async fn test_caller_constraints_override_text() {
    let index = create_index(vec![listing_a(), listing_b()]);
    let model = ScriptedModel::new(|_, _| instant("A lovely home."));
    let personalizer = create_personalizer(index, model, PipelineOptions::default());

    // Text says 3+, caller explicitly allows 2+
    let mut req = request(SCENARIO, 5);
    req.constraints.insert("bedrooms".to_string(), Constraint::at_least(2.0));

    let response = personalizer.run(req, &CancellationToken::new()).await.unwrap();
    let ids: Vec<&str> = response.results.iter().map(|r| r.candidate.listing.id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B"]);
}

#[tokio::test]
async fn test_no_eligible_listings_is_empty_not_error() {
    let index = create_index(vec![listing_a(), listing_b()]);
    let model = ScriptedModel::new(|_, _| instant("unused"));
    let personalizer = create_personalizer(index, model.clone(), PipelineOptions::default());

    let response = personalizer
        .run(request("quiet, 6 bedrooms", 5), &CancellationToken::new())
        .await
        .unwrap();

    assert!(response.results.is_empty());
    assert_eq!(response.eligible, 0);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_empty_statement_is_interpretation_error() {
    let index = create_index(vec![listing_a()]);
    let model = ScriptedModel::new(|_, _| instant("unused"));
    let personalizer = create_personalizer(index, model, PipelineOptions::default());

    let err = personalizer
        .run(request("   ", 5), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Interpretation(InterpretationError::EmptyInput)));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let index = create_index(vec![listing_a()]);
    let model = ScriptedModel::new(|_, _| instant("A quiet home."));
    let personalizer = create_personalizer(index, model.clone(), PipelineOptions::default());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = personalizer.run(request(SCENARIO, 5), &cancel).await.unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_cancel_stops_scheduling_and_drains() {
    let index = create_index(vec![
        create_listing("one", 3, 1.0, "Calm one.", vec![1.0, 0.0, 0.5]),
        create_listing("two", 3, 1.0, "Calm two.", vec![0.9, 0.1, 0.5]),
        create_listing("three", 3, 1.0, "Calm three.", vec![0.8, 0.2, 0.5]),
    ]);
    let model = ScriptedModel::new(|_, _| (Duration::from_millis(150), Ok("A quiet home.".to_string())));
    let options = PipelineOptions { parallelism: 1, ..Default::default() };
    let personalizer = Arc::new(create_personalizer(index, model.clone(), options));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let err = personalizer.run(request("quiet", 3), &cancel).await.unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
    // Only the rewrite already in flight was started
    assert_eq!(model.calls(), 1);
}

#[test]
fn test_reupsert_leaves_query_results_unchanged() {
    let index = create_index(vec![
        listing_a(),
        listing_b(),
        create_listing("C", 3, 420_000.0, "Calm cottage.", vec![0.7, 0.3, 0.5]),
    ]);
    let query = [0.8, 0.4, 0.5];

    let ranked = |index: &homematch::core::ListingIndex| {
        index
            .query(&query, 10, &HardFilters::none())
            .unwrap()
            .hits
            .iter()
            .map(|hit| (hit.listing.id.clone(), hit.score))
            .collect::<Vec<_>>()
    };

    let before = ranked(&index);
    index.upsert(listing_a()).unwrap();
    index.upsert(listing_a()).unwrap();
    let after = ranked(&index);

    assert_eq!(before.len(), 3);
    assert_eq!(before, after);
}

#[test]
fn test_upsert_is_idempotent() {
    let index = create_index(vec![listing_a()]);
    let mut updated = listing_a();
    updated.description = "Updated description.".to_string();

    index.upsert(updated.clone()).unwrap();
    index.upsert(updated).unwrap();

    assert_eq!(index.len(), 1);
    assert_eq!(index.get("A").unwrap().unwrap().description, "Updated description.");
}
