// POST /v1/strategies/llm-consensus

use crate::tests::helpers::{self, StubProvider};
use axum::http::StatusCode;
use consensus_models_sdk::error::ProviderError;
use consensus_models_sdk::models::TradeDecision;
use serde_json::{json, Value};

const RESOURCE: &str = "/v1/strategies/llm-consensus";

#[tokio::test]
async fn unanimous_vote_returns_full_consensus() {
    let server = helpers::test_server(
        vec![
            StubProvider::voting("anthropic", TradeDecision::Buy, 0.9),
            StubProvider::voting("openai", TradeDecision::Buy, 0.9),
            StubProvider::voting("gemini", TradeDecision::Buy, 0.9),
            StubProvider::voting("grok", TradeDecision::Buy, 0.9),
        ],
        helpers::settings(2),
    );

    let response = server.post(RESOURCE).json(&helpers::consensus_body()).await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["decision"], "BUY");
    assert!((body["confidence"].as_f64().unwrap() - 1.0).abs() < 1e-9);
    assert_eq!(body["consensus_metadata"]["agreement_score"], 1.0);
    assert_eq!(body["consensus_metadata"]["vote_breakdown"]["BUY"], 4);
    assert_eq!(body["consensus_metadata"]["participating_providers"], 4);
    assert_eq!(body["provider_responses"].as_array().unwrap().len(), 4);
    assert_eq!(body["risk_level"], "medium");
}

#[tokio::test]
async fn majority_vote_reports_breakdowns() {
    let server = helpers::test_server(
        vec![
            StubProvider::voting("anthropic", TradeDecision::Buy, 0.8),
            StubProvider::voting("openai", TradeDecision::Buy, 0.7),
            StubProvider::voting("gemini", TradeDecision::Buy, 0.9),
            StubProvider::voting("grok", TradeDecision::Hold, 0.6),
        ],
        helpers::settings(2),
    );

    let response = server.post(RESOURCE).json(&helpers::consensus_body()).await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["decision"], "BUY");
    assert_eq!(body["consensus_metadata"]["agreement_score"], 0.75);
    let weighted = &body["consensus_metadata"]["weighted_votes"];
    assert!((weighted["BUY"].as_f64().unwrap() - 2.4).abs() < 1e-9);
    assert!((weighted["HOLD"].as_f64().unwrap() - 0.6).abs() < 1e-9);
    assert!((body["confidence"].as_f64().unwrap() - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn invalid_timeframe_is_rejected_before_fan_out() {
    // A hanging provider proves the orchestrator is never invoked: the
    // response returns immediately.
    let server = helpers::test_server(
        vec![
            StubProvider::hanging("anthropic"),
            StubProvider::hanging("openai"),
        ],
        helpers::settings(2),
    );

    let mut body = helpers::consensus_body();
    body["timeframe"] = json!("2h");
    let response = server.post(RESOURCE).json(&body).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let error: Value = response.json();
    assert_eq!(error["error"], "validation_error");
    assert!(error["details"]["timeframe"].is_array());
}

#[tokio::test]
async fn malformed_fields_are_all_reported() {
    let server = helpers::test_server(
        vec![
            StubProvider::voting("anthropic", TradeDecision::Buy, 0.9),
            StubProvider::voting("openai", TradeDecision::Buy, 0.9),
        ],
        helpers::settings(2),
    );

    let response = server
        .post(RESOURCE)
        .json(&json!({
            "market_data": {},
            "pair": "",
            "timeframe": "1h",
            "current_price": 0.0,
            "provider_weights": {"openai": 9.0}
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let error: Value = response.json();
    for field in ["market_data", "pair", "current_price", "provider_weights"] {
        assert!(error["details"][field].is_array(), "missing {field}");
    }
}

#[tokio::test]
async fn no_providers_maps_to_service_unavailable() {
    let server = helpers::test_server(vec![], helpers::settings(2));
    let response = server.post(RESOURCE).json(&helpers::consensus_body()).await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);

    let error: Value = response.json();
    assert_eq!(error["error"], "no_providers_available");
}

#[tokio::test]
async fn insufficient_successes_names_each_failing_provider() {
    let server = helpers::test_server(
        vec![
            StubProvider::voting("anthropic", TradeDecision::Buy, 0.9),
            StubProvider::failing("openai", |name| {
                ProviderError::authentication(name, "invalid api key")
            }),
            StubProvider::failing("gemini", |name| ProviderError::parse(name, "no json")),
        ],
        helpers::settings(2),
    );

    let response = server.post(RESOURCE).json(&helpers::consensus_body()).await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);

    let error: Value = response.json();
    assert_eq!(error["error"], "insufficient_successes");
    let per_provider = &error["per_provider_errors"];
    assert_eq!(per_provider["openai"]["kind"], "authentication");
    assert_eq!(per_provider["openai"]["retryable"], false);
    assert_eq!(per_provider["gemini"]["kind"], "parse");
}

#[tokio::test]
async fn hanging_provider_times_out_and_the_rest_decide() {
    let server = helpers::test_server(
        vec![
            StubProvider::voting("anthropic", TradeDecision::Sell, 0.8),
            StubProvider::voting("openai", TradeDecision::Sell, 0.7),
            StubProvider::voting("gemini", TradeDecision::Sell, 0.9),
            StubProvider::hanging("grok"),
        ],
        helpers::settings(2),
    );

    let response = server.post(RESOURCE).json(&helpers::consensus_body()).await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["decision"], "SELL");
    assert_eq!(body["consensus_metadata"]["participating_providers"], 3);
    assert_eq!(body["consensus_metadata"]["total_providers"], 4);
}

#[tokio::test]
async fn single_failure_is_invisible_to_a_successful_caller() {
    let server = helpers::test_server(
        vec![
            StubProvider::voting("anthropic", TradeDecision::Buy, 0.9),
            StubProvider::voting("openai", TradeDecision::Buy, 0.8),
            StubProvider::failing("gemini", |name| {
                ProviderError::rate_limited(name, None)
            }),
        ],
        helpers::settings(2),
    );

    let response = server.post(RESOURCE).json(&helpers::consensus_body()).await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["consensus_metadata"]["participating_providers"], 2);
    assert!(body.get("per_provider_errors").is_none());
}

#[tokio::test]
async fn per_request_weights_steer_the_vote() {
    let server = helpers::test_server(
        vec![
            StubProvider::voting("anthropic", TradeDecision::Buy, 0.9),
            StubProvider::voting("openai", TradeDecision::Sell, 0.6),
            StubProvider::voting("gemini", TradeDecision::Sell, 0.6),
        ],
        helpers::settings(2),
    );

    let mut body = helpers::consensus_body();
    body["provider_weights"] = json!({"anthropic": 2.0});
    let response = server.post(RESOURCE).json(&body).await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let result: Value = response.json();
    assert_eq!(result["decision"], "BUY");
}

#[tokio::test]
async fn long_reasonings_are_truncated_for_transport() {
    let long_reasoning = "momentum ".repeat(200);
    let server = helpers::test_server(
        vec![
            StubProvider::with_reasoning("anthropic", &long_reasoning),
            StubProvider::voting("openai", TradeDecision::Buy, 0.8),
        ],
        helpers::settings(2),
    );

    let response = server.post(RESOURCE).json(&helpers::consensus_body()).await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    let responses = body["provider_responses"].as_array().unwrap();
    let anthropic = responses
        .iter()
        .find(|r| r["provider"] == "anthropic")
        .unwrap();
    let transported = anthropic["reasoning"].as_str().unwrap();
    assert!(transported.chars().count() <= 501);
}
