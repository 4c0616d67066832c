//! Integration tests for the gateway HTTP API against an in-process model service.

use async_trait::async_trait;
use attnscope_core::gateway::{gateway_router, AppState};
use attnscope_core::text::TokenScore;
use attnscope_core::{AttentionPipeline, AttentionTensor, AttnConfig, AttnError, ModelService};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::sync::Arc;
use tower::ServiceExt;

/// Splits on whitespace, wraps with the model's special tokens and returns
/// attention where every token attends mostly to itself.
struct StubService {
    fail_attend: bool,
}

fn stub_tokens(text: &str, model_id: &str) -> Vec<String> {
    let roberta = model_id.contains("roberta");
    let (open, close) = if roberta { ("<s>", "</s>") } else { ("[CLS]", "[SEP]") };
    let mut tokens = vec![open.to_string()];
    for (i, word) in text.split_whitespace().enumerate() {
        let lower = word.to_lowercase();
        let bare = lower.trim_end_matches('.');
        if roberta && i > 0 {
            tokens.push(format!("\u{120}{bare}"));
        } else {
            tokens.push(bare.to_string());
        }
        if lower.ends_with('.') {
            tokens.push(".".to_string());
        }
    }
    tokens.push(close.to_string());
    tokens
}

#[async_trait]
impl ModelService for StubService {
    fn name(&self) -> &str {
        "stub"
    }

    async fn load(&self, _model_id: &str) -> Result<(), AttnError> {
        Ok(())
    }

    async fn tokenize(&self, text: &str, model_id: &str) -> Result<Vec<String>, AttnError> {
        Ok(stub_tokens(text, model_id))
    }

    async fn attend(&self, text: &str, model_id: &str) -> Result<AttentionTensor, AttnError> {
        if self.fail_attend {
            return Err(AttnError::service("inference backend unavailable"));
        }
        let n = stub_tokens(text, model_id).len();
        let (layers, heads) = (2, 3);
        let mut data = Vec::with_capacity(layers * heads * n * n);
        for _ in 0..layers * heads {
            for q in 0..n {
                for k in 0..n {
                    let off = if n > 1 { 0.2 / (n - 1) as f64 } else { 0.0 };
                    data.push(if q == k { if n > 1 { 0.8 } else { 1.0 } } else { off });
                }
            }
        }
        AttentionTensor::new(layers, heads, n, data)
    }

    async fn fill_mask(
        &self,
        _masked_text: &str,
        _model_id: &str,
        top_k: usize,
    ) -> Result<Vec<TokenScore>, AttnError> {
        let raw = ["\u{120}dog", "dog", "<mask>", "\u{120}bird", " ", "\u{120}fish", "\u{120}cow"];
        Ok(raw
            .iter()
            .take(top_k)
            .enumerate()
            .map(|(i, t)| TokenScore {
                token: t.to_string(),
                score: 0.5 / (i + 1) as f64,
            })
            .collect())
    }
}

fn app_with(fail_attend: bool) -> axum::Router {
    let pipeline = AttentionPipeline::new(Arc::new(StubService { fail_attend }), AttnConfig::default());
    gateway_router(AppState::new(Arc::new(pipeline)))
}

fn app() -> axum::Router {
    app_with(false)
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let resp = ServiceExt::<Request<Body>>::oneshot(app, request).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 10_000_000).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    (status, json)
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

async fn post_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap();
    send(app, request).await
}

// --- /health and /models ---

#[tokio::test]
async fn test_health() {
    let (status, json) = get_json(app(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["uptime_secs"].is_number());
    assert_eq!(json["loaded_models"], serde_json::json!([]));
}

#[tokio::test]
async fn test_models_lists_registry() {
    let (status, json) = get_json(app(), "/models").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = json["models"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["bert-base-uncased", "roberta-base"]);
}

// --- /tokenize ---

#[tokio::test]
async fn test_tokenize_defaults_to_bert() {
    let (status, json) =
        post_json(app(), "/tokenize", serde_json::json!({"text": "The cat sat."})).await;
    assert_eq!(status, StatusCode::OK);
    let tokens = json["tokens"].as_array().unwrap();
    assert_eq!(tokens.len(), 6);
    assert_eq!(tokens[0]["text"], "[CLS]");
    assert!(tokens[0].get("wordIndex").is_none());
    assert_eq!(tokens[2]["wordIndex"], 1);
    assert_eq!(tokens[4]["text"], ".");
    assert_eq!(tokens[4]["wordIndex"], 2);
}

#[tokio::test]
async fn test_unknown_model_is_client_error() {
    let (status, json) = post_json(
        app(),
        "/tokenize",
        serde_json::json!({"text": "hi", "model_name": "xlnet-base-cased"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "unsupported_model");
}

// --- /attention ---

#[tokio::test]
async fn test_attention_raw_keeps_heads() {
    let (status, json) = post_json(
        app(),
        "/attention",
        serde_json::json!({"text": "a b", "visualization_method": "raw"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let data = &json["attention_data"];
    assert_eq!(data["tokens"].as_array().unwrap().len(), 4);
    let layers = data["layers"].as_array().unwrap();
    assert_eq!(layers.len(), 2);
    assert_eq!(layers[1]["layerIndex"], 1);
    assert_eq!(layers[0]["heads"].as_array().unwrap().len(), 3);
    assert_eq!(layers[0]["heads"][2]["headIndex"], 2);
    assert_eq!(layers[0]["heads"][0]["attention"][0][0], 0.8);
}

#[tokio::test]
async fn test_attention_flow_rows_sum_to_one() {
    let (status, json) = post_json(
        app(),
        "/attention",
        serde_json::json!({"text": "one two three", "model_name": "roberta-base", "visualization_method": "flow"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let heads = json["attention_data"]["layers"][0]["heads"].as_array().unwrap();
    assert_eq!(heads[0]["attention"], heads[1]["attention"]);
    for row in heads[0]["attention"].as_array().unwrap() {
        let sum: f64 = row.as_array().unwrap().iter().map(|v| v.as_f64().unwrap()).sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }
}

#[tokio::test]
async fn test_unknown_method_rejected() {
    let (status, json) = post_json(
        app(),
        "/attention",
        serde_json::json!({"text": "a b", "visualization_method": "gradient"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_request");
    assert!(json["detail"].as_str().unwrap().contains("gradient"));
}

#[tokio::test]
async fn test_missing_field_rejected_as_json() {
    let (status, json) =
        post_json(app(), "/tokenize", serde_json::json!({"model_name": "roberta-base"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_request");
    assert!(json["detail"].as_str().unwrap().contains("text"));
}

#[tokio::test]
async fn test_unparseable_body_rejected_as_json() {
    let request = Request::builder()
        .method("POST")
        .uri("/predict_masked")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, json) = send(app(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_request");
}

#[tokio::test]
async fn test_service_failure_is_bad_gateway() {
    let (status, json) =
        post_json(app_with(true), "/attention", serde_json::json!({"text": "a b"})).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"], "model_service");
    assert!(json["detail"].as_str().unwrap().contains("unavailable"));
}

// --- /attention_comparison ---

#[tokio::test]
async fn test_comparison_replaces_word() {
    let (status, json) = post_json(
        app(),
        "/attention_comparison",
        serde_json::json!({
            "text": "the cat sat on the mat.",
            "masked_index": 2,
            "replacement_word": "dog",
            "visualization_method": "rollout",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["mask_target"]["modifiedText"], "the dog sat on the mat.");
    assert_eq!(json["before_attention"]["tokens"][2]["text"], "cat");
    assert_eq!(json["after_attention"]["tokens"][2]["text"], "dog");
}

#[tokio::test]
async fn test_comparison_invalid_index() {
    let (status, json) = post_json(
        app(),
        "/attention_comparison",
        serde_json::json!({"text": "a b", "masked_index": 10, "replacement_word": "x"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_index");
    assert_eq!(json["detail"], "Invalid token index 10. Valid range: 0-3");
}

#[tokio::test]
async fn test_comparison_negative_index() {
    let (status, json) = post_json(
        app(),
        "/attention_comparison",
        serde_json::json!({"text": "a b", "masked_index": -1, "replacement_word": "x"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_index");
    assert_eq!(json["detail"], "Invalid token index -1. Valid range: 0-3");
}

#[tokio::test]
async fn test_predict_masked_negative_index() {
    let (status, json) = post_json(
        app(),
        "/predict_masked",
        serde_json::json!({"text": "a b", "mask_index": -3}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_index");
}

#[tokio::test]
async fn test_comparison_empty_text() {
    let (status, json) = post_json(
        app(),
        "/attention_comparison",
        serde_json::json!({"text": "   ", "masked_index": 0, "replacement_word": "x"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "no_viable_mask");
}

// --- /predict_masked ---

#[tokio::test]
async fn test_predict_masked_cleans_candidates() {
    let (status, json) = post_json(
        app(),
        "/predict_masked",
        serde_json::json!({"text": "the cat sat", "mask_index": 2, "model_name": "roberta-base", "top_k": 5}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["masked_text"], "the <mask> sat");
    let words: Vec<&str> = json["predictions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["word"].as_str().unwrap())
        .collect();
    assert_eq!(words, vec!["dog", "bird"]);
}

#[tokio::test]
async fn test_predict_masked_word_from_header() {
    let request = Request::builder()
        .method("POST")
        .uri("/predict_masked")
        .header("content-type", "application/json")
        .header("X-Token-To-Mask", "sat")
        .body(Body::from(r#"{"text": "the cat sat on the mat", "mask_index": 1}"#))
        .unwrap();
    let (status, json) = send(app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["masked_text"], "the cat [MASK] on the mat");
}

#[tokio::test]
async fn test_predict_masked_respects_cap() {
    let (status, json) = post_json(
        app(),
        "/predict_masked",
        serde_json::json!({"text": "a b", "mask_index": 1, "model_name": "roberta-base", "top_k": 50}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["predictions"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_health_reports_loaded_models() {
    let pipeline = Arc::new(AttentionPipeline::new(
        Arc::new(StubService { fail_attend: false }),
        AttnConfig::default(),
    ));
    pipeline.tokenize("warm up", "roberta-base").await.unwrap();
    let app = gateway_router(AppState::new(pipeline));
    let (_, json) = get_json(app, "/health").await;
    assert_eq!(json["loaded_models"], serde_json::json!(["roberta-base"]));
}
