//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers) – adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/quiz/generate", post(http::http_post_generate))
        .route("/api/v1/quiz/generate_stream", post(http::http_post_generate_stream))
        .route("/api/v1/quiz/evaluate", post(http::http_post_evaluate))
        .route("/api/v1/quiz/chat", post(http::http_post_quiz_chat))
        .route("/api/v1/chat", post(http::http_post_chat))
        .route("/api/v1/outline/chapters", post(http::http_post_outline))
        .route("/api/v1/voice/transcribe", post(http::http_post_transcribe))
        .route("/api/v1/voice/generate", post(http::http_post_speech))
        .route("/api/v1/image/generate", post(http::http_post_image))
        // Room for a full audio upload; JSON bodies stay far below this.
        .layer(DefaultBodyLimit::max(30 * 1024 * 1024))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    fn test_router() -> Router {
        build_router(Arc::new(AppState::offline()))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({ "ok": true }));
    }

    #[tokio::test]
    async fn generate_rejects_out_of_range_requests() {
        let response = test_router()
            .oneshot(post_json(
                "/api/v1/quiz/generate",
                serde_json::json!({ "topic": "历史", "difficulty": "medium", "numberOfQuestions": 11 }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        let violations = body["violations"].as_array().expect("violations array");
        assert!(violations.iter().any(|v| v["field"] == "numberOfQuestions"), "{violations:?}");
    }

    #[tokio::test]
    async fn generate_rejects_unknown_difficulty() {
        let response = test_router()
            .oneshot(post_json(
                "/api/v1/quiz/generate",
                serde_json::json!({ "topic": "历史", "difficulty": "impossible", "numberOfQuestions": 3 }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        let violations = body["violations"].as_array().expect("violations array");
        assert!(violations.iter().any(|v| v["field"] == "difficulty"), "{violations:?}");
    }

    #[tokio::test]
    async fn offline_generate_serves_a_well_formed_seed_quiz() {
        let response = test_router()
            .oneshot(post_json(
                "/api/v1/quiz/generate",
                serde_json::json!({ "topic": "JavaScript 基础", "difficulty": "medium", "numberOfQuestions": 3 }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["origin"], "seed");
        let questions = body["quiz"]["questions"].as_array().expect("questions");
        assert_eq!(questions.len(), 3);
        for q in questions {
            let options = q["options"].as_array().expect("options");
            let correct = q["correctAnswer"].as_u64().expect("correctAnswer") as usize;
            assert!((2..=4).contains(&options.len()));
            assert!(correct < options.len());
        }
    }

    #[tokio::test]
    async fn evaluate_scores_two_of_three_as_sixty_seven() {
        let quiz = crate::seeds::fixture_quiz();
        let response = test_router()
            .oneshot(post_json(
                "/api/v1/quiz/evaluate",
                serde_json::json!({
                    "quiz": { "title": quiz.title, "questions": quiz.questions },
                    "userAnswers": [
                        { "questionId": "js-1", "selectedAnswer": 1 },
                        { "questionId": "js-2", "selectedAnswer": 0 },
                        { "questionId": "js-3", "selectedAnswer": 0 },
                    ],
                }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["totalQuestions"], 3);
        assert_eq!(body["correctAnswers"], 2);
        assert_eq!(body["percentage"], 67);
    }

    #[tokio::test]
    async fn evaluate_rejects_incomplete_submissions() {
        let quiz = crate::seeds::fixture_quiz();
        let response = test_router()
            .oneshot(post_json(
                "/api/v1/quiz/evaluate",
                serde_json::json!({
                    "quiz": { "title": quiz.title, "questions": quiz.questions },
                    "userAnswers": [{ "questionId": "js-1", "selectedAnswer": 1 }],
                }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn evaluate_rejects_structurally_broken_quizzes() {
        let response = test_router()
            .oneshot(post_json(
                "/api/v1/quiz/evaluate",
                serde_json::json!({
                    "quiz": {
                        "title": "坏测试",
                        "questions": [{
                            "id": "q1",
                            "question": "?",
                            "options": ["a", "b"],
                            "correctAnswer": 5,
                            "explanation": "",
                        }],
                    },
                    "userAnswers": [{ "questionId": "q1", "selectedAnswer": 0 }],
                }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn offline_generate_stream_ends_with_a_complete_event() {
        let response = test_router()
            .oneshot(post_json(
                "/api/v1/quiz/generate_stream",
                serde_json::json!({ "topic": "JavaScript 基础", "difficulty": "medium", "numberOfQuestions": 3 }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE]
            .to_str()
            .expect("content type");
        assert!(content_type.starts_with("text/event-stream"), "{content_type}");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("event: snapshot"), "{text}");
        assert!(text.contains("event: complete"), "{text}");
    }

    #[tokio::test]
    async fn quiz_chat_without_a_model_streams_one_error_event() {
        let response = test_router()
            .oneshot(post_json(
                "/api/v1/quiz/chat",
                serde_json::json!({ "messages": [{ "role": "user", "content": "出一套测试" }] }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("event: error"), "{text}");
    }

    #[tokio::test]
    async fn speech_without_a_model_is_service_unavailable() {
        let response = test_router()
            .oneshot(post_json(
                "/api/v1/voice/generate",
                serde_json::json!({ "text": "你好" }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn speech_rejects_empty_text_before_any_model_concern() {
        let response = test_router()
            .oneshot(post_json(
                "/api/v1/voice/generate",
                serde_json::json!({ "text": "   " }),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn transcribe_requires_the_audio_field() {
        let boundary = "qc-test-boundary";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nhello\r\n--{boundary}--\r\n"
        );
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/voice/transcribe")
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
