//! Web chat surface
//!
//! The embedded chat page plus the JSON API behind it: send a message,
//! stream a reply, read or clear the conversation, run the memory
//! diagnostics and check health. One conversation log serves the whole
//! process; every browser tab sees the same exchange list.
//!
//! Generation failures come back as a normal chat reply carrying the
//! error text, so the widget renders them inline instead of breaking
//! the page. A request body that does not parse as JSON never reaches
//! a handler: [`ApiJson`] turns the rejection into a structured
//! [`ErrorResponse`] with a 400 status.
//!
//! ## Example
//!
//! ```rust,no_run
//! use stonechat::config::AppConfig;
//! use stonechat::engine::ChatEngine;
//! use stonechat::web::{self, AppState};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), stonechat::ChatError> {
//!     let config = AppConfig::default();
//!     let engine = ChatEngine::boot(config.to_engine_options()?).await?;
//!     let state = AppState::new(engine, config.to_sampler_options(), true);
//!     let app = web::router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:7860").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::engine::{ChatEngine, EngineStats};
use crate::error::ChatError;
use crate::generate::FinishReason;
use crate::history::{ConversationLog, Exchange, Message};
use crate::memory::MemoryReport;
use crate::model::ModelInfo;
use crate::sampling::SamplerOptions;

/// Application state shared across all requests.
#[derive(Clone)]
pub struct AppState {
    /// The loaded model behind its async facade
    pub engine: ChatEngine,
    /// The process-wide conversation log
    pub log: Arc<RwLock<ConversationLog>>,
    /// HTTP-level metrics
    pub metrics: Arc<RwLock<ApiMetrics>>,
    /// Sampler defaults requests merge their overrides into
    pub defaults: SamplerOptions,
    /// Whether failure detail reaches responses
    pub show_errors: bool,
}

impl AppState {
    pub fn new(engine: ChatEngine, defaults: SamplerOptions, show_errors: bool) -> Self {
        Self {
            engine,
            log: Arc::new(RwLock::new(ConversationLog::new())),
            metrics: Arc::new(RwLock::new(ApiMetrics::default())),
            defaults,
            show_errors,
        }
    }

    fn merge_options(&self, request: &ChatRequest) -> SamplerOptions {
        merge_request_options(&self.defaults, request)
    }

    /// Inline reply text for a failed generation.
    fn error_reply(&self, error: &ChatError) -> String {
        if self.show_errors {
            format!("❌ Error generating response: {}", error)
        } else {
            "❌ Error generating response: request failed".to_string()
        }
    }

    async fn note_success(&self, tokens: usize, elapsed_ms: u64) {
        let mut metrics = self.metrics.write().await;
        metrics.total_requests += 1;
        metrics.successful_requests += 1;
        metrics.total_tokens_generated += tokens as u64;
        let n = metrics.total_requests as f64;
        metrics.avg_response_time_ms =
            (metrics.avg_response_time_ms * (n - 1.0) + elapsed_ms as f64) / n;
    }

    async fn note_failure(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.total_requests += 1;
        metrics.failed_requests += 1;
    }
}

/// API metrics for monitoring.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApiMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub avg_response_time_ms: f64,
    pub total_tokens_generated: u64,
}

/// One chat turn. Absent knobs fall back to the server defaults and
/// are clamped into the published slider ranges.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub max_new_tokens: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
}

/// The reply plus the full exchange list the widget renders.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub exchanges: Vec<Exchange>,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub generation_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub messages: Vec<Message>,
    pub exchanges: Vec<Exchange>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub cleared: bool,
    pub exchanges: Vec<Exchange>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_info: ModelInfo,
    pub metrics: ApiMetrics,
    pub engine: EngineStats,
}

/// Error response for transport-level failures.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub status: u16,
}

/// One server-sent chunk of a streamed reply.
#[derive(Debug, Serialize)]
pub struct StreamDelta {
    pub text: String,
}

/// Merge request overrides into the server defaults.
pub fn merge_request_options(defaults: &SamplerOptions, request: &ChatRequest) -> SamplerOptions {
    let mut options = defaults.clone();
    if let Some(max_new_tokens) = request.max_new_tokens {
        options.max_new_tokens = max_new_tokens;
    }
    if let Some(temperature) = request.temperature {
        options.temperature = temperature;
    }
    if let Some(top_p) = request.top_p {
        options.top_p = top_p;
    }
    options.clamped()
}

/// JSON extractor whose rejection is the documented [`ErrorResponse`]
/// shape instead of axum's plain-text default.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError::BadRequest(rejection.body_text())),
        }
    }
}

/// HTTP handlers for the chat API.
pub mod handlers {
    use super::*;
    use axum::extract::State;
    use axum::response::sse::{Event, KeepAlive, Sse};
    use axum::response::Html;
    use futures::Stream;
    use std::convert::Infallible;
    use std::time::Duration;

    /// The embedded chat page.
    pub async fn chat_page() -> Html<&'static str> {
        Html(include_str!("../assets/chat.html"))
    }

    /// One chat turn: append the user message, generate, append the
    /// reply, return the whole exchange list.
    ///
    /// An empty message is a no-op echoing the current exchanges, the
    /// same way the widget ignores blank input.
    pub async fn chat(
        State(state): State<AppState>,
        ApiJson(request): ApiJson<ChatRequest>,
    ) -> Json<ChatResponse> {
        let message = request.message.trim().to_string();
        if message.is_empty() {
            let log = state.log.read().await;
            return Json(ChatResponse {
                reply: String::new(),
                exchanges: log.exchanges(),
                prompt_tokens: 0,
                completion_tokens: 0,
                generation_time_ms: 0,
                finish_reason: None,
            });
        }

        let options = state.merge_options(&request);
        state.log.write().await.push_user(&message);

        match state.engine.reply(&message, &options).await {
            Ok(generated) => {
                state
                    .note_success(generated.completion_tokens, generated.elapsed_ms)
                    .await;
                let mut log = state.log.write().await;
                log.push_assistant(&generated.reply);
                Json(ChatResponse {
                    reply: generated.reply,
                    exchanges: log.exchanges(),
                    prompt_tokens: generated.prompt_tokens,
                    completion_tokens: generated.completion_tokens,
                    generation_time_ms: generated.elapsed_ms,
                    finish_reason: Some(generated.finish_reason),
                })
            }
            Err(error) => {
                // Failures render inline as the reply itself.
                state.note_failure().await;
                let reply = state.error_reply(&error);
                let mut log = state.log.write().await;
                log.push_assistant(&reply);
                Json(ChatResponse {
                    reply,
                    exchanges: log.exchanges(),
                    prompt_tokens: 0,
                    completion_tokens: 0,
                    generation_time_ms: 0,
                    finish_reason: None,
                })
            }
        }
    }

    /// Streamed chat turn over server-sent events: `delta` events with
    /// text chunks, then one `done` event with the final response, or
    /// an `error` event carrying the inline error reply.
    pub async fn chat_stream(
        State(state): State<AppState>,
        ApiJson(request): ApiJson<ChatRequest>,
    ) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
        let stream = async_stream::stream! {
            let message = request.message.trim().to_string();
            if message.is_empty() {
                let exchanges = state.log.read().await.exchanges();
                yield Ok(json_event("done", &ChatResponse {
                    reply: String::new(),
                    exchanges,
                    prompt_tokens: 0,
                    completion_tokens: 0,
                    generation_time_ms: 0,
                    finish_reason: None,
                }));
                return;
            }

            let options = state.merge_options(&request);
            state.log.write().await.push_user(&message);

            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            let engine = state.engine.clone();
            let task_message = message.clone();
            let task = tokio::spawn(async move {
                engine.reply_streaming(&task_message, &options, tx).await
            });

            while let Some(chunk) = rx.recv().await {
                yield Ok(json_event("delta", &StreamDelta { text: chunk }));
            }

            let outcome = match task.await {
                Ok(result) => result,
                Err(join_error) => Err(ChatError::GenerationError(join_error.to_string())),
            };
            match outcome {
                Ok(generated) => {
                    state
                        .note_success(generated.completion_tokens, generated.elapsed_ms)
                        .await;
                    let mut log = state.log.write().await;
                    log.push_assistant(&generated.reply);
                    yield Ok(json_event("done", &ChatResponse {
                        reply: generated.reply,
                        exchanges: log.exchanges(),
                        prompt_tokens: generated.prompt_tokens,
                        completion_tokens: generated.completion_tokens,
                        generation_time_ms: generated.elapsed_ms,
                        finish_reason: Some(generated.finish_reason),
                    }));
                }
                Err(error) => {
                    state.note_failure().await;
                    let reply = state.error_reply(&error);
                    let mut log = state.log.write().await;
                    log.push_assistant(&reply);
                    yield Ok(json_event("error", &StreamDelta { text: reply }));
                }
            }
        };

        Sse::new(stream).keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keep-alive"),
        )
    }

    /// The full conversation log.
    pub async fn history(State(state): State<AppState>) -> Json<HistoryResponse> {
        let log = state.log.read().await;
        Json(HistoryResponse {
            messages: log.messages().to_vec(),
            exchanges: log.exchanges(),
        })
    }

    /// Reset the conversation log to empty.
    pub async fn clear_history(State(state): State<AppState>) -> Json<ClearResponse> {
        let mut log = state.log.write().await;
        log.clear();
        Json(ClearResponse {
            cleared: true,
            exchanges: log.exchanges(),
        })
    }

    /// First memory diagnostic: report usage.
    pub async fn memory_report(State(state): State<AppState>) -> Json<MemoryReport> {
        Json(state.engine.memory_report())
    }

    /// Second memory diagnostic: clear and report what remains.
    pub async fn clear_memory(State(state): State<AppState>) -> Json<MemoryReport> {
        Json(state.engine.clear_memory())
    }

    /// Service health with model metadata and counters.
    pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
        let metrics = state.metrics.read().await.clone();
        Json(HealthResponse {
            status: "healthy".to_string(),
            model_info: state.engine.info(),
            metrics,
            engine: state.engine.stats(),
        })
    }

    fn json_event<T: Serialize>(name: &str, payload: &T) -> Event {
        let data = serde_json::to_string(payload).unwrap_or_default();
        Event::default().event(name).data(data)
    }
}

/// Middleware for the chat service.
pub mod middleware {
    use std::time::Duration;
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::timeout::TimeoutLayer;

    /// Permissive CORS so the page works behind tunnels and proxies.
    pub fn cors() -> CorsLayer {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    }

    /// Long timeout sized for slow CPU generation.
    pub fn timeout() -> TimeoutLayer {
        TimeoutLayer::new(Duration::from_secs(300))
    }
}

/// Transport-level failure, raised by [`ApiJson`] when a request body
/// cannot be parsed.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let AppError::BadRequest(message) = self;
        let body = ErrorResponse {
            error: message,
            code: "BAD_REQUEST".to_string(),
            status: StatusCode::BAD_REQUEST.as_u16(),
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

/// Build the chat app router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::chat_page))
        .route("/api/chat", post(handlers::chat))
        .route("/api/chat/stream", post(handlers::chat_stream))
        .route("/api/history", get(handlers::history))
        .route("/api/history/clear", post(handlers::clear_history))
        .route("/api/memory", get(handlers::memory_report))
        .route("/api/memory/clear", post(handlers::clear_memory))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(middleware::cors())
        .layer(middleware::timeout())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_defaults() {
        let json = r#"{"message": "Hello"}"#;
        let request: ChatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.message, "Hello");
        assert_eq!(request.max_new_tokens, None);
        assert_eq!(request.temperature, None);
        assert_eq!(request.top_p, None);
    }

    #[test]
    fn test_merge_request_options() {
        let defaults = SamplerOptions::default();
        let request: ChatRequest =
            serde_json::from_str(r#"{"message": "hi", "temperature": 1.2, "max_new_tokens": 256}"#)
                .unwrap();
        let merged = merge_request_options(&defaults, &request);
        assert_eq!(merged.temperature, 1.2);
        assert_eq!(merged.max_new_tokens, 256);
        assert_eq!(merged.top_p, defaults.top_p);
    }

    #[test]
    fn test_merge_clamps_out_of_range_values() {
        let defaults = SamplerOptions::default();
        let request: ChatRequest =
            serde_json::from_str(r#"{"message": "hi", "temperature": 99.0, "max_new_tokens": 5}"#)
                .unwrap();
        let merged = merge_request_options(&defaults, &request);
        assert_eq!(merged.temperature, 2.0);
        assert_eq!(merged.max_new_tokens, 50);
    }

    #[test]
    fn test_error_response_serialization() {
        let error = ErrorResponse {
            error: "bad input".to_string(),
            code: "BAD_REQUEST".to_string(),
            status: 400,
        };
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("bad input"));
        assert!(json.contains("BAD_REQUEST"));
        assert!(json.contains("400"));
    }

    #[tokio::test]
    async fn test_truncated_body_rejects_with_structured_error() {
        use axum::body::Body;

        let request = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"message": "#))
            .unwrap();

        let error = match ApiJson::<ChatRequest>::from_request(request, &()).await {
            Ok(_) => panic!("a truncated body must be rejected"),
            Err(error) => error,
        };

        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "BAD_REQUEST");
        assert_eq!(body["status"], 400);
        assert!(!body["error"].as_str().unwrap_or_default().is_empty());
    }
}
