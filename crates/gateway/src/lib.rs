//! HTTP gateway for websage.
//!
//! Serves the embedded browser chat UI and a small JSON API:
//!
//! - `GET  /health`            — liveness probe
//! - `POST /api/chat`          — send a message, get the assistant's reply
//! - `GET  /api/session/{id}`  — the session's visible transcript
//! - `DELETE /api/session/{id}` — clear the session's transcript
//!
//! Sessions are in-memory only and die with the process. Each request runs
//! one blocking agent round-trip; the write lock on the session store is
//! released while the agent works.

pub mod frontend;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use websage_agent::{AgentLoop, DEFAULT_SYSTEM_PROMPT};
use websage_core::message::{Conversation, Message, Role};

/// Maximum number of in-memory sessions before the oldest is evicted.
const MAX_SESSIONS: usize = 1_000;

/// Shared application state for the gateway.
pub struct AppState {
    pub agent: Arc<AgentLoop>,
    pub sessions: RwLock<HashMap<String, Conversation>>,
}

pub type SharedState = Arc<AppState>;

/// Build the gateway router: JSON API plus the embedded frontend.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/session/{id}", get(get_session_handler))
        .route("/api/session/{id}", delete(clear_session_handler))
        .with_state(state)
        .merge(frontend::frontend_router())
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
///
/// Builds the provider, tools, and agent once; the credential must have been
/// checked by the caller before this point.
pub async fn start(config: websage_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider = websage_providers::build_from_config(&config);
    let tools = Arc::new(websage_tools::default_registry(config.search.max_results));
    let system_prompt = config
        .system_prompt
        .clone()
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.into());

    let agent = Arc::new(
        AgentLoop::new(
            provider,
            &config.model,
            config.temperature,
            tools,
            system_prompt,
        )
        .with_max_tokens(config.max_tokens),
    );

    let state = Arc::new(AppState {
        agent,
        sessions: RwLock::new(HashMap::new()),
    });

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Deserialize)]
struct ChatRequest {
    /// Existing session ID (omit to start a new session).
    #[serde(default)]
    session_id: Option<String>,
    /// The user's message.
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    session_id: String,
    reply: String,
}

#[derive(Serialize)]
struct SessionResponse {
    session_id: String,
    turns: Vec<TurnDto>,
}

#[derive(Serialize)]
struct TurnDto {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorResponse>)> {
    if payload.message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Message must not be empty".into(),
            }),
        ));
    }

    let session_id = payload
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    info!(session = %session_id, "Chat request");

    let mut sessions = state.sessions.write().await;

    // Evict the oldest session when at capacity.
    if sessions.len() >= MAX_SESSIONS && !sessions.contains_key(&session_id) {
        if let Some(oldest_key) = sessions
            .iter()
            .min_by_key(|(_, c)| c.created_at)
            .map(|(k, _)| k.clone())
        {
            sessions.remove(&oldest_key);
        }
    }

    let conv = sessions
        .entry(session_id.clone())
        .or_insert_with(Conversation::new);

    conv.push(Message::user(&payload.message));

    // Release the lock before the agent round-trip.
    let mut conv_clone = conv.clone();
    drop(sessions);

    let reply = state.agent.process(&mut conv_clone).await.map_err(|e| {
        error!(session = %session_id, error = %e, "Agent processing failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Agent error: {e}"),
            }),
        )
    })?;

    // Store the updated conversation back.
    let mut sessions = state.sessions.write().await;
    sessions.insert(session_id.clone(), conv_clone);

    Ok(Json(ChatResponse { session_id, reply }))
}

async fn get_session_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Json<SessionResponse> {
    let sessions = state.sessions.read().await;

    let turns = sessions
        .get(&id)
        .map(|conv| {
            conv.visible_turns()
                .map(|m| TurnDto {
                    role: match m.role {
                        Role::User => "user".into(),
                        _ => "assistant".into(),
                    },
                    content: m.content.clone(),
                })
                .collect()
        })
        .unwrap_or_default();

    Json(SessionResponse {
        session_id: id,
        turns,
    })
}

async fn clear_session_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> StatusCode {
    let removed = state.sessions.write().await.remove(&id).is_some();
    info!(session = %id, removed, "Session cleared");
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use websage_core::error::ProviderError;
    use websage_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use websage_core::tool::ToolRegistry;

    /// A provider that answers every prompt with a fixed string.
    struct MockProvider {
        response: String,
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                message: Message::assistant(&self.response),
                usage: None,
                model: "mock-model".into(),
            })
        }
    }

    /// A provider that always fails.
    struct FailingProvider;

    #[async_trait]
    impl Provider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::Network("connection refused".into()))
        }
    }

    fn test_state(provider: Arc<dyn Provider>) -> SharedState {
        let agent = Arc::new(AgentLoop::new(
            provider,
            "mock-model",
            0.1,
            Arc::new(ToolRegistry::new()),
            DEFAULT_SYSTEM_PROMPT,
        ));
        Arc::new(AppState {
            agent,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    fn chat_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state(Arc::new(MockProvider {
            response: "hi".into(),
        })));

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn chat_appends_user_then_assistant() {
        let state = test_state(Arc::new(MockProvider {
            response: "2+2 equals 4.".into(),
        }));
        let app = build_router(state.clone());

        let response = app
            .oneshot(chat_request(serde_json::json!({"message": "2+2?"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["reply"], "2+2 equals 4.");
        let session_id = body["session_id"].as_str().unwrap().to_string();

        // Exactly two visible turns, in append order.
        let sessions = state.sessions.read().await;
        let conv = sessions.get(&session_id).unwrap();
        let turns: Vec<_> = conv.visible_turns().collect();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "2+2?");
        assert_eq!(turns[1].role, Role::Assistant);
        assert!(!turns[1].content.is_empty());
    }

    #[tokio::test]
    async fn chat_reuses_session() {
        let state = test_state(Arc::new(MockProvider {
            response: "ack".into(),
        }));

        let app = build_router(state.clone());
        let body = json_body(
            app.oneshot(chat_request(serde_json::json!({"message": "first"})))
                .await
                .unwrap(),
        )
        .await;
        let session_id = body["session_id"].as_str().unwrap().to_string();

        let app = build_router(state.clone());
        let body = json_body(
            app.oneshot(chat_request(
                serde_json::json!({"session_id": session_id, "message": "second"}),
            ))
            .await
            .unwrap(),
        )
        .await;
        assert_eq!(body["session_id"], session_id.as_str());

        let sessions = state.sessions.read().await;
        let turns: Vec<_> = sessions.get(&session_id).unwrap().visible_turns().collect();
        assert_eq!(turns.len(), 4);
    }

    #[tokio::test]
    async fn empty_message_rejected() {
        let app = build_router(test_state(Arc::new(MockProvider {
            response: "hi".into(),
        })));

        let response = app
            .oneshot(chat_request(serde_json::json!({"message": "   "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn provider_failure_maps_to_500() {
        let app = build_router(test_state(Arc::new(FailingProvider)));

        let response = app
            .oneshot(chat_request(serde_json::json!({"message": "hello"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn get_session_returns_transcript() {
        let state = test_state(Arc::new(MockProvider {
            response: "pong".into(),
        }));

        let app = build_router(state.clone());
        let body = json_body(
            app.oneshot(chat_request(serde_json::json!({"message": "ping"})))
                .await
                .unwrap(),
        )
        .await;
        let session_id = body["session_id"].as_str().unwrap().to_string();

        let app = build_router(state.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/session/{session_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let turns = body["turns"].as_array().unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0]["role"], "user");
        assert_eq!(turns[0]["content"], "ping");
        assert_eq!(turns[1]["role"], "assistant");
    }

    #[tokio::test]
    async fn clear_chat_empties_transcript() {
        let state = test_state(Arc::new(MockProvider {
            response: "hello".into(),
        }));

        let app = build_router(state.clone());
        let body = json_body(
            app.oneshot(chat_request(serde_json::json!({"message": "hi"})))
                .await
                .unwrap(),
        )
        .await;
        let session_id = body["session_id"].as_str().unwrap().to_string();

        let app = build_router(state.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/session/{session_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        assert!(state.sessions.read().await.get(&session_id).is_none());

        // Re-rendering the session now shows zero turns.
        let app = build_router(state.clone());
        let body = json_body(
            app.oneshot(
                Request::builder()
                    .uri(format!("/api/session/{session_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap(),
        )
        .await;
        assert!(body["turns"].as_array().unwrap().is_empty());
    }
}
