//! Build introspection: the `/api-ws` namespace and the `/api/*` HTTP routes.
//!
//! Both surfaces answer from the same [`ApiDelegate`]. Over WebSocket a
//! client sends `{"id": 1, "method": "getAssets", "params": {"platform":
//! "ios"}}` and receives `{"id": 1, "result": [...]}` or
//! `{"id": 1, "error": "..."}`.

use crate::delegate::ApiDelegate;
use crate::wss::{spawn_writer, ClientRegistry, RoutePattern, UpgradeRequest, WebSocketServer};
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use fob_multi_compiler::{ClientId, CompilerError, Target};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

pub const API_PATH: &str = "/api-ws";

#[derive(Debug, Deserialize)]
struct ApiRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct ApiResponse {
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Missing 'platform' parameter")]
    MissingPlatform,

    #[error(transparent)]
    Compiler(#[from] CompilerError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Compiler(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::UnknownMethod(_) | ApiError::MissingPlatform => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build introspection server.
///
/// Answers one request per WebSocket text frame, in arrival order, and
/// serves the same queries as JSON over [`routes`](Self::routes). Every
/// answer comes from the [`ApiDelegate`], so the server holds no build
/// state of its own.
pub struct ApiServer {
    clients: ClientRegistry<()>,
    delegate: Arc<dyn ApiDelegate>,
}

impl ApiServer {
    /// Create an API server.
    ///
    /// # Arguments
    ///
    /// * `delegate` - Source of platforms, asset lists and stats
    pub fn new(delegate: Arc<dyn ApiDelegate>) -> Self {
        Self {
            clients: ClientRegistry::new(),
            delegate,
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// HTTP routes answering `{"data": ...}`.
    pub fn routes(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/api/platforms", get(platforms_handler))
            .route("/api/assets/{target}", get(assets_handler))
            .route("/api/stats/{target}", get(stats_handler))
            .with_state(Arc::clone(self))
    }

    async fn dispatch(&self, method: &str, params: &Value) -> Result<Value, ApiError> {
        let platform = || {
            params
                .get("platform")
                .and_then(Value::as_str)
                .filter(|platform| !platform.is_empty())
                .map(Target::from)
                .ok_or(ApiError::MissingPlatform)
        };

        match method {
            "getPlatforms" => Ok(serde_json::to_value(self.delegate.get_platforms().await?)?),
            "getAssets" => {
                let target = platform()?;
                Ok(serde_json::to_value(self.delegate.get_assets(&target).await?)?)
            }
            "getStats" => {
                let target = platform()?;
                Ok(serde_json::to_value(self.delegate.get_stats(&target).await?)?)
            }
            other => Err(ApiError::UnknownMethod(other.to_string())),
        }
    }

    async fn handle_message(&self, client_id: &ClientId, text: &str) {
        let request: ApiRequest = match serde_json::from_str(text) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(client = %client_id, "invalid api request: {}", e);
                let response = ApiResponse {
                    id: Value::Null,
                    result: None,
                    error: Some(format!("Invalid request: {}", e)),
                };
                self.reply(client_id, &response);
                return;
            }
        };

        let response = match self.dispatch(&request.method, &request.params).await {
            Ok(result) => ApiResponse {
                id: request.id,
                result: Some(result),
                error: None,
            },
            Err(e) => ApiResponse {
                id: request.id,
                result: None,
                error: Some(e.to_string()),
            },
        };
        self.reply(client_id, &response);
    }

    fn reply(&self, client_id: &ClientId, response: &ApiResponse) {
        match serde_json::to_string(response) {
            Ok(text) => {
                self.clients.send(client_id, &text);
            }
            Err(e) => tracing::error!("failed to serialize api response: {}", e),
        }
    }
}

async fn platforms_handler(State(api): State<Arc<ApiServer>>) -> Result<Json<Value>, ApiError> {
    let data = api.dispatch("getPlatforms", &Value::Null).await?;
    Ok(Json(json!({ "data": data })))
}

async fn assets_handler(
    State(api): State<Arc<ApiServer>>,
    Path(target): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let data = api
        .dispatch("getAssets", &json!({ "platform": target }))
        .await?;
    Ok(Json(json!({ "data": data })))
}

async fn stats_handler(
    State(api): State<Arc<ApiServer>>,
    Path(target): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let data = api
        .dispatch("getStats", &json!({ "platform": target }))
        .await?;
    Ok(Json(json!({ "data": data })))
}

#[async_trait]
impl WebSocketServer for ApiServer {
    fn name(&self) -> &'static str {
        "api"
    }

    fn pattern(&self) -> RoutePattern {
        RoutePattern::exact(API_PATH)
    }

    async fn on_connection(self: Arc<Self>, socket: WebSocket, _request: UpgradeRequest) {
        let (client_id, rx) = self.clients.register(());
        let (sink, mut stream) = socket.split();
        let writer = spawn_writer(sink, rx);
        tracing::debug!(client = %client_id, "api client connected");

        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => self.handle_message(&client_id, text.as_str()).await,
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(client = %client_id, "api connection error: {}", e);
                    break;
                }
            }
        }

        self.clients.remove(&client_id);
        writer.abort();
        tracing::debug!(client = %client_id, "api client disconnected");
    }
}
