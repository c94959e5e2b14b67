//! HTTP API server - Axum-based meeting room endpoints

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::queue::TurnQueue;
use crate::store::{Message, NewMessage, Room};

/// Shared state for all handlers
#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<Dispatcher>,
    pub queue: TurnQueue,
    pub default_room_id: i64,
    pub start_time: Instant,
}

/// The meeting room API server
pub struct BoardroomServer {
    state: ApiState,
    bind: SocketAddr,
}

impl BoardroomServer {
    pub fn new(bind: SocketAddr, dispatcher: Arc<Dispatcher>, queue: TurnQueue, default_room_id: i64) -> Self {
        let state = ApiState {
            dispatcher,
            queue,
            default_room_id,
            start_time: Instant::now(),
        };
        Self { state, bind }
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/meeting_rooms", get(list_rooms_handler).post(create_room_handler))
            .route("/messages", get(list_messages_handler).post(post_message_handler))
            .route("/route", post(route_handler))
            .route("/status", get(status_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Start the server (blocks until Ctrl-C)
    pub async fn run(self) -> anyhow::Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.bind).await?;
        info!("Meeting room API listening on {}", self.bind);

        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Shutting down");
            })
            .await?;

        Ok(())
    }
}

/// Error body: `{"detail": "..."}`
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::RoomNotFound(_) => StatusCode::NOT_FOUND,
            Error::RoomExists(_) => StatusCode::CONFLICT,
            Error::InvalidRoutingResponse(_) | Error::Llm(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// ── Handlers ──

#[derive(Debug, Deserialize)]
struct RoomQuery {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    meeting_room_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PostMessageQuery {
    user_name: String,
    text: String,
    role: String,
    meeting_room_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RouteRequest {
    text: String,
}

async fn list_rooms_handler(State(state): State<ApiState>) -> ApiResult<Json<Vec<Room>>> {
    Ok(Json(state.dispatcher.store().rooms().await?))
}

async fn create_room_handler(
    State(state): State<ApiState>,
    Query(query): Query<RoomQuery>,
) -> ApiResult<Json<Room>> {
    Ok(Json(state.dispatcher.store().create_room(query.id).await?))
}

async fn list_messages_handler(
    State(state): State<ApiState>,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    let room_id = query.meeting_room_id.unwrap_or(state.default_room_id);
    Ok(Json(state.dispatcher.store().list(room_id).await?))
}

async fn post_message_handler(
    State(state): State<ApiState>,
    Query(query): Query<PostMessageQuery>,
) -> ApiResult<Json<Message>> {
    let room_id = query.meeting_room_id.unwrap_or(state.default_room_id);
    let message = state
        .dispatcher
        .store()
        .append(NewMessage::new(query.user_name, query.text, query.role, room_id))
        .await?;

    if message.role == state.dispatcher.principal_role() {
        state.queue.submit(message.id)?;
    }
    Ok(Json(message))
}

async fn route_handler(
    State(state): State<ApiState>,
    Json(request): Json<RouteRequest>,
) -> ApiResult<impl IntoResponse> {
    let agent = state.dispatcher.route(&request.text).await?;
    Ok(Json(json!({ "role": agent.role(), "name": agent.name() })))
}

async fn status_handler(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    let rooms = state.dispatcher.store().rooms().await?;
    let messages: usize = rooms.iter().map(|r| r.messages.len()).sum();

    Ok(Json(json!({
        "status": "ok",
        "principal_role": state.dispatcher.principal_role(),
        "agents": state.dispatcher.registry().roles(),
        "rooms": rooms.len(),
        "messages": messages,
        "turns_in_flight": state.dispatcher.in_flight(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    })))
}
