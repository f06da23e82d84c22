//! Axum HTTP server for the broker gateway.
//!
//! Caller routes submit authorization requests; the approval UI lists,
//! streams, answers and cancels pending prompts. The two sides hold
//! different bearer tokens, so a caller can never answer its own prompt.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
};
use tokio::sync::{RwLock, oneshot};
use tokio_stream::StreamExt;
use tower_http::cors::{AllowHeaders, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::broker::{AuthorizationBroker, RequestEnvelope, Response as BrokerResponse};
use crate::channels::web::auth::{AuthState, auth_middleware};
use crate::channels::web::types::*;
use crate::error::{ChannelError, PromptError};
use crate::permissions::PermissionStore;
use crate::prompt::{PromptEvent, PromptHub, PromptReply};

/// Shared state for all gateway handlers.
pub struct GatewayState {
    pub broker: Arc<AuthorizationBroker>,
    pub prompts: Arc<PromptHub>,
    pub permissions: Arc<PermissionStore>,
    /// Shutdown signal sender.
    pub shutdown_tx: RwLock<Option<oneshot::Sender<()>>>,
}

impl GatewayState {
    pub fn new(
        broker: Arc<AuthorizationBroker>,
        prompts: Arc<PromptHub>,
        permissions: Arc<PermissionStore>,
    ) -> Self {
        Self {
            broker,
            prompts,
            permissions,
            shutdown_tx: RwLock::new(None),
        }
    }
}

/// Bearer tokens for the two sides of the gateway.
#[derive(Debug, Clone)]
pub struct GatewayTokens {
    /// Accepted on `POST /api/requests` only.
    pub caller: String,
    /// Accepted on the prompt and permission routes only.
    pub ui: String,
}

/// Build the router. `addr` is the address the gateway is reachable on,
/// used to restrict CORS to the local origin.
pub fn build_router(state: Arc<GatewayState>, tokens: GatewayTokens, addr: SocketAddr) -> Router {
    let caller_auth = AuthState {
        token: tokens.caller,
    };
    let ui_auth = AuthState { token: tokens.ui };

    // Public routes (no auth)
    let public = Router::new().route("/api/health", get(health_handler));

    // Caller routes (caller token)
    let caller = Router::new()
        .route("/api/requests", post(submit_request_handler))
        .route_layer(middleware::from_fn_with_state(caller_auth, auth_middleware));

    // Approval UI routes (UI token)
    let ui = Router::new()
        .route("/api/prompts", get(prompts_list_handler))
        .route("/api/prompts/events", get(prompt_events_handler))
        .route("/api/prompts/{correlation_id}", post(prompt_reply_handler))
        .route(
            "/api/prompts/{correlation_id}/cancel",
            post(prompt_cancel_handler),
        )
        .route("/api/permissions", get(permissions_list_handler))
        .route_layer(middleware::from_fn_with_state(ui_auth, auth_middleware));

    // CORS: only localhost origins, since the broker is a local-first service.
    let origins: Vec<HeaderValue> = [
        format!("http://{}:{}", addr.ip(), addr.port()),
        format!("http://localhost:{}", addr.port()),
    ]
    .iter()
    .filter_map(|origin| origin.parse().ok())
    .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
        ]))
        .allow_credentials(true);

    Router::new()
        .merge(public)
        .merge(caller)
        .merge(ui)
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB max request body
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
///
/// Returns the actual bound `SocketAddr` (useful when binding to port 0).
pub async fn start_server(
    addr: SocketAddr,
    state: Arc<GatewayState>,
    tokens: GatewayTokens,
) -> Result<SocketAddr, ChannelError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ChannelError::StartupFailed {
            name: "gateway".to_string(),
            reason: format!("Failed to bind to {}: {}", addr, e),
        })?;
    let bound_addr = listener
        .local_addr()
        .map_err(|e| ChannelError::StartupFailed {
            name: "gateway".to_string(),
            reason: format!("Failed to get local addr: {}", e),
        })?;

    let app = build_router(Arc::clone(&state), tokens, bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    *state.shutdown_tx.write().await = Some(shutdown_tx);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Gateway shutting down");
            })
            .await
        {
            tracing::error!("Gateway server error: {}", e);
        }
    });

    Ok(bound_addr)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        channel: "gateway".to_string(),
    })
}

/// Runs the request to completion. If the caller disconnects, the handler
/// future is dropped, which withdraws any pending prompt.
async fn submit_request_handler(
    State(state): State<Arc<GatewayState>>,
    Json(envelope): Json<RequestEnvelope>,
) -> Json<BrokerResponse> {
    Json(state.broker.handle(envelope).await)
}

async fn prompts_list_handler(State(state): State<Arc<GatewayState>>) -> Json<PromptListResponse> {
    Json(PromptListResponse {
        prompts: state.prompts.pending(),
    })
}

async fn prompt_events_handler(
    State(state): State<Arc<GatewayState>>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    // Subscribe before snapshotting so no prompt falls between the two.
    let rx = state.prompts.subscribe();
    let backlog: Vec<PromptEvent> = state
        .prompts
        .pending()
        .into_iter()
        .map(|prompt| PromptEvent::Opened { prompt })
        .collect();

    let backlog_stream = futures::stream::iter(backlog).map(to_sse_event);
    let live_stream = tokio_stream::wrappers::BroadcastStream::new(rx)
        .filter_map(|result| result.ok())
        .map(to_sse_event);

    Sse::new(backlog_stream.chain(live_stream)).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(30))
            .text(""),
    )
}

fn to_sse_event(event: PromptEvent) -> Result<Event, Infallible> {
    let data = serde_json::to_string(&event).unwrap_or_default();
    Ok(Event::default().event(event.name()).data(data))
}

async fn prompt_reply_handler(
    State(state): State<Arc<GatewayState>>,
    Path(correlation_id): Path<String>,
    Json(body): Json<PromptDecisionRequest>,
) -> Result<Json<ActionResponse>, (StatusCode, String)> {
    if let Some(body_id) = &body.correlation_id
        && *body_id != correlation_id
    {
        return Err((
            StatusCode::BAD_REQUEST,
            "correlationId in body does not match path".to_string(),
        ));
    }

    let confirm = body.confirm;
    state
        .prompts
        .respond(PromptReply {
            correlation_id,
            confirm,
            remember_permission: body.remember_permission,
        })
        .map_err(prompt_error_status)?;

    Ok(Json(ActionResponse::ok(if confirm {
        "Approved"
    } else {
        "Denied"
    })))
}

async fn prompt_cancel_handler(
    State(state): State<Arc<GatewayState>>,
    Path(correlation_id): Path<String>,
) -> Result<Json<ActionResponse>, (StatusCode, String)> {
    state
        .prompts
        .cancel(&correlation_id)
        .map_err(prompt_error_status)?;
    Ok(Json(ActionResponse::ok("Cancelled")))
}

async fn permissions_list_handler(
    State(state): State<Arc<GatewayState>>,
) -> Json<PermissionListResponse> {
    Json(PermissionListResponse {
        permissions: state.permissions.list().await,
    })
}

fn prompt_error_status(err: PromptError) -> (StatusCode, String) {
    let status = match err {
        PromptError::UnknownRequest { .. } => StatusCode::NOT_FOUND,
        PromptError::Duplicate { .. } => StatusCode::CONFLICT,
    };
    (status, err.to_string())
}
