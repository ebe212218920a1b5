//! RPC HTTP Server
//!
//! Axum-based HTTP server that handles JSON-RPC requests.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::rpc::methods::{handle_request, JsonRpcRequest, JsonRpcResponse, RpcState};

/// Start the RPC server on the specified port
pub async fn start_rpc_server(state: Arc<RpcState>, port: u16) -> std::io::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", post(handle_rpc))
        .layer(cors)
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "RPC server listening");
    axum::serve(listener, app).await
}

/// Handle incoming JSON-RPC requests
async fn handle_rpc(
    State(state): State<Arc<RpcState>>,
    Json(request): Json<JsonRpcRequest>,
) -> (StatusCode, Json<JsonRpcResponse>) {
    let response = handle_request(&state, request);
    (StatusCode::OK, Json(response))
}
