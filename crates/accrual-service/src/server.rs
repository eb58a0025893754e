//! HTTP server for the order intake API.

use crate::apis::orders::SubmitOrderRequest;
use crate::apis::users::BalanceResponse;
use crate::apis::{self, ApiError};
use accrual_config::ApiConfig;
use accrual_storage::OrderRepository;
use accrual_types::Order;
use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::{IntoResponse, Json, Response},
	routing::{get, post},
	Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Repository shared with the pipeline.
	pub repository: Arc<dyn OrderRepository>,
}

/// Builds the router with every endpoint under `/api`.
pub fn router(state: AppState) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/orders", post(handle_submit_order))
				.route("/orders/{number}", get(handle_get_order))
				.route("/users/{user_id}/orders", get(handle_user_orders))
				.route("/users/{user_id}/balance", get(handle_balance)),
		)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(CorsLayer::permissive()),
		)
		.with_state(state)
}

/// Starts the HTTP server and serves until the listener fails.
pub async fn start_server(
	api_config: ApiConfig,
	repository: Arc<dyn OrderRepository>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(AppState { repository });

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Order intake API starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

/// Handles POST /api/orders requests.
async fn handle_submit_order(
	State(state): State<AppState>,
	Json(request): Json<SubmitOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
	let (status, order) = apis::orders::submit_order(state.repository.as_ref(), request).await?;
	Ok((status, Json(order)))
}

/// Handles GET /api/orders/{number} requests.
async fn handle_get_order(
	Path(number): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<Order>, ApiError> {
	let order = apis::orders::get_order(state.repository.as_ref(), &number).await?;
	Ok(Json(order))
}

/// Handles GET /api/users/{user_id}/orders requests.
///
/// Responds with 204 when the user has no orders.
async fn handle_user_orders(
	Path(user_id): Path<Uuid>,
	State(state): State<AppState>,
) -> Result<Response, ApiError> {
	let orders = apis::users::user_orders(state.repository.as_ref(), user_id).await?;
	if orders.is_empty() {
		return Ok(StatusCode::NO_CONTENT.into_response());
	}
	Ok(Json(orders).into_response())
}

/// Handles GET /api/users/{user_id}/balance requests.
async fn handle_balance(
	Path(user_id): Path<Uuid>,
	State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, ApiError> {
	let balance = apis::users::balance(state.repository.as_ref(), user_id).await?;
	Ok(Json(balance))
}
