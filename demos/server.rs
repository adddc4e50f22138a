//! Simple REST API server example for the ticketing engine.
//!
//! Run with: `cargo run --example server`
//!
//! ## Endpoints
//!
//! - `POST /ticket-types` - Register a ticket type
//! - `GET /ticket-types` - List inventory
//! - `POST /orders` - Place an order
//! - `POST /orders/:id/confirm` - Confirm payment
//! - `POST /orders/:id/cancel` - Cancel an order
//! - `GET /orders/:id` - Get an order
//! - `POST /check-ins` - Scan a QR code at the gate
//! - `POST /sessions` - Create or update a session (room conflict checked)
//! - `GET /check-ins` - Drain the acceptance log in order
//!
//! ## Example Usage
//!
//! ```bash
//! # Register a pool of 100 tickets
//! curl -X POST http://localhost:3000/ticket-types \
//!   -H "Content-Type: application/json" \
//!   -d '{"id": 1, "event_id": 1, "price": "25.00", "quantity_total": 100,
//!        "sales_start": "2026-01-01T00:00:00Z", "sales_end": "2027-01-01T00:00:00Z"}'
//!
//! # Buy two tickets
//! curl -X POST http://localhost:3000/orders \
//!   -H "Content-Type: application/json" \
//!   -d '{"event_id": 1, "buyer": "ada@example.com",
//!        "line_items": [{"ticket_type_id": 1, "quantity": 2, "attendee": "Ada"}]}'
//!
//! # Scan a ticket
//! curl -X POST http://localhost:3000/check-ins \
//!   -H "Content-Type: application/json" \
//!   -d '{"qr_code": "<from the order response>", "scanner": "gate-a"}'
//! ```

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use boxoffice_rs::{
    CheckInOutcome, CreateOrderOutcome, Engine, EngineError, EventId, LineItem, OrderId,
    ScheduleOutcome, Session, TicketTypeDef,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;

// === Request DTOs ===

/// Request body for placing an order.
///
/// ```json
/// {"event_id": 1, "buyer": "ada@example.com",
///  "line_items": [{"ticket_type_id": 1, "quantity": 2, "attendee": "Ada"}]}
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub event_id: u32,
    pub buyer: String,
    pub line_items: Vec<LineItem>,
}

/// Request body for a gate scan.
#[derive(Debug, Deserialize)]
pub struct CheckInRequest {
    pub qr_code: String,
    pub scanner: String,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the ticketing engine.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

// === Error Handling ===

/// Wrapper for converting `EngineError` into HTTP responses.
pub struct AppError(EngineError);

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            EngineError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
            EngineError::UnknownTicketType(_) => (StatusCode::NOT_FOUND, "UNKNOWN_TICKET_TYPE"),
            EngineError::UnknownOrder(_) => (StatusCode::NOT_FOUND, "UNKNOWN_ORDER"),
            EngineError::UnknownSession(_) => (StatusCode::NOT_FOUND, "UNKNOWN_SESSION"),
            EngineError::DuplicateTicketType(_) => (StatusCode::CONFLICT, "DUPLICATE_TICKET_TYPE"),
            EngineError::DuplicateAcceptance(_) => (StatusCode::CONFLICT, "DUPLICATE_ACCEPTANCE"),
            EngineError::InvalidState { .. } => (StatusCode::CONFLICT, "INVALID_STATE"),
            EngineError::Contention { .. } => (StatusCode::SERVICE_UNAVAILABLE, "CONTENTION"),
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

// === Handlers ===

/// POST /ticket-types - Register a ticket type.
async fn register_ticket_type(
    State(state): State<AppState>,
    Json(def): Json<TicketTypeDef>,
) -> Result<StatusCode, AppError> {
    state.engine.register_ticket_type(def)?;
    Ok(StatusCode::CREATED)
}

/// GET /ticket-types - List inventory counters.
async fn list_ticket_types(State(state): State<AppState>) -> Response {
    Json(state.engine.ticket_types()).into_response()
}

/// POST /orders - Place an order. 201 on placement, 409 with the denial on
/// sold-out or closed sales window.
async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Response, AppError> {
    let outcome = state.engine.create_order(
        EventId(request.event_id),
        &request.buyer,
        &request.line_items,
    )?;
    let response = match &outcome {
        CreateOrderOutcome::Placed(_) => (StatusCode::CREATED, Json(outcome)).into_response(),
        CreateOrderOutcome::Denied { .. } => {
            (StatusCode::CONFLICT, Json(outcome)).into_response()
        }
    };
    Ok(response)
}

/// GET /orders/:id - Get an order with its tickets.
async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Response, AppError> {
    let snapshot = state
        .engine
        .order(&OrderId(id))
        .ok_or(EngineError::UnknownOrder(OrderId(id)))?;
    Ok(Json(snapshot).into_response())
}

/// POST /orders/:id/confirm - Confirm payment.
async fn confirm_order(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Response, AppError> {
    let snapshot = state.engine.confirm_payment(OrderId(id))?;
    Ok(Json(snapshot).into_response())
}

/// POST /orders/:id/cancel - Cancel an order and return its inventory.
async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Response, AppError> {
    let snapshot = state.engine.cancel_order(OrderId(id))?;
    Ok(Json(snapshot).into_response())
}

/// POST /check-ins - Validate a scan. 200 on acceptance, 409 with the
/// rejection reason otherwise.
async fn check_in(
    State(state): State<AppState>,
    Json(request): Json<CheckInRequest>,
) -> Result<Response, AppError> {
    let outcome = state.engine.check_in(&request.qr_code, &request.scanner)?;
    let status = match &outcome {
        CheckInOutcome::Accepted(_) => StatusCode::OK,
        CheckInOutcome::Rejected(_) => StatusCode::CONFLICT,
    };
    Ok((status, Json(outcome)).into_response())
}

/// GET /check-ins - Drain accepted scans in acceptance order.
async fn list_check_ins(State(state): State<AppState>) -> Response {
    let records: Vec<_> = state
        .engine
        .check_ins()
        .drain_ordered()
        .iter()
        .map(|record| record.as_ref().clone())
        .collect();
    Json(records).into_response()
}

/// POST /sessions - Create or update a session. 200 on a free slot, 409 with
/// the conflicting session id otherwise.
async fn upsert_session(
    State(state): State<AppState>,
    Json(session): Json<Session>,
) -> Result<Response, AppError> {
    let outcome = state.engine.upsert_session(session)?;
    let status = match &outcome {
        ScheduleOutcome::Clear => StatusCode::OK,
        ScheduleOutcome::Conflict { .. } => StatusCode::CONFLICT,
    };
    Ok((status, Json(outcome)).into_response())
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ticket-types", post(register_ticket_type).get(list_ticket_types))
        .route("/orders", post(create_order))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/confirm", post(confirm_order))
        .route("/orders/{id}/cancel", post(cancel_order))
        .route("/check-ins", post(check_in).get(list_check_ins))
        .route("/sessions", post(upsert_session))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    let state = AppState {
        engine: Arc::new(Engine::new()),
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
    println!("Boxoffice API server running on http://127.0.0.1:3000");
    println!();
    println!("Endpoints:");
    println!("  POST /ticket-types        - Register a ticket type");
    println!("  GET  /ticket-types        - List inventory");
    println!("  POST /orders              - Place an order");
    println!("  POST /orders/:id/confirm  - Confirm payment");
    println!("  POST /orders/:id/cancel   - Cancel an order");
    println!("  GET  /orders/:id          - Get an order");
    println!("  POST /check-ins           - Scan a ticket");
    println!("  GET  /check-ins           - Drain the acceptance log");
    println!("  POST /sessions            - Schedule a session");

    axum::serve(listener, app).await.unwrap();
}
