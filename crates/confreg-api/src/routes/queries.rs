//! # Contact Form API
//!
//! - **POST `/v1/queries`**: forward a visitor question to the organisers

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use crate::error::AppError;
use crate::extractors::extract_validated_json;
use crate::routes::downloads::MessageResponse;
use crate::services::queries::{self, QueryRequest};
use crate::state::AppState;

pub fn public_router() -> Router<AppState> {
    Router::new().route("/v1/queries", post(submit_query))
}

/// POST /v1/queries: Forward a question and acknowledge it.
#[utoipa::path(
    post,
    path = "/v1/queries",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Question forwarded", body = MessageResponse),
        (status = 400, description = "Missing field or invalid email", body = crate::error::ErrorBody),
        (status = 502, description = "Mail delivery failed", body = crate::error::ErrorBody),
        (status = 503, description = "No organiser inbox configured", body = crate::error::ErrorBody),
    ),
    tag = "queries"
)]
async fn submit_query(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let query = extract_validated_json(body)?;
    queries::submit(&state, query).await?;
    Ok(Json(MessageResponse {
        message: "Your query has been sent".to_string(),
    }))
}
