//! # Abstract Submission API
//!
//! Authors see and edit their own abstracts; admins see all and review.
//!
//! - **POST `/v1/abstracts`**: submit, 201 with the assigned code
//! - **GET `/v1/abstracts`**: own abstracts, or all for an admin
//! - **GET `/v1/abstracts/:code`**
//! - **PATCH `/v1/abstracts/:code`**: edit until finalized
//! - **PUT `/v1/abstracts/:code/file?file_name`**: raw body, pdf/doc/docx
//! - **GET `/v1/abstracts/:code/file`**: the attached document
//! - **DELETE `/v1/abstracts/:code/file`**
//! - **POST `/v1/abstracts/:code/finalize`**: lock against edits
//! - **PUT `/v1/abstracts/:code/review`**: admin decision

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use confreg_core::{AbstractReview, AbstractSubmission, AbstractUpdate, NewAbstract};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query};
use crate::routes::DocumentParams;
use crate::services::abstracts;
use crate::state::AppState;

/// Build the router. Documents may be up to `max_upload_bytes`.
pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/v1/abstracts", post(submit).get(list))
        .route("/v1/abstracts/:code", get(get_abstract).patch(update))
        .route(
            "/v1/abstracts/:code/file",
            put(attach)
                .layer(DefaultBodyLimit::max(max_upload_bytes))
                .get(document)
                .delete(remove_document),
        )
        .route("/v1/abstracts/:code/finalize", post(finalize))
        .route("/v1/abstracts/:code/review", put(review))
}

/// POST /v1/abstracts: Submit an abstract.
#[utoipa::path(
    post,
    path = "/v1/abstracts",
    request_body(content = Object, description = "Title, theme, presenting type, authors and main body"),
    responses(
        (status = 201, description = "Abstract submitted"),
        (status = 400, description = "Missing or invalid field", body = crate::error::ErrorBody),
        (status = 404, description = "Caller is not a registrant", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "abstracts"
)]
async fn submit(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<NewAbstract>, JsonRejection>,
) -> Result<(StatusCode, Json<AbstractSubmission>), AppError> {
    let input = extract_json(body)?;
    let submission = abstracts::submit(&state, &caller, input).await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

/// GET /v1/abstracts: Visible abstracts, oldest first.
#[utoipa::path(
    get,
    path = "/v1/abstracts",
    responses((status = 200, description = "Abstract list")),
    security(("bearer_auth" = [])),
    tag = "abstracts"
)]
async fn list(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<Vec<AbstractSubmission>>, AppError> {
    Ok(Json(abstracts::list(&state, &caller)?))
}

/// GET /v1/abstracts/:code
#[utoipa::path(
    get,
    path = "/v1/abstracts/{code}",
    params(("code" = String, Path, description = "Abstract code, e.g. ABS_000123")),
    responses(
        (status = 200, description = "Abstract found"),
        (status = 403, description = "Not the author", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown code", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "abstracts"
)]
async fn get_abstract(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(code): Path<String>,
) -> Result<Json<AbstractSubmission>, AppError> {
    Ok(Json(abstracts::get(&state, &caller, &code)?))
}

/// PATCH /v1/abstracts/:code: Edit an unfinalized abstract.
#[utoipa::path(
    patch,
    path = "/v1/abstracts/{code}",
    params(("code" = String, Path, description = "Abstract code")),
    request_body(content = Object, description = "Any subset of the submission fields"),
    responses(
        (status = 200, description = "Updated abstract"),
        (status = 400, description = "Unknown or invalid field", body = crate::error::ErrorBody),
        (status = 403, description = "Not the author", body = crate::error::ErrorBody),
        (status = 409, description = "Abstract is finalized", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "abstracts"
)]
async fn update(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(code): Path<String>,
    body: Result<Json<AbstractUpdate>, JsonRejection>,
) -> Result<Json<AbstractSubmission>, AppError> {
    let update = extract_json(body)?;
    Ok(Json(abstracts::update(&state, &caller, &code, update).await?))
}

/// PUT /v1/abstracts/:code/file: Attach or replace the document.
#[utoipa::path(
    put,
    path = "/v1/abstracts/{code}/file",
    params(("code" = String, Path, description = "Abstract code"), DocumentParams),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Document attached"),
        (status = 400, description = "Unsupported type or empty body", body = crate::error::ErrorBody),
        (status = 409, description = "Abstract is finalized", body = crate::error::ErrorBody),
        (status = 413, description = "File too large"),
    ),
    security(("bearer_auth" = [])),
    tag = "abstracts"
)]
async fn attach(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(code): Path<String>,
    params: Result<Query<DocumentParams>, QueryRejection>,
    body: Bytes,
) -> Result<Json<AbstractSubmission>, AppError> {
    let params = extract_query(params)?;
    Ok(Json(
        abstracts::attach_document(&state, &caller, &code, &params.file_name, &body).await?,
    ))
}

/// GET /v1/abstracts/:code/file: Stream the attached document.
#[utoipa::path(
    get,
    path = "/v1/abstracts/{code}/file",
    params(("code" = String, Path, description = "Abstract code")),
    responses(
        (status = 200, description = "File contents"),
        (status = 404, description = "No document", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "abstracts"
)]
async fn document(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    let doc = abstracts::open_document(&state, &caller, &code).await?;
    Ok(super::attachment(&doc.file_name, doc.handle, doc.len))
}

/// DELETE /v1/abstracts/:code/file
#[utoipa::path(
    delete,
    path = "/v1/abstracts/{code}/file",
    params(("code" = String, Path, description = "Abstract code")),
    responses(
        (status = 200, description = "Document removed"),
        (status = 409, description = "Abstract is finalized", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "abstracts"
)]
async fn remove_document(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(code): Path<String>,
) -> Result<Json<AbstractSubmission>, AppError> {
    Ok(Json(abstracts::remove_document(&state, &caller, &code).await?))
}

/// POST /v1/abstracts/:code/finalize: Lock the abstract. Needs a document.
#[utoipa::path(
    post,
    path = "/v1/abstracts/{code}/finalize",
    params(("code" = String, Path, description = "Abstract code")),
    responses(
        (status = 200, description = "Abstract finalized"),
        (status = 400, description = "No document attached", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "abstracts"
)]
async fn finalize(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(code): Path<String>,
) -> Result<Json<AbstractSubmission>, AppError> {
    Ok(Json(abstracts::finalize(&state, &caller, &code).await?))
}

/// PUT /v1/abstracts/:code/review: Approve or reject.
#[utoipa::path(
    put,
    path = "/v1/abstracts/{code}/review",
    params(("code" = String, Path, description = "Abstract code")),
    request_body(content = Object, description = "status (Approved or Rejected) and optional remarks"),
    responses(
        (status = 200, description = "Decision recorded"),
        (status = 400, description = "Invalid decision", body = crate::error::ErrorBody),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "abstracts"
)]
async fn review(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(code): Path<String>,
    body: Result<Json<AbstractReview>, JsonRejection>,
) -> Result<Json<AbstractSubmission>, AppError> {
    let review = extract_json(body)?;
    Ok(Json(abstracts::review(&state, &caller, &code, review).await?))
}
