//! # Full Paper API
//!
//! A paper extends one of the caller's abstracts and shares its code.
//!
//! - **POST `/v1/papers`**: submit, 201
//! - **GET `/v1/papers`**: own papers, or all for an admin
//! - **GET `/v1/papers/:code`**
//! - **DELETE `/v1/papers/:code`**: admin
//! - **PUT `/v1/papers/:code/file?file_name`**: the manuscript, before review
//! - **PUT `/v1/papers/:code/revision?file_name`**: a revision, after review
//! - **GET `/v1/papers/:code/file`**: the latest document
//! - **PUT `/v1/papers/:code/review`**: admin review

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use confreg_core::{NewPaper, Paper, PaperReview};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query};
use crate::routes::DocumentParams;
use crate::services::papers::{self, Upload};
use crate::state::AppState;

/// Build the router. Documents may be up to `max_upload_bytes`.
pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/v1/papers", post(submit).get(list))
        .route("/v1/papers/:code", get(get_paper).delete(delete_paper))
        .route(
            "/v1/papers/:code/file",
            put(upload_manuscript)
                .layer(DefaultBodyLimit::max(max_upload_bytes))
                .get(document),
        )
        .route(
            "/v1/papers/:code/revision",
            put(upload_revision).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/v1/papers/:code/review", put(review))
}

/// POST /v1/papers: Submit a paper for one of the caller's abstracts.
#[utoipa::path(
    post,
    path = "/v1/papers",
    request_body(content = Object, description = "abstract_code, title, abstract, keywords, track, authors"),
    responses(
        (status = 201, description = "Paper submitted"),
        (status = 400, description = "Missing or invalid field", body = crate::error::ErrorBody),
        (status = 403, description = "Abstract belongs to someone else", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown abstract", body = crate::error::ErrorBody),
        (status = 409, description = "Paper exists or abstract was rejected", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "papers"
)]
async fn submit(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<NewPaper>, JsonRejection>,
) -> Result<(StatusCode, Json<Paper>), AppError> {
    let input = extract_json(body)?;
    let paper = papers::submit(&state, &caller, input).await?;
    Ok((StatusCode::CREATED, Json(paper)))
}

/// GET /v1/papers: Visible papers.
#[utoipa::path(
    get,
    path = "/v1/papers",
    responses((status = 200, description = "Paper list")),
    security(("bearer_auth" = [])),
    tag = "papers"
)]
async fn list(State(state): State<AppState>, caller: CallerIdentity) -> Result<Json<Vec<Paper>>, AppError> {
    Ok(Json(papers::list(&state, &caller)?))
}

/// GET /v1/papers/:code
#[utoipa::path(
    get,
    path = "/v1/papers/{code}",
    params(("code" = String, Path, description = "Paper code")),
    responses(
        (status = 200, description = "Paper found"),
        (status = 403, description = "Not the author", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown code", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "papers"
)]
async fn get_paper(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(code): Path<String>,
) -> Result<Json<Paper>, AppError> {
    Ok(Json(papers::get(&state, &caller, &code)?))
}

/// DELETE /v1/papers/:code: Remove a paper and its files.
#[utoipa::path(
    delete,
    path = "/v1/papers/{code}",
    params(("code" = String, Path, description = "Paper code")),
    responses(
        (status = 204, description = "Paper deleted"),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown code", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "papers"
)]
async fn delete_paper(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(code): Path<String>,
) -> Result<StatusCode, AppError> {
    papers::delete(&state, &caller, &code).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn upload(
    state: AppState,
    caller: CallerIdentity,
    code: String,
    kind: Upload,
    params: Result<Query<DocumentParams>, QueryRejection>,
    body: Bytes,
) -> Result<Json<Paper>, AppError> {
    let params = extract_query(params)?;
    Ok(Json(
        papers::upload(&state, &caller, &code, kind, &params.file_name, &body).await?,
    ))
}

/// PUT /v1/papers/:code/file: Upload the manuscript.
#[utoipa::path(
    put,
    path = "/v1/papers/{code}/file",
    params(("code" = String, Path, description = "Paper code"), DocumentParams),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Manuscript stored"),
        (status = 400, description = "Unsupported type or empty body", body = crate::error::ErrorBody),
        (status = 409, description = "Review has started", body = crate::error::ErrorBody),
        (status = 413, description = "File too large"),
    ),
    security(("bearer_auth" = [])),
    tag = "papers"
)]
async fn upload_manuscript(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(code): Path<String>,
    params: Result<Query<DocumentParams>, QueryRejection>,
    body: Bytes,
) -> Result<Json<Paper>, AppError> {
    upload(state, caller, code, Upload::Manuscript, params, body).await
}

/// PUT /v1/papers/:code/revision: Upload a revised manuscript.
#[utoipa::path(
    put,
    path = "/v1/papers/{code}/revision",
    params(("code" = String, Path, description = "Paper code"), DocumentParams),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Revision stored"),
        (status = 400, description = "Unsupported type or empty body", body = crate::error::ErrorBody),
        (status = 409, description = "Paper rejected or no manuscript yet", body = crate::error::ErrorBody),
        (status = 413, description = "File too large"),
    ),
    security(("bearer_auth" = [])),
    tag = "papers"
)]
async fn upload_revision(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(code): Path<String>,
    params: Result<Query<DocumentParams>, QueryRejection>,
    body: Bytes,
) -> Result<Json<Paper>, AppError> {
    upload(state, caller, code, Upload::Revision, params, body).await
}

/// GET /v1/papers/:code/file: Stream the revision, or the manuscript when unrevised.
#[utoipa::path(
    get,
    path = "/v1/papers/{code}/file",
    params(("code" = String, Path, description = "Paper code")),
    responses(
        (status = 200, description = "File contents"),
        (status = 404, description = "No document", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "papers"
)]
async fn document(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(code): Path<String>,
) -> Result<Response, AppError> {
    let doc = papers::open_document(&state, &caller, &code).await?;
    Ok(super::attachment(&doc.file_name, doc.handle, doc.len))
}

/// PUT /v1/papers/:code/review: Record a review; the recommendation sets the status.
#[utoipa::path(
    put,
    path = "/v1/papers/{code}/review",
    params(("code" = String, Path, description = "Paper code")),
    request_body(content = Object, description = "reviewer_name, comments, scores (0-10) and recommendation"),
    responses(
        (status = 200, description = "Review recorded"),
        (status = 400, description = "Invalid review", body = crate::error::ErrorBody),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "papers"
)]
async fn review(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(code): Path<String>,
    body: Result<Json<PaperReview>, JsonRejection>,
) -> Result<Json<Paper>, AppError> {
    let review = extract_json(body)?;
    Ok(Json(papers::review(&state, &caller, &code, review).await?))
}
