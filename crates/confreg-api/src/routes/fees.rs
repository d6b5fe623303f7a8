//! # Fee Quote API
//!
//! - **GET `/v1/fees/quote`**: itemised breakdown for a selection, priced
//!   with the same calculator the payment endpoints use.

use axum::extract::rejection::QueryRejection;
use axum::extract::Query;
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use confreg_core::{quote, CategorySelection, FeeQuote, PaymentMode};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::AppError;
use crate::extractors::extract_query;
use crate::services::payments::today;
use crate::state::AppState;

/// Query parameters for a quote.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct QuoteParams {
    /// Comma-separated `Category:CURRENCY` pairs, e.g.
    /// `Student / Participant:INR,Accompanying Person:INR`.
    pub items: String,
    /// `online` or `offline` (default).
    pub mode: Option<String>,
    /// Price as of this date (`YYYY-MM-DD`). Defaults to today.
    pub date: Option<NaiveDate>,
}

/// Split `items` into selections.
pub fn parse_items(items: &str) -> Result<Vec<CategorySelection>, AppError> {
    let selection: Vec<CategorySelection> = items
        .split(',')
        .filter(|item| !item.trim().is_empty())
        .map(|item| {
            let (category, currency) = item.rsplit_once(':').ok_or_else(|| {
                AppError::Validation(format!("item '{}' must be Category:CURRENCY", item.trim()))
            })?;
            Ok(CategorySelection {
                category: category.trim().to_string(),
                currency: currency.trim().to_string(),
            })
        })
        .collect::<Result<_, AppError>>()?;
    if selection.is_empty() {
        return Err(AppError::Validation("items must name at least one category".into()));
    }
    Ok(selection)
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/v1/fees/quote", get(get_quote))
}

/// GET /v1/fees/quote: Price a selection without creating anything.
#[utoipa::path(
    get,
    path = "/v1/fees/quote",
    params(QuoteParams),
    responses(
        (status = 200, description = "Itemised fee breakdown"),
        (status = 400, description = "Malformed selection", body = crate::error::ErrorBody),
    ),
    tag = "fees"
)]
async fn get_quote(
    params: Result<Query<QuoteParams>, QueryRejection>,
) -> Result<Json<FeeQuote>, AppError> {
    let params = extract_query(params)?;
    let selection = parse_items(&params.items)?;
    let date = params.date.unwrap_or_else(today);
    Ok(Json(quote(
        &selection,
        date,
        PaymentMode::from_client(params.mode.as_deref()),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app() -> Router {
        public_router().with_state(AppState::new())
    }

    #[tokio::test]
    async fn quote_prices_each_line() {
        let uri = "/v1/fees/quote?items=Student%20%2F%20Participant%3AINR%2CAccompanying%20Person%3AUSD&mode=online&date=2025-07-01";
        let resp = test_app()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let quote: FeeQuote = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(quote.lines.len(), 2);
        assert_eq!(quote.lines[0].total_amount, 4840);
        assert_eq!(quote.total, quote.lines.iter().map(|l| l.total_amount).sum::<u64>());
    }

    #[tokio::test]
    async fn missing_items_is_bad_request() {
        let resp = test_app()
            .oneshot(Request::get("/v1/fees/quote").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn parse_items_rejects_missing_currency() {
        assert!(matches!(parse_items("Student / Speaker"), Err(AppError::Validation(_))));
        assert!(matches!(parse_items(" , "), Err(AppError::Validation(_))));
        let parsed = parse_items("Student / Speaker:usd").unwrap();
        assert_eq!(parsed[0].currency, "usd");
    }
}
