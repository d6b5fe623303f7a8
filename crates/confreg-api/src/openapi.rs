//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI spec,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Adds the bearer token security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Token from /v1/users/login or /v1/admin/login.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Conference Registration API",
        version = "0.1.0",
        description = "Registration, fee quotes, payment recording and webhooks, OTP-gated downloads, abstract and paper submission, and invitation letters."
    ),
    paths(
        // Fees
        crate::routes::fees::get_quote,
        // Users
        crate::routes::users::register,
        crate::routes::users::login,
        crate::routes::users::admin_login,
        crate::routes::users::list_users,
        crate::routes::users::get_user,
        crate::routes::users::update_user,
        crate::routes::users::list_payments,
        crate::routes::users::check_email,
        crate::routes::users::request_password_reset,
        crate::routes::users::confirm_password_reset,
        // Invitations
        crate::routes::invitations::get_invitation,
        crate::routes::invitations::save_invitation,
        crate::routes::invitations::abstract_title,
        // Abstracts
        crate::routes::abstracts::submit,
        crate::routes::abstracts::list,
        crate::routes::abstracts::get_abstract,
        crate::routes::abstracts::update,
        crate::routes::abstracts::attach,
        crate::routes::abstracts::document,
        crate::routes::abstracts::remove_document,
        crate::routes::abstracts::finalize,
        crate::routes::abstracts::review,
        // Papers
        crate::routes::papers::submit,
        crate::routes::papers::list,
        crate::routes::papers::get_paper,
        crate::routes::papers::delete_paper,
        crate::routes::papers::upload_manuscript,
        crate::routes::papers::upload_revision,
        crate::routes::papers::document,
        crate::routes::papers::review,
        // Queries
        crate::routes::queries::submit_query,
        // Payments
        crate::routes::payments::create_order,
        crate::routes::payments::save_payment,
        crate::routes::payments::bank_transfer,
        crate::routes::payments::upload_receipt,
        crate::routes::payments::receipt,
        crate::routes::payments::payment_failed,
        crate::routes::payments::phonepe_initiate,
        crate::routes::payments::phonepe_status,
        // Webhooks
        crate::routes::webhooks::razorpay_webhook,
        // Downloads
        crate::routes::downloads::list_files,
        crate::routes::downloads::download_link,
        crate::routes::downloads::request_otp,
        crate::routes::downloads::verify_otp,
        crate::routes::downloads::serve_file,
        // Admin
        crate::routes::admin::upload,
        crate::routes::admin::allowed_emails,
        crate::routes::admin::add_email,
        crate::routes::admin::remove_email,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::auth::Role,
        crate::services::users::Session,
        crate::services::payments::CreatedOrder,
        crate::services::payments::SavePayment,
        crate::services::payments::BankTransfer,
        crate::services::payments::PhonePeOutcome,
        crate::services::downloads::DownloadLink,
        crate::services::otp::VerifiedOtp,
        crate::routes::users::LoginRequest,
        crate::routes::users::PasswordResetConfirmation,
        crate::routes::users::EmailCheck,
        crate::services::invitations::AbstractTitle,
        crate::services::queries::QueryRequest,
        crate::routes::payments::ReceiptResponse,
        crate::routes::payments::SelectionRequest,
        crate::routes::payments::FailureNotice,
        crate::routes::payments::BankTransferResponse,
        crate::routes::payments::StatusResponse,
        crate::routes::webhooks::WebhookAck,
        crate::routes::downloads::OtpRequest,
        crate::routes::downloads::OtpVerification,
        crate::routes::downloads::MessageResponse,
        crate::routes::downloads::FileSummary,
        crate::routes::admin::EmailRequest,
        crate::routes::admin::AllowListResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "fees", description = "Fee schedule and quotes"),
        (name = "users", description = "Registration, login and profiles"),
        (name = "payments", description = "Gateway orders, checkout confirmation, bank transfers and PhonePe"),
        (name = "webhooks", description = "Signed payment provider events"),
        (name = "downloads", description = "Allow-listed, OTP-gated file downloads"),
        (name = "admin", description = "Admin login, uploads and the download allow-list"),
        (name = "abstracts", description = "Abstract submission, documents and review"),
        (name = "papers", description = "Full papers, revisions and review"),
        (name = "invitations", description = "Invitation-letter requests"),
        (name = "queries", description = "Contact form"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json: Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_lists_public_and_admin_paths() {
        let spec = ApiDoc::openapi();
        for path in [
            "/v1/fees/quote",
            "/v1/users/{uid}",
            "/v1/webhooks/razorpay",
            "/v1/downloads/file/{file_type}",
            "/v1/downloads/admin/add-email",
            "/v1/abstracts/{code}/file",
            "/v1/papers/{code}/revision",
            "/v1/users/{uid}/invitation",
            "/v1/users/password-reset/confirm",
            "/v1/payments/receipts/{name}",
            "/v1/queries",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn spec_declares_bearer_scheme() {
        let spec = ApiDoc::openapi();
        let components = spec.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
