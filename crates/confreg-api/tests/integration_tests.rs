//! # Integration Tests for confreg-api
//!
//! Drives the assembled router: health probes, fee quotes, registration and
//! bearer auth, payment recording through the client and webhook paths,
//! the admin allow-list, the OTP download flow, abstract and paper
//! submission, invitation requests, password reset, rate limiting, metrics
//! and the OpenAPI document.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;
use zeroize::Zeroizing;

use confreg_api::auth::hash_password;
use confreg_api::config::{AdminCredentials, AppConfig};
use confreg_api::middleware::rate_limit::RateLimitConfig;
use confreg_api::state::AppState;
use confreg_gateway::signature::{sign, WEBHOOK_SIGNATURE_HEADER};

const JWT_SECRET: &str = "integration-jwt-secret";
const WEBHOOK_SECRET: &str = "integration-webhook-secret";
const ADMIN_EMAIL: &str = "office@conf.example";
const ADMIN_PASSWORD: &str = "admin password 1";

fn configured_state(downloads_dir: &std::path::Path) -> AppState {
    let config = AppConfig {
        jwt_secret: Some(Zeroizing::new(JWT_SECRET.into())),
        webhook_secret: Some(Zeroizing::new(WEBHOOK_SECRET.into())),
        admin: Some(AdminCredentials {
            email: ADMIN_EMAIL.into(),
            password_hash: hash_password(ADMIN_PASSWORD).unwrap(),
        }),
        downloads_dir: downloads_dir.to_path_buf(),
        ..AppConfig::default()
    };
    AppState::with_config(config).unwrap()
}

async fn body_json(response: axum::http::Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::http::Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn signup(email: &str) -> serde_json::Value {
    serde_json::json!({
        "email": email,
        "password": "correct horse battery",
        "phone": "9999999999",
        "given_name": "Ada",
        "family_name": "Lovelace",
        "country": "India",
        "affiliation": "IISc"
    })
}

/// Register `email` and log in. Returns (uid, token).
async fn registrant(app: &Router, email: &str) -> (String, String) {
    let resp = app
        .clone()
        .oneshot(json_request("POST", "/v1/users/register", None, signup(email)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let uid = body_json(resp).await["uid"].as_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/users/login",
            None,
            serde_json::json!({"email": email, "password": "correct horse battery"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let token = body_json(resp).await["token"].as_str().unwrap().to_string();
    (uid, token)
}

async fn admin_token(app: &Router) -> String {
    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/admin/login",
            None,
            serde_json::json!({"email": ADMIN_EMAIL, "password": ADMIN_PASSWORD}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    body_json(resp).await["token"].as_str().unwrap().to_string()
}

// -- Health Probes ------------------------------------------------------------

#[tokio::test]
async fn test_liveness_probe() {
    let app = confreg_api::app(AppState::new());
    let resp = app.oneshot(get("/health/liveness", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "ok");
}

#[tokio::test]
async fn test_readiness_probe_without_database() {
    let app = confreg_api::app(AppState::new());
    let resp = app.oneshot(get("/health/readiness", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "ready");
}

// -- Fees ---------------------------------------------------------------------

#[tokio::test]
async fn test_fee_quote_is_public() {
    let dir = tempfile::tempdir().unwrap();
    let app = confreg_api::app(configured_state(dir.path()));
    let resp = app
        .oneshot(get(
            "/v1/fees/quote?items=Speaker%20%2F%20Participant%3AUSD&mode=online&date=2025-12-01",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let quote = body_json(resp).await;
    assert_eq!(quote["period"], "late");
    assert_eq!(quote["total"], 518);
}

// -- Users and auth -----------------------------------------------------------

#[tokio::test]
async fn test_protected_routes_require_token() {
    let dir = tempfile::tempdir().unwrap();
    let app = confreg_api::app(configured_state(dir.path()));
    let resp = app
        .oneshot(json_request(
            "POST",
            "/v1/payments/bank-transfer",
            None,
            serde_json::json!({"transaction_id": "UTR1"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_registrant_reads_only_own_profile() {
    let dir = tempfile::tempdir().unwrap();
    let app = confreg_api::app(configured_state(dir.path()));
    let (ada, ada_token) = registrant(&app, "ada@x.org").await;
    let (bob, _) = registrant(&app, "bob@x.org").await;

    let resp = app
        .clone()
        .oneshot(get(&format!("/v1/users/{ada}"), Some(&ada_token)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["email"], "ada@x.org");

    let resp = app
        .clone()
        .oneshot(get(&format!("/v1/users/{bob}"), Some(&ada_token)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app.oneshot(get("/v1/users", Some(&ada_token))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let app = confreg_api::app(configured_state(dir.path()));
    registrant(&app, "ada@x.org").await;
    let resp = app
        .oneshot(json_request("POST", "/v1/users/register", None, signup("ADA@x.org")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

// -- Payments -----------------------------------------------------------------

#[tokio::test]
async fn test_save_payment_twice_is_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let app = confreg_api::app(configured_state(dir.path()));
    let (uid, token) = registrant(&app, "ada@x.org").await;
    let body = serde_json::json!({
        "razorpay_payment_id": "pay_A1",
        "order_id": "order_A1",
        "categories_selected": [{"key": "Student / Participant", "currency": "INR"}],
        "payment_mode": "online"
    });

    let resp = app
        .clone()
        .oneshot(json_request("POST", "/v1/payments/save", Some(&token), body.clone()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .clone()
        .oneshot(json_request("POST", "/v1/payments/save", Some(&token), body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = app
        .oneshot(get(&format!("/v1/users/{uid}/payments"), Some(&token)))
        .await
        .unwrap();
    let ledger = body_json(resp).await;
    assert_eq!(ledger.as_array().unwrap().len(), 1);
}

fn captured_event(payment_id: &str, email: &str) -> String {
    serde_json::json!({
        "event": "payment.captured",
        "payload": {
            "payment": {
                "entity": {
                    "id": payment_id,
                    "order_id": "order_W1",
                    "currency": "INR",
                    "amount": 484000,
                    "status": "captured",
                    "notes": {
                        "email": email,
                        "categoriesSelected": "[{\"key\":\"Student / Participant\",\"currency\":\"INR\"}]"
                    }
                }
            }
        }
    })
    .to_string()
}

fn webhook(body: &str, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/webhooks/razorpay")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(sig) = signature {
        builder = builder.header(WEBHOOK_SIGNATURE_HEADER, sig);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_webhook_records_payment_once() {
    let dir = tempfile::tempdir().unwrap();
    let state = configured_state(dir.path());
    let app = confreg_api::app(state.clone());
    let (uid, _) = registrant(&app, "ada@x.org").await;

    let body = captured_event("pay_W1", "Ada@X.org");
    let sig = sign(WEBHOOK_SECRET.as_bytes(), body.as_bytes());

    let resp = app.clone().oneshot(webhook(&body, Some(&sig))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["status"], "payment saved");

    let resp = app.clone().oneshot(webhook(&body, Some(&sig))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["status"], "already recorded");

    let uid = uuid::Uuid::parse_str(&uid).unwrap();
    let registrant = state.users.get(&uid).unwrap();
    assert_eq!(registrant.payments.len(), 1);
    assert_eq!(registrant.payments.records()[0].amount_minor, 484000);
}

#[tokio::test]
async fn test_webhook_bad_signature_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = configured_state(dir.path());
    let app = confreg_api::app(state.clone());
    let (uid, _) = registrant(&app, "ada@x.org").await;

    let body = captured_event("pay_W2", "ada@x.org");
    let resp = app.oneshot(webhook(&body, Some("deadbeef"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["status"], "unauthorized");

    let uid = uuid::Uuid::parse_str(&uid).unwrap();
    assert!(state.users.get(&uid).unwrap().payments.is_empty());
}

#[tokio::test]
async fn test_webhook_for_unknown_payer_is_acknowledged() {
    let dir = tempfile::tempdir().unwrap();
    let app = confreg_api::app(configured_state(dir.path()));
    let body = captured_event("pay_W3", "nobody@x.org");
    let sig = sign(WEBHOOK_SECRET.as_bytes(), body.as_bytes());
    let resp = app.oneshot(webhook(&body, Some(&sig))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["status"], "user not found");
}

// -- Downloads ----------------------------------------------------------------

#[tokio::test]
async fn test_otp_for_unlisted_email_sends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let state = configured_state(dir.path());
    let app = confreg_api::app(state.clone());
    let resp = app
        .oneshot(json_request(
            "POST",
            "/v1/downloads/request-otp",
            None,
            serde_json::json!({"email": "stranger@x.org"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(state.otps.is_empty());
    assert!(state.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_admin_upload_then_otp_gated_download() {
    let dir = tempfile::tempdir().unwrap();
    let state = configured_state(dir.path());
    let app = confreg_api::app(state.clone());
    let admin = admin_token(&app).await;

    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/downloads/admin/add-email",
            Some(&admin),
            serde_json::json!({"email": "reader@x.org"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/downloads/admin/upload?file_type=papers-book&file_name=papers.zip")
                .header(header::AUTHORIZATION, format!("Bearer {admin}"))
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .body(Body::from(&b"PK\x03\x04"[..]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/downloads/request-otp",
            None,
            serde_json::json!({"email": "reader@x.org"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let code = state.otps.get(&"reader@x.org".to_string()).unwrap().code;

    let verify = serde_json::json!({"email": "reader@x.org", "otp": code});
    let resp = app
        .clone()
        .oneshot(json_request("POST", "/v1/downloads/verify-otp", None, verify.clone()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let token = body_json(resp).await["token"].as_str().unwrap().to_string();

    // A code verifies once.
    let resp = app
        .clone()
        .oneshot(json_request("POST", "/v1/downloads/verify-otp", None, verify))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .clone()
        .oneshot(get(
            &format!("/v1/downloads/file/papers-book?email=reader%40x.org&token={token}"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/zip");
    assert_eq!(body_string(resp).await.as_bytes(), b"PK\x03\x04");

    // Revocation takes effect on the next request.
    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/downloads/admin/remove-email",
            Some(&admin),
            serde_json::json!({"email": "reader@x.org"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(get(
            &format!("/v1/downloads/file/papers-book?email=reader%40x.org&token={token}"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_remove_absent_email_is_ok() {
    let dir = tempfile::tempdir().unwrap();
    let app = confreg_api::app(configured_state(dir.path()));
    let admin = admin_token(&app).await;
    let resp = app
        .oneshot(json_request(
            "POST",
            "/v1/downloads/admin/remove-email",
            Some(&admin),
            serde_json::json!({"email": "never@x.org"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

// -- Rate limiting, metrics, OpenAPI -------------------------------------------

#[tokio::test]
async fn test_otp_requests_are_rate_limited() {
    let dir = tempfile::tempdir().unwrap();
    let app = confreg_api::app_with_limits(
        configured_state(dir.path()),
        RateLimitConfig {
            max_requests: 100,
            max_otp_requests: 2,
            window_secs: 60,
        },
    );
    let request = || {
        json_request(
            "POST",
            "/v1/downloads/request-otp",
            None,
            serde_json::json!({"email": "stranger@x.org"}),
        )
    };
    assert_eq!(app.clone().oneshot(request()).await.unwrap().status(), StatusCode::FORBIDDEN);
    assert_eq!(app.clone().oneshot(request()).await.unwrap().status(), StatusCode::FORBIDDEN);
    let resp = app.oneshot(request()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(resp).await["error"]["code"], "RATE_LIMITED");
}

#[tokio::test]
async fn test_otp_budget_follows_the_address_not_the_client() {
    let dir = tempfile::tempdir().unwrap();
    let state = configured_state(dir.path());
    confreg_api::services::downloads::add_email(&state, "ada@x.org")
        .await
        .unwrap();
    let app = confreg_api::app(state);
    let from = |ip: &str| {
        let mut request = json_request(
            "POST",
            "/v1/downloads/request-otp",
            None,
            serde_json::json!({"email": "ada@x.org"}),
        );
        request
            .headers_mut()
            .insert("x-forwarded-for", ip.parse().unwrap());
        request
    };

    let budget = RateLimitConfig::default().max_otp_requests;
    for i in 0..budget {
        let resp = app.clone().oneshot(from(&format!("10.0.0.{i}"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
    let resp = app.oneshot(from("10.0.1.1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(resp).await["error"]["code"], "RATE_LIMITED");
}

#[tokio::test]
async fn test_metrics_count_requests() {
    let app = confreg_api::app(AppState::new());
    app.clone()
        .oneshot(get("/v1/downloads/files", None))
        .await
        .unwrap();
    let resp = app.oneshot(get("/metrics", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let text = body_string(resp).await;
    assert!(text.contains("confreg_http_requests_total 1\n"), "{text}");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = confreg_api::app(AppState::new());
    let resp = app.oneshot(get("/openapi.json", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let doc = body_json(resp).await;
    assert!(doc["paths"]["/v1/downloads/request-otp"].is_object());
    assert!(doc["paths"]["/v1/users/register"]["post"]["requestBody"].is_object());
    assert!(doc["paths"]["/v1/users/{uid}"]["patch"]["requestBody"].is_object());
}

// -- Submissions --------------------------------------------------------------

fn raw_put(uri: &str, token: &str, bytes: &'static [u8]) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(bytes))
        .unwrap()
}

#[tokio::test]
async fn test_abstract_review_then_paper_submission() {
    let dir = tempfile::tempdir().unwrap();
    let state = configured_state(dir.path());
    let app = confreg_api::app(state.clone());
    let (uid, token) = registrant(&app, "author@x.org").await;
    let (_, other) = registrant(&app, "other@x.org").await;
    let admin = admin_token(&app).await;

    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/abstracts",
            Some(&token),
            serde_json::json!({
                "title": "Catalysis on ceria",
                "theme": "Energy",
                "presenting_type": "Poster",
                "first_author_name": "Ada Lovelace",
                "first_author_affiliation": "IISc",
                "presenting_author_name": "Ada Lovelace",
                "presenting_author_affiliation": "IISc",
                "main_body": "Oxygen vacancies matter."
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let code = body_json(resp).await["abstract_code"].as_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(raw_put(&format!("/v1/abstracts/{code}/file?file_name=abstract.docx"), &token, b"PK\x03\x04"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(get(&format!("/v1/abstracts/{code}"), Some(&other)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/v1/abstracts/{code}/review"),
            Some(&admin),
            serde_json::json!({"status": "Approved", "remarks": "Welcome"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["status"], "Approved");

    let resp = app
        .clone()
        .oneshot(get(&format!("/v1/users/{uid}/invitation/abstract-title"), Some(&token)))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["title"], "Catalysis on ceria");

    let paper = serde_json::json!({
        "abstract_code": code,
        "title": "Catalysis on ceria, in full",
        "abstract": "Oxygen vacancies matter a lot.",
        "track": "Energy",
        "first_author_name": "Ada Lovelace",
        "presenting_author_name": "Ada Lovelace"
    });
    let resp = app
        .clone()
        .oneshot(json_request("POST", "/v1/papers", Some(&other), paper.clone()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .clone()
        .oneshot(json_request("POST", "/v1/papers", Some(&token), paper.clone()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(body_json(resp).await["paper_code"], code.as_str());

    let resp = app
        .clone()
        .oneshot(json_request("POST", "/v1/papers", Some(&token), paper))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = app.oneshot(get("/v1/papers", Some(&admin))).await.unwrap();
    assert_eq!(body_json(resp).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_password_reset_is_public_and_single_use() {
    let dir = tempfile::tempdir().unwrap();
    let state = configured_state(dir.path());
    let app = confreg_api::app(state.clone());
    registrant(&app, "forgetful@x.org").await;

    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/users/password-reset/request",
            None,
            serde_json::json!({"email": "forgetful@x.org"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let code = state.password_resets.get(&"forgetful@x.org".to_string()).unwrap().code;

    let confirm = serde_json::json!({
        "email": "forgetful@x.org",
        "otp": code,
        "new_password": "remembered at last"
    });
    let resp = app
        .clone()
        .oneshot(json_request("POST", "/v1/users/password-reset/confirm", None, confirm.clone()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .clone()
        .oneshot(json_request("POST", "/v1/users/password-reset/confirm", None, confirm))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .oneshot(json_request(
            "POST",
            "/v1/users/login",
            None,
            serde_json::json!({"email": "forgetful@x.org", "password": "correct horse battery"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invitation_request_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let state = configured_state(dir.path());
    let app = confreg_api::app(state);
    let (uid, token) = registrant(&app, "visitor@x.org").await;

    let resp = app
        .clone()
        .oneshot(get(&format!("/v1/users/{uid}/invitation"), Some(&token)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/v1/users/{uid}/invitation"),
            Some(&token),
            serde_json::json!({
                "name": "Ada Lovelace",
                "address": "Nairobi",
                "passport_number": "K1234567",
                "passport_expiry": "2099-01-01",
                "country": "Kenya"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(get(&format!("/v1/users/{uid}/invitation"), Some(&token)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["passport_number"], "K1234567");
}
