//! # Authentication & Authorization Middleware
//!
//! Bearer token middleware with role-based access control.
//!
//! ## Token Format
//!
//! HS256 JWTs signed with `JWT_SECRET`:
//!
//! ```text
//! { "sub": "<uid or admin email>", "email": "...", "role": "attendee" | "admin", "iat": ..., "exp": ... }
//! ```
//!
//! Attendee tokens live for one hour, admin tokens for eight.
//!
//! ## CallerIdentity
//!
//! Every authenticated request gets a [`CallerIdentity`] injected into the
//! request extensions. Handlers extract it via the `FromRequestParts` impl.
//! Public routes (fee quote, registration, login, webhook, OTP downloads)
//! are mounted outside this middleware.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::{AppError, ErrorBody, ErrorDetail};

/// Lifetime of an attendee token.
pub const ATTENDEE_TOKEN_TTL_SECS: i64 = 60 * 60;
/// Lifetime of an admin token.
pub const ADMIN_TOKEN_TTL_SECS: i64 = 8 * 60 * 60;

// ── Role ────────────────────────────────────────────────────────────────────

/// Roles, ordered by privilege level. `Attendee < Admin`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A registrant acting on their own profile and payments.
    Attendee,
    /// Conference staff: uploads, allow-list, any registrant.
    Admin,
}

impl Role {
    /// Return the string representation of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attendee => "attendee",
            Self::Admin => "admin",
        }
    }
}

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub role: Role,
    /// Registrant id. `None` for admins.
    pub user_id: Option<Uuid>,
    /// Email the token was issued to.
    pub email: String,
}

impl CallerIdentity {
    /// Check if the caller has at least the given minimum role.
    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }

    /// The registrant this caller acts as.
    pub fn registrant_id(&self) -> Result<Uuid, AppError> {
        self.user_id
            .ok_or_else(|| AppError::Forbidden("this endpoint requires a registrant token".into()))
    }

    /// Whether the caller may read or edit registrant `uid`.
    pub fn can_access_user(&self, uid: Uuid) -> bool {
        self.role == Role::Admin || self.user_id == Some(uid)
    }
}

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Check that the caller has at least the required role.
/// Returns 403 Forbidden if the caller's role is insufficient.
pub fn require_role(caller: &CallerIdentity, minimum: Role) -> Result<(), AppError> {
    if caller.has_role(minimum) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            minimum.as_str(),
            caller.role.as_str()
        )))
    }
}

// ── Tokens ──────────────────────────────────────────────────────────────────

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Registrant uid, or the admin email.
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    /// Claims for a registrant.
    pub fn attendee(uid: Uuid, email: &str) -> Self {
        Self::new(uid.to_string(), email, Role::Attendee, ATTENDEE_TOKEN_TTL_SECS)
    }

    /// Claims for the configured admin.
    pub fn admin(email: &str) -> Self {
        Self::new(email.to_string(), email, Role::Admin, ADMIN_TOKEN_TTL_SECS)
    }

    fn new(sub: String, email: &str, role: Role, ttl_secs: i64) -> Self {
        let now = Utc::now();
        Self {
            sub,
            email: email.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(ttl_secs)).timestamp(),
        }
    }

    fn into_identity(self) -> Result<CallerIdentity, String> {
        let user_id = match self.role {
            Role::Attendee => Some(
                self.sub
                    .parse::<Uuid>()
                    .map_err(|e| format!("invalid subject: {e}"))?,
            ),
            Role::Admin => None,
        };
        Ok(CallerIdentity {
            role: self.role,
            user_id,
            email: self.email,
        })
    }
}

/// Sign `claims` with the HS256 secret.
pub fn issue_token(secret: &str, claims: &Claims) -> Result<String, AppError> {
    jsonwebtoken::encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))
}

/// Verify signature and expiry, returning the caller.
pub fn decode_token(secret: &str, token: &str) -> Result<CallerIdentity, String> {
    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| format!("invalid bearer token: {e}"))?;
    data.claims.into_identity()
}

// ── Passwords ───────────────────────────────────────────────────────────────

/// Hash a password into an argon2id PHC string.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

/// Check a password against a stored PHC string. A malformed hash never matches.
pub fn verify_password(password: &str, hashed: &str) -> bool {
    match PasswordHash::new(hashed) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "stored password hash is malformed");
            false
        }
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the secret.
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Validate the bearer token and inject the [`CallerIdentity`].
///
/// When `AuthConfig.jwt_secret` is `None`, all requests are allowed with an
/// `Admin` identity (development mode).
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let config = request.extensions().get::<AuthConfig>().cloned();

    match config {
        Some(AuthConfig {
            jwt_secret: Some(ref secret),
        }) => {
            let auth_header = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());

            match auth_header {
                Some(header_value) if header_value.starts_with("Bearer ") => {
                    match decode_token(secret, &header_value[7..]) {
                        Ok(identity) => {
                            request.extensions_mut().insert(identity);
                            next.run(request).await
                        }
                        Err(msg) => {
                            tracing::warn!(reason = %msg, "authentication failed");
                            unauthorized_response(&msg)
                        }
                    }
                }
                Some(_) => {
                    tracing::warn!("authentication failed: non-Bearer authorization scheme");
                    unauthorized_response("authorization header must use Bearer scheme")
                }
                None => {
                    tracing::warn!("authentication failed: missing authorization header");
                    unauthorized_response("missing authorization header")
                }
            }
        }
        _ => {
            request.extensions_mut().insert(CallerIdentity {
                role: Role::Admin,
                user_id: None,
                email: "dev@localhost".to_string(),
            });
            next.run(request).await
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const SECRET: &str = "test-jwt-secret";

    async fn whoami(caller: CallerIdentity) -> String {
        format!("{}:{}", caller.role.as_str(), caller.email)
    }

    fn test_app(secret: Option<&str>) -> Router {
        let auth_config = AuthConfig {
            jwt_secret: secret.map(|s| Zeroizing::new(s.to_string())),
        };
        Router::new()
            .route("/test", get(whoami))
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(auth_config))
    }

    async fn call(app: Router, auth: Option<String>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/test");
        if let Some(value) = auth {
            builder = builder.header("Authorization", value);
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn valid_attendee_token_accepted() {
        let uid = Uuid::new_v4();
        let token = issue_token(SECRET, &Claims::attendee(uid, "ada@x.org")).unwrap();
        let (status, body) = call(test_app(Some(SECRET)), Some(format!("Bearer {token}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "attendee:ada@x.org");
    }

    #[tokio::test]
    async fn missing_header_rejected() {
        let (status, body) = call(test_app(Some(SECRET)), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("missing authorization header"));
    }

    #[tokio::test]
    async fn token_signed_with_other_secret_rejected() {
        let token = issue_token("other-secret", &Claims::admin("root@x.org")).unwrap();
        let (status, _) = call(test_app(Some(SECRET)), Some(format!("Bearer {token}"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn expired_token_rejected() {
        let mut claims = Claims::admin("root@x.org");
        claims.iat -= 10 * ADMIN_TOKEN_TTL_SECS;
        claims.exp = claims.iat + 60;
        let token = issue_token(SECRET, &claims).unwrap();
        let (status, _) = call(test_app(Some(SECRET)), Some(format!("Bearer {token}"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn non_bearer_scheme_rejected() {
        let (status, body) =
            call(test_app(Some(SECRET)), Some("Basic dXNlcjpwYXNz".to_string())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Bearer"));
    }

    #[tokio::test]
    async fn no_secret_is_dev_admin() {
        let (status, body) = call(test_app(None), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("admin:"));
    }

    #[test]
    fn role_ordering() {
        let admin = CallerIdentity {
            role: Role::Admin,
            user_id: None,
            email: "root@x.org".into(),
        };
        let attendee = CallerIdentity {
            role: Role::Attendee,
            user_id: Some(Uuid::new_v4()),
            email: "ada@x.org".into(),
        };
        assert!(require_role(&admin, Role::Attendee).is_ok());
        assert!(require_role(&attendee, Role::Admin).is_err());
        assert!(admin.registrant_id().is_err());
        assert!(attendee.can_access_user(attendee.user_id.unwrap()));
        assert!(!attendee.can_access_user(Uuid::new_v4()));
        assert!(admin.can_access_user(Uuid::new_v4()));
    }

    #[test]
    fn attendee_subject_must_be_uuid() {
        let mut claims = Claims::attendee(Uuid::new_v4(), "ada@x.org");
        claims.sub = "not-a-uuid".into();
        let token = issue_token(SECRET, &claims).unwrap();
        assert!(decode_token(SECRET, &token).is_err());
    }

    #[test]
    fn password_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-phc-string"));
    }

    #[test]
    fn auth_config_debug_redacts() {
        let cfg = AuthConfig {
            jwt_secret: Some(Zeroizing::new("super-secret".into())),
        };
        assert!(!format!("{cfg:?}").contains("super-secret"));
    }
}
