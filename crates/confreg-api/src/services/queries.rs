//! Visitor questions forwarded to the organisers.

use confreg_core::normalize_email;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::effects::SideEffect;
use crate::error::AppError;
use crate::extractors::{required, Validate};
use crate::mailer::OutgoingMail;
use crate::state::AppState;

const MAX_MESSAGE_LEN: usize = 5_000;

/// A question from the contact form.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct QueryRequest {
    pub name: String,
    pub email: String,
    pub message: String,
}

impl Validate for QueryRequest {
    fn validate(&self) -> Result<(), String> {
        required(&self.name, "name")?;
        required(&self.email, "email")?;
        let message = required(&self.message, "message")?;
        if message.chars().count() > MAX_MESSAGE_LEN {
            return Err(format!("message must not exceed {MAX_MESSAGE_LEN} characters"));
        }
        Ok(())
    }
}

/// Deliver the question to the organisers, then acknowledge it.
///
/// The forward is sent before returning so a delivery failure reaches the
/// visitor; the acknowledgement is queued.
pub async fn submit(state: &AppState, query: QueryRequest) -> Result<(), AppError> {
    let from = normalize_email(&query.email)?;
    let organisers = state
        .config
        .admin_notify_email
        .as_deref()
        .ok_or_else(|| AppError::ServiceUnavailable("query inbox is not configured".into()))?;

    let event = &state.config.event_name;
    let name = query.name.trim();
    let forward = OutgoingMail::query_received(event, organisers, name, &from, query.message.trim());
    if let Err(e) = state.mailer.send(forward).await {
        tracing::error!(from = %from, error = %e, "query could not be forwarded");
        return Err(AppError::upstream("query delivery failed", e));
    }

    state
        .effects
        .enqueue(SideEffect::SendEmail(OutgoingMail::query_acknowledged(event, &from, name)));
    tracing::info!(from = %from, "query forwarded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn query(email: &str) -> QueryRequest {
        QueryRequest {
            name: "Ada".into(),
            email: email.into(),
            message: "Is there a student discount?".into(),
        }
    }

    #[tokio::test]
    async fn forwards_to_organisers() {
        let state = AppState::with_config(AppConfig {
            admin_notify_email: Some("office@conf.example".into()),
            ..AppConfig::default()
        })
        .unwrap();
        submit(&state, query(" Ada@X.org ")).await.unwrap();

        let forwarded = state
            .mailer
            .sent()
            .into_iter()
            .find(|m| m.to == "office@conf.example")
            .unwrap();
        assert!(forwarded.body.contains("ada@x.org"));
        assert!(forwarded.body.contains("student discount"));
    }

    #[tokio::test]
    async fn needs_an_inbox_and_a_valid_sender() {
        let state = AppState::new();
        assert!(matches!(
            submit(&state, query("ada@x.org")).await,
            Err(AppError::ServiceUnavailable(_))
        ));
        assert!(matches!(submit(&state, query("nope")).await, Err(AppError::Validation(_))));
    }

    #[test]
    fn validation_bounds_message() {
        let mut q = query("ada@x.org");
        q.validate().unwrap();
        q.message = "x".repeat(MAX_MESSAGE_LEN + 1);
        assert!(q.validate().is_err());
        q.message = "   ".into();
        assert!(q.validate().is_err());
    }
}
