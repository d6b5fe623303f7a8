//! Webhook event payloads.
//!
//! Parse only after [`crate::signature::verify_webhook_signature`] has
//! accepted the raw body. Unknown events and extra fields are tolerated;
//! the provider adds both without notice.

use confreg_core::CategorySelection;
use serde::{Deserialize, Deserializer, Serialize};

/// Event kinds the service reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookKind {
    /// `payment.authorized`
    PaymentAuthorized,
    /// `payment.captured`
    PaymentCaptured,
    /// `payment.failed`
    PaymentFailed,
    /// `order.paid`
    OrderPaid,
    /// Anything else.
    Other(String),
}

impl WebhookKind {
    /// Classify an event name.
    pub fn from_event(event: &str) -> Self {
        match event {
            "payment.authorized" => Self::PaymentAuthorized,
            "payment.captured" => Self::PaymentCaptured,
            "payment.failed" => Self::PaymentFailed,
            "order.paid" => Self::OrderPaid,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Top-level webhook envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event name, e.g. `payment.captured`.
    pub event: String,
    /// Entities the event concerns.
    #[serde(default)]
    pub payload: WebhookPayload,
}

impl WebhookEvent {
    /// Parse a verified raw body.
    pub fn parse(raw_body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw_body)
    }

    /// Classified event kind.
    pub fn kind(&self) -> WebhookKind {
        WebhookKind::from_event(&self.event)
    }

    /// The payment entity, if the event carries one.
    pub fn payment(&self) -> Option<&PaymentEntity> {
        self.payload.payment.as_ref().map(|w| &w.entity)
    }
}

/// Entity container.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    /// Present on `payment.*` and `order.paid` events.
    #[serde(default)]
    pub payment: Option<EntityWrapper>,
}

/// `{ "entity": { ... } }`
#[derive(Debug, Clone, Deserialize)]
pub struct EntityWrapper {
    /// The wrapped payment.
    pub entity: PaymentEntity,
}

/// A payment as reported by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEntity {
    /// Payment id, e.g. `pay_29QQoUBi66xm2f`.
    pub id: String,
    /// Order the payment belongs to.
    #[serde(default)]
    pub order_id: Option<String>,
    /// ISO currency code.
    pub currency: String,
    /// Amount in minor units.
    pub amount: u64,
    /// Provider status, e.g. `captured`, `failed`.
    pub status: String,
    /// Payer email as captured by the checkout form.
    #[serde(default)]
    pub email: Option<String>,
    /// Failure description on `payment.failed`.
    #[serde(default)]
    pub error_description: Option<String>,
    /// Notes attached to the order at creation.
    #[serde(default, deserialize_with = "notes_or_empty")]
    pub notes: PaymentNotes,
}

impl PaymentEntity {
    /// Email to attribute the payment to: the order notes first, then the
    /// checkout form.
    pub fn payer_email(&self) -> Option<&str> {
        self.notes
            .email
            .as_deref()
            .or(self.email.as_deref())
            .filter(|e| !e.trim().is_empty())
    }
}

/// Notes the service attaches when creating an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentNotes {
    /// Registrant email.
    #[serde(default)]
    pub email: Option<String>,
    /// JSON-encoded `[{ "key": <category>, "currency": <code> }, ...]`.
    #[serde(default)]
    pub categories_selected: Option<String>,
}

impl PaymentNotes {
    /// Decode the selected categories. Absent notes decode to an empty list.
    pub fn categories(&self) -> Result<Vec<CategorySelection>, serde_json::Error> {
        match self.categories_selected.as_deref() {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw),
            _ => Ok(Vec::new()),
        }
    }
}

/// The provider sends `"notes": []` when an order has no notes.
fn notes_or_empty<'de, D>(deserializer: D) -> Result<PaymentNotes, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Notes {
        Map(PaymentNotes),
        Other(serde_json::Value),
    }
    Ok(match Notes::deserialize(deserializer)? {
        Notes::Map(notes) => notes,
        Notes::Other(_) => PaymentNotes::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn captured() -> serde_json::Value {
        serde_json::json!({
            "entity": "event",
            "event": "payment.captured",
            "contains": ["payment"],
            "payload": {
                "payment": {
                    "entity": {
                        "id": "pay_1",
                        "entity": "payment",
                        "amount": 484000,
                        "currency": "INR",
                        "status": "captured",
                        "order_id": "order_1",
                        "email": "form@x.org",
                        "notes": {
                            "email": "ada@x.org",
                            "categoriesSelected": "[{\"key\":\"Student / Participant\",\"currency\":\"INR\"}]"
                        }
                    }
                }
            },
            "created_at": 1_700_000_000
        })
    }

    #[test]
    fn parses_captured_payment() {
        let body = serde_json::to_vec(&captured()).unwrap();
        let event = WebhookEvent::parse(&body).unwrap();
        assert_eq!(event.kind(), WebhookKind::PaymentCaptured);
        let payment = event.payment().unwrap();
        assert_eq!(payment.id, "pay_1");
        assert_eq!(payment.amount, 484_000);
        assert_eq!(payment.payer_email(), Some("ada@x.org"));
        let cats = payment.notes.categories().unwrap();
        assert_eq!(cats.len(), 1);
        assert_eq!(cats[0].category, "Student / Participant");
    }

    #[test]
    fn empty_notes_array_is_tolerated() {
        let mut v = captured();
        v["payload"]["payment"]["entity"]["notes"] = serde_json::json!([]);
        let event = WebhookEvent::parse(&serde_json::to_vec(&v).unwrap()).unwrap();
        let payment = event.payment().unwrap();
        assert_eq!(payment.notes, PaymentNotes::default());
        assert_eq!(payment.payer_email(), Some("form@x.org"));
        assert!(payment.notes.categories().unwrap().is_empty());
    }

    #[test]
    fn malformed_categories_surface_as_error() {
        let notes = PaymentNotes {
            email: Some("a@x.org".into()),
            categories_selected: Some("not json".into()),
        };
        assert!(notes.categories().is_err());
    }

    #[test]
    fn event_without_payment() {
        let event = WebhookEvent::parse(br#"{"event":"refund.created","payload":{}}"#).unwrap();
        assert!(event.payment().is_none());
        assert_eq!(event.kind(), WebhookKind::Other("refund.created".into()));
    }
}
