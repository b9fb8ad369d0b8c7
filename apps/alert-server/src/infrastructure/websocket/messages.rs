//! WebSocket wire messages.
//!
//! Inbound frames are JSON objects tagged by `type`; anything that does not
//! decode into a known shape is reported as an `InboundError` and ignored
//! by the session.

use serde::{Deserialize, Serialize};

use crate::domain::alert::{AlertCondition, ConditionError, Direction, NotificationEvent};

/// Decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Register a condition.
    Subscribe(AlertCondition),
    /// Remove a condition.
    Unsubscribe(AlertCondition),
}

/// Why an inbound frame was ignored.
#[derive(Debug, thiserror::Error)]
pub enum InboundError {
    /// Not JSON, unknown `type`, or missing fields.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Fields decoded but do not form a valid condition.
    #[error("invalid condition: {0}")]
    Invalid(#[from] ConditionError),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientMessage {
    Subscribe(ConditionFields),
    Unsubscribe(ConditionFields),
}

#[derive(Debug, Deserialize)]
struct ConditionFields {
    ticker: String,
    threshold: f64,
    #[serde(rename = "alertType")]
    alert_type: Direction,
}

impl TryFrom<ConditionFields> for AlertCondition {
    type Error = ConditionError;

    fn try_from(fields: ConditionFields) -> Result<Self, Self::Error> {
        Self::parse(&fields.ticker, fields.threshold, fields.alert_type)
    }
}

/// Decode a text frame.
///
/// # Errors
///
/// Returns `InboundError` when the frame should be ignored.
pub fn decode(text: &str) -> Result<Inbound, InboundError> {
    Ok(match serde_json::from_str::<ClientMessage>(text)? {
        ClientMessage::Subscribe(fields) => Inbound::Subscribe(fields.try_into()?),
        ClientMessage::Unsubscribe(fields) => Inbound::Unsubscribe(fields.try_into()?),
    })
}

/// Server push message.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage<'a> {
    /// A condition fired.
    Alert {
        /// Alert details.
        data: AlertPayload<'a>,
    },
}

/// Body of an `alert` push.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload<'a> {
    /// Ticker that crossed.
    pub ticker: &'a str,
    /// Observed price.
    pub price: f64,
    /// Condition threshold.
    pub threshold: f64,
    /// Condition direction.
    pub alert_type: Direction,
    /// Observation time, ISO-8601 UTC with milliseconds.
    pub timestamp: String,
}

impl<'a> From<&'a NotificationEvent> for ServerMessage<'a> {
    fn from(event: &'a NotificationEvent) -> Self {
        Self::Alert {
            data: AlertPayload {
                ticker: event.ticker.as_str(),
                price: event.price,
                threshold: event.threshold,
                alert_type: event.direction,
                timestamp: event
                    .observed_at
                    .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            },
        }
    }
}

/// Encode an alert push as JSON text.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_alert(event: &NotificationEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ServerMessage::from(event))
}
