//! Request and response envelopes crossing the broker boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::{Capability, CapabilityPayload};
use crate::error::{BrokerError, PayloadError};
use crate::network::Network;
use crate::origin::Origin;

/// Raw request as received from a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub capability: String,
    pub origin: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub correlation_id: String,
}

/// Validated request, ready for authorization.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub correlation_id: String,
    pub capability: Capability,
    pub origin: Origin,
    pub payload: CapabilityPayload,
}

impl Request {
    /// Validate an envelope. A blank correlation id is replaced with a fresh one.
    pub fn from_envelope(envelope: RequestEnvelope, network: Network) -> Result<Self, PayloadError> {
        let capability = Capability::parse(&envelope.capability)?;
        let origin = Origin::parse(&envelope.origin)?;
        let payload = CapabilityPayload::parse(capability, &envelope.args, network)?;
        let correlation_id = match envelope.correlation_id.trim() {
            "" => uuid::Uuid::new_v4().to_string(),
            id => id.to_string(),
        };

        Ok(Self {
            correlation_id,
            capability,
            origin,
            payload,
        })
    }
}

/// Exactly one of `data` or `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(message.into()),
        }
    }

    pub fn from_error(err: &BrokerError) -> Self {
        Self::error(err.to_response_error())
    }

    pub fn is_user_rejection(&self) -> bool {
        self.error.as_deref() == Some(crate::error::USER_REJECTED_ERROR)
    }
}
