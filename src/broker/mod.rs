//! Authorization broker.
//!
//! Every request runs one authorization transaction:
//!
//! ```text
//! CHECKING -> AUTHORIZED ------------------> EXECUTING -> DONE | FAILED
//!          -> PROMPTING -> approved -------> EXECUTING
//!                       -> rejected/cancel -> REJECTED
//! ```
//!
//! The executor is reached only through AUTHORIZED or an approval, and a
//! standing grant is written only when the user approved with "remember".
//!
//! Requests on the same (capability, origin) run one at a time. A queued
//! request is invisible to the approval UI while the one ahead of it is
//! still prompting.

mod request;

use std::sync::Arc;

use tracing::Instrument;

pub use request::{Request, RequestEnvelope, Response};

use crate::capability::CapabilityOutput;
use crate::error::BrokerError;
use crate::executor::CapabilityExecutor;
use crate::network::Network;
use crate::permissions::PermissionStore;
use crate::prompt::{PromptMessage, PromptOutcome, Prompter};

/// Terminal state of one authorization transaction.
#[derive(Debug)]
pub enum BrokerOutcome {
    Done(CapabilityOutput),
    Rejected,
    Cancelled,
    Failed(BrokerError),
}

impl BrokerOutcome {
    pub fn state(&self) -> &'static str {
        match self {
            BrokerOutcome::Done(_) => "done",
            BrokerOutcome::Rejected => "rejected",
            BrokerOutcome::Cancelled => "cancelled",
            BrokerOutcome::Failed(_) => "failed",
        }
    }

    pub fn into_response(self) -> Response {
        match self {
            BrokerOutcome::Done(output) => match serde_json::to_value(output) {
                Ok(data) => Response::data(data),
                Err(e) => Response::error(format!("failed to serialize result: {e}")),
            },
            BrokerOutcome::Rejected => Response::from_error(&BrokerError::Rejected),
            BrokerOutcome::Cancelled => Response::from_error(&BrokerError::Cancelled),
            BrokerOutcome::Failed(err) => Response::from_error(&err),
        }
    }
}

pub struct AuthorizationBroker {
    permissions: Arc<PermissionStore>,
    prompter: Arc<dyn Prompter>,
    executor: Arc<CapabilityExecutor>,
    network: Network,
}

impl AuthorizationBroker {
    pub fn new(
        permissions: Arc<PermissionStore>,
        prompter: Arc<dyn Prompter>,
        executor: Arc<CapabilityExecutor>,
        network: Network,
    ) -> Self {
        Self {
            permissions,
            prompter,
            executor,
            network,
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Validate an envelope and run it. Always produces a Response.
    pub async fn handle(&self, envelope: RequestEnvelope) -> Response {
        let correlation_id = envelope.correlation_id.clone();
        match Request::from_envelope(envelope, self.network) {
            Ok(request) => self.process(request).await.into_response(),
            Err(err) => {
                tracing::warn!(correlation_id = %correlation_id, error = %err, "Malformed request");
                Response::from_error(&BrokerError::MalformedPayload(err))
            }
        }
    }

    /// Run one authorization transaction to a terminal state.
    pub async fn process(&self, request: Request) -> BrokerOutcome {
        let span = tracing::info_span!(
            "authorization",
            correlation_id = %request.correlation_id,
            capability = %request.capability,
            origin = %request.origin,
        );
        async move {
            let outcome = self.run(&request).await;
            match &outcome {
                BrokerOutcome::Failed(err) => {
                    tracing::warn!(state = outcome.state(), error = %err, "Request finished");
                }
                _ => tracing::info!(state = outcome.state(), "Request finished"),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run(&self, request: &Request) -> BrokerOutcome {
        // Held until any grant is persisted so a concurrent request on the
        // same key sees the decision instead of prompting again.
        let key_guard = self
            .permissions
            .lock_key(request.capability, &request.origin)
            .await;

        tracing::debug!(state = "checking", "Checking standing permission");
        if self
            .permissions
            .has(request.capability, &request.origin)
            .await
        {
            tracing::debug!(state = "authorized", "Standing permission found");
        } else {
            tracing::info!(state = "prompting", "Awaiting user decision");
            let message = PromptMessage::confirm(
                request.correlation_id.clone(),
                request.capability,
                request.origin.as_str(),
                request.payload.review_payload(),
            );

            let decision = match self.prompter.request(message).await {
                Ok(PromptOutcome::Decided(decision)) => decision,
                Ok(PromptOutcome::Cancelled) => return BrokerOutcome::Cancelled,
                Err(err) => return BrokerOutcome::Failed(err.into()),
            };

            if !decision.approved {
                return BrokerOutcome::Rejected;
            }

            if decision.remember
                && let Err(err) = self
                    .permissions
                    .grant(request.capability, &request.origin)
                    .await
            {
                tracing::warn!(error = %err, "Failed to persist permission; approving this request only");
            }
        }
        drop(key_guard);

        tracing::debug!(state = "executing", "Executing capability");
        match self.executor.execute(&request.payload).await {
            Ok(output) => BrokerOutcome::Done(output),
            Err(err) => BrokerOutcome::Failed(err.into()),
        }
    }
}
