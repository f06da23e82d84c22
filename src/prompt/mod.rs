//! Suspend/resume exchange with the human approval surface.
//!
//! The broker sends a [`PromptMessage`] and awaits exactly one outcome. The
//! UI side answers through [`PromptHub::respond`] or dismisses through
//! [`PromptHub::cancel`]. Dropping the waiting future (the caller went
//! away) withdraws the prompt and counts as a cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};

use crate::capability::Capability;
use crate::error::PromptError;

const EVENT_CAPACITY: usize = 64;

/// Outbound prompt, serialized as the UI message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptMessage {
    pub correlation_id: String,
    pub capability: Capability,
    pub origin: String,
    pub review_payload: serde_json::Value,
    pub action: String,
}

impl PromptMessage {
    pub fn confirm(
        correlation_id: impl Into<String>,
        capability: Capability,
        origin: impl Into<String>,
        review_payload: serde_json::Value,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            capability,
            origin: origin.into(),
            review_payload,
            action: "confirm".to_string(),
        }
    }
}

/// Inbound decision for one pending prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptReply {
    pub correlation_id: String,
    pub confirm: bool,
    #[serde(default)]
    pub remember_permission: bool,
}

/// The user's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub approved: bool,
    pub remember: bool,
}

/// How a prompt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptOutcome {
    Decided(Decision),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Approved,
    Denied,
    Cancelled,
}

/// Lifecycle notifications for UI subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PromptEvent {
    Opened {
        prompt: PromptMessage,
    },
    Closed {
        correlation_id: String,
        reason: CloseReason,
    },
}

impl PromptEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PromptEvent::Opened { .. } => "opened",
            PromptEvent::Closed { .. } => "closed",
        }
    }
}

/// Anything that can put a decision in front of the user.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Suspend until the user decides or the prompt is cancelled.
    async fn request(&self, message: PromptMessage) -> Result<PromptOutcome, PromptError>;
}

struct PendingPrompt {
    sequence: u64,
    message: PromptMessage,
    reply: oneshot::Sender<PromptOutcome>,
}

/// In-process prompt channel shared by the broker and the HTTP boundary.
pub struct PromptHub {
    pending: Mutex<HashMap<String, PendingPrompt>>,
    next_sequence: AtomicU64,
    events: broadcast::Sender<PromptEvent>,
}

impl Default for PromptHub {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptHub {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            pending: Mutex::new(HashMap::new()),
            next_sequence: AtomicU64::new(0),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PromptEvent> {
        self.events.subscribe()
    }

    /// Prompts awaiting a decision, oldest first.
    pub fn pending(&self) -> Vec<PromptMessage> {
        let pending = self.lock_pending();
        let mut entries: Vec<_> = pending.values().collect();
        entries.sort_by_key(|entry| entry.sequence);
        entries.into_iter().map(|entry| entry.message.clone()).collect()
    }

    /// Deliver the user's decision to the waiting request.
    pub fn respond(&self, reply: PromptReply) -> Result<(), PromptError> {
        let decision = Decision {
            approved: reply.confirm,
            remember: reply.remember_permission,
        };
        let reason = if decision.approved {
            CloseReason::Approved
        } else {
            CloseReason::Denied
        };
        self.resolve(
            &reply.correlation_id,
            PromptOutcome::Decided(decision),
            reason,
        )
    }

    /// Dismiss a pending prompt without a decision.
    pub fn cancel(&self, correlation_id: &str) -> Result<(), PromptError> {
        self.resolve(correlation_id, PromptOutcome::Cancelled, CloseReason::Cancelled)
    }

    fn resolve(
        &self,
        correlation_id: &str,
        outcome: PromptOutcome,
        reason: CloseReason,
    ) -> Result<(), PromptError> {
        let entry = self
            .lock_pending()
            .remove(correlation_id)
            .ok_or_else(|| PromptError::UnknownRequest {
                correlation_id: correlation_id.to_string(),
            })?;

        // The waiter may have just gone away; the prompt is closed either way.
        let _ = entry.reply.send(outcome);
        self.emit(PromptEvent::Closed {
            correlation_id: correlation_id.to_string(),
            reason,
        });
        Ok(())
    }

    fn emit(&self, event: PromptEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<String, PendingPrompt>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Prompter for PromptHub {
    async fn request(&self, message: PromptMessage) -> Result<PromptOutcome, PromptError> {
        let correlation_id = message.correlation_id.clone();
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.lock_pending();
            if pending.contains_key(&correlation_id) {
                return Err(PromptError::Duplicate { correlation_id });
            }
            pending.insert(
                correlation_id.clone(),
                PendingPrompt {
                    sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
                    message: message.clone(),
                    reply: tx,
                },
            );
        }

        tracing::debug!(correlation_id = %correlation_id, "Prompt opened");
        self.emit(PromptEvent::Opened { prompt: message });

        let mut guard = WithdrawOnDrop {
            hub: self,
            correlation_id,
            armed: true,
        };
        let outcome = rx.await.unwrap_or(PromptOutcome::Cancelled);
        guard.armed = false;
        Ok(outcome)
    }
}

/// Removes the pending entry if the waiting future is dropped early.
struct WithdrawOnDrop<'a> {
    hub: &'a PromptHub,
    correlation_id: String,
    armed: bool,
}

impl Drop for WithdrawOnDrop<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if self.hub.lock_pending().remove(&self.correlation_id).is_some() {
            tracing::debug!(correlation_id = %self.correlation_id, "Prompt withdrawn by caller");
            self.hub.emit(PromptEvent::Closed {
                correlation_id: self.correlation_id.clone(),
                reason: CloseReason::Cancelled,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn message(id: &str) -> PromptMessage {
        PromptMessage::confirm(
            id,
            Capability::SignMessage,
            "shop.example",
            serde_json::json!({ "message": "hi" }),
        )
    }

    async fn wait_for_pending(hub: &PromptHub, count: usize) {
        for _ in 0..100 {
            if hub.pending().len() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {count} pending prompts");
    }

    #[tokio::test]
    async fn reply_resumes_waiting_request() {
        let hub = Arc::new(PromptHub::new());
        let waiter = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move { hub.request(message("req-1")).await })
        };
        wait_for_pending(&hub, 1).await;

        hub.respond(PromptReply {
            correlation_id: "req-1".to_string(),
            confirm: true,
            remember_permission: true,
        })
        .unwrap();

        let outcome = waiter.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            PromptOutcome::Decided(Decision {
                approved: true,
                remember: true
            })
        );
        assert!(hub.pending().is_empty());
    }

    #[tokio::test]
    async fn cancel_resolves_as_cancelled() {
        let hub = Arc::new(PromptHub::new());
        let mut events = hub.subscribe();
        let waiter = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move { hub.request(message("req-2")).await })
        };
        wait_for_pending(&hub, 1).await;

        hub.cancel("req-2").unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), PromptOutcome::Cancelled);

        assert_eq!(events.recv().await.unwrap().name(), "opened");
        assert_eq!(
            events.recv().await.unwrap(),
            PromptEvent::Closed {
                correlation_id: "req-2".to_string(),
                reason: CloseReason::Cancelled
            }
        );
    }

    #[tokio::test]
    async fn dropping_the_waiter_withdraws_the_prompt() {
        let hub = Arc::new(PromptHub::new());
        let waiter = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move { hub.request(message("req-3")).await })
        };
        wait_for_pending(&hub, 1).await;

        waiter.abort();
        let _ = waiter.await;

        assert!(hub.pending().is_empty());
        assert!(matches!(
            hub.respond(PromptReply {
                correlation_id: "req-3".to_string(),
                confirm: true,
                remember_permission: false,
            }),
            Err(PromptError::UnknownRequest { .. })
        ));
    }

    #[tokio::test]
    async fn duplicate_correlation_id_is_refused() {
        let hub = Arc::new(PromptHub::new());
        let _first = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move { hub.request(message("dup")).await })
        };
        wait_for_pending(&hub, 1).await;

        assert_eq!(
            hub.request(message("dup")).await,
            Err(PromptError::Duplicate {
                correlation_id: "dup".to_string()
            })
        );
    }

    #[test]
    fn reply_defaults_remember_to_false() {
        let reply: PromptReply =
            serde_json::from_str(r#"{"correlationId":"a","confirm":true}"#).unwrap();
        assert!(!reply.remember_permission);
    }

    #[test]
    fn message_serializes_in_camel_case() {
        let json = serde_json::to_value(message("m")).unwrap();
        assert_eq!(json["correlationId"], "m");
        assert_eq!(json["capability"], "sign_message");
        assert_eq!(json["action"], "confirm");
        assert!(json.get("reviewPayload").is_some());
    }
}
