//! Wallet Broker - authorization broker for privileged wallet operations.
//!
//! Untrusted origins ask for capabilities (encrypt, decrypt, sign a message,
//! sign a transaction, send a payment). The broker checks the permission
//! table, suspends on a human decision when no standing grant exists, and
//! only then hands the request to the capability executor.

pub mod bootstrap;
pub mod broker;
pub mod capability;
pub mod channels;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod logging;
pub mod network;
pub mod origin;
pub mod permissions;
pub mod prompt;
pub mod psbt;
pub mod settings;

pub use broker::{AuthorizationBroker, BrokerOutcome, Request, RequestEnvelope, Response};
pub use capability::{Capability, CapabilityOutput, CapabilityPayload};
pub use error::{Error, USER_REJECTED_ERROR};
pub use network::Network;
pub use origin::Origin;
