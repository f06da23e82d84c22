//! HTTP gateway: callers submit requests, the approval UI answers prompts.

pub mod auth;
pub mod server;
pub mod types;

pub use server::{GatewayState, GatewayTokens, build_router, start_server};
