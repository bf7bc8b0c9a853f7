//! Webhook intake and authentication (C2).

pub mod auth;

pub use auth::{RateLimitResult, WebhookAuthenticator};
