//! API route modules

pub mod health;
pub mod oauth;
pub mod subscriptions;
pub mod topics;
