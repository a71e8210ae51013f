//! fastpubsub: a durable publish/subscribe broker on PostgreSQL
//!
//! Producers publish JSON messages to topics; consumers pull batches from
//! subscriptions and ack or nack them. The database is the sole persistent
//! substrate and the single serialization point: every dispatch operation
//! is one short transaction, and horizontal scaling means running more
//! processes against the same database.

pub mod api;
pub mod app;
pub mod core;
pub mod data;
pub mod domain;
pub mod utils;
pub mod workers;
