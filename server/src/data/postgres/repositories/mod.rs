//! PostgreSQL repositories
//!
//! Free async functions over the shared pool. Each dispatch operation in
//! `message` is a single short transaction; the database is the only
//! serialization point.

pub mod client;
pub mod message;
pub mod subscription;
pub mod topic;
