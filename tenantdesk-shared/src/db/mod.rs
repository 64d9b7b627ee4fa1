//! PostgreSQL access: the shared pool ([`pool`]) and embedded schema
//! migrations ([`migrations`]). Row types and their queries live in
//! `crate::models`.

pub mod migrations;
pub mod pool;
