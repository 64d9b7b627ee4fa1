//! # TenantDesk API Server Library
//!
//! Multi-tenant business management API: tenants and memberships,
//! projects with sprints, tasks and boards, teams, comments, an activity
//! log, and inventory with reorder requests.
//!
//! ## Modules
//!
//! - `app`: application state and router builder
//! - `config`: configuration from the environment
//! - `error`: error type and HTTP response mapping
//! - `extract`: validated JSON and multipart image extractors
//! - `middleware`: security headers and tenant scope
//! - `routes`: route handlers
//! - `services`: mail and image hosting integrations

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod services;
