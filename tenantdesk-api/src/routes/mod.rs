/// API route handlers, one module per resource
///
/// - `health`: liveness and database status
/// - `auth`: registration, login, sessions, email verification, password reset
/// - `me`: the caller's own user record, profile and avatar
/// - `tenants`, `users`, `invitations`: tenant administration
/// - `projects`, `sprints`, `tasks`, `boards`, `teams`, `comments`: work tracking
/// - `events`: activity log
/// - `supplies`, `reorders`: inventory

pub mod auth;
pub mod boards;
pub mod comments;
pub mod events;
pub mod health;
pub mod invitations;
pub mod me;
pub mod projects;
pub mod reorders;
pub mod sprints;
pub mod supplies;
pub mod tasks;
pub mod teams;
pub mod tenants;
pub mod users;
