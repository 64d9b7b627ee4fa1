/// Middleware and request extractors
///
/// - `security`: security response headers
/// - `tenant`: tenant scope resolution for `/v1/tenants/:tenant_id/...`

pub mod security;
pub mod tenant;
