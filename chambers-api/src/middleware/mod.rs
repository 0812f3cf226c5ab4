/// Middleware modules for the API server
///
/// - `rate_limit`: plan-based token bucket limiting (Redis-backed or
///   in-process fallback)
/// - `security`: OWASP security headers

pub mod rate_limit;
pub mod security;
