/// Router Module Index
///
/// Routes are split by access tier so the guard for each tier is applied once, at
/// the module boundary.

/// Unauthenticated routes (health check).
pub mod public;

/// Routes for any signed-in caller. Wrapped in `auth_middleware`.
pub mod authenticated;

/// Routes nested under `/admin`. Each handler takes `AdminUser`.
pub mod admin;
