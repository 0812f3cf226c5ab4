/// Database layer for Chambers
///
/// # Modules
///
/// - `pool`: PostgreSQL connection pool management with health checks
/// - `migrations`: embedded SQL migration runner
///
/// Models live in the `models` module at the crate root.

pub mod migrations;
pub mod pool;
