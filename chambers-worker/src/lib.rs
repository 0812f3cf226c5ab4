//! # Chambers Worker Library
//!
//! Scheduled background processing for Chambers: the entitlement
//! reconciler and the timer loop that drives it.
//!
//! ## Modules
//!
//! - `reconciler`: the two idempotent sweep passes (add-on expiry /
//!   deferred downgrades / limit recompute, and trial-ending alerts)
//! - `scheduler`: the interval loop with graceful shutdown

pub mod reconciler;
pub mod scheduler;
