/// Billing: subscription state machine, plan changes, provider contract
///
/// # Modules
///
/// - [`state`]: the six-state subscription machine, the pure `is_read_only`
///   predicate, and the `require_writable` gate every mutating operation
///   checks
/// - [`change`]: immediate upgrades, deferred downgrades, and the single
///   limit-recompute path shared with the reconciler
/// - [`provider`]: the payment provider contract (outbound calls with
///   idempotency keys, inbound webhook payloads)

pub mod change;
pub mod provider;
pub mod state;
