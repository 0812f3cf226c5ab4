/// Authorization: permission catalog, resolver, and resource gate
///
/// Authorization is the first stage of the entitlement pipeline that every
/// mutating or sensitive operation passes through:
///
/// 1. [`catalog`]: the closed set of permission keys, bitset operations,
///    and the default grants of built-in and global roles
/// 2. [`resolver`]: effective-permission computation for a (user, firm)
///    pair: role grant ∪ membership overrides
/// 3. [`gate`]: resource-scoped decisions ("edit only own cases") on top
///    of the resolver
///
/// Subscription eligibility and quota checks are separate stages; see the
/// `billing` and `quota` modules.

pub mod catalog;
pub mod gate;
pub mod resolver;
