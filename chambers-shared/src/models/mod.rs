/// Database models for Chambers
///
/// This module contains all database models and their CRUD operations.
///
/// # Models
///
/// - `user`: User accounts and authentication
/// - `firm`: Tenant organizations with quota counters and ceilings
/// - `membership`: User-firm relationships with roles and overrides
/// - `role`: Permission bundles (built-in and firm-defined)
/// - `plan`: Immutable billing tiers
/// - `subscription`: Per-firm subscription state
/// - `addon`: Time-limited storage grants
/// - `case`: Legal matters (ownership-gated resources)
/// - `document`: Document metadata (storage-quota-gated resources)

pub mod addon;
pub mod case;
pub mod document;
pub mod firm;
pub mod membership;
pub mod plan;
pub mod role;
pub mod subscription;
pub mod user;
