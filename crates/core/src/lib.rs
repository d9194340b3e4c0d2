//! `projtrack-core`: pure identity-resolution logic.
//!
//! Everything here is deterministic and free of I/O: field normalization,
//! the per-entity match rule chains, and the disambiguation suffix policy.
//! Store access and orchestration live in `projtrack-db` and
//! `projtrack-reconcile`.

pub mod disambiguate;
pub mod enums;
pub mod error;
pub mod matcher;
pub mod normalize;
pub mod site_names;
pub mod types;
