//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod audi_repo;
pub mod projector_model_repo;
pub mod projector_repo;
pub mod service_case_repo;
pub mod site_repo;

pub use audi_repo::AudiRepo;
pub use projector_model_repo::ProjectorModelRepo;
pub use projector_repo::ProjectorRepo;
pub use service_case_repo::ServiceCaseRepo;
pub use site_repo::SiteRepo;
