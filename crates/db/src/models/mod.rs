//! Row structs and DTOs for the canonical entity tables.
//!
//! Each model implements the matching identity trait from
//! `projtrack_core::matcher` so store query results can be fed straight
//! into the rule chains.

pub mod audi;
pub mod projector;
pub mod projector_model;
pub mod service_case;
pub mod site;

pub use audi::{Audi, CreateAudi, UpdateAudi};
pub use projector::{CreateProjector, Projector, UpdateProjector};
pub use projector_model::{CreateProjectorModel, ProjectorModel, UpdateProjectorModel};
pub use service_case::{CreateServiceCase, ServiceCase, UpdateServiceCase};
pub use site::{CreateSite, Site, UpdateSite};
