//! The canonical store contract.
//!
//! The reconciliation engine only ever talks to storage through
//! [`CanonicalStore`]. Every method is a single read or write; the engine
//! wraps each call in its own timeout and serializes writes to a shared
//! natural key itself, so implementations only need read-your-writes
//! consistency.

use async_trait::async_trait;
use projtrack_core::disambiguate::in_family;
use projtrack_core::matcher::CaseKeyField;
use projtrack_core::site_names::site_match_key;
use projtrack_core::types::DbId;

use crate::error::StoreResult;
use crate::models::{
    Audi, CreateAudi, CreateProjector, CreateProjectorModel, CreateServiceCase, CreateSite,
    Projector, ProjectorModel, ServiceCase, Site, UpdateAudi, UpdateProjector,
    UpdateProjectorModel, UpdateServiceCase, UpdateSite,
};

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------
//
// Every `Some` field narrows the result; fields are AND-ed. An empty filter
// selects every row. Results are always ordered by id ascending.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteFilter {
    /// Compared by [`site_match_key`]: trimmed, whitespace-collapsed,
    /// case-insensitive.
    pub name: Option<String>,
}

impl SiteFilter {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }

    pub fn matches(&self, site: &Site) -> bool {
        self.name
            .as_deref()
            .is_none_or(|n| site_match_key(&site.name) == site_match_key(n))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectorModelFilter {
    pub manufacturer: Option<String>,
}

impl ProjectorModelFilter {
    pub fn matches(&self, model: &ProjectorModel) -> bool {
        self.manufacturer.as_deref().is_none_or(|m| {
            model
                .manufacturer
                .as_deref()
                .is_some_and(|have| have.eq_ignore_ascii_case(m))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectorFilter {
    pub serial_number: Option<String>,
    pub projector_model_id: Option<DbId>,
}

impl ProjectorFilter {
    pub fn matches(&self, projector: &Projector) -> bool {
        self.serial_number
            .as_deref()
            .is_none_or(|s| projector.serial_number.eq_ignore_ascii_case(s))
            && self
                .projector_model_id
                .is_none_or(|m| projector.projector_model_id == m)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudiFilter {
    pub site_id: Option<DbId>,
    /// Case-insensitive.
    pub audi_no: Option<String>,
    pub projector_id: Option<DbId>,
}

impl AudiFilter {
    pub fn by_site(site_id: DbId) -> Self {
        Self {
            site_id: Some(site_id),
            ..Self::default()
        }
    }

    pub fn by_projector(projector_id: DbId) -> Self {
        Self {
            projector_id: Some(projector_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, audi: &Audi) -> bool {
        self.site_id.is_none_or(|s| audi.site_id == s)
            && self
                .audi_no
                .as_deref()
                .is_none_or(|n| audi.audi_no.eq_ignore_ascii_case(n))
            && self.projector_id.is_none_or(|p| audi.projector_id == Some(p))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseFilter {
    /// Cases whose call log number is in this key's family (`K`, `K-1`, ...).
    pub call_log_family: Option<String>,
    /// Cases whose RMA number is in this key's family.
    pub rma_family: Option<String>,
    pub serial_number: Option<String>,
    pub site_id: Option<DbId>,
    pub audi_id: Option<DbId>,
}

impl CaseFilter {
    /// Cases whose `field` belongs to the family of `base`.
    pub fn key_family(field: CaseKeyField, base: impl Into<String>) -> Self {
        let base = Some(base.into());
        match field {
            CaseKeyField::CallLogNumber => Self {
                call_log_family: base,
                ..Self::default()
            },
            CaseKeyField::RmaNumber => Self {
                rma_family: base,
                ..Self::default()
            },
        }
    }

    pub fn by_site(site_id: DbId) -> Self {
        Self {
            site_id: Some(site_id),
            ..Self::default()
        }
    }

    pub fn by_audi(audi_id: DbId) -> Self {
        Self {
            audi_id: Some(audi_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, case: &ServiceCase) -> bool {
        fn family(value: Option<&str>, base: Option<&str>) -> bool {
            base.is_none_or(|b| value.is_some_and(|v| in_family(v, b)))
        }

        family(case.call_log_number.as_deref(), self.call_log_family.as_deref())
            && family(case.rma_number.as_deref(), self.rma_family.as_deref())
            && self.serial_number.as_deref().is_none_or(|s| {
                case.serial_number
                    .as_deref()
                    .is_some_and(|have| have.eq_ignore_ascii_case(s))
            })
            && self.site_id.is_none_or(|s| case.site_id == s)
            && self.audi_id.is_none_or(|a| case.audi_id == Some(a))
    }
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// CRUD and query access to the five canonical entity types.
///
/// - `get_*` and `find_*_by_*` return `Ok(None)` when nothing matches.
/// - `update_*` and `delete_*` return [`StoreError::NotFound`] for an
///   unknown id.
/// - Writes that collide with a unique index return
///   [`StoreError::UniqueViolation`]; deletes that would leave dependents
///   dangling return [`StoreError::ForeignKeyViolation`].
///
/// [`StoreError::NotFound`]: crate::error::StoreError::NotFound
/// [`StoreError::UniqueViolation`]: crate::error::StoreError::UniqueViolation
/// [`StoreError::ForeignKeyViolation`]: crate::error::StoreError::ForeignKeyViolation
#[async_trait]
pub trait CanonicalStore: Send + Sync {
    // -- sites --

    async fn get_site(&self, id: DbId) -> StoreResult<Option<Site>>;
    async fn find_sites(&self, filter: &SiteFilter) -> StoreResult<Vec<Site>>;
    async fn create_site(&self, input: &CreateSite) -> StoreResult<Site>;
    async fn update_site(&self, id: DbId, input: &UpdateSite) -> StoreResult<Site>;
    async fn delete_site(&self, id: DbId) -> StoreResult<()>;

    // -- projector models --

    async fn get_projector_model(&self, id: DbId) -> StoreResult<Option<ProjectorModel>>;
    async fn find_projector_model_by_model_no(
        &self,
        model_no: &str,
    ) -> StoreResult<Option<ProjectorModel>>;
    async fn find_projector_models(
        &self,
        filter: &ProjectorModelFilter,
    ) -> StoreResult<Vec<ProjectorModel>>;
    async fn create_projector_model(
        &self,
        input: &CreateProjectorModel,
    ) -> StoreResult<ProjectorModel>;
    async fn update_projector_model(
        &self,
        id: DbId,
        input: &UpdateProjectorModel,
    ) -> StoreResult<ProjectorModel>;
    async fn delete_projector_model(&self, id: DbId) -> StoreResult<()>;

    // -- projectors --

    async fn get_projector(&self, id: DbId) -> StoreResult<Option<Projector>>;
    async fn find_projector_by_serial(&self, serial: &str) -> StoreResult<Option<Projector>>;
    async fn find_projectors(&self, filter: &ProjectorFilter) -> StoreResult<Vec<Projector>>;
    async fn create_projector(&self, input: &CreateProjector) -> StoreResult<Projector>;
    async fn update_projector(&self, id: DbId, input: &UpdateProjector) -> StoreResult<Projector>;
    async fn delete_projector(&self, id: DbId) -> StoreResult<()>;

    // -- audis --

    async fn get_audi(&self, id: DbId) -> StoreResult<Option<Audi>>;
    async fn find_audis(&self, filter: &AudiFilter) -> StoreResult<Vec<Audi>>;
    async fn create_audi(&self, input: &CreateAudi) -> StoreResult<Audi>;
    async fn update_audi(&self, id: DbId, input: &UpdateAudi) -> StoreResult<Audi>;
    async fn delete_audi(&self, id: DbId) -> StoreResult<()>;

    // -- service cases --

    async fn get_case(&self, id: DbId) -> StoreResult<Option<ServiceCase>>;
    /// Exact lookup on one natural key (no family expansion).
    async fn find_case_by_key(
        &self,
        field: CaseKeyField,
        key: &str,
    ) -> StoreResult<Option<ServiceCase>>;
    async fn find_cases(&self, filter: &CaseFilter) -> StoreResult<Vec<ServiceCase>>;
    async fn create_case(&self, input: &CreateServiceCase) -> StoreResult<ServiceCase>;
    async fn update_case(&self, id: DbId, input: &UpdateServiceCase) -> StoreResult<ServiceCase>;
    async fn delete_case(&self, id: DbId) -> StoreResult<()>;
}
