//! [`CanonicalStore`] backed by PostgreSQL through the repository layer.

use async_trait::async_trait;
use projtrack_core::matcher::CaseKeyField;
use projtrack_core::types::{DbId, EntityType};
use sqlx::PgPool;

use crate::error::{StoreError, StoreResult};
use crate::models::{
    Audi, CreateAudi, CreateProjector, CreateProjectorModel, CreateServiceCase, CreateSite,
    Projector, ProjectorModel, ServiceCase, Site, UpdateAudi, UpdateProjector,
    UpdateProjectorModel, UpdateServiceCase, UpdateSite,
};
use crate::repositories::{AudiRepo, ProjectorModelRepo, ProjectorRepo, ServiceCaseRepo, SiteRepo};
use crate::store::{
    AudiFilter, CanonicalStore, CaseFilter, ProjectorFilter, ProjectorModelFilter, SiteFilter,
};

/// Postgres-backed canonical store. Cheap to clone; shares the pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Turn a repository `Option` result into `NotFound`.
fn found<T>(row: Option<T>, entity: EntityType, id: DbId) -> StoreResult<T> {
    row.ok_or_else(|| StoreError::not_found(entity, id))
}

/// Turn a repository delete flag into `NotFound`.
fn deleted(removed: bool, entity: EntityType, id: DbId) -> StoreResult<()> {
    if removed {
        Ok(())
    } else {
        Err(StoreError::not_found(entity, id))
    }
}

#[async_trait]
impl CanonicalStore for PgStore {
    // -- sites --

    async fn get_site(&self, id: DbId) -> StoreResult<Option<Site>> {
        Ok(SiteRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_sites(&self, filter: &SiteFilter) -> StoreResult<Vec<Site>> {
        Ok(SiteRepo::list(&self.pool, filter).await?)
    }

    async fn create_site(&self, input: &CreateSite) -> StoreResult<Site> {
        Ok(SiteRepo::create(&self.pool, input).await?)
    }

    async fn update_site(&self, id: DbId, input: &UpdateSite) -> StoreResult<Site> {
        found(
            SiteRepo::update(&self.pool, id, input).await?,
            EntityType::Site,
            id,
        )
    }

    async fn delete_site(&self, id: DbId) -> StoreResult<()> {
        deleted(SiteRepo::delete(&self.pool, id).await?, EntityType::Site, id)
    }

    // -- projector models --

    async fn get_projector_model(&self, id: DbId) -> StoreResult<Option<ProjectorModel>> {
        Ok(ProjectorModelRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_projector_model_by_model_no(
        &self,
        model_no: &str,
    ) -> StoreResult<Option<ProjectorModel>> {
        Ok(ProjectorModelRepo::find_by_model_no(&self.pool, model_no).await?)
    }

    async fn find_projector_models(
        &self,
        filter: &ProjectorModelFilter,
    ) -> StoreResult<Vec<ProjectorModel>> {
        Ok(ProjectorModelRepo::list(&self.pool, filter).await?)
    }

    async fn create_projector_model(
        &self,
        input: &CreateProjectorModel,
    ) -> StoreResult<ProjectorModel> {
        Ok(ProjectorModelRepo::create(&self.pool, input).await?)
    }

    async fn update_projector_model(
        &self,
        id: DbId,
        input: &UpdateProjectorModel,
    ) -> StoreResult<ProjectorModel> {
        found(
            ProjectorModelRepo::update(&self.pool, id, input).await?,
            EntityType::ProjectorModel,
            id,
        )
    }

    async fn delete_projector_model(&self, id: DbId) -> StoreResult<()> {
        deleted(
            ProjectorModelRepo::delete(&self.pool, id).await?,
            EntityType::ProjectorModel,
            id,
        )
    }

    // -- projectors --

    async fn get_projector(&self, id: DbId) -> StoreResult<Option<Projector>> {
        Ok(ProjectorRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_projector_by_serial(&self, serial: &str) -> StoreResult<Option<Projector>> {
        Ok(ProjectorRepo::find_by_serial(&self.pool, serial).await?)
    }

    async fn find_projectors(&self, filter: &ProjectorFilter) -> StoreResult<Vec<Projector>> {
        Ok(ProjectorRepo::list(&self.pool, filter).await?)
    }

    async fn create_projector(&self, input: &CreateProjector) -> StoreResult<Projector> {
        Ok(ProjectorRepo::create(&self.pool, input).await?)
    }

    async fn update_projector(&self, id: DbId, input: &UpdateProjector) -> StoreResult<Projector> {
        found(
            ProjectorRepo::update(&self.pool, id, input).await?,
            EntityType::Projector,
            id,
        )
    }

    async fn delete_projector(&self, id: DbId) -> StoreResult<()> {
        deleted(
            ProjectorRepo::delete(&self.pool, id).await?,
            EntityType::Projector,
            id,
        )
    }

    // -- audis --

    async fn get_audi(&self, id: DbId) -> StoreResult<Option<Audi>> {
        Ok(AudiRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_audis(&self, filter: &AudiFilter) -> StoreResult<Vec<Audi>> {
        Ok(AudiRepo::list(&self.pool, filter).await?)
    }

    async fn create_audi(&self, input: &CreateAudi) -> StoreResult<Audi> {
        Ok(AudiRepo::create(&self.pool, input).await?)
    }

    async fn update_audi(&self, id: DbId, input: &UpdateAudi) -> StoreResult<Audi> {
        found(
            AudiRepo::update(&self.pool, id, input).await?,
            EntityType::Audi,
            id,
        )
    }

    async fn delete_audi(&self, id: DbId) -> StoreResult<()> {
        deleted(AudiRepo::delete(&self.pool, id).await?, EntityType::Audi, id)
    }

    // -- service cases --

    async fn get_case(&self, id: DbId) -> StoreResult<Option<ServiceCase>> {
        Ok(ServiceCaseRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_case_by_key(
        &self,
        field: CaseKeyField,
        key: &str,
    ) -> StoreResult<Option<ServiceCase>> {
        Ok(ServiceCaseRepo::find_by_key(&self.pool, field, key).await?)
    }

    async fn find_cases(&self, filter: &CaseFilter) -> StoreResult<Vec<ServiceCase>> {
        // The SQL prefix match is wider than a key family ("K-x" passes);
        // narrow it to exact family members here.
        let rows = ServiceCaseRepo::list(&self.pool, filter).await?;
        Ok(rows.into_iter().filter(|c| filter.matches(c)).collect())
    }

    async fn create_case(&self, input: &CreateServiceCase) -> StoreResult<ServiceCase> {
        Ok(ServiceCaseRepo::create(&self.pool, input).await?)
    }

    async fn update_case(&self, id: DbId, input: &UpdateServiceCase) -> StoreResult<ServiceCase> {
        found(
            ServiceCaseRepo::update(&self.pool, id, input).await?,
            EntityType::Case,
            id,
        )
    }

    async fn delete_case(&self, id: DbId) -> StoreResult<()> {
        deleted(
            ServiceCaseRepo::delete(&self.pool, id).await?,
            EntityType::Case,
            id,
        )
    }
}
