//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use projtrack_core::matcher::CaseKeyField;
use projtrack_core::types::DbId;
use projtrack_db::models::{
    Audi, CreateAudi, CreateProjector, CreateProjectorModel, CreateServiceCase, CreateSite,
    Projector, ProjectorModel, ServiceCase, Site, UpdateAudi, UpdateProjector,
    UpdateProjectorModel, UpdateServiceCase, UpdateSite,
};
use projtrack_db::store::{AudiFilter, CaseFilter, ProjectorFilter, ProjectorModelFilter, SiteFilter};
use projtrack_db::{CanonicalStore, MemoryStore, StoreResult};
use projtrack_reconcile::{Engine, ReconcileConfig, VecSource};

// ---------------------------------------------------------------------------
// Engine and rows
// ---------------------------------------------------------------------------

pub fn engine(store: Arc<dyn CanonicalStore>) -> Engine {
    Engine::new(store, ReconcileConfig::default()).unwrap()
}

pub fn engine_with(store: Arc<dyn CanonicalStore>, config: ReconcileConfig) -> Engine {
    Engine::new(store, config).unwrap()
}

pub fn rows(rows: &[&[(&str, &str)]]) -> VecSource {
    VecSource::from_pairs(rows.iter().copied())
}

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

/// An installed projector: site, model, projector and the audi holding it.
pub struct Installed {
    pub site: Site,
    pub model: ProjectorModel,
    pub projector: Projector,
    pub audi: Audi,
}

pub async fn site(store: &MemoryStore, name: &str) -> Site {
    store
        .create_site(&CreateSite {
            name: name.to_string(),
        })
        .await
        .unwrap()
}

pub async fn model(store: &MemoryStore, model_no: &str) -> ProjectorModel {
    store
        .create_projector_model(&CreateProjectorModel {
            model_no: model_no.to_string(),
            manufacturer: Some("Christie".to_string()),
            specifications: None,
        })
        .await
        .unwrap()
}

pub async fn projector(store: &MemoryStore, serial: &str, model_id: DbId) -> Projector {
    store
        .create_projector(&CreateProjector {
            serial_number: serial.to_string(),
            projector_model_id: model_id,
            status: None,
        })
        .await
        .unwrap()
}

pub async fn audi(
    store: &MemoryStore,
    site_id: DbId,
    audi_no: &str,
    projector_id: Option<DbId>,
) -> Audi {
    store
        .create_audi(&CreateAudi {
            audi_no: audi_no.to_string(),
            site_id,
            projector_id,
        })
        .await
        .unwrap()
}

pub async fn case(
    store: &MemoryStore,
    call_log: Option<&str>,
    rma: Option<&str>,
    site_id: DbId,
    audi_id: Option<DbId>,
) -> ServiceCase {
    store
        .create_case(&CreateServiceCase {
            call_log_number: call_log.map(str::to_string),
            rma_number: rma.map(str::to_string),
            serial_number: None,
            site_id,
            audi_id,
            case_type: None,
            status: Some("open".to_string()),
            reported_on: None,
            payload: None,
        })
        .await
        .unwrap()
}

pub async fn installed(
    store: &MemoryStore,
    site_name: &str,
    audi_no: &str,
    serial: &str,
) -> Installed {
    let site = site(store, site_name).await;
    let model = model(store, "CP2220").await;
    let projector = projector(store, serial, model.id).await;
    let audi = audi(store, site.id, audi_no, Some(projector.id)).await;
    Installed {
        site,
        model,
        projector,
        audi,
    }
}

pub async fn all_cases(store: &dyn CanonicalStore) -> Vec<ServiceCase> {
    store.find_cases(&CaseFilter::default()).await.unwrap()
}

// ---------------------------------------------------------------------------
// Fault injection
// ---------------------------------------------------------------------------

/// Wraps a [`MemoryStore`] and misbehaves on `create_case`, or hides
/// projectors the way a store without the audi foreign key loses them.
pub struct FaultyStore {
    pub inner: Arc<MemoryStore>,
    /// Sleep this long before every `create_case`.
    create_case_delay: Option<Duration>,
    /// Number of `create_case` calls that first see a competing writer
    /// insert the very same case.
    races_left: AtomicUsize,
    /// Projectors that reads no longer return while audis still point at them.
    lost_projectors: HashSet<DbId>,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            create_case_delay: None,
            races_left: AtomicUsize::new(0),
            lost_projectors: HashSet::new(),
        }
    }

    pub fn slow_case_writes(mut self, delay: Duration) -> Self {
        self.create_case_delay = Some(delay);
        self
    }

    pub fn racing_case_writes(self, times: usize) -> Self {
        self.races_left.store(times, Ordering::SeqCst);
        self
    }

    pub fn losing_projector(mut self, id: DbId) -> Self {
        self.lost_projectors.insert(id);
        self
    }

    fn visible(&self, projector: &Projector) -> bool {
        !self.lost_projectors.contains(&projector.id)
    }
}

#[async_trait]
impl CanonicalStore for FaultyStore {
    async fn get_site(&self, id: DbId) -> StoreResult<Option<Site>> {
        self.inner.get_site(id).await
    }
    async fn find_sites(&self, filter: &SiteFilter) -> StoreResult<Vec<Site>> {
        self.inner.find_sites(filter).await
    }
    async fn create_site(&self, input: &CreateSite) -> StoreResult<Site> {
        self.inner.create_site(input).await
    }
    async fn update_site(&self, id: DbId, input: &UpdateSite) -> StoreResult<Site> {
        self.inner.update_site(id, input).await
    }
    async fn delete_site(&self, id: DbId) -> StoreResult<()> {
        self.inner.delete_site(id).await
    }

    async fn get_projector_model(&self, id: DbId) -> StoreResult<Option<ProjectorModel>> {
        self.inner.get_projector_model(id).await
    }
    async fn find_projector_model_by_model_no(
        &self,
        model_no: &str,
    ) -> StoreResult<Option<ProjectorModel>> {
        self.inner.find_projector_model_by_model_no(model_no).await
    }
    async fn find_projector_models(
        &self,
        filter: &ProjectorModelFilter,
    ) -> StoreResult<Vec<ProjectorModel>> {
        self.inner.find_projector_models(filter).await
    }
    async fn create_projector_model(
        &self,
        input: &CreateProjectorModel,
    ) -> StoreResult<ProjectorModel> {
        self.inner.create_projector_model(input).await
    }
    async fn update_projector_model(
        &self,
        id: DbId,
        input: &UpdateProjectorModel,
    ) -> StoreResult<ProjectorModel> {
        self.inner.update_projector_model(id, input).await
    }
    async fn delete_projector_model(&self, id: DbId) -> StoreResult<()> {
        self.inner.delete_projector_model(id).await
    }

    async fn get_projector(&self, id: DbId) -> StoreResult<Option<Projector>> {
        Ok(self.inner.get_projector(id).await?.filter(|p| self.visible(p)))
    }
    async fn find_projector_by_serial(&self, serial: &str) -> StoreResult<Option<Projector>> {
        Ok(self
            .inner
            .find_projector_by_serial(serial)
            .await?
            .filter(|p| self.visible(p)))
    }
    async fn find_projectors(&self, filter: &ProjectorFilter) -> StoreResult<Vec<Projector>> {
        let mut found = self.inner.find_projectors(filter).await?;
        found.retain(|p| self.visible(p));
        Ok(found)
    }
    async fn create_projector(&self, input: &CreateProjector) -> StoreResult<Projector> {
        self.inner.create_projector(input).await
    }
    async fn update_projector(&self, id: DbId, input: &UpdateProjector) -> StoreResult<Projector> {
        self.inner.update_projector(id, input).await
    }
    async fn delete_projector(&self, id: DbId) -> StoreResult<()> {
        self.inner.delete_projector(id).await
    }

    async fn get_audi(&self, id: DbId) -> StoreResult<Option<Audi>> {
        self.inner.get_audi(id).await
    }
    async fn find_audis(&self, filter: &AudiFilter) -> StoreResult<Vec<Audi>> {
        self.inner.find_audis(filter).await
    }
    async fn create_audi(&self, input: &CreateAudi) -> StoreResult<Audi> {
        self.inner.create_audi(input).await
    }
    async fn update_audi(&self, id: DbId, input: &UpdateAudi) -> StoreResult<Audi> {
        self.inner.update_audi(id, input).await
    }
    async fn delete_audi(&self, id: DbId) -> StoreResult<()> {
        self.inner.delete_audi(id).await
    }

    async fn get_case(&self, id: DbId) -> StoreResult<Option<ServiceCase>> {
        self.inner.get_case(id).await
    }
    async fn find_case_by_key(
        &self,
        field: CaseKeyField,
        key: &str,
    ) -> StoreResult<Option<ServiceCase>> {
        self.inner.find_case_by_key(field, key).await
    }
    async fn find_cases(&self, filter: &CaseFilter) -> StoreResult<Vec<ServiceCase>> {
        self.inner.find_cases(filter).await
    }
    async fn create_case(&self, input: &CreateServiceCase) -> StoreResult<ServiceCase> {
        if let Some(delay) = self.create_case_delay {
            tokio::time::sleep(delay).await;
        }
        let raced = self
            .races_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if raced {
            let mut competitor = input.clone();
            competitor.payload = Some(serde_json::json!({ "writer": "competitor" }));
            self.inner.create_case(&competitor).await?;
        }
        self.inner.create_case(input).await
    }
    async fn update_case(&self, id: DbId, input: &UpdateServiceCase) -> StoreResult<ServiceCase> {
        self.inner.update_case(id, input).await
    }
    async fn delete_case(&self, id: DbId) -> StoreResult<()> {
        self.inner.delete_case(id).await
    }
}
