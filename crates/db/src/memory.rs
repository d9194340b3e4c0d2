//! In-memory [`CanonicalStore`].
//!
//! Mirrors the Postgres schema closely enough for the engine's tests and for
//! dry runs: the same unique constraints, restrictive foreign keys on sites,
//! models and audis, and `ON DELETE SET NULL` for audi projector links.
//!
//! `created_at` comes from a logical clock that ticks once per write, which
//! keeps tie-breaks on creation order deterministic.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use projtrack_core::matcher::{CaseIdentity, CaseKeyField};
use projtrack_core::types::{DbId, EntityType, Timestamp};
use tokio::sync::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::models::{
    Audi, CreateAudi, CreateProjector, CreateProjectorModel, CreateServiceCase, CreateSite,
    Projector, ProjectorModel, ServiceCase, Site, UpdateAudi, UpdateProjector,
    UpdateProjectorModel, UpdateServiceCase, UpdateSite,
};
use crate::store::{
    AudiFilter, CanonicalStore, CaseFilter, ProjectorFilter, ProjectorModelFilter, SiteFilter,
};

/// 2026-01-01T00:00:00Z, the logical clock's origin.
const CLOCK_ORIGIN_SECS: i64 = 1_767_225_600;

const UQ_MODEL_NO: &str = "uq_projector_models_model_no";
const UQ_SERIAL_NUMBER: &str = "uq_projectors_serial_number";
const UQ_CALL_LOG_NUMBER: &str = "uq_cases_call_log_number";
const UQ_RMA_NUMBER: &str = "uq_cases_rma_number";

const FK_PROJECTOR_MODEL: &str = "projectors_projector_model_id_fkey";
const FK_AUDI_SITE: &str = "audis_site_id_fkey";
const FK_AUDI_PROJECTOR: &str = "audis_projector_id_fkey";
const FK_CASE_SITE: &str = "service_cases_site_id_fkey";
const FK_CASE_AUDI: &str = "service_cases_audi_id_fkey";

#[derive(Debug, Default)]
struct Tables {
    next_id: DbId,
    ticks: i64,
    sites: BTreeMap<DbId, Site>,
    models: BTreeMap<DbId, ProjectorModel>,
    projectors: BTreeMap<DbId, Projector>,
    audis: BTreeMap<DbId, Audi>,
    cases: BTreeMap<DbId, ServiceCase>,
}

impl Tables {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    fn tick(&mut self) -> Timestamp {
        self.ticks += 1;
        DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(CLOCK_ORIGIN_SECS + self.ticks)
    }

    fn require_site(&self, id: DbId, constraint: &str) -> StoreResult<()> {
        if self.sites.contains_key(&id) {
            Ok(())
        } else {
            Err(fk_violation(constraint))
        }
    }

    fn require_projector(&self, id: Option<DbId>) -> StoreResult<()> {
        match id {
            Some(id) if !self.projectors.contains_key(&id) => Err(fk_violation(FK_AUDI_PROJECTOR)),
            _ => Ok(()),
        }
    }

    fn case_key_taken(&self, field: CaseKeyField, key: &str) -> bool {
        self.cases.values().any(|c| c.case_key(field) == Some(key))
    }
}

fn unique_violation(constraint: &str) -> StoreError {
    StoreError::UniqueViolation {
        constraint: constraint.to_string(),
    }
}

fn fk_violation(constraint: &str) -> StoreError {
    StoreError::ForeignKeyViolation {
        constraint: constraint.to_string(),
    }
}

fn select<T: Clone>(table: &BTreeMap<DbId, T>, keep: impl Fn(&T) -> bool) -> Vec<T> {
    table.values().filter(|row| keep(row)).cloned().collect()
}

/// Canonical store held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CanonicalStore for MemoryStore {
    // -- sites --

    async fn get_site(&self, id: DbId) -> StoreResult<Option<Site>> {
        Ok(self.tables.lock().await.sites.get(&id).cloned())
    }

    async fn find_sites(&self, filter: &SiteFilter) -> StoreResult<Vec<Site>> {
        Ok(select(&self.tables.lock().await.sites, |s| filter.matches(s)))
    }

    async fn create_site(&self, input: &CreateSite) -> StoreResult<Site> {
        let mut t = self.tables.lock().await;
        let now = t.tick();
        let site = Site {
            id: t.next_id(),
            name: input.name.clone(),
            created_at: now,
            updated_at: now,
        };
        t.sites.insert(site.id, site.clone());
        Ok(site)
    }

    async fn update_site(&self, id: DbId, input: &UpdateSite) -> StoreResult<Site> {
        let mut t = self.tables.lock().await;
        let now = t.tick();
        let site = t
            .sites
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(EntityType::Site, id))?;
        if let Some(name) = &input.name {
            site.name = name.clone();
        }
        site.updated_at = now;
        Ok(site.clone())
    }

    async fn delete_site(&self, id: DbId) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        if !t.sites.contains_key(&id) {
            return Err(StoreError::not_found(EntityType::Site, id));
        }
        if t.audis.values().any(|a| a.site_id == id) {
            return Err(fk_violation(FK_AUDI_SITE));
        }
        if t.cases.values().any(|c| c.site_id == id) {
            return Err(fk_violation(FK_CASE_SITE));
        }
        t.sites.remove(&id);
        Ok(())
    }

    // -- projector models --

    async fn get_projector_model(&self, id: DbId) -> StoreResult<Option<ProjectorModel>> {
        Ok(self.tables.lock().await.models.get(&id).cloned())
    }

    async fn find_projector_model_by_model_no(
        &self,
        model_no: &str,
    ) -> StoreResult<Option<ProjectorModel>> {
        let t = self.tables.lock().await;
        Ok(t.models
            .values()
            .find(|m| m.model_no.eq_ignore_ascii_case(model_no))
            .cloned())
    }

    async fn find_projector_models(
        &self,
        filter: &ProjectorModelFilter,
    ) -> StoreResult<Vec<ProjectorModel>> {
        Ok(select(&self.tables.lock().await.models, |m| filter.matches(m)))
    }

    async fn create_projector_model(
        &self,
        input: &CreateProjectorModel,
    ) -> StoreResult<ProjectorModel> {
        let mut t = self.tables.lock().await;
        if t.models.values().any(|m| m.model_no == input.model_no) {
            return Err(unique_violation(UQ_MODEL_NO));
        }
        let now = t.tick();
        let model = ProjectorModel {
            id: t.next_id(),
            model_no: input.model_no.clone(),
            manufacturer: input.manufacturer.clone(),
            specifications: input.specifications.clone(),
            created_at: now,
            updated_at: now,
        };
        t.models.insert(model.id, model.clone());
        Ok(model)
    }

    async fn update_projector_model(
        &self,
        id: DbId,
        input: &UpdateProjectorModel,
    ) -> StoreResult<ProjectorModel> {
        let mut t = self.tables.lock().await;
        let now = t.tick();
        let model = t
            .models
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(EntityType::ProjectorModel, id))?;
        if let Some(manufacturer) = &input.manufacturer {
            model.manufacturer = Some(manufacturer.clone());
        }
        if let Some(specifications) = &input.specifications {
            model.specifications = Some(specifications.clone());
        }
        model.updated_at = now;
        Ok(model.clone())
    }

    async fn delete_projector_model(&self, id: DbId) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        if !t.models.contains_key(&id) {
            return Err(StoreError::not_found(EntityType::ProjectorModel, id));
        }
        if t.projectors.values().any(|p| p.projector_model_id == id) {
            return Err(fk_violation(FK_PROJECTOR_MODEL));
        }
        t.models.remove(&id);
        Ok(())
    }

    // -- projectors --

    async fn get_projector(&self, id: DbId) -> StoreResult<Option<Projector>> {
        Ok(self.tables.lock().await.projectors.get(&id).cloned())
    }

    async fn find_projector_by_serial(&self, serial: &str) -> StoreResult<Option<Projector>> {
        let t = self.tables.lock().await;
        Ok(t.projectors
            .values()
            .find(|p| p.serial_number.eq_ignore_ascii_case(serial))
            .cloned())
    }

    async fn find_projectors(&self, filter: &ProjectorFilter) -> StoreResult<Vec<Projector>> {
        Ok(select(&self.tables.lock().await.projectors, |p| {
            filter.matches(p)
        }))
    }

    async fn create_projector(&self, input: &CreateProjector) -> StoreResult<Projector> {
        let mut t = self.tables.lock().await;
        if t.projectors
            .values()
            .any(|p| p.serial_number == input.serial_number)
        {
            return Err(unique_violation(UQ_SERIAL_NUMBER));
        }
        if !t.models.contains_key(&input.projector_model_id) {
            return Err(fk_violation(FK_PROJECTOR_MODEL));
        }
        let now = t.tick();
        let projector = Projector {
            id: t.next_id(),
            serial_number: input.serial_number.clone(),
            projector_model_id: input.projector_model_id,
            status: input.status.clone(),
            created_at: now,
            updated_at: now,
        };
        t.projectors.insert(projector.id, projector.clone());
        Ok(projector)
    }

    async fn update_projector(&self, id: DbId, input: &UpdateProjector) -> StoreResult<Projector> {
        let mut t = self.tables.lock().await;
        if let Some(model_id) = input.projector_model_id {
            if !t.models.contains_key(&model_id) {
                return Err(fk_violation(FK_PROJECTOR_MODEL));
            }
        }
        let now = t.tick();
        let projector = t
            .projectors
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(EntityType::Projector, id))?;
        if let Some(model_id) = input.projector_model_id {
            projector.projector_model_id = model_id;
        }
        if let Some(status) = &input.status {
            projector.status = Some(status.clone());
        }
        projector.updated_at = now;
        Ok(projector.clone())
    }

    async fn delete_projector(&self, id: DbId) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        if t.projectors.remove(&id).is_none() {
            return Err(StoreError::not_found(EntityType::Projector, id));
        }
        for audi in t.audis.values_mut() {
            if audi.projector_id == Some(id) {
                audi.projector_id = None;
            }
        }
        Ok(())
    }

    // -- audis --

    async fn get_audi(&self, id: DbId) -> StoreResult<Option<Audi>> {
        Ok(self.tables.lock().await.audis.get(&id).cloned())
    }

    async fn find_audis(&self, filter: &AudiFilter) -> StoreResult<Vec<Audi>> {
        Ok(select(&self.tables.lock().await.audis, |a| filter.matches(a)))
    }

    async fn create_audi(&self, input: &CreateAudi) -> StoreResult<Audi> {
        let mut t = self.tables.lock().await;
        t.require_site(input.site_id, FK_AUDI_SITE)?;
        t.require_projector(input.projector_id)?;
        let now = t.tick();
        let audi = Audi {
            id: t.next_id(),
            audi_no: input.audi_no.clone(),
            site_id: input.site_id,
            projector_id: input.projector_id,
            created_at: now,
            updated_at: now,
        };
        t.audis.insert(audi.id, audi.clone());
        Ok(audi)
    }

    async fn update_audi(&self, id: DbId, input: &UpdateAudi) -> StoreResult<Audi> {
        let mut t = self.tables.lock().await;
        if let Some(site_id) = input.site_id {
            t.require_site(site_id, FK_AUDI_SITE)?;
        }
        if let Some(projector_id) = input.projector_id {
            t.require_projector(projector_id)?;
        }
        let now = t.tick();
        let audi = t
            .audis
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(EntityType::Audi, id))?;
        if let Some(site_id) = input.site_id {
            audi.site_id = site_id;
        }
        if let Some(projector_id) = input.projector_id {
            audi.projector_id = projector_id;
        }
        audi.updated_at = now;
        Ok(audi.clone())
    }

    async fn delete_audi(&self, id: DbId) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        if !t.audis.contains_key(&id) {
            return Err(StoreError::not_found(EntityType::Audi, id));
        }
        if t.cases.values().any(|c| c.audi_id == Some(id)) {
            return Err(fk_violation(FK_CASE_AUDI));
        }
        t.audis.remove(&id);
        Ok(())
    }

    // -- service cases --

    async fn get_case(&self, id: DbId) -> StoreResult<Option<ServiceCase>> {
        Ok(self.tables.lock().await.cases.get(&id).cloned())
    }

    async fn find_case_by_key(
        &self,
        field: CaseKeyField,
        key: &str,
    ) -> StoreResult<Option<ServiceCase>> {
        let t = self.tables.lock().await;
        Ok(t.cases
            .values()
            .find(|c| c.case_key(field) == Some(key))
            .cloned())
    }

    async fn find_cases(&self, filter: &CaseFilter) -> StoreResult<Vec<ServiceCase>> {
        Ok(select(&self.tables.lock().await.cases, |c| filter.matches(c)))
    }

    async fn create_case(&self, input: &CreateServiceCase) -> StoreResult<ServiceCase> {
        let mut t = self.tables.lock().await;
        if let Some(key) = &input.call_log_number {
            if t.case_key_taken(CaseKeyField::CallLogNumber, key) {
                return Err(unique_violation(UQ_CALL_LOG_NUMBER));
            }
        }
        if let Some(key) = &input.rma_number {
            if t.case_key_taken(CaseKeyField::RmaNumber, key) {
                return Err(unique_violation(UQ_RMA_NUMBER));
            }
        }
        t.require_site(input.site_id, FK_CASE_SITE)?;
        if let Some(audi_id) = input.audi_id {
            if !t.audis.contains_key(&audi_id) {
                return Err(fk_violation(FK_CASE_AUDI));
            }
        }
        let now = t.tick();
        let case = ServiceCase {
            id: t.next_id(),
            call_log_number: input.call_log_number.clone(),
            rma_number: input.rma_number.clone(),
            serial_number: input.serial_number.clone(),
            site_id: input.site_id,
            audi_id: input.audi_id,
            case_type: input.case_type.clone(),
            status: input.status.clone(),
            reported_on: input.reported_on,
            payload: input
                .payload
                .clone()
                .unwrap_or_else(|| serde_json::json!({})),
            created_at: now,
            updated_at: now,
        };
        t.cases.insert(case.id, case.clone());
        Ok(case)
    }

    async fn update_case(&self, id: DbId, input: &UpdateServiceCase) -> StoreResult<ServiceCase> {
        let mut t = self.tables.lock().await;
        if let Some(site_id) = input.site_id {
            t.require_site(site_id, FK_CASE_SITE)?;
        }
        if let Some(Some(audi_id)) = input.audi_id {
            if !t.audis.contains_key(&audi_id) {
                return Err(fk_violation(FK_CASE_AUDI));
            }
        }
        let now = t.tick();
        let case = t
            .cases
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(EntityType::Case, id))?;
        if let Some(site_id) = input.site_id {
            case.site_id = site_id;
        }
        if let Some(audi_id) = input.audi_id {
            case.audi_id = audi_id;
        }
        if let Some(status) = &input.status {
            case.status = Some(status.clone());
        }
        case.updated_at = now;
        Ok(case.clone())
    }

    async fn delete_case(&self, id: DbId) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        match t.cases.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StoreError::not_found(EntityType::Case, id)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
