//! Per-row reconciliation.
//!
//! A row walks the entity types in dependency order: Site, ProjectorModel,
//! Projector, Audi, Case. Each stage matches the row's keys against a
//! narrow candidate pool and then reuses, corrects, creates, or reports.
//!
//! Ambiguity and referential gaps are recorded and the row carries on with
//! the stages that do not depend on the unresolved entity. Store failures,
//! timeouts and invariant violations abort the rest of the row; entities
//! written by earlier stages stay in place.

use projtrack_core::matcher::{
    match_audi, match_case, match_projector, match_projector_model, match_site, AudiKeys,
    CaseKeyField, Identified, MatchResult,
};
use projtrack_core::site_names::site_match_key;
use projtrack_core::types::{DbId, EntityType};
use projtrack_db::models::{
    Audi, CreateAudi, CreateProjector, CreateProjectorModel, CreateServiceCase, CreateSite,
    Projector, ProjectorModel, ServiceCase, Site, UpdateAudi, UpdateProjector,
    UpdateProjectorModel, UpdateServiceCase,
};
use projtrack_db::store::{AudiFilter, CaseFilter, SiteFilter};

use crate::diagnostics::{Diagnostic, DiagnosticsSink, Outcome};
use crate::disambiguator::{self, SharedIndex};
use crate::error::ReconcileError;
use crate::locks::{self, KeyLocks};
use crate::row::NormalizedRow;
use crate::timed::TimedStore;

/// Diagnostics and status of one reconciled row.
#[derive(Debug, Clone)]
pub(crate) struct RowReport {
    pub index: usize,
    pub diagnostics: Vec<Diagnostic>,
    /// The row was aborted part-way.
    pub failed: bool,
}

/// Entities a row resolved so far.
#[derive(Debug, Default)]
struct Resolved {
    site: Option<Site>,
    projector: Option<Projector>,
    audi: Option<Audi>,
}

/// Where a case's audi link came from.
enum AudiLink {
    Resolved(Audi),
    Gap(ReconcileError),
}

pub(crate) struct Reconciler<'a> {
    pub store: &'a TimedStore,
    pub locks: &'a KeyLocks,
    pub index: &'a SharedIndex,
    pub sink: &'a dyn DiagnosticsSink,
    pub max_suffix_attempts: u32,
}

impl Reconciler<'_> {
    pub(crate) async fn reconcile_row(&self, row: &NormalizedRow) -> RowReport {
        let mut out = Vec::new();
        let failed = match self.run_stages(row, &mut out).await {
            Ok(()) => false,
            Err((entity, err)) => {
                tracing::error!(row_index = row.index, %entity, error = %err, "Row aborted");
                out.push(Diagnostic::from_error(row.index, Some(entity), &err));
                true
            }
        };

        for diagnostic in &out {
            self.sink.record(diagnostic);
        }
        RowReport {
            index: row.index,
            diagnostics: out,
            failed,
        }
    }

    async fn run_stages(
        &self,
        row: &NormalizedRow,
        out: &mut Vec<Diagnostic>,
    ) -> Result<(), (EntityType, ReconcileError)> {
        let site = self
            .site(row, out)
            .await
            .map_err(|e| (EntityType::Site, e))?;
        let model = self
            .projector_model(row, out)
            .await
            .map_err(|e| (EntityType::ProjectorModel, e))?;
        let projector = self
            .projector(row, model.as_ref(), out)
            .await
            .map_err(|e| (EntityType::Projector, e))?;
        let mut resolved = Resolved {
            site,
            projector,
            audi: None,
        };
        resolved.audi = self
            .audi(row, &resolved, out)
            .await
            .map_err(|e| (EntityType::Audi, e))?;
        self.case(row, &resolved, out)
            .await
            .map_err(|e| (EntityType::Case, e))?;
        Ok(())
    }

    // -- sites --

    async fn site(
        &self,
        row: &NormalizedRow,
        out: &mut Vec<Diagnostic>,
    ) -> Result<Option<Site>, ReconcileError> {
        let Some(name) = row.site_name.as_deref() else {
            return Ok(None);
        };
        let _guard = self.locks.lock(locks::site_key(&site_match_key(name))).await;

        let filter = SiteFilter::by_name(name);
        let pool = self.store.timed("find_sites", self.store.find_sites(&filter)).await?;

        match match_site(name, &pool) {
            MatchResult::Unique(site) => {
                out.push(matched(row, EntityType::Site, site.id));
                Ok(Some(site))
            }
            MatchResult::None => {
                let input = CreateSite {
                    name: name.to_string(),
                };
                let site = self.store.timed("create_site", self.store.create_site(&input)).await?;
                tracing::debug!(row_index = row.index, site_id = site.id, site_name = name, "Site created");
                out.push(created(row, EntityType::Site, site.id));
                Ok(Some(site))
            }
            ambiguous => {
                out.push(self.ambiguous(row, EntityType::Site, name, &ambiguous));
                Ok(None)
            }
        }
    }

    // -- projector models --

    async fn projector_model(
        &self,
        row: &NormalizedRow,
        out: &mut Vec<Diagnostic>,
    ) -> Result<Option<ProjectorModel>, ReconcileError> {
        let Some(model_no) = row.model_no.as_deref() else {
            return Ok(None);
        };
        let _guard = self.locks.lock(locks::model_key(model_no)).await;

        let pool: Vec<ProjectorModel> = self
            .store
            .timed(
                "find_projector_model_by_model_no",
                self.store.find_projector_model_by_model_no(model_no),
            )
            .await?
            .into_iter()
            .collect();

        match match_projector_model(model_no, &pool) {
            MatchResult::Unique(model) => {
                let corrected = row
                    .manufacturer
                    .as_ref()
                    .filter(|m| model.manufacturer.as_ref() != Some(*m));
                let Some(manufacturer) = corrected else {
                    out.push(matched(row, EntityType::ProjectorModel, model.id));
                    return Ok(Some(model));
                };
                let input = UpdateProjectorModel {
                    manufacturer: Some(manufacturer.clone()),
                    specifications: None,
                };
                let model = self
                    .store
                    .timed(
                        "update_projector_model",
                        self.store.update_projector_model(model.id, &input),
                    )
                    .await?;
                out.push(updated(row, EntityType::ProjectorModel, model.id, "manufacturer"));
                Ok(Some(model))
            }
            MatchResult::None => {
                let input = CreateProjectorModel {
                    model_no: model_no.to_string(),
                    manufacturer: row.manufacturer.clone(),
                    specifications: None,
                };
                let model = self
                    .store
                    .timed(
                        "create_projector_model",
                        self.store.create_projector_model(&input),
                    )
                    .await?;
                out.push(created(row, EntityType::ProjectorModel, model.id));
                Ok(Some(model))
            }
            ambiguous => {
                out.push(self.ambiguous(row, EntityType::ProjectorModel, model_no, &ambiguous));
                Ok(None)
            }
        }
    }

    // -- projectors --

    async fn projector(
        &self,
        row: &NormalizedRow,
        model: Option<&ProjectorModel>,
        out: &mut Vec<Diagnostic>,
    ) -> Result<Option<Projector>, ReconcileError> {
        let Some(serial) = row.serial_number.as_deref() else {
            return Ok(None);
        };
        let _guard = self.locks.lock(locks::projector_key(serial)).await;

        let pool: Vec<Projector> = self
            .store
            .timed(
                "find_projector_by_serial",
                self.store.find_projector_by_serial(serial),
            )
            .await?
            .into_iter()
            .collect();

        match match_projector(serial, &pool) {
            MatchResult::Unique(projector) => {
                let input = UpdateProjector {
                    projector_model_id: model
                        .map(|m| m.id)
                        .filter(|id| *id != projector.projector_model_id),
                    status: row
                        .projector_status
                        .clone()
                        .filter(|s| projector.status.as_ref() != Some(s)),
                };
                if input.is_empty() {
                    out.push(matched(row, EntityType::Projector, projector.id));
                    return Ok(Some(projector));
                }
                let projector = self
                    .store
                    .timed(
                        "update_projector",
                        self.store.update_projector(projector.id, &input),
                    )
                    .await?;
                out.push(updated(row, EntityType::Projector, projector.id, "model or status"));
                Ok(Some(projector))
            }
            MatchResult::None => {
                let Some(model) = model else {
                    // Case sheets carry serials without a model; such rows
                    // only look projectors up.
                    out.push(
                        Diagnostic::new(row.index, EntityType::Projector, Outcome::Skipped)
                            .with_reason("serial number not in inventory and no model to create it"),
                    );
                    return Ok(None);
                };
                let input = CreateProjector {
                    serial_number: serial.to_string(),
                    projector_model_id: model.id,
                    status: row.projector_status.clone(),
                };
                let projector = self
                    .store
                    .timed("create_projector", self.store.create_projector(&input))
                    .await?;
                out.push(created(row, EntityType::Projector, projector.id));
                Ok(Some(projector))
            }
            ambiguous => {
                out.push(self.ambiguous(row, EntityType::Projector, serial, &ambiguous));
                Ok(None)
            }
        }
    }

    // -- audis --

    async fn audi(
        &self,
        row: &NormalizedRow,
        resolved: &Resolved,
        out: &mut Vec<Diagnostic>,
    ) -> Result<Option<Audi>, ReconcileError> {
        let Some(audi_no) = row.audi_no.as_deref() else {
            return Ok(None);
        };
        let Some(site) = resolved.site.as_ref() else {
            out.push(
                Diagnostic::new(row.index, EntityType::Audi, Outcome::Skipped)
                    .with_reason("site is unresolved"),
            );
            return Ok(None);
        };
        let projector_id = resolved.projector.as_ref().map(|p| p.id);
        // The projector lock covers moving the projector out of its old audi.
        let mut lock_keys = vec![locks::audi_key(site.id, audi_no)];
        lock_keys.extend(
            resolved
                .projector
                .as_ref()
                .map(|p| locks::projector_key(&p.serial_number)),
        );
        let _guard = self.locks.lock_all(lock_keys).await;

        let filter = AudiFilter {
            site_id: Some(site.id),
            audi_no: Some(audi_no.to_string()),
            projector_id: None,
        };
        let pool = self.store.timed("find_audis", self.store.find_audis(&filter)).await?;
        let keys = AudiKeys {
            site_id: site.id,
            audi_no: audi_no.to_string(),
            projector_id,
        };

        let audi = match match_audi(&keys, &pool) {
            MatchResult::Unique(audi) => match projector_id {
                Some(p) if audi.projector_id != Some(p) => {
                    let audi = self
                        .store
                        .timed("update_audi", self.store.update_audi(audi.id, &UpdateAudi::relink(p)))
                        .await?;
                    tracing::debug!(
                        row_index = row.index,
                        audi_id = audi.id,
                        projector_id = p,
                        "Audi relinked to projector",
                    );
                    out.push(updated(row, EntityType::Audi, audi.id, "projector link"));
                    audi
                }
                _ => {
                    out.push(matched(row, EntityType::Audi, audi.id));
                    audi
                }
            },
            MatchResult::None => {
                let input = CreateAudi {
                    audi_no: audi_no.to_string(),
                    site_id: site.id,
                    projector_id,
                };
                let audi = self.store.timed("create_audi", self.store.create_audi(&input)).await?;
                out.push(created(row, EntityType::Audi, audi.id));
                audi
            }
            ambiguous => {
                let key = format!("{}/{audi_no}", site.id);
                out.push(self.ambiguous(row, EntityType::Audi, &key, &ambiguous));
                return Ok(None);
            }
        };

        if let Some(p) = projector_id {
            self.release_projector(row, p, audi.id, out).await?;
        }
        Ok(Some(audi))
    }

    /// A projector is installed in one audi at a time: clear its link from
    /// every audi other than `keep`.
    async fn release_projector(
        &self,
        row: &NormalizedRow,
        projector_id: DbId,
        keep: DbId,
        out: &mut Vec<Diagnostic>,
    ) -> Result<(), ReconcileError> {
        let filter = AudiFilter::by_projector(projector_id);
        let holders = self.store.timed("find_audis", self.store.find_audis(&filter)).await?;
        for old in holders.into_iter().filter(|a| a.id != keep) {
            self.store
                .timed("update_audi", self.store.update_audi(old.id, &UpdateAudi::unlink()))
                .await?;
            tracing::debug!(
                row_index = row.index,
                audi_id = old.id,
                projector_id,
                moved_to = keep,
                "Projector moved out of audi",
            );
            out.push(
                Diagnostic::new(row.index, EntityType::Audi, Outcome::Updated)
                    .with_id(old.id)
                    .with_reason(format!("projector {projector_id} moved to audi {keep}")),
            );
        }
        Ok(())
    }

    // -- cases --

    async fn case(
        &self,
        row: &NormalizedRow,
        resolved: &Resolved,
        out: &mut Vec<Diagnostic>,
    ) -> Result<(), ReconcileError> {
        let Some((_, primary_key)) = row.case_keys.primary() else {
            return Ok(());
        };

        let link = self.case_audi(row, resolved).await?;
        let audi = match &link {
            AudiLink::Resolved(audi) => Some(audi),
            AudiLink::Gap(_) => None,
        };
        let site_id = resolved.site.as_ref().map(|s| s.id).or(audi.map(|a| a.site_id));
        let Some(site_id) = site_id else {
            let err = ReconcileError::gap(EntityType::Case, "no site could be resolved for the case");
            tracing::warn!(row_index = row.index, key = primary_key, "Case skipped: {err}");
            out.push(
                Diagnostic::from_error(row.index, Some(EntityType::Case), &err)
                    .with_outcome(Outcome::Skipped),
            );
            return Ok(());
        };
        let audi_id = audi.map(|a| a.id);

        let key_locks = [CaseKeyField::CallLogNumber, CaseKeyField::RmaNumber]
            .into_iter()
            .filter_map(|f| row.case_keys.get(f).map(|k| locks::case_key(f.as_str(), k)))
            .collect();
        let _guard = self.locks.lock_all(key_locks).await;

        let pool = self.case_pool(row).await?;
        let decision = self.index.with(|idx| {
            let result = match_case(&row.case_keys, &pool, idx.claimed());
            if let MatchResult::Unique(case) = &result {
                idx.claim(case.id);
            }
            result
        });

        let case_id = match decision {
            MatchResult::Unique(case) => {
                let input = UpdateServiceCase {
                    site_id: None,
                    audi_id: audi_id.filter(|a| case.audi_id != Some(*a)).map(Some),
                    status: row
                        .case_status
                        .clone()
                        .filter(|s| case.status.as_ref() != Some(s)),
                };
                if input.is_empty() {
                    out.push(matched(row, EntityType::Case, case.id));
                } else {
                    self.store
                        .timed("update_case", self.store.update_case(case.id, &input))
                        .await?;
                    out.push(updated(row, EntityType::Case, case.id, "audi link or status"));
                }
                case.id
            }
            MatchResult::None => {
                let draft = CreateServiceCase {
                    call_log_number: row.case_keys.call_log_number.clone(),
                    rma_number: row.case_keys.rma_number.clone(),
                    serial_number: row.serial_number.clone(),
                    site_id,
                    audi_id,
                    case_type: row.case_type.clone(),
                    status: row.case_status.clone(),
                    reported_on: row.reported_on,
                    payload: Some(serde_json::Value::Object(row.payload.clone())),
                };
                let case = disambiguator::create_case(
                    self.store,
                    self.index,
                    &draft,
                    self.max_suffix_attempts,
                )
                .await?;
                tracing::debug!(
                    row_index = row.index,
                    case_id = case.id,
                    call_log_number = ?case.call_log_number,
                    rma_number = ?case.rma_number,
                    "Case created",
                );
                out.push(created(row, EntityType::Case, case.id));
                case.id
            }
            ambiguous => {
                out.push(self.ambiguous(row, EntityType::Case, primary_key, &ambiguous));
                return Ok(());
            }
        };

        if let AudiLink::Gap(err) = link {
            tracing::warn!(row_index = row.index, case_id, "Case left without audi: {err}");
            out.push(Diagnostic::from_error(row.index, Some(EntityType::Case), &err).with_id(case_id));
        }
        Ok(())
    }

    /// Find the audi a case belongs to: the one holding the projector with
    /// the row's serial number. Rows without a serial fall back to the
    /// audi named on the row.
    async fn case_audi(
        &self,
        row: &NormalizedRow,
        resolved: &Resolved,
    ) -> Result<AudiLink, ReconcileError> {
        let Some(serial) = row.serial_number.as_deref() else {
            return Ok(match &resolved.audi {
                Some(audi) => AudiLink::Resolved(audi.clone()),
                None => AudiLink::Gap(ReconcileError::gap(
                    EntityType::Case,
                    "no serial number or audi to link the case to",
                )),
            });
        };

        let projector = match &resolved.projector {
            Some(p) => Some(p.clone()),
            None => {
                self.store
                    .timed(
                        "find_projector_by_serial",
                        self.store.find_projector_by_serial(serial),
                    )
                    .await?
            }
        };
        let Some(projector) = projector else {
            return Ok(AudiLink::Gap(ReconcileError::gap(
                EntityType::Case,
                format!("serial number {serial} matches no projector"),
            )));
        };

        let filter = AudiFilter::by_projector(projector.id);
        let mut audis = self.store.timed("find_audis", self.store.find_audis(&filter)).await?;
        Ok(match audis.len() {
            1 => {
                let audi = audis.remove(0);
                match &resolved.site {
                    Some(site) if site.id != audi.site_id => AudiLink::Gap(ReconcileError::gap(
                        EntityType::Case,
                        format!(
                            "projector {serial} is installed at site {}, not at the case's site {}",
                            audi.site_id, site.id
                        ),
                    )),
                    _ => AudiLink::Resolved(audi),
                }
            }
            0 => AudiLink::Gap(ReconcileError::gap(
                EntityType::Case,
                format!("projector {serial} is not installed in any audi"),
            )),
            n => AudiLink::Gap(ReconcileError::gap(
                EntityType::Case,
                format!(
                    "projector {serial} is linked to {n} audis {:?}",
                    audis.iter().map(|a| a.id).collect::<Vec<DbId>>()
                ),
            )),
        })
    }

    /// Every case in the family of the row's primary or secondary key.
    async fn case_pool(&self, row: &NormalizedRow) -> Result<Vec<ServiceCase>, ReconcileError> {
        let mut pool: Vec<ServiceCase> = Vec::new();
        for (field, key) in [row.case_keys.primary(), row.case_keys.secondary()]
            .into_iter()
            .flatten()
        {
            let filter = CaseFilter::key_family(field, key);
            let found = self.store.timed("find_cases", self.store.find_cases(&filter)).await?;
            for case in found {
                if !pool.iter().any(|c| c.id == case.id) {
                    pool.push(case);
                }
            }
        }
        pool.sort_by_key(|c| c.id);
        Ok(pool)
    }

    fn ambiguous<T: Identified>(
        &self,
        row: &NormalizedRow,
        entity: EntityType,
        key: &str,
        result: &MatchResult<T>,
    ) -> Diagnostic {
        let err = ReconcileError::AmbiguousMatch {
            entity,
            key: key.to_string(),
            candidates: result.candidate_ids(),
        };
        tracing::warn!(row_index = row.index, %entity, key, "Ambiguous match, nothing written: {err}");
        Diagnostic::from_error(row.index, Some(entity), &err)
    }
}

fn matched(row: &NormalizedRow, entity: EntityType, id: DbId) -> Diagnostic {
    Diagnostic::new(row.index, entity, Outcome::Matched).with_id(id)
}

fn created(row: &NormalizedRow, entity: EntityType, id: DbId) -> Diagnostic {
    Diagnostic::new(row.index, entity, Outcome::Created).with_id(id)
}

fn updated(row: &NormalizedRow, entity: EntityType, id: DbId, what: &str) -> Diagnostic {
    Diagnostic::new(row.index, entity, Outcome::Updated)
        .with_id(id)
        .with_reason(format!("corrected {what}"))
}
