//! Integrity Auditor: duplicate merges, orphan and dangling-link reports.
//!
//! Planning only reads. A [`RepairPlan`] is inert data until it is handed
//! to [`apply`], which re-reads every dependent it moves, so a plan that
//! went stale since it was made never moves a case onto a deleted audi.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;

use projtrack_core::error::CoreError;
use projtrack_core::site_names::{edit_distance, site_audit_key, SUGGESTION_MAX_DISTANCE};
use projtrack_core::types::{DbId, Timestamp};
use projtrack_db::models::{Audi, ServiceCase, Site, UpdateAudi, UpdateServiceCase};
use projtrack_db::store::{AudiFilter, CaseFilter, ProjectorFilter, SiteFilter};
use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;
use crate::timed::TimedStore;

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

/// A named, independently runnable repair check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepairCheck {
    DuplicateSites,
    DuplicateAudis,
    OrphanedCases,
    DanglingAudiLinks,
}

impl RepairCheck {
    pub const ALL: [RepairCheck; 4] = [
        Self::DuplicateSites,
        Self::DuplicateAudis,
        Self::OrphanedCases,
        Self::DanglingAudiLinks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicateSites => "duplicate-sites",
            Self::DuplicateAudis => "duplicate-audis",
            Self::OrphanedCases => "orphaned-cases",
            Self::DanglingAudiLinks => "dangling-audi-links",
        }
    }
}

impl std::fmt::Display for RepairCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepairCheck {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| {
                CoreError::validation(
                    "check",
                    format!(
                        "unknown repair check '{s}'; expected one of: {}",
                        Self::ALL.map(|c| c.as_str()).join(", ")
                    ),
                )
            })
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteMerge {
    pub keep: DbId,
    pub keep_name: String,
    pub remove: Vec<DbId>,
    pub removed_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudiMerge {
    /// The site the group belongs to once site merges are applied.
    pub site_id: DbId,
    pub audi_no: String,
    pub projector_id: Option<DbId>,
    pub keep: DbId,
    pub remove: Vec<DbId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrphanedCase {
    pub case_id: DbId,
    pub call_log_number: Option<String>,
    pub rma_number: Option<String>,
    pub serial_number: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DanglingLink {
    pub audi_id: DbId,
    pub projector_id: DbId,
}

/// Two sites that look alike but were not merged. Never applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSuggestion {
    pub site_ids: (DbId, DbId),
    pub names: (String, String),
    pub distance: usize,
}

/// Result of the selected checks. Orphans and suggestions are report-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepairPlan {
    pub checks: Vec<RepairCheck>,
    pub site_merges: Vec<SiteMerge>,
    pub audi_merges: Vec<AudiMerge>,
    pub orphaned_cases: Vec<OrphanedCase>,
    pub dangling_links: Vec<DanglingLink>,
    pub suggestions: Vec<SiteSuggestion>,
}

impl RepairPlan {
    /// Whether applying the plan would change anything.
    pub fn has_actions(&self) -> bool {
        !self.site_merges.is_empty()
            || !self.audi_merges.is_empty()
            || !self.dangling_links.is_empty()
    }
}

/// Counts of what [`apply`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairOutcome {
    pub sites_deleted: usize,
    pub audis_moved: usize,
    pub audis_deleted: usize,
    pub cases_moved: usize,
    pub links_cleared: usize,
    /// Plan entries skipped because the store changed since planning.
    pub stale_entries: usize,
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Everything the checks look at, read once.
struct Snapshot {
    sites: Vec<Site>,
    audis: Vec<Audi>,
    cases: Vec<ServiceCase>,
    projector_ids_by_serial: HashMap<String, DbId>,
}

impl Snapshot {
    async fn load(store: &TimedStore) -> Result<Self, ReconcileError> {
        let sites = store.timed("find_sites", store.find_sites(&SiteFilter::default())).await?;
        let audis = store.timed("find_audis", store.find_audis(&AudiFilter::default())).await?;
        let cases = store.timed("find_cases", store.find_cases(&CaseFilter::default())).await?;
        let projectors = store
            .timed("find_projectors", store.find_projectors(&ProjectorFilter::default()))
            .await?;
        Ok(Self {
            sites,
            audis,
            cases,
            projector_ids_by_serial: projectors
                .into_iter()
                .map(|p| (p.serial_number.to_uppercase(), p.id))
                .collect(),
        })
    }
}

pub(crate) async fn plan(
    store: &TimedStore,
    checks: &[RepairCheck],
) -> Result<RepairPlan, ReconcileError> {
    let snapshot = Snapshot::load(store).await?;
    let mut plan = RepairPlan {
        checks: checks.to_vec(),
        ..RepairPlan::default()
    };

    // Audi grouping sees sites as they will be after site merges.
    let (site_merges, suggestions) = duplicate_sites(&snapshot.sites, &snapshot.audis);
    let mut site_remap: HashMap<DbId, DbId> = HashMap::new();
    if checks.contains(&RepairCheck::DuplicateSites) {
        for merge in &site_merges {
            for loser in &merge.remove {
                site_remap.insert(*loser, merge.keep);
            }
        }
        plan.site_merges = site_merges;
        plan.suggestions = suggestions;
    }
    if checks.contains(&RepairCheck::DuplicateAudis) {
        plan.audi_merges = duplicate_audis(&snapshot.audis, &snapshot.cases, &site_remap);
    }
    if checks.contains(&RepairCheck::OrphanedCases) {
        plan.orphaned_cases = orphaned_cases(&snapshot);
    }
    if checks.contains(&RepairCheck::DanglingAudiLinks) {
        let live: HashSet<DbId> = snapshot.projector_ids_by_serial.values().copied().collect();
        plan.dangling_links = snapshot
            .audis
            .iter()
            .filter_map(|a| a.projector_id.map(|p| (a.id, p)))
            .filter(|(_, p)| !live.contains(p))
            .map(|(audi_id, projector_id)| DanglingLink {
                audi_id,
                projector_id,
            })
            .collect();
    }

    tracing::info!(
        site_merges = plan.site_merges.len(),
        audi_merges = plan.audi_merges.len(),
        orphaned_cases = plan.orphaned_cases.len(),
        dangling_links = plan.dangling_links.len(),
        suggestions = plan.suggestions.len(),
        "Repair plan ready",
    );
    Ok(plan)
}

/// Pick the survivor of a duplicate group: most dependents, then earliest
/// creation, then lowest id.
fn rank<T>(items: &mut [T], key: impl Fn(&T) -> (usize, Timestamp, DbId)) {
    items.sort_by_key(|item| {
        let (dependents, created_at, id) = key(item);
        (Reverse(dependents), created_at, id)
    });
}

fn duplicate_sites(sites: &[Site], audis: &[Audi]) -> (Vec<SiteMerge>, Vec<SiteSuggestion>) {
    let mut audi_counts: HashMap<DbId, usize> = HashMap::new();
    for audi in audis {
        *audi_counts.entry(audi.site_id).or_default() += 1;
    }

    let mut groups: BTreeMap<String, Vec<&Site>> = BTreeMap::new();
    for site in sites {
        groups.entry(site_audit_key(&site.name)).or_default().push(site);
    }

    let mut merges = Vec::new();
    for group in groups.values_mut().filter(|g| g.len() > 1) {
        rank(group, |s| {
            (audi_counts.get(&s.id).copied().unwrap_or(0), s.created_at, s.id)
        });
        let (keep, losers) = (group[0], &group[1..]);
        merges.push(SiteMerge {
            keep: keep.id,
            keep_name: keep.name.clone(),
            remove: losers.iter().map(|s| s.id).collect(),
            removed_names: losers.iter().map(|s| s.name.clone()).collect(),
        });
    }

    // Fuzzy suggestions compare one representative per audit key.
    let keys: Vec<(&String, &Site)> = groups.iter().map(|(k, g)| (k, g[0])).collect();
    let mut suggestions = Vec::new();
    for (i, (key_a, site_a)) in keys.iter().enumerate() {
        for (key_b, site_b) in &keys[i + 1..] {
            let distance = edit_distance(key_a, key_b);
            if distance <= SUGGESTION_MAX_DISTANCE {
                suggestions.push(SiteSuggestion {
                    site_ids: (site_a.id, site_b.id),
                    names: (site_a.name.clone(), site_b.name.clone()),
                    distance,
                });
            }
        }
    }

    (merges, suggestions)
}

fn duplicate_audis(
    audis: &[Audi],
    cases: &[ServiceCase],
    site_remap: &HashMap<DbId, DbId>,
) -> Vec<AudiMerge> {
    let mut case_counts: HashMap<DbId, usize> = HashMap::new();
    for audi_id in cases.iter().filter_map(|c| c.audi_id) {
        *case_counts.entry(audi_id).or_default() += 1;
    }

    let mut groups: BTreeMap<(DbId, String, Option<DbId>), Vec<&Audi>> = BTreeMap::new();
    for audi in audis {
        let site_id = site_remap.get(&audi.site_id).copied().unwrap_or(audi.site_id);
        groups
            .entry((site_id, audi.audi_no.to_uppercase(), audi.projector_id))
            .or_default()
            .push(audi);
    }

    groups
        .into_iter()
        .filter(|(_, group)| group.len() > 1)
        .map(|((site_id, audi_no, projector_id), mut group)| {
            rank(&mut group, |a| {
                (case_counts.get(&a.id).copied().unwrap_or(0), a.created_at, a.id)
            });
            AudiMerge {
                site_id,
                audi_no,
                projector_id,
                keep: group[0].id,
                remove: group[1..].iter().map(|a| a.id).collect(),
            }
        })
        .collect()
}

fn orphaned_cases(snapshot: &Snapshot) -> Vec<OrphanedCase> {
    let installed: HashSet<DbId> = snapshot.audis.iter().filter_map(|a| a.projector_id).collect();

    snapshot
        .cases
        .iter()
        .filter_map(|case| {
            let reason = match case.serial_number.as_deref() {
                None => "case has no serial number".to_string(),
                Some(serial) => match snapshot.projector_ids_by_serial.get(&serial.to_uppercase()) {
                    None => format!("serial number {serial} matches no projector"),
                    Some(p) if !installed.contains(p) => {
                        format!("projector {serial} is not installed in any audi")
                    }
                    Some(_) => return None,
                },
            };
            Some(OrphanedCase {
                case_id: case.id,
                call_log_number: case.call_log_number.clone(),
                rma_number: case.rma_number.clone(),
                serial_number: case.serial_number.clone(),
                reason,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

/// Execute a plan's merges and link repairs.
///
/// Dependents are moved before the entity they point at is deleted. The
/// caller must hold exclusive access to the store for the whole call.
pub(crate) async fn apply(
    store: &TimedStore,
    plan: &RepairPlan,
) -> Result<RepairOutcome, ReconcileError> {
    let mut outcome = RepairOutcome::default();

    for merge in &plan.site_merges {
        if store.timed("get_site", store.get_site(merge.keep)).await?.is_none() {
            tracing::warn!(site_id = merge.keep, "Merge target site is gone, skipping merge");
            outcome.stale_entries += 1;
            continue;
        }
        for &loser in &merge.remove {
            if store.timed("get_site", store.get_site(loser)).await?.is_none() {
                outcome.stale_entries += 1;
                continue;
            }
            let audis = store
                .timed("find_audis", store.find_audis(&AudiFilter::by_site(loser)))
                .await?;
            for audi in audis {
                store
                    .timed(
                        "update_audi",
                        store.update_audi(audi.id, &UpdateAudi::move_to_site(merge.keep)),
                    )
                    .await?;
                outcome.audis_moved += 1;
            }
            let cases = store
                .timed("find_cases", store.find_cases(&CaseFilter::by_site(loser)))
                .await?;
            let input = UpdateServiceCase {
                site_id: Some(merge.keep),
                ..UpdateServiceCase::default()
            };
            for case in cases {
                store.timed("update_case", store.update_case(case.id, &input)).await?;
                outcome.cases_moved += 1;
            }
            store.timed("delete_site", store.delete_site(loser)).await?;
            outcome.sites_deleted += 1;
            tracing::info!(site_id = loser, into = merge.keep, "Duplicate site merged");
        }
    }

    for merge in &plan.audi_merges {
        if store.timed("get_audi", store.get_audi(merge.keep)).await?.is_none() {
            tracing::warn!(audi_id = merge.keep, "Merge target audi is gone, skipping merge");
            outcome.stale_entries += 1;
            continue;
        }
        let input = UpdateServiceCase {
            audi_id: Some(Some(merge.keep)),
            ..UpdateServiceCase::default()
        };
        for &loser in &merge.remove {
            if store.timed("get_audi", store.get_audi(loser)).await?.is_none() {
                outcome.stale_entries += 1;
                continue;
            }
            let cases = store
                .timed("find_cases", store.find_cases(&CaseFilter::by_audi(loser)))
                .await?;
            for case in cases {
                store.timed("update_case", store.update_case(case.id, &input)).await?;
                outcome.cases_moved += 1;
            }
            store.timed("delete_audi", store.delete_audi(loser)).await?;
            outcome.audis_deleted += 1;
            tracing::info!(audi_id = loser, into = merge.keep, "Duplicate audi merged");
        }
    }

    for link in &plan.dangling_links {
        let audi = store.timed("get_audi", store.get_audi(link.audi_id)).await?;
        let still_dangling = match audi {
            Some(a) if a.projector_id == Some(link.projector_id) => store
                .timed("get_projector", store.get_projector(link.projector_id))
                .await?
                .is_none(),
            _ => false,
        };
        if !still_dangling {
            outcome.stale_entries += 1;
            continue;
        }
        store
            .timed("update_audi", store.update_audi(link.audi_id, &UpdateAudi::unlink()))
            .await?;
        outcome.links_cleared += 1;
        tracing::info!(
            audi_id = link.audi_id,
            projector_id = link.projector_id,
            "Dangling projector link cleared",
        );
    }

    Ok(outcome)
}
