//! Integrity Auditor planning and repair against the in-memory store.

mod common;

use std::sync::Arc;

use projtrack_db::models::CreateServiceCase;
use projtrack_db::store::{AudiFilter, CaseFilter, SiteFilter};
use projtrack_db::{CanonicalStore, MemoryStore};
use projtrack_reconcile::{RepairCheck, RepairOutcome};

use common::{all_cases, audi, case, engine, installed, model, projector, site, FaultyStore};

// -- duplicate sites --

#[tokio::test]
async fn typo_site_is_merged_into_the_site_with_more_audis() {
    let store = Arc::new(MemoryStore::new());
    let good = site(&store, "Suman City Gandhinagar").await;
    let typo = site(&store, "Suman City Ghandhinagar").await;
    for no in ["Audi 1", "Audi 2", "Audi 3"] {
        audi(&store, good.id, no, None).await;
    }
    let moved = audi(&store, typo.id, "Audi 4", None).await;
    let typo_case = case(&store, Some("694531"), None, typo.id, Some(moved.id)).await;
    let engine = engine(store.clone());

    let plan = engine.plan_repairs(&[RepairCheck::DuplicateSites]).await.unwrap();
    assert_eq!(plan.site_merges.len(), 1);
    assert_eq!(plan.site_merges[0].keep, good.id);
    assert_eq!(plan.site_merges[0].remove, vec![typo.id]);

    let outcome = engine.apply_repairs(&plan).await.unwrap();
    assert_eq!(outcome.sites_deleted, 1);
    assert_eq!(outcome.audis_moved, 1);
    assert_eq!(outcome.cases_moved, 1);

    let sites = store.find_sites(&SiteFilter::default()).await.unwrap();
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].name, "Suman City Gandhinagar");
    assert_eq!(store.find_audis(&AudiFilter::by_site(good.id)).await.unwrap().len(), 4);
    let case_now = store.get_case(typo_case.id).await.unwrap().unwrap();
    assert_eq!(case_now.site_id, good.id);
    assert_eq!(case_now.audi_id, Some(moved.id));
}

#[tokio::test]
async fn planning_changes_nothing() {
    let store = Arc::new(MemoryStore::new());
    site(&store, "PVR Phoenix").await;
    site(&store, "pvr phoenix ").await;
    let engine = engine(store.clone());

    let plan = engine.plan_repairs(&RepairCheck::ALL).await.unwrap();

    assert!(plan.has_actions());
    assert_eq!(store.find_sites(&SiteFilter::default()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn look_alike_sites_are_suggested_not_merged() {
    let store = Arc::new(MemoryStore::new());
    site(&store, "INOX Nariman").await;
    site(&store, "INOX Nariyan").await;
    let engine = engine(store.clone());

    let plan = engine.plan_repairs(&[RepairCheck::DuplicateSites]).await.unwrap();

    assert!(plan.site_merges.is_empty());
    assert_eq!(plan.suggestions.len(), 1);
    assert!(!plan.has_actions());
}

// -- duplicate audis --

#[tokio::test]
async fn duplicate_audi_with_fewer_cases_is_folded_in() {
    let store = Arc::new(MemoryStore::new());
    let s = site(&store, "Cinepolis Andheri").await;
    let m = model(&store, "NC1100").await;
    let p = projector(&store, "SN-1", m.id).await;
    let older = audi(&store, s.id, "Audi 1", Some(p.id)).await;
    let busier = audi(&store, s.id, "Audi 1", Some(p.id)).await;
    let c1 = case(&store, Some("1"), None, s.id, Some(older.id)).await;
    case(&store, Some("2"), None, s.id, Some(busier.id)).await;
    case(&store, Some("3"), None, s.id, Some(busier.id)).await;
    let engine = engine(store.clone());

    let plan = engine.plan_repairs(&[RepairCheck::DuplicateAudis]).await.unwrap();
    assert_eq!(plan.audi_merges.len(), 1);
    assert_eq!(plan.audi_merges[0].keep, busier.id);

    let outcome = engine.apply_repairs(&plan).await.unwrap();
    assert_eq!(outcome.audis_deleted, 1);
    assert_eq!(outcome.cases_moved, 1);
    assert!(store.get_audi(older.id).await.unwrap().is_none());
    assert_eq!(
        store.get_case(c1.id).await.unwrap().unwrap().audi_id,
        Some(busier.id)
    );
    assert_eq!(
        store.find_cases(&CaseFilter::by_audi(busier.id)).await.unwrap().len(),
        3
    );
}

#[tokio::test]
async fn site_merge_exposes_duplicate_audis() {
    let store = Arc::new(MemoryStore::new());
    let good = site(&store, "Suman City Gandhinagar").await;
    let typo = site(&store, "Suman City Ghandhinagar").await;
    let m = model(&store, "NC1100").await;
    let p = projector(&store, "SN-1", m.id).await;
    let kept = audi(&store, good.id, "Audi 1", Some(p.id)).await;
    audi(&store, good.id, "Audi 2", None).await;
    let dup = audi(&store, typo.id, "audi 1", Some(p.id)).await;
    let engine = engine(store.clone());

    let plan = engine
        .plan_repairs(&[RepairCheck::DuplicateSites, RepairCheck::DuplicateAudis])
        .await
        .unwrap();
    assert_eq!(plan.audi_merges.len(), 1);
    assert_eq!(plan.audi_merges[0].site_id, good.id);
    assert_eq!(plan.audi_merges[0].keep, kept.id);
    assert_eq!(plan.audi_merges[0].remove, vec![dup.id]);

    engine.apply_repairs(&plan).await.unwrap();
    let audis = store.find_audis(&AudiFilter::default()).await.unwrap();
    assert_eq!(audis.len(), 2);
    assert!(audis.iter().all(|a| a.site_id == good.id));
}

// -- orphans and dangling links --

fn case_input(site_id: i64) -> CreateServiceCase {
    CreateServiceCase {
        call_log_number: None,
        rma_number: None,
        serial_number: None,
        site_id,
        audi_id: None,
        case_type: None,
        status: None,
        reported_on: None,
        payload: None,
    }
}

#[tokio::test]
async fn orphaned_cases_are_reported_never_deleted() {
    let store = Arc::new(MemoryStore::new());
    let s = site(&store, "PVR Phoenix").await;
    let m = model(&store, "CP2220").await;
    let p = projector(&store, "411034563", m.id).await;
    let a = audi(&store, s.id, "Audi 1", Some(p.id)).await;
    let linked = store
        .create_case(&CreateServiceCase {
            call_log_number: Some("1".into()),
            serial_number: Some("411034563".into()),
            audi_id: Some(a.id),
            ..case_input(s.id)
        })
        .await
        .unwrap();
    let orphan = store
        .create_case(&CreateServiceCase {
            call_log_number: Some("2".into()),
            serial_number: Some("000000000".into()),
            ..case_input(s.id)
        })
        .await
        .unwrap();
    let engine = engine(store.clone());

    let plan = engine.plan_repairs(&RepairCheck::ALL).await.unwrap();
    let ids: Vec<_> = plan.orphaned_cases.iter().map(|o| o.case_id).collect();
    assert_eq!(ids, vec![orphan.id]);
    assert!(plan.orphaned_cases[0].reason.contains("000000000"));

    engine.apply_repairs(&plan).await.unwrap();
    let remaining: Vec<_> = all_cases(store.as_ref()).await.iter().map(|c| c.id).collect();
    assert_eq!(remaining, vec![linked.id, orphan.id]);
}

#[tokio::test]
async fn dangling_projector_links_are_cleared() {
    let store = Arc::new(MemoryStore::new());
    let fleet = installed(&store, "PVR Phoenix", "Audi 1", "411034563").await;
    let stale = fleet.audi;
    let legacy = FaultyStore::new(store.clone()).losing_projector(fleet.projector.id);
    let engine = engine(Arc::new(legacy));

    let plan = engine.plan_repairs(&[RepairCheck::DanglingAudiLinks]).await.unwrap();
    assert_eq!(plan.dangling_links.len(), 1);
    assert_eq!(plan.dangling_links[0].audi_id, stale.id);

    let outcome = engine.apply_repairs(&plan).await.unwrap();
    assert_eq!(outcome.links_cleared, 1);
    let audi_now = store.get_audi(stale.id).await.unwrap().unwrap();
    assert_eq!(audi_now.projector_id, None);
}

// -- stale plans --

#[tokio::test]
async fn reapplying_a_plan_only_counts_stale_entries() {
    let store = Arc::new(MemoryStore::new());
    let good = site(&store, "PVR Phoenix").await;
    site(&store, "PVR  PHOENIX").await;
    audi(&store, good.id, "Audi 1", None).await;
    let engine = engine(store.clone());

    let plan = engine.plan_repairs(&[RepairCheck::DuplicateSites]).await.unwrap();
    engine.apply_repairs(&plan).await.unwrap();
    let again = engine.apply_repairs(&plan).await.unwrap();

    assert_eq!(
        again,
        RepairOutcome {
            stale_entries: 1,
            ..RepairOutcome::default()
        }
    );
    assert_eq!(store.find_sites(&SiteFilter::default()).await.unwrap().len(), 1);
}
