//! End-to-end batch reconciliation against the in-memory store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use projtrack_core::types::EntityType;
use projtrack_db::store::{AudiFilter, SiteFilter};
use projtrack_db::{CanonicalStore, MemoryStore};
use projtrack_reconcile::{
    DisambiguationIndex, ErrorKind, MemorySink, Outcome, ReconcileConfig,
};

use common::{all_cases, engine, engine_with, installed, rows, FaultyStore};

const SERIAL: &str = "411034563";

// -- key collisions --

#[tokio::test]
async fn duplicate_call_logs_get_suffixes_and_share_the_audi() {
    let store = Arc::new(MemoryStore::new());
    let fleet = installed(&store, "PVR Phoenix", "Audi 1", SERIAL).await;
    let engine = engine(store.clone());

    let source = rows(&[
        &[("Call Log No", "694531"), ("Serial No", SERIAL)],
        &[("Call Log No", "694531"), ("Serial No", SERIAL)],
    ]);
    let report = engine
        .reconcile_batch(&source, DisambiguationIndex::new(), &MemorySink::new())
        .await
        .unwrap();

    let cases = all_cases(store.as_ref()).await;
    let keys: Vec<_> = cases.iter().map(|c| c.call_log_number.as_deref()).collect();
    assert_eq!(keys, [Some("694531"), Some("694531-1")]);
    assert!(cases.iter().all(|c| c.audi_id == Some(fleet.audi.id)));
    assert!(cases.iter().all(|c| c.site_id == fleet.site.id));
    assert_eq!(report.entity_outcome(EntityType::Case, Outcome::Created), 2);
    assert_eq!(report.rows_succeeded, 2);
}

#[tokio::test]
async fn replaying_a_batch_creates_nothing() {
    let store = Arc::new(MemoryStore::new());
    installed(&store, "PVR Phoenix", "Audi 1", SERIAL).await;
    let engine = engine(store.clone());
    let source = rows(&[
        &[("Call Log No", "694531"), ("Serial No", SERIAL), ("Site", "PVR Phoenix")],
        &[("Call Log No", "694531"), ("Serial No", SERIAL), ("Site", "PVR Phoenix")],
    ]);

    engine
        .reconcile_batch(&source, DisambiguationIndex::new(), &MemorySink::new())
        .await
        .unwrap();
    let before = all_cases(store.as_ref()).await;

    let replay = engine
        .reconcile_batch(&source, DisambiguationIndex::new(), &MemorySink::new())
        .await
        .unwrap();

    assert_eq!(all_cases(store.as_ref()).await, before);
    assert_eq!(replay.entity_outcome(EntityType::Case, Outcome::Created), 0);
    assert_eq!(replay.entity_outcome(EntityType::Case, Outcome::Matched), 2);
    assert_eq!(replay.entity_outcome(EntityType::Site, Outcome::Created), 0);
}

#[tokio::test]
async fn source_order_decides_who_owns_the_bare_key() {
    let store = Arc::new(MemoryStore::new());
    installed(&store, "PVR Phoenix", "Audi 1", SERIAL).await;
    let engine = engine(store.clone());

    let source = rows(&[
        &[("Call Log No", "694531"), ("Serial No", SERIAL), ("Remarks", "second sheet")],
        &[("Call Log No", "694531"), ("Serial No", SERIAL), ("Remarks", "first sheet")],
    ]);
    engine
        .reconcile_batch(&source, DisambiguationIndex::new(), &MemorySink::new())
        .await
        .unwrap();

    let cases = all_cases(store.as_ref()).await;
    let bare = cases
        .iter()
        .find(|c| c.call_log_number.as_deref() == Some("694531"))
        .unwrap();
    assert_eq!(bare.payload["Remarks"], "second sheet");
}

#[tokio::test]
async fn index_from_a_previous_batch_continues_the_run() {
    let store = Arc::new(MemoryStore::new());
    installed(&store, "PVR Phoenix", "Audi 1", SERIAL).await;
    let engine = engine(store.clone());
    let source = rows(&[&[("Call Log No", "694531"), ("Serial No", SERIAL)]]);

    let first = engine
        .reconcile_batch(&source, DisambiguationIndex::new(), &MemorySink::new())
        .await
        .unwrap();
    let second = engine
        .reconcile_batch(&source, first.index, &MemorySink::new())
        .await
        .unwrap();

    assert_eq!(second.entity_outcome(EntityType::Case, Outcome::Created), 1);
    let keys: Vec<_> = all_cases(store.as_ref())
        .await
        .into_iter()
        .filter_map(|c| c.call_log_number)
        .collect();
    assert_eq!(keys, ["694531", "694531-1"]);
}

// -- referential gaps --

#[tokio::test]
async fn unknown_serial_leaves_audi_unset_and_reports_a_gap() {
    let store = Arc::new(MemoryStore::new());
    let fleet = installed(&store, "PVR Phoenix", "Audi 1", SERIAL).await;
    let engine = engine(store.clone());
    let sink = MemorySink::new();

    let source = rows(&[&[
        ("Call Log No", "700001"),
        ("Serial No", "000000000"),
        ("Site", "PVR Phoenix"),
    ]]);
    let report = engine
        .reconcile_batch(&source, DisambiguationIndex::new(), &sink)
        .await
        .unwrap();

    let cases = all_cases(store.as_ref()).await;
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].audi_id, None);
    assert_eq!(cases[0].site_id, fleet.site.id);
    assert_eq!(report.error_count(ErrorKind::ReferentialGap), 1);

    let gap = sink
        .for_row(0)
        .into_iter()
        .find(|d| d.error_kind == Some(ErrorKind::ReferentialGap))
        .unwrap();
    assert_eq!(gap.entity_type, Some(EntityType::Case));
    assert_eq!(gap.outcome, Outcome::Orphaned);
    assert_eq!(gap.entity_id, Some(cases[0].id));
}

#[tokio::test]
async fn case_gets_its_audi_once_inventory_arrives() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store.clone());
    let case_rows = rows(&[&[
        ("Call Log No", "900001"),
        ("Serial No", "SN-77"),
        ("Site", "INOX Nariman"),
    ]]);

    engine
        .reconcile_batch(&case_rows, DisambiguationIndex::new(), &MemorySink::new())
        .await
        .unwrap();
    assert_eq!(all_cases(store.as_ref()).await[0].audi_id, None);

    let inventory = rows(&[&[
        ("Site", "INOX  Nariman"),
        ("Audi", "Audi 3"),
        ("Model", "NC1100"),
        ("Serial No", "sn-77"),
    ]]);
    engine
        .reconcile_batch(&inventory, DisambiguationIndex::new(), &MemorySink::new())
        .await
        .unwrap();

    let replay = engine
        .reconcile_batch(&case_rows, DisambiguationIndex::new(), &MemorySink::new())
        .await
        .unwrap();

    let audi = &store.find_audis(&AudiFilter::default()).await.unwrap()[0];
    let cases = all_cases(store.as_ref()).await;
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].audi_id, Some(audi.id));
    assert_eq!(replay.entity_outcome(EntityType::Case, Outcome::Updated), 1);
    assert_eq!(store.find_sites(&SiteFilter::default()).await.unwrap().len(), 1);
}

// -- ambiguity and validation --

#[tokio::test]
async fn conflicting_keys_overwrite_nothing() {
    let store = Arc::new(MemoryStore::new());
    let fleet = installed(&store, "PVR Phoenix", "Audi 1", SERIAL).await;
    let existing = common::case(&store, Some("800001"), Some("R-9"), fleet.site.id, None).await;
    let engine = engine(store.clone());

    let source = rows(&[&[
        ("Call Log No", "800001"),
        ("RMA No", "R-5"),
        ("Status", "Closed"),
        ("Serial No", SERIAL),
    ]]);
    let report = engine
        .reconcile_batch(&source, DisambiguationIndex::new(), &MemorySink::new())
        .await
        .unwrap();

    assert_eq!(all_cases(store.as_ref()).await, vec![existing]);
    assert_eq!(report.error_count(ErrorKind::AmbiguousMatch), 1);
    assert_eq!(report.entity_outcome(EntityType::Case, Outcome::Ambiguous), 1);
}

#[tokio::test]
async fn ambiguous_site_skips_dependent_audi() {
    let store = Arc::new(MemoryStore::new());
    common::site(&store, "PVR Phoenix").await;
    common::site(&store, "pvr  phoenix").await;
    let engine = engine(store.clone());

    let source = rows(&[&[("Site", "PVR Phoenix"), ("Audi", "Audi 1")]]);
    let report = engine
        .reconcile_batch(&source, DisambiguationIndex::new(), &MemorySink::new())
        .await
        .unwrap();

    assert!(store.find_audis(&AudiFilter::default()).await.unwrap().is_empty());
    assert_eq!(report.entity_outcome(EntityType::Site, Outcome::Ambiguous), 1);
    assert_eq!(report.entity_outcome(EntityType::Audi, Outcome::Skipped), 1);
    assert_eq!(report.rows_succeeded, 1);
}

#[tokio::test]
async fn invalid_row_leaves_no_partial_entities() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store.clone());
    let sink = MemorySink::new();

    let source = rows(&[&[
        ("Site", "Cinepolis Andheri"),
        ("Model", "NC1100"),
        ("Serial No", "SN-1"),
        ("Call Log No", "1"),
        ("Date", "2024-02-30"),
    ]]);
    let report = engine
        .reconcile_batch(&source, DisambiguationIndex::new(), &sink)
        .await
        .unwrap();

    assert_eq!(report.rows_skipped, 1);
    assert_eq!(report.error_count(ErrorKind::Validation), 1);
    assert!(store.find_sites(&SiteFilter::default()).await.unwrap().is_empty());
    assert!(all_cases(store.as_ref()).await.is_empty());

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, Outcome::Skipped);
    assert_matches!(records[0].reason.as_deref(), Some(r) if r.contains("reported_on"));
}

// -- corrections --

#[tokio::test]
async fn corrected_model_is_updated_in_place() {
    let store = Arc::new(MemoryStore::new());
    let fleet = installed(&store, "PVR Phoenix", "Audi 1", SERIAL).await;
    let engine = engine(store.clone());

    let source = rows(&[&[("Serial No", SERIAL), ("Model", "CP4230")]]);
    let report = engine
        .reconcile_batch(&source, DisambiguationIndex::new(), &MemorySink::new())
        .await
        .unwrap();

    let projector = store.get_projector(fleet.projector.id).await.unwrap().unwrap();
    assert_ne!(projector.projector_model_id, fleet.model.id);
    assert_eq!(report.entity_outcome(EntityType::ProjectorModel, Outcome::Created), 1);
    assert_eq!(report.entity_outcome(EntityType::Projector, Outcome::Updated), 1);
}

#[tokio::test]
async fn moved_projector_relinks_matching_audi() {
    let store = Arc::new(MemoryStore::new());
    let fleet = installed(&store, "PVR Phoenix", "Audi 1", SERIAL).await;
    let spare = common::projector(&store, "SPARE-1", fleet.model.id).await;
    let engine = engine(store.clone());

    let source = rows(&[&[("Site", "PVR Phoenix"), ("Audi", "AUDI 1"), ("Serial No", "spare-1")]]);
    engine
        .reconcile_batch(&source, DisambiguationIndex::new(), &MemorySink::new())
        .await
        .unwrap();

    let audis = store.find_audis(&AudiFilter::default()).await.unwrap();
    assert_eq!(audis.len(), 1);
    assert_eq!(audis[0].projector_id, Some(spare.id));
}

#[tokio::test]
async fn projector_moved_to_another_audi_leaves_the_old_one() {
    let store = Arc::new(MemoryStore::new());
    let fleet = installed(&store, "PVR Phoenix", "Audi 1", SERIAL).await;
    let engine = engine(store.clone());
    let sink = MemorySink::new();

    let inventory = rows(&[&[("Site", "PVR Phoenix"), ("Audi", "Audi 2"), ("Serial No", SERIAL)]]);
    engine
        .reconcile_batch(&inventory, DisambiguationIndex::new(), &sink)
        .await
        .unwrap();

    let old = store.get_audi(fleet.audi.id).await.unwrap().unwrap();
    assert_eq!(old.projector_id, None);
    let holders = store
        .find_audis(&AudiFilter::by_projector(fleet.projector.id))
        .await
        .unwrap();
    assert_eq!(holders.len(), 1);
    assert_eq!(holders[0].audi_no, "AUDI 2");

    let cleared = sink
        .for_row(0)
        .into_iter()
        .find(|d| d.entity_id == Some(fleet.audi.id))
        .unwrap();
    assert_eq!(cleared.entity_type, Some(EntityType::Audi));
    assert_eq!(cleared.outcome, Outcome::Updated);

    let case_rows = rows(&[&[("Call Log No", "810001"), ("Serial No", SERIAL)]]);
    engine
        .reconcile_batch(&case_rows, DisambiguationIndex::new(), &MemorySink::new())
        .await
        .unwrap();
    let cases = all_cases(store.as_ref()).await;
    assert_eq!(cases[0].audi_id, Some(holders[0].id));
    assert_eq!(cases[0].site_id, fleet.site.id);
}

#[tokio::test]
async fn case_at_another_site_is_not_linked_to_the_projector_audi() {
    let store = Arc::new(MemoryStore::new());
    let fleet = installed(&store, "PVR Phoenix", "Audi 1", SERIAL).await;
    let engine = engine(store.clone());
    let sink = MemorySink::new();

    let source = rows(&[&[
        ("Call Log No", "820001"),
        ("Serial No", SERIAL),
        ("Site", "INOX Nariman"),
    ]]);
    let report = engine
        .reconcile_batch(&source, DisambiguationIndex::new(), &sink)
        .await
        .unwrap();

    let inox = store
        .find_sites(&SiteFilter::by_name("INOX Nariman"))
        .await
        .unwrap()
        .remove(0);
    let cases = all_cases(store.as_ref()).await;
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].site_id, inox.id);
    assert_eq!(cases[0].audi_id, None);
    assert_ne!(inox.id, fleet.site.id);
    assert_eq!(report.error_count(ErrorKind::ReferentialGap), 1);

    let gap = sink
        .for_row(0)
        .into_iter()
        .find(|d| d.error_kind == Some(ErrorKind::ReferentialGap))
        .unwrap();
    assert_eq!(gap.outcome, Outcome::Orphaned);
    assert_eq!(gap.entity_id, Some(cases[0].id));
}

// -- store failures --

#[tokio::test]
async fn store_timeout_aborts_only_that_row() {
    let inner = Arc::new(MemoryStore::new());
    let store = Arc::new(FaultyStore::new(inner.clone()).slow_case_writes(Duration::from_millis(500)));
    let config = ReconcileConfig {
        store_timeout: Duration::from_millis(50),
        ..ReconcileConfig::default()
    };
    let engine = engine_with(store, config);

    let source = rows(&[
        &[("Site", "PVR Phoenix")],
        &[("Site", "PVR Phoenix"), ("Call Log No", "694531")],
    ]);
    let report = engine
        .reconcile_batch(&source, DisambiguationIndex::new(), &MemorySink::new())
        .await
        .unwrap();

    assert_eq!(report.rows_succeeded, 1);
    assert_eq!(report.rows_failed, 1);
    assert_eq!(report.error_count(ErrorKind::StoreTimeout), 1);
    assert_eq!(report.entity_outcome(EntityType::Case, Outcome::Failed), 1);
    assert_eq!(inner.find_sites(&SiteFilter::default()).await.unwrap().len(), 1);
    assert!(all_cases(inner.as_ref()).await.is_empty());
}

#[tokio::test]
async fn concurrent_writer_pushes_case_to_next_suffix() {
    let inner = Arc::new(MemoryStore::new());
    let store = Arc::new(FaultyStore::new(inner.clone()).racing_case_writes(1));
    let engine = engine(store);

    let source = rows(&[&[("Site", "PVR Phoenix"), ("Call Log No", "694531")]]);
    let report = engine
        .reconcile_batch(&source, DisambiguationIndex::new(), &MemorySink::new())
        .await
        .unwrap();

    let cases = all_cases(inner.as_ref()).await;
    assert_eq!(cases.len(), 2);
    assert_eq!(cases[0].payload["writer"], "competitor");
    assert_eq!(cases[0].call_log_number.as_deref(), Some("694531"));
    assert_eq!(cases[1].call_log_number.as_deref(), Some("694531-1"));
    assert_eq!(report.entity_outcome(EntityType::Case, Outcome::Created), 1);
}

#[tokio::test]
async fn disambiguator_gives_up_after_bounded_retries() {
    let inner = Arc::new(MemoryStore::new());
    let store = Arc::new(FaultyStore::new(inner.clone()).racing_case_writes(usize::MAX));
    let config = ReconcileConfig {
        max_suffix_attempts: 2,
        ..ReconcileConfig::default()
    };
    let engine = engine_with(store, config);

    let source = rows(&[&[("Site", "PVR Phoenix"), ("Call Log No", "694531")]]);
    let report = engine
        .reconcile_batch(&source, DisambiguationIndex::new(), &MemorySink::new())
        .await
        .unwrap();

    assert_eq!(report.rows_failed, 1);
    assert_eq!(report.error_count(ErrorKind::InvariantViolation), 1);
    // Only the competitor's two writes landed.
    assert_eq!(all_cases(inner.as_ref()).await.len(), 2);
}
