//! Snapshot round-trip keeps labels, sections and known errors, and keeps
//! enforcing natural-key uniqueness after reload.

use chrono::NaiveDate;
use labelscope_db::{ErrorKind, LabelStore, MemoryStore, NaturalKey, NewLabel, NewSection};

fn hc_label() -> NewLabel {
    NewLabel {
        key: NaturalKey {
            source: "HC".to_string(),
            source_product_number: "02242705".to_string(),
            version_date: NaiveDate::from_ymd_opt(2021, 10, 29).unwrap(),
        },
        product_name: "EXAMPLEX 10MG".to_string(),
        generic_name: "examplexine".to_string(),
        marketer: Some("Example Pharma Inc".to_string()),
        link: "https://pdf.hres.ca/dpd_pm/00012345.PDF".to_string(),
    }
}

#[tokio::test]
async fn test_snapshot_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store").join("labels.json");

    let store = MemoryStore::new();
    let label_id = store.upsert_label(&hc_label()).await.unwrap();
    let product_id = store.add_product(label_id).await.unwrap();
    store
        .add_section(product_id, &NewSection {
            canonical_name: "Indications".to_string(),
            original_heading: Some("INDICATIONS".to_string()),
            body_text: "Treats condition Z.".to_string(),
        })
        .await
        .unwrap();
    store
        .upsert_known_error("HC", "02240000", ErrorKind::FetchFailed, "connection reset")
        .await
        .unwrap();
    store.save_snapshot(&path).await.unwrap();

    let reloaded = MemoryStore::load_snapshot(&path).await.unwrap();
    assert_eq!(reloaded.label_count().await.unwrap(), 1);
    let sections = reloaded.sections_for_label(label_id).await.unwrap();
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].body_text, "Treats condition Z.");
    let known = reloaded.known_error("HC", "02240000").await.unwrap().unwrap();
    assert_eq!(known.kind, ErrorKind::FetchFailed);

    let err = reloaded.upsert_label(&hc_label()).await.unwrap_err();
    assert!(err.is_duplicate());
}

#[tokio::test]
async fn test_missing_snapshot_is_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::load_snapshot(dir.path().join("absent.json")).await.unwrap();
    assert_eq!(store.label_count().await.unwrap(), 0);
}
