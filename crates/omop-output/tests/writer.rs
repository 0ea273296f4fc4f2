use omop_common::{i64_column, string_column};
use omop_model::CdmTable;
use omop_output::{MANIFEST_FILE, Manifest, write_cdm_csv};
use polars::prelude::DataFrame;

fn care_sites(name: &str) -> DataFrame {
    DataFrame::new(vec![
        i64_column("care_site_id", vec![Some(1)]),
        string_column("care_site_name", vec![Some(name.to_string())]),
    ])
    .unwrap()
}

#[test]
fn writes_in_the_requested_encoding_and_hashes_the_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cdm").join("care_site.csv");

    let written = write_cdm_csv(
        CdmTable::CareSite,
        &path,
        &care_sites("내과"),
        encoding_rs::EUC_KR,
    )
    .unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let (text, _, malformed) = encoding_rs::EUC_KR.decode(&bytes);
    assert!(!malformed);
    assert_eq!(text, "care_site_id,care_site_name\n1,내과\n");
    assert_ne!(bytes, text.as_bytes());
    assert_eq!(written.rows, 1);
    assert_eq!(written.sha256.len(), 64);
}

#[test]
fn identical_frames_hash_identically() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_cdm_csv(
        CdmTable::CareSite,
        &dir.path().join("a.csv"),
        &care_sites("ER"),
        encoding_rs::UTF_8,
    )
    .unwrap();
    let second = write_cdm_csv(
        CdmTable::CareSite,
        &dir.path().join("b.csv"),
        &care_sites("ER"),
        encoding_rs::UTF_8,
    )
    .unwrap();
    assert_eq!(first.sha256, second.sha256);
}

#[test]
fn manifest_keeps_entries_of_earlier_runs() {
    let dir = tempfile::tempdir().unwrap();
    let care_site = write_cdm_csv(
        CdmTable::CareSite,
        &dir.path().join("care_site.csv"),
        &care_sites("ER"),
        encoding_rs::UTF_8,
    )
    .unwrap();
    let mut manifest = Manifest::load_or_default(dir.path()).unwrap();
    assert!(manifest.tables.is_empty());
    manifest.cdm_encoding = "UTF-8".to_string();
    manifest.record(&care_site);
    manifest.write(dir.path()).unwrap();

    let location = write_cdm_csv(
        CdmTable::Location,
        &dir.path().join("location.csv"),
        &DataFrame::new(vec![i64_column("location_id", vec![Some(1), Some(2)])]).unwrap(),
        encoding_rs::UTF_8,
    )
    .unwrap();
    let mut manifest = Manifest::load_or_default(dir.path()).unwrap();
    manifest.record(&location);
    manifest.write(dir.path()).unwrap();

    let reloaded = Manifest::load_or_default(dir.path()).unwrap();
    assert!(dir.path().join(MANIFEST_FILE).is_file());
    assert_eq!(reloaded.cdm_encoding, "UTF-8");
    assert!(reloaded.generated_at.is_some());
    let tables: Vec<CdmTable> = reloaded.tables.iter().map(|e| e.table).collect();
    assert_eq!(tables, vec![CdmTable::CareSite, CdmTable::Location]);
    let entry = reloaded.entry(CdmTable::Location).unwrap();
    assert_eq!(entry.file, "location.csv");
    assert_eq!(entry.rows, 2);
}
