use std::fs;

use omop_common::string_values;
use omop_ingest::{IngestError, read_cdm_table, read_delimited, read_sources, resolve_encoding};

#[test]
fn reads_cp949_source() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("patients.csv");
    let encoding = resolve_encoding("cp949").expect("encoding");
    let (bytes, _, had_errors) = encoding.encode("PATNO,NAME\nP1,홍길동\n");
    assert!(!had_errors);
    fs::write(&path, &bytes).expect("write");

    let df = read_delimited(&path, encoding, b',').expect("read");
    assert_eq!(
        string_values(&df, "NAME").expect("column"),
        vec![Some("홍길동".to_string())]
    );
}

#[test]
fn stacks_files_over_header_union() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = dir.path().join("lab_2022.csv");
    let second = dir.path().join("lab_2023.csv");
    fs::write(&first, "PATNO,CODE\nP1,L1\n").expect("write");
    fs::write(&second, "CODE,PATNO,RESULT\nL2,P2,5.1\n").expect("write");

    let utf8 = resolve_encoding("utf-8").expect("encoding");
    let df = read_sources(&[first, second], utf8, b',').expect("stack");
    assert_eq!(
        df.get_column_names_owned()
            .iter()
            .map(|name| name.to_string())
            .collect::<Vec<_>>(),
        vec!["PATNO", "CODE", "RESULT"]
    );
    assert_eq!(
        string_values(&df, "PATNO").expect("column"),
        vec![Some("P1".to_string()), Some("P2".to_string())]
    );
    assert_eq!(
        string_values(&df, "RESULT").expect("column"),
        vec![None, Some("5.1".to_string())]
    );
}

#[test]
fn missing_file_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let utf8 = resolve_encoding("utf-8").expect("encoding");
    let err = read_cdm_table(&dir.path().join("person.csv"), utf8).unwrap_err();
    assert!(matches!(err, IngestError::FileNotFound { .. }));
}

#[test]
fn no_sources_is_an_error() {
    let utf8 = resolve_encoding("utf-8").expect("encoding");
    assert!(matches!(
        read_sources(&[], utf8, b','),
        Err(IngestError::NoSourceFiles)
    ));
}
