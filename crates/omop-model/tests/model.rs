//! Tests for omop-model config loading.

use std::fs;

use omop_model::{CdmTable, ConfigError, JoinMode, MappingStrategy, SiteConfig};

#[test]
fn load_resolves_paths_against_config_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("site.yaml");
    fs::write(
        &path,
        r#"
source_path: ./source
CDM_path: ./cdm
source_encoding: cp949
condition_occurrence:
  data: { source_data: diagnosis.csv }
  columns:
    person_source_value: PATNO
    condition_source_value: DXCODE
    condition_start_datetime: DXDATE
local_kcd:
  data: { source_data: diagnosis.csv, concept_data: CONCEPT.csv }
  columns: { local_code: DXCODE }
"#,
    )
    .expect("write config");

    let config = SiteConfig::load(&path).expect("load config");
    assert_eq!(config.source_path, dir.path().join("./source"));
    assert_eq!(config.source_encoding, "cp949");
    assert_eq!(config.cdm_encoding, "utf-8");
    assert_eq!(
        config.concept_file(CdmTable::LocalKcd),
        Some(dir.path().join("./source").join("CONCEPT.csv"))
    );
    assert_eq!(
        config.output_path(CdmTable::ConditionOccurrence),
        dir.path().join("./cdm").join("condition_occurrence.csv")
    );

    let kcd = config.table(CdmTable::LocalKcd).expect("local_kcd section");
    assert_eq!(kcd.strategy(CdmTable::LocalKcd), MappingStrategy::Prefix);
    let condition = config
        .table(CdmTable::ConditionOccurrence)
        .expect("condition section");
    assert_eq!(
        condition.join_mode(CdmTable::ConditionOccurrence),
        JoinMode::Left
    );
    assert_eq!(condition.column("condition_source_value"), Some("DXCODE"));
}

#[test]
fn load_reports_missing_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = SiteConfig::load(&dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn invalid_data_range_is_rejected() {
    let err = SiteConfig::from_yaml_str(
        "source_path: s\nCDM_path: c\ndata_range: someday\n",
        std::path::Path::new(""),
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "data_range"));
}

#[test]
fn strategy_only_on_mapping_tables() {
    let err = SiteConfig::from_yaml_str(
        "source_path: s\nCDM_path: c\nperson:\n  data: { source_data: p.csv }\n  resolution: { strategy: prefix }\n",
        std::path::Path::new(""),
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }));
}
