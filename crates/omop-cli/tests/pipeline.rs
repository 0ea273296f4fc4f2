//! End-to-end runs of a small site on disk.

use std::fs;
use std::path::{Path, PathBuf};

use omop_cli::pipeline::{RunOptions, plan_site, run_site};
use omop_cli::types::StageStatus;
use omop_model::CdmTable;
use omop_output::Manifest;

const CONFIG: &str = r#"
source_path: source
CDM_path: cdm
hospital_id: H1
person:
  data: { source_data: patients.csv }
  columns: { person_source_value: PATNO, gender_source_value: SEX, birth_datetime: BIRTH }
care_site:
  data: { source_data: departments.csv }
  columns: { care_site_source_value: DEPT, care_site_name: DEPTNAME }
visit_occurrence:
  data: { source_data: visits.csv }
  columns:
    person_source_value: PATNO
    visit_start_datetime: INDATE
    visit_source_value: CLASS
    care_site_source_value: DEPT
local_edi:
  data: { source_data: order_master.csv, concept_data: CONCEPT.csv }
  columns: { local_code: ORDCODE, external_code: EDICODE }
measurement:
  data: { source_data: [lab_2022.csv, lab_2023.csv] }
  columns:
    person_source_value: PATNO
    measurement_source_value: ORDCODE
    measurement_datetime: RESULTDATE
    value_source_value: RESULT
    visit_start_datetime: INDATE
    care_site_source_value: DEPT
observation_period:
  data: {}
"#;

const PATIENTS: &str = "PATNO,SEX,BIRTH\nP1,M,1980-05-17\nP2,F,19900101\n";

struct Site {
    _dir: tempfile::TempDir,
    root: PathBuf,
}

impl Site {
    fn config(&self) -> PathBuf {
        self.root.join("site.yaml")
    }

    fn cdm(&self, file: &str) -> PathBuf {
        self.root.join("cdm").join(file)
    }

    fn read_cdm(&self, file: &str) -> String {
        fs::read_to_string(self.cdm(file)).unwrap()
    }
}

fn write(root: &Path, name: &str, text: &str) {
    fs::write(root.join(name), text).unwrap();
}

fn site_with_patients(patients: &str) -> Site {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let source = root.join("source");
    fs::create_dir_all(&source).unwrap();
    write(&root, "site.yaml", CONFIG);
    write(&source, "patients.csv", patients);
    write(&source, "departments.csv", "DEPT,DEPTNAME\nIM,Internal medicine\n");
    write(
        &source,
        "visits.csv",
        "PATNO,INDATE,CLASS,DEPT\nP1,2022-03-01 09:00:00,O,IM\nP2,2023-01-10 09:00:00,I,IM\n",
    );
    write(&source, "order_master.csv", "ORDCODE,EDICODE\nL1,C1\nL2,C2\n");
    write(
        &source,
        "CONCEPT.csv",
        "CONCEPT_ID\tCONCEPT_CODE\tCONCEPT_NAME\tVOCABULARY_ID\tDOMAIN_ID\n\
         4001\tC1\tHemoglobin\tEDI\tMeasurement\n\
         4002\tC2\tGlucose\tEDI\tMeasurement\n",
    );
    write(
        &source,
        "lab_2022.csv",
        "PATNO,ORDCODE,RESULTDATE,RESULT,INDATE,DEPT\n\
         P1,L1,2022-03-01 10:30:00,13.2,2022-03-01 09:00:00,IM\n\
         P1,L9,2022-03-01 10:30:00,1,2022-03-01 09:00:00,IM\n",
    );
    write(
        &source,
        "lab_2023.csv",
        "PATNO,ORDCODE,RESULTDATE,RESULT,INDATE,DEPT\n\
         P2,L2,2023-01-12 06:00:00,<90,2023-01-10 09:00:00,IM\n",
    );
    Site { _dir: dir, root }
}

fn site() -> Site {
    site_with_patients(PATIENTS)
}

#[test]
fn full_run_writes_every_table_and_the_manifest() {
    let site = site();
    let result = run_site(&site.config(), &RunOptions::default()).unwrap();

    let order: Vec<CdmTable> = result.stages.iter().map(|s| s.table).collect();
    assert_eq!(
        order,
        vec![
            CdmTable::CareSite,
            CdmTable::Person,
            CdmTable::VisitOccurrence,
            CdmTable::LocalEdi,
            CdmTable::Measurement,
            CdmTable::ObservationPeriod,
        ]
    );
    assert!(result.stages.iter().all(|s| s.status == StageStatus::Succeeded));
    assert!(!result.has_errors());

    let measurement = result.stage(CdmTable::Measurement).unwrap();
    assert_eq!(measurement.rows, Some(2));
    assert!(measurement.warning_count() >= 1);

    insta::assert_snapshot!(site.read_cdm("observation_period.csv"), @r"
    observation_period_id,person_id,observation_period_start_date,observation_period_end_date,period_type_concept_id
    1,1,2022-03-01,2022-03-01,44814724
    2,2,2023-01-10,2023-01-12,44814724
    ");

    let manifest = Manifest::load_or_default(&site.root.join("cdm")).unwrap();
    assert_eq!(manifest.tables.len(), 6);
    assert_eq!(manifest.cdm_encoding, "utf-8");
    assert_eq!(manifest.entry(CdmTable::Measurement).unwrap().rows, 2);
    assert_eq!(result.manifest, Some(site.cdm("manifest.json")));
}

#[test]
fn rerunning_one_table_reads_dependencies_back_and_is_byte_identical() {
    let site = site();
    run_site(&site.config(), &RunOptions::default()).unwrap();
    let before = Manifest::load_or_default(&site.root.join("cdm")).unwrap();

    let options = RunOptions {
        only: vec![CdmTable::Measurement],
        ..RunOptions::default()
    };
    let (_, plan) = plan_site(&site.config(), &options.only).unwrap();
    assert_eq!(plan.stages[0].upstream, Vec::<CdmTable>::new());
    assert_eq!(
        plan.stages[0].from_disk,
        vec![CdmTable::Person, CdmTable::VisitOccurrence, CdmTable::LocalEdi]
    );

    let result = run_site(&site.config(), &options).unwrap();
    assert_eq!(result.stages.len(), 1);
    assert_eq!(result.stages[0].status, StageStatus::Succeeded);

    let after = Manifest::load_or_default(&site.root.join("cdm")).unwrap();
    assert_eq!(after.tables.len(), 6);
    assert_eq!(
        before.entry(CdmTable::Measurement),
        after.entry(CdmTable::Measurement)
    );
}

#[test]
fn failed_stage_skips_its_dependents() {
    let site = site_with_patients("PATNO,SEX\nP1,M\n");
    let result = run_site(&site.config(), &RunOptions::default()).unwrap();

    assert!(result.has_errors());
    let status = |table| result.stage(table).unwrap().status.clone();
    assert_eq!(status(CdmTable::CareSite), StageStatus::Succeeded);
    assert_eq!(status(CdmTable::LocalEdi), StageStatus::Succeeded);
    assert!(matches!(status(CdmTable::Person), StageStatus::Failed { ref error } if error.contains("BIRTH")));
    assert_eq!(
        status(CdmTable::VisitOccurrence),
        StageStatus::Skipped {
            dependency: CdmTable::Person
        }
    );
    assert!(matches!(status(CdmTable::Measurement), StageStatus::Skipped { .. }));
    assert!(matches!(status(CdmTable::ObservationPeriod), StageStatus::Skipped { .. }));
    assert!(!site.cdm("person.csv").exists());

    let manifest = Manifest::load_or_default(&site.root.join("cdm")).unwrap();
    let written: Vec<CdmTable> = manifest.tables.iter().map(|e| e.table).collect();
    assert_eq!(written, vec![CdmTable::CareSite, CdmTable::LocalEdi]);
}

#[test]
fn fail_fast_stops_at_the_first_failure() {
    let site = site_with_patients("PATNO,SEX\nP1,M\n");
    let options = RunOptions {
        fail_fast: true,
        ..RunOptions::default()
    };
    let result = run_site(&site.config(), &options).unwrap();
    assert!(result.halted);
    let order: Vec<CdmTable> = result.stages.iter().map(|s| s.table).collect();
    assert_eq!(order, vec![CdmTable::CareSite, CdmTable::Person]);
}

#[test]
fn dry_run_writes_nothing() {
    let site = site();
    let options = RunOptions {
        dry_run: true,
        ..RunOptions::default()
    };
    let result = run_site(&site.config(), &options).unwrap();
    assert!(result.stages.iter().all(|s| s.status == StageStatus::Checked));
    assert_eq!(result.stage(CdmTable::Measurement).unwrap().rows, Some(2));
    assert!(result.manifest.is_none());
    assert!(!site.root.join("cdm").exists());
}

#[test]
fn missing_dependency_output_fails_planning() {
    let site = site();
    let options = RunOptions {
        only: vec![CdmTable::Measurement],
        ..RunOptions::default()
    };
    let err = run_site(&site.config(), &options).unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("measurement depends on person"), "{message}");
}

#[test]
fn config_with_missing_required_column_is_rejected() {
    let site = site();
    let text = CONFIG.replace(", birth_datetime: BIRTH", "");
    fs::write(site.config(), text).unwrap();
    let err = run_site(&site.config(), &RunOptions::default()).unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("person.columns.birth_datetime"), "{message}");
}
