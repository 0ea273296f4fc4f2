//! Site configuration loaded from one YAML file per hospital.
//!
//! Top-level settings sit next to one section per CDM table:
//!
//! ```yaml
//! source_path: ./source
//! CDM_path: ./cdm
//! data_range: 2023-12-31
//! person:
//!   data: { source_data: patients.csv }
//!   columns: { person_source_value: PATNO, gender_source_value: SEX, birth_datetime: BIRTH }
//! ```
//!
//! Relative paths are resolved against the directory holding the config file.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::table::CdmTable;

/// How clinical rows with no active mapping are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinMode {
    /// Keep the row with the unmapped sentinel concept.
    Left,
    /// Drop the row.
    Inner,
}

/// How local codes are matched against vocabulary concept codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingStrategy {
    Exact,
    /// Longest-prefix match for hierarchical diagnosis codes.
    Prefix,
}

/// The `[concept_id, concept_name]` pair written when resolution fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(i64, String)", into = "(i64, String)")]
pub struct UnmappedConcept {
    pub concept_id: i64,
    pub concept_name: String,
}

impl Default for UnmappedConcept {
    fn default() -> Self {
        Self {
            concept_id: 0,
            concept_name: "No matching concept".to_string(),
        }
    }
}

impl From<(i64, String)> for UnmappedConcept {
    fn from((concept_id, concept_name): (i64, String)) -> Self {
        Self {
            concept_id,
            concept_name,
        }
    }
}

impl From<UnmappedConcept> for (i64, String) {
    fn from(value: UnmappedConcept) -> Self {
        (value.concept_id, value.concept_name)
    }
}

/// A single file name or a list of files to stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceFiles {
    One(String),
    Many(Vec<String>),
}

impl SourceFiles {
    pub fn names(&self) -> Vec<&str> {
        match self {
            SourceFiles::One(name) => vec![name.as_str()],
            SourceFiles::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_data: Option<SourceFiles>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_filename: Option<String>,
    /// Vocabulary concept file for the mapping tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_delimiter: Option<char>,
    /// Delimiter of the source files; `,` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<char>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolutionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<JoinMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<MappingStrategy>,
}

/// One table section of the site config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    #[serde(default)]
    pub data: DataConfig,
    /// Logical field name to source header.
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
    #[serde(default)]
    pub resolution: ResolutionConfig,
}

impl TableConfig {
    pub fn column(&self, logical: &str) -> Option<&str> {
        self.columns.get(logical).map(String::as_str)
    }

    pub fn join_mode(&self, table: CdmTable) -> JoinMode {
        self.resolution
            .join
            .or(table.default_join())
            .unwrap_or(JoinMode::Left)
    }

    pub fn strategy(&self, table: CdmTable) -> MappingStrategy {
        self.resolution
            .strategy
            .or(table.default_strategy())
            .unwrap_or(MappingStrategy::Exact)
    }

    pub fn delimiter(&self) -> u8 {
        ascii_delimiter(self.data.delimiter, b',')
    }

    pub fn concept_delimiter(&self) -> u8 {
        ascii_delimiter(self.data.concept_delimiter, b'\t')
    }
}

fn ascii_delimiter(value: Option<char>, default: u8) -> u8 {
    value
        .filter(char::is_ascii)
        .map_or(default, |c| c as u8)
}

#[derive(Debug, Deserialize)]
struct RawSiteConfig {
    source_path: PathBuf,
    #[serde(rename = "CDM_path")]
    cdm_path: PathBuf,
    #[serde(default = "default_encoding")]
    source_encoding: String,
    #[serde(default = "default_encoding")]
    cdm_encoding: String,
    #[serde(default)]
    data_range: Option<String>,
    #[serde(default)]
    no_matching_concept: UnmappedConcept,
    #[serde(default)]
    hospital_id: Option<String>,
    #[serde(default)]
    vocabulary_priority: Vec<String>,
    #[serde(flatten)]
    tables: BTreeMap<String, TableConfig>,
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

/// Validated configuration of one hospital site.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub source_path: PathBuf,
    pub cdm_path: PathBuf,
    pub source_encoding: String,
    pub cdm_encoding: String,
    /// Events after this date are excluded.
    pub data_range: Option<NaiveDate>,
    pub no_matching_concept: UnmappedConcept,
    /// Hospital id used when a source has no hospital column.
    pub hospital_id: Option<String>,
    /// Preferred vocabularies, highest priority first.
    pub vocabulary_priority: Vec<String>,
    pub tables: BTreeMap<CdmTable, TableConfig>,
}

impl SiteConfig {
    /// Loads and validates a site config file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawSiteConfig =
            serde_yaml::from_reader(BufReader::new(file)).map_err(|source| {
                ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_raw(raw, base)
    }

    /// Parses a config from YAML text; relative paths are joined to `base`.
    pub fn from_yaml_str(text: &str, base: &Path) -> Result<Self> {
        let raw: RawSiteConfig =
            serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
                path: PathBuf::from("<inline>"),
                source,
            })?;
        Self::from_raw(raw, base)
    }

    fn from_raw(raw: RawSiteConfig, base: &Path) -> Result<Self> {
        let mut tables = BTreeMap::new();
        for (name, table_config) in raw.tables {
            let table =
                CdmTable::from_name(&name).ok_or(ConfigError::UnknownTable { name })?;
            validate_table(table, &table_config)?;
            tables.insert(table, table_config);
        }

        let data_range = match raw.data_range.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(text) => Some(omop_common::parse_date(text).ok_or_else(|| {
                ConfigError::InvalidValue {
                    key: "data_range".to_string(),
                    value: text.to_string(),
                    reason: "expected a date such as 2023-12-31".to_string(),
                }
            })?),
        };

        Ok(Self {
            source_path: base.join(raw.source_path),
            cdm_path: base.join(raw.cdm_path),
            source_encoding: raw.source_encoding,
            cdm_encoding: raw.cdm_encoding,
            data_range,
            no_matching_concept: raw.no_matching_concept,
            hospital_id: raw
                .hospital_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
            vocabulary_priority: raw.vocabulary_priority,
            tables,
        })
    }

    pub fn table(&self, table: CdmTable) -> Option<&TableConfig> {
        self.tables.get(&table)
    }

    /// Tables with a section in the config, in dependency order.
    pub fn configured_tables(&self) -> Vec<CdmTable> {
        self.tables.keys().copied().collect()
    }

    /// Absolute paths of a table's source files.
    pub fn source_files(&self, table: CdmTable) -> Vec<PathBuf> {
        self.table(table)
            .and_then(|config| config.data.source_data.as_ref())
            .map(|files| {
                files
                    .names()
                    .into_iter()
                    .map(|name| self.source_path.join(name))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn concept_file(&self, table: CdmTable) -> Option<PathBuf> {
        self.table(table)
            .and_then(|config| config.data.concept_data.as_ref())
            .map(|name| self.source_path.join(name))
    }

    /// Where a table's CDM CSV is written (and read back by later runs).
    pub fn output_path(&self, table: CdmTable) -> PathBuf {
        let name = self
            .table(table)
            .and_then(|config| config.data.output_filename.clone())
            .unwrap_or_else(|| table.default_output_filename());
        self.cdm_path.join(name)
    }

    /// Hospital id for rows without one of their own; empty for single-site configs.
    pub fn default_hospital(&self) -> &str {
        self.hospital_id.as_deref().unwrap_or("")
    }
}

fn validate_table(table: CdmTable, config: &TableConfig) -> Result<()> {
    let missing_files = match &config.data.source_data {
        None => true,
        Some(files) => files.names().iter().all(|name| name.trim().is_empty()),
    };
    if table.needs_source() && missing_files {
        return Err(ConfigError::MissingKey {
            key: format!("{}.data.source_data", table.name()),
        });
    }
    if table.needs_concepts() && config.data.concept_data.is_none() {
        return Err(ConfigError::MissingKey {
            key: format!("{}.data.concept_data", table.name()),
        });
    }
    if config.resolution.strategy.is_some() && !table.is_mapping_table() {
        return Err(ConfigError::InvalidValue {
            key: format!("{}.resolution.strategy", table.name()),
            value: format!("{:?}", config.resolution.strategy),
            reason: "only local_edi and local_kcd select a strategy".to_string(),
        });
    }
    if config.resolution.join.is_some() && table.mapping_source().is_none() {
        return Err(ConfigError::InvalidValue {
            key: format!("{}.resolution.join", table.name()),
            value: format!("{:?}", config.resolution.join),
            reason: "only tables that resolve local codes select a join".to_string(),
        });
    }
    Ok(())
}
