//! `manifest.json`: what the runs wrote to `CDM_path`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use omop_model::CdmTable;
use serde::{Deserialize, Serialize};

use crate::error::{OutputError, Result};
use crate::writer::WrittenTable;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub table: CdmTable,
    pub file: String,
    pub rows: usize,
    pub sha256: String,
}

impl From<&WrittenTable> for ManifestEntry {
    fn from(written: &WrittenTable) -> Self {
        Self {
            table: written.table,
            file: written
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            rows: written.rows,
            sha256: written.sha256.clone(),
        }
    }
}

/// Tables in `CDM_path`, one entry per table in dependency order.
///
/// A run that writes only some tables keeps the entries of earlier runs for
/// the others.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub cdm_encoding: String,
    #[serde(default)]
    pub tables: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    /// Reads the manifest in `dir`, or an empty one if there is none.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let path = Self::path(dir);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path).map_err(|source| OutputError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| OutputError::Manifest { path, source })
    }

    /// Adds or replaces the entry of a written table.
    pub fn record(&mut self, written: &WrittenTable) {
        let entry = ManifestEntry::from(written);
        match self.tables.iter_mut().find(|e| e.table == entry.table) {
            Some(existing) => *existing = entry,
            None => self.tables.push(entry),
        }
        self.tables.sort_by_key(|e| e.table);
    }

    pub fn entry(&self, table: CdmTable) -> Option<&ManifestEntry> {
        self.tables.iter().find(|e| e.table == table)
    }

    /// Stamps and writes the manifest into `dir`.
    pub fn write(&mut self, dir: &Path) -> Result<PathBuf> {
        self.generated_at = Some(Local::now().format("%Y-%m-%dT%H:%M:%S%:z").to_string());
        let path = Self::path(dir);
        let text = serde_json::to_string_pretty(self).map_err(|source| OutputError::Manifest {
            path: path.clone(),
            source,
        })?;
        fs::create_dir_all(dir).map_err(|source| OutputError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
        fs::write(&path, text).map_err(|source| OutputError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}
