use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::sample::OperatingPoint;
use crate::core::settings::ConvergenceSettings;
use crate::engine::dispatch::AuditEntry;
use crate::engine::executor::CalcOutcome;

/// The product of a convergence search: the operating point, the raw
/// sample tables of every sweep that ran, the submission audit trail and
/// the confirmation-run outcome.
///
/// Tables are keyed by sweep name (`pw_regular`, `kpoints_regular`,
/// `pw_displacement`, `kpoints_displacement`, `pw_compression`,
/// `kpoints_compression`); rows are
/// `[independent_var..., total_energy, max_force, vbm, band_gap]` with
/// None-sentinel columns for failed samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub operating_point: Option<OperatingPoint>,
    pub tables: BTreeMap<String, Vec<Vec<Option<f64>>>>,
    pub audit: Vec<AuditEntry>,
    pub final_outcome: Option<CalcOutcome>,
}

impl ConvergenceReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Writes one CSV file per sweep table into `dir`. Failed samples keep
    /// their row; their observable cells are left empty.
    pub fn write_csv(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating table directory {}", dir.display()))?;
        for (key, rows) in &self.tables {
            let path = dir.join(format!("{key}.csv"));
            let mut writer = csv::Writer::from_path(&path)
                .with_context(|| format!("opening {}", path.display()))?;
            for row in rows {
                let record: Vec<String> = row
                    .iter()
                    .map(|cell| cell.map(|v| v.to_string()).unwrap_or_default())
                    .collect();
                writer
                    .write_record(&record)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
            writer
                .flush()
                .with_context(|| format!("flushing {}", path.display()))?;
        }
        Ok(())
    }
}

/// The external parameter repository: initial settings are read from it at
/// controller start, the final report is written back at the end.
pub trait ParameterRepository {
    fn load_settings(&self) -> Result<ConvergenceSettings>;
    fn store_report(&self, report: &ConvergenceReport) -> Result<()>;
}

/// File-backed repository: settings come from a flat `settings.json`
/// key-value object, the report lands as `report.json` plus per-sweep CSV
/// tables under `tables/`.
pub struct FsParameterRepository {
    root: PathBuf,
}

impl FsParameterRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn settings_path(&self) -> PathBuf {
        self.root.join("settings.json")
    }
}

impl ParameterRepository for FsParameterRepository {
    fn load_settings(&self) -> Result<ConvergenceSettings> {
        let path = self.settings_path();
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let options: HashMap<String, Value> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;
        let settings = ConvergenceSettings::from_flat(&options)
            .with_context(|| format!("interpreting {}", path.display()))?;
        Ok(settings)
    }

    fn store_report(&self, report: &ConvergenceReport) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("creating {}", self.root.display()))?;
        let path = self.root.join("report.json");
        fs::write(&path, report.to_json().context("serializing report")?)
            .with_context(|| format!("writing {}", path.display()))?;
        report.write_csv(&self.root.join("tables"))?;
        Ok(())
    }
}
