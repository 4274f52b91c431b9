use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::sample::{KGrid, Metric};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("unrecognized convergence option `{0}`")]
    UnknownKey(String),
    #[error("option `{key}` expects {expected}")]
    WrongType { key: String, expected: &'static str },
    #[error("inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Immutable configuration snapshot captured at controller start.
///
/// Once captured it is never mutated; the controller takes derived
/// per-phase working copies instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceSettings {
    /// Caller-supplied cutoff (eV). Suppresses the plane-wave sweeps.
    pub pwcutoff: Option<f64>,
    /// Caller-supplied mesh for the sweeps. Suppresses the k sweeps.
    pub kgrid: Option<KGrid>,
    /// True when the caller provided an explicit k-mesh object; the final
    /// k-grid recommendation stays None in that case.
    pub supplied_kmesh: bool,

    pub pwcutoff_start: f64,
    pub pwcutoff_step: f64,
    pub pwcutoff_samples: usize,

    /// Target k-point stepping at the densest grid (1/AA).
    pub k_dense: f64,
    /// Target k-point stepping at the coarsest grid (1/AA).
    pub k_coarse: f64,
    pub k_samples: usize,
    /// Default spacing used for the fixed grid of the plane-wave sweeps.
    pub k_spacing: f64,

    pub cutoff_type: Metric,
    /// Absolute stopping threshold for raw sweeps.
    pub cutoff_value: f64,
    /// Relative stopping threshold, applied to difference sweeps.
    pub cutoff_value_r: f64,

    pub compress: bool,
    pub displace: bool,
    pub displacement_vector: [f64; 3],
    /// Displacement distance (L2 norm) in AA.
    pub displacement_distance: f64,
    /// Which atom to displace. Index starts from 1, following the site
    /// sequence of the input structure.
    pub displacement_atom: usize,
    /// Scale factor per lattice vector for the compression test.
    pub volume_change: [f64; 3],

    /// Relax during the sweep calculations (off by default; the final
    /// confirmation run re-enables relaxation regardless).
    pub relax: bool,
    /// Key into the total-energy accounting of the execution service.
    pub total_energy_type: String,
    /// Dummy-calculation mode for test harnesses.
    pub testing: bool,
}

impl Default for ConvergenceSettings {
    fn default() -> Self {
        Self {
            pwcutoff: None,
            kgrid: None,
            supplied_kmesh: false,
            pwcutoff_start: 200.0,
            pwcutoff_step: 50.0,
            pwcutoff_samples: 10,
            k_dense: 0.20,
            k_coarse: 0.50,
            k_samples: 10,
            k_spacing: 0.30,
            cutoff_type: Metric::Energy,
            cutoff_value: 0.01,
            cutoff_value_r: 0.01,
            compress: false,
            displace: false,
            displacement_vector: [1.0, 1.0, 1.0],
            displacement_distance: 0.2,
            displacement_atom: 1,
            volume_change: [1.05, 1.05, 1.05],
            relax: false,
            total_energy_type: "energy_no_entropy".to_string(),
            testing: false,
        }
    }
}

impl ConvergenceSettings {
    /// Builds settings from the flat key-value configuration handed over
    /// by the parameter repository. Unrecognized keys are rejected.
    pub fn from_flat(options: &HashMap<String, Value>) -> Result<Self, SettingsError> {
        let mut settings = Self::default();
        for (key, value) in options {
            match key.as_str() {
                "pwcutoff" => settings.pwcutoff = Some(as_f64(key, value)?),
                "kgrid" => settings.kgrid = Some(as_grid(key, value)?),
                "pwcutoff_start" => settings.pwcutoff_start = as_f64(key, value)?,
                "pwcutoff_step" => settings.pwcutoff_step = as_f64(key, value)?,
                "pwcutoff_samples" => settings.pwcutoff_samples = as_usize(key, value)?,
                "k_dense" => settings.k_dense = as_f64(key, value)?,
                "k_coarse" => settings.k_coarse = as_f64(key, value)?,
                "k_samples" => settings.k_samples = as_usize(key, value)?,
                "k_spacing" => settings.k_spacing = as_f64(key, value)?,
                "cutoff_type" => {
                    let name = as_str(key, value)?;
                    settings.cutoff_type = Metric::parse(&name).ok_or_else(|| {
                        SettingsError::Inconsistent(format!(
                            "cutoff_type `{name}` is not one of energy/forces/vbm/gap"
                        ))
                    })?;
                }
                "cutoff_value" => settings.cutoff_value = as_f64(key, value)?,
                "cutoff_value_r" => settings.cutoff_value_r = as_f64(key, value)?,
                "compress" => settings.compress = as_bool(key, value)?,
                "displace" => settings.displace = as_bool(key, value)?,
                "displacement_vector" => {
                    settings.displacement_vector = as_vec3(key, value)?;
                }
                "displacement_distance" => {
                    settings.displacement_distance = as_f64(key, value)?;
                }
                "displacement_atom" => settings.displacement_atom = as_usize(key, value)?,
                "volume_change" => settings.volume_change = as_vec3(key, value)?,
                "relax" => settings.relax = as_bool(key, value)?,
                "total_energy_type" => settings.total_energy_type = as_str(key, value)?,
                "testing" => settings.testing = as_bool(key, value)?,
                other => return Err(SettingsError::UnknownKey(other.to_string())),
            }
        }
        Ok(settings)
    }

    /// Rejects configurations that cannot produce a meaningful search.
    /// Called before anything is dispatched.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.pwcutoff_step <= 0.0 {
            return Err(SettingsError::Inconsistent(
                "pwcutoff_step must be positive".into(),
            ));
        }
        if self.pwcutoff.is_none() && self.pwcutoff_samples < 2 {
            return Err(SettingsError::Inconsistent(
                "pwcutoff_samples must be at least 2 to take deltas".into(),
            ));
        }
        if self.k_dense <= 0.0 || self.k_coarse <= self.k_dense {
            return Err(SettingsError::Inconsistent(
                "k_coarse must exceed k_dense and both must be positive".into(),
            ));
        }
        if self.k_samples == 0 {
            return Err(SettingsError::Inconsistent(
                "k_samples must be at least 1".into(),
            ));
        }
        if self.k_spacing <= 0.0 {
            return Err(SettingsError::Inconsistent(
                "k_spacing must be positive".into(),
            ));
        }
        if self.cutoff_value <= 0.0 || self.cutoff_value_r <= 0.0 {
            return Err(SettingsError::Inconsistent(
                "convergence thresholds must be positive".into(),
            ));
        }
        if self.displace {
            if self.displacement_distance <= 0.0 {
                return Err(SettingsError::Inconsistent(
                    "displacement_distance must be positive".into(),
                ));
            }
            let norm_sq: f64 = self
                .displacement_vector
                .iter()
                .map(|x| x * x)
                .sum();
            if norm_sq == 0.0 {
                return Err(SettingsError::Inconsistent(
                    "displacement_vector must not be the zero vector".into(),
                ));
            }
            if self.displacement_atom == 0 {
                return Err(SettingsError::Inconsistent(
                    "displacement_atom indexing starts at 1".into(),
                ));
            }
        }
        if self.compress && self.volume_change.iter().any(|&f| f <= 0.0) {
            return Err(SettingsError::Inconsistent(
                "volume_change factors must be positive".into(),
            ));
        }
        Ok(())
    }

    /// The plane-wave cutoff test vector: `start + i * step`.
    pub fn pwcutoff_sampling(&self) -> Vec<f64> {
        (0..self.pwcutoff_samples)
            .map(|i| self.pwcutoff_start + i as f64 * self.pwcutoff_step)
            .collect()
    }
}

// --- Flat-value coercion helpers ---

fn as_f64(key: &str, value: &Value) -> Result<f64, SettingsError> {
    value.as_f64().ok_or_else(|| SettingsError::WrongType {
        key: key.to_string(),
        expected: "a number",
    })
}

fn as_usize(key: &str, value: &Value) -> Result<usize, SettingsError> {
    value
        .as_u64()
        .map(|v| v as usize)
        .ok_or_else(|| SettingsError::WrongType {
            key: key.to_string(),
            expected: "a non-negative integer",
        })
}

fn as_bool(key: &str, value: &Value) -> Result<bool, SettingsError> {
    value.as_bool().ok_or_else(|| SettingsError::WrongType {
        key: key.to_string(),
        expected: "a boolean",
    })
}

fn as_str(key: &str, value: &Value) -> Result<String, SettingsError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| SettingsError::WrongType {
            key: key.to_string(),
            expected: "a string",
        })
}

fn as_vec3(key: &str, value: &Value) -> Result<[f64; 3], SettingsError> {
    let items = value.as_array().ok_or_else(|| SettingsError::WrongType {
        key: key.to_string(),
        expected: "a list of three numbers",
    })?;
    if items.len() != 3 {
        return Err(SettingsError::WrongType {
            key: key.to_string(),
            expected: "a list of three numbers",
        });
    }
    let mut out = [0.0; 3];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item.as_f64().ok_or_else(|| SettingsError::WrongType {
            key: key.to_string(),
            expected: "a list of three numbers",
        })?;
    }
    Ok(out)
}

fn as_grid(key: &str, value: &Value) -> Result<KGrid, SettingsError> {
    let items = value.as_array().ok_or_else(|| SettingsError::WrongType {
        key: key.to_string(),
        expected: "a list of three positive integers",
    })?;
    if items.len() != 3 {
        return Err(SettingsError::WrongType {
            key: key.to_string(),
            expected: "a list of three positive integers",
        });
    }
    let mut out = [0u32; 3];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item
            .as_u64()
            .filter(|&v| v > 0)
            .map(|v| v as u32)
            .ok_or_else(|| SettingsError::WrongType {
                key: key.to_string(),
                expected: "a list of three positive integers",
            })?;
    }
    Ok(out)
}
