use serde::{Deserialize, Serialize};

/// Integer k-point mesh along the three reciprocal axes.
pub type KGrid = [u32; 3];

/// Euclidean norm of a mesh, used as the density measure when two grid
/// recommendations compete (densest wins).
pub fn grid_norm(grid: &KGrid) -> f64 {
    grid.iter().map(|&n| (n as f64) * (n as f64)).sum::<f64>().sqrt()
}

/// The observable a convergence criterion is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    Energy,
    Forces,
    Vbm,
    Gap,
}

impl Metric {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "energy" => Some(Metric::Energy),
            "forces" => Some(Metric::Forces),
            "vbm" => Some(Metric::Vbm),
            "gap" => Some(Metric::Gap),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Energy => "energy",
            Metric::Forces => "forces",
            Metric::Vbm => "vbm",
            Metric::Gap => "gap",
        }
    }
}

/// The two independent convergence dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    PlaneWaveCutoff,
    KpointGrid,
}

/// The structural condition a sweep is run under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Variant {
    Baseline,
    Displaced,
    Compressed,
}

impl Variant {
    /// Tag used in report table keys and request labels.
    pub fn tag(&self) -> &'static str {
        match self {
            Variant::Baseline => "regular",
            Variant::Displaced => "displacement",
            Variant::Compressed => "compression",
        }
    }
}

// --- Sample points ---

/// One point in the (cutoff, k-grid) design space together with the
/// observables computed there. Immutable once recorded; a failed point
/// carries all-None observables but stays in the record for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplePoint {
    pub cutoff: f64,
    pub kgrid: Option<KGrid>,
    pub total_energy: Option<f64>,
    pub max_force: Option<f64>,
    pub vbm: Option<f64>,
    pub band_gap: Option<f64>,
    pub failed: bool,
}

impl SamplePoint {
    /// A failed sample: the design-space coordinates are kept, every
    /// observable is None.
    pub fn failure(cutoff: f64, kgrid: Option<KGrid>) -> Self {
        Self {
            cutoff,
            kgrid,
            total_energy: None,
            max_force: None,
            vbm: None,
            band_gap: None,
            failed: true,
        }
    }

    pub fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Energy => self.total_energy,
            Metric::Forces => self.max_force,
            Metric::Vbm => self.vbm,
            Metric::Gap => self.band_gap,
        }
    }
}

// --- Sweeps ---

/// Ordered sequence of sample points for one (axis, variant) combination.
/// Insertion order is the evaluation order and is significant for the
/// delta comparisons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResult {
    pub axis: Axis,
    pub variant: Variant,
    pub points: Vec<SamplePoint>,
}

impl SweepResult {
    pub fn new(axis: Axis, variant: Variant) -> Self {
        Self {
            axis,
            variant,
            points: Vec::new(),
        }
    }

    /// The most expensive cutoff sampled, the fallback when no pair
    /// satisfies the stopping criterion.
    pub fn last_cutoff(&self) -> Option<f64> {
        self.points.last().map(|p| p.cutoff)
    }

    /// The densest grid sampled, the fallback for the k axis.
    pub fn last_grid(&self) -> Option<KGrid> {
        self.points.last().and_then(|p| p.kgrid)
    }

    /// Key of this sweep in the persisted result table, e.g. "pw_regular"
    /// or "kpoints_compression".
    pub fn table_key(&self) -> String {
        let axis = match self.axis {
            Axis::PlaneWaveCutoff => "pw",
            Axis::KpointGrid => "kpoints",
        };
        format!("{}_{}", axis, self.variant.tag())
    }

    /// Numeric rows `[independent_var..., total_energy, max_force, vbm,
    /// band_gap]`, failed samples with None-sentinel observable columns.
    pub fn rows(&self) -> Vec<Vec<Option<f64>>> {
        self.points
            .iter()
            .map(|p| {
                let mut row: Vec<Option<f64>> = Vec::new();
                match self.axis {
                    Axis::PlaneWaveCutoff => row.push(Some(p.cutoff)),
                    Axis::KpointGrid => {
                        let grid = p.kgrid.unwrap_or([0, 0, 0]);
                        row.extend(grid.iter().map(|&n| Some(n as f64)));
                        row.push(Some(p.cutoff));
                    }
                }
                row.push(p.total_energy);
                row.push(p.max_force);
                row.push(p.vbm);
                row.push(p.band_gap);
                row
            })
            .collect()
    }
}

/// The final chosen (cutoff, k-grid) pair recommended for production
/// calculations. The grid stays None when the caller supplied a k-mesh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OperatingPoint {
    pub cutoff: f64,
    pub kgrid: Option<KGrid>,
}
