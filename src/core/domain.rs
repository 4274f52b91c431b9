use nalgebra::{Matrix3, Point3, Vector3};
use regex::Regex;
use serde::{Deserialize, Serialize};

// --- Lattice ---

/// Defines the periodic cell of a structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lattice {
    pub vectors: Matrix3<f64>, // Columns are a, b, c
    pub inverse: Matrix3<f64>, // Precomputed for fractional conversion
}

impl Lattice {
    pub fn new(a: Vector3<f64>, b: Vector3<f64>, c: Vector3<f64>) -> Option<Self> {
        let vectors = Matrix3::from_columns(&[a, b, c]);
        let inverse = vectors.try_inverse()?;
        Some(Self { vectors, inverse })
    }

    /// Convenience constructor for an orthorhombic cell.
    pub fn orthorhombic(a: f64, b: f64, c: f64) -> Option<Self> {
        Self::new(
            Vector3::new(a, 0.0, 0.0),
            Vector3::new(0.0, b, 0.0),
            Vector3::new(0.0, 0.0, c),
        )
    }

    pub fn to_fractional(&self, p: &Point3<f64>) -> Point3<f64> {
        let v = self.inverse * p.coords;
        Point3::from(v)
    }

    pub fn to_cartesian(&self, p: &Point3<f64>) -> Point3<f64> {
        let v = self.vectors * p.coords;
        Point3::from(v)
    }

    /// The reciprocal cell including the 2*pi factor.
    /// Columns are the reciprocal vectors b1, b2, b3.
    pub fn reciprocal(&self) -> Matrix3<f64> {
        self.inverse.transpose() * (2.0 * std::f64::consts::PI)
    }

    /// Returns a new lattice with each cell vector scaled by the matching
    /// factor. Fails if the scaled cell is singular (zero factor).
    pub fn scaled(&self, factors: Vector3<f64>) -> Option<Self> {
        let a = self.vectors.column(0) * factors.x;
        let b = self.vectors.column(1) * factors.y;
        let c = self.vectors.column(2) * factors.z;
        Self::new(a, b, c)
    }

    pub fn volume(&self) -> f64 {
        self.vectors.determinant().abs()
    }
}

// --- Structure ---

/// A single atomic site. Positions are Cartesian (AA).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub species: String,
    pub position: Point3<f64>,
}

/// A periodic crystal structure, the unit passed between the convergence
/// controller, the structure transforms and the job execution service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Structure {
    pub lattice: Lattice,
    pub sites: Vec<Site>,
    pub label: String,
}

impl Structure {
    pub fn new(lattice: Lattice, sites: Vec<Site>, label: &str) -> Self {
        Self {
            lattice,
            sites,
            label: label.to_string(),
        }
    }

    pub fn num_sites(&self) -> usize {
        self.sites.len()
    }

    /// Counts sites per species symbol.
    pub fn species_counts(&self) -> std::collections::BTreeMap<String, usize> {
        let mut counts = std::collections::BTreeMap::new();
        for site in &self.sites {
            *counts.entry(site.species.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn count_of(&self, symbol: &str) -> usize {
        self.sites.iter().filter(|s| s.species == symbol).count()
    }

    /// Fractional coordinates of site `index`.
    pub fn fractional(&self, index: usize) -> Point3<f64> {
        self.lattice.to_fractional(&self.sites[index].position)
    }

    /// Wraps all sites into the [0, 1) fractional box.
    ///
    /// **Invariant**: modifies positions in-place. Does NOT reorder sites.
    pub fn wrap(&mut self) {
        for site in &mut self.sites {
            let mut frac = self.lattice.to_fractional(&site.position);
            frac.coords.x = frac.coords.x.rem_euclid(1.0);
            frac.coords.y = frac.coords.y.rem_euclid(1.0);
            frac.coords.z = frac.coords.z.rem_euclid(1.0);
            site.position = self.lattice.to_cartesian(&frac);
        }
    }

    /// Checks that every species name is a bare element symbol, without
    /// digit suffixes left over by enumeration bookkeeping.
    pub fn kinds_are_bare(&self) -> bool {
        // One or two letters, capitalized; no indices allowed.
        let re = Regex::new(r"^[A-Z][a-z]?$").unwrap();
        self.sites.iter().all(|s| re.is_match(&s.species))
    }
}
