use log::warn;
use thiserror::Error;

use crate::core::domain::{Site, Structure};
use crate::core::sample::KGrid;
use crate::transform::TransformError;

/// Attempts before the tolerance-relaxation retry gives up.
pub const MAX_ENUMERATION_ATTEMPTS: usize = 4;

/// Distance (AA) under which an enumerated site is matched back to an
/// original site when building removal masks.
const SITE_MATCH_TOL: f64 = 0.1;

/// A structure with sites removed, plus the mask of the original sites
/// that survived. The mask is useful for transforming per-site properties
/// (magnetic moments, tags) alongside the structure.
#[derive(Debug, Clone)]
pub struct Delithiated {
    pub structure: Structure,
    pub mask: Vec<bool>,
}

/// How many sites of the working species to remove.
#[derive(Debug, Clone, Copy)]
pub enum RemovalSpec {
    Count(usize),
    /// Fraction of the available sites; must resolve to an integer count.
    Fraction(f64),
}

impl RemovalSpec {
    /// Resolves the request against the number of available sites. A zero
    /// removal or a non-integer relative count is rejected before any
    /// calculation is dispatched.
    pub fn resolve(&self, available: usize) -> Result<usize, TransformError> {
        let count = match *self {
            RemovalSpec::Count(count) => count,
            RemovalSpec::Fraction(fraction) => {
                let exact = fraction * available as f64;
                let rounded = exact.round();
                if (exact - rounded).abs() > 1e-8 {
                    return Err(TransformError::FractionalRemoval {
                        fraction,
                        count: available,
                    });
                }
                rounded as usize
            }
        };
        if count == 0 {
            return Err(TransformError::NothingToRemove);
        }
        if count > available {
            return Err(TransformError::TooManyRemovals {
                requested: count,
                available,
            });
        }
        Ok(count)
    }
}

/// Error surface of the external site enumerator.
#[derive(Debug, Error)]
pub enum EnumerationError {
    /// The symmetry tolerance was too tight to produce any enumeration;
    /// recoverable by relaxing the tolerance.
    #[error("symmetry tolerance too tight: {0}")]
    ToleranceTooTight(String),

    #[error("{0}")]
    Other(String),
}

/// External symmetry/electrostatics collaborator that enumerates the
/// symmetry-unique ways of removing `n_remove` sites of one species.
/// Not reimplemented here.
pub trait SiteEnumerator {
    fn unique_substitutions(
        &self,
        structure: &Structure,
        species: &str,
        n_remove: usize,
        atol: f64,
    ) -> Result<Vec<Structure>, EnumerationError>;
}

/// Removes every site of the removal species ("Li" for full delithiation).
pub fn delithiate_full(structure: &Structure, species: &str) -> Result<Delithiated, TransformError> {
    let mask: Vec<bool> = structure.sites.iter().map(|s| s.species != species).collect();
    if mask.iter().all(|&kept| kept) {
        return Err(TransformError::NothingToRemove);
    }
    let sites: Vec<Site> = structure
        .sites
        .iter()
        .zip(&mask)
        .filter(|(_, &kept)| kept)
        .map(|(site, _)| site.clone())
        .collect();
    let mut out = Structure::new(structure.lattice.clone(), sites, &structure.label);
    out.label = format!("{} fully delithiated", structure.label);
    Ok(Delithiated {
        structure: out,
        mask,
    })
}

/// Enumerates every single-site removal of the removal species. Symmetry
/// is not taken into account; each variant removes exactly one site.
pub fn delithiate_one(
    structure: &Structure,
    species: &str,
) -> Result<Vec<Delithiated>, TransformError> {
    let targets: Vec<usize> = structure
        .sites
        .iter()
        .enumerate()
        .filter(|(_, s)| s.species == species)
        .map(|(i, _)| i)
        .collect();
    if targets.is_empty() {
        return Err(TransformError::NothingToRemove);
    }
    let mut variants = Vec::with_capacity(targets.len());
    for (ordinal, &remove) in targets.iter().enumerate() {
        let mask: Vec<bool> = (0..structure.num_sites()).map(|i| i != remove).collect();
        let sites: Vec<Site> = structure
            .sites
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != remove)
            .map(|(_, site)| site.clone())
            .collect();
        let mut out = Structure::new(structure.lattice.clone(), sites, &structure.label);
        out.label = format!("{} delithiated 1 - {}", structure.label, ordinal);
        variants.push(Delithiated {
            structure: out,
            mask,
        });
    }
    Ok(variants)
}

/// Repeats the cell along each axis. Sites are kept in species order, the
/// way downstream calculation inputs expect them.
pub fn make_supercell(structure: &Structure, repeat: KGrid) -> Structure {
    let lattice = &structure.lattice;
    let mut sites = Vec::with_capacity(structure.num_sites() * (repeat.iter().product::<u32>() as usize));
    for i in 0..repeat[0] {
        for j in 0..repeat[1] {
            for k in 0..repeat[2] {
                let shift = lattice.vectors.column(0) * i as f64
                    + lattice.vectors.column(1) * j as f64
                    + lattice.vectors.column(2) * k as f64;
                for site in &structure.sites {
                    sites.push(Site {
                        species: site.species.clone(),
                        position: site.position + shift,
                    });
                }
            }
        }
    }
    sites.sort_by(|a, b| a.species.cmp(&b.species));
    let scaled = lattice
        .scaled(nalgebra::Vector3::new(
            repeat[0] as f64,
            repeat[1] as f64,
            repeat[2] as f64,
        ))
        .unwrap_or_else(|| lattice.clone());
    let mut out = Structure::new(scaled, sites, &structure.label);
    out.label = format!(
        "{} super {} {} {}",
        structure.label, repeat[0], repeat[1], repeat[2]
    );
    out
}

/// Builds a defect-containing supercell: the cell is repeated, the listed
/// site indices (into the expanded supercell) are removed, the rest is
/// species-sorted.
pub fn make_vacancy(
    structure: &Structure,
    indices: &[usize],
    repeat: KGrid,
) -> Result<Structure, TransformError> {
    let expanded = make_supercell(structure, repeat);
    if indices.is_empty() {
        return Err(TransformError::NothingToRemove);
    }
    if let Some(&bad) = indices.iter().find(|&&i| i >= expanded.num_sites()) {
        return Err(TransformError::SiteOutOfRange {
            index: bad + 1,
            nsites: expanded.num_sites(),
        });
    }
    let sites: Vec<Site> = expanded
        .sites
        .iter()
        .enumerate()
        .filter(|(i, _)| !indices.contains(i))
        .map(|(_, site)| site.clone())
        .collect();
    let mut out = Structure::new(expanded.lattice.clone(), sites, &structure.label);
    out.label = format!("{} vacancy", structure.label);
    Ok(out)
}

/// Drives the external enumerator to produce symmetry-unique partially
/// delithiated cells.
///
/// The removal specification is validated up front. If the enumerator reports the
/// symmetry tolerance as too tight, the tolerance is relaxed by a factor
/// of 10 and the call retried, up to [`MAX_ENUMERATION_ATTEMPTS`]; past
/// the ceiling the whole operation fails. Each output structure is checked
/// for bare kind names and mapped back to the original sites to build the
/// removal mask.
pub fn enumerate_unique_sites(
    enumerator: &dyn SiteEnumerator,
    structure: &Structure,
    species: &str,
    spec: RemovalSpec,
    atol: f64,
) -> Result<Vec<Delithiated>, TransformError> {
    let available = structure.count_of(species);
    if available == 0 {
        return Err(TransformError::NothingToRemove);
    }
    let n_remove = spec.resolve(available)?;

    let mut tolerance = atol;
    for attempt in 1..=MAX_ENUMERATION_ATTEMPTS {
        match enumerator.unique_substitutions(structure, species, n_remove, tolerance) {
            Ok(unique) => {
                let mut out = Vec::with_capacity(unique.len());
                for variant in unique {
                    if !variant.kinds_are_bare() {
                        return Err(TransformError::TaggedKinds);
                    }
                    let mask = site_mask(structure, &variant)?;
                    out.push(Delithiated {
                        structure: variant,
                        mask,
                    });
                }
                return Ok(out);
            }
            Err(EnumerationError::ToleranceTooTight(msg)) => {
                warn!(
                    "enumeration attempt {attempt} failed ({msg}); \
                     relaxing symmetry tolerance to {}",
                    tolerance * 10.0
                );
                tolerance *= 10.0;
            }
            Err(EnumerationError::Other(msg)) => {
                return Err(TransformError::Enumeration(msg));
            }
        }
    }
    Err(TransformError::ToleranceCeiling {
        attempts: MAX_ENUMERATION_ATTEMPTS,
        atol: tolerance,
    })
}

/// Maps each original site to whether it survived in the variant, by
/// nearest-position matching.
fn site_mask(original: &Structure, variant: &Structure) -> Result<Vec<bool>, TransformError> {
    let mut mask = vec![false; original.num_sites()];
    for site in &variant.sites {
        let mut matched = false;
        for (index, candidate) in original.sites.iter().enumerate() {
            if candidate.species == site.species
                && (candidate.position - site.position).norm() < SITE_MATCH_TOL
            {
                mask[index] = true;
                matched = true;
                break;
            }
        }
        if !matched {
            return Err(TransformError::UnmappedSite);
        }
    }
    Ok(mask)
}
