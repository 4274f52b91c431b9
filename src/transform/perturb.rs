use nalgebra::Vector3;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::core::domain::Structure;
use crate::transform::TransformError;

/// Returns a copy of `structure` with site `atom_index` displaced by
/// `distance * normalize(vector)`.
///
/// `atom_index` starts from 1 and follows the site sequence of the input
/// structure. The input is never mutated; the controller keeps the
/// original for the remaining variants.
pub fn displaced_structure(
    structure: &Structure,
    vector: Vector3<f64>,
    atom_index: usize,
    distance: f64,
) -> Result<Structure, TransformError> {
    if atom_index == 0 || atom_index > structure.num_sites() {
        return Err(TransformError::SiteOutOfRange {
            index: atom_index,
            nsites: structure.num_sites(),
        });
    }
    let norm = vector.norm();
    if norm == 0.0 {
        return Err(TransformError::ZeroDisplacement);
    }
    let mut out = structure.clone();
    out.sites[atom_index - 1].position += vector * (distance / norm);
    out.label = format!("{} displaced", structure.label);
    Ok(out)
}

/// Per-axis compression (or tension) of the cell: each lattice vector is
/// scaled by the matching factor, fractional coordinates are preserved.
pub fn compressed_structure(
    structure: &Structure,
    factors: [f64; 3],
) -> Result<Structure, TransformError> {
    let scaled = structure
        .lattice
        .scaled(Vector3::new(factors[0], factors[1], factors[2]))
        .ok_or(TransformError::SingularCell)?;
    let mut out = structure.clone();
    for (site, original) in out.sites.iter_mut().zip(&structure.sites) {
        let frac = structure.lattice.to_fractional(&original.position);
        site.position = scaled.to_cartesian(&frac);
    }
    out.lattice = scaled;
    out.label = format!("{} compressed", structure.label);
    Ok(out)
}

/// Rattles every site by a uniform random offset in each direction,
/// bounded by `amplitude` (AA).
pub fn rattled_structure<R: Rng + ?Sized>(
    structure: &Structure,
    amplitude: f64,
    rng: &mut R,
) -> Structure {
    let mut out = structure.clone();
    out.label = format!("{} rattled", structure.label);
    if amplitude <= 0.0 {
        return out;
    }
    for site in &mut out.sites {
        site.position.x += rng.gen_range(-amplitude..amplitude);
        site.position.y += rng.gen_range(-amplitude..amplitude);
        site.position.z += rng.gen_range(-amplitude..amplitude);
    }
    out
}

/// Deterministic rattle with a fixed seed, for reproducible perturbations.
pub fn rattled_structure_seeded(structure: &Structure, amplitude: f64, seed: u64) -> Structure {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rattled_structure(structure, amplitude, &mut rng)
}
