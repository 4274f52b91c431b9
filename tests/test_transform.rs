use nalgebra::Vector3;

use pw_converge::core::domain::Structure;
use pw_converge::transform::enumerate::{
    delithiate_full, delithiate_one, enumerate_unique_sites, make_supercell, make_vacancy,
    EnumerationError, RemovalSpec, SiteEnumerator, MAX_ENUMERATION_ATTEMPTS,
};
use pw_converge::transform::perturb::{
    compressed_structure, displaced_structure, rattled_structure_seeded,
};
use pw_converge::transform::TransformError;

mod common;

#[test]
fn test_displaced_structure() {
    let original = common::test_structure();
    let displaced = displaced_structure(&original, Vector3::new(0.0, 0.0, 2.0), 1, 0.2).unwrap();

    // Site 1 (1-based) moved by 0.2 AA along +z; everything else intact.
    let moved = displaced.sites[0].position - original.sites[0].position;
    assert!((moved.z - 0.2).abs() < 1e-12);
    assert!(moved.x.abs() < 1e-12 && moved.y.abs() < 1e-12);
    for index in 1..original.num_sites() {
        assert_eq!(
            displaced.sites[index].position,
            original.sites[index].position
        );
    }
    // The input is untouched.
    assert_eq!(original.sites[0].position.z, 0.0);
}

#[test]
fn test_displaced_structure_normalizes_direction() {
    let original = common::test_structure();
    let displaced =
        displaced_structure(&original, Vector3::new(3.0, 4.0, 0.0), 2, 1.0).unwrap();
    let moved = displaced.sites[1].position - original.sites[1].position;
    assert!((moved.norm() - 1.0).abs() < 1e-12);
    assert!((moved.x - 0.6).abs() < 1e-12);
    assert!((moved.y - 0.8).abs() < 1e-12);
}

#[test]
fn test_displaced_structure_index_checks() {
    let original = common::test_structure();
    assert!(matches!(
        displaced_structure(&original, Vector3::new(1.0, 0.0, 0.0), 0, 0.2),
        Err(TransformError::SiteOutOfRange { .. })
    ));
    assert!(matches!(
        displaced_structure(&original, Vector3::new(1.0, 0.0, 0.0), 4, 0.2),
        Err(TransformError::SiteOutOfRange { .. })
    ));
    assert!(matches!(
        displaced_structure(&original, Vector3::zeros(), 1, 0.2),
        Err(TransformError::ZeroDisplacement)
    ));
}

#[test]
fn test_compressed_structure_preserves_fractional_coordinates() {
    let original = common::test_structure();
    let compressed = compressed_structure(&original, [1.05, 1.05, 1.05]).unwrap();

    let expected_volume = original.lattice.volume() * 1.05f64.powi(3);
    assert!((compressed.lattice.volume() - expected_volume).abs() < 1e-9);

    for index in 0..original.num_sites() {
        let before = original.fractional(index);
        let after = compressed.fractional(index);
        assert!((before - after).norm() < 1e-12);
    }
    // Cartesian positions scale with the cell.
    assert!((compressed.sites[1].position.x - 4.2).abs() < 1e-12);
}

#[test]
fn test_rattle_is_seeded_and_bounded() {
    let original = common::test_structure();
    let first = rattled_structure_seeded(&original, 0.1, 42);
    let second = rattled_structure_seeded(&original, 0.1, 42);
    for (a, b) in first.sites.iter().zip(&second.sites) {
        assert_eq!(a.position, b.position);
    }
    let mut any_moved = false;
    for (site, reference) in first.sites.iter().zip(&original.sites) {
        let delta = site.position - reference.position;
        for component in [delta.x, delta.y, delta.z] {
            assert!(component.abs() < 0.1);
            if component.abs() > 0.0 {
                any_moved = true;
            }
        }
    }
    assert!(any_moved);
}

#[test]
fn test_delithiate_full() {
    let original = common::test_structure();
    let result = delithiate_full(&original, "Li").unwrap();
    assert_eq!(result.structure.num_sites(), 1);
    assert_eq!(result.structure.sites[0].species, "O");
    assert_eq!(result.mask, vec![false, false, true]);

    assert!(matches!(
        delithiate_full(&result.structure, "Li"),
        Err(TransformError::NothingToRemove)
    ));
}

#[test]
fn test_delithiate_one_enumerates_each_site() {
    let original = common::test_structure();
    let variants = delithiate_one(&original, "Li").unwrap();
    assert_eq!(variants.len(), 2);
    for variant in &variants {
        assert_eq!(variant.structure.num_sites(), 2);
        assert_eq!(variant.structure.count_of("Li"), 1);
        assert_eq!(variant.mask.iter().filter(|&&kept| !kept).count(), 1);
    }
}

#[test]
fn test_make_supercell_and_vacancy() {
    let original = common::test_structure();
    let expanded = make_supercell(&original, [2, 1, 1]);
    assert_eq!(expanded.num_sites(), 6);
    assert!((expanded.lattice.volume() - 2.0 * original.lattice.volume()).abs() < 1e-9);
    // Species-sorted site list.
    let symbols: Vec<&str> = expanded.sites.iter().map(|s| s.species.as_str()).collect();
    let mut sorted = symbols.clone();
    sorted.sort();
    assert_eq!(symbols, sorted);

    let defective = make_vacancy(&original, &[0], [2, 1, 1]).unwrap();
    assert_eq!(defective.num_sites(), 5);

    assert!(matches!(
        make_vacancy(&original, &[99], [2, 1, 1]),
        Err(TransformError::SiteOutOfRange { .. })
    ));
    assert!(matches!(
        make_vacancy(&original, &[], [2, 1, 1]),
        Err(TransformError::NothingToRemove)
    ));
}

#[test]
fn test_removal_spec_validation() {
    assert_eq!(RemovalSpec::Count(2).resolve(4).unwrap(), 2);
    assert_eq!(RemovalSpec::Fraction(0.5).resolve(4).unwrap(), 2);

    assert!(matches!(
        RemovalSpec::Fraction(0.3).resolve(4),
        Err(TransformError::FractionalRemoval { .. })
    ));
    assert!(matches!(
        RemovalSpec::Count(0).resolve(4),
        Err(TransformError::NothingToRemove)
    ));
    assert!(matches!(
        RemovalSpec::Fraction(0.0).resolve(4),
        Err(TransformError::NothingToRemove)
    ));
    assert!(matches!(
        RemovalSpec::Count(5).resolve(4),
        Err(TransformError::TooManyRemovals { .. })
    ));
}

/// Enumerator that rejects any tolerance below a floor, mimicking a
/// symmetry library whose reduction collapses at tight tolerances.
struct FloorEnumerator {
    floor: f64,
}

impl SiteEnumerator for FloorEnumerator {
    fn unique_substitutions(
        &self,
        structure: &Structure,
        species: &str,
        _n_remove: usize,
        atol: f64,
    ) -> Result<Vec<Structure>, EnumerationError> {
        if atol < self.floor {
            return Err(EnumerationError::ToleranceTooTight(format!(
                "atol {atol} below {}",
                self.floor
            )));
        }
        let removed = delithiate_one(structure, species)
            .map_err(|err| EnumerationError::Other(err.to_string()))?;
        Ok(vec![removed[0].structure.clone()])
    }
}

#[test]
fn test_enumeration_relaxes_tolerance_and_succeeds() {
    let original = common::test_structure();
    let enumerator = FloorEnumerator { floor: 1e-3 };
    // 1e-5 -> 1e-4 -> 1e-3: two relaxations needed.
    let variants = enumerate_unique_sites(
        &enumerator,
        &original,
        "Li",
        RemovalSpec::Count(1),
        1e-5,
    )
    .unwrap();
    assert_eq!(variants.len(), 1);
    assert_eq!(variants[0].structure.count_of("Li"), 1);
    // The mask marks exactly one Li as removed.
    assert_eq!(variants[0].mask, vec![false, true, true]);
}

#[test]
fn test_enumeration_tolerance_ceiling_is_fatal() {
    let original = common::test_structure();
    let enumerator = FloorEnumerator { floor: f64::INFINITY };
    let err = enumerate_unique_sites(
        &enumerator,
        &original,
        "Li",
        RemovalSpec::Count(1),
        1e-5,
    )
    .unwrap_err();
    match err {
        TransformError::ToleranceCeiling { attempts, .. } => {
            assert_eq!(attempts, MAX_ENUMERATION_ATTEMPTS);
        }
        other => panic!("expected ToleranceCeiling, got {other}"),
    }
}

/// Enumerator that leaves bookkeeping tags on the kind names.
struct TaggingEnumerator;

impl SiteEnumerator for TaggingEnumerator {
    fn unique_substitutions(
        &self,
        structure: &Structure,
        _species: &str,
        _n_remove: usize,
        _atol: f64,
    ) -> Result<Vec<Structure>, EnumerationError> {
        let mut tagged = structure.clone();
        tagged.sites[0].species = "Li1".to_string();
        Ok(vec![tagged])
    }
}

#[test]
fn test_enumeration_rejects_tagged_kinds() {
    let original = common::test_structure();
    let err = enumerate_unique_sites(
        &TaggingEnumerator,
        &original,
        "Li",
        RemovalSpec::Count(1),
        1e-5,
    )
    .unwrap_err();
    assert!(matches!(err, TransformError::TaggedKinds));
}

#[test]
fn test_enumeration_rejects_empty_target() {
    let original = common::test_structure();
    let enumerator = FloorEnumerator { floor: 0.0 };
    assert!(matches!(
        enumerate_unique_sites(&enumerator, &original, "Na", RemovalSpec::Count(1), 1e-5),
        Err(TransformError::NothingToRemove)
    ));
}
