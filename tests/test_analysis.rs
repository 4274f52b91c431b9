use std::collections::HashMap;

use pw_converge::analysis::bands::{band_gap, find_cbm, find_vbm, is_metal, OCC_TOL};
use pw_converge::analysis::voltage::{lithium_insertion_voltage, CalcSummary, VoltageError};
use pw_converge::engine::executor::BandData;
use pw_converge::transform::enumerate::delithiate_one;

mod common;

fn energies(value: f64) -> HashMap<String, f64> {
    let mut map = HashMap::new();
    map.insert("energy_no_entropy".to_string(), value);
    map
}

#[test]
fn test_band_edges() {
    let data = BandData {
        eigenvalues: vec![vec![-5.0, -1.0, 2.0], vec![-5.2, -1.5, 2.5]],
        occupations: vec![vec![1.0, 1.0, 0.0], vec![1.0, 1.0, 0.0]],
    };
    assert_eq!(find_vbm(&data, OCC_TOL), Some(-1.0));
    assert_eq!(find_cbm(&data, OCC_TOL), Some(2.0));
    assert!((band_gap(&data) - 3.0).abs() < 1e-12);
}

#[test]
fn test_band_gap_clamps_to_zero() {
    // Overlapping edges (metallic): the occupied maximum lies above the
    // unoccupied minimum.
    let overlap = BandData {
        eigenvalues: vec![vec![2.0, 1.0]],
        occupations: vec![vec![1.0, 0.0]],
    };
    assert_eq!(band_gap(&overlap), 0.0);

    // Fully occupied: no conduction edge to measure against.
    let filled = BandData {
        eigenvalues: vec![vec![-5.0, -1.0]],
        occupations: vec![vec![1.0, 1.0]],
    };
    assert_eq!(find_cbm(&filled, OCC_TOL), None);
    assert_eq!(band_gap(&filled), 0.0);
}

#[test]
fn test_is_metal() {
    // The second band crosses the Fermi level between the two k-points.
    let crossing = BandData {
        eigenvalues: vec![vec![-5.0, -0.5], vec![-5.0, 0.5]],
        occupations: vec![vec![1.0, 1.0], vec![1.0, 0.0]],
    };
    assert!(is_metal(&crossing, 0.0, 1e-5));

    let gapped = BandData {
        eigenvalues: vec![vec![-5.0, 2.0], vec![-5.2, 2.5]],
        occupations: vec![vec![1.0, 0.0], vec![1.0, 0.0]],
    };
    assert!(!is_metal(&gapped, 0.0, 1e-5));
}

#[test]
fn test_lithium_insertion_voltage() {
    let lithiated_structure = common::test_structure(); // Li2O
    let delithiated_structure = delithiate_one(&lithiated_structure, "Li").unwrap()[0]
        .structure
        .clone(); // LiO

    // Pure Li reference: strip the O site and keep both Li.
    let mut li_ref_structure = lithiated_structure.clone();
    li_ref_structure.sites.retain(|s| s.species == "Li");

    let lithiated = CalcSummary {
        structure: lithiated_structure.clone(),
        total_energies: energies(-12.0),
        cutoff: 500.0,
    };
    let delithiated = CalcSummary {
        structure: delithiated_structure,
        total_energies: energies(-8.0),
        cutoff: 500.0,
    };
    let li_ref = CalcSummary {
        structure: li_ref_structure,
        total_energies: energies(-4.0), // -2.0 eV per Li
        cutoff: 500.0,
    };

    // Li2O -> LiO + Li: (-8.0 + -2.0) - (-12.0) = 2.0 eV per Li.
    let voltage =
        lithium_insertion_voltage(&lithiated, &delithiated, &li_ref, "energy_no_entropy")
            .unwrap();
    assert!((voltage - 2.0).abs() < 1e-12);
}

#[test]
fn test_voltage_rejects_mismatched_calculations() {
    let lithiated_structure = common::test_structure();
    let delithiated_structure = delithiate_one(&lithiated_structure, "Li").unwrap()[0]
        .structure
        .clone();
    let mut li_ref_structure = lithiated_structure.clone();
    li_ref_structure.sites.retain(|s| s.species == "Li");

    let lithiated = CalcSummary {
        structure: lithiated_structure.clone(),
        total_energies: energies(-12.0),
        cutoff: 500.0,
    };
    let li_ref = CalcSummary {
        structure: li_ref_structure,
        total_energies: energies(-4.0),
        cutoff: 500.0,
    };

    // Cutoff mismatch is critical.
    let off_cutoff = CalcSummary {
        structure: delithiated_structure.clone(),
        total_energies: energies(-8.0),
        cutoff: 400.0,
    };
    assert!(matches!(
        lithium_insertion_voltage(&lithiated, &off_cutoff, &li_ref, "energy_no_entropy"),
        Err(VoltageError::NotComparable(_))
    ));

    // No lithium transferred between the endpoints.
    let same = CalcSummary {
        structure: lithiated_structure.clone(),
        total_energies: energies(-12.0),
        cutoff: 500.0,
    };
    assert!(matches!(
        lithium_insertion_voltage(&lithiated, &same, &li_ref, "energy_no_entropy"),
        Err(VoltageError::NoLithiumTransferred)
    ));

    // Missing energy accounting key.
    let missing = CalcSummary {
        structure: delithiated_structure,
        total_energies: HashMap::new(),
        cutoff: 500.0,
    };
    assert!(matches!(
        lithium_insertion_voltage(&lithiated, &missing, &li_ref, "energy_no_entropy"),
        Err(VoltageError::MissingEnergy(_))
    ));
}
