use std::collections::HashMap;

use serde_json::json;

use pw_converge::core::domain::Lattice;
use pw_converge::core::kgrid;
use pw_converge::core::sample::{grid_norm, Metric};
use pw_converge::core::settings::{ConvergenceSettings, SettingsError};

mod common;

#[test]
fn test_reciprocal_cell() {
    let lattice = Lattice::orthorhombic(8.0, 8.0, 8.0).unwrap();
    let rec = lattice.reciprocal();
    let expected = 2.0 * std::f64::consts::PI / 8.0;
    for i in 0..3 {
        assert!((rec.column(i).norm() - expected).abs() < 1e-12);
    }
    assert!((lattice.volume() - 512.0).abs() < 1e-9);
}

#[test]
fn test_spacing_series() {
    let series = kgrid::spacing_series(0.5, 0.2, 10);
    assert_eq!(series.len(), 11);
    assert!((series[0] - 0.5).abs() < 1e-12);
    assert!((series[10] - 0.2).abs() < 1e-12);
    for pair in series.windows(2) {
        assert!(pair[1] < pair[0], "series must decrease monotonically");
    }
}

#[test]
fn test_grid_for_spacing() {
    let cubic = Lattice::orthorhombic(8.0, 8.0, 8.0).unwrap();
    // |b| = 2*pi/8 = 0.785; 0.785/0.3 -> 2.6 -> 3 subdivisions.
    assert_eq!(kgrid::grid_for_spacing(&cubic.reciprocal(), 0.3), [3, 3, 3]);

    let slab = Lattice::orthorhombic(8.0, 4.0, 4.0).unwrap();
    assert_eq!(kgrid::grid_for_spacing(&slab.reciprocal(), 0.3), [3, 6, 6]);
}

// P1: no two consecutive equal triples, density weakly increasing along
// the coarse -> dense series.
#[test]
fn test_unique_grids_dedup() {
    let lattice = Lattice::orthorhombic(8.0, 8.0, 8.0).unwrap();
    let rec = lattice.reciprocal();
    let spacings = kgrid::spacing_series(0.5, 0.2, 10);
    let grids = kgrid::unique_grids(&rec, &spacings);

    assert_eq!(grids, vec![[2, 2, 2], [3, 3, 3], [4, 4, 4]]);
    for pair in grids.windows(2) {
        assert_ne!(pair[0], pair[1], "consecutive duplicates must be dropped");
        for axis in 0..3 {
            assert!(pair[1][axis] >= pair[0][axis]);
        }
    }
}

#[test]
fn test_bump_grid() {
    assert_eq!(kgrid::bump_grid([2, 2, 3]), [3, 3, 4]);
    assert!(grid_norm(&[6, 6, 6]) > grid_norm(&[4, 4, 4]));
}

#[test]
fn test_settings_from_flat() {
    let mut options = HashMap::new();
    options.insert("pwcutoff_start".to_string(), json!(300.0));
    options.insert("pwcutoff_samples".to_string(), json!(4));
    options.insert("cutoff_type".to_string(), json!("forces"));
    options.insert("displace".to_string(), json!(true));
    options.insert("displacement_vector".to_string(), json!([0.0, 0.0, 1.0]));
    options.insert("kgrid".to_string(), json!([4, 4, 4]));

    let settings = ConvergenceSettings::from_flat(&options).unwrap();
    assert_eq!(settings.pwcutoff_start, 300.0);
    assert_eq!(settings.pwcutoff_samples, 4);
    assert_eq!(settings.cutoff_type, Metric::Forces);
    assert!(settings.displace);
    assert_eq!(settings.kgrid, Some([4, 4, 4]));
    // Untouched keys keep their defaults.
    assert_eq!(settings.k_samples, 10);
    assert_eq!(settings.total_energy_type, "energy_no_entropy");
    settings.validate().unwrap();
}

#[test]
fn test_settings_rejects_unknown_key() {
    let mut options = HashMap::new();
    options.insert("pwcutoff_startt".to_string(), json!(300.0));
    match ConvergenceSettings::from_flat(&options) {
        Err(SettingsError::UnknownKey(key)) => assert_eq!(key, "pwcutoff_startt"),
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn test_settings_rejects_wrong_type() {
    let mut options = HashMap::new();
    options.insert("compress".to_string(), json!("yes"));
    assert!(matches!(
        ConvergenceSettings::from_flat(&options),
        Err(SettingsError::WrongType { .. })
    ));
}

#[test]
fn test_settings_validation() {
    let mut settings = ConvergenceSettings::default();
    settings.k_coarse = 0.1; // below k_dense
    assert!(matches!(
        settings.validate(),
        Err(SettingsError::Inconsistent(_))
    ));

    let mut settings = ConvergenceSettings::default();
    settings.displace = true;
    settings.displacement_vector = [0.0, 0.0, 0.0];
    assert!(settings.validate().is_err());

    let mut settings = ConvergenceSettings::default();
    settings.pwcutoff_samples = 1;
    assert!(settings.validate().is_err());
    // A supplied cutoff suppresses the sweep, so one sample is fine.
    settings.pwcutoff = Some(520.0);
    settings.validate().unwrap();
}

#[test]
fn test_pwcutoff_sampling() {
    let mut settings = ConvergenceSettings::default();
    settings.pwcutoff_start = 200.0;
    settings.pwcutoff_step = 50.0;
    settings.pwcutoff_samples = 4;
    assert_eq!(settings.pwcutoff_sampling(), vec![200.0, 250.0, 300.0, 350.0]);
}

#[test]
fn test_structure_helpers() {
    let structure = common::test_structure();
    assert_eq!(structure.num_sites(), 3);
    assert_eq!(structure.count_of("Li"), 2);
    assert_eq!(structure.count_of("O"), 1);
    assert!(structure.kinds_are_bare());

    let mut tagged = structure.clone();
    tagged.sites[0].species = "Li1".to_string();
    assert!(!tagged.kinds_are_bare());

    let frac = structure.fractional(1);
    assert!((frac.x - 0.5).abs() < 1e-12);
}
