use log::warn;

use crate::core::sample::{Metric, SamplePoint, SweepResult};

/// Scans an ordered sample sequence for the first point where the delta to
/// its predecessor falls under `threshold`, and returns that point.
///
/// Failed points are excluded from the delta math (relative order
/// preserved); with fewer than two usable points no delta can be taken and
/// the result is `None`. This is a first-satisfying-pair policy, not a
/// global minimum search: a later, larger delta after a transient dip is
/// not revisited. Convergence has to hold across two neighbouring samples
/// to be trusted, and the first such pair is the cheapest adequate sample.
pub fn check_converged(
    points: &[SamplePoint],
    metric: Metric,
    threshold: f64,
) -> Option<&SamplePoint> {
    let usable: Vec<&SamplePoint> = points.iter().filter(|p| !p.failed).collect();
    if usable.len() < 2 {
        return None;
    }
    for pair in usable.windows(2) {
        let (Some(previous), Some(current)) = (pair[0].metric(metric), pair[1].metric(metric))
        else {
            continue;
        };
        if (current - previous).abs() < threshold {
            return Some(pair[1]);
        }
    }
    None
}

/// Builds the difference sweep of a displaced/compressed variant against
/// the baseline: metrics are subtracted index by index (same sample index,
/// same independent-variable value). The relative convergence criterion is
/// evaluated on the result.
///
/// A pair where either side failed yields a `failed=true` difference point
/// so it is excluded from delta math but stays in the record. A length
/// mismatch between the sweeps truncates to the shorter one with a logged
/// warning; it is never silently zipped into wrong deltas.
pub fn difference_sweep(variant: &SweepResult, baseline: &SweepResult) -> SweepResult {
    if variant.points.len() != baseline.points.len() {
        warn!(
            "difference sweep {}: sample count mismatch ({} vs {}), truncating",
            variant.table_key(),
            variant.points.len(),
            baseline.points.len()
        );
    }
    let mut diff = SweepResult::new(variant.axis, variant.variant);
    for (var, base) in variant.points.iter().zip(&baseline.points) {
        if var.failed || base.failed {
            diff.points.push(SamplePoint::failure(var.cutoff, var.kgrid));
            continue;
        }
        diff.points.push(SamplePoint {
            cutoff: var.cutoff,
            kgrid: var.kgrid,
            total_energy: sub(var.total_energy, base.total_energy),
            max_force: sub(var.max_force, base.max_force),
            vbm: sub(var.vbm, base.vbm),
            band_gap: sub(var.band_gap, base.band_gap),
            failed: false,
        });
    }
    diff
}

fn sub(variant: Option<f64>, baseline: Option<f64>) -> Option<f64> {
    Some(variant? - baseline?)
}
