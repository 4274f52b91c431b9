use crate::engine::executor::BandData;

/// Occupation threshold separating occupied from unoccupied states.
pub const OCC_TOL: f64 = 1e-4;

/// Highest eigenvalue carrying an occupation above `tol` (the valence band
/// maximum). None when nothing is occupied.
pub fn find_vbm(data: &BandData, tol: f64) -> Option<f64> {
    let mut vbm: Option<f64> = None;
    for (eigenvalues, occupations) in data.eigenvalues.iter().zip(&data.occupations) {
        for (&eig, &occ) in eigenvalues.iter().zip(occupations) {
            if occ > tol && vbm.map_or(true, |v| eig > v) {
                vbm = Some(eig);
            }
        }
    }
    vbm
}

/// Lowest eigenvalue with an occupation below `tol` (the conduction band
/// minimum). None when every state is occupied.
pub fn find_cbm(data: &BandData, tol: f64) -> Option<f64> {
    let mut cbm: Option<f64> = None;
    for (eigenvalues, occupations) in data.eigenvalues.iter().zip(&data.occupations) {
        for (&eig, &occ) in eigenvalues.iter().zip(occupations) {
            if occ < tol && cbm.map_or(true, |v| eig < v) {
                cbm = Some(eig);
            }
        }
    }
    cbm
}

/// The fundamental gap, clamped to 0.0 when no gap is detectable (band
/// overlap or a missing edge) — never None, so it participates in delta
/// math like any other metric.
pub fn band_gap(data: &BandData) -> f64 {
    match (find_vbm(data, OCC_TOL), find_cbm(data, OCC_TOL)) {
        (Some(vbm), Some(cbm)) => (cbm - vbm).max(0.0),
        _ => 0.0,
    }
}

/// True when any band crosses the Fermi level.
pub fn is_metal(data: &BandData, efermi: f64, tol: f64) -> bool {
    let nbands = data
        .eigenvalues
        .first()
        .map(|row| row.len())
        .unwrap_or(0);
    for band in 0..nbands {
        let mut below = false;
        let mut above = false;
        for eigenvalues in &data.eigenvalues {
            let Some(&eig) = eigenvalues.get(band) else {
                continue;
            };
            if eig < efermi - tol {
                below = true;
            } else if eig > efermi + tol {
                above = true;
            }
        }
        if below && above {
            return true;
        }
    }
    false
}
