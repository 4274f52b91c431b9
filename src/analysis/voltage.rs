use std::collections::HashMap;

use log::warn;
use thiserror::Error;

use crate::core::domain::Structure;

/// Working ion of the insertion reaction.
const WORKING_ION: &str = "Li";

#[derive(Debug, Error)]
pub enum VoltageError {
    #[error("calculations are not comparable: {0}")]
    NotComparable(String),

    #[error("total energy `{0}` missing from a calculation summary")]
    MissingEnergy(String),

    #[error("no lithium is transferred between the two endpoints")]
    NoLithiumTransferred,

    #[error("the reference calculation contains no lithium")]
    EmptyReference,
}

/// The slice of one finished calculation the voltage math needs: the
/// structure for the composition, the energy accounting, and the cutoff
/// for the comparability check.
#[derive(Debug, Clone)]
pub struct CalcSummary {
    pub structure: Structure,
    pub total_energies: HashMap<String, f64>,
    pub cutoff: f64,
}

impl CalcSummary {
    fn energy(&self, key: &str) -> Result<f64, VoltageError> {
        self.total_energies
            .get(key)
            .copied()
            .ok_or_else(|| VoltageError::MissingEnergy(key.to_string()))
    }
}

/// Average lithium insertion voltage from the lithiated and delithiated
/// endpoints plus a metallic-lithium reference.
///
/// The reaction is `lithiated -> delithiated + n Li`, normalized to one
/// transferred Li; the returned value is the reaction energy per Li in eV.
/// Calculations run at different cutoffs are rejected; a composition
/// mismatch in the host framework is rejected too.
pub fn lithium_insertion_voltage(
    lithiated: &CalcSummary,
    delithiated: &CalcSummary,
    li_ref: &CalcSummary,
    energy_key: &str,
) -> Result<f64, VoltageError> {
    check_comparable(lithiated, delithiated)?;
    check_comparable(delithiated, li_ref)?;

    let n_lith = lithiated.structure.count_of(WORKING_ION);
    let n_deli = delithiated.structure.count_of(WORKING_ION);
    if n_lith <= n_deli {
        return Err(VoltageError::NoLithiumTransferred);
    }
    let transferred = (n_lith - n_deli) as f64;

    // The host framework must be unchanged by the delithiation.
    let mut host_lith = lithiated.structure.species_counts();
    let mut host_deli = delithiated.structure.species_counts();
    host_lith.remove(WORKING_ION);
    host_deli.remove(WORKING_ION);
    if host_lith != host_deli {
        return Err(VoltageError::NotComparable(
            "host composition differs between the endpoints".into(),
        ));
    }

    let n_ref = li_ref.structure.count_of(WORKING_ION);
    if n_ref == 0 {
        return Err(VoltageError::EmptyReference);
    }
    if li_ref.structure.num_sites() != n_ref {
        warn!("lithium reference contains non-Li species; proceeding with its Li count");
    }
    let e_li = li_ref.energy(energy_key)? / n_ref as f64;

    let e_lith = lithiated.energy(energy_key)?;
    let e_deli = delithiated.energy(energy_key)?;
    Ok((e_deli + transferred * e_li - e_lith) / transferred)
}

fn check_comparable(a: &CalcSummary, b: &CalcSummary) -> Result<(), VoltageError> {
    if (a.cutoff - b.cutoff).abs() > 1e-6 {
        return Err(VoltageError::NotComparable(format!(
            "plane-wave cutoffs differ: {} vs {} eV",
            a.cutoff, b.cutoff
        )));
    }
    Ok(())
}
