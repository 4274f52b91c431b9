use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use log::{info, warn};
use nalgebra::Vector3;

use crate::analysis::bands;
use crate::convergence::checker;
use crate::convergence::report::ConvergenceReport;
use crate::convergence::{ConvergeError, ConvergeEvent, Phase, SearchState, SweepStats};
use crate::core::domain::Structure;
use crate::core::kgrid;
use crate::core::sample::{grid_norm, Axis, KGrid, OperatingPoint, SamplePoint, SweepResult, Variant};
use crate::core::settings::{ConvergenceSettings, SettingsError};
use crate::engine::dispatch::{AuditLog, BatchDispatcher, BatchHandle};
use crate::engine::executor::{CalcOutcome, CalcRequest, JobExecutor, KpointSetting};
use crate::transform::perturb;

/// The convergence search controller.
///
/// Orchestrates the full multi-phase procedure: baseline sweep, displaced
/// and compressed sweeps, reconciliation and the final confirmation run.
/// The controller is single-threaded; all parallelism comes from handing
/// batches of independent requests to the job execution service, and the
/// only blocking point is the batch collection.
pub struct ConvergenceSearch {
    dispatcher: BatchDispatcher,
    settings: ConvergenceSettings,
    structure: Structure,
    state: SearchState,

    // Derived plan, rebuilt deterministically from the settings (also on
    // resume, so it is not part of the serialized state).
    cutoffs: Vec<f64>,
    sweep_grids: Vec<KGrid>,
    run_pw: bool,
    run_k: bool,

    final_outcome: Option<CalcOutcome>,
}

impl ConvergenceSearch {
    pub fn new(
        executor: Arc<dyn JobExecutor>,
        settings: ConvergenceSettings,
        structure: Structure,
    ) -> Self {
        Self {
            dispatcher: BatchDispatcher::new(executor),
            settings,
            structure,
            state: SearchState::new(),
            cutoffs: Vec::new(),
            sweep_grids: Vec::new(),
            run_pw: false,
            run_k: false,
            final_outcome: None,
        }
    }

    /// Rebuilds a controller around a previously serialized state. The
    /// derived plan is recomputed; the structure transforms are pure, so a
    /// resumed search sees the same variants as the original run.
    pub fn resume(
        executor: Arc<dyn JobExecutor>,
        settings: ConvergenceSettings,
        structure: Structure,
        state: SearchState,
    ) -> Self {
        let mut search = Self::new(executor, settings, structure);
        search.state = state;
        if search.state.phase != Phase::Init {
            search.derive_plan();
        }
        search
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.dispatcher = self.dispatcher.with_poll_interval(interval);
        self
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn settings(&self) -> &ConvergenceSettings {
        &self.settings
    }

    pub fn audit(&self) -> Arc<AuditLog> {
        self.dispatcher.audit()
    }

    /// Drives the state machine to completion and returns the report.
    /// On failure the state is left at `Failed`; [`Self::snapshot_report`]
    /// still yields the partial tables and audit trail collected so far.
    pub fn run(&mut self, tx: &Sender<ConvergeEvent>) -> Result<ConvergenceReport, ConvergeError> {
        loop {
            match self.step(tx) {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    let _ = tx.send(ConvergeEvent::Log(format!("search failed: {err}")));
                    let _ = tx.send(ConvergeEvent::Finished);
                    return Err(err);
                }
            }
        }
        let _ = tx.send(ConvergeEvent::Finished);
        if self.state.recommended.is_some() {
            Ok(self.snapshot_report())
        } else {
            Err(ConvergeError::NoRecommendation)
        }
    }

    /// Advances the search by exactly one phase. Returns `false` once a
    /// terminal phase is reached. The state is serializable before and
    /// after every call.
    pub fn step(&mut self, tx: &Sender<ConvergeEvent>) -> Result<bool, ConvergeError> {
        let phase = self.state.phase;
        if matches!(phase, Phase::Done | Phase::Failed) {
            return Ok(false);
        }
        let _ = tx.send(ConvergeEvent::PhaseStarted(phase));
        let result = match phase {
            Phase::Init => self.phase_init(tx),
            Phase::PwBaseline => self.phase_pw(Variant::Baseline, tx),
            Phase::KBaseline => self.phase_k(Variant::Baseline, tx),
            Phase::PwDisplaced => self.phase_pw(Variant::Displaced, tx),
            Phase::KDisplaced => self.phase_k(Variant::Displaced, tx),
            Phase::PwCompressed => self.phase_pw(Variant::Compressed, tx),
            Phase::KCompressed => self.phase_k(Variant::Compressed, tx),
            Phase::Reconcile => self.phase_reconcile(tx),
            Phase::Confirm => self.phase_confirm(tx),
            Phase::Done | Phase::Failed => Ok(()),
        };
        if let Err(err) = result {
            self.state.phase = Phase::Failed;
            return Err(err);
        }
        Ok(!matches!(self.state.phase, Phase::Done | Phase::Failed))
    }

    /// Tables, audit trail and recommendation in their current state.
    pub fn snapshot_report(&self) -> ConvergenceReport {
        let mut tables = BTreeMap::new();
        for sweep in self.state.sweeps.iter() {
            tables.insert(sweep.table_key(), sweep.rows());
        }
        ConvergenceReport {
            operating_point: self.state.recommended,
            tables,
            audit: self.dispatcher.audit().snapshot(),
            final_outcome: self.final_outcome.clone(),
        }
    }

    // --- Phase transitions ---

    fn phase_init(&mut self, tx: &Sender<ConvergeEvent>) -> Result<(), ConvergeError> {
        self.settings.validate()?;
        if self.settings.displace && self.settings.displacement_atom > self.structure.num_sites() {
            return Err(SettingsError::Inconsistent(format!(
                "displacement_atom {} out of range for a structure with {} sites",
                self.settings.displacement_atom,
                self.structure.num_sites()
            ))
            .into());
        }
        self.derive_plan();
        if let Some(cutoff) = self.settings.pwcutoff {
            self.state.baseline_cutoff = Some(cutoff);
            self.state.chosen_cutoff = Some(cutoff);
        }
        let _ = tx.send(ConvergeEvent::Log(format!(
            "convergence search: {} cutoff samples, {} unique k-grids (pw sweeps: {}, k sweeps: {})",
            self.cutoffs.len(),
            self.sweep_grids.len(),
            self.run_pw,
            self.run_k
        )));
        self.advance();
        Ok(())
    }

    fn derive_plan(&mut self) {
        self.run_pw = self.settings.pwcutoff.is_none();
        self.run_k = !self.settings.supplied_kmesh && self.settings.kgrid.is_none();
        self.cutoffs = self.settings.pwcutoff_sampling();

        let rec_cell = self.structure.lattice.reciprocal();
        let spacings = kgrid::spacing_series(
            self.settings.k_coarse,
            self.settings.k_dense,
            self.settings.k_samples,
        );
        let mut grids = kgrid::unique_grids(&rec_cell, &spacings);
        if self.run_k && grids.len() < 2 {
            // A single-grid sweep cannot take a delta; force a distinct
            // denser mesh instead of silently dropping the axis.
            if let Some(&last) = grids.last() {
                let bumped = kgrid::bump_grid(last);
                warn!(
                    "k-grid series collapsed to a single mesh, bumping to {}x{}x{}",
                    bumped[0], bumped[1], bumped[2]
                );
                grids.push(bumped);
            }
        }
        self.sweep_grids = grids;
    }

    fn phase_pw(&mut self, variant: Variant, tx: &Sender<ConvergeEvent>) -> Result<(), ConvergeError> {
        let phase = self.state.phase;
        let (structure, grid) = self.prepare_variant(variant, phase)?;
        let kpoints = self.kpoint_setting(grid);
        let cutoffs = self.cutoffs.clone();
        let relax = self.settings.relax;

        let make = || -> Vec<CalcRequest> {
            cutoffs
                .iter()
                .map(|&cutoff| {
                    CalcRequest::new(
                        format!("pw-{}-{:.0}eV", variant.tag(), cutoff),
                        structure.clone(),
                        cutoff,
                        kpoints,
                        relax,
                    )
                })
                .collect()
        };
        let outcomes = self.dispatch_with_retry(phase, make, tx)?;

        let point_grid = match kpoints {
            KpointSetting::Mesh(grid) => Some(grid),
            KpointSetting::SuppliedMesh => None,
        };
        let mut sweep = SweepResult::new(Axis::PlaneWaveCutoff, variant);
        for (&cutoff, outcome) in cutoffs.iter().zip(&outcomes) {
            sweep.points.push(self.outcome_to_sample(cutoff, point_grid, outcome));
        }

        // Pick the cutoff this variant's k sweep runs at. For the
        // displaced/compressed raw sweeps this is a secondary diagnostic;
        // their deciding criterion is the difference sweep at reconcile.
        let converged = checker::check_converged(
            &sweep.points,
            self.settings.cutoff_type,
            self.settings.cutoff_value,
        )
        .map(|p| p.cutoff);
        let chosen = match converged {
            Some(cutoff) => cutoff,
            None => {
                let fallback = sweep.last_cutoff().unwrap_or(self.settings.pwcutoff_start);
                warn!(
                    "plane-wave sweep ({}) did not meet the {} criterion of {}; \
                     falling back to the highest sampled cutoff {} eV",
                    variant.tag(),
                    self.settings.cutoff_type.as_str(),
                    self.settings.cutoff_value,
                    fallback
                );
                let _ = tx.send(ConvergeEvent::Log(format!(
                    "pw sweep ({}) unconverged, falling back to {} eV",
                    variant.tag(),
                    fallback
                )));
                fallback
            }
        };
        self.state.chosen_cutoff = Some(chosen);
        if variant == Variant::Baseline {
            self.state.baseline_cutoff = Some(chosen);
        }

        let stats = SweepStats {
            axis: Axis::PlaneWaveCutoff,
            variant,
            samples: sweep.points.len(),
            failed: sweep.points.iter().filter(|p| p.failed).count(),
            converged: converged.is_some(),
        };
        *self.state.sweeps.slot_mut(Axis::PlaneWaveCutoff, variant) = Some(sweep);
        let _ = tx.send(ConvergeEvent::SweepCompleted(stats));
        self.advance();
        Ok(())
    }

    fn phase_k(&mut self, variant: Variant, tx: &Sender<ConvergeEvent>) -> Result<(), ConvergeError> {
        let phase = self.state.phase;
        let (structure, _default_grid) = self.prepare_variant(variant, phase)?;
        let cutoff = self
            .state
            .chosen_cutoff
            .or(self.settings.pwcutoff)
            .unwrap_or(self.settings.pwcutoff_start);
        let grids = self.sweep_grids.clone();
        let relax = self.settings.relax;

        let make = || -> Vec<CalcRequest> {
            grids
                .iter()
                .map(|&grid| {
                    CalcRequest::new(
                        format!(
                            "kpoints-{}-{}x{}x{}",
                            variant.tag(),
                            grid[0],
                            grid[1],
                            grid[2]
                        ),
                        structure.clone(),
                        cutoff,
                        KpointSetting::Mesh(grid),
                        relax,
                    )
                })
                .collect()
        };
        let outcomes = self.dispatch_with_retry(phase, make, tx)?;

        let mut sweep = SweepResult::new(Axis::KpointGrid, variant);
        for (&grid, outcome) in grids.iter().zip(&outcomes) {
            sweep
                .points
                .push(self.outcome_to_sample(cutoff, Some(grid), outcome));
        }

        let converged = checker::check_converged(
            &sweep.points,
            self.settings.cutoff_type,
            self.settings.cutoff_value,
        )
        .is_some();
        let stats = SweepStats {
            axis: Axis::KpointGrid,
            variant,
            samples: sweep.points.len(),
            failed: sweep.points.iter().filter(|p| p.failed).count(),
            converged,
        };
        *self.state.sweeps.slot_mut(Axis::KpointGrid, variant) = Some(sweep);
        let _ = tx.send(ConvergeEvent::SweepCompleted(stats));
        self.advance();
        Ok(())
    }

    fn phase_reconcile(&mut self, tx: &Sender<ConvergeEvent>) -> Result<(), ConvergeError> {
        let settings = &self.settings;
        let metric = settings.cutoff_type;

        // Baseline grid: supplied, or the baseline k sweep's verdict with
        // the densest-sampled fallback.
        let base_grid: Option<KGrid> = if settings.supplied_kmesh {
            None
        } else if let Some(grid) = settings.kgrid {
            Some(grid)
        } else {
            match self.state.sweeps.get(Axis::KpointGrid, Variant::Baseline) {
                Some(sweep) => {
                    let verdict =
                        checker::check_converged(&sweep.points, metric, settings.cutoff_value)
                            .and_then(|p| p.kgrid);
                    match verdict {
                        Some(grid) => Some(grid),
                        None => {
                            let fallback = sweep.last_grid();
                            if let Some(grid) = fallback {
                                warn!(
                                    "k-grid sweep did not meet the {} criterion of {}; \
                                     falling back to the densest sampled mesh {}x{}x{}",
                                    metric.as_str(),
                                    settings.cutoff_value,
                                    grid[0],
                                    grid[1],
                                    grid[2]
                                );
                                let _ = tx.send(ConvergeEvent::Log(format!(
                                    "k sweep unconverged, falling back to {}x{}x{}",
                                    grid[0], grid[1], grid[2]
                                )));
                            }
                            fallback
                        }
                    }
                }
                None => None,
            }
        };

        let disp_cutoff = self.variant_cutoff_constraint(Variant::Displaced, tx);
        let comp_cutoff = self.variant_cutoff_constraint(Variant::Compressed, tx);
        let disp_grid = self.variant_grid_constraint(Variant::Displaced, tx);
        let comp_grid = self.variant_grid_constraint(Variant::Compressed, tx);

        // Axes only raise requirements: the recommendation is the maximum
        // over the baseline verdict and every requested variant. A None
        // from one axis contributes no constraint.
        let cutoff = [self.state.baseline_cutoff, disp_cutoff, comp_cutoff]
            .into_iter()
            .flatten()
            .fold(None::<f64>, |acc, c| Some(acc.map_or(c, |a| a.max(c))));
        let cutoff = match cutoff {
            Some(cutoff) => cutoff,
            None => {
                let fallback = self
                    .state
                    .sweeps
                    .get(Axis::PlaneWaveCutoff, Variant::Baseline)
                    .and_then(|s| s.last_cutoff())
                    .unwrap_or(self.settings.pwcutoff_start);
                warn!(
                    "no plane-wave verdict on any axis; falling back to {} eV",
                    fallback
                );
                fallback
            }
        };

        let kgrid = if settings.supplied_kmesh {
            None
        } else {
            let mut densest: Option<KGrid> = None;
            for candidate in [base_grid, disp_grid, comp_grid].into_iter().flatten() {
                densest = Some(match densest {
                    Some(best) if grid_norm(&best) >= grid_norm(&candidate) => best,
                    _ => candidate,
                });
            }
            densest
        };

        let operating_point = OperatingPoint { cutoff, kgrid };
        self.state.recommended = Some(operating_point);
        info!(
            "recommended operating point: {} eV cutoff, k-grid {}",
            operating_point.cutoff,
            match operating_point.kgrid {
                Some(g) => format!("{}x{}x{}", g[0], g[1], g[2]),
                None => "caller-supplied".to_string(),
            }
        );
        let _ = tx.send(ConvergeEvent::NewRecommendation(operating_point));
        self.advance();
        Ok(())
    }

    fn phase_confirm(&mut self, tx: &Sender<ConvergeEvent>) -> Result<(), ConvergeError> {
        let phase = self.state.phase;
        let operating_point = self.state.recommended.ok_or(ConvergeError::NoRecommendation)?;
        let kpoints = match operating_point.kgrid {
            Some(grid) => KpointSetting::Mesh(grid),
            None => KpointSetting::SuppliedMesh,
        };
        // The sweeps ran with relaxation suppressed; the confirmation run
        // re-enables the user-requested relaxation. Testing mode keeps the
        // sweep behavior for dummy calculations.
        let relax = if self.settings.testing {
            self.settings.relax
        } else {
            true
        };
        let structure = self.structure.clone();
        let make = || -> Vec<CalcRequest> {
            vec![CalcRequest::new(
                "confirmation".to_string(),
                structure.clone(),
                operating_point.cutoff,
                kpoints,
                relax,
            )]
        };
        let mut outcomes = self.dispatch_with_retry(phase, make, tx)?;
        let outcome = outcomes.pop();
        match &outcome {
            Some(result) if result.failed => {
                warn!(
                    "confirmation run at the recommended operating point failed: {}",
                    result.diagnostic.as_deref().unwrap_or("no diagnostic")
                );
                let _ = tx.send(ConvergeEvent::Log(
                    "confirmation run failed; recommendation and tables are still valid".into(),
                ));
            }
            _ => {
                let _ = tx.send(ConvergeEvent::Log(format!(
                    "confirmation run finished at {} eV",
                    operating_point.cutoff
                )));
            }
        }
        self.final_outcome = outcome;
        self.advance();
        Ok(())
    }

    // --- Reconciliation helpers ---

    fn variant_cutoff_constraint(
        &self,
        variant: Variant,
        tx: &Sender<ConvergeEvent>,
    ) -> Option<f64> {
        if !self.variant_requested(variant) {
            return None;
        }
        if !self.run_pw {
            // With a supplied cutoff there is nothing to converge; the
            // supplied value is the constraint.
            return self.settings.pwcutoff;
        }
        let variant_sweep = self.state.sweeps.get(Axis::PlaneWaveCutoff, variant)?;
        let baseline = self
            .state
            .sweeps
            .get(Axis::PlaneWaveCutoff, Variant::Baseline)?;
        let diff = checker::difference_sweep(variant_sweep, baseline);
        match checker::check_converged(
            &diff.points,
            self.settings.cutoff_type,
            self.settings.cutoff_value_r,
        ) {
            Some(point) => Some(point.cutoff),
            None => {
                warn!(
                    "relative plane-wave test ({}) did not converge; no constraint from this axis",
                    variant.tag()
                );
                let _ = tx.send(ConvergeEvent::Log(format!(
                    "relative pw test ({}) unconverged",
                    variant.tag()
                )));
                None
            }
        }
    }

    fn variant_grid_constraint(
        &self,
        variant: Variant,
        tx: &Sender<ConvergeEvent>,
    ) -> Option<KGrid> {
        if !self.variant_requested(variant) || !self.run_k {
            return None;
        }
        let variant_sweep = self.state.sweeps.get(Axis::KpointGrid, variant)?;
        let baseline = self.state.sweeps.get(Axis::KpointGrid, Variant::Baseline)?;
        let diff = checker::difference_sweep(variant_sweep, baseline);
        match checker::check_converged(
            &diff.points,
            self.settings.cutoff_type,
            self.settings.cutoff_value_r,
        )
        .and_then(|p| p.kgrid)
        {
            Some(grid) => Some(grid),
            None => {
                warn!(
                    "relative k-grid test ({}) did not converge; no constraint from this axis",
                    variant.tag()
                );
                let _ = tx.send(ConvergeEvent::Log(format!(
                    "relative k test ({}) unconverged",
                    variant.tag()
                )));
                None
            }
        }
    }

    fn variant_requested(&self, variant: Variant) -> bool {
        match variant {
            Variant::Baseline => true,
            Variant::Displaced => self.settings.displace,
            Variant::Compressed => self.settings.compress,
        }
    }

    // --- Batch plumbing ---

    fn dispatch_with_retry(
        &mut self,
        phase: Phase,
        make: impl Fn() -> Vec<CalcRequest>,
        tx: &Sender<ConvergeEvent>,
    ) -> Result<Vec<CalcOutcome>, ConvergeError> {
        let requests = make();
        match self.dispatcher.dispatch(&requests) {
            Ok(handle) => Ok(self.collect_batch(handle)),
            Err(first) => {
                warn!(
                    "batch dispatch rejected during {}: {first}; retrying once with fresh identities",
                    phase.name()
                );
                let _ = tx.send(ConvergeEvent::Log(format!(
                    "batch rejected during {}, retrying once",
                    phase.name()
                )));
                let requests = make();
                match self.dispatcher.dispatch(&requests) {
                    Ok(handle) => Ok(self.collect_batch(handle)),
                    Err(source) => Err(ConvergeError::BatchRejected {
                        phase: phase.name(),
                        source,
                    }),
                }
            }
        }
    }

    fn collect_batch(&mut self, handle: BatchHandle) -> Vec<CalcOutcome> {
        self.state.pending = handle.ids();
        let outcomes = self.dispatcher.collect(&handle);
        self.state.pending.clear();
        outcomes
    }

    // --- Sample assembly ---

    fn outcome_to_sample(
        &self,
        cutoff: f64,
        kgrid: Option<KGrid>,
        outcome: &CalcOutcome,
    ) -> SamplePoint {
        if outcome.failed {
            return SamplePoint::failure(cutoff, kgrid);
        }
        let Some(payload) = &outcome.payload else {
            return SamplePoint::failure(cutoff, kgrid);
        };
        let Some(&energy) = payload.total_energies.get(&self.settings.total_energy_type) else {
            warn!(
                "result {} is missing total energy `{}`; recording the sample as failed",
                outcome.request, self.settings.total_energy_type
            );
            return SamplePoint::failure(cutoff, kgrid);
        };
        // Band gap is clamped to zero when no edge is detectable
        // (metallic / no-gap), so it participates in delta math like any
        // other metric.
        let (vbm, gap) = match &payload.bands {
            Some(data) => (
                bands::find_vbm(data, bands::OCC_TOL).unwrap_or(0.0),
                bands::band_gap(data),
            ),
            None => (0.0, 0.0),
        };
        SamplePoint {
            cutoff,
            kgrid,
            total_energy: Some(energy),
            max_force: Some(payload.maximum_force),
            vbm: Some(vbm),
            band_gap: Some(gap),
            failed: false,
        }
    }

    // --- Variant preparation ---

    fn prepare_variant(
        &self,
        variant: Variant,
        phase: Phase,
    ) -> Result<(Structure, KGrid), ConvergeError> {
        let structure = match variant {
            Variant::Baseline => self.structure.clone(),
            Variant::Displaced => perturb::displaced_structure(
                &self.structure,
                Vector3::from(self.settings.displacement_vector),
                self.settings.displacement_atom,
                self.settings.displacement_distance,
            )
            .map_err(|source| ConvergeError::Perturbation {
                phase: phase.name(),
                source,
            })?,
            Variant::Compressed => {
                perturb::compressed_structure(&self.structure, self.settings.volume_change)
                    .map_err(|source| ConvergeError::Perturbation {
                        phase: phase.name(),
                        source,
                    })?
            }
        };
        // The fixed grid of the pw sweeps follows the variant's own
        // reciprocal cell (a compressed cell maps the default spacing to a
        // different mesh).
        let grid = match self.settings.kgrid {
            Some(grid) => grid,
            None => {
                kgrid::grid_for_spacing(&structure.lattice.reciprocal(), self.settings.k_spacing)
            }
        };
        Ok((structure, grid))
    }

    fn kpoint_setting(&self, grid: KGrid) -> KpointSetting {
        if self.settings.supplied_kmesh {
            KpointSetting::SuppliedMesh
        } else {
            KpointSetting::Mesh(grid)
        }
    }

    // --- Phase graph ---

    fn advance(&mut self) {
        self.state.phase = self.next_phase(self.state.phase);
    }

    fn next_phase(&self, from: Phase) -> Phase {
        match from {
            Phase::Init => {
                if self.run_pw {
                    Phase::PwBaseline
                } else if self.run_k {
                    Phase::KBaseline
                } else {
                    Phase::Reconcile
                }
            }
            Phase::PwBaseline => {
                if self.run_k {
                    Phase::KBaseline
                } else {
                    self.after_variant(Variant::Baseline)
                }
            }
            Phase::KBaseline => self.after_variant(Variant::Baseline),
            Phase::PwDisplaced => {
                if self.run_k {
                    Phase::KDisplaced
                } else {
                    self.after_variant(Variant::Displaced)
                }
            }
            Phase::KDisplaced => self.after_variant(Variant::Displaced),
            Phase::PwCompressed => {
                if self.run_k {
                    Phase::KCompressed
                } else {
                    Phase::Reconcile
                }
            }
            Phase::KCompressed => Phase::Reconcile,
            Phase::Reconcile => Phase::Confirm,
            Phase::Confirm => Phase::Done,
            Phase::Done => Phase::Done,
            Phase::Failed => Phase::Failed,
        }
    }

    fn after_variant(&self, completed: Variant) -> Phase {
        let any_axis = self.run_pw || self.run_k;
        match completed {
            Variant::Baseline => {
                if self.settings.displace && any_axis {
                    self.variant_entry(Variant::Displaced)
                } else if self.settings.compress && any_axis {
                    self.variant_entry(Variant::Compressed)
                } else {
                    Phase::Reconcile
                }
            }
            Variant::Displaced => {
                if self.settings.compress && any_axis {
                    self.variant_entry(Variant::Compressed)
                } else {
                    Phase::Reconcile
                }
            }
            Variant::Compressed => Phase::Reconcile,
        }
    }

    fn variant_entry(&self, variant: Variant) -> Phase {
        match variant {
            Variant::Baseline => {
                if self.run_pw {
                    Phase::PwBaseline
                } else {
                    Phase::KBaseline
                }
            }
            Variant::Displaced => {
                if self.run_pw {
                    Phase::PwDisplaced
                } else {
                    Phase::KDisplaced
                }
            }
            Variant::Compressed => {
                if self.run_pw {
                    Phase::PwCompressed
                } else {
                    Phase::KCompressed
                }
            }
        }
    }
}
