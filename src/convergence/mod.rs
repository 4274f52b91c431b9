use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::sample::{Axis, OperatingPoint, SweepResult, Variant};
use crate::core::settings::SettingsError;
use crate::engine::dispatch::DispatchError;
use crate::transform::TransformError;

pub mod checker;
pub mod controller;
pub mod report;

/// Phases of the convergence search. Advanced strictly forward; the only
/// re-entry is the bounded retry of a single batch on transient dispatch
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Init,
    PwBaseline,
    KBaseline,
    PwDisplaced,
    KDisplaced,
    PwCompressed,
    KCompressed,
    Reconcile,
    Confirm,
    Done,
    Failed,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::PwBaseline => "pw-baseline",
            Phase::KBaseline => "kpoints-baseline",
            Phase::PwDisplaced => "pw-displaced",
            Phase::KDisplaced => "kpoints-displaced",
            Phase::PwCompressed => "pw-compressed",
            Phase::KCompressed => "kpoints-compressed",
            Phase::Reconcile => "reconcile",
            Phase::Confirm => "confirm",
            Phase::Done => "done",
            Phase::Failed => "failed",
        }
    }
}

/// The six sweep slots a run can populate. Displaced/compressed slots stay
/// empty unless those variants are requested.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepSet {
    pub pw_regular: Option<SweepResult>,
    pub kpoints_regular: Option<SweepResult>,
    pub pw_displacement: Option<SweepResult>,
    pub kpoints_displacement: Option<SweepResult>,
    pub pw_compression: Option<SweepResult>,
    pub kpoints_compression: Option<SweepResult>,
}

impl SweepSet {
    pub fn slot_mut(&mut self, axis: Axis, variant: Variant) -> &mut Option<SweepResult> {
        match (axis, variant) {
            (Axis::PlaneWaveCutoff, Variant::Baseline) => &mut self.pw_regular,
            (Axis::KpointGrid, Variant::Baseline) => &mut self.kpoints_regular,
            (Axis::PlaneWaveCutoff, Variant::Displaced) => &mut self.pw_displacement,
            (Axis::KpointGrid, Variant::Displaced) => &mut self.kpoints_displacement,
            (Axis::PlaneWaveCutoff, Variant::Compressed) => &mut self.pw_compression,
            (Axis::KpointGrid, Variant::Compressed) => &mut self.kpoints_compression,
        }
    }

    pub fn get(&self, axis: Axis, variant: Variant) -> Option<&SweepResult> {
        match (axis, variant) {
            (Axis::PlaneWaveCutoff, Variant::Baseline) => self.pw_regular.as_ref(),
            (Axis::KpointGrid, Variant::Baseline) => self.kpoints_regular.as_ref(),
            (Axis::PlaneWaveCutoff, Variant::Displaced) => self.pw_displacement.as_ref(),
            (Axis::KpointGrid, Variant::Displaced) => self.kpoints_displacement.as_ref(),
            (Axis::PlaneWaveCutoff, Variant::Compressed) => self.pw_compression.as_ref(),
            (Axis::KpointGrid, Variant::Compressed) => self.kpoints_compression.as_ref(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SweepResult> {
        [
            self.pw_regular.as_ref(),
            self.kpoints_regular.as_ref(),
            self.pw_displacement.as_ref(),
            self.kpoints_displacement.as_ref(),
            self.pw_compression.as_ref(),
            self.kpoints_compression.as_ref(),
        ]
        .into_iter()
        .flatten()
    }
}

/// Resumable controller state. Serializable at every phase boundary so the
/// search can pick up after an external interruption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchState {
    pub phase: Phase,
    pub sweeps: SweepSet,
    /// Cutoff chosen for the currently running variant (feeds its k sweep).
    pub chosen_cutoff: Option<f64>,
    /// Cutoff the baseline sweep converged to (or its fallback), the floor
    /// of the final recommendation.
    pub baseline_cutoff: Option<f64>,
    /// Final recommendation, available from the reconcile phase on.
    pub recommended: Option<OperatingPoint>,
    /// Identities of the batch currently in flight.
    pub pending: Vec<Uuid>,
}

impl SearchState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Init,
            sweeps: SweepSet::default(),
            chosen_cutoff: None,
            baseline_cutoff: None,
            recommended: None,
            pending: Vec::new(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

impl Default for SearchState {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics for one completed sweep, for telemetry.
#[derive(Debug, Clone)]
pub struct SweepStats {
    pub axis: Axis,
    pub variant: Variant,
    pub samples: usize,
    pub failed: usize,
    /// Whether the stopping criterion was met within the sweep (false
    /// means the fallback-to-extreme policy applied).
    pub converged: bool,
}

/// Events emitted by the controller to the orchestrating workflow.
#[derive(Debug, Clone)]
pub enum ConvergeEvent {
    /// Diagnostic log message.
    Log(String),

    /// A new phase has started.
    PhaseStarted(Phase),

    /// A sweep finished collecting and was analyzed.
    SweepCompleted(SweepStats),

    /// The reconciled operating point is available.
    NewRecommendation(OperatingPoint),

    /// Search has finished its run.
    Finished,
}

/// Error taxonomy of the search engine. Sample-level failures are handled
/// locally and never surface here.
#[derive(Debug, Error)]
pub enum ConvergeError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("batch dispatch rejected during {phase}: {source}")]
    BatchRejected {
        phase: &'static str,
        #[source]
        source: DispatchError,
    },

    #[error("structure perturbation failed during {phase}: {source}")]
    Perturbation {
        phase: &'static str,
        #[source]
        source: TransformError,
    },

    #[error("no recommendation available for the confirmation run")]
    NoRecommendation,
}
