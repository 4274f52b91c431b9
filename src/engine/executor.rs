use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::domain::Structure;
use crate::core::sample::KGrid;

/// K-point specification attached to a calculation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KpointSetting {
    /// Explicit mesh generated by the engine.
    Mesh(KGrid),
    /// The caller supplied a k-mesh up front; it is passed through opaquely.
    SuppliedMesh,
}

/// One independent calculation request handed to the job execution service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalcRequest {
    /// Caller-assigned identity. Results are reassembled by this id, never
    /// by completion order.
    pub id: Uuid,
    pub label: String,
    pub structure: Structure,
    /// Plane-wave cutoff (eV).
    pub cutoff: f64,
    pub kpoints: KpointSetting,
    pub relax: bool,
}

impl CalcRequest {
    pub fn new(
        label: String,
        structure: Structure,
        cutoff: f64,
        kpoints: KpointSetting,
        relax: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            label,
            structure,
            cutoff,
            kpoints,
            relax,
        }
    }
}

/// Band eigenvalues and occupations, kpoint-major (`[kpoint][band]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandData {
    pub eigenvalues: Vec<Vec<f64>>,
    pub occupations: Vec<Vec<f64>>,
}

/// Result payload of a successfully resolved calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalcPayload {
    /// Total energies keyed by accounting type (e.g. "energy_no_entropy").
    pub total_energies: HashMap<String, f64>,
    /// Maximum force on any ion (eV/AA).
    pub maximum_force: f64,
    pub bands: Option<BandData>,
}

/// Terminal state of one request. An individual failure carries a
/// diagnostic and all-None observables; it never fails the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalcOutcome {
    pub request: Uuid,
    pub failed: bool,
    pub payload: Option<CalcPayload>,
    pub diagnostic: Option<String>,
}

impl CalcOutcome {
    pub fn success(request: Uuid, payload: CalcPayload) -> Self {
        Self {
            request,
            failed: false,
            payload: Some(payload),
            diagnostic: None,
        }
    }

    pub fn failure(request: Uuid, diagnostic: String) -> Self {
        Self {
            request,
            failed: true,
            payload: None,
            diagnostic: Some(diagnostic),
        }
    }
}

/// Poll result for one submitted request.
#[derive(Debug, Clone)]
pub enum JobStatus {
    Pending,
    Resolved(CalcOutcome),
}

/// The external job execution service.
///
/// Implementations must be thread-safe (Sync). The service is allowed to
/// resolve requests in any order; ordering is reconciled by the dispatcher.
pub trait JobExecutor: Send + Sync {
    /// Submits one request and returns the service-side ticket.
    /// An `Err` here means the request was rejected outright (malformed),
    /// which is fatal to the whole batch.
    fn submit(&self, request: &CalcRequest) -> Result<String>;

    /// Polls a previously submitted ticket.
    fn poll(&self, ticket: &str) -> Result<JobStatus>;

    /// Returns the name of the service (e.g. "VASP relax queue").
    fn name(&self) -> &str;
}
