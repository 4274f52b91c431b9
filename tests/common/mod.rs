use std::collections::HashMap;

use anyhow::{anyhow, Result};
use nalgebra::Point3;
use parking_lot::Mutex;

use pw_converge::core::domain::{Lattice, Site, Structure};
use pw_converge::engine::executor::{
    CalcOutcome, CalcPayload, CalcRequest, JobExecutor, JobStatus,
};

/// Scripted stand-in for the job execution service.
///
/// Energies come from a caller-supplied closure over the request (`None`
/// scripts an individual calculation failure). Resolution order can be
/// reversed to exercise the identity-based reassembly, and submissions can
/// be rejected to exercise the batch failure paths.
pub struct MockExecutor {
    energy_fn: Box<dyn Fn(&CalcRequest) -> Option<f64> + Send + Sync>,
    reverse: bool,
    reject_all: bool,
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    jobs: HashMap<String, MockJob>,
    counter: usize,
    submit_failures: usize,
}

struct MockJob {
    id: uuid::Uuid,
    seq: usize,
    polls: usize,
    energy: Option<f64>,
}

impl MockExecutor {
    pub fn new(energy_fn: impl Fn(&CalcRequest) -> Option<f64> + Send + Sync + 'static) -> Self {
        Self {
            energy_fn: Box::new(energy_fn),
            reverse: false,
            reject_all: false,
            state: Mutex::new(MockState::default()),
        }
    }

    /// A flat energy landscape; converges at the first delta.
    pub fn constant(energy: f64) -> Self {
        Self::new(move |_| Some(energy))
    }

    /// Resolve jobs in reverse submission order.
    pub fn with_reverse_resolution(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// Reject the first `count` submissions (transient failure).
    pub fn with_submit_failures(self, count: usize) -> Self {
        self.state.lock().submit_failures = count;
        self
    }

    /// Reject every submission (malformed batch).
    pub fn rejecting_all(mut self) -> Self {
        self.reject_all = true;
        self
    }
}

impl JobExecutor for MockExecutor {
    fn submit(&self, request: &CalcRequest) -> Result<String> {
        if self.reject_all {
            return Err(anyhow!("malformed request"));
        }
        let mut state = self.state.lock();
        if state.submit_failures > 0 {
            state.submit_failures -= 1;
            return Err(anyhow!("transient submission failure"));
        }
        let seq = state.counter;
        state.counter += 1;
        let ticket = format!("job-{seq}");
        let energy = (self.energy_fn)(request);
        state.jobs.insert(
            ticket.clone(),
            MockJob {
                id: request.id,
                seq,
                polls: 0,
                energy,
            },
        );
        Ok(ticket)
    }

    fn poll(&self, ticket: &str) -> Result<JobStatus> {
        let mut state = self.state.lock();
        let total = state.counter;
        let job = state
            .jobs
            .get_mut(ticket)
            .ok_or_else(|| anyhow!("unknown ticket {ticket}"))?;
        job.polls += 1;
        // In reverse mode the earliest submission needs the most polls, so
        // completion order is the inverse of submission order.
        let polls_needed = if self.reverse { total - job.seq } else { 1 };
        if job.polls < polls_needed {
            return Ok(JobStatus::Pending);
        }
        let outcome = match job.energy {
            Some(energy) => {
                let mut total_energies = HashMap::new();
                total_energies.insert("energy_no_entropy".to_string(), energy);
                CalcOutcome::success(
                    job.id,
                    CalcPayload {
                        total_energies,
                        maximum_force: 0.01,
                        bands: None,
                    },
                )
            }
            None => CalcOutcome::failure(job.id, "calculation crashed".to_string()),
        };
        Ok(JobStatus::Resolved(outcome))
    }

    fn name(&self) -> &str {
        "Mock Executor"
    }
}

/// A cubic 8 AA cell with two Li and one O site. With the default spacing
/// series (0.5 -> 0.2) its unique k-grid list is [2,2,2], [3,3,3], [4,4,4].
pub fn test_structure() -> Structure {
    let lattice = Lattice::orthorhombic(8.0, 8.0, 8.0).expect("cubic cell");
    let sites = vec![
        Site {
            species: "Li".to_string(),
            position: Point3::new(0.0, 0.0, 0.0),
        },
        Site {
            species: "Li".to_string(),
            position: Point3::new(4.0, 0.0, 0.0),
        },
        Site {
            species: "O".to_string(),
            position: Point3::new(4.0, 4.0, 4.0),
        },
    ];
    Structure::new(lattice, sites, "Li2O test cell")
}
