use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::engine::executor::{CalcOutcome, CalcRequest, JobExecutor, JobStatus};

#[derive(Debug, Error)]
#[error("job execution service rejected request `{label}`: {source}")]
pub struct DispatchError {
    pub label: String,
    #[source]
    pub source: anyhow::Error,
}

/// One audit record per submitted request. Written before `dispatch`
/// returns, so an external observer can resume or diagnose a search from
/// the identities alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Ordinal of the batch within the search.
    pub batch: usize,
    /// Position of the request within its batch (submission order).
    pub seq: usize,
    pub request: Uuid,
    pub ticket: String,
    pub label: String,
    /// RFC 3339 submission timestamp.
    pub submitted_at: String,
}

/// Append-only submission log, safe to persist incrementally.
#[derive(Debug, Default)]
pub struct AuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditLog {
    pub fn record(&self, entry: AuditEntry) {
        self.entries.lock().push(entry);
    }

    pub fn snapshot(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Handle over one in-flight batch. Keeps the (identity, ticket) pairs in
/// submission order; `collect` reassembles outcomes in that order.
#[derive(Debug, Clone)]
pub struct BatchHandle {
    batch: usize,
    entries: Vec<(Uuid, String)>,
}

impl BatchHandle {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identities in submission order, for pending-batch bookkeeping.
    pub fn ids(&self) -> Vec<Uuid> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }
}

/// Fans independent requests out to the job execution service and
/// reassembles ordered results.
pub struct BatchDispatcher {
    executor: Arc<dyn JobExecutor>,
    audit: Arc<AuditLog>,
    poll_interval: Duration,
    batch_counter: Mutex<usize>,
}

impl BatchDispatcher {
    pub fn new(executor: Arc<dyn JobExecutor>) -> Self {
        Self {
            executor,
            audit: Arc::new(AuditLog::default()),
            poll_interval: Duration::from_millis(50),
            batch_counter: Mutex::new(0),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn audit(&self) -> Arc<AuditLog> {
        self.audit.clone()
    }

    /// Submits all requests to the service concurrently. Every submitted
    /// request is logged with its assigned identity before this returns.
    ///
    /// An individual submit rejection fails the whole dispatch; requests
    /// that made it through are still recorded in the audit log.
    pub fn dispatch(&self, requests: &[CalcRequest]) -> Result<BatchHandle, DispatchError> {
        let batch = {
            let mut counter = self.batch_counter.lock();
            *counter += 1;
            *counter - 1
        };

        let submissions: Vec<(Uuid, String, Result<String, anyhow::Error>)> = requests
            .par_iter()
            .map(|req| (req.id, req.label.clone(), self.executor.submit(req)))
            .collect();

        let mut entries = Vec::with_capacity(requests.len());
        let mut rejection: Option<DispatchError> = None;
        for (seq, (id, label, result)) in submissions.into_iter().enumerate() {
            match result {
                Ok(ticket) => {
                    info!(
                        "submitted `{}` as {} (ticket {}) to {}",
                        label,
                        id,
                        ticket,
                        self.executor.name()
                    );
                    self.audit.record(AuditEntry {
                        batch,
                        seq,
                        request: id,
                        ticket: ticket.clone(),
                        label,
                        submitted_at: Utc::now().to_rfc3339(),
                    });
                    entries.push((id, ticket));
                }
                Err(err) => {
                    warn!("submission of `{}` rejected: {:#}", label, err);
                    if rejection.is_none() {
                        rejection = Some(DispatchError { label, source: err });
                    }
                }
            }
        }

        match rejection {
            Some(err) => Err(err),
            None => Ok(BatchHandle { batch, entries }),
        }
    }

    /// Blocks until every request in the batch has resolved and returns
    /// outcomes in the original submission order, regardless of the order
    /// in which the service completed them. This is the controller's only
    /// blocking point.
    pub fn collect(&self, handle: &BatchHandle) -> Vec<CalcOutcome> {
        let n = handle.entries.len();
        let mut outcomes: Vec<Option<CalcOutcome>> = vec![None; n];
        let mut remaining = n;

        while remaining > 0 {
            for (slot, (id, ticket)) in outcomes.iter_mut().zip(&handle.entries) {
                if slot.is_some() {
                    continue;
                }
                match self.executor.poll(ticket) {
                    Ok(JobStatus::Resolved(mut outcome)) => {
                        // Reconcile by caller-assigned identity, not by
                        // whatever the service reports back.
                        outcome.request = *id;
                        if outcome.failed {
                            warn!(
                                "request {} resolved as failed: {}",
                                id,
                                outcome.diagnostic.as_deref().unwrap_or("no diagnostic")
                            );
                        }
                        *slot = Some(outcome);
                        remaining -= 1;
                    }
                    Ok(JobStatus::Pending) => {}
                    Err(err) => {
                        // A poll transport error degrades to a failed
                        // sample; it does not abort the batch.
                        warn!("poll of ticket {} failed: {:#}", ticket, err);
                        *slot = Some(CalcOutcome::failure(
                            *id,
                            format!("poll transport error: {err:#}"),
                        ));
                        remaining -= 1;
                    }
                }
            }
            if remaining > 0 {
                std::thread::sleep(self.poll_interval);
            }
        }

        outcomes.into_iter().flatten().collect()
    }
}
