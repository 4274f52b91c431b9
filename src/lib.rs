//! Automation core for plane-wave convergence testing.
//!
//! The controller in [`convergence::controller`] drives batches of
//! independent calculations through an external job execution service,
//! applies a delta-based stopping criterion across baseline, displaced and
//! compressed sweeps, and reconciles the three axes into one recommended
//! (cutoff, k-grid) operating point.

pub mod analysis;
pub mod convergence;
pub mod core;
pub mod engine;
pub mod transform;
