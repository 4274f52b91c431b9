use thiserror::Error;

pub mod enumerate;
pub mod perturb;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("site index {index} out of range for a structure with {nsites} sites (1-based)")]
    SiteOutOfRange { index: usize, nsites: usize },

    #[error("displacement vector must not be the zero vector")]
    ZeroDisplacement,

    #[error("scaled cell is singular")]
    SingularCell,

    #[error("removal specification yields no sites to remove")]
    NothingToRemove,

    #[error("relative removal fraction {fraction} of {count} sites is not an integer count")]
    FractionalRemoval { fraction: f64, count: usize },

    #[error("removal count {requested} exceeds the {available} available sites")]
    TooManyRemovals { requested: usize, available: usize },

    #[error(
        "symmetry tolerance ceiling reached after {attempts} attempts (last tolerance {atol})"
    )]
    ToleranceCeiling { attempts: usize, atol: f64 },

    #[error("enumeration produced a structure with indexed kind names")]
    TaggedKinds,

    #[error("cannot map enumerated site back to an original site")]
    UnmappedSite,

    #[error("enumeration failed: {0}")]
    Enumeration(String),
}
