//! Snapshot Counting Kernel
//!
//! Pure compute for the domain counting pass: no file or process-group access
//! happens here.
//!
//! # Modules
//! - [`particle`] -- `ParticleType`, `ElementRecord` and the dark matter `MassReference`.
//! - [`count`] -- Search policy, per-rank `CountTable`s and diagnostics.
//! - [`octant`] -- Child-cell geometry used to synthesize gas pseudo-particles.

#![warn(missing_docs)]

pub mod count;
pub mod octant;
pub mod particle;

pub use count::{CountTable, Diagnostics, LocalCounts, Route, SearchPolicy, SearchType};
pub use octant::{cell_width, children_per_grid, octant_offset, synthetic_position};
pub use particle::{ElementRecord, MassReference, ParticleType, DEFAULT_MASS_TOLERANCE};

// ---------------------------------------------------------------------------
// DomainLookup trait
// ---------------------------------------------------------------------------

/// Maps a position to the worker rank whose sub-volume contains it.
///
/// Implementations must be deterministic: every process evaluates the same
/// lookup and has to reach the same answer.
pub trait DomainLookup {
    /// Number of worker domains.
    fn num_domains(&self) -> usize;

    /// Rank owning `point`, or `None` when no domain contains it.
    fn locate(&self, point: [f64; 3]) -> Option<usize>;
}
