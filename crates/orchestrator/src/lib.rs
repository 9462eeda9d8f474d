//! Orchestration Layer
//!
//! This crate runs the pre-loading pass over a RAMSES snapshot:
//! - Info file and Fortran record shard parsing
//! - Domain extent resolution and decomposition into per-rank boxes
//! - Local shard scan (dark matter, stars, gas pseudo-particles)
//! - Global reduction of the per-rank count tables
//! - Thread-backed process group for running all ranks in one process

#![warn(missing_docs)]

pub mod comm;
pub mod config;
pub mod distributed;
pub mod domain;
pub mod error;
pub mod header;
pub mod info;
pub mod paths;
pub mod readtask;
pub mod record;
pub mod reduce;
pub mod scan;
pub mod synthetic;

pub use comm::{Communicator, LocalGroup, SingleProcess};
pub use config::{OutOfBoundsPolicy, RunConfig};
pub use distributed::{run_distributed, run_single_instance};
pub use domain::{BoundingVolume, DomainAssignment};
pub use error::{Result, SnapshotError};
pub use reduce::GlobalCounts;

use std::path::PathBuf;

use kernel::{LocalCounts, MassReference};

use crate::domain::{decompose_domain, resolve_extent};
use crate::info::InfoFile;
use crate::paths::{ShardKind, SnapshotPaths};
use crate::readtask::ReadTasks;
use crate::reduce::{all_reduce_sum, reduce_counts};
use crate::scan::{scan_gas_shard, scan_particle_shard, ScanContext};

/// Outcome of the counting pass on one rank.
#[derive(Debug, Clone)]
pub struct DomainCounts {
    /// This rank
    pub rank: usize,
    /// Boxes owned by every rank
    pub assignment: DomainAssignment,
    /// Reduced counts, identical on every rank
    pub global: GlobalCounts,
    /// Primary elements this rank will receive
    pub local_expected: u64,
    /// Baryons this rank will receive, when tracked
    pub local_baryon_expected: Option<u64>,
}

/// What a rank checked before any collective work.
struct Preflight {
    info: InfoFile,
    particle_shards: Vec<PathBuf>,
    /// File index, AMR path, hydro path
    gas_shards: Vec<(usize, PathBuf, PathBuf)>,
}

fn preflight(rank: usize, nprocs: usize, config: &RunConfig) -> Result<Preflight> {
    config.validate().map_err(SnapshotError::Config)?;
    if config.num_ranks != nprocs {
        return Err(SnapshotError::Config(format!(
            "configured for {} ranks but the group has {}",
            config.num_ranks, nprocs
        )));
    }

    let paths = SnapshotPaths::new(&config.snapshot_dir, config.snapshot_name.clone());
    let info = InfoFile::load(&paths.info())?;

    if config.search_type.scans_particles()
        && !(info.omega_m > 0.0 && info.omega_b < info.omega_m)
    {
        return Err(SnapshotError::Config(format!(
            "no positive dark matter mass for omega_m={} omega_b={}",
            info.omega_m, info.omega_b
        )));
    }

    let tasks = ReadTasks::distribute(nprocs, config.readers());
    let files = tasks.files_for(rank, info.ncpu);

    let mut particle_shards = Vec::new();
    let mut gas_shards = Vec::new();
    for &index in &files {
        if config.search_type.scans_particles() {
            particle_shards.push(paths.shard(ShardKind::Particle, index)?);
        }
        if config.search_type.scans_gas() {
            gas_shards.push((
                index,
                paths.shard(ShardKind::Amr, index)?,
                paths.shard(ShardKind::Hydro, index)?,
            ));
        }
    }

    Ok(Preflight {
        info,
        particle_shards,
        gas_shards,
    })
}

/// Turn a per-rank outcome into a collective one: if any rank failed, every
/// rank fails. The failing ranks keep their own error.
fn agree<C: Communicator + ?Sized, T>(comm: &C, outcome: Result<T>) -> Result<T> {
    let failed = all_reduce_sum(comm, &[u64::from(outcome.is_err())])?
        .first()
        .copied()
        .unwrap_or(0);
    match outcome {
        Err(e) => Err(e),
        Ok(_) if failed > 0 => Err(SnapshotError::PeerFailed { failed }),
        Ok(v) => Ok(v),
    }
}

/// Scan this rank's shards.
fn scan_local(
    ctx: &ScanContext<'_>,
    plan: &Preflight,
    counts: &mut LocalCounts,
) -> Result<()> {
    for path in &plan.particle_shards {
        scan_particle_shard(path, ctx, counts)?;
    }
    for (index, amr, hydro) in &plan.gas_shards {
        scan_gas_shard(amr, hydro, *index, ctx, counts)?;
    }
    Ok(())
}

/// Number of values broadcast from rank 0: extent, mass reference, box length.
const SHARED_VALUES: usize = 8;

/// Run the counting pass on one rank of `comm`.
///
/// Every rank of the group must call this with the same configuration. The
/// result tells each rank how many elements of the searched types it will
/// receive once the snapshot is actually loaded.
pub fn count_in_domains<C: Communicator + ?Sized>(
    comm: &C,
    config: &RunConfig,
) -> Result<DomainCounts> {
    let rank = comm.rank();
    let nprocs = comm.size();

    // 1. Pre-flight, agreed before anything else is shared
    let plan = agree(comm, preflight(rank, nprocs, config))?;
    if rank == 0 {
        tracing::info!(
            "Snapshot {}: {} shard(s), ordering {}, {} rank(s), {} reader(s)",
            config.snapshot_name,
            plan.info.ncpu,
            plan.info.ordering.name(),
            nprocs,
            config.readers()
        );
    }

    // 2. Extent and mass reference from rank 0
    let mut shared = [0.0f64; SHARED_VALUES];
    if rank == 0 {
        let extent = resolve_extent(config.expand_limits);
        let mass_ref = MassReference::from_cosmology(
            plan.info.omega_m,
            plan.info.omega_b,
            config.n_eff,
            config.mass_tolerance,
        );
        shared[..6].copy_from_slice(&extent.to_array());
        shared[6] = mass_ref.value;
        shared[7] = plan.info.boxlen;
        tracing::info!(
            "Dark matter mass reference {:.6e}, box length {}",
            mass_ref.value,
            plan.info.boxlen
        );
    }
    comm.barrier();
    comm.broadcast_f64s(0, &mut shared);

    let mut extent = [0.0f64; 6];
    extent.copy_from_slice(&shared[..6]);
    let extent = BoundingVolume::from_array(extent);
    let mass_ref = MassReference::new(shared[6], config.mass_tolerance);
    let boxlen = shared[7];

    // 3. Decomposition, identical on every rank
    let assignment = decompose_domain(&extent, nprocs)?;

    // 4. Local scan
    let mut counts = LocalCounts::new(nprocs, config.policy());
    let ctx = ScanContext::new(
        &assignment,
        mass_ref,
        config.ghost_star_filter,
        boxlen,
        plan.info.ordering,
        config.jitter_seed,
    );
    let scanned = scan_local(&ctx, &plan, &mut counts);
    agree(comm, scanned)?;
    tracing::debug!(
        "Rank {} scanned {} particle and {} gas shard(s): {} counted locally",
        rank,
        plan.particle_shards.len(),
        plan.gas_shards.len(),
        counts.primary.total()
    );

    // 5. Global reduction
    let global = reduce_counts(comm, &counts)?;
    let unmatched = global.diagnostics.out_of_bounds;
    if unmatched > 0 {
        match config.out_of_bounds {
            OutOfBoundsPolicy::Reject => {
                return Err(SnapshotError::OutOfBounds { count: unmatched });
            }
            OutOfBoundsPolicy::Tolerate => {
                if rank == 0 {
                    tracing::warn!("{} elements matched no domain and were dropped", unmatched);
                }
            }
        }
    }
    if rank == 0 {
        let d = &global.diagnostics;
        tracing::info!(
            "Counted {} elements (dark {}, star {}, gas {}, ghost {} dropped)",
            global.primary.total(),
            d.dark,
            d.star,
            d.gas,
            d.ghost
        );
    }

    Ok(DomainCounts {
        rank,
        local_expected: global.expected(rank),
        local_baryon_expected: global.baryon_expected(rank),
        assignment,
        global,
    })
}
