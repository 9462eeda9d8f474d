//! Local shard scan: classify every element of a shard and count it against
//! the domain it falls in.
//!
//! Particle shards are walked through three cursors over one open file
//! (positions, masses, ages). AMR and hydro shards are walked in lockstep, one
//! (region, level) block at a time, turning leaf cells into gas
//! pseudo-particles. Buffers live for one block at most.

use std::path::Path;

use kernel::{
    children_per_grid, synthetic_position, ElementRecord, LocalCounts, MassReference,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::DomainAssignment;
use crate::error::{Result, SnapshotError};
use crate::header::{
    AmrHeader, HydroHeader, OrderingScheme, ParticleField, ParticleHeader,
    AMR_GRID_LINK_RECORDS,
};
use crate::record::SharedShard;

/// Coordinate used for axes a lower-dimensional run does not store.
const ABSENT_AXIS: f64 = 0.5;

/// Identity of one AMR child cell within a snapshot.
///
/// The jitter of a cell's pseudo-particle is a function of this identity and
/// the run seed only, so it does not matter which rank reads the shard or in
/// what order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId {
    /// Zero-based shard index
    pub shard: usize,
    /// 0 for the domain region, 1.. for boundary regions
    pub region: usize,
    /// Zero-based refinement level
    pub level: usize,
    /// Grid index within the (region, level) block
    pub grid: usize,
    /// Child slot within the grid
    pub slot: usize,
}

impl CellId {
    /// Fold the identity and `seed` into one well-mixed 64-bit key.
    pub fn key(&self, seed: u64) -> u64 {
        [
            self.shard as u64,
            self.region as u64,
            self.level as u64,
            self.grid as u64,
            self.slot as u64,
        ]
        .into_iter()
        .fold(mix(seed), |h, v| mix(h ^ v))
    }
}

/// SplitMix64 finalizer.
fn mix(v: u64) -> u64 {
    let mut z = v.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Everything a rank needs to classify and place elements.
///
/// Built once after the broadcast of the extent and the mass reference; the
/// scan functions never read anything else shared.
pub struct ScanContext<'a> {
    /// Per-rank boxes
    pub assignment: &'a DomainAssignment,
    /// Dark matter mass reference
    pub mass_ref: MassReference,
    /// Drop zero-age particles that miss the dark matter mass
    pub ghost_filter: bool,
    /// Box length scaling AMR positions
    pub boxlen: f64,
    /// Ordering the AMR headers were written with
    pub ordering: OrderingScheme,
    /// Run-wide jitter seed
    pub seed: u64,
}

impl<'a> ScanContext<'a> {
    /// Create a scan context.
    pub fn new(
        assignment: &'a DomainAssignment,
        mass_ref: MassReference,
        ghost_filter: bool,
        boxlen: f64,
        ordering: OrderingScheme,
        seed: u64,
    ) -> Self {
        Self {
            assignment,
            mass_ref,
            ghost_filter,
            boxlen,
            ordering,
            seed,
        }
    }

    /// Uniform `[0, 1)` jitter per axis for the pseudo-particle of `cell`.
    pub fn jitter(&self, cell: CellId) -> [f64; 3] {
        let mut rng = StdRng::seed_from_u64(cell.key(self.seed));
        [rng.random(), rng.random(), rng.random()]
    }
}

fn length_error(path: &Path, what: &str, got: usize, expected: usize) -> SnapshotError {
    SnapshotError::Header {
        path: path.to_path_buf(),
        message: format!("{} record holds {} values, expected {}", what, got, expected),
    }
}

/// Scan one particle shard, returning the number of particles read.
pub fn scan_particle_shard(
    path: &Path,
    ctx: &ScanContext<'_>,
    counts: &mut LocalCounts,
) -> Result<usize> {
    let shard = SharedShard::open(path)?;

    let mut positions = shard.records();
    let header = ParticleHeader::read(&mut positions)?;
    let mut masses = shard.records();
    header.seek_field(&mut masses, ParticleField::Mass)?;
    let mut ages = shard.records();
    header.seek_field(&mut ages, ParticleField::Age)?;

    let n = header.npart_local;
    let ndim = header.ndim as usize;
    tracing::debug!("Scanning {}: {} particles", path.display(), n);

    let mut coords = Vec::with_capacity(ndim);
    for _ in 0..ndim {
        let axis = positions.read_f64s()?;
        if axis.len() != n {
            return Err(length_error(path, "position", axis.len(), n));
        }
        coords.push(axis);
    }
    let mass = masses.read_f64s()?;
    if mass.len() != n {
        return Err(length_error(path, "mass", mass.len(), n));
    }
    let age = ages.read_f64s()?;
    if age.len() != n {
        return Err(length_error(path, "age", age.len(), n));
    }

    let unmatched_before = counts.diagnostics.out_of_bounds;
    for i in 0..n {
        let mut p = [ABSENT_AXIS; 3];
        for (axis, values) in coords.iter().enumerate() {
            p[axis] = values[i];
        }
        let kind = ctx.mass_ref.classify(mass[i], age[i], ctx.ghost_filter);
        counts.record(&ElementRecord::particle(p, kind), ctx.assignment);
    }

    let unmatched = counts.diagnostics.out_of_bounds - unmatched_before;
    if unmatched > 0 {
        tracing::warn!(
            "{}: {} particles matched no domain",
            path.display(),
            unmatched
        );
    }
    Ok(n)
}

/// Scan one AMR shard together with its hydro shard, returning the number of
/// gas pseudo-particles synthesized.
///
/// A child slot becomes a pseudo-particle when it is not refined further or
/// sits on the finest level. `shard` is the zero-based file index and feeds
/// the per-cell jitter.
pub fn scan_gas_shard(
    amr_path: &Path,
    hydro_path: &Path,
    shard: usize,
    ctx: &ScanContext<'_>,
    counts: &mut LocalCounts,
) -> Result<usize> {
    let mut amr = SharedShard::open(amr_path)?.records();
    let mut hydro = SharedShard::open(hydro_path)?.records();

    let header = AmrHeader::read(&mut amr, ctx.ordering)?;
    let hydro_header = HydroHeader::read(&mut hydro)?;
    let ndim = header.ndim;
    let nchild = children_per_grid(ndim);
    let finest = header.nlevelmax - 1;

    tracing::debug!(
        "Scanning {}: {} levels, {} boundaries, {} hydro variables",
        amr_path.display(),
        header.nlevelmax,
        header.nboundary,
        hydro_header.nvarh
    );

    let unmatched_before = counts.diagnostics.out_of_bounds;
    let mut synthesized = 0;
    for region in 0..header.regions() {
        for level in 0..header.nlevelmax {
            let ncache = header.grid_count(region, level);
            let _ilevel = hydro.read_i32()?;
            let hydro_ncache = hydro.read_i32()?;
            if usize::try_from(hydro_ncache).ok() != Some(ncache) {
                return Err(SnapshotError::Header {
                    path: hydro_path.to_path_buf(),
                    message: format!(
                        "region {} level {} holds {} grids, AMR shard has {}",
                        region, level, hydro_ncache, ncache
                    ),
                });
            }
            if ncache == 0 {
                counts.note_empty_chunk();
                continue;
            }

            amr.skip(AMR_GRID_LINK_RECORDS)?;
            let mut centres = Vec::with_capacity(ndim as usize);
            for _ in 0..ndim {
                let axis = amr.read_f64s()?;
                if axis.len() != ncache {
                    return Err(length_error(amr_path, "grid centre", axis.len(), ncache));
                }
                centres.push(axis);
            }
            // father, then two neighbours per axis
            amr.skip(1 + 2 * ndim as usize)?;
            let mut sons = Vec::with_capacity(nchild);
            for _ in 0..nchild {
                let son = amr.read_i32s()?;
                if son.len() != ncache {
                    return Err(length_error(amr_path, "son index", son.len(), ncache));
                }
                sons.push(son);
            }
            // cpu map, refinement map
            amr.skip(2 * nchild)?;

            for (slot, son) in sons.iter().enumerate() {
                hydro.skip(hydro_header.nvarh)?;
                for grid in 0..ncache {
                    if son[grid] != 0 && level != finest {
                        continue;
                    }
                    let mut centre = [ABSENT_AXIS; 3];
                    for (axis, values) in centres.iter().enumerate() {
                        centre[axis] = values[grid];
                    }
                    let jitter = ctx.jitter(CellId {
                        shard,
                        region,
                        level,
                        grid,
                        slot,
                    });
                    let p = synthetic_position(
                        centre,
                        slot,
                        ndim,
                        level as u32,
                        ctx.boxlen,
                        jitter,
                    );
                    counts.record(&ElementRecord::gas_cell(p, level as u32), ctx.assignment);
                    synthesized += 1;
                }
            }
        }
    }

    let unmatched = counts.diagnostics.out_of_bounds - unmatched_before;
    if unmatched > 0 {
        tracing::warn!(
            "{}: {} gas cells matched no domain",
            amr_path.display(),
            unmatched
        );
    }
    Ok(synthesized)
}
