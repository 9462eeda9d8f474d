//! Shard headers and the record layout of particle, AMR and hydro shards.
//!
//! Fields the counting pass never needs are skipped by record count. The
//! counts live in the constants and tables below rather than inline in the
//! readers.

use std::io::{Read, Seek};

use crate::error::{Result, SnapshotError};
use crate::record::RecordReader;

/// Particle header records skipped after the local count: seeds, total star
/// count, total star mass, lost star mass, sink count.
pub const PARTICLE_BOOKKEEPING_RECORDS: usize = 5;

/// AMR scalar header records skipped after the gas count.
pub const AMR_SCALAR_TAIL_RECORDS: usize = 14;

/// AMR records between the per-level grid counts and the boundary counts.
pub const AMR_AFTER_LEVEL_COUNTS_RECORDS: usize = 1;

/// AMR records preceding the boundary grid counts (boundary runs only).
pub const AMR_BEFORE_BOUNDARY_COUNTS_RECORDS: usize = 2;

/// AMR records between the grid counts and the ordering block.
pub const AMR_BEFORE_ORDERING_RECORDS: usize = 2;

/// Grid linkage records before the grid centres: index, next, previous.
pub const AMR_GRID_LINK_RECORDS: usize = 3;

/// Domain ordering the snapshot was written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrderingScheme {
    /// Hilbert curve ordering
    #[default]
    Hilbert,
    /// Recursive bisection
    Bisection,
    /// Angular ordering
    Angular,
    /// k-section ordering
    Ksection,
}

/// AMR header records occupied by each ordering scheme's domain description.
const ORDERING_RECORDS: [(OrderingScheme, usize); 4] = [
    (OrderingScheme::Hilbert, 4),
    (OrderingScheme::Bisection, 5),
    (OrderingScheme::Angular, 4),
    (OrderingScheme::Ksection, 4),
];

impl OrderingScheme {
    /// Parse the scheme named in the info file. Unknown names fall back to
    /// the default layout.
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "bisection" => OrderingScheme::Bisection,
            "angular" => OrderingScheme::Angular,
            "ksection" => OrderingScheme::Ksection,
            "hilbert" => OrderingScheme::Hilbert,
            other => {
                tracing::warn!("Unknown ordering scheme {:?}, assuming hilbert layout", other);
                OrderingScheme::Hilbert
            }
        }
    }

    /// Name as written in the info file.
    pub fn name(self) -> &'static str {
        match self {
            OrderingScheme::Hilbert => "hilbert",
            OrderingScheme::Bisection => "bisection",
            OrderingScheme::Angular => "angular",
            OrderingScheme::Ksection => "ksection",
        }
    }

    /// Number of AMR header records describing the ordering.
    pub fn amr_records(self) -> usize {
        ORDERING_RECORDS
            .iter()
            .find(|(scheme, _)| *scheme == self)
            .map(|(_, n)| *n)
            .unwrap_or(4)
    }
}

/// Per-particle arrays in a particle shard, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticleField {
    /// One record per dimension
    Position,
    /// One record per dimension
    Velocity,
    /// Single record
    Mass,
    /// Single record
    Identity,
    /// Single record
    Level,
    /// Formation time, single record
    Age,
}

const PARTICLE_FIELDS: [ParticleField; 6] = [
    ParticleField::Position,
    ParticleField::Velocity,
    ParticleField::Mass,
    ParticleField::Identity,
    ParticleField::Level,
    ParticleField::Age,
];

impl ParticleField {
    /// Records this field occupies.
    pub fn records(self, ndim: u32) -> usize {
        match self {
            ParticleField::Position | ParticleField::Velocity => ndim as usize,
            _ => 1,
        }
    }

    /// Records between the end of the header and the start of this field.
    pub fn records_before(self, ndim: u32) -> usize {
        PARTICLE_FIELDS
            .iter()
            .take_while(|f| **f != self)
            .map(|f| f.records(ndim))
            .sum()
    }
}

fn check_ndim(path: &std::path::Path, ndim: i32) -> Result<u32> {
    if (1..=3).contains(&ndim) {
        Ok(ndim as u32)
    } else {
        Err(SnapshotError::Header {
            path: path.to_path_buf(),
            message: format!("dimensionality {} outside 1..=3", ndim),
        })
    }
}

fn check_count(path: &std::path::Path, what: &str, n: i32) -> Result<usize> {
    usize::try_from(n).map_err(|_| SnapshotError::Header {
        path: path.to_path_buf(),
        message: format!("negative {}: {}", what, n),
    })
}

/// Header of one particle shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticleHeader {
    /// Spatial dimensionality
    pub ndim: u32,
    /// Particles stored in this shard
    pub npart_local: usize,
    /// Byte length of the header
    pub header_bytes: u64,
}

impl ParticleHeader {
    /// Read the header from the start of a particle shard.
    pub fn read<R: Read + Seek>(r: &mut RecordReader<R>) -> Result<Self> {
        let start = r.position()?;
        // ncpu
        r.skip(1)?;
        let ndim = r.read_i32()?;
        let npart = r.read_i32()?;
        r.skip(PARTICLE_BOOKKEEPING_RECORDS)?;
        let header_bytes = r.position()? - start;

        Ok(Self {
            ndim: check_ndim(r.path(), ndim)?,
            npart_local: check_count(r.path(), "particle count", npart)?,
            header_bytes,
        })
    }

    /// Position `r` at the first record of `field`.
    pub fn seek_field<R: Read + Seek>(
        &self,
        r: &mut RecordReader<R>,
        field: ParticleField,
    ) -> Result<()> {
        r.seek_to(self.header_bytes)?;
        r.skip(field.records_before(self.ndim))?;
        Ok(())
    }
}

/// Header of one AMR shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmrHeader {
    /// Spatial dimensionality
    pub ndim: u32,
    /// Coarse grid resolution per axis
    pub coarse: [i32; 3],
    /// Number of refinement levels
    pub nlevelmax: usize,
    /// Maximum grids per process
    pub ngridmax: i32,
    /// Number of boundary regions
    pub nboundary: usize,
    /// Gas cells expected in this shard
    pub ngas: i32,
    /// Grid counts indexed by `region * nlevelmax + level`
    pub grid_counts: Vec<usize>,
}

impl AmrHeader {
    /// Read the AMR header, leaving `r` at the first (region, level) block.
    pub fn read<R: Read + Seek>(
        r: &mut RecordReader<R>,
        ordering: OrderingScheme,
    ) -> Result<Self> {
        let ndim = r.read_i32()?;
        let ndim = check_ndim(r.path(), ndim)?;
        let coarse = r.read_i32s()?;
        let coarse: [i32; 3] = coarse.as_slice().try_into().map_err(|_| SnapshotError::Header {
            path: r.path().to_path_buf(),
            message: format!("coarse grid record holds {} values, expected 3", coarse.len()),
        })?;
        let nlevelmax = r.read_i32()?;
        let ngridmax = r.read_i32()?;
        let nboundary = r.read_i32()?;
        let ngas = r.read_i32()?;
        let nlevelmax = check_count(r.path(), "level count", nlevelmax)?;
        let nboundary = check_count(r.path(), "boundary count", nboundary)?;
        r.skip(AMR_SCALAR_TAIL_RECORDS)?;

        if nlevelmax == 0 {
            return Err(SnapshotError::Header {
                path: r.path().to_path_buf(),
                message: "no refinement levels".to_string(),
            });
        }

        let mut grid_counts = Vec::with_capacity((1 + nboundary) * nlevelmax);
        let per_level = r.read_i32s()?;
        push_level_counts(r.path(), &mut grid_counts, &per_level, nlevelmax)?;
        r.skip(AMR_AFTER_LEVEL_COUNTS_RECORDS)?;

        if nboundary > 0 {
            r.skip(AMR_BEFORE_BOUNDARY_COUNTS_RECORDS)?;
            let per_boundary = r.read_i32s()?;
            if per_boundary.len() < nboundary * nlevelmax {
                return Err(SnapshotError::Header {
                    path: r.path().to_path_buf(),
                    message: format!(
                        "boundary grid counts hold {} values, expected {}",
                        per_boundary.len(),
                        nboundary * nlevelmax
                    ),
                });
            }
            for region in per_boundary.chunks(nlevelmax).take(nboundary) {
                push_level_counts(r.path(), &mut grid_counts, region, nlevelmax)?;
            }
        }

        r.skip(AMR_BEFORE_ORDERING_RECORDS)?;
        r.skip(ordering.amr_records())?;

        Ok(Self {
            ndim,
            coarse,
            nlevelmax,
            ngridmax,
            nboundary,
            ngas,
            grid_counts,
        })
    }

    /// Number of regions: the domain itself plus its boundaries.
    pub fn regions(&self) -> usize {
        1 + self.nboundary
    }

    /// Grids stored for `(region, level)`.
    pub fn grid_count(&self, region: usize, level: usize) -> usize {
        self.grid_counts[region * self.nlevelmax + level]
    }
}

fn push_level_counts(
    path: &std::path::Path,
    out: &mut Vec<usize>,
    counts: &[i32],
    nlevelmax: usize,
) -> Result<()> {
    if counts.len() < nlevelmax {
        return Err(SnapshotError::Header {
            path: path.to_path_buf(),
            message: format!("{} grid counts for {} levels", counts.len(), nlevelmax),
        });
    }
    for &n in &counts[..nlevelmax] {
        out.push(check_count(path, "grid count", n)?);
    }
    Ok(())
}

/// Header of one hydro shard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HydroHeader {
    /// Hydro variables per cell
    pub nvarh: usize,
    /// Adiabatic index
    pub gamma: f64,
}

impl HydroHeader {
    /// Read the hydro header, leaving `r` at the first (region, level) block.
    pub fn read<R: Read + Seek>(r: &mut RecordReader<R>) -> Result<Self> {
        // ncpu
        r.skip(1)?;
        let nvarh = r.read_i32()?;
        let nvarh = check_count(r.path(), "variable count", nvarh)?;
        // ndim, nlevelmax, nboundary
        r.skip(3)?;
        let gamma = r.read_f64()?;
        if nvarh == 0 {
            return Err(SnapshotError::Header {
                path: r.path().to_path_buf(),
                message: "no hydro variables".to_string(),
            });
        }
        Ok(Self { nvarh, gamma })
    }
}
