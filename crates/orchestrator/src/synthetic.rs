//! Synthetic snapshot writer.
//!
//! Produces small snapshots in exactly the record layout the scanner reads,
//! for tests, reference scenarios and smoke runs without real simulation
//! output.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use kernel::children_per_grid;

use crate::header::{
    OrderingScheme, AMR_AFTER_LEVEL_COUNTS_RECORDS, AMR_BEFORE_BOUNDARY_COUNTS_RECORDS,
    AMR_BEFORE_ORDERING_RECORDS, AMR_GRID_LINK_RECORDS, AMR_SCALAR_TAIL_RECORDS,
    PARTICLE_BOOKKEEPING_RECORDS,
};
use crate::paths::{ShardKind, SnapshotPaths};
use crate::record::RecordWriter;

type Writer = RecordWriter<BufWriter<File>>;

fn create(path: &Path) -> io::Result<Writer> {
    Ok(RecordWriter::new(BufWriter::new(File::create(path)?)))
}

/// Records whose content the scanner skips.
fn write_filler(w: &mut Writer, n: usize, len: usize) -> io::Result<()> {
    for _ in 0..n {
        w.write_array(&vec![0i32; len.max(1)])?;
    }
    Ok(())
}

/// Particles destined for one particle shard.
#[derive(Debug, Clone, Default)]
pub struct ParticleShard {
    ndim: u32,
    positions: Vec<[f64; 3]>,
    masses: Vec<f64>,
    ages: Vec<f64>,
}

impl ParticleShard {
    /// Empty shard for a run of dimensionality `ndim`.
    pub fn new(ndim: u32) -> Self {
        Self {
            ndim,
            ..Default::default()
        }
    }

    /// Add one particle.
    pub fn push(&mut self, position: [f64; 3], mass: f64, age: f64) -> &mut Self {
        self.positions.push(position);
        self.masses.push(mass);
        self.ages.push(age);
        self
    }

    /// Number of particles.
    pub fn len(&self) -> usize {
        self.masses.len()
    }

    /// Whether the shard holds no particles.
    pub fn is_empty(&self) -> bool {
        self.masses.is_empty()
    }

    /// Write the shard to `path`.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        let n = self.len();
        let mut w = create(path)?;
        // ncpu, ndim, npart
        w.write_scalar(1i32)?;
        w.write_scalar(self.ndim as i32)?;
        w.write_scalar(n as i32)?;
        write_filler(&mut w, PARTICLE_BOOKKEEPING_RECORDS, 1)?;

        for axis in 0..self.ndim as usize {
            let x: Vec<f64> = self.positions.iter().map(|p| p[axis]).collect();
            w.write_array(&x)?;
        }
        for _ in 0..self.ndim {
            w.write_array(&vec![0.0f64; n])?;
        }
        w.write_array(&self.masses)?;
        let ids: Vec<i32> = (1..=n as i32).collect();
        w.write_array(&ids)?;
        w.write_array(&vec![1i32; n])?;
        w.write_array(&self.ages)?;
        w.into_inner()?;
        Ok(())
    }
}

/// One grid (oct) of an AMR shard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmrGrid {
    /// Grid centre in code units
    pub centre: [f64; 3],
    /// Son grid index per child slot, zero for leaves
    pub sons: [i32; 8],
}

impl AmrGrid {
    /// A grid whose children are all leaves.
    pub fn leaf(centre: [f64; 3]) -> Self {
        Self {
            centre,
            sons: [0; 8],
        }
    }
}

/// Grids destined for one AMR shard and its matching hydro shard.
#[derive(Debug, Clone)]
pub struct AmrShard {
    ndim: u32,
    nlevelmax: usize,
    nboundary: usize,
    nvarh: usize,
    /// Indexed by `region * nlevelmax + level`
    blocks: Vec<Vec<AmrGrid>>,
}

impl AmrShard {
    /// Empty shard with `nlevelmax` levels, `nboundary` boundary regions and
    /// `nvarh` hydro variables.
    pub fn new(ndim: u32, nlevelmax: usize, nboundary: usize, nvarh: usize) -> Self {
        Self {
            ndim,
            nlevelmax,
            nboundary,
            nvarh,
            blocks: vec![Vec::new(); (1 + nboundary) * nlevelmax],
        }
    }

    /// Number of refinement levels.
    pub fn nlevelmax(&self) -> usize {
        self.nlevelmax
    }

    /// Add a grid to the block for `(region, level)`.
    pub fn push(&mut self, region: usize, level: usize, grid: AmrGrid) -> &mut Self {
        self.blocks[region * self.nlevelmax + level].push(grid);
        self
    }

    fn block(&self, region: usize, level: usize) -> &[AmrGrid] {
        &self.blocks[region * self.nlevelmax + level]
    }

    /// Total grids across all blocks.
    pub fn grid_total(&self) -> usize {
        self.blocks.iter().map(Vec::len).sum()
    }

    /// Write the AMR shard and its hydro shard.
    pub fn write(
        &self,
        amr_path: &Path,
        hydro_path: &Path,
        ordering: OrderingScheme,
    ) -> io::Result<()> {
        self.write_amr(amr_path, ordering)?;
        self.write_hydro(hydro_path)
    }

    fn counts_for(&self, region: usize) -> Vec<i32> {
        (0..self.nlevelmax)
            .map(|level| self.block(region, level).len() as i32)
            .collect()
    }

    fn write_amr(&self, path: &Path, ordering: OrderingScheme) -> io::Result<()> {
        let nchild = children_per_grid(self.ndim);
        let mut w = create(path)?;
        w.write_scalar(self.ndim as i32)?;
        w.write_array(&[1i32, 1, 1])?;
        w.write_scalar(self.nlevelmax as i32)?;
        w.write_scalar(self.grid_total().max(1) as i32)?;
        w.write_scalar(self.nboundary as i32)?;
        w.write_scalar(self.grid_total() as i32)?;
        write_filler(&mut w, AMR_SCALAR_TAIL_RECORDS, 1)?;

        w.write_array(&self.counts_for(0))?;
        write_filler(&mut w, AMR_AFTER_LEVEL_COUNTS_RECORDS, self.nlevelmax)?;
        if self.nboundary > 0 {
            write_filler(&mut w, AMR_BEFORE_BOUNDARY_COUNTS_RECORDS, self.nboundary)?;
            let boundary: Vec<i32> = (1..=self.nboundary)
                .flat_map(|region| self.counts_for(region))
                .collect();
            w.write_array(&boundary)?;
        }
        write_filler(&mut w, AMR_BEFORE_ORDERING_RECORDS, 1)?;
        write_filler(&mut w, ordering.amr_records(), 1)?;

        for region in 0..=self.nboundary {
            for level in 0..self.nlevelmax {
                let grids = self.block(region, level);
                let n = grids.len();
                if n == 0 {
                    continue;
                }
                write_filler(&mut w, AMR_GRID_LINK_RECORDS, n)?;
                for axis in 0..self.ndim as usize {
                    let c: Vec<f64> = grids.iter().map(|g| g.centre[axis]).collect();
                    w.write_array(&c)?;
                }
                write_filler(&mut w, 1 + 2 * self.ndim as usize, n)?;
                for slot in 0..nchild {
                    let s: Vec<i32> = grids.iter().map(|g| g.sons[slot]).collect();
                    w.write_array(&s)?;
                }
                write_filler(&mut w, 2 * nchild, n)?;
            }
        }
        w.into_inner()?;
        Ok(())
    }

    fn write_hydro(&self, path: &Path) -> io::Result<()> {
        let nchild = children_per_grid(self.ndim);
        let mut w = create(path)?;
        w.write_scalar(1i32)?;
        w.write_scalar(self.nvarh as i32)?;
        w.write_scalar(self.ndim as i32)?;
        w.write_scalar(self.nlevelmax as i32)?;
        w.write_scalar(self.nboundary as i32)?;
        w.write_scalar(5.0f64 / 3.0)?;

        for region in 0..=self.nboundary {
            for level in 0..self.nlevelmax {
                let n = self.block(region, level).len();
                w.write_scalar(level as i32 + 1)?;
                w.write_scalar(n as i32)?;
                if n == 0 {
                    continue;
                }
                for _slot in 0..nchild {
                    for var in 0..self.nvarh {
                        w.write_array(&vec![var as f64; n])?;
                    }
                }
            }
        }
        w.into_inner()?;
        Ok(())
    }
}

/// Assembles a complete snapshot directory: info file plus shards.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    name: String,
    ndim: u32,
    boxlen: f64,
    omega_m: f64,
    omega_b: f64,
    ordering: Option<OrderingScheme>,
    single_file: bool,
    particles: Vec<ParticleShard>,
    gas: Vec<AmrShard>,
}

impl SnapshotBuilder {
    /// A three-dimensional snapshot with `omega_m = 1`, `omega_b = 0` and a
    /// unit box, so the dark matter mass reference is `1 / n_eff^3`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ndim: 3,
            boxlen: 1.0,
            omega_m: 1.0,
            omega_b: 0.0,
            ordering: Some(OrderingScheme::Hilbert),
            single_file: false,
            particles: Vec::new(),
            gas: Vec::new(),
        }
    }

    /// Set the density parameters.
    pub fn cosmology(mut self, omega_m: f64, omega_b: f64) -> Self {
        self.omega_m = omega_m;
        self.omega_b = omega_b;
        self
    }

    /// Set the box length.
    pub fn boxlen(mut self, boxlen: f64) -> Self {
        self.boxlen = boxlen;
        self
    }

    /// Set the ordering line, or leave it out with `None`.
    pub fn ordering(mut self, ordering: Option<OrderingScheme>) -> Self {
        self.ordering = ordering;
        self
    }

    /// Use the single-file names instead of numbered shards.
    pub fn single_file(mut self) -> Self {
        self.single_file = true;
        self
    }

    /// Append a particle shard.
    pub fn particle_shard(mut self, shard: ParticleShard) -> Self {
        self.particles.push(shard);
        self
    }

    /// Append an AMR + hydro shard pair.
    pub fn gas_shard(mut self, shard: AmrShard) -> Self {
        self.gas.push(shard);
        self
    }

    /// Snapshot name used in file names.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of shard files per kind.
    pub fn ncpu(&self) -> usize {
        self.particles.len().max(self.gas.len()).max(1)
    }

    fn shard_path(&self, paths: &SnapshotPaths, kind: ShardKind, index: usize) -> PathBuf {
        if self.single_file {
            paths.single(kind)
        } else {
            paths.numbered(kind, index)
        }
    }

    /// Render the info file.
    pub fn info_text(&self) -> String {
        let levelmax = self.gas.iter().map(AmrShard::nlevelmax).max().unwrap_or(1);
        let mut text = format!(
            "ncpu        = {:10}\n\
             ndim        = {:10}\n\
             levelmin    = {:10}\n\
             levelmax    = {:10}\n\
             ngridmax    = {:10}\n\
             nstep_coarse= {:10}\n\
             \n\
             boxlen      = {:.15E}\n\
             time        = {:.15E}\n\
             aexp        = {:.15E}\n\
             H0          = {:.15E}\n\
             omega_m     = {:.15E}\n\
             omega_l     = {:.15E}\n\
             omega_k     = {:.15E}\n\
             omega_b     = {:.15E}\n\
             unit_l      = {:.15E}\n\
             unit_d      = {:.15E}\n\
             unit_t      = {:.15E}\n",
            self.ncpu(),
            self.ndim,
            1,
            levelmax,
            1000,
            0,
            self.boxlen,
            0.0,
            1.0,
            70.0,
            self.omega_m,
            1.0 - self.omega_m,
            0.0,
            self.omega_b,
            1.0,
            1.0,
            1.0,
        );
        if let Some(ordering) = self.ordering {
            text.push_str(&format!("\nordering type={}\n", ordering.name()));
        }
        text
    }

    /// Write everything under `dir`.
    pub fn write(&self, dir: &Path) -> io::Result<SnapshotPaths> {
        fs::create_dir_all(dir)?;
        let paths = SnapshotPaths::new(dir, self.name.clone());
        fs::write(paths.info(), self.info_text())?;

        for (i, shard) in self.particles.iter().enumerate() {
            shard.write(&self.shard_path(&paths, ShardKind::Particle, i))?;
        }
        let ordering = self.ordering.unwrap_or_default();
        for (i, shard) in self.gas.iter().enumerate() {
            shard.write(
                &self.shard_path(&paths, ShardKind::Amr, i),
                &self.shard_path(&paths, ShardKind::Hydro, i),
                ordering,
            )?;
        }
        Ok(paths)
    }
}
