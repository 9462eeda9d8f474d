//! File naming for snapshot shards.

use std::path::{Path, PathBuf};

use crate::error::{Result, SnapshotError};

/// Kinds of shard files making up a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardKind {
    /// Particle positions, velocities, masses, ids, levels, ages
    Particle,
    /// Octree structure
    Amr,
    /// Per-cell hydro variables
    Hydro,
}

impl ShardKind {
    /// File name prefix.
    pub fn prefix(self) -> &'static str {
        match self {
            ShardKind::Particle => "part",
            ShardKind::Amr => "amr",
            ShardKind::Hydro => "hydro",
        }
    }
}

/// Locates the files of one snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotPaths {
    dir: PathBuf,
    name: String,
}

impl SnapshotPaths {
    /// Snapshot `name` (e.g. `"00080"`) stored under `dir`.
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
        }
    }

    /// Directory holding the snapshot.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `info_<name>.txt`
    pub fn info(&self) -> PathBuf {
        self.dir.join(format!("info_{}.txt", self.name))
    }

    /// Multi-file name for the zero-based shard `index`: `<kind>_<name>.outNNNNN`.
    pub fn numbered(&self, kind: ShardKind, index: usize) -> PathBuf {
        self.dir
            .join(format!("{}_{}.out{:05}", kind.prefix(), self.name, index + 1))
    }

    /// Single-file name: `<kind>_<name>.out`.
    pub fn single(&self, kind: ShardKind) -> PathBuf {
        self.dir.join(format!("{}_{}.out", kind.prefix(), self.name))
    }

    /// Resolve shard `index`, preferring the numbered name.
    pub fn shard(&self, kind: ShardKind, index: usize) -> Result<PathBuf> {
        let numbered = self.numbered(kind, index);
        if numbered.is_file() {
            return Ok(numbered);
        }
        let single = self.single(kind);
        if single.is_file() {
            return Ok(single);
        }
        Err(SnapshotError::MissingShard { numbered, single })
    }
}
