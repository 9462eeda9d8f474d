//! Run configuration parsing and validation

use kernel::{SearchPolicy, SearchType, DEFAULT_MASS_TOLERANCE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::error::{Result, SnapshotError};

/// Main configuration for one counting run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Directory holding the snapshot files
    pub snapshot_dir: PathBuf,
    /// Snapshot number as it appears in file names (e.g. "00080")
    pub snapshot_name: String,
    /// Number of worker ranks
    pub num_ranks: usize,
    /// Which particle types are searched
    pub search_type: SearchType,
    /// Track baryons in a second table (dark matter searches only)
    #[serde(default)]
    pub baryon_search: bool,
    /// Discard zero-age particles whose mass misses the dark matter reference
    #[serde(default)]
    pub ghost_star_filter: bool,
    /// Effective resolution: the run has `n_eff^3` dark matter particles
    pub n_eff: u32,
    /// Number of ranks that read shards (defaults to all)
    pub nsnapread: Option<usize>,
    /// Pad the unit cube by 0.1% per axis
    #[serde(default)]
    pub expand_limits: bool,
    /// Seed for the gas pseudo-particle jitter
    #[serde(default)]
    pub jitter_seed: u64,
    /// What to do with elements that match no domain
    #[serde(default)]
    pub out_of_bounds: OutOfBoundsPolicy,
    /// Relative tolerance for matching the dark matter mass
    #[serde(default = "default_mass_tolerance")]
    pub mass_tolerance: f64,
}

/// Handling of elements whose position matches no domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutOfBoundsPolicy {
    /// Log a warning and keep going
    Tolerate,
    /// Abort the run on every rank
    #[default]
    Reject,
}

fn default_mass_tolerance() -> f64 {
    DEFAULT_MASS_TOLERANCE
}

impl RunConfig {
    /// A configuration with defaults for everything but the essentials.
    pub fn new(
        snapshot_dir: impl Into<PathBuf>,
        snapshot_name: impl Into<String>,
        num_ranks: usize,
        search_type: SearchType,
        n_eff: u32,
    ) -> Self {
        Self {
            snapshot_dir: snapshot_dir.into(),
            snapshot_name: snapshot_name.into(),
            num_ranks,
            search_type,
            baryon_search: false,
            ghost_star_filter: false,
            n_eff,
            nsnapread: None,
            expand_limits: false,
            jitter_seed: 0,
            out_of_bounds: OutOfBoundsPolicy::default(),
            mass_tolerance: default_mass_tolerance(),
        }
    }

    /// Load configuration from a JSON file
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| SnapshotError::io(path, e))?;

        let config: RunConfig = serde_json::from_str(&contents)
            .map_err(|e| SnapshotError::Config(format!("Failed to parse config JSON: {}", e)))?;

        config.validate().map_err(SnapshotError::Config)?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.num_ranks == 0 {
            return Err("num_ranks must be at least 1".to_string());
        }

        if self.n_eff == 0 {
            return Err("n_eff must be positive".to_string());
        }

        if let Some(nsnapread) = self.nsnapread {
            if nsnapread == 0 {
                return Err("nsnapread must be at least 1".to_string());
            }
        }

        if !(self.mass_tolerance > 0.0 && self.mass_tolerance < 1.0) {
            return Err("mass_tolerance must be in range (0, 1)".to_string());
        }

        if self.baryon_search && self.search_type != SearchType::DarkMatter {
            return Err("baryon_search requires search_type DarkMatter".to_string());
        }

        if self.snapshot_name.is_empty() {
            return Err("snapshot_name must not be empty".to_string());
        }

        Ok(())
    }

    /// Search policy derived from the search settings
    pub fn policy(&self) -> SearchPolicy {
        SearchPolicy::new(self.search_type, self.baryon_search)
    }

    /// Number of reading ranks, clamped to the number of ranks
    pub fn readers(&self) -> usize {
        self.nsnapread.unwrap_or(self.num_ranks).clamp(1, self.num_ranks.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> RunConfig {
        RunConfig::new("/data/run", "00080", 4, SearchType::All, 128)
    }

    #[test]
    fn test_defaults_validate() {
        let config = base();
        assert!(config.validate().is_ok());
        assert_eq!(config.readers(), 4);
        assert_eq!(config.out_of_bounds, OutOfBoundsPolicy::Reject);
    }

    #[test]
    fn test_validation_ranks_and_resolution() {
        let mut config = base();
        config.num_ranks = 0;
        assert!(config.validate().is_err());

        config.num_ranks = 2;
        config.n_eff = 0;
        assert!(config.validate().is_err());

        config.n_eff = 64;
        config.nsnapread = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_baryon_search() {
        let mut config = base();
        config.baryon_search = true;
        assert!(config.validate().is_err());

        config.search_type = SearchType::DarkMatter;
        assert!(config.validate().is_ok());
        assert!(config.policy().tracks_baryons());
    }

    #[test]
    fn test_readers_clamped() {
        let mut config = base();
        config.nsnapread = Some(16);
        assert_eq!(config.readers(), 4);
        config.nsnapread = Some(2);
        assert_eq!(config.readers(), 2);
    }

    #[test]
    fn test_parse_json_with_defaults() {
        let json = r#"{
            "snapshot_dir": "/data/run",
            "snapshot_name": "00012",
            "num_ranks": 8,
            "search_type": "DarkMatter",
            "baryon_search": true,
            "n_eff": 256,
            "nsnapread": 2,
            "out_of_bounds": "Tolerate"
        }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.search_type, SearchType::DarkMatter);
        assert_eq!(config.out_of_bounds, OutOfBoundsPolicy::Tolerate);
        assert!(!config.ghost_star_filter);
        assert_eq!(config.mass_tolerance, DEFAULT_MASS_TOLERANCE);
        assert_eq!(config.readers(), 2);
    }

    #[test]
    fn test_load_shipped_config() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../configs/snapshot-00080.json");
        let config = RunConfig::load(path).unwrap();
        assert_eq!(config.num_ranks, 8);
        assert_eq!(config.readers(), 4);
        assert!(config.policy().tracks_baryons());
    }

    #[test]
    fn test_load_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(
            &path,
            r#"{"snapshot_dir": ".", "snapshot_name": "1", "num_ranks": 2,
                "search_type": "Gas", "baryon_search": true, "n_eff": 4}"#,
        )
        .unwrap();
        let err = RunConfig::load(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, SnapshotError::Config(_)));
    }
}
