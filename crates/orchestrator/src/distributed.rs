//! Distributed execution of the counting pass
//!
//! Runs every rank of the group as a thread of this process, each with its
//! own [`LocalComm`](crate::comm::LocalComm) handle. The pipeline itself only
//! talks to the [`Communicator`](crate::comm::Communicator) trait, so a
//! network-backed group can replace the thread-based one without touching it.

use crate::comm::{LocalGroup, SingleProcess};
use crate::config::RunConfig;
use crate::error::Result;
use crate::{count_in_domains, DomainCounts};

/// Run the counting pass on `config.num_ranks` ranks.
///
/// Returns one result per rank, in rank order. If any rank fails, every
/// rank fails and the error of the lowest failing rank is returned.
pub fn run_distributed(config: &RunConfig) -> Result<Vec<DomainCounts>> {
    let n = config.num_ranks;
    tracing::info!("Distributed count: {} ranks", n);

    let results = LocalGroup::run(n, |comm| count_in_domains(&comm, config));
    let counts = results.into_iter().collect::<Result<Vec<_>>>()?;

    for c in &counts {
        tracing::debug!(
            "  Rank {}: {} expected{}",
            c.rank,
            c.local_expected,
            c.local_baryon_expected
                .map(|b| format!(", {} baryons", b))
                .unwrap_or_default()
        );
    }
    Ok(counts)
}

/// Count the whole snapshot on a single rank.
///
/// Reference for validating distributed runs: the single rank owns the
/// whole volume, so its expected count is the global total.
pub fn run_single_instance(config: &RunConfig) -> Result<DomainCounts> {
    let mut single = config.clone();
    single.num_ranks = 1;
    single.nsnapread = None;
    count_in_domains(&SingleProcess, &single)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{ParticleShard, SnapshotBuilder};
    use kernel::SearchType;

    fn snapshot(dir: &std::path::Path) {
        let mut a = ParticleShard::new(3);
        let mut b = ParticleShard::new(3);
        for i in 0..10 {
            let x = (i as f64 + 0.5) / 10.0;
            a.push([x, 0.3, 0.3], 1.0, 0.0);
            b.push([0.3, x, 0.7], 1.0, 0.0);
        }
        SnapshotBuilder::new("00007")
            .particle_shard(a)
            .particle_shard(b)
            .write(dir)
            .unwrap();
    }

    #[test]
    fn test_distributed_preserves_particle_count() {
        let dir = tempfile::tempdir().unwrap();
        snapshot(dir.path());
        let config = RunConfig::new(dir.path(), "00007", 4, SearchType::All, 1);

        let counts = run_distributed(&config).unwrap();
        assert_eq!(counts.len(), 4);
        let total: u64 = counts.iter().map(|c| c.local_expected).sum();
        assert_eq!(total, 20);
        for c in &counts {
            assert_eq!(c.global.primary.total(), 20);
        }
    }

    #[test]
    fn test_single_instance_reference() {
        let dir = tempfile::tempdir().unwrap();
        snapshot(dir.path());
        let config = RunConfig::new(dir.path(), "00007", 6, SearchType::DarkMatter, 1);

        let single = run_single_instance(&config).unwrap();
        assert_eq!(single.local_expected, 20);
        let distributed = run_distributed(&config).unwrap();
        let total: u64 = distributed.iter().map(|c| c.local_expected).sum();
        assert_eq!(total, single.local_expected);
    }
}
