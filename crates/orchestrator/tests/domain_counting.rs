//! End-to-end counting over synthetic snapshots.
//!
//! Every test writes a small snapshot to a temporary directory and runs the
//! full pipeline on a thread-backed process group.

use kernel::SearchType;
use orchestrator::comm::LocalGroup;
use orchestrator::header::OrderingScheme;
use orchestrator::paths::{ShardKind, SnapshotPaths};
use orchestrator::synthetic::{AmrGrid, AmrShard, ParticleShard, SnapshotBuilder};
use orchestrator::{
    count_in_domains, run_distributed, run_single_instance, OutOfBoundsPolicy, RunConfig,
    SnapshotError,
};

const SNAP: &str = "00080";

fn dm(shard: &mut ParticleShard, x: f64) {
    shard.push([x, 0.5, 0.5], 1.0, 0.0);
}

fn star(shard: &mut ParticleShard, x: f64) {
    shard.push([x, 0.5, 0.5], 0.5, 1.0);
}

/// Two shards, four dark matter particles and two stars split evenly in x.
fn two_shard_snapshot(dir: &std::path::Path) {
    let mut first = ParticleShard::new(3);
    dm(&mut first, 0.1);
    dm(&mut first, 0.2);
    star(&mut first, 0.3);
    let mut second = ParticleShard::new(3);
    dm(&mut second, 0.7);
    dm(&mut second, 0.8);
    star(&mut second, 0.9);
    SnapshotBuilder::new(SNAP)
        .particle_shard(first)
        .particle_shard(second)
        .write(dir)
        .unwrap();
}

/// One grid on the finest of two levels, centred in the box.
fn single_grid_shard() -> AmrShard {
    let mut shard = AmrShard::new(3, 2, 0, 6);
    shard.push(0, 1, AmrGrid::leaf([0.5, 0.5, 0.5]));
    shard
}

/// Fine grids whose cells never straddle an octant boundary of the box.
fn fine_grid_shard() -> AmrShard {
    let mut shard = AmrShard::new(3, 3, 0, 5);
    for cx in [0.25, 0.75] {
        for cy in [0.25, 0.75] {
            shard.push(0, 2, AmrGrid::leaf([cx, cy, 0.25]));
        }
    }
    let mut coarse = AmrGrid::leaf([0.5, 0.5, 0.5]);
    coarse.sons = [3, 3, 3, 3, 0, 0, 0, 0];
    shard.push(0, 0, coarse);
    shard
}

#[test]
fn all_search_counts_every_particle() {
    let dir = tempfile::tempdir().unwrap();
    two_shard_snapshot(dir.path());
    let config = RunConfig::new(dir.path(), SNAP, 2, SearchType::All, 1);

    let counts = run_distributed(&config).unwrap();
    assert_eq!(counts[0].local_expected, 3);
    assert_eq!(counts[1].local_expected, 3);
    assert!(counts[0].local_baryon_expected.is_none());
    assert_eq!(counts[1].global.diagnostics.dark, 4);
    assert_eq!(counts[1].global.diagnostics.star, 2);
}

#[test]
fn dark_matter_search_tracks_baryons_separately() {
    let dir = tempfile::tempdir().unwrap();
    two_shard_snapshot(dir.path());
    let mut config = RunConfig::new(dir.path(), SNAP, 2, SearchType::DarkMatter, 1);
    config.baryon_search = true;

    let counts = run_distributed(&config).unwrap();
    for c in &counts {
        assert_eq!(c.local_expected, 2);
        assert_eq!(c.local_baryon_expected, Some(1));
    }
}

#[test]
fn star_search_ignores_dark_matter() {
    let dir = tempfile::tempdir().unwrap();
    two_shard_snapshot(dir.path());
    let config = RunConfig::new(dir.path(), SNAP, 2, SearchType::Star, 1);

    let counts = run_distributed(&config).unwrap();
    assert_eq!(counts[0].global.primary.as_slice(), &[1, 1]);
}

#[test]
fn every_rank_sees_the_same_tables() {
    let dir = tempfile::tempdir().unwrap();
    two_shard_snapshot(dir.path());
    let config = RunConfig::new(dir.path(), SNAP, 5, SearchType::All, 1);

    let counts = run_distributed(&config).unwrap();
    for c in &counts[1..] {
        assert_eq!(c.global, counts[0].global);
        assert_eq!(c.assignment, counts[0].assignment);
    }
    let total: u64 = counts.iter().map(|c| c.local_expected).sum();
    assert_eq!(total, 6);
}

#[test]
fn fewer_readers_give_the_same_counts() {
    let dir = tempfile::tempdir().unwrap();
    two_shard_snapshot(dir.path());
    let mut config = RunConfig::new(dir.path(), SNAP, 4, SearchType::All, 1);
    let all_read = run_distributed(&config).unwrap();
    config.nsnapread = Some(1);
    let one_reads = run_distributed(&config).unwrap();

    assert_eq!(all_read[0].global, one_reads[0].global);
}

#[test]
fn single_finest_grid_yields_eight_gas_particles() {
    let dir = tempfile::tempdir().unwrap();
    SnapshotBuilder::new(SNAP)
        .gas_shard(single_grid_shard())
        .write(dir.path())
        .unwrap();

    let config = RunConfig::new(dir.path(), SNAP, 8, SearchType::Gas, 1);
    let counts = run_distributed(&config).unwrap();
    for c in &counts {
        assert_eq!(c.local_expected, 1, "rank {}", c.rank);
    }
    assert_eq!(counts[0].global.diagnostics.gas, 8);

    let single = run_single_instance(&config).unwrap();
    assert_eq!(single.local_expected, 8);
}

#[test]
fn ordering_scheme_only_changes_skipped_records() {
    let run = |ordering| {
        let dir = tempfile::tempdir().unwrap();
        let mut part = ParticleShard::new(3);
        dm(&mut part, 0.6);
        star(&mut part, 0.1);
        SnapshotBuilder::new(SNAP)
            .ordering(Some(ordering))
            .particle_shard(part)
            .gas_shard(fine_grid_shard())
            .write(dir.path())
            .unwrap();
        let config = RunConfig::new(dir.path(), SNAP, 8, SearchType::All, 1);
        run_distributed(&config).unwrap()[0].global.clone()
    };

    let hilbert = run(OrderingScheme::Hilbert);
    let bisection = run(OrderingScheme::Bisection);
    assert_eq!(hilbert, bisection);
    // 4 fine grids of 8 cells plus the 4 unrefined coarse slots
    assert_eq!(hilbert.diagnostics.gas, 4 * 8 + 4);
    assert_eq!(hilbert.primary.total(), 4 * 8 + 4 + 2);
}

#[test]
fn jitter_seed_leaves_counts_of_aligned_cells_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    SnapshotBuilder::new(SNAP)
        .gas_shard(fine_grid_shard())
        .gas_shard(single_grid_shard())
        .write(dir.path())
        .unwrap();

    let mut config = RunConfig::new(dir.path(), SNAP, 8, SearchType::Gas, 1);
    let reference = run_distributed(&config).unwrap()[0].global.clone();
    for seed in [1, 42, 0xDEAD_BEEF] {
        config.jitter_seed = seed;
        assert_eq!(run_distributed(&config).unwrap()[0].global, reference);
    }
}

/// Coarse grids whose cells are cut by the faces of a three-slab layout.
fn coarse_grid_shard() -> AmrShard {
    let mut shard = AmrShard::new(3, 1, 0, 2);
    for _ in 0..50 {
        shard.push(0, 0, AmrGrid::leaf([0.5, 0.5, 0.5]));
    }
    shard
}

#[test]
fn straddling_cells_count_the_same_for_any_reader_layout() {
    let dir = tempfile::tempdir().unwrap();
    SnapshotBuilder::new(SNAP)
        .gas_shard(coarse_grid_shard())
        .gas_shard(coarse_grid_shard())
        .write(dir.path())
        .unwrap();

    for seed in [0, 1, 42] {
        let mut config = RunConfig::new(dir.path(), SNAP, 3, SearchType::Gas, 1);
        config.jitter_seed = seed;
        let reference = run_distributed(&config).unwrap()[0].global.clone();
        assert_eq!(reference.primary.total(), 2 * 50 * 8);
        assert_eq!(run_distributed(&config).unwrap()[0].global, reference);
        for readers in [1, 2, 3] {
            config.nsnapread = Some(readers);
            let counts = run_distributed(&config).unwrap();
            for c in &counts {
                assert_eq!(c.global, reference, "seed {seed}, {readers} reader(s)");
            }
        }
    }
}

#[test]
fn missing_ordering_line_uses_default_layout() {
    let dir = tempfile::tempdir().unwrap();
    SnapshotBuilder::new(SNAP)
        .ordering(None)
        .gas_shard(single_grid_shard())
        .write(dir.path())
        .unwrap();

    let config = RunConfig::new(dir.path(), SNAP, 1, SearchType::Gas, 1);
    assert_eq!(run_distributed(&config).unwrap()[0].local_expected, 8);
}

#[test]
fn ghost_filter_drops_zero_age_strays() {
    let dir = tempfile::tempdir().unwrap();
    let mut part = ParticleShard::new(3);
    dm(&mut part, 0.2);
    part.push([0.8, 0.5, 0.5], 0.3, 0.0);
    // exact dark matter mass with zero age is never a ghost
    part.push([0.9, 0.5, 0.5], 1.0, 0.0);
    SnapshotBuilder::new(SNAP)
        .particle_shard(part)
        .write(dir.path())
        .unwrap();

    let mut config = RunConfig::new(dir.path(), SNAP, 2, SearchType::All, 1);
    let unfiltered = run_distributed(&config).unwrap();
    assert_eq!(unfiltered[0].global.primary.as_slice(), &[1, 2]);
    assert_eq!(unfiltered[0].global.diagnostics.star, 1);

    config.ghost_star_filter = true;
    let filtered = run_distributed(&config).unwrap();
    assert_eq!(filtered[0].global.primary.as_slice(), &[1, 1]);
    assert_eq!(filtered[0].global.diagnostics.ghost, 1);
    assert_eq!(filtered[0].global.diagnostics.dark, 2);
}

#[test]
fn out_of_bounds_policy() {
    let dir = tempfile::tempdir().unwrap();
    let mut part = ParticleShard::new(3);
    dm(&mut part, 0.2);
    dm(&mut part, 1.0005);
    SnapshotBuilder::new(SNAP)
        .particle_shard(part)
        .write(dir.path())
        .unwrap();

    let mut config = RunConfig::new(dir.path(), SNAP, 2, SearchType::All, 1);
    let per_rank = LocalGroup::run(2, |comm| count_in_domains(&comm, &config));
    for r in per_rank {
        assert!(matches!(r, Err(SnapshotError::OutOfBounds { count: 1 })));
    }

    config.out_of_bounds = OutOfBoundsPolicy::Tolerate;
    let counts = run_distributed(&config).unwrap();
    assert_eq!(counts[0].global.primary.total(), 1);
    assert_eq!(counts[0].global.diagnostics.out_of_bounds, 1);

    config.out_of_bounds = OutOfBoundsPolicy::Reject;
    config.expand_limits = true;
    let counts = run_distributed(&config).unwrap();
    assert_eq!(counts[0].global.primary.total(), 2);
}

#[test]
fn missing_info_file_fails_on_every_rank() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::new(dir.path(), SNAP, 3, SearchType::All, 1);

    let per_rank = LocalGroup::run(3, |comm| count_in_domains(&comm, &config));
    for r in per_rank {
        assert!(matches!(r, Err(SnapshotError::Io { .. })));
    }
    assert!(run_distributed(&config).is_err());
}

#[test]
fn missing_shard_stops_the_whole_group() {
    let dir = tempfile::tempdir().unwrap();
    two_shard_snapshot(dir.path());
    let paths = SnapshotPaths::new(dir.path(), SNAP);
    std::fs::remove_file(paths.numbered(ShardKind::Particle, 1)).unwrap();

    let config = RunConfig::new(dir.path(), SNAP, 2, SearchType::All, 1);
    let per_rank = LocalGroup::run(2, |comm| count_in_domains(&comm, &config));
    assert!(matches!(per_rank[0], Err(SnapshotError::PeerFailed { failed: 1 })));
    assert!(matches!(per_rank[1], Err(SnapshotError::MissingShard { .. })));
}

#[test]
fn corrupt_shard_stops_the_whole_group() {
    let dir = tempfile::tempdir().unwrap();
    two_shard_snapshot(dir.path());
    let paths = SnapshotPaths::new(dir.path(), SNAP);
    let shard = paths.numbered(ShardKind::Particle, 0);
    let mut bytes = std::fs::read(&shard).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x7f;
    std::fs::write(&shard, bytes).unwrap();

    let config = RunConfig::new(dir.path(), SNAP, 2, SearchType::All, 1);
    let per_rank = LocalGroup::run(2, |comm| count_in_domains(&comm, &config));
    assert!(matches!(per_rank[0], Err(SnapshotError::RecordMarker { .. })));
    assert!(matches!(per_rank[1], Err(SnapshotError::PeerFailed { failed: 1 })));
}

#[test]
fn single_file_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let mut part = ParticleShard::new(3);
    dm(&mut part, 0.25);
    dm(&mut part, 0.75);
    SnapshotBuilder::new(SNAP)
        .single_file()
        .particle_shard(part)
        .gas_shard(single_grid_shard())
        .write(dir.path())
        .unwrap();

    let config = RunConfig::new(dir.path(), SNAP, 2, SearchType::All, 1);
    let counts = run_distributed(&config).unwrap();
    assert_eq!(counts[0].local_expected, 1 + 4);
    assert_eq!(counts[1].local_expected, 1 + 4);
}

#[test]
fn boundary_regions_are_scanned() {
    let dir = tempfile::tempdir().unwrap();
    let mut shard = AmrShard::new(3, 2, 2, 6);
    shard.push(0, 1, AmrGrid::leaf([0.5, 0.5, 0.5]));
    shard.push(2, 0, AmrGrid::leaf([0.5, 0.5, 0.5]));
    SnapshotBuilder::new(SNAP)
        .gas_shard(shard)
        .write(dir.path())
        .unwrap();

    let config = RunConfig::new(dir.path(), SNAP, 1, SearchType::Gas, 1);
    let counts = run_distributed(&config).unwrap();
    assert_eq!(counts[0].local_expected, 16);
    assert_eq!(counts[0].global.diagnostics.empty_chunks, 4);
}

#[test]
fn mismatched_group_size_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    two_shard_snapshot(dir.path());
    let config = RunConfig::new(dir.path(), SNAP, 4, SearchType::All, 1);
    let per_rank = LocalGroup::run(2, |comm| count_in_domains(&comm, &config));
    for r in per_rank {
        assert!(matches!(r, Err(SnapshotError::Config(_))));
    }
}
