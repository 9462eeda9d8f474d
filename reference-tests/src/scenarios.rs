//! Reference scenarios with hand-derived per-rank counts.

use kernel::SearchType;
use orchestrator::header::OrderingScheme;
use orchestrator::synthetic::{AmrGrid, AmrShard, ParticleShard, SnapshotBuilder};
use orchestrator::RunConfig;

use crate::{DiagnosticsCheck, ExpectedResult, ReferenceTest};

const SNAP: &str = "00080";

/// Dark matter mass for the default builder cosmology with `n_eff = 1`.
const DM_MASS: f64 = 1.0;
const STAR_MASS: f64 = 0.5;

fn keep_defaults(_: &mut RunConfig) {}

/// Four dark matter particles and two stars over two shards, split evenly in x.
fn two_shard_snapshot() -> SnapshotBuilder {
    let mut first = ParticleShard::new(3);
    first
        .push([0.1, 0.5, 0.5], DM_MASS, 0.0)
        .push([0.2, 0.5, 0.5], DM_MASS, 0.0)
        .push([0.3, 0.5, 0.5], STAR_MASS, 1.0);
    let mut second = ParticleShard::new(3);
    second
        .push([0.7, 0.5, 0.5], DM_MASS, 0.0)
        .push([0.8, 0.5, 0.5], DM_MASS, 0.0)
        .push([0.9, 0.5, 0.5], STAR_MASS, 1.0);
    SnapshotBuilder::new(SNAP)
        .particle_shard(first)
        .particle_shard(second)
}

/// Two-shard snapshot, every type counted
pub fn two_shard_all_test() -> ReferenceTest {
    ReferenceTest {
        name: "Two-Shard All Search".to_string(),
        snapshot: two_shard_snapshot(),
        num_ranks: 2,
        search_type: SearchType::All,
        n_eff: 1,
        configure: keep_defaults,
        expected: ExpectedResult {
            primary: Some(vec![3, 3]),
            diagnostics: Some(DiagnosticsCheck {
                dark: Some(4),
                star: Some(2),
                ghost: Some(0),
                gas: Some(0),
            }),
            conservation: true,
            ..Default::default()
        },
    }
}

/// Two-shard snapshot, dark matter primary with baryons tracked aside
pub fn dark_matter_with_baryons_test() -> ReferenceTest {
    ReferenceTest {
        name: "Dark Matter With Baryons".to_string(),
        snapshot: two_shard_snapshot(),
        num_ranks: 2,
        search_type: SearchType::DarkMatter,
        n_eff: 1,
        configure: |c| c.baryon_search = true,
        expected: ExpectedResult {
            primary: Some(vec![2, 2]),
            baryon: Some(vec![1, 1]),
            ..Default::default()
        },
    }
}

/// One finest-level grid centred in the box: one gas cell per octant
pub fn single_finest_grid_test() -> ReferenceTest {
    let mut shard = AmrShard::new(3, 2, 0, 6);
    shard.push(0, 1, AmrGrid::leaf([0.5, 0.5, 0.5]));
    ReferenceTest {
        name: "Single Finest Grid".to_string(),
        snapshot: SnapshotBuilder::new(SNAP).gas_shard(shard),
        num_ranks: 8,
        search_type: SearchType::Gas,
        n_eff: 1,
        configure: keep_defaults,
        expected: ExpectedResult {
            primary: Some(vec![1; 8]),
            diagnostics: Some(DiagnosticsCheck {
                gas: Some(8),
                ..Default::default()
            }),
            conservation: true,
            ..Default::default()
        },
    }
}

/// Zero-age particles off the dark matter mass are dropped as ghosts
pub fn ghost_star_filter_test() -> ReferenceTest {
    let mut shard = ParticleShard::new(3);
    shard
        .push([0.25, 0.5, 0.5], DM_MASS, 0.0)
        .push([0.75, 0.5, 0.5], DM_MASS, 0.0)
        .push([0.3, 0.5, 0.5], 0.2, 0.0)
        .push([0.6, 0.5, 0.5], STAR_MASS, 2.0);
    ReferenceTest {
        name: "Ghost Star Filter".to_string(),
        snapshot: SnapshotBuilder::new(SNAP).particle_shard(shard),
        num_ranks: 2,
        search_type: SearchType::All,
        n_eff: 1,
        configure: |c| c.ghost_star_filter = true,
        expected: ExpectedResult {
            primary: Some(vec![1, 2]),
            diagnostics: Some(DiagnosticsCheck {
                dark: Some(2),
                star: Some(1),
                ghost: Some(1),
                gas: None,
            }),
            ..Default::default()
        },
    }
}

/// Particles and refined gas over several shards with a bisection layout,
/// read by fewer ranks than there are workers
pub fn mixed_snapshot_test() -> ReferenceTest {
    let mut builder = SnapshotBuilder::new(SNAP)
        .ordering(Some(OrderingScheme::Bisection))
        .cosmology(0.3, 0.05);
    // n_eff = 2 with this cosmology
    let dm_mass = 1.0 / 8.0 * 0.25 / 0.3;

    for shard_index in 0..3 {
        let mut part = ParticleShard::new(3);
        for i in 0..4 {
            let x = (shard_index * 4 + i) as f64 / 12.0 + 1.0 / 24.0;
            part.push([x, 0.25, 0.25], dm_mass, 0.0);
            part.push([x, 0.75, 0.75], STAR_MASS * dm_mass, 0.5);
        }
        builder = builder.particle_shard(part);

        let mut gas = AmrShard::new(3, 2, 0, 5);
        let mut coarse = AmrGrid::leaf([0.5, 0.5, 0.5]);
        coarse.sons = [1, 0, 0, 0, 0, 0, 0, 0];
        gas.push(0, 0, coarse);
        gas.push(0, 1, AmrGrid::leaf([0.25, 0.25, 0.25]));
        builder = builder.gas_shard(gas);
    }

    ReferenceTest {
        name: "Mixed Snapshot".to_string(),
        snapshot: builder,
        num_ranks: 6,
        search_type: SearchType::All,
        n_eff: 2,
        configure: |c| c.nsnapread = Some(2),
        expected: ExpectedResult {
            diagnostics: Some(DiagnosticsCheck {
                dark: Some(12),
                star: Some(12),
                ghost: Some(0),
                gas: Some(3 * (7 + 8)),
            }),
            conservation: true,
            ..Default::default()
        },
    }
}

/// Every reference scenario
pub fn all_tests() -> Vec<ReferenceTest> {
    vec![
        two_shard_all_test(),
        dark_matter_with_baryons_test(),
        single_finest_grid_test(),
        ghost_star_filter_test(),
        mixed_snapshot_test(),
    ]
}
