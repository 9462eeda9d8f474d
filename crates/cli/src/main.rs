//! Snapshot domain counter
//!
//! Loads a JSON run configuration, runs the counting pass on a local group of
//! ranks and prints how many elements each rank will receive.
//!
//! ```text
//! snapcount <config.json> [--json]
//! ```

use orchestrator::{run_distributed, DomainCounts, RunConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn print_table(config: &RunConfig, counts: &[DomainCounts]) {
    let tracks_baryons = config.policy().tracks_baryons();
    println!(
        "snapshot {} ({:?} search, {} ranks)",
        config.snapshot_name, config.search_type, config.num_ranks
    );
    for c in counts {
        let domain = c.assignment.domain(c.rank);
        let (min, max) = domain
            .map(|d| (d.min, d.max))
            .unwrap_or(([0.0; 3], [0.0; 3]));
        print!(
            "rank {:4}  [{:.4}, {:.4}) x [{:.4}, {:.4}) x [{:.4}, {:.4})  {:>12}",
            c.rank, min[0], max[0], min[1], max[1], min[2], max[2], c.local_expected
        );
        if tracks_baryons {
            print!("  baryons {:>12}", c.local_baryon_expected.unwrap_or(0));
        }
        println!();
    }
    if let Some(first) = counts.first() {
        let d = &first.global.diagnostics;
        println!(
            "total {}  (dark {}, star {}, gas {}, ghost {}, out of bounds {}, empty chunks {})",
            first.global.primary.total(),
            d.dark,
            d.star,
            d.gas,
            d.ghost,
            d.out_of_bounds,
            d.empty_chunks
        );
    }
}

fn print_json(counts: &[DomainCounts]) -> Result<(), serde_json::Error> {
    let ranks: Vec<_> = counts
        .iter()
        .map(|c| {
            serde_json::json!({
                "rank": c.rank,
                "expected": c.local_expected,
                "baryons": c.local_baryon_expected,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&ranks)?);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snapcount=info,orchestrator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args
        .next()
        .ok_or("usage: snapcount <config.json> [--json]")?;
    let as_json = args.any(|a| a == "--json");

    let config = RunConfig::load(&config_path)?;
    tracing::info!(
        "Counting snapshot {} in {} on {} ranks",
        config.snapshot_name,
        config.snapshot_dir.display(),
        config.num_ranks
    );

    let counts = run_distributed(&config)?;
    if as_json {
        print_json(&counts)?;
    } else {
        print_table(&config, &counts);
    }
    Ok(())
}
