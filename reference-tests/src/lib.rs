//! Reference test framework for snapshot domain counting
//!
//! Each reference test writes a synthetic snapshot with a known layout, runs
//! the full distributed counting pass over it and checks the per-rank tables
//! against hand-derived expectations.


pub mod scenarios;

use kernel::{Diagnostics, SearchType};
use orchestrator::synthetic::SnapshotBuilder;
use orchestrator::{run_distributed, run_single_instance, DomainCounts, RunConfig};

/// Expected result criteria for a reference test
#[derive(Debug, Clone, Default)]
pub struct ExpectedResult {
    /// Exact primary count per rank
    pub primary: Option<Vec<u64>>,
    /// Exact baryon count per rank
    pub baryon: Option<Vec<u64>>,
    /// Exact global tallies
    pub diagnostics: Option<DiagnosticsCheck>,
    /// Per-rank counts must add up to a single-rank run over the same snapshot
    pub conservation: bool,
}

/// Tallies to compare against the reduced diagnostics
#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosticsCheck {
    /// Dark matter particles
    pub dark: Option<u64>,
    /// Star particles
    pub star: Option<u64>,
    /// Ghost stars dropped
    pub ghost: Option<u64>,
    /// Gas pseudo-particles
    pub gas: Option<u64>,
}

/// Result of running a reference test
#[derive(Debug)]
pub struct TestResult {
    /// Test name
    pub name: String,
    /// Whether test passed
    pub passed: bool,
    /// Individual check results
    pub checks: Vec<CheckResult>,
    /// Reduced primary table
    pub primary: Vec<u64>,
    /// Reduced baryon table
    pub baryon: Option<Vec<u64>>,
    /// Reduced tallies
    pub diagnostics: Diagnostics,
}

/// Result of an individual validation check
#[derive(Debug)]
pub struct CheckResult {
    /// Check name
    pub name: String,
    /// Whether check passed
    pub passed: bool,
    /// Error message if failed
    pub message: Option<String>,
}

impl CheckResult {
    fn compare<T: PartialEq + std::fmt::Debug>(name: &str, got: T, expected: T) -> Self {
        let passed = got == expected;
        Self {
            name: name.to_string(),
            passed,
            message: (!passed).then(|| format!("got {:?}, expected {:?}", got, expected)),
        }
    }
}

/// A reference test case
pub struct ReferenceTest {
    /// Test name
    pub name: String,
    /// Snapshot to write before counting
    pub snapshot: SnapshotBuilder,
    /// Number of worker ranks
    pub num_ranks: usize,
    /// Search type
    pub search_type: SearchType,
    /// Effective resolution (dark matter mass is `1 / n_eff^3` scaled by the cosmology)
    pub n_eff: u32,
    /// Adjust the remaining run settings
    pub configure: fn(&mut RunConfig),
    /// Expected results to validate
    pub expected: ExpectedResult,
}

impl ReferenceTest {
    /// Run the reference test and return results
    pub fn run(&self) -> Result<TestResult, String> {
        tracing::info!("Running reference test: {}", self.name);

        let dir = tempfile::tempdir().map_err(|e| e.to_string())?;
        let paths = self
            .snapshot
            .write(dir.path())
            .map_err(|e| format!("failed to write snapshot: {}", e))?;
        tracing::info!(
            "Wrote snapshot with {} shard(s) to {}",
            self.snapshot.ncpu(),
            paths.dir().display()
        );

        let mut config = RunConfig::new(
            dir.path(),
            self.snapshot.name(),
            self.num_ranks,
            self.search_type,
            self.n_eff,
        );
        (self.configure)(&mut config);

        let counts = run_distributed(&config).map_err(|e| e.to_string())?;
        let first = counts.first().ok_or("No ranks ran")?;
        let global = &first.global;

        let mut checks = vec![check_agreement(&counts)];

        if let Some(ref primary) = self.expected.primary {
            checks.push(CheckResult::compare(
                "Primary counts",
                global.primary.as_slice(),
                primary.as_slice(),
            ));
        }

        if let Some(ref baryon) = self.expected.baryon {
            checks.push(CheckResult::compare(
                "Baryon counts",
                global.baryon.as_ref().map(|t| t.as_slice().to_vec()),
                Some(baryon.clone()),
            ));
        }

        if let Some(ref diagnostics) = self.expected.diagnostics {
            checks.extend(validate_diagnostics(&global.diagnostics, diagnostics));
        }

        if self.expected.conservation {
            let single = run_single_instance(&config).map_err(|e| e.to_string())?;
            let distributed: u64 = counts.iter().map(|c| c.local_expected).sum();
            checks.push(CheckResult::compare(
                "Conservation",
                distributed,
                single.local_expected,
            ));
        }

        Ok(TestResult {
            name: self.name.clone(),
            passed: checks.iter().all(|c| c.passed),
            checks,
            primary: global.primary.as_slice().to_vec(),
            baryon: global.baryon.as_ref().map(|t| t.as_slice().to_vec()),
            diagnostics: global.diagnostics,
        })
    }
}

/// Every rank must hold the same reduced tables and read its own slot.
fn check_agreement(counts: &[DomainCounts]) -> CheckResult {
    let mut message = None;
    if let Some(first) = counts.first() {
        for c in counts {
            if c.global != first.global {
                message = Some(format!("rank {} reduced different tables", c.rank));
                break;
            }
            if c.local_expected != c.global.expected(c.rank) {
                message = Some(format!("rank {} read the wrong slot", c.rank));
                break;
            }
        }
    }
    CheckResult {
        name: "Rank agreement".to_string(),
        passed: message.is_none(),
        message,
    }
}

fn validate_diagnostics(got: &Diagnostics, expected: &DiagnosticsCheck) -> Vec<CheckResult> {
    [
        ("Dark matter tally", got.dark, expected.dark),
        ("Star tally", got.star, expected.star),
        ("Ghost tally", got.ghost, expected.ghost),
        ("Gas tally", got.gas, expected.gas),
    ]
    .into_iter()
    .filter_map(|(name, got, expected)| expected.map(|e| CheckResult::compare(name, got, e)))
    .collect()
}

impl TestResult {
    /// Print a human-readable summary
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(80));
        println!("Test: {}", self.name);
        println!("{}", "=".repeat(80));
        println!("Status: {}", if self.passed { "PASSED" } else { "FAILED" });
        println!("Primary counts: {:?}", self.primary);
        if let Some(ref baryon) = self.baryon {
            println!("Baryon counts: {:?}", baryon);
        }
        println!("\nTallies:");
        println!("  Dark matter: {}", self.diagnostics.dark);
        println!("  Stars: {}", self.diagnostics.star);
        println!("  Ghosts dropped: {}", self.diagnostics.ghost);
        println!("  Gas cells: {}", self.diagnostics.gas);
        println!("  Out of bounds: {}", self.diagnostics.out_of_bounds);
        println!("\nValidation Checks:");
        for check in &self.checks {
            let status = if check.passed { "PASS" } else { "FAIL" };
            print!("  [{}] {}", status, check.name);
            if let Some(ref msg) = check.message {
                print!(" - {}", msg);
            }
            println!();
        }
        println!("{}", "=".repeat(80));
    }
}
