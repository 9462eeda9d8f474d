//! Global element-wise reduction of the per-rank count tables.

use kernel::{CountTable, Diagnostics, LocalCounts};

use crate::comm::Communicator;
use crate::error::{Result, SnapshotError};

/// Counts summed over every rank. Identical on all ranks after the reduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalCounts {
    /// Elements destined for each rank under the primary search
    pub primary: CountTable,
    /// Baryons destined for each rank, when tracked
    pub baryon: Option<CountTable>,
    /// Summed side tallies
    pub diagnostics: Diagnostics,
}

impl GlobalCounts {
    /// Primary elements `rank` should expect to receive.
    pub fn expected(&self, rank: usize) -> u64 {
        self.primary.get(rank)
    }

    /// Baryons `rank` should expect to receive, when tracked.
    pub fn baryon_expected(&self, rank: usize) -> Option<u64> {
        self.baryon.as_ref().map(|t| t.get(rank))
    }
}

/// Element-wise sum of `local` over the group.
///
/// Every rank sees the same gathered tables, so a length disagreement is
/// reported identically everywhere. Rank 0's length is the reference.
pub fn all_reduce_sum<C: Communicator + ?Sized>(comm: &C, local: &[u64]) -> Result<Vec<u64>> {
    let gathered = comm.all_gather_u64s(local);
    let expected = gathered.first().map(Vec::len).unwrap_or(local.len());
    for (rank, table) in gathered.iter().enumerate() {
        if table.len() != expected {
            return Err(SnapshotError::TableSizeMismatch {
                rank,
                got: table.len(),
                expected,
            });
        }
    }

    let mut sum = vec![0u64; expected];
    for table in &gathered {
        for (acc, v) in sum.iter_mut().zip(table) {
            *acc += v;
        }
    }
    Ok(sum)
}

/// Reduce the primary table, the baryon table and the diagnostics.
pub fn reduce_counts<C: Communicator + ?Sized>(
    comm: &C,
    local: &LocalCounts,
) -> Result<GlobalCounts> {
    let primary = all_reduce_sum(comm, local.primary.as_slice())?;

    // Always reduced, empty when untracked, so every rank joins the same collectives.
    let baryon_local = local.baryon.as_ref().map(CountTable::as_slice).unwrap_or(&[]);
    let baryon = all_reduce_sum(comm, baryon_local)?;

    let diagnostics = all_reduce_sum(comm, &local.diagnostics.to_array())?;
    let diagnostics: [u64; Diagnostics::LEN] =
        diagnostics
            .as_slice()
            .try_into()
            .map_err(|_| SnapshotError::TableSizeMismatch {
                rank: comm.rank(),
                got: diagnostics.len(),
                expected: Diagnostics::LEN,
            })?;

    Ok(GlobalCounts {
        primary: CountTable::from_counts(primary),
        baryon: local.baryon.is_some().then(|| CountTable::from_counts(baryon)),
        diagnostics: Diagnostics::from_array(diagnostics),
    })
}
