//! Assignment of shard files to reading ranks.
//!
//! Every rank computes the same assignment from `(nprocs, nsnapread,
//! nfiles)` alone, so no coordination is needed before file I/O starts.

/// Which ranks read, and which files each reader owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadTasks {
    nprocs: usize,
    /// Reader index for each rank, `None` for ranks that do not read
    reader_of: Vec<Option<usize>>,
    /// Rank of each reader
    reader_ranks: Vec<usize>,
}

impl ReadTasks {
    /// Spread `nsnapread` readers evenly over `nprocs` ranks.
    ///
    /// `nsnapread` is clamped into `[1, nprocs]`.
    pub fn distribute(nprocs: usize, nsnapread: usize) -> Self {
        let nprocs = nprocs.max(1);
        let nreaders = nsnapread.clamp(1, nprocs);
        let spacing = nprocs / nreaders;
        let mut reader_of = vec![None; nprocs];
        let mut reader_ranks = Vec::with_capacity(nreaders);
        for k in 0..nreaders {
            let rank = k * spacing;
            reader_of[rank] = Some(k);
            reader_ranks.push(rank);
        }
        Self {
            nprocs,
            reader_of,
            reader_ranks,
        }
    }

    /// Number of ranks in the group.
    pub fn nprocs(&self) -> usize {
        self.nprocs
    }

    /// Number of reading ranks.
    pub fn nreaders(&self) -> usize {
        self.reader_ranks.len()
    }

    /// Ranks that read, in reader order.
    pub fn reader_ranks(&self) -> &[usize] {
        &self.reader_ranks
    }

    /// Reader index of `rank`, if it reads.
    pub fn reader_index(&self, rank: usize) -> Option<usize> {
        self.reader_of.get(rank).copied().flatten()
    }

    /// Zero-based file indices owned by `rank`.
    ///
    /// Reader `k` owns a contiguous block of `nfiles / nreaders` files; the
    /// last reader also takes the remainder.
    pub fn files_for(&self, rank: usize, nfiles: usize) -> Vec<usize> {
        let Some(k) = self.reader_index(rank) else {
            return Vec::new();
        };
        let nreaders = self.nreaders();
        let per_reader = nfiles / nreaders;
        let start = k * per_reader;
        let end = if k + 1 == nreaders {
            nfiles
        } else {
            start + per_reader
        };
        (start..end).collect()
    }
}
