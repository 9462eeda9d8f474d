//! Per-worker count tables and the search policy that fills them.

use crate::particle::{ElementRecord, ParticleType};
use crate::DomainLookup;

/// Which particle types the downstream search is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SearchType {
    /// Dark matter, stars and gas
    All,
    /// Dark matter only (baryons optionally tracked separately)
    DarkMatter,
    /// Star particles only
    Star,
    /// Gas pseudo-particles only
    Gas,
}

impl SearchType {
    /// Whether particle shards have to be scanned.
    pub fn scans_particles(self) -> bool {
        !matches!(self, SearchType::Gas)
    }

    /// Whether AMR and hydro shards have to be scanned.
    pub fn scans_gas(self) -> bool {
        matches!(self, SearchType::All | SearchType::Gas)
    }
}

/// Which table, if any, an element is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Counts toward the primary search table
    Primary,
    /// Counts toward the secondary baryon table
    Baryon,
    /// Not counted
    Skip,
}

/// Search type plus the optional secondary baryon search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchPolicy {
    /// Primary search target
    pub search: SearchType,
    /// Track non-dark-matter elements in a separate table (dark matter searches only)
    pub baryon_search: bool,
}

impl SearchPolicy {
    /// Create a policy.
    pub fn new(search: SearchType, baryon_search: bool) -> Self {
        Self {
            search,
            baryon_search,
        }
    }

    /// Whether a baryon table is maintained at all.
    pub fn tracks_baryons(&self) -> bool {
        self.baryon_search && self.search == SearchType::DarkMatter
    }

    /// Decide where an element of the given type is counted.
    pub fn route(&self, kind: ParticleType) -> Route {
        if kind == ParticleType::GhostStar {
            return Route::Skip;
        }
        match self.search {
            SearchType::All => Route::Primary,
            SearchType::DarkMatter => {
                if kind == ParticleType::DarkMatter {
                    Route::Primary
                } else if self.baryon_search {
                    Route::Baryon
                } else {
                    Route::Skip
                }
            }
            SearchType::Star if kind == ParticleType::Star => Route::Primary,
            SearchType::Gas if kind == ParticleType::Gas => Route::Primary,
            SearchType::Star | SearchType::Gas => Route::Skip,
        }
    }
}

/// Number of elements destined for each worker rank.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CountTable {
    counts: Vec<u64>,
}

impl CountTable {
    /// A zeroed table for `num_ranks` workers.
    pub fn new(num_ranks: usize) -> Self {
        Self {
            counts: vec![0; num_ranks],
        }
    }

    /// Wrap existing counts.
    pub fn from_counts(counts: Vec<u64>) -> Self {
        Self { counts }
    }

    /// Number of rank slots.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether the table has no slots.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Increment the slot for `rank`.
    #[inline]
    pub fn increment(&mut self, rank: usize) {
        self.counts[rank] += 1;
    }

    /// Count for `rank` (zero when the slot does not exist).
    pub fn get(&self, rank: usize) -> u64 {
        self.counts.get(rank).copied().unwrap_or(0)
    }

    /// Sum over all slots.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Raw slot values.
    pub fn as_slice(&self) -> &[u64] {
        &self.counts
    }
}

/// Tallies that never feed a worker's total but are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Diagnostics {
    /// Dark matter particles classified
    pub dark: u64,
    /// Star particles classified
    pub star: u64,
    /// Ghost stars discarded
    pub ghost: u64,
    /// Gas pseudo-particles synthesized
    pub gas: u64,
    /// Counted elements that matched no domain
    pub out_of_bounds: u64,
    /// Zero-length AMR chunks encountered
    pub empty_chunks: u64,
}

impl Diagnostics {
    /// Number of fields in [`Diagnostics::to_array`].
    pub const LEN: usize = 6;

    /// Flatten for element-wise reduction.
    pub fn to_array(&self) -> [u64; Self::LEN] {
        [
            self.dark,
            self.star,
            self.ghost,
            self.gas,
            self.out_of_bounds,
            self.empty_chunks,
        ]
    }

    /// Inverse of [`Diagnostics::to_array`].
    pub fn from_array(v: [u64; Self::LEN]) -> Self {
        Self {
            dark: v[0],
            star: v[1],
            ghost: v[2],
            gas: v[3],
            out_of_bounds: v[4],
            empty_chunks: v[5],
        }
    }

    fn tally(&mut self, kind: ParticleType) {
        match kind {
            ParticleType::DarkMatter => self.dark += 1,
            ParticleType::Star => self.star += 1,
            ParticleType::Gas => self.gas += 1,
            ParticleType::GhostStar => self.ghost += 1,
        }
    }
}

/// Counts accumulated by one process while scanning its shards.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalCounts {
    policy: SearchPolicy,
    /// Primary search table
    pub primary: CountTable,
    /// Baryon table, present only when the policy tracks baryons
    pub baryon: Option<CountTable>,
    /// Side tallies
    pub diagnostics: Diagnostics,
}

impl LocalCounts {
    /// Empty counts for `num_ranks` workers.
    pub fn new(num_ranks: usize, policy: SearchPolicy) -> Self {
        Self {
            policy,
            primary: CountTable::new(num_ranks),
            baryon: policy.tracks_baryons().then(|| CountTable::new(num_ranks)),
            diagnostics: Diagnostics::default(),
        }
    }

    /// The policy these counts follow.
    pub fn policy(&self) -> SearchPolicy {
        self.policy
    }

    /// Classify-and-count one element.
    ///
    /// Returns the rank the element was counted for, or `None` when it was
    /// skipped by the policy or matched no domain.
    pub fn record<L: DomainLookup + ?Sized>(
        &mut self,
        element: &ElementRecord,
        lookup: &L,
    ) -> Option<usize> {
        self.diagnostics.tally(element.kind);
        let table = match self.policy.route(element.kind) {
            Route::Skip => return None,
            Route::Primary => &mut self.primary,
            Route::Baryon => self.baryon.as_mut()?,
        };
        let Some(rank) = lookup.locate(element.position) else {
            self.diagnostics.out_of_bounds += 1;
            return None;
        };
        table.increment(rank);
        Some(rank)
    }

    /// Note a zero-length AMR chunk.
    pub fn note_empty_chunk(&mut self) {
        self.diagnostics.empty_chunks += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two slabs split at x = 0.5, nothing outside [0, 1].
    struct HalfSplit;

    impl DomainLookup for HalfSplit {
        fn num_domains(&self) -> usize {
            2
        }

        fn locate(&self, p: [f64; 3]) -> Option<usize> {
            if !(0.0..=1.0).contains(&p[0]) {
                None
            } else if p[0] < 0.5 {
                Some(0)
            } else {
                Some(1)
            }
        }
    }

    fn dm(x: f64) -> ElementRecord {
        ElementRecord::particle([x, 0.5, 0.5], ParticleType::DarkMatter)
    }

    fn star(x: f64) -> ElementRecord {
        ElementRecord::particle([x, 0.5, 0.5], ParticleType::Star)
    }

    #[test]
    fn test_route_table() {
        let all = SearchPolicy::new(SearchType::All, false);
        assert_eq!(all.route(ParticleType::DarkMatter), Route::Primary);
        assert_eq!(all.route(ParticleType::Gas), Route::Primary);
        assert_eq!(all.route(ParticleType::GhostStar), Route::Skip);

        let dark = SearchPolicy::new(SearchType::DarkMatter, true);
        assert_eq!(dark.route(ParticleType::DarkMatter), Route::Primary);
        assert_eq!(dark.route(ParticleType::Star), Route::Baryon);
        let dark_only = SearchPolicy::new(SearchType::DarkMatter, false);
        assert_eq!(dark_only.route(ParticleType::Star), Route::Skip);

        let stars = SearchPolicy::new(SearchType::Star, true);
        assert_eq!(stars.route(ParticleType::Star), Route::Primary);
        assert_eq!(stars.route(ParticleType::DarkMatter), Route::Skip);
        assert!(!stars.tracks_baryons());

        let gas = SearchPolicy::new(SearchType::Gas, false);
        assert_eq!(gas.route(ParticleType::Gas), Route::Primary);
        assert_eq!(gas.route(ParticleType::Star), Route::Skip);
    }

    #[test]
    fn test_all_search_counts_everything() {
        let mut c = LocalCounts::new(2, SearchPolicy::new(SearchType::All, false));
        for x in [0.1, 0.2, 0.7, 0.8] {
            c.record(&dm(x), &HalfSplit);
        }
        c.record(&star(0.3), &HalfSplit);
        c.record(&star(0.9), &HalfSplit);
        assert_eq!(c.primary.as_slice(), &[3, 3]);
        assert!(c.baryon.is_none());
        assert_eq!(c.diagnostics.dark, 4);
        assert_eq!(c.diagnostics.star, 2);
    }

    #[test]
    fn test_dark_search_with_baryons() {
        let mut c = LocalCounts::new(2, SearchPolicy::new(SearchType::DarkMatter, true));
        for x in [0.1, 0.2, 0.7, 0.8] {
            c.record(&dm(x), &HalfSplit);
        }
        c.record(&star(0.3), &HalfSplit);
        c.record(&star(0.9), &HalfSplit);
        assert_eq!(c.primary.as_slice(), &[2, 2]);
        assert_eq!(c.baryon.as_ref().unwrap().as_slice(), &[1, 1]);
    }

    #[test]
    fn test_out_of_bounds_is_not_counted() {
        let mut c = LocalCounts::new(2, SearchPolicy::new(SearchType::All, false));
        assert_eq!(c.record(&dm(1.5), &HalfSplit), None);
        assert_eq!(c.primary.total(), 0);
        assert_eq!(c.diagnostics.out_of_bounds, 1);
    }

    #[test]
    fn test_ghosts_are_tallied_only() {
        let mut c = LocalCounts::new(2, SearchPolicy::new(SearchType::All, false));
        let ghost = ElementRecord::particle([5.0, 5.0, 5.0], ParticleType::GhostStar);
        assert_eq!(c.record(&ghost, &HalfSplit), None);
        assert_eq!(c.diagnostics.ghost, 1);
        assert_eq!(c.diagnostics.out_of_bounds, 0);
    }

    #[test]
    fn test_diagnostics_array_roundtrip() {
        let d = Diagnostics {
            dark: 1,
            star: 2,
            ghost: 3,
            gas: 4,
            out_of_bounds: 5,
            empty_chunks: 6,
        };
        assert_eq!(Diagnostics::from_array(d.to_array()), d);
    }

    #[test]
    fn test_count_table_get_past_end() {
        let t = CountTable::from_counts(vec![4, 5]);
        assert_eq!(t.get(1), 5);
        assert_eq!(t.get(7), 0);
        assert_eq!(t.total(), 9);
    }
}
