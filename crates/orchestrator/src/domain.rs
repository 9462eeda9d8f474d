//! Domain extent and the static decomposition of the bounding cube.

use kernel::DomainLookup;

use crate::error::{Result, SnapshotError};

/// Fractional padding applied per axis when limits are expanded.
pub const EXPAND_FRACTION: f64 = 0.001;

/// Axis-aligned box in code units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingVolume {
    /// Minimum corner [x, y, z]
    pub min: [f64; 3],
    /// Maximum corner [x, y, z]
    pub max: [f64; 3],
}

impl BoundingVolume {
    /// Create a box from its corners.
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// The unit cube `[0, 1]^3`, where comoving code coordinates live.
    pub fn unit_cube() -> Self {
        Self::new([0.0; 3], [1.0; 3])
    }

    /// Pad every axis by `fraction` of its extent on both sides.
    pub fn expanded(&self, fraction: f64) -> Self {
        let mut out = *self;
        for axis in 0..3 {
            let dx = fraction * self.extent(axis);
            out.min[axis] -= dx;
            out.max[axis] += dx;
        }
        out
    }

    /// Length along `axis`.
    #[inline]
    pub fn extent(&self, axis: usize) -> f64 {
        self.max[axis] - self.min[axis]
    }

    /// Volume of the box.
    pub fn volume(&self) -> f64 {
        self.extent(0) * self.extent(1) * self.extent(2)
    }

    /// Volume shared with `other` (zero when disjoint).
    pub fn overlap(&self, other: &BoundingVolume) -> f64 {
        (0..3)
            .map(|axis| {
                let lo = self.min[axis].max(other.min[axis]);
                let hi = self.max[axis].min(other.max[axis]);
                (hi - lo).max(0.0)
            })
            .product()
    }

    /// Flatten as `[xmin, xmax, ymin, ymax, zmin, zmax]` for broadcasting.
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.min[0], self.max[0], self.min[1], self.max[1], self.min[2], self.max[2],
        ]
    }

    /// Inverse of [`BoundingVolume::to_array`].
    pub fn from_array(v: [f64; 6]) -> Self {
        Self::new([v[0], v[2], v[4]], [v[1], v[3], v[5]])
    }
}

/// Resolve the global bounding volume of a snapshot.
///
/// Code coordinates are defined on the unit cube, so no data needs to be
/// read; `expand` pads the cube so particles sitting exactly on a face stay
/// inside.
pub fn resolve_extent(expand: bool) -> BoundingVolume {
    let cube = BoundingVolume::unit_cube();
    if expand {
        cube.expanded(EXPAND_FRACTION)
    } else {
        cube
    }
}

/// Per-rank sub-volumes partitioning a bounding volume.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainAssignment {
    bounds: BoundingVolume,
    divisions: [usize; 3],
    domains: Vec<BoundingVolume>,
}

impl DomainAssignment {
    /// The enclosing volume.
    pub fn bounds(&self) -> &BoundingVolume {
        &self.bounds
    }

    /// Number of slabs along each axis.
    pub fn divisions(&self) -> [usize; 3] {
        self.divisions
    }

    /// Sub-volume of `rank`.
    pub fn domain(&self, rank: usize) -> Option<&BoundingVolume> {
        self.domains.get(rank)
    }

    /// All sub-volumes, indexed by rank.
    pub fn domains(&self) -> &[BoundingVolume] {
        &self.domains
    }

    /// Number of ranks.
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    /// Whether there are no domains.
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Slab index along `axis`, treating the outer upper face as inside.
    fn slab(&self, axis: usize, x: f64) -> Option<usize> {
        let lo = self.bounds.min[axis];
        let hi = self.bounds.max[axis];
        if !(lo..=hi).contains(&x) {
            return None;
        }
        let n = self.divisions[axis];
        let edges = |i: usize| lo + (hi - lo) * i as f64 / n as f64;
        // Same edge arithmetic as the domain boxes, so the answer agrees with
        // a point-in-box test on `domains`.
        let guess = (((x - lo) / (hi - lo)) * n as f64).floor() as usize;
        let mut i = guess.min(n - 1);
        while i > 0 && x < edges(i) {
            i -= 1;
        }
        while i + 1 < n && x >= edges(i + 1) {
            i += 1;
        }
        Some(i)
    }
}

impl DomainLookup for DomainAssignment {
    fn num_domains(&self) -> usize {
        self.domains.len()
    }

    fn locate(&self, point: [f64; 3]) -> Option<usize> {
        let ix = self.slab(0, point[0])?;
        let iy = self.slab(1, point[1])?;
        let iz = self.slab(2, point[2])?;
        Some(ix + self.divisions[0] * (iy + self.divisions[1] * iz))
    }
}

/// Prime factors of `n`, largest first.
fn prime_factors(mut n: usize) -> Vec<usize> {
    let mut factors = Vec::new();
    let mut p = 2;
    while p * p <= n {
        while n % p == 0 {
            factors.push(p);
            n /= p;
        }
        p += 1;
    }
    if n > 1 {
        factors.push(n);
    }
    factors.reverse();
    factors
}

/// Split `bounds` into `n` axis-aligned boxes, one per rank.
///
/// Each prime factor of `n` (largest first) goes to the axis with the fewest
/// divisions so far, lowest axis on ties, and every axis is then cut into
/// equal slabs. Ranks enumerate boxes x-fastest. The result depends only on
/// `bounds` and `n`, so every process computes the same assignment.
pub fn decompose_domain(bounds: &BoundingVolume, n: usize) -> Result<DomainAssignment> {
    if n == 0 {
        return Err(SnapshotError::Config(
            "cannot decompose the domain over zero ranks".to_string(),
        ));
    }

    let mut divisions = [1usize; 3];
    for factor in prime_factors(n) {
        let axis = (0..3)
            .min_by_key(|&a| divisions[a])
            .unwrap_or(0);
        divisions[axis] *= factor;
    }

    let edge = |axis: usize, i: usize| {
        bounds.min[axis] + bounds.extent(axis) * i as f64 / divisions[axis] as f64
    };

    let mut domains = Vec::with_capacity(n);
    for iz in 0..divisions[2] {
        for iy in 0..divisions[1] {
            for ix in 0..divisions[0] {
                domains.push(BoundingVolume::new(
                    [edge(0, ix), edge(1, iy), edge(2, iz)],
                    [edge(0, ix + 1), edge(1, iy + 1), edge(2, iz + 1)],
                ));
            }
        }
    }

    tracing::debug!(
        "Decomposed domain into {}x{}x{} = {} boxes",
        divisions[0],
        divisions[1],
        divisions[2],
        n
    );

    Ok(DomainAssignment {
        bounds: *bounds,
        divisions,
        domains,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_cube_and_expansion() {
        let cube = resolve_extent(false);
        assert_eq!(cube, BoundingVolume::unit_cube());
        let padded = resolve_extent(true);
        assert!((padded.min[0] + 0.001).abs() < 1e-15);
        assert!((padded.max[2] - 1.001).abs() < 1e-15);
    }

    #[test]
    fn test_array_roundtrip() {
        let b = BoundingVolume::new([0.1, 0.2, 0.3], [0.4, 0.5, 0.6]);
        assert_eq!(BoundingVolume::from_array(b.to_array()), b);
    }

    #[test]
    fn test_prime_factors() {
        assert_eq!(prime_factors(1), Vec::<usize>::new());
        assert_eq!(prime_factors(12), vec![3, 2, 2]);
        assert_eq!(prime_factors(97), vec![97]);
    }

    #[test]
    fn test_divisions() {
        let cube = BoundingVolume::unit_cube();
        assert_eq!(decompose_domain(&cube, 1).unwrap().divisions(), [1, 1, 1]);
        assert_eq!(decompose_domain(&cube, 2).unwrap().divisions(), [2, 1, 1]);
        assert_eq!(decompose_domain(&cube, 8).unwrap().divisions(), [2, 2, 2]);
        assert_eq!(decompose_domain(&cube, 12).unwrap().divisions(), [3, 2, 2]);
        assert_eq!(decompose_domain(&cube, 7).unwrap().divisions(), [7, 1, 1]);
    }

    #[test]
    fn test_zero_ranks_rejected() {
        assert!(decompose_domain(&BoundingVolume::unit_cube(), 0).is_err());
    }

    #[test]
    fn domains_partition_the_volume() {
        let bounds = BoundingVolume::unit_cube().expanded(EXPAND_FRACTION);
        for n in 1..=30 {
            let a = decompose_domain(&bounds, n).unwrap();
            assert_eq!(a.len(), n);
            let total: f64 = a.domains().iter().map(|d| d.volume()).sum();
            assert!((total - bounds.volume()).abs() < 1e-12, "n={n}");
            for i in 0..n {
                for j in (i + 1)..n {
                    assert!(a.domains()[i].overlap(&a.domains()[j]) < 1e-15);
                }
            }
        }
    }

    #[test]
    fn locate_matches_box_membership() {
        let a = decompose_domain(&BoundingVolume::unit_cube(), 6).unwrap();
        let samples = 11;
        for i in 0..=samples {
            for j in 0..=samples {
                for k in 0..=samples {
                    let p = [
                        i as f64 / samples as f64,
                        j as f64 / samples as f64,
                        k as f64 / samples as f64,
                    ];
                    let rank = a.locate(p).expect("closed cube point must match");
                    let d = a.domain(rank).unwrap();
                    for axis in 0..3 {
                        assert!(p[axis] >= d.min[axis] && p[axis] <= d.max[axis]);
                    }
                }
            }
        }
    }

    #[test]
    fn test_faces_and_outside() {
        let a = decompose_domain(&BoundingVolume::unit_cube(), 2).unwrap();
        assert_eq!(a.locate([0.5, 0.5, 0.5]), Some(1));
        assert_eq!(a.locate([0.4999, 0.5, 0.5]), Some(0));
        assert_eq!(a.locate([1.0, 1.0, 1.0]), Some(1));
        assert_eq!(a.locate([0.0, 0.0, 0.0]), Some(0));
        assert_eq!(a.locate([1.0000001, 0.5, 0.5]), None);
        assert_eq!(a.locate([0.5, -0.1, 0.5]), None);
    }

    #[test]
    fn test_single_rank_owns_everything() {
        let a = decompose_domain(&BoundingVolume::unit_cube(), 1).unwrap();
        assert_eq!(a.domain(0), Some(&BoundingVolume::unit_cube()));
        assert_eq!(a.locate([0.3, 0.9, 0.1]), Some(0));
    }
}
