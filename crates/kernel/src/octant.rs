//! Octant geometry for turning AMR child cells into pseudo-particles.
//!
//! A grid (oct) at zero-based level `l` holds `2^ndim` child cells of width
//! `2^-(l + 1)` arranged around the grid centre. Slot indices enumerate the
//! children x-fastest.

/// Number of child cells per grid in `ndim` dimensions.
#[inline]
pub fn children_per_grid(ndim: u32) -> usize {
    1usize << ndim
}

/// Decompose a child slot index into per-axis offsets (0 or 1).
///
/// Axes beyond `ndim` always get offset 0.
pub fn octant_offset(slot: usize, ndim: u32) -> [u32; 3] {
    let mut offset = [0u32; 3];
    for (axis, o) in offset.iter_mut().enumerate().take(ndim.min(3) as usize) {
        *o = ((slot >> axis) & 1) as u32;
    }
    offset
}

/// Width of a child cell of a grid at zero-based `level`.
///
/// This is `2^-level` for the one-based level the snapshot files number their
/// blocks with: a level-0 grid spans the whole box and its children are half
/// of it.
#[inline]
pub fn cell_width(level: u32) -> f64 {
    0.5_f64.powi(level as i32 + 1)
}

/// Lower corner of child `slot` of the grid centred at `centre`.
pub fn cell_origin(centre: [f64; 3], slot: usize, ndim: u32, level: u32) -> [f64; 3] {
    let w = cell_width(level);
    let off = octant_offset(slot, ndim);
    let mut origin = centre;
    for axis in 0..ndim.min(3) as usize {
        origin[axis] = centre[axis] + (off[axis] as f64 - 1.0) * w;
    }
    origin
}

/// Absolute position of the pseudo-particle standing in for child `slot`.
///
/// `jitter` holds one uniform sample in `[0, 1)` per axis; the particle lands
/// at that fraction of the way across its own cell, so it never leaves the
/// cell it represents. The result is scaled by `box_len`.
pub fn synthetic_position(
    centre: [f64; 3],
    slot: usize,
    ndim: u32,
    level: u32,
    box_len: f64,
    jitter: [f64; 3],
) -> [f64; 3] {
    let w = cell_width(level);
    let origin = cell_origin(centre, slot, ndim, level);
    let mut p = [0.0; 3];
    for axis in 0..3 {
        let local = if axis < ndim as usize {
            origin[axis] + jitter[axis] * w
        } else {
            centre[axis]
        };
        p[axis] = box_len * local;
    }
    p
}
