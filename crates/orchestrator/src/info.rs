//! Positional parser for the snapshot's `info_XXXXX.txt` metadata file.
//!
//! The file is written by the simulation code with a fixed line order, one
//! `key = value` pair per line. Lines are read by position; the key text is
//! not used for lookup.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, SnapshotError};
use crate::header::OrderingScheme;

const LINE_NCPU: usize = 0;
const LINE_NDIM: usize = 1;
const LINE_LEVELMIN: usize = 2;
const LINE_LEVELMAX: usize = 3;
const LINE_NGRIDMAX: usize = 4;
const LINE_NSTEP_COARSE: usize = 5;
const LINE_BOXLEN: usize = 7;
const LINE_TIME: usize = 8;
const LINE_AEXP: usize = 9;
const LINE_H0: usize = 10;
const LINE_OMEGA_M: usize = 11;
const LINE_OMEGA_L: usize = 12;
const LINE_OMEGA_K: usize = 13;
const LINE_OMEGA_B: usize = 14;
const LINE_UNIT_L: usize = 15;
const LINE_UNIT_D: usize = 16;
const LINE_UNIT_T: usize = 17;
const LINE_ORDERING: usize = 19;

/// Global simulation parameters read from the info file.
#[derive(Debug, Clone, PartialEq)]
pub struct InfoFile {
    /// Number of shard files per kind
    pub ncpu: usize,
    /// Spatial dimensionality
    pub ndim: u32,
    /// Coarsest refinement level
    pub levelmin: u32,
    /// Finest refinement level
    pub levelmax: u32,
    /// Maximum grids per process
    pub ngridmax: u64,
    /// Coarse steps taken
    pub nstep_coarse: u64,
    /// Box length in code units
    pub boxlen: f64,
    /// Code time
    pub time: f64,
    /// Expansion factor
    pub aexp: f64,
    /// Hubble parameter (km/s/Mpc)
    pub h0: f64,
    /// Matter density parameter
    pub omega_m: f64,
    /// Dark energy density parameter
    pub omega_l: f64,
    /// Curvature density parameter
    pub omega_k: f64,
    /// Baryon density parameter
    pub omega_b: f64,
    /// Length unit (cm)
    pub unit_l: f64,
    /// Density unit (g/cm^3)
    pub unit_d: f64,
    /// Time unit (s)
    pub unit_t: f64,
    /// Domain ordering used when the snapshot was written
    pub ordering: OrderingScheme,
}

impl InfoFile {
    /// Read and parse an info file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| SnapshotError::io(path, e))?;
        Self::parse(&text)
    }

    /// Parse the text of an info file.
    pub fn parse(text: &str) -> Result<Self> {
        let lines: Vec<&str> = text.lines().collect();

        let ordering = match lines.get(LINE_ORDERING) {
            Some(line) if !line.trim().is_empty() => {
                OrderingScheme::from_name(raw_value(line, LINE_ORDERING)?)
            }
            _ => OrderingScheme::default(),
        };

        Ok(Self {
            ncpu: value_at(&lines, LINE_NCPU)?,
            ndim: value_at(&lines, LINE_NDIM)?,
            levelmin: value_at(&lines, LINE_LEVELMIN)?,
            levelmax: value_at(&lines, LINE_LEVELMAX)?,
            ngridmax: value_at(&lines, LINE_NGRIDMAX)?,
            nstep_coarse: value_at(&lines, LINE_NSTEP_COARSE)?,
            boxlen: real_at(&lines, LINE_BOXLEN)?,
            time: real_at(&lines, LINE_TIME)?,
            aexp: real_at(&lines, LINE_AEXP)?,
            h0: real_at(&lines, LINE_H0)?,
            omega_m: real_at(&lines, LINE_OMEGA_M)?,
            omega_l: real_at(&lines, LINE_OMEGA_L)?,
            omega_k: real_at(&lines, LINE_OMEGA_K)?,
            omega_b: real_at(&lines, LINE_OMEGA_B)?,
            unit_l: real_at(&lines, LINE_UNIT_L)?,
            unit_d: real_at(&lines, LINE_UNIT_D)?,
            unit_t: real_at(&lines, LINE_UNIT_T)?,
            ordering,
        })
    }
}

fn raw_value(line: &str, index: usize) -> Result<&str> {
    line.split_once('=')
        .map(|(_, v)| v.trim())
        .ok_or_else(|| SnapshotError::Info {
            line: index,
            message: format!("expected `key = value`, found {:?}", line),
        })
}

fn value_at<T: FromStr>(lines: &[&str], index: usize) -> Result<T> {
    let line = lines.get(index).ok_or_else(|| SnapshotError::Info {
        line: index,
        message: "file ends early".to_string(),
    })?;
    let raw = raw_value(line, index)?;
    raw.parse().map_err(|_| SnapshotError::Info {
        line: index,
        message: format!("cannot parse {:?}", raw),
    })
}

/// Reals may carry a Fortran `D` exponent.
fn real_at(lines: &[&str], index: usize) -> Result<f64> {
    let line = lines.get(index).ok_or_else(|| SnapshotError::Info {
        line: index,
        message: "file ends early".to_string(),
    })?;
    let raw = raw_value(line, index)?.replace(['D', 'd'], "E");
    raw.parse().map_err(|_| SnapshotError::Info {
        line: index,
        message: format!("cannot parse {:?} as a real", raw),
    })
}
