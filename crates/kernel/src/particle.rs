//! Particle classification for snapshot elements.
//!
//! Dark matter and star particles are told apart by mass alone: every dark
//! matter particle carries the same theoretical mass, derived from the
//! cosmological density parameters and the effective resolution of the run.

/// Relative mass tolerance used to match the dark matter reference.
pub const DEFAULT_MASS_TOLERANCE: f64 = 1e-5;

/// Physical type of a snapshot element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum ParticleType {
    /// Collisionless dark matter particle
    DarkMatter = 0,
    /// Star particle (any non-reference mass)
    Star = 1,
    /// Pseudo-particle synthesized from a leaf AMR cell
    Gas = 2,
    /// Simulation artifact, never counted toward any worker
    GhostStar = 3,
}

impl ParticleType {
    /// Everything that is not dark matter belongs to the baryonic component.
    pub fn is_baryon(self) -> bool {
        matches!(self, ParticleType::Star | ParticleType::Gas)
    }
}

/// A transient unit of work produced while streaming a shard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementRecord {
    /// Position in code units
    pub position: [f64; 3],
    /// Classified type
    pub kind: ParticleType,
    /// Zero-based refinement level (gas cells only)
    pub level: Option<u32>,
    /// Whether the owning cell has no children (gas cells only)
    pub leaf: bool,
}

impl ElementRecord {
    /// Build a record for a dark matter, star or ghost particle.
    pub fn particle(position: [f64; 3], kind: ParticleType) -> Self {
        Self {
            position,
            kind,
            level: None,
            leaf: false,
        }
    }

    /// Build a record for a gas pseudo-particle from a leaf cell.
    pub fn gas_cell(position: [f64; 3], level: u32) -> Self {
        Self {
            position,
            kind: ParticleType::Gas,
            level: Some(level),
            leaf: true,
        }
    }
}

/// Theoretical dark matter particle mass and the tolerance used to match it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassReference {
    /// Dark matter particle mass in code units
    pub value: f64,
    /// Relative tolerance
    pub tolerance: f64,
}

impl MassReference {
    /// Create a reference from an explicit mass.
    pub fn new(value: f64, tolerance: f64) -> Self {
        Self { value, tolerance }
    }

    /// Derive the dark matter mass in code units.
    ///
    /// The box holds `n_eff^3` dark matter particles sharing the dark matter
    /// fraction `(omega_m - omega_b) / omega_m` of the unit total mass.
    pub fn from_cosmology(omega_m: f64, omega_b: f64, n_eff: u32, tolerance: f64) -> Self {
        let n = n_eff as f64;
        let value = 1.0 / (n * n * n) * (omega_m - omega_b) / omega_m;
        Self { value, tolerance }
    }

    /// Relative deviation of `mass` from the reference.
    #[inline]
    pub fn deviation(&self, mass: f64) -> f64 {
        ((mass - self.value) / self.value).abs()
    }

    /// Whether `mass` matches the dark matter reference.
    #[inline]
    pub fn matches(&self, mass: f64) -> bool {
        self.deviation(mass) < self.tolerance
    }

    /// Classify a particle by mass and formation age.
    ///
    /// With the ghost filter enabled, a particle whose mass misses the
    /// reference and whose age is exactly zero is a ghost star. Anything
    /// else that misses the reference is a star. A deviation sitting exactly
    /// on the tolerance is neither dark matter nor a ghost, so it is a star.
    pub fn classify(&self, mass: f64, age: f64, ghost_filter: bool) -> ParticleType {
        let deviation = self.deviation(mass);
        if ghost_filter && deviation > self.tolerance && age == 0.0 {
            ParticleType::GhostStar
        } else if deviation < self.tolerance {
            ParticleType::DarkMatter
        } else {
            ParticleType::Star
        }
    }
}
