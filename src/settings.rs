use crate::error::{Result, SubhaloError};
use crate::shared::{Float, lit};

/// Tunables of one finder run. `configure` overwrites the physical constants and
/// neighbor counts; the remaining fields keep their defaults unless set directly.
#[derive(Clone, Debug, PartialEq)]
pub struct FinderSettings<F: Float> {
    /// Average particle mass; also the per-particle weight of tree aggregates.
    pub particle_mass: F,
    pub gravitational_constant: F,
    /// Size ratio above which the smaller of two touching groups stops growing.
    pub alpha_factor: F,
    /// Strength of the saddle significance test.
    pub beta_factor: F,
    pub min_candidate_size: usize,
    pub sph_neighbor_count: usize,
    pub close_neighbor_count: usize,

    /// Multiple of the wanted neighbor mass an ancestor cell must hold before its size
    /// seeds the smoothing radius.
    pub neighbor_mass_safety: F,
    pub radius_growth: F,
    pub unbind_removal_base: usize,
    pub unbind_min_fraction: F,
    pub unbind_size_ceiling: usize,
    pub unbind_early_exit_fraction: F,
}

impl<F: Float> Default for FinderSettings<F> {
    fn default() -> Self {
        Self {
            particle_mass: lit(1.0),
            gravitational_constant: lit(1.0),
            alpha_factor: lit(1.0),
            beta_factor: lit(0.0),
            min_candidate_size: 20,
            sph_neighbor_count: 64,
            close_neighbor_count: 20,
            neighbor_mass_safety: lit(10.0),
            radius_growth: lit(1.25),
            unbind_removal_base: 100,
            unbind_min_fraction: lit(0.1),
            unbind_size_ceiling: 5000,
            unbind_early_exit_fraction: lit(0.01),
        }
    }
}

impl<F: Float> FinderSettings<F> {
    #[allow(clippy::too_many_arguments)]
    pub fn configure(
        &mut self,
        particle_mass: F,
        gravitational_constant: F,
        alpha_factor: F,
        beta_factor: F,
        min_candidate_size: usize,
        sph_neighbor_count: usize,
        close_neighbor_count: usize,
    ) {
        self.particle_mass = particle_mass;
        self.gravitational_constant = gravitational_constant;
        self.alpha_factor = alpha_factor;
        self.beta_factor = beta_factor;
        self.min_candidate_size = min_candidate_size;
        self.sph_neighbor_count = sph_neighbor_count;
        self.close_neighbor_count = close_neighbor_count;
    }

    pub fn validate(&self) -> Result<()> {
        let zero = F::zero();
        if !positive(self.particle_mass) {
            return Err(invalid("particle_mass", "must be positive and finite"));
        }
        if !self.gravitational_constant.is_finite() || self.gravitational_constant < zero {
            return Err(invalid("gravitational_constant", "must be finite and non-negative"));
        }
        if !self.alpha_factor.is_finite() {
            return Err(invalid("alpha_factor", "must be finite"));
        }
        if !self.beta_factor.is_finite() {
            return Err(invalid("beta_factor", "must be finite"));
        }
        if self.sph_neighbor_count == 0 {
            return Err(invalid("sph_neighbor_count", "must be at least one"));
        }
        if self.close_neighbor_count == 0 {
            return Err(invalid("close_neighbor_count", "must be at least one"));
        }
        if !(self.radius_growth.is_finite() && self.radius_growth > F::one()) {
            return Err(invalid("radius_growth", "must be finite and greater than one"));
        }
        if !positive(self.neighbor_mass_safety) {
            return Err(invalid("neighbor_mass_safety", "must be positive and finite"));
        }
        if self.unbind_removal_base == 0 {
            return Err(invalid("unbind_removal_base", "must be at least one"));
        }
        if !(self.unbind_min_fraction > zero && self.unbind_min_fraction <= F::one()) {
            return Err(invalid("unbind_min_fraction", "must lie in (0, 1]"));
        }
        if !self.unbind_early_exit_fraction.is_finite() {
            return Err(invalid("unbind_early_exit_fraction", "must be finite"));
        }
        Ok(())
    }
}

fn positive<F: Float>(value: F) -> bool {
    value.is_finite() && value > F::zero()
}

fn invalid(name: &'static str, reason: &'static str) -> SubhaloError {
    SubhaloError::InvalidSettings { name, reason }
}
