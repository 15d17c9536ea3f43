use nalgebra::Vector3;
use rand::Rng;

use crate::error::Result;
use crate::shared::{Float, HaloParticles, lit};

/// Owned particle arrays for generated or loaded halos.
#[derive(Clone, Debug, Default)]
pub struct SyntheticHalo<F: Float> {
    pub x: Vec<F>,
    pub y: Vec<F>,
    pub z: Vec<F>,
    pub vx: Vec<F>,
    pub vy: Vec<F>,
    pub vz: Vec<F>,
    pub mass: Vec<F>,
    pub id: Vec<i64>,
}

impl<F: Float> SyntheticHalo<F> {
    pub fn new() -> Self {
        Self {
            x: Vec::new(),
            y: Vec::new(),
            z: Vec::new(),
            vx: Vec::new(),
            vy: Vec::new(),
            vz: Vec::new(),
            mass: Vec::new(),
            id: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Appends one particle; its tag is its position in the halo.
    pub fn add_particle(&mut self, position: Vector3<F>, velocity: Vector3<F>, mass: F) -> usize {
        let index = self.len();
        self.x.push(position.x);
        self.y.push(position.y);
        self.z.push(position.z);
        self.vx.push(velocity.x);
        self.vy.push(velocity.y);
        self.vz.push(velocity.z);
        self.mass.push(mass);
        self.id.push(index as i64);
        index
    }

    /// Appends `count` particles centrally concentrated around `center`: radii follow
    /// `scale * u^2` for uniform `u`, directions are isotropic and velocities scatter
    /// uniformly by up to `dispersion` around `bulk_velocity`. Returns the index range.
    #[allow(clippy::too_many_arguments)]
    pub fn add_clump<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        center: Vector3<f64>,
        bulk_velocity: Vector3<f64>,
        count: usize,
        scale: f64,
        dispersion: f64,
        mass: f64,
    ) -> std::ops::Range<usize> {
        let start = self.len();
        for _ in 0..count {
            let u: f64 = rng.random();
            let radius = scale * u * u;
            let cos_theta: f64 = rng.random_range(-1.0..1.0);
            let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();
            let phi: f64 = rng.random_range(0.0..std::f64::consts::TAU);
            let offset = Vector3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta);

            let jitter = Vector3::new(
                rng.random_range(-1.0..=1.0),
                rng.random_range(-1.0..=1.0),
                rng.random_range(-1.0..=1.0),
            );
            let position = center + offset * radius;
            let velocity = bulk_velocity + jitter * dispersion;
            self.add_particle(position.map(lit), velocity.map(lit), lit(mass));
        }
        start..self.len()
    }

    pub fn particles(&self) -> Result<HaloParticles<'_, F>> {
        HaloParticles::new(
            &self.x, &self.y, &self.z, &self.vx, &self.vy, &self.vz, &self.mass, &self.id,
        )
    }
}
