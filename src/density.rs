use std::cmp::Ordering;

use nalgebra::convert;

use crate::settings::FinderSettings;
use crate::shared::{Float, lit};
use crate::tree::{Octree, ROOT};

/// Cubic spline smoothing kernel with compact support `h`.
#[inline]
pub fn cubic_spline<F: Float>(r: F, h: F) -> F {
    let u = r / h;
    let norm = lit::<F>(8.0) / (F::pi() * h * h * h);
    if u < lit(0.5) {
        norm * (F::one() - lit::<F>(6.0) * u * u + lit::<F>(6.0) * u * u * u)
    } else if u <= F::one() {
        let w = F::one() - u;
        norm * lit::<F>(2.0) * w * w * w
    } else {
        F::zero()
    }
}

/// Per-particle results of the density pass.
#[derive(Clone, Debug, Default)]
pub struct DensityField<F: Float> {
    pub density: Vec<F>,
    pub smoothing_length: Vec<F>,
}

/// Neighbor searches and SPH density estimates on top of a threaded [`Octree`].
pub struct DensityEstimator<'t, 'a, F: Float> {
    tree: &'t Octree<'a, F>,
    particle_mass: F,
    mass_safety: F,
    growth: F,
    min_radius: F,
}

impl<'t, 'a, F: Float> DensityEstimator<'t, 'a, F> {
    pub fn new(tree: &'t Octree<'a, F>, settings: &FinderSettings<F>) -> Self {
        let size = tree.root().bounds.size();
        let min_radius = if size > F::zero() {
            size * lit(1e-6)
        } else {
            F::one()
        };
        Self {
            tree,
            particle_mass: settings.particle_mass,
            mass_safety: settings.neighbor_mass_safety,
            growth: settings.radius_growth,
            min_radius,
        }
    }

    /// First guess of the radius enclosing `wanted` neighbors, taken from the smallest
    /// enclosing cell that holds comfortably more mass than those neighbors.
    pub fn estimate_initial_radius(&self, particle: usize, wanted: usize) -> F {
        let target = convert::<f64, F>(wanted as f64) * self.particle_mass;
        let enough = target * self.mass_safety;

        let mut cell = ROOT;
        for node in self.tree.ancestors(particle) {
            cell = node;
            if self.tree.node(node).mass >= enough {
                break;
            }
        }
        let node = self.tree.node(cell);
        let radius = (target / node.mass).cbrt() * node.bounds.size();
        radius.max(self.min_radius)
    }

    /// Neighbors within a sphere that grows geometrically until it holds at least `count`
    /// particles. Returns `(distance, particle)` pairs sorted by distance and the final
    /// search radius.
    fn search(
        &self,
        particle: usize,
        count: usize,
        radius: F,
        include_self: bool,
    ) -> (Vec<(F, usize)>, F) {
        let particles = self.tree.particles();
        let center = particles.position(particle);
        let exclude = (!include_self).then_some(particle);

        let mut radius = radius.max(self.min_radius);
        let mut found = Vec::new();
        loop {
            found.clear();
            self.tree.range_query(&center, radius, exclude, &mut found);
            let mut neighbors: Vec<(F, usize)> = found
                .iter()
                .filter_map(|&j| {
                    let distance = (particles.position(j) - center).norm();
                    (distance <= radius).then_some((distance, j))
                })
                .collect();

            if neighbors.len() >= count {
                neighbors.sort_by(|a, b| {
                    a.0.partial_cmp(&b.0)
                        .unwrap_or(Ordering::Equal)
                        .then(a.1.cmp(&b.1))
                });
                return (neighbors, radius);
            }
            radius *= self.growth;
        }
    }

    /// SPH density of one particle from its `wanted` nearest neighbors (itself included).
    /// Returns the density and the smoothing length, the distance of the farthest of
    /// those neighbors.
    pub fn compute_density(&self, particle: usize, wanted: usize) -> (F, F) {
        let particles = self.tree.particles();
        let wanted = wanted.clamp(1, particles.len());
        let initial = self.estimate_initial_radius(particle, wanted);
        let (neighbors, radius) = self.search(particle, wanted, initial, true);

        let mut h = neighbors[wanted - 1].0;
        if h <= F::zero() {
            // Only the particle itself so far: stay below the next neighbor's distance.
            let next = if wanted < particles.len() {
                let (wider, _) = self.search(particle, wanted + 1, radius, true);
                wider.get(wanted).map(|&(distance, _)| distance)
            } else {
                None
            };
            h = next
                .filter(|&distance| distance > F::zero())
                .map_or(self.min_radius, |distance| distance.min(self.min_radius));
        }
        let density = neighbors.iter().fold(F::zero(), |acc, &(distance, j)| {
            acc + particles.get_mass(j) * cubic_spline(distance, h)
        });
        (density, h)
    }

    /// Up to `count` nearest other particles, closest first, searching outward from `radius`.
    pub fn nearest_neighbors(&self, particle: usize, count: usize, radius: F) -> Vec<usize> {
        let count = count.min(self.tree.particles().len() - 1);
        if count == 0 {
            return Vec::new();
        }
        let (neighbors, _) = self.search(particle, count, radius, false);
        neighbors.into_iter().take(count).map(|(_, j)| j).collect()
    }

    pub fn estimate_all(&self, wanted: usize) -> DensityField<F> {
        let n = self.tree.particles().len();
        let mut field = DensityField {
            density: Vec::with_capacity(n),
            smoothing_length: Vec::with_capacity(n),
        };
        for particle in 0..n {
            let (density, h) = self.compute_density(particle, wanted);
            field.density.push(density);
            field.smoothing_length.push(h);
        }

        if let (Some(min), Some(max)) = (
            field.density.iter().copied().reduce(|a, b| a.min(b)),
            field.density.iter().copied().reduce(|a, b| a.max(b)),
        ) {
            log::debug!(
                "density estimated for {} particles with {} neighbors: min {:?} max {:?}",
                n,
                wanted,
                min,
                max
            );
        }
        field
    }
}
