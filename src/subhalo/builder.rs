use std::cmp::Ordering;

use smallvec::SmallVec;

use super::candidate::Forest;
use crate::density::{DensityEstimator, DensityField};
use crate::settings::FinderSettings;
use crate::shared::{Float, lit};

/// Whether the group meeting a saddle stands out from it: its mean density must exceed the
/// saddle density by a margin that shrinks with the group size.
pub fn saddle_is_significant<F: Float>(
    average_density: F,
    saddle_density: F,
    beta_factor: F,
    count: usize,
) -> bool {
    let count: F = lit(count.max(1) as f64);
    average_density > saddle_density * (F::one() + beta_factor / count.sqrt())
}

/// Grows the candidate forest by sweeping particles from the densest to the sparsest and
/// attaching each to the groups of its denser close neighbors.
pub struct SubstructureBuilder<'e, 't, 'a, F: Float> {
    estimator: &'e DensityEstimator<'t, 'a, F>,
    field: &'e DensityField<F>,
    settings: &'e FinderSettings<F>,
    forest: Forest,
}

impl<'e, 't, 'a, F: Float> SubstructureBuilder<'e, 't, 'a, F> {
    pub fn new(
        estimator: &'e DensityEstimator<'t, 'a, F>,
        field: &'e DensityField<F>,
        settings: &'e FinderSettings<F>,
    ) -> Self {
        Self {
            estimator,
            field,
            settings,
            forest: Forest::new(field.density.len()),
        }
    }

    pub fn run(mut self) -> Forest {
        let field = self.field;
        let density = &field.density;
        let mut order: Vec<usize> = (0..density.len()).collect();
        order.sort_by(|&a, &b| {
            density[b]
                .partial_cmp(&density[a])
                .unwrap_or(Ordering::Equal)
                .then(a.cmp(&b))
        });

        for &particle in &order {
            self.place(particle);
        }
        self.forest.seal();

        log::debug!(
            "candidate forest: {} candidates, {:?}",
            self.forest.len(),
            self.forest.stats
        );
        self.forest
    }

    fn place(&mut self, particle: usize) {
        let field = self.field;
        let density = &field.density;
        let neighbors = self.estimator.nearest_neighbors(
            particle,
            self.settings.close_neighbor_count,
            field.smoothing_length[particle],
        );
        let owners: SmallVec<[usize; 2]> = neighbors
            .into_iter()
            .filter(|&j| density[j] > density[particle])
            .filter_map(|j| self.forest.owner[j])
            .take(2)
            .collect();

        match (owners.first().copied(), owners.get(1).copied()) {
            (None, _) => {
                let candidate = self.forest.create_leaf();
                self.forest.add(candidate, particle);
                self.forest.stats.created += 1;
            }
            (Some(only), None) => self.join(only, particle),
            (Some(a), Some(b)) if a == b => self.join(a, particle),
            (Some(a), Some(b)) => {
                let (cand1, cand2) =
                    if self.forest.candidates[b].count > self.forest.candidates[a].count {
                        (b, a)
                    } else {
                        (a, b)
                    };
                if self.forest.candidates[cand1].top == self.forest.candidates[cand2].top {
                    self.join_branch(cand1, cand2, particle);
                } else {
                    self.saddle(cand1, cand2, particle);
                }
            }
        }
    }

    fn join(&mut self, candidate: usize, particle: usize) {
        let target = self.forest.resolve_open(candidate);
        self.forest.add(target, particle);
        self.forest.stats.joined += 1;
    }

    fn dominates(&self, larger: usize, smaller: usize) -> bool {
        let larger: F = lit(larger as f64);
        let smaller: F = lit(smaller as f64);
        larger > self.settings.alpha_factor * smaller
    }

    /// Prefers the larger side while it is open, then the other, then the larger side's
    /// partner chain.
    fn open_side(&mut self, cand1: usize, cand2: usize) -> usize {
        if !self.forest.candidates[cand1].cut {
            cand1
        } else if !self.forest.candidates[cand2].cut {
            cand2
        } else {
            self.forest.resolve_open(cand1)
        }
    }

    /// Two neighbors inside one merge tree.
    fn join_branch(&mut self, cand1: usize, cand2: usize, particle: usize) {
        let (c1, c2) = (&self.forest.candidates[cand1], &self.forest.candidates[cand2]);
        if !c1.cut && !c2.cut && self.dominates(c1.count, c2.count) {
            self.forest.close(cand2, cand1);
        }
        let target = self.open_side(cand1, cand2);
        self.forest.add(target, particle);
        self.forest.stats.joined += 1;
    }

    /// Two neighbors from different merge trees: `particle` is a saddle between them.
    fn saddle(&mut self, cand1: usize, cand2: usize, particle: usize) {
        let field = self.field;
        let density = &field.density;
        let c2 = &self.forest.candidates[cand2];
        let standalone = c2.parent.is_none() && !c2.is_merge();
        let too_small = standalone && c2.count < self.settings.min_candidate_size;
        let significant = saddle_is_significant(
            self.forest.average_density(cand2, density),
            density[particle],
            self.settings.beta_factor,
            c2.count,
        );

        if !significant || too_small {
            let target = self.forest.resolve_open(cand1);
            if target != cand2 {
                self.forest.transfer(cand2, target);
                self.forest.close(cand2, target);
            }
            self.forest.add(target, particle);
            self.forest.stats.absorbs += 1;
            log::trace!(
                "saddle {} absorbs candidate {} into {} (significant: {})",
                particle,
                cand2,
                target,
                significant
            );
            return;
        }

        let top1 = self.forest.candidates[cand1].top;
        let top2 = self.forest.candidates[cand2].top;
        let merged = self.forest.create_merge(top1, top2);
        let total1 = self.forest.candidates[top1].total_count;
        let total2 = self.forest.candidates[top2].total_count;
        if self.dominates(total1, total2) && !self.forest.candidates[cand2].cut {
            self.forest.close(cand2, cand1);
        } else if self.dominates(total2, total1) && !self.forest.candidates[cand1].cut {
            self.forest.close(cand1, cand2);
        }
        let target = self.open_side(cand1, cand2);
        self.forest.add(target, particle);
        self.forest.stats.merges += 1;
        log::trace!(
            "saddle {} merges branches {} ({}) and {} ({}) into {}",
            particle,
            top1,
            total1,
            top2,
            total2,
            merged
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{Bounds, HaloParticles};
    use crate::tree::Octree;

    #[test]
    fn significance_weakens_with_beta() {
        let mut last = true;
        for step in 0..50 {
            let beta = step as f64 * 0.2;
            let significant = saddle_is_significant(2.0, 1.0, beta, 25);
            // Once a saddle stops being significant, a larger beta never revives it.
            assert!(last || !significant, "beta {}", beta);
            last = significant;
        }
        assert!(saddle_is_significant(2.0, 1.0, 0.0, 25));
        assert!(!saddle_is_significant(2.0, 1.0, 5.0, 25));
    }

    #[test]
    fn significance_margin_shrinks_with_size() {
        assert!(!saddle_is_significant(1.5, 1.0, 1.0, 4));
        assert!(saddle_is_significant(1.5, 1.0, 1.0, 16));
    }

    /// Particles on the x axis at the given coordinates.
    struct Line {
        x: Vec<f64>,
        zeros: Vec<f64>,
        mass: Vec<f64>,
        ids: Vec<i64>,
    }

    impl Line {
        fn new(x: &[f64]) -> Self {
            Self {
                x: x.to_vec(),
                zeros: vec![0.0; x.len()],
                mass: vec![1.0; x.len()],
                ids: (0..x.len() as i64).collect(),
            }
        }

        fn particles(&self) -> HaloParticles<'_, f64> {
            HaloParticles::new(
                &self.x, &self.zeros, &self.zeros, &self.zeros, &self.zeros, &self.zeros,
                &self.mass, &self.ids,
            )
            .unwrap()
        }
    }

    fn field(density: &[f64]) -> DensityField<f64> {
        DensityField {
            density: density.to_vec(),
            smoothing_length: vec![1.0; density.len()],
        }
    }

    fn line_settings(alpha: f64, beta: f64, min_candidate_size: usize) -> FinderSettings<f64> {
        FinderSettings {
            alpha_factor: alpha,
            beta_factor: beta,
            min_candidate_size,
            close_neighbor_count: 2,
            ..FinderSettings::default()
        }
    }

    fn leaf_with(forest: &mut Forest, members: impl IntoIterator<Item = usize>) -> usize {
        let leaf = forest.create_leaf();
        for p in members {
            forest.add(leaf, p);
        }
        leaf
    }

    #[test]
    fn dominated_branch_is_cut_and_redirects_later_arrivals() {
        // Big branch at 0..=4, saddle-free particle at 5, small branch at 6, late arrival at 7.
        let line = Line::new(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        let particles = line.particles();
        let bounds = Bounds::from_points(&particles).unwrap().padded_cube();
        let tree = Octree::build(bounds, particles, 1.0).unwrap();
        let settings = line_settings(2.0, 0.0, 1);
        let estimator = DensityEstimator::new(&tree, &settings);
        let field = field(&[10.0, 10.0, 10.0, 10.0, 10.0, 5.0, 10.0, 6.0]);

        let mut forest = Forest::new(8);
        let big = leaf_with(&mut forest, 0..5);
        let small = leaf_with(&mut forest, [6]);
        let merged = forest.create_merge(big, small);
        let mut builder = SubstructureBuilder {
            estimator: &estimator,
            field: &field,
            settings: &settings,
            forest,
        };

        builder.place(5);
        let forest = &builder.forest;
        assert!(forest.candidates[small].cut);
        assert_eq!(forest.candidates[small].partner, Some(big));
        assert!(!forest.candidates[big].cut);
        assert_eq!(forest.owner[5], Some(big));
        assert_eq!(forest.stats.cuts, 1);
        assert_eq!(forest.stats.joined, 1);
        assert_eq!(forest.candidates[merged].count, 0);

        // Only particle 6 is denser than 7, and its candidate now forwards to the big one.
        builder.place(7);
        assert_eq!(builder.forest.owner[7], Some(big));
        assert_eq!(builder.forest.candidates[small].count, 1);
        assert_eq!(builder.forest.candidates[big].count, 7);
    }

    #[test]
    fn insignificant_saddle_absorbs_into_open_partner() {
        // Closed branch at 0..=4 forwarding to a far leaf at 30, weak branch at 6, saddle at 5.
        let line = Line::new(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 30.0]);
        let particles = line.particles();
        let bounds = Bounds::from_points(&particles).unwrap().padded_cube();
        let tree = Octree::build(bounds, particles, 1.0).unwrap();
        let settings = line_settings(1.0, 1.0, 1);
        let estimator = DensityEstimator::new(&tree, &settings);
        let field = field(&[10.0, 10.0, 10.0, 10.0, 10.0, 5.0, 5.5, 10.0]);

        let mut forest = Forest::new(8);
        let closed = leaf_with(&mut forest, 0..5);
        let weak = leaf_with(&mut forest, [6]);
        let far = leaf_with(&mut forest, [7]);
        assert!(forest.close(closed, far));
        let mut builder = SubstructureBuilder {
            estimator: &estimator,
            field: &field,
            settings: &settings,
            forest,
        };

        // 5.5 > 5 * (1 + 1 / sqrt(1)) fails, so the weak branch is absorbed.
        builder.place(5);
        let forest = &builder.forest;
        assert_eq!(forest.stats.absorbs, 1);
        assert_eq!(forest.stats.merges, 0);
        assert_eq!(forest.owner[5], Some(far));
        assert_eq!(forest.owner[6], Some(far));
        assert_eq!(forest.candidates[far].count, 3);
        assert_eq!(forest.candidates[weak].count, 0);
        assert!(forest.candidates[weak].cut);
        assert_eq!(forest.candidates[weak].partner, Some(far));
        assert_eq!(forest.candidates[closed].count, 5);
        assert_eq!(forest.stats.cuts, 2);
    }

    #[test]
    fn significant_saddle_merges_and_cuts_the_smaller_side() {
        let line = Line::new(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        let particles = line.particles();
        let bounds = Bounds::from_points(&particles).unwrap().padded_cube();
        let tree = Octree::build(bounds, particles, 1.0).unwrap();
        let settings = line_settings(2.0, 0.0, 1);
        let estimator = DensityEstimator::new(&tree, &settings);
        let field = field(&[10.0, 10.0, 10.0, 10.0, 10.0, 5.0, 10.0, 10.0]);

        let mut forest = Forest::new(8);
        let big = leaf_with(&mut forest, 0..5);
        let small = leaf_with(&mut forest, [6, 7]);
        let mut builder = SubstructureBuilder {
            estimator: &estimator,
            field: &field,
            settings: &settings,
            forest,
        };

        builder.place(5);
        let forest = &builder.forest;
        assert_eq!(forest.stats.merges, 1);
        assert_eq!(forest.stats.absorbs, 0);
        assert_eq!(forest.stats.cuts, 1);

        let merged = forest.len() - 1;
        assert_eq!(forest.candidates[merged].child1, Some(big));
        assert_eq!(forest.candidates[merged].child2, Some(small));
        assert_eq!(forest.candidates[merged].count, 0);
        assert_eq!(forest.candidates[merged].total_count, 8);
        assert_eq!(forest.candidates[big].top, merged);
        assert_eq!(forest.candidates[small].top, merged);

        // 5 > 2 * 2: the smaller branch closes toward the larger, which takes the saddle.
        assert!(forest.candidates[small].cut);
        assert_eq!(forest.candidates[small].partner, Some(big));
        assert_eq!(forest.owner[5], Some(big));
        assert_eq!(forest.candidates[small].count, 2);
    }

    #[test]
    fn lone_particle_starts_a_candidate() {
        let line = Line::new(&[0.0, 1.0, 2.0]);
        let particles = line.particles();
        let bounds = Bounds::from_points(&particles).unwrap().padded_cube();
        let tree = Octree::build(bounds, particles, 1.0).unwrap();
        let settings = line_settings(1.0, 0.0, 1);
        let estimator = DensityEstimator::new(&tree, &settings);
        let field = field(&[1.0, 3.0, 2.0]);

        let forest = SubstructureBuilder::new(&estimator, &field, &settings).run();
        assert_eq!(forest.stats.created, 1);
        assert_eq!(forest.stats.joined, 2);
        assert_eq!(forest.stats.cuts, 0);
        assert_eq!(forest.owner, vec![Some(0); 3]);
        assert_eq!(forest.fuzz(), 1);
    }
}
