use std::cmp::Ordering;

use nalgebra::Vector3;
use num_traits::ToPrimitive;

use super::candidate::Forest;
use crate::settings::FinderSettings;
use crate::shared::{Float, HaloParticles, lit};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UnbindStats {
    pub processed: usize,
    pub escaped: usize,
    pub folded: usize,
    pub early_exits: usize,
}

/// Candidates in unbinding order: each merge tree in creation order, children before
/// their parent, the sibling with the larger total first.
pub fn unbinding_order(forest: &Forest) -> Vec<usize> {
    let mut order = Vec::with_capacity(forest.len());
    let roots = (0..forest.len())
        .filter(|&c| c != forest.fuzz() && forest.candidates[c].parent.is_none());

    for root in roots {
        let mut stack = vec![(root, false)];
        while let Some((c, expanded)) = stack.pop() {
            let candidate = &forest.candidates[c];
            if expanded || !candidate.is_merge() {
                order.push(c);
                continue;
            }
            stack.push((c, true));
            let mut children: Vec<usize> = candidate.children().collect();
            // Pushed smallest first so the largest pops first.
            children.sort_by_key(|&child| forest.candidates[child].total_count);
            stack.extend(children.into_iter().map(|child| (child, false)));
        }
    }
    order
}

/// Strips gravitationally unbound particles from every live leaf of the forest.
pub struct Unbinder<'s, 'a, F: Float> {
    particles: &'s HaloParticles<'a, F>,
    settings: &'s FinderSettings<F>,
}

impl<'s, 'a, F: Float> Unbinder<'s, 'a, F> {
    pub fn new(particles: &'s HaloParticles<'a, F>, settings: &'s FinderSettings<F>) -> Self {
        Self {
            particles,
            settings,
        }
    }

    pub fn run(&self, forest: &mut Forest) -> UnbindStats {
        let mut stats = UnbindStats::default();
        for candidate in unbinding_order(forest) {
            let c = &forest.candidates[candidate];
            if c.is_merge() || c.dissolved || c.count == 0 {
                continue;
            }
            self.unbind_candidate(forest, candidate, &mut stats);
        }
        log::debug!("unbinding finished: {:?}", stats);
        stats
    }

    /// Specific energy of each member relative to the group's bulk motion.
    pub fn energies(&self, members: &[usize]) -> Vec<F> {
        let k = members.len();
        if k == 0 {
            return Vec::new();
        }
        let bulk = members
            .iter()
            .fold(Vector3::<F>::zeros(), |acc, &p| acc + self.particles.velocity(p))
            / lit::<F>(k as f64);

        let positions: Vec<Vector3<F>> = members.iter().map(|&p| self.particles.position(p)).collect();
        let mut potential = vec![F::zero(); k];
        for i in 0..k {
            for j in (i + 1)..k {
                let r = (positions[i] - positions[j]).norm();
                if r > F::zero() {
                    let inverse = F::one() / r;
                    potential[i] -= inverse;
                    potential[j] -= inverse;
                }
            }
        }

        let scale = self.settings.gravitational_constant * self.settings.particle_mass;
        let half: F = lit(0.5);
        members
            .iter()
            .zip(potential)
            .map(|(&p, phi)| {
                let v = self.particles.velocity(p) - bulk;
                half * v.norm_squared() + scale * phi
            })
            .collect()
    }

    /// Share of the positive-energy particles expelled per pass for a group of `k`.
    fn removal_fraction(&self, k: usize) -> F {
        let base: F = lit(self.settings.unbind_removal_base as f64);
        let fraction = base / lit::<F>(k.max(1) as f64);
        fraction.max(self.settings.unbind_min_fraction).min(F::one())
    }

    fn unbind_candidate(&self, forest: &mut Forest, candidate: usize, stats: &mut UnbindStats) {
        let settings = self.settings;
        let mut valid: Vec<usize> = forest.members(candidate).collect();
        let mut escaped = Vec::new();
        stats.processed += 1;

        loop {
            let k = valid.len();
            if k < settings.min_candidate_size || k == 0 {
                let moved = forest.dissolve(candidate);
                stats.folded += 1;
                stats.escaped += escaped.len();
                log::trace!(
                    "candidate {} fell below {} bound members and was folded ({} particles)",
                    candidate,
                    settings.min_candidate_size,
                    moved
                );
                return;
            }

            let energies = self.energies(&valid);
            let mut positive: Vec<(F, usize)> = energies
                .into_iter()
                .enumerate()
                .filter(|&(_, e)| e > F::zero())
                .map(|(i, e)| (e, i))
                .collect();
            if positive.is_empty() {
                break;
            }
            positive.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

            let wanted = (self.removal_fraction(k) * lit::<F>(positive.len() as f64)).ceil();
            let remove = wanted
                .to_usize()
                .unwrap_or(positive.len())
                .clamp(1, positive.len());
            let mut expelled = vec![false; k];
            for &(_, i) in &positive[..remove] {
                expelled[i] = true;
                escaped.push(valid[i]);
            }
            let mut i = 0;
            valid.retain(|_| {
                let keep = !expelled[i];
                i += 1;
                keep
            });

            if k > settings.unbind_size_ceiling
                && lit::<F>(remove as f64) < settings.unbind_early_exit_fraction * lit::<F>(k as f64)
            {
                stats.early_exits += 1;
                log::warn!(
                    "candidate {} stopped unbinding early at {} members ({} removed last pass)",
                    candidate,
                    valid.len(),
                    remove
                );
                break;
            }
        }

        if escaped.is_empty() {
            return;
        }
        let target = forest.fold_target(candidate);
        forest.replace_members(candidate, &valid);
        for &p in &escaped {
            forest.add(target, p);
        }
        stats.escaped += escaped.len();
        log::trace!(
            "candidate {} kept {} members, {} escaped to {}",
            candidate,
            valid.len(),
            escaped.len(),
            target
        );
    }
}
