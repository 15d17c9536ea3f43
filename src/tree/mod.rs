mod query;
mod thread;

pub use thread::Traversal;

use nalgebra::Vector3;

use crate::error::{Result, SubhaloError};
use crate::shared::{Bounds, Float, HaloParticles};

/// Index of the root node in the arena.
pub const ROOT: usize = 0;

// Subdividing past this depth means the two particles cannot be told apart at the working
// precision; the child centers stop moving long before it is reached.
const MAX_DEPTH: usize = 128;

/// A child slot of a node: either one particle of the halo or another node of the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    Particle(usize),
    Node(usize),
}

#[derive(Clone, Debug)]
pub struct Node<F: Float> {
    pub bounds: Bounds<F>,
    pub children: [Option<Slot>; 8],
    pub parent: Option<usize>,
    /// Next slot of the depth-first thread; descends into this node.
    pub next: Option<Slot>,
    /// Slot to continue with when this node's whole subtree is skipped.
    pub sibling: Option<Slot>,
    pub mass: F,
    pub center_of_mass: Vector3<F>,
}

impl<F: Float> Node<F> {
    fn new(bounds: Bounds<F>, parent: Option<usize>) -> Self {
        Self {
            bounds,
            children: [None; 8],
            parent,
            next: None,
            sibling: None,
            mass: F::zero(),
            center_of_mass: bounds.center,
        }
    }
}

/// Octree over the particles of one halo. Nodes live in an arena and address their
/// children through [`Slot`]; once built the tree is threaded so queries walk it without
/// recursion.
#[derive(Clone, Debug)]
pub struct Octree<'a, F: Float> {
    particles: HaloParticles<'a, F>,
    nodes: Vec<Node<F>>,
    particle_parent: Vec<usize>,
    particle_next: Vec<Option<Slot>>,
}

impl<'a, F: Float> Octree<'a, F> {
    /// Inserts every particle under `bounds`, then threads the tree and accumulates the
    /// per-node aggregates. Each particle contributes `particle_mass` to its ancestors.
    pub fn build(
        bounds: Bounds<F>,
        particles: HaloParticles<'a, F>,
        particle_mass: F,
    ) -> Result<Self> {
        let n = particles.len();
        let mut tree = Self {
            particles,
            nodes: Vec::with_capacity(n.max(1)),
            particle_parent: vec![ROOT; n],
            particle_next: vec![None; n],
        };
        tree.nodes.push(Node::new(bounds, None));

        for index in 0..n {
            tree.insert(index)?;
        }
        tree.thread(particle_mass);

        log::debug!(
            "octree built: {} particles, {} nodes, root mass {:?}",
            n,
            tree.nodes.len(),
            tree.nodes[ROOT].mass
        );
        Ok(tree)
    }

    fn insert(&mut self, index: usize) -> Result<()> {
        let position = self.particles.position(index);
        if !self.nodes[ROOT].bounds.contains(&position) {
            return Err(SubhaloError::OutOfBounds { index });
        }

        let mut node = ROOT;
        let mut depth = 0;
        loop {
            let orthant = self.nodes[node].bounds.get_orthant(&position);
            match self.nodes[node].children[orthant] {
                None => {
                    self.nodes[node].children[orthant] = Some(Slot::Particle(index));
                    self.particle_parent[index] = node;
                    return Ok(());
                }
                Some(Slot::Node(child)) => node = child,
                Some(Slot::Particle(other)) => {
                    let other_position = self.particles.position(other);
                    if other_position == position || depth >= MAX_DEPTH {
                        return Err(SubhaloError::CoincidentParticles {
                            first: other,
                            second: index,
                        });
                    }

                    // Push the resident particle one level down and retry from there.
                    let child = self.nodes.len();
                    let mut split = Node::new(self.nodes[node].bounds.create_orthant(orthant), Some(node));
                    let resident = split.bounds.get_orthant(&other_position);
                    split.children[resident] = Some(Slot::Particle(other));
                    self.particle_parent[other] = child;
                    self.nodes.push(split);
                    self.nodes[node].children[orthant] = Some(Slot::Node(child));
                    node = child;
                }
            }
            depth += 1;
        }
    }

    pub fn particles(&self) -> &HaloParticles<'a, F> {
        &self.particles
    }

    pub fn root(&self) -> &Node<F> {
        &self.nodes[ROOT]
    }

    pub fn node(&self, index: usize) -> &Node<F> {
        &self.nodes[index]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Node directly holding the particle.
    pub fn parent_of(&self, particle: usize) -> usize {
        self.particle_parent[particle]
    }

    /// Nodes enclosing a particle, innermost first, ending at the root.
    pub fn ancestors(&self, particle: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(Some(self.particle_parent[particle]), move |&node| {
            self.nodes[node].parent
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct Cloud {
        x: Vec<f64>,
        y: Vec<f64>,
        z: Vec<f64>,
        zeros: Vec<f64>,
        ids: Vec<i64>,
    }

    impl Cloud {
        fn new(points: &[[f64; 3]]) -> Self {
            Self {
                x: points.iter().map(|p| p[0]).collect(),
                y: points.iter().map(|p| p[1]).collect(),
                z: points.iter().map(|p| p[2]).collect(),
                zeros: vec![0.0; points.len()],
                ids: (0..points.len() as i64).collect(),
            }
        }

        fn particles(&self) -> HaloParticles<'_, f64> {
            HaloParticles::new(
                &self.x, &self.y, &self.z, &self.zeros, &self.zeros, &self.zeros, &self.zeros,
                &self.ids,
            )
            .unwrap()
        }
    }

    fn lattice(n: usize) -> Vec<[f64; 3]> {
        let mut points = Vec::new();
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    // Slight shear keeps points off the cell boundaries.
                    points.push([
                        i as f64 + 0.01 * j as f64,
                        j as f64 + 0.013 * k as f64,
                        k as f64 + 0.017 * i as f64,
                    ]);
                }
            }
        }
        points
    }

    fn build(cloud: &Cloud) -> Octree<'_, f64> {
        let particles = cloud.particles();
        let bounds = Bounds::from_points(&particles).unwrap().padded_cube();
        Octree::build(bounds, particles, 1.0).unwrap()
    }

    #[test]
    fn thread_visits_everything_once() {
        let cloud = Cloud::new(&lattice(5));
        let tree = build(&cloud);

        let mut particles = HashSet::new();
        let mut nodes = HashSet::new();
        for slot in tree.traversal() {
            let fresh = match slot {
                Slot::Particle(p) => particles.insert(p),
                Slot::Node(n) => nodes.insert(n),
            };
            assert!(fresh, "{:?} visited twice", slot);
        }
        assert_eq!(particles.len(), 125);
        assert_eq!(nodes.len(), tree.node_count());
    }

    #[test]
    fn parents_lead_to_root() {
        let cloud = Cloud::new(&lattice(4));
        let tree = build(&cloud);
        for p in 0..64 {
            let chain: Vec<usize> = tree.ancestors(p).collect();
            assert_eq!(*chain.last().unwrap(), ROOT);
            assert!(chain.len() <= tree.node_count());
            assert!(tree.node(tree.parent_of(p)).bounds.contains(&cloud.particles().position(p)));
        }
    }

    #[test]
    fn aggregates_match_particles() {
        let cloud = Cloud::new(&lattice(3));
        let tree = build(&cloud);
        let root = tree.root();
        assert!((root.mass - 27.0).abs() < 1e-12);
        let expected = (0..27)
            .map(|i| cloud.particles().position(i))
            .fold(Vector3::zeros(), |acc, p| acc + p)
            / 27.0;
        assert!((root.center_of_mass - expected).norm() < 1e-9);
    }

    #[test]
    fn identical_particles_are_rejected() {
        let cloud = Cloud::new(&[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [1.0, 1.0, 1.0]]);
        let particles = cloud.particles();
        let bounds = Bounds::from_points(&particles).unwrap().padded_cube();
        let err = Octree::build(bounds, particles, 1.0).unwrap_err();
        assert!(matches!(
            err,
            SubhaloError::CoincidentParticles { first: 1, second: 2 }
        ));
    }

    #[test]
    fn particles_outside_the_box_are_rejected() {
        let cloud = Cloud::new(&[[0.0, 0.0, 0.0], [5.0, 0.0, 0.0]]);
        let bounds = Bounds::new(Vector3::zeros(), Vector3::new(1.0, 1.0, 1.0));
        let err = Octree::build(bounds, cloud.particles(), 1.0).unwrap_err();
        assert!(matches!(err, SubhaloError::OutOfBounds { index: 1 }));
    }

    #[test]
    fn single_particle_tree() {
        let cloud = Cloud::new(&[[2.0, 3.0, 4.0]]);
        let tree = build(&cloud);
        assert_eq!(tree.node_count(), 1);
        assert_eq!(
            tree.traversal().collect::<Vec<_>>(),
            vec![Slot::Node(ROOT), Slot::Particle(0)]
        );
    }

    #[test]
    fn range_query_matches_brute_force() {
        let cloud = Cloud::new(&lattice(6));
        let tree = build(&cloud);
        let particles = cloud.particles();
        let center = Vector3::new(2.3, 2.7, 1.9);

        for half_width in [0.4, 1.1, 2.5, 10.0] {
            let mut found = Vec::new();
            tree.range_query(&center, half_width, None, &mut found);
            found.sort_unstable();

            let expected: Vec<usize> = (0..particles.len())
                .filter(|&i| {
                    let d = particles.position(i) - center;
                    d.x.abs() <= half_width && d.y.abs() <= half_width && d.z.abs() <= half_width
                })
                .collect();
            assert_eq!(found, expected, "half width {}", half_width);
        }
    }

    #[test]
    fn range_query_excludes_self_and_may_be_empty() {
        let cloud = Cloud::new(&lattice(3));
        let tree = build(&cloud);
        let center = cloud.particles().position(13);

        let mut found = Vec::new();
        tree.range_query(&center, 0.1, Some(13), &mut found);
        assert!(found.is_empty());

        tree.range_query(&center, 0.1, None, &mut found);
        assert_eq!(found, vec![13]);
    }

    #[test]
    fn subtree_query_stays_inside_subtree() {
        let cloud = Cloud::new(&lattice(4));
        let tree = build(&cloud);
        let start = tree.parent_of(0);
        let mut found = Vec::new();
        tree.range_query_from(start, &Vector3::new(1.5, 1.5, 1.5), 100.0, None, &mut found);
        let bounds = tree.node(start).bounds;
        assert!(found.contains(&0));
        for p in found {
            assert!(bounds.contains(&cloud.particles().position(p)));
        }
    }
}
