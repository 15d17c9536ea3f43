use nalgebra::Vector3;
use smallvec::SmallVec;

use super::{Octree, ROOT, Slot};
use crate::shared::Float;

impl<F: Float> Octree<'_, F> {
    /// Links every node and particle into one depth-first chain and records, per node, the
    /// slot that follows its subtree. Aggregate mass and center of mass are accumulated
    /// afterwards, children before parents.
    pub(super) fn thread(&mut self, particle_mass: F) {
        let mut preorder = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![Slot::Node(ROOT)];
        let mut previous: Option<Slot> = None;
        self.nodes[ROOT].sibling = None;

        while let Some(slot) = stack.pop() {
            if let Some(previous) = previous {
                self.set_next(previous, Some(slot));
            }
            previous = Some(slot);

            let Slot::Node(node) = slot else {
                continue;
            };
            preorder.push(node);

            let children: SmallVec<[Slot; 8]> =
                self.nodes[node].children.iter().flatten().copied().collect();
            let inherited = self.nodes[node].sibling;
            for (i, child) in children.iter().enumerate() {
                if let Slot::Node(child) = *child {
                    self.nodes[child].sibling = children.get(i + 1).copied().or(inherited);
                }
            }
            stack.extend(children.into_iter().rev());
        }
        if let Some(last) = previous {
            self.set_next(last, None);
        }

        for &node in preorder.iter().rev() {
            let mut mass = F::zero();
            let mut moment = Vector3::<F>::zeros();
            for child in self.nodes[node].children.iter().flatten() {
                match *child {
                    Slot::Particle(p) => {
                        mass += particle_mass;
                        moment += self.particles.position(p) * particle_mass;
                    }
                    Slot::Node(c) => {
                        let child = &self.nodes[c];
                        mass += child.mass;
                        moment += child.center_of_mass * child.mass;
                    }
                }
            }
            let node = &mut self.nodes[node];
            node.mass = mass;
            if mass > F::zero() {
                node.center_of_mass = moment / mass;
            }
        }
    }

    fn set_next(&mut self, slot: Slot, next: Option<Slot>) {
        match slot {
            Slot::Particle(p) => self.particle_next[p] = next,
            Slot::Node(n) => self.nodes[n].next = next,
        }
    }

    pub(super) fn next_of(&self, slot: Slot) -> Option<Slot> {
        match slot {
            Slot::Particle(p) => self.particle_next[p],
            Slot::Node(n) => self.nodes[n].next,
        }
    }

    /// The threaded chain from the root to the end marker.
    pub fn traversal(&self) -> Traversal<'_, '_, F> {
        Traversal {
            tree: self,
            current: Some(Slot::Node(ROOT)),
        }
    }

    /// Dumps the threaded tree at trace level, one line per node.
    pub fn log_tree(&self) {
        if !log::log_enabled!(log::Level::Trace) {
            return;
        }
        for slot in self.traversal() {
            if let Slot::Node(n) = slot {
                let node = &self.nodes[n];
                let depth = std::iter::successors(node.parent, |&p| self.nodes[p].parent).count();
                log::trace!(
                    "{:indent$}node {} center {:?} half {:?} mass {:?} com {:?}",
                    "",
                    n,
                    node.bounds.center.as_slice(),
                    node.bounds.half_extent.as_slice(),
                    node.mass,
                    node.center_of_mass.as_slice(),
                    indent = depth * 2
                );
            }
        }
    }
}

pub struct Traversal<'t, 'a, F: Float> {
    tree: &'t Octree<'a, F>,
    current: Option<Slot>,
}

impl<F: Float> Iterator for Traversal<'_, '_, F> {
    type Item = Slot;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.current?;
        self.current = self.tree.next_of(slot);
        Some(slot)
    }
}
