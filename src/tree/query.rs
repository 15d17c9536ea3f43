use nalgebra::Vector3;

use super::{Octree, ROOT, Slot};
use crate::shared::{Bounds, Float};

impl<F: Float> Octree<'_, F> {
    /// Collects every particle inside the cube of the given half width around `center`.
    /// Callers apply their own spherical cut.
    pub fn range_query(
        &self,
        center: &Vector3<F>,
        half_width: F,
        exclude: Option<usize>,
        out: &mut Vec<usize>,
    ) {
        self.range_query_from(ROOT, center, half_width, exclude, out);
    }

    /// Same as [`range_query`](Self::range_query) restricted to the subtree of `start`.
    pub fn range_query_from(
        &self,
        start: usize,
        center: &Vector3<F>,
        half_width: F,
        exclude: Option<usize>,
        out: &mut Vec<usize>,
    ) {
        let query = Bounds::new(*center, Vector3::repeat(half_width));
        let stop = self.nodes[start].sibling;
        let mut current = Some(Slot::Node(start));

        while let Some(slot) = current {
            if Some(slot) == stop {
                break;
            }
            current = match slot {
                Slot::Particle(p) => {
                    if exclude != Some(p) && query.contains(&self.particles.position(p)) {
                        out.push(p);
                    }
                    self.particle_next[p]
                }
                Slot::Node(n) => {
                    let node = &self.nodes[n];
                    if node.bounds.overlaps(&query) {
                        node.next
                    } else {
                        node.sibling
                    }
                }
            };
        }
    }
}
