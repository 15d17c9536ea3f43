// This file defines the numeric and geometric types shared by the tree, the density
// estimator and the substructure passes.

use nalgebra::{RealField, Vector3, convert};
use num_traits::ToPrimitive;

use crate::error::{Result, SubhaloError};

pub trait Float: RealField + Copy + ToPrimitive {}

impl<T> Float for T where T: RealField + Copy + ToPrimitive {}

/// Shorthand for turning a literal into the working scalar.
#[inline]
pub fn lit<F: Float>(value: f64) -> F {
    convert::<f64, F>(value)
}

/// An axis-aligned box described by its center and the half extent along each axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds<F: Float> {
    pub center: Vector3<F>,
    pub half_extent: Vector3<F>,
}

impl<F: Float> Bounds<F> {
    pub fn new(center: Vector3<F>, half_extent: Vector3<F>) -> Self {
        Self {
            center,
            half_extent,
        }
    }

    pub fn from_min_max(min: Vector3<F>, max: Vector3<F>) -> Self {
        let half: F = lit(0.5);
        Self {
            center: (min + max) * half,
            half_extent: (max - min) * half,
        }
    }

    /// Tight box around every particle of a halo.
    pub fn from_points(particles: &HaloParticles<'_, F>) -> Option<Self> {
        if particles.is_empty() {
            return None;
        }
        let first = particles.position(0);
        let (min, max) = (1..particles.len()).fold((first, first), |(min, max), i| {
            let p = particles.position(i);
            (min.inf(&p), max.sup(&p))
        });
        Some(Self::from_min_max(min, max))
    }

    /// Cube sharing this box's center whose half side is the largest half extent, widened
    /// so that rounding in the center cannot push the extreme points outside.
    pub fn padded_cube(&self) -> Self {
        let half = self.size() * lit(1.001) + lit(1e-6);
        Self {
            center: self.center,
            half_extent: Vector3::repeat(half),
        }
    }

    pub fn min(&self) -> Vector3<F> {
        self.center - self.half_extent
    }

    pub fn max(&self) -> Vector3<F> {
        self.center + self.half_extent
    }

    /// Largest half extent, used as the characteristic size of a tree cell.
    pub fn size(&self) -> F {
        self.half_extent.max()
    }

    pub fn get_orthant(&self, point: &Vector3<F>) -> usize {
        let mut orthant = 0;
        for axis in 0..3 {
            if point[axis] >= self.center[axis] {
                orthant |= 1 << axis;
            }
        }
        orthant
    }

    pub fn create_orthant(&self, orthant: usize) -> Self {
        let half: F = lit(0.5);
        let half_extent = self.half_extent * half;
        let mut center = self.center;
        for axis in 0..3 {
            if orthant & (1 << axis) != 0 {
                center[axis] += half_extent[axis];
            } else {
                center[axis] -= half_extent[axis];
            }
        }
        Self {
            center,
            half_extent,
        }
    }

    pub fn contains(&self, point: &Vector3<F>) -> bool {
        (0..3).all(|axis| (point[axis] - self.center[axis]).abs() <= self.half_extent[axis])
    }

    pub fn overlaps(&self, other: &Bounds<F>) -> bool {
        (0..3).all(|axis| {
            (self.center[axis] - other.center[axis]).abs()
                <= self.half_extent[axis] + other.half_extent[axis]
        })
    }
}

/// The particle arrays of one halo. The finder borrows them for the duration of a run and
/// never reorders them; `id` is an external tag carried through to output only.
#[derive(Clone, Copy, Debug)]
pub struct HaloParticles<'a, F: Float> {
    pub x: &'a [F],
    pub y: &'a [F],
    pub z: &'a [F],
    pub vx: &'a [F],
    pub vy: &'a [F],
    pub vz: &'a [F],
    pub mass: &'a [F],
    pub id: &'a [i64],
}

impl<'a, F: Float> HaloParticles<'a, F> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        x: &'a [F],
        y: &'a [F],
        z: &'a [F],
        vx: &'a [F],
        vy: &'a [F],
        vz: &'a [F],
        mass: &'a [F],
        id: &'a [i64],
    ) -> Result<Self> {
        let expected = x.len();
        let lengths = [
            ("y", y.len()),
            ("z", z.len()),
            ("vx", vx.len()),
            ("vy", vy.len()),
            ("vz", vz.len()),
            ("mass", mass.len()),
            ("id", id.len()),
        ];
        for (name, actual) in lengths {
            if actual != expected {
                return Err(SubhaloError::LengthMismatch {
                    name,
                    expected,
                    actual,
                });
            }
        }
        Ok(Self {
            x,
            y,
            z,
            vx,
            vy,
            vz,
            mass,
            id,
        })
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    #[inline]
    pub fn position(&self, index: usize) -> Vector3<F> {
        Vector3::new(self.x[index], self.y[index], self.z[index])
    }

    #[inline]
    pub fn velocity(&self, index: usize) -> Vector3<F> {
        Vector3::new(self.vx[index], self.vy[index], self.vz[index])
    }

    #[inline]
    pub fn get_mass(&self, index: usize) -> F {
        self.mass[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orthants_split_along_each_axis() {
        let bounds = Bounds::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(bounds.get_orthant(&Vector3::new(-0.5, -0.5, -0.5)), 0);
        assert_eq!(bounds.get_orthant(&Vector3::new(0.5, -0.5, -0.5)), 1);
        assert_eq!(bounds.get_orthant(&Vector3::new(-0.5, 0.5, -0.5)), 2);
        assert_eq!(bounds.get_orthant(&Vector3::new(0.5, 0.5, 0.5)), 7);

        let child = bounds.create_orthant(5);
        assert_eq!(child.center, Vector3::new(0.5, -0.5, 0.5));
        assert_eq!(child.half_extent, Vector3::new(0.5, 0.5, 0.5));
        assert!(child.contains(&Vector3::new(0.9, -0.1, 0.2)));
        assert!(!child.contains(&Vector3::new(-0.1, -0.1, 0.2)));
    }

    #[test]
    fn overlap_is_symmetric_and_touching_counts() {
        let a = Bounds::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        let b = Bounds::new(Vector3::new(2.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        let c = Bounds::new(Vector3::new(3.5, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        assert!(a.overlaps(&b) && b.overlaps(&a));
        assert!(!a.overlaps(&c) && !c.overlaps(&a));
    }

    #[test]
    fn mismatched_arrays_are_rejected() {
        let pos = [0.0f64, 1.0];
        let short = [0.0f64];
        let ids = [1i64, 2];
        let err = HaloParticles::new(&pos, &pos, &pos, &pos, &short, &pos, &pos, &ids).unwrap_err();
        assert!(matches!(
            err,
            SubhaloError::LengthMismatch {
                name: "vy",
                expected: 2,
                actual: 1
            }
        ));
    }
}
