use std::io::Write;

use bytemuck::{Pod, Zeroable};
use num_traits::ToPrimitive;

use crate::error::{Result, SubhaloError};
use crate::shared::{Float, HaloParticles};
use crate::subhalo::SubhaloTable;

/// One particle of the flat debug dump, in native byte order. `group` is the subhalo index
/// plus one, zero for the fuzz.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DebugRecord {
    pub x: f32,
    pub vx: f32,
    pub y: f32,
    pub vy: f32,
    pub z: f32,
    pub vz: f32,
    pub group: f32,
    pub tag: i32,
}

fn narrow<F: Float>(value: F) -> f32 {
    value.to_f32().unwrap_or(f32::NAN)
}

/// One record per particle. Fails when a tag does not fit in the record's `i32`.
pub fn debug_records<F: Float>(
    particles: &HaloParticles<'_, F>,
    table: &SubhaloTable,
) -> Result<Vec<DebugRecord>> {
    let assignment = table.assignment();
    (0..particles.len())
        .map(|p| {
            let tag = particles.id[p];
            Ok(DebugRecord {
                x: narrow(particles.x[p]),
                vx: narrow(particles.vx[p]),
                y: narrow(particles.y[p]),
                vy: narrow(particles.vy[p]),
                z: narrow(particles.z[p]),
                vz: narrow(particles.vz[p]),
                group: assignment[p].map_or(0.0, |s| (s + 1) as f32),
                tag: i32::try_from(tag).map_err(|_| SubhaloError::TagOverflow { index: p, tag })?,
            })
        })
        .collect()
}

pub fn write_debug_records<W: Write>(writer: &mut W, records: &[DebugRecord]) -> Result<()> {
    writer.write_all(bytemuck::cast_slice(records))?;
    Ok(())
}
