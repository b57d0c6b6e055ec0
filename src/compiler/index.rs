//! Index compaction: lay sorted primitives out in the shared index table.

use super::pool::LightVertex;
use super::prim::{Prim, PrimStyle};

/// Append each primitive's indices to one table in sorted order and record
/// its `(offset, count)`. Indexed lights are renumbered by first use so the
/// returned light table is in emission order.
pub fn compact(prims: &mut [Prim], lights: &[LightVertex]) -> (Vec<u32>, Vec<LightVertex>) {
    let mut idx = Vec::new();
    let mut table = Vec::new();
    let mut remap: Vec<Option<usize>> = vec![None; lights.len()];

    for prim in prims.iter_mut() {
        match prim.style {
            PrimStyle::Tri | PrimStyle::Line => {
                prim.offset = idx.len();
                match prim.indices.as_slice() {
                    [a, b, c, d] if prim.style == PrimStyle::Tri => {
                        idx.extend_from_slice(&[*a, *b, *c, *a, *c, *d]);
                    }
                    other => idx.extend_from_slice(other),
                }
                prim.count = idx.len() - prim.offset;
            }
            PrimStyle::VLight => {
                let Some(&source) = prim.indices.first() else {
                    continue;
                };
                let source = source as usize;
                let slot = match remap.get(source).copied().flatten() {
                    Some(slot) => slot,
                    None => {
                        let Some(light) = lights.get(source) else {
                            continue;
                        };
                        table.push(*light);
                        let slot = table.len() - 1;
                        remap[source] = Some(slot);
                        slot
                    }
                };
                prim.offset = slot;
                prim.count = 1;
            }
            PrimStyle::Light => {}
        }
    }

    log::debug!("{} indices, {} indexed lights", idx.len(), table.len());
    (idx, table)
}
