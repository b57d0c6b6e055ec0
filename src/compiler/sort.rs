//! State sort and depth ordering.
//!
//! Primitives are ordered so that costly state changes happen as rarely as
//! possible. Within a run of primitives whose state is identical, triangles
//! are then ordered by their planes: back to front when blending, front to
//! back otherwise.

use super::anim::AnimList;
use super::prim::{Plane, Prim, PrimStyle};
use crate::types::{AlphaMode, LightLevel, PrimFlags};
use glam::Vec3;
use std::cmp::Ordering;

fn cmp_light_level(a: &Option<LightLevel>, b: &Option<LightLevel>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a
            .dataref
            .cmp(&b.dataref)
            .then_with(|| a.v1.total_cmp(&b.v1))
            .then_with(|| a.v2.total_cmp(&b.v2)),
    }
}

/// Full render-state comparison.
pub fn state_cmp(a: &Prim, b: &Prim, anims: &AnimList) -> Ordering {
    a.focus
        .cmp(&b.focus)
        .then_with(|| {
            let ka = a.group.as_ref().map(|g| g.sort_key());
            let kb = b.group.as_ref().map(|g| g.sort_key());
            ka.cmp(&kb)
        })
        .then_with(|| cmp_light_level(&a.light_level, &b.light_level))
        .then_with(|| a.alpha.sort_cmp(&b.alpha))
        .then_with(|| (a.flags & PrimFlags::EXPENSIVE).cmp(&(b.flags & PrimFlags::EXPENSIVE)))
        .then_with(|| {
            let ra = a.anim.map(|id| anims.rank(id));
            let rb = b.anim.map(|id| anims.rank(id));
            ra.cmp(&rb)
        })
        .then_with(|| a.material.sort_cmp(&b.material))
        .then_with(|| (a.flags & PrimFlags::CHEAP).cmp(&(b.flags & PrimFlags::CHEAP)))
        .then_with(|| a.region.cmp(&b.region))
        .then_with(|| a.style.cmp(&b.style))
        .then_with(|| a.image.cmp(&b.image))
        .then_with(|| a.manip.cmp(&b.manip))
        .then_with(|| a.surface.cmp(&b.surface))
}

/// Whether `a` lies in front of `b`: more of `a` sits on the front side of
/// `b` than the other way round.
fn in_front(a: &Plane, b: &Plane) -> bool {
    let sa: i32 = a.points.iter().map(|&p| b.side(p)).sum();
    let sb: i32 = b.points.iter().map(|&p| a.side(p)).sum();
    sa > sb
}

/// Whether `x` must be drawn before `y` within a run of equal state.
fn draws_before(x: &Prim, y: &Prim) -> bool {
    let (Some(px), Some(py)) = (&x.plane, &y.plane) else {
        return false;
    };
    match x.alpha.mode {
        AlphaMode::Blend | AlphaMode::ShadowTest => in_front(py, px),
        AlphaMode::Opaque | AlphaMode::Test => in_front(px, py),
    }
}

/// How far a primitive may move during the plane pass.
const DEPTH_WINDOW: usize = 16;

/// Signed depth of a primitive along `axis`; planeless primitives sit at 0.
fn depth_key(prim: &Prim, axis: Vec3) -> f32 {
    prim.plane.as_ref().map_or(0.0, |p| axis.dot(p.centroid))
}

/// Plane ordering is not a total order, so the run is first put in rough
/// order by centroid depth along its mean normal, then an insertion pass
/// moves each primitive past at most `DEPTH_WINDOW` neighbours it must
/// precede.
fn depth_order(run: &mut [Prim]) {
    let blend = matches!(run[0].alpha.mode, AlphaMode::Blend | AlphaMode::ShadowTest);
    let sum: Vec3 = run.iter().filter_map(|p| p.plane.as_ref()).map(|p| p.normal).sum();
    if let Some(axis) = sum.try_normalize() {
        if blend {
            run.sort_by(|a, b| depth_key(a, axis).total_cmp(&depth_key(b, axis)));
        } else {
            run.sort_by(|a, b| depth_key(b, axis).total_cmp(&depth_key(a, axis)));
        }
    }

    for i in 1..run.len() {
        let mut j = i;
        while j > 0 && i - j < DEPTH_WINDOW && draws_before(&run[j], &run[j - 1]) {
            run.swap(j, j - 1);
            j -= 1;
        }
    }
}

/// Sort primitives into emission order.
pub fn sort_prims(prims: &mut [Prim], anims: &AnimList) {
    prims.sort_by(|a, b| state_cmp(a, b, anims));

    let mut start = 0;
    while start < prims.len() {
        let mut end = start + 1;
        while end < prims.len() && state_cmp(&prims[start], &prims[end], anims) == Ordering::Equal {
            end += 1;
        }
        if prims[start].style == PrimStyle::Tri && end - start > 1 {
            depth_order(&mut prims[start..end]);
        }
        start = end;
    }
}
