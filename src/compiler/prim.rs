//! Primitives: the drawable units that get sorted and emitted.

use super::anim::AnimId;
use crate::types::{Alpha, Group, LightLevel, Material, PrimFlags, Surface};
use glam::Vec3;

/// Primitive style. Declaration order is sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrimStyle {
    Tri,
    Line,
    VLight,
    Light,
}

/// A light carried inline on its primitive rather than pooled.
#[derive(Debug, Clone, PartialEq)]
pub enum InlineLight {
    Named {
        name: String,
        position: Vec3,
    },
    Param {
        name: String,
        position: Vec3,
        params: String,
    },
    Custom {
        position: Vec3,
        rgba: [f32; 4],
        size: f32,
        /// `s1 t1 s2 t2`
        uv: [f32; 4],
        dataref: String,
    },
    Spill {
        position: Vec3,
        rgba: [f32; 4],
        size: f32,
        direction: Vec3,
        /// Cosine of the cone half angle.
        semi: f32,
        dataref: String,
    },
    Smoke {
        black: bool,
        position: Vec3,
        size: f32,
    },
}

/// Cached plane of a triangle for depth ordering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub points: [Vec3; 3],
    pub normal: Vec3,
    pub d: f32,
    pub centroid: Vec3,
}

impl Plane {
    /// `None` for degenerate triangles.
    pub fn from_points(a: Vec3, b: Vec3, c: Vec3) -> Option<Self> {
        let normal = (b - a).cross(c - a).try_normalize()?;
        Some(Self {
            points: [a, b, c],
            normal,
            d: -normal.dot(a),
            centroid: (a + b + c) / 3.0,
        })
    }

    /// -1, 0 or 1 depending on which side of the plane `p` lies.
    pub fn side(&self, p: Vec3) -> i32 {
        let dist = self.normal.dot(p) + self.d;
        if dist > 1e-4 {
            1
        } else if dist < -1e-4 {
            -1
        } else {
            0
        }
    }
}

/// One primitive with its complete render state.
#[derive(Debug, Clone)]
pub struct Prim {
    pub style: PrimStyle,
    /// Pool indices: 3 or 4 into `VT` for Tri, 2 into `VLINE` for Line,
    /// 1 into the light pool for VLight, none for Light.
    pub indices: Vec<u32>,
    pub light: Option<InlineLight>,
    pub group: Option<Group>,
    /// LOD layer bits 0..3.
    pub layers: u8,
    /// The single LOD layer (0-based) this primitive is emitted in.
    pub focus: u8,
    pub material: Material,
    pub surface: Surface,
    pub flags: PrimFlags,
    pub alpha: Alpha,
    /// Cockpit region index, or -1.
    pub region: i32,
    pub image: Option<String>,
    pub light_level: Option<LightLevel>,
    /// The manipulator command line; empty for none.
    pub manip: String,
    pub anim: Option<AnimId>,
    pub plane: Option<Plane>,
    /// Index-table range (Tri/Line) or light-table offset (VLight).
    pub offset: usize,
    pub count: usize,
    /// Name of the scene object this primitive came from.
    pub object: String,
}

impl Prim {
    pub fn new(style: PrimStyle, object: impl Into<String>) -> Self {
        Self {
            style,
            indices: Vec::new(),
            light: None,
            group: None,
            layers: 1,
            focus: 0,
            material: Material::Default,
            surface: Surface::None,
            flags: PrimFlags::empty(),
            alpha: Alpha::OPAQUE,
            region: -1,
            image: None,
            light_level: None,
            manip: String::new(),
            anim: None,
            plane: None,
            offset: 0,
            count: 0,
            object: object.into(),
        }
    }

    pub fn is_hard(&self) -> bool {
        self.flags.contains(PrimFlags::HARD) || self.flags.contains(PrimFlags::DECK)
    }

    pub fn is_draped(&self) -> bool {
        self.flags.contains(PrimFlags::DRAPED)
    }

    /// Number of index-table entries this primitive will occupy.
    pub fn index_count(&self) -> usize {
        match (self.style, self.indices.len()) {
            (PrimStyle::Tri, 4) => 6,
            (PrimStyle::Tri, n) | (PrimStyle::Line, n) => n,
            _ => 0,
        }
    }
}
