//! Render-state values carried by every primitive.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Maximum number of cockpit regions an object may declare.
pub const MAX_COCKPIT_REGIONS: usize = 4;

/// Ground-contact classification used by hard surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    #[default]
    None,
    Water,
    Concrete,
    Asphalt,
    Grass,
    Dirt,
    Gravel,
    Lakebed,
    Snow,
    Shoulder,
    Blastpad,
}

impl Surface {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "" | "none" => Some(Surface::None),
            "water" => Some(Surface::Water),
            "concrete" => Some(Surface::Concrete),
            "asphalt" => Some(Surface::Asphalt),
            "grass" => Some(Surface::Grass),
            "dirt" => Some(Surface::Dirt),
            "gravel" => Some(Surface::Gravel),
            "lakebed" => Some(Surface::Lakebed),
            "snow" => Some(Surface::Snow),
            "shoulder" => Some(Surface::Shoulder),
            "blastpad" => Some(Surface::Blastpad),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Surface::None)
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Surface::None => "none",
            Surface::Water => "water",
            Surface::Concrete => "concrete",
            Surface::Asphalt => "asphalt",
            Surface::Grass => "grass",
            Surface::Dirt => "dirt",
            Surface::Gravel => "gravel",
            Surface::Lakebed => "lakebed",
            Surface::Snow => "snow",
            Surface::Shoulder => "shoulder",
            Surface::Blastpad => "blastpad",
        };
        f.write_str(name)
    }
}

/// How a primitive's texture alpha is treated. Declaration order is sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AlphaMode {
    /// Blend-mode agnostic; may inherit whatever mode is active.
    Opaque,
    /// Alpha test (`ATTR_no_blend`).
    Test,
    /// Blend, but test for shadows (`ATTR_shadow_blend`).
    ShadowTest,
    /// Full blending (`ATTR_blend`, the default state).
    Blend,
}

/// Alpha mode plus its cutoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alpha {
    pub mode: AlphaMode,
    pub cutoff: f32,
}

impl Alpha {
    pub const OPAQUE: Alpha = Alpha {
        mode: AlphaMode::Opaque,
        cutoff: 0.0,
    };

    pub const BLEND: Alpha = Alpha {
        mode: AlphaMode::Blend,
        cutoff: 0.0,
    };

    pub fn test(cutoff: f32) -> Self {
        Self {
            mode: AlphaMode::Test,
            cutoff,
        }
    }

    pub fn shadow_test(cutoff: f32) -> Self {
        Self {
            mode: AlphaMode::ShadowTest,
            cutoff,
        }
    }

    pub fn is_opaque(&self) -> bool {
        self.mode == AlphaMode::Opaque
    }

    pub fn sort_cmp(&self, other: &Alpha) -> Ordering {
        self.mode
            .cmp(&other.mode)
            .then_with(|| self.cutoff.total_cmp(&other.cutoff))
    }
}

impl fmt::Display for Alpha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            AlphaMode::Opaque => write!(f, "opaque"),
            AlphaMode::Test => write!(f, "alpha test {:.2}", self.cutoff),
            AlphaMode::ShadowTest => write!(f, "shadow blend {:.2}", self.cutoff),
            AlphaMode::Blend => write!(f, "blend"),
        }
    }
}

bitflags::bitflags! {
    /// Per-primitive state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
    pub struct PrimFlags: u16 {
        const HARD         = 1 << 0;
        const DECK         = 1 << 1;
        const NSHADOW      = 1 << 2;
        const DRAW_DISABLE = 1 << 3;
        const SOLID_CAMERA = 1 << 4;
        const TWOSIDE      = 1 << 5;
        const PANEL        = 1 << 6;
        const NPOLY        = 1 << 7;
        const DRAPED       = 1 << 8;

        /// Bits that force a costly state change; they sort ahead of animation.
        const EXPENSIVE = Self::PANEL.bits() | Self::NPOLY.bits() | Self::DRAPED.bits();
        /// Bits that are cheap to toggle; they sort after material.
        const CHEAP = Self::HARD.bits()
            | Self::DECK.bits()
            | Self::NSHADOW.bits()
            | Self::TWOSIDE.bits()
            | Self::DRAW_DISABLE.bits()
            | Self::SOLID_CAMERA.bits();
    }
}

/// Lighting material. `Default` is a distinct sentinel that sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Material {
    #[default]
    Default,
    Custom {
        diffuse: [f32; 3],
        emission: [f32; 3],
        shiny: f32,
    },
}

impl Material {
    pub const DEFAULT_DIFFUSE: [f32; 3] = [1.0, 1.0, 1.0];
    pub const DEFAULT_EMISSION: [f32; 3] = [0.0, 0.0, 0.0];

    /// Build a material, folding default values into the sentinel.
    pub fn new(diffuse: [f32; 3], emission: [f32; 3], shiny: f32) -> Self {
        let is_default = near3(diffuse, Self::DEFAULT_DIFFUSE)
            && near3(emission, Self::DEFAULT_EMISSION)
            && shiny.abs() < 1e-3;
        if is_default {
            Material::Default
        } else {
            Material::Custom {
                diffuse,
                emission,
                shiny,
            }
        }
    }

    pub fn diffuse(&self) -> [f32; 3] {
        match self {
            Material::Default => Self::DEFAULT_DIFFUSE,
            Material::Custom { diffuse, .. } => *diffuse,
        }
    }

    pub fn emission(&self) -> [f32; 3] {
        match self {
            Material::Default => Self::DEFAULT_EMISSION,
            Material::Custom { emission, .. } => *emission,
        }
    }

    pub fn shiny(&self) -> f32 {
        match self {
            Material::Default => 0.0,
            Material::Custom { shiny, .. } => *shiny,
        }
    }

    pub fn sort_cmp(&self, other: &Material) -> Ordering {
        match (self, other) {
            (Material::Default, Material::Default) => Ordering::Equal,
            (Material::Default, _) => Ordering::Less,
            (_, Material::Default) => Ordering::Greater,
            (a, b) => cmp3(a.diffuse(), b.diffuse())
                .then_with(|| cmp3(a.emission(), b.emission()))
                .then_with(|| a.shiny().total_cmp(&b.shiny())),
        }
    }
}

fn near3(a: [f32; 3], b: [f32; 3]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-3)
}

fn cmp3(a: [f32; 3], b: [f32; 3]) -> Ordering {
    a[0].total_cmp(&b[0])
        .then_with(|| a[1].total_cmp(&b[1]))
        .then_with(|| a[2].total_cmp(&b[2]))
}

/// `ATTR_light_level` parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct LightLevel {
    pub v1: f32,
    pub v2: f32,
    pub dataref: String,
}

/// A rectangle of the panel texture in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CockpitRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CockpitRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_power_of_two(&self) -> bool {
        self.width.is_power_of_two() && self.height.is_power_of_two()
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn top(&self) -> u32 {
        self.y + self.height
    }

    /// Whether the pixel rectangle `[min, max]` lies inside this region.
    pub fn contains(&self, min: [f32; 2], max: [f32; 2]) -> bool {
        const SLOP: f32 = 0.5;
        min[0] >= self.x as f32 - SLOP
            && min[1] >= self.y as f32 - SLOP
            && max[0] <= self.right() as f32 + SLOP
            && max[1] <= self.top() as f32 + SLOP
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpha_order() {
        assert!(AlphaMode::Opaque < AlphaMode::Test);
        assert!(AlphaMode::Test < AlphaMode::ShadowTest);
        assert!(AlphaMode::ShadowTest < AlphaMode::Blend);
        assert_eq!(Alpha::test(0.5).sort_cmp(&Alpha::test(0.25)), Ordering::Greater);
    }

    #[test]
    fn test_default_material_folds() {
        assert_eq!(Material::new([1.0; 3], [0.0; 3], 0.0), Material::Default);
        let red = Material::new([1.0, 0.0, 0.0], [0.0; 3], 0.0);
        assert_eq!(Material::Default.sort_cmp(&red), Ordering::Less);
        assert_eq!(red.diffuse(), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_flags() {
        let mut flags = PrimFlags::empty();
        flags.insert(PrimFlags::HARD | PrimFlags::DRAPED);
        assert!(flags.contains(PrimFlags::HARD));
        assert_eq!(flags & PrimFlags::EXPENSIVE, PrimFlags::DRAPED);
        flags.set(PrimFlags::HARD, false);
        assert!(!flags.contains(PrimFlags::HARD));
    }

    #[test]
    fn test_surface_round_trip_names() {
        assert_eq!(Surface::from_str("Concrete"), Some(Surface::Concrete));
        assert_eq!(Surface::Blastpad.to_string(), "blastpad");
        assert_eq!(Surface::from_str("lava"), None);
    }

    #[test]
    fn test_region_contains() {
        let region = CockpitRegion::new(0, 512, 512, 256);
        assert!(region.is_power_of_two());
        assert!(region.contains([10.0, 520.0], [500.0, 760.0]));
        assert!(!region.contains([10.0, 100.0], [500.0, 760.0]));
    }
}
