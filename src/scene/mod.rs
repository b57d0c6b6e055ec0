//! The abstract scene the exporter reads.
//!
//! The host application (or the JSON [`SceneDocument`]) exposes its
//! entities, mesh faces, armature bones and frame counter through the
//! [`Scene`] trait. Everything here is in host coordinates (Z up).

mod document;
mod frame;
mod properties;

pub use document::{BoneDoc, EntityDoc, EntityKindDoc, FaceDoc, KeyDoc, SceneDocument};
pub use frame::FrameGuard;
pub use properties::{Properties, Property, PropertyValue};

use glam::{Mat4, Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Index of an entity within its scene.
pub type EntityId = usize;

/// A scene entity.
#[derive(Debug, Clone)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
    pub parent: Option<EntityId>,
    /// Bone name when parented to an armature bone.
    pub parent_bone: Option<String>,
    /// Host layer bitmask. Bits 0..3 are the LOD layers.
    pub layers: u32,
    pub group: Option<String>,
    pub properties: Properties,
}

#[derive(Debug, Clone)]
pub enum EntityKind {
    Mesh {
        mesh_name: String,
        materials: Vec<SceneMaterial>,
    },
    Lamp(Lamp),
    Empty,
    Armature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LampKind {
    Point,
    Spot,
    Sun,
    Hemi,
    Area,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lamp {
    #[serde(rename = "type")]
    pub kind: LampKind,
    #[serde(default = "white")]
    pub color: [f32; 3],
    #[serde(default = "one")]
    pub energy: f32,
    #[serde(default = "default_distance")]
    pub distance: f32,
    /// Full cone angle in degrees.
    #[serde(default = "default_spot_size")]
    pub spot_size: f32,
}

/// A host material slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneMaterial {
    #[serde(default = "white")]
    pub diffuse: [f32; 3],
    #[serde(default)]
    pub emission: [f32; 3],
    #[serde(default)]
    pub shiny: f32,
    #[serde(default = "one")]
    pub alpha: f32,
    /// Halo materials turn the mesh's vertices into custom lights.
    #[serde(default)]
    pub halo: bool,
    #[serde(default = "one")]
    pub halo_size: f32,
}

impl Default for SceneMaterial {
    fn default() -> Self {
        Self {
            diffuse: white(),
            emission: [0.0; 3],
            shiny: 0.0,
            alpha: 1.0,
            halo: false,
            halo_size: 1.0,
        }
    }
}

fn white() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn one() -> f32 {
    1.0
}

fn default_distance() -> f32 {
    20.0
}

fn default_spot_size() -> f32 {
    45.0
}

bitflags::bitflags! {
    /// Face mode bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FaceMode: u8 {
        const TEX       = 1 << 0;
        const TWOSIDE   = 1 << 1;
        const TILES     = 1 << 2;
        const LIGHT     = 1 << 3;
        const DYNAMIC   = 1 << 4;
        const SHADOW    = 1 << 5;
        const INVISIBLE = 1 << 6;
    }
}

impl FaceMode {
    /// The host's default for new faces.
    pub fn standard() -> Self {
        Self::TEX | Self::DYNAMIC
    }

    /// Parse a mode token (case-insensitive).
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_lowercase().as_str() {
            "tex" => Some(Self::TEX),
            "twoside" => Some(Self::TWOSIDE),
            "tiles" => Some(Self::TILES),
            "light" => Some(Self::LIGHT),
            "dynamic" => Some(Self::DYNAMIC),
            "shadow" => Some(Self::SHADOW),
            "invisible" => Some(Self::INVISIBLE),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transparency {
    #[default]
    None,
    Alpha,
    Clip,
}

/// One face corner in object space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corner {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Option<Vec2>,
    pub vertex_index: usize,
}

/// A mesh face with 3 or 4 corners.
#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    pub corners: Vec<Corner>,
    /// Face normal in object space.
    pub normal: Vec3,
    pub smooth: bool,
    pub mode: FaceMode,
    pub transparency: Transparency,
    pub material: Option<usize>,
    pub image: Option<String>,
}

/// A bone pose at one frame, relative to rest and in armature axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneKey {
    pub loc: Vec3,
    pub rot: Quat,
}

impl BoneKey {
    pub const REST: BoneKey = BoneKey {
        loc: Vec3::ZERO,
        rot: Quat::IDENTITY,
    };
}

/// An armature bone with its sampled keyframes.
#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    pub name: String,
    pub parent: Option<usize>,
    /// Rest head in armature space.
    pub head: Vec3,
    /// Rest tail in armature space.
    pub tail: Vec3,
    pub connected: bool,
    /// `keys[k]` is the pose at frame `k + 1`.
    pub keys: Vec<BoneKey>,
}

impl Bone {
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Sample the pose at a 1-based frame, holding the last key past the end.
    pub fn sample(&self, frame: usize) -> BoneKey {
        let key = match self.keys.len() {
            0 => BoneKey::REST,
            n => self.keys[frame.clamp(1, n) - 1],
        };
        if self.connected {
            BoneKey {
                loc: Vec3::ZERO,
                rot: key.rot,
            }
        } else {
            key
        }
    }
}

/// Read access to a host scene.
pub trait Scene {
    /// All entities in scene order.
    fn entities(&self) -> Box<dyn Iterator<Item = (EntityId, &Entity)> + '_>;

    fn entity(&self, id: EntityId) -> Option<&Entity>;

    /// Faces of a mesh entity, produced lazily.
    fn mesh_faces(&self, id: EntityId) -> Box<dyn Iterator<Item = Face> + '_>;

    /// Bones of an armature entity; parents precede children.
    fn armature_bones(&self, id: EntityId) -> &[Bone];

    /// World transform of an entity at the current frame.
    fn world_matrix(&self, id: EntityId) -> Mat4;

    fn current_frame(&self) -> i32;

    fn set_current_frame(&mut self, frame: i32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bone_sample_clamps() {
        let bone = Bone {
            name: "b".into(),
            parent: None,
            head: Vec3::ZERO,
            tail: Vec3::Z,
            connected: false,
            keys: vec![
                BoneKey {
                    loc: Vec3::X,
                    rot: Quat::IDENTITY,
                },
                BoneKey {
                    loc: Vec3::Y,
                    rot: Quat::IDENTITY,
                },
            ],
        };
        assert_eq!(bone.sample(1).loc, Vec3::X);
        assert_eq!(bone.sample(5).loc, Vec3::Y);
        assert_eq!(bone.sample(0).loc, Vec3::X);
    }

    #[test]
    fn test_connected_bone_ignores_loc() {
        let bone = Bone {
            name: "b".into(),
            parent: Some(0),
            head: Vec3::ZERO,
            tail: Vec3::Z,
            connected: true,
            keys: vec![BoneKey {
                loc: Vec3::X,
                rot: Quat::IDENTITY,
            }],
        };
        assert_eq!(bone.sample(1).loc, Vec3::ZERO);
    }

    #[test]
    fn test_face_mode_tokens() {
        let mode = FaceMode::from_token("TILES").unwrap() | FaceMode::TEX;
        assert!(mode.contains(FaceMode::TILES));
        assert!(!mode.contains(FaceMode::DYNAMIC));
        assert!(FaceMode::standard().contains(FaceMode::DYNAMIC));
    }
}
