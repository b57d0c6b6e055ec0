//! A JSON scene snapshot implementing [`Scene`].
//!
//! This is how the command-line tool and the tests feed scenes to the
//! exporter. The document is a frame-1 snapshot: world matrices are fixed,
//! bone poses for later frames come from each bone's keys.

use super::{
    Bone, BoneKey, Corner, Entity, EntityId, EntityKind, Face, FaceMode, Lamp, Properties, Scene,
    SceneMaterial, Transparency,
};
use crate::compiler::CompilerConfig;
use crate::error::Result;
use crate::resolver::DatarefEntry;
use glam::{Mat4, Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKindDoc {
    Mesh,
    Lamp,
    #[default]
    Empty,
    Armature,
}

/// One face as written in the document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceDoc {
    pub verts: Vec<usize>,
    pub uv: Option<Vec<[f32; 2]>>,
    pub smooth: bool,
    /// Mode tokens; `None` means the host default (`tex`, `dynamic`).
    pub mode: Option<Vec<String>>,
    pub transparency: Transparency,
    pub material: Option<usize>,
    pub image: Option<String>,
}

impl FaceDoc {
    pub fn new(verts: Vec<usize>) -> Self {
        Self {
            verts,
            ..Self::default()
        }
    }

    pub fn with_uv(mut self, uv: Vec<[f32; 2]>) -> Self {
        self.uv = Some(uv);
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_mode(mut self, tokens: &[&str]) -> Self {
        self.mode = Some(tokens.iter().map(|t| t.to_string()).collect());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyDoc {
    pub loc: [f32; 3],
    /// `[w, x, y, z]`
    pub rot: [f32; 4],
}

impl Default for KeyDoc {
    fn default() -> Self {
        Self {
            loc: [0.0; 3],
            rot: [1.0, 0.0, 0.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BoneDoc {
    pub name: String,
    pub parent: Option<String>,
    pub head: [f32; 3],
    pub tail: [f32; 3],
    pub connected: bool,
    pub keys: Vec<KeyDoc>,
}

/// One entity as written in the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityDoc {
    pub name: String,
    pub kind: EntityKindDoc,
    pub parent: Option<String>,
    pub parent_bone: Option<String>,
    pub layers: u32,
    pub group: Option<String>,
    /// Column-major world matrix at frame 1.
    pub matrix: [[f32; 4]; 4],
    pub properties: Properties,
    pub mesh_name: Option<String>,
    pub materials: Vec<SceneMaterial>,
    pub vertices: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub faces: Vec<FaceDoc>,
    pub lamp: Option<Lamp>,
    pub bones: Vec<BoneDoc>,
}

impl Default for EntityDoc {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: EntityKindDoc::Empty,
            parent: None,
            parent_bone: None,
            layers: 1,
            group: None,
            matrix: Mat4::IDENTITY.to_cols_array_2d(),
            properties: Properties::new(),
            mesh_name: None,
            materials: Vec::new(),
            vertices: Vec::new(),
            normals: Vec::new(),
            faces: Vec::new(),
            lamp: None,
            bones: Vec::new(),
        }
    }
}

impl EntityDoc {
    pub fn new(name: impl Into<String>, kind: EntityKindDoc) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Self::default()
        }
    }

    pub fn mesh(name: impl Into<String>, vertices: Vec<[f32; 3]>, faces: Vec<FaceDoc>) -> Self {
        Self {
            vertices,
            faces,
            ..Self::new(name, EntityKindDoc::Mesh)
        }
    }

    pub fn lamp(name: impl Into<String>, lamp: Lamp) -> Self {
        Self {
            lamp: Some(lamp),
            ..Self::new(name, EntityKindDoc::Lamp)
        }
    }

    pub fn at(mut self, translation: [f32; 3]) -> Self {
        self.matrix = Mat4::from_translation(Vec3::from(translation)).to_cols_array_2d();
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>, bone: Option<&str>) -> Self {
        self.parent = Some(parent.into());
        self.parent_bone = bone.map(str::to_string);
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }
}

/// The on-disk document shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct DocumentFile {
    config: Option<CompilerConfig>,
    datarefs: Vec<DatarefEntry>,
    entities: Vec<EntityDoc>,
}

struct MeshData {
    vertices: Vec<Vec3>,
    normals: Vec<Vec3>,
    faces: Vec<FaceDoc>,
}

/// A loaded scene snapshot.
#[derive(Default)]
pub struct SceneDocument {
    /// Export settings carried by the document, if any.
    pub config: Option<CompilerConfig>,
    /// Extra datarefs to register before export.
    pub datarefs: Vec<DatarefEntry>,
    entities: Vec<Entity>,
    matrices: Vec<Mat4>,
    meshes: HashMap<EntityId, MeshData>,
    bones: HashMap<EntityId, Vec<Bone>>,
    current_frame: i32,
}

fn invalid(msg: String) -> crate::error::ExportError {
    <serde_json::Error as serde::de::Error>::custom(msg).into()
}

impl SceneDocument {
    /// Parse a JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        let file: DocumentFile = serde_json::from_str(text)?;
        let mut doc = Self::from_entities(file.entities)?;
        doc.config = file.config;
        doc.datarefs = file.datarefs;
        Ok(doc)
    }

    /// Load a JSON document from disk.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Build a document from entity records, resolving parent names.
    pub fn from_entities(docs: Vec<EntityDoc>) -> Result<Self> {
        let by_name: HashMap<String, EntityId> = docs
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name.clone(), i))
            .collect();

        let mut doc = SceneDocument {
            current_frame: 1,
            ..Self::default()
        };

        for (id, entity) in docs.into_iter().enumerate() {
            let parent = match &entity.parent {
                None => None,
                Some(name) => Some(*by_name.get(name).ok_or_else(|| {
                    invalid(format!("entity \"{}\" has unknown parent \"{}\"", entity.name, name))
                })?),
            };

            let kind = match entity.kind {
                EntityKindDoc::Mesh => {
                    let vertices: Vec<Vec3> = entity.vertices.iter().map(|v| Vec3::from(*v)).collect();
                    for face in &entity.faces {
                        if let Some(bad) = face.verts.iter().find(|&&v| v >= vertices.len()) {
                            return Err(invalid(format!(
                                "entity \"{}\" has a face referencing missing vertex {}",
                                entity.name, bad
                            )));
                        }
                        for token in face.mode.iter().flatten() {
                            if FaceMode::from_token(token).is_none() {
                                return Err(invalid(format!(
                                    "entity \"{}\" has unknown face mode \"{}\"",
                                    entity.name, token
                                )));
                            }
                        }
                    }
                    doc.meshes.insert(
                        id,
                        MeshData {
                            vertices,
                            normals: entity.normals.iter().map(|n| Vec3::from(*n)).collect(),
                            faces: entity.faces,
                        },
                    );
                    EntityKind::Mesh {
                        mesh_name: entity.mesh_name.clone().unwrap_or_else(|| entity.name.clone()),
                        materials: entity.materials,
                    }
                }
                EntityKindDoc::Lamp => {
                    let lamp = entity.lamp.clone().ok_or_else(|| {
                        invalid(format!("lamp \"{}\" has no lamp data", entity.name))
                    })?;
                    EntityKind::Lamp(lamp)
                }
                EntityKindDoc::Empty => EntityKind::Empty,
                EntityKindDoc::Armature => {
                    doc.bones.insert(id, load_bones(&entity.name, &entity.bones)?);
                    EntityKind::Armature
                }
            };

            doc.matrices.push(Mat4::from_cols_array_2d(&entity.matrix));
            doc.entities.push(Entity {
                name: entity.name,
                kind,
                parent,
                parent_bone: entity.parent_bone,
                layers: entity.layers,
                group: entity.group,
                properties: entity.properties,
            });
        }

        Ok(doc)
    }
}

fn load_bones(armature: &str, docs: &[BoneDoc]) -> Result<Vec<Bone>> {
    let mut bones: Vec<Bone> = Vec::with_capacity(docs.len());
    for bone in docs {
        let parent = match &bone.parent {
            None => None,
            Some(name) => Some(bones.iter().position(|b| &b.name == name).ok_or_else(|| {
                invalid(format!(
                    "bone \"{}\" in \"{}\" names parent \"{}\" which is not defined before it",
                    bone.name, armature, name
                ))
            })?),
        };
        let keys = bone
            .keys
            .iter()
            .map(|k| BoneKey {
                loc: Vec3::from(k.loc),
                rot: Quat::from_xyzw(k.rot[1], k.rot[2], k.rot[3], k.rot[0]).normalize(),
            })
            .collect();
        bones.push(Bone {
            name: bone.name.clone(),
            parent,
            head: Vec3::from(bone.head),
            tail: Vec3::from(bone.tail),
            connected: bone.connected,
            keys,
        });
    }
    Ok(bones)
}

/// Newell's method; falls back to +Z for degenerate polygons.
fn polygon_normal(points: &[Vec3]) -> Vec3 {
    let mut n = Vec3::ZERO;
    for (i, a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        n.x += (a.y - b.y) * (a.z + b.z);
        n.y += (a.z - b.z) * (a.x + b.x);
        n.z += (a.x - b.x) * (a.y + b.y);
    }
    n.try_normalize().unwrap_or(Vec3::Z)
}

impl Scene for SceneDocument {
    fn entities(&self) -> Box<dyn Iterator<Item = (EntityId, &Entity)> + '_> {
        Box::new(self.entities.iter().enumerate())
    }

    fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    fn mesh_faces(&self, id: EntityId) -> Box<dyn Iterator<Item = Face> + '_> {
        let Some(mesh) = self.meshes.get(&id) else {
            return Box::new(std::iter::empty());
        };
        let smooth_normals = mesh.normals.len() == mesh.vertices.len();
        Box::new(mesh.faces.iter().map(move |face| {
            let points: Vec<Vec3> = face.verts.iter().map(|&v| mesh.vertices[v]).collect();
            let normal = polygon_normal(&points);
            let uvs = face.uv.as_ref().filter(|uv| uv.len() == face.verts.len());
            let corners = face
                .verts
                .iter()
                .enumerate()
                .map(|(i, &v)| Corner {
                    position: mesh.vertices[v],
                    normal: if smooth_normals {
                        mesh.normals[v].try_normalize().unwrap_or(normal)
                    } else {
                        normal
                    },
                    uv: uvs.map(|uv| Vec2::from(uv[i])),
                    vertex_index: v,
                })
                .collect();
            let mode = match &face.mode {
                None => FaceMode::standard(),
                Some(tokens) => tokens
                    .iter()
                    .filter_map(|t| FaceMode::from_token(t))
                    .fold(FaceMode::empty(), |acc, m| acc | m),
            };
            Face {
                corners,
                normal,
                smooth: face.smooth,
                mode,
                transparency: face.transparency,
                material: face.material,
                image: face.image.clone(),
            }
        }))
    }

    fn armature_bones(&self, id: EntityId) -> &[Bone] {
        self.bones.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn world_matrix(&self, id: EntityId) -> Mat4 {
        self.matrices.get(id).copied().unwrap_or(Mat4::IDENTITY)
    }

    fn current_frame(&self) -> i32 {
        self.current_frame
    }

    fn set_current_frame(&mut self, frame: i32) {
        self.current_frame = frame;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_document() {
        let json = r#"{
            "entities": [
                { "name": "Quad", "kind": "mesh",
                  "vertices": [[0,0,0],[1,0,0],[1,1,0],[0,1,0]],
                  "faces": [ { "verts": [0,1,2,3], "uv": [[0,0],[1,0],[1,1],[0,1]], "image": "t.png" } ] }
            ]
        }"#;
        let doc = SceneDocument::from_json(json).unwrap();
        let faces: Vec<Face> = doc.mesh_faces(0).collect();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].corners.len(), 4);
        assert!((faces[0].normal - Vec3::Z).length() < 1e-6);
        assert!(faces[0].mode.contains(FaceMode::TEX));
        assert_eq!(faces[0].corners[2].uv, Some(Vec2::new(1.0, 1.0)));
    }

    #[test]
    fn test_unknown_parent_is_rejected() {
        let docs = vec![EntityDoc::new("a", EntityKindDoc::Empty).with_parent("ghost", None)];
        assert!(SceneDocument::from_entities(docs).is_err());
    }

    #[test]
    fn test_bone_parent_resolution() {
        let mut arm = EntityDoc::new("Armature", EntityKindDoc::Armature);
        arm.bones = vec![
            BoneDoc {
                name: "root".into(),
                ..BoneDoc::default()
            },
            BoneDoc {
                name: "child".into(),
                parent: Some("root".into()),
                ..BoneDoc::default()
            },
        ];
        let doc = SceneDocument::from_entities(vec![arm]).unwrap();
        let bones = doc.armature_bones(0);
        assert_eq!(bones[1].parent, Some(0));
    }
}
