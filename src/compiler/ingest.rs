//! Scene ingest: classify entities and hand them to the builder.

use super::anim::{build_chain, AnimList, Chain};
use super::builder::{Builder, Element};
use crate::error::{ExportError, Location, Result, StructuralError, Warnings};
use crate::resolver::{DatarefRegistry, ElementAttributes};
use crate::scene::{EntityId, EntityKind, Scene};
use crate::types::HOST_TO_XPLANE;
use glam::Mat4;

/// LOD layer bits.
const LOD_MASK: u32 = 0b111;

/// Walk up through non-armature parents until an armature is reached.
/// Returns the armature and the bone named by the last link before it.
fn armature_parent<S: Scene + ?Sized>(scene: &S, id: EntityId) -> Option<(EntityId, Option<&str>)> {
    let mut current = scene.entity(id)?;
    loop {
        let parent_id = current.parent?;
        let parent = scene.entity(parent_id)?;
        if matches!(parent.kind, EntityKind::Armature) {
            let bone = current.parent_bone.as_deref().filter(|b| !b.is_empty());
            return Some((parent_id, bone));
        }
        current = parent;
    }
}

/// Feed every exportable entity of `scene` to `builder`.
pub fn ingest<S: Scene + ?Sized>(
    scene: &S,
    registry: &DatarefRegistry,
    anims: &mut AnimList,
    builder: &mut Builder,
    warnings: &mut Warnings,
) -> Result<()> {
    for (id, entity) in scene.entities() {
        match &entity.kind {
            EntityKind::Armature => continue,
            EntityKind::Empty => {
                builder.add_side_band(entity)?;
                continue;
            }
            EntityKind::Mesh { .. } | EntityKind::Lamp(_) => {}
        }

        let location = Location::object(&entity.name);
        let layers = (entity.layers & LOD_MASK) as u8;
        if layers == 0 {
            warnings.push(location, "not on any LOD layer; skipped");
            continue;
        }

        let attrs = ElementAttributes::from_properties(&entity.properties)
            .map_err(|e| ExportError::structural(location.clone(), e))?;

        let chain = match armature_parent(scene, id) {
            None => Chain::STATIC,
            Some((_, None)) => {
                return Err(ExportError::structural(location, StructuralError::MissingBone));
            }
            Some((armature, Some(bone))) => build_chain(scene, armature, bone, registry, anims, warnings)?,
        };

        let matrix =
            chain.rest.inverse() * Mat4::from_quat(HOST_TO_XPLANE) * scene.world_matrix(id);
        let element = Element::new(id, entity, attrs, matrix, chain.anim, layers);
        log::trace!(
            "\"{}\": layers {:03b}, anim {:?}",
            entity.name,
            layers,
            chain.anim
        );

        match &entity.kind {
            EntityKind::Mesh { .. } => builder.add_mesh(scene, &element, warnings)?,
            EntityKind::Lamp(lamp) => builder.add_lamp(lamp, &element, warnings)?,
            EntityKind::Empty | EntityKind::Armature => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompilerConfig;
    use crate::scene::{EntityDoc, EntityKindDoc, SceneDocument};

    #[test]
    fn test_armature_parent_through_empty() {
        let arm = EntityDoc::new("Armature", EntityKindDoc::Armature);
        let hinge = EntityDoc::new("Hinge", EntityKindDoc::Empty).with_parent("Armature", Some("foo"));
        let lamp = EntityDoc::new("Lamp", EntityKindDoc::Empty).with_parent("Hinge", None);
        let doc = SceneDocument::from_entities(vec![arm, hinge, lamp]).unwrap();
        assert_eq!(armature_parent(&doc, 2), Some((0, Some("foo"))));
        assert_eq!(armature_parent(&doc, 0), None);
    }

    #[test]
    fn test_missing_bone_is_structural() {
        let arm = EntityDoc::new("Armature", EntityKindDoc::Armature);
        let mesh = EntityDoc::mesh("Quad", vec![], vec![]).with_parent("Armature", None);
        let doc = SceneDocument::from_entities(vec![arm, mesh]).unwrap();
        let config = CompilerConfig::default();
        let mut builder = Builder::new(&config);
        let err = ingest(
            &doc,
            &DatarefRegistry::new(),
            &mut AnimList::new(),
            &mut builder,
            &mut Warnings::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ExportError::Structural {
                reason: StructuralError::MissingBone,
                ..
            }
        ));
    }

    #[test]
    fn test_entities_off_lod_layers_are_skipped() {
        let mut mesh = EntityDoc::mesh("Hidden", vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], vec![]);
        mesh.layers = 0b1000;
        let doc = SceneDocument::from_entities(vec![mesh]).unwrap();
        let config = CompilerConfig::default();
        let mut builder = Builder::new(&config);
        let mut warnings = Warnings::new();
        ingest(&doc, &DatarefRegistry::new(), &mut AnimList::new(), &mut builder, &mut warnings).unwrap();
        assert!(builder.prims.is_empty());
        assert_eq!(warnings.len(), 1);
    }
}
