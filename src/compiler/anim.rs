//! Animation graph.
//!
//! Bone chains are turned into `Anim` nodes holding translation and
//! rotation key tables in X-Plane axes. Nodes are interned into an
//! [`AnimList`] arena so identical chains share nodes; a node's parent is
//! an index into the same arena and is always interned before the child.
//!
//! For every emitted bone `n` with nearest emitted ancestor `a`, the node's
//! local transform at frame `k` is `G(a, k)^-1 * G(n, k)`, where `G` is the
//! bone's absolute X-Plane transform. Bones with fewer than two keys are not
//! emitted; their pose folds into the next emitted descendant.

use crate::error::{ExportError, Location, Result, StructuralError, Warnings};
use crate::resolver::{resolve_dataref, DatarefName, DatarefRegistry};
use crate::scene::{Bone, EntityId, EntityKind, Properties, Scene};
use crate::types::HOST_TO_XPLANE;
use glam::{EulerRot, Mat4, Quat, Vec3};

/// Index into an [`AnimList`].
pub type AnimId = usize;

const KEY_TOLERANCE: f32 = 1e-3;
/// Degrees.
const ANGLE_TOLERANCE: f32 = 1e-2;
const AXIS_TOLERANCE: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Show,
    Hide,
}

/// `ANIM_show` / `ANIM_hide` over `[lo, hi]` of a dataref.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityClause {
    pub kind: Visibility,
    pub dataref: String,
    pub lo: f32,
    pub hi: f32,
}

/// Rotation keys of one node, angles in degrees.
#[derive(Debug, Clone, PartialEq)]
pub enum Rotation {
    None,
    /// Every key rotates about one shared axis. A single angle is a static pose.
    Axis { axis: Vec3, angles: Vec<f32> },
    /// Keys with unrelated axes.
    Free(Vec<Quat>),
}

fn axis_angle(q: Quat) -> (Vec3, f32) {
    let q = if q.w < 0.0 { -q } else { q };
    let (axis, angle) = q.to_axis_angle();
    (axis, angle.to_degrees())
}

fn quat_near(a: Quat, b: Quat) -> bool {
    a.dot(b).abs() > 1.0 - 1e-6
}

fn unwrap_degrees(angles: &mut [f32]) {
    for i in 1..angles.len() {
        while angles[i] - angles[i - 1] > 180.0 {
            angles[i] -= 360.0;
        }
        while angles[i] - angles[i - 1] < -180.0 {
            angles[i] += 360.0;
        }
    }
}

impl Rotation {
    pub fn from_keys(keys: &[Quat]) -> Self {
        if keys.iter().all(|q| axis_angle(*q).1 < ANGLE_TOLERANCE) {
            return Rotation::None;
        }
        if keys.windows(2).all(|w| quat_near(w[0], w[1])) {
            let (axis, angle) = axis_angle(keys[0]);
            return Rotation::Axis {
                axis,
                angles: vec![angle],
            };
        }

        let Some(reference) = keys.iter().find_map(|q| {
            let (axis, angle) = axis_angle(*q);
            (angle > ANGLE_TOLERANCE).then_some(axis)
        }) else {
            return Rotation::None;
        };

        let mut angles = Vec::with_capacity(keys.len());
        for q in keys {
            let (axis, angle) = axis_angle(*q);
            if angle <= ANGLE_TOLERANCE {
                angles.push(0.0);
                continue;
            }
            let d = axis.dot(reference);
            if d > 1.0 - AXIS_TOLERANCE {
                angles.push(angle);
            } else if d < -(1.0 - AXIS_TOLERANCE) {
                angles.push(-angle);
            } else {
                return Rotation::Free(keys.to_vec());
            }
        }
        unwrap_degrees(&mut angles);
        Rotation::Axis {
            axis: reference,
            angles,
        }
    }

    /// Per-axis Euler tracks (Y, then X, then Z) for free rotations.
    pub fn euler_tracks(keys: &[Quat]) -> [(Vec3, Vec<f32>); 3] {
        let mut ys = Vec::with_capacity(keys.len());
        let mut xs = Vec::with_capacity(keys.len());
        let mut zs = Vec::with_capacity(keys.len());
        for q in keys {
            let (y, x, z) = q.to_euler(EulerRot::YXZ);
            ys.push(y.to_degrees());
            xs.push(x.to_degrees());
            zs.push(z.to_degrees());
        }
        unwrap_degrees(&mut ys);
        unwrap_degrees(&mut xs);
        unwrap_degrees(&mut zs);
        [(Vec3::Y, ys), (Vec3::X, xs), (Vec3::Z, zs)]
    }

    fn same_as(&self, other: &Rotation) -> bool {
        match (self, other) {
            (Rotation::None, Rotation::None) => true,
            (
                Rotation::Axis { axis: a, angles: x },
                Rotation::Axis { axis: b, angles: y },
            ) => {
                a.abs_diff_eq(*b, AXIS_TOLERANCE)
                    && x.len() == y.len()
                    && x.iter().zip(y).all(|(p, q)| (p - q).abs() <= ANGLE_TOLERANCE)
            }
            (Rotation::Free(a), Rotation::Free(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(p, q)| quat_near(*p, *q))
            }
            _ => false,
        }
    }
}

/// Collapse equal keys to one; a single zero key becomes no keys.
fn collapse_translations(keys: Vec<Vec3>) -> Vec<Vec3> {
    let Some(&first) = keys.first() else {
        return keys;
    };
    if keys.iter().all(|k| k.abs_diff_eq(first, KEY_TOLERANCE)) {
        if first.abs().max_element() <= KEY_TOLERANCE {
            Vec::new()
        } else {
            vec![first]
        }
    } else {
        keys
    }
}

/// One animation node.
#[derive(Debug, Clone, PartialEq)]
pub struct Anim {
    /// Empty for hold-only nodes that carry nothing but show/hide clauses.
    pub dataref: String,
    pub values: Vec<f32>,
    pub loop_value: Option<f32>,
    pub translations: Vec<Vec3>,
    pub rotation: Rotation,
    pub clauses: Vec<VisibilityClause>,
    pub parent: Option<AnimId>,
}

impl Anim {
    /// Structural equality with key tolerance. Parents are canonical, so
    /// comparing their ids compares the whole ancestry.
    pub fn same_as(&self, other: &Anim) -> bool {
        self.parent == other.parent
            && self.dataref == other.dataref
            && self.loop_value == other.loop_value
            && self.clauses == other.clauses
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| (a - b).abs() <= KEY_TOLERANCE)
            && self.translations.len() == other.translations.len()
            && self
                .translations
                .iter()
                .zip(&other.translations)
                .all(|(a, b)| a.abs_diff_eq(*b, KEY_TOLERANCE))
            && self.rotation.same_as(&other.rotation)
    }
}

/// Canonical, deduplicated animation nodes.
#[derive(Debug, Clone, Default)]
pub struct AnimList {
    nodes: Vec<Anim>,
    ranks: Vec<usize>,
}

impl AnimList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Return the id of an equal node, or append this one.
    pub fn intern(&mut self, anim: Anim) -> AnimId {
        if let Some(id) = self.nodes.iter().position(|n| n.same_as(&anim)) {
            return id;
        }
        self.nodes.push(anim);
        self.nodes.len() - 1
    }

    pub fn get(&self, id: AnimId) -> Option<&Anim> {
        self.nodes.get(id)
    }

    /// Ids from the outermost ancestor down to `id`.
    pub fn chain(&self, id: Option<AnimId>) -> Vec<AnimId> {
        let mut out = Vec::new();
        let mut cursor = id;
        while let Some(current) = cursor {
            out.push(current);
            cursor = self.nodes.get(current).and_then(|n| n.parent);
        }
        out.reverse();
        out
    }

    /// Number nodes in depth-first pre-order so that sorting by rank keeps
    /// every subtree contiguous.
    pub fn finish(&mut self) {
        let mut children: Vec<Vec<AnimId>> = vec![Vec::new(); self.nodes.len()];
        let mut roots = Vec::new();
        for (id, node) in self.nodes.iter().enumerate() {
            match node.parent {
                Some(p) => children[p].push(id),
                None => roots.push(id),
            }
        }
        self.ranks = vec![0; self.nodes.len()];
        let mut next = 0;
        let mut stack: Vec<AnimId> = roots.into_iter().rev().collect();
        while let Some(id) = stack.pop() {
            self.ranks[id] = next;
            next += 1;
            stack.extend(children[id].iter().rev());
        }
    }

    /// Depth-first rank; valid after [`AnimList::finish`].
    pub fn rank(&self, id: AnimId) -> usize {
        self.ranks.get(id).copied().unwrap_or(id)
    }
}

fn to_xplane() -> Mat4 {
    Mat4::from_quat(HOST_TO_XPLANE)
}

/// One armature of a possibly nested rig.
struct Level<'s> {
    name: &'s str,
    properties: &'s Properties,
    bones: &'s [Bone],
    /// Host armature space to X-Plane world at frame 1.
    world: Mat4,
    /// Level and bone this armature hangs from.
    outer: Option<(usize, usize)>,
    /// Bones from the root down to the bone of interest.
    path: Vec<usize>,
}

/// Armatures from the outermost inwards.
struct Rig<'s> {
    levels: Vec<Level<'s>>,
}

fn is_armature<S: Scene + ?Sized>(scene: &S, id: EntityId) -> bool {
    matches!(scene.entity(id).map(|e| &e.kind), Some(EntityKind::Armature))
}

impl<'s> Rig<'s> {
    fn new<S: Scene + ?Sized>(scene: &'s S, armature: EntityId, bone: &str) -> Result<Self> {
        let mut links: Vec<(EntityId, String)> = vec![(armature, bone.to_string())];
        let mut current = armature;
        while let Some(entity) = scene.entity(current) {
            match entity.parent {
                Some(parent) if is_armature(scene, parent) && links.len() <= 64 => {
                    let bone = entity.parent_bone.clone().ok_or_else(|| {
                        ExportError::structural(
                            Location::object(&entity.name),
                            StructuralError::MissingBone,
                        )
                    })?;
                    links.push((parent, bone));
                    current = parent;
                }
                _ => break,
            }
        }
        links.reverse();

        let mut levels: Vec<Level<'s>> = Vec::with_capacity(links.len());
        for (armature, bone_name) in links {
            let Some(entity) = scene.entity(armature) else {
                break;
            };
            let bones = scene.armature_bones(armature);
            let target = bones.iter().position(|b| b.name == bone_name).ok_or_else(|| {
                ExportError::structural(
                    Location::object(&entity.name),
                    StructuralError::DeletedBone(bone_name.clone()),
                )
            })?;
            let mut path = vec![target];
            let mut cursor = target;
            while let Some(parent) = bones[cursor].parent.filter(|&p| p < cursor) {
                path.push(parent);
                cursor = parent;
            }
            path.reverse();

            let outer = levels.last().and_then(|l| l.path.last()).map(|&b| (levels.len() - 1, b));
            levels.push(Level {
                name: &entity.name,
                properties: &entity.properties,
                bones,
                world: to_xplane() * scene.world_matrix(armature),
                outer,
                path,
            });
        }
        Ok(Self { levels })
    }

    fn base(&self, level: usize, frame: usize) -> Mat4 {
        let l = &self.levels[level];
        match l.outer {
            None => l.world,
            Some((o, b)) => self.bone(o, b, frame) * self.bone(o, b, 1).inverse() * l.world,
        }
    }

    /// Pose of a bone in host armature space.
    fn pose(&self, level: usize, bone: usize, frame: usize) -> Mat4 {
        let bones = self.levels[level].bones;
        let b = &bones[bone];
        let key = b.sample(frame);
        match b.parent.filter(|&p| p < bone) {
            None => Mat4::from_rotation_translation(key.rot, b.head + key.loc),
            Some(p) => {
                let parent = &bones[p];
                let head = if b.connected { parent.tail } else { b.head };
                self.pose(level, p, frame)
                    * Mat4::from_rotation_translation(key.rot, head - parent.head + key.loc)
            }
        }
    }

    /// Absolute transform of a bone in X-Plane axes.
    fn bone(&self, level: usize, bone: usize, frame: usize) -> Mat4 {
        self.base(level, frame) * self.pose(level, bone, frame) * to_xplane().inverse()
    }
}

/// The animation attached to one element.
#[derive(Debug, Clone, Copy)]
pub struct Chain {
    pub anim: Option<AnimId>,
    /// Frame-1 transform of the innermost emitted node. Vertices are
    /// multiplied by its inverse so they sit in that node's rest frame.
    pub rest: Mat4,
}

impl Chain {
    pub const STATIC: Chain = Chain {
        anim: None,
        rest: Mat4::IDENTITY,
    };
}

/// Build (or reuse) the anim nodes for an element hanging from `bone` of `armature`.
pub fn build_chain<S: Scene + ?Sized>(
    scene: &S,
    armature: EntityId,
    bone: &str,
    registry: &DatarefRegistry,
    anims: &mut AnimList,
    warnings: &mut Warnings,
) -> Result<Chain> {
    let rig = Rig::new(scene, armature, bone)?;
    let mut parent: Option<AnimId> = None;
    let mut last: Option<(usize, usize)> = None;

    for (li, level) in rig.levels.iter().enumerate() {
        let location = Location::object(level.name);
        let structural = |reason| ExportError::structural(location.clone(), reason);
        let clauses = visibility_clauses(level.properties, registry).map_err(structural)?;

        for &b in &level.path {
            let bone = &level.bones[b];
            let bone_clauses = if bone.parent.is_none() {
                clauses.clone()
            } else {
                Vec::new()
            };
            let frames = bone.key_count();

            if frames < 2 {
                if bone_clauses.is_empty() {
                    warnings.push(
                        location.clone(),
                        format!("bone \"{}\" has fewer than two keyframes and is not animated", bone.name),
                    );
                    continue;
                }
                log::trace!("hold-only node for bone \"{}\"", bone.name);
                parent = Some(anims.intern(Anim {
                    dataref: String::new(),
                    values: Vec::new(),
                    loop_value: None,
                    translations: Vec::new(),
                    rotation: Rotation::None,
                    clauses: bone_clauses,
                    parent,
                }));
                continue;
            }

            let dataref = resolve_dataref(&bone.name, level.properties, registry).map_err(structural)?;
            let (values, loop_value) =
                frame_values(&bone.name, frames, level.properties, warnings, &location)?;

            let mut translations = Vec::with_capacity(frames);
            let mut rotations = Vec::with_capacity(frames);
            for k in 1..=frames {
                let ancestor = last.map_or(Mat4::IDENTITY, |(l, a)| rig.bone(l, a, k));
                let local = ancestor.inverse() * rig.bone(li, b, k);
                let (_, rotation, translation) = local.to_scale_rotation_translation();
                translations.push(translation);
                rotations.push(rotation);
            }

            parent = Some(anims.intern(Anim {
                dataref,
                values,
                loop_value,
                translations: collapse_translations(translations),
                rotation: Rotation::from_keys(&rotations),
                clauses: bone_clauses,
                parent,
            }));
            last = Some((li, b));
        }
    }

    Ok(Chain {
        anim: parent,
        rest: last.map_or(Mat4::IDENTITY, |(l, b)| rig.bone(l, b, 1)),
    })
}

/// Dataref values `v1..vn` and the loop value for one bone.
fn frame_values(
    bone: &str,
    frames: usize,
    props: &Properties,
    warnings: &mut Warnings,
    location: &Location,
) -> Result<(Vec<f32>, Option<f32>)> {
    let name = DatarefName::parse(bone);
    let mut keys = vec![name.full];
    if name.leaf != name.full {
        keys.push(name.leaf);
    }
    let lookup = |suffix: &str| -> Result<Option<f32>> {
        for key in &keys {
            let prop = format!("{}{}", key, suffix);
            if let Some(v) = props
                .number(&prop)
                .map_err(|e| ExportError::structural(location.clone(), e))?
            {
                return Ok(Some(v));
            }
        }
        Ok(None)
    };

    let given = (1..=frames)
        .map(|k| lookup(&format!("_v{}", k)))
        .collect::<Result<Vec<_>>>()?;
    if frames > 2 && given.iter().all(Option::is_none) {
        return Err(ExportError::structural(
            location.clone(),
            StructuralError::MissingValue {
                bone: bone.to_string(),
                frames,
            },
        ));
    }
    let values: Vec<f32> = given
        .iter()
        .enumerate()
        .map(|(i, v)| v.unwrap_or(if i == 0 { 0.0 } else { 1.0 }))
        .collect();
    if values.windows(2).any(|w| w[1] <= w[0]) {
        warnings.push(
            location.clone(),
            format!("dataref values for bone \"{}\" are not increasing", bone),
        );
    }
    Ok((values, lookup("_loop")?))
}

fn parse_visibility_name(name: &str) -> Option<(&str, Visibility, usize)> {
    for (marker, kind) in [("_show_v", Visibility::Show), ("_hide_v", Visibility::Hide)] {
        if let Some(pos) = name.rfind(marker) {
            let k: usize = name[pos + marker.len()..].parse().ok()?;
            if pos == 0 || k == 0 {
                return None;
            }
            return Some((&name[..pos], kind, k));
        }
    }
    None
}

struct PendingClause<'p> {
    reference: &'p str,
    kind: Visibility,
    pair: usize,
    first_name: &'p str,
    lo: Option<f32>,
    hi: Option<f32>,
}

/// Show/hide clauses from an armature's `<ref>_show_v<k>` / `<ref>_hide_v<k>`
/// properties, in order of first appearance. `v(2k-1)` and `v(2k)` bound one clause.
pub fn visibility_clauses(
    props: &Properties,
    registry: &DatarefRegistry,
) -> std::result::Result<Vec<VisibilityClause>, StructuralError> {
    let mut pending: Vec<PendingClause> = Vec::new();
    for prop in props.iter() {
        let Some((reference, kind, k)) = parse_visibility_name(&prop.name) else {
            continue;
        };
        let value = prop.value.as_f32().ok_or_else(|| StructuralError::PropertyType {
            name: prop.name.clone(),
            expected: "a number",
        })?;
        let pair = (k + 1) / 2;
        let index = match pending
            .iter()
            .position(|p| p.reference == reference && p.kind == kind && p.pair == pair)
        {
            Some(i) => i,
            None => {
                pending.push(PendingClause {
                    reference,
                    kind,
                    pair,
                    first_name: &prop.name,
                    lo: None,
                    hi: None,
                });
                pending.len() - 1
            }
        };
        if k % 2 == 1 {
            pending[index].lo = Some(value);
        } else {
            pending[index].hi = Some(value);
        }
    }

    pending
        .into_iter()
        .map(|p| {
            let (Some(lo), Some(hi)) = (p.lo, p.hi) else {
                return Err(StructuralError::UnpairedShowHide(p.first_name.to_string()));
            };
            Ok(VisibilityClause {
                kind: p.kind,
                dataref: resolve_dataref(p.reference, props, registry)?,
                lo,
                hi,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::DatarefEntry;
    use crate::scene::{BoneDoc, EntityDoc, EntityKindDoc, KeyDoc, PropertyValue, SceneDocument};
    use std::f32::consts::FRAC_1_SQRT_2;

    fn registry() -> DatarefRegistry {
        let mut registry = DatarefRegistry::new();
        registry.insert(DatarefEntry::new("sim/cockpit/switches/foo", 1));
        registry.insert(DatarefEntry::new("sim/cockpit/switches/bar", 1));
        registry
    }

    fn armature(bones: Vec<BoneDoc>, props: Properties) -> SceneDocument {
        let mut arm = EntityDoc::new("Armature", EntityKindDoc::Armature).with_properties(props);
        arm.bones = bones;
        SceneDocument::from_entities(vec![arm]).unwrap()
    }

    /// 90 degrees about host -Y, which is X-Plane +Z.
    fn quarter_turn() -> KeyDoc {
        KeyDoc {
            loc: [0.0; 3],
            rot: [FRAC_1_SQRT_2, 0.0, -FRAC_1_SQRT_2, 0.0],
        }
    }

    fn foo_bone() -> BoneDoc {
        BoneDoc {
            name: "foo".into(),
            tail: [0.0, 0.0, 1.0],
            keys: vec![KeyDoc::default(), quarter_turn()],
            ..BoneDoc::default()
        }
    }

    #[test]
    fn test_single_axis_rotation() {
        let z = Quat::from_rotation_z(90f32.to_radians());
        match Rotation::from_keys(&[Quat::IDENTITY, z]) {
            Rotation::Axis { axis, angles } => {
                assert!(axis.abs_diff_eq(Vec3::Z, 1e-4));
                assert!((angles[0]).abs() < 1e-3 && (angles[1] - 90.0).abs() < 1e-3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_sign_flip_and_unwrap() {
        let keys = [
            Quat::from_rotation_z(170f32.to_radians()),
            Quat::from_rotation_z(-170f32.to_radians()),
        ];
        match Rotation::from_keys(&keys) {
            Rotation::Axis { angles, .. } => {
                assert!((angles[1] - angles[0] - 20.0).abs() < 1e-2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_free_rotation() {
        let keys = [
            Quat::from_rotation_x(0.5),
            Quat::from_rotation_y(0.5),
        ];
        assert!(matches!(Rotation::from_keys(&keys), Rotation::Free(_)));
        let tracks = Rotation::euler_tracks(&keys);
        assert_eq!(tracks[0].0, Vec3::Y);
        assert!((tracks[1].1[0] - 0.5f32.to_degrees()).abs() < 1e-2);
    }

    #[test]
    fn test_identity_rotation_is_none() {
        assert_eq!(Rotation::from_keys(&[Quat::IDENTITY, Quat::IDENTITY]), Rotation::None);
    }

    #[test]
    fn test_translation_collapse() {
        assert!(collapse_translations(vec![Vec3::ZERO, Vec3::ZERO]).is_empty());
        assert_eq!(collapse_translations(vec![Vec3::X, Vec3::X]), vec![Vec3::X]);
        assert_eq!(collapse_translations(vec![Vec3::X, Vec3::Y]).len(), 2);
    }

    #[test]
    fn test_chain_for_rotating_bone() {
        let doc = armature(vec![foo_bone()], Properties::new());
        let mut anims = AnimList::new();
        let mut warnings = Warnings::new();
        let chain = build_chain(&doc, 0, "foo", &registry(), &mut anims, &mut warnings).unwrap();
        let anim = anims.get(chain.anim.unwrap()).unwrap();
        assert_eq!(anim.dataref, "sim/cockpit/switches/foo");
        assert_eq!(anim.values, vec![0.0, 1.0]);
        assert!(anim.translations.is_empty());
        match &anim.rotation {
            Rotation::Axis { axis, angles } => {
                assert!(axis.abs_diff_eq(Vec3::Z, 1e-4));
                assert!((angles[1] - 90.0).abs() < 1e-2);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(chain.rest.abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn test_chains_are_interned() {
        let doc = armature(vec![foo_bone()], Properties::new());
        let mut anims = AnimList::new();
        let mut warnings = Warnings::new();
        let a = build_chain(&doc, 0, "foo", &registry(), &mut anims, &mut warnings).unwrap();
        let b = build_chain(&doc, 0, "foo", &registry(), &mut anims, &mut warnings).unwrap();
        assert_eq!(a.anim, b.anim);
        assert_eq!(anims.len(), 1);
    }

    #[test]
    fn test_deleted_bone() {
        let doc = armature(vec![foo_bone()], Properties::new());
        let err = build_chain(&doc, 0, "gone", &registry(), &mut AnimList::new(), &mut Warnings::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ExportError::Structural {
                reason: StructuralError::DeletedBone(_),
                ..
            }
        ));
    }

    #[test]
    fn test_missing_values_for_long_tracks() {
        let mut bone = foo_bone();
        bone.keys.push(KeyDoc::default());
        let doc = armature(vec![bone], Properties::new());
        let err = build_chain(&doc, 0, "foo", &registry(), &mut AnimList::new(), &mut Warnings::new())
            .unwrap_err();
        assert!(err.to_string().contains("3 keyframes"));
    }

    #[test]
    fn test_static_bone_folds_into_child() {
        let root = BoneDoc {
            name: "bar".into(),
            head: [0.0, 0.0, 1.0],
            tail: [0.0, 0.0, 2.0],
            ..BoneDoc::default()
        };
        let mut child = foo_bone();
        child.parent = Some("bar".into());
        child.head = [0.0, 0.0, 2.0];
        child.tail = [0.0, 0.0, 3.0];
        let doc = armature(vec![root, child], Properties::new());
        let mut anims = AnimList::new();
        let mut warnings = Warnings::new();
        let chain = build_chain(&doc, 0, "foo", &registry(), &mut anims, &mut warnings).unwrap();
        assert_eq!(anims.len(), 1);
        assert_eq!(warnings.len(), 1);
        let anim = anims.get(chain.anim.unwrap()).unwrap();
        assert_eq!(anim.parent, None);
        // Host head (0,0,2) is X-Plane (0,2,0).
        assert_eq!(anim.translations.len(), 1);
        assert!(anim.translations[0].abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-4));
    }

    #[test]
    fn test_show_hide_pairs() {
        let props = Properties::new()
            .with_f32("bar_hide_v1", 0.0)
            .with_f32("bar_hide_v2", 0.5)
            .with_f32("foo_show_v1", 1.0)
            .with_f32("foo_show_v2", 2.0);
        let clauses = visibility_clauses(&props, &registry()).unwrap();
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0].kind, Visibility::Hide);
        assert_eq!(clauses[0].dataref, "sim/cockpit/switches/bar");
        assert_eq!((clauses[1].lo, clauses[1].hi), (1.0, 2.0));

        let unpaired = Properties::new().with_f32("foo_show_v1", 1.0);
        assert_eq!(
            visibility_clauses(&unpaired, &registry()).unwrap_err(),
            StructuralError::UnpairedShowHide("foo_show_v1".into())
        );
    }

    #[test]
    fn test_hold_only_root() {
        let bone = BoneDoc {
            name: "foo".into(),
            ..BoneDoc::default()
        };
        let props = Properties::new()
            .with("bar_show_v1", PropertyValue::Int(1))
            .with("bar_show_v2", PropertyValue::Int(1));
        let doc = armature(vec![bone], props);
        let mut anims = AnimList::new();
        let chain = build_chain(&doc, 0, "foo", &registry(), &mut anims, &mut Warnings::new()).unwrap();
        let anim = anims.get(chain.anim.unwrap()).unwrap();
        assert!(anim.dataref.is_empty());
        assert_eq!(anim.clauses.len(), 1);
    }

    #[test]
    fn test_depth_first_ranks() {
        let mut anims = AnimList::new();
        let node = |dataref: &str, parent| Anim {
            dataref: dataref.into(),
            values: vec![0.0, 1.0],
            loop_value: None,
            translations: Vec::new(),
            rotation: Rotation::None,
            clauses: Vec::new(),
            parent,
        };
        let a = anims.intern(node("a", None));
        let b = anims.intern(node("b", Some(a)));
        let c = anims.intern(node("c", None));
        let d = anims.intern(node("d", Some(a)));
        anims.finish();
        assert_eq!(
            [anims.rank(a), anims.rank(b), anims.rank(d), anims.rank(c)],
            [0, 1, 2, 3]
        );
        assert_eq!(anims.chain(Some(d)), vec![a, d]);
    }
}
