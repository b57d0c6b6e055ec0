//! Primitive builder: turns classified scene elements into primitives and pool entries.

use super::anim::AnimId;
use super::pool::{LightVertex, LineVertex, Pool, VtEntry};
use super::prim::{InlineLight, Plane, Prim, PrimStyle};
use super::CompilerConfig;
use crate::error::{ExportError, Location, Result, StructuralError, Warnings};
use crate::resolver::{ElementAttributes, SideBand};
use crate::scene::{
    Entity, EntityId, EntityKind, Face, FaceMode, Lamp, LampKind, Properties, Scene, SceneMaterial,
    Transparency,
};
use crate::types::{base_name, Alpha, Group, Manipulator, Material, PrimFlags};
use glam::{Mat3, Mat4, Vec2, Vec3};
use std::collections::{HashMap, HashSet};

/// Tolerance multiplier when matching an animated run against earlier geometry.
const RUN_SLACK: f32 = 10.0;

const PANEL_MANIP_IGNORED: &str = "panel manipulator ignored on faces without the panel texture";

/// Reserved `VLIGHT` colours.
const PULSE: f32 = 9.9;
const STROBE: f32 = 9.8;
const TRAFFIC: f32 = 9.7;

/// A scene entity ready to be built.
pub struct Element<'a> {
    pub id: EntityId,
    pub entity: &'a Entity,
    pub location: Location,
    pub attrs: ElementAttributes,
    /// Host object space to emitted (X-Plane, rest-frame) space.
    pub matrix: Mat4,
    pub normal_matrix: Mat3,
    pub mirrored: bool,
    pub anim: Option<AnimId>,
    pub layers: u8,
}

impl<'a> Element<'a> {
    pub fn new(
        id: EntityId,
        entity: &'a Entity,
        attrs: ElementAttributes,
        matrix: Mat4,
        anim: Option<AnimId>,
        layers: u8,
    ) -> Self {
        let linear = Mat3::from_mat4(matrix);
        Self {
            id,
            entity,
            location: Location::object(&entity.name),
            attrs,
            matrix,
            normal_matrix: linear.inverse().transpose(),
            mirrored: linear.determinant() < 0.0,
            anim,
            layers,
        }
    }

    fn template(&self, style: PrimStyle) -> Prim {
        let mut prim = Prim::new(style, &self.entity.name);
        prim.group = self.entity.group.clone().map(Group);
        prim.layers = self.layers;
        prim.anim = self.anim;
        prim.light_level = self.attrs.light_level.clone();
        prim.manip = self.attrs.manipulator.descriptor();
        prim.flags.set(PrimFlags::NSHADOW, self.attrs.no_shadow);
        prim.flags.set(PrimFlags::DRAW_DISABLE, self.attrs.draw_disable);
        prim.flags.set(PrimFlags::SOLID_CAMERA, self.attrs.solid_camera);
        prim
    }

    fn position(&self, p: Vec3) -> Vec3 {
        self.matrix.transform_point3(p)
    }
}

/// A face built but not yet committed to the vertex pool.
struct StagedFace {
    prim: Prim,
    /// Pool entry and source mesh vertex per corner.
    corners: Vec<(VtEntry, usize)>,
}

/// Accumulates primitives and pools for one export.
pub struct Builder<'c> {
    config: &'c CompilerConfig,
    pub vt: Pool<VtEntry>,
    pub vline: Pool<LineVertex>,
    pub vlight: Pool<LightVertex>,
    pub prims: Vec<Prim>,
    pub texture: Option<String>,
    pub panel_texture: Option<String>,
    pub side_band: Vec<SideBand>,
    panel_size: Option<(u32, u32)>,
    hints: HashMap<(EntityId, usize), Vec<u32>>,
    runs: Vec<Vec<Vec<u32>>>,
}

fn fail(location: &Location, reason: StructuralError) -> ExportError {
    ExportError::structural(location.clone(), reason)
}

fn number(props: &Properties, name: &str, default: f32, location: &Location) -> Result<f32> {
    Ok(props.number(name).map_err(|e| fail(location, e))?.unwrap_or(default))
}

fn string<'p>(props: &'p Properties, name: &str, location: &Location) -> Result<Option<&'p str>> {
    Ok(props.string(name).map_err(|e| fail(location, e))?.map(str::trim))
}

impl<'c> Builder<'c> {
    pub fn new(config: &'c CompilerConfig) -> Self {
        Self {
            config,
            vt: Pool::new(),
            vline: Pool::new(),
            vlight: Pool::new(),
            prims: Vec::new(),
            texture: None,
            panel_texture: None,
            side_band: Vec::new(),
            panel_size: None,
            hints: HashMap::new(),
            runs: Vec::new(),
        }
    }

    /// Panel texture size, read from the panel image when it can be found.
    /// Cockpit regions are checked against it the first time it is resolved.
    pub fn panel_size(&mut self) -> Result<(u32, u32)> {
        if let Some(size) = self.panel_size {
            return Ok(size);
        }
        let size = match (&self.config.texture_dir, &self.panel_texture) {
            (Some(dir), Some(texture)) if dir.join(texture).is_file() => {
                image::image_dimensions(dir.join(texture))?
            }
            _ => self.config.panel_size,
        };
        for (i, region) in self.config.cockpit_regions.iter().enumerate() {
            if region.right() > size.0 || region.top() > size.1 {
                return Err(fail(&Location::scene(), StructuralError::RegionBounds(i)));
            }
        }
        log::debug!("panel texture is {}x{}", size.0, size.1);
        self.panel_size = Some(size);
        Ok(size)
    }

    /// File-scope directives from an empty.
    pub fn add_side_band(&mut self, entity: &Entity) -> Result<()> {
        let directives = SideBand::from_properties(&entity.properties)
            .map_err(|e| fail(&Location::object(&entity.name), e))?;
        self.side_band.extend(directives);
        Ok(())
    }

    /// Triangles, a line or halo lights from a mesh element.
    pub fn add_mesh<S: Scene + ?Sized>(
        &mut self,
        scene: &S,
        el: &Element,
        warnings: &mut Warnings,
    ) -> Result<()> {
        let EntityKind::Mesh { mesh_name, materials } = &el.entity.kind else {
            return Ok(());
        };
        let location = el.location.clone().with_mesh(mesh_name);

        if let Some(halo) = materials.first().filter(|m| m.halo) {
            return self.add_halo(scene, el, halo, &location);
        }

        let mut faces = scene.mesh_faces(el.id);
        let first = faces.next();
        let second = faces.next();
        if let (Some(face), None) = (&first, &second) {
            if let Some(ends) = self.line_ends(face, el) {
                log::trace!("\"{}\" is a line", el.entity.name);
                if el.attrs.manipulator == Manipulator::Panel {
                    warnings.push(location, PANEL_MANIP_IGNORED);
                }
                self.add_line(el, face, materials, ends);
                return Ok(());
            }
        }

        let mut staged = Vec::new();
        let mut panel_manip_ignored = false;
        for (index, face) in first.into_iter().chain(second).chain(faces).enumerate() {
            let face_location = location.clone().with_face(index);
            let Some(face) = self.build_face(face, el, materials, &face_location, warnings)? else {
                continue;
            };
            if el.attrs.manipulator == Manipulator::Panel && !face.prim.flags.contains(PrimFlags::PANEL) {
                panel_manip_ignored = true;
            }
            if el.anim.is_some() {
                staged.push(face);
            } else {
                self.commit_face(el.id, face);
            }
        }
        if !staged.is_empty() {
            self.commit_run(el.id, staged);
        }
        if panel_manip_ignored {
            warnings.push(location, PANEL_MANIP_IGNORED);
        }
        Ok(())
    }

    fn build_face(
        &mut self,
        face: Face,
        el: &Element,
        materials: &[SceneMaterial],
        location: &Location,
        warnings: &mut Warnings,
    ) -> Result<Option<StagedFace>> {
        if face.mode.contains(FaceMode::INVISIBLE) {
            return Ok(None);
        }
        if !(3..=4).contains(&face.corners.len()) {
            warnings.push(
                location.clone(),
                format!("face with {} vertices skipped", face.corners.len()),
            );
            return Ok(None);
        }

        let mut prim = el.template(PrimStyle::Tri);

        if face.mode.contains(FaceMode::TEX) {
            if let Some(image) = &face.image {
                if image.to_lowercase().contains("panel") {
                    prim.flags.insert(PrimFlags::PANEL);
                    if self.panel_texture.is_none() {
                        self.panel_texture = Some(image.clone());
                    }
                } else {
                    match &self.texture {
                        None => self.texture = Some(image.clone()),
                        Some(first) if first != image => {
                            return Err(fail(
                                location,
                                StructuralError::MultipleTextures {
                                    first: first.clone(),
                                    second: image.clone(),
                                },
                            ));
                        }
                        Some(_) => {}
                    }
                }
                prim.image = Some(image.clone());
            }
        }

        prim.material = face
            .material
            .and_then(|i| materials.get(i))
            .map_or(Material::Default, |m| Material::new(m.diffuse, m.emission, m.shiny));

        if face.mode.contains(FaceMode::TILES) || face.mode.contains(FaceMode::LIGHT) {
            prim.flags.insert(if el.attrs.deck {
                PrimFlags::DECK
            } else {
                PrimFlags::HARD
            });
            prim.surface = el.attrs.surface;
        }
        if !face.mode.contains(FaceMode::DYNAMIC) {
            prim.flags.insert(PrimFlags::NPOLY);
        }
        if face.mode.contains(FaceMode::SHADOW) {
            prim.flags.insert(PrimFlags::NSHADOW);
        }
        if face.mode.contains(FaceMode::TWOSIDE) {
            prim.flags.insert(PrimFlags::TWOSIDE);
        }

        prim.alpha = match face.transparency {
            Transparency::None => Alpha::OPAQUE,
            Transparency::Clip => Alpha::test(el.attrs.no_blend.unwrap_or(0.5)),
            Transparency::Alpha => match (el.attrs.no_blend, el.attrs.shadow_blend) {
                (Some(cutoff), _) => Alpha::test(cutoff),
                (None, Some(cutoff)) => Alpha::shadow_test(cutoff),
                (None, None) => Alpha::BLEND,
            },
        };
        if el.attrs.draped {
            prim.flags.insert(PrimFlags::DRAPED | PrimFlags::NPOLY);
            prim.alpha = Alpha::OPAQUE;
        }

        let mut corners: Vec<(VtEntry, usize)> = face
            .corners
            .iter()
            .map(|c| {
                let normal = if el.attrs.up_normal {
                    Vec3::Y
                } else {
                    let n = if face.smooth { c.normal } else { face.normal };
                    (el.normal_matrix * n).try_normalize().unwrap_or(Vec3::Y)
                };
                let entry = VtEntry {
                    position: el.position(c.position),
                    normal,
                    uv: c.uv.unwrap_or(Vec2::ZERO),
                };
                (entry, c.vertex_index)
            })
            .collect();
        if el.mirrored {
            corners.reverse();
        }

        if prim.flags.contains(PrimFlags::PANEL) && !self.config.cockpit_regions.is_empty() {
            if corners.len() != 4 {
                return Err(fail(location, StructuralError::CockpitFaceNotQuad));
            }
            let (w, h) = self.panel_size()?;
            let size = Vec2::new(w as f32, h as f32);
            let pixels: Vec<Vec2> = corners.iter().map(|(e, _)| e.uv * size).collect();
            let min = pixels.iter().fold(Vec2::splat(f32::MAX), |a, p| a.min(*p));
            let max = pixels.iter().fold(Vec2::splat(f32::MIN), |a, p| a.max(*p));
            let (index, region) = self
                .config
                .cockpit_regions
                .iter()
                .enumerate()
                .find(|(_, r)| r.contains(min.into(), max.into()))
                .ok_or_else(|| fail(location, StructuralError::NoCockpitRegion))?;
            let origin = Vec2::new(region.x as f32, region.y as f32);
            let extent = Vec2::new(region.width as f32, region.height as f32);
            for ((entry, _), px) in corners.iter_mut().zip(&pixels) {
                entry.uv = (*px - origin) / extent;
            }
            prim.region = index as i32;
        }

        let p: Vec<Vec3> = corners.iter().map(|(e, _)| e.position).collect();
        let plane = Plane::from_points(p[0], p[1], p[2])
            .or_else(|| p.get(3).and_then(|&p3| Plane::from_points(p[0], p[2], p3)));
        if plane.is_none() {
            warnings.push(location.clone(), "degenerate face skipped");
            return Ok(None);
        }
        prim.plane = plane;

        Ok(Some(StagedFace { prim, corners }))
    }

    fn commit_face(&mut self, id: EntityId, face: StagedFace) -> Vec<u32> {
        let mut indices = Vec::with_capacity(face.corners.len());
        for (entry, vertex) in &face.corners {
            let hints = self.hints.entry((id, *vertex)).or_default();
            let index = self.vt.add(*entry, hints);
            if !hints.contains(&index) {
                hints.push(index);
            }
            indices.push(index);
        }
        let mut prim = face.prim;
        prim.indices = indices.clone();
        self.prims.push(prim);
        indices
    }

    /// Commit an animated element's faces, reusing an earlier run's indices
    /// when every corner matches it.
    fn commit_run(&mut self, id: EntityId, faces: Vec<StagedFace>) {
        let reuse = self
            .runs
            .iter()
            .find(|run| {
                run.len() == faces.len()
                    && run.iter().zip(&faces).all(|(indices, face)| {
                        indices.len() == face.corners.len()
                            && indices
                                .iter()
                                .zip(&face.corners)
                                .all(|(&i, (entry, _))| self.vt.matches_at(i, entry, RUN_SLACK))
                    })
            })
            .cloned();

        match reuse {
            Some(run) => {
                log::trace!("reusing a run of {} faces", run.len());
                for (indices, face) in run.into_iter().zip(faces) {
                    let mut prim = face.prim;
                    prim.indices = indices;
                    self.prims.push(prim);
                }
            }
            None => {
                let run = faces.into_iter().map(|f| self.commit_face(id, f)).collect();
                self.runs.push(run);
            }
        }
    }

    /// Endpoints of a thin quad: the midpoints of its two short edges.
    fn line_ends(&self, face: &Face, el: &Element) -> Option<(Vec3, Vec3)> {
        if face.corners.len() != 4 {
            return None;
        }
        let p: Vec<Vec3> = face.corners.iter().map(|c| el.position(c.position)).collect();
        let width = self.config.line_width;
        let short = |a: usize, b: usize| p[a].distance(p[b]) < width;
        if short(0, 1) && short(2, 3) {
            Some(((p[0] + p[1]) / 2.0, (p[2] + p[3]) / 2.0))
        } else if short(1, 2) && short(3, 0) {
            Some(((p[1] + p[2]) / 2.0, (p[3] + p[0]) / 2.0))
        } else {
            None
        }
    }

    fn add_line(&mut self, el: &Element, face: &Face, materials: &[SceneMaterial], ends: (Vec3, Vec3)) {
        let color = face
            .material
            .and_then(|i| materials.get(i))
            .or(materials.first())
            .map_or(Vec3::ONE, |m| Vec3::from(m.diffuse));
        let mut prim = el.template(PrimStyle::Line);
        prim.indices = vec![
            self.vline.add(
                LineVertex {
                    position: ends.0,
                    color,
                },
                &[],
            ),
            self.vline.add(
                LineVertex {
                    position: ends.1,
                    color,
                },
                &[],
            ),
        ];
        self.prims.push(prim);
    }

    /// One custom light per distinct mesh vertex.
    fn add_halo<S: Scene + ?Sized>(
        &mut self,
        scene: &S,
        el: &Element,
        material: &SceneMaterial,
        location: &Location,
    ) -> Result<()> {
        let props = &el.entity.properties;
        let uv = [
            number(props, "s1", 0.0, location)?,
            number(props, "t1", 0.0, location)?,
            number(props, "s2", 1.0, location)?,
            number(props, "t2", 1.0, location)?,
        ];
        let dataref = string(props, "dataref", location)?.unwrap_or("NULL").to_string();
        let [r, g, b] = material.diffuse;

        let mut seen = HashSet::new();
        for face in scene.mesh_faces(el.id) {
            for corner in &face.corners {
                if !seen.insert(corner.vertex_index) {
                    continue;
                }
                let mut prim = el.template(PrimStyle::Light);
                prim.light = Some(InlineLight::Custom {
                    position: el.position(corner.position),
                    rgba: [r, g, b, material.alpha],
                    size: material.halo_size,
                    uv,
                    dataref: dataref.clone(),
                });
                self.prims.push(prim);
            }
        }
        log::trace!("\"{}\" produced {} halo lights", el.entity.name, seen.len());
        Ok(())
    }

    /// A lamp becomes an indexed light, a smoke puff, or a named/custom/spill light.
    pub fn add_lamp(&mut self, lamp: &Lamp, el: &Element, warnings: &mut Warnings) -> Result<()> {
        let location = &el.location;
        let props = &el.entity.properties;
        let position = el.position(Vec3::ZERO);
        let color = Vec3::from(lamp.color);

        match lamp.kind {
            LampKind::Sun | LampKind::Hemi | LampKind::Area => {
                warnings.push(location.clone(), "sun, hemi and area lamps are not exported");
                return Ok(());
            }
            LampKind::Spot => {
                let half = (lamp.spot_size * 0.5).to_radians();
                let direction = el
                    .matrix
                    .transform_vector3(Vec3::NEG_Z)
                    .try_normalize()
                    .unwrap_or(Vec3::NEG_Y);
                let mut prim = el.template(PrimStyle::Light);
                prim.light = Some(InlineLight::Spill {
                    position,
                    rgba: [color.x, color.y, color.z, number(props, "a", 1.0, location)?],
                    size: number(props, "size", lamp.distance, location)?,
                    direction,
                    semi: half.cos(),
                    dataref: string(props, "dataref", location)?.unwrap_or("NULL").to_string(),
                });
                self.prims.push(prim);
                return Ok(());
            }
            LampKind::Point => {}
        }

        let base = base_name(&el.entity.name);
        let lower = base.to_lowercase();
        let token = lower
            .split(|c: char| c == ' ' || c == '.' || c == '-')
            .next()
            .unwrap_or("");

        let indexed = match token {
            "pulse" => Some(Vec3::splat(PULSE)),
            "strobe" => Some(Vec3::splat(STROBE)),
            "traffic" => Some(Vec3::splat(TRAFFIC)),
            "flash" => Some(-color),
            "lamp" => Some(color),
            _ => None,
        };
        if let Some(color) = indexed {
            let entry = LightVertex { position, color };
            if self.vlight.find(&entry, &[]).is_some() {
                warnings.push(location.clone(), "duplicate light dropped");
                return Ok(());
            }
            let mut prim = el.template(PrimStyle::VLight);
            prim.indices = vec![self.vlight.push(entry)];
            self.prims.push(prim);
            return Ok(());
        }

        let light = match token {
            "smoke_black" | "smoke_white" => InlineLight::Smoke {
                black: token == "smoke_black",
                position,
                size: number(props, "size", 1.0, location)?,
            },
            _ => {
                let name = string(props, "name", location)?.unwrap_or(base).to_string();
                let params = string(props, "params", location)?.filter(|p| !p.is_empty());
                if name == "custom" {
                    InlineLight::Custom {
                        position,
                        rgba: [color.x, color.y, color.z, number(props, "a", 1.0, location)?],
                        size: number(props, "size", 1.0, location)?,
                        uv: [
                            number(props, "s1", 0.0, location)?,
                            number(props, "t1", 0.0, location)?,
                            number(props, "s2", 1.0, location)?,
                            number(props, "t2", 1.0, location)?,
                        ],
                        dataref: string(props, "dataref", location)?.unwrap_or("NULL").to_string(),
                    }
                } else if let Some(params) = params {
                    InlineLight::Param {
                        name,
                        position,
                        params: params.to_string(),
                    }
                } else {
                    InlineLight::Named { name, position }
                }
            }
        };
        let mut prim = el.template(PrimStyle::Light);
        prim.light = Some(light);
        self.prims.push(prim);
        Ok(())
    }
}
