//! OBJ8 compilation.
//!
//! The pipeline runs in a fixed order: ingest the scene into primitives and
//! pools, expand LOD membership, check instancing rules, sort by render
//! state, reconcile alpha, then lay the index table out in sorted order.
//! The result is a [`CompiledObject`] the emitter turns into text.

pub mod anim;
pub mod builder;
pub mod index;
pub mod ingest;
pub mod pool;
pub mod prim;
pub mod sort;

pub use anim::{Anim, AnimId, AnimList, Rotation, Visibility, VisibilityClause};
pub use pool::{LightVertex, LineVertex, Pool, VtEntry};
pub use prim::{InlineLight, Prim, PrimStyle};

use crate::error::{ConsistencyError, ExportError, Location, Result, StructuralError, Warning, Warnings};
use crate::resolver::{DatarefEntry, DatarefRegistry, SideBand};
use crate::scene::{FrameGuard, Scene};
use crate::types::{Alpha, CockpitRegion, Platform, PrimFlags, Surface, MAX_COCKPIT_REGIONS};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Export settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Header platform byte.
    pub platform: Platform,
    /// Enforce instance-safe output and emit `GLOBAL_*` attributes.
    pub instanced: bool,
    /// Emit `GLOBAL_cockpit_lit`.
    pub cockpit: bool,
    /// Near/far distance per LOD layer.
    pub lod_ranges: Vec<(f32, f32)>,
    /// Quads thinner than this become lines.
    pub line_width: f32,
    pub cockpit_regions: Vec<CockpitRegion>,
    /// Panel texture size used when the panel image cannot be read.
    pub panel_size: (u32, u32),
    /// Where textures live; probed for `_LIT`/`_NML` siblings and the panel image.
    pub texture_dir: Option<PathBuf>,
    /// Scale written on `TEXTURE_NORMAL`.
    pub normal_scale: Option<f32>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            platform: Platform::Ibm,
            instanced: false,
            cockpit: false,
            lod_ranges: vec![(0.0, 1000.0), (1000.0, 4000.0), (4000.0, 10000.0)],
            line_width: 0.101,
            cockpit_regions: Vec::new(),
            panel_size: (1024, 1024),
            texture_dir: None,
            normal_scale: None,
        }
    }
}

impl CompilerConfig {
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_instanced(mut self, instanced: bool) -> Self {
        self.instanced = instanced;
        self
    }

    pub fn with_cockpit(mut self, cockpit: bool) -> Self {
        self.cockpit = cockpit;
        self
    }

    pub fn with_lod_ranges(mut self, ranges: Vec<(f32, f32)>) -> Self {
        self.lod_ranges = ranges;
        self
    }

    pub fn with_cockpit_regions(mut self, regions: Vec<CockpitRegion>) -> Self {
        self.cockpit_regions = regions;
        self
    }

    pub fn with_texture_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.texture_dir = Some(dir.into());
        self
    }

    /// Near/far for a 0-based LOD layer.
    pub fn lod_range(&self, layer: u8) -> (f32, f32) {
        self.lod_ranges
            .get(layer as usize)
            .copied()
            .unwrap_or((0.0, 10000.0))
    }
}

/// Table sizes as declared by `POINT_COUNTS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PointCounts {
    pub vt: usize,
    pub vline: usize,
    pub vlight: usize,
    pub idx: usize,
}

/// What a successful export hands back.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    /// Number of emitted primitives.
    pub prims: usize,
    pub counts: PointCounts,
    #[serde(skip)]
    pub warnings: Vec<Warning>,
}

/// Texture paths written in the header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Textures {
    pub base: Option<String>,
    pub lit: Option<String>,
    pub normal: Option<String>,
}

impl Textures {
    /// Look for `<stem>_LIT` and `<stem>_NML` next to the base texture.
    fn probe(base: Option<String>, dir: Option<&Path>) -> Self {
        let sibling = |suffix: &str| -> Option<String> {
            let base = base.as_deref()?;
            let dir = dir?;
            let (stem, ext) = match base.rsplit_once('.') {
                Some((stem, ext)) if !ext.contains('/') => (stem, Some(ext)),
                _ => (base, None),
            };
            let name = match ext {
                Some(ext) => format!("{}{}.{}", stem, suffix, ext),
                None => format!("{}{}", stem, suffix),
            };
            dir.join(&name).is_file().then_some(name)
        };
        let lit = sibling("_LIT");
        let normal = sibling("_NML");
        Self { base, lit, normal }
    }
}

/// A fully compiled object, ready to emit.
#[derive(Debug, Clone)]
pub struct CompiledObject {
    pub config: CompilerConfig,
    pub vt: Vec<VtEntry>,
    pub vline: Vec<LineVertex>,
    pub vlight: Vec<LightVertex>,
    pub idx: Vec<u32>,
    /// Primitives in emission order.
    pub prims: Vec<Prim>,
    pub anims: AnimList,
    pub side_band: Vec<SideBand>,
    pub textures: Textures,
    /// Alpha mode shared by every primitive of an instanced object.
    pub global_alpha: Option<Alpha>,
    pub global_no_shadow: bool,
    /// Union of every primitive's LOD layer bits.
    pub used_layers: u8,
    pub warnings: Vec<Warning>,
}

impl CompiledObject {
    pub fn counts(&self) -> PointCounts {
        PointCounts {
            vt: self.vt.len(),
            vline: self.vline.len(),
            vlight: self.vlight.len(),
            idx: self.idx.len(),
        }
    }

    pub fn has_draped(&self) -> bool {
        self.prims.iter().any(Prim::is_draped)
    }
}

/// Compiles scenes into OBJ8 objects.
pub struct Obj8Compiler {
    config: CompilerConfig,
    registry: DatarefRegistry,
}

impl Obj8Compiler {
    /// Create a compiler with an empty dataref registry.
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            config,
            registry: DatarefRegistry::new(),
        }
    }

    pub fn with_registry(mut self, registry: DatarefRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Register extra datarefs on top of the current registry.
    pub fn with_datarefs(mut self, entries: impl IntoIterator<Item = DatarefEntry>) -> Self {
        self.registry.extend(entries);
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn registry(&self) -> &DatarefRegistry {
        &self.registry
    }

    /// Compile a scene. The scene's current frame is set to 1 for the
    /// duration and restored afterwards, also on error.
    pub fn compile<S: Scene + ?Sized>(&self, scene: &mut S) -> Result<CompiledObject> {
        self.validate_regions()?;

        let guard = FrameGuard::new(scene, 1);
        let scene: &S = &guard;

        let mut warnings = Warnings::new();
        let mut anims = AnimList::new();
        let mut builder = builder::Builder::new(&self.config);
        ingest::ingest(scene, &self.registry, &mut anims, &mut builder, &mut warnings)?;
        if !self.config.cockpit_regions.is_empty() {
            builder.panel_size()?;
        }
        anims.finish();
        log::debug!(
            "ingested {} prims, {} vertices, {} anim nodes",
            builder.prims.len(),
            builder.vt.len(),
            anims.len()
        );

        let mut prims = expand_lods(std::mem::take(&mut builder.prims), &mut warnings);
        if self.config.instanced {
            check_instance_safe(&prims)?;
        }
        sort::sort_prims(&mut prims, &anims);
        let global_alpha = reconcile_alpha(&mut prims, self.config.instanced)?;
        let (idx, vlight) = index::compact(&mut prims, builder.vlight.entries());

        let used_layers = prims.iter().fold(0, |mask, p| mask | p.layers);
        let global_no_shadow = self.config.instanced
            && !prims.is_empty()
            && prims.iter().all(|p| p.flags.contains(PrimFlags::NSHADOW));
        let textures = Textures::probe(builder.texture.take(), self.config.texture_dir.as_deref());

        Ok(CompiledObject {
            config: self.config.clone(),
            vt: builder.vt.into_vec(),
            vline: builder.vline.into_vec(),
            vlight,
            idx,
            prims,
            anims,
            side_band: builder.side_band,
            textures,
            global_alpha,
            global_no_shadow,
            used_layers,
            warnings: warnings.into_vec(),
        })
    }

    /// Compile a scene and write it as OBJ8 text.
    pub fn export<S: Scene + ?Sized, W: Write>(&self, scene: &mut S, writer: &mut W) -> Result<ExportReport> {
        let object = self.compile(scene)?;
        crate::export::obj8::write_obj8(&object, writer)?;
        Ok(report(object))
    }

    /// Compile a scene and write it to `path`. Nothing is left at `path` on failure.
    pub fn export_to_path<S: Scene + ?Sized, P: AsRef<Path>>(&self, scene: &mut S, path: P) -> Result<ExportReport> {
        let object = self.compile(scene)?;
        crate::export::obj8::export_to_path(&object, path)?;
        Ok(report(object))
    }

    fn validate_regions(&self) -> Result<()> {
        let regions = &self.config.cockpit_regions;
        if regions.len() > MAX_COCKPIT_REGIONS {
            return Err(ExportError::structural(
                Location::scene(),
                StructuralError::TooManyRegions {
                    count: regions.len(),
                    max: MAX_COCKPIT_REGIONS,
                },
            ));
        }
        if let Some(i) = regions.iter().position(|r| !r.is_power_of_two()) {
            return Err(ExportError::structural(Location::scene(), StructuralError::InvalidRegion(i)));
        }
        Ok(())
    }
}

fn report(object: CompiledObject) -> ExportReport {
    ExportReport {
        prims: object.prims.len(),
        counts: object.counts(),
        warnings: object.warnings,
    }
}

/// One copy of each primitive per LOD layer it belongs to. Copies outside
/// the first layer cannot be hard.
fn expand_lods(prims: Vec<Prim>, warnings: &mut Warnings) -> Vec<Prim> {
    let mut out = Vec::with_capacity(prims.len());
    let mut warned = HashSet::new();
    for prim in prims {
        for layer in 0..3u8 {
            if prim.layers & (1 << layer) == 0 {
                continue;
            }
            let mut copy = prim.clone();
            copy.focus = layer;
            if layer > 0 && copy.is_hard() {
                copy.flags.remove(PrimFlags::HARD);
                copy.flags.remove(PrimFlags::DECK);
                copy.surface = Surface::None;
                if warned.insert(copy.object.clone()) {
                    warnings.push(
                        Location::object(&copy.object),
                        "hard surfaces are only allowed in the first LOD; made soft",
                    );
                }
            }
            out.push(copy);
        }
    }
    out
}

fn check_instance_safe(prims: &[Prim]) -> Result<()> {
    for prim in prims {
        let offending = if prim.is_draped() {
            Some("ATTR_draped")
        } else if prim.light_level.is_some() {
            Some("ATTR_light_level")
        } else if prim.flags.contains(PrimFlags::PANEL) {
            Some("ATTR_cockpit")
        } else if !prim.manip.is_empty() {
            Some("manipulators")
        } else {
            None
        };
        if let Some(attr) = offending {
            return Err(ExportError::consistency(
                Location::object(&prim.object),
                ConsistencyError::NotInstanceSafe(attr),
            ));
        }
    }
    Ok(())
}

/// Give don't-care (opaque) primitives the alpha mode already in effect so
/// they never force a blend change. Instanced objects must settle on a
/// single mode, which is returned.
fn reconcile_alpha(prims: &mut [Prim], instanced: bool) -> Result<Option<Alpha>> {
    if instanced {
        let Some(global) = prims
            .iter()
            .find(|p| !p.is_draped() && !p.alpha.is_opaque())
            .map(|p| p.alpha)
        else {
            return Ok(None);
        };
        for prim in prims.iter_mut().filter(|p| !p.is_draped()) {
            if prim.alpha.is_opaque() {
                prim.alpha = global;
            } else if prim.alpha != global {
                return Err(ExportError::consistency(
                    Location::object(&prim.object),
                    ConsistencyError::AlphaConflict {
                        first: global.to_string(),
                        second: prim.alpha.to_string(),
                    },
                ));
            }
        }
        log::debug!("global alpha: {}", global);
        return Ok(Some(global));
    }

    let mut current: Option<Alpha> = None;
    let mut focus = None;
    for prim in prims.iter_mut().filter(|p| !p.is_draped()) {
        if focus != Some(prim.focus) {
            focus = Some(prim.focus);
            current = None;
        }
        if prim.alpha.is_opaque() {
            if let Some(alpha) = current {
                prim.alpha = alpha;
            }
        } else {
            current = Some(prim.alpha);
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{
        BoneDoc, EntityDoc, EntityKindDoc, FaceDoc, KeyDoc, Lamp, LampKind, Properties, SceneDocument,
        SceneMaterial, Transparency,
    };

    const QUAD: [[f32; 3]; 4] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 1.0], [0.0, 0.0, 1.0]];
    const QUAD_UV: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

    fn textured_quad(name: &str) -> EntityDoc {
        EntityDoc::mesh(
            name,
            QUAD.to_vec(),
            vec![FaceDoc::new(vec![0, 1, 2, 3])
                .with_uv(QUAD_UV.to_vec())
                .with_image("t.png")],
        )
    }

    fn export_text(compiler: &Obj8Compiler, doc: &mut SceneDocument) -> (String, ExportReport) {
        let mut out = Vec::new();
        let report = compiler.export(doc, &mut out).unwrap();
        (String::from_utf8(out).unwrap(), report)
    }

    fn lines(text: &str) -> Vec<&str> {
        text.lines().collect()
    }

    fn position(lines: &[&str], prefix: &str) -> usize {
        lines
            .iter()
            .position(|l| l.starts_with(prefix))
            .unwrap_or_else(|| panic!("no line starting with {:?}", prefix))
    }

    #[test]
    fn test_single_textured_quad() {
        let mut doc = SceneDocument::from_entities(vec![textured_quad("Quad")]).unwrap();
        let compiler = Obj8Compiler::new(CompilerConfig::default());
        let (text, report) = export_text(&compiler, &mut doc);
        let lines = lines(&text);

        assert_eq!(&lines[..3], &["I", "800", "OBJ"]);
        assert!(lines.contains(&"TEXTURE t.png"));
        assert!(lines.contains(&"POINT_COUNTS 4 0 0 6"));
        assert_eq!(lines.iter().filter(|l| l.starts_with("VT\t")).count(), 4);
        let idx: Vec<&str> = lines
            .iter()
            .filter(|l| l.starts_with("IDX\t"))
            .map(|l| &l[4..])
            .collect();
        assert_eq!(idx, vec!["0", "1", "2", "0", "2", "3"]);
        assert!(lines.contains(&"TRIS 0 6"));
        assert_eq!(report.prims, 1);
        assert_eq!(
            report.counts,
            PointCounts {
                vt: 4,
                vline: 0,
                vlight: 0,
                idx: 6
            }
        );
    }

    #[test]
    fn test_quad_and_line() {
        let mut line = EntityDoc::mesh(
            "Wire",
            vec![[0.0, 0.0, 2.0], [0.0, 0.05, 2.0], [3.0, 0.05, 2.0], [3.0, 0.0, 2.0]],
            vec![FaceDoc::new(vec![0, 1, 2, 3]).with_mode(&["dynamic"])],
        );
        line.materials = vec![SceneMaterial {
            diffuse: [1.0, 0.0, 0.0],
            ..SceneMaterial::default()
        }];
        let mut doc = SceneDocument::from_entities(vec![textured_quad("Quad"), line]).unwrap();
        let compiler = Obj8Compiler::new(CompilerConfig::default());
        let (text, _) = export_text(&compiler, &mut doc);
        let lines = lines(&text);

        // Line indices share the IDX table with the quad's six.
        assert!(lines.contains(&"POINT_COUNTS 4 2 0 8"));
        let vlines: Vec<&&str> = lines.iter().filter(|l| l.starts_with("VLINE\t")).collect();
        assert_eq!(vlines.len(), 2);
        assert!(vlines[0].ends_with("1 0 0"));
        assert!(position(&lines, "TRIS") < position(&lines, "LINES"));
        assert!(lines.contains(&"LINES 6 2"));
    }

    #[test]
    fn test_alpha_over_opaque() {
        let mut clip = textured_quad("Decal");
        clip.faces[0].transparency = Transparency::Clip;
        let mut doc = SceneDocument::from_entities(vec![textured_quad("Base"), clip]).unwrap();
        let compiler = Obj8Compiler::new(CompilerConfig::default());
        let (text, _) = export_text(&compiler, &mut doc);
        let lines = lines(&text);

        assert!(!text.contains("GLOBAL_no_blend"));
        let tris: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.starts_with("TRIS"))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(tris.len(), 2);
        let between: Vec<&&str> = lines[tris[0]..tris[1]]
            .iter()
            .filter(|l| l.starts_with("ATTR_no_blend"))
            .collect();
        assert_eq!(between, vec![&"ATTR_no_blend 0.50"]);
        assert_eq!(text.matches("ATTR_no_blend").count(), 1);
    }

    fn animated_doc() -> SceneDocument {
        let half = std::f32::consts::FRAC_1_SQRT_2;
        let mut arm = EntityDoc::new("Armature", EntityKindDoc::Armature);
        arm.bones = vec![BoneDoc {
            name: "foo".into(),
            head: [0.0, 0.0, 0.0],
            tail: [0.0, 0.0, 1.0],
            keys: vec![
                KeyDoc::default(),
                KeyDoc {
                    loc: [0.0; 3],
                    rot: [half, 0.0, -half, 0.0],
                },
            ],
            ..BoneDoc::default()
        }];
        let needle = EntityDoc::mesh(
            "Needle",
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
            vec![FaceDoc::new(vec![0, 1, 2])],
        )
        .with_parent("Armature", Some("foo"));
        SceneDocument::from_entities(vec![arm, needle]).unwrap()
    }

    #[test]
    fn test_animated_child() {
        let mut doc = animated_doc();
        let compiler = Obj8Compiler::new(CompilerConfig::default())
            .with_datarefs(vec![DatarefEntry::new("sim/cockpit/switches/foo", 1)]);
        let (text, _) = export_text(&compiler, &mut doc);
        let lines = lines(&text);

        let begin = position(&lines, "ANIM_begin");
        let tris = position(&lines, "TRIS");
        let end = position(&lines, "ANIM_end");
        assert!(begin < tris && tris < end);
        assert!(lines.contains(&"ANIM_rotate 0 0 1 0.00 90.00 0 1 sim/cockpit/switches/foo"));
        assert!(!text.contains("ANIM_trans"));
    }

    #[test]
    fn test_two_lods() {
        let mut near = textured_quad("Near");
        near.faces[0].mode = Some(vec!["tex".into(), "tiles".into()]);
        let mut far = textured_quad("Far");
        far.layers = 0b010;
        far.faces[0].mode = Some(vec!["tex".into(), "tiles".into()]);
        let mut doc = SceneDocument::from_entities(vec![near, far]).unwrap();
        let config = CompilerConfig::default()
            .with_lod_ranges(vec![(0.0, 1000.0), (1000.0, 10000.0), (10000.0, 20000.0)]);
        let compiler = Obj8Compiler::new(config);
        let (text, report) = export_text(&compiler, &mut doc);
        let lines = lines(&text);

        let lod = position(&lines, "ATTR_LOD 1000 10000");
        assert_eq!(lines[lod - 1], "");
        let last_tris = lines.iter().rposition(|l| l.starts_with("TRIS")).unwrap();
        assert!(lod < last_tris);
        assert!(lines[lod..].iter().all(|l| !l.starts_with("ATTR_hard")));
        assert!(lines[..lod].iter().any(|l| l.starts_with("ATTR_hard")));
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_named_light_with_params() {
        let lamp = EntityDoc::lamp(
            "NavLeft",
            Lamp {
                kind: LampKind::Point,
                color: [1.0, 0.0, 0.0],
                energy: 1.0,
                distance: 20.0,
                spot_size: 45.0,
            },
        )
        .with_properties(
            Properties::new()
                .with_str("name", "airplane_nav_left")
                .with_str("params", "1.0"),
        );
        let mut doc = SceneDocument::from_entities(vec![lamp]).unwrap();
        let compiler = Obj8Compiler::new(CompilerConfig::default());
        let (text, _) = export_text(&compiler, &mut doc);
        assert!(lines(&text).contains(&"LIGHT_PARAM airplane_nav_left\t\t0.000 0.000 0.000 1.0"));
    }

    #[test]
    fn test_indexed_lights_and_duplicates() {
        let point = |name: &str, at: [f32; 3]| {
            EntityDoc::lamp(
                name,
                Lamp {
                    kind: LampKind::Point,
                    color: [1.0, 1.0, 0.0],
                    energy: 1.0,
                    distance: 20.0,
                    spot_size: 45.0,
                },
            )
            .at(at)
        };
        let mut doc = SceneDocument::from_entities(vec![
            point("lamp.001", [0.0, 0.0, 1.0]),
            point("pulse", [1.0, 0.0, 0.0]),
            point("lamp.002", [0.0, 0.0, 1.0]),
        ])
        .unwrap();
        let compiler = Obj8Compiler::new(CompilerConfig::default());
        let (text, report) = export_text(&compiler, &mut doc);
        let lines = lines(&text);
        assert!(lines.contains(&"POINT_COUNTS 0 0 2 0"));
        assert!(lines.contains(&"LIGHTS 0 2"));
        assert!(text.contains("9.9 9.9 9.9"));
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_export_is_deterministic() {
        let compiler = Obj8Compiler::new(CompilerConfig::default())
            .with_datarefs(vec![DatarefEntry::new("sim/cockpit/switches/foo", 1)]);
        let (a, _) = export_text(&compiler, &mut animated_doc());
        let (b, _) = export_text(&compiler, &mut animated_doc());
        assert_eq!(a, b);
    }

    #[test]
    fn test_point_counts_match_tables() {
        let mut clip = textured_quad("Decal");
        clip.faces[0].transparency = Transparency::Clip;
        let mut doc = SceneDocument::from_entities(vec![textured_quad("Base"), clip]).unwrap();
        let compiler = Obj8Compiler::new(CompilerConfig::default());
        let (text, report) = export_text(&compiler, &mut doc);
        let lines = lines(&text);

        let vt = lines.iter().filter(|l| l.starts_with("VT\t")).count();
        let idx: usize = lines
            .iter()
            .filter(|l| l.starts_with("IDX"))
            .map(|l| l.split('\t').count() - 1)
            .sum();
        assert_eq!(report.counts.vt, vt);
        assert_eq!(report.counts.idx, idx);

        for l in lines.iter().filter(|l| l.starts_with("TRIS")) {
            let nums: Vec<usize> = l.split(' ').skip(1).map(|n| n.parse().unwrap()).collect();
            assert!(nums[0] + nums[1] <= idx);
            assert_eq!(nums[1] % 3, 0);
        }
        for l in lines.iter().filter(|l| l.starts_with("IDX")) {
            for i in l.split('\t').skip(1) {
                assert!(i.parse::<usize>().unwrap() < vt);
            }
        }
    }

    #[test]
    fn test_anim_brackets_balance() {
        let compiler = Obj8Compiler::new(CompilerConfig::default())
            .with_datarefs(vec![DatarefEntry::new("sim/cockpit/switches/foo", 1)]);
        let mut doc = animated_doc();
        let (text, _) = export_text(&compiler, &mut doc);
        let mut depth = 0i32;
        for line in text.lines() {
            if line == "ANIM_begin" {
                depth += 1;
            } else if line == "ANIM_end" {
                depth -= 1;
            }
            assert!(depth >= 0);
        }
        assert_eq!(depth, 0);
    }

    #[test]
    fn test_frame_restored_on_failure() {
        let mut doc = animated_doc();
        doc.set_current_frame(12);
        // No registry entry for "foo".
        let compiler = Obj8Compiler::new(CompilerConfig::default());
        let err = compiler.compile(&mut doc).unwrap_err();
        assert!(err.to_string().contains("not a known dataref"));
        assert_eq!(doc.current_frame(), 12);
    }

    #[test]
    fn test_instanced_rejects_draped() {
        let draped = textured_quad("Apron").with_properties(
            Properties::new().with("ATTR_draped", crate::scene::PropertyValue::Int(1)),
        );
        let mut doc = SceneDocument::from_entities(vec![draped]).unwrap();
        let compiler = Obj8Compiler::new(CompilerConfig::default().with_instanced(true));
        let err = compiler.compile(&mut doc).unwrap_err();
        assert!(matches!(
            err,
            ExportError::Consistency {
                reason: ConsistencyError::NotInstanceSafe("ATTR_draped"),
                ..
            }
        ));
    }

    #[test]
    fn test_instanced_alpha_conflict() {
        let mut clip = textured_quad("Clip");
        clip.faces[0].transparency = Transparency::Clip;
        let mut blend = textured_quad("Blend");
        blend.faces[0].transparency = Transparency::Alpha;
        let mut doc = SceneDocument::from_entities(vec![clip, blend]).unwrap();
        let compiler = Obj8Compiler::new(CompilerConfig::default().with_instanced(true));
        let err = compiler.compile(&mut doc).unwrap_err();
        assert!(matches!(
            err,
            ExportError::Consistency {
                reason: ConsistencyError::AlphaConflict { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_instanced_global_alpha() {
        let mut clip = textured_quad("Clip");
        clip.faces[0].transparency = Transparency::Clip;
        let mut doc = SceneDocument::from_entities(vec![textured_quad("Base"), clip]).unwrap();
        let compiler = Obj8Compiler::new(CompilerConfig::default().with_instanced(true));
        let (text, _) = export_text(&compiler, &mut doc);
        assert!(text.contains("GLOBAL_no_blend 0.50"));
        assert!(!text.contains("ATTR_no_blend"));
    }

    #[test]
    fn test_region_validation() {
        let mut doc = SceneDocument::from_entities(vec![textured_quad("Quad")]).unwrap();
        let config = CompilerConfig::default().with_cockpit_regions(vec![CockpitRegion::new(0, 0, 300, 256)]);
        let err = Obj8Compiler::new(config).compile(&mut doc).unwrap_err();
        assert!(matches!(
            err,
            ExportError::Structural {
                reason: StructuralError::InvalidRegion(0),
                ..
            }
        ));

        let config =
            CompilerConfig::default().with_cockpit_regions(vec![CockpitRegion::new(1024, 0, 256, 256)]);
        let err = Obj8Compiler::new(config).compile(&mut doc).unwrap_err();
        assert!(matches!(
            err,
            ExportError::Structural {
                reason: StructuralError::RegionBounds(0),
                ..
            }
        ));
    }

    #[test]
    fn test_config_from_json() {
        let config: CompilerConfig =
            serde_json::from_str(r#"{ "instanced": true, "platform": "apple", "lod_ranges": [[0, 500]] }"#)
                .unwrap();
        assert!(config.instanced);
        assert_eq!(config.platform, Platform::Apple);
        assert_eq!(config.lod_range(0), (0.0, 500.0));
        assert_eq!(config.line_width, 0.101);
    }

    #[test]
    fn test_texture_siblings_are_found() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["t.png", "t_LIT.png", "t_NML.png"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let mut doc = SceneDocument::from_entities(vec![textured_quad("Quad")]).unwrap();
        let compiler = Obj8Compiler::new(CompilerConfig::default().with_texture_dir(dir.path()));
        let (text, _) = export_text(&compiler, &mut doc);
        let lines = lines(&text);
        let base = position(&lines, "TEXTURE t.png");
        assert_eq!(lines[base + 1], "TEXTURE_LIT t_LIT.png");
        assert_eq!(lines[base + 2], "TEXTURE_NORMAL t_NML.png");
    }

    #[test]
    fn test_texture_lookup_needs_dir_and_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("skin_NML"), b"").unwrap();

        let none = Textures::probe(Some("skin.png".into()), None);
        assert_eq!((none.lit, none.normal), (None, None));

        let partial = Textures::probe(Some("skin.png".into()), Some(dir.path()));
        assert_eq!((partial.lit, partial.normal), (None, None));

        let bare = Textures::probe(Some("skin".into()), Some(dir.path()));
        assert_eq!(bare.lit, None);
        assert_eq!(bare.normal.as_deref(), Some("skin_NML"));
    }

    /// One entity per state the sort distinguishes.
    fn mixed_doc() -> SceneDocument {
        let base = textured_quad("Base");
        let mut red = textured_quad("Red").at([0.0, 1.0, 0.0]);
        red.materials = vec![SceneMaterial {
            diffuse: [1.0, 0.0, 0.0],
            ..SceneMaterial::default()
        }];
        red.faces[0].material = Some(0);
        let mut npoly = textured_quad("Npoly").at([0.0, 2.0, 0.0]);
        npoly.faces[0].mode = Some(vec!["tex".into()]);
        let mut clip = textured_quad("Clip").at([0.0, 3.0, 0.0]);
        clip.faces[0].transparency = Transparency::Clip;
        let mut blend = textured_quad("Blend").at([0.0, 4.0, 0.0]);
        blend.faces[0].transparency = Transparency::Alpha;
        let mut far = textured_quad("Far").at([0.0, 5.0, 0.0]);
        far.faces[0].transparency = Transparency::Alpha;
        far.layers = 0b011;
        let lit = textured_quad("Lit")
            .at([0.0, 6.0, 0.0])
            .with_properties(Properties::new().with_str("ATTR_light_level", "sim/lights/level"));
        let mut roof = textured_quad("Roof").at([0.0, 7.0, 0.0]);
        roof.group = Some("Roof".into());

        SceneDocument::from_entities(vec![roof, lit, far, blend, clip, npoly, red, base]).unwrap()
    }

    #[test]
    fn test_emitted_order_never_goes_back_in_state() {
        let object = Obj8Compiler::new(CompilerConfig::default())
            .compile(&mut mixed_doc())
            .unwrap();
        assert_eq!(object.prims.len(), 9);
        for pair in object.prims.windows(2) {
            assert_ne!(
                sort::state_cmp(&pair[0], &pair[1], &object.anims),
                std::cmp::Ordering::Greater,
                "\"{}\" emitted before \"{}\"",
                pair[0].object,
                pair[1].object
            );
        }
    }

    #[test]
    fn test_no_opaque_after_blend_within_a_focus() {
        let object = Obj8Compiler::new(CompilerConfig::default())
            .compile(&mut mixed_doc())
            .unwrap();
        for focus in 0..3u8 {
            let modes: Vec<crate::types::AlphaMode> = object
                .prims
                .iter()
                .filter(|p| p.focus == focus && !p.is_draped())
                .map(|p| p.alpha.mode)
                .collect();
            if let Some(first_blend) = modes.iter().position(|&m| m == crate::types::AlphaMode::Blend) {
                assert!(
                    modes[first_blend..]
                        .iter()
                        .all(|&m| m != crate::types::AlphaMode::Opaque),
                    "opaque after blend in LOD {}: {:?}",
                    focus,
                    modes
                );
            }
        }
    }
}
