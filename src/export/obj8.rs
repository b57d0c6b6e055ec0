//! OBJ8 text output.
//!
//! The header and tables come first, then the command stream. The command
//! emitter keeps a shadow of the renderer state so each attribute is only
//! written when it changes, and merges contiguous `TRIS`, `LINES` and
//! `LIGHTS` ranges that share a state.

use crate::compiler::{Anim, AnimId, CompiledObject, InlineLight, Prim, PrimStyle, Rotation, Visibility};
use crate::error::Result;
use crate::export::format::{angle, compact3, fixed3, ratio, trim, uv};
use crate::types::{Alpha, AlphaMode, Group, LightLevel, Material, PrimFlags, Surface};
use glam::Vec3;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Write a compiled object as OBJ8 text.
pub fn write_obj8<W: Write>(object: &CompiledObject, w: &mut W) -> Result<()> {
    write_header(object, w)?;
    write_tables(object, w)?;
    for directive in &object.side_band {
        writeln!(w, "{}", directive)?;
    }
    Emitter::new(object).run(w)
}

/// Write to a temporary file beside `path` and move it into place once complete.
pub fn export_to_path<P: AsRef<Path>>(object: &CompiledObject, path: P) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)?;
    {
        let mut w = BufWriter::new(file.as_file_mut());
        write_obj8(object, &mut w)?;
        w.flush()?;
    }
    file.persist(path).map_err(|e| e.error)?;
    log::debug!("wrote {}", path.display());
    Ok(())
}

fn write_header<W: Write>(object: &CompiledObject, w: &mut W) -> Result<()> {
    let config = &object.config;
    let textures = &object.textures;

    writeln!(w, "{}", config.platform.header_byte())?;
    writeln!(w, "800")?;
    writeln!(w, "OBJ")?;
    writeln!(w)?;

    match &textures.base {
        Some(base) => writeln!(w, "TEXTURE {}", base)?,
        None => writeln!(w, "TEXTURE")?,
    }
    if let Some(lit) = &textures.lit {
        writeln!(w, "TEXTURE_LIT {}", lit)?;
    }
    if let Some(normal) = &textures.normal {
        match config.normal_scale {
            Some(scale) => writeln!(w, "TEXTURE_NORMAL {} {}", trim(scale, 3), normal)?,
            None => writeln!(w, "TEXTURE_NORMAL {}", normal)?,
        }
    }
    if object.has_draped() {
        if let Some(base) = &textures.base {
            writeln!(w, "TEXTURE_DRAPED {}", base)?;
        }
        if let Some(normal) = &textures.normal {
            writeln!(
                w,
                "TEXTURE_DRAPED_NORMAL {} {}",
                trim(config.normal_scale.unwrap_or(1.0), 3),
                normal
            )?;
        }
    }

    for region in &config.cockpit_regions {
        writeln!(
            w,
            "COCKPIT_REGION {} {} {} {}",
            region.x,
            region.y,
            region.right(),
            region.top()
        )?;
    }
    if config.cockpit {
        writeln!(w, "GLOBAL_cockpit_lit")?;
    }
    if let Some(alpha) = object.global_alpha {
        match alpha.mode {
            AlphaMode::Test => writeln!(w, "GLOBAL_no_blend {}", ratio(alpha.cutoff))?,
            AlphaMode::ShadowTest => writeln!(w, "GLOBAL_shadow_blend {}", ratio(alpha.cutoff))?,
            AlphaMode::Opaque | AlphaMode::Blend => {}
        }
    }
    if object.global_no_shadow {
        writeln!(w, "GLOBAL_no_shadow")?;
    }

    let counts = object.counts();
    writeln!(w)?;
    writeln!(
        w,
        "POINT_COUNTS {} {} {} {}",
        counts.vt, counts.vline, counts.vlight, counts.idx
    )?;
    writeln!(w)?;
    Ok(())
}

fn color(c: Vec3) -> String {
    format!("{} {} {}", trim(c.x, 3), trim(c.y, 3), trim(c.z, 3))
}

fn write_tables<W: Write>(object: &CompiledObject, w: &mut W) -> Result<()> {
    for v in &object.vt {
        let line = format!(
            "VT\t{}\t{}\t{} {}",
            fixed3(v.position),
            fixed3(v.normal),
            uv(v.uv.x),
            uv(v.uv.y)
        );
        writeln!(w, "{}", line.trim_end())?;
    }
    for v in &object.vline {
        writeln!(w, "VLINE\t{}\t{}", fixed3(v.position), color(v.color))?;
    }
    for v in &object.vlight {
        writeln!(w, "VLIGHT\t{}\t{}", fixed3(v.position), color(v.color))?;
    }

    let mut chunks = object.idx.chunks_exact(10);
    for chunk in &mut chunks {
        let row: Vec<String> = chunk.iter().map(u32::to_string).collect();
        writeln!(w, "IDX10\t{}", row.join("\t"))?;
    }
    for i in chunks.remainder() {
        writeln!(w, "IDX\t{}", i)?;
    }
    writeln!(w)?;
    Ok(())
}

/// Which manipulator the renderer currently applies.
#[derive(Debug, Clone, PartialEq)]
enum Manip {
    None,
    /// The one implied by `ATTR_cockpit[_region]`.
    Panel,
    Custom(String),
}

/// Mirror of the renderer's attribute state.
#[derive(Debug, Clone)]
struct Shadow {
    draped: bool,
    npoly: bool,
    alpha: Alpha,
    /// Region index (-1 for the whole panel) while panel texturing is on.
    panel: Option<i32>,
    manip: Manip,
    material: Material,
    twoside: bool,
    /// Deck flag and surface while hard.
    hard: Option<(bool, Surface)>,
    nshadow: bool,
    light_level: Option<LightLevel>,
    draw_disable: bool,
    solid_camera: bool,
}

impl Shadow {
    fn new(object: &CompiledObject) -> Self {
        Self {
            draped: false,
            npoly: false,
            alpha: object.global_alpha.unwrap_or(Alpha::BLEND),
            panel: None,
            manip: Manip::None,
            material: Material::Default,
            twoside: false,
            hard: None,
            nshadow: object.global_no_shadow,
            light_level: None,
            draw_disable: false,
            solid_camera: false,
        }
    }
}

fn cockpit_line(region: i32) -> String {
    if region < 0 {
        "ATTR_cockpit".to_string()
    } else {
        format!("ATTR_cockpit_region {}", region)
    }
}

fn alpha_line(alpha: Alpha) -> Option<String> {
    match alpha.mode {
        AlphaMode::Opaque => None,
        AlphaMode::Test => Some(format!("ATTR_no_blend {}", ratio(alpha.cutoff))),
        AlphaMode::ShadowTest => Some(format!("ATTR_shadow_blend {}", ratio(alpha.cutoff))),
        AlphaMode::Blend => Some("ATTR_blend".to_string()),
    }
}

fn hard_line(hard: Option<(bool, Surface)>) -> String {
    match hard {
        None => "ATTR_no_hard".to_string(),
        Some((deck, surface)) => {
            let name = if deck { "ATTR_hard_deck" } else { "ATTR_hard" };
            if surface.is_none() {
                name.to_string()
            } else {
                format!("{} {}", name, surface)
            }
        }
    }
}

/// A contiguous range waiting to be written as one command.
#[derive(Debug, Clone, Copy)]
struct Run {
    style: PrimStyle,
    offset: usize,
    count: usize,
}

struct Emitter<'o> {
    object: &'o CompiledObject,
    shadow: Shadow,
    focus: Option<u8>,
    open: Vec<AnimId>,
    /// `None` until the first group comment of an LOD.
    group: Option<Option<&'o Group>>,
    has_groups: bool,
    pending: Option<Run>,
}

impl<'o> Emitter<'o> {
    fn new(object: &'o CompiledObject) -> Self {
        Self {
            object,
            shadow: Shadow::new(object),
            focus: None,
            open: Vec::new(),
            group: None,
            has_groups: object.prims.iter().any(|p| p.group.is_some()),
            pending: None,
        }
    }

    fn run<W: Write>(mut self, w: &mut W) -> Result<()> {
        let object = self.object;
        for prim in &object.prims {
            if self.focus != Some(prim.focus) {
                self.enter_lod(prim.focus, w)?;
            }
            if self.has_groups {
                self.sync_group(prim.group.as_ref(), w)?;
            }
            self.sync_anims(prim.anim, w)?;

            let changes = match prim.style {
                PrimStyle::Tri | PrimStyle::Line => self.sync_state(prim),
                PrimStyle::VLight | PrimStyle::Light => Vec::new(),
            };
            if !changes.is_empty() {
                self.flush(w)?;
                for line in changes {
                    writeln!(w, "{}", line)?;
                }
            }

            match (prim.style, &prim.light) {
                (PrimStyle::Light, Some(light)) => {
                    self.flush(w)?;
                    writeln!(w, "{}", light_line(light))?;
                }
                (PrimStyle::Light, None) => {}
                (style, _) => self.extend(style, prim.offset, prim.count, w)?,
            }
        }
        self.flush(w)?;
        self.close_anims(w)?;
        Ok(())
    }

    fn enter_lod<W: Write>(&mut self, focus: u8, w: &mut W) -> Result<()> {
        self.flush(w)?;
        self.close_anims(w)?;
        self.shadow = Shadow::new(self.object);
        self.group = None;
        self.focus = Some(focus);

        writeln!(w)?;
        if self.object.used_layers != 1 {
            let (near, far) = self.object.config.lod_range(focus);
            writeln!(w, "ATTR_LOD {} {}", trim(near, 3), trim(far, 3))?;
        }
        Ok(())
    }

    fn close_anims<W: Write>(&mut self, w: &mut W) -> Result<()> {
        while self.open.pop().is_some() {
            writeln!(w, "ANIM_end")?;
        }
        Ok(())
    }

    fn sync_anims<W: Write>(&mut self, anim: Option<AnimId>, w: &mut W) -> Result<()> {
        let wanted = self.object.anims.chain(anim);
        if wanted == self.open {
            return Ok(());
        }
        self.flush(w)?;
        let common = self
            .open
            .iter()
            .zip(&wanted)
            .take_while(|(a, b)| a == b)
            .count();
        while self.open.len() > common {
            self.open.pop();
            writeln!(w, "ANIM_end")?;
        }
        for &id in &wanted[common..] {
            writeln!(w, "ANIM_begin")?;
            if let Some(node) = self.object.anims.get(id) {
                write_anim_body(node, w)?;
            }
            self.open.push(id);
        }
        Ok(())
    }

    /// Group banners are written at the top level, outside any animation.
    fn sync_group<W: Write>(&mut self, group: Option<&'o Group>, w: &mut W) -> Result<()> {
        if self.group == Some(group) {
            return Ok(());
        }
        self.flush(w)?;
        self.close_anims(w)?;
        match group {
            Some(g) => writeln!(w, "#### _group {}", g.0)?,
            None => writeln!(w, "#### No_group")?,
        }
        self.group = Some(group);
        Ok(())
    }

    /// Bring the shadow in line with `prim`, returning the directives needed.
    fn sync_state(&mut self, prim: &Prim) -> Vec<String> {
        let s = &mut self.shadow;
        let mut out = Vec::new();

        let draped = prim.is_draped();
        if draped != s.draped {
            out.push(if draped { "ATTR_draped" } else { "ATTR_no_draped" }.to_string());
            s.draped = draped;
        }
        if !draped {
            let npoly = prim.flags.contains(PrimFlags::NPOLY);
            if npoly != s.npoly {
                out.push(if npoly { "ATTR_poly_os 2" } else { "ATTR_poly_os 0" }.to_string());
                s.npoly = npoly;
            }
            if prim.alpha != s.alpha {
                if let Some(line) = alpha_line(prim.alpha) {
                    out.push(line);
                    s.alpha = prim.alpha;
                }
            }
        }

        let panel = prim.flags.contains(PrimFlags::PANEL).then_some(prim.region);
        if panel != s.panel {
            match panel {
                Some(region) => {
                    out.push(cockpit_line(region));
                    s.manip = Manip::Panel;
                }
                None => {
                    out.push("ATTR_no_cockpit".to_string());
                    if s.manip == Manip::Panel {
                        s.manip = Manip::None;
                    }
                }
            }
            s.panel = panel;
        }
        let manip = if !prim.manip.is_empty() {
            Manip::Custom(prim.manip.clone())
        } else if panel.is_some() {
            Manip::Panel
        } else {
            Manip::None
        };
        if manip != s.manip {
            match (&manip, panel) {
                (Manip::Custom(line), _) => out.push(line.clone()),
                (Manip::Panel, Some(region)) => out.push(cockpit_line(region)),
                _ => out.push("ATTR_manip_none".to_string()),
            }
            s.manip = manip;
        }

        if prim.material != s.material {
            match prim.material {
                Material::Default => out.push("ATTR_reset".to_string()),
                wanted => {
                    let current = s.material;
                    if wanted.diffuse() != current.diffuse() {
                        out.push(format!("ATTR_diffuse_rgb {}", rgb(wanted.diffuse())));
                    }
                    if wanted.emission() != current.emission() {
                        out.push(format!("ATTR_emission_rgb {}", rgb(wanted.emission())));
                    }
                    if wanted.shiny() != current.shiny() {
                        out.push(format!("ATTR_shiny_rat {}", ratio(wanted.shiny())));
                    }
                }
            }
            s.material = prim.material;
        }

        let twoside = prim.flags.contains(PrimFlags::TWOSIDE);
        if twoside != s.twoside {
            out.push(if twoside { "ATTR_no_cull" } else { "ATTR_cull" }.to_string());
            s.twoside = twoside;
        }

        let hard = if prim.flags.contains(PrimFlags::HARD) {
            Some((false, prim.surface))
        } else if prim.flags.contains(PrimFlags::DECK) {
            Some((true, prim.surface))
        } else {
            None
        };
        if hard != s.hard {
            out.push(hard_line(hard));
            s.hard = hard;
        }

        let nshadow = prim.flags.contains(PrimFlags::NSHADOW);
        if nshadow != s.nshadow {
            out.push(if nshadow { "ATTR_no_shadow" } else { "ATTR_shadow" }.to_string());
            s.nshadow = nshadow;
        }

        if prim.light_level != s.light_level {
            out.push(match &prim.light_level {
                Some(level) => format!(
                    "ATTR_light_level {} {} {}",
                    trim(level.v1, 3),
                    trim(level.v2, 3),
                    level.dataref
                ),
                None => "ATTR_light_level_reset".to_string(),
            });
            s.light_level = prim.light_level.clone();
        }

        let draw_disable = prim.flags.contains(PrimFlags::DRAW_DISABLE);
        if draw_disable != s.draw_disable {
            out.push(if draw_disable { "ATTR_draw_disable" } else { "ATTR_draw_enable" }.to_string());
            s.draw_disable = draw_disable;
        }
        let solid_camera = prim.flags.contains(PrimFlags::SOLID_CAMERA);
        if solid_camera != s.solid_camera {
            out.push(
                if solid_camera {
                    "ATTR_solid_camera"
                } else {
                    "ATTR_no_solid_camera"
                }
                .to_string(),
            );
            s.solid_camera = solid_camera;
        }

        out
    }

    fn extend<W: Write>(&mut self, style: PrimStyle, offset: usize, count: usize, w: &mut W) -> Result<()> {
        if let Some(run) = &mut self.pending {
            if run.style == style && run.offset + run.count == offset {
                run.count += count;
                return Ok(());
            }
        }
        self.flush(w)?;
        self.pending = Some(Run { style, offset, count });
        Ok(())
    }

    fn flush<W: Write>(&mut self, w: &mut W) -> Result<()> {
        let Some(run) = self.pending.take() else {
            return Ok(());
        };
        let command = match run.style {
            PrimStyle::Tri => "TRIS",
            PrimStyle::Line => "LINES",
            PrimStyle::VLight => "LIGHTS",
            PrimStyle::Light => return Ok(()),
        };
        writeln!(w, "{} {} {}", command, run.offset, run.count)?;
        Ok(())
    }
}

fn rgb(c: [f32; 3]) -> String {
    format!("{} {} {}", ratio(c[0]), ratio(c[1]), ratio(c[2]))
}

fn axis(v: Vec3) -> String {
    format!("{} {} {}", trim(v.x, 3), trim(v.y, 3), trim(v.z, 3))
}

fn write_anim_body<W: Write>(anim: &Anim, w: &mut W) -> Result<()> {
    for clause in &anim.clauses {
        let kind = match clause.kind {
            Visibility::Show => "ANIM_show",
            Visibility::Hide => "ANIM_hide",
        };
        writeln!(
            w,
            "{} {} {} {}",
            kind,
            trim(clause.lo, 3),
            trim(clause.hi, 3),
            clause.dataref
        )?;
    }

    let values = &anim.values;
    match anim.translations.as_slice() {
        [] => {}
        [p] => writeln!(w, "ANIM_trans {} {} 0 0 no_ref", compact3(*p), compact3(*p))?,
        [p0, p1] if anim.loop_value.is_none() && values.len() == 2 => writeln!(
            w,
            "ANIM_trans {} {} {} {} {}",
            compact3(*p0),
            compact3(*p1),
            trim(values[0], 3),
            trim(values[1], 3),
            anim.dataref
        )?,
        keys => {
            writeln!(w, "ANIM_trans_begin {}", anim.dataref)?;
            for (p, v) in keys.iter().zip(values) {
                writeln!(w, "ANIM_trans_key {} {}", trim(*v, 3), compact3(*p))?;
            }
            write_loop(anim, w)?;
            writeln!(w, "ANIM_trans_end")?;
        }
    }

    match &anim.rotation {
        Rotation::None => {}
        Rotation::Axis { axis, angles } => write_rotation(anim, *axis, angles, w)?,
        Rotation::Free(keys) => {
            for (track_axis, angles) in Rotation::euler_tracks(keys) {
                if angles.iter().all(|a| a.abs() < 0.01) {
                    continue;
                }
                write_rotation(anim, track_axis, &angles, w)?;
            }
        }
    }
    Ok(())
}

fn write_rotation<W: Write>(anim: &Anim, rotation_axis: Vec3, angles: &[f32], w: &mut W) -> Result<()> {
    let values = &anim.values;
    match angles {
        [] => {}
        [a] => writeln!(
            w,
            "ANIM_rotate {} {} {} 0 0 no_ref",
            axis(rotation_axis),
            angle(*a),
            angle(*a)
        )?,
        [a0, a1] if anim.loop_value.is_none() && values.len() == 2 => writeln!(
            w,
            "ANIM_rotate {} {} {} {} {} {}",
            axis(rotation_axis),
            angle(*a0),
            angle(*a1),
            trim(values[0], 3),
            trim(values[1], 3),
            anim.dataref
        )?,
        keys => {
            writeln!(w, "ANIM_rotate_begin {} {}", axis(rotation_axis), anim.dataref)?;
            for (a, v) in keys.iter().zip(values) {
                writeln!(w, "ANIM_rotate_key {} {}", trim(*v, 3), angle(*a))?;
            }
            write_loop(anim, w)?;
            writeln!(w, "ANIM_rotate_end")?;
        }
    }
    Ok(())
}

fn write_loop<W: Write>(anim: &Anim, w: &mut W) -> Result<()> {
    if let Some(value) = anim.loop_value {
        writeln!(w, "ANIM_keyframe_loop {}", trim(value, 3))?;
    }
    Ok(())
}

fn numbers(values: &[f32]) -> String {
    values
        .iter()
        .map(|v| trim(*v, 3))
        .collect::<Vec<_>>()
        .join(" ")
}

fn light_line(light: &InlineLight) -> String {
    match light {
        InlineLight::Named { name, position } => {
            format!("LIGHT_NAMED {}\t\t{}", name, compact3(*position))
        }
        InlineLight::Param {
            name,
            position,
            params,
        } => format!("LIGHT_PARAM {}\t\t{} {}", name, compact3(*position), params),
        InlineLight::Custom {
            position,
            rgba,
            size,
            uv,
            dataref,
        } => format!(
            "LIGHT_CUSTOM\t\t{} {} {} {} {}",
            compact3(*position),
            numbers(rgba),
            trim(*size, 3),
            numbers(uv),
            dataref
        ),
        InlineLight::Spill {
            position,
            rgba,
            size,
            direction,
            semi,
            dataref,
        } => format!(
            "LIGHT_SPILL_CUSTOM\t\t{} {} {} {} {} {}",
            compact3(*position),
            numbers(rgba),
            trim(*size, 3),
            numbers(&direction.to_array()),
            trim(*semi, 3),
            dataref
        ),
        InlineLight::Smoke {
            black,
            position,
            size,
        } => format!(
            "{}\t\t{} {}",
            if *black { "smoke_black" } else { "smoke_white" },
            compact3(*position),
            trim(*size, 3)
        ),
    }
}
