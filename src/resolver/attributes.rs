//! Typed per-element directives parsed from property bags.

use crate::error::StructuralError;
use crate::scene::Properties;
use crate::types::{Cursor, LightLevel, Manipulator, Surface};
use std::fmt;

/// Layer groups accepted by `ATTR_layer_group`.
pub const LAYER_GROUPS: [&str; 11] = [
    "terrain",
    "beaches",
    "shoulders",
    "taxiways",
    "runways",
    "markings",
    "airports",
    "roads",
    "objects",
    "light_objects",
    "cars",
];

/// Render directives that apply to every face of one element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementAttributes {
    pub surface: Surface,
    pub deck: bool,
    pub draped: bool,
    pub light_level: Option<LightLevel>,
    pub shadow_blend: Option<f32>,
    pub no_blend: Option<f32>,
    pub no_shadow: bool,
    pub draw_disable: bool,
    pub solid_camera: bool,
    pub up_normal: bool,
    pub manipulator: Manipulator,
}

impl ElementAttributes {
    pub fn from_properties(props: &Properties) -> Result<Self, StructuralError> {
        let surface = match props.string("surface")? {
            None => Surface::None,
            Some(name) => Surface::from_str(name.trim())
                .ok_or_else(|| StructuralError::UnknownSurface(name.to_string()))?,
        };

        let light_level = match props.string("ATTR_light_level")? {
            None => None,
            Some(dataref) => Some(LightLevel {
                v1: props.number("ATTR_light_level_v1")?.unwrap_or(0.0),
                v2: props.number("ATTR_light_level_v2")?.unwrap_or(1.0),
                dataref: dataref.trim().to_string(),
            }),
        };

        Ok(Self {
            surface,
            deck: props.flag("deck"),
            draped: props.flag("ATTR_draped"),
            light_level,
            shadow_blend: props.number("ATTR_shadow_blend")?,
            no_blend: props.number("ATTR_no_blend")?,
            no_shadow: props.flag("ATTR_no_shadow"),
            draw_disable: props.flag("ATTR_draw_disable"),
            solid_camera: props.flag("ATTR_solid_camera"),
            up_normal: props.flag("up_normal"),
            manipulator: parse_manipulator(props)?,
        })
    }
}

fn text(props: &Properties, name: &str) -> Result<String, StructuralError> {
    Ok(props.string(name)?.map(|s| s.trim().to_string()).unwrap_or_default())
}

fn parse_manipulator(props: &Properties) -> Result<Manipulator, StructuralError> {
    let Some(kind) = props.string("manip_type")? else {
        return Ok(Manipulator::None);
    };

    let cursor = match props.string("manip_cursor")? {
        None => Cursor::Hand,
        Some(name) => Cursor::from_str(name.trim()).ok_or_else(|| StructuralError::PropertyType {
            name: "manip_cursor".into(),
            expected: "a cursor name",
        })?,
    };
    let tooltip = text(props, "manip_tooltip")?;

    let manip = match kind.trim().to_lowercase().as_str() {
        "none" => Manipulator::None,
        "panel" => Manipulator::Panel,
        "drag_axis" => Manipulator::DragAxis {
            cursor,
            axis: [
                props.number("manip_dx")?.unwrap_or(0.0),
                props.number("manip_dy")?.unwrap_or(0.0),
                props.number("manip_dz")?.unwrap_or(0.0),
            ],
            v1: props.number("manip_v1")?.unwrap_or(0.0),
            v2: props.number("manip_v2")?.unwrap_or(1.0),
            dataref: text(props, "manip_dataref")?,
            tooltip,
        },
        "push" => Manipulator::Push {
            cursor,
            dataref: text(props, "manip_dataref")?,
            tooltip,
        },
        "toggle" => Manipulator::Toggle {
            cursor,
            v1: props.number("manip_v1")?.unwrap_or(0.0),
            v2: props.number("manip_v2")?.unwrap_or(1.0),
            dataref: text(props, "manip_dataref")?,
            tooltip,
        },
        "command" => Manipulator::Command {
            cursor,
            command: text(props, "manip_command")?,
            tooltip,
        },
        _ => return Err(StructuralError::UnknownManipulator(kind.to_string())),
    };
    Ok(manip)
}

/// File-scope directives carried by empties. They bypass the sort.
#[derive(Debug, Clone, PartialEq)]
pub enum SideBand {
    LayerGroup { name: String, offset: i32 },
    SlungLoadWeight(f32),
}

impl SideBand {
    pub fn from_properties(props: &Properties) -> Result<Vec<SideBand>, StructuralError> {
        let mut out = Vec::new();

        if let Some(name) = props.string("ATTR_layer_group")? {
            let name = name.trim().to_lowercase();
            if !LAYER_GROUPS.contains(&name.as_str()) {
                return Err(StructuralError::UnknownLayerGroup(name));
            }
            let offset = props.number("ATTR_layer_group_offset")?.unwrap_or(0.0);
            if offset.fract() != 0.0 || !(-5.0..=5.0).contains(&offset) {
                return Err(StructuralError::PropertyType {
                    name: "ATTR_layer_group_offset".into(),
                    expected: "an integer from -5 to 5",
                });
            }
            out.push(SideBand::LayerGroup {
                name,
                offset: offset as i32,
            });
        }

        if let Some(weight) = props.number("slung_load_weight")? {
            out.push(SideBand::SlungLoadWeight(weight));
        }

        Ok(out)
    }
}

impl fmt::Display for SideBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SideBand::LayerGroup { name, offset } => write!(f, "ATTR_layer_group {} {}", name, offset),
            SideBand::SlungLoadWeight(weight) => write!(
                f,
                "slung_load_weight {}",
                crate::export::format::trim(*weight, 3)
            ),
        }
    }
}
