//! Manipulator records and their `ATTR_manip_*` command lines.

use crate::export::format::trim;
use std::fmt;

/// Mouse cursor shown over a manipulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cursor {
    #[default]
    Hand,
    Button,
    Four,
    LeftRight,
    UpDown,
    RotateSmall,
    RotateLarge,
}

impl Cursor {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hand" => Some(Cursor::Hand),
            "button" => Some(Cursor::Button),
            "four_arrows" | "four" => Some(Cursor::Four),
            "left_right" => Some(Cursor::LeftRight),
            "up_down" => Some(Cursor::UpDown),
            "rotate_small" => Some(Cursor::RotateSmall),
            "rotate_large" => Some(Cursor::RotateLarge),
            _ => None,
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Cursor::Hand => "hand",
            Cursor::Button => "button",
            Cursor::Four => "four_arrows",
            Cursor::LeftRight => "left_right",
            Cursor::UpDown => "up_down",
            Cursor::RotateSmall => "rotate_small",
            Cursor::RotateLarge => "rotate_large",
        };
        f.write_str(name)
    }
}

/// An interactive behaviour attached to faces.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Manipulator {
    /// No explicit manipulator. Panel faces still get the implicit panel one.
    #[default]
    None,
    /// The implicit panel manipulator, requested explicitly.
    Panel,
    DragAxis {
        cursor: Cursor,
        axis: [f32; 3],
        v1: f32,
        v2: f32,
        dataref: String,
        tooltip: String,
    },
    Push {
        cursor: Cursor,
        dataref: String,
        tooltip: String,
    },
    Toggle {
        cursor: Cursor,
        v1: f32,
        v2: f32,
        dataref: String,
        tooltip: String,
    },
    Command {
        cursor: Cursor,
        command: String,
        tooltip: String,
    },
}

impl Manipulator {
    /// The descriptor stored on a primitive: the full command line for
    /// explicit manipulators, empty when the primitive has none of its own.
    pub fn descriptor(&self) -> String {
        let line = match self {
            Manipulator::None | Manipulator::Panel => String::new(),
            Manipulator::DragAxis {
                cursor,
                axis,
                v1,
                v2,
                dataref,
                tooltip,
            } => format!(
                "ATTR_manip_drag_axis {} {} {} {} {} {} {} {}",
                cursor,
                trim(axis[0], 3),
                trim(axis[1], 3),
                trim(axis[2], 3),
                trim(*v1, 3),
                trim(*v2, 3),
                dataref,
                tooltip
            ),
            Manipulator::Push {
                cursor,
                dataref,
                tooltip,
            } => format!("ATTR_manip_push {} {} {}", cursor, dataref, tooltip),
            Manipulator::Toggle {
                cursor,
                v1,
                v2,
                dataref,
                tooltip,
            } => format!(
                "ATTR_manip_toggle {} {} {} {} {}",
                cursor,
                trim(*v1, 3),
                trim(*v2, 3),
                dataref,
                tooltip
            ),
            Manipulator::Command {
                cursor,
                command,
                tooltip,
            } => format!("ATTR_manip_command {} {} {}", cursor, command, tooltip),
        };
        line.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_descriptor() {
        let manip = Manipulator::Push {
            cursor: Cursor::Button,
            dataref: "sim/cockpit/switches/horn".into(),
            tooltip: "Horn".into(),
        };
        assert_eq!(
            manip.descriptor(),
            "ATTR_manip_push button sim/cockpit/switches/horn Horn"
        );
    }

    #[test]
    fn test_drag_axis_descriptor() {
        let manip = Manipulator::DragAxis {
            cursor: Cursor::UpDown,
            axis: [0.0, 0.1, 0.0],
            v1: 0.0,
            v2: 1.0,
            dataref: "sim/cockpit2/engine/actuators/throttle_ratio_all".into(),
            tooltip: "Throttle".into(),
        };
        assert_eq!(
            manip.descriptor(),
            "ATTR_manip_drag_axis up_down 0 0.1 0 0 1 sim/cockpit2/engine/actuators/throttle_ratio_all Throttle"
        );
    }

    #[test]
    fn test_panel_has_empty_descriptor() {
        assert!(Manipulator::Panel.descriptor().is_empty());
    }
}
