//! Error types for the OBJ8 exporter.

use std::fmt;
use thiserror::Error;

/// Result type alias using ExportError.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Where in the scene a problem was found.
///
/// Every field is optional: scene-wide problems carry an empty location,
/// face-level problems name the object, its mesh and the face index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub object: Option<String>,
    pub mesh: Option<String>,
    pub face: Option<usize>,
}

impl Location {
    /// A scene-wide location.
    pub fn scene() -> Self {
        Self::default()
    }

    /// The location of a whole object.
    pub fn object(name: impl Into<String>) -> Self {
        Self {
            object: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_mesh(mut self, mesh: impl Into<String>) -> Self {
        self.mesh = Some(mesh.into());
        self
    }

    pub fn with_face(mut self, face: usize) -> Self {
        self.face = Some(face);
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.object, &self.mesh, self.face) {
            (None, None, None) => write!(f, "scene"),
            _ => {
                write!(f, "object \"{}\"", self.object.as_deref().unwrap_or("?"))?;
                if let Some(mesh) = &self.mesh {
                    write!(f, ", mesh \"{}\"", mesh)?;
                }
                if let Some(face) = self.face {
                    write!(f, ", face {}", face)?;
                }
                Ok(())
            }
        }
    }
}

/// Problems with the shape of the input scene.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StructuralError {
    #[error("parented to an armature without naming a bone")]
    MissingBone,

    #[error("parent bone \"{0}\" no longer exists in the armature")]
    DeletedBone(String),

    #[error("\"{0}\" is not a known dataref; add a \"{0}\" property holding the full path")]
    UnknownDataref(String),

    #[error("\"{leaf}\" matches {count} datarefs; add a \"{leaf}\" property holding the full path")]
    AmbiguousDataref { leaf: String, count: usize },

    #[error("index {index} is out of range for dataref \"{path}\" of size {arity}")]
    IndexOutOfRange {
        path: String,
        index: usize,
        arity: usize,
    },

    #[error("property \"{name}\" must be {expected}")]
    PropertyType { name: String, expected: &'static str },

    #[error("bone \"{bone}\" has {frames} keyframes but no \"_v\" values were given")]
    MissingValue { bone: String, frames: usize },

    #[error("show/hide property \"{0}\" has no matching partner value")]
    UnpairedShowHide(String),

    #[error("uses texture \"{second}\" but the object already uses \"{first}\"; only one texture is allowed")]
    MultipleTextures { first: String, second: String },

    #[error("cockpit region {0} does not fit inside the panel texture")]
    RegionBounds(usize),

    #[error("cockpit region {0} must have power-of-two width and height")]
    InvalidRegion(usize),

    #[error("{count} cockpit regions given; at most {max} are allowed")]
    TooManyRegions { count: usize, max: usize },

    #[error("panel faces that use cockpit regions must be quads")]
    CockpitFaceNotQuad,

    #[error("panel face does not fit inside any cockpit region")]
    NoCockpitRegion,

    #[error("unknown surface type \"{0}\"")]
    UnknownSurface(String),

    #[error("unknown manipulator type \"{0}\"")]
    UnknownManipulator(String),

    #[error("unknown layer group \"{0}\"")]
    UnknownLayerGroup(String),
}

/// Problems where the scene is well formed but the requested output cannot represent it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsistencyError {
    #[error("{0} cannot be used in an instanced object")]
    NotInstanceSafe(&'static str),

    #[error("instanced objects need one blend mode but both {first} and {second} are used")]
    AlphaConflict { first: String, second: String },
}

/// Main error type for OBJ8 export.
#[derive(Error, Debug)]
pub enum ExportError {
    /// The scene cannot be exported as given.
    #[error("{location}: {reason}")]
    Structural {
        location: Location,
        reason: StructuralError,
    },

    /// The scene conflicts with the requested output mode.
    #[error("{location}: {reason}")]
    Consistency {
        location: Location,
        reason: ConsistencyError,
    },

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to read a texture.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Failed to parse a JSON scene or configuration.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExportError {
    pub fn structural(location: Location, reason: StructuralError) -> Self {
        ExportError::Structural { location, reason }
    }

    pub fn consistency(location: Location, reason: ConsistencyError) -> Self {
        ExportError::Consistency { location, reason }
    }
}

/// A non-fatal condition found during export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub location: Location,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Collects warnings and mirrors each one to the log.
#[derive(Debug, Default)]
pub struct Warnings {
    items: Vec<Warning>,
}

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, location: Location, message: impl Into<String>) {
        let warning = Warning {
            location,
            message: message.into(),
        };
        log::warn!("{}", warning);
        self.items.push(warning);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<Warning> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_display() {
        assert_eq!(Location::scene().to_string(), "scene");
        let loc = Location::object("Cube").with_mesh("CubeMesh").with_face(3);
        assert_eq!(loc.to_string(), "object \"Cube\", mesh \"CubeMesh\", face 3");
    }

    #[test]
    fn test_error_names_rule() {
        let err = ExportError::structural(
            Location::object("Needle"),
            StructuralError::IndexOutOfRange {
                path: "sim/cockpit2/gauges/needle".into(),
                index: 9,
                arity: 8,
            },
        );
        let text = err.to_string();
        assert!(text.starts_with("object \"Needle\""));
        assert!(text.contains("out of range"));
    }
}
