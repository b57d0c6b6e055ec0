//! Shared types used throughout the library.

mod attributes;
mod coords;
mod manipulator;

pub use attributes::{
    Alpha, AlphaMode, CockpitRegion, LightLevel, Material, PrimFlags, Surface, MAX_COCKPIT_REGIONS,
};
pub use coords::HOST_TO_XPLANE;
pub use manipulator::{Cursor, Manipulator};

use serde::{Deserialize, Serialize};

/// The platform byte at the top of every OBJ8 file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Big-endian Apple heritage, written as `A`.
    Apple,
    /// Written as `I`.
    #[default]
    Ibm,
}

impl Platform {
    pub fn header_byte(&self) -> char {
        match self {
            Platform::Apple => 'A',
            Platform::Ibm => 'I',
        }
    }
}

/// Opaque group handle. Groups only affect ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Group(pub String);

impl Group {
    /// Case-insensitive ordering with the raw name as tie-break so names
    /// differing only by case still sort deterministically.
    pub fn sort_key(&self) -> (String, &str) {
        (self.0.to_lowercase(), self.0.as_str())
    }
}

/// Strip Blender-style duplicate suffixes (`Lamp.001` -> `Lamp`).
pub fn base_name(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, suffix))
            if !stem.is_empty() && !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            stem
        }
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("Lamp.001"), "Lamp");
        assert_eq!(base_name("panel.png"), "panel.png");
        assert_eq!(base_name("foo"), "foo");
        assert_eq!(base_name(".001"), ".001");
    }

    #[test]
    fn test_group_sort_key_is_case_insensitive() {
        let a = Group("alpha".into());
        let b = Group("Beta".into());
        assert!(a.sort_key() < b.sort_key());
        let upper = Group("ALPHA".into());
        assert!(upper.sort_key() < a.sort_key());
    }

    #[test]
    fn test_platform_byte() {
        assert_eq!(Platform::Apple.header_byte(), 'A');
        assert_eq!(Platform::default().header_byte(), 'I');
    }
}
