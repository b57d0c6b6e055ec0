//! OBJ8 output.
//!
//! `format` holds the number formatting every directive shares; `obj8`
//! writes the header, tables and command stream.

pub mod format;
pub mod obj8;

pub use obj8::{export_to_path, write_obj8};
