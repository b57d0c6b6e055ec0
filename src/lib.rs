//! # X-Plane OBJ8
//!
//! A Rust library for compiling annotated 3D scenes into X-Plane OBJ8
//! scenery objects.
//!
//! ## Overview
//!
//! The host exposes its entities, faces and armature bones through the
//! [`Scene`] trait. The compiler turns them into deduplicated vertex, line
//! and light tables plus a list of primitives, sorts those by render state,
//! and the emitter writes the OBJ8 text with as few state changes as it can.
//!
//! ## Quick Start
//!
//! ```ignore
//! use xplane_obj8::{CompilerConfig, Obj8Compiler, SceneDocument};
//!
//! // Load a scene snapshot
//! let mut scene = SceneDocument::from_path("cockpit.json")?;
//!
//! // Compile and write it
//! let compiler = Obj8Compiler::new(CompilerConfig::default());
//! let report = compiler.export_to_path(&mut scene, "cockpit.obj")?;
//! for warning in &report.warnings {
//!     println!("{}", warning);
//! }
//! ```
//!
//! ## Datarefs
//!
//! Bone names resolve to simulator datarefs through a [`DatarefRegistry`],
//! usually loaded from X-Plane's `DataRefs.txt`:
//!
//! ```ignore
//! use xplane_obj8::DatarefRegistry;
//!
//! let registry = DatarefRegistry::from_path("DataRefs.txt")?;
//! let compiler = Obj8Compiler::new(config).with_registry(registry);
//! ```

pub mod error;
pub mod types;
pub mod scene;
pub mod resolver;
pub mod compiler;
pub mod export;

// Re-export main types for convenience
pub use error::{ConsistencyError, ExportError, Location, Result, StructuralError, Warning};
pub use types::{Alpha, AlphaMode, CockpitRegion, Manipulator, Material, Platform, Surface};
pub use scene::{Entity, EntityId, EntityKind, FrameGuard, Properties, PropertyValue, Scene, SceneDocument};
pub use resolver::{resolve_dataref, DatarefEntry, DatarefRegistry};
pub use compiler::{CompiledObject, CompilerConfig, ExportReport, Obj8Compiler, PointCounts};
pub use export::{export_to_path, write_obj8};
