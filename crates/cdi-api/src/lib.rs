//! CDI Import Protocol
//!
//! Typed vocabulary shared by the import controller and its tests:
//! - Annotation keys read as import intent and written as import status
//! - `SourceKind` / `ContentType` / `ImportIntent` decoding
//! - `ImportPhase`, the mirrored lifecycle of an importer pod
//! - Labels and naming used to discover the importer pod of a claim
//!
//! Claims carry their intent as a string map. Everything in this crate exists
//! so that the map is decoded exactly once, at the store boundary.

pub mod annotations;
pub mod intent;
pub mod key;
pub mod labels;
pub mod phase;

pub use annotations::*;
pub use intent::*;
pub use key::ClaimKey;
pub use labels::*;
pub use phase::ImportPhase;
