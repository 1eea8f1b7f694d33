//! Document model and provenance tracking for manifold
//!
//! A manifest is parsed into [`yaml::Node`] trees that remember the source line
//! of every key and value. [`Object`] derives a stable identity from a node,
//! [`Resource`] pairs the literal (raw) and post-render (rendered) form of one
//! object, and [`File`] groups the resources that came from one source file.

pub mod error;
pub mod file;
pub mod keypath;
pub mod object;
pub mod resource;
pub mod yaml;

pub use error::CoreError;
pub use file::File;
pub use keypath::{Lookup, PathSegment};
pub use object::Object;
pub use resource::{Rendered, Resource};
pub use yaml::{Field, Node, NodeKind};
