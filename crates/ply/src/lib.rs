//! Attribute collection: reads point-record (PLY) streams into named, typed columns.
//!
//! Supports `ascii`, `binary_little_endian` and `binary_big_endian` bodies.
//! Only the `vertex` element becomes columns; other elements are parsed past.
//!
//! # Invariants
//! - Every column holds exactly `record_count` values.
//! - A stream shorter than its declared record count fails to load; no
//!   partial collection is returned.

mod collection;
mod column;
mod header;
mod writer;

pub use collection::{AttributeCollection, VERTEX_ELEMENT};
pub use column::Column;
pub use header::{Element, Format, Header, Property, PropertyKind, ScalarType};
pub use writer::PlyWriter;

/// Errors from reading a point-record stream or querying its columns.
#[derive(Debug, thiserror::Error)]
pub enum PlyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a PLY stream: missing 'ply' magic")]
    MissingMagic,
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("malformed header at line {line}: {reason}")]
    MalformedHeader { line: usize, reason: String },
    #[error("malformed stream: {0}")]
    MalformedStream(String),
    #[error("missing attribute: {0}")]
    MissingAttribute(String),
    #[error("attribute '{name}' is {found}, expected float")]
    TypeMismatch { name: String, found: &'static str },
    #[error("element not found: {0}")]
    ElementNotFound(String),
}

pub fn crate_info() -> &'static str {
    "gsplat-ply v0.1.0"
}
