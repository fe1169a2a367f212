//! Splat loader: turns point-record attribute columns into per-particle channels.
//!
//! # Invariants
//! - Every channel of a returned [`SplatParticleSet`] has the same length.
//! - A decode either returns a complete set or an error; partial sets are
//!   never observable.
//! - Extraction tasks are independent and write disjoint outputs, so they
//!   run in parallel without locking.

pub mod fixtures;
mod layout;
mod particles;
mod plan;

use std::io::Read;
use std::path::Path;

use gsplat_ply::{AttributeCollection, PlyError};

pub use layout::{ChannelStream, STREAM_COUNT};
pub use particles::{ColorBand, METERS_TO_CENTIMETERS, SplatParticleSet, decode, sigmoid};
pub use plan::{
    ColorChannel, EXTRACTION_PLAN, ExtractionTask, REST_COLUMN_COUNT, ShBand, required_columns,
};

/// Errors from loading a splat scene. The attempt is abandoned on any of these.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing attribute: {0}")]
    MissingAttribute(String),
    #[error("malformed stream: {0}")]
    MalformedStream(String),
    #[error("malformed attribute {column}: {reason}")]
    MalformedAttribute { column: String, reason: String },
}

impl From<PlyError> for LoadError {
    fn from(err: PlyError) -> Self {
        match err {
            PlyError::Io(e) => LoadError::Io(e),
            PlyError::MissingAttribute(name) => LoadError::MissingAttribute(name),
            PlyError::TypeMismatch { name, found } => LoadError::MalformedAttribute {
                column: name,
                reason: format!("unexpected type {found}"),
            },
            other => LoadError::MalformedStream(other.to_string()),
        }
    }
}

/// Read a splat stream and decode it.
pub fn load(reader: impl Read) -> Result<SplatParticleSet, LoadError> {
    let collection = AttributeCollection::load(reader)?;
    decode(&collection)
}

pub fn load_path(path: impl AsRef<Path>) -> Result<SplatParticleSet, LoadError> {
    let path = path.as_ref();
    tracing::info!(path = %path.display(), "loading splat file");
    let collection = AttributeCollection::load_path(path)?;
    decode(&collection)
}

pub fn crate_info() -> &'static str {
    "gsplat-loader v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;
    use gsplat_ply::Format;

    #[test]
    fn load_from_reader() {
        let bytes = fixtures::splat_writer(4, Format::Ascii).to_bytes().unwrap();
        let set = load(bytes.as_slice()).unwrap();
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn load_from_path() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        fixtures::splat_writer(3, Format::BinaryBigEndian)
            .write(std::fs::File::create(tmp.path()).unwrap())
            .unwrap();
        assert_eq!(load_path(tmp.path()).unwrap().len(), 3);
    }

    #[test]
    fn truncated_file_is_malformed_stream() {
        let mut bytes = fixtures::splat_writer(4, Format::BinaryLittleEndian)
            .to_bytes()
            .unwrap();
        bytes.truncate(bytes.len() - 10);
        assert!(matches!(load(bytes.as_slice()), Err(LoadError::MalformedStream(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            load_path("/nonexistent/scene.ply"),
            Err(LoadError::Io(_))
        ));
    }

    #[test]
    fn end_to_end_three_records() {
        let writer = fixtures::splat_writer_at(
            &[[0.0, 0.0, 1.0], [0.0, 0.0, 2.0], [0.0, 0.0, 3.0]],
            &[0.0, 0.0, 0.0],
            Format::BinaryLittleEndian,
        );
        let set = load(writer.to_bytes().unwrap().as_slice()).unwrap();
        let p = set.position();
        assert_eq!(p[0], glam::Vec4::new(0.0, -100.0, 0.0, 0.5));
        assert_eq!(p[2], glam::Vec4::new(0.0, -300.0, 0.0, 0.5));
    }
}
