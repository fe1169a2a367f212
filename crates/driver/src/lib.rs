//! Frame driver: scene lifecycle and change-detected depth sorting.
//!
//! # Invariants
//! - A scene is either fully installed (`Ready`) or absent; a failed load
//!   leaves the driver `Unloaded`.
//! - The sort runs only when the view-projection transform changes.
//! - A [`DrawCall`] always refers to buffers of the current generation.

mod config;
mod frame;

use gsplat_loader::LoadError;
use gsplat_sort::BackendError;

pub use config::DriverConfig;
pub use frame::{DrawCall, FrameDriver, SceneState};

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("scene load failed: {0}")]
    Load(#[from] LoadError),
    #[error("sort backend error: {0}")]
    Backend(#[from] BackendError),
}

pub fn crate_info() -> &'static str {
    "gsplat-driver v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_to_full_mask() {
        assert_eq!(DriverConfig::default().sort.key_mask, u32::MAX);
    }

    #[test]
    fn errors_convert() {
        let err: DriverError = BackendError::NotPrepared.into();
        assert!(err.to_string().contains("not prepared"));
    }
}
