use gsplat_sort::SortConfig;
use serde::{Deserialize, Serialize};

/// Frame driver configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub sort: SortConfig,
}
