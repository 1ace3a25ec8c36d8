//! Built-in store layers.

pub mod autocommit;
pub mod feature;
pub mod is_set;
pub mod loaded;
pub mod logging;
pub mod size;

pub use autocommit::AutocommitLayer;
pub use feature::FeatureCacheLayer;
pub use is_set::IsSetCacheLayer;
pub use loaded::{LoadCounter, LoadedObjectsLayer};
pub use logging::LoggingLayer;
pub use size::SizeCacheLayer;
