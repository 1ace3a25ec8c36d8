//! Persistent element stores for the OGM mapping layer.
//!
//! Every store implements [`PersistentStore`], one call per `(object,
//! feature)` pair:
//!
//! - [`DirectWriteStore`]: writes straight to a graph backend using the
//!   flat encoding in [`layout`] (`name`, `name:i`, `name:size`, positional
//!   reference edges).
//! - [`LongListStore`]: the same, except that many-valued references are
//!   linked lists of nodes ([`list`]) so inserts do not renumber siblings.
//! - [`MapStore`]: one value per [`FeatureKey`](ogm_types::FeatureKey) in a
//!   key-value backend.
//!
//! Containment is maintained by [`containment`]: a child has at most one
//! container edge, and re-parenting moves it.
//!
//! A store is normally opened through [`StoreOptions`], which wraps it in a
//! [`StorePipeline`] of caching, logging, counting and autocommit
//! [`layers`].

pub mod containment;
pub mod direct;
pub mod error;
pub mod layers;
pub mod layout;
pub mod list;
pub mod long_list;
pub mod map;
pub mod options;
pub mod pipeline;
pub mod traits;

pub use direct::DirectWriteStore;
pub use error::{StoreError, StoreResult};
pub use layers::LoadCounter;
pub use list::{Cursor, NodeList};
pub use long_list::LongListStore;
pub use map::MapStore;
pub use options::{Capability, Mapping, StoreOptions, StoreOptionsBuilder, DEFAULT_AUTOCOMMIT_CHUNK};
pub use pipeline::{Request, Response, StoreLayer, StorePipeline};
pub use traits::{PersistentStore, StoreValue};
