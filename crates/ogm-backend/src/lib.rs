//! Storage backends for the OGM mapping layer.
//!
//! Two backend families are provided:
//!
//! - [`GraphBackend`]: a labeled property graph ([`PropertyGraph`]) held by
//!   a pluggable [`GraphEngine`]. [`MemoryEngine`] is volatile;
//!   [`FileEngine`] persists CRC-framed snapshots and can run
//!   transactionally.
//! - [`KvBackend`]: feature values, containers, and classes in three maps,
//!   used by the map store.
//!
//! Both hand out shared [`ObjectRef`] handles through a bounded
//! [`ReificationCache`], so repeated reification of a cached id yields the
//! same object.

pub mod backend;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod kv;
pub mod object;
pub mod snapshot;

pub use backend::{GraphBackend, CLASS_NAME_KEY, INSTANCE_OF, NS_URI_KEY};
pub use cache::{NodeCache, ReificationCache, DEFAULT_CACHE_CAPACITY};
pub use config::{claim_directory, read_marker, BackendConfig, BackendKind};
pub use engine::{FileEngine, GraphEngine, MemoryEngine};
pub use error::{BackendError, BackendResult};
pub use graph::{Direction, EdgeId, EdgeRecord, NodeRecord, PropertyGraph};
pub use kv::{ContainerRecord, KvBackend, KvValue};
pub use object::{ContainerLink, ObjectRef, PersistentObject};
