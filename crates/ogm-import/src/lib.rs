//! Bulk import into OGM graph backends.
//!
//! An import is a stream of events ([`ImportHandler`]): start the
//! document, declare elements, add attribute values and references, end
//! the document. [`GraphImportHandler`] writes each event straight into the
//! persisted graph layout without materializing objects, so it can load
//! models far larger than the object caches.
//!
//! [`replay`] drives a handler from JSON lines, one [`ImportEvent`] per
//! line.

pub mod error;
pub mod event;
pub mod handler;

pub use error::{ImportError, ImportResult};
pub use event::{replay, EventValue, ImportEvent};
pub use handler::{GraphImportHandler, ImportHandler, ImportSummary};
