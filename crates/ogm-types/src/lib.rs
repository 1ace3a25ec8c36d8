//! Foundation types for the OGM object-graph mapping layer.
//!
//! This crate provides the identity, metamodel-boundary, and value types
//! shared by every other OGM crate. It has no knowledge of how elements are
//! stored; that is the job of `ogm-backend` and `ogm-store`.
//!
//! # Key Types
//!
//! - [`Id`]: Opaque, immutable identifier of one model element
//! - [`ClassInfo`]: Name + namespace of the class an element conforms to
//! - [`Feature`]: Tagged attribute/reference descriptor supplied by the metamodel
//! - [`FeatureKey`]: `(element, feature)` lookup key used by caches and map backends
//! - [`Value`]: Scalar attribute value as persisted in the backend

pub mod class;
pub mod error;
pub mod feature;
pub mod id;
pub mod key;
pub mod value;

pub use class::ClassInfo;
pub use error::TypeError;
pub use feature::{AttributeFeature, Feature, FeatureDescriptor, ReferenceFeature};
pub use id::Id;
pub use key::FeatureKey;
pub use value::Value;
