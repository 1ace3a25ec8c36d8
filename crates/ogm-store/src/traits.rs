use std::fmt;

use ogm_backend::ObjectRef;
use ogm_types::{ClassInfo, Feature, Id, Value};

use crate::error::{StoreError, StoreResult};

/// A feature value as seen through a store: a scalar for attributes, a
/// live object for references.
#[derive(Clone)]
pub enum StoreValue {
    Attribute(Value),
    Object(ObjectRef),
}

impl StoreValue {
    pub fn as_attribute(&self) -> Option<&Value> {
        match self {
            StoreValue::Attribute(v) => Some(v),
            StoreValue::Object(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            StoreValue::Object(o) => Some(o),
            StoreValue::Attribute(_) => None,
        }
    }

    /// The attribute value, or an `InvalidValue` error naming `feature`.
    pub fn expect_attribute(&self, feature: &Feature) -> StoreResult<&Value> {
        self.as_attribute().ok_or_else(|| StoreError::InvalidValue {
            feature: feature.name().to_string(),
            reason: "expected an attribute value, got an object".into(),
        })
    }

    /// The referenced object, or an `InvalidValue` error naming `feature`.
    pub fn expect_object(&self, feature: &Feature) -> StoreResult<&ObjectRef> {
        self.as_object().ok_or_else(|| StoreError::InvalidValue {
            feature: feature.name().to_string(),
            reason: "expected an object, got an attribute value".into(),
        })
    }
}

/// Attributes compare by value, objects by id.
impl PartialEq for StoreValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StoreValue::Attribute(a), StoreValue::Attribute(b)) => a == b,
            (StoreValue::Object(a), StoreValue::Object(b)) => a.id() == b.id(),
            _ => false,
        }
    }
}

impl fmt::Debug for StoreValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreValue::Attribute(v) => write!(f, "Attribute({v:?})"),
            StoreValue::Object(o) => write!(f, "Object({})", o.id()),
        }
    }
}

impl From<Value> for StoreValue {
    fn from(v: Value) -> Self {
        StoreValue::Attribute(v)
    }
}

impl From<ObjectRef> for StoreValue {
    fn from(o: ObjectRef) -> Self {
        StoreValue::Object(o)
    }
}

/// Persistence contract for model elements.
///
/// Every operation addresses one `(object, feature)` pair. Indexes are
/// zero-based; `None` as an insertion index means "append". Positional
/// lookups return `None` when the value is absent.
///
/// Implementations must keep `size`, `to_array`, and positional `get`
/// mutually consistent after every successful call.
pub trait PersistentStore: Send {
    /// Value at `index` (many-valued) or the single value.
    fn get(
        &mut self,
        object: &ObjectRef,
        feature: &Feature,
        index: Option<usize>,
    ) -> StoreResult<Option<StoreValue>>;

    /// Replace the value at `index` and return the previous one.
    fn set(
        &mut self,
        object: &ObjectRef,
        feature: &Feature,
        index: Option<usize>,
        value: &StoreValue,
    ) -> StoreResult<Option<StoreValue>>;

    fn is_set(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<bool>;

    /// Remove every value and the bookkeeping of the feature.
    fn unset(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<()>;

    fn is_empty(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<bool> {
        Ok(self.size(object, feature)? == 0)
    }

    fn size(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<usize>;

    fn contains(&mut self, object: &ObjectRef, feature: &Feature, value: &StoreValue) -> StoreResult<bool>;

    /// Lowest index holding `value`.
    fn index_of(
        &mut self,
        object: &ObjectRef,
        feature: &Feature,
        value: &StoreValue,
    ) -> StoreResult<Option<usize>>;

    /// Highest index holding `value`.
    fn last_index_of(
        &mut self,
        object: &ObjectRef,
        feature: &Feature,
        value: &StoreValue,
    ) -> StoreResult<Option<usize>>;

    /// Insert `value` at `index`, shifting later values up.
    fn add(
        &mut self,
        object: &ObjectRef,
        feature: &Feature,
        index: Option<usize>,
        value: &StoreValue,
    ) -> StoreResult<()>;

    /// Remove and return the value at `index`, shifting later values down.
    fn remove(&mut self, object: &ObjectRef, feature: &Feature, index: usize) -> StoreResult<StoreValue>;

    /// Move the value at `source` to `target`.
    fn move_element(
        &mut self,
        object: &ObjectRef,
        feature: &Feature,
        target: usize,
        source: usize,
    ) -> StoreResult<StoreValue> {
        let size = self.size(object, feature)?;
        if target >= size {
            return Err(StoreError::OutOfRange { index: target, size });
        }
        let moved = self.remove(object, feature, source)?;
        self.add(object, feature, Some(target), &moved)?;
        Ok(moved)
    }

    /// Remove every value, keeping the feature set with size 0.
    fn clear(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<()>;

    fn to_array(&mut self, object: &ObjectRef, feature: &Feature) -> StoreResult<Vec<StoreValue>>;

    /// Owner of `object` in the containment tree.
    fn container(&mut self, object: &ObjectRef) -> StoreResult<Option<ObjectRef>>;

    /// Name of the containment feature through which `object` is owned.
    fn containing_feature(&mut self, object: &ObjectRef) -> StoreResult<Option<String>>;

    /// Live object for a stored id.
    fn object(&mut self, id: &Id) -> StoreResult<Option<ObjectRef>>;

    /// Every element conforming exactly to `class`.
    fn all_instances(&mut self, class: &ClassInfo) -> StoreResult<Vec<ObjectRef>>;

    /// Make the current state durable.
    fn save(&mut self) -> StoreResult<()>;

    /// Commit pending changes if the backend is transactional.
    fn commit(&mut self) -> StoreResult<()>;

    /// Release the backend. Further calls fail with `InvalidStore`.
    fn close(&mut self) -> StoreResult<()>;
}

/// Position of `value` among `values`, searching from the front or back.
pub(crate) fn position(values: &[StoreValue], value: &StoreValue, last: bool) -> Option<usize> {
    if last {
        values.iter().rposition(|v| v == value)
    } else {
        values.iter().position(|v| v == value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ogm_backend::PersistentObject;

    #[test]
    fn objects_compare_by_id() {
        let class = ClassInfo::new("Node", "urn:test");
        let a = PersistentObject::new(Id::from_raw("a"), class.clone());
        let a2 = PersistentObject::new(Id::from_raw("a"), class.clone());
        let b = PersistentObject::new(Id::from_raw("b"), class);
        assert_eq!(StoreValue::from(a.clone()), StoreValue::from(a2));
        assert_ne!(StoreValue::from(a), StoreValue::from(b));
    }

    #[test]
    fn position_searches_both_ends() {
        let values: Vec<StoreValue> = [1, 2, 1].iter().map(|i| Value::Int(*i).into()).collect();
        let one = StoreValue::from(Value::Int(1));
        assert_eq!(position(&values, &one, false), Some(0));
        assert_eq!(position(&values, &one, true), Some(2));
        assert_eq!(position(&values, &Value::Int(9).into(), false), None);
    }
}
