use std::io::BufRead;

use serde::{Deserialize, Serialize};

use ogm_types::{ClassInfo, Id, Value};

use crate::error::{ImportError, ImportResult};
use crate::handler::ImportHandler;

/// An attribute value as written in an event line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<EventValue> for Value {
    fn from(v: EventValue) -> Self {
        match v {
            EventValue::Bool(b) => Value::Bool(b),
            EventValue::Int(i) => Value::Int(i),
            EventValue::Float(f) => Value::Float(f),
            EventValue::Text(s) => Value::Text(s),
        }
    }
}

/// One line of an event stream.
///
/// ```json
/// {"event":"add_element","id":"a","ns_uri":"urn:m","class":"Node","root":true}
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ImportEvent {
    StartDocument,
    AddElement {
        id: String,
        ns_uri: String,
        class: String,
        #[serde(default)]
        root: bool,
    },
    AddAttribute {
        id: String,
        name: String,
        #[serde(default)]
        index: Option<usize>,
        #[serde(default)]
        many: bool,
        value: EventValue,
    },
    AddReference {
        id: String,
        name: String,
        #[serde(default)]
        index: Option<usize>,
        #[serde(default)]
        many: bool,
        #[serde(default)]
        containment: bool,
        target: String,
    },
    SetClass {
        id: String,
        ns_uri: String,
        class: String,
    },
    EndDocument,
}

impl ImportEvent {
    /// Deliver the event to `handler`.
    pub fn apply(self, handler: &mut dyn ImportHandler) -> ImportResult<()> {
        match self {
            ImportEvent::StartDocument => handler.start_document(),
            ImportEvent::AddElement {
                id,
                ns_uri,
                class,
                root,
            } => handler.add_element(&Id::new(id)?, &ClassInfo::new(class, ns_uri), root),
            ImportEvent::AddAttribute {
                id,
                name,
                index,
                many,
                value,
            } => handler.add_attribute(&Id::new(id)?, &name, index, many, value.into()),
            ImportEvent::AddReference {
                id,
                name,
                index,
                many,
                containment,
                target,
            } => handler.add_reference(&Id::new(id)?, &name, index, many, containment, &Id::new(target)?),
            ImportEvent::SetClass { id, ns_uri, class } => {
                handler.set_class(&Id::new(id)?, &ClassInfo::new(class, ns_uri))
            }
            ImportEvent::EndDocument => handler.end_document(),
        }
    }
}

/// Feed every event line of `reader` to `handler` and return the number of
/// events applied. Blank lines and lines starting with `#` are skipped.
pub fn replay<R: BufRead>(reader: R, handler: &mut dyn ImportHandler) -> ImportResult<usize> {
    let mut applied = 0;
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event: ImportEvent = serde_json::from_str(trimmed).map_err(|e| ImportError::Parse {
            line: n + 1,
            reason: e.to_string(),
        })?;
        event.apply(handler)?;
        applied += 1;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::GraphImportHandler;
    use ogm_backend::GraphBackend;
    use ogm_store::{DirectWriteStore, PersistentStore, StoreOptions, StoreValue};
    use ogm_types::Feature;

    const MODEL: &str = r#"
# two nodes, one contained in the other
{"event":"start_document"}
{"event":"add_element","id":"a","ns_uri":"urn:m","class":"Node","root":true}
{"event":"add_reference","id":"a","name":"children","many":true,"containment":true,"target":"b"}
{"event":"add_element","id":"b","ns_uri":"urn:m","class":"Node"}
{"event":"add_attribute","id":"b","name":"weight","value":2.5}
{"event":"add_attribute","id":"b","name":"labels","many":true,"value":"x"}
{"event":"add_attribute","id":"b","name":"labels","many":true,"value":3}
{"event":"end_document"}
"#;

    #[test]
    fn values_keep_their_json_type() {
        let parse = |s: &str| -> Value { serde_json::from_str::<EventValue>(s).unwrap().into() };
        assert_eq!(parse("true"), Value::Bool(true));
        assert_eq!(parse("7"), Value::Int(7));
        assert_eq!(parse("7.5"), Value::Float(7.5));
        assert_eq!(parse("\"7\""), Value::Text("7".into()));
    }

    #[test]
    fn replay_builds_model() {
        let mut h = GraphImportHandler::new(GraphBackend::in_memory(), &StoreOptions::default()).unwrap();
        assert_eq!(replay(MODEL.as_bytes(), &mut h).unwrap(), 7);

        let mut store = DirectWriteStore::new(h.into_backend());
        let b = store.object(&Id::from_raw("b")).unwrap().unwrap();
        assert_eq!(store.containing_feature(&b).unwrap().as_deref(), Some("children"));
        assert_eq!(
            store.get(&b, &Feature::attribute("weight"), None).unwrap(),
            Some(StoreValue::Attribute(Value::Float(2.5)))
        );
        assert_eq!(
            store.to_array(&b, &Feature::attributes("labels")).unwrap(),
            vec![StoreValue::Attribute(Value::from("x")), StoreValue::Attribute(Value::Int(3))]
        );
    }

    #[test]
    fn bad_line_reports_its_number() {
        let input = "{\"event\":\"start_document\"}\n{\"event\":\"explode\"}\n";
        let mut h = GraphImportHandler::new(GraphBackend::in_memory(), &StoreOptions::default()).unwrap();
        match replay(input.as_bytes(), &mut h) {
            Err(ImportError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn empty_id_is_a_type_error() {
        let input = "{\"event\":\"start_document\"}\n{\"event\":\"add_element\",\"id\":\"\",\"ns_uri\":\"u\",\"class\":\"C\"}\n";
        let mut h = GraphImportHandler::new(GraphBackend::in_memory(), &StoreOptions::default()).unwrap();
        assert!(matches!(replay(input.as_bytes(), &mut h), Err(ImportError::Type(_))));
    }
}
