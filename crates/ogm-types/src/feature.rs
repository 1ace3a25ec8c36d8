use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A structural feature of a class, as supplied by the metamodel.
///
/// Every feature is either an attribute (scalar values) or a reference
/// (links to other elements). There is no third kind: descriptors naming
/// anything else are rejected when converted with [`Feature::try_from`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Feature {
    Attribute(AttributeFeature),
    Reference(ReferenceFeature),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeFeature {
    pub name: String,
    pub many: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceFeature {
    pub name: String,
    pub many: bool,
    /// Whether the referencing element owns the referenced ones.
    pub containment: bool,
}

impl Feature {
    /// Single-valued attribute.
    pub fn attribute(name: impl Into<String>) -> Self {
        Feature::Attribute(AttributeFeature {
            name: name.into(),
            many: false,
        })
    }

    /// Multi-valued attribute.
    pub fn attributes(name: impl Into<String>) -> Self {
        Feature::Attribute(AttributeFeature {
            name: name.into(),
            many: true,
        })
    }

    /// Single-valued, non-containment reference.
    pub fn reference(name: impl Into<String>) -> Self {
        Feature::Reference(ReferenceFeature {
            name: name.into(),
            many: false,
            containment: false,
        })
    }

    /// Multi-valued, non-containment reference.
    pub fn references(name: impl Into<String>) -> Self {
        Feature::Reference(ReferenceFeature {
            name: name.into(),
            many: true,
            containment: false,
        })
    }

    /// Containment reference.
    pub fn containment(name: impl Into<String>, many: bool) -> Self {
        Feature::Reference(ReferenceFeature {
            name: name.into(),
            many,
            containment: true,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Feature::Attribute(a) => &a.name,
            Feature::Reference(r) => &r.name,
        }
    }

    pub fn is_many(&self) -> bool {
        match self {
            Feature::Attribute(a) => a.many,
            Feature::Reference(r) => r.many,
        }
    }

    pub fn is_containment(&self) -> bool {
        matches!(self, Feature::Reference(r) if r.containment)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Feature::Reference(_))
    }
}

/// Untyped feature description, as found in metamodel files or command
/// line input. Convert with `Feature::try_from`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDescriptor {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub many: bool,
    #[serde(default)]
    pub containment: bool,
}

impl TryFrom<FeatureDescriptor> for Feature {
    type Error = TypeError;

    fn try_from(d: FeatureDescriptor) -> Result<Self, Self::Error> {
        if d.name.is_empty() {
            return Err(TypeError::InvalidDescriptor {
                feature: d.name,
                reason: "feature name must not be empty".into(),
            });
        }
        match d.kind.to_ascii_lowercase().as_str() {
            "attribute" => {
                if d.containment {
                    return Err(TypeError::InvalidDescriptor {
                        feature: d.name,
                        reason: "attributes cannot be containments".into(),
                    });
                }
                Ok(Feature::Attribute(AttributeFeature {
                    name: d.name,
                    many: d.many,
                }))
            }
            "reference" => Ok(Feature::Reference(ReferenceFeature {
                name: d.name,
                many: d.many,
                containment: d.containment,
            })),
            _ => Err(TypeError::UnknownFeatureKind {
                feature: d.name,
                kind: d.kind,
            }),
        }
    }
}

impl FeatureDescriptor {
    /// Parse a JSON descriptor and convert it in one step.
    pub fn parse_feature(json: &str) -> Result<Feature, TypeError> {
        let descriptor: FeatureDescriptor =
            serde_json::from_str(json).map_err(|e| TypeError::Serialization(e.to_string()))?;
        Feature::try_from(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(kind: &str) -> FeatureDescriptor {
        FeatureDescriptor {
            name: "items".into(),
            kind: kind.into(),
            many: true,
            containment: false,
        }
    }

    #[test]
    fn constructors_set_flags() {
        assert!(!Feature::attribute("a").is_many());
        assert!(Feature::attributes("a").is_many());
        assert!(Feature::containment("c", true).is_containment());
        assert!(!Feature::references("r").is_containment());
        assert!(Feature::reference("r").is_reference());
    }

    #[test]
    fn descriptor_converts_known_kinds() {
        let attr = Feature::try_from(descriptor("attribute")).unwrap();
        assert_eq!(attr, Feature::attributes("items"));
        let reference = Feature::try_from(descriptor("Reference")).unwrap();
        assert_eq!(reference, Feature::references("items"));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = Feature::try_from(descriptor("operation")).unwrap_err();
        assert!(matches!(err, TypeError::UnknownFeatureKind { kind, .. } if kind == "operation"));
    }

    #[test]
    fn containment_attribute_is_rejected() {
        let mut d = descriptor("attribute");
        d.containment = true;
        assert!(matches!(
            Feature::try_from(d),
            Err(TypeError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn parse_feature_from_json() {
        let f = FeatureDescriptor::parse_feature(
            r#"{"name":"classes","kind":"reference","many":true,"containment":true}"#,
        )
        .unwrap();
        assert_eq!(f, Feature::containment("classes", true));
        assert!(FeatureDescriptor::parse_feature("{").is_err());
    }

    #[test]
    fn tagged_serialization() {
        let json = serde_json::to_string(&Feature::attribute("name")).unwrap();
        assert!(json.contains("\"kind\":\"attribute\""));
        let back: Feature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Feature::attribute("name"));
    }
}
