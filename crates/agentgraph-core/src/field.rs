//! Field declarations and the type classifier.
//!
//! Fields are declared with [`FieldSpec`], which records raw markers. The
//! classifier turns a type's specs into [`FieldDecl`]s with exactly one
//! [`FieldKind`] each, rejecting marker combinations that make no sense.
//! Classification runs once, when the node type is built.

use indexmap::IndexMap;
use serde_json::Value;

use crate::dependency::DepFn;
use crate::error::ConfigError;

/// Ordered field name to value map used for instances and backend context.
pub type FieldMap = IndexMap<String, Value>;

/// How a field obtains its value.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Supplied by the caller (start node) or the model backend.
    Plain,
    /// Computed by a dependency function, once per run.
    Dependency(DepFn),
    /// Copied from the latest trace instance matching `target`.
    Recall {
        target: String,
        /// Used when no match exists. `None` makes absence an error.
        fallback: Option<Value>,
    },
}

impl FieldKind {
    pub fn is_plain(&self) -> bool {
        matches!(self, FieldKind::Plain)
    }

    pub fn label(&self) -> &'static str {
        match self {
            FieldKind::Plain => "plain",
            FieldKind::Dependency(_) => "dependency",
            FieldKind::Recall { .. } => "recall",
        }
    }
}

#[derive(Debug, Clone)]
enum Marker {
    Dependency(DepFn),
    Recall {
        target: String,
        fallback: Option<Value>,
    },
}

/// Unclassified field declaration as written by the user.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: String,
    description: Option<String>,
    default: Option<Value>,
    markers: Vec<Marker>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>) -> Self {
        FieldSpec {
            name: name.into(),
            description: None,
            default: None,
            markers: Vec::new(),
        }
    }

    /// A plain field; shorthand for [`FieldSpec::new`].
    pub fn plain(name: impl Into<String>) -> Self {
        Self::new(name)
    }

    /// Value used when neither the caller nor the backend supplies one.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Marks the field as computed by `function`.
    pub fn depends_on(mut self, function: &DepFn) -> Self {
        self.markers.push(Marker::Dependency(function.clone()));
        self
    }

    /// Marks the field as recalled from the latest `target` in the trace.
    /// Missing matches fail resolution.
    pub fn recall(mut self, target: impl Into<String>) -> Self {
        self.markers.push(Marker::Recall {
            target: target.into(),
            fallback: None,
        });
        self
    }

    /// Like [`recall`](Self::recall), but uses `fallback` when nothing matches.
    pub fn recall_or(mut self, target: impl Into<String>, fallback: Value) -> Self {
        self.markers.push(Marker::Recall {
            target: target.into(),
            fallback: Some(fallback),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A classified field.
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub kind: FieldKind,
    pub default: Option<Value>,
    pub description: Option<String>,
}

/// Classifies the fields of `node_type`, preserving declaration order.
pub fn classify(
    node_type: &str,
    specs: &[FieldSpec],
) -> Result<IndexMap<String, FieldDecl>, ConfigError> {
    let mut fields = IndexMap::with_capacity(specs.len());

    for spec in specs {
        if spec.name.trim().is_empty() {
            return Err(ConfigError::InvalidName {
                name: spec.name.clone(),
            });
        }
        if fields.contains_key(&spec.name) {
            return Err(ConfigError::DuplicateField {
                node_type: node_type.to_string(),
                field: spec.name.clone(),
            });
        }

        let kind = classify_markers(node_type, spec)?;
        if !kind.is_plain() && spec.default.is_some() {
            return Err(ConfigError::DefaultOnComputedField {
                node_type: node_type.to_string(),
                field: spec.name.clone(),
            });
        }

        fields.insert(
            spec.name.clone(),
            FieldDecl {
                name: spec.name.clone(),
                kind,
                default: spec.default.clone(),
                description: spec.description.clone(),
            },
        );
    }

    Ok(fields)
}

fn classify_markers(node_type: &str, spec: &FieldSpec) -> Result<FieldKind, ConfigError> {
    let deps = spec
        .markers
        .iter()
        .filter(|m| matches!(m, Marker::Dependency(_)))
        .count();
    let recalls = spec.markers.len() - deps;

    if deps > 0 && recalls > 0 {
        return Err(ConfigError::ConflictingMarkers {
            node_type: node_type.to_string(),
            field: spec.name.clone(),
        });
    }
    if deps > 1 || recalls > 1 {
        return Err(ConfigError::DuplicateMarker {
            node_type: node_type.to_string(),
            field: spec.name.clone(),
            marker: if deps > 1 { "dependency" } else { "recall" },
        });
    }

    Ok(match spec.markers.first() {
        None => FieldKind::Plain,
        Some(Marker::Dependency(f)) => FieldKind::Dependency(f.clone()),
        Some(Marker::Recall { target, fallback }) => FieldKind::Recall {
            target: target.clone(),
            fallback: fallback.clone(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn double() -> DepFn {
        DepFn::new("double", [], |_| Ok(json!(2)))
    }

    #[test]
    fn unmarked_fields_are_plain() {
        let fields = classify("Start", &[FieldSpec::plain("x")]).unwrap();
        assert!(fields["x"].kind.is_plain());
    }

    #[test]
    fn markers_classify_in_declaration_order() {
        let f = double();
        let fields = classify(
            "Middle",
            &[
                FieldSpec::plain("note"),
                FieldSpec::new("y").depends_on(&f),
                FieldSpec::new("x").recall("Start"),
            ],
        )
        .unwrap();

        let labels: Vec<(&str, &str)> = fields
            .values()
            .map(|d| (d.name.as_str(), d.kind.label()))
            .collect();
        assert_eq!(
            labels,
            vec![("note", "plain"), ("y", "dependency"), ("x", "recall")]
        );
        match &fields["y"].kind {
            FieldKind::Dependency(dep) => assert_eq!(dep, &f),
            other => panic!("expected dependency, got {other:?}"),
        }
    }

    #[test]
    fn dependency_and_recall_conflict() {
        let err = classify(
            "Bad",
            &[FieldSpec::new("y").depends_on(&double()).recall("Start")],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::ConflictingMarkers {
                node_type: "Bad".to_string(),
                field: "y".to_string()
            }
        );
    }

    #[test]
    fn repeated_marker_is_rejected() {
        let err = classify(
            "Bad",
            &[FieldSpec::new("x").recall("A").recall("B")],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::DuplicateMarker { marker: "recall", .. }
        ));
    }

    #[test]
    fn duplicate_field_names_are_rejected() {
        let err = classify("Dup", &[FieldSpec::plain("x"), FieldSpec::plain("x")]).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateField { .. }));
    }

    #[test]
    fn default_on_recall_is_rejected() {
        let err = classify(
            "Bad",
            &[FieldSpec::new("x").recall("Start").default_value(json!(0))],
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DefaultOnComputedField { .. }));
    }

    #[test]
    fn recall_or_keeps_fallback() {
        let fields = classify("N", &[FieldSpec::new("x").recall_or("Start", json!(0))]).unwrap();
        match &fields["x"].kind {
            FieldKind::Recall { target, fallback } => {
                assert_eq!(target, "Start");
                assert_eq!(fallback, &Some(json!(0)));
            }
            other => panic!("expected recall, got {other:?}"),
        }
    }

    #[test]
    fn empty_field_name_is_invalid() {
        let err = classify("N", &[FieldSpec::plain(" ")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidName { .. }));
    }
}
