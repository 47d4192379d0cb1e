//! Per-run variable store.

use std::collections::HashMap;

use pageflow_core_types::VariableDecl;
use serde_json::Value;

use crate::errors::FlowError;

/// Mutable key/value state for one run. Seeded from flow defaults, overridden
/// by caller arguments, mutated only by the currently-executing step.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    values: HashMap<String, Value>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from declarations and caller overrides, checking bindings:
    /// a required variable with neither a default nor an override fails
    /// validation before any step runs.
    pub fn seed(
        decls: &[VariableDecl],
        overrides: &HashMap<String, Value>,
    ) -> Result<Self, FlowError> {
        let mut values = HashMap::new();

        for decl in decls {
            if let Some(default) = &decl.default {
                values.insert(decl.key.clone(), default.clone());
            }
        }
        for (key, value) in overrides {
            values.insert(key.clone(), value.clone());
        }

        for decl in decls {
            if decl.required && !values.contains_key(&decl.key) {
                return Err(FlowError::Validation(format!(
                    "required variable '{}' is not bound",
                    decl.key
                )));
            }
        }

        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Dotted-path lookup: an exact key wins, otherwise path segments
    /// traverse JSON objects.
    pub fn get_path(&self, path: &str) -> Option<Value> {
        if let Some(value) = self.values.get(path) {
            return Some(value.clone());
        }

        let mut segments = path.split('.');
        let mut current = self.values.get(segments.next()?)?.clone();
        for segment in segments {
            current = current.get(segment)?.clone();
        }
        Some(current)
    }

    /// Resolver closure for condition evaluation and interpolation.
    pub fn resolver(&self) -> impl Fn(&str) -> Option<Value> + '_ {
        move |key: &str| self.get_path(key)
    }

    /// Final outputs with sensitive-flagged variables removed.
    pub fn public_outputs(&self, decls: &[VariableDecl]) -> HashMap<String, Value> {
        self.values
            .iter()
            .filter(|(key, _)| {
                !decls
                    .iter()
                    .any(|decl| decl.sensitive && decl.key == **key)
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overrides_win_over_defaults() {
        let decls = vec![VariableDecl::new("city").with_default(json!("berlin"))];
        let mut overrides = HashMap::new();
        overrides.insert("city".to_string(), json!("tokyo"));

        let store = VariableStore::seed(&decls, &overrides).unwrap();
        assert_eq!(store.get("city"), Some(&json!("tokyo")));
    }

    #[test]
    fn unbound_required_variable_fails() {
        let decls = vec![VariableDecl::new("token").required()];
        let err = VariableStore::seed(&decls, &HashMap::new()).unwrap_err();
        assert!(matches!(err, FlowError::Validation(_)));
    }

    #[test]
    fn required_satisfied_by_override() {
        let decls = vec![VariableDecl::new("token").required()];
        let mut overrides = HashMap::new();
        overrides.insert("token".to_string(), json!("abc"));
        assert!(VariableStore::seed(&decls, &overrides).is_ok());
    }

    #[test]
    fn dotted_path_traverses_objects() {
        let mut store = VariableStore::new();
        store.set("user", json!({"name": "ada", "roles": ["admin"]}));

        assert_eq!(store.get_path("user.name"), Some(json!("ada")));
        assert_eq!(store.get_path("user.missing"), None);
    }

    #[test]
    fn exact_key_beats_path_split() {
        let mut store = VariableStore::new();
        store.set("a.b", json!(1));
        store.set("a", json!({"b": 2}));
        assert_eq!(store.get_path("a.b"), Some(json!(1)));
    }

    #[test]
    fn sensitive_variables_excluded_from_outputs() {
        let decls = vec![
            VariableDecl::new("password").sensitive(),
            VariableDecl::new("result"),
        ];
        let mut store = VariableStore::new();
        store.set("password", json!("hunter2"));
        store.set("result", json!(42));

        let outputs = store.public_outputs(&decls);
        assert!(!outputs.contains_key("password"));
        assert_eq!(outputs.get("result"), Some(&json!(42)));
    }
}
