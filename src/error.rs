//! Error types with fix suggestions (v0.1)

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
#[derive(Error, Debug)]
pub enum WeftError {
    // ─────────────────────────────────────────────────────────────
    // Path errors (WEFT-010 to WEFT-013)
    // ─────────────────────────────────────────────────────────────
    #[error("WEFT-010: Invalid path syntax: '{path}'")]
    PathSyntax { path: String },

    #[error("WEFT-011: Cannot traverse '{segment}' on {value_type} (expected object/array) in '{path}'")]
    InvalidTraversal {
        segment: String,
        value_type: String,
        path: String,
    },

    #[error("WEFT-012: Inserted value's '{id_key}' does not stringify to '{expected}' at '{path}'")]
    IdPathMismatch {
        id_key: String,
        expected: String,
        path: String,
    },

    #[error("WEFT-013: Relative path '{path}' has no enclosing instance to resolve against")]
    UnresolvedContext { path: String },

    // ─────────────────────────────────────────────────────────────
    // Registry errors (WEFT-020 to WEFT-022)
    // ─────────────────────────────────────────────────────────────
    #[error("WEFT-020: Root '{name}' must be an object or array, got {value_type}")]
    ScalarRoot { name: String, value_type: String },

    #[error("WEFT-021: Root name '{name}' is reserved (underscore-wrapped names are internal)")]
    ReservedName { name: String },

    #[error("WEFT-022: No method registered at '{path}'")]
    UnknownMethod { path: String },

    // ─────────────────────────────────────────────────────────────
    // Binding errors (WEFT-030 to WEFT-031)
    // ─────────────────────────────────────────────────────────────
    #[error("WEFT-030: Malformed binding '{binding}' (expected 'target=path')")]
    BindingSyntax { binding: String },

    #[error("WEFT-031: Malformed event binding '{spec}' (expected 'type:model.method')")]
    EventSyntax { spec: String },

    // ─────────────────────────────────────────────────────────────
    // List errors (WEFT-040 to WEFT-041)
    // ─────────────────────────────────────────────────────────────
    #[error("WEFT-040: Cannot bind {value_type} at '{path}' as a list source")]
    BadListSource { path: String, value_type: String },

    #[error("WEFT-041: Computed list '{expr}' requires an id-path (':idPath')")]
    ComputedListNeedsId { expr: String },
}

impl FixSuggestion for WeftError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            WeftError::PathSyntax { .. } => {
                Some("Use format: root.field[idKey=value].subfield (no empty segments)")
            }
            WeftError::InvalidTraversal { .. } => {
                Some("Check the path - you're trying to index into a scalar value")
            }
            WeftError::IdPathMismatch { .. } => {
                Some("Ensure the inserted item carries the id value the path looks up")
            }
            WeftError::UnresolvedContext { .. } => {
                Some("Relative ('.') and _component_ paths need a bound list/component ancestor")
            }
            WeftError::ScalarRoot { .. } => {
                Some("Wrap scalar state in an object: register(\"name\", json!({\"value\": ...}))")
            }
            WeftError::ReservedName { .. } => {
                Some("Pick a root name not wrapped in underscores")
            }
            WeftError::UnknownMethod { .. } => {
                Some("Register the method before binding to it (register_compute/register_handler)")
            }
            WeftError::BindingSyntax { .. } => {
                Some("Bindings look like 'text=root.path'; separate multiple with ';' or newline")
            }
            WeftError::EventSyntax { .. } => {
                Some("Event bindings look like 'click:model.method'")
            }
            WeftError::BadListSource { .. } => {
                Some("data-list sources must resolve to an array (or plain object) in the registry")
            }
            WeftError::ComputedListNeedsId { .. } => {
                Some("Add ':idPath' - computed views cannot track item identity without one")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        let err = WeftError::PathSyntax {
            path: "a..b".into(),
        };
        assert!(err.to_string().starts_with("WEFT-010"));

        let err = WeftError::ComputedListNeedsId {
            expr: "app.filter(app.items)".into(),
        };
        assert!(err.to_string().starts_with("WEFT-041"));
    }

    #[test]
    fn every_variant_has_a_suggestion() {
        let errors = vec![
            WeftError::PathSyntax { path: "x".into() },
            WeftError::InvalidTraversal {
                segment: "a".into(),
                value_type: "number".into(),
                path: "x.a".into(),
            },
            WeftError::IdPathMismatch {
                id_key: "id".into(),
                expected: "7".into(),
                path: "x.list[id=7]".into(),
            },
            WeftError::UnresolvedContext { path: ".name".into() },
            WeftError::ScalarRoot {
                name: "n".into(),
                value_type: "number".into(),
            },
            WeftError::ReservedName { name: "_x_".into() },
            WeftError::UnknownMethod { path: "app.fmt".into() },
            WeftError::BindingSyntax { binding: "text".into() },
            WeftError::EventSyntax { spec: "click".into() },
            WeftError::BadListSource {
                path: "x.n".into(),
                value_type: "number".into(),
            },
            WeftError::ComputedListNeedsId { expr: "f(x)".into() },
        ];
        for err in errors {
            assert!(err.fix_suggestion().is_some(), "no suggestion for {err}");
        }
    }
}
