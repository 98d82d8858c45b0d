//! Structural type checking by example (v0.1)
//!
//! A registry root may carry an example value; after each mutation the live
//! value is compared against it and mismatches are *reported*, never
//! enforced. Matching is by shape and primitive type, with a small specifier
//! language in example strings:
//!
//! - `#any` — anything matches
//! - `#string`, `#bool`, `#number`, `#int` — primitive type checks
//! - `#number [0,100]`, `#int [1,10]` — numeric range (inclusive)
//! - `#enum draft|published|archived` — stringified membership
//!
//! Object examples: a key ending in `?` is optional; a `#` key is a wildcard
//! whose example applies to every subject key not named explicitly. Array
//! examples apply their first element to every subject element.

use serde_json::Value;

/// Compare `subject` against `example`, returning human-readable mismatch
/// descriptions (empty when the shapes agree).
pub fn match_type(example: &Value, subject: &Value) -> Vec<String> {
    let mut issues = Vec::new();
    match_at(example, subject, "", &mut issues);
    issues
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn match_at(example: &Value, subject: &Value, path: &str, issues: &mut Vec<String>) {
    match example {
        // Null examples match anything (no expectation recorded).
        Value::Null => {}
        Value::String(spec) if spec.starts_with('#') => {
            match_specifier(spec, subject, path, issues);
        }
        Value::String(_) => {
            if !subject.is_string() {
                issues.push(format!(
                    "{path}: expected string, got {}",
                    type_name(subject)
                ));
            }
        }
        Value::Bool(_) => {
            if !subject.is_boolean() {
                issues.push(format!(
                    "{path}: expected boolean, got {}",
                    type_name(subject)
                ));
            }
        }
        Value::Number(_) => {
            if !subject.is_number() {
                issues.push(format!(
                    "{path}: expected number, got {}",
                    type_name(subject)
                ));
            }
        }
        Value::Array(examples) => match subject.as_array() {
            None => issues.push(format!("{path}: expected array, got {}", type_name(subject))),
            Some(items) => {
                if let Some(item_example) = examples.first() {
                    for (i, item) in items.iter().enumerate() {
                        match_at(item_example, item, &format!("{path}[{i}]"), issues);
                    }
                }
            }
        },
        Value::Object(example_keys) => match subject.as_object() {
            None => issues.push(format!(
                "{path}: expected object, got {}",
                type_name(subject)
            )),
            Some(subject_keys) => {
                let wildcard = example_keys.get("#");
                for (key, key_example) in example_keys {
                    if key == "#" {
                        continue;
                    }
                    let (name, optional) = match key.strip_suffix('?') {
                        Some(name) => (name, true),
                        None => (key.as_str(), false),
                    };
                    let child_path = join(path, name);
                    match subject_keys.get(name) {
                        Some(child) => match_at(key_example, child, &child_path, issues),
                        None if optional => {}
                        None => issues.push(format!("{child_path}: missing key")),
                    }
                }
                if let Some(wild_example) = wildcard {
                    for (key, child) in subject_keys {
                        let named = example_keys.contains_key(key)
                            || example_keys.contains_key(&format!("{key}?"));
                        if !named {
                            match_at(wild_example, child, &join(path, key), issues);
                        }
                    }
                }
            }
        },
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn match_specifier(spec: &str, subject: &Value, path: &str, issues: &mut Vec<String>) {
    let spec = spec.trim();
    let (kind, detail) = match spec.find(char::is_whitespace) {
        Some(i) => (&spec[..i], spec[i..].trim()),
        None => (spec, ""),
    };
    match kind {
        "#any" => {}
        "#string" => {
            if !subject.is_string() {
                issues.push(format!(
                    "{path}: expected string, got {}",
                    type_name(subject)
                ));
            }
        }
        "#bool" | "#boolean" => {
            if !subject.is_boolean() {
                issues.push(format!(
                    "{path}: expected boolean, got {}",
                    type_name(subject)
                ));
            }
        }
        "#number" | "#int" => {
            let n = match subject.as_f64() {
                Some(n) => n,
                None => {
                    issues.push(format!(
                        "{path}: expected number, got {}",
                        type_name(subject)
                    ));
                    return;
                }
            };
            if kind == "#int" && n.fract() != 0.0 {
                issues.push(format!("{path}: expected integer, got {n}"));
            }
            if let Some((min, max)) = parse_range(detail) {
                if n < min || n > max {
                    issues.push(format!("{path}: {n} outside range [{min},{max}]"));
                }
            }
        }
        "#enum" => {
            let repr = match subject {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if !detail.split('|').any(|v| v.trim() == repr) {
                issues.push(format!("{path}: '{repr}' not one of {detail}"));
            }
        }
        // Unknown specifiers are permissive (forwards-compatible examples).
        _ => {}
    }
}

fn parse_range(detail: &str) -> Option<(f64, f64)> {
    let detail = detail.strip_prefix('[')?.strip_suffix(']')?;
    let (min, max) = detail.split_once(',')?;
    Some((min.trim().parse().ok()?, max.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primitive_shapes() {
        assert!(match_type(&json!("a string"), &json!("x")).is_empty());
        assert_eq!(match_type(&json!("a string"), &json!(7)).len(), 1);
        assert!(match_type(&json!(0), &json!(3.5)).is_empty());
        assert_eq!(match_type(&json!(true), &json!("yes")).len(), 1);
    }

    #[test]
    fn null_example_matches_anything() {
        assert!(match_type(&Value::Null, &json!({"a": 1})).is_empty());
        assert!(match_type(&Value::Null, &json!(false)).is_empty());
    }

    #[test]
    fn object_keys_required_and_optional() {
        let example = json!({"name": "x", "age?": 0});
        assert!(match_type(&example, &json!({"name": "Ann"})).is_empty());
        assert!(match_type(&example, &json!({"name": "Ann", "age": 40})).is_empty());

        let issues = match_type(&example, &json!({"age": 40}));
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("name"));
        assert!(issues[0].contains("missing"));
    }

    #[test]
    fn wildcard_key_covers_unnamed_keys() {
        let example = json!({"id": 0, "#": "label"});
        assert!(match_type(&example, &json!({"id": 1, "a": "x", "b": "y"})).is_empty());

        let issues = match_type(&example, &json!({"id": 1, "a": 5}));
        assert_eq!(issues.len(), 1);
        assert!(issues[0].starts_with("a:"));
    }

    #[test]
    fn arrays_match_first_element_example() {
        let example = json!([{"id": 0}]);
        assert!(match_type(&example, &json!([{"id": 1}, {"id": 2}])).is_empty());

        let issues = match_type(&example, &json!([{"id": 1}, {"name": "x"}]));
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("[1].id"));
    }

    #[test]
    fn int_range_specifier() {
        let example = json!("#int [0,10]");
        assert!(match_type(&example, &json!(5)).is_empty());
        assert!(!match_type(&example, &json!(11)).is_empty());
        assert!(!match_type(&example, &json!(2.5)).is_empty());
        assert!(!match_type(&example, &json!("five")).is_empty());
    }

    #[test]
    fn enum_specifier() {
        let example = json!("#enum draft|published");
        assert!(match_type(&example, &json!("draft")).is_empty());
        assert!(!match_type(&example, &json!("deleted")).is_empty());
    }

    #[test]
    fn any_and_unknown_specifiers_are_permissive() {
        assert!(match_type(&json!("#any"), &json!([1, 2])).is_empty());
        assert!(match_type(&json!("#future-thing"), &json!(1)).is_empty());
    }
}
