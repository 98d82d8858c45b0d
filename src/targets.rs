//! Binding target catalogue (v0.1)
//!
//! Targets are the named operations a binding applies to an element. The
//! catalogue is a closed enum built at parse time - every `data-bind` target
//! name maps to exactly one variant (or is a logged binding error), and the
//! compiler checks the dispatch is exhaustive.
//!
//! To-targets write registry values into the element; from-targets read a
//! value back out (user input flowing registry-ward). A few targets are both.

use serde_json::Value;

use crate::dom::Element;

/// Comparison sentinels usable as target parameters (`show_if(_true_)`).
pub const TRUE_TOKEN: &str = "_true_";
pub const FALSE_TOKEN: &str = "_false_";
pub const UNDEFINED_TOKEN: &str = "_undefined_";
pub const NULL_TOKEN: &str = "_null_";
pub const NON_EMPTY_TOKEN: &str = "_non_empty_";

/// One parsed binding target.
#[derive(Clone, Debug, PartialEq)]
pub enum Target {
    Value,
    Text,
    Checked,
    Selected,
    Attr(String),
    Prop(String),
    Style(String),
    /// `class(cls)` toggles on truthiness; `class(yes|no)` chooses.
    Class { on: String, off: Option<String> },
    /// `class_map(v1:c1|v2:c2|default)` - stringified value → class.
    ClassMap {
        map: Vec<(String, String)>,
        default: Option<String>,
    },
    ShowIf(Option<String>),
    HideIf(Option<String>),
    EnabledIf(Option<String>),
    DisabledIf(Option<String>),
    /// `method(model.method)` - dispatched by the binder through the
    /// runtime's method table with (element, value).
    Method(String),
    /// `component(prop)` - passthrough into the owning component's data.
    Component(String),
    Json,
}

impl Target {
    /// Parse one target token: a name with an optional parenthesized key.
    /// Unknown names are `None` (the binder logs them and moves on).
    pub fn parse(token: &str) -> Option<Target> {
        let token = token.trim();
        let (name, key) = match token.find('(') {
            Some(open) if token.ends_with(')') => {
                (&token[..open], Some(&token[open + 1..token.len() - 1]))
            }
            _ => (token, None),
        };
        let target = match name {
            "value" => Target::Value,
            "text" => Target::Text,
            "checked" => Target::Checked,
            "selected" => Target::Selected,
            "attr" => Target::Attr(key?.to_string()),
            "prop" => Target::Prop(key?.to_string()),
            "style" => Target::Style(key?.to_string()),
            "class" => {
                let key = key?;
                match key.split_once('|') {
                    Some((on, off)) => Target::Class {
                        on: on.to_string(),
                        off: Some(off.to_string()),
                    },
                    None => Target::Class {
                        on: key.to_string(),
                        off: None,
                    },
                }
            }
            "class_map" => {
                let mut map = Vec::new();
                let mut default = None;
                for clause in key?.split('|') {
                    match clause.split_once(':') {
                        Some((value, class)) => {
                            map.push((value.to_string(), class.to_string()));
                        }
                        None => default = Some(clause.to_string()),
                    }
                }
                Target::ClassMap { map, default }
            }
            "show_if" => Target::ShowIf(key.map(str::to_string)),
            "hide_if" => Target::HideIf(key.map(str::to_string)),
            "enabled_if" => Target::EnabledIf(key.map(str::to_string)),
            "disabled_if" => Target::DisabledIf(key.map(str::to_string)),
            "method" => Target::Method(key?.to_string()),
            "component" => Target::Component(key.unwrap_or("value").to_string()),
            "json" => Target::Json,
            _ => return None,
        };
        Some(target)
    }

    /// Can this target read a value back out of the element?
    pub fn is_from_capable(&self) -> bool {
        matches!(
            self,
            Target::Value
                | Target::Checked
                | Target::Selected
                | Target::Text
                | Target::Prop(_)
                | Target::Component(_)
        )
    }

    /// Is this a pure DOM write the target module can apply on its own?
    /// (Method and Component dispatch through the runtime context.)
    pub fn is_dom_write(&self) -> bool {
        !matches!(self, Target::Method(_) | Target::Component(_))
    }

    /// Apply a registry value to the element. Idempotent: applying the same
    /// value twice leaves the same DOM state. Never mutates the registry.
    pub fn apply(&self, element: &Element, value: &Value) {
        match self {
            Target::Value => element.set_value(value.clone()),
            Target::Text => element.set_text(display(value)),
            Target::Checked => {
                // Null means indeterminate, not unchecked.
                element.set_checked(match value {
                    Value::Null => None,
                    other => Some(is_truthy(other)),
                });
            }
            Target::Selected => element.set_selected(is_truthy(value)),
            Target::Attr(name) => {
                if value.is_null() || *value == Value::Bool(false) {
                    element.remove_attr(name);
                } else {
                    element.set_attr(name, display(value));
                }
            }
            Target::Prop(key) => element.set_prop(key, value.clone()),
            Target::Style(prop) => element.set_style(prop, display(value)),
            Target::Class { on, off } => {
                let truthy = is_truthy(value);
                element.toggle_class(on, truthy);
                if let Some(off) = off {
                    element.toggle_class(off, !truthy);
                }
            }
            Target::ClassMap { map, default } => {
                let repr = display(value);
                let chosen = map
                    .iter()
                    .find(|(v, _)| *v == repr)
                    .map(|(_, c)| c.clone())
                    .or_else(|| default.clone());
                for (_, class) in map {
                    element.remove_class(class);
                }
                if let Some(class) = default {
                    element.remove_class(class);
                }
                if let Some(class) = chosen {
                    element.add_class(&class);
                }
            }
            Target::ShowIf(token) => element.set_hidden(!matches_token(value, token.as_deref())),
            Target::HideIf(token) => element.set_hidden(matches_token(value, token.as_deref())),
            Target::EnabledIf(token) => {
                element.set_disabled(!matches_token(value, token.as_deref()));
            }
            Target::DisabledIf(token) => {
                element.set_disabled(matches_token(value, token.as_deref()));
            }
            Target::Json => {
                element.set_text(serde_json::to_string_pretty(value).unwrap_or_default());
            }
            // Dispatched by the binder; nothing to write here.
            Target::Method(_) | Target::Component(_) => {}
        }
    }

    /// Read the element-side value back out (from-target direction).
    pub fn extract(&self, element: &Element) -> Option<Value> {
        match self {
            Target::Value => Some(element.value()),
            Target::Checked => Some(match element.checked() {
                Some(b) => Value::Bool(b),
                None => Value::Null,
            }),
            Target::Selected => Some(Value::Bool(element.selected())),
            Target::Text => Some(Value::String(element.text())),
            Target::Prop(key) => Some(element.prop(key)),
            // Component extraction resolves through the runtime context.
            _ => None,
        }
    }
}

/// JS-style truthiness over JSON values.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Render a value the way text-ish targets display it.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Match a value against a comparison token; no token means truthiness.
fn matches_token(value: &Value, token: Option<&str>) -> bool {
    match token {
        None => is_truthy(value),
        Some(TRUE_TOKEN) => *value == Value::Bool(true),
        Some(FALSE_TOKEN) => *value == Value::Bool(false),
        // Absent and explicit-null collapse in a JSON data model.
        Some(UNDEFINED_TOKEN) | Some(NULL_TOKEN) => value.is_null(),
        Some(NON_EMPTY_TOKEN) => matches!(value, Value::String(s) if !s.is_empty()),
        Some(literal) => display(value) == literal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_plain_and_keyed() {
        assert_eq!(Target::parse("text"), Some(Target::Text));
        assert_eq!(
            Target::parse("attr(href)"),
            Some(Target::Attr("href".into()))
        );
        assert_eq!(
            Target::parse("style(color)"),
            Some(Target::Style("color".into()))
        );
        assert_eq!(Target::parse("bogus"), None);
        assert_eq!(Target::parse("attr"), None, "attr requires a key");
    }

    #[test]
    fn parse_class_variants() {
        assert_eq!(
            Target::parse("class(active)"),
            Some(Target::Class {
                on: "active".into(),
                off: None
            })
        );
        assert_eq!(
            Target::parse("class(yes|no)"),
            Some(Target::Class {
                on: "yes".into(),
                off: Some("no".into())
            })
        );
        assert_eq!(
            Target::parse("class_map(draft:gray|live:green|blue)"),
            Some(Target::ClassMap {
                map: vec![
                    ("draft".into(), "gray".into()),
                    ("live".into(), "green".into())
                ],
                default: Some("blue".into()),
            })
        );
    }

    #[test]
    fn text_and_attr_application() {
        let el = Element::new("a");
        Target::Text.apply(&el, &json!("hello"));
        assert_eq!(el.text(), "hello");

        Target::Attr("href".into()).apply(&el, &json!("/home"));
        assert_eq!(el.attr("href").as_deref(), Some("/home"));

        Target::Attr("href".into()).apply(&el, &Value::Null);
        assert!(el.attr("href").is_none());
    }

    #[test]
    fn application_is_idempotent() {
        let el = Element::new("div");
        let target = Target::Class {
            on: "active".into(),
            off: None,
        };
        target.apply(&el, &json!(true));
        target.apply(&el, &json!(true));
        assert_eq!(el.class_list(), vec!["active"]);
    }

    #[test]
    fn class_choice_swaps() {
        let el = Element::new("div");
        let target = Target::Class {
            on: "yes".into(),
            off: Some("no".into()),
        };
        target.apply(&el, &json!(true));
        assert!(el.has_class("yes") && !el.has_class("no"));
        target.apply(&el, &json!(false));
        assert!(!el.has_class("yes") && el.has_class("no"));
    }

    #[test]
    fn class_map_picks_one() {
        let el = Element::new("div");
        let target = Target::parse("class_map(draft:gray|live:green|blue)").unwrap();
        target.apply(&el, &json!("live"));
        assert_eq!(el.class_list(), vec!["green"]);
        target.apply(&el, &json!("other"));
        assert_eq!(el.class_list(), vec!["blue"]);
    }

    #[test]
    fn show_if_with_tokens() {
        let el = Element::new("div");
        Target::ShowIf(None).apply(&el, &json!("non-empty"));
        assert!(!el.hidden());
        Target::ShowIf(None).apply(&el, &json!(""));
        assert!(el.hidden());

        Target::ShowIf(Some(TRUE_TOKEN.into())).apply(&el, &json!(true));
        assert!(!el.hidden());
        Target::ShowIf(Some(TRUE_TOKEN.into())).apply(&el, &json!(1));
        assert!(el.hidden(), "_true_ requires boolean true, not truthy");

        Target::HideIf(Some(NULL_TOKEN.into())).apply(&el, &Value::Null);
        assert!(el.hidden());
    }

    #[test]
    fn enabled_disabled() {
        let el = Element::new("button");
        Target::EnabledIf(None).apply(&el, &json!(false));
        assert!(el.disabled());
        Target::EnabledIf(None).apply(&el, &json!(true));
        assert!(!el.disabled());
        Target::DisabledIf(None).apply(&el, &json!(true));
        assert!(el.disabled());
    }

    #[test]
    fn checked_null_is_indeterminate() {
        let el = Element::new("input");
        Target::Checked.apply(&el, &json!(true));
        assert_eq!(el.checked(), Some(true));
        Target::Checked.apply(&el, &Value::Null);
        assert_eq!(el.checked(), None);
    }

    #[test]
    fn extraction_round_trip() {
        let el = Element::new("input");
        el.set_value(json!("typed"));
        assert_eq!(Target::Value.extract(&el), Some(json!("typed")));

        el.set_checked(Some(true));
        assert_eq!(Target::Checked.extract(&el), Some(json!(true)));

        el.set_text("body");
        assert_eq!(Target::Text.extract(&el), Some(json!("body")));

        assert_eq!(Target::Attr("x".into()).extract(&el), None);
    }

    #[test]
    fn from_capability() {
        assert!(Target::Value.is_from_capable());
        assert!(Target::Checked.is_from_capable());
        assert!(Target::Text.is_from_capable());
        assert!(!Target::Attr("href".into()).is_from_capable());
        assert!(!Target::ShowIf(None).is_from_capable());
    }

    #[test]
    fn truthiness_matches_js() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("x")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!({})));
    }
}
