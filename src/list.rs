//! List reconciler
//!
//! A `data-list` element is a hidden template. Each reconcile pass walks the
//! source collection in reverse, reusing existing instances by identity key
//! and inserting each one immediately before the previously placed instance,
//! so an unchanged list touches no DOM at all and a reorder is pure moves.
//!
//! Identity comes from the id-path clause (`data-list="app.rows:id"`), the
//! `_auto_` stamp, or - for keyless lists - the array index. Computed views
//! (`app.filter(app.rows):id`) must carry an id-path so instances can be
//! traced back to the underlying collection.

use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use crate::binder::{self, BindHost};
use crate::dom::{
    Element, BIND_ATTR, COMPONENT_ID_ATTR, EMPTY_LIST_CLASS, EVENT_ATTR, LIST_ATTR,
    LIST_INSTANCE_ATTR, TEMPLATE_CLASS,
};
use crate::error::WeftError;
use crate::path::{self, AUTO_ID};
use crate::registry::{self, Registry};

/// What a reconcile pass did; the runtime fires a synthetic `change` event
/// on the template's parent when instances were created or removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub created: usize,
    pub removed: usize,
}

impl ReconcileOutcome {
    pub fn changed(&self) -> bool {
        self.created > 0 || self.removed > 0
    }
}

/// Parsed `data-list` attribute: source expression plus optional id-path.
#[derive(Clone, Debug, PartialEq)]
pub struct ListSpec {
    pub source: String,
    pub id_path: Option<String>,
}

impl ListSpec {
    /// Split on the last top-level `:` so `[id=a:b]` clauses survive.
    pub fn parse(attr: &str) -> Self {
        let mut depth = 0usize;
        let mut split_at = None;
        for (i, ch) in attr.char_indices() {
            match ch {
                '[' | '(' => depth += 1,
                ']' | ')' => depth = depth.saturating_sub(1),
                ':' if depth == 0 => split_at = Some(i),
                _ => {}
            }
        }
        match split_at {
            Some(i) => ListSpec {
                source: attr[..i].trim().to_string(),
                id_path: Some(attr[i + 1..].trim().to_string()),
            },
            None => ListSpec {
                source: attr.trim().to_string(),
                id_path: None,
            },
        }
    }
}

impl std::fmt::Display for ListSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.id_path {
            Some(id) => write!(f, "{}:{}", self.source, id),
            None => write!(f, "{}", self.source),
        }
    }
}

/// Reconcile one list template against the registry. Binds every element in
/// newly created instances and recurses into nested templates they contain.
pub fn reconcile(
    registry: &Registry,
    template: &Element,
    host: &dyn BindHost,
) -> Result<ReconcileOutcome, WeftError> {
    let Some(attr) = template.attr(LIST_ATTR) else {
        return Ok(ReconcileOutcome::default());
    };
    let mut spec = ListSpec::parse(&attr);
    let computed = path::split_computed(&spec.source).is_some();

    if computed && spec.id_path.is_none() {
        return Err(WeftError::ComputedListNeedsId {
            expr: spec.source.clone(),
        });
    }

    // Pin contextual sources to their absolute path the first time through,
    // so later passes can match this template against touched paths.
    if !computed {
        let abs = registry::resolve(&spec.source, Some(template))?;
        if abs != spec.source {
            spec.source = abs;
            template.set_attr(LIST_ATTR, spec.to_string());
        }
    }

    // Instance paths for computed views trace back to the underlying
    // collection: the method's first path argument.
    let instance_base = if computed {
        match path::split_computed(&spec.source)
            .and_then(|(_, args)| args.first().copied())
            .filter(|arg| !arg.is_empty() && path::split_computed(arg).is_none())
        {
            Some(arg) => registry::resolve(arg, Some(template))?,
            None => {
                warn!(source = %spec.source, "computed list result is untraceable; instance paths will not resolve");
                spec.source.clone()
            }
        }
    } else {
        spec.source.clone()
    };

    if spec.id_path.as_deref() == Some(AUTO_ID) && !computed {
        registry.stamp_auto_ids(&spec.source)?;
    }

    template.add_class(TEMPLATE_CLASS);
    template.set_hidden(true);

    let items = collect_items(registry, &spec, &instance_base, template)?;
    if computed {
        if let (Some(first), Some(id_path)) = (items.first(), spec.id_path.as_deref()) {
            check_traceable(registry, &instance_base, id_path, &first.key, &spec.source);
        }
    }
    let mut outcome = ReconcileOutcome::default();
    let mut existing = template.list_instances();
    let mut kept: HashMap<String, Element> = HashMap::new();

    let parent = match template.parent() {
        Some(parent) => parent,
        None => return Ok(outcome),
    };

    if items.is_empty() {
        for (_, instance) in existing {
            instance.detach();
            outcome.removed += 1;
        }
        template.set_list_instances(HashMap::new());
        template.add_class(EMPTY_LIST_CLASS);
        return Ok(outcome);
    }
    template.remove_class(EMPTY_LIST_CLASS);

    // First occurrence wins when identity keys collide.
    let mut canonical: HashMap<&str, usize> = HashMap::new();
    for (i, item) in items.iter().enumerate() {
        canonical.entry(&item.key).or_insert(i);
    }

    let mut previous = template.clone();
    for (i, item) in items.iter().enumerate().rev() {
        if canonical[item.key.as_str()] != i {
            warn!(key = %item.key, source = %spec.source, "duplicate list key; skipping item");
            continue;
        }
        let instance = match existing.remove(&item.key) {
            Some(instance) => {
                // Move only when out of place.
                let in_place = parent
                    .children()
                    .iter()
                    .skip_while(|c| !c.ptr_eq(&instance))
                    .nth(1)
                    .is_some_and(|next| next.ptr_eq(&previous));
                if !in_place {
                    parent.insert_before(&instance, Some(&previous));
                }
                instance
            }
            None => {
                let instance = stamp_instance(template, &item.instance_path);
                parent.insert_before(&instance, Some(&previous));
                bind_instance(registry, &instance, host)?;
                outcome.created += 1;
                instance
            }
        };
        kept.insert(item.key.clone(), instance.clone());
        previous = instance;
    }

    // Whatever was not reused is gone from the source.
    for (_, instance) in existing {
        instance.detach();
        outcome.removed += 1;
    }
    template.set_list_instances(kept);
    Ok(outcome)
}

struct ListItem {
    key: String,
    instance_path: String,
}

/// Resolve the source collection into keyed items (reverse order preserved
/// by the caller). Arrays key by id-path value or index; plain objects key
/// by property name.
fn collect_items(
    registry: &Registry,
    spec: &ListSpec,
    base: &str,
    template: &Element,
) -> Result<Vec<ListItem>, WeftError> {
    let value = registry.get(&spec.source, Some(template))?;
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| match &spec.id_path {
                Some(id_path) => {
                    let key = id_value_of(item, id_path).unwrap_or_else(|| i.to_string());
                    let instance_path = format!("{base}[{id_path}={key}]");
                    Ok(ListItem { key, instance_path })
                }
                None => Ok(ListItem {
                    key: i.to_string(),
                    instance_path: format!("{base}[{i}]"),
                }),
            })
            .collect(),
        Value::Object(map) => Ok(map
            .keys()
            .map(|key| ListItem {
                key: key.clone(),
                instance_path: format!("{base}[={key}]"),
            })
            .collect()),
        other => Err(WeftError::BadListSource {
            path: spec.source.clone(),
            value_type: type_label(&other).to_string(),
        }),
    }
}

/// Filter methods must return members of the source collection. Checked on
/// the first item only: an id value with no match in the source array means
/// every instance path will resolve to null.
fn check_traceable(
    registry: &Registry,
    base: &str,
    id_path: &str,
    first_key: &str,
    source_expr: &str,
) {
    let traceable = matches!(
        registry.get(base, None),
        Ok(Value::Array(items))
            if items
                .iter()
                .any(|item| id_value_of(item, id_path).as_deref() == Some(first_key))
    );
    if !traceable {
        warn!(
            source = %source_expr,
            key = first_key,
            "filtered list item is not traceable to its source"
        );
    }
}

/// Walk a dotted id-path through one list item.
fn id_value_of(item: &Value, id_path: &str) -> Option<String> {
    let mut current = item;
    for key in id_path.split('.') {
        current = current.get(key)?;
    }
    Some(path::stringify_id(current))
}

fn type_label(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Clone the template into a live instance bound to `instance_path`:
/// template markers come off, contextual paths are rewritten absolute.
fn stamp_instance(template: &Element, instance_path: &str) -> Element {
    let component_id = template
        .closest_attr(COMPONENT_ID_ATTR)
        .map(|(_, id)| id);
    let instance = template.deep_clone();
    instance.remove_attr(LIST_ATTR);
    instance.remove_class(TEMPLATE_CLASS);
    instance.remove_class(EMPTY_LIST_CLASS);
    instance.set_hidden(false);
    instance.set_attr(LIST_INSTANCE_ATTR, instance_path);
    let mut stack = vec![instance.clone()];
    while let Some(el) = stack.pop() {
        // Nested templates and everything under them resolve against their
        // own instances; their attributes stay contextual.
        if !el.ptr_eq(&instance) && el.has_attr(LIST_ATTR) {
            continue;
        }
        if let Some(bind) = el.attr(BIND_ATTR) {
            el.set_attr(
                BIND_ATTR,
                binder::rewrite_instance_bindings(&bind, instance_path, component_id.as_deref()),
            );
        }
        if let Some(event) = el.attr(EVENT_ATTR) {
            el.set_attr(EVENT_ATTR, rewrite_event_paths(&event, instance_path));
        }
        stack.extend(el.children());
    }
    instance
}

/// Rewrite `.`-prefixed handler paths in a `data-event` attribute.
fn rewrite_event_paths(attr: &str, instance_path: &str) -> String {
    let Ok(rules) = binder::parse_events(attr) else {
        return attr.to_string();
    };
    rules
        .iter()
        .map(|rule| {
            let triggers = rule
                .triggers
                .iter()
                .map(|t| match &t.key {
                    Some(key) => format!("{}({key})", t.kind),
                    None => t.kind.clone(),
                })
                .collect::<Vec<_>>()
                .join(",");
            let handler = match rule.handler.strip_prefix('.') {
                Some(rest) => format!("{instance_path}.{rest}"),
                None => rule.handler.clone(),
            };
            format!("{triggers}:{handler}")
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Bind a freshly stamped instance: every bindable element in the subtree,
/// then nested list templates it contains.
fn bind_instance(
    registry: &Registry,
    instance: &Element,
    host: &dyn BindHost,
) -> Result<(), WeftError> {
    for el in instance.descendants() {
        if el.has_attr(LIST_ATTR) {
            reconcile(registry, &el, host)?;
        } else if el.has_attr(BIND_ATTR) && !binder::in_unready_subtree(&el) {
            binder::bind_element(registry, &el, host);
        }
    }
    Ok(())
}
