//! Component instances
//!
//! A component is a subtree with private state. Attaching one registers its
//! data under a generated root (`c#name#seq`) and stamps the element with
//! `data-component-id`, which is what `_component_.x` paths resolve against.
//! Detached components are garbage - `collect` sweeps registry roots whose
//! element no longer lives in the document.

use std::cell::Cell;

use serde_json::{json, Value};
use tracing::debug;

use crate::dom::{Element, COMPONENT_ID_ATTR};
use crate::error::WeftError;
use crate::registry::Registry;

#[derive(Default)]
pub struct Components {
    seq: Cell<u64>,
}

impl Components {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `element` as an instance of component `name`, seeding its
    /// private state. Returns the generated component id.
    pub fn attach(
        &self,
        registry: &Registry,
        name: &str,
        element: &Element,
        data: Value,
    ) -> Result<String, WeftError> {
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        let id = format!("c#{name}#{seq}");
        // Component state is always an object root, even when seeded empty.
        let data = match data {
            Value::Null => json!({}),
            other => other,
        };
        registry.register(&id, data)?;
        element.set_attr(COMPONENT_ID_ATTR, &id);
        debug!(%id, "component attached");
        Ok(id)
    }

    /// Sweep component roots whose element is no longer under `root`.
    /// Returns how many were collected.
    pub fn collect(&self, registry: &Registry, root: &Element) -> usize {
        let live: Vec<String> = root
            .descendants()
            .iter()
            .filter_map(|el| el.attr(COMPONENT_ID_ATTR))
            .collect();
        let mut collected = 0;
        for name in registry.root_names() {
            if name.starts_with("c#") && !live.contains(&name) && registry.remove(&name).is_ok() {
                debug!(id = %name, "component state collected");
                collected += 1;
            }
        }
        collected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attach_generates_unique_ids() {
        let registry = Registry::new();
        let components = Components::new();
        let a = Element::new("div");
        let b = Element::new("div");
        let id_a = components
            .attach(&registry, "counter", &a, json!({"n": 0}))
            .unwrap();
        let id_b = components
            .attach(&registry, "counter", &b, json!({"n": 0}))
            .unwrap();
        assert_ne!(id_a, id_b);
        assert_eq!(a.attr(COMPONENT_ID_ATTR), Some(id_a.clone()));
        assert_eq!(registry.get(&format!("{id_a}.n"), None).unwrap(), json!(0));
    }

    #[test]
    fn null_data_seeds_empty_object() {
        let registry = Registry::new();
        let components = Components::new();
        let el = Element::new("div");
        let id = components
            .attach(&registry, "blank", &el, Value::Null)
            .unwrap();
        assert_eq!(registry.get(&id, None).unwrap(), json!({}));
    }

    #[test]
    fn component_paths_resolve_through_ancestry() {
        let registry = Registry::new();
        let components = Components::new();
        let root = Element::new("div");
        let inner = Element::new("span");
        root.append_child(&inner);
        let id = components
            .attach(&registry, "card", &root, json!({"title": "x"}))
            .unwrap();
        let abs = crate::registry::resolve("_component_.title", Some(&inner)).unwrap();
        assert_eq!(abs, format!("{id}.title"));
    }

    #[test]
    fn collect_sweeps_detached_components() {
        let registry = Registry::new();
        let components = Components::new();
        let doc = Element::new("body");
        let keep = Element::new("div");
        let drop = Element::new("div");
        doc.append_child(&keep);
        doc.append_child(&drop);
        let kept_id = components
            .attach(&registry, "a", &keep, json!({}))
            .unwrap();
        components.attach(&registry, "b", &drop, json!({})).unwrap();

        drop.detach();
        assert_eq!(components.collect(&registry, &doc), 1);
        assert!(registry.is_registered(&kept_id));
        assert_eq!(
            registry
                .root_names()
                .iter()
                .filter(|n| n.starts_with("c#"))
                .count(),
            1
        );
    }
}
