//! Host document model (v0.1)
//!
//! A minimal live element tree standing in for browser DOM nodes:
//! - attributes, classes, inline styles, text content
//! - form state (value/checked/selected/disabled) addressed by targets
//! - ancestry queries (`closest`, `contains`) and bubbling event chains
//! - deep cloning for list-template stamping
//!
//! Elements are single-threaded shared handles (`Rc<RefCell<_>>`); element
//! identity is pointer identity (`Element::ptr_eq`), which is what the list
//! reconciler's minimal-churn guarantees are stated against.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};

use serde_json::Value;

/// Well-known attributes the runtime reads and writes.
pub const BIND_ATTR: &str = "data-bind";
pub const LIST_ATTR: &str = "data-list";
pub const EVENT_ATTR: &str = "data-event";
pub const LIST_INSTANCE_ATTR: &str = "data-list-instance";
pub const COMPONENT_ID_ATTR: &str = "data-component-id";
pub const DATA_PATH_ATTR: &str = "data-path";

/// Marker classes managed by the list reconciler.
pub const TEMPLATE_CLASS: &str = "weft-list-template";
pub const EMPTY_LIST_CLASS: &str = "weft-empty-list";

#[derive(Debug, Default)]
struct ElementData {
    tag: String,
    attributes: BTreeMap<String, String>,
    classes: Vec<String>,
    styles: BTreeMap<String, String>,
    text: String,
    value: Value,
    checked: Option<bool>,
    selected: bool,
    disabled: bool,
    hidden: bool,
    props: BTreeMap<String, Value>,
    children: Vec<Element>,
    parent: Weak<RefCell<ElementData>>,
    /// Binder state: last-applied value per binding clause.
    bound: HashMap<String, Value>,
    /// Reconciler state: instance path → live instance (templates only).
    instances: HashMap<String, Element>,
}

/// A shared handle to one node of the document tree.
#[derive(Clone, Debug)]
pub struct Element {
    inner: Rc<RefCell<ElementData>>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ElementData {
                tag: tag.into(),
                value: Value::Null,
                ..ElementData::default()
            })),
        }
    }

    /// Node identity (the reconciliation guarantees are stated against this).
    pub fn ptr_eq(&self, other: &Element) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn tag(&self) -> String {
        self.inner.borrow().tag.clone()
    }

    // ─────────────────────────────────────────────────────────────
    // Attributes / classes / styles
    // ─────────────────────────────────────────────────────────────

    pub fn attr(&self, name: &str) -> Option<String> {
        self.inner.borrow().attributes.get(name).cloned()
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.inner.borrow().attributes.contains_key(name)
    }

    pub fn set_attr(&self, name: &str, value: impl Into<String>) {
        self.inner
            .borrow_mut()
            .attributes
            .insert(name.to_string(), value.into());
    }

    pub fn remove_attr(&self, name: &str) {
        self.inner.borrow_mut().attributes.remove(name);
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.inner.borrow().classes.iter().any(|c| c == class)
    }

    pub fn add_class(&self, class: &str) {
        let mut data = self.inner.borrow_mut();
        if !data.classes.iter().any(|c| c == class) {
            data.classes.push(class.to_string());
        }
    }

    pub fn remove_class(&self, class: &str) {
        self.inner.borrow_mut().classes.retain(|c| c != class);
    }

    pub fn toggle_class(&self, class: &str, on: bool) {
        if on {
            self.add_class(class);
        } else {
            self.remove_class(class);
        }
    }

    pub fn class_list(&self) -> Vec<String> {
        self.inner.borrow().classes.clone()
    }

    pub fn style(&self, prop: &str) -> Option<String> {
        self.inner.borrow().styles.get(prop).cloned()
    }

    pub fn set_style(&self, prop: &str, value: impl Into<String>) {
        self.inner
            .borrow_mut()
            .styles
            .insert(prop.to_string(), value.into());
    }

    // ─────────────────────────────────────────────────────────────
    // Content and form state
    // ─────────────────────────────────────────────────────────────

    pub fn text(&self) -> String {
        self.inner.borrow().text.clone()
    }

    pub fn set_text(&self, text: impl Into<String>) {
        self.inner.borrow_mut().text = text.into();
    }

    pub fn value(&self) -> Value {
        self.inner.borrow().value.clone()
    }

    pub fn set_value(&self, value: Value) {
        self.inner.borrow_mut().value = value;
    }

    pub fn checked(&self) -> Option<bool> {
        self.inner.borrow().checked
    }

    pub fn set_checked(&self, checked: Option<bool>) {
        self.inner.borrow_mut().checked = checked;
    }

    pub fn selected(&self) -> bool {
        self.inner.borrow().selected
    }

    pub fn set_selected(&self, selected: bool) {
        self.inner.borrow_mut().selected = selected;
    }

    pub fn disabled(&self) -> bool {
        self.inner.borrow().disabled
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.inner.borrow_mut().disabled = disabled;
    }

    pub fn hidden(&self) -> bool {
        self.inner.borrow().hidden
    }

    pub fn set_hidden(&self, hidden: bool) {
        self.inner.borrow_mut().hidden = hidden;
    }

    pub fn prop(&self, key: &str) -> Value {
        self.inner
            .borrow()
            .props
            .get(key)
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn set_prop(&self, key: &str, value: Value) {
        self.inner.borrow_mut().props.insert(key.to_string(), value);
    }

    // ─────────────────────────────────────────────────────────────
    // Tree structure
    // ─────────────────────────────────────────────────────────────

    pub fn parent(&self) -> Option<Element> {
        self.inner
            .borrow()
            .parent
            .upgrade()
            .map(|inner| Element { inner })
    }

    pub fn children(&self) -> Vec<Element> {
        self.inner.borrow().children.clone()
    }

    pub fn child_count(&self) -> usize {
        self.inner.borrow().children.len()
    }

    /// Append `child` as the last child, detaching it from any prior parent.
    pub fn append_child(&self, child: &Element) {
        self.insert_before(child, None);
    }

    /// Insert `child` into this element's children immediately before
    /// `reference` (append when `reference` is None). Moving an existing
    /// child is a detach + reinsert, matching live-DOM semantics.
    pub fn insert_before(&self, child: &Element, reference: Option<&Element>) {
        if self.ptr_eq(child) {
            return;
        }
        child.detach();
        let mut data = self.inner.borrow_mut();
        let index = match reference {
            Some(r) => data
                .children
                .iter()
                .position(|c| c.ptr_eq(r))
                .unwrap_or(data.children.len()),
            None => data.children.len(),
        };
        data.children.insert(index, child.clone());
        child.inner.borrow_mut().parent = Rc::downgrade(&self.inner);
    }

    /// Remove this element from its parent (no-op when detached).
    pub fn detach(&self) {
        if let Some(parent) = self.parent() {
            parent
                .inner
                .borrow_mut()
                .children
                .retain(|c| !c.ptr_eq(self));
            self.inner.borrow_mut().parent = Weak::new();
        }
    }

    /// True when `other` is this element or one of its descendants.
    pub fn contains(&self, other: &Element) -> bool {
        let mut current = Some(other.clone());
        while let Some(el) = current {
            if el.ptr_eq(self) {
                return true;
            }
            current = el.parent();
        }
        false
    }

    /// Nearest element (self first, then ancestors) matching `pred`.
    pub fn closest(&self, pred: impl Fn(&Element) -> bool) -> Option<Element> {
        let mut current = Some(self.clone());
        while let Some(el) = current {
            if pred(&el) {
                return Some(el);
            }
            current = el.parent();
        }
        None
    }

    /// Nearest element carrying `attr`, with that attribute's value.
    pub fn closest_attr(&self, attr: &str) -> Option<(Element, String)> {
        let el = self.closest(|e| e.has_attr(attr))?;
        let value = el.attr(attr)?;
        Some((el, value))
    }

    /// Pre-order walk of this subtree, self included.
    pub fn descendants(&self) -> Vec<Element> {
        let mut out = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(el) = stack.pop() {
            let children = el.children();
            out.push(el);
            for child in children.into_iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// The bubbling chain: target first, document root last.
    pub fn bubble_chain(&self) -> Vec<Element> {
        let mut out = Vec::new();
        let mut current = Some(self.clone());
        while let Some(el) = current {
            current = el.parent();
            out.push(el);
        }
        out
    }

    /// Deep clone: fresh nodes, same attributes/classes/styles/content.
    /// Binder and reconciler state is not carried over.
    pub fn deep_clone(&self) -> Element {
        let data = self.inner.borrow();
        let clone = Element {
            inner: Rc::new(RefCell::new(ElementData {
                tag: data.tag.clone(),
                attributes: data.attributes.clone(),
                classes: data.classes.clone(),
                styles: data.styles.clone(),
                text: data.text.clone(),
                value: data.value.clone(),
                checked: data.checked,
                selected: data.selected,
                disabled: data.disabled,
                hidden: data.hidden,
                props: data.props.clone(),
                children: Vec::new(),
                parent: Weak::new(),
                bound: HashMap::new(),
                instances: HashMap::new(),
            })),
        };
        for child in &data.children {
            clone.append_child(&child.deep_clone());
        }
        clone
    }

    // ─────────────────────────────────────────────────────────────
    // Runtime state (binder / reconciler)
    // ─────────────────────────────────────────────────────────────

    pub fn bound_value(&self, key: &str) -> Option<Value> {
        self.inner.borrow().bound.get(key).cloned()
    }

    pub fn set_bound_value(&self, key: &str, value: Value) {
        self.inner.borrow_mut().bound.insert(key.to_string(), value);
    }

    pub fn clear_bound_values(&self) {
        self.inner.borrow_mut().bound.clear();
    }

    pub fn list_instances(&self) -> HashMap<String, Element> {
        self.inner.borrow().instances.clone()
    }

    pub fn set_list_instances(&self, instances: HashMap<String, Element>) {
        self.inner.borrow_mut().instances = instances;
    }
}

/// A dispatched event: kind plus the element it originated on.
#[derive(Clone, Debug)]
pub struct Event {
    pub kind: String,
    /// Keystroke detail for keyboard events (matched by `type(key)` clauses).
    pub key: Option<String>,
    pub target: Element,
}

impl Event {
    pub fn new(kind: impl Into<String>, target: &Element) -> Self {
        Self {
            kind: kind.into(),
            key: None,
            target: target.clone(),
        }
    }

    pub fn with_key(kind: impl Into<String>, key: impl Into<String>, target: &Element) -> Self {
        Self {
            kind: kind.into(),
            key: Some(key.into()),
            target: target.clone(),
        }
    }
}
