//! Path-addressed data registry (v0.1)
//!
//! The root-keyed store all bindings read from and write to:
//! - roots are named JSON objects/arrays (`serde_json::Value`)
//! - `set` has overlay-merge semantics for plain objects
//! - `touch` notifies listeners synchronously, in registration order
//! - id-path lookups (`list[id=7]`) use a lazily rebuilt reverse index
//! - optional per-root example types are checked advisorily after mutation
//!
//! The registry is a plain constructable value (no module-level singleton);
//! the runtime context owns one and injects it everywhere it is needed.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::warn;

use crate::dom::{Element, COMPONENT_ID_ATTR, DATA_PATH_ATTR, LIST_INSTANCE_ATTR};
use crate::error::WeftError;
use crate::path::{self, Segment};
use crate::typecheck;

/// Underscore-wrapped root names are reserved for path tokens.
static RESERVED_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^_.+_$").unwrap());

/// How a listener decides which touched paths it cares about.
#[derive(Clone)]
pub enum PathTest {
    /// Segment-boundary prefix match, in either direction ("app.list"
    /// matches a touch of "app.list[id=3].name" and of "app").
    Prefix(String),
    Pattern(Regex),
    Predicate(Rc<dyn Fn(&str) -> bool>),
}

impl PathTest {
    fn matches(&self, touched: &str) -> bool {
        match self {
            PathTest::Prefix(p) => path::paths_overlap(p, touched),
            PathTest::Pattern(re) => re.is_match(touched),
            PathTest::Predicate(f) => f(touched),
        }
    }
}

impl From<&str> for PathTest {
    fn from(prefix: &str) -> Self {
        PathTest::Prefix(prefix.to_string())
    }
}

impl From<String> for PathTest {
    fn from(prefix: String) -> Self {
        PathTest::Prefix(prefix)
    }
}

impl From<Regex> for PathTest {
    fn from(re: Regex) -> Self {
        PathTest::Pattern(re)
    }
}

/// Returned by listener callbacks; `Unobserve` removes the listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Observation {
    Keep,
    Unobserve,
}

/// Listener callback: (touched path, source element).
pub type ListenerFn = Rc<dyn Fn(&str, Option<&Element>) -> Observation>;

/// Computed-binding method: resolved argument values in, value out.
pub type ComputeFn = Rc<dyn Fn(&[Value]) -> Value>;

/// Advisory type-check reporter: (root name, mismatch descriptions).
pub type CheckHandler = Rc<dyn Fn(&str, &[String])>;

struct Listener {
    id: u64,
    test: PathTest,
    callback: ListenerFn,
}

/// Expand relative (`.`), `_component_`, and `_data_` path prefixes using
/// the DOM ancestry of `context`. Absolute paths pass through untouched.
pub fn resolve(path_str: &str, context: Option<&Element>) -> Result<String, WeftError> {
    if !path::is_contextual(path_str) {
        return Ok(path_str.to_string());
    }
    let unresolved = || WeftError::UnresolvedContext {
        path: path_str.to_string(),
    };
    let el = context.ok_or_else(unresolved)?;
    if let Some(rest) = path_str.strip_prefix(path::COMPONENT_TOKEN) {
        let (_, id) = el.closest_attr(COMPONENT_ID_ATTR).ok_or_else(unresolved)?;
        Ok(format!("{id}{rest}"))
    } else if let Some(rest) = path_str.strip_prefix(path::DATA_TOKEN) {
        let (_, data_path) = el.closest_attr(DATA_PATH_ATTR).ok_or_else(unresolved)?;
        Ok(format!("{data_path}{rest}"))
    } else {
        let (_, instance) = el.closest_attr(LIST_INSTANCE_ATTR).ok_or_else(unresolved)?;
        if path_str == "." {
            Ok(instance)
        } else {
            Ok(format!("{instance}{path_str}"))
        }
    }
}

/// The registry. Single-threaded; interior mutability so listeners and
/// bindings can hold shared handles.
pub struct Registry {
    roots: RefCell<HashMap<String, Value>>,
    listeners: RefCell<Vec<Listener>>,
    next_listener_id: Cell<u64>,
    computes: RefCell<HashMap<String, ComputeFn>>,
    examples: RefCell<HashMap<String, Value>>,
    check_handler: RefCell<CheckHandler>,
    /// Reverse index: (array path, id key) → stringified id → array index.
    /// Pure optimization - validated on hit, rebuilt lazily on miss.
    id_cache: RefCell<HashMap<(String, String), HashMap<String, usize>>>,
    auto_id_seq: Cell<u64>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            roots: RefCell::new(HashMap::new()),
            listeners: RefCell::new(Vec::new()),
            next_listener_id: Cell::new(0),
            computes: RefCell::new(HashMap::new()),
            examples: RefCell::new(HashMap::new()),
            check_handler: RefCell::new(Rc::new(|root, issues| {
                for issue in issues {
                    warn!(root, issue, "type example mismatch");
                }
            })),
            id_cache: RefCell::new(HashMap::new()),
            auto_id_seq: Cell::new(0),
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Roots
    // ─────────────────────────────────────────────────────────────

    /// Bind `value` under `name` and notify. Re-registering a different
    /// value under a used name is a warned no-op.
    pub fn register(&self, name: &str, value: Value) -> Result<(), WeftError> {
        self.register_silent(name, value)?;
        self.touch(name, None);
        Ok(())
    }

    /// `register` without the notification (suppress-notify form).
    pub fn register_silent(&self, name: &str, value: Value) -> Result<(), WeftError> {
        validate_root_name(name)?;
        if !(value.is_object() || value.is_array()) {
            return Err(WeftError::ScalarRoot {
                name: name.to_string(),
                value_type: type_name(&value).to_string(),
            });
        }
        let mut roots = self.roots.borrow_mut();
        if let Some(existing) = roots.get(name) {
            if *existing != value {
                warn!(name, "register: name already in use, keeping existing value");
            }
            return Ok(());
        }
        roots.insert(name.to_string(), value);
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.roots.borrow().contains_key(name)
    }

    pub fn root_names(&self) -> Vec<String> {
        self.roots.borrow().keys().cloned().collect()
    }

    /// Destroy the value at `path` (a whole root or a nested location) and
    /// notify listeners.
    pub fn remove(&self, path_str: &str) -> Result<(), WeftError> {
        let segments = path::parse(path_str)?;
        let root = root_key(&segments, path_str)?;
        if segments.len() == 1 {
            self.roots.borrow_mut().remove(&root);
        } else {
            let mut roots = self.roots.borrow_mut();
            if let Some(root_value) = roots.get_mut(&root) {
                remove_at(root_value, &segments[1..]);
            }
        }
        self.touch(path_str, None);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Read
    // ─────────────────────────────────────────────────────────────

    /// Resolve and read. Unresolvable paths yield `Value::Null`; traversal
    /// type violations and syntax errors are the caller's bug and propagate.
    /// Comma-separated multi-paths return an array of resolved values;
    /// computed expressions (`method(a,b)`) invoke a registered method.
    pub fn get(&self, expr: &str, context: Option<&Element>) -> Result<Value, WeftError> {
        let parts = path::split_paths(expr);
        if parts.len() > 1 {
            let values = parts
                .iter()
                .map(|p| self.get_one(p, context))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Value::Array(values));
        }
        self.get_one(parts[0], context)
    }

    fn get_one(&self, expr: &str, context: Option<&Element>) -> Result<Value, WeftError> {
        if let Some((method, args)) = path::split_computed(expr) {
            let method_path = resolve(method, context)?;
            let compute = self
                .computes
                .borrow()
                .get(&method_path)
                .cloned()
                .ok_or_else(|| WeftError::UnknownMethod {
                    path: method_path.clone(),
                })?;
            let values = args
                .iter()
                .map(|a| self.get_one(a, context))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(compute(&values));
        }
        let abs = resolve(expr, context)?;
        Ok(self.read(&abs)?.unwrap_or(Value::Null))
    }

    fn read(&self, abs: &str) -> Result<Option<Value>, WeftError> {
        let segments = path::parse(abs)?;
        let root = root_key(&segments, abs)?;
        let roots = self.roots.borrow();
        let Some(mut current) = roots.get(&root) else {
            return Ok(None);
        };
        let mut walked = root.clone();
        for seg in &segments[1..] {
            match seg {
                Segment::Key(k) | Segment::ObjKey(k) => {
                    match current.get(k) {
                        Some(next) => current = next,
                        None => return Ok(None),
                    }
                    push_segment(&mut walked, seg);
                }
                Segment::Index(i) => {
                    if current.is_null() {
                        return Ok(None);
                    }
                    let arr = current.as_array().ok_or_else(|| traversal(seg, current, abs))?;
                    match arr.get(*i) {
                        Some(next) => current = next,
                        None => return Ok(None),
                    }
                    push_segment(&mut walked, seg);
                }
                Segment::IdMatch { key, value } => {
                    if current.is_null() {
                        return Ok(None);
                    }
                    let arr = current.as_array().ok_or_else(|| traversal(seg, current, abs))?;
                    match self.lookup_index(&walked, key, value, arr) {
                        Some(i) => current = &arr[i],
                        None => return Ok(None),
                    }
                    push_segment(&mut walked, seg);
                }
            }
        }
        Ok(Some(current.clone()))
    }

    /// Id-path reverse index: verify a cached hit against the live array,
    /// rebuild on any miss. Never required for correctness.
    fn lookup_index(&self, list_path: &str, key: &str, expected: &str, arr: &[Value]) -> Option<usize> {
        let cache_key = (list_path.to_string(), key.to_string());
        {
            let cache = self.id_cache.borrow();
            if let Some(index) = cache.get(&cache_key) {
                if let Some(&i) = index.get(expected) {
                    let still_valid = arr
                        .get(i)
                        .and_then(|item| id_value_of(item, key))
                        .is_some_and(|v| v == expected);
                    if still_valid {
                        return Some(i);
                    }
                }
            }
        }
        let mut index = HashMap::new();
        let mut found = None;
        for (i, item) in arr.iter().enumerate() {
            if let Some(v) = id_value_of(item, key) {
                if found.is_none() && v == expected {
                    found = Some(i);
                }
                index.entry(v).or_insert(i);
            }
        }
        self.id_cache.borrow_mut().insert(cache_key, index);
        found
    }

    // ─────────────────────────────────────────────────────────────
    // Write
    // ─────────────────────────────────────────────────────────────

    /// Set the value at `path`:
    /// - root paths require object/array values
    /// - strictly equal primitives are a no-op (arrays always notify)
    /// - plain object onto plain object is a shallow overlay merge
    /// - anything else replaces
    /// Every effective set notifies via `touch(path, source)`.
    pub fn set(&self, path_str: &str, value: Value, source: Option<&Element>) -> Result<(), WeftError> {
        let abs = resolve(path_str, source)?;
        let segments = path::parse(&abs)?;
        if segments.len() == 1 && !(value.is_object() || value.is_array()) {
            return Err(WeftError::ScalarRoot {
                name: abs.clone(),
                value_type: type_name(&value).to_string(),
            });
        }
        let current = self.read(&abs)?;
        let effective = match current {
            Some(existing) => {
                if existing == value && !value.is_array() && !value.is_object() {
                    // Strictly equal primitive: nothing to do, nothing to say.
                    return Ok(());
                }
                if is_plain_object(&existing) && is_plain_object(&value) {
                    overlay(existing, value)
                } else {
                    value
                }
            }
            None => value,
        };
        self.write(&abs, &segments, effective)?;
        self.touch(&abs, source);
        Ok(())
    }

    /// Full-replacement set: nulls the path first so overlay-merge cannot
    /// retain stale keys, then sets.
    pub fn replace(&self, path_str: &str, value: Value) -> Result<(), WeftError> {
        let abs = resolve(path_str, None)?;
        let segments = path::parse(&abs)?;
        if segments.len() > 1 {
            self.write(&abs, &segments, Value::Null)?;
        } else {
            self.roots.borrow_mut().remove(&abs);
        }
        self.set(&abs, value, None)
    }

    fn write(&self, abs: &str, segments: &[Segment], value: Value) -> Result<(), WeftError> {
        let root = root_key(segments, abs)?;
        validate_root_name(&root)?;
        let mut roots = self.roots.borrow_mut();

        if segments.len() == 1 {
            roots.insert(root, value);
            return Ok(());
        }

        let root_value = roots.entry(root.clone()).or_insert_with(|| {
            if matches!(segments[1], Segment::Index(_) | Segment::IdMatch { .. }) {
                json!([])
            } else {
                json!({})
            }
        });

        let mut current = root_value;
        let mut walked = root;
        let mut pending = Some(value);
        for (i, seg) in segments[1..].iter().enumerate() {
            let last = i == segments.len() - 2;
            match seg {
                Segment::Key(k) | Segment::ObjKey(k) => {
                    if current.is_null() {
                        *current = json!({});
                    }
                    let obj = current
                        .as_object_mut()
                        .ok_or_else(|| WeftError::InvalidTraversal {
                            segment: k.clone(),
                            value_type: "scalar".to_string(),
                            path: abs.to_string(),
                        })?;
                    if last {
                        obj.insert(k.clone(), pending.take().unwrap_or(Value::Null));
                        return Ok(());
                    }
                    current = obj.entry(k.clone()).or_insert(Value::Null);
                }
                Segment::Index(n) => {
                    if current.is_null() {
                        *current = json!([]);
                    }
                    let arr = current
                        .as_array_mut()
                        .ok_or_else(|| traversal_owned(seg, abs))?;
                    while arr.len() <= *n {
                        arr.push(Value::Null);
                    }
                    if last {
                        arr[*n] = pending.take().unwrap_or(Value::Null);
                        return Ok(());
                    }
                    current = &mut arr[*n];
                }
                Segment::IdMatch { key, value: expected } => {
                    if current.is_null() {
                        *current = json!([]);
                    }
                    let index = {
                        let arr = current
                            .as_array()
                            .ok_or_else(|| traversal_owned(seg, abs))?;
                        self.lookup_index(&walked, key, expected, arr)
                    };
                    let arr = current.as_array_mut().expect("checked above");
                    if last {
                        let item = pending.take().unwrap_or(Value::Null);
                        // Inserting through an id-path: the value must
                        // actually carry the id the path looks up.
                        let actual = id_value_of(&item, key);
                        if actual.as_deref() != Some(expected.as_str()) {
                            return Err(WeftError::IdPathMismatch {
                                id_key: key.clone(),
                                expected: expected.clone(),
                                path: abs.to_string(),
                            });
                        }
                        match index {
                            Some(idx) => arr[idx] = item,
                            None => arr.push(item),
                        }
                        return Ok(());
                    }
                    let idx = match index {
                        Some(idx) => idx,
                        None => {
                            arr.push(scaffold_id(key, expected));
                            arr.len() - 1
                        }
                    };
                    current = &mut arr[idx];
                }
            }
            push_segment(&mut walked, seg);
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Array conveniences (read-modify-write + touch)
    // ─────────────────────────────────────────────────────────────

    pub fn push(&self, path_str: &str, value: Value) -> Result<(), WeftError> {
        self.modify_array(path_str, |arr| arr.push(value))
    }

    pub fn unshift(&self, path_str: &str, value: Value) -> Result<(), WeftError> {
        self.modify_array(path_str, |arr| arr.insert(0, value))
    }

    pub fn sort(
        &self,
        path_str: &str,
        cmp: impl Fn(&Value, &Value) -> Ordering,
    ) -> Result<(), WeftError> {
        self.modify_array(path_str, |arr| arr.sort_by(cmp))
    }

    fn modify_array(
        &self,
        path_str: &str,
        op: impl FnOnce(&mut Vec<Value>),
    ) -> Result<(), WeftError> {
        let abs = resolve(path_str, None)?;
        let segments = path::parse(&abs)?;
        let mut value = self.read(&abs)?.unwrap_or_else(|| json!([]));
        let value_type = type_name(&value).to_string();
        let arr = value
            .as_array_mut()
            .ok_or_else(|| WeftError::InvalidTraversal {
                segment: abs.clone(),
                value_type,
                path: abs.clone(),
            })?;
        op(arr);
        self.write(&abs, &segments, value)?;
        self.touch(&abs, None);
        Ok(())
    }

    /// Stamp a hidden unique id (under the `_auto_` key) onto every object
    /// item of the array at `path` that lacks one. Ids live in the data, so
    /// they are stable across reconciliation passes. Does not notify.
    pub fn stamp_auto_ids(&self, path_str: &str) -> Result<(), WeftError> {
        let abs = resolve(path_str, None)?;
        let segments = path::parse(&abs)?;
        let Some(mut value) = self.read(&abs)? else {
            return Ok(());
        };
        let Some(arr) = value.as_array_mut() else {
            return Ok(());
        };
        let mut stamped = false;
        for item in arr.iter_mut() {
            if let Some(obj) = item.as_object_mut() {
                if !obj.contains_key(path::AUTO_ID) {
                    let id = self.auto_id_seq.get();
                    self.auto_id_seq.set(id + 1);
                    obj.insert(path::AUTO_ID.to_string(), json!(id));
                    stamped = true;
                }
            }
        }
        if stamped {
            self.write(&abs, &segments, value)?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Listeners
    // ─────────────────────────────────────────────────────────────

    /// Register a listener; returns its id for `unobserve`.
    pub fn observe(&self, test: impl Into<PathTest>, callback: ListenerFn) -> u64 {
        let id = self.next_listener_id.get();
        self.next_listener_id.set(id + 1);
        self.listeners.borrow_mut().push(Listener {
            id,
            test: test.into(),
            callback,
        });
        id
    }

    pub fn unobserve(&self, id: u64) {
        self.listeners.borrow_mut().retain(|l| l.id != id);
    }

    /// Synchronously notify every listener whose test matches `path`.
    /// Runs the advisory type check for the touched root first. Listeners
    /// may observe/unobserve re-entrantly; listeners added during a touch
    /// see the next touch, not this one.
    pub fn touch(&self, path_str: &str, source: Option<&Element>) {
        self.check_example(path_str);
        let snapshot: Vec<(u64, PathTest, ListenerFn)> = self
            .listeners
            .borrow()
            .iter()
            .map(|l| (l.id, l.test.clone(), Rc::clone(&l.callback)))
            .collect();
        let mut remove = Vec::new();
        for (id, test, callback) in snapshot {
            if !test.matches(path_str) {
                continue;
            }
            if callback(path_str, source) == Observation::Unobserve {
                remove.push(id);
            }
        }
        if !remove.is_empty() {
            self.listeners
                .borrow_mut()
                .retain(|l| !remove.contains(&l.id));
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Computes and type examples
    // ─────────────────────────────────────────────────────────────

    pub fn register_compute(&self, path_str: &str, f: ComputeFn) {
        self.computes.borrow_mut().insert(path_str.to_string(), f);
    }

    pub fn has_compute(&self, path_str: &str) -> bool {
        self.computes.borrow().contains_key(path_str)
    }

    /// Associate an example value with a root; subsequent mutations under
    /// that root are checked (advisorily) against it.
    pub fn register_example(&self, name: &str, example: Value) {
        self.examples.borrow_mut().insert(name.to_string(), example);
    }

    pub fn set_check_handler(&self, handler: CheckHandler) {
        *self.check_handler.borrow_mut() = handler;
    }

    fn check_example(&self, path_str: &str) {
        let root = path::root_name(path_str).to_string();
        let Some(example) = self.examples.borrow().get(&root).cloned() else {
            return;
        };
        let value = self
            .roots
            .borrow()
            .get(&root)
            .cloned()
            .unwrap_or(Value::Null);
        let issues = typecheck::match_type(&example, &value);
        if !issues.is_empty() {
            let handler = self.check_handler.borrow().clone();
            handler(&root, &issues);
        }
    }
}

// ─────────────────────────────────────────────────────────────
// Value helpers
// ─────────────────────────────────────────────────────────────

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

fn is_plain_object(value: &Value) -> bool {
    value.is_object()
}

/// Shallow overlay: existing keys overwritten by the new value's keys.
fn overlay(existing: Value, new: Value) -> Value {
    let (Value::Object(mut base), Value::Object(top)) = (existing, new) else {
        unreachable!("overlay called on non-objects");
    };
    for (k, v) in top {
        base.insert(k, v);
    }
    Value::Object(base)
}

/// Read the (possibly dotted) id key of an item and stringify it.
fn id_value_of(item: &Value, key: &str) -> Option<String> {
    let mut current = item;
    for part in key.split('.') {
        current = current.get(part)?;
    }
    Some(path::stringify_id(current))
}

/// Build a fresh item carrying the id value an id-path expects
/// (auto-vivification through an intermediate id-path segment).
fn scaffold_id(key: &str, expected: &str) -> Value {
    let id: Value = expected
        .parse::<i64>()
        .map(Value::from)
        .or_else(|_| expected.parse::<f64>().map(Value::from))
        .or_else(|_| expected.parse::<bool>().map(Value::from))
        .unwrap_or_else(|_| Value::String(expected.to_string()));
    let mut value = id;
    for part in key.split('.').rev() {
        value = json!({ part: value });
    }
    value
}

fn root_key(segments: &[Segment], path_str: &str) -> Result<String, WeftError> {
    match segments.first() {
        Some(Segment::Key(k)) => Ok(k.clone()),
        _ => Err(WeftError::PathSyntax {
            path: path_str.to_string(),
        }),
    }
}

fn validate_root_name(name: &str) -> Result<(), WeftError> {
    if RESERVED_NAME.is_match(name) {
        return Err(WeftError::ReservedName {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn push_segment(walked: &mut String, seg: &Segment) {
    match seg {
        Segment::Key(k) => {
            walked.push('.');
            walked.push_str(k);
        }
        Segment::Index(i) => {
            walked.push('[');
            walked.push_str(&i.to_string());
            walked.push(']');
        }
        Segment::IdMatch { key, value } => {
            walked.push('[');
            walked.push_str(key);
            walked.push('=');
            walked.push_str(value);
            walked.push(']');
        }
        Segment::ObjKey(k) => {
            walked.push_str("[=");
            walked.push_str(k);
            walked.push(']');
        }
    }
}

fn traversal(seg: &Segment, current: &Value, path_str: &str) -> WeftError {
    WeftError::InvalidTraversal {
        segment: format!("{seg:?}"),
        value_type: type_name(current).to_string(),
        path: path_str.to_string(),
    }
}

fn traversal_owned(seg: &Segment, path_str: &str) -> WeftError {
    WeftError::InvalidTraversal {
        segment: format!("{seg:?}"),
        value_type: "scalar".to_string(),
        path: path_str.to_string(),
    }
}

fn remove_at(root_value: &mut Value, segments: &[Segment]) {
    let mut current = root_value;
    for (i, seg) in segments.iter().enumerate() {
        let last = i == segments.len() - 1;
        match seg {
            Segment::Key(k) | Segment::ObjKey(k) => {
                let Some(obj) = current.as_object_mut() else {
                    return;
                };
                if last {
                    obj.remove(k);
                    return;
                }
                match obj.get_mut(k) {
                    Some(next) => current = next,
                    None => return,
                }
            }
            Segment::Index(n) => {
                let Some(arr) = current.as_array_mut() else {
                    return;
                };
                if last {
                    if *n < arr.len() {
                        arr.remove(*n);
                    }
                    return;
                }
                match arr.get_mut(*n) {
                    Some(next) => current = next,
                    None => return,
                }
            }
            Segment::IdMatch { key, value } => {
                let Some(arr) = current.as_array_mut() else {
                    return;
                };
                let idx = arr
                    .iter()
                    .position(|item| id_value_of(item, key).as_deref() == Some(value.as_str()));
                let Some(idx) = idx else { return };
                if last {
                    arr.remove(idx);
                    return;
                }
                current = &mut arr[idx];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> Registry {
        Registry::new()
    }

    #[test]
    fn register_and_get() {
        let reg = registry();
        reg.register("app", json!({"name": "weft"})).unwrap();
        assert_eq!(reg.get("app.name", None).unwrap(), json!("weft"));
    }

    #[test]
    fn register_scalar_root_fails() {
        let reg = registry();
        assert!(matches!(
            reg.register("app", json!(42)),
            Err(WeftError::ScalarRoot { .. })
        ));
    }

    #[test]
    fn reserved_names_rejected() {
        let reg = registry();
        assert!(matches!(
            reg.register("_secret_", json!({})),
            Err(WeftError::ReservedName { .. })
        ));
    }

    #[test]
    fn reregister_is_warned_noop() {
        let reg = registry();
        reg.register("app", json!({"v": 1})).unwrap();
        reg.register("app", json!({"v": 2})).unwrap();
        assert_eq!(reg.get("app.v", None).unwrap(), json!(1));
    }

    #[test]
    fn set_auto_vivifies() {
        let reg = registry();
        reg.set("app.deep.nested.value", json!(7), None).unwrap();
        assert_eq!(reg.get("app.deep.nested.value", None).unwrap(), json!(7));
        reg.set("app.rows[2]", json!("c"), None).unwrap();
        assert_eq!(
            reg.get("app.rows", None).unwrap(),
            json!([null, null, "c"])
        );
    }

    #[test]
    fn get_unresolvable_is_null() {
        let reg = registry();
        reg.register("app", json!({"a": 1})).unwrap();
        assert_eq!(reg.get("app.missing.deeper", None).unwrap(), Value::Null);
        assert_eq!(reg.get("ghost.x", None).unwrap(), Value::Null);
    }

    #[test]
    fn primitive_roundtrip_and_overlay_merge() {
        let reg = registry();
        reg.register("app", json!({"user": {"name": "Ann", "age": 40}}))
            .unwrap();
        reg.set("app.user", json!({"age": 41}), None).unwrap();
        // Overlay: new keys win, unmentioned keys survive.
        assert_eq!(
            reg.get("app.user", None).unwrap(),
            json!({"name": "Ann", "age": 41})
        );
    }

    #[test]
    fn arrays_replace_not_merge() {
        let reg = registry();
        reg.register("app", json!({"list": [1, 2, 3]})).unwrap();
        reg.set("app.list", json!([9]), None).unwrap();
        assert_eq!(reg.get("app.list", None).unwrap(), json!([9]));
    }

    #[test]
    fn replace_drops_stale_keys() {
        let reg = registry();
        reg.register("app", json!({"cfg": {"a": 1, "b": 2}})).unwrap();
        reg.replace("app.cfg", json!({"a": 9})).unwrap();
        assert_eq!(reg.get("app.cfg", None).unwrap(), json!({"a": 9}));
    }

    #[test]
    fn equal_primitive_set_does_not_notify() {
        let reg = registry();
        reg.register("app", json!({"n": 5})).unwrap();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        reg.observe("app.n", Rc::new(move |_, _| {
            c.set(c.get() + 1);
            Observation::Keep
        }));
        reg.set("app.n", json!(5), None).unwrap();
        assert_eq!(count.get(), 0);
        reg.set("app.n", json!(6), None).unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn array_set_always_notifies() {
        let reg = registry();
        reg.register("app", json!({"list": [1]})).unwrap();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        reg.observe("app.list", Rc::new(move |_, _| {
            c.set(c.get() + 1);
            Observation::Keep
        }));
        reg.set("app.list", json!([1]), None).unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn id_path_lookup_returns_matching_item() {
        let reg = registry();
        reg.register(
            "app",
            json!({"items": [{"id": 1, "name": "A"}, {"id": 2, "name": "B"}]}),
        )
        .unwrap();
        assert_eq!(
            reg.get("app.items[id=2].name", None).unwrap(),
            json!("B")
        );
        assert_eq!(reg.get("app.items[id=9]", None).unwrap(), Value::Null);
    }

    #[test]
    fn id_path_cache_survives_unobserved_mutation() {
        let reg = registry();
        reg.register("app", json!({"items": [{"id": 1}, {"id": 2}]}))
            .unwrap();
        // Prime the cache.
        assert_eq!(reg.get("app.items[id=2]", None).unwrap(), json!({"id": 2}));
        // Mutate behind the cache's back (replace whole array, reversed).
        reg.set("app.items", json!([{"id": 2}, {"id": 1}]), None)
            .unwrap();
        // Stale entry is detected and rebuilt lazily.
        assert_eq!(reg.get("app.items[id=1]", None).unwrap(), json!({"id": 1}));
        assert_eq!(reg.get("app.items[id=2]", None).unwrap(), json!({"id": 2}));
    }

    #[test]
    fn id_path_insert_appends_matching_value() {
        let reg = registry();
        reg.register("app", json!({"items": [{"id": 1}]})).unwrap();
        reg.set("app.items[id=2]", json!({"id": 2, "name": "new"}), None)
            .unwrap();
        assert_eq!(
            reg.get("app.items[id=2].name", None).unwrap(),
            json!("new")
        );
    }

    #[test]
    fn id_path_insert_mismatch_is_fatal() {
        let reg = registry();
        reg.register("app", json!({"items": []})).unwrap();
        let result = reg.set("app.items[id=2]", json!({"id": 3}), None);
        assert!(matches!(result, Err(WeftError::IdPathMismatch { .. })));
    }

    #[test]
    fn id_path_traversal_on_scalar_is_fatal() {
        let reg = registry();
        reg.register("app", json!({"n": 5})).unwrap();
        assert!(matches!(
            reg.get("app.n[id=1]", None),
            Err(WeftError::InvalidTraversal { .. })
        ));
    }

    #[test]
    fn multi_path_get_returns_array() {
        let reg = registry();
        reg.register("app", json!({"a": 1, "b": 2})).unwrap();
        assert_eq!(reg.get("app.a,app.b", None).unwrap(), json!([1, 2]));
    }

    #[test]
    fn computed_get_invokes_method() {
        let reg = registry();
        reg.register("app", json!({"a": 2, "b": 3})).unwrap();
        reg.register_compute(
            "app.sum",
            Rc::new(|args| {
                let total: i64 = args.iter().filter_map(|v| v.as_i64()).sum();
                json!(total)
            }),
        );
        assert_eq!(reg.get("app.sum(app.a,app.b)", None).unwrap(), json!(5));
        assert!(matches!(
            reg.get("app.nope(app.a)", None),
            Err(WeftError::UnknownMethod { .. })
        ));
    }

    #[test]
    fn touch_notifies_prefix_listeners_in_order() {
        let reg = registry();
        reg.register("app", json!({"x": {"y": 1}})).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s1 = Rc::clone(&seen);
        reg.observe("app.x", Rc::new(move |p, _| {
            s1.borrow_mut().push(format!("first:{p}"));
            Observation::Keep
        }));
        let s2 = Rc::clone(&seen);
        reg.observe("app", Rc::new(move |p, _| {
            s2.borrow_mut().push(format!("second:{p}"));
            Observation::Keep
        }));

        reg.set("app.x.y", json!(2), None).unwrap();
        assert_eq!(
            seen.borrow().as_slice(),
            ["first:app.x.y", "second:app.x.y"]
        );
    }

    #[test]
    fn listener_unobserve_via_observation() {
        let reg = registry();
        reg.register("app", json!({"n": 0})).unwrap();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        reg.observe("app", Rc::new(move |_, _| {
            c.set(c.get() + 1);
            Observation::Unobserve
        }));
        reg.set("app.n", json!(1), None).unwrap();
        reg.set("app.n", json!(2), None).unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn regex_and_predicate_tests() {
        let reg = registry();
        reg.register("app", json!({"a": 0, "b": 0})).unwrap();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        reg.observe(
            Regex::new(r"^app\.a$").unwrap(),
            Rc::new(move |_, _| {
                c.set(c.get() + 1);
                Observation::Keep
            }),
        );
        let c2 = Rc::clone(&count);
        reg.observe(
            PathTest::Predicate(Rc::new(|p| p.ends_with(".b"))),
            Rc::new(move |_, _| {
                c2.set(c2.get() + 10);
                Observation::Keep
            }),
        );
        reg.set("app.a", json!(1), None).unwrap();
        reg.set("app.b", json!(1), None).unwrap();
        assert_eq!(count.get(), 11);
    }

    #[test]
    fn push_unshift_sort() {
        let reg = registry();
        reg.register("app", json!({"list": [2]})).unwrap();
        reg.push("app.list", json!(3)).unwrap();
        reg.unshift("app.list", json!(1)).unwrap();
        assert_eq!(reg.get("app.list", None).unwrap(), json!([1, 2, 3]));
        reg.sort("app.list", |a, b| {
            b.as_i64().unwrap_or(0).cmp(&a.as_i64().unwrap_or(0))
        })
        .unwrap();
        assert_eq!(reg.get("app.list", None).unwrap(), json!([3, 2, 1]));
    }

    #[test]
    fn push_onto_non_array_reports_type() {
        let reg = registry();
        reg.register("app", json!({"n": 7})).unwrap();
        let err = reg.push("app.n", json!(1)).unwrap_err();
        assert!(err.to_string().starts_with("WEFT-011"));
        assert!(err.to_string().contains("number"));
    }

    #[test]
    fn remove_notifies_and_deletes() {
        let reg = registry();
        reg.register("app", json!({"a": 1, "b": 2})).unwrap();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        reg.observe("app", Rc::new(move |_, _| {
            c.set(c.get() + 1);
            Observation::Keep
        }));
        reg.remove("app.a").unwrap();
        assert_eq!(reg.get("app.a", None).unwrap(), Value::Null);
        assert_eq!(count.get(), 1);
        reg.remove("app").unwrap();
        assert!(!reg.is_registered("app"));
    }

    #[test]
    fn type_violation_is_advisory() {
        let reg = registry();
        reg.register("app", json!({"count": 1})).unwrap();
        reg.register_example("app", json!({"count": 0}));
        let issues = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&issues);
        reg.set_check_handler(Rc::new(move |root, found| {
            sink.borrow_mut().push((root.to_string(), found.len()));
        }));

        // Structurally invalid, but the mutation still lands.
        reg.set("app.count", json!("not a number"), None).unwrap();
        assert_eq!(reg.get("app.count", None).unwrap(), json!("not a number"));
        assert_eq!(issues.borrow().len(), 1);
        assert_eq!(issues.borrow()[0].0, "app");
    }

    #[test]
    fn stamp_auto_ids_is_stable() {
        let reg = registry();
        reg.register("app", json!({"rows": [{"v": 1}, {"v": 2}]}))
            .unwrap();
        reg.stamp_auto_ids("app.rows").unwrap();
        let first = reg.get("app.rows[0]._auto_", None).unwrap();
        assert!(first.is_number());
        // A second pass must not reassign.
        reg.stamp_auto_ids("app.rows").unwrap();
        assert_eq!(reg.get("app.rows[0]._auto_", None).unwrap(), first);
    }
}
