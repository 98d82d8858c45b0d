//! Runtime context
//!
//! `Weft` owns the registry, the update scheduler, and the document root,
//! and wires them together: every registry touch queues a coalesced update,
//! and a flush walks the document applying list reconciliation first and
//! element bindings second. Flushing is host-driven - call `render_frame`
//! from the render loop, or `poll` with a clock to honor the fallback
//! deadline.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use crate::binder::{self, BindHost};
use crate::component::Components;
use crate::dom::{Element, Event, BIND_ATTR, COMPONENT_ID_ATTR, EVENT_ATTR, LIST_ATTR};
use crate::error::WeftError;
use crate::list::{self, ListSpec};
use crate::path;
use crate::registry::{self, Observation, PathTest, Registry};
use crate::scheduler::{Change, UpdateRecord, UpdateScheduler};

/// An event handler: `data-event="click:app.save"` dispatches here.
pub type HandlerFn = Rc<dyn Fn(&Event, &Weft)>;

/// A DOM method: `data-bind="method(app.paint)=..."` dispatches here.
pub type MethodFn = Rc<dyn Fn(&Element, &Value)>;

pub struct Weft {
    registry: Rc<Registry>,
    scheduler: Rc<UpdateScheduler>,
    components: Components,
    document: Element,
    handlers: RefCell<HashMap<String, HandlerFn>>,
    methods: RefCell<HashMap<String, MethodFn>>,
}

impl Weft {
    /// Build a runtime over a document root. Registry changes from any
    /// source (API calls, event handlers, from-bindings) queue updates.
    pub fn new(document: Element) -> Self {
        let registry = Rc::new(Registry::new());
        let scheduler = Rc::new(UpdateScheduler::new());
        let queue = Rc::clone(&scheduler);
        registry.observe(
            PathTest::Predicate(Rc::new(|_| true)),
            Rc::new(move |path, source| {
                queue.enqueue(Change::Path(path.to_string()), source);
                Observation::Keep
            }),
        );
        Self {
            registry,
            scheduler,
            components: Components::new(),
            document,
            handlers: RefCell::new(HashMap::new()),
            methods: RefCell::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn document(&self) -> &Element {
        &self.document
    }

    // ─────────────────────────────────────────────────────────────
    // Data facade
    // ─────────────────────────────────────────────────────────────

    pub fn register(&self, name: &str, value: Value) -> Result<(), WeftError> {
        self.registry.register(name, value)
    }

    pub fn get(&self, path: &str) -> Result<Value, WeftError> {
        self.registry.get(path, None)
    }

    pub fn set(&self, path: &str, value: Value) -> Result<(), WeftError> {
        self.registry.set(path, value, None)
    }

    pub fn touch(&self, path: &str) {
        self.registry.touch(path, None);
    }

    pub fn push(&self, path: &str, value: Value) -> Result<(), WeftError> {
        self.registry.push(path, value)
    }

    pub fn remove(&self, path: &str) -> Result<(), WeftError> {
        self.registry.remove(path)
    }

    // ─────────────────────────────────────────────────────────────
    // Capability tables
    // ─────────────────────────────────────────────────────────────

    pub fn register_handler(&self, path: &str, handler: HandlerFn) {
        self.handlers.borrow_mut().insert(path.to_string(), handler);
    }

    pub fn register_method(&self, path: &str, method: MethodFn) {
        self.methods.borrow_mut().insert(path.to_string(), method);
    }

    pub fn register_compute(&self, path: &str, compute: crate::registry::ComputeFn) {
        self.registry.register_compute(path, compute);
    }

    // ─────────────────────────────────────────────────────────────
    // Components
    // ─────────────────────────────────────────────────────────────

    /// Attach a component instance and queue its subtree for binding.
    pub fn attach_component(
        &self,
        name: &str,
        element: &Element,
        data: Value,
    ) -> Result<String, WeftError> {
        let id = self.components.attach(&self.registry, name, element, data)?;
        self.scheduler
            .enqueue(Change::Subtree(element.clone()), None);
        Ok(id)
    }

    /// Drop registry state for components no longer in the document.
    pub fn collect_components(&self) -> usize {
        self.components.collect(&self.registry, &self.document)
    }

    // ─────────────────────────────────────────────────────────────
    // Binding and flushing
    // ─────────────────────────────────────────────────────────────

    /// Queue a whole subtree for (re)binding - the entry point after
    /// building or grafting DOM.
    pub fn bind_all(&self, element: &Element) {
        self.scheduler
            .enqueue(Change::Subtree(element.clone()), None);
    }

    /// Run a callback once the queue is idle (immediately when it already is).
    pub fn after_flush(&self, callback: impl FnOnce() + 'static) {
        self.scheduler.after_flush(callback);
    }

    /// Flush every pending update now. Updates queued during the flush are
    /// processed in the same frame, so the DOM is settled when this returns.
    pub fn render_frame(&self) {
        if !self.scheduler.begin_flush() {
            return;
        }
        loop {
            let batch = self.scheduler.drain();
            if batch.is_empty() {
                break;
            }
            debug!(records = batch.len(), "flushing update batch");
            for record in &batch {
                self.apply_record(record);
            }
        }
        self.scheduler.end_flush();
        for callback in self.scheduler.take_after_callbacks() {
            callback();
        }
    }

    /// Flush when the pending frame's fallback deadline has passed.
    /// Returns true if a flush ran.
    pub fn poll(&self, now: Instant) -> bool {
        if self.scheduler.due(now) {
            self.render_frame();
            return true;
        }
        false
    }

    fn apply_record(&self, record: &UpdateRecord) {
        match &record.change {
            Change::Subtree(element) => self.bind_subtree(element),
            Change::Path(path) => self.apply_path_change(path, record.source.as_ref()),
        }
    }

    fn bind_subtree(&self, root: &Element) {
        for el in root.descendants() {
            if el.has_attr(LIST_ATTR) {
                self.reconcile_list(&el);
            } else if el.has_attr(BIND_ATTR) && !binder::in_unready_subtree(&el) {
                binder::bind_element(&self.registry, &el, self);
            }
        }
    }

    /// Re-render everything that depends on `path`: list templates first
    /// (they create or remove the very elements the binding pass visits),
    /// then bound elements. The element that sourced the change is skipped
    /// for paths it writes back, so typing is never clobbered mid-keystroke.
    fn apply_path_change(&self, path: &str, source: Option<&Element>) {
        let templates: Vec<Element> = self
            .document
            .descendants()
            .into_iter()
            .filter(|el| {
                el.has_attr(LIST_ATTR)
                    && !binder::in_unready_subtree(el)
                    && self.list_depends_on(el, path)
            })
            .collect();
        for template in &templates {
            self.reconcile_list(template);
        }
        // Fresh walk: reconciliation may have created or removed the very
        // elements this pass binds.
        for el in self.document.descendants() {
            if el.has_attr(LIST_ATTR)
                || !el.has_attr(BIND_ATTR)
                || binder::in_unready_subtree(&el)
                || !self.binding_depends_on(&el, path)
            {
                continue;
            }
            let echoes = source.is_some_and(|src| {
                src.ptr_eq(&el)
                    && binder::from_paths(&el)
                        .iter()
                        .any(|fp| path::paths_overlap(fp, path))
            });
            if !echoes {
                binder::bind_element(&self.registry, &el, self);
            }
        }
    }

    fn reconcile_list(&self, template: &Element) {
        match list::reconcile(&self.registry, template, self) {
            Ok(outcome) if outcome.changed() => {
                if let Some(parent) = template.parent() {
                    self.dispatch_event(&Event::new("change", &parent));
                }
            }
            Ok(_) => {}
            Err(err) => warn!(%err, "list reconcile failed"),
        }
    }

    fn list_depends_on(&self, template: &Element, path: &str) -> bool {
        let Some(attr) = template.attr(LIST_ATTR) else {
            return false;
        };
        let spec = ListSpec::parse(&attr);
        self.expr_paths(&spec.source, template)
            .iter()
            .any(|p| path::paths_overlap(p, path))
    }

    fn binding_depends_on(&self, element: &Element, path: &str) -> bool {
        let Some(attr) = element.attr(BIND_ATTR) else {
            return false;
        };
        let Ok(rules) = binder::parse_bindings(&attr) else {
            return false;
        };
        rules.iter().any(|rule| {
            let exprs: Vec<String> = match &rule.expr {
                binder::BindExpr::Path(expr) => vec![expr.clone()],
                binder::BindExpr::Template(tokens) => tokens
                    .iter()
                    .filter_map(|t| match t {
                        binder::TplToken::Path(p) => Some(p.clone()),
                        binder::TplToken::Literal(_) => None,
                    })
                    .collect(),
            };
            exprs.iter().any(|expr| {
                self.expr_paths(expr, element)
                    .iter()
                    .any(|p| path::paths_overlap(p, path))
            })
        })
    }

    /// The resolved data dependencies of one path expression. Computed
    /// expressions depend on their arguments, not the method itself.
    fn expr_paths(&self, expr: &str, context: &Element) -> Vec<String> {
        // A nested placeholder makes the tail dynamic: depend on the inner
        // paths plus, conservatively, the outer root.
        if expr.contains("${") {
            let mut deps: Vec<String> = binder::template_paths(expr)
                .iter()
                .flat_map(|inner| self.expr_paths(inner, context))
                .collect();
            deps.push(path::root_name(expr).to_string());
            return deps;
        }
        if let Some((_, args)) = path::split_computed(expr) {
            return args
                .iter()
                .flat_map(|arg| self.expr_paths(arg, context))
                .collect();
        }
        path::split_paths(expr)
            .iter()
            .filter_map(|p| registry::resolve(p, Some(context)).ok())
            .collect()
    }

    // ─────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────

    /// Dispatch an event: write from-bindings back for input-ish events,
    /// then bubble through `data-event` handlers. The first matching
    /// handler stops propagation.
    pub fn dispatch_event(&self, event: &Event) {
        if matches!(event.kind.as_str(), "input" | "change") {
            for el in event.target.bubble_chain() {
                for (abs, value) in binder::extract_from(&el) {
                    if let Err(err) = self.registry.set(&abs, value, Some(&el)) {
                        warn!(%err, path = %abs, "from-binding write failed");
                    }
                }
            }
        }
        for el in event.target.bubble_chain() {
            let Some(attr) = el.attr(EVENT_ATTR) else {
                continue;
            };
            let rules = match binder::parse_events(&attr) {
                Ok(rules) => rules,
                Err(err) => {
                    warn!(%err, %attr, "unparseable data-event attribute");
                    continue;
                }
            };
            if let Some(rule) = rules.iter().find(|rule| rule.matches(event)) {
                let handler_path = match registry::resolve(&rule.handler, Some(&el)) {
                    Ok(abs) => abs,
                    Err(err) => {
                        // Keep bubbling; one bad handler never blocks an
                        // ancestor's.
                        warn!(%err, handler = %rule.handler, "handler path did not resolve");
                        continue;
                    }
                };
                let handler = self.handlers.borrow().get(&handler_path).cloned();
                match handler {
                    Some(handler) => handler(event, self),
                    None => warn!(path = %handler_path, "no handler registered"),
                }
                return;
            }
        }
    }
}

impl BindHost for Weft {
    fn call_bound_method(&self, path: &str, element: &Element, value: &Value) {
        let resolved = match registry::resolve(path, Some(element)) {
            Ok(abs) => abs,
            Err(err) => {
                warn!(%err, path, "method path did not resolve");
                return;
            }
        };
        let method = self.methods.borrow().get(&resolved).cloned();
        match method {
            Some(method) => method(element, value),
            None => warn!(path = %resolved, "no method registered"),
        }
    }

    fn set_component_prop(&self, element: &Element, prop: &str, value: &Value) {
        let Some((_, id)) = element.closest_attr(COMPONENT_ID_ATTR) else {
            warn!(prop, "component target outside any component");
            return;
        };
        if let Err(err) = self
            .registry
            .set(&format!("{id}.{prop}"), value.clone(), Some(element))
        {
            warn!(%err, "component prop write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    fn runtime() -> (Weft, Element) {
        let document = Element::new("body");
        let weft = Weft::new(document.clone());
        (weft, document)
    }

    #[test]
    fn set_queues_and_frame_applies() {
        let (weft, doc) = runtime();
        weft.register("app", json!({"title": "before"})).unwrap();
        let h1 = Element::new("h1");
        h1.set_attr(BIND_ATTR, "text=app.title");
        doc.append_child(&h1);
        weft.bind_all(&doc);
        weft.render_frame();
        assert_eq!(h1.text(), "before");

        weft.set("app.title", json!("after")).unwrap();
        assert_eq!(h1.text(), "before", "no update until the frame");
        weft.render_frame();
        assert_eq!(h1.text(), "after");
    }

    #[test]
    fn multiple_sets_coalesce_into_one_frame() {
        let (weft, doc) = runtime();
        weft.register("app", json!({"n": 0})).unwrap();
        let el = Element::new("div");
        el.set_attr(BIND_ATTR, "text=app.n");
        doc.append_child(&el);
        weft.bind_all(&doc);
        weft.render_frame();

        weft.set("app.n", json!(1)).unwrap();
        weft.set("app.n", json!(2)).unwrap();
        weft.set("app.n", json!(3)).unwrap();
        weft.render_frame();
        assert_eq!(el.text(), "3");
    }

    #[test]
    fn unrelated_paths_leave_elements_alone() {
        let (weft, doc) = runtime();
        weft.register("app", json!({"a": "x", "b": "y"})).unwrap();
        let el = Element::new("div");
        el.set_attr(BIND_ATTR, "text=app.a");
        doc.append_child(&el);
        weft.bind_all(&doc);
        weft.render_frame();

        el.set_text("scribbled");
        weft.set("app.b", json!("z")).unwrap();
        weft.render_frame();
        assert_eq!(el.text(), "scribbled", "app.b must not re-render app.a");
    }

    #[test]
    fn input_event_writes_back_without_echo() {
        let (weft, doc) = runtime();
        weft.register("app", json!({"q": ""})).unwrap();
        let input = Element::new("input");
        input.set_attr(BIND_ATTR, "value=app.q");
        doc.append_child(&input);
        weft.bind_all(&doc);
        weft.render_frame();

        input.set_value(json!("hel"));
        weft.dispatch_event(&Event::new("input", &input));
        assert_eq!(weft.get("app.q").unwrap(), json!("hel"));

        // The echo guard: flushing the change the input itself sourced
        // must not write back into it.
        input.set_value(json!("hello"));
        weft.render_frame();
        assert_eq!(input.value(), json!("hello"));
    }

    #[test]
    fn event_bubbles_to_nearest_handler() {
        let (weft, doc) = runtime();
        weft.register("app", json!({})).unwrap();
        let outer = Element::new("div");
        outer.set_attr(EVENT_ATTR, "click:app.save");
        let button = Element::new("button");
        outer.append_child(&button);
        doc.append_child(&outer);

        let fired = Rc::new(Cell::new(false));
        let seen = Rc::clone(&fired);
        weft.register_handler("app.save", Rc::new(move |_, _| seen.set(true)));
        weft.dispatch_event(&Event::new("click", &button));
        assert!(fired.get());
    }

    #[test]
    fn unresolvable_handler_keeps_bubbling() {
        let (weft, doc) = runtime();
        weft.register("app", json!({})).unwrap();
        let outer = Element::new("div");
        outer.set_attr(EVENT_ATTR, "click:app.save");
        let inner = Element::new("span");
        // Relative handler with no list-instance ancestor cannot resolve.
        inner.set_attr(EVENT_ATTR, "click:.save");
        outer.append_child(&inner);
        doc.append_child(&outer);

        let fired = Rc::new(Cell::new(false));
        let seen = Rc::clone(&fired);
        weft.register_handler("app.save", Rc::new(move |_, _| seen.set(true)));
        weft.dispatch_event(&Event::new("click", &inner));
        assert!(fired.get(), "outer handler must still run");
    }

    #[test]
    fn list_change_fires_synthetic_change_event() {
        let (weft, doc) = runtime();
        weft.register("app", json!({"items": []})).unwrap();
        let ul = Element::new("ul");
        ul.set_attr(EVENT_ATTR, "change:app.on_change");
        let li = Element::new("li");
        li.set_attr(LIST_ATTR, "app.items:id");
        li.set_attr(BIND_ATTR, "text=.name");
        ul.append_child(&li);
        doc.append_child(&ul);

        let changes = Rc::new(Cell::new(0));
        let seen = Rc::clone(&changes);
        weft.register_handler(
            "app.on_change",
            Rc::new(move |_, _| seen.set(seen.get() + 1)),
        );
        weft.bind_all(&doc);
        weft.render_frame();
        assert_eq!(changes.get(), 0, "empty initial render changes nothing");

        weft.push("app.items", json!({"id": 1, "name": "a"})).unwrap();
        weft.render_frame();
        assert_eq!(changes.get(), 1);
        assert_eq!(ul.child_count(), 2);
    }

    #[test]
    fn method_target_dispatches_with_value() {
        let (weft, doc) = runtime();
        weft.register("app", json!({"data": [1, 2, 3]})).unwrap();
        let canvas = Element::new("canvas");
        canvas.set_attr(BIND_ATTR, "method(app.paint)=app.data");
        doc.append_child(&canvas);

        let painted = Rc::new(RefCell::new(Value::Null));
        let sink = Rc::clone(&painted);
        weft.register_method(
            "app.paint",
            Rc::new(move |_, value| *sink.borrow_mut() = value.clone()),
        );
        weft.bind_all(&doc);
        weft.render_frame();
        assert_eq!(*painted.borrow(), json!([1, 2, 3]));
    }

    #[test]
    fn component_state_is_private_and_contextual() {
        let (weft, doc) = runtime();
        let card = Element::new("div");
        let title = Element::new("h2");
        title.set_attr(BIND_ATTR, "text=_component_.title");
        card.append_child(&title);
        doc.append_child(&card);

        let id = weft
            .attach_component("card", &card, json!({"title": "hello"}))
            .unwrap();
        weft.render_frame();
        assert_eq!(title.text(), "hello");

        weft.set(&format!("{id}.title"), json!("bye")).unwrap();
        weft.render_frame();
        assert_eq!(title.text(), "bye");
    }

    #[test]
    fn poll_flushes_only_after_deadline() {
        let (weft, doc) = runtime();
        weft.register("app", json!({"n": 0})).unwrap();
        let el = Element::new("div");
        el.set_attr(BIND_ATTR, "text=app.n");
        doc.append_child(&el);
        weft.bind_all(&doc);
        weft.render_frame();

        weft.set("app.n", json!(1)).unwrap();
        let now = Instant::now();
        assert!(!weft.poll(now), "deadline not reached yet");
        assert!(weft.poll(now + crate::scheduler::FLUSH_FALLBACK));
        assert_eq!(el.text(), "1");
    }

    #[test]
    fn after_flush_runs_when_settled() {
        let (weft, _doc) = runtime();
        weft.register("app", json!({"n": 0})).unwrap();
        weft.set("app.n", json!(1)).unwrap();

        let ran = Rc::new(Cell::new(false));
        let seen = Rc::clone(&ran);
        weft.after_flush(move || seen.set(true));
        assert!(!ran.get(), "deferred while updates are pending");
        weft.render_frame();
        assert!(ran.get());
    }
}
