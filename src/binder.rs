//! Binding attribute parser and element binder
//!
//! `data-bind` attributes are parsed once and cached - the same attribute
//! string appears on every instance a list stamps out, so the parse cache
//! pays for itself immediately. Grammar:
//!
//! ```text
//! data-bind="text=app.title"
//! data-bind="value=app.query;class(busy)=app.loading"
//! data-bind="text=${app.first} ${app.last}"
//! data-event="click:app.save;keydown(Enter),keyup(Enter):app.go"
//! ```
//!
//! Rules are separated by `;` or newline. Each rule is a comma-separated
//! target list, `=`, then a path expression (plain, multi-path, computed,
//! or a `${...}` interpolation template).

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::warn;

use crate::dom::{Element, Event, BIND_ATTR, LIST_ATTR};
use crate::error::WeftError;
use crate::registry::{self, Registry};
use crate::targets::{display, Target};

// ─────────────────────────────────────────────────────────────
// Parsed forms
// ─────────────────────────────────────────────────────────────

/// Right-hand side of a binding rule.
#[derive(Clone, Debug, PartialEq)]
pub enum BindExpr {
    /// A plain path expression (possibly multi-path or computed).
    Path(String),
    /// Text with embedded `${path}` references.
    Template(Vec<TplToken>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum TplToken {
    Literal(String),
    Path(String),
}

/// One `targets=expr` rule from a `data-bind` attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    pub targets: Vec<Target>,
    pub expr: BindExpr,
}

/// One `triggers:handler` rule from a `data-event` attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct EventRule {
    pub triggers: Vec<EventTrigger>,
    pub handler: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EventTrigger {
    pub kind: String,
    pub key: Option<String>,
}

impl EventRule {
    pub fn matches(&self, event: &Event) -> bool {
        self.triggers.iter().any(|t| {
            t.kind == event.kind
                && match &t.key {
                    Some(key) => event.key.as_deref() == Some(key),
                    None => true,
                }
        })
    }
}

// ─────────────────────────────────────────────────────────────
// Parse cache
// ─────────────────────────────────────────────────────────────

/// Attribute parser with caching.
pub struct BindingParser {
    bindings: DashMap<String, Arc<Vec<Rule>>>,
    events: DashMap<String, Arc<Vec<EventRule>>>,
}

impl Default for BindingParser {
    fn default() -> Self {
        Self::new()
    }
}

impl BindingParser {
    pub fn new() -> Self {
        Self {
            bindings: DashMap::new(),
            events: DashMap::new(),
        }
    }

    /// Parse a `data-bind` attribute (with caching).
    pub fn bindings(&self, attr: &str) -> Result<Arc<Vec<Rule>>, WeftError> {
        if let Some(cached) = self.bindings.get(attr) {
            return Ok(Arc::clone(&cached));
        }
        let mut rules = Vec::new();
        for raw in attr.split([';', '\n']) {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let (target_list, expr) =
                raw.split_once('=').ok_or_else(|| WeftError::BindingSyntax {
                    binding: raw.to_string(),
                })?;
            let mut targets = Vec::new();
            for token in target_list.split(',') {
                let token = token.trim();
                if token.is_empty() {
                    return Err(WeftError::BindingSyntax {
                        binding: raw.to_string(),
                    });
                }
                // An unknown name drops that target, not the whole rule.
                match Target::parse(token) {
                    Some(target) => targets.push(target),
                    None => warn!(name = token, "unknown binding target; skipped"),
                }
            }
            if targets.is_empty() {
                continue;
            }
            rules.push(Rule {
                targets,
                expr: parse_expr(expr.trim()),
            });
        }
        let rules = Arc::new(rules);
        self.bindings.insert(attr.to_string(), rules.clone());
        Ok(rules)
    }

    /// Parse a `data-event` attribute (with caching).
    pub fn events(&self, attr: &str) -> Result<Arc<Vec<EventRule>>, WeftError> {
        if let Some(cached) = self.events.get(attr) {
            return Ok(Arc::clone(&cached));
        }
        let mut rules = Vec::new();
        for raw in attr.split([';', '\n']) {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let (triggers, handler) =
                raw.split_once(':').ok_or_else(|| WeftError::EventSyntax {
                    spec: raw.to_string(),
                })?;
            let handler = handler.trim();
            if handler.is_empty() {
                return Err(WeftError::EventSyntax {
                    spec: raw.to_string(),
                });
            }
            let triggers = triggers
                .split(',')
                .map(|t| parse_trigger(t.trim(), raw))
                .collect::<Result<Vec<_>, _>>()?;
            rules.push(EventRule {
                triggers,
                handler: handler.to_string(),
            });
        }
        let rules = Arc::new(rules);
        self.events.insert(attr.to_string(), rules.clone());
        Ok(rules)
    }
}

fn parse_trigger(token: &str, rule: &str) -> Result<EventTrigger, WeftError> {
    if token.is_empty() {
        return Err(WeftError::EventSyntax {
            spec: rule.to_string(),
        });
    }
    match token.find('(') {
        Some(open) if token.ends_with(')') => Ok(EventTrigger {
            kind: token[..open].to_string(),
            key: Some(token[open + 1..token.len() - 1].to_string()),
        }),
        _ => Ok(EventTrigger {
            kind: token.to_string(),
            key: None,
        }),
    }
}

/// Classify an expression: a `${...}` anywhere makes it a template.
/// Placeholders nest (`${app.${app.key}}`); each `${` pairs with its
/// matching close brace, and the inner text stays in the token to be
/// resolved inside-out at evaluation time.
fn parse_expr(expr: &str) -> BindExpr {
    if !expr.contains("${") {
        return BindExpr::Path(expr.to_string());
    }
    let bytes = expr.as_bytes();
    let mut tokens = Vec::new();
    let mut lit_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' || bytes.get(i + 1) != Some(&b'{') {
            i += 1;
            continue;
        }
        let mut depth = 1usize;
        let mut j = i + 2;
        while j < bytes.len() && depth > 0 {
            if bytes[j] == b'$' && bytes.get(j + 1) == Some(&b'{') {
                depth += 1;
                j += 2;
            } else {
                if bytes[j] == b'}' {
                    depth -= 1;
                }
                j += 1;
            }
        }
        if depth > 0 {
            // Unterminated placeholder: the rest is literal text.
            break;
        }
        if i > lit_start {
            tokens.push(TplToken::Literal(expr[lit_start..i].to_string()));
        }
        tokens.push(TplToken::Path(expr[i + 2..j - 1].to_string()));
        lit_start = j;
        i = j;
    }
    if lit_start < expr.len() {
        tokens.push(TplToken::Literal(expr[lit_start..].to_string()));
    }
    BindExpr::Template(tokens)
}

/// The placeholder path texts of a template expression (outer level only;
/// nested placeholders stay embedded in their outer text).
pub fn template_paths(expr: &str) -> Vec<String> {
    match parse_expr(expr) {
        BindExpr::Template(tokens) => tokens
            .into_iter()
            .filter_map(|t| match t {
                TplToken::Path(p) => Some(p),
                TplToken::Literal(_) => None,
            })
            .collect(),
        BindExpr::Path(_) => Vec::new(),
    }
}

/// Global parser instance.
pub static BINDING_PARSER: Lazy<BindingParser> = Lazy::new(BindingParser::new);

pub fn parse_bindings(attr: &str) -> Result<Arc<Vec<Rule>>, WeftError> {
    BINDING_PARSER.bindings(attr)
}

pub fn parse_events(attr: &str) -> Result<Arc<Vec<EventRule>>, WeftError> {
    BINDING_PARSER.events(attr)
}

// ─────────────────────────────────────────────────────────────
// Evaluation and application
// ─────────────────────────────────────────────────────────────

/// Targets that cannot be applied as plain DOM writes dispatch through the
/// runtime context (method table, component data).
pub trait BindHost {
    fn call_bound_method(&self, path: &str, element: &Element, value: &Value);
    fn set_component_prop(&self, element: &Element, prop: &str, value: &Value);
}

/// A host that logs and drops runtime-dispatched targets. Useful where no
/// method table exists (detached binding, tests).
pub struct NullHost;

impl BindHost for NullHost {
    fn call_bound_method(&self, path: &str, _element: &Element, _value: &Value) {
        warn!(path, "no method table; method target dropped");
    }

    fn set_component_prop(&self, _element: &Element, prop: &str, _value: &Value) {
        warn!(prop, "no component host; component target dropped");
    }
}

/// Evaluate a binding expression against the registry.
pub fn evaluate(
    registry: &Registry,
    expr: &BindExpr,
    context: Option<&Element>,
) -> Result<Value, WeftError> {
    match expr {
        BindExpr::Path(path) => registry.get(path, context),
        BindExpr::Template(tokens) => {
            let mut out = String::new();
            for token in tokens {
                match token {
                    TplToken::Literal(text) => out.push_str(text),
                    TplToken::Path(path) => {
                        let path = interpolated_path(registry, path, context)?;
                        out.push_str(&display(&registry.get(&path, context)?));
                    }
                }
            }
            Ok(Value::String(out))
        }
    }
}

/// Resolve nested placeholders in a path text, innermost first, yielding
/// the effective path to look up.
fn interpolated_path(
    registry: &Registry,
    text: &str,
    context: Option<&Element>,
) -> Result<String, WeftError> {
    if !text.contains("${") {
        return Ok(text.to_string());
    }
    match evaluate(registry, &parse_expr(text), context)? {
        Value::String(path) => Ok(path),
        other => Ok(display(&other)),
    }
}

/// Is this element inside a list template that has not been stamped out yet?
/// Such subtrees are skipped by every binding pass; the reconciler binds the
/// instances it creates instead.
pub fn in_unready_subtree(element: &Element) -> bool {
    let mut cursor = element.parent();
    while let Some(ancestor) = cursor {
        if ancestor.has_attr(LIST_ATTR) {
            return true;
        }
        cursor = ancestor.parent();
    }
    false
}

/// Apply every to-binding on one element. Errors in individual rules are
/// logged and skipped so one bad binding cannot take down a render pass.
pub fn bind_element(registry: &Registry, element: &Element, host: &dyn BindHost) {
    let Some(attr) = element.attr(BIND_ATTR) else {
        return;
    };
    let rules = match parse_bindings(&attr) {
        Ok(rules) => rules,
        Err(err) => {
            warn!(%err, %attr, "unparseable data-bind attribute");
            return;
        }
    };
    for rule in rules.iter() {
        let value = match evaluate(registry, &rule.expr, Some(element)) {
            Ok(value) => value,
            Err(err) => {
                warn!(%err, ?rule.expr, "binding expression failed");
                continue;
            }
        };
        for target in &rule.targets {
            apply_target(element, target, &rule.expr, &value, host);
        }
    }
}

fn apply_target(
    element: &Element,
    target: &Target,
    expr: &BindExpr,
    value: &Value,
    host: &dyn BindHost,
) {
    // Primitives short-circuit on the per-element cache; structured values
    // are cheap to compare incorrectly and always reapply. The key carries
    // the expression so two rules sharing a target kind on one element do
    // not evict each other.
    let cache_key = format!("{target}={expr}");
    let primitive = !matches!(value, Value::Array(_) | Value::Object(_));
    if primitive && element.bound_value(&cache_key).as_ref() == Some(value) {
        return;
    }
    match target {
        Target::Method(path) => host.call_bound_method(path, element, value),
        Target::Component(prop) => host.set_component_prop(element, prop, value),
        dom_target => dom_target.apply(element, value),
    }
    if primitive {
        element.set_bound_value(&cache_key, value.clone());
    }
}

/// Read input-side values back out of an element: one `(absolute path,
/// value)` pair per rule that has a from-capable target and a settable
/// (plain, single, non-computed) path.
pub fn extract_from(element: &Element) -> Vec<(String, Value)> {
    let Some(attr) = element.attr(BIND_ATTR) else {
        return Vec::new();
    };
    let Ok(rules) = parse_bindings(&attr) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for rule in rules.iter() {
        let BindExpr::Path(path) = &rule.expr else {
            continue;
        };
        if crate::path::split_paths(path).len() > 1 || crate::path::split_computed(path).is_some()
        {
            continue;
        }
        let Some(target) = rule.targets.iter().find(|t| t.is_from_capable()) else {
            continue;
        };
        let Some(value) = target.extract(element) else {
            continue;
        };
        match registry::resolve(path, Some(element)) {
            Ok(abs) => out.push((abs, value)),
            Err(err) => warn!(%err, path, "from-binding path did not resolve"),
        }
    }
    out
}

/// Absolute paths this element writes back through from-targets. The flush
/// pass uses these to avoid clobbering the element the user is typing into.
pub fn from_paths(element: &Element) -> Vec<String> {
    let Some(attr) = element.attr(BIND_ATTR) else {
        return Vec::new();
    };
    let Ok(rules) = parse_bindings(&attr) else {
        return Vec::new();
    };
    rules
        .iter()
        .filter(|rule| rule.targets.iter().any(Target::is_from_capable))
        .filter_map(|rule| match &rule.expr {
            BindExpr::Path(path) => registry::resolve(path, Some(element)).ok(),
            BindExpr::Template(_) => None,
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────
// Serialization (used when list instances rewrite contextual paths)
// ─────────────────────────────────────────────────────────────

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Value => write!(f, "value"),
            Target::Text => write!(f, "text"),
            Target::Checked => write!(f, "checked"),
            Target::Selected => write!(f, "selected"),
            Target::Attr(key) => write!(f, "attr({key})"),
            Target::Prop(key) => write!(f, "prop({key})"),
            Target::Style(key) => write!(f, "style({key})"),
            Target::Class { on, off: None } => write!(f, "class({on})"),
            Target::Class {
                on,
                off: Some(off),
            } => write!(f, "class({on}|{off})"),
            Target::ClassMap { map, default } => {
                write!(f, "class_map(")?;
                let mut first = true;
                for (value, class) in map {
                    if !first {
                        write!(f, "|")?;
                    }
                    write!(f, "{value}:{class}")?;
                    first = false;
                }
                if let Some(default) = default {
                    if !first {
                        write!(f, "|")?;
                    }
                    write!(f, "{default}")?;
                }
                write!(f, ")")
            }
            Target::ShowIf(key) => write_optional(f, "show_if", key),
            Target::HideIf(key) => write_optional(f, "hide_if", key),
            Target::EnabledIf(key) => write_optional(f, "enabled_if", key),
            Target::DisabledIf(key) => write_optional(f, "disabled_if", key),
            Target::Method(path) => write!(f, "method({path})"),
            Target::Component(prop) => write!(f, "component({prop})"),
            Target::Json => write!(f, "json"),
        }
    }
}

fn write_optional(
    f: &mut std::fmt::Formatter<'_>,
    name: &str,
    key: &Option<String>,
) -> std::fmt::Result {
    match key {
        Some(key) => write!(f, "{name}({key})"),
        None => write!(f, "{name}"),
    }
}

impl std::fmt::Display for BindExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindExpr::Path(path) => write!(f, "{path}"),
            BindExpr::Template(tokens) => {
                for token in tokens {
                    match token {
                        TplToken::Literal(text) => write!(f, "{text}")?,
                        TplToken::Path(path) => write!(f, "${{{path}}}")?,
                    }
                }
                Ok(())
            }
        }
    }
}

/// Rewrite contextual paths in a `data-bind` attribute when a list instance
/// is stamped: leading `.` becomes the instance path, and `_component_`
/// pins to the owning component's id when one is known. Other paths pass
/// through.
pub fn rewrite_instance_bindings(
    attr: &str,
    instance_path: &str,
    component_id: Option<&str>,
) -> String {
    let Ok(rules) = parse_bindings(attr) else {
        return attr.to_string();
    };
    let rewritten: Vec<String> = rules
        .iter()
        .map(|rule| {
            let targets = rule
                .targets
                .iter()
                .map(Target::to_string)
                .collect::<Vec<_>>()
                .join(",");
            let expr = match &rule.expr {
                BindExpr::Path(path) => rewrite_path_expr(path, instance_path, component_id),
                BindExpr::Template(tokens) => tokens
                    .iter()
                    .map(|token| match token {
                        TplToken::Literal(text) => text.clone(),
                        TplToken::Path(path) => {
                            format!("${{{}}}", rewrite_path_expr(path, instance_path, component_id))
                        }
                    })
                    .collect(),
            };
            format!("{targets}={expr}")
        })
        .collect();
    rewritten.join(";")
}

/// Rewrite each path in a (possibly multi-path or computed) expression.
fn rewrite_path_expr(expr: &str, instance_path: &str, component_id: Option<&str>) -> String {
    if let Some((method, args)) = crate::path::split_computed(expr) {
        let args = args
            .iter()
            .map(|a| rewrite_path_expr(a, instance_path, component_id))
            .collect::<Vec<_>>()
            .join(",");
        return format!("{}({args})", rewrite_one(method, instance_path, component_id));
    }
    crate::path::split_paths(expr)
        .iter()
        .map(|p| rewrite_one(p, instance_path, component_id))
        .collect::<Vec<_>>()
        .join(",")
}

fn rewrite_one(path: &str, instance_path: &str, component_id: Option<&str>) -> String {
    let path = path.trim();
    if let Some(rest) = path.strip_prefix('.') {
        if rest.is_empty() {
            instance_path.to_string()
        } else if rest.starts_with('[') {
            format!("{instance_path}{rest}")
        } else {
            format!("{instance_path}.{rest}")
        }
    } else if let (Some(rest), Some(id)) =
        (path.strip_prefix(crate::path::COMPONENT_TOKEN), component_id)
    {
        format!("{id}{rest}")
    } else {
        path.to_string()
    }
}
