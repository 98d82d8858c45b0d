//! Path grammar for registry addressing (v0.1)
//!
//! Supports:
//! - app.a.b.c (dot notation)
//! - app.list[0].b (array index)
//! - app.list[id=17].name (id-path: element whose `id` stringifies to "17")
//! - app.obj[=key] (object own-key identity, synthesized by list binding)
//! - method(path1,path2) (computed expression, split but not evaluated here)
//!
//! Does NOT support:
//! - Wildcards or slices
//! - Commas inside a single path (commas separate multiple paths)

use serde_json::Value;

use crate::error::WeftError;

/// A parsed path segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object field access: .field
    Key(String),
    /// Array index access: [0]
    Index(usize),
    /// Id-path access: [key=value] - key may itself be a dotted path
    IdMatch { key: String, value: String },
    /// Object own-key access: [=key] (plain-object list instances)
    ObjKey(String),
}

/// Special path tokens resolved against DOM ancestry before parsing.
pub const COMPONENT_TOKEN: &str = "_component_";
pub const DATA_TOKEN: &str = "_data_";
/// Id-path token requesting lazily stamped unique ids.
pub const AUTO_ID: &str = "_auto_";

/// Parse a path string into segments
///
/// Examples:
/// - "app.price.currency" → [Key("app"), Key("price"), Key("currency")]
/// - "app.items[0].name" → [Key("app"), Key("items"), Index(0), Key("name")]
/// - "app.items[id=3]" → [Key("app"), Key("items"), IdMatch{key: "id", value: "3"}]
pub fn parse(path: &str) -> Result<Vec<Segment>, WeftError> {
    let syntax = || WeftError::PathSyntax {
        path: path.to_string(),
    };

    if path.is_empty() {
        return Err(syntax());
    }

    let mut segments = Vec::new();
    let mut chars = path.char_indices().peekable();
    let mut key_start = 0;
    let mut expect_key = true;

    while let Some((i, ch)) = chars.next() {
        match ch {
            '.' => {
                if i > key_start {
                    segments.push(Segment::Key(path[key_start..i].to_string()));
                } else if expect_key {
                    // Empty segment ("a..b" or leading dot on an absolute path)
                    return Err(syntax());
                }
                key_start = i + 1;
                expect_key = true;
            }
            '[' => {
                if i > key_start {
                    segments.push(Segment::Key(path[key_start..i].to_string()));
                }
                let close = path[i..].find(']').ok_or_else(syntax)? + i;
                let clause = &path[i + 1..close];
                segments.push(parse_clause(clause).ok_or_else(syntax)?);
                // Consume up to and including ']'
                while let Some((j, _)) = chars.peek() {
                    if *j > close {
                        break;
                    }
                    chars.next();
                }
                key_start = close + 1;
                expect_key = false;
            }
            ']' => return Err(syntax()),
            ',' => return Err(syntax()),
            _ => {}
        }
    }

    if key_start < path.len() {
        segments.push(Segment::Key(path[key_start..].to_string()));
    } else if expect_key && !path.ends_with(']') {
        // Trailing dot
        return Err(syntax());
    }

    if segments.is_empty() {
        return Err(syntax());
    }
    Ok(segments)
}

fn parse_clause(clause: &str) -> Option<Segment> {
    if clause.is_empty() {
        return None;
    }
    if let Ok(index) = clause.parse::<usize>() {
        return Some(Segment::Index(index));
    }
    if let Some(key) = clause.strip_prefix('=') {
        if key.is_empty() {
            return None;
        }
        return Some(Segment::ObjKey(key.to_string()));
    }
    let (key, value) = clause.split_once('=')?;
    if key.is_empty() {
        return None;
    }
    Some(Segment::IdMatch {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Split a comma-separated multi-path expression at top level
/// (commas inside brackets or parentheses do not split).
pub fn split_paths(expr: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in expr.char_indices() {
        match ch {
            '[' | '(' => depth += 1,
            ']' | ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                out.push(expr[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(expr[start..].trim());
    out
}

/// Split a computed expression "method.path(arg1,arg2)" into the method path
/// and its argument paths. Returns None for plain paths.
pub fn split_computed(expr: &str) -> Option<(&str, Vec<&str>)> {
    if !expr.ends_with(')') {
        return None;
    }
    let open = expr.find('(')?;
    let method = &expr[..open];
    let inner = &expr[open + 1..expr.len() - 1];
    let args = if inner.trim().is_empty() {
        Vec::new()
    } else {
        split_paths(inner)
    };
    Some((method, args))
}

/// Whether a path needs DOM-ancestry resolution before it is absolute.
pub fn is_contextual(path: &str) -> bool {
    path.starts_with('.') || path.starts_with(COMPONENT_TOKEN) || path.starts_with(DATA_TOKEN)
}

/// Root registry name of an absolute path.
pub fn root_name(path: &str) -> &str {
    let end = path
        .find(|c| c == '.' || c == '[')
        .unwrap_or(path.len());
    &path[..end]
}

/// Segment-boundary prefix test: true if `prefix` addresses `path` or an
/// ancestor of it ("app.list" covers "app.list[id=3].name" but not
/// "app.listing").
pub fn is_path_prefix(prefix: &str, path: &str) -> bool {
    if !path.starts_with(prefix) {
        return false;
    }
    match path.as_bytes().get(prefix.len()) {
        None => true,
        Some(b'.') | Some(b'[') => true,
        _ => false,
    }
}

/// True when either path covers the other (the coalescing/notification test).
pub fn paths_overlap(a: &str, b: &str) -> bool {
    is_path_prefix(a, b) || is_path_prefix(b, a)
}

/// Stringify an id value the way id-path clauses compare it.
pub fn stringify_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
