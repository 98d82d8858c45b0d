//! Weft - path-addressed data binding for retained element trees

pub mod app;
pub mod binder;
pub mod component;
pub mod dom;
pub mod error;
pub mod list;
pub mod path;
pub mod registry;
pub mod scheduler;
pub mod targets;
pub mod typecheck;

pub use app::{HandlerFn, MethodFn, Weft};
pub use binder::{BindExpr, BindHost, EventRule, Rule};
pub use dom::{Element, Event};
pub use error::{FixSuggestion, WeftError};
pub use list::{ListSpec, ReconcileOutcome};
pub use registry::{Observation, PathTest, Registry};
pub use scheduler::{Change, UpdateScheduler};
pub use targets::Target;
