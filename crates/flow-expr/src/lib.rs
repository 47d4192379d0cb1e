//! Sandboxed expression evaluation for flow conditions.
//!
//! Conditions read the variable store and nothing else: no host access, no
//! engine internals, no side effects. The same resolver powers `{{var}}`
//! template interpolation for string step parameters.

pub mod errors;
pub mod expr;
pub mod template;

pub use errors::ExprError;
pub use expr::{eval_bool, parse, truthy, Expr};
pub use template::interpolate;

use serde_json::Value;

/// Variable lookup used by evaluation and interpolation. Dotted paths
/// (`user.name`) traverse JSON objects.
pub type Resolver<'a> = &'a dyn Fn(&str) -> Option<Value>;
