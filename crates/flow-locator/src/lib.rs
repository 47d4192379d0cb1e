//! Element resolution with fallback chain orchestration.
//!
//! A [`TargetLocator`](pageflow_core_types::TargetLocator) carries an
//! ephemeral reference captured at record time plus prioritized selector
//! candidates. Resolution tries the reference first, then each candidate in
//! priority order through the [`PageProbe`] collaborator, and reports which
//! strategy ultimately matched.

pub mod errors;
pub mod probe;
pub mod resolver;
pub mod strategies;
pub mod types;

pub use errors::LocatorError;
pub use probe::{ElementHandle, PageProbe};
pub use resolver::{DefaultTargetResolver, TargetResolver};
pub use types::{ResolvedVia, Resolution};
