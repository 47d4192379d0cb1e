//! Resolution result types.

use pageflow_core_types::SelectorKind;
use serde::{Deserialize, Serialize};

use crate::probe::ElementHandle;

/// Which path produced the winning element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolvedVia {
    /// The recorded ephemeral reference was still live.
    Ephemeral,

    /// A selector candidate of this kind matched.
    Candidate(SelectorKind),
}

impl ResolvedVia {
    pub fn name(&self) -> &'static str {
        match self {
            ResolvedVia::Ephemeral => "ephemeral",
            ResolvedVia::Candidate(kind) => kind.name(),
        }
    }
}

/// Outcome of resolving a target locator.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub handle: ElementHandle,
    pub via: ResolvedVia,

    /// Set when the winning strategy differs from the first-priority
    /// candidate's kind. Diagnostic signal, not a failure.
    pub fallback_used: Option<String>,
}

impl Resolution {
    pub fn new(handle: ElementHandle, via: ResolvedVia) -> Self {
        Self {
            handle,
            via,
            fallback_used: None,
        }
    }

    pub fn with_fallback(mut self, strategy: impl Into<String>) -> Self {
        self.fallback_used = Some(strategy.into());
        self
    }
}
