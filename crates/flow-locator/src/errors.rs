//! Locator error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LocatorError {
    /// Every strategy was exhausted without a live element.
    #[error("element not found: {0}")]
    NotFound(String),

    /// The page probe itself failed (transport, page gone).
    #[error("page probe error: {0}")]
    Probe(String),
}
