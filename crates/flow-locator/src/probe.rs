//! Page probe boundary: how resolution queries the live page.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::LocatorError;

/// Opaque handle to a live, attached page element. The action executor
/// accepts the handle id for element-scoped actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    pub id: String,
}

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Element query surface implemented by the host. All queries return only
/// live, attached elements; a detached match is reported as `None`.
#[async_trait]
pub trait PageProbe: Send + Sync {
    /// Is the recorded ephemeral reference still valid on the page?
    async fn ref_alive(&self, ephemeral_ref: &str) -> Result<bool, LocatorError>;

    /// Direct CSS (or attribute selector) query.
    async fn query_css(&self, selector: &str) -> Result<Option<ElementHandle>, LocatorError>;

    /// XPath evaluation through the page's expression engine.
    async fn query_xpath(&self, expression: &str) -> Result<Option<ElementHandle>, LocatorError>;

    /// Visible-text containment search.
    async fn find_by_text(&self, text: &str) -> Result<Option<ElementHandle>, LocatorError>;
}
