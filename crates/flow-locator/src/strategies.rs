//! Per-kind resolution strategies.

use async_trait::async_trait;
use pageflow_core_types::SelectorKind;
use tracing::debug;

use crate::errors::LocatorError;
use crate::probe::{ElementHandle, PageProbe};

/// One way of turning a selector value into a live element.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn kind(&self) -> SelectorKind;

    async fn resolve(
        &self,
        probe: &dyn PageProbe,
        value: &str,
    ) -> Result<Option<ElementHandle>, LocatorError>;
}

/// Direct CSS query. Also serves attribute candidates, whose values are
/// already attribute selectors.
pub struct CssStrategy;

#[async_trait]
impl Strategy for CssStrategy {
    fn kind(&self) -> SelectorKind {
        SelectorKind::Css
    }

    async fn resolve(
        &self,
        probe: &dyn PageProbe,
        value: &str,
    ) -> Result<Option<ElementHandle>, LocatorError> {
        probe.query_css(value).await
    }
}

/// ARIA candidates are attempted as CSS first; a bare accessible name falls
/// back to an `aria-label` attribute selector.
pub struct AriaStrategy;

#[async_trait]
impl Strategy for AriaStrategy {
    fn kind(&self) -> SelectorKind {
        SelectorKind::Aria
    }

    async fn resolve(
        &self,
        probe: &dyn PageProbe,
        value: &str,
    ) -> Result<Option<ElementHandle>, LocatorError> {
        if looks_like_selector(value) {
            if let Some(handle) = probe.query_css(value).await? {
                return Ok(Some(handle));
            }
        }

        let label_selector = format!("[aria-label=\"{}\"]", value.replace('"', "\\\""));
        debug!("aria candidate falling back to {}", label_selector);
        probe.query_css(&label_selector).await
    }
}

/// Visible-text containment search.
pub struct TextStrategy;

#[async_trait]
impl Strategy for TextStrategy {
    fn kind(&self) -> SelectorKind {
        SelectorKind::Text
    }

    async fn resolve(
        &self,
        probe: &dyn PageProbe,
        value: &str,
    ) -> Result<Option<ElementHandle>, LocatorError> {
        probe.find_by_text(value).await
    }
}

/// XPath evaluation via the page's expression engine.
pub struct XpathStrategy;

#[async_trait]
impl Strategy for XpathStrategy {
    fn kind(&self) -> SelectorKind {
        SelectorKind::Xpath
    }

    async fn resolve(
        &self,
        probe: &dyn PageProbe,
        value: &str,
    ) -> Result<Option<ElementHandle>, LocatorError> {
        probe.query_xpath(value).await
    }
}

/// Heuristic: does an aria candidate value already look like a selector
/// rather than a bare accessible name?
fn looks_like_selector(value: &str) -> bool {
    value.starts_with('[')
        || value.starts_with('#')
        || value.starts_with('.')
        || value.contains('>')
}
