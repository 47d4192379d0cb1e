//! Target resolver with fallback chain orchestration.

use async_trait::async_trait;
use pageflow_core_types::{SelectorKind, TargetLocator};
use tracing::{debug, warn};

use crate::errors::LocatorError;
use crate::probe::{ElementHandle, PageProbe};
use crate::strategies::{AriaStrategy, CssStrategy, Strategy, TextStrategy, XpathStrategy};
use crate::types::{ResolvedVia, Resolution};

/// Resolves a target locator to a live element.
#[async_trait]
pub trait TargetResolver: Send + Sync {
    async fn resolve(
        &self,
        probe: &dyn PageProbe,
        locator: &TargetLocator,
    ) -> Result<Resolution, LocatorError>;
}

/// Default resolver: ephemeral reference first, then candidates in priority
/// order via their per-kind strategies.
pub struct DefaultTargetResolver {
    css: CssStrategy,
    aria: AriaStrategy,
    text: TextStrategy,
    xpath: XpathStrategy,
}

impl DefaultTargetResolver {
    pub fn new() -> Self {
        Self {
            css: CssStrategy,
            aria: AriaStrategy,
            text: TextStrategy,
            xpath: XpathStrategy,
        }
    }

    fn strategy_for(&self, kind: SelectorKind) -> &dyn Strategy {
        match kind {
            SelectorKind::Css | SelectorKind::Attribute => &self.css,
            SelectorKind::Aria => &self.aria,
            SelectorKind::Text => &self.text,
            SelectorKind::Xpath => &self.xpath,
        }
    }
}

impl Default for DefaultTargetResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TargetResolver for DefaultTargetResolver {
    async fn resolve(
        &self,
        probe: &dyn PageProbe,
        locator: &TargetLocator,
    ) -> Result<Resolution, LocatorError> {
        if locator.is_empty() {
            return Err(LocatorError::NotFound("empty target locator".to_string()));
        }

        // The recorded reference wins while it is still live.
        if let Some(ephemeral_ref) = &locator.ephemeral_ref {
            match probe.ref_alive(ephemeral_ref).await {
                Ok(true) => {
                    debug!("resolved via ephemeral ref {}", ephemeral_ref);
                    return Ok(Resolution::new(
                        ElementHandle::new(ephemeral_ref.clone()),
                        ResolvedVia::Ephemeral,
                    ));
                }
                Ok(false) => {
                    debug!("ephemeral ref {} is stale, trying candidates", ephemeral_ref);
                }
                Err(err) => {
                    warn!("ephemeral ref check failed: {}", err);
                }
            }
        }

        let candidates = locator.ordered_candidates();
        let first_kind = candidates.first().map(|c| c.kind);

        for candidate in &candidates {
            let strategy = self.strategy_for(candidate.kind);
            match strategy.resolve(probe, &candidate.value).await {
                Ok(Some(handle)) => {
                    debug!(
                        "resolved via {} candidate '{}'",
                        candidate.kind.name(),
                        candidate.value
                    );
                    let mut resolution =
                        Resolution::new(handle, ResolvedVia::Candidate(candidate.kind));
                    if first_kind.is_some_and(|k| k != candidate.kind) {
                        resolution = resolution.with_fallback(candidate.kind.name());
                    }
                    return Ok(resolution);
                }
                Ok(None) => {
                    debug!(
                        "{} candidate '{}' produced no element",
                        candidate.kind.name(),
                        candidate.value
                    );
                }
                Err(err) => {
                    warn!(
                        "{} candidate '{}' failed: {}",
                        candidate.kind.name(),
                        candidate.value,
                        err
                    );
                }
            }
        }

        Err(LocatorError::NotFound(locator.describe()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageflow_core_types::SelectorCandidate;
    use std::collections::HashMap;

    /// Probe backed by a static selector -> handle table.
    struct TableProbe {
        live_refs: Vec<String>,
        css: HashMap<String, String>,
        xpath: HashMap<String, String>,
        text: HashMap<String, String>,
    }

    impl TableProbe {
        fn empty() -> Self {
            Self {
                live_refs: Vec::new(),
                css: HashMap::new(),
                xpath: HashMap::new(),
                text: HashMap::new(),
            }
        }
    }

    #[async_trait]
    impl PageProbe for TableProbe {
        async fn ref_alive(&self, ephemeral_ref: &str) -> Result<bool, LocatorError> {
            Ok(self.live_refs.iter().any(|r| r == ephemeral_ref))
        }

        async fn query_css(&self, selector: &str) -> Result<Option<ElementHandle>, LocatorError> {
            Ok(self.css.get(selector).map(ElementHandle::new))
        }

        async fn query_xpath(
            &self,
            expression: &str,
        ) -> Result<Option<ElementHandle>, LocatorError> {
            Ok(self.xpath.get(expression).map(ElementHandle::new))
        }

        async fn find_by_text(&self, text: &str) -> Result<Option<ElementHandle>, LocatorError> {
            Ok(self.text.get(text).map(ElementHandle::new))
        }
    }

    fn locator_with(kinds: &[(SelectorKind, &str, i32)]) -> TargetLocator {
        let mut locator = TargetLocator::default();
        for (kind, value, priority) in kinds {
            locator = locator
                .with_candidate(SelectorCandidate::new(*kind, *value).with_priority(*priority));
        }
        locator
    }

    #[tokio::test]
    async fn ephemeral_ref_preferred_over_candidates() {
        let mut probe = TableProbe::empty();
        probe.live_refs.push("node-7".to_string());
        probe.css.insert("#btn".to_string(), "el-css".to_string());

        let locator =
            locator_with(&[(SelectorKind::Css, "#btn", 0)]).with_ref("node-7");

        let resolution = DefaultTargetResolver::new()
            .resolve(&probe, &locator)
            .await
            .unwrap();
        assert_eq!(resolution.via, ResolvedVia::Ephemeral);
        assert_eq!(resolution.handle.id, "node-7");
        assert!(resolution.fallback_used.is_none());
    }

    #[tokio::test]
    async fn stale_ref_falls_through_to_candidates() {
        let mut probe = TableProbe::empty();
        probe.css.insert("#btn".to_string(), "el-css".to_string());

        let locator =
            locator_with(&[(SelectorKind::Css, "#btn", 0)]).with_ref("node-gone");

        let resolution = DefaultTargetResolver::new()
            .resolve(&probe, &locator)
            .await
            .unwrap();
        assert_eq!(resolution.via, ResolvedVia::Candidate(SelectorKind::Css));
        assert_eq!(resolution.handle.id, "el-css");
        assert!(resolution.fallback_used.is_none());
    }

    #[tokio::test]
    async fn fallback_annotation_when_first_kind_misses() {
        let mut probe = TableProbe::empty();
        probe
            .text
            .insert("Submit order".to_string(), "el-text".to_string());

        let locator = locator_with(&[
            (SelectorKind::Css, "#missing", 0),
            (SelectorKind::Text, "Submit order", 1),
        ]);

        let resolution = DefaultTargetResolver::new()
            .resolve(&probe, &locator)
            .await
            .unwrap();
        assert_eq!(resolution.via, ResolvedVia::Candidate(SelectorKind::Text));
        assert_eq!(resolution.fallback_used.as_deref(), Some("text"));
    }

    #[tokio::test]
    async fn second_candidate_of_same_kind_is_not_a_fallback() {
        let mut probe = TableProbe::empty();
        probe.css.insert("#alt".to_string(), "el-2".to_string());

        let locator = locator_with(&[
            (SelectorKind::Css, "#primary", 0),
            (SelectorKind::Css, "#alt", 1),
        ]);

        let resolution = DefaultTargetResolver::new()
            .resolve(&probe, &locator)
            .await
            .unwrap();
        assert!(resolution.fallback_used.is_none());
    }

    #[tokio::test]
    async fn aria_bare_name_matches_aria_label_selector() {
        let mut probe = TableProbe::empty();
        probe.css.insert(
            "[aria-label=\"Close dialog\"]".to_string(),
            "el-aria".to_string(),
        );

        let locator = locator_with(&[(SelectorKind::Aria, "Close dialog", 0)]);

        let resolution = DefaultTargetResolver::new()
            .resolve(&probe, &locator)
            .await
            .unwrap();
        assert_eq!(resolution.handle.id, "el-aria");
    }

    #[tokio::test]
    async fn exhausted_candidates_not_found() {
        let probe = TableProbe::empty();
        let locator = locator_with(&[
            (SelectorKind::Css, "#a", 0),
            (SelectorKind::Xpath, "//div", 1),
        ]);

        let err = DefaultTargetResolver::new()
            .resolve(&probe, &locator)
            .await
            .unwrap_err();
        assert!(matches!(err, LocatorError::NotFound(_)));
    }

    #[tokio::test]
    async fn empty_locator_is_not_found() {
        let probe = TableProbe::empty();
        let err = DefaultTargetResolver::new()
            .resolve(&probe, &TargetLocator::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LocatorError::NotFound(_)));
    }
}
