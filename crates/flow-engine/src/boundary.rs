//! Collaborator boundaries: the action executor and the page event source.
//!
//! The engine never touches a browser directly. Actions go through
//! [`ActionExecutor::invoke`] as opaque named calls; wait policies observe
//! the page through a broadcast of [`PageEvent`] signals.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::errors::FlowError;

/// One payload block returned by an action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ActionContent {
    Text { text: String },
    Image { data: String, mime_type: String },
}

/// Result envelope of an action invocation.
#[derive(Debug, Clone, Default)]
pub struct ActionOutcome {
    pub content: Vec<ActionContent>,
    pub is_error: bool,
}

impl ActionOutcome {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ActionContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ActionContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// First text block, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|c| match c {
            ActionContent::Text { text } => Some(text.as_str()),
            ActionContent::Image { .. } => None,
        })
    }

    /// First image data block, if any.
    pub fn first_image(&self) -> Option<&str> {
        self.content.iter().find_map(|c| match c {
            ActionContent::Image { data, .. } => Some(data.as_str()),
            ActionContent::Text { .. } => None,
        })
    }

    /// Parse the first text block as a JSON envelope.
    pub fn json(&self) -> Option<Value> {
        self.first_text()
            .and_then(|text| serde_json::from_str(text).ok())
    }

    pub fn error_message(&self) -> String {
        self.first_text().unwrap_or("action failed").to_string()
    }
}

/// Opaque async boundary to the component that physically performs actions.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn invoke(&self, action: &str, args: Value) -> Result<ActionOutcome, FlowError>;
}

/// Page lifecycle signals consumed by the wait policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    NavigationStarted,
    NavigationCompleted,
    DomReady,
    NetworkActivity,
}

/// Source of page signals. Hosts publish; wait policies subscribe.
pub trait PageEvents: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<PageEvent>;
}

/// Simple in-memory event source suitable for hosts and tests.
pub struct PageEventBus {
    sender: broadcast::Sender<PageEvent>,
}

impl PageEventBus {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }

    /// Publish a signal. Lack of subscribers is not an error.
    pub fn publish(&self, event: PageEvent) {
        let _ = self.sender.send(event);
    }
}

impl PageEvents for PageEventBus {
    fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.sender.subscribe()
    }
}

/// Event source that never fires; waits always run out their window.
pub struct NullPageEvents {
    sender: broadcast::Sender<PageEvent>,
}

impl NullPageEvents {
    pub fn new() -> Arc<Self> {
        let (sender, _) = broadcast::channel(1);
        Arc::new(Self { sender })
    }
}

impl PageEvents for NullPageEvents {
    fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_json_envelope() {
        let outcome = ActionOutcome::text(r#"{"status":200,"body":"ok"}"#);
        let envelope = outcome.json().unwrap();
        assert_eq!(envelope["status"], 200);
    }

    #[test]
    fn outcome_error_message() {
        let outcome = ActionOutcome::error("element detached");
        assert!(outcome.is_error);
        assert_eq!(outcome.error_message(), "element detached");
    }

    #[tokio::test]
    async fn bus_delivers_to_subscribers() {
        let bus = PageEventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(PageEvent::DomReady);
        assert_eq!(rx.recv().await.unwrap(), PageEvent::DomReady);
    }
}
