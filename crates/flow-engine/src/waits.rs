//! Best-effort wait policies for page transitions.
//!
//! Each wait is a single cancellable future racing the page event
//! subscription against a deadline. Timeouts are best-effort outcomes, not
//! errors: a page that never signals still lets the run continue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::boundary::{PageEvent, PageEvents};
use crate::config::WaitConfig;

pub struct WaitPolicies {
    events: Arc<dyn PageEvents>,
    config: WaitConfig,
}

impl WaitPolicies {
    pub fn new(events: Arc<dyn PageEvents>, config: WaitConfig) -> Self {
        Self { events, config }
    }

    pub fn config(&self) -> &WaitConfig {
        &self.config
    }

    /// Wait for navigation to settle: resolves on the first
    /// navigation-completed or dom-ready signal, or when `bound` elapses.
    /// Returns whether a signal was observed.
    pub async fn wait_for_navigation(&self, bound: Duration) -> bool {
        let mut rx = self.events.subscribe();
        let deadline = sleep(bound);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    debug!("navigation wait elapsed after {:?}", bound);
                    return false;
                }
                event = rx.recv() => match event {
                    Ok(PageEvent::NavigationCompleted) | Ok(PageEvent::DomReady) => return true,
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => return false,
                }
            }
        }
    }

    /// Wait until no network activity is observed for the configured quiet
    /// window, bounded by `bound`. Returns whether idle was reached.
    pub async fn wait_for_network_idle(&self, bound: Duration) -> bool {
        let quiet = Duration::from_millis(self.config.network_quiet_ms);
        let mut rx = self.events.subscribe();
        let deadline = sleep(bound);
        tokio::pin!(deadline);
        let quiet_timer = sleep(quiet);
        tokio::pin!(quiet_timer);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    debug!("network idle wait elapsed after {:?}", bound);
                    return false;
                }
                _ = &mut quiet_timer => return true,
                event = rx.recv() => match event {
                    Ok(PageEvent::NetworkActivity) => {
                        quiet_timer.as_mut().reset(Instant::now() + quiet);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => {}
                    // No more signals can arrive; the quiet window will win.
                    Err(RecvError::Closed) => {
                        quiet_timer.as_mut().await;
                        return true;
                    }
                }
            }
        }
    }

    /// Short opportunistic watch for a navigation kick-off after a click.
    /// Returns whether a navigation-started signal was sniffed.
    pub async fn sniff_navigation(&self) -> bool {
        let window = Duration::from_millis(self.config.sniff_window_ms);
        let mut rx = self.events.subscribe();
        let deadline = sleep(window);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => return false,
                event = rx.recv() => match event {
                    Ok(PageEvent::NavigationStarted) => return true,
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => return false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{NullPageEvents, PageEventBus};

    fn policies(events: Arc<dyn PageEvents>) -> WaitPolicies {
        WaitPolicies::new(events, WaitConfig::default())
    }

    #[tokio::test]
    async fn navigation_signal_resolves_before_deadline() {
        let bus = PageEventBus::new(8);
        let waits = policies(bus.clone());

        let publisher = bus.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            publisher.publish(PageEvent::NavigationCompleted);
        });

        assert!(waits.wait_for_navigation(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn navigation_wait_times_out_quietly() {
        let waits = policies(NullPageEvents::new());
        assert!(!waits.wait_for_navigation(Duration::from_millis(30)).await);
    }

    #[tokio::test]
    async fn network_idle_after_quiet_window() {
        let bus = PageEventBus::new(8);
        let mut config = WaitConfig::default();
        config.network_quiet_ms = 30;
        let waits = WaitPolicies::new(bus.clone(), config);

        let publisher = bus.clone();
        tokio::spawn(async move {
            for _ in 0..3 {
                publisher.publish(PageEvent::NetworkActivity);
                sleep(Duration::from_millis(10)).await;
            }
        });

        assert!(waits.wait_for_network_idle(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn network_idle_bounded_by_deadline() {
        let bus = PageEventBus::new(8);
        let mut config = WaitConfig::default();
        config.network_quiet_ms = 100;
        let waits = WaitPolicies::new(bus.clone(), config);

        let publisher = bus.clone();
        let chatter = tokio::spawn(async move {
            loop {
                publisher.publish(PageEvent::NetworkActivity);
                sleep(Duration::from_millis(20)).await;
            }
        });

        assert!(!waits.wait_for_network_idle(Duration::from_millis(80)).await);
        chatter.abort();
    }

    #[tokio::test]
    async fn sniff_sees_navigation_start() {
        let bus = PageEventBus::new(8);
        let mut config = WaitConfig::default();
        config.sniff_window_ms = 200;
        let waits = WaitPolicies::new(bus.clone(), config);

        let publisher = bus.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            publisher.publish(PageEvent::NavigationStarted);
        });

        assert!(waits.sniff_navigation().await);
    }

    #[tokio::test]
    async fn sniff_window_elapses_without_signal() {
        let mut config = WaitConfig::default();
        config.sniff_window_ms = 20;
        let waits = WaitPolicies::new(NullPageEvents::new(), config);
        assert!(!waits.sniff_navigation().await);
    }
}
