//! Engine configuration.

/// Tunables for one engine instance. Shared by every run it executes.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Step body timeout when the step declares none (milliseconds).
    pub default_step_timeout_ms: u64,

    /// Hard guard on graph-walk node visits per run.
    pub max_node_visits: u32,

    /// Upper clamp for `while` directive iterations.
    pub max_loop_iterations: u32,

    /// Interval between target polls inside a `wait`-for-element step.
    pub element_poll_ms: u64,

    pub wait: WaitConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_step_timeout_ms: 10_000,
            max_node_visits: 10_000,
            max_loop_iterations: 10_000,
            element_poll_ms: 250,
            wait: WaitConfig::default(),
        }
    }
}

/// Windows for the post-action wait policies.
#[derive(Debug, Clone)]
pub struct WaitConfig {
    /// Timeout for the mandatory post-navigation wait (milliseconds).
    pub navigation_timeout_ms: u64,

    /// Timeout for network-idle detection (milliseconds).
    pub idle_timeout_ms: u64,

    /// Network quiet period that counts as idle (milliseconds).
    pub network_quiet_ms: u64,

    /// Opportunistic navigation sniff window after click/dblclick.
    pub sniff_window_ms: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: 5000, // 5 seconds for navigation settle
            idle_timeout_ms: 10000,      // 10 seconds for idle
            network_quiet_ms: 500,       // 500ms of network quiet
            sniff_window_ms: 400,        // short watch after clicks
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_wait_config() {
        let config = WaitConfig::default();
        assert_eq!(config.navigation_timeout_ms, 5000);
        assert_eq!(config.idle_timeout_ms, 10000);
        assert_eq!(config.network_quiet_ms, 500);
    }

    #[test]
    fn default_guards() {
        let config = EngineConfig::default();
        assert_eq!(config.max_node_visits, 10_000);
        assert_eq!(config.max_loop_iterations, 10_000);
    }
}
