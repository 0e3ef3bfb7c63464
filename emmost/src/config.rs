use crate::time::Duration;

/// Node processing order of the observer's service tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProcessingPolicy {
    /// Stays on one node until it is idle or terminal, then moves on to the next one.
    ///
    /// Nodes are set up one after another. A node stuck mid-process blocks the others only
    /// until the guard forces it into resync or drops it.
    Alternate,
    /// Visits every node on every tick.
    ///
    /// Nodes are set up concurrently. No node waits for another, at the cost of parallel
    /// synchronization traffic.
    RoundRobin,
}

/// Node observer configuration
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Delay between a reset detection and the re-welcome of the node
    pub wakeup_delay: Duration,
    /// Guard check period
    pub guard_period: Duration,
    /// Number of suspicious guard checks that triggers a forced resync
    pub guard_count_limit: u8,
    /// Number of forced resyncs after which a node is declared irrecoverable
    pub guard_retry_limit: u8,
    /// Maximum wait for a device sync or a script step response
    pub script_timeout: Duration,
    pub processing: ProcessingPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wakeup_delay: Duration::from_millis(200),
            guard_period: Duration::from_millis(1000),
            guard_count_limit: 8,
            guard_retry_limit: 5,
            script_timeout: Duration::from_millis(3000),
            processing: ProcessingPolicy::Alternate,
        }
    }
}
