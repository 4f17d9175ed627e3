use embassy_time::Duration;

/// Adapter configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct Config {
    /// Period after which a line that is still asserted is signalled again.
    /// `None` waits for the line to be released before signalling the next interrupt.
    pub retrigger: Option<Duration>,
    /// Delay before waiting on the pin again after a pin fault
    pub fault_backoff: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retrigger: Some(Duration::from_millis(10)),
            fault_backoff: Duration::from_millis(100),
        }
    }
}
