use std::time::Duration;

pub const RETRY_COUNT_HEADER: &str = "x-retry-count";
pub const DEATH_HEADER: &str = "x-death";

pub const DEFAULT_RETRY_EXCHANGE: &str = "retry_exchange";
pub const DEFAULT_RETRY_DELAYS_MS: [u64; 3] = [10_000, 30_000, 60_000];

/// One delay queue: messages sit here for `delay` and are then dead-lettered
/// by the broker back onto the main queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryTier {
    pub queue: String,
    pub delay: Duration,
}

impl RetryTier {
    pub fn from_delay(delay: Duration) -> Self {
        let millis = delay.as_millis();
        let queue = if millis % 1000 == 0 {
            format!("retry-{}s", millis / 1000)
        } else {
            format!("retry-{}ms", millis)
        };

        Self { queue, delay }
    }

    pub fn ttl_ms(&self) -> u64 {
        self.delay.as_millis() as u64
    }
}

/// Ordered delay tiers behind the retry exchange. Attempt `n` (1-based) maps
/// to tier `n`. The attempt that reaches `max_attempts` is dead-lettered
/// instead of retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryTopology {
    pub exchange: String,
    pub tiers: Vec<RetryTier>,
}

impl RetryTopology {
    pub fn new(exchange: impl Into<String>, delays_ms: &[u64]) -> Self {
        Self {
            exchange: exchange.into(),
            tiers: delays_ms
                .iter()
                .map(|ms| RetryTier::from_delay(Duration::from_millis(*ms)))
                .collect(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.tiers.len() as u32
    }

    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt == 0 || attempt >= self.max_attempts()
    }

    pub fn tier_for(&self, attempt: u32) -> Option<&RetryTier> {
        let index = attempt.checked_sub(1)?;
        self.tiers.get(index as usize)
    }

    pub fn queue_for(&self, attempt: u32) -> Option<&str> {
        self.tier_for(attempt).map(|tier| tier.queue.as_str())
    }
}

impl Default for RetryTopology {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_EXCHANGE, &DEFAULT_RETRY_DELAYS_MS)
    }
}

/// Every queue and exchange the pipeline relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTopology {
    pub main_queue: String,
    pub dead_letter_queue: String,
    pub retry: RetryTopology,
}

impl Default for QueueTopology {
    fn default() -> Self {
        Self {
            main_queue: "notification".to_string(),
            dead_letter_queue: "dlq".to_string(),
            retry: RetryTopology::default(),
        }
    }
}
