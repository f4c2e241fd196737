use std::fmt::{Display, Formatter, Result};

/// Why a message was sent to the dead-letter queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterReason {
    MalformedPayload,
    InvalidRecipient,
    RetriesExhausted,
}

/// How a single processing attempt resolved its delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Delivered,
    Retrying { attempt: u32, queue: String },
    /// Original acknowledged but the delayed copy never reached the broker.
    RetryPublishFailed { attempt: u32, queue: String },
    DeadLettered(DeadLetterReason),
    /// Handed back to the broker for immediate redelivery.
    Requeued,
    /// Every ack/reject call failed; the broker redelivers once the channel drops.
    Unresolved,
}

impl Display for DeadLetterReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            DeadLetterReason::MalformedPayload => write!(f, "malformed_payload"),
            DeadLetterReason::InvalidRecipient => write!(f, "invalid_recipient"),
            DeadLetterReason::RetriesExhausted => write!(f, "retries_exhausted"),
        }
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Outcome::Delivered => write!(f, "delivered"),
            Outcome::Retrying { queue, .. } => write!(f, "retrying via {}", queue),
            Outcome::RetryPublishFailed { queue, .. } => {
                write!(f, "retry publish to {} failed", queue)
            }
            Outcome::DeadLettered(reason) => write!(f, "dead_lettered ({})", reason),
            Outcome::Requeued => write!(f, "requeued"),
            Outcome::Unresolved => write!(f, "unresolved"),
        }
    }
}
